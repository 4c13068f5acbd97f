use clap::Parser;
use log::info;
use rand::distr::{Alphanumeric, SampleString};
use tokio::net::TcpListener;

use crate::cli::{SubCommandExtend, load_engine};
use crate::config::{EngineOptions, Settings};
use crate::{MediaDBBuilder, Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 请求验证 token，不填则随机生成
    #[arg(long, default_value_t = String::new())]
    pub token: String,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, value_delimiter = ',', default_value = "jpg,jpeg,png")]
    pub suffix: Vec<String>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        // 提前创建配置文件，/scan 不带路径时使用其中的扫描路径
        Settings::load_or_create(&opts.conf_dir)?;

        let engine = load_engine(&self.engine, opts).await?;
        let db = MediaDBBuilder::new(opts.conf_dir.clone())
            .extensions(self.suffix.clone())
            .batch_size(self.engine.batch_size)
            .open(engine)
            .await?;

        let mut token = self.token.clone();
        if token.is_empty() {
            token = Alphanumeric.sample_string(&mut rand::rng(), 32);
            info!("鉴权 token: {}", token);
        }

        // 创建应用状态
        let state = server::AppState::new(db, opts.conf_dir.clone(), token);

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
