use std::path::PathBuf;

use clap::Parser;
use indicatif::ProgressBar;

use crate::cli::{SubCommandExtend, load_engine};
use crate::config::{EngineOptions, Opts, Settings};
use crate::error::Error;
use crate::scan::PathEnumerator;
use crate::utils::{expand_path, pb_style};
use crate::MediaDBBuilder;

#[derive(Parser, Debug, Clone)]
pub struct ScanCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// 扫描的目录或文件，不填则使用 config.json 中的 media_index_allowed_paths
    pub paths: Vec<PathBuf>,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, value_delimiter = ',', default_value = "jpg,jpeg,png")]
    pub suffix: Vec<String>,
}

impl SubCommandExtend for ScanCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let roots = match self.paths.is_empty() {
            true => Settings::load_or_create(&opts.conf_dir)?.media_roots(),
            false => self.paths.iter().map(expand_path).collect(),
        };

        // 路径无效时不需要加载模型
        if PathEnumerator::new(&roots).roots().is_empty() {
            return Err(Error::config(format!("没有可用的扫描路径: {roots:?}")).into());
        }

        let engine = load_engine(&self.engine, opts).await?;
        let db = MediaDBBuilder::new(opts.conf_dir.clone())
            .extensions(self.suffix.clone())
            .batch_size(self.engine.batch_size)
            .open(engine)
            .await?;

        let pb = ProgressBar::no_length().with_style(pb_style());
        let report = db.scan_with_progress(&roots, pb).await?;

        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
