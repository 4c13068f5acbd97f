mod scan;
mod search;
pub mod server;

pub use scan::*;
pub use search::*;
pub use server::*;

use std::sync::Arc;

use anyhow::anyhow;
use log::info;
use tokio::task::spawn_blocking;

use crate::config::{EngineOptions, Opts};
use crate::embedding::{self, EmbeddingEngine};
use crate::error::{Error, Result};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 加载嵌入模型，模型文件可能需要下载，放在阻塞线程中执行
pub(crate) async fn load_engine(options: &EngineOptions, opts: &Opts) -> Result<Arc<dyn EmbeddingEngine>> {
    let config = options.engine_config(&opts.conf_dir);
    info!("加载嵌入模型，缓存目录: {}", config.cache_dir.display());
    spawn_blocking(move || embedding::load_engine(&config))
        .await
        .map_err(|e| Error::engine(anyhow!("加载模型的任务异常退出: {e}")))?
        .map_err(Error::engine)
}
