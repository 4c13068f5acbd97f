use std::path::PathBuf;

use thiserror::Error;

/// 索引子系统对外暴露的错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 没有可用的扫描路径等配置问题，此时不会执行扫描
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 单个文件读取失败
    #[error("无法读取文件 {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 嵌入模型不可用或计算失败
    #[error("嵌入模型错误: {0:#}")]
    Engine(anyhow::Error),

    /// 元数据库或向量索引持久化失败
    #[error("存储错误: {0:#}")]
    Store(anyhow::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn engine(err: impl Into<anyhow::Error>) -> Self {
        Self::Engine(err.into())
    }

    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        Self::Store(err.into())
    }

    /// 错误类别，用于 API 响应和日志
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Io { .. } => "io",
            Self::Engine(_) => "engine",
            Self::Store(_) => "store",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Store(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
