use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::Result;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::cli::*;
use crate::embedding::EngineConfig;
use crate::utils::expand_path;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "mediasearch", "mediasearch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().expect("config dir is not valid UTF-8")
}

#[derive(Parser, Debug, Clone)]
pub struct EngineOptions {
    /// 嵌入模型单次推理的图片数量
    #[arg(long, value_name = "SIZE", default_value_t = 32)]
    pub batch_size: usize,
    /// 模型文件缓存目录，默认为配置目录下的 models
    #[arg(long, value_name = "DIR")]
    pub model_cache: Option<PathBuf>,
}

impl EngineOptions {
    pub fn engine_config(&self, conf_dir: &ConfDir) -> EngineConfig {
        EngineConfig {
            cache_dir: self.model_cache.clone().unwrap_or_else(|| conf_dir.models()),
            batch_size: self.batch_size.max(1),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "mediasearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 配置文件目录，数据库和向量索引都保存在这里
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 增量扫描图片目录，同步元数据库和向量索引
    Scan(ScanCommand),
    /// 使用文本搜索图片
    SearchText(SearchTextCommand),
    /// 使用图片搜索相似图片
    SearchImage(SearchImageCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("media.db")
    }

    /// 返回向量索引目录的路径
    ///
    /// 数据库和向量索引是一个整体，只恢复其中一个会导致索引不一致
    pub fn vector_index(&self) -> PathBuf {
        self.path.join("vector_index")
    }

    /// 返回配置文件的路径
    pub fn settings(&self) -> PathBuf {
        self.path.join("config.json")
    }

    /// 返回模型缓存目录的路径
    pub fn models(&self) -> PathBuf {
        self.path.join("models")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

/// 保存在配置目录中的 config.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// 需要建立索引的图片目录或文件
    #[serde(default)]
    pub media_index_allowed_paths: Vec<PathBuf>,
}

impl Settings {
    /// 读取配置文件，不存在时以当前目录为默认扫描路径创建
    pub fn load_or_create(conf_dir: &ConfDir) -> Result<Self> {
        let file = conf_dir.settings();
        if !file.exists() {
            let settings = Self { media_index_allowed_paths: vec![expand_path(".")] };
            settings.save(conf_dir)?;
            info!("已创建配置文件: {}", file.display());
            return Ok(settings);
        }
        let settings: Self = serde_json::from_slice(&fs::read(&file)?)?;
        Ok(settings)
    }

    pub fn save(&self, conf_dir: &ConfDir) -> Result<()> {
        fs::create_dir_all(conf_dir.path())?;
        fs::write(conf_dir.settings(), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// 展开后的扫描根路径，列表为空时使用当前目录
    pub fn media_roots(&self) -> Vec<PathBuf> {
        if self.media_index_allowed_paths.is_empty() {
            warn!("配置中没有扫描路径，使用当前目录");
            return vec![expand_path(".")];
        }
        self.media_index_allowed_paths.iter().map(expand_path).collect()
    }
}
