use std::sync::Arc;

use crate::MediaDB;
use crate::config::ConfDir;

/// 应用状态
pub struct AppState {
    /// 图片索引
    pub db: MediaDB,
    /// 配置目录，用于读取默认扫描路径
    pub conf_dir: ConfDir,
    /// 鉴权 token
    pub token: String,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(db: MediaDB, conf_dir: ConfDir, token: String) -> Arc<Self> {
        Arc::new(AppState { db, conf_dir, token })
    }
}
