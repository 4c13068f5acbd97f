use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::hash::Fingerprint;

/// 一次扫描的统计结果，不会被持久化
///
/// 序列化后的字段名是对外约定，不能修改。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScanReport {
    /// 成功计算指纹的图片数量
    #[serde(rename = "total_media_count")]
    pub total: usize,
    /// 新增的图片数量
    #[serde(rename = "new_media_count")]
    pub new: usize,
    /// 路径发生变化的图片数量
    #[serde(rename = "updated_media_count")]
    pub updated: usize,
    /// 被删除的图片数量
    #[serde(rename = "deleted_media_count")]
    pub deleted: usize,
    /// 因读取失败而跳过的文件数量
    #[serde(skip)]
    #[schema(ignore)]
    pub skipped: usize,
}

/// 对比磁盘状态和数据库记录之后得到的修改计划
#[derive(Debug, Default)]
pub(crate) struct ScanPlan {
    /// 新内容，需要计算向量
    pub new: Vec<(Fingerprint, PathBuf)>,
    /// 已知内容出现在新位置，只需要更新路径
    pub moves: Vec<(Fingerprint, String)>,
    /// 成功计算指纹的文件数量
    pub hashed: usize,
    /// 无法读取的文件数量
    pub skipped: usize,
}
