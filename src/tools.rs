//! 提供给上层 agent 调用的搜索工具，返回值格式是对外约定

use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Result;
use crate::query::QueryService;

/// 默认返回的结果数量
pub const DEFAULT_TOP_K: usize = 5;

/// 以图搜图的返回结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImageSearchResults {
    /// 按相似度从高到低排列的图片绝对路径
    pub results: Vec<String>,
}

/// 以文搜图，返回按相似度排列的图片路径
pub async fn search_image_by_text(query: &QueryService, text: &str, top_k: usize) -> Result<Vec<String>> {
    let hits = query.search_by_text(text, top_k).await?;
    Ok(hits.iter().map(|hit| hit.path_or_placeholder().to_owned()).collect())
}

/// 以图搜图，返回 `{ "results": [...] }`
pub async fn search_by_image(
    query: &QueryService,
    path: impl AsRef<Path>,
    top_k: usize,
) -> Result<ImageSearchResults> {
    let hits = query.search_by_image(path, top_k).await?;
    Ok(ImageSearchResults {
        results: hits.iter().map(|hit| hit.path_or_placeholder().to_owned()).collect(),
    })
}
