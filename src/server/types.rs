use serde::Deserialize;
use utoipa::ToSchema;

use crate::tools::DEFAULT_TOP_K;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// 扫描请求参数
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ScanRequest {
    /// 扫描的目录或文件，不填则使用 config.json 中的扫描路径
    #[serde(default)]
    pub paths: Vec<String>,
}

/// 以文搜图请求参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchTextRequest {
    /// 描述图片内容的文本
    pub query: String,
    /// 返回的结果数量
    #[schema(default = 5)]
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// 以图搜图请求参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchImageRequest {
    /// 参考图片在服务器上的路径
    pub path: String,
    /// 返回的结果数量
    #[schema(default = 5)]
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}
