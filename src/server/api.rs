use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_auth::AuthBearer;
use log::info;

use super::error::{Result, Unauthorized};
use super::state::AppState;
use super::types::*;
use crate::config::Settings;
use crate::metrics;
use crate::scan::ScanReport;
use crate::tools::ImageSearchResults;
use crate::utils::expand_path;

fn check_token(state: &AppState, token: &str) -> Result<()> {
    if token != state.token {
        return Err(Unauthorized.into());
    }
    Ok(())
}

/// 增量扫描图片目录
///
/// 同一时间只会执行一个扫描，并发请求会排队等待。
#[utoipa::path(
    post,
    path = "/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, body = ScanReport),
    )
)]
pub async fn scan_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<ScanRequest>,
) -> Result<Json<ScanReport>> {
    check_token(&state, &token)?;

    let roots: Vec<PathBuf> = match data.paths.is_empty() {
        true => Settings::load_or_create(&state.conf_dir)?.media_roots(),
        false => data.paths.iter().map(expand_path).collect(),
    };
    info!("收到扫描请求: {:?}", roots);

    let report = state.db.scan(&roots).await?;
    Ok(Json(report))
}

/// 使用文本搜索图片，返回按相似度排列的图片路径
#[utoipa::path(
    post,
    path = "/search_text",
    request_body = SearchTextRequest,
    responses(
        (status = 200, body = Vec<String>),
    )
)]
pub async fn search_text_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<SearchTextRequest>,
) -> Result<Json<Vec<String>>> {
    check_token(&state, &token)?;

    info!("正在搜索文本: {:?}", data.query);
    let result = state.db.search_image_by_text(&data.query, data.top_k).await?;
    Ok(Json(result))
}

/// 使用图片搜索相似图片
#[utoipa::path(
    post,
    path = "/search_image",
    request_body = SearchImageRequest,
    responses(
        (status = 200, body = ImageSearchResults),
    )
)]
pub async fn search_image_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<SearchImageRequest>,
) -> Result<Json<ImageSearchResults>> {
    check_token(&state, &token)?;

    info!("正在搜索图片: {}", data.path);
    let result = state.db.search_similar_images(expand_path(&data.path), data.top_k).await?;
    Ok(Json(result))
}

/// prometheus 指标
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, body = String, content_type = "text/plain"),
    )
)]
pub async fn metrics_handler() -> Result<String> {
    Ok(metrics::gather_text()?)
}
