mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::scan_handler,
        api::search_text_handler,
        api::search_image_handler,
        api::metrics_handler,
    ),
    components(schemas(
        types::ScanRequest,
        types::SearchTextRequest,
        types::SearchImageRequest,
        crate::scan::ScanReport,
        crate::tools::ImageSearchResults,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/scan", post(api::scan_handler))
        .route("/search_text", post(api::search_text_handler))
        .route("/search_image", post(api::search_image_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // 请求体只包含路径和文本：1M
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::error::{AppError, Unauthorized};
    use super::*;
    use crate::Error;

    fn status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_error_status() {
        assert_eq!(status(Error::config("no roots").into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(Error::engine(anyhow::anyhow!("down")).into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(Error::store(anyhow::anyhow!("disk")).into()), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(Unauthorized.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(anyhow::anyhow!("other").into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_openapi_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/scan", "/search_text", "/search_image", "/metrics"] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
    }
}
