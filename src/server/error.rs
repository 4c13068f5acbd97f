use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::Error;

/// 鉴权失败
#[derive(thiserror::Error, Debug)]
#[error("鉴权 token 无效")]
pub struct Unauthorized;

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        if self.0.is::<Unauthorized>() {
            return (StatusCode::UNAUTHORIZED, "unauthorized");
        }
        match self.0.downcast_ref::<Error>() {
            Some(e @ (Error::Configuration(_) | Error::Io { .. })) => (StatusCode::BAD_REQUEST, e.kind()),
            Some(e @ Error::Engine(_)) => (StatusCode::SERVICE_UNAVAILABLE, e.kind()),
            Some(e @ Error::Store(_)) => (StatusCode::INTERNAL_SERVER_ERROR, e.kind()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let body = json!({
            "error": kind,
            "message": format!("{:#}", self.0),
        });
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
