//! # error
//!
//! API error type.  Every handler returns `Result<_, AppError>`; the
//! `IntoResponse` impl turns it into `{ "ok": false, "error": "…" }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Syntactically valid request with unusable values
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// e.g. an asset that has not been scanned yet
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg)   => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
