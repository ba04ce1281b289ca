//! # auth — API Key Middleware
//!
//! Guards the monitor API with an `X-API-Key` header.
//!
//! - `API_KEY` unset or empty → every request passes (dev mode)
//! - `API_KEY` set            → `X-API-Key: <key>` required
//!
//! `/health` is always open.
//!
//! ```bash
//! curl -H "X-API-Key: $API_KEY" http://localhost:3000/api/monitor/nodes
//! ```

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::state::SharedState;

pub const API_KEY_HEADER: &str = "X-API-Key";

pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.monitor_api_key.as_deref() else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();
    if path == "/health" {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected {
        next.run(request).await
    } else {
        warn!(path = %path, "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
