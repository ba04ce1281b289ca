//! HTTP surface of `kingnode serve`.

pub mod monitor;
pub mod sizing;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_api_key;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health",                    get(monitor::health_check))
        // ── Monitor ──────────────────────────────────────────────────────────
        .route("/api/monitor/health",        get(monitor::get_health))
        .route("/api/monitor/nodes",         get(monitor::get_nodes))
        .route("/api/monitor/nodes/:symbol", get(monitor::get_node))
        .route("/api/monitor/reports",       get(monitor::get_reports))
        .route("/ws/monitor",                get(monitor::ws_monitor))
        // ── Calculators ──────────────────────────────────────────────────────
        .route("/api/size",                  post(sizing::post_size))
        // ── Middleware ───────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
