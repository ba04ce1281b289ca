//! # routes::monitor
//!
//! | Method    | Path                           | Description                                 |
//! |-----------|--------------------------------|---------------------------------------------|
//! | GET       | `/health`                      | liveness, no auth                           |
//! | GET       | `/api/monitor/health`          | last cycle health % and alert delivery stats |
//! | GET       | `/api/monitor/nodes`           | king node, touches and history per asset    |
//! | GET       | `/api/monitor/nodes/:symbol`   | same, one asset                             |
//! | GET       | `/api/monitor/reports`         | last `AssetReport` per asset                |
//! | GET (WS)  | `/ws/monitor`                  | snapshot, then a stream of `ScanEvent`s     |

use std::collections::BTreeMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::engine::tracker::AssetTrack;
use crate::error::AppError;
use crate::state::SharedState;

// ─── WebSocket Handler ───────────────────────────────────────────────────────

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    let snapshot = {
        let session = state.session.read().await;
        let health  = state.health.read().await;
        json!({
            "event":   "SNAPSHOT",
            "cycles":  session.cycles,
            "health":  *health,
            "reports": session.last_results,
        })
        .to_string()
    };

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST ────────────────────────────────────────────────────────────────────

/// GET /health
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":          true,
        "service":     "kingnode",
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    }))
}

/// GET /api/monitor/health
pub async fn get_health(State(state): State<SharedState>) -> impl IntoResponse {
    let health = state.health.read().await.clone();
    let cycles = state.session.read().await.cycles;

    Json(json!({
        "ok":                 true,
        "health_pct":         health.health_pct(),
        "last_cycle":         health,
        "cycles":             cycles,
        "provider":           state.market.provider().to_string(),
        "discord_configured": state.alerts.is_configured(),
        "alerts":             state.alerts.stats(),
    }))
}

fn node_view(symbol: &str, track: &AssetTrack) -> Value {
    json!({
        "symbol":  symbol,
        "node":    track.current,
        "touches": track.touches,
        "history": track.history,
    })
}

/// GET /api/monitor/nodes
pub async fn get_nodes(State(state): State<SharedState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let nodes: BTreeMap<&String, Value> = session
        .tracker
        .assets()
        .map(|(symbol, track)| (symbol, node_view(symbol, track)))
        .collect();

    Json(json!({
        "ok":    true,
        "count": nodes.len(),
        "nodes": nodes,
    }))
}

/// GET /api/monitor/nodes/:symbol
pub async fn get_node(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, AppError> {
    let symbol = symbol.to_uppercase();
    let session = state.session.read().await;
    let track = session
        .tracker
        .get(&symbol)
        .ok_or_else(|| AppError::NotFound(format!("no king node tracked for {symbol}")))?;

    Ok(Json(json!({ "ok": true, "node": node_view(&symbol, track) })))
}

/// GET /api/monitor/reports
pub async fn get_reports(State(state): State<SharedState>) -> impl IntoResponse {
    let session = state.session.read().await;
    Json(json!({
        "ok":      true,
        "count":   session.last_results.len(),
        "reports": session.last_results,
    }))
}
