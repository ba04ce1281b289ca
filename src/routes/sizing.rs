//! # routes::sizing
//!
//! `POST /api/size` — run the position size calculator on demand.
//!
//! ```json
//! { "zone": "rejection", "volume_ratio": 1.8, "touch_count": 1,
//!   "king_node_strength": 42.0, "base_confidence": 70.0 }
//! ```
//! `zone` accepts the same spellings as the CLI; `confidence_order` defaults
//! to the server's `SIZING_CONFIDENCE_ORDER`.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::sizing::{calculate_position_size, ConfidenceOrder, SizingInput};
use crate::engine::zone::Zone;
use crate::error::AppError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SizeRequest {
    pub zone:               String,
    pub volume_ratio:       f64,
    #[serde(default)]
    pub touch_count:        u32,
    pub king_node_strength: f64,
    pub base_confidence:    f64,
    #[serde(default)]
    pub confidence_order:   Option<ConfidenceOrder>,
}

pub async fn post_size(
    State(state): State<SharedState>,
    Json(req): Json<SizeRequest>,
) -> Result<Json<Value>, AppError> {
    let zone: Zone = req.zone.parse().map_err(AppError::BadRequest)?;
    let order = req.confidence_order.unwrap_or(state.config.confidence_order);

    let input = SizingInput {
        zone,
        volume_ratio:       req.volume_ratio,
        touch_count:        req.touch_count,
        king_node_strength: req.king_node_strength,
        base_confidence:    req.base_confidence,
    };
    let result = calculate_position_size(&input, order);

    Ok(Json(json!({
        "ok":     true,
        "order":  order,
        "result": result,
    })))
}
