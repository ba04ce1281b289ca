//! # events
//!
//! [`ScanEvent`] — everything the scan loop broadcasts to `/ws/monitor`.
//! Events are serialized once and fanned out as JSON strings.

use serde::Serialize;

use crate::engine::tracker::MigrationEvent;
use crate::models::AssetReport;
use crate::state::ScanHealth;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanEvent {
    CycleStarted {
        cycle:   u64,
        symbols: Vec<String>,
    },

    /// Fresh report for one asset
    AssetScanned {
        report: Box<AssetReport>,
    },

    NodeTouched {
        symbol:      String,
        strike:      f64,
        price:       f64,
        touch_count: u32,
    },

    NodeMigrated {
        migration: Box<MigrationEvent>,
    },

    /// Fetch or derivation failed; the cycle moved on
    AssetFailed {
        symbol: String,
        error:  String,
    },

    CycleCompleted {
        health: ScanHealth,
    },
}

impl ScanEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
