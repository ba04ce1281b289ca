//! Per-asset result of one scan, shared by the scanner, alerts, session file
//! and monitor API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::KingNode;
use crate::engine::consensus::ConsensusScore;
use crate::engine::sizing::PositionSizeResult;
use crate::engine::tracker::MigrationEvent;
use crate::engine::zone::Zone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReport {
    pub symbol:       String,
    pub price:        f64,
    pub node:         KingNode,
    /// `|price - strike|`
    pub distance:     f64,
    pub zone:         Zone,
    pub touch_count:  u32,
    pub sma_20:       Option<f64>,
    pub sma_50:       Option<f64>,
    pub rsi_14:       Option<f64>,
    pub volume_ratio: f64,
    pub consensus:    ConsensusScore,
    pub size:         PositionSizeResult,
    /// Set on the cycle the node migrated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration:    Option<MigrationEvent>,
    pub scanned_at:   DateTime<Utc>,
}

/// Rejection-zone call wall setup used across module tests.
#[cfg(test)]
pub(crate) fn sample_report() -> AssetReport {
    use crate::engine::consensus::Bias;
    use super::WallType;

    AssetReport {
        symbol:       "SPX".into(),
        price:        5803.0,
        node:         KingNode::new(5805.0, WallType::CallWall, 42.0),
        distance:     2.0,
        zone:         Zone::RejectionZone,
        touch_count:  1,
        sma_20:       Some(5790.0),
        sma_50:       Some(5750.0),
        rsi_14:       Some(66.0),
        volume_ratio: 1.4,
        consensus:    ConsensusScore {
            points:         200,
            max:            275,
            confidence_pct: 72.7,
            bias:           Bias::Bearish,
            breakdown:      vec![],
        },
        size:         PositionSizeResult {
            percentage:          1.62,
            reasoning:           "base 1.25% x vol 1.20".into(),
            base_pct:            1.25,
            volume_multiplier:   1.2,
            touch_multiplier:    1.2,
            strength_multiplier: 1.2,
            raw_pct:             2.16,
            clamped:             false,
        },
        migration:    None,
        scanned_at:   Utc::now(),
    }
}
