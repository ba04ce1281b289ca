//! # engine::tracker
//!
//! **Touch / Migration Tracker** — one small state machine per asset.
//!
//! ```text
//! observe(asset, node, price)
//!     │
//!     ├─ no node yet         → adopt node, touch_count = 0
//!     │
//!     ├─ strike changed      → MigrationEvent
//!     │                        archive (old node, touches) → history (max 10)
//!     │                        touch_count = 0 for the new strike
//!     │
//!     └─ same strike         → refresh node value
//!            |price − strike| ≤ tol  and armed → touch_count += 1, disarm
//!            |price − strike| > tol            → arm (price has left the band)
//! ```
//!
//! A touch only counts after price has been outside the tolerance band, so a
//! price sitting on the strike for many cycles is one touch, not many.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::KingNode;

/// Prior nodes kept per asset.
pub const HISTORY_LIMIT: usize = 10;

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Points from the strike that count as a touch; leaving it re-arms.
    pub touch_tolerance: f64,
    /// Same-wall strike moves smaller than this are LATERAL; 0 disables.
    pub lateral_band:    f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { touch_tolerance: 2.0, lateral_band: 0.0 }
    }
}

// ─── Touch Record ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchRecord {
    pub strike:           f64,
    pub touch_count:      u32,
    pub last_touch_price: Option<f64>,
    pub first_seen:       DateTime<Utc>,
    /// `true` once price has been outside the band since the last touch
    pub armed:            bool,
}

impl TouchRecord {
    fn new(strike: f64, price: f64, tolerance: f64, at: DateTime<Utc>) -> Self {
        Self {
            strike,
            touch_count:      0,
            last_touch_price: None,
            first_seen:       at,
            armed:            (price - strike).abs() > tolerance,
        }
    }
}

// ─── Migration ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationDirection {
    Upward,
    Downward,
    Lateral,
    Reversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Significance {
    Low,
    Medium,
    High,
}

impl Significance {
    /// Percentage points added to the next consensus confidence for the asset.
    pub fn confidence_boost(&self) -> f64 {
        match self {
            Significance::Low    => 0.0,
            Significance::Medium => 5.0,
            Significance::High   => 10.0,
        }
    }
}

const HIGH_MOVE_PCT:   f64 = 0.5;
const MEDIUM_MOVE_PCT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEvent {
    pub asset:            String,
    pub old_node:         KingNode,
    pub new_node:         KingNode,
    pub direction:        MigrationDirection,
    pub significance:     Significance,
    pub confidence_boost: f64,
    /// Touches the old strike collected before it was replaced
    pub archived_touches: u32,
    pub detected_at:      DateTime<Utc>,
}

pub fn classify_direction(old: &KingNode, new: &KingNode, lateral_band: f64) -> MigrationDirection {
    let delta = new.strike - old.strike;
    if old.wall != new.wall {
        MigrationDirection::Reversal
    } else if delta.abs() < lateral_band {
        MigrationDirection::Lateral
    } else if delta > 0.0 {
        MigrationDirection::Upward
    } else {
        MigrationDirection::Downward
    }
}

pub fn classify_significance(old: &KingNode, new: &KingNode, direction: MigrationDirection) -> Significance {
    if direction == MigrationDirection::Reversal {
        return Significance::High;
    }
    let move_pct = if old.strike != 0.0 {
        ((new.strike - old.strike) / old.strike).abs() * 100.0
    } else {
        0.0
    };
    if move_pct >= HIGH_MOVE_PCT {
        Significance::High
    } else if move_pct >= MEDIUM_MOVE_PCT {
        Significance::Medium
    } else {
        Significance::Low
    }
}

// ─── Per-Asset State ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedNode {
    pub node:        KingNode,
    pub touches:     TouchRecord,
    pub replaced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTrack {
    pub current: KingNode,
    pub touches: TouchRecord,
    /// Oldest first, at most [`HISTORY_LIMIT`]
    pub history: VecDeque<ArchivedNode>,
}

/// What one observation did.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// First node seen for this asset
    Initialized { touch_count: u32 },
    /// Same strike; `touched` is true when this observation added a touch
    Tracking { touch_count: u32, touched: bool },
    Migrated(MigrationEvent),
}

impl Observation {
    pub fn touch_count(&self) -> u32 {
        match self {
            Observation::Initialized { touch_count } => *touch_count,
            Observation::Tracking { touch_count, .. } => *touch_count,
            Observation::Migrated(_) => 0,
        }
    }
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KingNodeTracker {
    config: TrackerConfig,
    assets: HashMap<String, AssetTrack>,
}

impl KingNodeTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config, assets: HashMap::new() }
    }

    /// Swap in a new config, keeping the tracked state (used after a session restore).
    pub fn set_config(&mut self, config: TrackerConfig) {
        self.config = config;
    }

    pub fn get(&self, asset: &str) -> Option<&AssetTrack> {
        self.assets.get(asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&String, &AssetTrack)> {
        self.assets.iter()
    }

    pub fn touch_count(&self, asset: &str) -> u32 {
        self.assets.get(asset).map(|t| t.touches.touch_count).unwrap_or(0)
    }

    pub fn observe(&mut self, asset: &str, node: KingNode, price: f64, at: DateTime<Utc>) -> Observation {
        let tol = self.config.touch_tolerance;

        let Some(track) = self.assets.get_mut(asset) else {
            info!(asset, node = %node, "📍 King node adopted");
            self.assets.insert(asset.to_string(), AssetTrack {
                current: node,
                touches: TouchRecord::new(node.strike, price, tol, at),
                history: VecDeque::with_capacity(HISTORY_LIMIT),
            });
            return Observation::Initialized { touch_count: 0 };
        };

        // ── Migration ────────────────────────────────────────────────────────
        if node.strike != track.current.strike {
            let old_node     = track.current;
            let direction    = classify_direction(&old_node, &node, self.config.lateral_band);
            let significance = classify_significance(&old_node, &node, direction);
            let old_touches  = std::mem::replace(
                &mut track.touches,
                TouchRecord::new(node.strike, price, tol, at),
            );
            let archived_touches = old_touches.touch_count;

            if track.history.len() >= HISTORY_LIMIT {
                track.history.pop_front();
            }
            track.history.push_back(ArchivedNode {
                node:        old_node,
                touches:     old_touches,
                replaced_at: at,
            });
            track.current = node;

            info!(
                asset,
                from         = %old_node,
                to           = %node,
                direction    = ?direction,
                significance = ?significance,
                "🔀 King node migrated"
            );

            return Observation::Migrated(MigrationEvent {
                asset: asset.to_string(),
                old_node,
                new_node: node,
                direction,
                significance,
                confidence_boost: significance.confidence_boost(),
                archived_touches,
                detected_at: at,
            });
        }

        // ── Same strike: refresh + touch detection ───────────────────────────
        track.current = node;
        let distance = node.distance(price);
        let mut touched = false;

        if distance <= tol {
            if track.touches.armed {
                track.touches.touch_count     += 1;
                track.touches.last_touch_price = Some(price);
                track.touches.armed            = false;
                touched = true;
                info!(
                    asset,
                    strike  = node.strike,
                    price,
                    touches = track.touches.touch_count,
                    "👆 King node touched"
                );
            }
        } else if !track.touches.armed {
            track.touches.armed = true;
            debug!(asset, strike = node.strike, price, distance, "price left touch band — re-armed");
        }

        Observation::Tracking { touch_count: track.touches.touch_count, touched }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
