//! # models::node
//!
//! Defines [`KingNode`] — the single strike where dealer open interest is
//! most concentrated for an underlying.  A fresh value is derived from the
//! options chain on every scan cycle; when the dominant strike changes the
//! old value is superseded, never mutated in place.

use serde::{Deserialize, Serialize};

// ─── WallType ────────────────────────────────────────────────────────────────

/// Which side of the chain dominates open interest at the node strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WallType {
    /// Call OI dominates — acts as resistance above price.
    CallWall,
    /// Put OI dominates — acts as support below price.
    PutWall,
}

impl std::fmt::Display for WallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WallType::CallWall => write!(f, "CALL_WALL"),
            WallType::PutWall  => write!(f, "PUT_WALL"),
        }
    }
}

// ─── KingNode ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KingNode {
    pub strike:   f64,
    pub wall:     WallType,
    /// Share of total chain open interest sitting on this strike (0–100 %).
    pub strength: f64,
}

impl KingNode {
    pub fn new(strike: f64, wall: WallType, strength: f64) -> Self {
        Self { strike, wall, strength }
    }

    /// Absolute distance in points between `price` and the node strike.
    #[inline]
    pub fn distance(&self, price: f64) -> f64 {
        (price - self.strike).abs()
    }
}

impl std::fmt::Display for KingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:.2} ({:.1}%)", self.wall, self.strike, self.strength)
    }
}
