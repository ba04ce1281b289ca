//! # engine::consensus
//!
//! **Consensus Score** — 275-point weighted sum of indicator sub-scores.
//!
//! | Sub-score      | Max | Driven by                                  |
//! |----------------|-----|--------------------------------------------|
//! | Trend          |  50 | price vs SMA20 vs SMA50 ordering           |
//! | Momentum       |  50 | RSI14 relative to the wall's expected move |
//! | Participation  |  50 | latest volume / average volume             |
//! | Proximity      |  75 | zone                                       |
//! | Node strength  |  50 | king node OI share                         |
//!
//! The score gates sizing alerts; its percentage becomes `base_confidence`
//! for the position size calculator.

use serde::{Deserialize, Serialize};

use super::zone::Zone;
use crate::models::{KingNode, WallType};

pub const MAX_POINTS: u32 = 275;

// ─── Bias ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    /// Put wall support — expecting a bounce
    Bullish,
    /// Call wall resistance — expecting a rejection
    Bearish,
    Neutral,
}

pub fn node_bias(node: &KingNode, zone: Zone) -> Bias {
    match (zone, node.wall) {
        (Zone::FarZone, _)       => Bias::Neutral,
        (_, WallType::CallWall)  => Bias::Bearish,
        (_, WallType::PutWall)   => Bias::Bullish,
    }
}

// ─── Input / Output ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusInput {
    pub price:        f64,
    pub sma_20:       Option<f64>,
    pub sma_50:       Option<f64>,
    pub rsi_14:       Option<f64>,
    pub volume_ratio: f64,
    pub zone:         Zone,
    pub node:         KingNode,
    /// Extra percentage points, e.g. from a recent migration
    pub boost:        f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub name:   String,
    pub points: u32,
    pub max:    u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusScore {
    pub points:         u32,
    pub max:            u32,
    /// `points / max` as a percentage plus any boost, capped at 100
    pub confidence_pct: f64,
    pub bias:           Bias,
    pub breakdown:      Vec<SubScore>,
}

impl ConsensusScore {
    pub fn passes(&self, min_points: u32) -> bool {
        self.points >= min_points
    }
}

// ─── Sub-scores ──────────────────────────────────────────────────────────────

fn trend_points(price: f64, sma_20: Option<f64>, sma_50: Option<f64>) -> u32 {
    match (sma_20, sma_50) {
        (Some(m20), Some(m50)) => {
            let aligned = (price > m20 && m20 > m50) || (price < m20 && m20 < m50);
            if aligned { 50 } else if (price - m20).abs() / m20 > 0.005 { 30 } else { 15 }
        }
        (Some(m20), None) if (price - m20).abs() / m20 > 0.005 => 30,
        _ => 20,
    }
}

fn momentum_points(rsi: Option<f64>, bias: Bias) -> u32 {
    let Some(rsi) = rsi else { return 20 };
    match bias {
        Bias::Bearish => match rsi {
            r if r >= 70.0 => 50,
            r if r >= 60.0 => 35,
            r if r >= 40.0 => 20,
            _ => 10,
        },
        Bias::Bullish => match rsi {
            r if r <= 30.0 => 50,
            r if r <= 40.0 => 35,
            r if r <= 60.0 => 20,
            _ => 10,
        },
        Bias::Neutral => 20,
    }
}

fn participation_points(volume_ratio: f64) -> u32 {
    match volume_ratio {
        v if v >= 2.0 => 50,
        v if v >= 1.5 => 40,
        v if v >= 1.0 => 30,
        v if v >= 0.8 => 20,
        _ => 10,
    }
}

fn proximity_points(zone: Zone) -> u32 {
    match zone {
        Zone::AtNode         => 75,
        Zone::RejectionZone  => 65,
        Zone::CautionZone    => 45,
        Zone::GatekeeperZone => 25,
        Zone::FarZone        => 0,
    }
}

fn strength_points(strength: f64) -> u32 {
    match strength {
        s if s >= 50.0 => 50,
        s if s >= 35.0 => 40,
        s if s >= 20.0 => 25,
        _ => 10,
    }
}

// ─── Score ───────────────────────────────────────────────────────────────────

fn sub(name: &str, points: u32, max: u32) -> SubScore {
    SubScore { name: name.to_string(), points, max }
}

pub fn score(input: &ConsensusInput) -> ConsensusScore {
    let bias = node_bias(&input.node, input.zone);

    let breakdown = vec![
        sub("trend",         trend_points(input.price, input.sma_20, input.sma_50), 50),
        sub("momentum",      momentum_points(input.rsi_14, bias),                    50),
        sub("participation", participation_points(input.volume_ratio),              50),
        sub("proximity",     proximity_points(input.zone),                           75),
        sub("node_strength", strength_points(input.node.strength),                   50),
    ];

    let points: u32 = breakdown.iter().map(|s| s.points).sum();
    let boost = if input.boost.is_finite() { input.boost.max(0.0) } else { 0.0 };
    let confidence_pct = (points as f64 / MAX_POINTS as f64 * 100.0 + boost).min(100.0);

    ConsensusScore { points, max: MAX_POINTS, confidence_pct, bias, breakdown }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
