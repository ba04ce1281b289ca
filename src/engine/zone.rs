//! # engine::zone
//!
//! **Zone Classifier** — bucket the distance between price and the king node
//! strike into a named zone.  The zone picks the base position size.
//!
//! ```text
//!  distance (points)   0    2        5          10               25
//!  Unified             |  REJECTION  | CAUTION  |   GATEKEEPER    |  FAR ...
//!  Split               |AT |REJECTION| CAUTION  |   GATEKEEPER    |  FAR ...
//! ```
//!
//! Every bucket is half-open (`[low, high)`), so integer distances 0–4 land in
//! REJECTION, 5–9 in CAUTION, 10–24 in GATEKEEPER and 25+ in FAR.

use serde::{Deserialize, Serialize};

// ─── Zone ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    AtNode,
    RejectionZone,
    CautionZone,
    GatekeeperZone,
    FarZone,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::AtNode         => "AT_NODE",
            Zone::RejectionZone  => "REJECTION_ZONE",
            Zone::CautionZone    => "CAUTION_ZONE",
            Zone::GatekeeperZone => "GATEKEEPER_ZONE",
            Zone::FarZone        => "FAR_ZONE",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Zone {
    type Err = String;

    /// Accepts `REJECTION_ZONE`, `rejection_zone`, `rejection`, `at-node` …
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase().replace('-', "_");
        let norm = norm.strip_suffix("_ZONE").unwrap_or(&norm);
        match norm {
            "AT_NODE" | "AT"  => Ok(Zone::AtNode),
            "REJECTION"       => Ok(Zone::RejectionZone),
            "CAUTION"         => Ok(Zone::CautionZone),
            "GATEKEEPER"      => Ok(Zone::GatekeeperZone),
            "FAR"             => Ok(Zone::FarZone),
            _ => Err(format!("unknown zone '{s}'")),
        }
    }
}

// ─── Threshold Tables ────────────────────────────────────────────────────────

/// Which boundary set to classify with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneTable {
    /// REJECTION starts at 0 — no AT_NODE bucket.
    #[default]
    Unified,
    /// AT_NODE below 2 points, REJECTION from 2.
    Split,
}

impl std::str::FromStr for ZoneTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unified" => Ok(ZoneTable::Unified),
            "split"   => Ok(ZoneTable::Split),
            other => Err(format!("unknown zone table '{other}' (use 'unified' or 'split')")),
        }
    }
}

const AT_NODE_MAX:    f64 = 2.0;
const REJECTION_MAX:  f64 = 5.0;
const CAUTION_MAX:    f64 = 10.0;
const GATEKEEPER_MAX: f64 = 25.0;

// ─── Classifier ──────────────────────────────────────────────────────────────

/// Classify `price` against the node `strike`.  Total over all inputs: a
/// non-finite distance is treated as infinitely far.
pub fn classify_zone(price: f64, strike: f64, table: ZoneTable) -> Zone {
    classify_distance((price - strike).abs(), table)
}

pub fn classify_distance(distance: f64, table: ZoneTable) -> Zone {
    if !distance.is_finite() {
        return Zone::FarZone;
    }
    let d = distance.abs();

    if table == ZoneTable::Split && d < AT_NODE_MAX {
        Zone::AtNode
    } else if d < REJECTION_MAX {
        Zone::RejectionZone
    } else if d < CAUTION_MAX {
        Zone::CautionZone
    } else if d < GATEKEEPER_MAX {
        Zone::GatekeeperZone
    } else {
        Zone::FarZone
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_integer_boundaries() {
        for d in 0..=4 {
            assert_eq!(classify_distance(d as f64, ZoneTable::Unified), Zone::RejectionZone, "d={d}");
        }
        for d in 5..=9 {
            assert_eq!(classify_distance(d as f64, ZoneTable::Unified), Zone::CautionZone, "d={d}");
        }
        for d in 10..=24 {
            assert_eq!(classify_distance(d as f64, ZoneTable::Unified), Zone::GatekeeperZone, "d={d}");
        }
        for d in [25, 26, 100, 5000] {
            assert_eq!(classify_distance(d as f64, ZoneTable::Unified), Zone::FarZone, "d={d}");
        }
    }

    #[test]
    fn test_fractional_distances_use_half_open_buckets() {
        assert_eq!(classify_distance(4.99, ZoneTable::Unified), Zone::RejectionZone);
        assert_eq!(classify_distance(9.5, ZoneTable::Unified), Zone::CautionZone);
        assert_eq!(classify_distance(24.75, ZoneTable::Unified), Zone::GatekeeperZone);
    }

    #[test]
    fn test_split_table_adds_at_node() {
        assert_eq!(classify_distance(0.0, ZoneTable::Split), Zone::AtNode);
        assert_eq!(classify_distance(1.9, ZoneTable::Split), Zone::AtNode);
        assert_eq!(classify_distance(2.0, ZoneTable::Split), Zone::RejectionZone);
        assert_eq!(classify_distance(4.0, ZoneTable::Split), Zone::RejectionZone);
        assert_eq!(classify_distance(5.0, ZoneTable::Split), Zone::CautionZone);
    }

    #[test]
    fn test_price_side_does_not_matter() {
        assert_eq!(classify_zone(5800.0, 5807.0, ZoneTable::Unified), Zone::CautionZone);
        assert_eq!(classify_zone(5814.0, 5807.0, ZoneTable::Unified), Zone::CautionZone);
    }

    #[test]
    fn test_non_finite_is_far() {
        assert_eq!(classify_zone(f64::NAN, 5800.0, ZoneTable::Unified), Zone::FarZone);
        assert_eq!(classify_zone(f64::INFINITY, 5800.0, ZoneTable::Split), Zone::FarZone);
    }

    #[test]
    fn test_zone_parse() {
        assert_eq!("REJECTION_ZONE".parse::<Zone>(), Ok(Zone::RejectionZone));
        assert_eq!("gatekeeper".parse::<Zone>(), Ok(Zone::GatekeeperZone));
        assert_eq!("at-node".parse::<Zone>(), Ok(Zone::AtNode));
        assert!("nowhere".parse::<Zone>().is_err());
    }
}
