//! # engine::sizing
//!
//! **Position Size Calculator** — base % per zone × three lookup multipliers
//! × confidence, clamped to `[0.3 %, 2.0 %]`.
//!
//! ```text
//!  zone ──▶ base %
//!  volume_ratio ──▶ ×vol      ┐
//!  touch_count  ──▶ ×touch    ├─▶ product × confidence/100 ──▶ clamp [0.3, 2.0]
//!  strength %   ──▶ ×strength ┘
//! ```
//!
//! Pure function: no I/O, no state.  Out-of-range inputs are pulled back into
//! range and the adjustment is written into `reasoning`.

use serde::{Deserialize, Serialize};

use super::zone::Zone;

pub const MIN_POSITION_PCT: f64 = 0.3;
pub const MAX_POSITION_PCT: f64 = 2.0;

// ─── Lookup Tables ───────────────────────────────────────────────────────────

pub fn zone_base_pct(zone: Zone) -> f64 {
    match zone {
        Zone::AtNode         => 1.50,
        Zone::RejectionZone  => 1.25,
        Zone::CautionZone    => 1.00,
        Zone::GatekeeperZone => 0.75,
        Zone::FarZone        => 0.50,
    }
}

/// `(upper bound exclusive, multiplier)`; anything above the last bound gets `VOLUME_TOP`.
const VOLUME_BREAKS: [(f64, f64); 4] = [(0.8, 0.70), (1.2, 1.00), (2.0, 1.20), (3.0, 1.40)];
const VOLUME_TOP: f64 = 1.50;

const STRENGTH_BREAKS: [(f64, f64); 3] = [(20.0, 0.80), (35.0, 1.00), (50.0, 1.20)];
const STRENGTH_TOP: f64 = 1.40;

pub fn volume_multiplier(volume_ratio: f64) -> f64 {
    if !volume_ratio.is_finite() || volume_ratio <= 0.0 {
        return VOLUME_BREAKS[0].1;
    }
    VOLUME_BREAKS
        .iter()
        .find(|(bound, _)| volume_ratio < *bound)
        .map(|(_, m)| *m)
        .unwrap_or(VOLUME_TOP)
}

/// First retest is the strongest; a node that keeps getting hit is wearing out.
pub fn touch_multiplier(touch_count: u32) -> f64 {
    match touch_count {
        0 => 1.00,
        1 => 1.20,
        2 => 1.10,
        _ => 0.85,
    }
}

pub fn strength_multiplier(strength_pct: f64) -> f64 {
    STRENGTH_BREAKS
        .iter()
        .find(|(bound, _)| strength_pct < *bound)
        .map(|(_, m)| *m)
        .unwrap_or(STRENGTH_TOP)
}

// ─── Confidence Ordering ─────────────────────────────────────────────────────

/// Where confidence scaling happens relative to the 2.0 % cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceOrder {
    /// `clamp(base × mults × conf)`
    #[default]
    BeforeClamp,
    /// `clamp(min(base × mults, 2.0) × conf)`
    AfterCap,
}

impl std::str::FromStr for ConfidenceOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "before_clamp" => Ok(ConfidenceOrder::BeforeClamp),
            "after_cap"    => Ok(ConfidenceOrder::AfterCap),
            other => Err(format!("unknown confidence order '{other}' (use 'before_clamp' or 'after_cap')")),
        }
    }
}

// ─── Input / Output ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingInput {
    pub zone:               Zone,
    pub volume_ratio:       f64,
    pub touch_count:        u32,
    /// 0–100
    pub king_node_strength: f64,
    /// 0–100
    pub base_confidence:    f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSizeResult {
    /// Always within `[MIN_POSITION_PCT, MAX_POSITION_PCT]`
    pub percentage:          f64,
    pub reasoning:           String,
    pub base_pct:            f64,
    pub volume_multiplier:   f64,
    pub touch_multiplier:    f64,
    pub strength_multiplier: f64,
    /// Product before clamping, for display
    pub raw_pct:             f64,
    pub clamped:             bool,
}

// ─── Calculator ──────────────────────────────────────────────────────────────

pub fn calculate_position_size(input: &SizingInput, order: ConfidenceOrder) -> PositionSizeResult {
    let mut notes: Vec<String> = Vec::new();

    let confidence = sanitize_pct(input.base_confidence, "confidence", &mut notes);
    let strength   = sanitize_pct(input.king_node_strength, "strength", &mut notes);
    if !input.volume_ratio.is_finite() || input.volume_ratio <= 0.0 {
        notes.push(format!("volume ratio {} invalid, using lowest bucket", input.volume_ratio));
    }

    let base_pct = zone_base_pct(input.zone);
    let vol_m    = volume_multiplier(input.volume_ratio);
    let touch_m  = touch_multiplier(input.touch_count);
    let str_m    = strength_multiplier(strength);
    let conf     = confidence / 100.0;

    let product = base_pct * vol_m * touch_m * str_m;
    let raw_pct = match order {
        ConfidenceOrder::BeforeClamp => product * conf,
        ConfidenceOrder::AfterCap    => product.min(MAX_POSITION_PCT) * conf,
    };

    let percentage = raw_pct.clamp(MIN_POSITION_PCT, MAX_POSITION_PCT);
    let clamped    = percentage != raw_pct;

    let mut reasoning = format!(
        "{zone}: base {base_pct:.2}% × vol {vol_m:.2} (ratio {ratio:.2}) × touch {touch_m:.2} ({touches} touches) \
         × strength {str_m:.2} ({strength:.1}%) × confidence {confidence:.0}% = {raw_pct:.3}%",
        zone    = input.zone,
        ratio   = input.volume_ratio,
        touches = input.touch_count,
    );
    if clamped {
        reasoning.push_str(&format!(" → clamped to {percentage:.2}%"));
    }
    for note in notes {
        reasoning.push_str("; ");
        reasoning.push_str(&note);
    }

    PositionSizeResult {
        percentage,
        reasoning,
        base_pct,
        volume_multiplier:   vol_m,
        touch_multiplier:    touch_m,
        strength_multiplier: str_m,
        raw_pct,
        clamped,
    }
}

fn sanitize_pct(value: f64, label: &str, notes: &mut Vec<String>) -> f64 {
    if !value.is_finite() {
        notes.push(format!("{label} {value} not finite, using 0"));
        return 0.0;
    }
    let clamped = value.clamp(0.0, 100.0);
    if clamped != value {
        notes.push(format!("{label} {value} outside 0-100, using {clamped}"));
    }
    clamped
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ZONES: [Zone; 5] = [
        Zone::AtNode, Zone::RejectionZone, Zone::CautionZone, Zone::GatekeeperZone, Zone::FarZone,
    ];

    fn input(zone: Zone, vol: f64, touches: u32, strength: f64, conf: f64) -> SizingInput {
        SizingInput {
            zone,
            volume_ratio:       vol,
            touch_count:        touches,
            king_node_strength: strength,
            base_confidence:    conf,
        }
    }

    #[test]
    fn test_max_multipliers_are_capped() {
        // 1.5 × 1.5 × 1.2 × 1.4 = 3.78 before the cap
        let r = calculate_position_size(&input(Zone::AtNode, 5.0, 1, 80.0, 100.0), ConfidenceOrder::BeforeClamp);
        assert_eq!(r.percentage, MAX_POSITION_PCT);
        assert!(r.clamped);
        assert!((r.raw_pct - 3.78).abs() < 1e-9);
        assert!(r.reasoning.contains("clamped"));
    }

    #[test]
    fn test_floor_applies_at_zero_confidence() {
        let r = calculate_position_size(&input(Zone::FarZone, 0.5, 5, 5.0, 0.0), ConfidenceOrder::BeforeClamp);
        assert_eq!(r.percentage, MIN_POSITION_PCT);
        assert!(r.clamped);
    }

    #[test]
    fn test_unclamped_product() {
        // 1.0 × 1.0 × 1.0 × 1.0 × 0.8 = 0.8
        let r = calculate_position_size(&input(Zone::CautionZone, 1.0, 0, 30.0, 80.0), ConfidenceOrder::BeforeClamp);
        assert!((r.percentage - 0.8).abs() < 1e-9);
        assert!(!r.clamped);
    }

    #[test]
    fn test_confidence_order_changes_result() {
        // product 3.78; before_clamp: 3.78 × 0.5 = 1.89, after_cap: 2.0 × 0.5 = 1.0
        let i = input(Zone::AtNode, 5.0, 1, 80.0, 50.0);
        let before = calculate_position_size(&i, ConfidenceOrder::BeforeClamp);
        let after  = calculate_position_size(&i, ConfidenceOrder::AfterCap);
        assert!((before.percentage - 1.89).abs() < 1e-9);
        assert!((after.percentage - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_always_within_bounds() {
        let volumes   = [f64::NAN, -1.0, 0.0, 0.5, 0.8, 1.19, 1.2, 2.5, 3.0, 50.0, f64::INFINITY];
        let strengths = [-10.0, 0.0, 19.9, 20.0, 49.9, 50.0, 100.0, 250.0, f64::NAN];
        let confs     = [-5.0, 0.0, 30.0, 100.0, 400.0, f64::NAN];
        for order in [ConfidenceOrder::BeforeClamp, ConfidenceOrder::AfterCap] {
            for zone in ALL_ZONES {
                for &v in &volumes {
                    for touches in [0, 1, 2, 3, 99] {
                        for &s in &strengths {
                            for &c in &confs {
                                let r = calculate_position_size(&input(zone, v, touches, s, c), order);
                                assert!(
                                    (MIN_POSITION_PCT..=MAX_POSITION_PCT).contains(&r.percentage),
                                    "{zone} v={v} t={touches} s={s} c={c} → {}",
                                    r.percentage
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_inputs_are_noted() {
        let r = calculate_position_size(&input(Zone::CautionZone, -2.0, 0, 140.0, 120.0), ConfidenceOrder::BeforeClamp);
        assert!(r.reasoning.contains("confidence 120 outside 0-100"));
        assert!(r.reasoning.contains("strength 140 outside 0-100"));
        assert!(r.reasoning.contains("volume ratio -2 invalid"));
        assert_eq!(r.strength_multiplier, STRENGTH_TOP);
        assert_eq!(r.volume_multiplier, 0.70);
    }

    #[test]
    fn test_multiplier_breakpoints() {
        assert_eq!(volume_multiplier(0.79), 0.70);
        assert_eq!(volume_multiplier(0.8), 1.00);
        assert_eq!(volume_multiplier(2.0), 1.40);
        assert_eq!(volume_multiplier(3.0), 1.50);
        assert_eq!(strength_multiplier(34.9), 1.00);
        assert_eq!(strength_multiplier(50.0), 1.40);
        assert_eq!(touch_multiplier(3), touch_multiplier(12));
    }
}
