//! # alert — Alert Formatting
//!
//! [`Alert`] is the transport-neutral message; [`discord`] turns it into a
//! webhook embed and delivers it.  The formatters here build the four alerts
//! the scanner and CLI send:
//!
//! | Formatter           | Channel      | When                                  |
//! |---------------------|--------------|---------------------------------------|
//! | [`migration_alert`] | `migrations` | king node replaced by a new strike    |
//! | [`signal_alert`]    | `signals`    | consensus gate passed, zone not Far   |
//! | [`summary_alert`]   | `default`    | end of a scan cycle (CLI `--once`)    |
//! | [`test_alert`]      | any          | `kingnode alert <channel>`            |

pub mod discord;

use serde::{Deserialize, Serialize};

use crate::engine::tracker::{MigrationDirection, MigrationEvent, Significance};
use crate::engine::zone::Zone;
use crate::models::{AssetReport, WallType};

pub const CHANNEL_DEFAULT:    &str = "default";
pub const CHANNEL_SIGNALS:    &str = "signals";
pub const CHANNEL_MIGRATIONS: &str = "migrations";

// ─── Alert ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    #[default]
    Info,
    /// Actionable setup
    Signal,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Discord embed colour
    pub fn color(&self) -> u32 {
        match self {
            AlertLevel::Info     => 0x3498DB,
            AlertLevel::Signal   => 0x2ECC71,
            AlertLevel::Warning  => 0xF39C12,
            AlertLevel::Critical => 0xE74C3C,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertField {
    pub name:   String,
    pub value:  String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub title:   String,
    pub message: String,
    pub level:   AlertLevel,
    pub fields:  Vec<AlertField>,
}

impl Alert {
    pub fn new(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { title: title.into(), message: message.into(), level, fields: Vec::new() }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(AlertField { name: name.into(), value: value.into(), inline: true });
        self
    }

    pub fn wide_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(AlertField { name: name.into(), value: value.into(), inline: false });
        self
    }
}

// ─── Formatters ──────────────────────────────────────────────────────────────

fn direction_label(d: MigrationDirection) -> &'static str {
    match d {
        MigrationDirection::Upward   => "⬆️ UPWARD",
        MigrationDirection::Downward => "⬇️ DOWNWARD",
        MigrationDirection::Lateral  => "↔️ LATERAL",
        MigrationDirection::Reversal => "🔄 REVERSAL",
    }
}

fn significance_label(s: Significance) -> &'static str {
    match s {
        Significance::Low    => "LOW",
        Significance::Medium => "MEDIUM",
        Significance::High   => "HIGH",
    }
}

pub fn migration_alert(event: &MigrationEvent) -> Alert {
    let level = match event.significance {
        Significance::High => AlertLevel::Warning,
        _                  => AlertLevel::Info,
    };
    Alert::new(
        level,
        format!("🔀 {} King Node Migration", event.asset),
        format!(
            "King node moved {:.2} → {:.2} ({} → {})",
            event.old_node.strike, event.new_node.strike, event.old_node.wall, event.new_node.wall,
        ),
    )
    .field("Direction", direction_label(event.direction))
    .field("Significance", significance_label(event.significance))
    .field("Confidence Boost", format!("+{:.0}%", event.confidence_boost))
    .field("Archived Touches", event.archived_touches.to_string())
    .field("New Strength", format!("{:.1}%", event.new_node.strength))
}

fn setup_label(report: &AssetReport) -> &'static str {
    match (report.node.wall, report.zone) {
        (_, Zone::FarZone)            => "No setup",
        (WallType::CallWall, _)       => "📉 Rejection at call wall",
        (WallType::PutWall, _)        => "📈 Bounce at put wall",
    }
}

pub fn signal_alert(report: &AssetReport) -> Alert {
    let mut alert = Alert::new(
        AlertLevel::Signal,
        format!("🎯 {} — {}", report.symbol, report.zone),
        format!(
            "{} | price {:.2} is {:.2} pts from {}",
            setup_label(report), report.price, report.distance, report.node,
        ),
    )
    .field("Position Size", format!("{:.2}%", report.size.percentage))
    .field("Consensus", format!("{}/{} ({:.0}%)", report.consensus.points, report.consensus.max, report.consensus.confidence_pct))
    .field("Touches", report.touch_count.to_string())
    .field("Volume Ratio", format!("{:.2}x", report.volume_ratio));

    if let Some(rsi) = report.rsi_14 {
        alert = alert.field("RSI 14", format!("{rsi:.1}"));
    }
    alert.wide_field("Sizing", report.size.reasoning.clone())
}

/// End-of-cycle digest: one line per scanned asset plus failures.
pub fn summary_alert(cycle: u64, reports: &[AssetReport], failed: &[String]) -> Alert {
    let level = if failed.is_empty() { AlertLevel::Info } else { AlertLevel::Warning };

    let mut lines: Vec<String> = reports
        .iter()
        .map(|r| {
            format!(
                "**{}** {:.2} | node {:.2} {} | {} | {:.2}%",
                r.symbol, r.price, r.node.strike, r.node.wall, r.zone, r.size.percentage,
            )
        })
        .collect();
    if reports.is_empty() {
        lines.push("No assets scanned".to_string());
    }

    let mut alert = Alert::new(level, format!("📊 Scan Cycle #{cycle}"), lines.join("\n"))
        .field("Scanned", reports.len().to_string())
        .field("Failed", failed.len().to_string());
    if !failed.is_empty() {
        alert = alert.wide_field("Failed Assets", failed.join(", "));
    }
    alert
}

pub fn test_alert(channel: &str, message: Option<&str>) -> Alert {
    Alert::new(
        AlertLevel::Info,
        "🧪 Test Alert",
        message.unwrap_or("Webhook delivery check").to_string(),
    )
    .field("Channel", channel)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::report::sample_report;
    use crate::models::KingNode;

    fn report(zone: Zone, wall: WallType) -> AssetReport {
        let mut r = sample_report();
        r.zone = zone;
        r.node.wall = wall;
        r
    }

    #[test]
    fn test_signal_alert_fields() {
        let a = signal_alert(&report(Zone::RejectionZone, WallType::CallWall));
        assert_eq!(a.level, AlertLevel::Signal);
        assert!(a.title.contains("SPX"));
        assert!(a.message.contains("call wall"));
        assert!(a.fields.iter().any(|f| f.name == "Position Size" && f.value == "1.62%"));
        assert!(a.fields.iter().any(|f| f.name == "RSI 14"));
        assert!(!a.fields.last().unwrap().inline);
    }

    #[test]
    fn test_migration_alert_level_follows_significance() {
        let event = MigrationEvent {
            asset:            "SPY".into(),
            old_node:         KingNode::new(580.0, WallType::CallWall, 30.0),
            new_node:         KingNode::new(585.0, WallType::CallWall, 35.0),
            direction:        MigrationDirection::Upward,
            significance:     Significance::High,
            confidence_boost: 10.0,
            archived_touches: 2,
            detected_at:      Utc::now(),
        };
        let a = migration_alert(&event);
        assert_eq!(a.level, AlertLevel::Warning);
        assert!(a.message.contains("580.00 → 585.00"));
        assert!(a.fields.iter().any(|f| f.value == "+10%"));
    }

    #[test]
    fn test_summary_alert_lists_failures() {
        let ok = summary_alert(3, &[report(Zone::CautionZone, WallType::PutWall)], &[]);
        assert_eq!(ok.level, AlertLevel::Info);
        assert!(ok.message.contains("**SPX**"));

        let bad = summary_alert(4, &[], &["QQQ".into()]);
        assert_eq!(bad.level, AlertLevel::Warning);
        assert!(bad.fields.iter().any(|f| f.name == "Failed Assets" && f.value == "QQQ"));
    }

    #[test]
    fn test_level_colors_distinct() {
        let colors = [AlertLevel::Info, AlertLevel::Signal, AlertLevel::Warning, AlertLevel::Critical]
            .map(|l| l.color());
        for (i, a) in colors.iter().enumerate() {
            assert!(colors[i + 1..].iter().all(|b| a != b));
        }
    }
}
