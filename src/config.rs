//! # config — read Config from Environment Variables
//!
//! `.env` is loaded by `main` through `dotenvy`; everything here reads plain
//! env vars with defaults.  A value that is present but unparsable is an error
//! (so a typo in `.env` does not silently fall back to a default).
//!
//! | Variable                  | Default                  |
//! |---------------------------|--------------------------|
//! | `MARKET_PROVIDER`         | `mock` (no key) / `polygon` |
//! | `MARKET_API_KEY`          | —                        |
//! | `MARKET_BASE_URL`         | provider default         |
//! | `SYMBOLS`                 | `SPX,SPY,QQQ,IWM,NDX`    |
//! | `SCAN_INTERVAL_SECS`      | `60`                     |
//! | `ASSET_DELAY_MS`          | `1500`                   |
//! | `ZONE_TABLE`              | `unified`                |
//! | `SIZING_CONFIDENCE_ORDER` | `before_clamp`           |
//! | `TOUCH_TOLERANCE`         | `2.0`                    |
//! | `MIGRATION_LATERAL_BAND`  | `0.0` (off)              |
//! | `MIN_CONSENSUS_SCORE`     | `165` (of 275)           |
//! | `SESSION_DIR`             | `.spx`                   |
//! | `BIND_ADDR`               | `0.0.0.0:3000`           |
//! | `API_KEY`                 | unset (monitor API open) |
//!
//! Discord settings live in [`crate::alert::discord::DiscordConfig`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::alert::discord::DiscordConfig;
use crate::engine::sizing::ConfidenceOrder;
use crate::engine::tracker::TrackerConfig;
use crate::engine::zone::ZoneTable;
use crate::market::RetryPolicy;

pub const DEFAULT_SYMBOLS: &str = "SPX,SPY,QQQ,IWM,NDX";

/// Market-data backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketProvider {
    Polygon,
    AlphaVantage,
    /// Synthetic data, no network
    Mock,
}

impl std::fmt::Display for MarketProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketProvider::Polygon      => write!(f, "Polygon"),
            MarketProvider::AlphaVantage => write!(f, "AlphaVantage"),
            MarketProvider::Mock         => write!(f, "Mock"),
        }
    }
}

impl FromStr for MarketProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "polygon"                        => Ok(MarketProvider::Polygon),
            "alphavantage" | "alpha_vantage" => Ok(MarketProvider::AlphaVantage),
            "mock"                           => Ok(MarketProvider::Mock),
            other => bail!("Unknown MARKET_PROVIDER: '{other}'. Use 'polygon', 'alphavantage' or 'mock'"),
        }
    }
}

/// Everything the scanner, alerting and monitor API need
#[derive(Debug, Clone)]
pub struct Config {
    pub provider:         MarketProvider,
    pub api_key:          Option<String>,
    /// Override of the provider's base URL (tests / proxies)
    pub market_base_url:  Option<String>,
    pub market_retry:     RetryPolicy,
    pub symbols:          Vec<String>,
    /// Sleep between scan cycles
    pub scan_interval:    Duration,
    /// Sleep between assets inside one cycle (rate limit)
    pub asset_delay:      Duration,
    pub zone_table:       ZoneTable,
    pub confidence_order: ConfidenceOrder,
    pub tracker:          TrackerConfig,
    /// Consensus gate for sizing alerts (out of 275)
    pub min_consensus:    u32,
    pub discord:          DiscordConfig,
    pub session_dir:      PathBuf,
    pub bind_addr:        String,
    /// `X-API-Key` required by the monitor API; `None` = dev mode
    pub monitor_api_key:  Option<String>,
}

impl Default for Config {
    /// Mock provider, no Discord, every other value at its documented default
    fn default() -> Self {
        Self {
            provider:         MarketProvider::Mock,
            api_key:          None,
            market_base_url:  None,
            market_retry:     RetryPolicy::default(),
            symbols:          parse_symbols(DEFAULT_SYMBOLS),
            scan_interval:    Duration::from_secs(60),
            asset_delay:      Duration::from_millis(1500),
            zone_table:       ZoneTable::default(),
            confidence_order: ConfidenceOrder::default(),
            tracker:          TrackerConfig::default(),
            min_consensus:    165,
            discord:          DiscordConfig::default(),
            session_dir:      PathBuf::from(".spx"),
            bind_addr:        "0.0.0.0:3000".to_string(),
            monitor_api_key:  None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("MARKET_API_KEY").ok().filter(|k| !k.trim().is_empty());

        let provider = match std::env::var("MARKET_PROVIDER") {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ if api_key.is_some()        => MarketProvider::Polygon,
            _                             => MarketProvider::Mock,
        };
        if provider != MarketProvider::Mock && api_key.is_none() {
            bail!("MARKET_API_KEY environment variable is required for {provider}");
        }

        let symbols = parse_symbols(
            &std::env::var("SYMBOLS").unwrap_or_else(|_| DEFAULT_SYMBOLS.to_string()),
        );
        if symbols.is_empty() {
            bail!("SYMBOLS must list at least one symbol");
        }

        let zone_table = env_parse::<ZoneTable>("ZONE_TABLE", ZoneTable::default())?;
        let confidence_order =
            env_parse::<ConfidenceOrder>("SIZING_CONFIDENCE_ORDER", ConfidenceOrder::default())?;

        let tracker = TrackerConfig {
            touch_tolerance: env_parse("TOUCH_TOLERANCE", 2.0)?,
            lateral_band:    env_parse("MIGRATION_LATERAL_BAND", 0.0)?,
        };
        validate_tracker(&tracker)?;

        Ok(Self {
            provider,
            api_key,
            market_base_url:  std::env::var("MARKET_BASE_URL").ok().filter(|u| !u.is_empty()),
            market_retry:     RetryPolicy::default(),
            symbols,
            scan_interval:    Duration::from_secs(env_parse("SCAN_INTERVAL_SECS", 60)?),
            asset_delay:      Duration::from_millis(env_parse("ASSET_DELAY_MS", 1500)?),
            zone_table,
            confidence_order,
            tracker,
            min_consensus:    env_parse("MIN_CONSENSUS_SCORE", 165)?,
            discord:          DiscordConfig::from_env()?,
            session_dir:      PathBuf::from(std::env::var("SESSION_DIR").unwrap_or_else(|_| ".spx".to_string())),
            bind_addr:        std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            monitor_api_key:  std::env::var("API_KEY").ok().filter(|k| !k.trim().is_empty()),
        })
    }

    /// CLI `--symbols` wins over `SYMBOLS`
    pub fn with_symbols(mut self, symbols: Option<&str>) -> Self {
        if let Some(list) = symbols {
            let parsed = parse_symbols(list);
            if !parsed.is_empty() {
                self.symbols = parsed;
            }
        }
        self
    }
}

/// `"spx, qqq,,SPY"` → `["SPX", "QQQ", "SPY"]`, duplicates dropped, order kept.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for s in raw.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()) {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

/// Rejects tolerances that would silently disable touch or migration logic.
fn validate_tracker(tracker: &TrackerConfig) -> anyhow::Result<()> {
    if !tracker.touch_tolerance.is_finite() || tracker.touch_tolerance <= 0.0 {
        bail!("TOUCH_TOLERANCE must be a positive number, got {}", tracker.touch_tolerance);
    }
    if !tracker.lateral_band.is_finite() || tracker.lateral_band < 0.0 {
        bail!("MIGRATION_LATERAL_BAND must be zero or a positive number, got {}", tracker.lateral_band);
    }
    Ok(())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("{key} has an invalid value: '{v}'")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        assert_eq!(parse_symbols("spx, qqq,,SPY,spx"), vec!["SPX", "QQQ", "SPY"]);
        assert!(parse_symbols(" , ").is_empty());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("Polygon".parse::<MarketProvider>().unwrap(), MarketProvider::Polygon);
        assert_eq!("alpha_vantage".parse::<MarketProvider>().unwrap(), MarketProvider::AlphaVantage);
        assert!("bloomberg".parse::<MarketProvider>().is_err());
    }

    #[test]
    fn test_tracker_tolerances_must_be_finite() {
        let ok = TrackerConfig { touch_tolerance: 2.0, lateral_band: 0.0 };
        assert!(validate_tracker(&ok).is_ok());

        for bad in [
            TrackerConfig { touch_tolerance: f64::NAN, ..ok },
            TrackerConfig { touch_tolerance: f64::INFINITY, ..ok },
            TrackerConfig { touch_tolerance: 0.0, ..ok },
            TrackerConfig { lateral_band: f64::NAN, ..ok },
            TrackerConfig { lateral_band: -1.0, ..ok },
        ] {
            assert!(validate_tracker(&bad).is_err(), "{bad:?} should be rejected");
        }

        // "NaN" parses as an f64, so the check has to happen after parsing
        std::env::set_var("KINGNODE_TEST_NAN_TOLERANCE", "NaN");
        let parsed: f64 = env_parse("KINGNODE_TEST_NAN_TOLERANCE", 2.0).unwrap();
        assert!(validate_tracker(&TrackerConfig { touch_tolerance: parsed, ..ok }).is_err());
    }

    #[test]
    fn test_env_parse_reports_key() {
        std::env::set_var("KINGNODE_TEST_BAD_NUMBER", "sixty");
        let err = env_parse::<u64>("KINGNODE_TEST_BAD_NUMBER", 60).unwrap_err();
        assert!(format!("{err:#}").contains("KINGNODE_TEST_BAD_NUMBER"));
        assert_eq!(env_parse::<u64>("KINGNODE_TEST_UNSET_NUMBER", 60).unwrap(), 60);
    }
}
