//! # market — Market Data Fetcher
//!
//! Pull daily bars and an options chain snapshot for one underlying.
//!
//! ## Data Sources (select with `MARKET_PROVIDER`)
//! 1. Polygon       — `/v2/aggs/.../range/1/day` + `/v3/snapshot/options/{T}`
//! 2. AlphaVantage  — `TIME_SERIES_DAILY` + `REALTIME_OPTIONS`
//! 3. Mock          — synthetic data for dev (no API key needed)
//!
//! ## Retry
//! Every GET goes through [`RetryPolicy`]: a fixed number of attempts, a
//! timeout that grows with each attempt, and a fixed pause between attempts.
//! Network errors, 5xx and 429 are retried; any other status fails at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, MarketProvider};
use crate::models::{ContractType, MarketSnapshot, OptionContract};

const POLYGON_BASE_URL:      &str = "https://api.polygon.io";
const ALPHAVANTAGE_BASE_URL: &str = "https://www.alphavantage.co";

/// Bars requested per asset — enough for SMA50 and RSI14
const BAR_LOOKBACK_DAYS: i64 = 120;
/// Bars averaged for `avg_volume`
const AVG_VOLUME_BARS: usize = 20;
/// Polygon's page-size ceiling for `/v3/snapshot/options`
const CHAIN_PAGE_LIMIT: u32 = 250;
/// Pages followed via `next_url` before the chain is cut off
pub const MAX_CHAIN_PAGES: u32 = 40;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Market API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered 200 with an error / rate-limit note in the body
    #[error("Market API error: {0}")]
    Provider(String),

    #[error("Failed to parse market response: {0}")]
    Parse(String),

    #[error("No market data for {0}")]
    NoData(String),

    #[error("Market API gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl MarketError {
    fn is_retryable(&self) -> bool {
        match self {
            MarketError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            MarketError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// ─── Retry Policy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts:     u32,
    /// Timeout for the first attempt
    pub base_timeout: Duration,
    /// Added to the timeout on every further attempt
    pub timeout_step: Duration,
    /// Pause between attempts
    pub delay:        Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts:     3,
            base_timeout: Duration::from_secs(5),
            timeout_step: Duration::from_secs(5),
            delay:        Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is 0-based
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout + self.timeout_step * attempt
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct MarketClient {
    client:   reqwest::Client,
    provider: MarketProvider,
    api_key:  String,
    base_url: String,
    retry:    RetryPolicy,
    /// Advances the mock price path on every snapshot
    mock_tick: AtomicU64,
}

impl MarketClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        let default_base = match config.provider {
            MarketProvider::AlphaVantage => ALPHAVANTAGE_BASE_URL,
            _                            => POLYGON_BASE_URL,
        };
        Self {
            client,
            provider:  config.provider,
            api_key:   config.api_key.clone().unwrap_or_default(),
            base_url:  config
                .market_base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            retry:     config.market_retry,
            mock_tick: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> MarketProvider {
        self.provider
    }

    pub async fn fetch_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, MarketError> {
        match self.provider {
            MarketProvider::Polygon => {
                let to   = Utc::now().date_naive();
                let from = to - chrono::Duration::days(BAR_LOOKBACK_DAYS);
                let url  = format!(
                    "{}/v2/aggs/ticker/{}/range/1/day/{from}/{to}?adjusted=true&sort=asc&limit=120&apiKey={}",
                    self.base_url,
                    polygon_ticker(symbol),
                    self.api_key,
                );
                let body = self.get_json(&url).await?;
                parse_polygon_bars(symbol, &body)
            }
            MarketProvider::AlphaVantage => {
                let url = format!(
                    "{}/query?function=TIME_SERIES_DAILY&symbol={symbol}&outputsize=compact&apikey={}",
                    self.base_url, self.api_key,
                );
                let body = self.get_json(&url).await?;
                parse_alphavantage_daily(symbol, &body)
            }
            MarketProvider::Mock => {
                let tick = self.mock_tick.fetch_add(1, Ordering::Relaxed);
                Ok(mock_snapshot(symbol, tick))
            }
        }
    }

    pub async fn fetch_chain(&self, symbol: &str) -> Result<Vec<OptionContract>, MarketError> {
        match self.provider {
            MarketProvider::Polygon => self.fetch_polygon_chain(symbol).await,
            MarketProvider::AlphaVantage => {
                let url = format!(
                    "{}/query?function=REALTIME_OPTIONS&symbol={symbol}&apikey={}",
                    self.base_url, self.api_key,
                );
                let body = self.get_json(&url).await?;
                parse_alphavantage_options(&body)
            }
            MarketProvider::Mock => Ok(mock_chain(symbol)),
        }
    }

    /// Walks `next_url` so the king node is ranked over every expiry and
    /// strike, not just the first page.
    async fn fetch_polygon_chain(&self, symbol: &str) -> Result<Vec<OptionContract>, MarketError> {
        let mut url = format!(
            "{}/v3/snapshot/options/{symbol}?limit={CHAIN_PAGE_LIMIT}&apiKey={}",
            self.base_url, self.api_key,
        );
        let mut chain = Vec::new();

        for page in 1..=MAX_CHAIN_PAGES {
            let body = self.get_json(&url).await?;
            chain.extend(parse_polygon_chain(&body)?);

            let Some(next) = polygon_next_url(&body) else {
                debug!(symbol, pages = page, contracts = chain.len(), "Options chain fetched");
                return Ok(chain);
            };
            url = with_api_key(next, &self.api_key);
        }

        warn!(
            symbol,
            pages     = MAX_CHAIN_PAGES,
            contracts = chain.len(),
            "⚠️ Options chain truncated at page limit"
        );
        Ok(chain)
    }

    /// GET + JSON decode under the retry policy
    async fn get_json(&self, url: &str) -> Result<Value, MarketError> {
        let attempts = self.retry.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let timeout = self.retry.timeout_for(attempt);
            match self.get_once(url, timeout).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() => {
                    warn!(
                        attempt  = attempt + 1,
                        attempts,
                        timeout  = ?timeout,
                        error    = %e,
                        "⚠️ Market request failed — retrying"
                    );
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(MarketError::RetriesExhausted { attempts, last_error })
    }

    async fn get_once(&self, url: &str, timeout: Duration) -> Result<Value, MarketError> {
        debug!(url = %redact(url), ?timeout, "GET market data");

        let resp = self.client.get(url).timeout(timeout).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(MarketError::Status { status, body });
        }

        resp.json::<Value>().await.map_err(|e| MarketError::Parse(e.to_string()))
    }
}

/// Keep API keys out of the logs
fn redact(url: &str) -> String {
    match url.find("apiKey=").or_else(|| url.find("apikey=")) {
        Some(i) => format!("{}apiKey=***", &url[..i]),
        None => url.to_string(),
    }
}

/// Polygon's `next_url` carries the cursor but not the key.
fn with_api_key(url: &str, api_key: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}apiKey={api_key}")
}

fn polygon_next_url(body: &Value) -> Option<&str> {
    body.get("next_url").and_then(Value::as_str).filter(|u| !u.is_empty())
}

/// Polygon serves cash indices under the `I:` prefix
fn polygon_ticker(symbol: &str) -> String {
    match symbol {
        "SPX" | "NDX" | "RUT" | "VIX" | "XSP" => format!("I:{symbol}"),
        _ => symbol.to_string(),
    }
}

// ─── Parsers ─────────────────────────────────────────────────────────────────

/// Build a snapshot from oldest-first closes/volumes.
fn snapshot_from_bars(symbol: &str, closes: Vec<f64>, volumes: &[f64]) -> Result<MarketSnapshot, MarketError> {
    let (Some(&price), Some(&volume)) = (closes.last(), volumes.last()) else {
        return Err(MarketError::NoData(symbol.to_string()));
    };

    let prior = &volumes[..volumes.len() - 1];
    let window = &prior[prior.len().saturating_sub(AVG_VOLUME_BARS)..];
    let avg_volume = if window.is_empty() {
        0.0
    } else {
        window.iter().sum::<f64>() / window.len() as f64
    };

    Ok(MarketSnapshot {
        symbol: symbol.to_string(),
        price,
        volume,
        avg_volume,
        closes,
        fetched_at: Utc::now(),
    })
}

fn num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn provider_error(body: &Value) -> Option<String> {
    ["Error Message", "Note", "Information", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str).map(str::to_string))
}

pub fn parse_polygon_bars(symbol: &str, body: &Value) -> Result<MarketSnapshot, MarketError> {
    if body.get("status").and_then(Value::as_str) == Some("ERROR") {
        return Err(MarketError::Provider(provider_error(body).unwrap_or_else(|| "unknown".into())));
    }
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| MarketError::NoData(symbol.to_string()))?;

    let mut closes  = Vec::with_capacity(results.len());
    let mut volumes = Vec::with_capacity(results.len());
    for bar in results {
        let (Some(c), Some(v)) = (bar.get("c").and_then(num), bar.get("v").and_then(num)) else {
            return Err(MarketError::Parse(format!("bar without c/v: {bar}")));
        };
        closes.push(c);
        volumes.push(v);
    }
    snapshot_from_bars(symbol, closes, &volumes)
}

pub fn parse_alphavantage_daily(symbol: &str, body: &Value) -> Result<MarketSnapshot, MarketError> {
    let Some(series) = body.get("Time Series (Daily)").and_then(Value::as_object) else {
        return Err(match provider_error(body) {
            Some(msg) => MarketError::Provider(msg),
            None      => MarketError::NoData(symbol.to_string()),
        });
    };

    // keys are ISO dates, so lexical order is chronological
    let mut days: Vec<(&String, &Value)> = series.iter().collect();
    days.sort_by(|a, b| a.0.cmp(b.0));

    let mut closes  = Vec::with_capacity(days.len());
    let mut volumes = Vec::with_capacity(days.len());
    for (day, bar) in days {
        let (Some(c), Some(v)) = (bar.get("4. close").and_then(num), bar.get("5. volume").and_then(num)) else {
            return Err(MarketError::Parse(format!("bar {day} without close/volume")));
        };
        closes.push(c);
        volumes.push(v);
    }
    snapshot_from_bars(symbol, closes, &volumes)
}

fn contract_type(raw: &str) -> Option<ContractType> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "call" | "c" => Some(ContractType::Call),
        "put"  | "p" => Some(ContractType::Put),
        _ => None,
    }
}

pub fn parse_polygon_chain(body: &Value) -> Result<Vec<OptionContract>, MarketError> {
    if body.get("status").and_then(Value::as_str) == Some("ERROR") {
        return Err(MarketError::Provider(provider_error(body).unwrap_or_else(|| "unknown".into())));
    }
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| MarketError::Parse("options snapshot without results".into()))?;

    Ok(results
        .iter()
        .filter_map(|r| {
            let details = r.get("details")?;
            Some(OptionContract {
                strike:        details.get("strike_price").and_then(num)?,
                contract_type: contract_type(details.get("contract_type")?.as_str()?)?,
                open_interest: r.get("open_interest").and_then(num).unwrap_or(0.0),
                volume:        r.get("day").and_then(|d| d.get("volume")).and_then(num).unwrap_or(0.0),
            })
        })
        .collect())
}

pub fn parse_alphavantage_options(body: &Value) -> Result<Vec<OptionContract>, MarketError> {
    let Some(data) = body.get("data").and_then(Value::as_array) else {
        return Err(match provider_error(body) {
            Some(msg) => MarketError::Provider(msg),
            None      => MarketError::Parse("options response without data".into()),
        });
    };

    Ok(data
        .iter()
        .filter_map(|r| {
            Some(OptionContract {
                strike:        r.get("strike").and_then(num)?,
                contract_type: contract_type(r.get("type")?.as_str()?)?,
                open_interest: r.get("open_interest").and_then(num).unwrap_or(0.0),
                volume:        r.get("volume").and_then(num).unwrap_or(0.0),
            })
        })
        .collect())
}

// ─── Mock Data ───────────────────────────────────────────────────────────────

/// (reference price, strike step) per symbol
fn mock_profile(symbol: &str) -> (f64, f64) {
    let table: HashMap<&str, (f64, f64)> = HashMap::from([
        ("SPX", (5800.0, 5.0)),
        ("NDX", (20500.0, 25.0)),
        ("SPY", (580.0, 1.0)),
        ("QQQ", (500.0, 1.0)),
        ("IWM", (220.0, 1.0)),
    ]);
    table.get(symbol).copied().unwrap_or((100.0, 1.0))
}

/// Price oscillates around the mock king node so touches and zone changes
/// show up after a few cycles.
fn mock_snapshot(symbol: &str, tick: u64) -> MarketSnapshot {
    let (base, step) = mock_profile(symbol);
    let swing = step * 4.0;

    let closes: Vec<f64> = (0..60u64)
        .map(|i| base + swing * ((i + tick) as f64 * 0.45).sin())
        .collect();
    let volumes: Vec<f64> = (0..60u64)
        .map(|i| 1_000_000.0 * (1.0 + 0.5 * ((i + tick) as f64 * 0.3).cos()))
        .collect();

    snapshot_from_bars(symbol, closes, &volumes).unwrap_or_else(|_| flat_snapshot(symbol, base))
}

fn flat_snapshot(symbol: &str, base: f64) -> MarketSnapshot {
    MarketSnapshot {
        symbol:     symbol.to_string(),
        price:      base,
        volume:     0.0,
        avg_volume: 0.0,
        closes:     vec![base],
        fetched_at: Utc::now(),
    }
}

fn mock_chain(symbol: &str) -> Vec<OptionContract> {
    let (base, step) = mock_profile(symbol);
    let king = base + step;

    (-10..=10)
        .flat_map(|i| {
            let strike = base + step * i as f64;
            let peak   = 1.0 / (1.0 + ((strike - king) / step).powi(2));
            [
                OptionContract {
                    strike,
                    contract_type: ContractType::Call,
                    open_interest: (20_000.0 * peak).round() + 500.0,
                    volume:        (4_000.0 * peak).round(),
                },
                OptionContract {
                    strike,
                    contract_type: ContractType::Put,
                    open_interest: (8_000.0 * peak).round() + 500.0,
                    volume:        (1_500.0 * peak).round(),
                },
            ]
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
