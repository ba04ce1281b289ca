//! # models::market
//!
//! Provider-neutral market data: the underlying snapshot used for scoring and
//! the option contracts the king node is derived from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Daily-bar summary of one underlying.
///
/// `closes` is oldest-first and always ends with the bar `price` came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol:     String,
    pub price:      f64,
    /// Volume of the latest bar
    pub volume:     f64,
    /// Mean volume of the bars before the latest one
    pub avg_volume: f64,
    pub closes:     Vec<f64>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Call,
    Put,
}

/// One option contract from a chain snapshot — only the fields the scanner uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike:        f64,
    pub contract_type: ContractType,
    pub open_interest: f64,
    pub volume:        f64,
}
