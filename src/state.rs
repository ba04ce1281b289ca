//! # state
//!
//! Shared state for the scan loop and the monitor API.
//!
//! The scan task is the only writer of `session` (tracker + last reports)
//! and `health`; handlers take read locks and clone out what they need.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::alert::discord::DiscordSender;
use crate::config::Config;
use crate::events::ScanEvent;
use crate::market::MarketClient;
use crate::session::{SessionFile, SessionStore};

const BROADCAST_CAPACITY: usize = 256;

// ─── Scan Health ─────────────────────────────────────────────────────────────

/// Outcome of the most recent completed cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanHealth {
    pub cycle:         u64,
    pub attempted:     u32,
    pub succeeded:     u32,
    pub failed_assets: Vec<String>,
    pub completed_at:  Option<DateTime<Utc>>,
}

impl ScanHealth {
    /// `succeeded / attempted` as a percentage; `None` before the first cycle
    pub fn health_pct(&self) -> Option<f64> {
        (self.attempted > 0).then(|| self.succeeded as f64 / self.attempted as f64 * 100.0)
    }
}

// ─── AppState ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Scanner ──────────────────────────────────────────────────────────────
    /// Tracker, cycle count and last report per asset; persisted after every cycle
    pub session: Arc<RwLock<SessionFile>>,
    pub health:  Arc<RwLock<ScanHealth>>,
    pub store:   SessionStore,

    // ── Outbound ─────────────────────────────────────────────────────────────
    pub market: Arc<MarketClient>,
    pub alerts: Arc<DiscordSender>,

    // ── Monitor / WebSocket ──────────────────────────────────────────────────
    /// Pre-serialized [`ScanEvent`] JSON
    pub broadcast_tx: broadcast::Sender<String>,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, session: SessionFile) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        // one pooled client for market data and webhooks
        let http_client = reqwest::Client::new();

        Self {
            market:       Arc::new(MarketClient::new(http_client.clone(), &config)),
            alerts:       Arc::new(DiscordSender::new(http_client, config.discord.clone())),
            store:        SessionStore::new(config.session_dir.clone()),
            session:      Arc::new(RwLock::new(session)),
            health:       Arc::new(RwLock::new(ScanHealth::default())),
            broadcast_tx,
            started_at:   Utc::now(),
            config:       Arc::new(config),
        }
    }

    /// Broadcast to WebSocket clients; no listener is not an error.
    pub fn broadcast(&self, event: &ScanEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(config: Config, session: SessionFile) -> SharedState {
    Arc::new(AppState::new(config, session))
}
