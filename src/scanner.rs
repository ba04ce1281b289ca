//! # scanner — Sequential Scan Loop
//!
//! One cycle walks the symbol list in order:
//!
//! ```text
//!  fetch snapshot + chain ─▶ derive king node ─▶ tracker.observe
//!        │                                         │
//!        │                          Migrated ──▶ log · broadcast · #migrations
//!        ▼
//!  zone · indicators · consensus (+ migration boost) ─▶ position size
//!        │
//!        ▼
//!  AssetReport ─▶ session + broadcast ─▶ gate passed & not Far? ─▶ #signals
//! ```
//!
//! A failing asset is logged, broadcast and counted; the cycle moves on.
//! After the last asset the health snapshot is updated and the session is
//! written to disk.

use std::collections::HashMap;
use std::future::Future;

use anyhow::{anyhow, Context};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::alert::{self, CHANNEL_MIGRATIONS, CHANNEL_SIGNALS};
use crate::engine::consensus::{self, ConsensusInput};
use crate::engine::indicators::{rsi, sma, volume_ratio};
use crate::engine::king_node::derive_king_node;
use crate::engine::sizing::{calculate_position_size, SizingInput};
use crate::engine::tracker::Observation;
use crate::engine::zone::{classify_zone, Zone};
use crate::events::ScanEvent;
use crate::models::AssetReport;
use crate::state::{ScanHealth, SharedState};

// ─── Signal De-duplication ───────────────────────────────────────────────────

/// Remembers the last (strike, zone) a signal went out for, per asset, so a
/// setup is alerted once rather than every cycle it persists.
#[derive(Debug, Default)]
pub struct SignalGate {
    last: HashMap<String, (i64, Zone)>,
}

impl SignalGate {
    /// `true` when `report` should produce a signal alert now.
    pub fn check(&mut self, report: &AssetReport, min_points: u32) -> bool {
        if !report.consensus.passes(min_points) || report.zone == Zone::FarZone {
            // setup gone: the next qualifying cycle alerts again
            self.last.remove(&report.symbol);
            return false;
        }
        let key = ((report.node.strike * 100.0).round() as i64, report.zone);
        self.last.insert(report.symbol.clone(), key) != Some(key)
    }
}

// ─── Scanner ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub cycle:   u64,
    pub reports: Vec<AssetReport>,
    pub failed:  Vec<String>,
}

pub struct Scanner {
    state:   SharedState,
    signals: SignalGate,
}

impl Scanner {
    pub fn new(state: SharedState) -> Self {
        Self { state, signals: SignalGate::default() }
    }

    /// Scan every configured symbol once.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let cycle   = self.state.session.read().await.cycles + 1;
        let symbols = self.state.config.symbols.clone();

        info!(cycle, assets = symbols.len(), "🔄 Scan cycle started");
        self.state.broadcast(&ScanEvent::CycleStarted { cycle, symbols: symbols.clone() });

        let mut outcome = CycleOutcome { cycle, ..Default::default() };

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.state.config.asset_delay.is_zero() {
                tokio::time::sleep(self.state.config.asset_delay).await;
            }
            match self.scan_asset(symbol).await {
                Ok(report) => outcome.reports.push(report),
                Err(e) => {
                    warn!(symbol = %symbol, error = %format!("{e:#}"), "⚠️ Asset scan failed");
                    self.state.broadcast(&ScanEvent::AssetFailed {
                        symbol: symbol.clone(),
                        error:  format!("{e:#}"),
                    });
                    outcome.failed.push(symbol.clone());
                }
            }
        }

        self.finish_cycle(&outcome, symbols.len()).await;
        outcome
    }

    async fn finish_cycle(&self, outcome: &CycleOutcome, attempted: usize) {
        let health = ScanHealth {
            cycle:         outcome.cycle,
            attempted:     attempted as u32,
            succeeded:     outcome.reports.len() as u32,
            failed_assets: outcome.failed.clone(),
            completed_at:  Some(Utc::now()),
        };

        info!(
            cycle      = outcome.cycle,
            succeeded  = health.succeeded,
            attempted  = health.attempted,
            health_pct = health.health_pct().unwrap_or(0.0),
            "✅ Scan cycle complete"
        );

        *self.state.health.write().await = health.clone();
        self.state.broadcast(&ScanEvent::CycleCompleted { health });

        let snapshot = {
            let mut session = self.state.session.write().await;
            session.cycles     = outcome.cycle;
            session.updated_at = Utc::now();
            session.clone()
        };
        if let Err(e) = self.state.store.save(&snapshot).await {
            error!(error = %e, "❌ Failed to save session");
        }
    }

    /// Fetch, derive, track and score one asset.
    pub async fn scan_asset(&mut self, symbol: &str) -> anyhow::Result<AssetReport> {
        let config = self.state.config.clone();

        // ── 1. Market data ───────────────────────────────────────────────────
        let snapshot = self
            .state
            .market
            .fetch_snapshot(symbol)
            .await
            .with_context(|| format!("fetching {symbol} bars"))?;
        let chain = self
            .state
            .market
            .fetch_chain(symbol)
            .await
            .with_context(|| format!("fetching {symbol} options chain"))?;

        // ── 2. King node ─────────────────────────────────────────────────────
        let node = derive_king_node(&chain, snapshot.price)
            .ok_or_else(|| anyhow!("options chain for {symbol} has no open interest"))?;
        let price = snapshot.price;

        // ── 3. Touch / migration tracking ────────────────────────────────────
        let observation = self
            .state
            .session
            .write()
            .await
            .tracker
            .observe(symbol, node, price, snapshot.fetched_at);

        let touch_count = observation.touch_count();
        let mut migration = None;
        match observation {
            Observation::Migrated(event) => {
                self.state.broadcast(&ScanEvent::NodeMigrated { migration: Box::new(event.clone()) });
                self.state.alerts.notify(CHANNEL_MIGRATIONS, &alert::migration_alert(&event)).await;
                migration = Some(event);
            }
            Observation::Tracking { touched: true, touch_count } => {
                self.state.broadcast(&ScanEvent::NodeTouched {
                    symbol: symbol.to_string(),
                    strike: node.strike,
                    price,
                    touch_count,
                });
            }
            _ => {}
        }

        // ── 4. Zone · indicators · consensus ─────────────────────────────────
        let zone   = classify_zone(price, node.strike, config.zone_table);
        let sma_20 = sma(&snapshot.closes, 20);
        let sma_50 = sma(&snapshot.closes, 50);
        let rsi_14 = rsi(&snapshot.closes, 14);
        let vol_r  = volume_ratio(snapshot.volume, snapshot.avg_volume);
        // a migration boosts only the cycle that detected it
        let boost  = migration.as_ref().map_or(0.0, |e| e.confidence_boost);

        let consensus = consensus::score(&ConsensusInput {
            price,
            sma_20,
            sma_50,
            rsi_14,
            volume_ratio: vol_r,
            zone,
            node,
            boost,
        });

        // ── 5. Position size ─────────────────────────────────────────────────
        let size = calculate_position_size(
            &SizingInput {
                zone,
                volume_ratio:       vol_r,
                touch_count,
                king_node_strength: node.strength,
                base_confidence:    consensus.confidence_pct,
            },
            config.confidence_order,
        );

        let report = AssetReport {
            symbol:       symbol.to_string(),
            price,
            node,
            distance:     node.distance(price),
            zone,
            touch_count,
            sma_20,
            sma_50,
            rsi_14,
            volume_ratio: vol_r,
            consensus,
            size,
            migration,
            scanned_at:   Utc::now(),
        };

        info!(
            symbol    = %symbol,
            price,
            node      = %node,
            zone      = %zone,
            touches   = touch_count,
            consensus = report.consensus.points,
            size_pct  = report.size.percentage,
            "📊 Asset scanned"
        );

        self.state
            .session
            .write()
            .await
            .last_results
            .insert(symbol.to_string(), report.clone());
        self.state.broadcast(&ScanEvent::AssetScanned { report: Box::new(report.clone()) });

        // ── 6. Signal alert ──────────────────────────────────────────────────
        if self.signals.check(&report, config.min_consensus) {
            self.state.alerts.notify(CHANNEL_SIGNALS, &alert::signal_alert(&report)).await;
        }

        Ok(report)
    }

    /// Cycle until `shutdown` resolves, then flush the session.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = &mut shutdown => break,
            }
            tokio::select! {
                _ = tokio::time::sleep(self.state.config.scan_interval) => {}
                _ = &mut shutdown => break,
            }
        }

        info!("🛑 Shutdown requested — flushing session");
        let snapshot = {
            let mut session = self.state.session.write().await;
            session.updated_at = Utc::now();
            session.clone()
        };
        if let Err(e) = self.state.store.save(&snapshot).await {
            error!(error = %e, "❌ Failed to flush session on shutdown");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{Config, MarketProvider};
    use crate::engine::tracker::TrackerConfig;
    use crate::market::RetryPolicy;
    use crate::session::{SessionFile, SessionStore};
    use crate::state::build_state;

    fn mock_config(dir: &std::path::Path, symbols: &[&str]) -> Config {
        Config {
            symbols:     symbols.iter().map(|s| s.to_string()).collect(),
            asset_delay: Duration::ZERO,
            session_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_cycle_scans_all_assets_and_saves_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = build_state(mock_config(dir.path(), &["SPX", "SPY"]), SessionFile::new(TrackerConfig::default()));
        let mut scanner = Scanner::new(state.clone());

        let outcome = scanner.run_cycle().await;
        assert_eq!(outcome.cycle, 1);
        assert_eq!(outcome.reports.len(), 2);
        assert!(outcome.failed.is_empty());

        for r in &outcome.reports {
            assert!((0.3..=2.0).contains(&r.size.percentage));
            assert_eq!(r.consensus.max, 275);
        }

        let health = state.health.read().await.clone();
        assert_eq!(health.health_pct(), Some(100.0));

        let saved = SessionStore::new(dir.path()).load().await.unwrap().unwrap();
        assert_eq!(saved.cycles, 1);
        assert_eq!(saved.last_results.len(), 2);
        assert!(saved.tracker.get("SPX").is_some());

        let second = scanner.run_cycle().await;
        assert_eq!(second.cycle, 2);
    }

    #[tokio::test]
    async fn test_failed_asset_does_not_abort_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let config = Config {
            provider:        MarketProvider::Polygon,
            api_key:         Some("k".into()),
            market_base_url: Some(dead),
            market_retry:    RetryPolicy {
                attempts:     1,
                base_timeout: Duration::from_millis(200),
                timeout_step: Duration::ZERO,
                delay:        Duration::ZERO,
            },
            ..mock_config(dir.path(), &["SPY", "QQQ"])
        };
        let state = build_state(config, SessionFile::new(TrackerConfig::default()));
        let mut rx = state.broadcast_tx.subscribe();
        let mut scanner = Scanner::new(state.clone());

        let outcome = scanner.run_cycle().await;
        assert!(outcome.reports.is_empty());
        assert_eq!(outcome.failed, vec!["SPY", "QQQ"]);
        assert_eq!(state.health.read().await.health_pct(), Some(0.0));

        let mut failed_events = 0;
        while let Ok(msg) = rx.try_recv() {
            if msg.contains("ASSET_FAILED") {
                failed_events += 1;
            }
        }
        assert_eq!(failed_events, 2);
    }

    #[tokio::test]
    async fn test_run_until_flushes_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let state = build_state(mock_config(dir.path(), &["IWM"]), SessionFile::new(TrackerConfig::default()));
        let mut scanner = Scanner::new(state);

        scanner.run_until(async {}).await;
        assert!(SessionStore::new(dir.path()).load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_migration_is_alerted_and_boosts_confidence() {
        use std::sync::{Arc, Mutex};

        use axum::{extract::State, routing::post, Json, Router};
        use serde_json::Value;

        use crate::alert::discord::DiscordConfig;
        use crate::engine::consensus::MAX_POINTS;
        use crate::engine::tracker::{MigrationDirection, Significance};
        use crate::models::{KingNode, WallType};

        let bodies: Arc<Mutex<Vec<Value>>> = Arc::default();
        let app = Router::new()
            .route("/migrations", post(|State(bodies): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                bodies.lock().unwrap().push(body);
                axum::http::StatusCode::NO_CONTENT
            }))
            .with_state(bodies.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let hook = format!("http://{}/migrations", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            discord: DiscordConfig {
                webhooks: [(CHANNEL_MIGRATIONS.to_string(), hook)].into_iter().collect(),
                ..DiscordConfig::default()
            },
            ..mock_config(dir.path(), &["SPX"])
        };

        // the mock SPX chain peaks at 5805 (call wall); start the session on 5700
        let mut session = SessionFile::new(TrackerConfig::default());
        session.tracker.observe("SPX", KingNode::new(5700.0, WallType::CallWall, 30.0), 5790.0, Utc::now());

        let state = build_state(config, session);
        let mut rx = state.broadcast_tx.subscribe();
        let mut scanner = Scanner::new(state.clone());

        let outcome = scanner.run_cycle().await;
        let report = &outcome.reports[0];
        let event = report.migration.as_ref().expect("migration recorded on the report");
        assert_eq!(event.old_node.strike, 5700.0);
        assert_eq!(event.new_node.strike, 5805.0);
        assert_eq!(event.direction, MigrationDirection::Upward);
        // 105 / 5700 = 1.84 %
        assert_eq!(event.significance, Significance::High);
        assert_eq!(report.touch_count, 0);

        let unboosted = report.consensus.points as f64 / MAX_POINTS as f64 * 100.0;
        assert!((report.consensus.confidence_pct - (unboosted + 10.0).min(100.0)).abs() < 1e-9);

        let mut migrated_events = 0;
        while let Ok(msg) = rx.try_recv() {
            if msg.contains("NODE_MIGRATED") {
                migrated_events += 1;
            }
        }
        assert_eq!(migrated_events, 1);

        {
            let sent = bodies.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert!(sent[0]["embeds"][0]["title"].as_str().unwrap().contains("SPX King Node Migration"));
        }
        assert_eq!(state.session.read().await.tracker.get("SPX").unwrap().history.len(), 1);

        // same node next cycle: no migration, no boost
        let second = scanner.run_cycle().await;
        let report = &second.reports[0];
        assert!(report.migration.is_none());
        let unboosted = report.consensus.points as f64 / MAX_POINTS as f64 * 100.0;
        assert!((report.consensus.confidence_pct - unboosted).abs() < 1e-9);
        assert_eq!(bodies.lock().unwrap().len(), 1);
    }

    fn report_with(zone: Zone, strike: f64, points: u32) -> AssetReport {
        let mut r = crate::models::report::sample_report();
        r.zone = zone;
        r.node.strike = strike;
        r.consensus.points = points;
        r
    }

    #[test]
    fn test_signal_gate_dedupes_per_strike_and_zone() {
        let mut gate = SignalGate::default();
        assert!(gate.check(&report_with(Zone::RejectionZone, 5805.0, 200), 165));
        assert!(!gate.check(&report_with(Zone::RejectionZone, 5805.0, 210), 165));
        assert!(gate.check(&report_with(Zone::AtNode, 5805.0, 210), 165));
        assert!(gate.check(&report_with(Zone::AtNode, 5810.0, 210), 165));
    }

    #[test]
    fn test_signal_gate_rearms_after_setup_fades() {
        let mut gate = SignalGate::default();
        assert!(gate.check(&report_with(Zone::CautionZone, 580.0, 170), 165));
        assert!(!gate.check(&report_with(Zone::CautionZone, 580.0, 120), 165));
        assert!(gate.check(&report_with(Zone::CautionZone, 580.0, 170), 165));
        assert!(!gate.check(&report_with(Zone::FarZone, 580.0, 270), 165));
    }
}
