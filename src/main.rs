//! # kingnode — King Node Options Scanner
//!
//! ```text
//!  ┌──────────────┐  bars + chain   ┌──────────────────────────────────────┐
//!  │ Polygon /    │ ──────────────▶ │ Scanner (one task, assets in order)  │
//!  │ AlphaVantage │                 │ ├─ king node  → tracker (touches,    │
//!  └──────────────┘                 │ │               migrations)          │
//!                                   │ ├─ zone · consensus · position size  │
//!  ┌──────────────┐  webhooks       │ └─ session.json after every cycle    │
//!  │ Discord      │ ◀────────────── │                                      │
//!  └──────────────┘                 └──────────────┬───────────────────────┘
//!                                                  │ broadcast
//!  ┌──────────────┐  ws://host/ws/monitor          │
//!  │  Dashboard   │ ◀──────────────────────────────┘
//!  └──────────────┘  GET /api/monitor/*   POST /api/size
//! ```
//!
//! ## Commands
//!
//! | Command                                   | What it does                         |
//! |-------------------------------------------|--------------------------------------|
//! | `scan [--once] [--symbols SPY,QQQ]`       | poll loop (Ctrl-C flushes session)   |
//! | `serve [--symbols …]`                     | poll loop + monitor API              |
//! | `zone <price> <strike> [--split]`         | classify one distance                |
//! | `size <zone> <vol> <touches> <str> <conf>`| position size for one setup          |
//! | `alert <channel> [message]`               | send a test alert                    |
//! | `session`                                 | print the saved session              |

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod alert;
mod auth;
mod config;
mod engine;
mod error;
mod events;
mod market;
mod models;
mod routes;
mod scanner;
mod session;
mod state;

use alert::discord::DiscordSender;
use config::{env_parse, Config};
use engine::sizing::{calculate_position_size, ConfidenceOrder, SizingInput};
use engine::zone::{classify_zone, Zone, ZoneTable};
use scanner::Scanner;
use session::{SessionFile, SessionStore};
use state::build_state;

#[derive(Parser)]
#[command(name = "kingnode")]
#[command(about = "King-node options scanner: dealer-positioning zones, position sizing and Discord alerts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan loop
    Scan {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Comma-separated symbols (overrides SYMBOLS)
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Run the scan loop and the monitor API
    Serve {
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Classify the distance between price and a king node strike
    Zone {
        price: f64,
        strike: f64,
        /// Use the table with a separate AT_NODE bucket
        #[arg(long)]
        split: bool,
    },
    /// Calculate a position size
    Size {
        /// at_node | rejection | caution | gatekeeper | far
        zone: String,
        volume_ratio: f64,
        touches: u32,
        /// King node strength, 0-100
        strength: f64,
        /// Base confidence, 0-100
        confidence: f64,
        /// before_clamp | after_cap (defaults to SIZING_CONFIDENCE_ORDER)
        #[arg(long)]
        order: Option<String>,
    },
    /// Send a test alert to a webhook channel
    Alert {
        channel: String,
        message: Option<String>,
    },
    /// Print the saved session summary
    Session,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ─────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("kingnode=debug".parse()?)
                .add_directive("reqwest=warn".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { once, symbols } => run_scan(once, symbols.as_deref()).await,
        Commands::Serve { symbols } => run_serve(symbols.as_deref()).await,
        Commands::Zone { price, strike, split } => {
            let table = if split { ZoneTable::Split } else { ZoneTable::Unified };
            let zone = classify_zone(price, strike, table);
            println!("{zone}  (distance {:.2} pts, {table:?} table)", (price - strike).abs());
            Ok(())
        }
        Commands::Size { zone, volume_ratio, touches, strength, confidence, order } => {
            let zone: Zone = zone.parse().map_err(anyhow::Error::msg)?;
            let order: ConfidenceOrder = match order {
                Some(o) => o.parse().map_err(anyhow::Error::msg)?,
                None => env_parse("SIZING_CONFIDENCE_ORDER", ConfidenceOrder::default())?,
            };
            let result = calculate_position_size(
                &SizingInput {
                    zone,
                    volume_ratio,
                    touch_count:        touches,
                    king_node_strength: strength,
                    base_confidence:    confidence,
                },
                order,
            );
            println!("Position size: {:.2}%", result.percentage);
            println!("{}", result.reasoning);
            Ok(())
        }
        Commands::Alert { channel, message } => {
            let config = Config::from_env()?;
            let sender = DiscordSender::new(reqwest::Client::new(), config.discord);
            let report = sender
                .send(&channel, &alert::test_alert(&channel, message.as_deref()))
                .await
                .with_context(|| format!("sending test alert to '{channel}'"))?;
            println!("✅ Delivered to '{}' after {} attempt(s)", report.channel, report.attempts);
            Ok(())
        }
        Commands::Session => print_session().await,
    }
}

fn banner(config: &Config) {
    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║             KINGNODE — Options Scanner                ║
  ║   King Node · Zones · Touches · Sizing · Alerts       ║
  ╚═══════════════════════════════════════════════════════╝"#);
    info!(
        provider = %config.provider,
        symbols  = %config.symbols.join(","),
        interval = ?config.scan_interval,
        zones    = ?config.zone_table,
        discord  = config.discord.is_configured(),
        "⚙️ Configuration loaded"
    );
    if !config.discord.is_configured() {
        warn!("⚠️ No Discord webhook configured — alerts will only be logged");
    }
}

/// Resume the saved session if there is one, re-applying the current tracker config.
async fn load_session(config: &Config) -> anyhow::Result<SessionFile> {
    let store = SessionStore::new(config.session_dir.clone());
    let session = match store.load().await.context("loading session")? {
        Some(mut s) => {
            s.tracker.set_config(config.tracker);
            s
        }
        None => {
            info!("🆕 Starting a new session");
            SessionFile::new(config.tracker)
        }
    };
    Ok(session)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "❌ Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn run_scan(once: bool, symbols: Option<&str>) -> anyhow::Result<()> {
    let config = Config::from_env()?.with_symbols(symbols);
    banner(&config);

    let session = load_session(&config).await?;
    let state = build_state(config, session);
    let mut scanner = Scanner::new(state.clone());

    if once {
        let outcome = scanner.run_cycle().await;
        state
            .alerts
            .notify(
                alert::CHANNEL_DEFAULT,
                &alert::summary_alert(outcome.cycle, &outcome.reports, &outcome.failed),
            )
            .await;
        for r in &outcome.reports {
            println!(
                "{:<5} {:>10.2}  node {:>10.2} {:<9}  {:<15}  touches {}  consensus {:>3}/{}  size {:.2}%",
                r.symbol, r.price, r.node.strike, r.node.wall.to_string(), r.zone.to_string(),
                r.touch_count, r.consensus.points, r.consensus.max, r.size.percentage,
            );
        }
        for symbol in &outcome.failed {
            println!("{symbol:<5} FAILED");
        }
        return Ok(());
    }

    scanner.run_until(shutdown_signal()).await;
    Ok(())
}

async fn run_serve(symbols: Option<&str>) -> anyhow::Result<()> {
    let config = Config::from_env()?.with_symbols(symbols);
    banner(&config);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("BIND_ADDR '{}' is not a socket address", config.bind_addr))?;

    let session = load_session(&config).await?;
    let state = build_state(config, session);

    let mut scanner = Scanner::new(state.clone());
    let scan_task = tokio::spawn(async move { scanner.run_until(shutdown_signal()).await });

    let app = routes::router(state);

    info!(?addr, "🚀 Monitor API starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scan_task.await.context("scan task panicked")?;
    Ok(())
}

async fn print_session() -> anyhow::Result<()> {
    let dir = std::env::var("SESSION_DIR").unwrap_or_else(|_| ".spx".to_string());
    let store = SessionStore::new(dir);

    let Some(session) = store.load().await? else {
        println!("No saved session at {}", store.path().display());
        return Ok(());
    };

    println!("Session  {}", session.session_id);
    println!("Started  {}", session.started_at.to_rfc3339());
    println!("Updated  {}", session.updated_at.to_rfc3339());
    println!("Cycles   {}", session.cycles);
    println!();

    let mut assets: Vec<_> = session.tracker.assets().collect();
    assets.sort_by(|a, b| a.0.cmp(b.0));
    for (symbol, track) in assets {
        println!(
            "{symbol:<5} {}  touches {}  migrations {}",
            track.current,
            session.tracker.touch_count(symbol),
            track.history.len(),
        );
        if let Some(r) = session.last_results.get(symbol) {
            println!(
                "      last {:.2} → {} | size {:.2}% | {}",
                r.price, r.zone, r.size.percentage, r.scanned_at.to_rfc3339(),
            );
        }
    }
    Ok(())
}
