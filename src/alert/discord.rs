//! # alert::discord — Discord Webhook Sender
//!
//! Delivers an [`Alert`] as a rich embed to a named webhook channel.
//!
//! ## Channels
//! - `DISCORD_WEBHOOK_URL`  → channel `default`
//! - `DISCORD_WEBHOOKS`     → `signals=https://…,migrations=https://…`
//!
//! An unknown channel key falls back to `default`; with no webhook at all
//! every send fails with [`AlertError::NotConfigured`].
//!
//! ## Retry
//! At most `max_attempts` POSTs per alert.  Network errors and 5xx back off
//! exponentially from `initial_backoff` (×2, capped at 30 s); 429 waits for
//! `retry-after` (capped).  Any other 4xx fails immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::bail;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{Alert, AlertLevel, CHANNEL_DEFAULT};
use crate::config::env_parse;

const DEFAULT_USERNAME:   &str = "King Node Monitor";
const BACKOFF_MULTIPLIER: u32 = 2;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DiscordConfig {
    /// channel key → webhook URL
    pub webhooks:        HashMap<String, String>,
    /// Mentioned on signal / critical alerts
    pub mention_user_id: Option<String>,
    pub username:        String,
    pub max_attempts:    u32,
    pub initial_backoff: Duration,
    pub max_backoff:     Duration,
    /// Upper bound on a 429 `retry-after` wait
    pub max_retry_after: Duration,
    pub request_timeout: Duration,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhooks:        HashMap::new(),
            mention_user_id: None,
            username:        DEFAULT_USERNAME.to_string(),
            max_attempts:    3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff:     Duration::from_secs(30),
            max_retry_after: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl DiscordConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut webhooks = match std::env::var("DISCORD_WEBHOOKS") {
            Ok(raw) => parse_webhooks(&raw)?,
            Err(_)  => HashMap::new(),
        };
        if let Some(url) = std::env::var("DISCORD_WEBHOOK_URL").ok().filter(|u| !u.trim().is_empty()) {
            webhooks.insert(CHANNEL_DEFAULT.to_string(), url.trim().to_string());
        }

        let max_attempts: u32 = env_parse("ALERT_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            bail!("ALERT_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            webhooks,
            mention_user_id: std::env::var("DISCORD_MENTION_USER_ID").ok().filter(|s| !s.trim().is_empty()),
            max_attempts,
            initial_backoff: Duration::from_millis(env_parse("ALERT_BACKOFF_MS", 1000)?),
            ..Default::default()
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.webhooks.is_empty()
    }

    /// `(channel actually used, url)`
    pub fn resolve(&self, channel: &str) -> Result<(&str, &str), AlertError> {
        self.webhooks
            .get_key_value(channel)
            .or_else(|| self.webhooks.get_key_value(CHANNEL_DEFAULT))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .ok_or_else(|| AlertError::NotConfigured(channel.to_string()))
    }
}

/// `"signals=https://a, migrations=https://b"` → map.  Empty entries are skipped.
pub fn parse_webhooks(raw: &str) -> anyhow::Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key, url)) = entry.split_once('=') else {
            bail!("DISCORD_WEBHOOKS entry '{entry}' is not in channel=url form");
        };
        let (key, url) = (key.trim().to_lowercase(), url.trim());
        if key.is_empty() || url.is_empty() {
            bail!("DISCORD_WEBHOOKS entry '{entry}' has an empty channel or url");
        }
        out.insert(key, url.to_string());
    }
    Ok(out)
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("No Discord webhook configured for channel '{0}'")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl AlertError {
    fn is_retryable(&self) -> bool {
        match self {
            AlertError::Http(_) | AlertError::RateLimited(_) => true,
            AlertError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WebhookPayload {
    username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content:  Option<String>,
    embeds:   Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title:       String,
    description: String,
    color:       u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields:      Vec<EmbedField>,
    timestamp:   String,
    footer:      EmbedFooter,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name:   String,
    value:  String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

// ─── Sender ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub channel:  String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub sent:   u64,
    pub failed: u64,
}

pub struct DiscordSender {
    client: reqwest::Client,
    config: DiscordConfig,
    sent:   AtomicU64,
    failed: AtomicU64,
}

impl DiscordSender {
    pub fn new(client: reqwest::Client, config: DiscordConfig) -> Self {
        Self { client, config, sent: AtomicU64::new(0), failed: AtomicU64::new(0) }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats {
            sent:   self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn build_payload(&self, alert: &Alert) -> WebhookPayload {
        let content = match (&self.config.mention_user_id, alert.level) {
            (Some(id), AlertLevel::Signal | AlertLevel::Critical) => Some(format!("<@{id}>")),
            _ => None,
        };

        WebhookPayload {
            username: self.config.username.clone(),
            content,
            embeds: vec![Embed {
                title:       alert.title.clone(),
                description: alert.message.clone(),
                color:       alert.level.color(),
                fields:      alert
                    .fields
                    .iter()
                    .map(|f| EmbedField { name: f.name.clone(), value: f.value.clone(), inline: f.inline })
                    .collect(),
                timestamp:   Utc::now().to_rfc3339(),
                footer:      EmbedFooter { text: DEFAULT_USERNAME.to_string() },
            }],
        }
    }

    /// Deliver `alert` to `channel`, retrying per [`DiscordConfig`].
    pub async fn send(&self, channel: &str, alert: &Alert) -> Result<DeliveryReport, AlertError> {
        let (resolved, url) = match self.config.resolve(channel) {
            Ok(r) => r,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        let payload = self.build_payload(alert);

        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.send_once(url, &payload).await {
                Ok(()) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    debug!(channel = resolved, attempt, "📨 Discord alert delivered");
                    return Ok(DeliveryReport { channel: resolved.to_string(), attempts: attempt });
                }
                Err(e) if e.is_retryable() => {
                    last_error = e.to_string();
                    if attempt == max_attempts {
                        break;
                    }
                    let wait = match &e {
                        AlertError::RateLimited(d) => (*d).min(self.config.max_retry_after),
                        _ => backoff,
                    };
                    warn!(
                        channel = resolved,
                        attempt,
                        max_attempts,
                        error = %last_error,
                        "⚠️ Discord send failed — retrying in {wait:?}"
                    );
                    tokio::time::sleep(wait).await;
                    if !matches!(e, AlertError::RateLimited(_)) {
                        backoff = (backoff * BACKOFF_MULTIPLIER).min(self.config.max_backoff);
                    }
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    error!(channel = resolved, error = %e, "❌ Discord rejected alert");
                    return Err(e);
                }
            }
        }

        self.failed.fetch_add(1, Ordering::Relaxed);
        error!(channel = resolved, attempts = max_attempts, error = %last_error, "❌ Discord alert dropped");
        Err(AlertError::RetriesExhausted { attempts: max_attempts, last_error })
    }

    /// Fire-and-log variant for the scan loop: a failing alert never
    /// interrupts a cycle.
    pub async fn notify(&self, channel: &str, alert: &Alert) {
        if !self.is_configured() {
            debug!(channel, title = %alert.title, "Discord not configured — alert skipped");
            return;
        }
        if let Ok(report) = self.send(channel, alert).await {
            info!(channel = %report.channel, attempts = report.attempts, "📣 {}", alert.title);
        }
    }

    async fn send_once(&self, url: &str, payload: &WebhookPayload) -> Result<(), AlertError> {
        let response = self
            .client
            .post(url)
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<f64>().ok())
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .map(|d| d.min(self.config.max_retry_after))
                .unwrap_or(self.config.initial_backoff);
            return Err(AlertError::RateLimited(retry_after));
        }

        let body = response.text().await.unwrap_or_default();
        Err(AlertError::Status { status: status.as_u16(), body })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::State,
        http::{HeaderMap, HeaderValue, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::Value;

    use super::*;
    use crate::alert::test_alert;

    #[derive(Default)]
    struct Hook {
        hits:   AtomicU32,
        bodies: Mutex<Vec<Value>>,
    }

    async fn spawn_hook(script: Vec<StatusCode>) -> (String, Arc<Hook>) {
        spawn_hook_with_retry_after(script, "0.01").await
    }

    /// Answers with `script[n]` for hit `n`, repeating the last entry.
    /// 429 responses carry `retry-after: <retry_after>`.
    async fn spawn_hook_with_retry_after(
        script: Vec<StatusCode>,
        retry_after: &'static str,
    ) -> (String, Arc<Hook>) {
        let hook = Arc::new(Hook::default());
        let script = Arc::new(script);
        let app = Router::new()
            .route(
                "/hook",
                post(move |State(hook): State<Arc<Hook>>, Json(body): Json<Value>| {
                    let script = script.clone();
                    async move {
                        let n = hook.hits.fetch_add(1, Ordering::SeqCst) as usize;
                        hook.bodies.lock().unwrap().push(body);
                        let status = script[n.min(script.len() - 1)];
                        let mut headers = HeaderMap::new();
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            headers.insert("retry-after", HeaderValue::from_static(retry_after));
                        }
                        (status, headers)
                    }
                }),
            )
            .with_state(hook.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), hook)
    }

    fn fast_config(webhooks: &[(&str, &str)]) -> DiscordConfig {
        DiscordConfig {
            webhooks:        webhooks.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            initial_backoff: Duration::from_millis(1),
            max_backoff:     Duration::from_millis(4),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_webhooks() {
        let map = parse_webhooks("Signals=https://a/1, migrations=https://b/2,").unwrap();
        assert_eq!(map.get("signals").map(String::as_str), Some("https://a/1"));
        assert_eq!(map.len(), 2);
        assert!(parse_webhooks("signals").is_err());
        assert!(parse_webhooks("=https://a").is_err());
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let cfg = fast_config(&[("default", "https://d"), ("signals", "https://s")]);
        assert_eq!(cfg.resolve("signals").unwrap(), ("signals", "https://s"));
        assert_eq!(cfg.resolve("migrations").unwrap(), ("default", "https://d"));

        let empty = fast_config(&[]);
        assert!(matches!(empty.resolve("signals"), Err(AlertError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_delivers_embed_on_first_attempt() {
        let (url, hook) = spawn_hook(vec![StatusCode::NO_CONTENT]).await;
        let mut cfg = fast_config(&[("signals", url.as_str())]);
        cfg.mention_user_id = Some("42".into());
        let sender = DiscordSender::new(reqwest::Client::new(), cfg);

        let mut alert = test_alert("signals", Some("hello"));
        alert.level = AlertLevel::Signal;
        let report = sender.send("signals", &alert).await.unwrap();

        assert_eq!(report, DeliveryReport { channel: "signals".into(), attempts: 1 });
        assert_eq!(sender.stats(), AlertStats { sent: 1, failed: 0 });

        let bodies = hook.bodies.lock().unwrap();
        assert_eq!(bodies[0]["content"], "<@42>");
        assert_eq!(bodies[0]["embeds"][0]["description"], "hello");
        assert_eq!(bodies[0]["embeds"][0]["color"], AlertLevel::Signal.color());
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let (url, hook) = spawn_hook(vec![StatusCode::BAD_GATEWAY, StatusCode::NO_CONTENT]).await;
        let sender = DiscordSender::new(reqwest::Client::new(), fast_config(&[("default", url.as_str())]));

        let report = sender.send("signals", &test_alert("signals", None)).await.unwrap();
        assert_eq!(report.channel, "default");
        assert_eq!(report.attempts, 2);
        assert_eq!(hook.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let (url, hook) = spawn_hook(vec![StatusCode::INTERNAL_SERVER_ERROR]).await;
        let sender = DiscordSender::new(reqwest::Client::new(), fast_config(&[("default", url.as_str())]));

        let err = sender.send("default", &test_alert("default", None)).await.unwrap_err();
        assert!(matches!(err, AlertError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(hook.hits.load(Ordering::SeqCst), 3);
        assert_eq!(sender.stats(), AlertStats { sent: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let (url, hook) = spawn_hook(vec![StatusCode::TOO_MANY_REQUESTS, StatusCode::OK]).await;
        let sender = DiscordSender::new(reqwest::Client::new(), fast_config(&[("default", url.as_str())]));

        let report = sender.send("default", &test_alert("default", None)).await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(hook.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_retry_after_is_capped() {
        let (url, hook) =
            spawn_hook_with_retry_after(vec![StatusCode::TOO_MANY_REQUESTS, StatusCode::OK], "1e20").await;
        let mut cfg = fast_config(&[("default", url.as_str())]);
        cfg.max_retry_after = Duration::from_millis(10);
        let sender = DiscordSender::new(reqwest::Client::new(), cfg);

        let report = sender.send("default", &test_alert("default", None)).await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(hook.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unparseable_retry_after_gives_up_cleanly() {
        let (url, hook) = spawn_hook_with_retry_after(vec![StatusCode::TOO_MANY_REQUESTS], "NaN").await;
        let mut cfg = fast_config(&[("default", url.as_str())]);
        cfg.max_attempts = 1;
        let sender = DiscordSender::new(reqwest::Client::new(), cfg);

        let err = sender.send("default", &test_alert("default", None)).await.unwrap_err();
        assert!(matches!(err, AlertError::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(hook.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, hook) = spawn_hook(vec![StatusCode::NOT_FOUND]).await;
        let sender = DiscordSender::new(reqwest::Client::new(), fast_config(&[("default", url.as_str())]));

        let err = sender.send("default", &test_alert("default", None)).await.unwrap_err();
        assert!(matches!(err, AlertError::Status { status: 404, .. }));
        assert_eq!(hook.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_failure_exhausts_attempts() {
        // bind then drop so the port refuses connections
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/hook");
        let mut cfg = fast_config(&[("default", url.as_str())]);
        cfg.max_attempts = 4;
        let sender = DiscordSender::new(reqwest::Client::new(), cfg);

        let err = sender.send("default", &test_alert("default", None)).await.unwrap_err();
        match err {
            AlertError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("HTTP error"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_configured_counts_failure() {
        let sender = DiscordSender::new(reqwest::Client::new(), fast_config(&[]));
        let err = sender.send("signals", &test_alert("signals", None)).await.unwrap_err();
        assert!(matches!(err, AlertError::NotConfigured(_)));
        assert_eq!(sender.stats().failed, 1);
    }
}
