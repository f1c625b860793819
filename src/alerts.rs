//! Alert delivery
//!
//! Messages are posted to a chat channel. The id returned for a message can
//! be passed back as `thread` so later messages are grouped under it.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{read_secret, AlertBackend, AlertsConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::model::{AlertTier, MatchResult};

pub const ALERT_HEADER: &str = "*ALERT: Possible entity matches in recent news*";
pub const NO_MATCHES_MESSAGE: &str = "No matches found between news entities and merchant data.";

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Post `text`, optionally as a reply in `thread`. Returns the new message id.
    async fn post(&self, text: &str, thread: Option<&str>) -> MonitorResult<String>;
}

/// Header posted before the links found for one keyword.
pub fn news_header(keyword: &str, days_back: u32) -> String {
    let window = match days_back {
        1 => "the last day".to_string(),
        n => format!("the last {} days", n),
    };
    format!("Top news from {} for '{}':", window, keyword)
}

pub fn news_item(position: usize, url: &str) -> String {
    format!("{}. {}", position, url)
}

/// One surfaced match, as posted in the alert thread.
pub fn match_alert(result: &MatchResult, tier: AlertTier) -> String {
    format!(
        "*Entity:* {} ({})\n*User ID:* {}\n*Merchant Name:* {}\n*Score:* {}% ({} {})",
        result.entity_text,
        result.entity_type.as_code(),
        result.identity_id,
        result.display_name,
        result.score_percent(),
        tier.marker(),
        tier.label()
    )
}

/// Open the configured alert sink.
pub fn open_alert_sink(config: &AlertsConfig) -> anyhow::Result<Arc<dyn AlertSink>> {
    match config.backend {
        AlertBackend::Slack => Ok(Arc::new(SlackAlertSink::from_config(config)?)),
        AlertBackend::Stdout => Ok(Arc::new(StdoutAlertSink::new())),
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API `chat.postMessage`
#[derive(Clone)]
pub struct SlackAlertSink {
    client: reqwest::Client,
    endpoint: String,
    channel: String,
    token: String,
}

impl std::fmt::Debug for SlackAlertSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackAlertSink")
            .field("endpoint", &self.endpoint)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl SlackAlertSink {
    pub fn new(
        endpoint: impl Into<String>,
        channel: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for alerts")?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            channel: channel.into(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &AlertsConfig) -> anyhow::Result<Self> {
        let token = read_secret(&config.token_env)?;
        Self::new(
            config.endpoint.clone(),
            config.channel.clone(),
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl AlertSink for SlackAlertSink {
    async fn post(&self, text: &str, thread: Option<&str>) -> MonitorResult<String> {
        let mut body = json!({
            "channel": &self.channel,
            "text": text,
        });
        if let Some(thread_ts) = thread {
            body["thread_ts"] = json!(thread_ts);
        }

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.endpoint))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| MonitorError::AlertDelivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::AlertDelivery(format!("HTTP {}", status)));
        }

        let parsed: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| MonitorError::AlertDelivery(format!("invalid response: {}", e)))?;

        if !parsed.ok {
            return Err(MonitorError::AlertDelivery(
                parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let preview: String = text.chars().take(50).collect();
        debug!("Posted alert message: {}...", preview);
        Ok(parsed.ts.unwrap_or_default())
    }
}

/// Prints messages to stdout; thread replies are indented.
#[derive(Debug, Default)]
pub struct StdoutAlertSink {
    next_id: AtomicUsize,
}

impl StdoutAlertSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertSink for StdoutAlertSink {
    async fn post(&self, text: &str, thread: Option<&str>) -> MonitorResult<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        match thread {
            Some(_) => {
                for line in text.lines() {
                    println!("    {}", line);
                }
            }
            None => println!("\n{}", text),
        }
        Ok(id.to_string())
    }
}
