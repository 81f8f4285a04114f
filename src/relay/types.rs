//! Relay entries, persisted records and inbound/outbound message types.

use super::transport::Transport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How a relay delivers into its target channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Post under the bot's own identity
    Direct,
    /// Post through a webhook that impersonates the original author
    #[serde(rename = "webhook", alias = "webhookproxy")]
    WebhookProxy,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::Direct => "direct",
            RelayMode::WebhookProxy => "webhook",
        }
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(RelayMode::Direct),
            "webhook" | "webhookproxy" => Ok(RelayMode::WebhookProxy),
            other => Err(format!(
                "unknown relay mode '{}' (expected 'direct' or 'webhook')",
                other
            )),
        }
    }
}

/// Webhook id + secret token enabling proxy-identity delivery
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCredential {
    pub id: String,
    pub token: String,
    /// True when the engine created this webhook (and may delete it on stop)
    #[serde(default)]
    pub created_by_relay: bool,
}

impl WebhookCredential {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
            created_by_relay: false,
        }
    }

    pub fn owned(mut self) -> Self {
        self.created_by_relay = true;
        self
    }
}

// Keep the token out of logs
impl fmt::Debug for WebhookCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookCredential")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .field("created_by_relay", &self.created_by_relay)
            .finish()
    }
}

/// Serialized projection of a relay entry, one per source channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub source_id: String,
    pub target_id: String,
    pub mode: RelayMode,
    #[serde(default, rename = "webhook", skip_serializing_if = "Option::is_none")]
    pub webhook_credential: Option<WebhookCredential>,
    #[serde(rename = "startTime", alias = "startedAt")]
    pub started_at: DateTime<Utc>,
}

/// One active mirroring rule
pub struct RelayEntry {
    pub source_id: String,
    pub target_id: String,
    pub mode: RelayMode,
    pub webhook_credential: Option<WebhookCredential>,
    pub started_at: DateTime<Utc>,
    /// Live delivery handle, rebuilt on every process start
    pub transport: Arc<dyn Transport>,
}

impl RelayEntry {
    pub fn to_record(&self) -> PersistedRecord {
        PersistedRecord {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            mode: self.mode,
            webhook_credential: self.webhook_credential.clone(),
            started_at: self.started_at,
        }
    }

    pub fn summary(&self) -> RelaySummary {
        RelaySummary {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            mode: self.mode,
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for RelayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayEntry")
            .field("source_id", &self.source_id)
            .field("target_id", &self.target_id)
            .field("mode", &self.mode)
            .field("webhook_credential", &self.webhook_credential)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Listing row for an active relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySummary {
    pub source_id: String,
    pub target_id: String,
    pub mode: RelayMode,
    pub started_at: DateTime<Utc>,
}

/// Attachment on an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAttachment {
    /// Direct URL of the uploaded file
    pub url: String,
}

/// Who wrote an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAuthor {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Bot account or webhook
    pub bot: bool,
}

/// Inbound message event, platform-neutral
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub channel_id: String,
    pub author: EventAuthor,
    /// Join/pin/boost notices and other platform-generated messages
    pub system: bool,
    pub text: Option<String>,
    pub attachments: Vec<InboundAttachment>,
    /// Rich embeds, passed through as opaque platform JSON
    pub embeds: Vec<serde_json::Value>,
}

/// Normalized outbound message handed to a transport
#[derive(Debug, Clone, PartialEq)]
pub struct RelayPayload {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub text: String,
    pub embeds: Vec<serde_json::Value>,
}

/// Identity of the bot account the engine runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayIdentity {
    pub user_id: String,
    pub avatar_url: Option<String>,
}
