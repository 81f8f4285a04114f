//! In-memory table of active relays, written through to the config store.

use super::error::{ChannelRole, RelayError, Result};
use super::remote::{ChannelHandle, RemotePlatform};
use super::store::{ConfigStore, RecordMap};
use super::transport::{provision_webhook, DirectTransport, Transport, WebhookTransport};
use super::types::{RelayEntry, RelayMode, RelaySummary, WebhookCredential};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Parameters for starting a relay
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub source_id: String,
    pub target_id: String,
    pub mode: RelayMode,
    /// Previously provisioned webhook (webhook mode only)
    pub credential: Option<WebhookCredential>,
    /// Avatar for a newly created webhook
    pub avatar_url: Option<String>,
    /// Original start time when restoring
    pub started_at: Option<DateTime<Utc>>,
    /// Restorations do not rewrite the store
    pub restoring: bool,
}

impl StartRequest {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, mode: RelayMode) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            mode,
            credential: None,
            avatar_url: None,
            started_at: None,
            restoring: false,
        }
    }

    pub fn with_credential(mut self, credential: Option<WebhookCredential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_avatar(mut self, avatar_url: Option<String>) -> Self {
        self.avatar_url = avatar_url;
        self
    }

    /// Mark as a startup restoration of a saved record
    pub fn restoring(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self.restoring = true;
        self
    }
}

struct Slot {
    seq: u64,
    entry: Arc<RelayEntry>,
}

/// Active relays keyed by source channel id
pub struct RelayRegistry {
    platform: Arc<dyn RemotePlatform>,
    store: ConfigStore,
    /// Name given to webhooks the registry creates
    webhook_name: String,
    entries: RwLock<HashMap<String, Slot>>,
    /// Serializes start/stop and the store rewrites they trigger
    writer: Mutex<()>,
    next_seq: AtomicU64,
}

impl RelayRegistry {
    pub fn new(
        platform: Arc<dyn RemotePlatform>,
        store: ConfigStore,
        webhook_name: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform,
            store,
            webhook_name: webhook_name.into(),
            entries: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
            next_seq: AtomicU64::new(0),
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Look up the relay for a source channel
    pub async fn get(&self, source_id: &str) -> Option<Arc<RelayEntry>> {
        self.entries
            .read()
            .await
            .get(source_id)
            .map(|slot| slot.entry.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Start a relay: resolve both channels, provision the transport, insert.
    pub async fn start(&self, request: StartRequest) -> Result<RelaySummary> {
        let _writer = self.writer.lock().await;

        if self.entries.read().await.contains_key(&request.source_id) {
            return Err(RelayError::AlreadyActive {
                source_id: request.source_id,
            });
        }

        self.resolve(ChannelRole::Source, &request.source_id).await?;
        let target = self.resolve(ChannelRole::Target, &request.target_id).await?;

        let mut provisioned = false;
        let (transport, credential): (Arc<dyn Transport>, Option<WebhookCredential>) =
            match request.mode {
                RelayMode::Direct => (
                    Arc::new(DirectTransport::new(
                        self.platform.clone(),
                        &request.target_id,
                    )) as Arc<dyn Transport>,
                    None,
                ),
                RelayMode::WebhookProxy => {
                    let credential = match request.credential {
                        Some(credential) => credential,
                        None => {
                            provisioned = true;
                            provision_webhook(
                                self.platform.as_ref(),
                                &target,
                                &self.webhook_name,
                                request.avatar_url.as_deref(),
                            )
                            .await?
                        }
                    };
                    (
                        Arc::new(WebhookTransport::new(
                            self.platform.clone(),
                            &request.target_id,
                            credential.clone(),
                        )) as Arc<dyn Transport>,
                        Some(credential),
                    )
                }
            };

        let entry = Arc::new(RelayEntry {
            source_id: request.source_id.clone(),
            target_id: request.target_id,
            mode: request.mode,
            webhook_credential: credential,
            started_at: request.started_at.unwrap_or_else(Utc::now),
            transport,
        });

        {
            let mut entries = self.entries.write().await;
            warn_on_loop(&entries, &entry);
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            entries.insert(
                entry.source_id.clone(),
                Slot {
                    seq,
                    entry: entry.clone(),
                },
            );
        }

        if !request.restoring {
            self.persist().await;
        } else if provisioned {
            // The saved record predates this webhook
            self.persist_record(&entry);
        }

        tracing::info!(
            source_id = %entry.source_id,
            target_id = %entry.target_id,
            mode = %entry.mode,
            restored = request.restoring,
            "relay started"
        );

        Ok(entry.summary())
    }

    /// Stop the relay for `source_id`. Returns whether one was removed.
    pub async fn stop(&self, source_id: &str) -> bool {
        let _writer = self.writer.lock().await;

        let removed = self.entries.write().await.remove(source_id);
        let Some(slot) = removed else {
            return false;
        };

        self.persist().await;

        if let Some(credential) = &slot.entry.webhook_credential {
            if credential.created_by_relay {
                if let Err(e) = self.platform.delete_endpoint(credential).await {
                    tracing::warn!(
                        source_id = %source_id,
                        webhook_id = %credential.id,
                        error = %e,
                        "failed to delete relay webhook"
                    );
                }
            }
        }

        tracing::info!(source_id = %source_id, target_id = %slot.entry.target_id, "relay stopped");
        true
    }

    /// Active relays in the order they were started
    pub async fn list(&self) -> Vec<RelaySummary> {
        let entries = self.entries.read().await;
        let mut slots: Vec<&Slot> = entries.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.iter().map(|slot| slot.entry.summary()).collect()
    }

    async fn resolve(&self, role: ChannelRole, channel_id: &str) -> Result<ChannelHandle> {
        match self.platform.fetch_channel(channel_id).await {
            Ok(Some(handle)) => Ok(handle),
            Ok(None) => Err(RelayError::invalid_channel(role, channel_id)),
            Err(e) => {
                tracing::debug!(channel_id = %channel_id, role = %role, error = %e, "channel lookup failed");
                Err(RelayError::invalid_channel(role, channel_id))
            }
        }
    }

    /// Rewrite the store from the current table
    async fn persist(&self) {
        let records: RecordMap = self
            .entries
            .read()
            .await
            .iter()
            .map(|(source_id, slot)| (source_id.clone(), slot.entry.to_record()))
            .collect();

        if let Err(e) = self.store.save(&records) {
            tracing::error!(path = %self.store.path().display(), error = %e, "failed to save relay state");
        }
    }

    /// Update one record in place, leaving records not yet restored untouched
    fn persist_record(&self, entry: &RelayEntry) {
        let mut records = self.store.load();
        records.insert(entry.source_id.clone(), entry.to_record());

        if let Err(e) = self.store.save(&records) {
            tracing::error!(path = %self.store.path().display(), error = %e, "failed to save relay state");
        }
    }
}

/// Relays feeding into each other are allowed but worth flagging
fn warn_on_loop(entries: &HashMap<String, Slot>, entry: &RelayEntry) {
    let feeds_relay = entry.target_id == entry.source_id || entries.contains_key(&entry.target_id);
    let fed_by_relay = entries
        .values()
        .any(|slot| slot.entry.target_id == entry.source_id);

    if feeds_relay || fed_by_relay {
        tracing::warn!(
            source_id = %entry.source_id,
            target_id = %entry.target_id,
            "relay chains into another relay; messages may be mirrored more than once"
        );
    }
}
