//! Relay lifecycle: startup restoration, event dispatch and the command surface.

use super::error::{RelayError, Result};
use super::payload::{build_payload, BuildOutcome};
use super::registry::{RelayRegistry, StartRequest};
use super::types::{InboundEvent, RelayEntry, RelayIdentity, RelayMode, RelaySummary};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Outcome of a startup restoration pass
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    pub failures: Vec<RelayError>,
}

/// What happened to one relayed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    Skipped,
}

/// Owns the registry and drives the inbound event stream
pub struct RelayEngine {
    registry: Arc<RelayRegistry>,
    identity: RwLock<Option<RelayIdentity>>,
    initialized: AtomicBool,
    event_tx: mpsc::UnboundedSender<InboundEvent>,
    event_rx: RwLock<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
}

impl RelayEngine {
    pub fn new(registry: Arc<RelayRegistry>) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            registry,
            identity: RwLock::new(None),
            initialized: AtomicBool::new(false),
            event_tx,
            event_rx: RwLock::new(Some(event_rx)),
        })
    }

    pub fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    /// Sender the platform adapter pushes inbound events into
    pub fn event_sender(&self) -> mpsc::UnboundedSender<InboundEvent> {
        self.event_tx.clone()
    }

    pub async fn identity(&self) -> Option<RelayIdentity> {
        self.identity.read().await.clone()
    }

    /// Record the bot identity and, the first time only, restore saved relays
    pub async fn on_ready(&self, identity: RelayIdentity) -> Option<RestoreReport> {
        *self.identity.write().await = Some(identity);

        if self.initialized.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.restore().await)
    }

    /// Re-activate every saved relay. Failed records are logged and skipped
    /// but stay in the store.
    pub async fn restore(&self) -> RestoreReport {
        tracing::info!(path = %self.registry.store().path().display(), "restoring relays");

        // Start order determines list order
        let mut records: Vec<_> = self.registry.store().load().into_iter().collect();
        records.sort_by_key(|(_, record)| record.started_at);

        let mut report = RestoreReport::default();
        for (source_id, record) in records {
            let request = StartRequest::new(record.source_id, record.target_id, record.mode)
                .with_credential(record.webhook_credential)
                .with_avatar(self.avatar_url().await)
                .restoring(record.started_at);

            match self.registry.start(request).await {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    let failure = RelayError::restoration(&source_id, &e);
                    tracing::warn!(source_id = %source_id, error = %e, "failed to restore relay");
                    report.failures.push(failure);
                }
            }
        }

        tracing::info!(
            restored = report.restored,
            failed = report.failures.len(),
            "restored {} relays",
            report.restored
        );
        report
    }

    /// Consume the inbound event stream until every sender is dropped
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let mut event_rx = self
            .event_rx
            .write()
            .await
            .take()
            .ok_or_else(|| anyhow::anyhow!("Relay engine already running"))?;

        while let Some(event) = event_rx.recv().await {
            self.dispatch(event).await;
        }

        tracing::info!("inbound event stream closed");
        Ok(())
    }

    /// Hand a relayed channel's event to its own task. Events from channels
    /// without a relay are dropped.
    pub async fn dispatch(self: &Arc<Self>, event: InboundEvent) -> Option<JoinHandle<()>> {
        let entry = self.registry.get(&event.channel_id).await?;
        let engine = self.clone();

        Some(tokio::spawn(async move {
            // Failures end here; the stream keeps going
            if let Err(e) = engine.relay_event(&entry, &event).await {
                tracing::error!(
                    source_id = %entry.source_id,
                    target_id = %entry.target_id,
                    mode = %entry.mode,
                    error = %e,
                    "relay delivery failed"
                );
            }
        }))
    }

    /// Build and deliver one event through `entry`
    pub async fn relay_event(&self, entry: &RelayEntry, event: &InboundEvent) -> Result<RelayOutcome> {
        let self_id = self.identity.read().await.as_ref().map(|i| i.user_id.clone());

        match build_payload(event, self_id.as_deref()) {
            BuildOutcome::Skip(reason) => {
                tracing::debug!(source_id = %entry.source_id, ?reason, "skipping message");
                Ok(RelayOutcome::Skipped)
            }
            BuildOutcome::Deliver(payload) => {
                entry.transport.deliver(&payload).await?;
                tracing::debug!(
                    source_id = %entry.source_id,
                    target_id = %entry.target_id,
                    "message relayed"
                );
                Ok(RelayOutcome::Delivered)
            }
        }
    }

    /// Start relaying `source_id` into `target_id`
    pub async fn start_relay(
        &self,
        source_id: &str,
        target_id: &str,
        mode: RelayMode,
    ) -> Result<RelaySummary> {
        let request =
            StartRequest::new(source_id, target_id, mode).with_avatar(self.avatar_url().await);
        self.registry.start(request).await
    }

    pub async fn stop_relay(&self, source_id: &str) -> bool {
        self.registry.stop(source_id).await
    }

    pub async fn list_relays(&self) -> Vec<RelaySummary> {
        self.registry.list().await
    }

    async fn avatar_url(&self) -> Option<String> {
        self.identity
            .read()
            .await
            .as_ref()
            .and_then(|i| i.avatar_url.clone())
    }
}

/// User-displayable result of a relay command
#[derive(Debug)]
pub enum CommandReply {
    Started(RelaySummary),
    Stopped { source_id: String },
    NotActive { source_id: String },
    Listing(Vec<RelaySummary>),
    Failed(RelayError),
}

impl CommandReply {
    pub fn from_start(result: Result<RelaySummary>) -> Self {
        match result {
            Ok(summary) => CommandReply::Started(summary),
            Err(e) => CommandReply::Failed(e),
        }
    }

    pub fn from_stop(source_id: &str, removed: bool) -> Self {
        let source_id = source_id.to_string();
        if removed {
            CommandReply::Stopped { source_id }
        } else {
            CommandReply::NotActive { source_id }
        }
    }
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandReply::Started(s) => write!(
                f,
                "Relay active: {} -> {} ({})",
                s.source_id, s.target_id, s.mode
            ),
            CommandReply::Stopped { source_id } => write!(f, "Relay stopped for {}", source_id),
            CommandReply::NotActive { source_id } => {
                write!(f, "No relay active for {}", source_id)
            }
            CommandReply::Listing(relays) if relays.is_empty() => f.write_str("No active relays."),
            CommandReply::Listing(relays) => {
                writeln!(f, "Active relays ({}):", relays.len())?;
                for s in relays {
                    writeln!(
                        f,
                        "- {} -> {} [{}] since {}",
                        s.source_id,
                        s.target_id,
                        s.mode,
                        s.started_at.format("%Y-%m-%d %H:%M UTC")
                    )?;
                }
                Ok(())
            }
            CommandReply::Failed(e) if e.is_user_facing() => write!(f, "Error: {}", e),
            CommandReply::Failed(_) => f.write_str("Error: the relay could not be started"),
        }
    }
}
