//! Discord platform adapter using serenity.

pub mod formatting;

use super::engine::RelayEngine;
use super::remote::{ChannelHandle, RemotePlatform};
use super::types::{
    EventAuthor, InboundAttachment, InboundEvent, RelayIdentity, RelayPayload, WebhookCredential,
};
use crate::config::DiscordConfig;
use anyhow::Result;
use dashmap::DashMap;
use serenity::all::{
    ChannelId, Client, Context, CreateAttachment, CreateMessage, CreateWebhook, EventHandler,
    ExecuteWebhook, GatewayIntents, Message, MessageType, Ready, Webhook, WebhookId,
};
use serenity::async_trait as serenity_async_trait;
use serenity::http::Http;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Remote platform backed by the Discord HTTP API
pub struct DiscordPlatform {
    /// HTTP client (available after start)
    http: RwLock<Option<Arc<Http>>>,
    /// Executable webhooks by id
    webhooks: DashMap<String, Webhook>,
    /// Audit log reason for webhook changes
    audit_reason: String,
}

impl DiscordPlatform {
    pub fn new(audit_reason: impl Into<String>) -> Self {
        Self {
            http: RwLock::new(None),
            webhooks: DashMap::new(),
            audit_reason: audit_reason.into(),
        }
    }

    pub async fn attach(&self, http: Arc<Http>) {
        *self.http.write().await = Some(http);
    }

    pub async fn detach(&self) {
        *self.http.write().await = None;
        self.webhooks.clear();
    }

    /// Get the HTTP client
    async fn get_http(&self) -> Result<Arc<Http>> {
        let http = self.http.read().await;
        http.clone()
            .ok_or_else(|| anyhow::anyhow!("Discord client not initialized"))
    }

    async fn webhook(&self, http: &Arc<Http>, credential: &WebhookCredential) -> Result<Webhook> {
        let cached = self.webhooks.get(&credential.id).map(|hook| hook.clone());
        if let Some(hook) = cached {
            return Ok(hook);
        }

        let webhook_id = WebhookId::new(credential.id.parse::<u64>()?);
        let hook = Webhook::from_id_with_token(http, webhook_id, &credential.token).await?;
        self.webhooks.insert(credential.id.clone(), hook.clone());
        Ok(hook)
    }
}

fn channel_id(id: &str) -> Result<ChannelId> {
    Ok(ChannelId::new(id.parse::<u64>()?))
}

fn content_of(payload: &RelayPayload) -> Option<String> {
    if payload.text.trim().is_empty() {
        None
    } else {
        Some(formatting::fit_content(&payload.text, formatting::MAX_CONTENT_LEN))
    }
}

#[async_trait::async_trait]
impl RemotePlatform for DiscordPlatform {
    async fn fetch_channel(&self, id: &str) -> Result<Option<ChannelHandle>> {
        let http = self.get_http().await?;
        let Ok(channel_id) = channel_id(id) else {
            return Ok(None);
        };

        match channel_id.to_channel(&http).await {
            Ok(_) => Ok(Some(ChannelHandle { id: id.to_string() })),
            Err(e) => {
                tracing::debug!(channel_id = %id, error = %e, "channel fetch failed");
                Ok(None)
            }
        }
    }

    async fn list_endpoints(&self, channel: &ChannelHandle) -> Result<Vec<WebhookCredential>> {
        let http = self.get_http().await?;
        let hooks = channel_id(&channel.id)?.webhooks(&http).await?;

        // Only webhooks that expose a token can be executed by us
        Ok(hooks
            .iter()
            .filter_map(|hook| hook.url().ok())
            .filter_map(|url| formatting::credential_from_url(&url))
            .collect())
    }

    async fn create_endpoint(
        &self,
        channel: &ChannelHandle,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<WebhookCredential> {
        let http = self.get_http().await?;

        let avatar = match avatar_url {
            Some(url) => match CreateAttachment::url(&http, url).await {
                Ok(attachment) => Some(attachment),
                Err(e) => {
                    tracing::debug!(error = %e, "could not fetch webhook avatar");
                    None
                }
            },
            None => None,
        };

        let mut builder = CreateWebhook::new(display_name).audit_log_reason(&self.audit_reason);
        if let Some(avatar) = &avatar {
            builder = builder.avatar(avatar);
        }

        let hook = channel_id(&channel.id)?
            .create_webhook(&http, builder)
            .await?;
        let credential = formatting::credential_from_url(&hook.url()?)
            .ok_or_else(|| anyhow::anyhow!("created webhook has no usable token"))?;

        self.webhooks.insert(credential.id.clone(), hook);
        Ok(credential)
    }

    async fn delete_endpoint(&self, credential: &WebhookCredential) -> Result<()> {
        let http = self.get_http().await?;
        self.webhooks.remove(&credential.id);

        let webhook_id = WebhookId::new(credential.id.parse::<u64>()?);
        http.delete_webhook_with_token(webhook_id, &credential.token, Some(self.audit_reason.as_str()))
            .await?;
        Ok(())
    }

    async fn post_via_endpoint(
        &self,
        credential: &WebhookCredential,
        payload: &RelayPayload,
    ) -> Result<()> {
        let http = self.get_http().await?;
        let hook = self.webhook(&http, credential).await?;

        let mut builder = ExecuteWebhook::new()
            .username(payload.display_name.clone())
            .embeds(formatting::to_create_embeds(&payload.embeds));
        if let Some(content) = content_of(payload) {
            builder = builder.content(content);
        }
        if let Some(avatar) = &payload.avatar_url {
            builder = builder.avatar_url(avatar.clone());
        }

        if let Err(e) = hook.execute(&http, false, builder).await {
            // The webhook may have been deleted or rotated; fetch it again next time
            self.webhooks.remove(&credential.id);
            return Err(e.into());
        }
        Ok(())
    }

    async fn post_direct(&self, channel: &ChannelHandle, payload: &RelayPayload) -> Result<()> {
        let http = self.get_http().await?;

        let mut message = CreateMessage::new().embeds(formatting::to_create_embeds(&payload.embeds));
        if let Some(content) = content_of(payload) {
            message = message.content(content);
        }

        channel_id(&channel.id)?
            .send_message(&http, message)
            .await?;
        Ok(())
    }
}

/// Convert a serenity message into a platform-neutral event
pub fn inbound_event(msg: &Message) -> InboundEvent {
    let author = &msg.author;

    InboundEvent {
        channel_id: msg.channel_id.to_string(),
        author: EventAuthor {
            id: author.id.to_string(),
            display_name: author
                .global_name
                .clone()
                .unwrap_or_else(|| author.name.clone()),
            avatar_url: Some(author.face()),
            bot: author.bot || msg.webhook_id.is_some(),
        },
        system: !matches!(msg.kind, MessageType::Regular | MessageType::InlineReply),
        text: (!msg.content.is_empty()).then(|| msg.content.clone()),
        attachments: msg
            .attachments
            .iter()
            .map(|a| InboundAttachment { url: a.url.clone() })
            .collect(),
        embeds: msg
            .embeds
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .collect(),
    }
}

/// Queue an event for the engine. Returns false once the engine has stopped.
fn forward_event(events: &mpsc::UnboundedSender<InboundEvent>, event: InboundEvent) -> bool {
    match events.send(event) {
        Ok(()) => true,
        Err(mpsc::error::SendError(event)) => {
            tracing::debug!(channel_id = %event.channel_id, "relay engine stopped; dropping message");
            false
        }
    }
}

/// Discord event handler
struct RelayHandler {
    engine: Arc<RelayEngine>,
    events: mpsc::UnboundedSender<InboundEvent>,
    allowed_guilds: Vec<u64>,
}

#[serenity_async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );

        let identity = RelayIdentity {
            user_id: ready.user.id.to_string(),
            avatar_url: Some(ready.user.face()),
        };

        if let Some(report) = self.engine.on_ready(identity).await {
            if !report.failures.is_empty() {
                tracing::warn!(
                    failed = report.failures.len(),
                    "some saved relays stay inactive until the next restart"
                );
            }
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        // Check guild permissions
        if let Some(guild_id) = msg.guild_id {
            if !self.allowed_guilds.is_empty() && !self.allowed_guilds.contains(&guild_id.get()) {
                return;
            }
        }

        forward_event(&self.events, inbound_event(&msg));
    }
}

/// Discord connection driving the relay engine
pub struct DiscordRelay {
    config: DiscordConfig,
    platform: Arc<DiscordPlatform>,
    engine: Arc<RelayEngine>,
    /// Shutdown signal
    shutdown_tx: RwLock<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl DiscordRelay {
    pub fn new(
        config: DiscordConfig,
        platform: Arc<DiscordPlatform>,
        engine: Arc<RelayEngine>,
    ) -> Self {
        Self {
            config,
            platform,
            engine,
            shutdown_tx: RwLock::new(None),
        }
    }

    /// Gateway intents needed to read relayed messages
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }

    /// Connect to Discord and run the gateway in the background
    pub async fn start(&self) -> Result<()> {
        let token = self
            .config
            .resolve_bot_token()
            .ok_or_else(|| anyhow::anyhow!("Discord bot token not configured"))?;

        let handler = RelayHandler {
            engine: self.engine.clone(),
            events: self.engine.event_sender(),
            allowed_guilds: self.config.allowed_guilds.clone(),
        };

        let mut client = Client::builder(&token, Self::intents())
            .event_handler(handler)
            .await?;

        self.platform.attach(client.http.clone()).await;

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let shard_manager = client.shard_manager.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = client.start() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "discord client error");
                    }
                }
                _ = &mut shutdown_rx => {
                    shard_manager.shutdown_all().await;
                }
            }
        });

        tracing::info!("discord relay started");
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
        self.platform.detach().await;
        tracing::info!("discord relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_platform_requires_client() {
        let platform = DiscordPlatform::new("Mirror System");
        assert!(platform.fetch_channel("123").await.is_err());
    }

    #[test]
    fn test_forward_after_engine_stopped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let event = InboundEvent {
            channel_id: "1".to_string(),
            author: EventAuthor {
                id: "u".to_string(),
                display_name: "dave".to_string(),
                avatar_url: None,
                bot: false,
            },
            system: false,
            text: Some("hi".to_string()),
            attachments: vec![],
            embeds: vec![],
        };

        assert!(forward_event(&tx, event.clone()));
        drop(rx);
        assert!(!forward_event(&tx, event));
    }

    #[test]
    fn test_intents_include_message_content() {
        assert!(DiscordRelay::intents().contains(GatewayIntents::MESSAGE_CONTENT));
    }
}
