//! Boundary to the remote chat platform.

use super::types::{RelayPayload, WebhookCredential};
use anyhow::Result;

/// Resolved channel on the remote platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: String,
}

/// Remote channel and webhook operations the engine depends on
#[async_trait::async_trait]
pub trait RemotePlatform: Send + Sync {
    /// Look up a channel; `None` when it does not exist or is not visible
    async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelHandle>>;

    /// Webhooks in a channel whose token is available to us
    async fn list_endpoints(&self, channel: &ChannelHandle) -> Result<Vec<WebhookCredential>>;

    /// Create a webhook in a channel
    async fn create_endpoint(
        &self,
        channel: &ChannelHandle,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<WebhookCredential>;

    /// Delete a webhook
    async fn delete_endpoint(&self, credential: &WebhookCredential) -> Result<()>;

    /// Post through a webhook, impersonating the payload's author
    async fn post_via_endpoint(
        &self,
        credential: &WebhookCredential,
        payload: &RelayPayload,
    ) -> Result<()>;

    /// Post as the bot itself
    async fn post_direct(&self, channel: &ChannelHandle, payload: &RelayPayload) -> Result<()>;
}
