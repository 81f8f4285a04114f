//! Delivery strategies: direct post or webhook proxy.

use super::error::{RelayError, Result};
use super::remote::{ChannelHandle, RemotePlatform};
use super::types::{RelayPayload, WebhookCredential};
use std::sync::Arc;

/// Delivers payloads into one target channel
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one payload. Failures are reported, never retried.
    async fn deliver(&self, payload: &RelayPayload) -> Result<()>;
}

/// Posts under the bot's own identity
pub struct DirectTransport {
    platform: Arc<dyn RemotePlatform>,
    target_id: String,
}

impl DirectTransport {
    pub fn new(platform: Arc<dyn RemotePlatform>, target_id: impl Into<String>) -> Self {
        Self {
            platform,
            target_id: target_id.into(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for DirectTransport {
    async fn deliver(&self, payload: &RelayPayload) -> Result<()> {
        // Re-resolved on every delivery so a recreated channel is picked up
        let channel = self
            .platform
            .fetch_channel(&self.target_id)
            .await
            .map_err(|e| RelayError::delivery(&self.target_id, e))?
            .ok_or_else(|| RelayError::delivery(&self.target_id, "target channel not found"))?;

        self.platform
            .post_direct(&channel, payload)
            .await
            .map_err(|e| RelayError::delivery(&self.target_id, e))
    }
}

/// Posts through a webhook so the original author's name and avatar show
pub struct WebhookTransport {
    platform: Arc<dyn RemotePlatform>,
    target_id: String,
    credential: WebhookCredential,
}

impl WebhookTransport {
    pub fn new(
        platform: Arc<dyn RemotePlatform>,
        target_id: impl Into<String>,
        credential: WebhookCredential,
    ) -> Self {
        Self {
            platform,
            target_id: target_id.into(),
            credential,
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebhookTransport {
    async fn deliver(&self, payload: &RelayPayload) -> Result<()> {
        self.platform
            .post_via_endpoint(&self.credential, payload)
            .await
            .map_err(|e| RelayError::delivery(&self.target_id, e))
    }
}

/// Find a reusable webhook in `target`, or create one named `name`.
///
/// Lookup errors are treated as "no webhooks"; creation errors become
/// `EndpointProvisionFailure`. Created webhooks are marked as owned.
pub async fn provision_webhook(
    platform: &dyn RemotePlatform,
    target: &ChannelHandle,
    name: &str,
    avatar_url: Option<&str>,
) -> Result<WebhookCredential> {
    let existing = match platform.list_endpoints(target).await {
        Ok(hooks) => hooks,
        Err(e) => {
            tracing::debug!(target_id = %target.id, error = %e, "could not list webhooks");
            Vec::new()
        }
    };

    if let Some(hook) = existing.into_iter().find(|h| !h.token.is_empty()) {
        tracing::debug!(target_id = %target.id, webhook_id = %hook.id, "reusing existing webhook");
        return Ok(hook);
    }

    let created = platform
        .create_endpoint(target, name, avatar_url)
        .await
        .map_err(|e| RelayError::provision(&target.id, e))?;

    tracing::info!(target_id = %target.id, webhook_id = %created.id, "created relay webhook");
    Ok(created.owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockPlatform;

    fn payload(text: &str) -> RelayPayload {
        RelayPayload {
            display_name: "alice".to_string(),
            avatar_url: None,
            text: text.to_string(),
            embeds: vec![],
        }
    }

    #[tokio::test]
    async fn test_reuses_existing_webhook() {
        let platform = MockPlatform::new();
        platform.add_channel("200");
        platform.add_endpoint("200", WebhookCredential::new("w1", "t1"));

        let target = platform.fetch_channel("200").await.unwrap().unwrap();
        let cred = provision_webhook(&*platform, &target, "Mirror Bot", None)
            .await
            .unwrap();

        assert_eq!(cred, WebhookCredential::new("w1", "t1"));
        assert_eq!(platform.created_endpoints().len(), 0);
    }

    #[tokio::test]
    async fn test_creates_webhook_when_none_usable() {
        let platform = MockPlatform::new();
        platform.add_channel("200");
        platform.add_endpoint("200", WebhookCredential::new("w0", ""));

        let target = platform.fetch_channel("200").await.unwrap().unwrap();
        let cred = provision_webhook(&*platform, &target, "Mirror Bot", Some("https://a/b.png"))
            .await
            .unwrap();

        assert!(cred.created_by_relay);
        let created = platform.created_endpoints();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "200");
        assert_eq!(created[0].1, "Mirror Bot");
    }

    #[tokio::test]
    async fn test_create_failure_is_provision_error() {
        let platform = MockPlatform::new();
        platform.add_channel("200");
        platform.deny_endpoint_creation();

        let target = platform.fetch_channel("200").await.unwrap().unwrap();
        let err = provision_webhook(&*platform, &target, "Mirror Bot", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::EndpointProvisionFailure { .. }));
    }

    #[tokio::test]
    async fn test_direct_resolves_target_each_time() {
        let platform = MockPlatform::new();
        platform.add_channel("200");
        let transport = DirectTransport::new(platform.clone(), "200");

        transport.deliver(&payload("one")).await.unwrap();
        platform.remove_channel("200");
        let err = transport.deliver(&payload("two")).await.unwrap_err();

        assert!(matches!(err, RelayError::DeliveryFailure { .. }));
        assert_eq!(platform.direct_posts().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_delivery_uses_credential() {
        let platform = MockPlatform::new();
        let transport =
            WebhookTransport::new(platform.clone(), "200", WebhookCredential::new("w1", "t1"));

        transport.deliver(&payload("hi")).await.unwrap();

        let posts = platform.webhook_posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "w1");
        assert_eq!(posts[0].1.text, "hi");
    }
}
