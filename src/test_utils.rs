use crate::relay::remote::{ChannelHandle, RemotePlatform};
use crate::relay::types::{RelayPayload, WebhookCredential};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    channels: HashSet<String>,
    endpoints: HashMap<String, Vec<WebhookCredential>>,
    created: Vec<(String, String, Option<String>)>,
    deleted: Vec<String>,
    webhook_posts: Vec<(String, RelayPayload)>,
    direct_posts: Vec<(String, RelayPayload)>,
    failing_texts: HashSet<String>,
    list_calls: usize,
    deny_create: bool,
    next_hook: u64,
}

/// In-memory remote platform that records every call
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn add_channel(&self, id: &str) {
        self.state().channels.insert(id.to_string());
    }

    pub fn remove_channel(&self, id: &str) {
        self.state().channels.remove(id);
    }

    pub fn add_endpoint(&self, channel_id: &str, credential: WebhookCredential) {
        self.state()
            .endpoints
            .entry(channel_id.to_string())
            .or_default()
            .push(credential);
    }

    pub fn deny_endpoint_creation(&self) {
        self.state().deny_create = true;
    }

    /// Make any delivery whose text equals `text` fail
    pub fn fail_delivery_of(&self, text: &str) {
        self.state().failing_texts.insert(text.to_string());
    }

    /// (channel id, webhook name) for each created webhook
    pub fn created_endpoints(&self) -> Vec<(String, String)> {
        self.state()
            .created
            .iter()
            .map(|(channel, name, _)| (channel.clone(), name.clone()))
            .collect()
    }

    pub fn created_avatars(&self) -> Vec<Option<String>> {
        self.state()
            .created
            .iter()
            .map(|(_, _, avatar)| avatar.clone())
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn deleted_endpoints(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    /// (webhook id, payload) for each webhook delivery
    pub fn webhook_posts(&self) -> Vec<(String, RelayPayload)> {
        self.state().webhook_posts.clone()
    }

    /// (channel id, payload) for each direct delivery
    pub fn direct_posts(&self) -> Vec<(String, RelayPayload)> {
        self.state().direct_posts.clone()
    }

    fn check_failure(&self, payload: &RelayPayload) -> Result<()> {
        if self.state().failing_texts.contains(&payload.text) {
            anyhow::bail!("simulated transport error");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemotePlatform for MockPlatform {
    async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelHandle>> {
        let known = self.state().channels.contains(channel_id);
        Ok(known.then(|| ChannelHandle {
            id: channel_id.to_string(),
        }))
    }

    async fn list_endpoints(&self, channel: &ChannelHandle) -> Result<Vec<WebhookCredential>> {
        let mut state = self.state();
        state.list_calls += 1;
        Ok(state.endpoints.get(&channel.id).cloned().unwrap_or_default())
    }

    async fn create_endpoint(
        &self,
        channel: &ChannelHandle,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<WebhookCredential> {
        let mut state = self.state();
        if state.deny_create {
            anyhow::bail!("Missing Permissions");
        }
        state.next_hook += 1;
        let credential = WebhookCredential::new(
            format!("hook-{}", state.next_hook),
            format!("token-{}", state.next_hook),
        );
        state.created.push((
            channel.id.clone(),
            display_name.to_string(),
            avatar_url.map(str::to_string),
        ));
        state
            .endpoints
            .entry(channel.id.clone())
            .or_default()
            .push(credential.clone());
        Ok(credential)
    }

    async fn delete_endpoint(&self, credential: &WebhookCredential) -> Result<()> {
        let mut state = self.state();
        state.deleted.push(credential.id.clone());
        for hooks in state.endpoints.values_mut() {
            hooks.retain(|h| h.id != credential.id);
        }
        Ok(())
    }

    async fn post_via_endpoint(
        &self,
        credential: &WebhookCredential,
        payload: &RelayPayload,
    ) -> Result<()> {
        self.check_failure(payload)?;
        self.state()
            .webhook_posts
            .push((credential.id.clone(), payload.clone()));
        Ok(())
    }

    async fn post_direct(&self, channel: &ChannelHandle, payload: &RelayPayload) -> Result<()> {
        self.check_failure(payload)?;
        self.state()
            .direct_posts
            .push((channel.id.clone(), payload.clone()));
        Ok(())
    }
}
