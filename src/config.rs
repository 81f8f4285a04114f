//! Application configuration loaded from TOML.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Discord connection settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Relay state persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Webhooks created for webhook-mode relays
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// HTTP control surface
    #[serde(default)]
    pub admin: AdminConfig,

    /// Default log filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig::default(),
            store: StoreConfig::default(),
            webhook: WebhookConfig::default(),
            admin: AdminConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        expand_home("~/.chanrelay/config.toml")
    }

    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Discord-specific configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscordConfig {
    /// Bot token (or env var reference like ${DISCORD_BOT_TOKEN})
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Guilds whose messages are relayed (empty = all)
    #[serde(default)]
    pub allowed_guilds: Vec<u64>,
}

impl DiscordConfig {
    /// Resolve bot token from environment if needed
    pub fn resolve_bot_token(&self) -> Option<String> {
        self.bot_token.as_deref().and_then(resolve_env_ref)
    }
}

/// Relay state file settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Path to the relay state file (supports ~ expansion)
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_state_file() -> String {
    "~/.chanrelay/mirror_config.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl StoreConfig {
    pub fn resolve_state_file(&self) -> PathBuf {
        expand_home(&self.state_file)
    }
}

/// Settings for webhooks the relay creates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_name")]
    pub name: String,

    /// Audit log reason attached to webhook changes
    #[serde(default = "default_webhook_reason")]
    pub reason: String,
}

fn default_webhook_name() -> String {
    "Mirror Bot".to_string()
}

fn default_webhook_reason() -> String {
    "Mirror System".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            name: default_webhook_name(),
            reason: default_webhook_reason(),
        }
    }
}

/// Admin HTTP server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_admin_bind")]
    pub bind: String,

    /// Bearer token (or ${ENV_VAR} reference)
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_admin_bind() -> String {
    "127.0.0.1:18790".to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_admin_bind(),
            auth_token: None,
        }
    }
}

impl AdminConfig {
    pub fn resolve_auth_token(&self) -> Option<String> {
        self.auth_token.as_deref().and_then(resolve_env_ref)
    }
}

/// `${VAR}` reads the environment, anything else is returned as-is
pub fn resolve_env_ref(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let env_var = &value[2..value.len() - 1];
        std::env::var(env_var).ok().filter(|v| !v.is_empty())
    } else {
        Some(value.to_string())
    }
}

/// Expand a leading ~/ to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
