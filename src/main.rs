//! chanrelay: Discord channel relay bot.
//!
//! Usage:
//!   chanrelay [--config ~/.chanrelay/config.toml] [--state-file PATH] [--admin-bind ADDR]
//!
//! Environment variables:
//!   DISCORD_BOT_TOKEN - Bot token (overrides the config file)
//!   CHANRELAY_STATE_FILE - Relay state file
//!   CHANRELAY_ADMIN_BIND - Enable the admin HTTP server on this address
//!   RUST_LOG - Log filter

use anyhow::{Context, Result};
use chanrelay::config::AppConfig;
use chanrelay::relay::discord::{DiscordPlatform, DiscordRelay};
use chanrelay::relay::routes::{self, AdminState};
use chanrelay::relay::{ConfigStore, RelayEngine, RelayRegistry};
use chanrelay::Args;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state_file = config.store.resolve_state_file();
    tracing::info!(state_file = %state_file.display(), "chanrelay starting");

    let platform = Arc::new(DiscordPlatform::new(config.webhook.reason.clone()));
    let registry = RelayRegistry::new(
        platform.clone(),
        ConfigStore::new(state_file),
        config.webhook.name.clone(),
    );
    let engine = RelayEngine::new(registry);

    let bot = DiscordRelay::new(config.discord.clone(), platform, engine.clone());
    bot.start().await?;

    let events = tokio::spawn(engine.clone().run());

    let (admin_shutdown_tx, admin_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let admin = if config.admin.enabled {
        let state = Arc::new(AdminState {
            engine: engine.clone(),
            auth_token: config.admin.resolve_auth_token(),
        });
        let listener = tokio::net::TcpListener::bind(&config.admin.bind)
            .await
            .with_context(|| format!("binding admin server to {}", config.admin.bind))?;
        tracing::info!(bind = %config.admin.bind, "admin server listening");

        Some(tokio::spawn(async move {
            let server = axum::serve(listener, routes::routes(state)).with_graceful_shutdown(
                async move {
                    let _ = admin_shutdown_rx.await;
                },
            );
            if let Err(e) = server.await {
                tracing::error!(error = %e, "admin server error");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    bot.stop().await;
    let _ = admin_shutdown_tx.send(());
    if let Some(admin) = admin {
        let _ = admin.await;
    }
    events.abort();

    Ok(())
}
