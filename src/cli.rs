use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

/// Mirror Discord channels into other channels
#[derive(Debug, Clone, Parser)]
#[command(name = "chanrelay", version, about)]
pub struct Args {
    /// Config file (default: ~/.chanrelay/config.toml)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Relay state file
    #[arg(long, env = "CHANRELAY_STATE_FILE")]
    pub state_file: Option<String>,

    /// Discord bot token
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Enable the admin HTTP server on this address
    #[arg(long, env = "CHANRELAY_ADMIN_BIND")]
    pub admin_bind: Option<String>,

    /// Log filter, e.g. "info" or "chanrelay=debug"
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Apply command-line values on top of the file config
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(state_file) = &self.state_file {
            config.store.state_file = state_file.clone();
        }
        if let Some(token) = &self.token {
            config.discord.bot_token = Some(token.clone());
        }
        if let Some(bind) = &self.admin_bind {
            config.admin.enabled = true;
            config.admin.bind = bind.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = Args::try_parse_from([
            "chanrelay",
            "--state-file",
            "/tmp/state.json",
            "--admin-bind",
            "127.0.0.1:1234",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.store.state_file, "/tmp/state.json");
        assert!(config.admin.enabled);
        assert_eq!(config.admin.bind, "127.0.0.1:1234");
        assert_eq!(config.log_level, "debug");
    }
}
