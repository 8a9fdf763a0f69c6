// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::auth::{AccountConfig, AuthSettings};
use crate::connection::irc::{ChatSettings, DEFAULT_CHAT_URL};
use crate::credential::{state_dir, Identity};
use crate::provider::twitch::{TwitchSettings, DEFAULT_API_URL, DEFAULT_AUTH_URL};

const DEFAULT_BOT_SCOPES: &str =
    "chat:edit,chat:read,user:bot,user:read:chat,user:write:chat,whispers:edit,whispers:read";
const DEFAULT_BROADCASTER_SCOPES: &str =
    "bits:read,channel:bot,channel:read:subscriptions,moderator:read:followers,user:bot,user:read:chat";

/// Keeps a chat bot's bot and broadcaster credentials authorized and fresh.
#[derive(Debug, Parser)]
#[command(name = "chatkeep", version, about)]
pub struct Config {
    /// Provider application client id.
    #[arg(long, env = "CHATKEEP_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// Provider application client secret.
    #[arg(long, env = "CHATKEEP_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// Login the bot identity must be authorized as.
    #[arg(long, env = "CHATKEEP_BOT_USER", default_value = "")]
    pub bot_user: String,

    /// Login the broadcaster identity must be authorized as.
    #[arg(long, env = "CHATKEEP_BROADCASTER", default_value = "")]
    pub broadcaster: String,

    /// Chat channel the bot joins.
    #[arg(long, env = "CHATKEEP_CHANNEL", default_value = "")]
    pub channel: String,

    /// Scopes requested for the bot identity (comma separated).
    #[arg(long, env = "CHATKEEP_BOT_SCOPES", value_delimiter = ',', default_value = DEFAULT_BOT_SCOPES)]
    pub bot_scopes: Vec<String>,

    /// Scopes requested for the broadcaster identity (comma separated).
    #[arg(
        long,
        env = "CHATKEEP_BROADCASTER_SCOPES",
        value_delimiter = ',',
        default_value = DEFAULT_BROADCASTER_SCOPES
    )]
    pub broadcaster_scopes: Vec<String>,

    /// Host address the callback listener binds to.
    #[arg(long, env = "CHATKEEP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Callback listener port.
    #[arg(long, env = "CHATKEEP_OAUTH_PORT", default_value = "8080")]
    pub oauth_port: u16,

    /// Externally reachable hostname for the callback (served over https).
    #[arg(long, env = "CHATKEEP_VIRTUAL_HOST")]
    pub virtual_host: Option<String>,

    /// Credential file (defaults to `<state dir>/tokens.json`).
    #[arg(long, env = "CHATKEEP_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Provider OAuth base URL.
    #[arg(long, env = "CHATKEEP_AUTH_URL", default_value = DEFAULT_AUTH_URL)]
    pub auth_url: String,

    /// Provider API base URL.
    #[arg(long, env = "CHATKEEP_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Chat WebSocket endpoint.
    #[arg(long, env = "CHATKEEP_CHAT_URL", default_value = DEFAULT_CHAT_URL)]
    pub chat_url: String,

    /// Keep credentials fresh without opening a chat connection.
    #[arg(long, env = "CHATKEEP_NO_CHAT")]
    pub no_chat: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CHATKEEP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text or json).
    #[arg(long, env = "CHATKEEP_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    // -- Duration overrides (skip from CLI; set in Config::test()) --------
    #[clap(skip)]
    pub refresh_backoff_ms: Option<u64>,
    #[clap(skip)]
    pub auth_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub callback_grace_ms: Option<u64>,
    #[clap(skip)]
    pub shutdown_timeout_ms: Option<u64>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (value, flag) in [
            (&self.client_id, "--client-id"),
            (&self.client_secret, "--client-secret"),
            (&self.bot_user, "--bot-user"),
            (&self.broadcaster, "--broadcaster"),
            (&self.channel, "--channel"),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{flag} is required");
            }
        }

        if clean_scopes(&self.bot_scopes).is_empty() {
            anyhow::bail!("--bot-scopes must name at least one scope");
        }
        if clean_scopes(&self.broadcaster_scopes).is_empty() {
            anyhow::bail!("--broadcaster-scopes must name at least one scope");
        }

        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid log format: {other} (expected text or json)"),
        }

        Ok(())
    }

    /// Resolved credential file path.
    pub fn token_file(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| state_dir().join("tokens.json"))
    }

    /// Accounts in startup authorization order.
    pub fn accounts(&self) -> Vec<AccountConfig> {
        Identity::ALL
            .into_iter()
            .map(|identity| match identity {
                Identity::Bot => AccountConfig {
                    identity,
                    username: self.bot_user.trim().to_owned(),
                    scopes: clean_scopes(&self.bot_scopes),
                },
                Identity::Broadcaster => AccountConfig {
                    identity,
                    username: self.broadcaster.trim().to_owned(),
                    scopes: clean_scopes(&self.broadcaster_scopes),
                },
            })
            .collect()
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            host: self.host.clone(),
            port: self.oauth_port,
            virtual_host: self.virtual_host.clone().filter(|v| !v.is_empty()),
            timeout: self.auth_timeout(),
            grace: self.callback_grace(),
        }
    }

    pub fn twitch_settings(&self) -> TwitchSettings {
        TwitchSettings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_url: self.auth_url.clone(),
            api_url: self.api_url.clone(),
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            url: self.chat_url.clone(),
            nick: self.bot_user.trim().to_owned(),
            channel: self.channel.trim().to_owned(),
        }
    }

    duration_field!(refresh_backoff, refresh_backoff_ms, "CHATKEEP_REFRESH_BACKOFF_MS", 30_000);
    duration_field!(auth_timeout, auth_timeout_ms, "CHATKEEP_AUTH_TIMEOUT_MS", 600_000);
    duration_field!(callback_grace, callback_grace_ms, "CHATKEEP_CALLBACK_GRACE_MS", 2_000);
    duration_field!(shutdown_timeout, shutdown_timeout_ms, "CHATKEEP_SHUTDOWN_TIMEOUT_MS", 10_000);

    /// Build a minimal `Config` for tests (loopback listener on port 0, no chat).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            client_id: "test-client".into(),
            client_secret: "test-secret".into(),
            bot_user: "botty".into(),
            broadcaster: "streamer".into(),
            channel: "streamer".into(),
            bot_scopes: vec!["chat:read".into(), "chat:edit".into()],
            broadcaster_scopes: vec!["channel:bot".into()],
            host: "127.0.0.1".into(),
            oauth_port: 0,
            virtual_host: None,
            token_file: None,
            auth_url: DEFAULT_AUTH_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            chat_url: DEFAULT_CHAT_URL.into(),
            no_chat: true,
            log_level: "debug".into(),
            log_format: "text".into(),
            refresh_backoff_ms: Some(50),
            auth_timeout_ms: Some(5_000),
            callback_grace_ms: Some(10),
            shutdown_timeout_ms: Some(500),
        }
    }
}

/// Trim scope entries and drop empty ones.
fn clean_scopes(scopes: &[String]) -> Vec<String> {
    scopes.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
