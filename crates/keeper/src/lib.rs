// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle for a chat bot: startup authorization of the bot and
//! broadcaster accounts, background renewal, and the live chat connection
//! that consumes the bot token.

pub mod auth;
pub mod config;
pub mod connection;
pub mod credential;
pub mod error;
pub mod provider;
pub mod renewal;
pub mod test_support;

use std::sync::{Arc, Once};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::auth::Orchestrator;
use crate::config::Config;
use crate::connection::irc::ChatConnection;
use crate::connection::{LiveToken, TokenSink};
use crate::credential::store::CredentialStore;
use crate::credential::Identity;
use crate::provider::twitch::TwitchProvider;
use crate::provider::Provider;

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider (needed by reqwest and wss).
pub fn ensure_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run until SIGINT/SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    ensure_crypto();
    let provider: Arc<dyn Provider> = Arc::new(TwitchProvider::new(config.twitch_settings())?);
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    run_with(config, provider, shutdown).await
}

/// Run with an explicit provider and shutdown signal.
///
/// Authorization runs first and must succeed for both identities; then the
/// renewal tasks and the chat connection run until `shutdown` is cancelled.
pub async fn run_with(
    config: Config,
    provider: Arc<dyn Provider>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let token_file = config.token_file();
    info!(path = %token_file.display(), "opening credential store");
    let store = Arc::new(CredentialStore::open(token_file));

    let orchestrator =
        Orchestrator::new(Arc::clone(&store), Arc::clone(&provider), config.auth_settings());
    orchestrator.ensure_all(&config.accounts(), &shutdown).await?;

    let bot_token = LiveToken::new(store.get(Identity::Bot).await.access_token);
    let broadcaster_token = LiveToken::new(store.get(Identity::Broadcaster).await.access_token);

    let mut handles: Vec<JoinHandle<()>> = renewal::spawn_all(
        &store,
        &provider,
        vec![
            (Identity::Bot, Arc::new(bot_token.clone()) as Arc<dyn TokenSink>),
            (Identity::Broadcaster, Arc::new(broadcaster_token) as Arc<dyn TokenSink>),
        ],
        config.refresh_backoff(),
        &shutdown,
    );

    if config.no_chat {
        info!("chat connection disabled");
    } else {
        let chat = ChatConnection::new(config.chat_settings(), bot_token);
        handles.push(tokio::spawn(chat.run(shutdown.clone())));
    }

    info!("running");
    shutdown.cancelled().await;
    info!("shutting down");

    let grace = config.shutdown_timeout();
    let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
    let joined = tokio::time::timeout(grace, futures_util::future::join_all(handles)).await;
    if joined.is_err() {
        warn!(grace_ms = grace.as_millis() as u64, "tasks did not stop in time, aborting");
        for abort in aborts {
            abort.abort();
        }
    }
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
