// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live connections that consume access tokens.

pub mod irc;

use std::sync::Arc;

use tokio::sync::watch;

/// Receives renewed access tokens.
///
/// Implementations must tolerate calls concurrent with in-flight sends and
/// must not force a reconnect.
pub trait TokenSink: Send + Sync {
    fn apply_new_token(&self, access_token: &str);
}

/// Current access token for one identity, shared with whoever sends with it.
///
/// Updates become visible to the next reader; nothing already in flight is
/// interrupted.
#[derive(Clone)]
pub struct LiveToken {
    tx: Arc<watch::Sender<String>>,
}

impl LiveToken {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(initial.into());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl TokenSink for LiveToken {
    fn apply_new_token(&self, access_token: &str) {
        self.tx.send_replace(access_token.to_owned());
    }
}

impl std::fmt::Debug for LiveToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveToken").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
