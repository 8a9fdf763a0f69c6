// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential records for the two chat identities and their durable store.
//!
//! A record is only considered usable while more than [`RENEWAL_MARGIN`]
//! remains before expiry. The same margin drives the renewal scheduler, so a
//! record that has entered its renewal window already reads as invalid.

pub mod persist;
pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time before expiry at which a record stops being valid and gets renewed.
pub const RENEWAL_MARGIN: Duration = Duration::from_secs(10 * 60);

/// One of the two roles that each hold their own credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Bot,
    Broadcaster,
}

impl Identity {
    /// Startup authorization order: bot first, then broadcaster.
    pub const ALL: [Identity; 2] = [Identity::Bot, Identity::Broadcaster];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Broadcaster => "broadcaster",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens and subject for one identity.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "user_id")]
    pub subject_user_id: String,
    #[serde(rename = "username")]
    pub subject_username: String,
}

impl CredentialRecord {
    /// Build a record expiring `expires_in_secs` from `now`.
    pub fn issued_at(
        now: DateTime<Utc>,
        access_token: String,
        refresh_token: String,
        expires_in_secs: u64,
        subject_user_id: String,
        subject_username: String,
    ) -> Self {
        let lifetime = i64::try_from(expires_in_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { access_token, refresh_token, expires_at, subject_user_id, subject_username }
    }

    /// Instant at which the renewal window opens.
    pub fn renew_at(&self) -> DateTime<Utc> {
        let margin = chrono::Duration::from_std(RENEWAL_MARGIN).unwrap_or_default();
        self.expires_at.checked_sub_signed(margin).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Both tokens present and `now` strictly before the renewal window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty() && now < self.renew_at()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Delay from `now` until the renewal window opens (zero when already open).
    pub fn renewal_delay(&self, now: DateTime<Utc>) -> Duration {
        (self.renew_at() - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether this record was authorized for `login` (logins are case-insensitive).
    pub fn belongs_to(&self, login: &str) -> bool {
        self.subject_username.eq_ignore_ascii_case(login)
    }
}

// Tokens are secrets; keep them out of debug output and logs.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &redacted(&self.access_token))
            .field("refresh_token", &redacted(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("subject_user_id", &self.subject_user_id)
            .field("subject_username", &self.subject_username)
            .finish()
    }
}

fn redacted(token: &str) -> &'static str {
    if token.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Resolve the state directory for credential data.
///
/// Checks `CHATKEEP_STATE_DIR`, then `$XDG_STATE_HOME/chatkeep`,
/// then `$HOME/.local/state/chatkeep`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CHATKEEP_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("chatkeep");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/chatkeep");
    }
    PathBuf::from(".chatkeep")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
