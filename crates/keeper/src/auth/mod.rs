// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup authorization: make sure every identity holds a valid credential
//! for the configured account before anything else runs.
//!
//! Identities are handled one after the other, so at most one callback
//! listener exists at a time. For each identity that is not already valid:
//!
//! 1. try one silent refresh with the stored refresh token;
//! 2. otherwise bind the callback listener, log the authorization URL and
//!    wait for the browser to come back.
//!
//! Any interactive failure is returned to the caller; a human has to act.

pub mod pages;
pub mod server;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::server::AuthSessionServer;
use crate::auth::session::{AuthSession, SessionParams};
use crate::credential::store::CredentialStore;
use crate::credential::{CredentialRecord, Identity};
use crate::error::AuthError;
use crate::provider::{generate_state, Provider};

/// The account an identity must be authorized as, and with which scopes.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub identity: Identity,
    pub username: String,
    pub scopes: Vec<String>,
}

/// Callback listener and timing settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub host: String,
    pub port: u16,
    /// External hostname; the redirect becomes `https://<vhost>/callback`.
    pub virtual_host: Option<String>,
    /// Overall bound on one interactive session.
    pub timeout: Duration,
    /// Delay between rendering the result page and closing the listener.
    pub grace: Duration,
}

/// How an identity ended up with a valid credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    AlreadyValid,
    Refreshed,
    Authorized,
}

pub struct Orchestrator {
    store: Arc<CredentialStore>,
    provider: Arc<dyn Provider>,
    settings: AuthSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<CredentialStore>,
        provider: Arc<dyn Provider>,
        settings: AuthSettings,
    ) -> Self {
        Self { store, provider, settings }
    }

    /// Resolve every account in order. Stops at the first failure.
    pub async fn ensure_all(
        &self,
        accounts: &[AccountConfig],
        shutdown: &CancellationToken,
    ) -> Result<(), AuthError> {
        for account in accounts {
            let resolution = self.ensure(account, shutdown).await?;
            info!(identity = %account.identity, ?resolution, "credential ready");
        }
        Ok(())
    }

    /// Make sure `account` holds a valid credential.
    pub async fn ensure(
        &self,
        account: &AccountConfig,
        shutdown: &CancellationToken,
    ) -> Result<Resolution, AuthError> {
        let current = self.store.get(account.identity).await;
        let ours = current.belongs_to(&account.username);

        if ours && current.is_valid() {
            return Ok(Resolution::AlreadyValid);
        }
        if !ours && !current.subject_username.is_empty() {
            info!(
                identity = %account.identity,
                stored = %current.subject_username,
                configured = %account.username,
                "stored credential is for a different account"
            );
        }

        if ours && !current.refresh_token.is_empty() {
            match self.silent_refresh(account.identity, &current).await {
                Ok(()) => return Ok(Resolution::Refreshed),
                Err(e) => {
                    warn!(identity = %account.identity, err = %e, "refresh failed, authorization needed")
                }
            }
        }

        let record = self.interactive(account, shutdown).await?;
        self.store.set(account.identity, record).await;
        Ok(Resolution::Authorized)
    }

    async fn silent_refresh(
        &self,
        identity: Identity,
        current: &CredentialRecord,
    ) -> Result<(), crate::error::ProviderError> {
        let grant = self.provider.refresh(&current.refresh_token).await?;
        let record = CredentialRecord::issued_at(
            Utc::now(),
            grant.access_token,
            grant.refresh_token.unwrap_or_else(|| current.refresh_token.clone()),
            grant.expires_in,
            current.subject_user_id.clone(),
            current.subject_username.clone(),
        );
        info!(%identity, expires_at = %record.expires_at, "credential refreshed at startup");
        self.store.set(identity, record).await;
        Ok(())
    }

    /// Run one browser authorization for `account`.
    async fn interactive(
        &self,
        account: &AccountConfig,
        shutdown: &CancellationToken,
    ) -> Result<CredentialRecord, AuthError> {
        let server = AuthSessionServer::bind(&self.settings.host, self.settings.port).await?;
        let redirect_uri = server.redirect_uri(self.settings.virtual_host.as_deref());
        let state = generate_state();
        let authorize_url = self.provider.authorization_url(&account.scopes, &redirect_uri, &state);

        info!(
            identity = %account.identity,
            username = %account.username,
            listen = %server.local_addr(),
            "authorization required, open: {authorize_url}"
        );

        let session = Arc::new(AuthSession::new(
            SessionParams {
                identity: account.identity,
                expected_username: account.username.clone(),
                redirect_uri,
                state,
                authorize_url,
            },
            Arc::clone(&self.provider),
            self.settings.grace,
        ));
        server.run(session, self.settings.timeout, shutdown).await
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
