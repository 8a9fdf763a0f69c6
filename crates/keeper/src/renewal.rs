// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background renewal: one task per identity refreshes its credential when the
//! renewal window opens and pushes the new access token to the live connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::TokenSink;
use crate::credential::store::CredentialStore;
use crate::credential::{CredentialRecord, Identity};
use crate::error::ProviderError;
use crate::provider::Provider;

/// Renewal loop for a single identity.
pub struct RenewalTask {
    identity: Identity,
    store: Arc<CredentialStore>,
    provider: Arc<dyn Provider>,
    sink: Arc<dyn TokenSink>,
    backoff: Duration,
}

impl RenewalTask {
    pub fn new(
        identity: Identity,
        store: Arc<CredentialStore>,
        provider: Arc<dyn Provider>,
        sink: Arc<dyn TokenSink>,
        backoff: Duration,
    ) -> Self {
        Self { identity, store, provider, sink, backoff }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation is checked before every refresh, even when the renewal
    /// window is already open. Consecutive successful renewals are at least one
    /// backoff apart.
    pub async fn run(self, shutdown: CancellationToken) {
        let identity = self.identity;
        info!(%identity, "renewal loop started");

        let mut floor = Duration::ZERO;
        loop {
            let record = self.store.get(identity).await;
            let delay = record.renewal_delay(Utc::now()).max(floor);
            if !delay.is_zero() {
                debug!(%identity, sleep_secs = delay.as_secs(), renew_at = %record.renew_at(), "sleeping until renewal");
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            // Retry the refresh until it succeeds. The stored expiry does not
            // move on failure, so there is nothing new to sleep towards.
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                match self.renew_once().await {
                    Ok(expires_at) => {
                        info!(%identity, %expires_at, attempt, "credential renewed");
                        floor = self.backoff;
                        break;
                    }
                    Err(e) => {
                        warn!(%identity, attempt, err = %e, backoff_ms = self.backoff.as_millis() as u64, "renewal failed, backing off");
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                info!(%identity, "renewal loop stopped");
                                return;
                            }
                            _ = tokio::time::sleep(self.backoff) => {}
                        }
                    }
                }
            }
        }

        info!(%identity, "renewal loop stopped");
    }

    /// Refresh with the stored refresh token, store the result and push the
    /// new access token.
    async fn renew_once(&self) -> Result<chrono::DateTime<Utc>, ProviderError> {
        let current = self.store.get(self.identity).await;
        let grant = self.provider.refresh(&current.refresh_token).await?;
        let record = CredentialRecord::issued_at(
            Utc::now(),
            grant.access_token,
            grant.refresh_token.unwrap_or(current.refresh_token),
            grant.expires_in,
            current.subject_user_id,
            current.subject_username,
        );
        let expires_at = record.expires_at;
        let access_token = record.access_token.clone();
        self.store.set(self.identity, record).await;
        self.sink.apply_new_token(&access_token);
        Ok(expires_at)
    }
}

/// Spawn a renewal task on the runtime.
pub fn spawn_renewal(task: RenewalTask, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(task.run(shutdown))
}

/// Spawn one renewal task per `(identity, sink)` pair.
pub fn spawn_all(
    store: &Arc<CredentialStore>,
    provider: &Arc<dyn Provider>,
    sinks: Vec<(Identity, Arc<dyn TokenSink>)>,
    backoff: Duration,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    sinks
        .into_iter()
        .map(|(identity, sink)| {
            let task = RenewalTask::new(
                identity,
                Arc::clone(store),
                Arc::clone(provider),
                sink,
                backoff,
            );
            spawn_renewal(task, shutdown.clone())
        })
        .collect()
}

#[cfg(test)]
#[path = "renewal_tests.rs"]
mod tests;
