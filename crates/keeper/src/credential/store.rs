// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide credential store shared by the orchestrator, the renewal
//! tasks and the chat connection.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::credential::persist::{self, PersistedCredentials};
use crate::credential::{CredentialRecord, Identity};

/// Holds one [`CredentialRecord`] per identity behind a single reader/writer lock.
///
/// Writes go through [`CredentialStore::set`], which flushes the whole store
/// to disk before swapping the in-memory value. Reads always return copies.
pub struct CredentialStore {
    records: RwLock<PersistedCredentials>,
    path: PathBuf,
}

impl CredentialStore {
    /// Create an empty store that persists to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { records: RwLock::new(PersistedCredentials::new()), path: path.into() }
    }

    /// Open the store at `path`, seeding it from disk.
    ///
    /// A missing or malformed file yields an empty store: both identities then
    /// go through interactive authorization.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match persist::load(&path) {
            Ok(records) => {
                info!(path = %path.display(), count = records.len(), "loaded persisted credentials");
                records
            }
            Err(e) if is_not_found(&e) => {
                debug!(path = %path.display(), "no persisted credentials");
                PersistedCredentials::new()
            }
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable credentials file: {e}");
                PersistedCredentials::new()
            }
        };
        Self { records: RwLock::new(records), path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the record for `identity` (empty record when unset).
    pub async fn get(&self, identity: Identity) -> CredentialRecord {
        self.records.read().await.get(&identity).cloned().unwrap_or_default()
    }

    /// Whether `identity` holds a record that is usable right now.
    pub async fn is_valid(&self, identity: Identity) -> bool {
        self.records.read().await.get(&identity).is_some_and(CredentialRecord::is_valid)
    }

    /// Replace the record for `identity` and persist the whole store.
    ///
    /// The file is written before the in-memory swap, under the write lock, so
    /// disk never runs ahead of memory and concurrent setters flush in order.
    /// The write itself runs on the blocking pool. A failed flush is logged and
    /// the in-memory update still applies. Returns whether the record reached disk.
    pub async fn set(&self, identity: Identity, record: CredentialRecord) -> bool {
        let mut records = self.records.write().await;

        let mut next = records.clone();
        next.insert(identity, record.clone());

        let path = self.path.clone();
        let flushed = tokio::task::spawn_blocking(move || persist::save(&path, &next))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|result| result);

        let persisted = match flushed {
            Ok(()) => {
                debug!(%identity, path = %self.path.display(), "persisted credentials");
                true
            }
            Err(e) => {
                warn!(%identity, path = %self.path.display(), "failed to persist credentials: {e:#}");
                false
            }
        };

        records.insert(identity, record);
        persisted
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>().is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
