// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted provider, a recording token sink
//! and assertion helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

use crate::connection::TokenSink;
use crate::credential::CredentialRecord;
use crate::error::ProviderError;
use crate::provider::{Provider, TokenGrant, UserIdentity};

/// Build a successful grant.
pub fn grant(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenGrant {
    TokenGrant {
        access_token: access.to_owned(),
        refresh_token: refresh.map(str::to_owned),
        expires_in,
    }
}

/// A record for `username` that expires `secs` from now (negative for past).
pub fn record_expiring_in(secs: i64, username: &str) -> CredentialRecord {
    CredentialRecord {
        access_token: format!("access-{username}"),
        refresh_token: format!("refresh-{username}"),
        expires_at: Utc::now() + chrono::Duration::seconds(secs),
        subject_user_id: format!("id-{username}"),
        subject_username: username.to_owned(),
    }
}

/// Scripted responses for one provider operation.
///
/// Pops in order; the last entry repeats once the script runs out.
struct Script<T> {
    queue: VecDeque<T>,
    last: Option<T>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self { queue: VecDeque::new(), last: None }
    }

    fn push(&mut self, item: T) {
        self.queue.push_back(item);
    }

    fn next(&mut self) -> Option<T> {
        match self.queue.pop_front() {
            Some(item) => {
                self.last = Some(item.clone());
                Some(item)
            }
            None => self.last.clone(),
        }
    }
}

/// In-memory [`Provider`] with scripted results and call counters.
pub struct MockProvider {
    exchange: Mutex<Script<Result<TokenGrant, ProviderError>>>,
    lookup: Mutex<Script<Result<UserIdentity, ProviderError>>>,
    refresh: Mutex<Script<Result<TokenGrant, ProviderError>>>,
    refresh_delay: Duration,
    /// `(redirect_uri, state)` per authorization URL built.
    authorizations: Mutex<Vec<(String, String)>>,
    /// Call log: `exchange:<code>`, `lookup:<token>`, `refresh:<token>`.
    calls: Mutex<Vec<String>>,
    refresh_count: AtomicU32,
    exchange_count: AtomicU32,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            exchange: Mutex::new(Script::new()),
            lookup: Mutex::new(Script::new()),
            refresh: Mutex::new(Script::new()),
            refresh_delay: Duration::ZERO,
            authorizations: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            refresh_count: AtomicU32::new(0),
            exchange_count: AtomicU32::new(0),
        }
    }

    pub fn exchange(self, result: Result<TokenGrant, ProviderError>) -> Self {
        self.exchange.lock().push(result);
        self
    }

    pub fn identity(self, user_id: &str, username: &str) -> Self {
        self.lookup.lock().push(Ok(UserIdentity {
            user_id: user_id.to_owned(),
            username: username.to_owned(),
        }));
        self
    }

    pub fn lookup_error(self, err: ProviderError) -> Self {
        self.lookup.lock().push(Err(err));
        self
    }

    pub fn refresh(self, result: Result<TokenGrant, ProviderError>) -> Self {
        self.refresh.lock().push(result);
        self
    }

    /// Delay every refresh call by `delay`.
    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    pub fn exchange_count(&self) -> u32 {
        self.exchange_count.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn authorizations(&self) -> Vec<(String, String)> {
        self.authorizations.lock().clone()
    }
}

fn unscripted(op: &str) -> ProviderError {
    ProviderError::Transport(format!("no scripted {op} response"))
}

impl Provider for MockProvider {
    fn authorization_url(&self, scopes: &[String], redirect_uri: &str, state: &str) -> String {
        self.authorizations.lock().push((redirect_uri.to_owned(), state.to_owned()));
        format!(
            "https://auth.test/authorize?redirect_uri={}&scope={}&state={}",
            crate::provider::urlencoding(redirect_uri),
            crate::provider::urlencoding(&scopes.join(" ")),
            state
        )
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        _redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ProviderError>> {
        self.exchange_count.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().push(format!("exchange:{code}"));
        let result = self.exchange.lock().next().unwrap_or_else(|| Err(unscripted("exchange")));
        async move { result }.boxed()
    }

    fn lookup_identity<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<UserIdentity, ProviderError>> {
        self.calls.lock().push(format!("lookup:{access_token}"));
        let result = self.lookup.lock().next().unwrap_or_else(|| Err(unscripted("lookup")));
        async move { result }.boxed()
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ProviderError>> {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().push(format!("refresh:{refresh_token}"));
        let result = self.refresh.lock().next().unwrap_or_else(|| Err(unscripted("refresh")));
        let delay = self.refresh_delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        }
        .boxed()
    }
}

/// [`TokenSink`] that records every token it receives.
#[derive(Default)]
pub struct RecordingSink {
    tokens: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }
}

impl TokenSink for RecordingSink {
    fn apply_new_token(&self, access_token: &str) {
        self.tokens.lock().push(access_token.to_owned());
    }
}

/// Assert that an expression returns `Err` whose message contains a substring.
///
/// ```ignore
/// assert_err_contains!(config.validate(), "--channel");
/// ```
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
