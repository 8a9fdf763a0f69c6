// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One interactive authorization attempt for a single identity.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::pages;
use crate::credential::{CredentialRecord, Identity};
use crate::error::{AuthError, ProviderError};
use crate::provider::Provider;

/// What a session expects from the callback.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub identity: Identity,
    /// Login the provider must report for the authorized token.
    pub expected_username: String,
    pub redirect_uri: String,
    /// CSRF value embedded in `authorize_url`.
    pub state: String,
    pub authorize_url: String,
}

/// Query string of `GET /callback`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub type Outcome = Result<CredentialRecord, AuthError>;

/// Shared state behind the session server's handlers.
///
/// Accepts exactly one callback. The first outcome is final; later hits
/// re-render it. `finished` fires `grace` after the outcome is recorded so
/// the result page reaches the browser before the listener closes.
pub struct AuthSession {
    params: SessionParams,
    provider: Arc<dyn Provider>,
    outcome: Mutex<Option<Outcome>>,
    finished: CancellationToken,
    grace: Duration,
}

impl AuthSession {
    pub fn new(params: SessionParams, provider: Arc<dyn Provider>, grace: Duration) -> Self {
        Self {
            params,
            provider,
            outcome: Mutex::new(None),
            finished: CancellationToken::new(),
            grace,
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Token cancelled once the session has an outcome and the grace delay elapsed.
    pub fn finished(&self) -> &CancellationToken {
        &self.finished
    }

    /// The recorded outcome, if any.
    pub async fn outcome(&self) -> Option<Outcome> {
        self.outcome.lock().await.clone()
    }

    pub fn landing_page(&self) -> String {
        pages::authorize_page(
            self.params.identity,
            &self.params.expected_username,
            &self.params.authorize_url,
        )
    }

    /// Render the last failure, if the session failed.
    pub async fn error_page(&self) -> String {
        match self.outcome.lock().await.as_ref() {
            Some(Err(e)) => pages::failure_page(e),
            _ => pages::no_error_page(),
        }
    }

    /// Handle a hit on the callback endpoint.
    ///
    /// The outcome lock is held across the code exchange so concurrent hits
    /// are serialized and only the first one reaches the provider.
    pub async fn handle_callback(&self, query: CallbackQuery) -> (StatusCode, String) {
        let mut slot = self.outcome.lock().await;
        if let Some(ref outcome) = *slot {
            return self.render(outcome);
        }

        let outcome = self.complete(query).await;
        match &outcome {
            Ok(record) => info!(
                identity = %self.params.identity,
                username = %record.subject_username,
                expires_at = %record.expires_at,
                "authorization complete"
            ),
            Err(e) => warn!(identity = %self.params.identity, err = %e, "authorization failed"),
        }
        let response = self.render(&outcome);
        *slot = Some(outcome);
        drop(slot);

        let finished = self.finished.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            finished.cancel();
        });
        response
    }

    /// Turn a callback into a credential record.
    async fn complete(&self, query: CallbackQuery) -> Outcome {
        if let Some(error) = query.error {
            return Err(AuthError::Denied {
                error,
                description: query.error_description.unwrap_or_default(),
            });
        }
        let code = match query.code {
            Some(code) if !code.is_empty() => code,
            _ => return Err(AuthError::MissingCode),
        };
        if query.state.as_deref() != Some(self.params.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }

        let grant = self
            .provider
            .exchange_code(&code, &self.params.redirect_uri)
            .await
            .map_err(AuthError::Exchange)?;
        let Some(refresh_token) = grant.refresh_token else {
            return Err(AuthError::Exchange(ProviderError::Decode("missing refresh_token".to_owned())));
        };
        let now = Utc::now();
        let user = self
            .provider
            .lookup_identity(&grant.access_token)
            .await
            .map_err(AuthError::Lookup)?;

        if !user.username.eq_ignore_ascii_case(&self.params.expected_username) {
            return Err(AuthError::WrongAccount {
                expected: self.params.expected_username.clone(),
                actual: user.username,
            });
        }

        Ok(CredentialRecord::issued_at(
            now,
            grant.access_token,
            refresh_token,
            grant.expires_in,
            user.user_id,
            user.username,
        ))
    }

    fn render(&self, outcome: &Outcome) -> (StatusCode, String) {
        match outcome {
            Ok(record) => (
                StatusCode::OK,
                pages::success_page(self.params.identity, &record.subject_username),
            ),
            Err(e) => (
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                pages::failure_page(e),
            ),
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
