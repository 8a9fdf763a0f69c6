// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::ProviderError;
use crate::test_support::{grant, MockProvider};

fn params(expected: &str) -> SessionParams {
    SessionParams {
        identity: Identity::Bot,
        expected_username: expected.to_owned(),
        redirect_uri: "http://localhost:8080/callback".to_owned(),
        state: "s3cret-state".to_owned(),
        authorize_url: "https://auth.test/authorize".to_owned(),
    }
}

fn code_query(code: &str) -> CallbackQuery {
    CallbackQuery {
        code: Some(code.to_owned()),
        state: Some("s3cret-state".to_owned()),
        ..CallbackQuery::default()
    }
}

fn session(provider: MockProvider, expected: &str) -> (AuthSession, Arc<MockProvider>) {
    let provider = Arc::new(provider);
    let session = AuthSession::new(params(expected), provider.clone(), Duration::ZERO);
    (session, provider)
}

#[tokio::test]
async fn matching_account_produces_record() -> anyhow::Result<()> {
    let (session, provider) = session(
        MockProvider::new()
            .exchange(Ok(grant("acc", Some("ref"), 14400)))
            .identity("42", "Bob"),
        "bob",
    );

    let before = Utc::now();
    let (status, body) = session.handle_callback(code_query("ABC")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Authorized"));
    let record = session.outcome().await.ok_or_else(|| anyhow::anyhow!("no outcome"))??;
    assert_eq!(record.access_token, "acc");
    assert_eq!(record.refresh_token, "ref");
    assert_eq!(record.subject_user_id, "42");
    assert_eq!(record.subject_username, "Bob");
    let lifetime = (record.expires_at - before).num_seconds();
    assert!((14399..=14401).contains(&lifetime), "lifetime {lifetime}");
    assert_eq!(provider.calls(), vec!["exchange:ABC".to_owned(), "lookup:acc".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn wrong_account_is_rejected() {
    let (session, _provider) = session(
        MockProvider::new().exchange(Ok(grant("acc", Some("ref"), 3600))).identity("7", "alice"),
        "bob",
    );

    let (status, body) = session.handle_callback(code_query("ABC")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("wrong account authorized: expected bob, got alice"));
    assert_eq!(
        session.outcome().await,
        Some(Err(AuthError::WrongAccount { expected: "bob".into(), actual: "alice".into() }))
    );
}

#[tokio::test]
async fn exchange_without_refresh_token_fails() {
    let (session, provider) = session(
        MockProvider::new().exchange(Ok(grant("acc", None, 14400))).identity("42", "bob"),
        "bob",
    );

    let (status, _body) = session.handle_callback(code_query("ABC")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        session.outcome().await,
        Some(Err(AuthError::Exchange(ProviderError::Decode("missing refresh_token".into()))))
    );
    assert_eq!(provider.calls(), vec!["exchange:ABC".to_owned()]);
}

#[tokio::test]
async fn provider_error_param_wins_over_code() {
    let (session, provider) = session(MockProvider::new(), "bob");

    let query = CallbackQuery {
        code: Some("ABC".into()),
        error: Some("access_denied".into()),
        error_description: Some("The user denied you access".into()),
        ..CallbackQuery::default()
    };
    let (status, _body) = session.handle_callback(query).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(provider.exchange_count(), 0);
    assert_eq!(
        session.outcome().await,
        Some(Err(AuthError::Denied {
            error: "access_denied".into(),
            description: "The user denied you access".into()
        }))
    );
}

#[tokio::test]
async fn missing_code_fails() {
    let (session, provider) = session(MockProvider::new(), "bob");

    let (status, body) = session.handle_callback(CallbackQuery::default()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("no authorization code received"));
    assert_eq!(provider.exchange_count(), 0);
}

#[tokio::test]
async fn state_mismatch_fails_before_exchange() {
    let (session, provider) = session(MockProvider::new(), "bob");

    let query = CallbackQuery {
        code: Some("ABC".into()),
        state: Some("forged".into()),
        ..CallbackQuery::default()
    };
    session.handle_callback(query).await;

    assert_eq!(provider.exchange_count(), 0);
    assert_eq!(session.outcome().await, Some(Err(AuthError::StateMismatch)));
}

#[tokio::test]
async fn exchange_failure_maps_to_bad_gateway() {
    let (session, _provider) = session(
        MockProvider::new().exchange(Err(ProviderError::Api {
            status: 400,
            message: "Invalid authorization code".into(),
        })),
        "bob",
    );

    let (status, _body) = session.handle_callback(code_query("ABC")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(matches!(session.outcome().await, Some(Err(AuthError::Exchange(_)))));
}

#[tokio::test]
async fn second_callback_replays_first_outcome() {
    let (session, provider) = session(
        MockProvider::new().exchange(Ok(grant("acc", Some("ref"), 3600))).identity("42", "bob"),
        "bob",
    );

    let first = session.handle_callback(code_query("ABC")).await;
    let second = session.handle_callback(code_query("XYZ")).await;

    assert_eq!(first, second);
    assert_eq!(provider.exchange_count(), 1);
}

#[tokio::test]
async fn finished_fires_after_grace() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new());
    let session = AuthSession::new(params("bob"), provider, Duration::from_millis(50));

    session.handle_callback(CallbackQuery::default()).await;
    assert!(!session.finished().is_cancelled());

    tokio::time::timeout(Duration::from_secs(2), session.finished().cancelled()).await?;
    Ok(())
}

#[tokio::test]
async fn error_page_shows_last_failure() {
    let (session, _provider) = session(MockProvider::new(), "bob");
    assert!(session.error_page().await.contains("No authorization failure recorded"));

    session.handle_callback(CallbackQuery::default()).await;

    assert!(session.error_page().await.contains("no authorization code received"));
}
