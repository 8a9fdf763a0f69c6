// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use super::*;

/// Requests seen by the mock server, as `(path, body-or-auth-header)`.
type Seen = Arc<Mutex<Vec<(String, String)>>>;

/// Serve scripted `(status, body)` responses on `/token` and `/users`.
async fn mock_twitch(
    token_responses: Vec<(u16, String)>,
    users_response: (u16, String),
) -> (SocketAddr, Arc<AtomicU32>, Seen) {
    let call_count = Arc::new(AtomicU32::new(0));
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let responses = Arc::new(token_responses);

    let token_count = Arc::clone(&call_count);
    let token_seen = Arc::clone(&seen);
    let users_seen = Arc::clone(&seen);
    let users_response = Arc::new(users_response);

    let app = Router::new()
        .route(
            "/oauth2/token",
            post(move |body: String| {
                let count = Arc::clone(&token_count);
                let resps = Arc::clone(&responses);
                let seen = Arc::clone(&token_seen);
                async move {
                    seen.lock().expect("lock").push(("/token".to_owned(), body));
                    let idx = count.fetch_add(1, Ordering::Relaxed) as usize;
                    let (status, body) = resps
                        .get(idx)
                        .or(resps.last())
                        .cloned()
                        .unwrap_or((500, "{}".to_owned()));
                    (StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), body)
                }
            }),
        )
        .route(
            "/helix/users",
            get(move |headers: HeaderMap| {
                let seen = Arc::clone(&users_seen);
                let resp = Arc::clone(&users_response);
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_owned();
                    let client = headers
                        .get("client-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_owned();
                    seen.lock().expect("lock").push(("/users".to_owned(), format!("{auth}|{client}")));
                    let (status, body) = (*resp).clone();
                    (StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), body)
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (addr, call_count, seen)
}

fn provider_for(addr: SocketAddr) -> TwitchProvider {
    TwitchProvider::new(TwitchSettings {
        client_id: "cid".into(),
        client_secret: "csecret".into(),
        auth_url: format!("http://{addr}/oauth2"),
        api_url: format!("http://{addr}/helix"),
    })
    .expect("provider")
}

fn unused_users() -> (u16, String) {
    (500, "{}".to_owned())
}

#[test]
fn authorization_url_carries_all_parameters() {
    let provider = TwitchProvider::new(TwitchSettings {
        client_id: "cid".into(),
        client_secret: "csecret".into(),
        auth_url: DEFAULT_AUTH_URL.into(),
        api_url: DEFAULT_API_URL.into(),
    })
    .expect("provider");

    let scopes = vec!["chat:read".to_owned(), "chat:edit".to_owned()];
    let url = provider.authorization_url(&scopes, "http://localhost:8080/callback", "abc");

    assert!(url.starts_with("https://id.twitch.tv/oauth2/authorize?"));
    assert!(url.contains("client_id=cid"));
    assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("scope=chat%3Aread+chat%3Aedit"));
    assert!(url.contains("state=abc"));
    assert!(!url.contains("csecret"));
}

#[tokio::test]
async fn exchange_code_posts_authorization_code_grant() {
    let body = serde_json::json!({
        "access_token": "new-access",
        "refresh_token": "new-refresh",
        "expires_in": 14400,
        "scope": ["chat:read"],
        "token_type": "bearer"
    })
    .to_string();
    let (addr, calls, seen) = mock_twitch(vec![(200, body)], unused_users()).await;
    let provider = provider_for(addr);

    let grant = provider.exchange_code("the-code", "http://localhost:8080/callback").await;

    let grant = grant.expect("grant");
    assert_eq!(grant.access_token, "new-access");
    assert_eq!(grant.refresh_token.as_deref(), Some("new-refresh"));
    assert_eq!(grant.expires_in, 14400);
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    let seen = seen.lock().expect("lock").clone();
    let form = &seen[0].1;
    assert!(form.contains("grant_type=authorization_code"));
    assert!(form.contains("code=the-code"));
    assert!(form.contains("client_secret=csecret"));
    assert!(form.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
}

#[tokio::test]
async fn refresh_without_new_refresh_token_returns_none() {
    let body = serde_json::json!({ "access_token": "rotated", "expires_in": 3600 }).to_string();
    let (addr, _calls, seen) = mock_twitch(vec![(200, body)], unused_users()).await;
    let provider = provider_for(addr);

    let grant = provider.refresh("old-refresh").await.expect("grant");

    assert_eq!(grant.access_token, "rotated");
    assert_eq!(grant.refresh_token, None);
    let seen = seen.lock().expect("lock").clone();
    assert!(seen[0].1.contains("grant_type=refresh_token"));
    assert!(seen[0].1.contains("refresh_token=old-refresh"));
}

#[tokio::test]
async fn refresh_error_envelope_maps_to_api_error() {
    let body = serde_json::json!({ "status": 400, "message": "Invalid refresh token" }).to_string();
    let (addr, _calls, _seen) = mock_twitch(vec![(400, body)], unused_users()).await;
    let provider = provider_for(addr);

    let err = provider.refresh("revoked").await.err();

    assert_eq!(
        err,
        Some(ProviderError::Api { status: 400, message: "Invalid refresh token".into() })
    );
}

#[tokio::test]
async fn oauth_style_error_uses_description() {
    let body = serde_json::json!({
        "error": "invalid_grant",
        "error_description": "Token revoked"
    })
    .to_string();
    let (addr, _calls, _seen) = mock_twitch(vec![(401, body)], unused_users()).await;
    let provider = provider_for(addr);

    let err = provider.refresh("revoked").await.err();

    assert_eq!(err, Some(ProviderError::Api { status: 401, message: "Token revoked".into() }));
}

#[tokio::test]
async fn non_json_error_keeps_raw_body() {
    let (addr, _calls, _seen) =
        mock_twitch(vec![(503, "upstream down".to_owned())], unused_users()).await;
    let provider = provider_for(addr);

    let err = provider.refresh("r").await.err();

    assert_eq!(err, Some(ProviderError::Api { status: 503, message: "upstream down".into() }));
}

#[tokio::test]
async fn malformed_success_body_is_decode_error() {
    let (addr, _calls, _seen) = mock_twitch(vec![(200, "not json".to_owned())], unused_users()).await;
    let provider = provider_for(addr);

    let err = provider.refresh("r").await.err();

    assert!(matches!(err, Some(ProviderError::Decode(_))), "got {err:?}");
}

async fn refresh_err_for(body: serde_json::Value) -> Option<ProviderError> {
    let (addr, _calls, _seen) = mock_twitch(vec![(200, body.to_string())], unused_users()).await;
    provider_for(addr).refresh("r").await.err()
}

#[tokio::test]
async fn token_without_expires_in_is_decode_error() {
    let err = refresh_err_for(serde_json::json!({ "access_token": "a", "refresh_token": "r" })).await;
    assert_eq!(err, Some(ProviderError::Decode("missing expires_in".into())));
}

#[tokio::test]
async fn token_with_zero_lifetime_is_decode_error() {
    let err =
        refresh_err_for(serde_json::json!({ "access_token": "a", "refresh_token": "r", "expires_in": 0 }))
            .await;
    assert_eq!(err, Some(ProviderError::Decode("missing expires_in".into())));
}

#[tokio::test]
async fn lookup_identity_sends_bearer_and_client_id() {
    let users = serde_json::json!({
        "data": [{ "id": "1234", "login": "alice", "display_name": "Alice" }]
    })
    .to_string();
    let (addr, _calls, seen) = mock_twitch(vec![], (200, users)).await;
    let provider = provider_for(addr);

    let identity = provider.lookup_identity("access-xyz").await.expect("identity");

    assert_eq!(identity, UserIdentity { user_id: "1234".into(), username: "alice".into() });
    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen, vec![("/users".to_owned(), "Bearer access-xyz|cid".to_owned())]);
}

#[tokio::test]
async fn lookup_identity_with_no_users_is_decode_error() {
    let users = serde_json::json!({ "data": [] }).to_string();
    let (addr, _calls, _seen) = mock_twitch(vec![], (200, users)).await;
    let provider = provider_for(addr);

    let err = provider.lookup_identity("access").await.err();

    assert!(matches!(err, Some(ProviderError::Decode(_))), "got {err:?}");
}

#[tokio::test]
async fn unreachable_provider_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let provider = provider_for(addr);

    let err = provider.refresh("r").await.err();

    assert!(matches!(err, Some(ProviderError::Transport(_))), "got {err:?}");
}
