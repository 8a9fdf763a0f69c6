// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-terminating HTTP listener for one authorization session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::auth::session::{AuthSession, CallbackQuery, Outcome};
use crate::error::AuthError;

/// Time allowed for in-flight responses to drain once the session is over.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the session router.
pub fn build_router(session: Arc<AuthSession>) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/callback", get(callback))
        .route("/health", get(health))
        .route("/error", get(last_error))
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

async fn landing(State(s): State<Arc<AuthSession>>) -> Html<String> {
    Html(s.landing_page())
}

async fn callback(
    State(s): State<Arc<AuthSession>>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, Html<String>) {
    let (status, body) = s.handle_callback(query).await;
    (status, Html(body))
}

async fn health() -> &'static str {
    "OK"
}

async fn last_error(State(s): State<Arc<AuthSession>>) -> Html<String> {
    Html(s.error_page().await)
}

/// A bound, not yet serving, callback listener.
///
/// Binding happens first so the redirect URI can name the real port.
pub struct AuthSessionServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl AuthSessionServer {
    pub async fn bind(host: &str, port: u16) -> Result<Self, AuthError> {
        let addr = format!("{host}:{port}");
        let listener =
            TcpListener::bind(&addr).await.map_err(|e| AuthError::Listen(format!("{addr}: {e}")))?;
        let local_addr = listener.local_addr().map_err(|e| AuthError::Listen(e.to_string()))?;
        Ok(Self { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URI the provider sends the browser back to.
    ///
    /// An external virtual host is assumed to terminate TLS in front of us.
    pub fn redirect_uri(&self, virtual_host: Option<&str>) -> String {
        match virtual_host {
            Some(vhost) => format!("https://{}/callback", vhost.trim_end_matches('/')),
            None => format!("http://localhost:{}/callback", self.local_addr.port()),
        }
    }

    /// Serve `session` until it completes, `timeout` elapses or `shutdown` fires.
    ///
    /// An outcome recorded before the timeout or shutdown wins over it. A
    /// callback still exchanging its code holds the outcome lock, so that
    /// exchange is awaited too.
    pub async fn run(
        self,
        session: Arc<AuthSession>,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Outcome {
        let stop = CancellationToken::new();
        let router = build_router(Arc::clone(&session));
        let sd = stop.clone();
        let listener = self.listener;
        let mut server = tokio::spawn(async move {
            let result = axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
            if let Err(e) = result {
                error!("callback server error: {e}");
            }
        });
        debug!(addr = %self.local_addr, identity = %session.params().identity, "callback server listening");

        let outcome = tokio::select! {
            _ = session.finished().cancelled() => {
                session.outcome().await.unwrap_or(Err(AuthError::MissingCode))
            }
            _ = tokio::time::sleep(timeout) => {
                session.outcome().await.unwrap_or(Err(AuthError::TimedOut))
            }
            _ = shutdown.cancelled() => {
                session.outcome().await.unwrap_or(Err(AuthError::Cancelled))
            }
        };

        stop.cancel();
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await.is_err() {
            debug!("callback server did not drain in time");
            server.abort();
        }
        outcome
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
