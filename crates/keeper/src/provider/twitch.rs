// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Twitch identity provider over HTTPS (`id.twitch.tv` + Helix).

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::provider::{urlencoding, Provider, TokenGrant, UserIdentity};

pub const DEFAULT_AUTH_URL: &str = "https://id.twitch.tv/oauth2";
pub const DEFAULT_API_URL: &str = "https://api.twitch.tv/helix";

/// Endpoints and client credentials for [`TwitchProvider`].
#[derive(Debug, Clone)]
pub struct TwitchSettings {
    pub client_id: String,
    pub client_secret: String,
    /// OAuth base, e.g. `https://id.twitch.tv/oauth2`.
    pub auth_url: String,
    /// Helix base, e.g. `https://api.twitch.tv/helix`.
    pub api_url: String,
}

pub struct TwitchProvider {
    settings: TwitchSettings,
    http: reqwest::Client,
}

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Error envelope. Twitch answers `{status, message}`; generic OAuth servers
/// answer `{error, error_description}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    data: Vec<HelixUser>,
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
    login: String,
}

impl TwitchProvider {
    pub fn new(settings: TwitchSettings) -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { settings, http })
    }

    fn token_url(&self) -> String {
        format!("{}/token", self.settings.auth_url.trim_end_matches('/'))
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let resp = self
            .http
            .post(self.token_url())
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body = read_success_body(resp).await?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(ProviderError::Decode("empty access_token".to_owned()));
        }
        let expires_in = match token.expires_in {
            Some(secs) if secs > 0 => secs,
            _ => return Err(ProviderError::Decode("missing expires_in".to_owned())),
        };
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_in,
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<UserIdentity, ProviderError> {
        let url = format!("{}/users", self.settings.api_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("Client-Id", &self.settings.client_id)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body = read_success_body(resp).await?;
        let users: UsersResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let user = users
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("no user returned for token".to_owned()))?;
        Ok(UserIdentity { user_id: user.id, username: user.login })
    }
}

impl Provider for TwitchProvider {
    fn authorization_url(&self, scopes: &[String], redirect_uri: &str, state: &str) -> String {
        format!(
            "{base}/authorize?client_id={client_id}\
             &redirect_uri={redirect_uri}\
             &response_type=code\
             &scope={scope}\
             &state={state}",
            base = self.settings.auth_url.trim_end_matches('/'),
            client_id = urlencoding(&self.settings.client_id),
            redirect_uri = urlencoding(redirect_uri),
            scope = urlencoding(&scopes.join(" ")),
            state = urlencoding(state),
        )
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ProviderError>> {
        async move {
            self.post_token(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .await
        }
        .boxed()
    }

    fn lookup_identity<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<UserIdentity, ProviderError>> {
        self.get_user(access_token).boxed()
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ProviderError>> {
        async move {
            self.post_token(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
        }
        .boxed()
    }
}

/// Read the body of a 2xx response, or turn anything else into [`ProviderError::Api`].
async fn read_success_body(resp: reqwest::Response) -> Result<String, ProviderError> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| ProviderError::Transport(format!("read body: {e}")))?;
    if status.is_success() {
        return Ok(body);
    }
    Err(api_error(status.as_u16(), &body))
}

fn api_error(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => {
            let message = env
                .message
                .or(env.error_description)
                .or(env.error)
                .unwrap_or_else(|| body.to_owned());
            ProviderError::Api { status: env.status.unwrap_or(status), message }
        }
        Err(_) => ProviderError::Api { status, message: body.to_owned() },
    }
}

#[cfg(test)]
#[path = "twitch_tests.rs"]
mod tests;
