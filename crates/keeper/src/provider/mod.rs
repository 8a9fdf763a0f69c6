// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boundary to the identity provider: authorization URL, code exchange,
//! refresh and identity lookup.

pub mod twitch;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::future::BoxFuture;
use rand::Rng;

use crate::error::ProviderError;

/// Tokens returned by a code exchange or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// `None` when the provider kept the previous refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// The account an access token was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
    pub username: String,
}

/// Outbound calls to the identity provider.
pub trait Provider: Send + Sync {
    /// Authorization URL the operator opens in a browser.
    fn authorization_url(&self, scopes: &[String], redirect_uri: &str, state: &str) -> String;

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, ProviderError>>;

    fn lookup_identity<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<UserIdentity, ProviderError>>;

    fn refresh<'a>(&'a self, refresh_token: &'a str)
        -> BoxFuture<'a, Result<TokenGrant, ProviderError>>;
}

/// Generate a random `state` parameter (32 bytes → 43 URL-safe chars).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Form-style encoding for URL query parameters (spaces as `+`).
pub fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
