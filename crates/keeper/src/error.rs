// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failure talking to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure or unreadable response body.
    Transport(String),
    /// Provider answered with an error status or error envelope.
    Api { status: u16, message: String },
    /// Provider answered 2xx with an unexpected shape.
    Decode(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Api { status, message } => write!(f, "provider error {status}: {message}"),
            Self::Decode(msg) => write!(f, "unexpected provider response: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Why an interactive authorization session did not produce a credential.
///
/// All variants need a human to act; none are retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The provider redirected back with `error=…`.
    Denied { error: String, description: String },
    /// Callback hit without `code` or `error`.
    MissingCode,
    /// Callback `state` did not match the session.
    StateMismatch,
    Exchange(ProviderError),
    Lookup(ProviderError),
    /// The browser was logged in as a different account than expected.
    WrongAccount { expected: String, actual: String },
    TimedOut,
    Cancelled,
    /// The callback listener could not be started.
    Listen(String),
}

impl AuthError {
    /// HTTP status used when rendering this failure in the browser.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Denied { .. } | Self::MissingCode | Self::StateMismatch => 400,
            Self::WrongAccount { .. } => 403,
            Self::Exchange(_) | Self::Lookup(_) => 502,
            Self::TimedOut | Self::Cancelled | Self::Listen(_) => 500,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied { error, description } if description.is_empty() => {
                write!(f, "authorization failed: {error}")
            }
            Self::Denied { error, description } => {
                write!(f, "authorization failed: {error} - {description}")
            }
            Self::MissingCode => f.write_str("no authorization code received"),
            Self::StateMismatch => f.write_str("authorization state mismatch"),
            Self::Exchange(e) => write!(f, "failed to exchange authorization code: {e}"),
            Self::Lookup(e) => write!(f, "failed to look up authorized account: {e}"),
            Self::WrongAccount { expected, actual } => {
                write!(f, "wrong account authorized: expected {expected}, got {actual}")
            }
            Self::TimedOut => f.write_str("timed out waiting for authorization"),
            Self::Cancelled => f.write_str("authorization cancelled by shutdown"),
            Self::Listen(msg) => write!(f, "unable to start callback listener: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
