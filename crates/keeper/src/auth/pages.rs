// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTML pages served by the session server.

use crate::credential::Identity;
use crate::error::AuthError;

const AUTHORIZE_HTML: &str = include_str!("../../web/authorize.html");
const RESULT_HTML: &str = include_str!("../../web/result.html");

/// Landing page with the authorization link.
pub fn authorize_page(identity: Identity, username: &str, url: &str) -> String {
    fill(AUTHORIZE_HTML, &[("identity", identity.as_str()), ("username", username), ("url", url)])
}

pub fn success_page(identity: Identity, username: &str) -> String {
    let message = format!("The {identity} account is now authorized as {username}.");
    fill(RESULT_HTML, &[("class", "ok"), ("title", "Authorized"), ("message", &message)])
}

pub fn failure_page(err: &AuthError) -> String {
    let message = err.to_string();
    fill(RESULT_HTML, &[("class", "failed"), ("title", "Authorization failed"), ("message", &message)])
}

/// Page for `/error` before anything has failed.
pub fn no_error_page() -> String {
    fill(
        RESULT_HTML,
        &[("class", "ok"), ("title", "No errors"), ("message", "No authorization failure recorded.")],
    )
}

/// Substitute `{{key}}` placeholders with HTML-escaped values.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_owned();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), &escape(value));
    }
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "pages_tests.rs"]
mod tests;
