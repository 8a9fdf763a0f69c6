// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::*;

const REQUIRED: &[(&str, &str)] = &[
    ("--client-id", "cid"),
    ("--client-secret", "secret"),
    ("--bot-user", "Botty"),
    ("--broadcaster", "streamer"),
    ("--channel", "streamer"),
];

/// Parse the required flags (with `overrides` replacing their values) plus `extra`.
fn parse_with(overrides: &[(&str, &str)], extra: &[&str]) -> Config {
    let mut args = vec!["chatkeep"];
    for (flag, value) in REQUIRED {
        let value = overrides.iter().find(|(f, _)| f == flag).map_or(*value, |(_, v)| *v);
        args.push(flag);
        args.push(value);
    }
    args.extend_from_slice(extra);
    Config::parse_from(args)
}

fn parse(extra: &[&str]) -> Config {
    parse_with(&[], extra)
}

#[test]
fn valid_minimal_config() -> anyhow::Result<()> {
    let config = parse(&[]);
    config.validate()?;
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.oauth_port, 8080);
    assert_eq!(config.log_format, "text");
    assert!(!config.no_chat);
    assert_eq!(config.bot_scopes.len(), 7);
    assert_eq!(config.broadcaster_scopes.len(), 6);
    assert!(config.bot_scopes.contains(&"chat:edit".to_owned()));
    assert!(config.broadcaster_scopes.contains(&"channel:bot".to_owned()));
    Ok(())
}

#[yare::parameterized(
    client_id     = { "--client-id", "--client-id is required" },
    client_secret = { "--client-secret", "--client-secret is required" },
    bot_user      = { "--bot-user", "--bot-user is required" },
    broadcaster   = { "--broadcaster", "--broadcaster is required" },
    channel       = { "--channel", "--channel is required" },
)]
fn blank_required_value(flag: &str, expected_substr: &str) {
    let config = parse_with(&[(flag, " ")], &[]);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[yare::parameterized(
    bot_scopes         = { &["--bot-scopes", " , "], "--bot-scopes" },
    broadcaster_scopes = { &["--broadcaster-scopes", ","], "--broadcaster-scopes" },
    log_format         = { &["--log-format", "yaml"], "invalid log format: yaml" },
)]
fn invalid_config(extra: &[&str], expected_substr: &str) {
    let config = parse(extra);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn scopes_split_on_commas() {
    let config = parse(&["--bot-scopes", "chat:read, chat:edit"]);
    let accounts = config.accounts();
    assert_eq!(accounts[0].identity, Identity::Bot);
    assert_eq!(accounts[0].scopes, vec!["chat:read".to_owned(), "chat:edit".to_owned()]);
}

#[test]
fn accounts_are_bot_then_broadcaster() {
    let accounts = parse(&[]).accounts();
    let order: Vec<Identity> = accounts.iter().map(|a| a.identity).collect();
    assert_eq!(order, vec![Identity::Bot, Identity::Broadcaster]);
    assert_eq!(accounts[0].username, "Botty");
    assert_eq!(accounts[1].username, "streamer");
}

#[test]
fn auth_settings_carry_listener_options() {
    let config = parse(&["--oauth-port", "9090", "--virtual-host", "bot.example.com"]);
    let settings = config.auth_settings();
    assert_eq!(settings.port, 9090);
    assert_eq!(settings.virtual_host.as_deref(), Some("bot.example.com"));
}

#[test]
fn explicit_token_file_wins() {
    let config = parse(&["--token-file", "/tmp/chatkeep/tokens.json"]);
    assert_eq!(config.token_file(), PathBuf::from("/tmp/chatkeep/tokens.json"));
}

#[test]
fn default_token_file_lives_in_state_dir() {
    let config = parse(&[]);
    assert_eq!(config.token_file(), state_dir().join("tokens.json"));
}

#[test]
fn duration_overrides_take_precedence() {
    let config = Config::test();
    assert_eq!(config.refresh_backoff(), Duration::from_millis(50));
    assert_eq!(config.callback_grace(), Duration::from_millis(10));
    assert_eq!(config.shutdown_timeout(), Duration::from_millis(500));
}

#[test]
fn duration_defaults() {
    let config = parse(&[]);
    assert_eq!(config.refresh_backoff(), Duration::from_secs(30));
    assert_eq!(config.auth_timeout(), Duration::from_secs(600));
    assert_eq!(config.callback_grace(), Duration::from_secs(2));
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
}

#[test]
fn test_config_is_valid() -> anyhow::Result<()> {
    Config::test().validate()
}
