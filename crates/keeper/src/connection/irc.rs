// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat connection over WebSocket with IRC framing.
//!
//! Authenticates with the bot's current access token on every (re)connect.
//! A renewed token is picked up through [`LiveToken`] at the next connect;
//! an established connection is never torn down just because the token
//! changed.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::LiveToken;

pub const DEFAULT_CHAT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 5000;

/// Capabilities requested after login.
const CAPABILITIES: &str = "twitch.tv/tags twitch.tv/commands";

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub url: String,
    /// Bot login used as the IRC nick.
    pub nick: String,
    /// Channel to join, with or without a leading `#`.
    pub channel: String,
}

/// One parsed IRC line. The trailing parameter, if any, is the last entry of `params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage<'a> {
    pub tags: Option<&'a str>,
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
}

impl<'a> IrcMessage<'a> {
    /// Nick part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&'a str> {
        self.prefix.map(|p| p.split_once('!').map_or(p, |(nick, _)| nick))
    }

    pub fn trailing(&self) -> Option<&'a str> {
        self.params.last().copied()
    }
}

/// Parse one IRC line (without or with its `\r\n`).
pub fn parse_line(line: &str) -> Option<IrcMessage<'_>> {
    let mut rest = line.trim_end_matches(|c| c == '\r' || c == '\n');

    let mut tags = None;
    if let Some(r) = rest.strip_prefix('@') {
        let (t, r) = r.split_once(' ')?;
        tags = Some(t);
        rest = r.trim_start();
    }
    let mut prefix = None;
    if let Some(r) = rest.strip_prefix(':') {
        let (p, r) = r.split_once(' ')?;
        prefix = Some(p);
        rest = r.trim_start();
    }

    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (rest, None),
    };
    let mut parts = head.split_ascii_whitespace();
    let command = parts.next()?;
    let mut params: Vec<&str> = parts.collect();
    params.extend(trailing);

    Some(IrcMessage { tags, prefix, command, params })
}

/// Lines sent right after the socket opens.
pub fn login_lines(access_token: &str, nick: &str) -> Vec<String> {
    vec![
        format!("PASS oauth:{access_token}"),
        format!("NICK {}", nick.to_ascii_lowercase()),
        format!("CAP REQ :{CAPABILITIES}"),
    ]
}

/// Normalize a channel name to `#lowercase`.
pub fn channel_name(channel: &str) -> String {
    format!("#{}", channel.trim_start_matches('#').to_ascii_lowercase())
}

/// What to do in response to an incoming line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Send(String),
    /// Logged in; join the channel.
    Welcome,
    Reconnect,
    AuthFailed,
}

pub fn handle_message(msg: &IrcMessage<'_>) -> Action {
    match msg.command {
        "PING" => Action::Send(format!("PONG :{}", msg.trailing().unwrap_or("tmi.twitch.tv"))),
        "001" => Action::Welcome,
        "RECONNECT" => Action::Reconnect,
        "NOTICE" => {
            let text = msg.trailing().unwrap_or_default();
            if text.contains("Login authentication failed")
                || text.contains("Improperly formatted auth")
            {
                Action::AuthFailed
            } else {
                debug!(notice = text, "chat notice");
                Action::None
            }
        }
        "PRIVMSG" => {
            debug!(
                channel = msg.params.first().copied().unwrap_or_default(),
                from = msg.nick().unwrap_or_default(),
                text = msg.trailing().unwrap_or_default(),
                "chat message"
            );
            Action::None
        }
        "JOIN" => {
            debug!(channel = msg.trailing().unwrap_or_default(), nick = msg.nick().unwrap_or_default(), "joined");
            Action::None
        }
        _ => Action::None,
    }
}

/// Why a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    Closed,
    Reconnect,
    AuthFailed,
    Cancelled,
}

type ChatStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Long-lived chat connection for the bot identity.
pub struct ChatConnection {
    settings: ChatSettings,
    token: LiveToken,
}

impl ChatConnection {
    pub fn new(settings: ChatSettings, token: LiveToken) -> Self {
        Self { settings, token }
    }

    /// Connect and stay connected until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let connect = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = tokio_tungstenite::connect_async(self.settings.url.as_str()) => r,
            };
            match connect {
                Ok((ws, _)) => {
                    debug!(url = %self.settings.url, "chat connected");
                    match self.session(ws, &shutdown, &mut backoff_ms).await {
                        Disconnect::Cancelled => break,
                        Disconnect::AuthFailed => {
                            warn!(nick = %self.settings.nick, backoff_ms, "chat login rejected, reconnecting with latest token")
                        }
                        reason => debug!(?reason, backoff_ms, "chat disconnected, reconnecting"),
                    }
                }
                Err(e) => {
                    debug!(url = %self.settings.url, err = %e, backoff_ms, "chat connect failed, retrying");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)) => {}
            }
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }

        info!("chat connection stopped");
    }

    async fn session(
        &self,
        ws: ChatStream,
        shutdown: &CancellationToken,
        backoff_ms: &mut u64,
    ) -> Disconnect {
        let (mut write, mut read) = ws.split();

        for line in login_lines(&self.token.current(), &self.settings.nick) {
            if let Err(e) = write.send(Message::text(line)).await {
                debug!(err = %e, "chat login write failed");
                return Disconnect::Closed;
            }
        }

        loop {
            let text = tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Disconnect::Cancelled;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return Disconnect::Closed,
                    Some(Err(e)) => {
                        debug!(err = %e, "chat read error");
                        return Disconnect::Closed;
                    }
                    _ => continue,
                },
            };

            for line in text.as_str().split("\r\n").filter(|l| !l.is_empty()) {
                let Some(msg) = parse_line(line) else {
                    debug!(line, "unparseable chat line");
                    continue;
                };
                let reply = match handle_message(&msg) {
                    Action::None => continue,
                    Action::Send(reply) => reply,
                    Action::Welcome => {
                        *backoff_ms = INITIAL_BACKOFF_MS;
                        let channel = channel_name(&self.settings.channel);
                        info!(nick = %self.settings.nick, %channel, "chat logged in");
                        format!("JOIN {channel}")
                    }
                    Action::Reconnect => return Disconnect::Reconnect,
                    Action::AuthFailed => return Disconnect::AuthFailed,
                };
                if let Err(e) = write.send(Message::text(reply)).await {
                    debug!(err = %e, "chat write failed");
                    return Disconnect::Closed;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "irc_tests.rs"]
mod tests;
