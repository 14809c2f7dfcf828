//! Twitch IRC frame parsing
//!
//! Turns one raw protocol line into at most one [`Message`]. Keepalive probes
//! are answered through the reply callback and never surface as messages.
//! Malformed frames are dropped, never reported as errors.

use crate::messages::{Message, SystemNotice};

/// Command that marks a chat delivery frame
pub const CHAT_MARKER: &str = "PRIVMSG";

/// Marker found in channel join echoes
pub const JOIN_MARKER: &str = "JOIN";

/// Keepalive probe sent by the server
pub const KEEPALIVE_PROBE: &str = "PING :tmi.twitch.tv";

/// Reply expected for [`KEEPALIVE_PROBE`]
pub const KEEPALIVE_REPLY: &str = "PONG :tmi.twitch.tv";

/// Substring of the banner sent after a successful login
pub const WELCOME_BANNER: &str = "Welcome, GLHF!";

/// Notices the server sends when authentication fails
pub const AUTH_FAILURE_NOTICES: [&str; 3] = [
    ":tmi.twitch.tv NOTICE * :Invalid NICK",
    ":tmi.twitch.tv NOTICE * :Login authentication failed",
    ":tmi.twitch.tv NOTICE * :Improperly formatted auth",
];

/// Parse one raw frame.
///
/// `send_reply` is invoked with protocol replies the frame requires (currently
/// only the keepalive answer).
pub fn parse_frame<F>(raw_line: &str, send_reply: F) -> Option<Message>
where
    F: FnMut(String),
{
    match raw_line.split_once(CHAT_MARKER) {
        Some((prefix, payload)) => parse_chat_frame(prefix, payload),
        None => parse_system_frame(raw_line, send_reply),
    }
}

/// `:name!name@name.tmi.twitch.tv PRIVMSG #channel :text`
fn parse_chat_frame(prefix: &str, payload: &str) -> Option<Message> {
    let sender = prefix.split('!').next()?;
    let name = sender.strip_prefix(':').unwrap_or(sender).trim();

    let (_, after_hash) = payload.split_once('#')?;
    let (_channel, text) = after_hash.split_once(':')?;

    Some(Message::user(name, text.trim()))
}

fn parse_system_frame<F>(line: &str, mut send_reply: F) -> Option<Message>
where
    F: FnMut(String),
{
    if line.starts_with(KEEPALIVE_PROBE) {
        send_reply(KEEPALIVE_REPLY.to_string());
        return None;
    }

    if AUTH_FAILURE_NOTICES
        .iter()
        .any(|notice| line.starts_with(notice))
    {
        return Some(Message::server(SystemNotice::LoggedOut));
    }

    if line.contains(WELCOME_BANNER) {
        return Some(Message::server(SystemNotice::LoggedIn));
    }

    let (_, joined) = line.split_once(JOIN_MARKER)?;
    if joined.is_empty() {
        return None;
    }

    // Skip the " #" between the marker and the channel name
    let channel: String = joined.chars().skip(2).collect();
    let channel = channel.split('\n').next().unwrap_or_default();
    let channel = channel.trim_end_matches('\r');

    Some(Message::system(channel, SystemNotice::ConnectionSuccess))
}

/// `PASS <credential>`, lower-cased
pub fn pass_command(credential: &str) -> String {
    format!("PASS {}", credential.to_lowercase())
}

/// `NICK <identity>`, lower-cased
pub fn nick_command(identity: &str) -> String {
    format!("NICK {}", identity.to_lowercase())
}

/// `JOIN #<channel>`, lower-cased
pub fn join_command(channel: &str) -> String {
    format!("JOIN #{}", channel.to_lowercase())
}
