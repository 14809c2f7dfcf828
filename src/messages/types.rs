use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name carried by notices that come from the chat server itself.
pub const SERVER_NAME: &str = "Twitch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Protocol-level state notification
    System,
    /// Chat utterance from a viewer
    User,
}

/// Texts carried by `System` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemNotice {
    LoggedOut,
    LoggedIn,
    ConnectionSuccess,
    /// Placeholder for "no message". Never delivered downstream.
    None,
}

impl SystemNotice {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemNotice::LoggedOut => "LoggedOut",
            SystemNotice::LoggedIn => "LoggedIn",
            SystemNotice::ConnectionSuccess => "ConnectionSuccess",
            SystemNotice::None => "",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "LoggedOut" => Some(SystemNotice::LoggedOut),
            "LoggedIn" => Some(SystemNotice::LoggedIn),
            "ConnectionSuccess" => Some(SystemNotice::ConnectionSuccess),
            "" => Some(SystemNotice::None),
            _ => None,
        }
    }
}

impl fmt::Display for SystemNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    kind: MessageKind,
    name: String,
    text: String,
}

impl Message {
    pub fn new(kind: MessageKind, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn user(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageKind::User, name, text)
    }

    pub fn system(name: impl Into<String>, notice: SystemNotice) -> Self {
        Self::new(MessageKind::System, name, notice.as_str())
    }

    /// Notice attributed to the chat server.
    pub fn server(notice: SystemNotice) -> Self {
        Self::system(SERVER_NAME, notice)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_user(&self) -> bool {
        self.kind == MessageKind::User
    }

    /// The notice this message carries, if it is a `System` message.
    pub fn notice(&self) -> Option<SystemNotice> {
        match self.kind {
            MessageKind::System => SystemNotice::parse(&self.text),
            MessageKind::User => None,
        }
    }

    /// Whether the message may leave a session or router.
    ///
    /// User messages always pass; System messages pass unless they carry the
    /// empty placeholder text.
    pub fn is_deliverable(&self) -> bool {
        match self.kind {
            MessageKind::User => true,
            MessageKind::System => self.text != SystemNotice::None.as_str(),
        }
    }
}

/// A message annotated with the source it arrived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedMessage {
    pub source_name: String,
    pub message: Message,
    pub received_at: DateTime<Utc>,
}

impl TaggedMessage {
    pub fn new(source_name: impl Into<String>, message: Message) -> Self {
        Self {
            source_name: source_name.into(),
            message,
            received_at: Utc::now(),
        }
    }
}
