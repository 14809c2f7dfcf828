//! Connection status derived from a session's system notices

use crate::messages::{Message, SystemNotice};

/// What a status display needs to know about one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// A login was started and no outcome has arrived yet
    pub authorizing: bool,
    /// The server accepted the last login
    pub authorized: bool,
    /// Channel of the most recent successful join
    pub last_connection: Option<String>,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a login attempt as pending
    pub fn begin_login(&mut self) {
        self.authorizing = true;
    }

    /// Fold one message into the status. Returns true if anything changed.
    pub fn apply(&mut self, message: &Message) -> bool {
        let before = self.clone();
        match message.notice() {
            Some(SystemNotice::LoggedIn) => {
                self.authorized = true;
                self.authorizing = false;
            }
            Some(SystemNotice::LoggedOut) => {
                self.authorized = false;
                self.authorizing = false;
            }
            Some(SystemNotice::ConnectionSuccess) => {
                self.last_connection = Some(message.name().to_string());
            }
            Some(SystemNotice::None) | None => {}
        }
        *self != before
    }
}
