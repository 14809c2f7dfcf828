pub mod integration;
pub mod messages;
pub mod protocol;
pub mod router;
pub mod session;
pub mod speech;
pub mod transport;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MurmurError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Session already completed")]
    SessionCompleted,

    #[error("Voice engine error: {0}")]
    Voice(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IO(String),
}

impl From<std::io::Error> for MurmurError {
    fn from(e: std::io::Error) -> Self {
        MurmurError::IO(e.to_string())
    }
}

impl From<serde_json::Error> for MurmurError {
    fn from(e: serde_json::Error) -> Self {
        MurmurError::Config(e.to_string())
    }
}

impl MurmurError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // A fresh log_in may succeed
            MurmurError::Transport(_) => true,
            // Caller must log in first
            MurmurError::NotConnected(_) => true,
            // A completed session never comes back
            MurmurError::SessionCompleted => false,
            // The next utterance may still work
            MurmurError::Voice(_) => true,
            MurmurError::Channel(_) => false,
            MurmurError::Config(_) => false,
            MurmurError::IO(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            MurmurError::Transport(_) => {
                "Connection to the chat server failed. Please log in again.".to_string()
            }
            MurmurError::NotConnected(_) => "Please log in before joining a channel.".to_string(),
            MurmurError::SessionCompleted => {
                "This chat source was closed. Please add it again.".to_string()
            }
            MurmurError::Voice(_) => {
                "Speech output failed. The message was skipped.".to_string()
            }
            MurmurError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            MurmurError::Config(_) => "Configuration error. Please check settings.".to_string(),
            MurmurError::IO(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MurmurError>;
