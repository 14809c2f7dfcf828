//! Line-oriented transport seam
//!
//! The session only needs "send a line", incoming line events, error events
//! and a closed notification. Concrete connections live behind [`Connector`].

pub mod channel;
pub mod stdio;

use crate::Result;
use crossbeam_channel::Sender;
use std::sync::Arc;

pub use channel::{ChannelConnector, ChannelTransport, RemoteEnd};
pub use stdio::StdioConnector;

/// Event pushed by a transport into the session's reader
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One raw protocol line
    Line(String),

    /// Connection-level failure
    Error(String),

    /// The remote side ended the stream
    Closed,
}

/// An open connection
pub trait Transport: Send + Sync {
    /// Send one protocol line
    fn send(&self, line: &str) -> Result<()>;

    /// Close the connection. Idempotent; no events are delivered afterwards.
    fn close(&self);
}

/// Opens connections to a chat endpoint
pub trait Connector: Send + Sync {
    /// Open a connection that reports its incoming traffic on `events`
    fn connect(&self, events: Sender<TransportEvent>) -> Result<Arc<dyn Transport>>;
}
