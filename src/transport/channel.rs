//! In-memory transport over crossbeam channels
//!
//! Every `connect` produces a [`ChannelTransport`] for the session and a
//! matching [`RemoteEnd`] that plays the server: it injects lines and errors,
//! closes the stream and observes what the session sent.

use super::{Connector, Transport, TransportEvent};
use crate::{MurmurError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

struct Shared {
    events: Mutex<Option<Sender<TransportEvent>>>,
    sent_tx: Sender<String>,
    closed: AtomicBool,
}

impl Shared {
    fn deliver(&self, event: TransportEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.events.lock().take();
    }
}

/// Session side of an in-memory connection
pub struct ChannelTransport {
    shared: Arc<Shared>,
}

impl Transport for ChannelTransport {
    fn send(&self, line: &str) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(MurmurError::Transport("connection closed".into()));
        }
        debug!("> {}", line);
        self.shared
            .sent_tx
            .send(line.to_string())
            .map_err(|_| MurmurError::Transport("remote end dropped".into()))
    }

    fn close(&self) {
        self.shared.shut();
    }
}

/// Server side of an in-memory connection
pub struct RemoteEnd {
    shared: Arc<Shared>,
    sent_rx: Receiver<String>,
}

impl RemoteEnd {
    /// Deliver a raw line to the session. Returns false once closed.
    pub fn push_line(&self, line: impl Into<String>) -> bool {
        self.shared.deliver(TransportEvent::Line(line.into()))
    }

    /// Report a connection failure to the session
    pub fn push_error(&self, error: impl Into<String>) -> bool {
        self.shared.deliver(TransportEvent::Error(error.into()))
    }

    /// End the stream from the server side
    pub fn close(&self) {
        self.shared.deliver(TransportEvent::Closed);
        self.shared.shut();
    }

    /// Whether either side closed the connection
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Lines the session has sent so far
    pub fn sent(&self) -> Vec<String> {
        self.sent_rx.try_iter().collect()
    }

    /// Wait for the next line the session sends
    pub fn recv_sent(&self, timeout: Duration) -> Option<String> {
        self.sent_rx.recv_timeout(timeout).ok()
    }
}

/// Connector handing out in-memory connections
#[derive(Clone)]
pub struct ChannelConnector {
    remotes_tx: Sender<RemoteEnd>,
    remotes_rx: Receiver<RemoteEnd>,
    refuse_next: Arc<Mutex<Option<String>>>,
}

impl ChannelConnector {
    pub fn new() -> Self {
        let (remotes_tx, remotes_rx) = unbounded();
        Self {
            remotes_tx,
            remotes_rx,
            refuse_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Server side of the oldest connection not yet taken
    pub fn next_remote(&self, timeout: Duration) -> Option<RemoteEnd> {
        self.remotes_rx.recv_timeout(timeout).ok()
    }

    /// Make the next `connect` fail with `reason`
    pub fn refuse_next(&self, reason: impl Into<String>) {
        *self.refuse_next.lock() = Some(reason.into());
    }
}

impl Default for ChannelConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for ChannelConnector {
    fn connect(&self, events: Sender<TransportEvent>) -> Result<Arc<dyn Transport>> {
        if let Some(reason) = self.refuse_next.lock().take() {
            return Err(MurmurError::Transport(reason));
        }

        let (sent_tx, sent_rx) = unbounded();
        let shared = Arc::new(Shared {
            events: Mutex::new(Some(events)),
            sent_tx,
            closed: AtomicBool::new(false),
        });

        let remote = RemoteEnd {
            shared: Arc::clone(&shared),
            sent_rx,
        };
        self.remotes_tx
            .send(remote)
            .map_err(|e| MurmurError::Channel(format!("Failed to publish remote end: {}", e)))?;

        Ok(Arc::new(ChannelTransport { shared }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(500);

    #[test]
    fn test_lines_flow_both_ways() {
        let connector = ChannelConnector::new();
        let (events_tx, events_rx) = unbounded();
        let transport = connector.connect(events_tx).unwrap();
        let remote = connector.next_remote(WAIT).unwrap();

        transport.send("NICK someone").unwrap();
        assert_eq!(remote.recv_sent(WAIT), Some("NICK someone".to_string()));

        assert!(remote.push_line("PING :tmi.twitch.tv"));
        assert_eq!(
            events_rx.recv_timeout(WAIT),
            Ok(TransportEvent::Line("PING :tmi.twitch.tv".into()))
        );
    }

    #[test]
    fn test_close_stops_traffic() {
        let connector = ChannelConnector::new();
        let (events_tx, events_rx) = unbounded();
        let transport = connector.connect(events_tx).unwrap();
        let remote = connector.next_remote(WAIT).unwrap();

        transport.close();
        transport.close();

        assert!(remote.is_closed());
        assert!(!remote.push_line("late"));
        assert!(transport.send("JOIN #x").is_err());
        assert!(events_rx.recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_remote_close_sends_closed_event() {
        let connector = ChannelConnector::new();
        let (events_tx, events_rx) = unbounded();
        let _transport = connector.connect(events_tx).unwrap();
        let remote = connector.next_remote(WAIT).unwrap();

        remote.close();
        assert_eq!(events_rx.recv_timeout(WAIT), Ok(TransportEvent::Closed));
        assert!(events_rx.recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_refused_connect() {
        let connector = ChannelConnector::new();
        connector.refuse_next("endpoint unreachable");
        let (events_tx, _events_rx) = unbounded();

        let result = connector.connect(events_tx);
        assert!(matches!(result, Err(MurmurError::Transport(_))));
        assert!(connector.next_remote(Duration::from_millis(10)).is_none());

        // Only the next attempt is refused
        let (events_tx, _events_rx) = unbounded();
        assert!(connector.connect(events_tx).is_ok());
    }
}
