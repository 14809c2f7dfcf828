//! Chat source session
//!
//! A [`ChatSession`] owns one transport connection at a time, routes every
//! incoming line through the frame parser and exposes the resulting messages
//! as a filtered stream. Transport failures never escape as errors on the
//! stream; they become `LoggedOut` notices.

pub mod status;

use crate::messages::{Message, SystemNotice};
use crate::protocol::{join_command, nick_command, parse_frame, pass_command};
use crate::router::Source;
use crate::transport::{Connector, Transport, TransportEvent};
use crate::utils::Fanout;
use crate::{MurmurError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use status::ConnectionStatus;

/// One open connection and the reader worker attached to it
struct Link {
    id: Uuid,
    transport: Arc<dyn Transport>,
    /// Cleared when the link is superseded or closed locally
    active: Arc<AtomicBool>,
    /// Disconnects once the reader worker exits
    reader_done: Receiver<()>,
}

impl Link {
    fn shut(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.transport.close();
    }
}

struct SessionInner {
    connector: Box<dyn Connector>,
    link: Mutex<Option<Link>>,
    stream: Fanout<Message>,
    completed: AtomicBool,
}

/// Handle to a chat source session.
///
/// Clones share the same connection and stream.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                connector: Box::new(connector),
                link: Mutex::new(None),
                stream: Fanout::new(),
                completed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to the session's message stream.
    ///
    /// The stream ends only when the session is completed.
    pub fn messages(&self) -> Receiver<Message> {
        self.inner.stream.subscribe()
    }

    /// Open a fresh connection and authenticate.
    ///
    /// Any open connection is closed first. The outcome of authentication
    /// arrives later on the stream as `LoggedIn` or `LoggedOut`.
    pub fn log_in(&self, identity: &str, credential: &str) -> Result<()> {
        if self.is_completed() {
            return Err(MurmurError::SessionCompleted);
        }

        let mut link = self.inner.link.lock();
        if let Some(previous) = link.take() {
            debug!("Closing previous connection {}", previous.id);
            previous.shut();
        }

        let (events_tx, events_rx) = unbounded();
        let transport = match self.inner.connector.connect(events_tx) {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Connection failed: {}", e);
                self.emit(Message::server(SystemNotice::LoggedOut));
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        let active = Arc::new(AtomicBool::new(true));
        let (done_tx, reader_done) = crossbeam_channel::bounded(0);
        spawn_reader(
            id,
            events_rx,
            Arc::clone(&transport),
            Arc::clone(&active),
            self.inner.stream.clone(),
            done_tx,
        );

        let opened = Link {
            id,
            transport,
            active,
            reader_done,
        };
        info!("Connection {} opened, logging in", id);

        let handshake = opened
            .transport
            .send(&pass_command(credential))
            .and_then(|()| opened.transport.send(&nick_command(identity)));
        *link = Some(opened);

        if let Err(e) = handshake {
            warn!("Login handshake failed: {}", e);
            self.emit(Message::server(SystemNotice::LoggedOut));
            return Err(e);
        }

        Ok(())
    }

    /// Ask the server to join `channel`.
    ///
    /// Success arrives asynchronously as a `ConnectionSuccess` notice.
    pub fn join(&self, channel: &str) -> Result<()> {
        let link = self.inner.link.lock();
        let link = link
            .as_ref()
            .ok_or_else(|| MurmurError::NotConnected("join requires log_in".into()))?;
        link.transport.send(&join_command(channel))
    }

    /// Close the connection and announce `LoggedOut` locally.
    pub fn log_out(&self) -> Result<()> {
        let link = self
            .inner
            .link
            .lock()
            .take()
            .ok_or_else(|| MurmurError::NotConnected("log_out requires log_in".into()))?;
        link.shut();
        info!("Connection {} closed by log out", link.id);

        self.emit(Message::server(SystemNotice::LoggedOut));
        Ok(())
    }

    /// Close the connection and end the stream for good. Idempotent.
    pub fn complete(&self) {
        if self.inner.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(link) = self.inner.link.lock().take() {
            link.shut();
        }
        self.inner.stream.complete();
        info!("Session completed");
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.inner.link.lock().is_some()
    }

    /// Wait until the current connection's reader has drained every event
    /// up to the remote close. Returns true immediately when no connection is
    /// held.
    pub fn wait_transport_closed(&self, timeout: Duration) -> bool {
        let done = match self.inner.link.lock().as_ref() {
            Some(link) => link.reader_done.clone(),
            None => return true,
        };
        matches!(
            done.recv_timeout(timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        )
    }

    fn emit(&self, message: Message) {
        emit_filtered(&self.inner.stream, message);
    }
}

impl Source for ChatSession {
    fn complete(&mut self) {
        ChatSession::complete(self);
    }

    fn message_stream(&mut self) -> Option<Receiver<Message>> {
        Some(self.messages())
    }
}

fn emit_filtered(stream: &Fanout<Message>, message: Message) {
    if message.is_deliverable() {
        stream.emit(message);
    }
}

fn spawn_reader(
    id: Uuid,
    events_rx: Receiver<TransportEvent>,
    transport: Arc<dyn Transport>,
    active: Arc<AtomicBool>,
    stream: Fanout<Message>,
    done_tx: Sender<()>,
) {
    thread::spawn(move || {
        let _done = done_tx;
        debug!("Reader for connection {} started", id);

        for event in events_rx.iter() {
            if !active.load(Ordering::SeqCst) {
                break;
            }
            match event {
                TransportEvent::Line(line) => {
                    let message = parse_frame(&line, |reply| {
                        if let Err(e) = transport.send(&reply) {
                            warn!("Failed to answer keepalive: {}", e);
                        }
                    });
                    if let Some(message) = message {
                        emit_filtered(&stream, message);
                    }
                }
                TransportEvent::Error(error) => {
                    warn!("Transport error on connection {}: {}", id, error);
                    emit_filtered(&stream, Message::server(SystemNotice::LoggedOut));
                }
                TransportEvent::Closed => {
                    info!("Connection {} closed by remote", id);
                    break;
                }
            }
        }

        debug!("Reader for connection {} stopped", id);
    });
}
