//! Source router
//!
//! Keeps named sources and merges the message streams of chat-capable ones
//! into a single tagged stream. Each registration gets a forwarder worker
//! that pushes the source's messages, then a closing event, into the router
//! inbox. All table changes happen on the thread that calls into the router.

use crate::messages::{Message, TaggedMessage};
use crate::utils::Fanout;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Anything the router can own
pub trait Source: Send {
    /// Tear the source down. Must be idempotent.
    fn complete(&mut self);

    /// The chat capability: sources that expose a message stream get merged,
    /// the rest are only tracked.
    fn message_stream(&mut self) -> Option<Receiver<Message>> {
        None
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn complete(&mut self) {
        (**self).complete();
    }

    fn message_stream(&mut self) -> Option<Receiver<Message>> {
        (**self).message_stream()
    }
}

/// Event produced by forwarder workers
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// A source emitted a message
    Message {
        name: String,
        registration: Uuid,
        message: Message,
    },

    /// A source's stream ended
    Closed { name: String, registration: Uuid },
}

/// Result of dispatching one inbox event
#[derive(Debug, Clone, PartialEq)]
pub enum RouterUpdate {
    /// A message was tagged and published
    Message(TaggedMessage),

    /// A registration was removed because its stream ended
    Removed(String),
}

struct Registration {
    id: Uuid,
    source: Box<dyn Source>,
    merged: bool,
}

pub struct SourceRouter {
    registrations: HashMap<String, Registration>,
    inbox_tx: Sender<RouterEvent>,
    inbox_rx: Receiver<RouterEvent>,
    output: Fanout<TaggedMessage>,
}

impl SourceRouter {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self {
            registrations: HashMap::new(),
            inbox_tx,
            inbox_rx,
            output: Fanout::new(),
        }
    }

    /// Register `source` under `name`, replacing any existing registration.
    ///
    /// The replaced source is completed before the new stream is merged.
    pub fn register(&mut self, name: impl Into<String>, source: impl Source + 'static) {
        let name = name.into();
        if self.registrations.contains_key(&name) {
            debug!("Replacing source '{}'", name);
            self.unregister(&name);
        }

        let mut source: Box<dyn Source> = Box::new(source);
        let id = Uuid::new_v4();
        let merged = match source.message_stream() {
            Some(stream) => {
                spawn_forwarder(name.clone(), id, stream, self.inbox_tx.clone());
                true
            }
            None => false,
        };

        info!("Registered source '{}' (merged: {})", name, merged);
        self.registrations
            .insert(name, Registration { id, source, merged });
    }

    pub fn has(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    /// Complete and drop the source under `name`. No-op if absent.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.registrations.remove(name) {
            Some(mut registration) => {
                registration.source.complete();
                info!("Unregistered source '{}'", name);
                true
            }
            None => false,
        }
    }

    /// Whether the source under `name` is merged into the tagged stream
    pub fn is_merged(&self, name: &str) -> bool {
        self.registrations
            .get(name)
            .map(|registration| registration.merged)
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<&str> {
        self.registrations.keys().map(|name| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Subscribe to the merged tagged stream
    pub fn subscribe(&self) -> Receiver<TaggedMessage> {
        self.output.subscribe()
    }

    /// Receiver to select on; feed its events to [`dispatch`](Self::dispatch)
    pub fn inbox(&self) -> Receiver<RouterEvent> {
        self.inbox_rx.clone()
    }

    /// Apply one inbox event.
    ///
    /// Messages from registrations that are no longer active are dropped, as
    /// are closing events for replaced registrations.
    pub fn dispatch(&mut self, event: RouterEvent) -> Option<RouterUpdate> {
        match event {
            RouterEvent::Message {
                name,
                registration,
                message,
            } => {
                if !self.is_current(&name, registration) {
                    debug!("Dropping message from stale registration of '{}'", name);
                    return None;
                }
                if !message.is_deliverable() {
                    return None;
                }
                let tagged = TaggedMessage::new(name, message);
                self.output.emit(tagged.clone());
                Some(RouterUpdate::Message(tagged))
            }
            RouterEvent::Closed { name, registration } => {
                if !self.is_current(&name, registration) {
                    return None;
                }
                debug!("Stream of '{}' ended", name);
                self.unregister(&name);
                Some(RouterUpdate::Removed(name))
            }
        }
    }

    /// Dispatch inbox events until a tagged message comes out or `timeout`
    /// elapses.
    pub fn next_message(&mut self, timeout: Duration) -> Option<TaggedMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inbox_rx.recv_timeout(remaining) {
                Ok(event) => {
                    if let Some(RouterUpdate::Message(tagged)) = self.dispatch(event) {
                        return Some(tagged);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    /// Dispatch every event already waiting in the inbox
    pub fn drain(&mut self) -> Vec<RouterUpdate> {
        let pending: Vec<RouterEvent> = self.inbox_rx.try_iter().collect();
        pending
            .into_iter()
            .filter_map(|event| self.dispatch(event))
            .collect()
    }

    /// Complete every source and close the tagged stream
    pub fn shutdown(&mut self) {
        for (name, mut registration) in self.registrations.drain() {
            debug!("Completing source '{}'", name);
            registration.source.complete();
        }
        self.output.complete();
    }

    fn is_current(&self, name: &str, registration: Uuid) -> bool {
        self.registrations
            .get(name)
            .map(|active| active.id == registration)
            .unwrap_or(false)
    }
}

impl Default for SourceRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_forwarder(
    name: String,
    registration: Uuid,
    stream: Receiver<Message>,
    inbox: Sender<RouterEvent>,
) {
    thread::spawn(move || {
        for message in stream.iter() {
            let event = RouterEvent::Message {
                name: name.clone(),
                registration,
                message,
            };
            if inbox.send(event).is_err() {
                return;
            }
        }
        let _ = inbox.send(RouterEvent::Closed { name, registration });
    });
}
