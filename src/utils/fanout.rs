use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Broadcasts values to every live subscriber.
///
/// Each subscriber gets its own unbounded channel. Once completed, the fanout
/// drops every sender so subscribers observe a closed stream, and later
/// subscribers receive an already-closed receiver.
pub struct Fanout<T> {
    state: Arc<Mutex<FanoutState<T>>>,
}

struct FanoutState<T> {
    subscribers: Vec<Sender<T>>,
    completed: bool,
}

impl<T: Clone> Fanout<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FanoutState {
                subscribers: Vec::new(),
                completed: false,
            })),
        }
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        let mut state = self.state.lock();
        if !state.completed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Send a value to all subscribers, pruning the ones that hung up.
    ///
    /// Returns false once the fanout is completed.
    pub fn emit(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.completed {
            return false;
        }
        state
            .subscribers
            .retain(|subscriber| subscriber.send(value.clone()).is_ok());
        true
    }

    /// Close every subscriber stream. Idempotent.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.completed = true;
        state.subscribers.clear();
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

impl<T: Clone> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Fanout<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}
