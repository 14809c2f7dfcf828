//! Replays recorded protocol frames from a reader (stdin in the binary)

use super::{Connector, Transport, TransportEvent};
use crate::{MurmurError, Result};
use parking_lot::Mutex;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

type Input = Box<dyn BufRead + Send>;

/// Connector whose single connection reads frames line by line from `input`.
///
/// Outgoing lines are only logged. The input can be consumed once; a second
/// `connect` fails.
pub struct StdioConnector {
    input: Mutex<Option<Input>>,
}

impl StdioConnector {
    pub fn new(input: impl BufRead + Send + 'static) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(input))),
        }
    }

    pub fn stdin() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()))
    }
}

struct StdioTransport {
    closed: Arc<AtomicBool>,
}

impl Transport for StdioTransport {
    fn send(&self, line: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MurmurError::Transport("connection closed".into()));
        }
        debug!("> {}", line);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Connector for StdioConnector {
    fn connect(
        &self,
        events: crossbeam_channel::Sender<TransportEvent>,
    ) -> Result<Arc<dyn Transport>> {
        let input = self
            .input
            .lock()
            .take()
            .ok_or_else(|| MurmurError::Transport("input already consumed".into()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = Arc::clone(&closed);

        thread::spawn(move || {
            info!("Replaying frames from input");
            for line in input.lines() {
                if reader_closed.load(Ordering::SeqCst) {
                    return;
                }
                let event = match line {
                    Ok(line) => TransportEvent::Line(line),
                    Err(e) => {
                        warn!("Input read failed: {}", e);
                        TransportEvent::Error(e.to_string())
                    }
                };
                let failed = matches!(event, TransportEvent::Error(_));
                if events.send(event).is_err() || failed {
                    break;
                }
            }
            if !reader_closed.load(Ordering::SeqCst) {
                let _ = events.send(TransportEvent::Closed);
            }
            info!("Input exhausted");
        });

        Ok(Arc::new(StdioTransport { closed }))
    }
}
