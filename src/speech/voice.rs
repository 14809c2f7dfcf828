//! Voice rendering seam
//!
//! The scheduler hands one [`Utterance`] at a time to a [`VoiceEngine`]. The
//! engine reports the end of every utterance, cancelled ones included, with
//! [`VoiceEvent::Finished`] on the channel it was built with.

use crate::{MurmurError, Result};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;
use uuid::Uuid;

/// One engine invocation with settings already mapped to engine scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: Uuid,
    /// Source the message came from
    pub source_name: String,
    /// Chat user who wrote the message
    pub speaker: String,
    pub text: String,
    /// 0.0 ..= 1.0
    pub volume: f32,
    /// 0.0 ..= 2.0
    pub pitch: f32,
    /// 0.0 ..= 10.0
    pub rate: f32,
}

/// Event emitted by a voice engine
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    /// The utterance finished playing or was cancelled
    Finished { utterance_id: Uuid },
}

pub trait VoiceEngine: Send {
    /// Start rendering `utterance`. Must not block until playback ends.
    fn speak(&mut self, utterance: &Utterance) -> Result<()>;

    /// Stop the current utterance at once. Later `speak` calls must work.
    fn cancel(&mut self);
}

impl<E: VoiceEngine + ?Sized> VoiceEngine for Box<E> {
    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        (**self).speak(utterance)
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}

/// Writes each utterance as a line of text and finishes it immediately
pub struct ConsoleVoice {
    out: Box<dyn Write + Send>,
    events: Sender<VoiceEvent>,
}

impl ConsoleVoice {
    pub fn new(out: impl Write + Send + 'static, events: Sender<VoiceEvent>) -> Self {
        Self {
            out: Box::new(out),
            events,
        }
    }

    pub fn stdout(events: Sender<VoiceEvent>) -> Self {
        Self::new(std::io::stdout(), events)
    }
}

impl VoiceEngine for ConsoleVoice {
    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        writeln!(
            self.out,
            "[{}] {}: {}",
            utterance.source_name, utterance.speaker, utterance.text
        )?;
        self.out.flush()?;
        debug!(
            "Spoke {} (volume {:.2}, pitch {:.2}, rate {:.2})",
            utterance.id, utterance.volume, utterance.pitch, utterance.rate
        );

        self.events
            .send(VoiceEvent::Finished {
                utterance_id: utterance.id,
            })
            .map_err(|e| MurmurError::Channel(format!("Failed to report completion: {}", e)))
    }

    fn cancel(&mut self) {
        // Utterances finish as soon as they are written
    }
}
