//! Strictly serial playback of queued chat messages
//!
//! The scheduler is either idle or speaking exactly one utterance. It only
//! moves forward on a new message, an engine completion, or after `cancel`
//! once something else triggers an advance.

use crate::messages::TaggedMessage;
use crate::speech::voice::{Utterance, VoiceEngine, VoiceEvent};
use crate::utils::Queue;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper end of the engine's pitch scale
pub const ENGINE_PITCH_MAX: f32 = 2.0;

/// Upper end of the engine's rate scale
pub const ENGINE_RATE_MAX: f32 = 10.0;

/// Playback settings, each normalized to `0.0..=1.0`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    volume: f32,
    pitch: f32,
    rate: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 0.5,
            rate: 0.1,
        }
    }
}

impl PlaybackSettings {
    pub fn new(volume: f32, pitch: f32, rate: f32) -> Self {
        Self {
            volume: normalize(volume),
            pitch: normalize(pitch),
            rate: normalize(rate),
        }
    }

    /// Build settings from `0..=100` slider positions
    pub fn from_percent(volume: f32, pitch: f32, rate: f32) -> Self {
        Self::new(volume / 100.0, pitch / 100.0, rate / 100.0)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = normalize(volume);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = normalize(pitch);
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = normalize(rate);
    }

    pub fn engine_volume(&self) -> f32 {
        self.volume
    }

    pub fn engine_pitch(&self) -> f32 {
        self.pitch * ENGINE_PITCH_MAX
    }

    pub fn engine_rate(&self) -> f32 {
        self.rate * ENGINE_RATE_MAX
    }
}

fn normalize(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Serializes tagged chat messages into utterances
pub struct PlaybackScheduler<E: VoiceEngine> {
    engine: E,
    queue: Queue<TaggedMessage>,
    settings: PlaybackSettings,
    current: Option<Utterance>,
}

impl<E: VoiceEngine> PlaybackScheduler<E> {
    pub fn new(engine: E) -> Self {
        Self::with_settings(engine, PlaybackSettings::default())
    }

    pub fn with_settings(engine: E, settings: PlaybackSettings) -> Self {
        Self {
            engine,
            queue: Queue::new(),
            settings,
            current: None,
        }
    }

    /// Queue a message and try to start it.
    ///
    /// Only `User` messages are played; anything else is ignored. Returns the
    /// utterance that started, if any.
    pub fn on_message(&mut self, tagged: TaggedMessage) -> Option<Utterance> {
        if !tagged.message.is_user() {
            return None;
        }
        self.queue.push(tagged);
        self.advance()
    }

    /// Handle an engine event. A completion that does not match the current
    /// utterance (for example a late one after `cancel`) only triggers an
    /// advance when idle.
    pub fn on_voice_event(&mut self, event: VoiceEvent) -> Option<Utterance> {
        match event {
            VoiceEvent::Finished { utterance_id } => {
                if self.current_id() == Some(utterance_id) {
                    debug!("Utterance {} finished", utterance_id);
                    self.current = None;
                } else {
                    debug!("Ignoring completion of stale utterance {}", utterance_id);
                }
            }
        }
        self.advance()
    }

    /// Stop the current utterance and go idle.
    ///
    /// The cancelled item is dropped and nothing new is dequeued here; queued
    /// items wait for the next advance.
    pub fn cancel(&mut self) -> Option<Utterance> {
        self.engine.cancel();
        let cancelled = self.current.take();
        if let Some(utterance) = &cancelled {
            info!("Cancelled utterance {}", utterance.id);
        }
        cancelled
    }

    /// Start the next queued message when idle
    pub fn advance(&mut self) -> Option<Utterance> {
        if self.current.is_some() {
            return None;
        }

        while let Some(next) = self.queue.pop() {
            let utterance = self.utterance_for(next);
            match self.engine.speak(&utterance) {
                Ok(()) => {
                    debug!("Speaking {} from '{}'", utterance.id, utterance.source_name);
                    self.current = Some(utterance.clone());
                    return Some(utterance);
                }
                Err(e) => {
                    warn!("Voice engine rejected utterance {}: {}", utterance.id, e);
                }
            }
        }

        None
    }

    fn utterance_for(&self, tagged: TaggedMessage) -> Utterance {
        let settings = self.settings;
        Utterance {
            id: Uuid::new_v4(),
            source_name: tagged.source_name,
            speaker: tagged.message.name().to_string(),
            text: tagged.message.text().to_string(),
            volume: settings.engine_volume(),
            pitch: settings.engine_pitch(),
            rate: settings.engine_rate(),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&Utterance> {
        self.current.as_ref()
    }

    fn current_id(&self) -> Option<Uuid> {
        self.current.as_ref().map(|utterance| utterance.id)
    }

    /// Number of messages waiting behind the current utterance
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn settings(&self) -> PlaybackSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: PlaybackSettings) {
        self.settings = settings;
    }

    pub fn reset_settings(&mut self) {
        self.settings = PlaybackSettings::default();
    }

    pub fn volume(&self) -> f32 {
        self.settings.volume()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.settings.set_volume(volume);
    }

    pub fn pitch(&self) -> f32 {
        self.settings.pitch()
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.settings.set_pitch(pitch);
    }

    pub fn rate(&self) -> f32 {
        self.settings.rate()
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.settings.set_rate(rate);
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Drop everything queued. The current utterance is left alone.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }
}
