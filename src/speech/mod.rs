//! Speech output: voice engines and the playback scheduler

pub mod scheduler;
pub mod voice;

pub use scheduler::{PlaybackScheduler, PlaybackSettings};
pub use voice::{ConsoleVoice, Utterance, VoiceEngine, VoiceEvent};
