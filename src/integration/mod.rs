//! End-to-end integration module
//!
//! Connects the pieces of the pipeline:
//! Chat session -> Source router -> Playback scheduler -> Voice engine

mod config;
mod orchestrator;

pub use config::{MurmurConfig, ANONYMOUS_IDENTITY};
pub use orchestrator::{
    Orchestrator, OrchestratorCommand, OrchestratorEvent, OrchestratorHandle, PlaybackStatus,
};
