//! Orchestrator for the chat-to-speech pipeline
//!
//! Owns the source router and the playback scheduler on a single dispatcher
//! thread: Sources -> Router -> Scheduler -> Voice engine

use crate::integration::config::MurmurConfig;
use crate::messages::TaggedMessage;
use crate::router::{RouterEvent, RouterUpdate, Source, SourceRouter};
use crate::speech::{PlaybackScheduler, Utterance, VoiceEngine, VoiceEvent};
use crate::utils::MurmurChannels;
use crate::{MurmurError, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long handle queries wait for the dispatcher to answer
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands that can be sent to the orchestrator
pub enum OrchestratorCommand {
    /// Register a source, replacing any source with the same name
    Register { name: String, source: Box<dyn Source> },

    /// Complete and remove a source
    Unregister(String),

    /// Ask whether a source is registered
    HasSource { name: String, reply: Sender<bool> },

    /// Stop the current utterance
    Cancel,

    /// Playback settings, normalized to 0.0..=1.0
    SetVolume(f32),
    SetPitch(f32),
    SetRate(f32),

    /// Restore default playback settings
    ResetSettings,

    /// Subscribe to the merged tagged stream
    Subscribe(Sender<Receiver<TaggedMessage>>),

    /// Ask for a playback snapshot
    Status(Sender<PlaybackStatus>),

    /// Shutdown the orchestrator
    Shutdown,
}

impl fmt::Debug for OrchestratorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { name, .. } => f.debug_struct("Register").field("name", name).finish(),
            Self::Unregister(name) => f.debug_tuple("Unregister").field(name).finish(),
            Self::HasSource { name, .. } => {
                f.debug_struct("HasSource").field("name", name).finish()
            }
            Self::Cancel => f.write_str("Cancel"),
            Self::SetVolume(value) => f.debug_tuple("SetVolume").field(value).finish(),
            Self::SetPitch(value) => f.debug_tuple("SetPitch").field(value).finish(),
            Self::SetRate(value) => f.debug_tuple("SetRate").field(value).finish(),
            Self::ResetSettings => f.write_str("ResetSettings"),
            Self::Subscribe(_) => f.write_str("Subscribe"),
            Self::Status(_) => f.write_str("Status"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A source was registered
    SourceRegistered(String),

    /// A source was removed, explicitly or because its stream ended
    SourceRemoved(String),

    /// The voice engine started an utterance
    Speaking(Utterance),

    /// A cancel request was applied
    Cancelled,

    /// Orchestrator has shut down
    Shutdown,
}

/// Snapshot of the dispatcher state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStatus {
    pub speaking: bool,
    pub queued: usize,
    /// Registered source names, sorted
    pub sources: Vec<String>,
}

impl PlaybackStatus {
    /// Nothing playing and nothing waiting
    pub fn is_idle(&self) -> bool {
        !self.speaking && self.queued == 0
    }
}

/// Handle for controlling the orchestrator from other threads
#[derive(Clone)]
pub struct OrchestratorHandle {
    /// Command sender
    command_tx: Sender<OrchestratorCommand>,

    /// Event receiver
    event_rx: Receiver<OrchestratorEvent>,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: OrchestratorCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| MurmurError::Channel(format!("Failed to send command: {:?}", e.0)))
    }

    pub fn register(&self, name: impl Into<String>, source: impl Source + 'static) -> Result<()> {
        self.send_command(OrchestratorCommand::Register {
            name: name.into(),
            source: Box::new(source),
        })
    }

    pub fn unregister(&self, name: impl Into<String>) -> Result<()> {
        self.send_command(OrchestratorCommand::Unregister(name.into()))
    }

    pub fn has_source(&self, name: impl Into<String>) -> Result<bool> {
        let (reply, answer) = bounded(1);
        self.send_command(OrchestratorCommand::HasSource {
            name: name.into(),
            reply,
        })?;
        wait_reply(&answer)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Cancel)
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send_command(OrchestratorCommand::SetVolume(volume))
    }

    pub fn set_pitch(&self, pitch: f32) -> Result<()> {
        self.send_command(OrchestratorCommand::SetPitch(pitch))
    }

    pub fn set_rate(&self, rate: f32) -> Result<()> {
        self.send_command(OrchestratorCommand::SetRate(rate))
    }

    pub fn reset_settings(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::ResetSettings)
    }

    /// Subscribe to every tagged message the router publishes from now on
    pub fn subscribe(&self) -> Result<Receiver<TaggedMessage>> {
        let (reply, answer) = bounded(1);
        self.send_command(OrchestratorCommand::Subscribe(reply))?;
        wait_reply(&answer)
    }

    pub fn status(&self) -> Result<PlaybackStatus> {
        let (reply, answer) = bounded(1);
        self.send_command(OrchestratorCommand::Status(reply))?;
        wait_reply(&answer)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Shutdown)
    }

    /// Try to receive an event from the orchestrator
    pub fn try_recv_event(&self) -> Option<OrchestratorEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<OrchestratorEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

fn wait_reply<T>(answer: &Receiver<T>) -> Result<T> {
    answer
        .recv_timeout(REPLY_TIMEOUT)
        .map_err(|e| MurmurError::Channel(format!("No reply from orchestrator: {}", e)))
}

/// Main orchestrator that owns the router and the scheduler
pub struct Orchestrator {
    router: SourceRouter,
    scheduler: PlaybackScheduler<Box<dyn VoiceEngine>>,
    command_rx: Receiver<OrchestratorCommand>,
    event_tx: Sender<OrchestratorEvent>,
    voice_rx: Receiver<VoiceEvent>,

    /// Kept so the voice channel stays open even if the engine drops its end
    _voice_tx: Sender<VoiceEvent>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    ///
    /// `engine_factory` receives the sender the engine must report
    /// completions on.
    pub fn new<F, E>(config: &MurmurConfig, engine_factory: F) -> Result<(Self, OrchestratorHandle)>
    where
        F: FnOnce(Sender<VoiceEvent>) -> E,
        E: VoiceEngine + 'static,
    {
        config.validate().map_err(MurmurError::Config)?;

        let channels = MurmurChannels::new(config.channel_capacity);
        let engine: Box<dyn VoiceEngine> = Box::new(engine_factory(channels.voice_tx.clone()));
        let scheduler = PlaybackScheduler::with_settings(engine, config.playback_settings());

        let handle = OrchestratorHandle {
            command_tx: channels.command_tx,
            event_rx: channels.event_rx,
        };

        let orchestrator = Self {
            router: SourceRouter::new(),
            scheduler,
            command_rx: channels.command_rx,
            event_tx: channels.event_tx,
            voice_rx: channels.voice_rx,
            _voice_tx: channels.voice_tx,
        };

        Ok((orchestrator, handle))
    }

    /// Start the dispatcher thread.
    ///
    /// This consumes the orchestrator; the thread runs until `Shutdown` or
    /// until every handle is dropped.
    pub fn start(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("murmur-dispatcher".to_string())
            .spawn(move || self.run())
            .map_err(MurmurError::from)
    }

    fn run(mut self) {
        info!("Orchestrator started");
        let command_rx = self.command_rx.clone();
        let inbox = self.router.inbox();
        let voice_rx = self.voice_rx.clone();

        loop {
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(OrchestratorCommand::Shutdown) => {
                        info!("Orchestrator shutdown requested");
                        break;
                    }
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => {
                        warn!("Command channel disconnected");
                        break;
                    }
                },
                recv(inbox) -> event => {
                    if let Ok(event) = event {
                        self.handle_router_event(event);
                    }
                },
                recv(voice_rx) -> event => {
                    if let Ok(event) = event {
                        let started = self.scheduler.on_voice_event(event);
                        self.report_started(started);
                    }
                },
            }
        }

        self.scheduler.cancel();
        self.scheduler.clear_queue();
        self.router.shutdown();
        self.emit(OrchestratorEvent::Shutdown);
        info!("Orchestrator stopped");
    }

    fn handle_command(&mut self, cmd: OrchestratorCommand) {
        debug!("Command: {:?}", cmd);
        match cmd {
            OrchestratorCommand::Register { name, source } => {
                self.router.register(name.clone(), source);
                self.emit(OrchestratorEvent::SourceRegistered(name));
            }
            OrchestratorCommand::Unregister(name) => {
                if self.router.unregister(&name) {
                    self.emit(OrchestratorEvent::SourceRemoved(name));
                }
            }
            OrchestratorCommand::HasSource { name, reply } => {
                let _ = reply.send(self.router.has(&name));
            }
            OrchestratorCommand::Cancel => {
                self.scheduler.cancel();
                self.emit(OrchestratorEvent::Cancelled);
            }
            OrchestratorCommand::SetVolume(volume) => self.scheduler.set_volume(volume),
            OrchestratorCommand::SetPitch(pitch) => self.scheduler.set_pitch(pitch),
            OrchestratorCommand::SetRate(rate) => self.scheduler.set_rate(rate),
            OrchestratorCommand::ResetSettings => self.scheduler.reset_settings(),
            OrchestratorCommand::Subscribe(reply) => {
                let _ = reply.send(self.router.subscribe());
            }
            OrchestratorCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            OrchestratorCommand::Shutdown => {}
        }
    }

    fn handle_router_event(&mut self, event: RouterEvent) {
        match self.router.dispatch(event) {
            Some(RouterUpdate::Message(tagged)) => {
                let started = self.scheduler.on_message(tagged);
                self.report_started(started);
            }
            Some(RouterUpdate::Removed(name)) => {
                self.emit(OrchestratorEvent::SourceRemoved(name));
            }
            None => {}
        }
    }

    fn report_started(&self, started: Option<Utterance>) {
        if let Some(utterance) = started {
            self.emit(OrchestratorEvent::Speaking(utterance));
        }
    }

    fn status(&self) -> PlaybackStatus {
        let mut sources: Vec<String> = self.router.names().into_iter().map(String::from).collect();
        sources.sort();
        PlaybackStatus {
            speaking: self.scheduler.is_speaking(),
            queued: self.scheduler.queued(),
            sources,
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
