use crate::integration::{OrchestratorCommand, OrchestratorEvent};
use crate::speech::VoiceEvent;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Default capacity for the command and event channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

pub struct MurmurChannels {
    pub command_tx: Sender<OrchestratorCommand>,
    pub command_rx: Receiver<OrchestratorCommand>,
    pub event_tx: Sender<OrchestratorEvent>,
    pub event_rx: Receiver<OrchestratorEvent>,
    /// Engine completions, unbounded
    pub voice_tx: Sender<VoiceEvent>,
    pub voice_rx: Receiver<VoiceEvent>,
}

impl MurmurChannels {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (command_tx, command_rx) = bounded(capacity);
        let (event_tx, event_rx) = bounded(capacity);
        let (voice_tx, voice_rx) = unbounded();

        Self {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
            voice_tx,
            voice_rx,
        }
    }
}

impl Default for MurmurChannels {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_raised() {
        let channels = MurmurChannels::new(0);
        assert_eq!(channels.command_tx.capacity(), Some(1));
        assert_eq!(channels.voice_tx.capacity(), None);
    }
}
