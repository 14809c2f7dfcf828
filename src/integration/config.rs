//! Configuration for the integration layer

use crate::speech::PlaybackSettings;
use crate::utils::channels::DEFAULT_CHANNEL_CAPACITY;
use crate::{MurmurError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity used when no account is configured. The server accepts any
/// `justinfan` nick for read-only access.
pub const ANONYMOUS_IDENTITY: &str = "justinfan12345";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    /// Name the chat session is registered under
    pub source_name: String,

    /// Login nick
    pub identity: String,

    /// Channel to join after login, without the leading '#'
    pub channel: Option<String>,

    /// Initial slider positions, 0..=100
    pub volume_percent: f32,
    pub pitch_percent: f32,
    pub rate_percent: f32,

    /// Capacity of the orchestrator command and event channels
    pub channel_capacity: usize,
}

impl Default for MurmurConfig {
    fn default() -> Self {
        Self {
            source_name: "twitch".to_string(),
            identity: ANONYMOUS_IDENTITY.to_string(),
            channel: None,
            volume_percent: 100.0,
            pitch_percent: 50.0,
            rate_percent: 10.0,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl MurmurConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MurmurError::Config(e.to_string()))
    }

    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| MurmurError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&json)?;
        config.validate().map_err(MurmurError::Config)?;
        Ok(config)
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_playback_percent(mut self, volume: f32, pitch: f32, rate: f32) -> Self {
        self.volume_percent = volume;
        self.pitch_percent = pitch;
        self.rate_percent = rate;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Initial scheduler settings
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings::from_percent(self.volume_percent, self.pitch_percent, self.rate_percent)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.source_name.trim().is_empty() {
            return Err("Source name must not be empty".to_string());
        }

        if self.identity.trim().is_empty() {
            return Err("Identity must not be empty".to_string());
        }

        if let Some(channel) = &self.channel {
            if channel.trim().is_empty() || channel.starts_with('#') {
                return Err(format!("Invalid channel name: {:?}", channel));
            }
        }

        for (label, value) in [
            ("volume", self.volume_percent),
            ("pitch", self.pitch_percent),
            ("rate", self.rate_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(format!("{} must be between 0 and 100, got {}", label, value));
            }
        }

        if self.channel_capacity == 0 {
            return Err("Channel capacity must be at least 1".to_string());
        }

        Ok(())
    }
}
