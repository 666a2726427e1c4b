//! Relay and cue audio settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-speaker relay pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeAudioConfig {
    /// Trailing silence that closes a speaker's capture.
    pub silence_ms: u64,
    /// Output gain applied to relayed audio.
    pub gain: f64,
}

impl Default for BridgeAudioConfig {
    fn default() -> Self {
        Self {
            silence_ms: 200,
            gain: 1.0,
        }
    }
}

impl BridgeAudioConfig {
    pub fn silence(&self) -> Duration {
        Duration::from_millis(self.silence_ms)
    }
}

/// Join/leave cue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    pub enabled: bool,
    pub volume: f64,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.3,
        }
    }
}
