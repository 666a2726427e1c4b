//! Voice session timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds applied while opening and supervising a group's voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long a new session may take to reach Ready (valid range: 1000-120000).
    pub ready_timeout_ms: u64,
    /// How long a disconnected session gets to start signalling again
    /// before it is torn down (valid range: 100-60000).
    pub recovery_window_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 30_000,
            recovery_window_ms: 5_000,
        }
    }
}

impl ConnectionConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_millis(self.recovery_window_ms)
    }
}
