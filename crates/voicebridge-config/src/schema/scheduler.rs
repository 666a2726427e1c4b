//! Periodic task intervals.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Intervals for the periodic tasks, in minutes (valid range: 1-1440).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub voice_check_minutes: u32,
    pub registry_reload_minutes: u32,
    /// Sweep every registration once at startup instead of waiting a full interval.
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            voice_check_minutes: 2,
            registry_reload_minutes: 1,
            run_on_start: true,
        }
    }
}

impl SchedulerConfig {
    pub fn voice_check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.voice_check_minutes) * 60)
    }

    pub fn registry_reload_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.registry_reload_minutes) * 60)
    }
}
