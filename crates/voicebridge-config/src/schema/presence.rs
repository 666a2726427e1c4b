//! Displayed activity settings.

use serde::{Deserialize, Serialize};

/// Presence line configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    /// Text shown when nobody is in any bridged channel.
    pub idle_text: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_text: "No active voice chats".into(),
        }
    }
}
