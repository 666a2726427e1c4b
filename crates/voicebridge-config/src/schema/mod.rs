//! Configuration schema types for voicebridge.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod audio;
mod connection;
mod presence;
mod scheduler;
mod system;

pub use audio::*;
pub use connection::*;
pub use presence::*;
pub use scheduler::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct BridgeConfig {
    pub connection: ConnectionConfig,
    pub bridge: BridgeAudioConfig,
    pub cues: CueConfig,
    pub presence: PresenceConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}
