//! Voice bridge core.
//!
//! Relays each speaker's audio between groups that registered the same
//! secret. [`BridgeHub`] ties the pieces together:
//!
//! - [`connection`] keeps one voice session per group and recovers or tears
//!   it down on disconnect.
//! - [`bridge`] wires speaking listeners and per-speaker pipelines between
//!   ready sessions.
//! - [`presence`] and [`cue`] react to membership changes.
//! - [`scheduler`] re-runs the reconnect sweep on a fixed cadence.
//!
//! The hosting platform is reached only through the traits in [`platform`].

pub mod bridge;
pub mod connection;
pub mod cue;
pub mod hub;
pub mod membership;
pub mod platform;
pub mod presence;
pub mod registry;
pub mod scheduler;
pub mod voice_state;

pub use bridge::{BridgeEngine, PipelineInfo, PipelineStatus};
pub use connection::{ConnectionManager, ConnectionStatus, ReconnectSummary};
pub use cue::CuePlayer;
pub use hub::{BridgeHub, GroupStatus};
pub use membership::MembershipTable;
pub use presence::{format_status, PresenceAggregator};
pub use registry::{GroupRegistration, MemoryRegistrationStore, RegistrationStore};
pub use scheduler::{ReconnectTask, ScheduledTask, Scheduler, SchedulerHandle};
pub use voice_state::{VoiceStateChange, VoiceStateUpdate};
