//! Seam to the hosting voice platform.
//!
//! The bridge core only talks to voice sessions through these traits. A
//! production deployment supplies an adapter for its gateway library; the
//! in-process [`loopback`] implementation backs the test suite and the
//! daemon's simulation mode.

pub mod loopback;
mod types;

pub use loopback::{LoopbackPlatform, LoopbackPlayer, LoopbackSession};
pub use types::{
    current_status, wait_for_status, AudioFrame, AudioPlayer, AudioSource, AudioStream, ChannelOccupant,
    SessionStatus, SpeakingStart, VoicePlatform, VoiceSession,
};
