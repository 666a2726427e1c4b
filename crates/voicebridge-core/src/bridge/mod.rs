//! Cross-group audio relay.
//!
//! A link listens for speaking-start events in one group's session and, for
//! each non-bot speaker, opens a pipeline that captures that speaker and plays
//! the stream into the other group's session. Two-way audio is two links.

mod engine;
mod types;

pub use engine::BridgeEngine;
pub use types::{LinkKey, PipelineInfo, PipelineKey, PipelineStatus};
