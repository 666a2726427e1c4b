//! Pipeline and link records owned by the bridge engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use voicebridge_common::{GroupId, UserId};

use crate::platform::AudioPlayer;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Pipelines are unique per `(target, speaker)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub target: GroupId,
    pub speaker: UserId,
}

impl PipelineKey {
    pub fn new(target: GroupId, speaker: UserId) -> Self {
        Self { target, speaker }
    }
}

/// One-directional `(source, target)` relay.
pub type LinkKey = (GroupId, GroupId);

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Active,
    Draining,
    Closed,
}

/// A live relay of one speaker from `source` into `target`.
pub(crate) struct BridgePipeline {
    pub id: String,
    pub source: GroupId,
    pub target: GroupId,
    pub speaker: UserId,
    pub status: PipelineStatus,
    pub player: Arc<dyn AudioPlayer>,
    pub pump: JoinHandle<()>,
    pub opened_at: DateTime<Utc>,
}

impl BridgePipeline {
    /// Stop output and the pump. The capture side ends with the pump.
    pub fn close(&mut self) {
        self.status = PipelineStatus::Closed;
        self.player.stop();
        self.pump.abort();
    }

    pub fn touches(&self, group: &GroupId) -> bool {
        &self.source == group || &self.target == group
    }

    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            id: self.id.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            speaker: self.speaker.clone(),
            status: self.status,
            opened_at: self.opened_at,
        }
    }
}

/// Read-only view of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInfo {
    pub id: String,
    pub source: GroupId,
    pub target: GroupId,
    pub speaker: UserId,
    pub status: PipelineStatus,
    pub opened_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Speaking listener for one `(source, target)` direction.
pub(crate) struct Link {
    pub token: CancellationToken,
    pub task: JoinHandle<()>,
}

impl Link {
    pub fn stop(self) {
        self.token.cancel();
        self.task.abort();
    }
}
