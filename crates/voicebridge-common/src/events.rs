use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::id::{GroupId, UserId};

/// Cue clip identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    Join,
    Leave,
}

/// Lifecycle notifications published by the bridge core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BridgeEvent {
    ConnectionReady {
        group: GroupId,
        attempt: String,
    },
    ConnectionLost {
        group: GroupId,
        reason: String,
    },
    PipelineOpened {
        source: GroupId,
        target: GroupId,
        speaker: UserId,
    },
    PipelineClosed {
        source: GroupId,
        target: GroupId,
        speaker: UserId,
    },
    PresenceChanged(String),
    CuePlayed {
        group: GroupId,
        kind: CueKind,
    },
    #[serde(other)]
    Unknown,
}

pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: BridgeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
