//! Connection records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use voicebridge_common::{ChannelId, GroupId};

use crate::platform::{SessionStatus, VoiceSession};

/// Connection lifecycle as seen by the manager. `Idle` means no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Signalling,
    Ready,
    Disconnected,
    Destroyed,
}

impl ConnectionStatus {
    /// Entries in these states are replaced by the next `ensure_connection`.
    pub fn is_stale(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Disconnected | ConnectionStatus::Destroyed
        )
    }
}

impl From<SessionStatus> for ConnectionStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Signalling => ConnectionStatus::Signalling,
            SessionStatus::Connecting => ConnectionStatus::Connecting,
            SessionStatus::Ready => ConnectionStatus::Ready,
            SessionStatus::Disconnected => ConnectionStatus::Disconnected,
            SessionStatus::Destroyed => ConnectionStatus::Destroyed,
        }
    }
}

/// The one live session a group may have.
pub struct ConnectionState {
    pub group_id: GroupId,
    pub channel_id: ChannelId,
    pub session: Arc<dyn VoiceSession>,
    pub status_rx: watch::Receiver<SessionStatus>,
    pub created_at: DateTime<Utc>,
    /// Correlation id of the `ensure_connection` call that opened it.
    pub attempt: String,
    /// Cancels the disconnect observer.
    pub observer: CancellationToken,
    /// Set once peers were wired after reaching `Ready`.
    pub bridges_wired: bool,
}

impl ConnectionState {
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from(*self.status_rx.borrow())
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ConnectionStatus::Ready
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("group_id", &self.group_id)
            .field("channel_id", &self.channel_id)
            .field("status", &self.status())
            .field("attempt", &self.attempt)
            .field("created_at", &self.created_at)
            .field("bridges_wired", &self.bridges_wired)
            .finish()
    }
}

/// Guarded per-group state; the slot's mutex is the group's exclusion domain.
#[derive(Default)]
pub struct GroupSlot {
    pub connection: Option<ConnectionState>,
}

/// Outcome of a reconnect sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconnectSummary {
    pub attempted: usize,
    pub ready: usize,
    pub failed: usize,
}
