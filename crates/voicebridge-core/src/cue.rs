//! Join/leave cue clips played into a group's own session.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use voicebridge_common::{BridgeEvent, CueKind, EventBus, GroupId};

use crate::connection::ConnectionTable;
use crate::platform::{AudioPlayer, AudioSource};

/// Raw s16le 48 kHz stereo PCM.
pub const JOIN_CLIP: &[u8] = include_bytes!("../assets/join.pcm");
pub const LEAVE_CLIP: &[u8] = include_bytes!("../assets/leave.pcm");

pub fn clip_for(kind: CueKind) -> &'static [u8] {
    match kind {
        CueKind::Join => JOIN_CLIP,
        CueKind::Leave => LEAVE_CLIP,
    }
}

/// One reusable player per group, separate from bridge pipelines.
pub struct CuePlayer {
    table: Arc<ConnectionTable>,
    players: Arc<DashMap<GroupId, Arc<dyn AudioPlayer>>>,
    events: Arc<EventBus>,
    volume: f32,
    enabled: bool,
}

impl CuePlayer {
    pub fn new(table: Arc<ConnectionTable>, events: Arc<EventBus>, volume: f32, enabled: bool) -> Self {
        Self {
            table,
            players: Arc::new(DashMap::new()),
            events,
            volume,
            enabled,
        }
    }

    /// Play a cue in `group`. Returns false when nothing was started: cues
    /// disabled, no ready connection, or the player could not be created.
    ///
    /// Playback runs in the background; a later cue on the same group
    /// preempts it.
    pub async fn play_cue(&self, group: &GroupId, kind: CueKind) -> bool {
        if !self.enabled {
            return false;
        }

        // The slot stays locked while the player is created so a concurrent
        // teardown cannot miss it.
        let player = {
            let slot = self.table.lock(group).await;
            let Some(conn) = slot.connection.as_ref().filter(|conn| conn.is_ready()) else {
                debug!(group = %group, ?kind, "No ready connection, cue skipped");
                return false;
            };

            let existing = self.players.get(group).map(|p| Arc::clone(p.value()));
            match existing {
                Some(player) => player,
                None => match conn.session.create_player().await {
                    Ok(player) => {
                        self.players.insert(group.clone(), Arc::clone(&player));
                        player
                    }
                    Err(e) => {
                        warn!(group = %group, error = %e, "Failed to create cue player");
                        return false;
                    }
                },
            }
        };

        let volume = self.volume;
        let task_group = group.clone();
        let players = Arc::clone(&self.players);
        tokio::spawn(async move {
            // A teardown between spawn and here drops the player.
            let current = players
                .get(&task_group)
                .is_some_and(|p| std::ptr::addr_eq(Arc::as_ptr(p.value()), Arc::as_ptr(&player)));
            if !current {
                debug!(group = %task_group, ?kind, "Cue player released before playback");
                return;
            }
            if let Err(e) = player.play(AudioSource::Clip(clip_for(kind)), volume).await {
                warn!(group = %task_group, ?kind, error = %e, "Cue playback failed");
            }
        });

        self.events.publish(BridgeEvent::CuePlayed {
            group: group.clone(),
            kind,
        });
        true
    }

    /// Stop and drop the group's cue player.
    pub fn release(&self, group: &GroupId) -> bool {
        match self.players.remove(group) {
            Some((_, player)) => {
                player.stop();
                true
            }
            None => false,
        }
    }

    pub fn has_player(&self, group: &GroupId) -> bool {
        self.players.contains_key(group)
    }
}
