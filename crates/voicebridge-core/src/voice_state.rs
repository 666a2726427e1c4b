//! Voice-state notifications from the hosting platform.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use voicebridge_common::{ChannelId, CueKind, GroupId, Result, UserId};

use crate::connection::ConnectionManager;
use crate::cue::CuePlayer;
use crate::presence::PresenceAggregator;
use crate::registry::{GroupRegistration, RegistrationStore};

/// A participant's channel changed (or they joined/left voice entirely).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
    #[serde(default)]
    pub is_bot: bool,
    /// The update concerns the bridge's own account.
    #[serde(default)]
    pub is_self: bool,
}

/// What a voice-state update resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStateChange {
    Ignored,
    Joined,
    Left,
    /// The bridge account was moved or kicked and was sent back.
    Rejoined,
}

pub struct VoiceStateHandler {
    manager: ConnectionManager,
    registry: Arc<dyn RegistrationStore>,
    cues: Arc<CuePlayer>,
    presence: Arc<PresenceAggregator>,
}

impl VoiceStateHandler {
    pub fn new(
        manager: ConnectionManager,
        registry: Arc<dyn RegistrationStore>,
        cues: Arc<CuePlayer>,
        presence: Arc<PresenceAggregator>,
    ) -> Self {
        Self {
            manager,
            registry,
            cues,
            presence,
        }
    }

    pub async fn handle(&self, update: &VoiceStateUpdate) -> Result<VoiceStateChange> {
        if update.is_self {
            return self.handle_self(update).await;
        }
        if update.is_bot {
            return Ok(VoiceStateChange::Ignored);
        }

        let left = self.registered(update.old_channel.as_ref()).await?;
        let joined = self.registered(update.new_channel.as_ref()).await?;

        let change = match (left, joined) {
            (Some(registration), None) => {
                self.manager
                    .track_member(&update.group_id, &update.user_id, false)
                    .await;
                debug!(group = %update.group_id, user = %update.user_id, "User left bridged channel");
                self.cue_secret_set(&registration.secret, CueKind::Leave).await?;
                VoiceStateChange::Left
            }
            (None, Some(registration)) => {
                self.manager
                    .track_member(&update.group_id, &update.user_id, true)
                    .await;
                debug!(group = %update.group_id, user = %update.user_id, "User joined bridged channel");
                self.cue_secret_set(&registration.secret, CueKind::Join).await?;
                VoiceStateChange::Joined
            }
            _ => VoiceStateChange::Ignored,
        };

        self.presence.recompute().await;
        Ok(change)
    }

    async fn handle_self(&self, update: &VoiceStateUpdate) -> Result<VoiceStateChange> {
        let Some(registration) = self.registry.registration(&update.group_id).await? else {
            return Ok(VoiceStateChange::Ignored);
        };
        if update.new_channel.as_ref() == Some(&registration.channel_id) {
            return Ok(VoiceStateChange::Ignored);
        }

        info!(
            group = %update.group_id,
            channel = %registration.channel_id,
            "Bridge account left its channel, rejoining"
        );
        self.manager.release(&update.group_id).await;
        self.manager
            .ensure_connection(&update.group_id, &registration.channel_id)
            .await?;
        Ok(VoiceStateChange::Rejoined)
    }

    async fn registered(
        &self,
        channel: Option<&ChannelId>,
    ) -> Result<Option<GroupRegistration>> {
        match channel {
            Some(channel) => Ok(self.registry.registration_for_channel(channel).await?),
            None => Ok(None),
        }
    }

    /// Play a cue in every group registered under `secret`, including the
    /// group the user moved in.
    async fn cue_secret_set(&self, secret: &str, kind: CueKind) -> Result<()> {
        let groups = self.registry.groups_by_secret(secret, None).await?;
        for group in groups {
            if !self.cues.play_cue(&group, kind).await {
                debug!(group = %group, ?kind, "Cue not played");
            }
        }
        Ok(())
    }
}
