//! Facade wiring every component together.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use voicebridge_common::{BridgeEvent, ChannelId, CueKind, EventBus, GroupId, Result};
use voicebridge_config::BridgeConfig;

use crate::bridge::BridgeEngine;
use crate::connection::{ConnectionManager, ConnectionTable, ManagerParts, ReconnectSummary};
use crate::cue::CuePlayer;
use crate::membership::MembershipTable;
use crate::platform::{VoicePlatform, VoiceSession};
use crate::presence::PresenceAggregator;
use crate::registry::RegistrationStore;
use crate::voice_state::{VoiceStateChange, VoiceStateHandler, VoiceStateUpdate};

/// One row of the secret-set status view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    pub group_id: GroupId,
    pub channel_id: ChannelId,
    pub connected: bool,
    pub user_count: usize,
}

/// Entry point for embedders. Cheap to clone.
#[derive(Clone)]
pub struct BridgeHub {
    manager: ConnectionManager,
    voice_state: Arc<VoiceStateHandler>,
    registry: Arc<dyn RegistrationStore>,
    bridge: Arc<BridgeEngine>,
    membership: Arc<MembershipTable>,
    presence: Arc<PresenceAggregator>,
    cues: Arc<CuePlayer>,
    events: Arc<EventBus>,
}

impl BridgeHub {
    pub fn new(
        platform: Arc<dyn VoicePlatform>,
        registry: Arc<dyn RegistrationStore>,
        config: &BridgeConfig,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let table = Arc::new(ConnectionTable::new());
        let membership = Arc::new(MembershipTable::new());
        let bridge = Arc::new(BridgeEngine::new(
            Arc::clone(&events),
            config.bridge.silence(),
            config.bridge.gain as f32,
        ));
        let presence = Arc::new(PresenceAggregator::new(
            Arc::clone(&platform),
            Arc::clone(&membership),
            Arc::clone(&events),
            config.presence.idle_text.clone(),
            config.presence.enabled,
        ));
        let cues = Arc::new(CuePlayer::new(
            Arc::clone(&table),
            Arc::clone(&events),
            config.cues.volume as f32,
            config.cues.enabled,
        ));

        let manager = ConnectionManager::new(
            ManagerParts {
                platform,
                registry: Arc::clone(&registry),
                table,
                bridge: Arc::clone(&bridge),
                membership: Arc::clone(&membership),
                presence: Arc::clone(&presence),
                cues: Arc::clone(&cues),
                events: Arc::clone(&events),
            },
            &config.connection,
        );
        let voice_state = Arc::new(VoiceStateHandler::new(
            manager.clone(),
            Arc::clone(&registry),
            Arc::clone(&cues),
            Arc::clone(&presence),
        ));

        Self {
            manager,
            voice_state,
            registry,
            bridge,
            membership,
            presence,
            cues,
            events,
        }
    }

    pub async fn ensure_connection(
        &self,
        group: &GroupId,
        channel: &ChannelId,
    ) -> Result<Arc<dyn VoiceSession>> {
        self.manager.ensure_connection(group, channel).await
    }

    pub async fn release(&self, group: &GroupId) -> bool {
        self.manager.release(group).await
    }

    pub async fn reconnect_all(&self) -> Result<ReconnectSummary> {
        self.manager.reconnect_all().await
    }

    pub async fn handle_voice_state(&self, update: &VoiceStateUpdate) -> Result<VoiceStateChange> {
        self.voice_state.handle(update).await
    }

    pub async fn play_cue(&self, group: &GroupId, kind: CueKind) -> bool {
        self.cues.play_cue(group, kind).await
    }

    /// Status of every group sharing `group`'s secret, `group` included.
    pub async fn network_snapshot(&self, group: &GroupId) -> Result<Vec<GroupStatus>> {
        let Some(secret) = self.registry.secret_for(group).await? else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for member in self.registry.groups_by_secret(&secret, None).await? {
            let Some(registration) = self.registry.registration(&member).await? else {
                continue;
            };
            rows.push(GroupStatus {
                connected: self.manager.is_connected(&member).await,
                user_count: self.membership.count(&member),
                channel_id: registration.channel_id,
                group_id: member,
            });
        }
        Ok(rows)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub async fn shutdown(&self) -> usize {
        self.manager.shutdown().await
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn bridge(&self) -> &BridgeEngine {
        &self.bridge
    }

    pub fn membership(&self) -> &MembershipTable {
        &self.membership
    }

    pub fn cues(&self) -> &CuePlayer {
        &self.cues
    }

    pub fn presence(&self) -> &PresenceAggregator {
        &self.presence
    }
}
