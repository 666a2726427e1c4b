#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use voicebridge_common::{ChannelId, GroupId, UserId};
use voicebridge_config::BridgeConfig;
use voicebridge_core::platform::{LoopbackPlatform, LoopbackSession};
use voicebridge_core::{BridgeHub, GroupRegistration, MemoryRegistrationStore};

pub struct Harness {
    pub platform: Arc<LoopbackPlatform>,
    pub store: MemoryRegistrationStore,
    pub hub: BridgeHub,
}

impl Harness {
    /// `(group, secret)` pairs; each group's channel is `<group>-voice`.
    pub fn new(groups: &[(&str, &str)]) -> Self {
        Self::with_config(groups, BridgeConfig::default())
    }

    pub fn with_config(groups: &[(&str, &str)], config: BridgeConfig) -> Self {
        let platform = LoopbackPlatform::new();
        let store = MemoryRegistrationStore::from_registrations(
            groups
                .iter()
                .map(|(group, secret)| registration(group, secret))
                .collect(),
        )
        .expect("unique groups");
        let hub = BridgeHub::new(platform.clone(), Arc::new(store.clone()), &config);
        Self {
            platform,
            store,
            hub,
        }
    }

    pub async fn connect(&self, group: &str) {
        self.hub
            .ensure_connection(&gid(group), &channel(group))
            .await
            .expect("connection should become ready");
    }

    pub fn session(&self, group: &str) -> Arc<LoopbackSession> {
        self.platform.session(&gid(group)).expect("session opened")
    }
}

pub fn registration(group: &str, secret: &str) -> GroupRegistration {
    GroupRegistration {
        group_id: gid(group),
        channel_id: channel(group),
        secret: secret.to_string(),
        creator_id: UserId::from("admin"),
        created_at: Utc::now(),
    }
}

pub fn gid(group: &str) -> GroupId {
    GroupId::from(group)
}

pub fn uid(user: &str) -> UserId {
    UserId::from(user)
}

pub fn channel(group: &str) -> ChannelId {
    ChannelId::from(format!("{group}-voice"))
}

/// Let spawned tasks run without advancing a paused clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
