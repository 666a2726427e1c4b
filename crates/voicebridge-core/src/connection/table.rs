//! Group connection registry.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use voicebridge_common::GroupId;

use super::types::{ConnectionStatus, GroupSlot};
use crate::platform::VoiceSession;

/// Map from group to its guarded slot.
///
/// Slots are created on first use and never removed, so every caller for a
/// group contends on the same mutex. The map shard lock is only held to
/// fetch or create the slot.
#[derive(Default)]
pub struct ConnectionTable {
    slots: DashMap<GroupId, Arc<Mutex<GroupSlot>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, group: &GroupId) -> Arc<Mutex<GroupSlot>> {
        Arc::clone(self.slots.entry(group.clone()).or_default().value())
    }

    /// Lock a group's slot.
    pub async fn lock(&self, group: &GroupId) -> OwnedMutexGuard<GroupSlot> {
        self.slot(group).lock_owned().await
    }

    /// The group's session if it is currently `Ready`.
    pub async fn ready_session(&self, group: &GroupId) -> Option<Arc<dyn VoiceSession>> {
        let slot = self.lock(group).await;
        slot.connection
            .as_ref()
            .filter(|conn| conn.is_ready())
            .map(|conn| Arc::clone(&conn.session))
    }

    pub async fn status(&self, group: &GroupId) -> ConnectionStatus {
        let slot = self.lock(group).await;
        slot.connection
            .as_ref()
            .map_or(ConnectionStatus::Idle, |conn| conn.status())
    }

    /// Groups that currently hold an entry.
    pub async fn connected_groups(&self) -> Vec<GroupId> {
        let slots: Vec<(GroupId, Arc<Mutex<GroupSlot>>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut groups = Vec::new();
        for (group, slot) in slots {
            if slot.lock().await.connection.is_some() {
                groups.push(group);
            }
        }
        groups.sort();
        groups
    }
}
