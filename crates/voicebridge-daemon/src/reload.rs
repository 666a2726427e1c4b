//! Periodic re-read of the registry file.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;
use voicebridge_common::{GroupId, Result};
use voicebridge_core::{BridgeHub, GroupRegistration, MemoryRegistrationStore, RegistrationStore, ScheduledTask};

/// Swaps the in-memory registry for the file's current contents and
/// releases connected groups that were unregistered or whose secret or
/// channel changed. New and changed groups connect on the next reconnect
/// sweep, which wires them against their current secret set.
pub struct RegistryReloadTask {
    path: PathBuf,
    store: MemoryRegistrationStore,
    hub: BridgeHub,
}

impl RegistryReloadTask {
    pub fn new(path: PathBuf, store: MemoryRegistrationStore, hub: BridgeHub) -> Self {
        Self { path, store, hub }
    }
}

#[async_trait]
impl ScheduledTask for RegistryReloadTask {
    fn name(&self) -> &str {
        "registry-reload"
    }

    async fn run(&self) -> Result<()> {
        let registrations = MemoryRegistrationStore::read_file(&self.path)?;
        let previous = by_group(self.store.all().await?);
        let current = by_group(registrations.clone());
        self.store.replace_all(registrations).await?;

        for group in self.hub.manager().connected_groups().await {
            let reason = match (previous.get(&group), current.get(&group)) {
                (_, None) => "unregistered",
                (Some(old), Some(new)) if old.secret != new.secret => "secret changed",
                (Some(old), Some(new)) if old.channel_id != new.channel_id => "channel changed",
                _ => continue,
            };
            info!(group = %group, reason, "Registration changed, releasing");
            self.hub.release(&group).await;
        }
        Ok(())
    }
}

fn by_group(registrations: Vec<GroupRegistration>) -> HashMap<GroupId, GroupRegistration> {
    registrations
        .into_iter()
        .map(|registration| (registration.group_id.clone(), registration))
        .collect()
}
