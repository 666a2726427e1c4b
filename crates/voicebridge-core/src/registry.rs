//! Read access to the persisted (group, channel, secret) registrations.
//!
//! Registration CRUD lives outside the core. The core only reads through
//! [`RegistrationStore`]; [`MemoryRegistrationStore`] is the in-process
//! implementation, optionally seeded from a TOML file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use voicebridge_common::{ChannelId, GroupId, RegistryError, UserId};

/// One group's bridge registration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRegistration {
    pub group_id: GroupId,
    pub channel_id: ChannelId,
    pub secret: String,
    pub creator_id: UserId,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for GroupRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRegistration")
            .field("group_id", &self.group_id)
            .field("channel_id", &self.channel_id)
            .field("secret", &"[REDACTED]")
            .field("creator_id", &self.creator_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Read contract the core relies on.
#[async_trait]
pub trait RegistrationStore: Send + Sync + 'static {
    async fn registration(&self, group: &GroupId)
        -> Result<Option<GroupRegistration>, RegistryError>;

    async fn registration_for_channel(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<GroupRegistration>, RegistryError>;

    async fn all(&self) -> Result<Vec<GroupRegistration>, RegistryError>;

    /// Every group registered under `secret`, minus `excluding`.
    async fn groups_by_secret(
        &self,
        secret: &str,
        excluding: Option<&GroupId>,
    ) -> Result<Vec<GroupId>, RegistryError>;

    async fn secret_for(&self, group: &GroupId) -> Result<Option<String>, RegistryError> {
        Ok(self.registration(group).await?.map(|r| r.secret))
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    registration: Vec<GroupRegistration>,
}

/// Thread-safe in-memory registration store.
#[derive(Clone, Default)]
pub struct MemoryRegistrationStore {
    entries: Arc<RwLock<HashMap<GroupId, GroupRegistration>>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list, rejecting duplicate groups.
    pub fn from_registrations(
        registrations: Vec<GroupRegistration>,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            entries: Arc::new(RwLock::new(index(registrations)?)),
        })
    }

    /// Parse `[[registration]]` tables.
    pub fn parse_toml(content: &str) -> Result<Vec<GroupRegistration>, RegistryError> {
        let file: RegistryFile = toml::from_str(content)
            .map_err(|e| RegistryError::ParseError(format!("failed to parse TOML: {e}")))?;
        Ok(file.registration)
    }

    pub fn read_file(path: &Path) -> Result<Vec<GroupRegistration>, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Unavailable(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse_toml(&content)
    }

    /// Insert a registration. Returns `Duplicate` if the group already has one.
    pub async fn insert(&self, registration: GroupRegistration) -> Result<(), RegistryError> {
        let mut map = self.entries.write().await;
        if map.contains_key(&registration.group_id) {
            return Err(RegistryError::Duplicate(registration.group_id));
        }
        map.insert(registration.group_id.clone(), registration);
        Ok(())
    }

    pub async fn remove(&self, group: &GroupId) -> Option<GroupRegistration> {
        self.entries.write().await.remove(group)
    }

    /// Swap the whole table. On error the current contents are kept.
    pub async fn replace_all(
        &self,
        registrations: Vec<GroupRegistration>,
    ) -> Result<usize, RegistryError> {
        let next = index(registrations)?;
        let count = next.len();
        *self.entries.write().await = next;
        info!(registrations = count, "Registry replaced");
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn index(
    registrations: Vec<GroupRegistration>,
) -> Result<HashMap<GroupId, GroupRegistration>, RegistryError> {
    let mut map = HashMap::with_capacity(registrations.len());
    for registration in registrations {
        if map.contains_key(&registration.group_id) {
            return Err(RegistryError::Duplicate(registration.group_id));
        }
        map.insert(registration.group_id.clone(), registration);
    }
    Ok(map)
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn registration(
        &self,
        group: &GroupId,
    ) -> Result<Option<GroupRegistration>, RegistryError> {
        Ok(self.entries.read().await.get(group).cloned())
    }

    async fn registration_for_channel(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<GroupRegistration>, RegistryError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .find(|r| &r.channel_id == channel)
            .cloned())
    }

    async fn all(&self) -> Result<Vec<GroupRegistration>, RegistryError> {
        let mut all: Vec<_> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        Ok(all)
    }

    async fn groups_by_secret(
        &self,
        secret: &str,
        excluding: Option<&GroupId>,
    ) -> Result<Vec<GroupId>, RegistryError> {
        let mut groups: Vec<GroupId> = self
            .entries
            .read()
            .await
            .values()
            .filter(|r| r.secret == secret && Some(&r.group_id) != excluding)
            .map(|r| r.group_id.clone())
            .collect();
        groups.sort();
        Ok(groups)
    }
}
