//! Non-bot occupants of each group's monitored channel.

use std::collections::HashSet;

use dashmap::DashMap;
use voicebridge_common::{GroupId, UserId};

/// Per-group membership sets. Entries are never left empty: removing the
/// last user drops the group's set.
#[derive(Debug, Default)]
pub struct MembershipTable {
    groups: DashMap<GroupId, HashSet<UserId>>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a group's set with a fresh snapshot.
    pub fn replace(&self, group: &GroupId, users: impl IntoIterator<Item = UserId>) {
        let users: HashSet<UserId> = users.into_iter().collect();
        if users.is_empty() {
            self.groups.remove(group);
        } else {
            self.groups.insert(group.clone(), users);
        }
    }

    /// Returns true if the user was not already present.
    pub fn insert(&self, group: &GroupId, user: UserId) -> bool {
        self.groups.entry(group.clone()).or_default().insert(user)
    }

    /// Returns true if the user was present.
    pub fn remove(&self, group: &GroupId, user: &UserId) -> bool {
        let removed = match self.groups.get_mut(group) {
            Some(mut users) => users.remove(user),
            None => return false,
        };
        self.groups.remove_if(group, |_, users| users.is_empty());
        removed
    }

    pub fn remove_group(&self, group: &GroupId) -> bool {
        self.groups.remove(group).is_some()
    }

    pub fn contains_group(&self, group: &GroupId) -> bool {
        self.groups.contains_key(group)
    }

    pub fn members(&self, group: &GroupId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .groups
            .get(group)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    pub fn count(&self, group: &GroupId) -> usize {
        self.groups.get(group).map_or(0, |users| users.len())
    }

    /// `(total users, groups with at least one user)`.
    pub fn totals(&self) -> (usize, usize) {
        self.groups
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .fold((0, 0), |(users, groups), entry| {
                (users + entry.value().len(), groups + 1)
            })
    }
}
