//! Presence tracking for members of the network.
//!
//! The roster is fed by `online:users` snapshots and `user:online` /
//! `user:offline` deltas. A snapshot replaces the whole set; deltas in
//! between adjust it.

use dashmap::DashSet;
use std::sync::Arc;
use tracing::debug;

/// Set of member ids currently online. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct OnlineRoster {
    members: Arc<DashSet<String>>,
}

impl OnlineRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a full snapshot.
    pub fn replace(&self, ids: impl IntoIterator<Item = String>) {
        self.members.clear();
        for id in ids {
            self.members.insert(id);
        }
        debug!(online = self.members.len(), "Online roster replaced");
    }

    /// Returns `true` if the member was not already online.
    pub fn mark_online(&self, id: impl Into<String>) -> bool {
        self.members.insert(id.into())
    }

    /// Returns `true` if the member was online.
    pub fn mark_offline(&self, id: &str) -> bool {
        self.members.remove(id).is_some()
    }

    #[must_use]
    pub fn is_online(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Online member ids, sorted.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn clear(&self) {
        self.members.clear();
    }
}
