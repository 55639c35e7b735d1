//! Server-side record of workspace groups
//!
//! Groups are owned by the console client; the server keeps a copy so every
//! connection can list them. All operations are idempotent because clients
//! replay their groups after each reconnect.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use termdeck_protocol::{GroupId, GroupInfo};

#[derive(Debug, Default)]
pub struct GroupDirectory {
    groups: RwLock<HashMap<GroupId, GroupInfo>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a group. A replayed create refreshes the label but keeps the
    /// original creation time.
    pub fn upsert(&self, group_id: GroupId, label: String, created_at: i64) -> GroupInfo {
        let mut groups = self.groups.write();
        let entry = groups.entry(group_id).or_insert_with(|| GroupInfo {
            group_id,
            label: label.clone(),
            created_at,
        });
        entry.label = label;
        debug!(group_id = %group_id, label = %entry.label, "Group recorded");
        entry.clone()
    }

    /// Rename a group; false when unknown
    pub fn rename(&self, group_id: GroupId, label: String) -> bool {
        match self.groups.write().get_mut(&group_id) {
            Some(group) => {
                group.label = label;
                true
            }
            None => false,
        }
    }

    /// Remove a group; false when it was not present
    pub fn remove(&self, group_id: GroupId) -> bool {
        self.groups.write().remove(&group_id).is_some()
    }

    /// All groups ordered by creation time
    pub fn list(&self) -> Vec<GroupInfo> {
        let mut groups: Vec<GroupInfo> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.group_id.cmp(&b.group_id))
        });
        groups
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = GroupDirectory::new();
        let id = Uuid::new_v4();

        dir.upsert(id, "Work".into(), 100);
        let again = dir.upsert(id, "Work (renamed)".into(), 999);

        assert_eq!(dir.len(), 1);
        assert_eq!(again.label, "Work (renamed)");
        assert_eq!(again.created_at, 100);
    }

    #[test]
    fn test_rename_unknown() {
        let dir = GroupDirectory::new();
        assert!(!dir.rename(Uuid::new_v4(), "x".into()));
    }

    #[test]
    fn test_remove() {
        let dir = GroupDirectory::new();
        let id = Uuid::new_v4();
        dir.upsert(id, "A".into(), 1);
        assert!(dir.remove(id));
        assert!(!dir.remove(id));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_list_ordered_by_creation() {
        let dir = GroupDirectory::new();
        let late = Uuid::new_v4();
        let early = Uuid::new_v4();
        dir.upsert(late, "Late".into(), 20);
        dir.upsert(early, "Early".into(), 10);

        let labels: Vec<String> = dir.list().into_iter().map(|g| g.label).collect();
        assert_eq!(labels, vec!["Early", "Late"]);
    }
}
