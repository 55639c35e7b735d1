//! Workspace group records shared between client and server

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a workspace group
pub type GroupId = Uuid;

/// A workspace group as known to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: GroupId,
    pub label: String,
    /// Creation time, Unix milliseconds
    pub created_at: i64,
}

impl GroupInfo {
    pub fn new(group_id: GroupId, label: impl Into<String>, created_at: i64) -> Self {
        Self {
            group_id,
            label: label.into(),
            created_at,
        }
    }
}
