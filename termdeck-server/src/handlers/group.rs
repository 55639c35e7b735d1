//! Workspace group handlers
//!
//! Handles: GroupCreate, GroupRename, GroupDelete, ListGroups

use tracing::debug;

use termdeck_protocol::{ErrorCode, GroupId, ServerMessage};

use super::{HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle GroupCreate - idempotent, echoed to other clients
    pub fn handle_group_create(
        &self,
        group_id: GroupId,
        label: String,
        created_at: i64,
    ) -> HandlerResult {
        let group = self.groups.upsert(group_id, label, created_at);
        let msg = ServerMessage::GroupCreated { group };
        HandlerResult::ResponseWithBroadcast {
            response: msg.clone(),
            broadcast: msg,
        }
    }

    /// Handle GroupRename
    pub fn handle_group_rename(&self, group_id: GroupId, label: String) -> HandlerResult {
        if !self.groups.rename(group_id, label.clone()) {
            return HandlerContext::error(
                ErrorCode::GroupNotFound,
                format!("Group {} not found", group_id),
            );
        }

        let msg = ServerMessage::GroupRenamed { group_id, label };
        HandlerResult::ResponseWithBroadcast {
            response: msg.clone(),
            broadcast: msg,
        }
    }

    /// Handle GroupDelete - deleting an unknown group still succeeds
    pub fn handle_group_delete(&self, group_id: GroupId) -> HandlerResult {
        if !self.groups.remove(group_id) {
            debug!(group_id = %group_id, "Delete for unknown group");
        }

        let msg = ServerMessage::GroupDeleted { group_id };
        HandlerResult::ResponseWithBroadcast {
            response: msg.clone(),
            broadcast: msg,
        }
    }

    /// Handle ListGroups
    pub fn handle_list_groups(&self) -> HandlerResult {
        HandlerResult::Response(ServerMessage::GroupList {
            groups: self.groups.list(),
        })
    }
}
