//! Client-server message types

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::*;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    /// Initial connection handshake
    Connect {
        client_id: Uuid,
        protocol_version: u32,
    },

    /// Ping for keepalive
    Ping,

    /// Spawn a PTY for a terminal id, or reclaim the live one
    PtyCreate {
        terminal_id: TerminalId,
        cwd: PathBuf,
        cols: u16,
        rows: u16,
        /// Shell or program to run (server default when None)
        shell: Option<String>,
        /// Environment overrides
        env: BTreeMap<String, String>,
        /// Capture output to disk for later scrollback restore
        logging: bool,
    },

    /// Keystroke or paste bytes
    PtyInput { terminal_id: TerminalId, data: Vec<u8> },

    /// Resize the terminal
    PtyResize {
        terminal_id: TerminalId,
        cols: u16,
        rows: u16,
    },

    /// Terminate the process
    PtyClose { terminal_id: TerminalId },

    /// Read back captured output of a logging terminal
    PtyReadLog { terminal_id: TerminalId },

    /// Register a workspace group
    GroupCreate {
        group_id: GroupId,
        label: String,
        /// Unix milliseconds
        created_at: i64,
    },

    /// Rename a workspace group
    GroupRename { group_id: GroupId, label: String },

    /// Remove a workspace group
    GroupDelete { group_id: GroupId },

    /// List groups known to the server
    ListGroups,
}

impl ClientMessage {
    /// Wire-level name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Connect { .. } => "connect",
            ClientMessage::Ping => "ping",
            ClientMessage::PtyCreate { .. } => "pty:create",
            ClientMessage::PtyInput { .. } => "pty:input",
            ClientMessage::PtyResize { .. } => "pty:resize",
            ClientMessage::PtyClose { .. } => "pty:close",
            ClientMessage::PtyReadLog { .. } => "pty:read-log",
            ClientMessage::GroupCreate { .. } => "group:create",
            ClientMessage::GroupRename { .. } => "group:rename",
            ClientMessage::GroupDelete { .. } => "group:delete",
            ClientMessage::ListGroups => "group:list",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMessage {
    /// Connection accepted
    Connected {
        server_version: String,
        protocol_version: u32,
    },

    /// Keepalive response
    Pong,

    /// Result of a create request
    PtyCreated {
        terminal_id: TerminalId,
        /// True when an existing live process was reattached instead of spawned
        reclaimed: bool,
    },

    /// Process output
    PtyOutput { terminal_id: TerminalId, data: Vec<u8> },

    /// Working directory of the process changed
    PtyCwdChange { terminal_id: TerminalId, cwd: String },

    /// Process exited
    PtyExit {
        terminal_id: TerminalId,
        exit_code: Option<i32>,
    },

    /// Captured output of a logging terminal
    PtyLog { terminal_id: TerminalId, data: Vec<u8> },

    /// A group was registered (echoed to other connections too)
    GroupCreated { group: GroupInfo },

    /// A group was renamed
    GroupRenamed { group_id: GroupId, label: String },

    /// A group was removed
    GroupDeleted { group_id: GroupId },

    /// Groups known to the server
    GroupList { groups: Vec<GroupInfo> },

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Wire-level name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Pong => "pong",
            ServerMessage::PtyCreated { .. } => "pty:created",
            ServerMessage::PtyOutput { .. } => "pty:output",
            ServerMessage::PtyCwdChange { .. } => "pty:cwd-change",
            ServerMessage::PtyExit { .. } => "pty:exit",
            ServerMessage::PtyLog { .. } => "pty:log",
            ServerMessage::GroupCreated { .. } => "group:created",
            ServerMessage::GroupRenamed { .. } => "group:renamed",
            ServerMessage::GroupDeleted { .. } => "group:deleted",
            ServerMessage::GroupList { .. } => "group:list",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Terminal this event is scoped to, if any
    pub fn terminal_id(&self) -> Option<TerminalId> {
        match self {
            ServerMessage::PtyCreated { terminal_id, .. }
            | ServerMessage::PtyOutput { terminal_id, .. }
            | ServerMessage::PtyCwdChange { terminal_id, .. }
            | ServerMessage::PtyExit { terminal_id, .. }
            | ServerMessage::PtyLog { terminal_id, .. } => Some(*terminal_id),
            _ => None,
        }
    }
}

/// Error codes carried by [`ServerMessage::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    TerminalNotFound,
    GroupNotFound,
    ProtocolMismatch,
    InvalidMessage,
    SpawnFailed,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_names() {
        let id = Uuid::new_v4();
        assert_eq!(ClientMessage::Ping.name(), "ping");
        assert_eq!(
            ClientMessage::PtyInput {
                terminal_id: id,
                data: vec![]
            }
            .name(),
            "pty:input"
        );
        assert_eq!(ClientMessage::GroupDelete { group_id: id }.name(), "group:delete");
    }

    #[test]
    fn test_server_message_terminal_scope() {
        let id = Uuid::new_v4();
        let msg = ServerMessage::PtyCwdChange {
            terminal_id: id,
            cwd: "/tmp".into(),
        };
        assert_eq!(msg.terminal_id(), Some(id));
        assert_eq!(msg.name(), "pty:cwd-change");
        assert_eq!(ServerMessage::Pong.terminal_id(), None);
        assert_eq!(
            ServerMessage::GroupDeleted { group_id: id }.terminal_id(),
            None
        );
    }
}
