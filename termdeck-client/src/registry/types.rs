//! Session and group records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use termdeck_protocol::{GroupId, GroupInfo, SessionId, TerminalId};
use uuid::Uuid;

/// What runs in a session's terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    /// An AI coding-assistant CLI
    ClaudeLike,
    /// A plain shell
    Shell,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::ClaudeLike => write!(f, "claude-like"),
            SessionKind::Shell => write!(f, "shell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    #[default]
    Idle,
}

/// A console session, optionally bound to a terminal and a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSession {
    pub id: SessionId,
    pub kind: SessionKind,
    #[serde(default)]
    pub terminal_id: Option<TerminalId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub label: String,
    /// Provider command for assistant sessions
    #[serde(default)]
    pub command: Option<String>,
}

impl ConsoleSession {
    pub fn new(kind: SessionKind, label: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            terminal_id: None,
            group_id: None,
            status: SessionStatus::Idle,
            created_at,
            label: label.into(),
            command: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == SessionStatus::Idle
    }

    pub fn is_shell(&self) -> bool {
        self.kind == SessionKind::Shell
    }
}

/// A workspace group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGroup {
    pub id: GroupId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionGroup {
    pub fn new(label: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            created_at,
            last_activity_at: created_at,
        }
    }

    /// Wire form for the server's group directory
    pub fn to_info(&self) -> GroupInfo {
        GroupInfo::new(self.id, self.label.clone(), self.created_at.timestamp_millis())
    }

    /// Build from a group announced by another connection
    pub fn from_info(info: &GroupInfo, now: DateTime<Utc>) -> Self {
        let created_at = DateTime::from_timestamp_millis(info.created_at).unwrap_or(now);
        Self {
            id: info.group_id,
            label: info.label.clone(),
            created_at,
            last_activity_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_kind_serde() {
        assert_eq!(
            serde_json::to_string(&SessionKind::ClaudeLike).unwrap(),
            "\"claude-like\""
        );
        assert_eq!(serde_json::to_string(&SessionKind::Shell).unwrap(), "\"shell\"");
        assert_eq!(SessionKind::ClaudeLike.to_string(), "claude-like");
    }

    #[test]
    fn test_new_session_defaults() {
        let session = ConsoleSession::new(SessionKind::Shell, "zsh", Utc::now());
        assert!(session.is_idle());
        assert!(session.is_shell());
        assert!(session.terminal_id.is_none());
    }

    #[test]
    fn test_group_info_conversion() {
        let now = Utc::now();
        let group = SessionGroup::new("Workspace", now);
        let info = group.to_info();
        assert_eq!(info.group_id, group.id);
        assert_eq!(info.created_at, now.timestamp_millis());

        let back = SessionGroup::from_info(&info, now);
        assert_eq!(back.id, group.id);
        assert_eq!(back.created_at.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_session_json_field_names() {
        let mut session = ConsoleSession::new(SessionKind::ClaudeLike, "claude", Utc::now());
        session.terminal_id = Some(Uuid::new_v4());
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"terminalId\""));
        assert!(json.contains("\"createdAt\""));
    }
}
