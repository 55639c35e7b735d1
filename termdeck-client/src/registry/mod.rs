//! Session and group registry
//!
//! In-memory maps of sessions and groups plus the active selection. The
//! console drives all mutations; this type only keeps the maps consistent.

mod types;

pub use types::{ConsoleSession, SessionGroup, SessionKind, SessionStatus};

use std::collections::HashMap;

use termdeck_protocol::{GroupId, SessionId, TerminalId};

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, ConsoleSession>,
    groups: HashMap<GroupId, SessionGroup>,
    active_session: Option<SessionId>,
    active_group: Option<GroupId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted maps
    pub fn from_parts(
        sessions: HashMap<SessionId, ConsoleSession>,
        groups: HashMap<GroupId, SessionGroup>,
        active_session: Option<SessionId>,
        active_group: Option<GroupId>,
    ) -> Self {
        let active_session = active_session.filter(|id| sessions.contains_key(id));
        let active_group = active_group.filter(|id| groups.contains_key(id));
        Self {
            sessions,
            groups,
            active_session,
            active_group,
        }
    }

    // ==================== Sessions ====================

    pub fn insert_session(&mut self, session: ConsoleSession) {
        self.sessions.insert(session.id, session);
    }

    pub fn session(&self, id: SessionId) -> Option<&ConsoleSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut ConsoleSession> {
        self.sessions.get_mut(&id)
    }

    pub fn contains_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn remove_session(&mut self, id: SessionId) -> Option<ConsoleSession> {
        if self.active_session == Some(id) {
            self.active_session = None;
        }
        self.sessions.remove(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ConsoleSession> {
        self.sessions.values()
    }

    pub fn sessions_map(&self) -> &HashMap<SessionId, ConsoleSession> {
        &self.sessions
    }

    /// Sessions sorted oldest first
    pub fn sessions_sorted(&self) -> Vec<&ConsoleSession> {
        let mut sessions: Vec<_> = self.sessions.values().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn sessions_in_group(&self, group_id: GroupId) -> Vec<&ConsoleSession> {
        self.sessions_sorted()
            .into_iter()
            .filter(|s| s.group_id == Some(group_id))
            .collect()
    }

    pub fn session_for_terminal(&self, terminal_id: TerminalId) -> Option<&ConsoleSession> {
        self.sessions
            .values()
            .find(|s| s.terminal_id == Some(terminal_id))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    pub fn set_active_session(&mut self, id: Option<SessionId>) {
        self.active_session = id.filter(|id| self.sessions.contains_key(id));
    }

    /// Session to focus when a group becomes active
    ///
    /// An active session with a terminal beats any session with a terminal,
    /// which beats the most recently created session.
    pub fn preferred_session(&self, group_id: GroupId) -> Option<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.group_id == Some(group_id))
            .max_by_key(|s| {
                let rank = match (s.status, s.terminal_id.is_some()) {
                    (SessionStatus::Active, true) => 2,
                    (_, true) => 1,
                    _ => 0,
                };
                (rank, s.created_at, s.id)
            })
            .map(|s| s.id)
    }

    // ==================== Groups ====================

    pub fn insert_group(&mut self, group: SessionGroup) {
        self.groups.insert(group.id, group);
    }

    pub fn group(&self, id: GroupId) -> Option<&SessionGroup> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut SessionGroup> {
        self.groups.get_mut(&id)
    }

    pub fn contains_group(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn remove_group(&mut self, id: GroupId) -> Option<SessionGroup> {
        if self.active_group == Some(id) {
            self.active_group = None;
        }
        self.groups.remove(&id)
    }

    pub fn groups_map(&self) -> &HashMap<GroupId, SessionGroup> {
        &self.groups
    }

    /// Groups sorted oldest first
    pub fn groups_sorted(&self) -> Vec<&SessionGroup> {
        let mut groups: Vec<_> = self.groups.values().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        groups
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn active_group(&self) -> Option<GroupId> {
        self.active_group
    }

    pub fn set_active_group(&mut self, id: Option<GroupId>) {
        self.active_group = id.filter(|id| self.groups.contains_key(id));
    }

    /// `label`, or `label N` with the smallest N ≥ 2 not already used
    pub fn dedupe_group_label(&self, label: &str) -> String {
        let taken = |candidate: &str| self.groups.values().any(|g| g.label == candidate);
        if !taken(label) {
            return label.to_string();
        }
        (2..)
            .map(|n| format!("{} {}", label, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| label.to_string())
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.groups.clear();
        self.active_session = None;
        self.active_group = None;
    }
}
