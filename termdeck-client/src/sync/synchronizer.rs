//! Connection synchronizer
//!
//! Tracks the connection epoch, which terminals were requested on the
//! current connection, and throttles group activity writes. It produces
//! protocol messages; the runtime is responsible for sending them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use termdeck_protocol::{ClientMessage, GroupId, GroupInfo, ServerMessage, TerminalId};
use tokio::time::Instant;

use super::connection::Tagged;

/// Minimum spacing between `last_activity_at` writes for one group
pub const GROUP_ACTIVITY_THROTTLE: Duration = Duration::from_secs(30);

/// Everything needed to ask the server for a terminal
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalRequest {
    pub terminal_id: TerminalId,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub shell: Option<String>,
    pub env: BTreeMap<String, String>,
    pub logging: bool,
}

impl TerminalRequest {
    pub fn into_message(self) -> ClientMessage {
        ClientMessage::PtyCreate {
            terminal_id: self.terminal_id,
            cwd: self.cwd,
            cols: self.cols,
            rows: self.rows,
            shell: self.shell,
            env: self.env,
            logging: self.logging,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionSynchronizer {
    epoch: u64,
    /// Epoch in which each terminal was last requested
    terminal_epochs: HashMap<TerminalId, u64>,
    /// Terminals already requested on the current connection
    created_terminal_ids: HashSet<TerminalId>,
    group_activity_writes: HashMap<GroupId, Instant>,
}

impl ConnectionSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new connection attempt
    pub fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.created_terminal_ids.clear();
        self.epoch
    }

    /// Create request for a terminal, once per connection
    pub fn request_terminal(&mut self, request: TerminalRequest) -> Option<ClientMessage> {
        if !self.created_terminal_ids.insert(request.terminal_id) {
            return None;
        }
        self.terminal_epochs.insert(request.terminal_id, self.epoch);
        Some(request.into_message())
    }

    pub fn was_requested(&self, terminal_id: TerminalId) -> bool {
        self.created_terminal_ids.contains(&terminal_id)
    }

    /// Stop tracking a terminal (closed, exited or removed)
    pub fn forget_terminal(&mut self, terminal_id: TerminalId) {
        self.created_terminal_ids.remove(&terminal_id);
        self.terminal_epochs.remove(&terminal_id);
    }

    /// Messages restoring server-side state after a (re)connect
    ///
    /// Groups are announced before any terminal is requested.
    pub fn replay(
        &mut self,
        groups: impl IntoIterator<Item = GroupInfo>,
        terminals: impl IntoIterator<Item = TerminalRequest>,
    ) -> Vec<ClientMessage> {
        let mut messages: Vec<ClientMessage> = groups
            .into_iter()
            .map(|group| ClientMessage::GroupCreate {
                group_id: group.group_id,
                label: group.label,
                created_at: group.created_at,
            })
            .collect();
        messages.extend(
            terminals
                .into_iter()
                .filter_map(|request| self.request_terminal(request)),
        );
        messages
    }

    /// Filter out results belonging to a superseded connection
    pub fn accept(&self, tagged: Tagged) -> Option<ServerMessage> {
        if tagged.epoch < self.epoch {
            tracing::debug!(
                message = tagged.message.name(),
                epoch = tagged.epoch,
                current = self.epoch,
                "Dropping stale message"
            );
            return None;
        }
        if let ServerMessage::PtyCreated { terminal_id, .. } = &tagged.message {
            if self.terminal_epochs.get(terminal_id) != Some(&tagged.epoch) {
                tracing::debug!(%terminal_id, "Dropping create response from another epoch");
                return None;
            }
        }
        Some(tagged.message)
    }

    /// Whether a group's activity timestamp should be written now
    pub fn bump_group_activity(&mut self, group_id: GroupId, now: Instant) -> bool {
        match self.group_activity_writes.get(&group_id) {
            Some(last) if now.saturating_duration_since(*last) < GROUP_ACTIVITY_THROTTLE => false,
            _ => {
                self.group_activity_writes.insert(group_id, now);
                true
            }
        }
    }

    pub fn forget_group(&mut self, group_id: GroupId) {
        self.group_activity_writes.remove(&group_id);
    }

    /// Drop all terminal and group tracking, keeping the epoch
    pub fn reset(&mut self) {
        self.terminal_epochs.clear();
        self.created_terminal_ids.clear();
        self.group_activity_writes.clear();
    }
}
