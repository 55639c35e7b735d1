//! The console: owner of all client-side state
//!
//! `Console` holds the layout store, the session registry, the resource
//! cache, the connection synchronizer and the local state store. Every
//! mutation goes through it. Operations never talk to the network
//! directly; they queue protocol messages in an outbox that the runtime
//! drains into the connection.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use termdeck_protocol::{
    ClientMessage, GroupId, GroupInfo, PaneId, ServerMessage, SessionId, TerminalConnectivity,
    TerminalId, PROTOCOL_VERSION,
};
use termdeck_utils::{Result, TermdeckError};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::{plan_archival, ArchivePlan, ArchiveStore, ArchivedSession};
use crate::cache::{CacheLimits, CacheStats, CachedTerminal, TerminalResourceCache, Vt100Surface};
use crate::config::ClientConfig;
use crate::layout::{LayoutStore, MovePosition, Orientation, PaneContent, TerminalMeta, ViewMode};
use crate::persistence::{reconcile_sessions, PersistDebounce, StateStore};
use crate::registry::{ConsoleSession, SessionGroup, SessionKind, SessionRegistry, SessionStatus};
use crate::sync::{ConnectionSynchronizer, Tagged, TerminalRequest};

/// Label of the group created when a session needs one and none exists
const DEFAULT_GROUP_LABEL: &str = "Workspace";

/// Settings applied to every terminal the console creates
#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub client_id: Uuid,
    pub default_cwd: PathBuf,
    pub default_shell: Option<String>,
    pub assistant_command: String,
    pub cols: u16,
    pub rows: u16,
    pub capture_output: bool,
}

impl ConsoleOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            default_cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            default_shell: config.default_shell.clone(),
            assistant_command: config.assistant_command.clone(),
            cols: config.default_cols,
            rows: config.default_rows,
            capture_output: config.capture_output,
        }
    }
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Parameters for a new session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub kind: SessionKind,
    pub label: Option<String>,
    /// Target group; the active group (or a new one) when unset
    pub group: Option<GroupId>,
    pub cwd: Option<PathBuf>,
    /// Provider command for assistant sessions
    pub command: Option<String>,
    /// Pane to split; the group's active pane when unset
    pub split_from: Option<PaneId>,
    pub orientation: Orientation,
}

impl NewSession {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            label: None,
            group: None,
            cwd: None,
            command: None,
            split_from: None,
            orientation: Orientation::Horizontal,
        }
    }
}

pub struct Console {
    layout: LayoutStore,
    registry: SessionRegistry,
    cache: TerminalResourceCache,
    sync: ConnectionSynchronizer,
    state: StateStore,
    persist: PersistDebounce,
    archive: Arc<dyn ArchiveStore>,
    outbox: VecDeque<ClientMessage>,
    heartbeats: Vec<SessionId>,
    hydrated: bool,
    mounted_at: DateTime<Utc>,
    options: ConsoleOptions,
}

impl Console {
    /// Empty console
    pub fn new(
        options: ConsoleOptions,
        state: StateStore,
        archive: Arc<dyn ArchiveStore>,
        limits: CacheLimits,
    ) -> Self {
        Self {
            layout: LayoutStore::new(),
            registry: SessionRegistry::new(),
            cache: TerminalResourceCache::new(limits),
            sync: ConnectionSynchronizer::new(),
            state,
            persist: PersistDebounce::default(),
            archive,
            outbox: VecDeque::new(),
            heartbeats: Vec::new(),
            hydrated: false,
            mounted_at: Utc::now(),
            options,
        }
    }

    /// Console restored from the state directory
    ///
    /// Persisted sessions are reconciled against the persisted layout right
    /// away. Orphan pruning waits for [`Console::mark_hydrated`].
    pub fn load(
        options: ConsoleOptions,
        state: StateStore,
        archive: Arc<dyn ArchiveStore>,
        limits: CacheLimits,
    ) -> Self {
        let layout = state.load_layout().unwrap_or_default();
        let mut registry = state.load_registry();
        let corrected = reconcile_sessions(&mut registry, &layout);

        let mut console = Self::new(options, state, archive, limits);
        console.layout = layout;
        console.registry = registry;
        if corrected > 0 {
            console.persist.mark_dirty(Instant::now());
        }
        info!(
            "Console loaded: {} sessions, {} groups, {} terminals",
            console.registry.session_count(),
            console.registry.group_count(),
            console.layout.terminal_ids().len()
        );
        console
    }

    // ==================== Accessors ====================

    pub fn layout(&self) -> &LayoutStore {
        &self.layout
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &TerminalResourceCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn epoch(&self) -> u64 {
        self.sync.epoch()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn options(&self) -> &ConsoleOptions {
        &self.options
    }

    /// Drain queued protocol messages
    pub fn take_outbox(&mut self) -> Vec<ClientMessage> {
        self.outbox.drain(..).collect()
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    /// Put messages that could not be sent back ahead of anything queued since
    pub fn requeue_front(&mut self, messages: Vec<ClientMessage>) {
        for message in messages.into_iter().rev() {
            self.outbox.push_front(message);
        }
    }

    /// Drain sessions whose activity should be reported to the archive
    pub fn take_heartbeats(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.heartbeats)
    }

    pub fn archive_store(&self) -> Arc<dyn ArchiveStore> {
        Arc::clone(&self.archive)
    }

    // ==================== Persistence ====================

    /// Record a mutation: layout is written now, the registry on debounce
    fn commit(&mut self) {
        self.persist.mark_dirty(Instant::now());
        if self.layout.take_dirty() {
            if let Err(e) = self.state.save_layout(&self.layout) {
                warn!("Failed to write layout: {}", e);
            }
        }
    }

    pub fn persist_deadline(&self) -> Option<Instant> {
        self.persist.deadline()
    }

    /// Write the registry if the debounce has elapsed
    pub fn flush_if_due(&mut self, now: Instant) -> Result<bool> {
        if !self.persist.due(now) {
            return Ok(false);
        }
        self.flush_now()?;
        Ok(true)
    }

    /// Write everything immediately
    pub fn flush_now(&mut self) -> Result<()> {
        self.persist.clear();
        self.layout.take_dirty();
        self.state.save_registry(&self.registry)?;
        self.state.save_layout(&self.layout)?;
        debug!("Flushed console state to {}", self.state.dir().display());
        Ok(())
    }

    // ==================== Connection ====================

    /// Start a new connection epoch and queue the handshake plus replay
    ///
    /// Returns the epoch the connection's messages must be tagged with.
    pub fn begin_connection(&mut self) -> u64 {
        let epoch = self.sync.begin_epoch();

        // Creates are replayed below; closes, renames and deletes are not
        let pending: Vec<ClientMessage> = self
            .outbox
            .drain(..)
            .filter(|m| {
                matches!(
                    m,
                    ClientMessage::PtyClose { .. }
                        | ClientMessage::GroupRename { .. }
                        | ClientMessage::GroupDelete { .. }
                )
            })
            .collect();

        self.outbox.push_back(ClientMessage::Connect {
            client_id: self.options.client_id,
            protocol_version: PROTOCOL_VERSION,
        });

        let groups: Vec<GroupInfo> = self
            .registry
            .groups_sorted()
            .into_iter()
            .map(SessionGroup::to_info)
            .collect();
        let terminals: Vec<TerminalRequest> = self
            .layout
            .terminals()
            .filter(|(_, meta)| meta.connectivity == TerminalConnectivity::Running)
            .map(|(terminal_id, meta)| self.terminal_request(*terminal_id, meta))
            .collect();

        let replay = self.sync.replay(groups, terminals);
        debug!(epoch, messages = replay.len(), "Replaying console state");
        self.outbox.extend(replay);
        self.outbox.extend(pending);
        self.outbox.push_back(ClientMessage::ListGroups);
        epoch
    }

    /// Session state is known; prune terminals nobody owns
    pub fn mark_hydrated(&mut self) -> Vec<TerminalId> {
        self.hydrated = true;
        self.prune_orphans()
    }

    /// Remove terminals whose session is gone
    ///
    /// Does nothing until the console is hydrated.
    pub fn prune_orphans(&mut self) -> Vec<TerminalId> {
        if !self.hydrated {
            return Vec::new();
        }
        let orphans: Vec<TerminalId> = self
            .layout
            .terminals()
            .filter(|(_, meta)| {
                !meta
                    .session_id
                    .is_some_and(|sid| self.registry.contains_session(sid))
            })
            .map(|(terminal_id, _)| *terminal_id)
            .collect();

        for terminal_id in &orphans {
            info!(%terminal_id, "Pruning orphaned terminal");
            self.release_terminal(*terminal_id);
            self.layout.remove_terminal(*terminal_id);
        }
        if !orphans.is_empty() {
            self.commit();
        }
        orphans
    }

    /// Apply a message received from the server
    pub fn apply_event(&mut self, tagged: Tagged) {
        let Some(message) = self.sync.accept(tagged) else {
            return;
        };

        match message {
            ServerMessage::Connected {
                server_version,
                protocol_version,
            } => {
                info!(
                    "Connected to server {} (protocol {})",
                    server_version, protocol_version
                );
            }
            ServerMessage::Pong => {}
            ServerMessage::PtyCreated {
                terminal_id,
                reclaimed,
            } => self.on_terminal_created(terminal_id, reclaimed),
            ServerMessage::PtyOutput { terminal_id, data } => {
                self.on_terminal_output(terminal_id, &data)
            }
            ServerMessage::PtyCwdChange { terminal_id, cwd } => {
                if self.layout.set_cwd(terminal_id, &cwd) {
                    debug!(%terminal_id, %cwd, "Terminal changed directory");
                    self.commit();
                }
            }
            ServerMessage::PtyExit {
                terminal_id,
                exit_code,
            } => self.on_terminal_exit(terminal_id, exit_code),
            ServerMessage::PtyLog { terminal_id, data } => {
                if !self.cache.has_terminal_dom(terminal_id) && !data.is_empty() {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    self.cache.set_serialized_buffer(terminal_id, text);
                }
            }
            ServerMessage::GroupCreated { group } => self.merge_group(&group),
            ServerMessage::GroupRenamed { group_id, label } => {
                if let Some(group) = self.registry.group_mut(group_id) {
                    if group.label != label {
                        group.label = label;
                        self.commit();
                    }
                }
            }
            ServerMessage::GroupDeleted { group_id } => {
                // Another client dropped it; keep it while we still have sessions in it
                if self.registry.contains_group(group_id)
                    && self.registry.sessions_in_group(group_id).is_empty()
                {
                    self.registry.remove_group(group_id);
                    self.layout.remove_group(group_id);
                    self.sync.forget_group(group_id);
                    self.commit();
                }
            }
            ServerMessage::GroupList { groups } => {
                for group in &groups {
                    self.merge_group(group);
                }
                if !self.hydrated {
                    self.mark_hydrated();
                }
            }
            ServerMessage::Error { code, message } => {
                warn!("Server error {:?}: {}", code, message);
            }
        }
    }

    fn merge_group(&mut self, info: &GroupInfo) {
        if self.registry.contains_group(info.group_id) {
            return;
        }
        debug!(group_id = %info.group_id, label = %info.label, "Adopting group from server");
        self.registry
            .insert_group(SessionGroup::from_info(info, Utc::now()));
        self.layout.ensure_group(info.group_id);
        self.commit();
    }

    fn on_terminal_created(&mut self, terminal_id: TerminalId, reclaimed: bool) {
        debug!(%terminal_id, reclaimed, "Terminal ready");
        self.layout
            .set_connectivity(terminal_id, TerminalConnectivity::Running, None);
        if let Some(session_id) = self.registry.session_for_terminal(terminal_id).map(|s| s.id) {
            if let Some(session) = self.registry.session_mut(session_id) {
                session.status = SessionStatus::Active;
            }
        }

        // A reclaimed process has history we do not hold; ask for its log
        if reclaimed
            && self.options.capture_output
            && !self.cache.has_terminal_dom(terminal_id)
            && self.cache.peek_serialized_buffer(terminal_id).is_none()
        {
            self.outbox
                .push_back(ClientMessage::PtyReadLog { terminal_id });
        }
        self.commit();
    }

    fn on_terminal_output(&mut self, terminal_id: TerminalId, data: &[u8]) {
        if self.layout.terminal_meta(terminal_id).is_none() {
            debug!(%terminal_id, "Output for unknown terminal");
            return;
        }
        self.ensure_surface(terminal_id);
        if let Some(entry) = self.cache.get_terminal_dom_mut(terminal_id) {
            entry.write(data);
        }

        let Some(group_id) = self.layout.group_of_terminal(terminal_id) else {
            return;
        };
        if self.sync.bump_group_activity(group_id, Instant::now()) {
            if let Some(group) = self.registry.group_mut(group_id) {
                group.last_activity_at = Utc::now();
            }
            if let Some(session) = self.registry.session_for_terminal(terminal_id) {
                self.heartbeats.push(session.id);
            }
            self.persist.mark_dirty(Instant::now());
        }
    }

    fn on_terminal_exit(&mut self, terminal_id: TerminalId, exit_code: Option<i32>) {
        info!(%terminal_id, ?exit_code, "Terminal exited");
        self.layout
            .set_connectivity(terminal_id, TerminalConnectivity::Exited, exit_code);
        self.sync.forget_terminal(terminal_id);
        if let Some(session_id) = self.registry.session_for_terminal(terminal_id).map(|s| s.id) {
            if let Some(session) = self.registry.session_mut(session_id) {
                session.status = SessionStatus::Idle;
            }
        }
        self.commit();
    }

    // ==================== Terminals ====================

    fn terminal_request(&self, terminal_id: TerminalId, meta: &TerminalMeta) -> TerminalRequest {
        let session = meta.session_id.and_then(|sid| self.registry.session(sid));
        let shell = match session {
            Some(session) if session.kind == SessionKind::ClaudeLike => Some(
                session
                    .command
                    .clone()
                    .unwrap_or_else(|| self.options.assistant_command.clone()),
            ),
            _ => self.options.default_shell.clone(),
        };
        TerminalRequest {
            terminal_id,
            cwd: PathBuf::from(&meta.cwd),
            cols: self.options.cols,
            rows: self.options.rows,
            shell,
            env: meta.env.clone(),
            logging: self.options.capture_output,
        }
    }

    fn request_terminal(&mut self, terminal_id: TerminalId) {
        let Some(meta) = self.layout.terminal_meta(terminal_id) else {
            return;
        };
        let request = self.terminal_request(terminal_id, meta);
        if let Some(message) = self.sync.request_terminal(request) {
            self.outbox.push_back(message);
        }
    }

    /// Make sure a live surface exists, restoring a snapshot if one is held
    fn ensure_surface(&mut self, terminal_id: TerminalId) {
        if self.cache.has_terminal_dom(terminal_id) {
            return;
        }
        let (cols, rows) = (self.options.cols, self.options.rows);
        let surface = match self.cache.take_serialized_buffer(terminal_id) {
            Some(snapshot) => Vt100Surface::restored(cols, rows, &snapshot),
            None => Vt100Surface::new(cols, rows),
        };
        let evicted = self
            .cache
            .cache_terminal_dom(CachedTerminal::new(terminal_id, Box::new(surface)));
        if !evicted.is_empty() {
            debug!(?evicted, "Evicted surfaces to make room");
        }
    }

    /// Close the process if it runs and drop all client-side resources
    fn release_terminal(&mut self, terminal_id: TerminalId) {
        let running = self
            .layout
            .terminal_meta(terminal_id)
            .is_some_and(|meta| meta.connectivity == TerminalConnectivity::Running);
        if running {
            self.outbox.push_back(ClientMessage::PtyClose { terminal_id });
        }
        self.cache.remove_terminal(terminal_id);
        self.sync.forget_terminal(terminal_id);
    }

    /// Forward keystrokes to a terminal
    pub fn send_input(&mut self, terminal_id: TerminalId, data: Vec<u8>) -> Result<()> {
        if self.layout.terminal_meta(terminal_id).is_none() {
            return Err(TermdeckError::TerminalNotFound(terminal_id.to_string()));
        }
        debug!(%terminal_id, bytes = data.len(), "Sending input");
        self.outbox
            .push_back(ClientMessage::PtyInput { terminal_id, data });
        Ok(())
    }

    pub fn resize_terminal(&mut self, terminal_id: TerminalId, cols: u16, rows: u16) -> Result<()> {
        if self.layout.terminal_meta(terminal_id).is_none() {
            return Err(TermdeckError::TerminalNotFound(terminal_id.to_string()));
        }
        if let Some(entry) = self.cache.get_terminal_dom_mut(terminal_id) {
            entry.resize(cols, rows);
        }
        self.outbox.push_back(ClientMessage::PtyResize {
            terminal_id,
            cols,
            rows,
        });
        Ok(())
    }

    /// Best available screen text of a terminal
    pub fn scrollback(&self, terminal_id: TerminalId) -> Option<String> {
        self.cache.snapshot(terminal_id)
    }

    // ==================== Sessions ====================

    fn default_label(&self, kind: SessionKind) -> String {
        let prefix = match kind {
            SessionKind::ClaudeLike => "Assistant",
            SessionKind::Shell => "Shell",
        };
        let n = self.registry.sessions().filter(|s| s.kind == kind).count() + 1;
        format!("{} {}", prefix, n)
    }

    fn target_group(&mut self, requested: Option<GroupId>) -> Result<GroupId> {
        match requested.or(self.registry.active_group()) {
            Some(group_id) if self.registry.contains_group(group_id) => Ok(group_id),
            Some(group_id) if requested.is_some() => {
                Err(TermdeckError::GroupNotFound(group_id.to_string()))
            }
            _ => {
                let oldest = self.registry.groups_sorted().first().map(|g| g.id);
                match oldest {
                    Some(group_id) => Ok(group_id),
                    None => Ok(self.create_group(DEFAULT_GROUP_LABEL)),
                }
            }
        }
    }

    /// Create a session with a fresh terminal and make it active
    pub fn create_session(&mut self, request: NewSession) -> Result<SessionId> {
        let group_id = self.target_group(request.group)?;
        let label = request
            .label
            .clone()
            .unwrap_or_else(|| self.default_label(request.kind));
        let mut session = ConsoleSession::new(request.kind, label, Utc::now());
        session.command = request.command.clone();
        let session_id = session.id;

        self.spawn_session(session, group_id, request.cwd, request.split_from, request.orientation);
        info!(%session_id, %group_id, "Created session");
        Ok(session_id)
    }

    /// Bind a session to a new terminal in a group and request the process
    fn spawn_session(
        &mut self,
        mut session: ConsoleSession,
        group_id: GroupId,
        cwd: Option<PathBuf>,
        split_from: Option<PaneId>,
        orientation: Orientation,
    ) -> TerminalId {
        let terminal_id = Uuid::new_v4();
        let cwd = cwd.unwrap_or_else(|| self.options.default_cwd.clone());
        let meta = TerminalMeta::new(cwd.to_string_lossy(), session.label.clone())
            .with_session(session.id);

        self.layout
            .insert_terminal(group_id, terminal_id, meta, split_from, orientation);
        self.layout.set_active_group(Some(group_id));

        session.terminal_id = Some(terminal_id);
        session.group_id = Some(group_id);
        session.status = SessionStatus::Active;
        let session_id = session.id;
        self.registry.insert_session(session);
        self.registry.set_active_session(Some(session_id));
        self.registry.set_active_group(Some(group_id));
        if let Some(group) = self.registry.group_mut(group_id) {
            group.last_activity_at = Utc::now();
        }

        self.request_terminal(terminal_id);
        self.ensure_surface(terminal_id);
        self.commit();
        terminal_id
    }

    fn require_session(&self, session_id: SessionId) -> Result<&ConsoleSession> {
        self.registry
            .session(session_id)
            .ok_or_else(|| TermdeckError::SessionNotFound(session_id.to_string()))
    }

    /// Make a session active and focus its terminal
    pub fn switch_session(&mut self, session_id: SessionId) -> Result<()> {
        let session = self.require_session(session_id)?;
        let (group_id, terminal_id) = (session.group_id, session.terminal_id);

        self.registry.set_active_session(Some(session_id));
        if let Some(group_id) = group_id {
            self.registry.set_active_group(Some(group_id));
            self.layout.set_active_group(Some(group_id));
        }
        if let Some(terminal_id) = terminal_id {
            self.layout.focus_terminal(terminal_id);
            self.ensure_surface(terminal_id);
        }
        self.commit();
        Ok(())
    }

    /// Terminate a session's process, keeping the session
    pub fn stop_session(&mut self, session_id: SessionId) -> Result<()> {
        let terminal_id = self.require_session(session_id)?.terminal_id;
        if let Some(terminal_id) = terminal_id {
            self.release_terminal_process(terminal_id);
        }
        if let Some(session) = self.registry.session_mut(session_id) {
            session.status = SessionStatus::Idle;
        }
        self.commit();
        Ok(())
    }

    /// Close the process but keep the surface and leaf
    fn release_terminal_process(&mut self, terminal_id: TerminalId) {
        let running = self
            .layout
            .terminal_meta(terminal_id)
            .is_some_and(|meta| meta.connectivity == TerminalConnectivity::Running);
        if running {
            self.outbox.push_back(ClientMessage::PtyClose { terminal_id });
            self.layout
                .set_connectivity(terminal_id, TerminalConnectivity::Exited, None);
        }
        self.sync.forget_terminal(terminal_id);
    }

    /// Delete a session together with its terminal
    pub fn remove_session(&mut self, session_id: SessionId) -> Result<()> {
        let session = self.require_session(session_id)?;
        let (group_id, terminal_id) = (session.group_id, session.terminal_id);

        if let Some(terminal_id) = terminal_id {
            self.release_terminal(terminal_id);
            self.layout.remove_terminal(terminal_id);
        }
        let was_active = self.registry.active_session() == Some(session_id);
        self.registry.remove_session(session_id);

        if was_active {
            if let Some(next) = group_id.and_then(|g| self.registry.preferred_session(g)) {
                self.switch_session(next)?;
            }
        }
        if let Some(group_id) = group_id {
            let active = self.registry.active_session();
            self.layout.refresh_active(group_id, active);
        }
        info!(%session_id, "Removed session");
        self.commit();
        Ok(())
    }

    pub fn rename_session(&mut self, session_id: SessionId, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        let terminal_id = self.require_session(session_id)?.terminal_id;
        if let Some(session) = self.registry.session_mut(session_id) {
            session.label = label.clone();
        }
        if let Some(terminal_id) = terminal_id {
            self.layout
                .update_terminal(terminal_id, |meta| meta.label = label);
        }
        self.commit();
        Ok(())
    }

    /// Replace a session's process with a fresh one in the same pane
    pub fn restart_session(&mut self, session_id: SessionId) -> Result<TerminalId> {
        let session = self.require_session(session_id)?.clone();
        let new_terminal = Uuid::new_v4();

        let replaced = match session.terminal_id {
            Some(old) => {
                self.release_terminal(old);
                self.layout.replace_terminal(old, new_terminal)
            }
            None => false,
        };

        if !replaced {
            let group_id = self.target_group(session.group_id)?;
            let meta = TerminalMeta::new(
                self.options.default_cwd.to_string_lossy(),
                session.label.clone(),
            )
            .with_session(session_id);
            self.layout
                .insert_terminal(group_id, new_terminal, meta, None, Orientation::Horizontal);
            if let Some(session) = self.registry.session_mut(session_id) {
                session.group_id = Some(group_id);
            }
        }

        if let Some(session) = self.registry.session_mut(session_id) {
            session.terminal_id = Some(new_terminal);
            session.status = SessionStatus::Active;
        }
        self.request_terminal(new_terminal);
        self.ensure_surface(new_terminal);
        info!(%session_id, terminal_id = %new_terminal, "Restarted session");
        self.commit();
        Ok(new_terminal)
    }

    fn archive_record(&self, session: &ConsoleSession) -> ArchivedSession {
        let mut record = ArchivedSession::from_session(session, Utc::now());
        record.group_label = session
            .group_id
            .and_then(|g| self.registry.group(g))
            .map(|g| g.label.clone());
        if let Some(terminal_id) = session.terminal_id {
            record.cwd = self.layout.terminal_meta(terminal_id).map(|m| m.cwd.clone());
            record.scrollback = self.cache.snapshot(terminal_id);
        }
        record
    }

    /// Save a session to the archive and remove it
    ///
    /// A failed save is logged and the session is removed anyway.
    pub async fn archive_session(&mut self, session_id: SessionId) -> Result<()> {
        let record = self.archive_record(self.require_session(session_id)?);
        if let Err(e) = self.archive.save(record).await {
            warn!(%session_id, "Archiving session failed, closing anyway: {}", e);
        }
        self.remove_session(session_id)?;
        self.flush_now()
    }

    pub async fn list_archived(&self) -> Result<Vec<ArchivedSession>> {
        self.archive.list().await
    }

    /// Bring an archived session back with a new terminal
    pub async fn restore_session(&mut self, session_id: SessionId) -> Result<SessionId> {
        if self.registry.contains_session(session_id) {
            return Ok(session_id);
        }
        let record = self
            .archive
            .restore(session_id)
            .await?
            .ok_or_else(|| TermdeckError::SessionNotFound(session_id.to_string()))?;

        let group_id = match record.group_id.filter(|g| self.registry.contains_group(*g)) {
            Some(group_id) => group_id,
            None => match &record.group_label {
                Some(label) => self.create_group(label),
                None => self.target_group(None)?,
            },
        };

        let session = ConsoleSession {
            id: record.session_id,
            kind: record.kind,
            terminal_id: None,
            group_id: Some(group_id),
            status: SessionStatus::Idle,
            created_at: record.created_at,
            label: record.label.clone(),
            command: record.command.clone(),
        };
        let cwd = record.cwd.as_ref().map(PathBuf::from);
        let terminal_id = self.spawn_session(session, group_id, cwd, None, Orientation::Horizontal);

        if let Some(scrollback) = record.scrollback {
            // Replace the blank surface with one replaying the archived screen
            self.cache.remove_terminal(terminal_id);
            self.cache.set_serialized_buffer(terminal_id, scrollback);
            self.ensure_surface(terminal_id);
        }
        info!(%session_id, "Restored session from archive");
        self.flush_now()?;
        Ok(session_id)
    }

    // ==================== Groups ====================

    /// Create a group with a deduplicated label and make it active
    pub fn create_group(&mut self, label: &str) -> GroupId {
        let label = self.registry.dedupe_group_label(label);
        let group = SessionGroup::new(label, Utc::now());
        let info = group.to_info();
        let group_id = group.id;

        self.registry.insert_group(group);
        self.registry.set_active_group(Some(group_id));
        self.layout.ensure_group(group_id);
        self.layout.set_active_group(Some(group_id));
        self.outbox.push_back(ClientMessage::GroupCreate {
            group_id,
            label: info.label,
            created_at: info.created_at,
        });
        info!(%group_id, "Created group");
        self.commit();
        group_id
    }

    pub fn rename_group(&mut self, group_id: GroupId, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        let group = self
            .registry
            .group_mut(group_id)
            .ok_or_else(|| TermdeckError::GroupNotFound(group_id.to_string()))?;
        group.label = label.clone();
        self.outbox
            .push_back(ClientMessage::GroupRename { group_id, label });
        self.commit();
        Ok(())
    }

    /// Activate a group and focus its preferred session
    pub fn switch_group(&mut self, group_id: GroupId) -> Result<Option<SessionId>> {
        if !self.registry.contains_group(group_id) {
            return Err(TermdeckError::GroupNotFound(group_id.to_string()));
        }
        self.registry.set_active_group(Some(group_id));
        self.layout.ensure_group(group_id);
        self.layout.set_active_group(Some(group_id));

        let preferred = self.registry.preferred_session(group_id);
        match preferred {
            Some(session_id) => self.switch_session(session_id)?,
            None => {
                self.registry.set_active_session(None);
                self.layout.refresh_active(group_id, None);
                self.commit();
            }
        }
        Ok(preferred)
    }

    /// Archive every session of a group, then drop the group
    ///
    /// Each save is best-effort; processes are closed and caches released
    /// whether or not the archive accepted the record.
    pub async fn archive_group(&mut self, group_id: GroupId) -> Result<usize> {
        if !self.registry.contains_group(group_id) {
            return Err(TermdeckError::GroupNotFound(group_id.to_string()));
        }
        let members: Vec<ConsoleSession> = self
            .registry
            .sessions_in_group(group_id)
            .into_iter()
            .cloned()
            .collect();

        for session in &members {
            let record = self.archive_record(session);
            if let Some(terminal_id) = session.terminal_id {
                if !session.is_idle() {
                    self.outbox.push_back(ClientMessage::PtyClose { terminal_id });
                }
            }
            if let Err(e) = self.archive.save(record).await {
                warn!(session_id = %session.id, "Archiving session failed, closing anyway: {}", e);
            }
            if let Some(terminal_id) = session.terminal_id {
                self.cache.remove_terminal(terminal_id);
                self.sync.forget_terminal(terminal_id);
            }
        }

        for session in &members {
            self.registry.remove_session(session.id);
        }
        self.layout.remove_group(group_id);
        self.registry.remove_group(group_id);
        self.sync.forget_group(group_id);
        self.outbox.push_back(ClientMessage::GroupDelete { group_id });

        if self.registry.active_group().is_none() {
            if let Some(next) = self.registry.groups_sorted().first().map(|g| g.id) {
                self.switch_group(next)?;
            }
        }
        info!(%group_id, sessions = members.len(), "Archived group");
        self.flush_now()?;
        Ok(members.len())
    }

    /// Drop every session and group and persist the empty state now
    pub fn clear_all_sessions(&mut self) -> Result<()> {
        for terminal_id in self.layout.terminal_ids() {
            self.release_terminal(terminal_id);
        }
        for group in self.registry.groups_sorted() {
            self.outbox
                .push_back(ClientMessage::GroupDelete { group_id: group.id });
        }
        self.cache.clear();
        self.layout = LayoutStore::new();
        self.registry.clear();
        self.sync.reset();
        self.heartbeats.clear();
        self.persist.clear();
        self.state.write_empty()?;
        info!("Cleared all sessions");
        Ok(())
    }

    // ==================== Panes ====================

    fn active_group_or_err(&self) -> Result<GroupId> {
        self.registry
            .active_group()
            .ok_or_else(|| TermdeckError::GroupNotFound("no active group".into()))
    }

    /// Close a pane of the active group along with its sessions
    pub fn close_pane(&mut self, pane_id: PaneId) -> Result<Vec<TerminalId>> {
        let group_id = self.active_group_or_err()?;
        let session_ids: Vec<SessionId> = self
            .layout
            .terminal_leaves(group_id, None)
            .into_iter()
            .filter_map(|leaf| leaf.content.terminal_id())
            .filter_map(|tid| self.registry.session_for_terminal(tid).map(|s| s.id))
            .collect();

        for terminal_id in self.pane_terminals(group_id, pane_id) {
            self.release_terminal(terminal_id);
        }
        let removed = self.layout.close_pane(group_id, pane_id);
        for session_id in session_ids {
            let bound = self
                .registry
                .session(session_id)
                .and_then(|s| s.terminal_id)
                .is_some_and(|tid| removed.contains(&tid));
            if bound {
                self.registry.remove_session(session_id);
            }
        }
        let active = self.registry.active_session();
        self.layout.refresh_active(group_id, active);
        self.commit();
        Ok(removed)
    }

    fn pane_terminals(&self, group_id: GroupId, pane_id: PaneId) -> Vec<TerminalId> {
        self.layout
            .group(group_id)
            .and_then(|layout| crate::layout::find_node(&layout.root, pane_id))
            .map(crate::layout::collect_terminal_ids)
            .unwrap_or_default()
    }

    /// Focus a pane of the active group
    pub fn focus_pane(&mut self, pane_id: PaneId) -> Result<()> {
        let group_id = self.active_group_or_err()?;
        if !self.layout.set_active_pane(group_id, pane_id) {
            return Err(TermdeckError::Internal(format!("pane {} not found", pane_id)));
        }
        let session = self
            .layout
            .group(group_id)
            .and_then(|layout| crate::layout::find_node(&layout.root, pane_id))
            .and_then(|node| node.as_leaf())
            .and_then(|leaf| leaf.content.terminal_id())
            .and_then(|tid| self.registry.session_for_terminal(tid))
            .map(|s| s.id);
        if let Some(session_id) = session {
            self.registry.set_active_session(Some(session_id));
        }
        self.commit();
        Ok(())
    }

    /// Add a settings or context pane next to the active pane
    pub fn open_panel(&mut self, content: PaneContent, orientation: Orientation) -> Result<PaneId> {
        let group_id = self.active_group_or_err()?;
        let target = self
            .layout
            .group(group_id)
            .and_then(|layout| layout.active_pane_id)
            .ok_or_else(|| TermdeckError::Internal("no active pane".into()))?;
        let pane_id = self
            .layout
            .split_pane(group_id, target, orientation, content)
            .ok_or_else(|| TermdeckError::Internal("pane cannot be split".into()))?;
        self.layout.set_active_pane(group_id, pane_id);
        self.commit();
        Ok(pane_id)
    }

    pub fn swap_panes(&mut self, a: PaneId, b: PaneId) -> Result<bool> {
        let group_id = self.active_group_or_err()?;
        let changed = self.layout.swap_panes(group_id, a, b);
        self.commit();
        Ok(changed)
    }

    /// Move `source` to one side of `target`
    ///
    /// Returns false when the move is impossible (unknown panes, or a target
    /// that disappears once the source is lifted out).
    pub fn move_pane(&mut self, source: PaneId, target: PaneId, position: MovePosition) -> Result<bool> {
        let group_id = self.active_group_or_err()?;
        let changed = self.layout.move_pane(group_id, source, target, position);
        self.commit();
        Ok(changed)
    }

    pub fn resize_split(&mut self, split_id: PaneId, ratio: f32) -> Result<bool> {
        let group_id = self.active_group_or_err()?;
        let changed = self.layout.set_split_ratio(group_id, split_id, ratio);
        self.commit();
        Ok(changed)
    }

    pub fn arrange_grid(&mut self) -> Result<bool> {
        let group_id = self.active_group_or_err()?;
        let changed = self.layout.arrange_grid(group_id);
        self.commit();
        Ok(changed)
    }

    pub fn toggle_zoom(&mut self, pane_id: PaneId) -> Result<Option<PaneId>> {
        let group_id = self.active_group_or_err()?;
        let zoomed = self.layout.toggle_zoom(group_id, pane_id);
        self.commit();
        Ok(zoomed)
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) -> Result<()> {
        let group_id = self.active_group_or_err()?;
        self.layout.set_view_mode(group_id, mode);
        self.commit();
        Ok(())
    }

    // ==================== Auto-archive ====================

    /// Plan and execute one auto-archive pass
    pub async fn run_archive_check(
        &mut self,
        auto_archive_days: u32,
        now: DateTime<Utc>,
    ) -> ArchivePlan {
        let plan = plan_archival(&self.registry, auto_archive_days, now, self.mounted_at);
        if plan.is_empty() {
            return plan;
        }
        info!(
            groups = plan.groups.len(),
            sessions = plan.sessions.len(),
            "Auto-archiving idle work"
        );
        for group_id in &plan.groups {
            if let Err(e) = self.archive_group(*group_id).await {
                warn!(%group_id, "Auto-archive of group failed: {}", e);
            }
        }
        for session_id in &plan.sessions {
            if let Err(e) = self.archive_session(*session_id).await {
                warn!(%session_id, "Auto-archive of session failed: {}", e);
            }
        }
        plan
    }

    #[cfg(test)]
    pub(crate) fn set_mounted_at(&mut self, at: DateTime<Utc>) {
        self.mounted_at = at;
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("sessions", &self.registry.session_count())
            .field("groups", &self.registry.group_count())
            .field("epoch", &self.sync.epoch())
            .field("hydrated", &self.hydrated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchiveStore;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn options() -> ConsoleOptions {
        ConsoleOptions {
            client_id: Uuid::new_v4(),
            default_cwd: PathBuf::from("/tmp"),
            default_shell: Some("/bin/sh".into()),
            assistant_command: "claude".into(),
            cols: 80,
            rows: 24,
            capture_output: true,
        }
    }

    fn create_test_console() -> (TempDir, Console, Arc<MemoryArchiveStore>) {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(MemoryArchiveStore::new());
        let console = Console::new(
            options(),
            StateStore::new(dir.path()),
            archive.clone(),
            CacheLimits::default(),
        );
        (dir, console, archive)
    }

    fn tagged(console: &Console, message: ServerMessage) -> Tagged {
        Tagged {
            epoch: console.epoch(),
            message,
        }
    }

    fn count(messages: &[ClientMessage], name: &str) -> usize {
        messages.iter().filter(|m| m.name() == name).count()
    }

    #[test]
    fn test_create_session_creates_default_group() {
        let (_dir, mut console, _) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();

        let session = console.registry().session(sid).unwrap();
        let group_id = session.group_id.unwrap();
        let terminal_id = session.terminal_id.unwrap();
        assert_eq!(console.registry().group(group_id).unwrap().label, DEFAULT_GROUP_LABEL);
        assert_eq!(console.registry().active_session(), Some(sid));
        assert_eq!(console.layout().group_of_terminal(terminal_id), Some(group_id));
        assert!(console.cache().has_terminal_dom(terminal_id));

        let outbox = console.take_outbox();
        assert_eq!(count(&outbox, "group:create"), 1);
        match outbox.last() {
            Some(ClientMessage::PtyCreate { terminal_id: t, shell, logging, .. }) => {
                assert_eq!(*t, terminal_id);
                assert_eq!(shell.as_deref(), Some("/bin/sh"));
                assert!(*logging);
            }
            other => panic!("expected PtyCreate, got {:?}", other),
        }
    }

    #[test]
    fn test_assistant_session_runs_command() {
        let (_dir, mut console, _) = create_test_console();
        let mut request = NewSession::new(SessionKind::ClaudeLike);
        request.command = Some("claude --resume".into());
        console.create_session(request).unwrap();
        let outbox = console.take_outbox();
        assert!(outbox.iter().any(|m| matches!(
            m,
            ClientMessage::PtyCreate { shell: Some(s), .. } if s == "claude --resume"
        )));
    }

    #[test]
    fn test_group_labels_are_deduplicated() {
        let (_dir, mut console, _) = create_test_console();
        let a = console.create_group("Frontend");
        let b = console.create_group("Frontend");
        let c = console.create_group("Frontend");
        assert_eq!(console.registry().group(a).unwrap().label, "Frontend");
        assert_eq!(console.registry().group(b).unwrap().label, "Frontend 2");
        assert_eq!(console.registry().group(c).unwrap().label, "Frontend 3");
        assert_eq!(console.registry().active_group(), Some(c));
    }

    #[test]
    fn test_switch_group_prefers_active_session_with_terminal() {
        let (_dir, mut console, _) = create_test_console();
        let group = console.create_group("api");
        let mut request = NewSession::new(SessionKind::Shell);
        request.group = Some(group);
        let running = console.create_session(request.clone()).unwrap();
        let newer = console.create_session(request).unwrap();
        console.stop_session(newer).unwrap();

        let other = console.create_group("web");
        assert_eq!(console.registry().active_group(), Some(other));

        let chosen = console.switch_group(group).unwrap();
        assert_eq!(chosen, Some(running));
        assert_eq!(console.registry().active_session(), Some(running));

        let terminal = console.registry().session(running).unwrap().terminal_id.unwrap();
        let (_, leaf) = console.layout().locate_terminal(terminal).unwrap();
        assert_eq!(console.layout().group(group).unwrap().active_pane_id, Some(leaf.id));
    }

    #[test]
    fn test_remove_session_closes_terminal() {
        let (_dir, mut console, _) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let terminal = console.registry().session(sid).unwrap().terminal_id.unwrap();
        console.take_outbox();

        console.remove_session(sid).unwrap();
        assert!(!console.registry().contains_session(sid));
        assert!(console.layout().terminal_meta(terminal).is_none());
        assert!(!console.cache().has_terminal_dom(terminal));
        assert_eq!(
            console.take_outbox(),
            vec![ClientMessage::PtyClose { terminal_id: terminal }]
        );
        assert!(matches!(
            console.remove_session(sid),
            Err(TermdeckError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_rename_session_updates_terminal_label() {
        let (_dir, mut console, _) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.rename_session(sid, "build").unwrap();
        let terminal = console.registry().session(sid).unwrap().terminal_id.unwrap();
        assert_eq!(console.registry().session(sid).unwrap().label, "build");
        assert_eq!(console.layout().terminal_meta(terminal).unwrap().label, "build");
    }

    #[test]
    fn test_restart_session_keeps_pane() {
        let (_dir, mut console, _) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let old = console.registry().session(sid).unwrap().terminal_id.unwrap();
        let (group, old_leaf) = console.layout().locate_terminal(old).unwrap();
        console.take_outbox();

        let new = console.restart_session(sid).unwrap();
        assert_ne!(old, new);
        let (new_group, new_leaf) = console.layout().locate_terminal(new).unwrap();
        assert_eq!((new_group, new_leaf.id), (group, old_leaf.id));

        let outbox = console.take_outbox();
        assert_eq!(outbox[0], ClientMessage::PtyClose { terminal_id: old });
        assert!(matches!(
            outbox[1],
            ClientMessage::PtyCreate { terminal_id, .. } if terminal_id == new
        ));
    }

    #[test]
    fn test_stop_session_marks_idle() {
        let (_dir, mut console, _) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::ClaudeLike)).unwrap();
        console.take_outbox();
        console.stop_session(sid).unwrap();
        assert!(console.registry().session(sid).unwrap().is_idle());
        assert_eq!(count(&console.take_outbox(), "pty:close"), 1);

        // Already stopped: nothing more to close
        console.stop_session(sid).unwrap();
        assert!(console.take_outbox().is_empty());
    }

    #[test]
    fn test_reconnect_replays_groups_before_terminals() {
        let (_dir, mut console, _) = create_test_console();
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.take_outbox();

        let epoch = console.begin_connection();
        assert_eq!(epoch, 1);
        let outbox = console.take_outbox();
        let names: Vec<_> = outbox.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["connect", "group:create", "pty:create", "pty:create", "group:list"]
        );
    }

    #[test]
    fn test_reconnect_keeps_pending_closes() {
        let (_dir, mut console, _) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let terminal = console.registry().session(sid).unwrap().terminal_id.unwrap();
        console.stop_session(sid).unwrap();

        console.begin_connection();
        let outbox = console.take_outbox();
        let names: Vec<_> = outbox.iter().map(|m| m.name()).collect();
        // The stopped terminal is not replayed, its close is still delivered
        assert_eq!(names, vec!["connect", "group:create", "pty:close", "group:list"]);
        assert!(outbox.contains(&ClientMessage::PtyClose { terminal_id: terminal }));
    }

    #[test]
    fn test_requeued_messages_precede_newer_ones() {
        let (_dir, mut console, _) = create_test_console();
        let group_id = console.create_group("Ops");
        let failed = console.take_outbox();
        assert_eq!(count(&failed, "group:create"), 1);

        console.rename_group(group_id, String::from("Infra")).unwrap();
        console.requeue_front(failed);
        let names: Vec<_> = console.take_outbox().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["group:create", "group:rename"]);
    }

    #[test]
    fn test_stale_epoch_events_are_dropped() {
        let (_dir, mut console, _) = create_test_console();
        console.begin_connection();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let terminal = console.registry().session(sid).unwrap().terminal_id.unwrap();
        console.begin_connection();

        console.apply_event(Tagged {
            epoch: 1,
            message: ServerMessage::PtyCwdChange {
                terminal_id: terminal,
                cwd: "/srv".into(),
            },
        });
        assert_eq!(console.layout().terminal_meta(terminal).unwrap().cwd, "/tmp");

        let event = tagged(
            &console,
            ServerMessage::PtyCwdChange {
                terminal_id: terminal,
                cwd: "/srv".into(),
            },
        );
        console.apply_event(event);
        assert_eq!(console.layout().terminal_meta(terminal).unwrap().cwd, "/srv");
    }

    #[test]
    fn test_output_feeds_surface_and_heartbeats_once() {
        let (_dir, mut console, _) = create_test_console();
        console.begin_connection();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let terminal = console.registry().session(sid).unwrap().terminal_id.unwrap();

        for chunk in ["hello ", "world"] {
            let event = tagged(
                &console,
                ServerMessage::PtyOutput {
                    terminal_id: terminal,
                    data: chunk.as_bytes().to_vec(),
                },
            );
            console.apply_event(event);
        }

        assert!(console.scrollback(terminal).unwrap().contains("hello world"));
        assert_eq!(console.take_heartbeats(), vec![sid]);
    }

    #[test]
    fn test_exit_marks_terminal_and_session() {
        let (_dir, mut console, _) = create_test_console();
        console.begin_connection();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let terminal = console.registry().session(sid).unwrap().terminal_id.unwrap();

        let event = tagged(
            &console,
            ServerMessage::PtyExit {
                terminal_id: terminal,
                exit_code: Some(2),
            },
        );
        console.apply_event(event);
        let meta = console.layout().terminal_meta(terminal).unwrap();
        assert_eq!(meta.connectivity, TerminalConnectivity::Exited);
        assert_eq!(meta.exit_code, Some(2));
        assert!(console.registry().session(sid).unwrap().is_idle());
    }

    #[test]
    fn test_reclaimed_terminal_requests_log() {
        let (dir, mut console, archive) = create_test_console();
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.flush_now().unwrap();
        drop(console);

        let mut console = Console::load(
            options(),
            StateStore::new(dir.path()),
            archive,
            CacheLimits::default(),
        );
        console.begin_connection();
        let outbox = console.take_outbox();
        let terminal = outbox
            .iter()
            .find_map(|m| match m {
                ClientMessage::PtyCreate { terminal_id, .. } => Some(*terminal_id),
                _ => None,
            })
            .unwrap();

        let event = tagged(
            &console,
            ServerMessage::PtyCreated {
                terminal_id: terminal,
                reclaimed: true,
            },
        );
        console.apply_event(event);
        assert_eq!(
            console.take_outbox(),
            vec![ClientMessage::PtyReadLog { terminal_id: terminal }]
        );

        let event = tagged(
            &console,
            ServerMessage::PtyLog {
                terminal_id: terminal,
                data: b"previous output".to_vec(),
            },
        );
        console.apply_event(event);
        assert_eq!(
            console.cache().peek_serialized_buffer(terminal),
            Some("previous output")
        );
    }

    #[test]
    fn test_orphans_pruned_only_after_hydration() {
        let (_dir, mut console, _) = create_test_console();
        let group = console.create_group("g");
        let orphan = Uuid::new_v4();
        console.layout.insert_terminal(
            group,
            orphan,
            TerminalMeta::new("/tmp", "ghost").with_session(Uuid::new_v4()),
            None,
            Orientation::Horizontal,
        );
        let kept = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();

        assert!(console.prune_orphans().is_empty());
        assert!(console.layout().terminal_meta(orphan).is_some());

        let event = tagged(&console, ServerMessage::GroupList { groups: vec![] });
        console.apply_event(event);
        assert!(console.is_hydrated());
        assert!(console.layout().terminal_meta(orphan).is_none());
        assert!(console.registry().contains_session(kept));
    }

    #[test]
    fn test_group_list_adopts_unknown_groups() {
        let (_dir, mut console, _) = create_test_console();
        let info = GroupInfo::new(Uuid::new_v4(), "shared", 1_700_000_000_000);
        let event = tagged(&console, ServerMessage::GroupList { groups: vec![info.clone()] });
        console.apply_event(event);
        assert_eq!(console.registry().group(info.group_id).unwrap().label, "shared");
        assert!(console.layout().has_group(info.group_id));
    }

    #[tokio::test]
    async fn test_archive_session_saves_scrollback() {
        let (_dir, mut console, archive) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::ClaudeLike)).unwrap();
        let terminal = console.registry().session(sid).unwrap().terminal_id.unwrap();
        console.begin_connection();
        let event = tagged(
            &console,
            ServerMessage::PtyOutput {
                terminal_id: terminal,
                data: b"build ok".to_vec(),
            },
        );
        console.apply_event(event);

        console.archive_session(sid).await.unwrap();
        assert!(!console.registry().contains_session(sid));

        let listed = archive.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].scrollback.as_deref().unwrap().contains("build ok"));
        assert_eq!(listed[0].cwd.as_deref(), Some("/tmp"));
    }

    #[tokio::test]
    async fn test_restore_session_round_trip() {
        let (_dir, mut console, _) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::ClaudeLike)).unwrap();
        console.rename_session(sid, "refactor").unwrap();
        console.archive_session(sid).await.unwrap();
        assert_eq!(console.list_archived().await.unwrap().len(), 1);

        let restored = console.restore_session(sid).await.unwrap();
        assert_eq!(restored, sid);
        let session = console.registry().session(sid).unwrap();
        assert_eq!(session.label, "refactor");
        assert!(session.terminal_id.is_some());
        assert!(console.list_archived().await.unwrap().is_empty());

        assert!(matches!(
            console.restore_session(Uuid::new_v4()).await,
            Err(TermdeckError::SessionNotFound(_))
        ));
    }

    struct FailingArchive;

    #[async_trait]
    impl ArchiveStore for FailingArchive {
        async fn save(&self, _record: ArchivedSession) -> Result<()> {
            Err(TermdeckError::archive("HTTP 500"))
        }
        async fn list(&self) -> Result<Vec<ArchivedSession>> {
            Ok(Vec::new())
        }
        async fn restore(&self, _session_id: SessionId) -> Result<Option<ArchivedSession>> {
            Ok(None)
        }
        async fn heartbeat(&self, _ids: Vec<SessionId>, _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_archive_group_closes_even_when_save_fails() {
        let dir = TempDir::new().unwrap();
        let mut console = Console::new(
            options(),
            StateStore::new(dir.path()),
            Arc::new(FailingArchive),
            CacheLimits::default(),
        );
        let group = console.create_group("doomed");
        let mut request = NewSession::new(SessionKind::ClaudeLike);
        request.group = Some(group);
        let a = console.create_session(request.clone()).unwrap();
        let b = console.create_session(request).unwrap();
        let terminals: Vec<_> = [a, b]
            .iter()
            .map(|s| console.registry().session(*s).unwrap().terminal_id.unwrap())
            .collect();
        console.take_outbox();

        let archived = console.archive_group(group).await.unwrap();
        assert_eq!(archived, 2);
        assert!(!console.registry().contains_group(group));
        assert!(!console.layout().has_group(group));
        for terminal in &terminals {
            assert!(!console.cache().has_terminal_dom(*terminal));
        }

        let outbox = console.take_outbox();
        assert_eq!(count(&outbox, "pty:close"), 2);
        assert_eq!(count(&outbox, "group:delete"), 1);

        // Flushed immediately, without waiting for the debounce
        assert!(console.persist_deadline().is_none());
        let reloaded = StateStore::new(dir.path()).load_registry();
        assert!(!reloaded.contains_group(group));
        assert_eq!(reloaded.session_count(), 0);
    }

    #[test]
    fn test_clear_all_sessions_writes_empty_state() {
        let (dir, mut console, _) = create_test_console();
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.create_group("second");
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.flush_now().unwrap();
        console.take_outbox();

        console.clear_all_sessions().unwrap();
        assert_eq!(console.registry().session_count(), 0);
        assert_eq!(console.cache_stats().cached_terminals, 0);
        let outbox = console.take_outbox();
        assert_eq!(count(&outbox, "pty:close"), 2);
        assert_eq!(count(&outbox, "group:delete"), 2);

        let store = StateStore::new(dir.path());
        assert_eq!(store.load_registry().session_count(), 0);
        assert!(store.load_layout().unwrap().terminal_ids().is_empty());
    }

    #[test]
    fn test_load_reconciles_persisted_state() {
        let (dir, mut console, archive) = create_test_console();
        let sid = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.flush_now().unwrap();
        drop(console);

        let console = Console::load(
            options(),
            StateStore::new(dir.path()),
            archive,
            CacheLimits::default(),
        );
        let session = console.registry().session(sid).unwrap();
        assert!(session.terminal_id.is_some());
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(console.registry().active_session(), Some(sid));
    }

    #[test]
    fn test_close_pane_removes_bound_session() {
        let (_dir, mut console, _) = create_test_console();
        let first = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let second = console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let terminal = console.registry().session(second).unwrap().terminal_id.unwrap();
        let (_, leaf) = console.layout().locate_terminal(terminal).unwrap();

        let removed = console.close_pane(leaf.id).unwrap();
        assert_eq!(removed, vec![terminal]);
        assert!(!console.registry().contains_session(second));
        assert!(console.registry().contains_session(first));
    }

    #[test]
    fn test_open_panel_and_zoom() {
        let (_dir, mut console, _) = create_test_console();
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let panel = console
            .open_panel(PaneContent::Settings, Orientation::Vertical)
            .unwrap();
        assert_eq!(console.toggle_zoom(panel).unwrap(), Some(panel));
        assert_eq!(console.toggle_zoom(panel).unwrap(), None);
        assert!(console.arrange_grid().is_ok());
    }

    #[test]
    fn test_swap_move_and_resize_panes() {
        let (_dir, mut console, _) = create_test_console();
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        console.create_session(NewSession::new(SessionKind::Shell)).unwrap();
        let group_id = console.registry().active_group().unwrap();
        let leaves = |console: &Console| {
            crate::layout::collect_leaf_ids(&console.layout().group(group_id).unwrap().root)
        };
        let before = leaves(&console);
        let (a, b) = (before[0], before[1]);

        assert!(console.swap_panes(a, b).unwrap());
        assert_eq!(leaves(&console), vec![b, a]);

        let root = console.layout().group(group_id).unwrap().root.clone();
        assert!(console.resize_split(root.id(), 0.95).unwrap());
        let root = console.layout().group(group_id).unwrap().root.clone();
        let ratios = root.as_split().unwrap().ratios;
        assert_eq!(ratios[0], 0.9);
        assert!((ratios[1] - 0.1).abs() < 1e-6);

        assert!(console.move_pane(a, b, MovePosition::Top).unwrap());
        let root = console.layout().group(group_id).unwrap().root.clone();
        assert_eq!(root.as_split().unwrap().orientation, Orientation::Vertical);
        assert_eq!(leaves(&console), vec![a, b]);

        assert!(!console.move_pane(a, a, MovePosition::Left).unwrap());
    }

    #[tokio::test]
    async fn test_archive_check_respects_threshold() {
        let (_dir, mut console, archive) = create_test_console();
        let old = console.create_session(NewSession::new(SessionKind::ClaudeLike)).unwrap();
        console.stop_session(old).unwrap();
        if let Some(session) = console.registry.session_mut(old) {
            session.created_at = Utc::now() - ChronoDuration::days(10);
        }
        let active = console.create_session(NewSession::new(SessionKind::ClaudeLike)).unwrap();
        console.set_mounted_at(Utc::now() - ChronoDuration::hours(1));

        let plan = console.run_archive_check(0, Utc::now()).await;
        assert!(plan.is_empty());

        let plan = console.run_archive_check(7, Utc::now()).await;
        assert_eq!(plan.sessions, vec![old]);
        assert!(!console.registry().contains_session(old));
        assert!(console.registry().contains_session(active));
        assert_eq!(archive.len(), 1);
    }
}
