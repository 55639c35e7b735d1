//! Layout store
//!
//! Holds one pane tree per workspace group plus metadata for every
//! terminal leaf. A terminal id appears in at most one leaf across all
//! groups. Mutations set a dirty flag the console uses to decide when the
//! layout namespace must be written.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use termdeck_protocol::{GroupId, PaneId, SessionId, TerminalConnectivity, TerminalId};

use super::grid::build_balanced_grid;
use super::resolver::{resolve_active_pane, ResolveInput, ResolvedPane};
use super::tree::{
    self, collect_leaves, collect_terminal_ids, empty_layout, find_node, find_terminal_leaf,
    MovePosition, Orientation, PaneContent, PaneLeaf, PaneNode,
};

/// Per-terminal record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalMeta {
    pub cwd: String,
    pub label: String,
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub tab_color: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub connectivity: TerminalConnectivity,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl TerminalMeta {
    pub fn new(cwd: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            label: label.into(),
            session_id: None,
            tab_color: None,
            env: BTreeMap::new(),
            connectivity: TerminalConnectivity::Running,
            exit_code: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// How a group's panes are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Tiled,
    Tabbed,
}

/// Layout of one workspace group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLayout {
    pub root: Arc<PaneNode>,
    pub active_pane_id: Option<PaneId>,
    pub active_terminal_pane_id: Option<PaneId>,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub zoomed_pane_id: Option<PaneId>,
}

impl Default for GroupLayout {
    fn default() -> Self {
        let root = empty_layout();
        Self {
            active_pane_id: Some(root.id()),
            active_terminal_pane_id: None,
            root,
            view_mode: ViewMode::default(),
            zoomed_pane_id: None,
        }
    }
}

impl GroupLayout {
    /// True when the tree is a single placeholder leaf
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.root.as_ref(),
            PaneNode::Leaf(PaneLeaf {
                content: PaneContent::Empty,
                ..
            })
        )
    }

    fn set_root(&mut self, root: Arc<PaneNode>) {
        self.root = root;
        if let Some(zoomed) = self.zoomed_pane_id {
            if !tree::pane_exists(&self.root, zoomed) {
                self.zoomed_pane_id = None;
            }
        }
    }
}

/// Pane trees and terminal metadata for all groups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutStore {
    groups: HashMap<GroupId, GroupLayout>,
    terminals: HashMap<TerminalId, TerminalMeta>,
    active_group: Option<GroupId>,
    #[serde(skip)]
    dirty: bool,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything changed since the last call, resetting the flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn touch(&mut self) {
        self.dirty = true;
    }

    // ==================== Groups ====================

    /// Get a group's layout, creating an empty one if missing
    pub fn ensure_group(&mut self, group_id: GroupId) -> &mut GroupLayout {
        if !self.groups.contains_key(&group_id) {
            self.dirty = true;
        }
        self.groups.entry(group_id).or_default()
    }

    pub fn group(&self, group_id: GroupId) -> Option<&GroupLayout> {
        self.groups.get(&group_id)
    }

    pub fn has_group(&self, group_id: GroupId) -> bool {
        self.groups.contains_key(&group_id)
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    pub fn active_group(&self) -> Option<GroupId> {
        self.active_group
    }

    pub fn set_active_group(&mut self, group_id: Option<GroupId>) {
        if self.active_group != group_id {
            self.active_group = group_id;
            self.touch();
        }
    }

    /// Remove a group and all terminal metadata of its leaves
    ///
    /// Returns the terminal ids that were bound in the group.
    pub fn remove_group(&mut self, group_id: GroupId) -> Vec<TerminalId> {
        let Some(layout) = self.groups.remove(&group_id) else {
            return Vec::new();
        };
        let terminal_ids = collect_terminal_ids(&layout.root);
        for terminal_id in &terminal_ids {
            self.terminals.remove(terminal_id);
        }
        if self.active_group == Some(group_id) {
            self.active_group = None;
        }
        self.touch();
        terminal_ids
    }

    // ==================== Terminals ====================

    pub fn terminal_meta(&self, terminal_id: TerminalId) -> Option<&TerminalMeta> {
        self.terminals.get(&terminal_id)
    }

    pub fn terminal_ids(&self) -> Vec<TerminalId> {
        self.terminals.keys().copied().collect()
    }

    pub fn terminals(&self) -> impl Iterator<Item = (&TerminalId, &TerminalMeta)> {
        self.terminals.iter()
    }

    /// Group and leaf a terminal is bound to
    pub fn locate_terminal(&self, terminal_id: TerminalId) -> Option<(GroupId, PaneLeaf)> {
        self.groups.iter().find_map(|(group_id, layout)| {
            find_terminal_leaf(&layout.root, terminal_id).map(|leaf| (*group_id, leaf))
        })
    }

    pub fn group_of_terminal(&self, terminal_id: TerminalId) -> Option<GroupId> {
        self.locate_terminal(terminal_id).map(|(group_id, _)| group_id)
    }

    /// Terminal leaves of a group, optionally limited to one session
    pub fn terminal_leaves(&self, group_id: GroupId, session: Option<SessionId>) -> Vec<PaneLeaf> {
        let Some(layout) = self.groups.get(&group_id) else {
            return Vec::new();
        };
        collect_leaves(&layout.root)
            .into_iter()
            .filter(|leaf| match (leaf.content.terminal_id(), session) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(terminal_id), Some(session_id)) => self
                    .terminals
                    .get(&terminal_id)
                    .and_then(|meta| meta.session_id)
                    == Some(session_id),
            })
            .collect()
    }

    /// Bind a terminal to a new leaf in a group
    ///
    /// A placeholder tree is replaced by the terminal leaf. Otherwise the
    /// `target` leaf (or the group's active leaf, or its last leaf) is split.
    /// If the terminal is already placed, its existing leaf id is returned.
    pub fn insert_terminal(
        &mut self,
        group_id: GroupId,
        terminal_id: TerminalId,
        meta: TerminalMeta,
        target: Option<PaneId>,
        orientation: Orientation,
    ) -> PaneId {
        if let Some((_, leaf)) = self.locate_terminal(terminal_id) {
            return leaf.id;
        }

        let leaf = PaneLeaf::new(PaneContent::Terminal { terminal_id });
        let layout = self.groups.entry(group_id).or_default();

        if layout.is_placeholder() {
            layout.set_root(leaf.into_node());
        } else {
            let split_at = [target, layout.active_pane_id]
                .into_iter()
                .flatten()
                .find(|id| find_node(&layout.root, *id).is_some_and(|n| n.is_leaf()))
                .or_else(|| collect_leaves(&layout.root).last().map(|l| l.id));
            if let Some(split_at) = split_at {
                let root = tree::split_pane_with(&layout.root, split_at, orientation, leaf);
                layout.set_root(root);
            }
        }
        layout.active_pane_id = Some(leaf.id);
        layout.active_terminal_pane_id = Some(leaf.id);

        self.terminals.insert(terminal_id, meta);
        self.touch();
        leaf.id
    }

    /// Remove a terminal's leaf and metadata
    pub fn remove_terminal(&mut self, terminal_id: TerminalId) -> Option<TerminalMeta> {
        if let Some((group_id, leaf)) = self.locate_terminal(terminal_id) {
            self.close_leaf(group_id, leaf.id);
        }
        let meta = self.terminals.remove(&terminal_id);
        if meta.is_some() {
            self.touch();
        }
        meta
    }

    /// Bind an existing leaf to a new terminal id, moving the metadata
    pub fn replace_terminal(&mut self, old: TerminalId, new: TerminalId) -> bool {
        let Some((group_id, leaf)) = self.locate_terminal(old) else {
            return false;
        };
        let Some(layout) = self.groups.get_mut(&group_id) else {
            return false;
        };
        let rebound = PaneLeaf {
            id: leaf.id,
            content: PaneContent::Terminal { terminal_id: new },
        };
        let root = tree::replace_node(&layout.root, leaf.id, rebound.into_node());
        layout.set_root(root);

        if let Some(mut meta) = self.terminals.remove(&old) {
            meta.connectivity = TerminalConnectivity::Running;
            meta.exit_code = None;
            self.terminals.insert(new, meta);
        }
        self.touch();
        true
    }

    pub fn update_terminal(
        &mut self,
        terminal_id: TerminalId,
        f: impl FnOnce(&mut TerminalMeta),
    ) -> bool {
        match self.terminals.get_mut(&terminal_id) {
            Some(meta) => {
                let before = meta.clone();
                f(meta);
                if *meta != before {
                    self.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    /// Record a new working directory; returns whether it changed
    pub fn set_cwd(&mut self, terminal_id: TerminalId, cwd: &str) -> bool {
        let mut changed = false;
        self.update_terminal(terminal_id, |meta| {
            if meta.cwd != cwd {
                meta.cwd = cwd.to_string();
                changed = true;
            }
        });
        changed
    }

    pub fn set_connectivity(
        &mut self,
        terminal_id: TerminalId,
        connectivity: TerminalConnectivity,
        exit_code: Option<i32>,
    ) -> bool {
        self.update_terminal(terminal_id, |meta| {
            meta.connectivity = connectivity;
            meta.exit_code = exit_code;
        })
    }

    // ==================== Panes ====================

    pub fn set_active_pane(&mut self, group_id: GroupId, pane_id: PaneId) -> bool {
        let Some(layout) = self.groups.get_mut(&group_id) else {
            return false;
        };
        let Some(node) = find_node(&layout.root, pane_id) else {
            return false;
        };
        let is_terminal = node.as_leaf().is_some_and(|l| l.content.is_terminal());
        layout.active_pane_id = Some(pane_id);
        if is_terminal {
            layout.active_terminal_pane_id = Some(pane_id);
        }
        self.touch();
        true
    }

    /// Focus a terminal's leaf and make its group active
    pub fn focus_terminal(&mut self, terminal_id: TerminalId) -> bool {
        let Some((group_id, leaf)) = self.locate_terminal(terminal_id) else {
            return false;
        };
        self.set_active_group(Some(group_id));
        self.set_active_pane(group_id, leaf.id)
    }

    /// Split a leaf; returns the new leaf's id
    pub fn split_pane(
        &mut self,
        group_id: GroupId,
        pane_id: PaneId,
        orientation: Orientation,
        content: PaneContent,
    ) -> Option<PaneId> {
        if let PaneContent::Terminal { terminal_id } = content {
            if self.locate_terminal(terminal_id).is_some() {
                return None;
            }
        }
        let layout = self.groups.get_mut(&group_id)?;
        let leaf = PaneLeaf::new(content);
        let root = tree::split_pane_with(&layout.root, pane_id, orientation, leaf);
        if Arc::ptr_eq(&root, &layout.root) {
            return None;
        }
        layout.set_root(root);
        self.touch();
        Some(leaf.id)
    }

    /// Close a pane (leaf or whole subtree)
    ///
    /// Returns the terminal ids that were removed along with it. Closing the
    /// last pane leaves a placeholder.
    pub fn close_pane(&mut self, group_id: GroupId, pane_id: PaneId) -> Vec<TerminalId> {
        let removed = match self
            .groups
            .get(&group_id)
            .and_then(|layout| find_node(&layout.root, pane_id))
        {
            Some(node) => collect_terminal_ids(node),
            None => return Vec::new(),
        };
        self.close_leaf(group_id, pane_id);
        for terminal_id in &removed {
            self.terminals.remove(terminal_id);
        }
        removed
    }

    fn close_leaf(&mut self, group_id: GroupId, pane_id: PaneId) {
        let Some(layout) = self.groups.get_mut(&group_id) else {
            return;
        };
        let root = tree::close_pane(&layout.root, pane_id).unwrap_or_else(empty_layout);
        layout.set_root(root);
        for active in [
            &mut layout.active_pane_id,
            &mut layout.active_terminal_pane_id,
        ] {
            if active.is_some_and(|id| !tree::pane_exists(&layout.root, id)) {
                *active = None;
            }
        }
        self.dirty = true;
    }

    pub fn swap_panes(&mut self, group_id: GroupId, a: PaneId, b: PaneId) -> bool {
        self.apply_tree(group_id, |root| tree::swap_panes(root, a, b))
    }

    pub fn move_pane(
        &mut self,
        group_id: GroupId,
        source: PaneId,
        target: PaneId,
        position: MovePosition,
    ) -> bool {
        self.apply_tree(group_id, |root| tree::move_pane(root, source, target, position))
    }

    pub fn set_split_ratio(&mut self, group_id: GroupId, split_id: PaneId, ratio: f32) -> bool {
        self.apply_tree(group_id, |root| tree::set_split_ratio(root, split_id, ratio))
    }

    /// Rebuild a group's tree as a balanced grid of its current leaves
    pub fn arrange_grid(&mut self, group_id: GroupId) -> bool {
        self.apply_tree(group_id, |root| build_balanced_grid(&collect_leaves(root)))
    }

    fn apply_tree(
        &mut self,
        group_id: GroupId,
        f: impl FnOnce(&Arc<PaneNode>) -> Arc<PaneNode>,
    ) -> bool {
        let Some(layout) = self.groups.get_mut(&group_id) else {
            return false;
        };
        let root = f(&layout.root);
        if Arc::ptr_eq(&root, &layout.root) {
            return false;
        }
        layout.set_root(root);
        self.touch();
        true
    }

    pub fn set_view_mode(&mut self, group_id: GroupId, mode: ViewMode) -> bool {
        match self.groups.get_mut(&group_id) {
            Some(layout) if layout.view_mode != mode => {
                layout.view_mode = mode;
                self.touch();
                true
            }
            _ => false,
        }
    }

    /// Toggle fullscreen for a pane; returns the zoomed pane afterwards
    pub fn toggle_zoom(&mut self, group_id: GroupId, pane_id: PaneId) -> Option<PaneId> {
        let layout = self.groups.get_mut(&group_id)?;
        if layout.zoomed_pane_id == Some(pane_id) {
            layout.zoomed_pane_id = None;
        } else if tree::pane_exists(&layout.root, pane_id) {
            layout.zoomed_pane_id = Some(pane_id);
        }
        let zoomed = layout.zoomed_pane_id;
        self.touch();
        zoomed
    }

    /// Resolve and commit the focused pane of a group
    ///
    /// `session` limits the visible terminals to one session's leaves.
    pub fn refresh_active(&mut self, group_id: GroupId, session: Option<SessionId>) -> ResolvedPane {
        let scoped = self.terminal_leaves(group_id, session);
        let Some(layout) = self.groups.get_mut(&group_id) else {
            return resolve_active_pane(&ResolveInput {
                active_pane_id: None,
                root: None,
                terminal_leaves: &[],
                has_settings: false,
                has_context: false,
            });
        };

        let leaves = collect_leaves(&layout.root);
        let resolved = resolve_active_pane(&ResolveInput {
            active_pane_id: layout.active_pane_id,
            root: Some(&layout.root),
            terminal_leaves: &scoped,
            has_settings: leaves.iter().any(|l| l.content == PaneContent::Settings),
            has_context: leaves.iter().any(|l| l.content == PaneContent::Context),
        });

        if layout.active_pane_id != resolved.active_pane_id
            || layout.active_terminal_pane_id != resolved.active_terminal_pane_id
        {
            layout.active_pane_id = resolved.active_pane_id;
            layout.active_terminal_pane_id = resolved.active_terminal_pane_id;
            self.dirty = true;
        }
        resolved
    }
}
