//! Active pane resolution
//!
//! Decides which pane is focused given the current selection, the tree and
//! the terminal leaves visible in the current session scope. Pure: callers
//! commit the result back into the layout store.

use std::sync::Arc;

use termdeck_protocol::PaneId;

use super::tree::{find_node, PaneContent, PaneLeaf, PaneNode};

/// What the focused pane shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePaneKind {
    Terminal,
    Settings,
    Context,
    /// No terminal to focus; the workspace shows an empty placeholder
    EmptyTerminal,
}

/// Inputs to [`resolve_active_pane`]
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub active_pane_id: Option<PaneId>,
    pub root: Option<&'a Arc<PaneNode>>,
    /// Terminal leaves of the visible session scope, in display order
    pub terminal_leaves: &'a [PaneLeaf],
    pub has_settings: bool,
    pub has_context: bool,
}

/// Outcome of resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPane {
    pub kind: ActivePaneKind,
    pub active_pane_id: Option<PaneId>,
    pub active_terminal_pane_id: Option<PaneId>,
}

impl ResolvedPane {
    fn terminal(pane_id: PaneId) -> Self {
        Self {
            kind: ActivePaneKind::Terminal,
            active_pane_id: Some(pane_id),
            active_terminal_pane_id: Some(pane_id),
        }
    }

    fn empty(pane_id: Option<PaneId>) -> Self {
        Self {
            kind: ActivePaneKind::EmptyTerminal,
            active_pane_id: pane_id,
            active_terminal_pane_id: None,
        }
    }
}

/// Resolve the focused pane
pub fn resolve_active_pane(input: &ResolveInput<'_>) -> ResolvedPane {
    let first_terminal = input.terminal_leaves.first().map(|leaf| leaf.id);

    let selected = match (input.active_pane_id, input.root) {
        (Some(id), Some(root)) => find_node(root, id).and_then(|node| node.as_leaf()),
        _ => None,
    };

    if let Some(leaf) = selected {
        match leaf.content {
            PaneContent::Settings if input.has_settings => {
                return ResolvedPane {
                    kind: ActivePaneKind::Settings,
                    active_pane_id: Some(leaf.id),
                    active_terminal_pane_id: first_terminal,
                };
            }
            PaneContent::Context if input.has_context => {
                return ResolvedPane {
                    kind: ActivePaneKind::Context,
                    active_pane_id: Some(leaf.id),
                    active_terminal_pane_id: first_terminal,
                };
            }
            PaneContent::Empty => return ResolvedPane::empty(Some(leaf.id)),
            PaneContent::Terminal { .. } => {
                if input.terminal_leaves.iter().any(|t| t.id == leaf.id) {
                    return ResolvedPane::terminal(leaf.id);
                }
                // Belongs to a hidden session scope
                return first_terminal.map_or(ResolvedPane::empty(None), ResolvedPane::terminal);
            }
            PaneContent::Settings | PaneContent::Context => {}
        }
    }

    first_terminal.map_or(ResolvedPane::empty(None), ResolvedPane::terminal)
}
