//! Pane layout: tree engine, grid builder, active pane resolution and the
//! per-group layout store

pub mod grid;
pub mod resolver;
pub mod store;
pub mod tree;

pub use grid::{build_balanced_grid, grid_row_sizes};
pub use resolver::{resolve_active_pane, ActivePaneKind, ResolveInput, ResolvedPane};
pub use store::{GroupLayout, LayoutStore, TerminalMeta, ViewMode};
pub use tree::{
    close_pane, collect_leaf_ids, collect_leaves, collect_terminal_ids, empty_layout, find_node,
    find_terminal_leaf, move_pane, pane_exists, replace_node, set_split_ratio, split_pane,
    split_pane_with, swap_panes, MovePosition, Orientation, PaneContent, PaneLeaf, PaneNode,
    PaneSplit,
};
