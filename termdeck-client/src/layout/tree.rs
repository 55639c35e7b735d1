//! Pane tree engine
//!
//! A layout is a strict binary tree of panes. Every operation here is a
//! pure function: it takes a root and returns a new root, sharing every
//! subtree it did not have to touch. Operations given an id that does not
//! exist (or does not have the required shape) return the input tree.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use termdeck_protocol::{PaneId, TerminalId};
use uuid::Uuid;

/// Minimum size ratio for either side of a split
pub const MIN_SPLIT_RATIO: f32 = 0.1;
/// Maximum size ratio for either side of a split
pub const MAX_SPLIT_RATIO: f32 = 0.9;

/// Direction children of a split are laid out in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Children side by side (left, right)
    Horizontal,
    /// Children stacked (top, bottom)
    Vertical,
}

/// What a leaf pane shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaneContent {
    Terminal { terminal_id: TerminalId },
    Settings,
    Context,
    Empty,
}

impl PaneContent {
    pub fn terminal_id(&self) -> Option<TerminalId> {
        match self {
            PaneContent::Terminal { terminal_id } => Some(*terminal_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaneContent::Terminal { .. })
    }
}

/// A pane showing content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneLeaf {
    pub id: PaneId,
    pub content: PaneContent,
}

impl PaneLeaf {
    /// Create a leaf with a fresh id
    pub fn new(content: PaneContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
        }
    }

    pub fn into_node(self) -> Arc<PaneNode> {
        Arc::new(PaneNode::Leaf(self))
    }
}

/// A pane divided into two ordered children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneSplit {
    pub id: PaneId,
    pub orientation: Orientation,
    pub children: [Arc<PaneNode>; 2],
    /// Relative sizes of the two children, summing to 1.0
    pub ratios: [f32; 2],
}

/// A node of the pane tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaneNode {
    Leaf(PaneLeaf),
    Split(PaneSplit),
}

impl PaneNode {
    pub fn id(&self) -> PaneId {
        match self {
            PaneNode::Leaf(leaf) => leaf.id,
            PaneNode::Split(split) => split.id,
        }
    }

    pub fn as_leaf(&self) -> Option<&PaneLeaf> {
        match self {
            PaneNode::Leaf(leaf) => Some(leaf),
            PaneNode::Split(_) => None,
        }
    }

    pub fn as_split(&self) -> Option<&PaneSplit> {
        match self {
            PaneNode::Split(split) => Some(split),
            PaneNode::Leaf(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, PaneNode::Leaf(_))
    }
}

/// Where a moved pane lands relative to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePosition {
    Left,
    Right,
    Top,
    Bottom,
}

impl MovePosition {
    fn orientation(self) -> Orientation {
        match self {
            MovePosition::Left | MovePosition::Right => Orientation::Horizontal,
            MovePosition::Top | MovePosition::Bottom => Orientation::Vertical,
        }
    }

    /// Whether the moved pane is placed before the target
    fn inserts_first(self) -> bool {
        matches!(self, MovePosition::Left | MovePosition::Top)
    }
}

/// Single empty leaf used when a tree would otherwise be empty
pub fn empty_layout() -> Arc<PaneNode> {
    PaneLeaf::new(PaneContent::Empty).into_node()
}

/// Build a split with a fresh id
pub(crate) fn new_split(
    orientation: Orientation,
    first: Arc<PaneNode>,
    second: Arc<PaneNode>,
    first_ratio: f32,
) -> Arc<PaneNode> {
    Arc::new(PaneNode::Split(PaneSplit {
        id: Uuid::new_v4(),
        orientation,
        children: [first, second],
        ratios: [first_ratio, 1.0 - first_ratio],
    }))
}

/// Depth-first lookup of a node by id
pub fn find_node(root: &Arc<PaneNode>, id: PaneId) -> Option<&Arc<PaneNode>> {
    if root.id() == id {
        return Some(root);
    }
    match root.as_ref() {
        PaneNode::Leaf(_) => None,
        PaneNode::Split(split) => split
            .children
            .iter()
            .find_map(|child| find_node(child, id)),
    }
}

/// Whether a node with this id exists in the tree
pub fn pane_exists(root: &Arc<PaneNode>, id: PaneId) -> bool {
    find_node(root, id).is_some()
}

/// Substitute the node with `id` by `replacement`
///
/// Only the nodes on the path from the root to the target are rebuilt.
pub fn replace_node(
    root: &Arc<PaneNode>,
    id: PaneId,
    replacement: Arc<PaneNode>,
) -> Arc<PaneNode> {
    replace_in(root, id, &replacement).unwrap_or_else(|| Arc::clone(root))
}

fn replace_in(
    node: &Arc<PaneNode>,
    id: PaneId,
    replacement: &Arc<PaneNode>,
) -> Option<Arc<PaneNode>> {
    if node.id() == id {
        return Some(Arc::clone(replacement));
    }
    let split = node.as_split()?;
    for (index, child) in split.children.iter().enumerate() {
        if let Some(new_child) = replace_in(child, id, replacement) {
            return Some(with_child(split, index, new_child));
        }
    }
    None
}

fn with_child(split: &PaneSplit, index: usize, child: Arc<PaneNode>) -> Arc<PaneNode> {
    let mut updated = split.clone();
    updated.children[index] = child;
    Arc::new(PaneNode::Split(updated))
}

/// Split a leaf, placing a new leaf holding `content` after it
///
/// Returns the tree unchanged if `target` is not a leaf.
pub fn split_pane(
    root: &Arc<PaneNode>,
    target: PaneId,
    orientation: Orientation,
    content: PaneContent,
) -> Arc<PaneNode> {
    split_pane_with(root, target, orientation, PaneLeaf::new(content))
}

/// Like [`split_pane`], with the new leaf built by the caller
pub fn split_pane_with(
    root: &Arc<PaneNode>,
    target: PaneId,
    orientation: Orientation,
    new_leaf: PaneLeaf,
) -> Arc<PaneNode> {
    match find_node(root, target) {
        Some(node) if node.is_leaf() => {
            let split = new_split(orientation, Arc::clone(node), new_leaf.into_node(), 0.5);
            replace_node(root, target, split)
        }
        _ => Arc::clone(root),
    }
}

/// Remove a node
///
/// Returns `None` when the node is the root (the tree becomes empty). When
/// the node is a child of a split, that split collapses into the sibling.
pub fn close_pane(root: &Arc<PaneNode>, target: PaneId) -> Option<Arc<PaneNode>> {
    if root.id() == target {
        return None;
    }
    Some(remove_in(root, target).unwrap_or_else(|| Arc::clone(root)))
}

fn remove_in(node: &Arc<PaneNode>, target: PaneId) -> Option<Arc<PaneNode>> {
    let split = node.as_split()?;
    for (index, child) in split.children.iter().enumerate() {
        if child.id() == target {
            return Some(Arc::clone(&split.children[1 - index]));
        }
    }
    for (index, child) in split.children.iter().enumerate() {
        if let Some(new_child) = remove_in(child, target) {
            return Some(with_child(split, index, new_child));
        }
    }
    None
}

/// Exchange the content of two leaves, keeping ids and structure
pub fn swap_panes(root: &Arc<PaneNode>, a: PaneId, b: PaneId) -> Arc<PaneNode> {
    if a == b {
        return Arc::clone(root);
    }
    let (Some(leaf_a), Some(leaf_b)) = (
        find_node(root, a).and_then(|n| n.as_leaf()).copied(),
        find_node(root, b).and_then(|n| n.as_leaf()).copied(),
    ) else {
        return Arc::clone(root);
    };

    let swapped_a = PaneLeaf {
        id: leaf_a.id,
        content: leaf_b.content,
    };
    let swapped_b = PaneLeaf {
        id: leaf_b.id,
        content: leaf_a.content,
    };
    let root = replace_node(root, a, swapped_a.into_node());
    replace_node(&root, b, swapped_b.into_node())
}

/// Move a leaf next to another node
///
/// The source is removed first; the target is then looked up in the
/// resulting tree. If the target only existed because the source was part
/// of it (it collapsed on removal), the move is a no-op.
pub fn move_pane(
    root: &Arc<PaneNode>,
    source: PaneId,
    target: PaneId,
    position: MovePosition,
) -> Arc<PaneNode> {
    let Some(source_leaf) = find_node(root, source).and_then(|n| n.as_leaf()).copied() else {
        return Arc::clone(root);
    };
    let Some(without_source) = close_pane(root, source) else {
        return Arc::clone(root);
    };
    let Some(target_node) = find_node(&without_source, target) else {
        return Arc::clone(root);
    };

    let moved = source_leaf.into_node();
    let target_node = Arc::clone(target_node);
    let split = if position.inserts_first() {
        new_split(position.orientation(), moved, target_node, 0.5)
    } else {
        new_split(position.orientation(), target_node, moved, 0.5)
    };
    replace_node(&without_source, target, split)
}

/// Set the ratio of a split's first child, clamped to keep both visible
pub fn set_split_ratio(root: &Arc<PaneNode>, split_id: PaneId, ratio: f32) -> Arc<PaneNode> {
    let Some(split) = find_node(root, split_id).and_then(|n| n.as_split()) else {
        return Arc::clone(root);
    };
    let ratio = ratio.clamp(MIN_SPLIT_RATIO, MAX_SPLIT_RATIO);
    let mut updated = split.clone();
    updated.ratios = [ratio, 1.0 - ratio];
    replace_node(root, split_id, Arc::new(PaneNode::Split(updated)))
}

/// All leaves, left to right
pub fn collect_leaves(root: &Arc<PaneNode>) -> Vec<PaneLeaf> {
    let mut leaves = Vec::new();
    visit_leaves(root, &mut |leaf| leaves.push(*leaf));
    leaves
}

/// All leaf ids, left to right
pub fn collect_leaf_ids(root: &Arc<PaneNode>) -> Vec<PaneId> {
    let mut ids = Vec::new();
    visit_leaves(root, &mut |leaf| ids.push(leaf.id));
    ids
}

/// Terminal ids bound to leaves, left to right
pub fn collect_terminal_ids(root: &Arc<PaneNode>) -> Vec<TerminalId> {
    let mut ids = Vec::new();
    visit_leaves(root, &mut |leaf| {
        if let Some(terminal_id) = leaf.content.terminal_id() {
            ids.push(terminal_id);
        }
    });
    ids
}

/// Leaf bound to a terminal
pub fn find_terminal_leaf(root: &Arc<PaneNode>, terminal_id: TerminalId) -> Option<PaneLeaf> {
    collect_leaves(root)
        .into_iter()
        .find(|leaf| leaf.content.terminal_id() == Some(terminal_id))
}

fn visit_leaves(node: &Arc<PaneNode>, f: &mut impl FnMut(&PaneLeaf)) {
    match node.as_ref() {
        PaneNode::Leaf(leaf) => f(leaf),
        PaneNode::Split(split) => {
            for child in &split.children {
                visit_leaves(child, f);
            }
        }
    }
}
