//! Balanced grid layout

use std::sync::Arc;

use super::tree::{new_split, Orientation, PaneContent, PaneLeaf, PaneNode};

/// Number of leaves in each row of a balanced grid of `count` leaves
///
/// Rows are `ceil(sqrt(count))`; leftover leaves go to the last rows so an
/// earlier row never holds more than a later one.
pub fn grid_row_sizes(count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let rows = (count as f64).sqrt().ceil() as usize;
    let base = count / rows;
    let remainder = count % rows;
    (0..rows)
        .map(|row| if row >= rows - remainder { base + 1 } else { base })
        .collect()
}

/// Lay leaves out in a near-square grid
///
/// Each row is a horizontal split chain, and rows are stacked in a
/// vertical split chain. A single leaf is returned as is; no leaves yields
/// an empty leaf.
pub fn build_balanced_grid(leaves: &[PaneLeaf]) -> Arc<PaneNode> {
    match leaves {
        [] => PaneLeaf::new(PaneContent::Empty).into_node(),
        [leaf] => leaf.into_node(),
        _ => {
            let mut rest = leaves;
            let rows: Vec<Arc<PaneNode>> = grid_row_sizes(leaves.len())
                .into_iter()
                .map(|size| {
                    let (row, tail) = rest.split_at(size);
                    rest = tail;
                    fold_chain(
                        Orientation::Horizontal,
                        row.iter().map(|leaf| leaf.into_node()).collect(),
                    )
                })
                .collect();
            fold_chain(Orientation::Vertical, rows)
        }
    }
}

/// Fold nodes into a right-nested chain with equal visible shares
fn fold_chain(orientation: Orientation, nodes: Vec<Arc<PaneNode>>) -> Arc<PaneNode> {
    let mut iter = nodes.into_iter().rev();
    let Some(mut chain) = iter.next() else {
        return PaneLeaf::new(PaneContent::Empty).into_node();
    };
    for (offset, node) in iter.enumerate() {
        // `offset + 1` nodes are already in the chain
        let share = 1.0 / (offset + 2) as f32;
        chain = new_split(orientation, node, chain, share);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tree::collect_leaf_ids;
    use uuid::Uuid;

    fn leaves(n: usize) -> Vec<PaneLeaf> {
        (0..n)
            .map(|_| {
                PaneLeaf::new(PaneContent::Terminal {
                    terminal_id: Uuid::new_v4(),
                })
            })
            .collect()
    }

    #[test]
    fn test_row_sizes() {
        assert_eq!(grid_row_sizes(0), Vec::<usize>::new());
        assert_eq!(grid_row_sizes(1), vec![1]);
        assert_eq!(grid_row_sizes(2), vec![1, 1]);
        assert_eq!(grid_row_sizes(3), vec![1, 2]);
        assert_eq!(grid_row_sizes(5), vec![1, 2, 2]);
        assert_eq!(grid_row_sizes(7), vec![2, 2, 3]);
        assert_eq!(grid_row_sizes(10), vec![2, 2, 3, 3]);
    }

    #[test]
    fn test_empty_and_single() {
        let grid = build_balanced_grid(&[]);
        assert_eq!(grid.as_leaf().unwrap().content, PaneContent::Empty);

        let one = leaves(1);
        assert_eq!(*build_balanced_grid(&one), PaneNode::Leaf(one[0]));
    }

    #[test]
    fn test_grid_preserves_order() {
        let input = leaves(5);
        let grid = build_balanced_grid(&input);
        let ids: Vec<_> = input.iter().map(|l| l.id).collect();
        assert_eq!(collect_leaf_ids(&grid), ids);
    }

    #[test]
    fn test_grid_shape_for_four() {
        let grid = build_balanced_grid(&leaves(4));
        let top = grid.as_split().unwrap();
        assert_eq!(top.orientation, Orientation::Vertical);
        for row in &top.children {
            assert_eq!(row.as_split().unwrap().orientation, Orientation::Horizontal);
        }
    }

    #[test]
    fn test_chain_shares_are_equal() {
        // Three leaves in one row: first takes 1/3, then 1/2 of the rest
        let chain = fold_chain(
            Orientation::Horizontal,
            leaves(3).iter().map(|l| l.into_node()).collect(),
        );
        let outer = chain.as_split().unwrap();
        assert!((outer.ratios[0] - 1.0 / 3.0).abs() < 1e-6);
        let inner = outer.children[1].as_split().unwrap();
        assert!((inner.ratios[0] - 0.5).abs() < 1e-6);
    }
}
