//! Depth-first walk over the element descendants of a node.

use crate::node::NodeId;
use crate::tree::DomTree;

/// What the walker does after visiting an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// Continue into the element's children.
    Descend,
    /// Skip the element's subtree.
    Skip,
}

/// Visit every element below `node` in pre-order, passing its depth below
/// `node` (direct children are level 1). Returning [`Visit::Skip`] prunes
/// that branch. Non-element nodes are passed over silently.
pub fn traverse_child_elements<F>(tree: &DomTree, node: NodeId, mut visit: F)
where
    F: FnMut(NodeId, u32) -> Visit,
{
    let mut stack: Vec<(NodeId, u32)> = tree
        .child_elements(node)
        .map(|child| (child, 1))
        .collect();
    stack.reverse();

    while let Some((current, level)) = stack.pop() {
        if visit(current, level) == Visit::Skip {
            continue;
        }
        let first = stack.len();
        stack.extend(tree.child_elements(current).map(|child| (child, level + 1)));
        stack[first..].reverse();
    }
}
