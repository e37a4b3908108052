//! Assembly of record subtrees.
//!
//! The database returns a flat list of visible descendants; [`build_tree`]
//! nests them under their parents with children newest first, matching the
//! ordering of a plain sub-record listing.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{DbId, Timestamp};

/// Anything that can be placed in a parent/child tree.
pub trait HierarchyNode {
    fn node_id(&self) -> DbId;
    fn parent_id(&self) -> Option<DbId>;
    fn created_at(&self) -> Timestamp;
}

/// A node with its nested children.
#[derive(Debug, Clone, Serialize)]
pub struct RecordTree<T> {
    #[serde(flatten)]
    pub record: T,
    pub children: Vec<RecordTree<T>>,
}

impl<T> RecordTree<T> {
    /// Number of generations in the tree, counting the root.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(RecordTree::depth).max().unwrap_or(0)
    }

    /// Total number of nodes, counting the root.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(RecordTree::size).sum::<usize>()
    }
}

/// Nest `descendants` under `root`.
///
/// Nodes whose parent is neither the root nor another descendant are
/// dropped: an archived or inactive record hides its whole subtree.
pub fn build_tree<T: HierarchyNode>(root: T, descendants: Vec<T>) -> RecordTree<T> {
    let mut by_parent: HashMap<DbId, Vec<T>> = HashMap::new();
    for node in descendants {
        if let Some(parent) = node.parent_id() {
            by_parent.entry(parent).or_default().push(node);
        }
    }
    attach(root, &mut by_parent)
}

fn attach<T: HierarchyNode>(node: T, by_parent: &mut HashMap<DbId, Vec<T>>) -> RecordTree<T> {
    let mut children = by_parent.remove(&node.node_id()).unwrap_or_default();
    children.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    let children = children
        .into_iter()
        .map(|child| attach(child, by_parent))
        .collect();
    RecordTree {
        record: node,
        children,
    }
}
