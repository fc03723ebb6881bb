//! Nested parent/children view of a forest.
//!
//! [`export`] reads one forest in a single query and folds the flat,
//! left-ordered rows into a tree. [`rebuild`] replays such a tree through
//! the engine with `make_root` and repeated `append_to`.

use serde::{Deserialize, Serialize};

use crate::engine::TreeEngine;
use crate::error::{NestError, Result};
use crate::model::{NewNode, Node, NodeId};
use crate::query::TreeQuery;
use crate::store::RecordStore;

/// One node with its children in sibling order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedItem {
    /// Stored id. Ignored by [`rebuild`], which assigns fresh ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    /// Display label.
    pub label: String,
    /// Children in sibling order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedItem>,
}

impl NestedItem {
    /// Leaf item.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            children: Vec::new(),
        }
    }

    /// Replaces the children.
    pub fn with_children(mut self, children: Vec<NestedItem>) -> Self {
        self.children = children;
        self
    }

    /// Number of items in this subtree, itself included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(NestedItem::size).sum::<usize>()
    }

    /// Copy with ids stripped, for comparing shapes across rebuilds.
    pub fn shape(&self) -> NestedItem {
        NestedItem {
            id: None,
            label: self.label.clone(),
            children: self.children.iter().map(NestedItem::shape).collect(),
        }
    }

    fn from_node(node: &Node) -> Self {
        Self {
            id: Some(node.id),
            label: node.label.clone(),
            children: Vec::new(),
        }
    }
}

/// Nested view of the subtree rooted at `root`.
pub fn export<S: RecordStore + ?Sized>(query: &TreeQuery<'_, S>, root: &Node) -> Result<NestedItem> {
    let rows = query.forest(root)?;
    // open ancestors paired with their right bounds
    let mut stack: Vec<(NestedItem, i64)> = Vec::new();
    let mut finished = None;
    for node in &rows {
        while let Some((_, right)) = stack.last() {
            if *right > node.left {
                break;
            }
            fold(&mut stack, &mut finished);
        }
        stack.push((NestedItem::from_node(node), node.right));
    }
    while !stack.is_empty() {
        fold(&mut stack, &mut finished);
    }
    Ok(finished.unwrap_or_else(|| NestedItem::from_node(root)))
}

fn fold(stack: &mut Vec<(NestedItem, i64)>, finished: &mut Option<NestedItem>) {
    if let Some((item, _)) = stack.pop() {
        match stack.last_mut() {
            Some((parent, _)) => parent.children.push(item),
            None => *finished = Some(item),
        }
    }
}

/// Nested view of every forest, roots in display order.
pub fn export_all<S: RecordStore + ?Sized>(query: &TreeQuery<'_, S>) -> Result<Vec<NestedItem>> {
    query
        .ranked_roots()?
        .iter()
        .map(|root| export(query, root))
        .collect()
}

/// Recreates `items` as new forests; returns the new root ids in order.
///
/// Fails with [`NestError::ForestLimitExceeded`] before writing anything when
/// forests are disabled and the import would create a second root. Past that
/// check each item runs as its own sequence of engine operations, so a store
/// failure part-way leaves the forests built so far in place.
pub fn rebuild<S: RecordStore>(
    engine: &mut TreeEngine<S>,
    items: &[NestedItem],
) -> Result<Vec<NodeId>> {
    if !engine.config().is_multi() && engine.query().roots()?.len() + items.len() > 1 {
        return Err(NestError::ForestLimitExceeded);
    }
    let mut roots = Vec::with_capacity(items.len());
    for item in items {
        let root = engine.make_root(NewNode::new(item.label.clone()))?;
        let mut pending: Vec<(NodeId, &[NestedItem])> = vec![(root.id, item.children.as_slice())];
        while let Some((parent, children)) = pending.pop() {
            for child in children {
                let node = engine.append_to(NewNode::new(child.label.clone()), parent)?;
                if !child.children.is_empty() {
                    pending.push((node.id, child.children.as_slice()));
                }
            }
        }
        roots.push(root.id);
    }
    Ok(roots)
}
