//! Nested-set interval algorithms.
//!
//! Every function here runs inside a transaction opened by the engine and
//! assumes its preconditions were checked against freshly read rows.

use tracing::debug;

use super::rank;
use crate::config::TreeConfig;
use crate::error::{NestError, Result};
use crate::model::{NewNode, Node, NodeDraft, NodeId};
use crate::store::{Assignment, Column, ForestScope, Predicate, RecordStore};

/// Where a node lands relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// First child of the target.
    PrependTo,
    /// Last child of the target.
    AppendTo,
    /// Sibling immediately before the target.
    InsertBefore,
    /// Sibling immediately after the target.
    InsertAfter,
}

impl Placement {
    /// Left bound the node will occupy, computed from the target's current bounds.
    pub fn start(self, target: &Node) -> i64 {
        match self {
            Placement::PrependTo => target.left + 1,
            Placement::AppendTo => target.right,
            Placement::InsertBefore => target.left,
            Placement::InsertAfter => target.right + 1,
        }
    }

    /// Depth the node will have.
    pub fn depth(self, target: &Node) -> i64 {
        match self {
            Placement::PrependTo | Placement::AppendTo => target.depth + 1,
            Placement::InsertBefore | Placement::InsertAfter => target.depth,
        }
    }

    /// Whether the node becomes a sibling rather than a child of the target.
    pub fn is_sibling(self) -> bool {
        matches!(self, Placement::InsertBefore | Placement::InsertAfter)
    }

    /// Operation name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Placement::PrependTo => "prepend_to",
            Placement::AppendTo => "append_to",
            Placement::InsertBefore => "insert_before",
            Placement::InsertAfter => "insert_after",
        }
    }
}

pub(crate) fn fetch<S: RecordStore + ?Sized>(store: &S, id: NodeId) -> Result<Option<Node>> {
    store.find_one(&Predicate::id(id))
}

/// Adds `delta` to every left and right bound `>= from` inside `scope`.
pub(crate) fn shift_bounds<S: RecordStore + ?Sized>(
    store: &mut S,
    scope: &ForestScope,
    from: i64,
    delta: i64,
) -> Result<()> {
    for column in [Column::Left, Column::Right] {
        let rows = store.update_all(
            &scope.apply(Predicate::ge(column, from)),
            &[Assignment::Add(column, delta)],
        )?;
        debug!(forest = ?scope.forest(), ?column, from, delta, rows, "shifted bounds");
    }
    Ok(())
}

/// Creates a fresh root with bounds `[1, 2]`.
pub(crate) fn insert_root<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    node: NewNode,
) -> Result<Node> {
    if !config.is_multi() && store.find_one(&Predicate::eq(Column::Left, 1))?.is_some() {
        return Err(NestError::ForestLimitExceeded);
    }
    let order = if config.ranking {
        Some(rank::next_rank(store)?)
    } else {
        None
    };
    let mut root = store.insert(NodeDraft {
        left: 1,
        right: 2,
        depth: 0,
        tree: None,
        order,
        label: node.label,
    })?;
    if config.is_multi() {
        // the forest id is the root's own key, known only after the insert
        store.update_all(
            &Predicate::id(root.id),
            &[Assignment::Set(Column::Tree, root.id.0)],
        )?;
        root.tree = Some(root.id);
    }
    Ok(root)
}

/// Opens a 2-wide gap at the placement position and stores `node` there.
pub(crate) fn insert_leaf<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    node: NewNode,
    target: &Node,
    placement: Placement,
) -> Result<Node> {
    let start = placement.start(target);
    let scope = ForestScope::of(config, target)?;
    shift_bounds(store, &scope, start, 2)?;
    store.insert(NodeDraft {
        left: start,
        right: start + 1,
        depth: placement.depth(target),
        tree: target.tree,
        order: target.order,
        label: node.label,
    })
}

/// Detaches `node`'s subtree into a new forest rooted at `node`.
pub(crate) fn move_as_root<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    node: &Node,
) -> Result<()> {
    if !config.is_multi() {
        return Err(NestError::ForestLimitExceeded);
    }
    if node.is_root() {
        return Err(NestError::UnsupportedOperation(
            "node is already the root of its forest",
        ));
    }
    let scope = ForestScope::of(config, node)?;
    let shift = 1 - node.left;
    let mut assignments = vec![
        Assignment::Add(Column::Left, shift),
        Assignment::Add(Column::Right, shift),
        Assignment::Add(Column::Depth, -node.depth),
        Assignment::Set(Column::Tree, node.id.0),
    ];
    if config.ranking {
        assignments.push(Assignment::Set(Column::Order, rank::next_rank(store)?));
    }
    let moved = store.update_all(
        &scope.apply(Predicate::within(node.left, node.right)),
        &assignments,
    )?;
    debug!(node = %node.id, rows = moved, "subtree detached as new forest");
    shift_bounds(store, &scope, node.right + 1, -node.width())
}

/// Moves `node`'s subtree to the placement position inside its own forest.
pub(crate) fn move_within<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    node: &Node,
    target: &Node,
    placement: Placement,
) -> Result<()> {
    let destination = placement.start(target);
    let depth_delta = placement.depth(target) - node.depth;
    let width = node.width();
    let scope = ForestScope::of(config, node)?;

    shift_bounds(store, &scope, destination, width)?;

    let (mut left, mut right) = (node.left, node.right);
    if left >= destination {
        left += width;
        right += width;
    }

    if depth_delta != 0 {
        store.update_all(
            &scope.apply(Predicate::within(left, right)),
            &[Assignment::Add(Column::Depth, depth_delta)],
        )?;
    }

    // bounds of the subtree are the only ones inside [left, right]
    for column in [Column::Left, Column::Right] {
        store.update_all(
            &scope.apply(Predicate::ge(column, left).and(Predicate::le(column, right))),
            &[Assignment::Add(column, destination - left)],
        )?;
    }

    shift_bounds(store, &scope, right + 1, -width)
}

/// Moves `node`'s subtree into the forest of `target`.
pub(crate) fn move_across<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    node: &Node,
    target: &Node,
    placement: Placement,
) -> Result<()> {
    let destination = placement.start(target);
    let depth_delta = placement.depth(target) - node.depth;
    let width = node.width();
    let source = ForestScope::of(config, node)?;
    let dest = ForestScope::of(config, target)?;
    let dest_forest = dest
        .forest()
        .ok_or_else(|| NestError::store("cross-forest move without forests"))?;

    shift_bounds(store, &dest, destination, width)?;

    let offset = destination - node.left;
    let mut assignments = vec![
        Assignment::Add(Column::Left, offset),
        Assignment::Add(Column::Right, offset),
        Assignment::Add(Column::Depth, depth_delta),
        Assignment::Set(Column::Tree, dest_forest.0),
    ];
    if config.ranking {
        if let Some(order) = target.order {
            assignments.push(Assignment::Set(Column::Order, order));
        }
    }
    let moved = store.update_all(
        &source.apply(Predicate::within(node.left, node.right)),
        &assignments,
    )?;
    debug!(node = %node.id, to = %dest_forest, rows = moved, "subtree moved across forests");

    shift_bounds(store, &source, node.right + 1, -width)?;

    if config.ranking && node.is_root() {
        // the source forest is gone
        rank::close_gap(store, rank::rank_of(node)?, None)?;
    }
    Ok(())
}

/// Deletes `node` and its descendants and closes the gap; returns the number of rows removed.
pub(crate) fn remove_subtree<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    node: &Node,
) -> Result<usize> {
    let scope = ForestScope::of(config, node)?;
    let deleted = store.delete_all(&scope.apply(Predicate::within(node.left, node.right)))?;
    if deleted as i64 != node.subtree_size() {
        return Err(NestError::store(format!(
            "subtree of node {} holds {deleted} rows, bounds imply {}",
            node.id,
            node.subtree_size()
        )));
    }
    shift_bounds(store, &scope, node.right + 1, -node.width())?;
    if config.ranking && node.is_root() {
        rank::close_gap(store, rank::rank_of(node)?, None)?;
    }
    Ok(deleted)
}

/// Deletes a single leaf and closes its 2-wide gap.
pub(crate) fn remove_leaf<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    node: &Node,
) -> Result<()> {
    let scope = ForestScope::of(config, node)?;
    store.delete_all(&Predicate::id(node.id))?;
    shift_bounds(store, &scope, node.right + 1, -2)
}
