//! Root sibling ranking.
//!
//! Ranks are `1..=R` over the forest roots, contiguous and ascending in
//! display order. Every node of a forest carries its root's rank, so moving
//! a forest in the ranking is one bulk update per forest.

use tracing::debug;

use crate::error::{NestError, Result};
use crate::model::{Node, NodeId};
use crate::store::{Assignment, Column, OrderBy, Predicate, RecordStore};

pub(crate) fn rank_of(node: &Node) -> Result<i64> {
    node.order
        .ok_or_else(|| NestError::store(format!("node {} has no sibling rank", node.id)))
}

fn forest_of(node: &Node) -> Result<NodeId> {
    node.tree
        .ok_or_else(|| NestError::store(format!("node {} has no forest id", node.id)))
}

/// Rank a newly created forest receives.
pub(crate) fn next_rank<S: RecordStore + ?Sized>(store: &S) -> Result<i64> {
    let top = store.find_all(
        &Predicate::eq(Column::Left, 1),
        &[OrderBy::desc(Column::Order)],
    )?;
    Ok(top.first().and_then(|root| root.order).unwrap_or(0) + 1)
}

/// Decrements every rank above `rank`, skipping the `keep` forest.
pub(crate) fn close_gap<S: RecordStore + ?Sized>(
    store: &mut S,
    rank: i64,
    keep: Option<NodeId>,
) -> Result<()> {
    let mut predicate = Predicate::gt(Column::Order, rank);
    if let Some(forest) = keep {
        predicate = predicate.and(Predicate::ne(Column::Tree, forest.0));
    }
    let rows = store.update_all(&predicate, &[Assignment::Add(Column::Order, -1)])?;
    debug!(rank, rows, "closed rank gap");
    Ok(())
}

fn open_gap<S: RecordStore + ?Sized>(store: &mut S, rank: i64, keep: NodeId) -> Result<()> {
    let predicate = Predicate::ge(Column::Order, rank).and(Predicate::ne(Column::Tree, keep.0));
    let rows = store.update_all(&predicate, &[Assignment::Add(Column::Order, 1)])?;
    debug!(rank, rows, "opened rank gap");
    Ok(())
}

/// Re-ranks the forest of `root` so it sits right before or after `reference`.
///
/// Both nodes must be roots. Returns the rank `root`'s forest ends up with.
pub(crate) fn place_relative<S: RecordStore + ?Sized>(
    store: &mut S,
    root: &Node,
    reference: &Node,
    before: bool,
) -> Result<i64> {
    let forest = forest_of(root)?;
    close_gap(store, rank_of(root)?, Some(forest))?;

    let reference = store
        .find_one(&Predicate::id(reference.id))?
        .ok_or(NestError::TargetNotPersisted(reference.id))?;
    let reference_rank = rank_of(&reference)?;
    let rank = if before {
        reference_rank
    } else {
        reference_rank + 1
    };

    open_gap(store, rank, forest)?;
    store.update_all(
        &Predicate::eq(Column::Tree, forest.0),
        &[Assignment::Set(Column::Order, rank)],
    )?;
    debug!(forest = %forest, rank, "forest re-ranked");
    Ok(rank)
}
