//! In-memory [`RecordStore`] with snapshot transactions and write fault injection.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use super::{Assignment, Column, OrderBy, Predicate, RecordStore};
use crate::error::{NestError, Result};
use crate::model::{Node, NodeDraft, NodeId};

#[derive(Debug, Clone)]
struct Snapshot {
    rows: BTreeMap<NodeId, Node>,
    next_id: i64,
}

/// In-process record store backed by a `BTreeMap`.
///
/// `begin` snapshots the table and `rollback` restores the snapshot, so an
/// aborted transaction leaves no trace. Write faults can be injected with
/// [`MemoryStore::fail_after_writes`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<NodeId, Node>,
    next_id: i64,
    snapshot: Option<Snapshot>,
    writes_until_failure: Option<usize>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the write after the next `writes` successful ones fail.
    pub fn fail_after_writes(&mut self, writes: usize) {
        self.writes_until_failure = Some(writes);
    }

    /// Cancels a pending injected failure.
    pub fn clear_fault(&mut self) {
        self.writes_until_failure = None;
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn record_write(&mut self) -> Result<()> {
        match self.writes_until_failure {
            Some(0) => Err(NestError::store("injected write failure")),
            Some(remaining) => {
                self.writes_until_failure = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn compare_rows(a: &Node, b: &Node, order: &[OrderBy]) -> Ordering {
    for key in order {
        let ord = key.column.value(a).cmp(&key.column.value(b));
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

impl RecordStore for MemoryStore {
    fn find_one(&self, predicate: &Predicate) -> Result<Option<Node>> {
        Ok(self
            .rows
            .values()
            .find(|row| predicate.matches(row))
            .cloned())
    }

    fn find_all(&self, predicate: &Predicate, order: &[OrderBy]) -> Result<Vec<Node>> {
        let mut rows: Vec<Node> = self
            .rows
            .values()
            .filter(|row| predicate.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, order));
        Ok(rows)
    }

    fn insert(&mut self, draft: NodeDraft) -> Result<Node> {
        self.record_write()?;
        self.next_id += 1;
        let node = Node {
            id: NodeId(self.next_id),
            left: draft.left,
            right: draft.right,
            depth: draft.depth,
            tree: draft.tree,
            order: draft.order,
            label: draft.label,
        };
        self.rows.insert(node.id, node.clone());
        Ok(node)
    }

    fn update_all(&mut self, predicate: &Predicate, assignments: &[Assignment]) -> Result<usize> {
        if assignments.iter().any(|a| a.column() == Column::Id) {
            return Err(NestError::store("primary key cannot be reassigned"));
        }
        self.record_write()?;
        let mut updated = 0;
        for row in self.rows.values_mut() {
            if !predicate.matches(row) {
                continue;
            }
            // every assignment sees the row as it was before the statement
            let before = row.clone();
            for assignment in assignments {
                let value = match *assignment {
                    Assignment::Set(_, value) => value,
                    // NULL + delta stays NULL, as in SQL
                    Assignment::Add(column, delta) => match column.value(&before) {
                        Some(current) => current + delta,
                        None => continue,
                    },
                };
                assignment.column().write(row, value)?;
            }
            updated += 1;
        }
        debug!(rows = updated, "memory store update");
        Ok(updated)
    }

    fn delete_all(&mut self, predicate: &Predicate) -> Result<usize> {
        self.record_write()?;
        let before = self.rows.len();
        self.rows.retain(|_, row| !predicate.matches(row));
        Ok(before - self.rows.len())
    }

    fn begin(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(NestError::store("transaction already active"));
        }
        self.snapshot = Some(Snapshot {
            rows: self.rows.clone(),
            next_id: self.next_id,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        match self.snapshot.take() {
            Some(_) => Ok(()),
            None => Err(NestError::store("no active transaction")),
        }
    }

    fn rollback(&mut self) -> Result<()> {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.rows = snapshot.rows;
                self.next_id = snapshot.next_id;
                Ok(())
            }
            None => Err(NestError::store("no active transaction")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(left: i64, right: i64) -> NodeDraft {
        NodeDraft {
            left,
            right,
            depth: 0,
            tree: None,
            order: None,
            label: format!("{left}-{right}"),
        }
    }

    #[test]
    fn update_applies_deltas_per_row() {
        let mut store = MemoryStore::new();
        store.insert(draft(1, 6)).unwrap();
        store.insert(draft(2, 3)).unwrap();
        store.insert(draft(4, 5)).unwrap();

        let rows = store
            .update_all(
                &Predicate::ge(Column::Right, 4),
                &[Assignment::Add(Column::Right, 2)],
            )
            .unwrap();
        assert_eq!(rows, 2);

        let all = store
            .find_all(&Predicate::All, &[OrderBy::asc(Column::Left)])
            .unwrap();
        let bounds: Vec<_> = all.iter().map(|n| (n.left, n.right)).collect();
        assert_eq!(bounds, vec![(1, 8), (2, 3), (4, 7)]);
    }

    #[test]
    fn assignments_read_pre_statement_values() {
        let mut store = MemoryStore::new();
        let node = store.insert(draft(3, 4)).unwrap();
        store
            .update_all(
                &Predicate::id(node.id),
                &[
                    Assignment::Add(Column::Left, -2),
                    Assignment::Set(Column::Tree, node.id.0),
                    Assignment::Add(Column::Right, -2),
                ],
            )
            .unwrap();
        let row = store.find_one(&Predicate::id(node.id)).unwrap().unwrap();
        assert_eq!((row.left, row.right, row.tree), (1, 2, Some(node.id)));
    }

    #[test]
    fn deltas_leave_null_columns_null() {
        let mut store = MemoryStore::new();
        let node = store.insert(draft(1, 2)).unwrap();
        let rows = store
            .update_all(
                &Predicate::All,
                &[
                    Assignment::Add(Column::Order, 1),
                    Assignment::Add(Column::Tree, 1),
                    Assignment::Add(Column::Right, 2),
                ],
            )
            .unwrap();
        assert_eq!(rows, 1);
        let row = store.find_one(&Predicate::id(node.id)).unwrap().unwrap();
        assert_eq!((row.right, row.tree, row.order), (4, None, None));
    }

    #[test]
    fn primary_key_is_immutable() {
        let mut store = MemoryStore::new();
        store.insert(draft(1, 2)).unwrap();
        assert!(store
            .update_all(&Predicate::All, &[Assignment::Set(Column::Id, 9)])
            .is_err());
    }

    #[test]
    fn rollback_restores_rows_and_ids() {
        let mut store = MemoryStore::new();
        store.insert(draft(1, 2)).unwrap();
        store.begin().unwrap();
        store.insert(draft(3, 4)).unwrap();
        store.delete_all(&Predicate::All).unwrap();
        store.rollback().unwrap();
        assert_eq!(store.len(), 1);
        let next = store.insert(draft(3, 4)).unwrap();
        assert_eq!(next.id, NodeId(2));
    }

    #[test]
    fn nested_begin_is_rejected() {
        let mut store = MemoryStore::new();
        store.begin().unwrap();
        assert!(store.begin().is_err());
        store.commit().unwrap();
        assert!(store.commit().is_err());
    }

    #[test]
    fn injected_fault_fires_after_budget() {
        let mut store = MemoryStore::new();
        store.fail_after_writes(1);
        store.insert(draft(1, 2)).unwrap();
        assert!(store.insert(draft(3, 4)).is_err());
        store.clear_fault();
        store.insert(draft(3, 4)).unwrap();
    }

    #[test]
    fn find_all_orders_by_keys_then_id() {
        let mut store = MemoryStore::new();
        store.insert(draft(4, 5)).unwrap();
        store.insert(draft(1, 2)).unwrap();
        let desc = store
            .find_all(&Predicate::All, &[OrderBy::desc(Column::Left)])
            .unwrap();
        assert_eq!(desc[0].left, 4);
        let by_id = store.find_all(&Predicate::All, &[]).unwrap();
        assert_eq!(by_id[0].id, NodeId(1));
    }
}
