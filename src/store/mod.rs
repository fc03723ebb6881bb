//! Record store contract consumed by the tree engine.
//!
//! Stores expose predicate-based reads, bulk updates whose arithmetic deltas
//! are applied per row by the store itself, bulk deletes and explicit
//! transaction boundaries. [`with_transaction`] wraps a body so that every
//! exit path either commits or rolls back.

mod memory;
mod predicate;
mod sqlite;

pub use memory::MemoryStore;
pub use predicate::{Assignment, CmpOp, Column, ForestScope, OrderBy, Predicate};
pub use sqlite::SqliteStore;

use tracing::warn;

use crate::error::Result;
use crate::model::{Node, NodeDraft};

/// Tabular storage for node rows.
pub trait RecordStore {
    /// First row matching `predicate`, if any.
    fn find_one(&self, predicate: &Predicate) -> Result<Option<Node>>;

    /// Every matching row, sorted by `order` then primary key.
    fn find_all(&self, predicate: &Predicate, order: &[OrderBy]) -> Result<Vec<Node>>;

    /// Stores a new row and returns it with its assigned id.
    fn insert(&mut self, draft: NodeDraft) -> Result<Node>;

    /// Applies `assignments` to every matching row; returns the row count.
    fn update_all(&mut self, predicate: &Predicate, assignments: &[Assignment]) -> Result<usize>;

    /// Deletes every matching row; returns the row count.
    fn delete_all(&mut self, predicate: &Predicate) -> Result<usize>;

    /// Opens a transaction. Transactions do not nest.
    fn begin(&mut self) -> Result<()>;

    /// Makes every write since `begin` durable.
    fn commit(&mut self) -> Result<()>;

    /// Discards every write since `begin`.
    fn rollback(&mut self) -> Result<()>;

    /// Number of matching rows.
    fn count(&self, predicate: &Predicate) -> Result<usize> {
        Ok(self.find_all(predicate, &[])?.len())
    }
}

struct TxGuard<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    finished: bool,
}

impl<S: RecordStore + ?Sized> Drop for TxGuard<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.store.rollback() {
                warn!(error = %err, "rollback after unwinding failed");
            }
        }
    }
}

/// Runs `body` inside one store transaction.
///
/// Commits when `body` returns `Ok`; rolls back when it returns `Err`, when
/// the commit itself fails, or when `body` panics.
pub fn with_transaction<S, T, F>(store: &mut S, body: F) -> Result<T>
where
    S: RecordStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin()?;
    let mut guard = TxGuard {
        store,
        finished: false,
    };
    match body(&mut *guard.store) {
        Ok(value) => {
            guard.finished = true;
            if let Err(err) = guard.store.commit() {
                if let Err(rollback_err) = guard.store.rollback() {
                    warn!(error = %rollback_err, "rollback after failed commit failed");
                }
                return Err(err);
            }
            Ok(value)
        }
        Err(err) => {
            guard.finished = true;
            if let Err(rollback_err) = guard.store.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
