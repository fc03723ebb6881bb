//! Per-forest mutual exclusion for engines sharing one store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::model::NodeId;

/// Unit of mutual exclusion for structural mutations.
///
/// Scopes order as `Store < Ranking < Forest(id)`; guards are always taken
/// in that order so overlapping requests cannot deadlock.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockScope {
    /// The whole store, used when forests are disabled.
    Store,
    /// The root sibling ranks shared by every forest.
    Ranking,
    /// One forest, keyed by its root id.
    Forest(NodeId),
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Store => write!(f, "store"),
            LockScope::Ranking => write!(f, "ranking"),
            LockScope::Forest(id) => write!(f, "forest {id}"),
        }
    }
}

/// Registry of per-scope mutexes shared by every engine writing to one store.
#[derive(Default)]
pub struct ForestLocks {
    slots: Mutex<HashMap<LockScope, Arc<Mutex<()>>>>,
}

/// Held locks; released on drop.
///
/// Dropping the last guard of a scope also drops its registry slot, so the
/// registry only tracks scopes that are held or waited on.
pub struct ForestGuard<'a> {
    locks: &'a ForestLocks,
    scopes: Vec<LockScope>,
    held: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl ForestGuard<'_> {
    /// Scopes held by this guard, in acquisition order.
    pub fn scopes(&self) -> &[LockScope] {
        &self.scopes
    }
}

impl Drop for ForestGuard<'_> {
    fn drop(&mut self) {
        self.held.clear();
        // slots are only cloned under the registry lock, so a count of one
        // means nobody holds or waits on the scope
        let mut slots = self.locks.slots.lock();
        for scope in &self.scopes {
            if slots.get(scope).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(scope);
            }
        }
    }
}

impl ForestLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every scope in `scopes` is held.
    pub fn acquire(&self, scopes: &[LockScope]) -> ForestGuard<'_> {
        let mut ordered = scopes.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        let held = ordered
            .iter()
            .map(|scope| self.slot(*scope).lock_arc())
            .collect();
        ForestGuard {
            locks: self,
            scopes: ordered,
            held,
        }
    }

    /// Number of scopes currently held or waited on.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether some guard currently holds `scope`.
    pub fn is_locked(&self, scope: LockScope) -> bool {
        self.slots
            .lock()
            .get(&scope)
            .map(|slot| slot.is_locked())
            .unwrap_or(false)
    }

    fn slot(&self, scope: LockScope) -> Arc<Mutex<()>> {
        self.slots.lock().entry(scope).or_default().clone()
    }
}

impl fmt::Debug for ForestLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForestLocks")
            .field("scopes", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_sorts_and_dedups_scopes() {
        let locks = ForestLocks::new();
        let guard = locks.acquire(&[
            LockScope::Forest(NodeId(9)),
            LockScope::Forest(NodeId(2)),
            LockScope::Ranking,
            LockScope::Forest(NodeId(9)),
        ]);
        assert_eq!(
            guard.scopes(),
            &[
                LockScope::Ranking,
                LockScope::Forest(NodeId(2)),
                LockScope::Forest(NodeId(9))
            ]
        );
        assert!(locks.is_locked(LockScope::Forest(NodeId(2))));
        drop(guard);
        assert!(!locks.is_locked(LockScope::Forest(NodeId(2))));
    }

    #[test]
    fn disjoint_forests_do_not_block() {
        let locks = ForestLocks::new();
        let _a = locks.acquire(&[LockScope::Forest(NodeId(1))]);
        let _b = locks.acquire(&[LockScope::Forest(NodeId(2))]);
        assert!(locks.is_locked(LockScope::Forest(NodeId(1))));
        assert!(locks.is_locked(LockScope::Forest(NodeId(2))));
    }

    #[test]
    fn same_forest_blocks_until_release() {
        let locks = Arc::new(ForestLocks::new());
        let released = Arc::new(AtomicBool::new(false));
        let guard = locks.acquire(&[LockScope::Forest(NodeId(1))]);

        let waiter = {
            let locks = locks.clone();
            let released = released.clone();
            thread::spawn(move || {
                let _guard = locks.acquire(&[LockScope::Forest(NodeId(1))]);
                released.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(50));
        released.store(true, Ordering::SeqCst);
        drop(guard);
        assert!(waiter.join().unwrap());
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn released_scopes_leave_the_registry() {
        let locks = ForestLocks::new();
        let outer = locks.acquire(&[LockScope::Ranking, LockScope::Forest(NodeId(1))]);
        let inner = locks.acquire(&[LockScope::Forest(NodeId(2))]);
        assert_eq!(locks.tracked(), 3);
        drop(outer);
        assert_eq!(locks.tracked(), 1);
        assert!(locks.is_locked(LockScope::Forest(NodeId(2))));
        drop(inner);
        assert_eq!(locks.tracked(), 0);
    }
}
