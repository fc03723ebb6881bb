//! Tree mutation engine.
//!
//! [`TreeEngine`] owns a [`RecordStore`] and performs the structural
//! mutations: `make_root`, `prepend_to`, `append_to`, `insert_before`,
//! `insert_after`, `delete_with_children` and `delete`. Each call
//!
//! 1. takes the forest locks for every forest it may touch,
//! 2. opens one store transaction,
//! 3. re-reads subject and target, checks preconditions,
//! 4. writes the subject's new interval and the bulk gap shifts,
//! 5. commits, or rolls everything back on the first failure.

mod interval;
mod lock;
mod rank;

pub use interval::Placement;
pub use lock::{ForestGuard, ForestLocks, LockScope};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::TreeConfig;
use crate::error::{NestError, Result};
use crate::model::{NewNode, Node, NodeId, Subject};
use crate::query::TreeQuery;
use crate::store::{with_transaction, RecordStore};
use crate::verify::{verify, VerifyReport};

/// Nested-set mutation engine over a record store.
pub struct TreeEngine<S: RecordStore> {
    store: S,
    config: TreeConfig,
    locks: Arc<ForestLocks>,
}

enum Prepared {
    New(NewNode),
    Existing(Node),
}

fn fetch_subject<S: RecordStore + ?Sized>(store: &S, id: NodeId) -> Result<Node> {
    interval::fetch(store, id)?.ok_or(NestError::NotPersisted(id))
}

fn fetch_target<S: RecordStore + ?Sized>(store: &S, id: NodeId) -> Result<Node> {
    interval::fetch(store, id)?.ok_or(NestError::TargetNotPersisted(id))
}

impl<S: RecordStore> TreeEngine<S> {
    /// Creates an engine with its own lock registry.
    pub fn new(store: S, config: TreeConfig) -> Result<Self> {
        Self::with_locks(store, config, Arc::new(ForestLocks::new()))
    }

    /// Creates an engine sharing `locks` with other engines on the same data.
    pub fn with_locks(store: S, config: TreeConfig, locks: Arc<ForestLocks>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            locks,
        })
    }

    /// Configuration the engine was validated against.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Lock registry; clone it into engines on other connections to the same data.
    pub fn locks(&self) -> &Arc<ForestLocks> {
        &self.locks
    }

    /// Underlying record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Raw store access. Writing bounds through it bypasses every invariant.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consumes the engine, handing back its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Read-side interval queries against the current store state.
    pub fn query(&self) -> TreeQuery<'_, S> {
        TreeQuery::new(&self.store, &self.config)
    }

    /// Checks every structural invariant of the stored forests.
    pub fn verify(&self) -> Result<VerifyReport> {
        verify(&self.store, &self.config)
    }

    /// Makes `subject` the root of a new forest.
    ///
    /// A new node becomes `[1, 2]` at depth 0. A stored node (multi-tree mode
    /// only) takes its whole subtree along into the new forest.
    ///
    /// # Errors
    /// * [`NestError::ForestLimitExceeded`] - forests are disabled and a root exists
    /// * [`NestError::UnsupportedOperation`] - the stored node already is a root
    /// * [`NestError::NotPersisted`] - the stored node does not exist
    pub fn make_root(&mut self, subject: impl Into<Subject>) -> Result<Node> {
        let subject = subject.into();
        let ids: Vec<NodeId> = subject.id().into_iter().collect();
        let mut extra = Vec::new();
        if let (Some(id), true) = (subject.id(), self.config.is_multi()) {
            extra.push(LockScope::Forest(id));
        }
        let node = self.locked("make_root", &ids, &extra, true, move |store, config| {
            match subject {
                Subject::New(node) => interval::insert_root(store, config, node),
                Subject::Existing(id) => {
                    let node = fetch_subject(store, id)?;
                    interval::move_as_root(store, config, &node)?;
                    fetch_subject(store, id)
                }
            }
        })?;
        Self::committed("make_root", &node);
        Ok(node)
    }

    /// Places `subject` as the first child of `parent`.
    pub fn prepend_to(&mut self, subject: impl Into<Subject>, parent: NodeId) -> Result<Node> {
        self.place(subject.into(), parent, Placement::PrependTo)
    }

    /// Places `subject` as the last child of `parent`.
    pub fn append_to(&mut self, subject: impl Into<Subject>, parent: NodeId) -> Result<Node> {
        self.place(subject.into(), parent, Placement::AppendTo)
    }

    /// Places `subject` immediately before `reference`.
    ///
    /// When `reference` is a root and root ranking is enabled, `subject`
    /// becomes a root itself and its forest is ranked right before
    /// `reference`'s forest.
    pub fn insert_before(&mut self, subject: impl Into<Subject>, reference: NodeId) -> Result<Node> {
        self.place(subject.into(), reference, Placement::InsertBefore)
    }

    /// Places `subject` immediately after `reference`. See [`Self::insert_before`].
    pub fn insert_after(&mut self, subject: impl Into<Subject>, reference: NodeId) -> Result<Node> {
        self.place(subject.into(), reference, Placement::InsertAfter)
    }

    /// Deletes `id` and its whole subtree; returns the number of nodes removed.
    pub fn delete_with_children(&mut self, id: NodeId) -> Result<usize> {
        let deleted = self.locked("delete_with_children", &[id], &[], true, |store, config| {
            let node = fetch_subject(store, id)?;
            interval::remove_subtree(store, config, &node)
        })?;
        info!(op = "delete_with_children", node = %id, deleted, "tree mutation committed");
        Ok(deleted)
    }

    /// Deletes a single leaf node.
    ///
    /// # Errors
    /// * [`NestError::UnsupportedOperation`] - the node is a root or has children
    /// * [`NestError::NotPersisted`] - the node does not exist
    pub fn delete(&mut self, id: NodeId) -> Result<()> {
        self.locked("delete", &[id], &[], false, |store, config| {
            let node = fetch_subject(store, id)?;
            if node.is_root() {
                return Err(NestError::UnsupportedOperation(
                    "roots can only be deleted with their children",
                ));
            }
            if !node.is_leaf() {
                return Err(NestError::UnsupportedOperation(
                    "nodes with children can only be deleted with their children",
                ));
            }
            interval::remove_leaf(store, config, &node)
        })?;
        info!(op = "delete", node = %id, "tree mutation committed");
        Ok(())
    }

    fn place(&mut self, subject: Subject, target: NodeId, placement: Placement) -> Result<Node> {
        let mut ids = vec![target];
        ids.extend(subject.id());
        let ranks = placement.is_sibling() || subject.id().is_some();
        let op = placement.name();
        let node = self.locked(op, &ids, &[], ranks, move |store, config| {
            let target = fetch_target(store, target)?;
            let prepared = match subject {
                Subject::New(node) => Prepared::New(node),
                Subject::Existing(id) => {
                    let node = fetch_subject(store, id)?;
                    if node.id == target.id {
                        return Err(NestError::SameNode(node.id));
                    }
                    if target.is_descendant_of(&node) {
                        return Err(NestError::CyclicMove {
                            subject: node.id,
                            target: target.id,
                        });
                    }
                    Prepared::Existing(node)
                }
            };

            if placement.is_sibling() && target.is_root() {
                if !(config.is_multi() && config.ranking) {
                    return Err(NestError::TargetIsRoot(target.id));
                }
                return promote(store, config, prepared, &target, placement);
            }

            match prepared {
                Prepared::New(node) => interval::insert_leaf(store, config, node, &target, placement),
                Prepared::Existing(node) => {
                    if !config.is_multi() || node.tree == target.tree {
                        interval::move_within(store, config, &node, &target, placement)?;
                    } else {
                        interval::move_across(store, config, &node, &target, placement)?;
                    }
                    fetch_subject(store, node.id)
                }
            }
        })?;
        Self::committed(op, &node);
        Ok(node)
    }

    fn committed(op: &'static str, node: &Node) {
        info!(
            op,
            node = %node.id,
            left = node.left,
            right = node.right,
            depth = node.depth,
            "tree mutation committed"
        );
    }

    /// Lock scopes covering the forests `ids` currently belong to.
    fn scopes(&self, ids: &[NodeId], extra: &[LockScope], ranks: bool) -> Result<Vec<LockScope>> {
        let mut scopes = extra.to_vec();
        if !self.config.is_multi() {
            scopes.push(LockScope::Store);
        } else {
            for id in ids {
                if let Some(forest) = interval::fetch(&self.store, *id)?.and_then(|n| n.tree) {
                    scopes.push(LockScope::Forest(forest));
                }
            }
        }
        if ranks && self.config.ranking {
            scopes.push(LockScope::Ranking);
        }
        scopes.sort_unstable();
        scopes.dedup();
        Ok(scopes)
    }

    /// Runs `body` in one transaction while holding the locks of every forest involved.
    fn locked<T, F>(
        &mut self,
        op: &'static str,
        ids: &[NodeId],
        extra: &[LockScope],
        ranks: bool,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut S, &TreeConfig) -> Result<T>,
    {
        let locks = Arc::clone(&self.locks);
        let _guard = loop {
            let scopes = self.scopes(ids, extra, ranks)?;
            let guard = locks.acquire(&scopes);
            // a concurrent cross-forest move may have relocated a node while we waited
            if self.scopes(ids, extra, ranks)? == scopes {
                break guard;
            }
            debug!(op, "forest changed while waiting for locks; retrying");
        };

        let config = &self.config;
        with_transaction(&mut self.store, |store| body(store, config)).map_err(|err| {
            warn!(op, error = %err, "tree mutation rolled back");
            err
        })
    }
}

/// Turns `subject` into a root and ranks its forest next to `reference`.
fn promote<S: RecordStore + ?Sized>(
    store: &mut S,
    config: &TreeConfig,
    subject: Prepared,
    reference: &Node,
    placement: Placement,
) -> Result<Node> {
    let root = match subject {
        Prepared::New(node) => interval::insert_root(store, config, node)?,
        Prepared::Existing(node) if node.is_root() => node,
        Prepared::Existing(node) => {
            interval::move_as_root(store, config, &node)?;
            fetch_subject(store, node.id)?
        }
    };
    rank::place_relative(
        store,
        &root,
        reference,
        placement == Placement::InsertBefore,
    )?;
    fetch_subject(store, root.id)
}
