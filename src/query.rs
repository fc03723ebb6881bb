//! Read-only interval derivations.
//!
//! Every query is a single predicate read against the store, scoped to the
//! subject's forest when forests are enabled. Results are ordered by
//! ascending left bound unless stated otherwise.

use crate::config::TreeConfig;
use crate::error::{NestError, Result};
use crate::model::{Node, NodeId};
use crate::store::{Column, ForestScope, OrderBy, Predicate, RecordStore};

/// Interval queries over one store.
pub struct TreeQuery<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    config: &'a TreeConfig,
}

impl<'a, S: RecordStore + ?Sized> TreeQuery<'a, S> {
    /// Queries `store` laid out by `config`.
    pub fn new(store: &'a S, config: &'a TreeConfig) -> Self {
        Self { store, config }
    }

    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Result<Option<Node>> {
        self.store.find_one(&Predicate::id(id))
    }

    /// Like [`Self::node`] but fails with `NotPersisted` for unknown ids.
    pub fn require(&self, id: NodeId) -> Result<Node> {
        self.node(id)?.ok_or(NestError::NotPersisted(id))
    }

    /// Ancestors of `subject`, root first.
    ///
    /// With `depth`, only ancestors at most that many generations up are returned.
    /// Negative limits count as zero generations.
    pub fn parents(&self, subject: &Node, depth: Option<i64>) -> Result<Vec<Node>> {
        let mut predicate = Predicate::lt(Column::Left, subject.left)
            .and(Predicate::gt(Column::Right, subject.right));
        if let Some(depth) = depth {
            let floor = subject.depth.saturating_sub(depth.max(0));
            predicate = predicate.and(Predicate::ge(Column::Depth, floor));
        }
        self.scoped(subject, predicate)
    }

    /// Direct parent of `subject`; `None` for roots.
    pub fn parent(&self, subject: &Node) -> Result<Option<Node>> {
        Ok(self.parents(subject, Some(1))?.pop())
    }

    /// Descendants of `subject` in document order.
    ///
    /// With `depth`, only descendants at most that many generations down are returned;
    /// `Some(1)` yields the direct children. Negative limits count as zero generations.
    pub fn children(&self, subject: &Node, depth: Option<i64>) -> Result<Vec<Node>> {
        let mut predicate = Predicate::gt(Column::Left, subject.left)
            .and(Predicate::lt(Column::Right, subject.right));
        if let Some(depth) = depth {
            let ceiling = subject.depth.saturating_add(depth.max(0));
            predicate = predicate.and(Predicate::le(Column::Depth, ceiling));
        }
        self.scoped(subject, predicate)
    }

    /// Leaves strictly below `subject`, or of the whole store without a subject.
    pub fn leaves(&self, subject: Option<&Node>) -> Result<Vec<Node>> {
        match subject {
            Some(subject) => self.scoped(
                subject,
                Predicate::leaf()
                    .and(Predicate::gt(Column::Left, subject.left))
                    .and(Predicate::lt(Column::Right, subject.right)),
            ),
            None => self.leaves_of_store(),
        }
    }

    /// Every leaf in the store, ordered by forest then left bound.
    pub fn leaves_of_store(&self) -> Result<Vec<Node>> {
        let order: &[OrderBy] = if self.config.is_multi() {
            &[OrderBy::asc(Column::Tree), OrderBy::asc(Column::Left)]
        } else {
            &[OrderBy::asc(Column::Left)]
        };
        self.store.find_all(&Predicate::leaf(), order)
    }

    /// Sibling ending right before `subject`.
    pub fn prev_sibling(&self, subject: &Node) -> Result<Option<Node>> {
        let scope = ForestScope::of(self.config, subject)?;
        self.store
            .find_one(&scope.apply(Predicate::eq(Column::Right, subject.left - 1)))
    }

    /// Sibling starting right after `subject`.
    pub fn next_sibling(&self, subject: &Node) -> Result<Option<Node>> {
        let scope = ForestScope::of(self.config, subject)?;
        self.store
            .find_one(&scope.apply(Predicate::eq(Column::Left, subject.right + 1)))
    }

    /// Every root, ordered by primary key.
    pub fn roots(&self) -> Result<Vec<Node>> {
        self.store
            .find_all(&Predicate::eq(Column::Left, 1), &[OrderBy::asc(Column::Id)])
    }

    /// Every root in display order: by sibling rank when ranking is on, else by key.
    pub fn ranked_roots(&self) -> Result<Vec<Node>> {
        if !self.config.ranking {
            return self.roots();
        }
        self.store
            .find_all(&Predicate::eq(Column::Left, 1), &[OrderBy::asc(Column::Order)])
    }

    /// Every node of `root`'s forest in document order, root included.
    pub fn forest(&self, root: &Node) -> Result<Vec<Node>> {
        self.scoped(root, Predicate::within(root.left, root.right))
    }

    fn scoped(&self, subject: &Node, predicate: Predicate) -> Result<Vec<Node>> {
        let scope = ForestScope::of(self.config, subject)?;
        self.store
            .find_all(&scope.apply(predicate), &[OrderBy::asc(Column::Left)])
    }
}
