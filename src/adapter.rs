//! Request-level move API for drag-and-drop style callers.
//!
//! A [`MoveRequest`] names the moved node and where it was dropped: the
//! neighbour it now precedes, the neighbour it now follows, and its new
//! parent. [`MoveAdapter`] resolves that into one engine operation and
//! answers with a [`MoveOutcome`] that is either the node's new position or
//! a structured failure.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::TreeEngine;
use crate::error::{ErrorKind, NestError, Result};
use crate::model::{Node, NodeId};
use crate::store::RecordStore;

/// Where a node was dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Node being moved.
    pub subject: NodeId,
    /// Node the subject now sits in front of.
    #[serde(default)]
    pub before: Option<NodeId>,
    /// Node the subject now sits behind.
    #[serde(default)]
    pub after: Option<NodeId>,
    /// New parent.
    #[serde(default)]
    pub parent: Option<NodeId>,
}

/// Result of a move request as reported to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// The subject's position after the move.
    Updated {
        /// Moved node.
        id: NodeId,
        /// New depth.
        depth: i64,
        /// New left bound.
        left: i64,
        /// New right bound.
        right: i64,
    },
    /// Nothing was written.
    Failed {
        /// Error classification.
        kind: ErrorKind,
        /// Human-readable cause.
        message: String,
    },
}

impl MoveOutcome {
    /// Whether the request was applied.
    pub fn is_updated(&self) -> bool {
        matches!(self, MoveOutcome::Updated { .. })
    }
}

impl From<&Node> for MoveOutcome {
    fn from(node: &Node) -> Self {
        MoveOutcome::Updated {
            id: node.id,
            depth: node.depth,
            left: node.left,
            right: node.right,
        }
    }
}

impl From<&NestError> for MoveOutcome {
    fn from(err: &NestError) -> Self {
        MoveOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Direction of a single sibling step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards the first sibling.
    Up,
    /// Towards the last sibling.
    Down,
}

/// Resolves move requests into engine operations.
#[derive(Copy, Clone, Debug)]
pub struct MoveAdapter {
    /// Whether a node dropped without a parent becomes a new forest root.
    pub rootable: bool,
}

impl Default for MoveAdapter {
    fn default() -> Self {
        Self { rootable: true }
    }
}

impl MoveAdapter {
    /// Adapter that may (`true`) or may not turn parentless drops into roots.
    pub fn new(rootable: bool) -> Self {
        Self { rootable }
    }

    /// Applies `request`, reporting failures as [`MoveOutcome::Failed`].
    pub fn apply<S: RecordStore>(
        &self,
        engine: &mut TreeEngine<S>,
        request: &MoveRequest,
    ) -> MoveOutcome {
        match self.try_apply(engine, request) {
            Ok(node) => MoveOutcome::from(&node),
            Err(err) => MoveOutcome::from(&err),
        }
    }

    /// Applies `request` and returns the subject's new position.
    ///
    /// Resolution order:
    ///
    /// 1. no parent, subject not a root, forests enabled and `rootable`: `make_root`
    /// 2. `before` given: `insert_before`
    /// 3. `after` given: `insert_after`
    /// 4. parent given: `append_to`
    ///
    /// When none applies the subject is left where it is.
    pub fn try_apply<S: RecordStore>(
        &self,
        engine: &mut TreeEngine<S>,
        request: &MoveRequest,
    ) -> Result<Node> {
        let subject = engine.query().require(request.subject)?;
        debug!(?request, "resolving move request");

        if request.parent.is_none()
            && self.rootable
            && engine.config().is_multi()
            && !subject.is_root()
        {
            return engine.make_root(subject.id);
        }
        if let Some(before) = request.before {
            return engine.insert_before(subject.id, before);
        }
        if let Some(after) = request.after {
            return engine.insert_after(subject.id, after);
        }
        match request.parent {
            Some(parent) => engine.append_to(subject.id, parent),
            None => Ok(subject),
        }
    }
}

/// Swaps `id` with its neighbouring sibling in `direction`.
///
/// Non-roots trade places with the previous or next sibling. Roots trade
/// rank with the neighbouring forest when ranking is enabled. Returns the
/// moved node, or `None` when there is no neighbour to swap with.
pub fn step<S: RecordStore>(
    engine: &mut TreeEngine<S>,
    id: NodeId,
    direction: Direction,
) -> Result<Option<Node>> {
    let query = engine.query();
    let subject = query.require(id)?;

    let neighbour = if subject.is_root() {
        if !engine.config().ranking {
            return Ok(None);
        }
        let roots = query.ranked_roots()?;
        let Some(position) = roots.iter().position(|root| root.id == id) else {
            return Ok(None);
        };
        match direction {
            Direction::Up => position.checked_sub(1).and_then(|i| roots.get(i)).cloned(),
            Direction::Down => roots.get(position + 1).cloned(),
        }
    } else {
        match direction {
            Direction::Up => query.prev_sibling(&subject)?,
            Direction::Down => query.next_sibling(&subject)?,
        }
    };

    let Some(neighbour) = neighbour else {
        return Ok(None);
    };
    let moved = match direction {
        Direction::Up => engine.insert_before(id, neighbour.id)?,
        Direction::Down => engine.insert_after(id, neighbour.id)?,
    };
    Ok(Some(moved))
}
