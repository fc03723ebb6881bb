use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::NodeId;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, NestError>;

/// Failures raised by the tree engine, the query layer and the record stores.
#[derive(Debug, Error)]
pub enum NestError {
    /// Missing or inconsistent column mapping.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A second root was requested while forests are disabled.
    #[error("cannot create more than one root when forests are disabled")]
    ForestLimitExceeded,
    /// The parent or reference node does not exist in the store.
    #[error("target node {0} is not persisted")]
    TargetNotPersisted(NodeId),
    /// Subject and target are the same node.
    #[error("node {0} cannot be placed relative to itself")]
    SameNode(NodeId),
    /// The target lies inside the subject's own subtree.
    #[error("node {target} is a descendant of node {subject}")]
    CyclicMove {
        /// Node being moved.
        subject: NodeId,
        /// Requested parent or reference.
        target: NodeId,
    },
    /// Sibling placement against a root outside root promotion.
    #[error("target node {0} is a root")]
    TargetIsRoot(NodeId),
    /// Operation the engine refuses to perform.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    /// The subject node does not exist in the store.
    #[error("node {0} is not persisted")]
    NotPersisted(NodeId),
    /// Record store failure that is not backed by SQLite.
    #[error("store failure: {0}")]
    Store(String),
    /// SQLite failure.
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Copyable discriminant of [`NestError`], reported to adapter callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`NestError::Configuration`].
    ConfigurationError,
    /// See [`NestError::ForestLimitExceeded`].
    ForestLimitExceeded,
    /// See [`NestError::TargetNotPersisted`].
    TargetNotPersisted,
    /// See [`NestError::SameNode`].
    SameNode,
    /// See [`NestError::CyclicMove`].
    CyclicMove,
    /// See [`NestError::TargetIsRoot`].
    TargetIsRoot,
    /// See [`NestError::UnsupportedOperation`].
    UnsupportedOperation,
    /// See [`NestError::NotPersisted`].
    NotPersisted,
    /// Any record store failure.
    StoreFailure,
}

impl NestError {
    /// Returns the error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NestError::Configuration(_) => ErrorKind::ConfigurationError,
            NestError::ForestLimitExceeded => ErrorKind::ForestLimitExceeded,
            NestError::TargetNotPersisted(_) => ErrorKind::TargetNotPersisted,
            NestError::SameNode(_) => ErrorKind::SameNode,
            NestError::CyclicMove { .. } => ErrorKind::CyclicMove,
            NestError::TargetIsRoot(_) => ErrorKind::TargetIsRoot,
            NestError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            NestError::NotPersisted(_) => ErrorKind::NotPersisted,
            NestError::Store(_) | NestError::Sqlite(_) => ErrorKind::StoreFailure,
        }
    }

    pub(crate) fn store(message: impl Into<String>) -> Self {
        NestError::Store(message.into())
    }
}
