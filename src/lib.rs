//! Nested-set tree engine.
//!
//! Hierarchies are stored as intervals: every node keeps a left bound, a
//! right bound and a depth, and containment of intervals encodes the
//! ancestor relation. [`TreeEngine`] performs the structural mutations
//! (`make_root`, `prepend_to`, `append_to`, `insert_before`, `insert_after`,
//! `delete_with_children`, `delete`) as single transactions against a
//! [`RecordStore`], optionally across several independently rooted forests.
//! [`TreeQuery`] derives structure from the intervals without writing.
//!
//! ```
//! use nestset::{MemoryStore, NewNode, TreeConfig, TreeEngine};
//!
//! let mut engine = TreeEngine::new(MemoryStore::new(), TreeConfig::single_tree())?;
//! let root = engine.make_root(NewNode::new("root"))?;
//! let child = engine.append_to(NewNode::new("child"), root.id)?;
//! assert_eq!((child.left, child.right, child.depth), (2, 3, 1));
//! # Ok::<(), nestset::NestError>(())
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod nested;
pub mod query;
pub mod store;
pub mod verify;

pub use adapter::{step, Direction, MoveAdapter, MoveOutcome, MoveRequest};
pub use config::{ColumnMap, TreeConfig, TreeMode};
pub use engine::{ForestLocks, LockScope, Placement, TreeEngine};
pub use error::{ErrorKind, NestError, Result};
pub use model::{NewNode, Node, NodeId, Subject};
pub use nested::NestedItem;
pub use query::TreeQuery;
pub use store::{MemoryStore, RecordStore, SqliteStore};
pub use verify::{verify, VerifyReport};
