use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary key of a node row.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        NodeId(value)
    }
}

impl From<&Node> for NodeId {
    fn from(node: &Node) -> Self {
        node.id
    }
}

/// One persisted element of a tree.
///
/// `left`/`right` are the interval bounds, `tree` is the forest id (absent
/// when forests are disabled) and `order` is the root sibling rank shared by
/// every node of a forest (absent when ranking is disabled).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Primary key.
    pub id: NodeId,
    /// Left bound.
    pub left: i64,
    /// Right bound.
    pub right: i64,
    /// Distance from the forest root.
    pub depth: i64,
    /// Forest id, the root's own id.
    pub tree: Option<NodeId>,
    /// Rank of the forest among roots.
    pub order: Option<i64>,
    /// Display label.
    pub label: String,
}

impl Node {
    /// Roots always start at 1.
    pub fn is_root(&self) -> bool {
        self.left == 1
    }

    /// No room for children between the bounds.
    pub fn is_leaf(&self) -> bool {
        self.right - self.left == 1
    }

    /// Number of interval units covered by this node's subtree.
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of nodes in this node's subtree, itself included.
    pub fn subtree_size(&self) -> i64 {
        self.width() / 2
    }

    /// Strict interval containment within the same forest.
    pub fn is_descendant_of(&self, ancestor: &Node) -> bool {
        self.left > ancestor.left && self.right < ancestor.right && self.tree == ancestor.tree
    }

    /// Inverse of [`Node::is_descendant_of`].
    pub fn is_ancestor_of(&self, descendant: &Node) -> bool {
        descendant.is_descendant_of(self)
    }
}

/// Payload of a node that has not been stored yet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    /// Display label.
    pub label: String,
}

impl NewNode {
    /// Record with `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// The node an operation acts on: either a fresh record or a stored one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subject {
    /// Inserted by the operation.
    New(NewNode),
    /// Moved by the operation.
    Existing(NodeId),
}

impl Subject {
    /// Stored id, `None` for a fresh record.
    pub fn id(&self) -> Option<NodeId> {
        match self {
            Subject::New(_) => None,
            Subject::Existing(id) => Some(*id),
        }
    }
}

impl From<NewNode> for Subject {
    fn from(node: NewNode) -> Self {
        Subject::New(node)
    }
}

impl From<NodeId> for Subject {
    fn from(id: NodeId) -> Self {
        Subject::Existing(id)
    }
}

impl From<&Node> for Subject {
    fn from(node: &Node) -> Self {
        Subject::Existing(node.id)
    }
}

/// Row values handed to [`crate::store::RecordStore::insert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDraft {
    /// Left bound.
    pub left: i64,
    /// Right bound.
    pub right: i64,
    /// Depth.
    pub depth: i64,
    /// Forest id; patched after insert for new roots.
    pub tree: Option<NodeId>,
    /// Root rank.
    pub order: Option<i64>,
    /// Display label.
    pub label: String,
}
