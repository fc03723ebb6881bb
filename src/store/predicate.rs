//! Typed filters and column assignments shared by every record store.
//!
//! The memory store evaluates them row by row; the SQLite store renders them
//! to parameterised SQL. `None` columns behave like SQL `NULL`.

use crate::config::TreeConfig;
use crate::error::{NestError, Result};
use crate::model::{Node, NodeId};

/// Node attribute addressed by predicates and assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Primary key.
    Id,
    /// Left bound.
    Left,
    /// Right bound.
    Right,
    /// Distance from the forest root.
    Depth,
    /// Forest id; `NULL` when forests are disabled.
    Tree,
    /// Root sibling rank; `NULL` when ranking is disabled.
    Order,
}

impl Column {
    /// Reads the column from an in-memory row. `None` behaves like SQL `NULL`.
    pub fn value(self, node: &Node) -> Option<i64> {
        match self {
            Column::Id => Some(node.id.0),
            Column::Left => Some(node.left),
            Column::Right => Some(node.right),
            Column::Depth => Some(node.depth),
            Column::Tree => node.tree.map(|id| id.0),
            Column::Order => node.order,
        }
    }

    pub(crate) fn write(self, node: &mut Node, value: i64) -> Result<()> {
        match self {
            Column::Id => return Err(NestError::store("primary key cannot be reassigned")),
            Column::Left => node.left = value,
            Column::Right => node.right = value,
            Column::Depth => node.depth = value,
            Column::Tree => node.tree = Some(NodeId(value)),
            Column::Order => node.order = Some(value),
        }
        Ok(())
    }
}

/// Comparison operator of [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// SQL spelling of the operator.
    pub fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

/// Row filter understood by every record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Every row.
    All,
    /// `column op value`
    #[allow(missing_docs)]
    Compare {
        column: Column,
        op: CmpOp,
        value: i64,
    },
    /// `column = other + offset`
    #[allow(missing_docs)]
    Offset {
        column: Column,
        other: Column,
        offset: i64,
    },
    /// Every part holds.
    And(Vec<Predicate>),
}

impl Predicate {
    /// `column op value`.
    pub fn compare(column: Column, op: CmpOp, value: i64) -> Self {
        Predicate::Compare { column, op, value }
    }

    /// `column = value`.
    pub fn eq(column: Column, value: i64) -> Self {
        Self::compare(column, CmpOp::Eq, value)
    }

    /// `column <> value`.
    pub fn ne(column: Column, value: i64) -> Self {
        Self::compare(column, CmpOp::Ne, value)
    }

    /// `column < value`.
    pub fn lt(column: Column, value: i64) -> Self {
        Self::compare(column, CmpOp::Lt, value)
    }

    /// `column <= value`.
    pub fn le(column: Column, value: i64) -> Self {
        Self::compare(column, CmpOp::Le, value)
    }

    /// `column > value`.
    pub fn gt(column: Column, value: i64) -> Self {
        Self::compare(column, CmpOp::Gt, value)
    }

    /// `column >= value`.
    pub fn ge(column: Column, value: i64) -> Self {
        Self::compare(column, CmpOp::Ge, value)
    }

    /// The row with primary key `id`.
    pub fn id(id: NodeId) -> Self {
        Self::eq(Column::Id, id.0)
    }

    /// Rows whose interval has no room for children.
    pub fn leaf() -> Self {
        Predicate::Offset {
            column: Column::Right,
            other: Column::Left,
            offset: 1,
        }
    }

    /// Rows whose interval lies inside `[left, right]`, bounds included.
    pub fn within(left: i64, right: i64) -> Self {
        Self::ge(Column::Left, left).and(Self::le(Column::Right, right))
    }

    /// Conjunction, flattening nested `And`s and dropping `All`.
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = Vec::new();
        for part in [self, other] {
            match part {
                Predicate::All => {}
                Predicate::And(inner) => parts.extend(inner),
                single => parts.push(single),
            }
        }
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// Evaluates the predicate against an in-memory row.
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Compare { column, op, value } => column
                .value(node)
                .map(|lhs| op.holds(lhs, *value))
                .unwrap_or(false),
            Predicate::Offset {
                column,
                other,
                offset,
            } => match (column.value(node), other.value(node)) {
                (Some(lhs), Some(rhs)) => lhs == rhs + offset,
                _ => false,
            },
            Predicate::And(parts) => parts.iter().all(|part| part.matches(node)),
        }
    }
}

/// Column update applied to every row matched by `update_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// `column = value`
    Set(Column, i64),
    /// `column = column + delta`, evaluated per row by the store. `NULL` stays `NULL`.
    Add(Column, i64),
}

impl Assignment {
    /// Column the assignment writes.
    pub fn column(&self) -> Column {
        match self {
            Assignment::Set(column, _) | Assignment::Add(column, _) => *column,
        }
    }
}

/// Sort key of `find_all`; ties are broken by primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to sort by.
    pub column: Column,
    /// Largest first.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order on `column`.
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    /// Descending order on `column`.
    pub fn desc(column: Column) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Restricts predicates to one forest when forests are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestScope {
    forest: Option<NodeId>,
}

impl ForestScope {
    /// Scope of the forest `node` belongs to.
    pub fn of(config: &TreeConfig, node: &Node) -> Result<Self> {
        if !config.is_multi() {
            return Ok(Self { forest: None });
        }
        match node.tree {
            Some(forest) => Ok(Self {
                forest: Some(forest),
            }),
            None => Err(NestError::store(format!("node {} has no forest id", node.id))),
        }
    }

    /// The whole store, used for store-wide reads.
    pub fn everything() -> Self {
        Self { forest: None }
    }

    /// Forest id the scope is restricted to, if any.
    pub fn forest(&self) -> Option<NodeId> {
        self.forest
    }

    /// Narrows `predicate` to the scope.
    pub fn apply(&self, predicate: Predicate) -> Predicate {
        match self.forest {
            Some(forest) => predicate.and(Predicate::eq(Column::Tree, forest.0)),
            None => predicate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(left: i64, right: i64, tree: Option<i64>) -> Node {
        Node {
            id: NodeId(7),
            left,
            right,
            depth: 0,
            tree: tree.map(NodeId),
            order: None,
            label: String::new(),
        }
    }

    #[test]
    fn and_flattens_and_drops_all() {
        let p = Predicate::All.and(Predicate::ge(Column::Left, 3));
        assert_eq!(p, Predicate::ge(Column::Left, 3));

        let q = Predicate::within(1, 4).and(Predicate::eq(Column::Tree, 2));
        match q {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn null_columns_never_match() {
        let row = node(2, 3, None);
        assert!(!Predicate::eq(Column::Tree, 1).matches(&row));
        assert!(!Predicate::ne(Column::Tree, 1).matches(&row));
        assert!(Predicate::leaf().matches(&row));
        assert!(!Predicate::leaf().matches(&node(2, 5, None)));
    }

    #[test]
    fn scope_requires_forest_id_in_multi_mode() {
        let config = TreeConfig::multi_tree();
        assert!(ForestScope::of(&config, &node(1, 2, None)).is_err());
        let scope = ForestScope::of(&config, &node(1, 2, Some(4))).unwrap();
        assert!(scope.apply(Predicate::All).matches(&node(5, 6, Some(4))));
        assert!(!scope.apply(Predicate::All).matches(&node(5, 6, Some(5))));

        let single = ForestScope::of(&TreeConfig::single_tree(), &node(1, 2, None)).unwrap();
        assert_eq!(single.apply(Predicate::All), Predicate::All);
    }
}
