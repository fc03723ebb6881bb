//! SQLite [`RecordStore`] built on `rusqlite`.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{Assignment, Column, OrderBy, Predicate, RecordStore};
use crate::config::TreeConfig;
use crate::error::{NestError, Result};
use crate::model::{Node, NodeDraft, NodeId};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Record store over one SQLite table, laid out by the configured [`crate::config::ColumnMap`].
///
/// Each instance owns one connection. Several stores may open the same file;
/// writers are serialized by SQLite (`BEGIN IMMEDIATE`) and, when they share
/// a [`crate::engine::ForestLocks`] registry, by forest.
pub struct SqliteStore {
    conn: Connection,
    config: TreeConfig,
    select: String,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the node table exists.
    pub fn open(path: impl AsRef<Path>, config: &TreeConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn, config)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(config: &TreeConfig) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    fn from_connection(conn: Connection, config: &TreeConfig) -> Result<Self> {
        config.validate()?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mut store = Self {
            conn,
            config: config.clone(),
            select: String::new(),
        };
        store.select = store.select_clause()?;
        store.create_schema()?;
        Ok(store)
    }

    fn tree_enabled(&self) -> bool {
        self.config.is_multi()
    }

    fn order_enabled(&self) -> bool {
        self.config.ranking
    }

    fn quoted(&self, column: Column) -> Result<String> {
        match column {
            Column::Tree if !self.tree_enabled() => Err(NestError::Configuration(
                "tree column used while forests are disabled".into(),
            )),
            Column::Order if !self.order_enabled() => Err(NestError::Configuration(
                "order column used while ranking is disabled".into(),
            )),
            _ => Ok(quote_ident(self.config.columns.name(column)?)),
        }
    }

    fn table(&self) -> String {
        quote_ident(&self.config.columns.table)
    }

    fn select_clause(&self) -> Result<String> {
        let columns = &self.config.columns;
        let tree = if self.tree_enabled() {
            self.quoted(Column::Tree)?
        } else {
            "NULL".to_string()
        };
        let order = if self.order_enabled() {
            self.quoted(Column::Order)?
        } else {
            "NULL".to_string()
        };
        Ok(format!(
            "SELECT {}, {}, {}, {}, {tree}, {order}, {} FROM {}",
            quote_ident(&columns.id),
            quote_ident(&columns.left),
            quote_ident(&columns.right),
            quote_ident(&columns.depth),
            quote_ident(&columns.label),
            self.table(),
        ))
    }

    fn create_schema(&self) -> Result<()> {
        let columns = &self.config.columns;
        let table = self.table();
        let left = quote_ident(&columns.left);
        let right = quote_ident(&columns.right);
        let mut defs = vec![
            format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(&columns.id)),
            format!("{left} INTEGER NOT NULL"),
            format!("{right} INTEGER NOT NULL"),
            format!("{} INTEGER NOT NULL", quote_ident(&columns.depth)),
        ];
        if self.tree_enabled() {
            defs.push(format!("{} INTEGER", self.quoted(Column::Tree)?));
        }
        if self.order_enabled() {
            defs.push(format!("{} INTEGER", self.quoted(Column::Order)?));
        }
        defs.push(format!(
            "{} TEXT NOT NULL DEFAULT ''",
            quote_ident(&columns.label)
        ));

        let scope = if self.tree_enabled() {
            format!("{}, ", self.quoted(Column::Tree)?)
        } else {
            String::new()
        };
        let raw_table = &columns.table;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} ({defs});
             CREATE INDEX IF NOT EXISTS {left_idx} ON {table} ({scope}{left});
             CREATE INDEX IF NOT EXISTS {right_idx} ON {table} ({scope}{right});",
            defs = defs.join(", "),
            left_idx = quote_ident(&format!("{raw_table}_left_idx")),
            right_idx = quote_ident(&format!("{raw_table}_right_idx")),
        ))?;
        Ok(())
    }

    fn render(&self, predicate: &Predicate, sql: &mut String, params: &mut Vec<Value>) -> Result<()> {
        match predicate {
            Predicate::All => sql.push('1'),
            Predicate::Compare { column, op, value } => {
                sql.push_str(&format!("{} {} ?", self.quoted(*column)?, op.sql()));
                params.push(Value::Integer(*value));
            }
            Predicate::Offset {
                column,
                other,
                offset,
            } => {
                sql.push_str(&format!(
                    "{} = {} + ?",
                    self.quoted(*column)?,
                    self.quoted(*other)?
                ));
                params.push(Value::Integer(*offset));
            }
            Predicate::And(parts) if parts.is_empty() => sql.push('1'),
            Predicate::And(parts) => {
                sql.push('(');
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        sql.push_str(" AND ");
                    }
                    self.render(part, sql, params)?;
                }
                sql.push(')');
            }
        }
        Ok(())
    }

    fn order_clause(&self, order: &[OrderBy]) -> Result<String> {
        let mut keys = Vec::with_capacity(order.len() + 1);
        for key in order {
            let direction = if key.descending { "DESC" } else { "ASC" };
            keys.push(format!("{} {direction}", self.quoted(key.column)?));
        }
        keys.push(format!("{} ASC", self.quoted(Column::Id)?));
        Ok(format!(" ORDER BY {}", keys.join(", ")))
    }

    fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), node_from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: NodeId(row.get(0)?),
        left: row.get(1)?,
        right: row.get(2)?,
        depth: row.get(3)?,
        tree: row.get::<_, Option<i64>>(4)?.map(NodeId),
        order: row.get(5)?,
        label: row.get(6)?,
    })
}

impl RecordStore for SqliteStore {
    fn find_one(&self, predicate: &Predicate) -> Result<Option<Node>> {
        let mut sql = format!("{} WHERE ", self.select);
        let mut params = Vec::new();
        self.render(predicate, &mut sql, &mut params)?;
        sql.push_str(&self.order_clause(&[])?);
        sql.push_str(" LIMIT 1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let node = stmt
            .query_row(params_from_iter(params.iter()), node_from_row)
            .optional()?;
        Ok(node)
    }

    fn find_all(&self, predicate: &Predicate, order: &[OrderBy]) -> Result<Vec<Node>> {
        let mut sql = format!("{} WHERE ", self.select);
        let mut params = Vec::new();
        self.render(predicate, &mut sql, &mut params)?;
        sql.push_str(&self.order_clause(order)?);
        self.query(&sql, params)
    }

    fn insert(&mut self, draft: NodeDraft) -> Result<Node> {
        let columns = &self.config.columns;
        let mut names = vec![
            quote_ident(&columns.left),
            quote_ident(&columns.right),
            quote_ident(&columns.depth),
            quote_ident(&columns.label),
        ];
        let mut values = vec![
            Value::Integer(draft.left),
            Value::Integer(draft.right),
            Value::Integer(draft.depth),
            Value::Text(draft.label.clone()),
        ];
        if self.tree_enabled() {
            names.push(self.quoted(Column::Tree)?);
            values.push(draft.tree.map_or(Value::Null, |id| Value::Integer(id.0)));
        }
        if self.order_enabled() {
            names.push(self.quoted(Column::Order)?);
            values.push(draft.order.map_or(Value::Null, Value::Integer));
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.table(),
            names.join(", ")
        );
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(values.iter()))?;
        let id = NodeId(self.conn.last_insert_rowid());
        Ok(Node {
            id,
            left: draft.left,
            right: draft.right,
            depth: draft.depth,
            tree: draft.tree.filter(|_| self.tree_enabled()),
            order: draft.order.filter(|_| self.order_enabled()),
            label: draft.label,
        })
    }

    fn update_all(&mut self, predicate: &Predicate, assignments: &[Assignment]) -> Result<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let mut params = Vec::new();
        let mut sets = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            if assignment.column() == Column::Id {
                return Err(NestError::store("primary key cannot be reassigned"));
            }
            let column = self.quoted(assignment.column())?;
            match *assignment {
                Assignment::Set(_, value) => {
                    sets.push(format!("{column} = ?"));
                    params.push(Value::Integer(value));
                }
                Assignment::Add(_, delta) => {
                    sets.push(format!("{column} = {column} + ?"));
                    params.push(Value::Integer(delta));
                }
            }
        }
        let mut sql = format!("UPDATE {} SET {} WHERE ", self.table(), sets.join(", "));
        self.render(predicate, &mut sql, &mut params)?;
        let rows = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(params.iter()))?;
        debug!(rows, sql = %sql, "sqlite update");
        Ok(rows)
    }

    fn delete_all(&mut self, predicate: &Predicate) -> Result<usize> {
        let mut sql = format!("DELETE FROM {} WHERE ", self.table());
        let mut params = Vec::new();
        self.render(predicate, &mut sql, &mut params)?;
        let rows = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(params.iter()))?;
        Ok(rows)
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn count(&self, predicate: &Predicate) -> Result<usize> {
        let mut sql = format!("SELECT COUNT(*) FROM {} WHERE ", self.table());
        let mut params = Vec::new();
        self.render(predicate, &mut sql, &mut params)?;
        let count: i64 = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }
}
