use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NestError, Result};
use crate::store::Column;

/// Whether the store holds one tree or a forest of independent trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeMode {
    /// Exactly one root may ever exist; no forest id column.
    #[default]
    Single,
    /// Every root starts its own forest, identified by the root's id.
    Multi,
}

/// Storage column names for each node attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    /// Node table.
    pub table: String,
    /// Primary key column.
    pub id: String,
    /// Left bound column.
    pub left: String,
    /// Right bound column.
    pub right: String,
    /// Depth column.
    pub depth: String,
    /// Forest id column; required in multi-tree mode.
    pub tree: Option<String>,
    /// Root rank column; required when ranking is on.
    pub order: Option<String>,
    /// Label column.
    pub label: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            table: "nodes".into(),
            id: "id".into(),
            left: "lft".into(),
            right: "rgt".into(),
            depth: "depth".into(),
            tree: Some("tree".into()),
            order: Some("order_num".into()),
            label: "name".into(),
        }
    }
}

impl ColumnMap {
    /// Resolves the storage name of `column`.
    pub fn name(&self, column: Column) -> Result<&str> {
        let name = match column {
            Column::Id => self.id.as_str(),
            Column::Left => self.left.as_str(),
            Column::Right => self.right.as_str(),
            Column::Depth => self.depth.as_str(),
            Column::Tree => self
                .tree
                .as_deref()
                .ok_or_else(|| NestError::Configuration("no tree column mapped".into()))?,
            Column::Order => self
                .order
                .as_deref()
                .ok_or_else(|| NestError::Configuration("no order column mapped".into()))?,
        };
        Ok(name)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Single tree or forest of trees.
    pub mode: TreeMode,
    /// Keep a contiguous sibling rank across forest roots.
    pub ranking: bool,
    /// Storage column names.
    pub columns: ColumnMap,
}

impl TreeConfig {
    /// One tree per store.
    pub fn single_tree() -> Self {
        Self {
            mode: TreeMode::Single,
            ranking: false,
            columns: ColumnMap::default(),
        }
    }

    /// Independent forests without root ranking.
    pub fn multi_tree() -> Self {
        Self {
            mode: TreeMode::Multi,
            ranking: false,
            columns: ColumnMap::default(),
        }
    }

    /// Multi-tree mode with root sibling ranking.
    pub fn ranked_forest() -> Self {
        Self {
            mode: TreeMode::Multi,
            ranking: true,
            columns: ColumnMap::default(),
        }
    }

    /// Whether every root starts its own forest.
    pub fn is_multi(&self) -> bool {
        self.mode == TreeMode::Multi
    }

    /// Parses a TOML document and validates it.
    ///
    /// ```toml
    /// mode = "multi"
    /// ranking = true
    ///
    /// [columns]
    /// table = "categories"
    /// left = "lft"
    /// right = "rgt"
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: TreeConfig = toml::from_str(contents)
            .map_err(|err| NestError::Configuration(format!("invalid config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            NestError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|err| NestError::Configuration(format!("failed to serialize config: {err}")))
    }

    /// Checks that every attribute the selected mode needs is mapped.
    pub fn validate(&self) -> Result<()> {
        let columns = &self.columns;
        let mut required = vec![
            ("table", columns.table.as_str()),
            ("id", columns.id.as_str()),
            ("left", columns.left.as_str()),
            ("right", columns.right.as_str()),
            ("depth", columns.depth.as_str()),
            ("label", columns.label.as_str()),
        ];
        if self.is_multi() {
            match columns.tree.as_deref() {
                Some(tree) => required.push(("tree", tree)),
                None => {
                    return Err(NestError::Configuration(
                        "multi-tree mode requires a tree column".into(),
                    ))
                }
            }
        }
        if self.ranking {
            if !self.is_multi() {
                return Err(NestError::Configuration(
                    "root ranking requires multi-tree mode".into(),
                ));
            }
            match columns.order.as_deref() {
                Some(order) => required.push(("order", order)),
                None => {
                    return Err(NestError::Configuration(
                        "root ranking requires an order column".into(),
                    ))
                }
            }
        }

        for (attribute, name) in &required {
            if name.trim().is_empty() {
                return Err(NestError::Configuration(format!(
                    "{attribute} column is not mapped"
                )));
            }
        }
        // table name lives in its own namespace
        for (idx, (attribute, name)) in required.iter().enumerate().skip(1) {
            if let Some((other, _)) = required[idx + 1..].iter().find(|(_, n)| n == name) {
                return Err(NestError::Configuration(format!(
                    "{attribute} and {other} columns both map to {name:?}"
                )));
            }
        }
        Ok(())
    }
}
