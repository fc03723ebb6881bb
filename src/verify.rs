//! Structural verification of stored forests.
//!
//! [`verify`] reads every row once and checks the interval invariants the
//! engine maintains. It never writes. Problems are reported as findings
//! instead of errors so one run surfaces as much damage as possible.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::TreeConfig;
use crate::error::Result;
use crate::model::{Node, NodeId};
use crate::store::{Column, OrderBy, Predicate, RecordStore};

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Data the engine ignores but did not write.
    Warning,
    /// A broken invariant; mutations on the affected forest are unsafe.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Forest the finding belongs to, when forests are enabled.
    pub forest: Option<NodeId>,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected during verification.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Total number of rows read.
    pub nodes_found: u64,
    /// Number of distinct forests.
    pub forests_found: u64,
    /// Number of rows without children.
    pub leaves_found: u64,
    /// Deepest depth value seen.
    pub max_depth: i64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether verification found no errors. Warnings do not fail a run.
    pub success: bool,
    /// Issues discovered, capped at 32 entries.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the rows examined.
    pub counts: VerifyCounts,
}

impl VerifyReport {
    /// Findings of `Error` severity.
    pub fn errors(&self) -> impl Iterator<Item = &VerifyFinding> {
        self.findings
            .iter()
            .filter(|f| f.severity == VerifySeverity::Error)
    }
}

#[derive(Default)]
struct Findings {
    items: Vec<VerifyFinding>,
    errors: usize,
}

impl Findings {
    fn push(&mut self, severity: VerifySeverity, forest: Option<NodeId>, message: String) {
        if severity == VerifySeverity::Error {
            self.errors += 1;
        }
        if self.items.len() < MAX_FINDINGS {
            self.items.push(VerifyFinding {
                severity,
                forest,
                message,
            });
        }
    }

    fn error(&mut self, forest: Option<NodeId>, message: impl Into<String>) {
        self.push(VerifySeverity::Error, forest, message.into());
    }

    fn warning(&mut self, forest: Option<NodeId>, message: impl Into<String>) {
        self.push(VerifySeverity::Warning, forest, message.into());
    }
}

/// Verifies every forest in `store`.
///
/// Checks performed per forest:
///
/// - `left < right` for every node
/// - exactly one root (`left == 1`), carrying its own id as forest id
/// - bounds cover `1..=2n` exactly once for `n` nodes
/// - intervals nest without partial overlap
/// - depth equals the number of enclosing intervals
/// - with ranking, root ranks are `1..=R` and every node carries its root's rank
///
/// # Errors
///
/// Returns an error only if the store cannot be read.
pub fn verify<S: RecordStore + ?Sized>(store: &S, config: &TreeConfig) -> Result<VerifyReport> {
    let order: &[OrderBy] = if config.is_multi() {
        &[OrderBy::asc(Column::Tree), OrderBy::asc(Column::Left)]
    } else {
        &[OrderBy::asc(Column::Left)]
    };
    let rows = store.find_all(&Predicate::All, order)?;

    let mut findings = Findings::default();
    let mut counts = VerifyCounts {
        nodes_found: rows.len() as u64,
        ..VerifyCounts::default()
    };

    let mut forests: BTreeMap<Option<NodeId>, Vec<Node>> = BTreeMap::new();
    for node in rows {
        if node.is_leaf() {
            counts.leaves_found += 1;
        }
        counts.max_depth = counts.max_depth.max(node.depth);
        if node.left >= node.right {
            findings.error(
                node.tree,
                format!(
                    "node {} has left bound {} not below right bound {}",
                    node.id, node.left, node.right
                ),
            );
        }
        if !config.is_multi() && node.tree.is_some() {
            findings.warning(
                None,
                format!("node {} carries a forest id in single-tree mode", node.id),
            );
        }
        let key = if config.is_multi() { node.tree } else { None };
        forests.entry(key).or_default().push(node);
    }
    counts.forests_found = forests.len() as u64;

    let mut roots = Vec::new();
    for (forest, nodes) in &forests {
        if config.is_multi() && forest.is_none() {
            findings.error(None, format!("{} nodes have no forest id", nodes.len()));
            continue;
        }
        if let Some(root) = check_forest(*forest, nodes, config, &mut findings) {
            roots.push(root);
        }
    }

    if config.ranking {
        check_ranks(&roots, &forests, &mut findings);
    }

    Ok(VerifyReport {
        success: findings.errors == 0,
        findings: findings.items,
        counts,
    })
}

/// Checks one forest sorted by left bound; returns its root when there is exactly one.
fn check_forest<'a>(
    forest: Option<NodeId>,
    nodes: &'a [Node],
    config: &TreeConfig,
    findings: &mut Findings,
) -> Option<&'a Node> {
    let roots: Vec<&Node> = nodes.iter().filter(|n| n.is_root()).collect();
    let root = match roots.as_slice() {
        [root] => Some(*root),
        [] => {
            findings.error(forest, "forest has no root");
            None
        }
        many => {
            let ids: Vec<String> = many.iter().map(|n| n.id.to_string()).collect();
            findings.error(forest, format!("forest has {} roots: {}", many.len(), ids.join(", ")));
            None
        }
    };
    if let (Some(root), true) = (root, config.is_multi()) {
        if root.tree != Some(root.id) {
            findings.error(
                forest,
                format!("root {} does not carry its own id as forest id", root.id),
            );
        }
    }

    let mut bounds: Vec<i64> = nodes.iter().flat_map(|n| [n.left, n.right]).collect();
    bounds.sort_unstable();
    if let Some(position) = bounds
        .iter()
        .zip(1..)
        .position(|(bound, expected)| *bound != expected)
    {
        findings.error(
            forest,
            format!(
                "bounds are not contiguous: expected {}, found {}",
                position + 1,
                bounds[position]
            ),
        );
    }

    let mut stack: Vec<&Node> = Vec::new();
    for node in nodes {
        while stack.last().is_some_and(|open| open.right < node.left) {
            stack.pop();
        }
        match stack.last() {
            Some(parent) => {
                if node.right >= parent.right {
                    findings.error(
                        forest,
                        format!(
                            "node {} [{}, {}] partially overlaps node {} [{}, {}]",
                            node.id, node.left, node.right, parent.id, parent.left, parent.right
                        ),
                    );
                } else if node.depth != parent.depth + 1 {
                    findings.error(
                        forest,
                        format!(
                            "node {} has depth {}, parent {} has depth {}",
                            node.id, node.depth, parent.id, parent.depth
                        ),
                    );
                }
            }
            None if node.depth != 0 => findings.error(
                forest,
                format!("top-level node {} has depth {}", node.id, node.depth),
            ),
            None => {}
        }
        stack.push(node);
    }

    root
}

fn check_ranks(
    roots: &[&Node],
    forests: &BTreeMap<Option<NodeId>, Vec<Node>>,
    findings: &mut Findings,
) {
    let mut ranks: Vec<(i64, NodeId)> = Vec::with_capacity(roots.len());
    for root in roots {
        match root.order {
            Some(rank) => ranks.push((rank, root.id)),
            None => findings.error(root.tree, format!("root {} has no rank", root.id)),
        }
    }
    ranks.sort_unstable();
    for (expected, (rank, id)) in (1..).zip(&ranks) {
        if *rank != expected {
            findings.error(
                Some(*id),
                format!("root {id} has rank {rank}, expected {expected}"),
            );
            break;
        }
    }

    for root in roots {
        let Some(nodes) = forests.get(&root.tree) else {
            continue;
        };
        if let Some(stray) = nodes.iter().find(|n| n.order != root.order) {
            findings.error(
                root.tree,
                format!(
                    "node {} has rank {:?}, its root {} has {:?}",
                    stray.id, stray.order, root.id, root.order
                ),
            );
        }
    }
}
