//! Structural invariant checks over a stored graph.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use strata_graphs::RelationKind;
use tracing::{info, instrument};

use crate::store::GraphStore;
use crate::types::{EdgeFilter, EdgeRecord, EdgeState, NodeFilter, NodeKind, NodeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A non-project node has no `CONTAINS` parent.
    Orphan,
    /// A node has more than one `CONTAINS` parent.
    MultipleParents,
    /// The stored parent key disagrees with the `CONTAINS` edge.
    ParentMismatch,
    /// The containment graph has a cycle through this node.
    ContainmentCycle,
    /// A resolved edge points at a node that does not exist.
    DanglingTarget,
    /// Edge state and target key disagree.
    StateMismatch,
    /// An unresolved reference edge lost its hint.
    MissingHint,
    /// File node and file record disagree.
    FileRecordMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub subject: String,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.kind, self.subject, self.detail)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub nodes: u64,
    pub edges: u64,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, kind: ViolationKind, subject: &str, detail: impl Into<String>) {
        self.violations.push(Violation {
            kind,
            subject: subject.to_string(),
            detail: detail.into(),
        });
    }
}

/// Load the whole graph and check its invariants.
#[instrument(skip_all)]
pub async fn verify(store: &dyn GraphStore) -> crate::error::Result<VerifyReport> {
    let nodes = store.find_nodes(&NodeFilter::default()).await?;
    let edges = store.find_edges(&EdgeFilter::default()).await?;
    let files: HashSet<String> = store
        .file_records()
        .await?
        .into_iter()
        .map(|r| r.path)
        .collect();
    let report = check(&nodes, &edges, &files);
    info!(
        nodes = report.nodes,
        edges = report.edges,
        violations = report.violations.len(),
        "Verification complete"
    );
    Ok(report)
}

/// Invariant checks over an in-memory snapshot.
pub fn check(nodes: &[NodeRecord], edges: &[EdgeRecord], files: &HashSet<String>) -> VerifyReport {
    let mut report = VerifyReport {
        nodes: nodes.len() as u64,
        edges: edges.len() as u64,
        violations: Vec::new(),
    };
    let by_key: HashMap<&str, &NodeRecord> = nodes.iter().map(|n| (n.key.as_str(), n)).collect();

    check_containment(nodes, edges, &by_key, &mut report);

    for edge in edges {
        match (edge.state, edge.target_key.as_deref()) {
            (EdgeState::Resolved, Some(target)) if !by_key.contains_key(target) => report.push(
                ViolationKind::DanglingTarget,
                &edge.identity_key,
                format!("target {target} does not exist"),
            ),
            (EdgeState::Resolved, None) => report.push(
                ViolationKind::StateMismatch,
                &edge.identity_key,
                "resolved edge without target",
            ),
            (EdgeState::Unresolved | EdgeState::Unresolvable, Some(target)) => report.push(
                ViolationKind::StateMismatch,
                &edge.identity_key,
                format!("{} edge still points at {target}", edge.state.as_str()),
            ),
            (EdgeState::Unresolved | EdgeState::Unresolvable, None) if edge.hint.is_none() => {
                report.push(ViolationKind::MissingHint, &edge.identity_key, "no hint retained");
            }
            _ => {}
        }
    }

    for node in nodes.iter().filter(|n| n.kind == NodeKind::File) {
        if !files.contains(&node.key) {
            report.push(
                ViolationKind::FileRecordMismatch,
                &node.key,
                "file node without file record",
            );
        }
    }
    for path in files {
        if !by_key.contains_key(path.as_str()) {
            report.push(
                ViolationKind::FileRecordMismatch,
                path,
                "file record without file node",
            );
        }
    }
    report
}

fn check_containment(
    nodes: &[NodeRecord],
    edges: &[EdgeRecord],
    by_key: &HashMap<&str, &NodeRecord>,
    report: &mut VerifyReport,
) {
    let mut graph = DiGraph::<&str, ()>::with_capacity(nodes.len(), edges.len());
    let index: HashMap<&str, NodeIndex> = nodes
        .iter()
        .map(|n| (n.key.as_str(), graph.add_node(n.key.as_str())))
        .collect();

    let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges.iter().filter(|e| e.kind == RelationKind::Contains) {
        let Some(target) = edge.target_key.as_deref() else {
            continue;
        };
        parents.entry(target).or_default().push(edge.source_key.as_str());
        if let (Some(&s), Some(&t)) = (index.get(edge.source_key.as_str()), index.get(target)) {
            graph.add_edge(s, t, ());
        }
    }

    for node in nodes.iter().filter(|n| n.kind != NodeKind::Project) {
        match parents.get(node.key.as_str()).map(Vec::as_slice) {
            None | Some([]) => report.push(ViolationKind::Orphan, &node.key, "no CONTAINS parent"),
            Some([parent]) => {
                if node.parent_key.as_deref() != Some(*parent) {
                    report.push(
                        ViolationKind::ParentMismatch,
                        &node.key,
                        format!(
                            "parent_key {:?} but contained by {parent}",
                            node.parent_key.as_deref().unwrap_or("")
                        ),
                    );
                }
                if !by_key.contains_key(parent) {
                    report.push(
                        ViolationKind::Orphan,
                        &node.key,
                        format!("parent {parent} does not exist"),
                    );
                }
            }
            Some(many) => report.push(
                ViolationKind::MultipleParents,
                &node.key,
                many.join(", "),
            ),
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        let key = graph[cycle.node_id()];
        report.push(ViolationKind::ContainmentCycle, key, "containment cycle");
    }
}
