use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_graphs::{EntityKind, FileExtraction, RefHint, RelationKind};

// ── Node types ─────────────────────────────────────────────────────

/// Every node in the code graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An ingestion project grouping one or more roots.
    Project,
    /// A source file under a root.
    File,
    /// The module or namespace a file declares.
    Module,
    /// Classes, structs, enums, traits, interfaces, records.
    Class,
    /// Functions, methods, constructors, lambdas.
    Function,
    /// Module- and class-level variables, fields, constants.
    Variable,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::File => "file",
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Variable => "variable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(Self::Project),
            "file" => Some(Self::File),
            other => EntityKind::parse(other).map(Self::from),
        }
    }

    /// Whether nodes of this kind come from an extractor batch.
    pub fn is_entity(&self) -> bool {
        !matches!(self, Self::Project | Self::File)
    }
}

impl From<EntityKind> for NodeKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Module => Self::Module,
            EntityKind::Class => Self::Class,
            EntityKind::Function => Self::Function,
            EntityKind::Variable => Self::Variable,
        }
    }
}

/// A stored graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub key: String,
    pub kind: NodeKind,
    pub name: String,
    pub qualified_name: String,
    /// Owning file; `None` for project nodes.
    pub file_path: Option<String>,
    /// Key of the `CONTAINS` parent; `None` for project nodes.
    pub parent_key: Option<String>,
    pub language: Option<String>,
    /// 1-based source rows.
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub arity: Option<u32>,
    pub enclosing_type: Option<String>,
    /// Supertypes as written in the declaration.
    pub supertypes: Vec<String>,
    pub anonymous: bool,
}

// ── Edge types ─────────────────────────────────────────────────────

/// Resolution state of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    /// The target key is known and present.
    Resolved,
    /// The target is unknown; the hint is retained for the resolver.
    Unresolved,
    /// The target will never be found in the graph (builtins).
    Unresolvable,
}

impl EdgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
            Self::Unresolvable => "unresolvable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resolved" => Some(Self::Resolved),
            "unresolved" => Some(Self::Unresolved),
            "unresolvable" => Some(Self::Unresolvable),
            _ => None,
        }
    }
}

/// Which component last wrote an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrigin {
    Extractor,
    Resolver,
    Store,
}

impl EdgeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extractor => "extractor",
            Self::Resolver => "resolver",
            Self::Store => "store",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extractor" => Some(Self::Extractor),
            "resolver" => Some(Self::Resolver),
            "store" => Some(Self::Store),
            _ => None,
        }
    }
}

/// A stored directed edge, unique by `identity_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub identity_key: String,
    pub kind: RelationKind,
    pub source_key: String,
    pub target_key: Option<String>,
    pub state: EdgeState,
    pub hint: Option<RefHint>,
    /// File whose batch owns this edge.
    pub owner_file: String,
    pub origin: EdgeOrigin,
    pub confidence: f64,
    pub line: u32,
    pub occurrences: u32,
}

// ── Files ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Parsed,
    ParseError,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::ParseError => "parse_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parsed" => Some(Self::Parsed),
            "parse_error" => Some(Self::ParseError),
            _ => None,
        }
    }
}

/// Last successfully processed version of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub project: String,
    pub language: String,
    /// SHA-256 of the content, lowercase hex.
    pub content_hash: String,
    /// Incremented each time a different content hash is applied.
    pub version: u64,
    pub status: FileStatus,
    pub diagnostic: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// One file's extraction, ready to be merged into the graph.
#[derive(Debug, Clone)]
pub struct FileBatch {
    pub project: String,
    pub content_hash: String,
    pub status: FileStatus,
    pub diagnostic: Option<String>,
    pub extraction: FileExtraction,
}

impl FileBatch {
    pub fn path(&self) -> &str {
        &self.extraction.path
    }

    pub fn language(&self) -> &str {
        &self.extraction.language
    }
}

/// What a file batch, deletion or relocation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// File version after the write.
    pub version: u64,
    /// Whether the content hash differed from the stored one.
    pub content_changed: bool,
    pub nodes_written: u64,
    pub edges_written: u64,
    pub nodes_removed: u64,
    pub edges_removed: u64,
    /// Inbound edges from other files turned back into unresolved edges.
    pub edges_demoted: u64,
    /// Inbound edges from other files moved onto relocated keys.
    pub edges_repointed: u64,
}

// ── Resolution ─────────────────────────────────────────────────────

/// A resolver conclusion for one unresolved edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub identity_key: String,
    /// `Some` upgrades to resolved, `None` marks the edge unresolvable.
    pub target_key: Option<String>,
    pub confidence: f64,
    /// Content hash of the owning file when the conclusion was drawn.
    /// The store ignores the resolution once the file has changed.
    pub owner_hash: String,
}

/// A derived method override: `method` overrides `overridden`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverridePair {
    pub method: String,
    pub overridden: String,
    pub owner_file: String,
}

// ── Queries ────────────────────────────────────────────────────────

/// Filter for node lookups; unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFilter {
    pub kind: Option<NodeKind>,
    pub file_path: Option<String>,
    pub name: Option<String>,
    pub qualified_name: Option<String>,
    pub limit: Option<u32>,
}

/// Filter for edge lookups; unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeFilter {
    pub kind: Option<RelationKind>,
    pub state: Option<EdgeState>,
    pub owner_file: Option<String>,
    pub source_key: Option<String>,
    pub target_key: Option<String>,
}

/// Aggregate counts over the stored graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub projects: u64,
    pub files: u64,
    pub parse_errors: u64,
    pub total_nodes: u64,
    pub total_edges: u64,
    pub unresolved_edges: u64,
    pub unresolvable_edges: u64,
    pub nodes_by_kind: HashMap<String, u64>,
    pub edges_by_kind: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kinds_cover_entity_kinds() {
        for kind in [
            EntityKind::Module,
            EntityKind::Class,
            EntityKind::Function,
            EntityKind::Variable,
        ] {
            let node = NodeKind::from(kind);
            assert!(node.is_entity());
            assert_eq!(node.as_str(), kind.as_str());
            assert_eq!(NodeKind::parse(node.as_str()), Some(node));
        }
        assert_eq!(NodeKind::parse("file"), Some(NodeKind::File));
        assert!(!NodeKind::Project.is_entity());
    }

    #[test]
    fn states_and_statuses_parse_their_own_names() {
        for state in [EdgeState::Resolved, EdgeState::Unresolved, EdgeState::Unresolvable] {
            assert_eq!(EdgeState::parse(state.as_str()), Some(state));
        }
        for origin in [EdgeOrigin::Extractor, EdgeOrigin::Resolver, EdgeOrigin::Store] {
            assert_eq!(EdgeOrigin::parse(origin.as_str()), Some(origin));
        }
        assert_eq!(FileStatus::parse("parse_error"), Some(FileStatus::ParseError));
        assert_eq!(FileStatus::parse("bogus"), None);
    }
}
