//! Grammar adapters and the entity extractor for the Strata code graph.
//!
//! A [`LanguageSupport`] wraps one tree-sitter grammar and classifies its
//! node kinds; [`extract::extract_source`] walks the resulting tree and
//! produces a language-neutral [`ir::FileExtraction`] whose entity keys
//! come from the [`identity`] module.

pub mod adapter;
pub mod extract;
pub mod identity;
pub mod ir;
pub mod languages;

use serde::{Deserialize, Serialize};

pub use extract::{ExtractOutcome, SourceUnit, extract_source};
pub use ir::{
    EntityDecl, EntityKind, FileExtraction, ImportSpec, Receiver, RefHint, RelationFact,
    RelationKind, Target,
};
pub use languages::{LanguageRegistry, LanguageSupport};

/// Error type for the graph engine.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ── Span type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl From<tree_sitter::Range> for TextRange {
    fn from(r: tree_sitter::Range) -> Self {
        Self {
            start_byte: r.start_byte,
            end_byte: r.end_byte,
            start_row: r.start_point.row,
            start_col: r.start_point.column,
            end_row: r.end_point.row,
            end_col: r.end_point.column,
        }
    }
}

impl TextRange {
    /// 1-based first line, as shown to users.
    pub fn line(&self) -> usize {
        self.start_row + 1
    }
}
