//! Per-file faults and the report of a sync batch.

use std::fmt;

use serde::Serialize;

use crate::resolve::ResolveReport;

/// Why one file could not be (fully) integrated. Never fatal to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Recognized source extension with no enabled grammar; skipped.
    UnsupportedLanguage,
    /// Integrated with an empty extraction.
    ParseError,
    /// Batch rejected; the stored state of the file is unchanged.
    ExtractionInconsistency,
    /// Write failed after retries; the file is parked until recovery.
    BackendUnavailable,
    /// The store refused the write outright. Stored state is unchanged and
    /// the next event or scan for the file tries again.
    WriteRejected,
    /// The file could not be read.
    Io,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage => "unsupported_language",
            Self::ParseError => "parse_error",
            Self::ExtractionInconsistency => "extraction_inconsistency",
            Self::BackendUnavailable => "backend_unavailable",
            Self::WriteRejected => "write_rejected",
            Self::Io => "io",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFault {
    pub path: String,
    pub kind: FaultKind,
    pub message: String,
}

impl FileFault {
    pub fn new(path: &str, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FileFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.kind.as_str(), self.message)
    }
}

/// What a sync batch (or the initial scan) did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Files whose new content was written.
    pub processed: u64,
    /// Files whose content hash matched the stored one.
    pub unchanged: u64,
    pub deleted: u64,
    /// Renames applied by re-keying stored content.
    pub relocated: u64,
    /// Files skipped by ignore rules or size limits.
    pub skipped: u64,
    /// Files held back while the backend is unavailable.
    pub parked: u64,
    pub faults: Vec<FileFault>,
    pub resolve: Option<ResolveReport>,
}

impl SyncReport {
    /// No file faulted. Parse errors count as faults.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn faults_of(&self, kind: FaultKind) -> impl Iterator<Item = &FileFault> {
        self.faults.iter().filter(move |f| f.kind == kind)
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.processed += other.processed;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.relocated += other.relocated;
        self.skipped += other.skipped;
        self.parked += other.parked;
        self.faults.extend(other.faults);
        if other.resolve.is_some() {
            self.resolve = other.resolve;
        }
    }
}
