//! Per-file sync state for one engine run.

use std::collections::HashMap;
use std::sync::Arc;

use strata_graphs::FileExtraction;

use crate::types::FileRecord;

/// Lifecycle of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unseen,
    Parsed,
    /// An event arrived and the file has not been reprocessed yet.
    Stale,
    Deleted,
}

#[derive(Debug, Clone)]
struct Entry {
    state: FileState,
    /// Hash of the last content written to the store.
    hash: Option<String>,
    generation: u64,
    in_flight: bool,
    /// Another event arrived while a job held the file.
    pending: bool,
    extraction: Option<Arc<FileExtraction>>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            state: FileState::Unseen,
            hash: None,
            generation: 0,
            in_flight: false,
            pending: false,
            extraction: None,
        }
    }
}

/// Result of asking to work on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Acquired,
    /// Another job holds the file and will run again for this request.
    Queued,
}

/// File states keyed by store path. Owned by one engine; rebuilt from the
/// store's file records at startup.
#[derive(Debug, Default)]
pub struct FileTracker {
    entries: HashMap<String, Entry>,
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[FileRecord]) -> Self {
        let entries = records
            .iter()
            .map(|r| {
                (
                    r.path.clone(),
                    Entry {
                        state: FileState::Parsed,
                        hash: Some(r.content_hash.clone()),
                        ..Entry::default()
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn state(&self, path: &str) -> FileState {
        self.entries.get(path).map_or(FileState::Unseen, |e| e.state)
    }

    pub fn hash(&self, path: &str) -> Option<&str> {
        self.entries.get(path).and_then(|e| e.hash.as_deref())
    }

    pub fn extraction(&self, path: &str) -> Option<Arc<FileExtraction>> {
        self.entries.get(path).and_then(|e| e.extraction.clone())
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.entries.get(path).is_some_and(|e| e.hash.is_some())
    }

    /// Paths whose content is in the store, sorted.
    pub fn tracked_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.hash.is_some())
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Tracked paths below the directory `dir` (store form, no trailing slash).
    pub fn tracked_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.tracked_paths()
            .into_iter()
            .filter(|p| dir.is_empty() || p.starts_with(&prefix))
            .collect()
    }

    pub fn generation(&self, path: &str) -> u64 {
        self.entries.get(path).map_or(0, |e| e.generation)
    }

    /// Record an event for `path`, superseding any job already working on
    /// an older generation.
    pub fn bump(&mut self, path: &str) -> u64 {
        let entry = self.entries.entry(path.to_string()).or_default();
        entry.generation += 1;
        if entry.state == FileState::Parsed {
            entry.state = FileState::Stale;
        }
        entry.generation
    }

    pub fn claim(&mut self, path: &str) -> Claim {
        let entry = self.entries.entry(path.to_string()).or_default();
        if entry.in_flight {
            entry.pending = true;
            Claim::Queued
        } else {
            entry.in_flight = true;
            Claim::Acquired
        }
    }

    /// Give up a claim. Returns `true` when a queued request needs the
    /// holder to run again; the claim is then kept.
    pub fn release(&mut self, path: &str) -> bool {
        let Some(entry) = self.entries.get_mut(path) else {
            return false;
        };
        if entry.pending {
            entry.pending = false;
            return true;
        }
        entry.in_flight = false;
        false
    }

    /// The content with `hash` is now in the store.
    pub fn record_parsed(&mut self, path: &str, hash: &str, extraction: Option<Arc<FileExtraction>>) {
        let entry = self.entries.entry(path.to_string()).or_default();
        entry.state = FileState::Parsed;
        entry.hash = Some(hash.to_string());
        entry.extraction = extraction;
    }

    /// Content was reread and found identical to what is stored.
    pub fn record_unchanged(&mut self, path: &str) {
        if let Some(entry) = self.entries.get_mut(path) {
            if entry.state == FileState::Stale {
                entry.state = FileState::Parsed;
            }
        }
    }

    pub fn record_deleted(&mut self, path: &str) {
        let entry = self.entries.entry(path.to_string()).or_default();
        entry.state = FileState::Deleted;
        entry.hash = None;
        entry.extraction = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::FileStatus;

    fn record(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: path.into(),
            project: "p".into(),
            language: "python".into(),
            content_hash: hash.into(),
            version: 1,
            status: FileStatus::Parsed,
            diagnostic: None,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn rebuilt_from_store_records() {
        let tracker = FileTracker::from_records(&[record("a.py", "h1"), record("pkg/b.py", "h2")]);
        assert_eq!(tracker.state("a.py"), FileState::Parsed);
        assert_eq!(tracker.hash("pkg/b.py"), Some("h2"));
        assert_eq!(tracker.state("c.py"), FileState::Unseen);
        assert_eq!(tracker.tracked_under("pkg"), vec!["pkg/b.py".to_string()]);
        assert_eq!(tracker.tracked_paths().len(), 2);
    }

    #[test]
    fn lifecycle_moves_through_states() {
        let mut tracker = FileTracker::new();
        assert_eq!(tracker.bump("a.py"), 1);
        tracker.record_parsed("a.py", "h1", None);
        assert_eq!(tracker.state("a.py"), FileState::Parsed);
        tracker.bump("a.py");
        assert_eq!(tracker.state("a.py"), FileState::Stale);
        tracker.record_unchanged("a.py");
        assert_eq!(tracker.state("a.py"), FileState::Parsed);
        tracker.record_deleted("a.py");
        assert_eq!(tracker.state("a.py"), FileState::Deleted);
        assert!(!tracker.is_tracked("a.py"));
        assert_eq!(tracker.generation("a.py"), 2);
    }

    #[test]
    fn claims_serialize_work_per_file() {
        let mut tracker = FileTracker::new();
        assert_eq!(tracker.claim("a.py"), Claim::Acquired);
        assert_eq!(tracker.claim("a.py"), Claim::Queued);
        assert_eq!(tracker.claim("b.py"), Claim::Acquired);
        // The queued request makes the holder run once more.
        assert!(tracker.release("a.py"));
        assert!(!tracker.release("a.py"));
        assert_eq!(tracker.claim("a.py"), Claim::Acquired);
    }

    #[test]
    fn tracked_under_does_not_match_sibling_prefixes() {
        let tracker = FileTracker::from_records(&[record("pkg/a.py", "h"), record("pkg2/b.py", "h")]);
        assert_eq!(tracker.tracked_under("pkg"), vec!["pkg/a.py".to_string()]);
    }
}
