//! Filesystem change events and their per-path coalescing.

use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    /// The path was moved here from `from`.
    Renamed { from: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EventKind::Created,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EventKind::Modified,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EventKind::Deleted,
        }
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            path: to.into(),
            kind: EventKind::Renamed { from: from.into() },
        }
    }
}

/// Events collected over one debounce window, reduced to at most one
/// event per path:
///
/// - create then delete is a delete;
/// - delete then create is a modify;
/// - a rename of a renamed path keeps the original source;
/// - anything after a create stays a create.
#[derive(Debug, Default)]
pub struct EventQueue {
    order: Vec<PathBuf>,
    pending: HashMap<PathBuf, EventKind>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, event: FileEvent) {
        let FileEvent { path, kind } = event;
        let merged = match (self.pending.remove(&path), kind) {
            (None, kind) => kind,
            (Some(EventKind::Created), EventKind::Modified) => EventKind::Created,
            (Some(EventKind::Deleted), EventKind::Created | EventKind::Modified) => {
                EventKind::Modified
            }
            (Some(EventKind::Renamed { from }), EventKind::Modified) => EventKind::Renamed { from },
            (Some(EventKind::Renamed { from }), EventKind::Deleted) => {
                // The moved file is gone: both paths end up deleted.
                self.insert(from, EventKind::Deleted);
                EventKind::Deleted
            }
            (Some(_), kind) => kind,
        };

        let merged = match merged {
            EventKind::Renamed { from } => self.chain_rename(from),
            other => other,
        };
        self.insert(path, merged);
    }

    /// Collapse `a → b` followed by `b → c` into `a → c`.
    fn chain_rename(&mut self, from: PathBuf) -> EventKind {
        match self.pending.remove(&from) {
            Some(EventKind::Renamed { from: origin }) => EventKind::Renamed { from: origin },
            Some(EventKind::Created) => EventKind::Created,
            _ => EventKind::Renamed { from },
        }
    }

    fn insert(&mut self, path: PathBuf, kind: EventKind) {
        if !self.order.contains(&path) {
            self.order.push(path.clone());
        }
        self.pending.insert(path, kind);
    }

    /// Take the coalesced events in first-seen order.
    pub fn drain(&mut self) -> Vec<FileEvent> {
        let mut pending = std::mem::take(&mut self.pending);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|path| pending.remove(&path).map(|kind| FileEvent { path, kind }))
            .collect()
    }
}
