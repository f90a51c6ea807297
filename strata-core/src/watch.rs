//! Recursive filesystem watcher feeding the sync engine.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::sync::{FileEvent, IgnoreRules, SourceRoots};

/// Keeps the OS watch alive; dropping it stops the events.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatcher").finish_non_exhaustive()
    }
}

impl FsWatcher {
    /// Watch every root recursively and send mapped events to `tx`.
    /// Paths outside the roots or matched by `rules` are dropped.
    pub fn spawn(
        roots: SourceRoots,
        rules: IgnoreRules,
        tx: mpsc::Sender<FileEvent>,
    ) -> Result<Self, SyncError> {
        let dirs = roots.dirs();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for mapped in map_event(event) {
                    let wanted = roots
                        .locate(&mapped.path)
                        .is_some_and(|f| !rules.is_ignored(&f.relative));
                    if !wanted {
                        continue;
                    }
                    debug!(path = %mapped.path.display(), kind = ?mapped.kind, "Filesystem event");
                    if tx.blocking_send(mapped).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Watch error"),
        })
        .map_err(|e| SyncError::Watcher(e.to_string()))?;

        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| SyncError::Watcher(format!("{}: {e}", dir.display())))?;
            info!(root = %dir.display(), "Watching for changes");
        }
        Ok(Self { _watcher: watcher })
    }
}

/// Translate one notify event into zero or more file events.
pub fn map_event(event: Event) -> Vec<FileEvent> {
    let Event { kind, mut paths, .. } = event;
    match kind {
        NotifyKind::Create(_) => paths.into_iter().map(FileEvent::created).collect(),
        NotifyKind::Remove(_) => paths.into_iter().map(FileEvent::deleted).collect(),
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let to = paths.pop();
            let from = paths.pop();
            match (from, to) {
                (Some(from), Some(to)) => vec![FileEvent::renamed(from, to)],
                _ => Vec::new(),
            }
        }
        NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(FileEvent::deleted).collect()
        }
        NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(FileEvent::created).collect()
        }
        NotifyKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|p| {
                if p.exists() {
                    FileEvent::modified(p)
                } else {
                    FileEvent::deleted(p)
                }
            })
            .collect(),
        NotifyKind::Modify(ModifyKind::Metadata(_)) | NotifyKind::Access(_) | NotifyKind::Other => {
            Vec::new()
        }
        NotifyKind::Modify(_) | NotifyKind::Any => {
            paths.into_iter().map(FileEvent::modified).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    use super::*;

    fn event(kind: NotifyKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn maps_create_modify_remove() {
        assert_eq!(
            map_event(event(NotifyKind::Create(CreateKind::File), &["/r/a.py"])),
            vec![FileEvent::created("/r/a.py")]
        );
        assert_eq!(
            map_event(event(
                NotifyKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/r/a.py"]
            )),
            vec![FileEvent::modified("/r/a.py")]
        );
        assert_eq!(
            map_event(event(NotifyKind::Remove(RemoveKind::File), &["/r/a.py"])),
            vec![FileEvent::deleted("/r/a.py")]
        );
    }

    #[test]
    fn rename_pairs_become_one_event() {
        let mapped = map_event(event(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/a.py", "/r/b.py"],
        ));
        assert_eq!(mapped, vec![FileEvent::renamed("/r/a.py", "/r/b.py")]);
    }

    #[test]
    fn unpaired_rename_halves_are_delete_and_create() {
        assert_eq!(
            map_event(event(
                NotifyKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["/r/a.py"]
            )),
            vec![FileEvent::deleted("/r/a.py")]
        );
        assert_eq!(
            map_event(event(
                NotifyKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/r/b.py"]
            )),
            vec![FileEvent::created("/r/b.py")]
        );
    }

    #[test]
    fn metadata_and_access_are_ignored() {
        assert!(
            map_event(event(
                NotifyKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["/r/a.py"]
            ))
            .is_empty()
        );
        assert!(map_event(event(NotifyKind::Other, &["/r/a.py"])).is_empty());
    }
}
