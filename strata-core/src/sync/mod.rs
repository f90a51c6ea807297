//! Incremental synchronization of the graph with the filesystem.
//!
//! [`SyncEngine`] turns filesystem events into per-file jobs: read, hash,
//! extract, upsert. Jobs for different files run concurrently on a bounded
//! worker pool; jobs for one file are serialized by the [`FileTracker`],
//! and a job whose file changed again while it was extracting throws its
//! result away and starts over. The cross-reference resolver runs as a
//! single-flight background task woken after every batch.

pub mod event;
pub mod fault;
pub mod scan;
pub mod tracker;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rayon::prelude::*;
use strata_graphs::extract::relocated_module_name;
use strata_graphs::languages::Detection;
use strata_graphs::{
    ExtractOutcome, FileExtraction, GraphError, LanguageRegistry, LanguageSupport, SourceUnit,
    extract_source,
};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::config::StrataConfig;
use crate::error::{ExtractError, StrataError, SyncError};
use crate::progress::ProgressReporter;
use crate::resolve::{ResolveReport, Resolver};
use crate::store::GraphStore;
use crate::types::{FileBatch, FileStatus};
use crate::upsert::{RetryPolicy, Upserter};

pub use event::{EventKind, EventQueue, FileEvent};
pub use fault::{FaultKind, FileFault, SyncReport};
pub use scan::{IgnoreRules, RootedPath, SourceRoots, content_hash};
pub use tracker::{Claim, FileState, FileTracker};

/// Language registry with the configured extension map and enabled set.
pub fn build_registry(config: &StrataConfig) -> LanguageRegistry {
    let mut registry = LanguageRegistry::new();
    for (ext, language) in &config.languages.extensions {
        registry.map_extension(ext, language);
    }
    registry.restrict_to(&config.languages.enabled);
    registry
}

/// One unit of work handed to a worker.
#[derive(Debug, Clone)]
enum Job {
    Sync(RootedPath),
    Relocate { from: RootedPath, to: RootedPath },
}

impl Job {
    fn paths(&self) -> Vec<&str> {
        match self {
            Self::Sync(file) => vec![file.store_path.as_str()],
            Self::Relocate { from, to } => vec![from.store_path.as_str(), to.store_path.as_str()],
        }
    }
}

/// What happened to one file in one attempt.
#[derive(Debug)]
enum Step {
    Written { parse_error: Option<String> },
    Relocated,
    Unchanged,
    Deleted,
    /// Nothing on disk and nothing stored.
    Absent,
    Skipped,
    Parked,
    /// The file changed while it was being extracted.
    Superseded,
    Fault(FileFault),
}

impl Step {
    fn record(self, path: &str, report: &mut SyncReport) {
        match self {
            Self::Written { parse_error } => {
                report.processed += 1;
                if let Some(message) = parse_error {
                    report
                        .faults
                        .push(FileFault::new(path, FaultKind::ParseError, message));
                }
            }
            Self::Relocated => report.relocated += 1,
            Self::Unchanged => report.unchanged += 1,
            Self::Deleted => report.deleted += 1,
            Self::Skipped => report.skipped += 1,
            Self::Parked => report.parked += 1,
            Self::Fault(fault) => {
                if fault.kind == FaultKind::BackendUnavailable {
                    report.parked += 1;
                }
                report.faults.push(fault);
            }
            Self::Absent | Self::Superseded => {}
        }
    }
}

/// Result of reading and extracting one file off the async runtime.
#[derive(Debug)]
enum Prepared {
    Unchanged(RootedPath),
    Skipped(RootedPath),
    Fault(FileFault),
    Extracted {
        file: RootedPath,
        hash: String,
        outcome: Result<ExtractOutcome, GraphError>,
    },
}

/// Keeps one project's graph in step with its source roots.
#[derive(Debug)]
pub struct SyncEngine {
    config: Arc<StrataConfig>,
    roots: SourceRoots,
    rules: IgnoreRules,
    registry: Arc<LanguageRegistry>,
    upserter: Upserter,
    resolver: Resolver,
    tracker: Mutex<FileTracker>,
    workers: Arc<Semaphore>,
    degraded: AtomicBool,
    parked: Mutex<BTreeSet<String>>,
    resolve_wake: Notify,
    resolve_gate: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    /// Resolve the configured roots against `base` and wire the pipeline
    /// to `store`. Fails when no root exists.
    pub fn new(
        config: Arc<StrataConfig>,
        base: &std::path::Path,
        store: Arc<dyn GraphStore>,
    ) -> crate::error::Result<Self> {
        let roots = SourceRoots::resolve(&config, base)?;
        let registry = Arc::new(build_registry(&config));
        Ok(Self {
            rules: IgnoreRules::from_config(&config),
            upserter: Upserter::new(store, RetryPolicy::from_config(&config.sync)),
            resolver: Resolver::new(Arc::clone(&registry)),
            workers: Arc::new(Semaphore::new(config.sync.workers.max(1))),
            tracker: Mutex::new(FileTracker::new()),
            degraded: AtomicBool::new(false),
            parked: Mutex::new(BTreeSet::new()),
            resolve_wake: Notify::new(),
            resolve_gate: tokio::sync::Mutex::new(()),
            roots,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn roots(&self) -> &SourceRoots {
        &self.roots
    }

    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        self.upserter.store()
    }

    pub fn file_state(&self, store_path: &str) -> FileState {
        self.tracker().state(store_path)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Store paths waiting for the backend to come back, sorted.
    pub fn parked_paths(&self) -> Vec<String> {
        self.parked_set().iter().cloned().collect()
    }

    fn tracker(&self) -> MutexGuard<'_, FileTracker> {
        self.tracker.lock().expect("sync tracker mutex poisoned")
    }

    fn parked_set(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.parked.lock().expect("parked set mutex poisoned")
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Probe the backend, register the project and rebuild the tracker
    /// from the stored file records.
    #[instrument(skip_all, fields(project = %self.config.project.name))]
    pub async fn start(&self) -> crate::error::Result<()> {
        let store = self.upserter.store();
        store
            .ping()
            .await
            .map_err(|e| SyncError::BackendUnreachable(e.to_string()))?;

        let languages: Vec<String> = if self.config.languages.enabled.is_empty() {
            self.registry
                .language_ids()
                .into_iter()
                .map(String::from)
                .collect()
        } else {
            self.config.languages.enabled.clone()
        };
        store
            .ensure_project(&self.config.project.name, &self.roots.dirs(), &languages)
            .await?;

        let records: Vec<_> = store
            .file_records()
            .await?
            .into_iter()
            .filter(|r| r.project == self.config.project.name)
            .collect();
        *self.tracker() = FileTracker::from_records(&records);
        info!(files = records.len(), "Tracker rebuilt from store");
        Ok(())
    }

    /// Bring the store in line with every root: process new and changed
    /// files, delete files that vanished, then run one resolver pass.
    #[instrument(skip_all, fields(project = %self.config.project.name))]
    pub async fn initial_scan(
        self: &Arc<Self>,
        reporter: &dyn ProgressReporter,
    ) -> crate::error::Result<SyncReport> {
        let mut report = SyncReport::default();
        let files = self.roots.walk_all(&self.rules);
        let seen: HashSet<String> = files.iter().map(|f| f.store_path.clone()).collect();
        let known: HashMap<String, String> = {
            let tracker = self.tracker();
            tracker
                .tracked_paths()
                .into_iter()
                .filter_map(|p| tracker.hash(&p).map(|h| (p.clone(), h.to_string())))
                .collect()
        };
        info!(files = files.len(), stored = known.len(), "Scanning source roots");

        reporter.start("Indexing", Some(files.len() as u64));
        let registry = Arc::clone(&self.registry);
        let max_bytes = self.rules.max_file_bytes();
        let prepared: Vec<Prepared> = tokio::task::spawn_blocking(move || {
            files
                .into_par_iter()
                .map(|file| prepare(&registry, &known, max_bytes, file))
                .collect()
        })
        .await
        .map_err(|e| ExtractError::Io(io::Error::other(e.to_string())))?;

        for item in prepared {
            match item {
                Prepared::Unchanged(file) => {
                    self.tracker().record_unchanged(&file.store_path);
                    report.unchanged += 1;
                }
                Prepared::Skipped(_) => report.skipped += 1,
                Prepared::Fault(fault) => {
                    warn!(path = %fault.path, kind = fault.kind.as_str(), "{}", fault.message);
                    report.faults.push(fault);
                }
                Prepared::Extracted {
                    file,
                    hash,
                    outcome,
                } => {
                    let step = if self.is_degraded() {
                        self.park(&file.store_path);
                        Step::Parked
                    } else {
                        self.commit(&file.store_path, &hash, outcome).await
                    };
                    step.record(&file.store_path, &mut report);
                }
            }
            reporter.advance(1);
        }
        reporter.finish();

        let tracked = self.tracker().tracked_paths();
        for path in tracked.into_iter().filter(|p| !seen.contains(p)) {
            let still_there = self
                .roots
                .from_store_path(&path)
                .is_some_and(|f| f.absolute.is_file());
            if !still_there {
                self.remove(&path).await.record(&path, &mut report);
            }
        }

        if !self.is_degraded() {
            match self.resolve_now().await {
                Ok(resolved) => report.resolve = Some(resolved),
                Err(e) => warn!(error = %e, "Resolver pass after scan failed"),
            }
        }
        info!(
            processed = report.processed,
            unchanged = report.unchanged,
            deleted = report.deleted,
            faults = report.faults.len(),
            "Initial scan complete"
        );
        Ok(report)
    }

    /// Consume events until the channel closes: debounce, process each
    /// batch, wake the resolver, and probe the backend while degraded.
    #[instrument(skip_all, fields(project = %self.config.project.name))]
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<FileEvent>,
    ) -> crate::error::Result<SyncReport> {
        let debounce = Duration::from_millis(self.config.sync.debounce_ms);
        let mut probe =
            tokio::time::interval(Duration::from_millis(self.config.sync.probe_interval_ms.max(1)));
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let resolver = self.spawn_resolver();
        let mut total = SyncReport::default();

        loop {
            tokio::select! {
                next = events.recv() => {
                    let Some(first) = next else { break };
                    let mut batch = vec![first];
                    let mut closed = false;
                    loop {
                        match tokio::time::timeout(debounce, events.recv()).await {
                            Ok(Some(event)) => batch.push(event),
                            Ok(None) => {
                                closed = true;
                                break;
                            }
                            Err(_) => break,
                        }
                    }
                    total.merge(self.process_events(batch).await);
                    if closed {
                        break;
                    }
                }
                _ = probe.tick(), if self.is_degraded() => {
                    if let Some(report) = self.try_recover().await {
                        total.merge(report);
                    }
                }
            }
        }

        resolver.abort();
        if !self.is_degraded() {
            total.resolve = Some(self.resolve_now().await?);
        }
        Ok(total)
    }

    fn spawn_resolver(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                engine.resolve_wake.notified().await;
                tokio::task::yield_now().await;
                if engine.is_degraded() {
                    continue;
                }
                if let Err(e) = engine.resolve_now().await {
                    warn!(error = %e, "Background resolver pass failed");
                }
            }
        })
    }

    /// Run one resolver pass. Concurrent callers wait for each other.
    pub async fn resolve_now(&self) -> crate::error::Result<ResolveReport> {
        let _gate = self.resolve_gate.lock().await;
        let store: &dyn GraphStore = self.upserter.store().as_ref();
        let resolver = &self.resolver;
        self.upserter
            .retry_policy()
            .run("resolve", move || resolver.run(store))
            .await
    }

    // ── Degraded mode ──────────────────────────────────────────────

    fn enter_degraded(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(reason, "Backend unavailable, ingestion paused");
        }
    }

    fn park(&self, path: &str) {
        self.parked_set().insert(path.to_string());
    }

    /// Probe the backend once. On success leave degraded mode and
    /// reprocess every parked file.
    pub async fn try_recover(self: &Arc<Self>) -> Option<SyncReport> {
        if !self.is_degraded() {
            return None;
        }
        if let Err(e) = self.upserter.store().ping().await {
            debug!(error = %e, "Backend still unavailable");
            return None;
        }
        self.degraded.store(false, Ordering::SeqCst);
        let parked = std::mem::take(&mut *self.parked_set());
        info!(parked = parked.len(), "Backend recovered, resuming ingestion");
        let events = parked
            .iter()
            .filter_map(|p| self.roots.from_store_path(p))
            .map(|f| FileEvent::modified(f.absolute))
            .collect();
        Some(self.process_events(events).await)
    }

    // ── Event batches ──────────────────────────────────────────────

    /// Coalesce a batch of events, run the resulting jobs on the worker
    /// pool, and wake the resolver.
    #[instrument(skip_all, fields(events = events.len()))]
    pub async fn process_events(self: &Arc<Self>, events: Vec<FileEvent>) -> SyncReport {
        let mut queue = EventQueue::new();
        for event in events {
            queue.push(event);
        }
        let jobs = self.expand(queue.drain());
        {
            let mut tracker = self.tracker();
            for job in &jobs {
                for path in job.paths() {
                    tracker.bump(path);
                }
            }
        }

        let mut set = JoinSet::new();
        for job in jobs {
            let engine = Arc::clone(self);
            let workers = Arc::clone(&self.workers);
            set.spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    return SyncReport::default();
                };
                engine.run_job(job).await
            });
        }

        let mut report = SyncReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(done) => report.merge(done),
                Err(e) => warn!(error = %e, "Sync job failed to complete"),
            }
        }
        debug!(
            processed = report.processed,
            deleted = report.deleted,
            relocated = report.relocated,
            faults = report.faults.len(),
            "Event batch processed"
        );
        self.resolve_wake.notify_one();
        report
    }

    /// Turn coalesced events into file jobs, expanding directory events.
    fn expand(&self, events: Vec<FileEvent>) -> Vec<Job> {
        let mut jobs = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut push = |job: Job, jobs: &mut Vec<Job>| {
            if job.paths().iter().all(|p| claimed.insert((*p).to_string())) {
                jobs.push(job);
            }
        };

        for event in events {
            let Some(target) = self.roots.locate(&event.path) else {
                continue;
            };
            if self.rules.is_ignored(&target.relative) {
                continue;
            }
            match event.kind {
                EventKind::Created | EventKind::Modified => {
                    if event.path.is_dir() {
                        for file in self.roots.walk(&event.path, &self.rules) {
                            push(Job::Sync(file), &mut jobs);
                        }
                    } else {
                        push(Job::Sync(target), &mut jobs);
                    }
                }
                EventKind::Deleted => {
                    let below = self.tracker().tracked_under(&target.store_path);
                    if below.is_empty() {
                        push(Job::Sync(target), &mut jobs);
                    } else {
                        for file in below.iter().filter_map(|p| self.roots.from_store_path(p)) {
                            push(Job::Sync(file), &mut jobs);
                        }
                    }
                }
                EventKind::Renamed { from } => {
                    let source = self
                        .roots
                        .locate(&from)
                        .filter(|s| !self.rules.is_ignored(&s.relative));
                    let Some(source) = source else {
                        push(Job::Sync(target), &mut jobs);
                        continue;
                    };
                    if event.path.is_dir() {
                        let moved = self.tracker().tracked_under(&source.store_path);
                        for old in moved {
                            let new = format!(
                                "{}{}",
                                target.store_path,
                                &old[source.store_path.len()..]
                            );
                            if let (Some(from), Some(to)) =
                                (self.roots.from_store_path(&old), self.roots.from_store_path(&new))
                            {
                                push(Job::Relocate { from, to }, &mut jobs);
                            }
                        }
                        for file in self.roots.walk(&event.path, &self.rules) {
                            push(Job::Sync(file), &mut jobs);
                        }
                    } else {
                        push(Job::Relocate { from: source, to: target }, &mut jobs);
                    }
                }
            }
        }
        jobs
    }

    async fn run_job(&self, job: Job) -> SyncReport {
        let mut report = SyncReport::default();
        match job {
            Job::Sync(file) => self.reconcile(&file, &mut report).await,
            Job::Relocate { from, to } => self.relocate(&from, &to, &mut report).await,
        }
        report
    }

    // ── Per-file work ──────────────────────────────────────────────

    /// Bring one stored file in line with the disk, unless another job
    /// already holds it (that job then runs once more).
    async fn reconcile(&self, file: &RootedPath, report: &mut SyncReport) {
        let claim = self.tracker().claim(&file.store_path);
        if claim == Claim::Queued {
            debug!(path = %file.store_path, "Queued behind running job");
            return;
        }
        self.settle(file, report).await;
    }

    /// Work on a claimed file until no request is queued behind it.
    async fn settle(&self, file: &RootedPath, report: &mut SyncReport) {
        let path = file.store_path.as_str();
        loop {
            let generation = self.tracker().generation(path);
            match self.sync_once(file, generation).await {
                Step::Superseded => {
                    debug!(path, "Superseded by a newer event, reprocessing");
                    continue;
                }
                step => step.record(path, report),
            }
            let again = self.tracker().release(path);
            if !again {
                break;
            }
        }
    }

    async fn sync_once(&self, file: &RootedPath, generation: u64) -> Step {
        let path = file.store_path.as_str();
        if self.is_degraded() {
            self.park(path);
            return Step::Parked;
        }

        let metadata = match tokio::fs::metadata(&file.absolute).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.remove(path).await,
            Err(e) => return Step::Fault(FileFault::new(path, FaultKind::Io, e.to_string())),
        };
        if !metadata.is_file() {
            return Step::Absent;
        }
        if metadata.len() > self.rules.max_file_bytes() {
            debug!(path, bytes = metadata.len(), "Skipping oversized file");
            return Step::Skipped;
        }

        let lang = match self.registry.detect(&file.absolute) {
            Detection::Supported(lang) => lang,
            Detection::Unsupported(id) => {
                return Step::Fault(unsupported(path, &id));
            }
            Detection::Unknown => return Step::Skipped,
        };

        let bytes = match tokio::fs::read(&file.absolute).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.remove(path).await,
            Err(e) => return Step::Fault(FileFault::new(path, FaultKind::Io, e.to_string())),
        };
        let hash = content_hash(&bytes);
        let unchanged = self.tracker().hash(path) == Some(hash.as_str());
        if unchanged {
            self.tracker().record_unchanged(path);
            return Step::Unchanged;
        }

        let outcome = extract_blocking(lang, file.clone(), bytes).await;
        if self.tracker().generation(path) != generation {
            return Step::Superseded;
        }
        self.commit(path, &hash, outcome).await
    }

    /// Write an extraction outcome for `path`.
    async fn commit(
        &self,
        path: &str,
        hash: &str,
        outcome: Result<ExtractOutcome, GraphError>,
    ) -> Step {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path, error = %e, "Extraction failed");
                return Step::Fault(FileFault::new(path, FaultKind::ParseError, e.to_string()));
            }
        };
        let parse_error = outcome.parse_error().map(str::to_string);
        if let Some(message) = &parse_error {
            warn!(path, error = %message, "Parse error, integrating empty extraction");
        }
        let batch = FileBatch {
            project: self.config.project.name.clone(),
            content_hash: hash.to_string(),
            status: if parse_error.is_some() {
                FileStatus::ParseError
            } else {
                FileStatus::Parsed
            },
            diagnostic: parse_error.clone(),
            extraction: outcome.into_extraction(),
        };
        match self.upserter.upsert(&batch).await {
            Ok(_) => {
                self.tracker()
                    .record_parsed(path, hash, Some(Arc::new(batch.extraction)));
                Step::Written { parse_error }
            }
            Err(e) => self.write_failed(path, &e),
        }
    }

    async fn remove(&self, path: &str) -> Step {
        let tracked = self.tracker().is_tracked(path);
        if !tracked {
            return Step::Absent;
        }
        match self.upserter.delete(path).await {
            Ok(_) => {
                self.tracker().record_deleted(path);
                Step::Deleted
            }
            Err(e) => self.write_failed(path, &e),
        }
    }

    fn write_failed(&self, path: &str, err: &StrataError) -> Step {
        match err {
            StrataError::Extract(ExtractError::Inconsistent { .. }) => {
                warn!(path, error = %err, "Rejected inconsistent extraction");
                Step::Fault(FileFault::new(
                    path,
                    FaultKind::ExtractionInconsistency,
                    err.to_string(),
                ))
            }
            err if err.is_transient() => {
                self.enter_degraded(&err.to_string());
                self.park(path);
                Step::Fault(FileFault::new(
                    path,
                    FaultKind::BackendUnavailable,
                    err.to_string(),
                ))
            }
            err => {
                warn!(path, error = %err, "Store rejected write");
                Step::Fault(FileFault::new(path, FaultKind::WriteRejected, err.to_string()))
            }
        }
    }

    // ── Renames ────────────────────────────────────────────────────

    async fn relocate(&self, from: &RootedPath, to: &RootedPath, report: &mut SyncReport) {
        let old_claim = self.tracker().claim(&from.store_path);
        if old_claim == Claim::Queued {
            // The holder of the old path reruns and removes it.
            self.reconcile(to, report).await;
            return;
        }
        let new_claim = self.tracker().claim(&to.store_path);
        if new_claim == Claim::Queued {
            self.settle(from, report).await;
            return;
        }

        if let Some(step) = self.try_relocate(from, to).await {
            step.record(&to.store_path, report);
            let old_again = self.tracker().release(&from.store_path);
            if old_again {
                self.settle(from, report).await;
            }
            let new_again = self.tracker().release(&to.store_path);
            if new_again {
                self.settle(to, report).await;
            }
        } else {
            // Not a pure move: delete the old path, process the new one.
            self.settle(from, report).await;
            self.settle(to, report).await;
        }
    }

    /// Re-key the stored content of `from` for `to` when the moved file is
    /// byte-identical to what was last processed. `None` when it is not.
    async fn try_relocate(&self, from: &RootedPath, to: &RootedPath) -> Option<Step> {
        let (old, new) = (from.store_path.as_str(), to.store_path.as_str());
        if self.is_degraded() {
            self.park(old);
            self.park(new);
            return Some(Step::Parked);
        }
        let (old_hash, new_tracked, cached) = {
            let tracker = self.tracker();
            (
                tracker.hash(old).map(str::to_string),
                tracker.is_tracked(new),
                tracker.extraction(old),
            )
        };
        let old_hash = old_hash?;
        if new_tracked {
            return None;
        }
        let lang = self.registry.for_file(&to.absolute)?;
        let old_lang = self.registry.for_file(&from.absolute)?;
        if lang.id() != old_lang.id() {
            return None;
        }
        let bytes = tokio::fs::read(&to.absolute).await.ok()?;
        if content_hash(&bytes) != old_hash {
            return None;
        }

        let generation = self.tracker().generation(new);
        let extraction: FileExtraction = match cached {
            Some(previous) => previous.relocate(
                new,
                &relocated_module_name(lang.as_ref(), &to.relative, &previous),
            ),
            None => extract_blocking(lang, to.clone(), bytes)
                .await
                .ok()?
                .into_extraction(),
        };
        if self.tracker().generation(new) != generation {
            return None;
        }

        let previous = self.upserter.store().file_record(old).await.ok().flatten();
        let batch = FileBatch {
            project: self.config.project.name.clone(),
            content_hash: old_hash.clone(),
            status: previous.as_ref().map_or(FileStatus::Parsed, |r| r.status),
            diagnostic: previous.and_then(|r| r.diagnostic),
            extraction,
        };
        match self.upserter.relocate(old, &batch).await {
            Ok(outcome) => {
                let mut tracker = self.tracker();
                tracker.record_deleted(old);
                tracker.record_parsed(new, &old_hash, Some(Arc::new(batch.extraction)));
                drop(tracker);
                info!(from = old, to = new, repointed = outcome.edges_repointed, "Relocated file");
                Some(Step::Relocated)
            }
            Err(e) => {
                let step = self.write_failed(new, &e);
                if self.is_degraded() {
                    self.park(old);
                }
                Some(step)
            }
        }
    }
}

fn unsupported(path: &str, language: &str) -> FileFault {
    FileFault::new(
        path,
        FaultKind::UnsupportedLanguage,
        format!("no grammar enabled for {language}"),
    )
}

fn extract_file(
    lang: &dyn LanguageSupport,
    file: &RootedPath,
    bytes: &[u8],
) -> Result<ExtractOutcome, GraphError> {
    let text = String::from_utf8_lossy(bytes);
    extract_source(
        lang,
        &SourceUnit {
            path: &file.store_path,
            relative: &file.relative,
            text: &text,
        },
    )
}

async fn extract_blocking(
    lang: Arc<dyn LanguageSupport>,
    file: RootedPath,
    bytes: Vec<u8>,
) -> Result<ExtractOutcome, GraphError> {
    tokio::task::spawn_blocking(move || extract_file(lang.as_ref(), &file, &bytes))
        .await
        .unwrap_or_else(|e| Err(GraphError::TreeSitter(format!("extraction task failed: {e}"))))
}

/// Read, hash and (when changed) extract one file. Runs on the rayon pool.
fn prepare(
    registry: &LanguageRegistry,
    known: &HashMap<String, String>,
    max_bytes: u64,
    file: RootedPath,
) -> Prepared {
    let path = file.store_path.as_str();
    let lang = match registry.detect(&file.absolute) {
        Detection::Supported(lang) => lang,
        Detection::Unsupported(id) => return Prepared::Fault(unsupported(path, &id)),
        Detection::Unknown => return Prepared::Skipped(file),
    };
    match std::fs::metadata(&file.absolute) {
        Ok(m) if m.len() > max_bytes => return Prepared::Skipped(file),
        Ok(_) => {}
        Err(e) => return Prepared::Fault(FileFault::new(path, FaultKind::Io, e.to_string())),
    }
    let bytes = match std::fs::read(&file.absolute) {
        Ok(bytes) => bytes,
        Err(e) => return Prepared::Fault(FileFault::new(path, FaultKind::Io, e.to_string())),
    };
    let hash = content_hash(&bytes);
    if known.get(path) == Some(&hash) {
        return Prepared::Unchanged(file);
    }
    let outcome = extract_file(lang.as_ref(), &file, &bytes);
    Prepared::Extracted {
        file,
        hash,
        outcome,
    }
}
