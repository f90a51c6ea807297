//! Graph upserter: validates one file's extraction and writes it through a
//! [`GraphStore`] as a single transaction, retrying transient backend
//! failures with bounded exponential backoff.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use strata_graphs::identity;
use strata_graphs::{FileExtraction, Target};
use tracing::{debug, instrument, warn};

use crate::config::SyncSection;
use crate::error::ExtractError;
use crate::store::GraphStore;
use crate::types::{BatchOutcome, FileBatch};

/// Bounded exponential backoff for store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncSection::default())
    }
}

impl RetryPolicy {
    pub fn from_config(sync: &SyncSection) -> Self {
        Self {
            max_retries: sync.max_retries,
            base_delay: Duration::from_millis(sync.retry_base_ms),
            max_delay: Duration::from_millis(sync.retry_max_ms),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..attempt {
            delay = (delay * 2).min(self.max_delay);
        }
        delay
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> crate::error::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let wait = self.delay(attempt);
                    warn!(
                        what,
                        attempt,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Store write failed, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Check the structural rules of a batch before anything is written.
pub fn validate_extraction(extraction: &FileExtraction) -> Result<(), ExtractError> {
    let path = extraction.path.as_str();
    let file_key = identity::file_key(path);
    let inconsistent = |reason: String| ExtractError::Inconsistent {
        path: path.to_string(),
        reason,
    };

    let mut parents: HashMap<&str, &str> = HashMap::new();
    for entity in &extraction.entities {
        if !identity::belongs_to(&entity.key, path) || entity.key == file_key {
            return Err(inconsistent(format!(
                "entity key {} is outside the file namespace",
                entity.key
            )));
        }
        if parents.insert(&entity.key, &entity.parent).is_some() {
            return Err(inconsistent(format!("duplicate entity key {}", entity.key)));
        }
    }

    for (key, parent) in &parents {
        if *parent != file_key && !parents.contains_key(parent) {
            return Err(inconsistent(format!("{key} has missing parent {parent}")));
        }
    }

    // Every chain of parents must reach the file.
    for start in parents.keys() {
        let mut seen = HashSet::new();
        let mut current = *start;
        while current != file_key {
            if !seen.insert(current) {
                return Err(inconsistent(format!("containment cycle through {start}")));
            }
            current = parents[current];
        }
    }

    let declared = |key: &str| key == file_key || parents.contains_key(key);
    for fact in &extraction.relations {
        if !declared(&fact.source) {
            return Err(inconsistent(format!(
                "{} fact from undeclared source {}",
                fact.kind.as_str(),
                fact.source
            )));
        }
        if let Target::Resolved(target) = &fact.target {
            if !declared(target) {
                return Err(inconsistent(format!(
                    "{} fact resolved to undeclared target {target}",
                    fact.kind.as_str()
                )));
            }
        }
    }
    Ok(())
}

/// Writes validated batches with retries.
#[derive(Clone)]
pub struct Upserter {
    store: Arc<dyn GraphStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Upserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upserter")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Upserter {
    pub fn new(store: Arc<dyn GraphStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Validate and merge one file's batch.
    #[instrument(skip_all, fields(path = %batch.path()))]
    pub async fn upsert(&self, batch: &FileBatch) -> crate::error::Result<BatchOutcome> {
        validate_extraction(&batch.extraction)?;
        let outcome = self
            .retry
            .run("apply_file_batch", || self.store.apply_file_batch(batch))
            .await?;
        debug!(
            version = outcome.version,
            changed = outcome.content_changed,
            removed = outcome.nodes_removed,
            demoted = outcome.edges_demoted,
            "Applied file batch"
        );
        Ok(outcome)
    }

    #[instrument(skip_all, fields(path = %path))]
    pub async fn delete(&self, path: &str) -> crate::error::Result<BatchOutcome> {
        let outcome = self
            .retry
            .run("delete_file", || self.store.delete_file(path))
            .await?;
        debug!(
            removed = outcome.nodes_removed,
            demoted = outcome.edges_demoted,
            "Deleted file"
        );
        Ok(outcome)
    }

    #[instrument(skip_all, fields(from = %old_path, to = %batch.path()))]
    pub async fn relocate(
        &self,
        old_path: &str,
        batch: &FileBatch,
    ) -> crate::error::Result<BatchOutcome> {
        validate_extraction(&batch.extraction)?;
        let outcome = self
            .retry
            .run("relocate_file", || self.store.relocate_file(old_path, batch))
            .await?;
        debug!(repointed = outcome.edges_repointed, "Relocated file");
        Ok(outcome)
    }
}
