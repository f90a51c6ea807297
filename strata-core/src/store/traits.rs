use std::path::PathBuf;

use crate::types::{
    BatchOutcome, EdgeFilter, EdgeRecord, FileBatch, FileRecord, NodeFilter, NodeRecord,
    OverridePair, Resolution, StoreStats,
};

/// The graph backend. The upserter, resolver and sync engine read and
/// write through this trait only; every write method is one transaction.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    // ── Projects and files ─────────────────────────────────────────

    /// Create or update the project node.
    async fn ensure_project(
        &self,
        name: &str,
        roots: &[PathBuf],
        languages: &[String],
    ) -> crate::error::Result<()>;

    /// Merge one file's extraction: upsert its nodes and edges, remove what
    /// it no longer declares, and demote inbound edges to removed entities.
    async fn apply_file_batch(&self, batch: &FileBatch) -> crate::error::Result<BatchOutcome>;

    /// Remove a file and everything it owns, demoting inbound edges.
    /// Deleting an unknown path is a no-op.
    async fn delete_file(&self, path: &str) -> crate::error::Result<BatchOutcome>;

    /// Apply `batch` (already re-keyed for its new path), move inbound edges
    /// from other files onto the relocated keys, then remove `old_path`.
    async fn relocate_file(
        &self,
        old_path: &str,
        batch: &FileBatch,
    ) -> crate::error::Result<BatchOutcome>;

    async fn file_record(&self, path: &str) -> crate::error::Result<Option<FileRecord>>;

    /// Every file record, ordered by path.
    async fn file_records(&self) -> crate::error::Result<Vec<FileRecord>>;

    // ── Reads ──────────────────────────────────────────────────────

    async fn node(&self, key: &str) -> crate::error::Result<Option<NodeRecord>>;

    async fn find_nodes(&self, filter: &NodeFilter) -> crate::error::Result<Vec<NodeRecord>>;

    async fn find_edges(&self, filter: &EdgeFilter) -> crate::error::Result<Vec<EdgeRecord>>;

    async fn edges_from(&self, source_key: &str) -> crate::error::Result<Vec<EdgeRecord>> {
        self.find_edges(&EdgeFilter {
            source_key: Some(source_key.to_string()),
            ..EdgeFilter::default()
        })
        .await
    }

    async fn edges_to(&self, target_key: &str) -> crate::error::Result<Vec<EdgeRecord>> {
        self.find_edges(&EdgeFilter {
            target_key: Some(target_key.to_string()),
            ..EdgeFilter::default()
        })
        .await
    }

    // ── Resolution ─────────────────────────────────────────────────

    /// Apply resolver conclusions. An edge is only updated while it is still
    /// unresolved, its target still exists and its owning file still has
    /// the content hash the conclusion was drawn from. Returns the number
    /// applied.
    async fn apply_resolutions(&self, resolutions: &[Resolution]) -> crate::error::Result<u64>;

    /// Replace every derived `OVERRIDES` edge. Pairs whose endpoints no
    /// longer exist are skipped. Returns the number written.
    async fn replace_overrides(&self, pairs: &[OverridePair]) -> crate::error::Result<u64>;

    // ── Health ─────────────────────────────────────────────────────

    /// Cheap round trip used by the degraded-mode probe.
    async fn ping(&self) -> crate::error::Result<()>;

    async fn stats(&self) -> crate::error::Result<StoreStats>;
}
