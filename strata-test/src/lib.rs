// Integration test utilities and fixtures for Strata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use strata_core::config::StrataConfig;
use strata_core::error::StoreError;
use strata_core::store::{GraphStore, SqliteStore};
use strata_core::sync::SyncEngine;
use strata_core::types::{
    BatchOutcome, EdgeFilter, EdgeRecord, EdgeState, FileBatch, FileRecord, NodeFilter,
    NodeRecord, OverridePair, Resolution, StoreStats,
};
use strata_graphs::RelationKind;

/// A temporary source tree.
#[derive(Debug)]
pub struct TestTree {
    pub dir: tempfile::TempDir,
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    /// `a.py` declares `A.m`; `b.py` imports `A` and calls `A().m()`.
    pub fn scenario() -> Self {
        let tree = Self::new();
        tree.write("a.py", "class A:\n    def m(self):\n        pass\n");
        tree.write("b.py", "from a import A\nA().m()\n");
        tree
    }

    /// A small Python package with inheritance, overrides and a broken file.
    pub fn package() -> Self {
        let tree = Self::new();
        tree.write("shop/__init__.py", "");
        tree.write(
            "shop/base.py",
            "class Repository:\n    def save(self, item):\n        pass\n\n    def load(self, key):\n        return None\n",
        );
        tree.write(
            "shop/orders.py",
            "from shop.base import Repository\n\n\nclass OrderRepository(Repository):\n    def save(self, item):\n        self.load(item)\n        return validate(item)\n\n\ndef validate(item):\n    return len(item) > 0\n",
        );
        tree.write(
            "shop/api.py",
            "from shop.orders import OrderRepository, validate\n\n\ndef create(order):\n    if validate(order):\n        OrderRepository().save(order)\n",
        );
        tree.write("shop/broken.py", "def oops(:\n    pass\n");
        tree
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn abs(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, text: &str) {
        let path = self.abs(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        let path = self.abs(rel);
        if path.is_dir() {
            std::fs::remove_dir_all(path).unwrap();
        } else {
            std::fs::remove_file(path).unwrap();
        }
    }

    pub fn rename(&self, from: &str, to: &str) {
        let target = self.abs(to);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::rename(self.abs(from), target).unwrap();
    }

    /// Configuration for this tree with short timings for tests.
    pub fn config(&self) -> StrataConfig {
        let mut config = StrataConfig::for_root(self.path());
        config.project.name = "test".into();
        config.sync.debounce_ms = 10;
        config.sync.workers = 4;
        config.sync.max_retries = 1;
        config.sync.retry_base_ms = 1;
        config.sync.retry_max_ms = 2;
        config.sync.probe_interval_ms = 10;
        config
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A started engine over `tree` writing to `store`.
pub async fn start_engine(tree: &TestTree, store: Arc<dyn GraphStore>) -> Arc<SyncEngine> {
    let engine = SyncEngine::new(Arc::new(tree.config()), tree.path(), store).unwrap();
    engine.start().await.unwrap();
    Arc::new(engine)
}

// ── Graph snapshots ────────────────────────────────────────────────

/// Everything observable about a stored graph except timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<String, NodeRecord>,
    pub edges: BTreeMap<String, EdgeRecord>,
    /// Path → (content hash, version, status).
    pub files: BTreeMap<String, (String, u64, String)>,
}

impl GraphSnapshot {
    pub async fn of(store: &dyn GraphStore) -> Self {
        let nodes = store
            .find_nodes(&NodeFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|n| (n.key.clone(), n))
            .collect();
        let edges = store
            .find_edges(&EdgeFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.identity_key.clone(), e))
            .collect();
        let files = store
            .file_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| {
                (
                    r.path,
                    (r.content_hash, r.version, r.status.as_str().to_string()),
                )
            })
            .collect();
        Self {
            nodes,
            edges,
            files,
        }
    }

    /// Key of the node with this qualified name and kind.
    pub fn key_of(&self, qualified_name: &str, kind: strata_core::types::NodeKind) -> Option<&str> {
        self.nodes
            .values()
            .find(|n| n.qualified_name == qualified_name && n.kind == kind)
            .map(|n| n.key.as_str())
    }

    /// Edges of `kind` owned by `file`.
    pub fn edges_of(&self, kind: RelationKind, file: &str) -> Vec<&EdgeRecord> {
        self.edges
            .values()
            .filter(|e| e.kind == kind && e.owner_file == file)
            .collect()
    }

    pub fn count_state(&self, state: EdgeState) -> usize {
        self.edges.values().filter(|e| e.state == state).count()
    }
}

// ── Flaky backend ──────────────────────────────────────────────────

/// A store that can be switched offline. While offline every call fails
/// with a transient error and nothing reaches the inner store. While
/// rejecting, file writes fail with a constraint error instead.
#[derive(Debug)]
pub struct FlakyStore {
    inner: SqliteStore,
    offline: AtomicBool,
    rejecting: AtomicBool,
    rejected: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            offline: AtomicBool::new(false),
            rejecting: AtomicBool::new(false),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Calls refused while offline or rejecting.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    fn check(&self) -> strata_core::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("backend offline".into()).into());
        }
        Ok(())
    }

    fn check_write(&self) -> strata_core::Result<()> {
        self.check()?;
        if self.rejecting.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            let constraint = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT);
            return Err(StoreError::Sqlite(rusqlite::Error::SqliteFailure(
                constraint,
                Some("write rejected".into()),
            ))
            .into());
        }
        Ok(())
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GraphStore for FlakyStore {
    async fn ensure_project(
        &self,
        name: &str,
        roots: &[PathBuf],
        languages: &[String],
    ) -> strata_core::Result<()> {
        self.check()?;
        self.inner.ensure_project(name, roots, languages).await
    }

    async fn apply_file_batch(&self, batch: &FileBatch) -> strata_core::Result<BatchOutcome> {
        self.check_write()?;
        self.inner.apply_file_batch(batch).await
    }

    async fn delete_file(&self, path: &str) -> strata_core::Result<BatchOutcome> {
        self.check_write()?;
        self.inner.delete_file(path).await
    }

    async fn relocate_file(
        &self,
        old_path: &str,
        batch: &FileBatch,
    ) -> strata_core::Result<BatchOutcome> {
        self.check_write()?;
        self.inner.relocate_file(old_path, batch).await
    }

    async fn file_record(&self, path: &str) -> strata_core::Result<Option<FileRecord>> {
        self.check()?;
        self.inner.file_record(path).await
    }

    async fn file_records(&self) -> strata_core::Result<Vec<FileRecord>> {
        self.check()?;
        self.inner.file_records().await
    }

    async fn node(&self, key: &str) -> strata_core::Result<Option<NodeRecord>> {
        self.check()?;
        self.inner.node(key).await
    }

    async fn find_nodes(&self, filter: &NodeFilter) -> strata_core::Result<Vec<NodeRecord>> {
        self.check()?;
        self.inner.find_nodes(filter).await
    }

    async fn find_edges(&self, filter: &EdgeFilter) -> strata_core::Result<Vec<EdgeRecord>> {
        self.check()?;
        self.inner.find_edges(filter).await
    }

    async fn apply_resolutions(&self, resolutions: &[Resolution]) -> strata_core::Result<u64> {
        self.check()?;
        self.inner.apply_resolutions(resolutions).await
    }

    async fn replace_overrides(&self, pairs: &[OverridePair]) -> strata_core::Result<u64> {
        self.check()?;
        self.inner.replace_overrides(pairs).await
    }

    async fn ping(&self) -> strata_core::Result<()> {
        self.check()?;
        self.inner.ping().await
    }

    async fn stats(&self) -> strata_core::Result<StoreStats> {
        self.check()?;
        self.inner.stats().await
    }
}
