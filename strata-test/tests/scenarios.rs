use std::sync::Arc;

use strata_core::progress::NoopReporter;
use strata_core::store::{GraphStore, SqliteStore};
use strata_core::sync::{FaultKind, FileEvent, SyncEngine};
use strata_core::types::{EdgeState, NodeKind};
use strata_core::verify::verify;
use strata_graphs::RelationKind;
use strata_test::{GraphSnapshot, TestTree, start_engine};

async fn ingest(tree: &TestTree) -> (Arc<SqliteStore>, Arc<SyncEngine>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = start_engine(tree, store.clone()).await;
    engine.initial_scan(&NoopReporter).await.unwrap();
    (store, engine)
}

// ── a.py / b.py ──────────────────────────────────────────────────

#[tokio::test]
async fn cross_file_call_scenario() {
    let tree = TestTree::scenario();
    let (store, _engine) = ingest(&tree).await;
    let graph = GraphSnapshot::of(store.as_ref()).await;

    assert!(graph.key_of("a.py", NodeKind::File).is_some());
    assert!(graph.key_of("b.py", NodeKind::File).is_some());
    let class_a = graph.key_of("a.A", NodeKind::Class).expect("class a.A");
    let method_m = graph.key_of("a.A.m", NodeKind::Function).expect("function a.A.m");
    assert_eq!(
        graph.nodes[method_m].parent_key.as_deref(),
        Some(class_a),
        "a.A.m is contained by a.A"
    );

    let imports = graph.edges_of(RelationKind::Imports, "b.py");
    assert!(
        imports
            .iter()
            .any(|e| e.state == EdgeState::Resolved && e.target_key.as_deref() == Some(class_a)),
        "b.py imports a.A: {imports:?}"
    );
    let calls = graph.edges_of(RelationKind::Calls, "b.py");
    assert!(
        calls
            .iter()
            .any(|e| e.state == EdgeState::Resolved && e.target_key.as_deref() == Some(method_m)),
        "b.py calls a.A.m: {calls:?}"
    );

    let report = verify(store.as_ref()).await.unwrap();
    assert!(report.is_ok(), "{:?}", report.violations);
}

#[tokio::test]
async fn deleting_the_callee_file_demotes_inbound_edges() {
    let tree = TestTree::scenario();
    let (store, engine) = ingest(&tree).await;
    let before = GraphSnapshot::of(store.as_ref()).await;
    let class_a = before.key_of("a.A", NodeKind::Class).unwrap().to_string();
    let method_m = before.key_of("a.A.m", NodeKind::Function).unwrap().to_string();

    tree.remove("a.py");
    let report = engine
        .process_events(vec![FileEvent::deleted(tree.abs("a.py"))])
        .await;
    assert_eq!(report.deleted, 1);

    let after = GraphSnapshot::of(store.as_ref()).await;
    assert!(!after.nodes.contains_key(&class_a));
    assert!(!after.nodes.contains_key(&method_m));
    assert!(after.nodes.values().all(|n| n.file_path.as_deref() != Some("a.py")));

    for kind in [RelationKind::Imports, RelationKind::Calls] {
        let edges = after.edges_of(kind, "b.py");
        assert!(!edges.is_empty(), "b.py keeps its {kind:?} edges");
        for edge in edges {
            assert_ne!(edge.target_key.as_deref(), Some(class_a.as_str()));
            assert_ne!(edge.target_key.as_deref(), Some(method_m.as_str()));
            if edge.state != EdgeState::Resolved {
                assert!(edge.hint.is_some(), "hint retained on {}", edge.identity_key);
            }
        }
    }
    assert!(
        after
            .edges_of(RelationKind::Calls, "b.py")
            .iter()
            .any(|e| e.state == EdgeState::Unresolved && e.hint.as_ref().is_some_and(|h| h.name() == "m")),
        "the call to m waits for a new target"
    );

    // Bringing the file back resolves the same edges again.
    tree.write("a.py", "class A:\n    def m(self):\n        pass\n");
    engine
        .process_events(vec![FileEvent::created(tree.abs("a.py"))])
        .await;
    engine.resolve_now().await.unwrap();
    let restored = GraphSnapshot::of(store.as_ref()).await;
    assert!(
        restored
            .edges_of(RelationKind::Calls, "b.py")
            .iter()
            .any(|e| e.target_key.as_deref() == Some(method_m.as_str())),
        "keys are structural, so the restored method has the same key"
    );

    let report = verify(store.as_ref()).await.unwrap();
    assert!(report.is_ok(), "{:?}", report.violations);
}

// ── Packages, inheritance and partial failure ─────────────────────

#[tokio::test]
async fn package_inheritance_and_overrides() {
    let tree = TestTree::package();
    let (store, _engine) = ingest(&tree).await;
    let graph = GraphSnapshot::of(store.as_ref()).await;

    let base = graph
        .key_of("shop.base.Repository", NodeKind::Class)
        .expect("Repository");
    let child = graph
        .key_of("shop.orders.OrderRepository", NodeKind::Class)
        .expect("OrderRepository");
    let base_save = graph
        .key_of("shop.base.Repository.save", NodeKind::Function)
        .unwrap();
    let base_load = graph
        .key_of("shop.base.Repository.load", NodeKind::Function)
        .unwrap();
    let child_save = graph
        .key_of("shop.orders.OrderRepository.save", NodeKind::Function)
        .unwrap();
    let validate = graph
        .key_of("shop.orders.validate", NodeKind::Function)
        .unwrap();

    let inherits = graph.edges_of(RelationKind::Inherits, "shop/orders.py");
    assert!(
        inherits
            .iter()
            .any(|e| e.source_key == child && e.target_key.as_deref() == Some(base)),
        "{inherits:?}"
    );

    let overrides: Vec<_> = graph
        .edges
        .values()
        .filter(|e| e.kind == RelationKind::Overrides)
        .collect();
    assert_eq!(overrides.len(), 1, "{overrides:?}");
    assert_eq!(overrides[0].source_key, child_save);
    assert_eq!(overrides[0].target_key.as_deref(), Some(base_save));

    // self.load() inside the subclass resolves through the base class.
    let orders_calls = graph.edges_of(RelationKind::Calls, "shop/orders.py");
    assert!(
        orders_calls
            .iter()
            .any(|e| e.source_key == child_save && e.target_key.as_deref() == Some(base_load)),
        "{orders_calls:?}"
    );
    // A builtin never resolves.
    assert!(
        orders_calls
            .iter()
            .any(|e| e.state == EdgeState::Unresolvable && e.hint.as_ref().is_some_and(|h| h.name() == "len"))
    );

    // Imported function called from another module.
    let api_calls = graph.edges_of(RelationKind::Calls, "shop/api.py");
    assert!(
        api_calls
            .iter()
            .any(|e| e.target_key.as_deref() == Some(validate)),
        "{api_calls:?}"
    );
}

#[tokio::test]
async fn a_broken_file_does_not_stop_the_batch() {
    let tree = TestTree::package();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = start_engine(&tree, store.clone()).await;
    let report = engine.initial_scan(&NoopReporter).await.unwrap();

    let parse_faults: Vec<_> = report.faults_of(FaultKind::ParseError).collect();
    assert_eq!(parse_faults.len(), 1, "{:?}", report.faults);
    assert_eq!(parse_faults[0].path, "shop/broken.py");
    assert_eq!(report.processed, 5, "the broken file is integrated too");

    let record = store.file_record("shop/broken.py").await.unwrap().unwrap();
    assert_eq!(record.status.as_str(), "parse_error");
    assert!(record.diagnostic.is_some());

    let graph = GraphSnapshot::of(store.as_ref()).await;
    assert!(graph.nodes.values().all(|n| n.file_path.as_deref() != Some("shop/broken.py")
        || matches!(n.kind, NodeKind::File | NodeKind::Module)));
    assert!(graph.key_of("shop.api.create", NodeKind::Function).is_some());

    // Fixing the file replaces the empty extraction.
    tree.write("shop/broken.py", "def oops():\n    pass\n");
    let fixed = engine
        .process_events(vec![FileEvent::modified(tree.abs("shop/broken.py"))])
        .await;
    assert!(fixed.is_clean(), "{:?}", fixed.faults);
    let graph = GraphSnapshot::of(store.as_ref()).await;
    assert!(graph.key_of("shop.broken.oops", NodeKind::Function).is_some());
    let record = store.file_record("shop/broken.py").await.unwrap().unwrap();
    assert_eq!(record.status.as_str(), "parsed");
}

// ── Configuration-driven behavior ─────────────────────────────────

#[tokio::test]
async fn unsupported_languages_are_reported_and_skipped() {
    let tree = TestTree::scenario();
    tree.write("Main.kt", "fun main() {}\n");
    tree.write("notes.txt", "not source\n");
    let mut config = tree.config();
    config.languages.extensions.insert("kt".into(), "kotlin".into());

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Arc::new(SyncEngine::new(Arc::new(config), tree.path(), store.clone()).unwrap());
    engine.start().await.unwrap();
    let report = engine.initial_scan(&NoopReporter).await.unwrap();

    let unsupported: Vec<_> = report.faults_of(FaultKind::UnsupportedLanguage).collect();
    assert_eq!(unsupported.len(), 1);
    assert_eq!(unsupported[0].path, "Main.kt");
    assert_eq!(report.processed, 2);
    assert!(store.file_record("Main.kt").await.unwrap().is_none());
    assert!(store.file_record("notes.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn disabled_languages_count_as_unsupported() {
    let tree = TestTree::scenario();
    tree.write("lib.rs", "pub fn add(a: i32, b: i32) -> i32 { a + b }\n");
    let mut config = tree.config();
    config.languages.enabled = vec!["python".into()];

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Arc::new(SyncEngine::new(Arc::new(config), tree.path(), store.clone()).unwrap());
    engine.start().await.unwrap();
    let report = engine.initial_scan(&NoopReporter).await.unwrap();

    assert_eq!(report.faults_of(FaultKind::UnsupportedLanguage).count(), 1);
    assert!(store.file_record("lib.rs").await.unwrap().is_none());
    assert!(store.file_record("a.py").await.unwrap().is_some());
}

#[tokio::test]
async fn multiple_roots_keep_their_files_apart() {
    let tree = TestTree::new();
    tree.write("api/models.py", "class User:\n    pass\n");
    tree.write("web/models.py", "class Page:\n    pass\n");
    let mut config = tree.config();
    config.project.roots = vec!["api".into(), "web".into()];

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Arc::new(SyncEngine::new(Arc::new(config), tree.path(), store.clone()).unwrap());
    engine.start().await.unwrap();
    let report = engine.initial_scan(&NoopReporter).await.unwrap();
    assert_eq!(report.processed, 2);

    let paths: Vec<String> = store
        .file_records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(paths, vec!["api/models.py", "web/models.py"]);

    let graph = GraphSnapshot::of(store.as_ref()).await;
    assert!(graph.key_of("models.User", NodeKind::Class).is_some());
    assert!(graph.key_of("models.Page", NodeKind::Class).is_some());

    let report = verify(store.as_ref()).await.unwrap();
    assert!(report.is_ok(), "{:?}", report.violations);
}

#[tokio::test]
async fn restart_rebuilds_state_from_the_store() {
    let tree = TestTree::scenario();
    let (store, engine) = ingest(&tree).await;
    drop(engine);

    // Changes made while nothing was watching.
    tree.write("c.py", "from b import *\n");
    tree.remove("a.py");

    let engine = start_engine(&tree, store.clone()).await;
    let report = engine.initial_scan(&NoopReporter).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.deleted, 1);
    assert!(store.file_record("a.py").await.unwrap().is_none());
    assert!(store.file_record("c.py").await.unwrap().is_some());
}
