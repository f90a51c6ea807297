use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use proptest::prelude::*;

use strata_core::progress::NoopReporter;
use strata_core::resolve::Resolver;
use strata_core::store::{GraphStore, SqliteStore};
use strata_core::sync::FileEvent;
use strata_core::types::{EdgeState, FileBatch, FileStatus, NodeKind};
use strata_core::verify::verify;
use strata_graphs::{FileExtraction, LanguageRegistry, RelationKind, SourceUnit, extract_source};
use strata_test::{GraphSnapshot, TestTree, start_engine};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Identifier-safe function names, never Python keywords.
fn arb_names(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("[a-z]{2,8}", 1..max)
        .prop_map(|set| set.into_iter().map(|n| format!("f_{n}")).collect())
}

/// A module whose functions each call the next one; `extra[i]`
/// calls are appended to function `i`.
fn module_source(names: &[String], extra: &BTreeMap<usize, usize>) -> String {
    let mut src = String::new();
    for (i, name) in names.iter().enumerate() {
        src.push_str(&format!("def {name}(x):\n"));
        for line in 0..extra.get(&i).copied().unwrap_or(0) {
            src.push_str(&format!("    print(x + {line})\n"));
        }
        let next = &names[(i + 1) % names.len()];
        src.push_str(&format!("    return {next}(x)\n\n"));
    }
    src
}

fn extract(path: &str, text: &str) -> FileExtraction {
    let registry = LanguageRegistry::new();
    let lang = registry.for_file(Path::new(path)).unwrap();
    let unit = SourceUnit {
        path,
        relative: Path::new(path),
        text,
    };
    extract_source(lang.as_ref(), &unit).unwrap().into_extraction()
}

fn batch(path: &str, text: &str) -> FileBatch {
    FileBatch {
        project: "props".into(),
        content_hash: strata_core::sync::content_hash(text.as_bytes()),
        status: FileStatus::Parsed,
        diagnostic: None,
        extraction: extract(path, text),
    }
}

async fn fresh_store() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    store
        .ensure_project("props", &[PathBuf::from(".")], &[])
        .await
        .unwrap();
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Applying the same extraction twice leaves the graph unchanged.
    #[test]
    fn applying_a_batch_twice_is_idempotent(names in arb_names(8)) {
        let text = module_source(&names, &BTreeMap::new());
        runtime().block_on(async {
            let store = fresh_store().await;
            let resolver = Resolver::new(Arc::new(LanguageRegistry::new()));

            store.apply_file_batch(&batch("m.py", &text)).await.unwrap();
            resolver.run(&store).await.unwrap();
            let once = GraphSnapshot::of(&store).await;

            let outcome = store.apply_file_batch(&batch("m.py", &text)).await.unwrap();
            prop_assert!(!outcome.content_changed);
            resolver.run(&store).await.unwrap();
            let twice = GraphSnapshot::of(&store).await;

            prop_assert_eq!(once, twice);
            Ok(())
        })?;
    }

    /// Editing one function's body never changes any declaration's key.
    #[test]
    fn unrelated_edits_keep_identifiers(
        names in arb_names(8),
        edited in any::<proptest::sample::Index>(),
        lines in 1usize..6,
    ) {
        let before = extract("m.py", &module_source(&names, &BTreeMap::new()));
        let edits: BTreeMap<usize, usize> = [(edited.index(names.len()), lines)].into_iter().collect();
        let after = extract("m.py", &module_source(&names, &edits));

        let keys = |x: &FileExtraction| -> BTreeSet<String> {
            x.entities.iter().map(|e| e.key.clone()).collect()
        };
        prop_assert_eq!(keys(&before), keys(&after));
        for name in &names {
            let key = format!("m.py#{name}@function");
            prop_assert!(before.entity(&key).is_some(), "missing {}", key);
        }
    }

    /// A call resolves once both files are present, whichever came first.
    #[test]
    fn resolution_is_order_independent(callee_first in any::<bool>(), name in "[a-z]{2,8}") {
        let name = format!("f_{name}");
        let callee = format!("def {name}():\n    pass\n");
        let caller = format!("from a import {name}\n\n\ndef run():\n    {name}()\n");
        runtime().block_on(async {
            let store = fresh_store().await;
            let resolver = Resolver::new(Arc::new(LanguageRegistry::new()));
            let order = if callee_first {
                [("a.py", &callee), ("b.py", &caller)]
            } else {
                [("b.py", &caller), ("a.py", &callee)]
            };
            for (path, text) in order {
                store.apply_file_batch(&batch(path, text)).await.unwrap();
                resolver.run(&store).await.unwrap();
            }

            let graph = GraphSnapshot::of(&store).await;
            let target = format!("a.py#{name}@function");
            let calls = graph.edges_of(RelationKind::Calls, "b.py");
            prop_assert!(
                calls.iter().any(|e| e.state == EdgeState::Resolved
                    && e.target_key.as_deref() == Some(target.as_str())),
                "{:?}", calls
            );
            prop_assert_eq!(graph.count_state(EdgeState::Unresolved), 0);
            Ok(())
        })?;
    }

    /// Deleting a file removes its entities and leaves only valid edges.
    #[test]
    fn deletion_cascades(count in 2usize..5, victim in any::<proptest::sample::Index>()) {
        let victim = victim.index(count);
        runtime().block_on(async {
            let tree = TestTree::new();
            for i in 0..count {
                let next = (i + 1) % count;
                tree.write(
                    &format!("m{i}.py"),
                    &format!("from m{next} import g{next}\n\n\ndef g{i}():\n    return g{next}()\n"),
                );
            }
            let store = Arc::new(SqliteStore::in_memory().unwrap());
            let engine = start_engine(&tree, store.clone()).await;
            engine.initial_scan(&NoopReporter).await.unwrap();

            let doomed = format!("m{victim}.py");
            let gone = format!("m{victim}.g{victim}");
            tree.remove(&doomed);
            engine.process_events(vec![FileEvent::deleted(tree.abs(&doomed))]).await;

            let graph = GraphSnapshot::of(store.as_ref()).await;
            prop_assert!(graph.nodes.values().all(|n| n.file_path.as_deref() != Some(doomed.as_str())));
            prop_assert!(graph.key_of(&gone, NodeKind::Function).is_none());
            prop_assert!(!graph.files.contains_key(&doomed));
            for edge in graph.edges.values() {
                if let Some(target) = &edge.target_key {
                    prop_assert!(graph.nodes.contains_key(target), "dangling {}", edge.identity_key);
                }
            }
            let report = verify(store.as_ref()).await.unwrap();
            prop_assert!(report.is_ok(), "{:?}", report.violations);
            Ok(())
        })?;
    }
}
