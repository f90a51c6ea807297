//! Cross-file reference resolution.
//!
//! The extractor records every call, import, inheritance and reference it
//! cannot bind locally as an unresolved edge carrying a [`RefHint`]. A
//! resolver pass reads the whole stored graph, binds what it can, and
//! writes the conclusions back through the store's guarded
//! [`GraphStore::apply_resolutions`]. A conclusion is dropped when its
//! target has been removed or its owning file has changed since the pass
//! read the graph, so a pass racing a file update never binds an edge
//! under stale imports. Derived
//! `OVERRIDES` edges are recomputed from scratch on every pass.

pub mod index;
pub mod trie;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use strata_graphs::languages::ModuleContext;
use strata_graphs::{LanguageRegistry, LanguageSupport, Receiver, RefHint, RelationKind};
use tracing::{debug, info, instrument};

use crate::store::GraphStore;
use crate::types::{
    EdgeFilter, EdgeRecord, EdgeState, FileRecord, NodeFilter, NodeKind, NodeRecord,
    OverridePair, Resolution,
};

pub use index::{FileContext, GraphIndex};
pub use trie::QualifiedNameTrie;

/// Confidence of a binding through an import or an exact qualified name.
const EXACT: f64 = 1.0;
/// Confidence of a binding through the receiver's class hierarchy.
const HIERARCHY: f64 = 0.9;
/// Confidence of an import bound to the only module with a matching suffix.
const MODULE_SUFFIX: f64 = 0.8;
/// Confidence of a unique suffix match inside the caller's top-level package.
const LOCAL_SUFFIX: f64 = 0.6;
/// Confidence of a unique suffix match anywhere in the project.
const GLOBAL_SUFFIX: f64 = 0.5;

/// Counts reported by one resolver pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    /// Unresolved edges examined.
    pub examined: u64,
    pub resolved: u64,
    pub unresolvable: u64,
    /// Edges left unresolved for a later pass.
    pub pending: u64,
    pub overrides: u64,
}

/// The stored graph as one pass sees it.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub files: Vec<FileRecord>,
    pub nodes: Vec<NodeRecord>,
    /// Resolved `IMPORTS` and `INHERITS` edges.
    pub known: Vec<EdgeRecord>,
    /// Unresolved edges to examine.
    pub pending: Vec<EdgeRecord>,
}

/// Conclusions of a pass, before they are written.
#[derive(Debug, Default)]
pub struct ResolutionPlan {
    pub examined: u64,
    pub resolved: Vec<Resolution>,
    pub unresolvable: Vec<Resolution>,
    pub overrides: Vec<OverridePair>,
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Bound(String, f64),
    Builtin,
    Unknown,
}

/// Binds unresolved edges using each language's resolution rules.
#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<LanguageRegistry>,
}

impl Resolver {
    pub fn new(registry: Arc<LanguageRegistry>) -> Self {
        Self { registry }
    }

    /// Run one full pass against `store`.
    #[instrument(skip_all)]
    pub async fn run(&self, store: &dyn GraphStore) -> crate::error::Result<ResolveReport> {
        let snapshot = Self::snapshot(store).await?;
        let plan = self.plan(snapshot.nodes, &snapshot.files, &snapshot.known, snapshot.pending);
        Self::apply(store, &plan).await
    }

    /// Read what a pass needs. File records come first: every edge read
    /// afterwards is at least as new as the hash its conclusion carries.
    pub async fn snapshot(store: &dyn GraphStore) -> crate::error::Result<Snapshot> {
        let files = store.file_records().await?;
        let nodes = store.find_nodes(&NodeFilter::default()).await?;
        let mut known = store
            .find_edges(&EdgeFilter {
                kind: Some(RelationKind::Imports),
                state: Some(EdgeState::Resolved),
                ..EdgeFilter::default()
            })
            .await?;
        known.extend(
            store
                .find_edges(&EdgeFilter {
                    kind: Some(RelationKind::Inherits),
                    state: Some(EdgeState::Resolved),
                    ..EdgeFilter::default()
                })
                .await?,
        );
        let pending = store
            .find_edges(&EdgeFilter {
                state: Some(EdgeState::Unresolved),
                ..EdgeFilter::default()
            })
            .await?;
        Ok(Snapshot {
            files,
            nodes,
            known,
            pending,
        })
    }

    /// Write a plan's conclusions and derived overrides.
    pub async fn apply(
        store: &dyn GraphStore,
        plan: &ResolutionPlan,
    ) -> crate::error::Result<ResolveReport> {
        let resolved = store.apply_resolutions(&plan.resolved).await?;
        let unresolvable = store.apply_resolutions(&plan.unresolvable).await?;
        let overrides = store.replace_overrides(&plan.overrides).await?;

        let report = ResolveReport {
            examined: plan.examined,
            resolved,
            unresolvable,
            pending: plan.examined.saturating_sub(resolved + unresolvable),
            overrides,
        };
        info!(
            examined = report.examined,
            resolved = report.resolved,
            unresolvable = report.unresolvable,
            pending = report.pending,
            overrides = report.overrides,
            "Resolver pass complete"
        );
        Ok(report)
    }

    /// Compute a pass's conclusions without touching the store.
    ///
    /// `known` holds already-resolved `IMPORTS` and `INHERITS` edges;
    /// `pending` the unresolved edges to examine.
    pub fn plan(
        &self,
        nodes: Vec<NodeRecord>,
        files: &[FileRecord],
        known: &[EdgeRecord],
        mut pending: Vec<EdgeRecord>,
    ) -> ResolutionPlan {
        let mut index = GraphIndex::build(nodes, files);
        let mut plan = ResolutionPlan {
            examined: pending.len() as u64,
            ..ResolutionPlan::default()
        };

        let mut inherits: Vec<(&str, &str, usize)> = Vec::new();
        for edge in known {
            let Some(target) = edge.target_key.as_deref() else {
                continue;
            };
            match edge.kind {
                RelationKind::Imports => {
                    if let Some(spec) = edge.hint.as_ref().and_then(|h| h.import.as_ref()) {
                        index.bind_import(&edge.owner_file, spec, target);
                    }
                }
                RelationKind::Inherits => {
                    inherits.push((edge.source_key.as_str(), target, supertype_position(&index, edge)));
                }
                _ => {}
            }
        }
        inherits.sort_by(|a, b| (a.0, a.2).cmp(&(b.0, b.2)));
        for (class, parent, _) in inherits {
            index.add_supertype(class, parent);
        }

        // Imports first so bindings exist for everything else, then
        // inheritance so hierarchy lookups see every supertype.
        pending.sort_by_key(|e| (pass_rank(e.kind), e.identity_key.clone()));
        for edge in &pending {
            let Some(hint) = edge.hint.as_ref() else {
                continue;
            };
            let Some((ctx, lang)) = self.context(&index, &edge.owner_file) else {
                continue;
            };
            let outcome = match edge.kind {
                RelationKind::Imports => resolve_import(&index, &ctx, lang.as_ref(), hint),
                RelationKind::Inherits => {
                    resolve_name(&index, &ctx, lang.as_ref(), edge, hint, &[NodeKind::Class])
                }
                RelationKind::Calls => {
                    let outcome = resolve_name(
                        &index,
                        &ctx,
                        lang.as_ref(),
                        edge,
                        hint,
                        &[NodeKind::Function, NodeKind::Class, NodeKind::Variable],
                    );
                    self.constructor_of(&index, outcome)
                }
                RelationKind::References => resolve_name(
                    &index,
                    &ctx,
                    lang.as_ref(),
                    edge,
                    hint,
                    &[NodeKind::Function, NodeKind::Class, NodeKind::Variable],
                ),
                _ => Outcome::Unknown,
            };

            match outcome {
                Outcome::Bound(target, confidence) => {
                    debug!(edge = %edge.identity_key, target = %target, confidence, "Bound reference");
                    match edge.kind {
                        RelationKind::Imports => {
                            if let Some(spec) = &hint.import {
                                index.bind_import(&edge.owner_file, spec, &target);
                            }
                        }
                        RelationKind::Inherits => index.add_supertype(&edge.source_key, &target),
                        _ => {}
                    }
                    plan.resolved.push(Resolution {
                        identity_key: edge.identity_key.clone(),
                        target_key: Some(target),
                        confidence,
                        owner_hash: ctx.content_hash.clone(),
                    });
                }
                Outcome::Builtin => plan.unresolvable.push(Resolution {
                    identity_key: edge.identity_key.clone(),
                    target_key: None,
                    confidence: 0.0,
                    owner_hash: ctx.content_hash.clone(),
                }),
                Outcome::Unknown => {}
            }
        }

        plan.overrides = overrides(&index);
        plan
    }

    fn context(
        &self,
        index: &GraphIndex,
        path: &str,
    ) -> Option<(FileContext, Arc<dyn LanguageSupport>)> {
        let ctx = index.file(path)?;
        let lang = self.registry.get(&ctx.language)?;
        Some((ctx.clone(), lang))
    }

    /// A call bound to a class constructs it: bind to the constructor when
    /// the class declares one.
    fn constructor_of(&self, index: &GraphIndex, outcome: Outcome) -> Outcome {
        let Outcome::Bound(target, confidence) = &outcome else {
            return outcome;
        };
        let Some(class) = index.node(target).filter(|n| n.kind == NodeKind::Class) else {
            return outcome;
        };
        let Some(lang) = class.language.as_deref().and_then(|l| self.registry.get(l)) else {
            return outcome;
        };
        lang.constructor_names(&class.name)
            .iter()
            .find_map(|name| {
                index
                    .member(&class.key, name)
                    .filter(|k| index.kind_of(k) == Some(NodeKind::Function))
            })
            .map_or(outcome.clone(), |ctor| {
                Outcome::Bound(ctor.to_string(), *confidence)
            })
    }
}

fn pass_rank(kind: RelationKind) -> u8 {
    match kind {
        RelationKind::Imports => 0,
        RelationKind::Inherits => 1,
        _ => 2,
    }
}

/// Position of an `INHERITS` edge's hint among its class's declared supertypes.
fn supertype_position(index: &GraphIndex, edge: &EdgeRecord) -> usize {
    let text = edge.hint.as_ref().map_or("", |h| h.text.as_str());
    index
        .node(&edge.source_key)
        .and_then(|n| n.supertypes.iter().position(|s| s == text))
        .unwrap_or(usize::MAX)
}

fn module_context(ctx: &FileContext, lang: &dyn LanguageSupport) -> ModuleContext {
    let file_name = Path::new(&ctx.path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    ModuleContext {
        segments: ctx
            .module_name
            .split('.')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        is_package: lang.is_package_file(file_name),
    }
}

// ── Imports ────────────────────────────────────────────────────────

fn resolve_import(
    index: &GraphIndex,
    ctx: &FileContext,
    lang: &dyn LanguageSupport,
    hint: &RefHint,
) -> Outcome {
    let Some(spec) = hint.import.as_ref() else {
        return Outcome::Unknown;
    };
    let candidates = lang.import_candidates(&module_context(ctx, lang), spec);

    for candidate in &candidates {
        if candidate.is_empty() {
            continue;
        }
        if let Some(key) = index.exact(&candidate.join(".")) {
            if key != ctx.module_key {
                return Outcome::Bound(key.to_string(), EXACT);
            }
        }
    }

    // Source roots may add leading package segments the import omits.
    for candidate in &candidates {
        let member_count = spec.members.len().min(candidate.len());
        let (module_path, members) = candidate.split_at(candidate.len() - member_count);
        if module_path.is_empty() {
            continue;
        }
        let modules: Vec<&str> = index
            .suffix_matches(module_path)
            .into_iter()
            .filter(|k| index.kind_of(k) == Some(NodeKind::Module) && *k != ctx.module_key)
            .collect();
        if let [module] = modules[..] {
            if let Some(key) = index.walk(module, members) {
                return Outcome::Bound(key.to_string(), MODULE_SUFFIX);
            }
        }
    }
    Outcome::Unknown
}

// ── Names ──────────────────────────────────────────────────────────

fn resolve_name(
    index: &GraphIndex,
    ctx: &FileContext,
    lang: &dyn LanguageSupport,
    edge: &EdgeRecord,
    hint: &RefHint,
    kinds: &[NodeKind],
) -> Outcome {
    let segments = hint.segments.as_slice();
    let Some((head, rest)) = segments.split_first() else {
        return Outcome::Unknown;
    };
    let accept = |key: &str| index.kind_of(key).is_some_and(|k| kinds.contains(&k));

    match hint.receiver {
        Receiver::SelfValue | Receiver::Super => {
            let skip = usize::from(hint.receiver == Receiver::Super);
            return owning_class(index, ctx, &edge.source_key)
                .and_then(|class| {
                    index
                        .mro(class)
                        .into_iter()
                        .skip(skip)
                        .find_map(|c| index.walk(c, segments).filter(|k| accept(*k)))
                })
                .map_or(Outcome::Unknown, |k| Outcome::Bound(k.to_string(), HIERARCHY));
        }
        Receiver::Expression => return Outcome::Unknown,
        Receiver::None | Receiver::Constructed => {}
    }

    let bound = index.binding(&ctx.path, head);
    if bound.is_none()
        && rest.is_empty()
        && lang.builtins().contains(&head.as_str())
        && index.member(&ctx.module_key, head).is_none()
    {
        return Outcome::Builtin;
    }

    if let Some(key) = bound.and_then(|b| index.walk(b, rest)).filter(|k| accept(*k)) {
        return Outcome::Bound(key.to_string(), EXACT);
    }
    for module in index.wildcard_modules(&ctx.path) {
        if let Some(key) = index.walk(module, segments).filter(|k| accept(*k)) {
            return Outcome::Bound(key.to_string(), EXACT);
        }
    }
    if let Some(key) = index.walk(&ctx.module_key, segments).filter(|k| accept(*k)) {
        return Outcome::Bound(key.to_string(), EXACT);
    }
    if segments.len() > 1 {
        if let Some(key) = index.exact(&segments.join(".")).filter(|k| accept(*k)) {
            return Outcome::Bound(key.to_string(), EXACT);
        }
    }
    if lang.implicit_self() && hint.receiver == Receiver::None {
        let inherited = owning_class(index, ctx, &edge.source_key).and_then(|class| {
            index
                .mro(class)
                .into_iter()
                .find_map(|c| index.walk(c, segments).filter(|k| accept(*k)))
        });
        if let Some(key) = inherited {
            return Outcome::Bound(key.to_string(), HIERARCHY);
        }
    }

    suffix_match(index, ctx, segments, &accept)
}

/// Class whose members `self`/`this` refers to inside `source`.
fn owning_class<'a>(index: &'a GraphIndex, ctx: &FileContext, source: &'a str) -> Option<&'a str> {
    if let Some(class) = index.enclosing_class(source) {
        return Some(class);
    }
    let owner = index.enclosing_type_name(source)?;
    let local = strata_graphs::identity::join_qualified(&ctx.module_name, owner);
    index
        .exact(&local)
        .or_else(|| index.binding(&ctx.path, owner))
        .filter(|k| index.kind_of(k) == Some(NodeKind::Class))
        .or_else(|| {
            let segments: Vec<String> = owner.split('.').map(String::from).collect();
            match index
                .suffix_matches(&segments)
                .into_iter()
                .filter(|k| index.kind_of(k) == Some(NodeKind::Class))
                .collect::<Vec<_>>()[..]
            {
                [only] => Some(only),
                _ => None,
            }
        })
}

fn suffix_match(
    index: &GraphIndex,
    ctx: &FileContext,
    segments: &[String],
    accept: &dyn Fn(&str) -> bool,
) -> Outcome {
    if let Some(top) = ctx.module_name.split('.').next().filter(|s| !s.is_empty()) {
        let prefix = [top.to_string()];
        let local: Vec<&str> = index
            .suffix_matches_within(&prefix, segments)
            .into_iter()
            .filter(|k| accept(*k))
            .collect();
        if let [only] = local[..] {
            return Outcome::Bound(only.to_string(), LOCAL_SUFFIX);
        }
    }
    let global: Vec<&str> = index
        .suffix_matches(segments)
        .into_iter()
        .filter(|k| accept(*k))
        .collect();
    match global[..] {
        [only] => Outcome::Bound(only.to_string(), GLOBAL_SUFFIX),
        _ => Outcome::Unknown,
    }
}

// ── Overrides ──────────────────────────────────────────────────────

/// Every method that redefines a same-named method of an ancestor class.
/// Only the nearest ancestor in resolution order counts.
fn overrides(index: &GraphIndex) -> Vec<OverridePair> {
    let mut pairs = Vec::new();
    for class in index.classes() {
        let order = index.mro(&class.key);
        if order.len() < 2 {
            continue;
        }
        let owner_file = class.file_path.clone().unwrap_or_default();
        for (name, method) in index.methods(&class.key) {
            let overridden = order[1..].iter().find_map(|ancestor| {
                index
                    .member(ancestor, name)
                    .filter(|k| index.kind_of(k) == Some(NodeKind::Function))
            });
            if let Some(overridden) = overridden {
                pairs.push(OverridePair {
                    method: method.to_string(),
                    overridden: overridden.to_string(),
                    owner_file: owner_file.clone(),
                });
            }
        }
    }
    pairs.sort();
    pairs.dedup();
    pairs
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;
    use strata_graphs::{SourceUnit, extract_source};

    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{FileBatch, FileStatus};

    async fn ingest(store: &SqliteStore, registry: &LanguageRegistry, path: &str, text: &str) {
        let lang = registry.for_file(Path::new(path)).unwrap();
        let unit = SourceUnit {
            path,
            relative: Path::new(path),
            text,
        };
        let outcome = extract_source(lang.as_ref(), &unit).unwrap();
        let batch = FileBatch {
            project: "demo".into(),
            content_hash: crate::sync::content_hash(text.as_bytes()),
            status: FileStatus::Parsed,
            diagnostic: None,
            extraction: outcome.into_extraction(),
        };
        store.apply_file_batch(&batch).await.unwrap();
    }

    async fn fixture() -> (SqliteStore, Resolver) {
        let registry = Arc::new(LanguageRegistry::new());
        let store = SqliteStore::in_memory().unwrap();
        store
            .ensure_project("demo", &[PathBuf::from(".")], &[])
            .await
            .unwrap();
        ingest(
            &store,
            &registry,
            "a.py",
            "class A:\n    def m(self):\n        return 1\n\nclass Base:\n    def run(self):\n        pass\n",
        )
        .await;
        ingest(
            &store,
            &registry,
            "b.py",
            "from a import A, Base\n\nclass Child(Base):\n    def run(self):\n        self.helper()\n        print('x')\n\n    def helper(self):\n        A().m()\n",
        )
        .await;
        (store, Resolver::new(registry))
    }

    fn target_of(edges: &[EdgeRecord], kind: RelationKind, text: &str) -> Option<String> {
        edges
            .iter()
            .find(|e| e.kind == kind && e.hint.as_ref().is_some_and(|h| h.text == text))
            .and_then(|e| e.target_key.clone())
    }

    #[tokio::test]
    async fn binds_imports_calls_and_inheritance_across_files() {
        let (store, resolver) = fixture().await;
        let report = resolver.run(&store).await.unwrap();
        assert!(report.resolved > 0);

        let edges = store
            .find_edges(&EdgeFilter {
                owner_file: Some("b.py".into()),
                ..EdgeFilter::default()
            })
            .await
            .unwrap();

        let import = edges
            .iter()
            .find(|e| {
                e.kind == RelationKind::Imports
                    && e.hint
                        .as_ref()
                        .and_then(|h| h.import.as_ref())
                        .is_some_and(|s| s.alias == "A")
            })
            .unwrap();
        assert_eq!(import.target_key.as_deref(), Some("a.py#A@class"));
        assert_eq!(import.state, EdgeState::Resolved);

        assert_eq!(
            target_of(&edges, RelationKind::Inherits, "Base").as_deref(),
            Some("a.py#Base@class")
        );
        let method_call = edges
            .iter()
            .find(|e| {
                e.kind == RelationKind::Calls
                    && e.hint.as_ref().is_some_and(|h| h.name() == "m")
            })
            .unwrap();
        assert_eq!(method_call.target_key.as_deref(), Some("a.py#A.m@function"));
        let helper = edges
            .iter()
            .find(|e| {
                e.kind == RelationKind::Calls
                    && e.hint.as_ref().is_some_and(|h| h.name() == "helper")
            })
            .unwrap();
        assert_eq!(helper.target_key.as_deref(), Some("b.py#Child.helper@function"));
    }

    #[tokio::test]
    async fn builtins_become_unresolvable() {
        let (store, resolver) = fixture().await;
        let report = resolver.run(&store).await.unwrap();
        assert!(report.unresolvable >= 1);

        let unresolvable = store
            .find_edges(&EdgeFilter {
                state: Some(EdgeState::Unresolvable),
                ..EdgeFilter::default()
            })
            .await
            .unwrap();
        assert!(
            unresolvable
                .iter()
                .any(|e| e.hint.as_ref().is_some_and(|h| h.name() == "print"))
        );
    }

    #[tokio::test]
    async fn overrides_follow_inheritance() {
        let (store, resolver) = fixture().await;
        let report = resolver.run(&store).await.unwrap();
        assert_eq!(report.overrides, 1);

        let overrides = store
            .find_edges(&EdgeFilter {
                kind: Some(RelationKind::Overrides),
                ..EdgeFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].source_key, "b.py#Child.run@function");
        assert_eq!(overrides[0].target_key.as_deref(), Some("a.py#Base.run@function"));
    }

    #[tokio::test]
    async fn second_pass_is_stable() {
        let (store, resolver) = fixture().await;
        resolver.run(&store).await.unwrap();
        let before = store.stats().await.unwrap();
        let report = resolver.run(&store).await.unwrap();
        let after = store.stats().await.unwrap();
        assert_eq!(report.resolved, 0);
        assert_eq!(before.total_edges, after.total_edges);
        assert_eq!(before.unresolved_edges, after.unresolved_edges);
    }

    #[tokio::test]
    async fn a_pass_racing_an_edit_never_binds_under_stale_imports() {
        let registry = Arc::new(LanguageRegistry::new());
        let store = SqliteStore::in_memory().unwrap();
        let resolver = Resolver::new(Arc::clone(&registry));
        ingest(&store, &registry, "a.py", "def foo():\n    pass\n").await;
        ingest(&store, &registry, "c.py", "def foo():\n    pass\n").await;
        ingest(&store, &registry, "b.py", "from a import foo\n\n\ndef run():\n    foo()\n").await;

        let snapshot = Resolver::snapshot(&store).await.unwrap();
        let plan = resolver.plan(snapshot.nodes, &snapshot.files, &snapshot.known, snapshot.pending);
        assert!(
            plan.resolved
                .iter()
                .any(|r| r.target_key.as_deref() == Some("a.py#foo@function"))
        );

        ingest(&store, &registry, "b.py", "from c import foo\n\n\ndef run():\n    foo()\n").await;
        let report = Resolver::apply(&store, &plan).await.unwrap();
        assert_eq!(report.resolved, 0);

        resolver.run(&store).await.unwrap();
        let edges = store
            .find_edges(&EdgeFilter {
                owner_file: Some("b.py".into()),
                ..EdgeFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(
            target_of(&edges, RelationKind::Calls, "foo").as_deref(),
            Some("c.py#foo@function")
        );
        let import = edges.iter().find(|e| e.kind == RelationKind::Imports).unwrap();
        assert_eq!(import.target_key.as_deref(), Some("c.py#foo@function"));
    }

    #[tokio::test]
    async fn unknown_names_stay_unresolved() {
        let registry = Arc::new(LanguageRegistry::new());
        let store = SqliteStore::in_memory().unwrap();
        ingest(&store, &registry, "c.py", "import requests\n\ndef f():\n    requests.get('x')\n").await;
        let report = Resolver::new(registry).run(&store).await.unwrap();
        assert_eq!(report.resolved, 0);
        assert_eq!(report.pending, report.examined);
        assert!(report.examined >= 2);
    }

    #[test]
    fn plan_without_edges_is_empty() {
        let resolver = Resolver::new(Arc::new(LanguageRegistry::new()));
        let record = FileRecord {
            path: "x.py".into(),
            project: "p".into(),
            language: "python".into(),
            content_hash: String::new(),
            version: 1,
            status: FileStatus::Parsed,
            diagnostic: None,
            processed_at: Utc::now(),
        };
        let plan = resolver.plan(Vec::new(), &[record], &[], Vec::new());
        assert_eq!(plan.examined, 0);
        assert!(plan.resolved.is_empty());
        assert!(plan.overrides.is_empty());
    }
}
