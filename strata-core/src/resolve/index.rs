//! In-memory view of the stored graph used by one resolver pass.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use strata_graphs::ImportSpec;

use crate::types::{FileRecord, NodeKind, NodeRecord};

use super::trie::QualifiedNameTrie;

/// What the resolver needs to know about a file.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub path: String,
    pub language: String,
    pub module_key: String,
    pub module_name: String,
    pub content_hash: String,
}

/// Nodes, containment, inheritance and import bindings of the graph as it
/// was read at the start of a pass. Conclusions drawn during the pass
/// (new bindings, new supertypes) are added as they are made.
#[derive(Debug, Default)]
pub struct GraphIndex {
    nodes: HashMap<String, NodeRecord>,
    children: HashMap<String, Vec<String>>,
    trie: QualifiedNameTrie,
    files: HashMap<String, FileContext>,
    /// Class → resolved supertype, weighted by declaration position.
    hierarchy: DiGraph<String, usize>,
    class_to_index: HashMap<String, NodeIndex>,
    /// File → alias → imported key.
    bindings: HashMap<String, HashMap<String, String>>,
    /// File → modules imported with a wildcard.
    wildcards: HashMap<String, Vec<String>>,
}

impl GraphIndex {
    pub fn build(nodes: Vec<NodeRecord>, files: &[FileRecord]) -> Self {
        let mut index = Self::default();
        for file in files {
            index.files.insert(
                file.path.clone(),
                FileContext {
                    path: file.path.clone(),
                    language: file.language.clone(),
                    module_key: strata_graphs::identity::module_key(&file.path),
                    module_name: String::new(),
                    content_hash: file.content_hash.clone(),
                },
            );
        }

        let mut ordered: Vec<&NodeRecord> = nodes.iter().collect();
        ordered.sort_by(|a, b| {
            (a.file_path.as_deref(), a.start_line, &a.key)
                .cmp(&(b.file_path.as_deref(), b.start_line, &b.key))
        });
        for node in ordered {
            if let Some(parent) = &node.parent_key {
                index
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .push(node.key.clone());
            }
            if node.kind.is_entity() && !node.anonymous {
                index.trie.insert(&node.qualified_name, &node.key);
            }
            if node.kind == NodeKind::Module {
                if let Some(ctx) = node.file_path.as_ref().and_then(|p| index.files.get_mut(p)) {
                    ctx.module_name.clone_from(&node.qualified_name);
                }
            }
        }

        index.nodes = nodes.into_iter().map(|n| (n.key.clone(), n)).collect();
        index
    }

    pub fn node(&self, key: &str) -> Option<&NodeRecord> {
        self.nodes.get(key)
    }

    pub fn file(&self, path: &str) -> Option<&FileContext> {
        self.files.get(path)
    }

    pub fn classes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values().filter(|n| n.kind == NodeKind::Class)
    }

    /// Entity with exactly this qualified name. Same-named duplicates resolve
    /// to the last declared one; a module wins over other kinds.
    pub fn exact(&self, qualified_name: &str) -> Option<&str> {
        let keys = self.trie.get(qualified_name);
        keys.iter()
            .rev()
            .find(|k| self.kind_of(k) == Some(NodeKind::Module))
            .or_else(|| keys.last())
            .map(String::as_str)
    }

    pub fn kind_of(&self, key: &str) -> Option<NodeKind> {
        self.nodes.get(key).map(|n| n.kind)
    }

    /// Named child of `scope` declared as `name`; the last duplicate wins.
    pub fn member(&self, scope: &str, name: &str) -> Option<&str> {
        self.children
            .get(scope)?
            .iter()
            .rev()
            .filter_map(|k| self.nodes.get(k))
            .find(|n| n.kind.is_entity() && !n.anonymous && n.name == name)
            .map(|n| n.key.as_str())
    }

    /// Follow `path` through named members starting at `start`.
    pub fn walk<'a>(&'a self, start: &'a str, path: &[String]) -> Option<&'a str> {
        let mut current = start;
        for segment in path {
            current = self.member(current, segment)?;
        }
        Some(current)
    }

    /// Innermost class containing `key`, including `key` itself.
    pub fn enclosing_class(&self, key: &str) -> Option<&str> {
        let mut current = self.nodes.get(key)?;
        loop {
            match current.kind {
                NodeKind::Class => return Some(current.key.as_str()),
                NodeKind::Module | NodeKind::File | NodeKind::Project => return None,
                _ => current = self.nodes.get(current.parent_key.as_deref()?)?,
            }
        }
    }

    /// Declared owner type of `key` or its nearest declared ancestor, for
    /// members attached to a type from outside its body.
    pub fn enclosing_type_name(&self, key: &str) -> Option<&str> {
        let mut current = self.nodes.get(key)?;
        loop {
            if let Some(owner) = &current.enclosing_type {
                return Some(owner.as_str());
            }
            if !current.kind.is_entity() || current.kind == NodeKind::Module {
                return None;
            }
            current = self.nodes.get(current.parent_key.as_deref()?)?;
        }
    }

    // ── Inheritance ────────────────────────────────────────────────

    pub fn add_supertype(&mut self, class: &str, parent: &str) {
        let child = self.class_node(class);
        let ancestor = self.class_node(parent);
        if self.hierarchy.find_edge(child, ancestor).is_none() {
            let position = self.hierarchy.edges(child).count();
            self.hierarchy.add_edge(child, ancestor, position);
        }
    }

    fn class_node(&mut self, class: &str) -> NodeIndex {
        if let Some(&ix) = self.class_to_index.get(class) {
            return ix;
        }
        let ix = self.hierarchy.add_node(class.to_string());
        self.class_to_index.insert(class.to_string(), ix);
        ix
    }

    /// Method-resolution order approximation: `class` first, then its
    /// ancestors depth-first, left to right. Cycles are cut.
    pub fn mro<'a>(&'a self, class: &'a str) -> Vec<&'a str> {
        let Some(&start) = self.class_to_index.get(class) else {
            return vec![class];
        };
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(ix) = stack.pop() {
            if !seen.insert(ix) {
                continue;
            }
            order.push(self.hierarchy[ix].as_str());
            let mut parents: Vec<(usize, NodeIndex)> = self
                .hierarchy
                .edges(ix)
                .map(|e| (*e.weight(), e.target()))
                .collect();
            parents.sort_unstable();
            stack.extend(parents.into_iter().rev().map(|(_, target)| target));
        }
        order
    }

    /// Function members of `class`, by declared name.
    pub fn methods(&self, class: &str) -> Vec<(&str, &str)> {
        self.children
            .get(class)
            .into_iter()
            .flatten()
            .filter_map(|k| self.nodes.get(k))
            .filter(|n| n.kind == NodeKind::Function && !n.anonymous)
            .map(|n| (n.name.as_str(), n.key.as_str()))
            .collect()
    }

    // ── Imports ────────────────────────────────────────────────────

    pub fn bind_import(&mut self, file: &str, spec: &ImportSpec, target: &str) {
        if spec.is_wildcard() {
            let modules = self.wildcards.entry(file.to_string()).or_default();
            if !modules.iter().any(|m| m == target) {
                modules.push(target.to_string());
            }
        } else if !spec.alias.is_empty() {
            self.bindings
                .entry(file.to_string())
                .or_default()
                .insert(spec.alias.clone(), target.to_string());
        }
    }

    pub fn binding(&self, file: &str, alias: &str) -> Option<&str> {
        self.bindings.get(file)?.get(alias).map(String::as_str)
    }

    pub fn wildcard_modules(&self, file: &str) -> &[String] {
        self.wildcards.get(file).map_or(&[][..], Vec::as_slice)
    }

    // ── Suffix matching ────────────────────────────────────────────

    pub fn suffix_matches(&self, segments: &[String]) -> Vec<&str> {
        self.trie.find_ending_with(segments)
    }

    pub fn suffix_matches_within(&self, prefix: &[String], segments: &[String]) -> Vec<&str> {
        self.trie.find_with_prefix_and_suffix(prefix, segments)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::FileStatus;

    fn node(key: &str, kind: NodeKind, name: &str, qn: &str, parent: &str) -> NodeRecord {
        NodeRecord {
            key: key.into(),
            kind,
            name: name.into(),
            qualified_name: qn.into(),
            file_path: Some(key.split('#').next().unwrap_or(key).into()),
            parent_key: Some(parent.into()),
            language: Some("python".into()),
            start_line: Some(1),
            end_line: Some(1),
            arity: None,
            enclosing_type: None,
            supertypes: Vec::new(),
            anonymous: false,
        }
    }

    fn file(path: &str) -> FileRecord {
        FileRecord {
            path: path.into(),
            project: "p".into(),
            language: "python".into(),
            content_hash: String::new(),
            version: 1,
            status: FileStatus::Parsed,
            diagnostic: None,
            processed_at: Utc::now(),
        }
    }

    fn sample() -> GraphIndex {
        GraphIndex::build(
            vec![
                node("a.py#@module", NodeKind::Module, "a", "a", "a.py"),
                node("a.py#A@class", NodeKind::Class, "A", "a.A", "a.py#@module"),
                node("a.py#A.m@function", NodeKind::Function, "m", "a.A.m", "a.py#A@class"),
                node("a.py#B@class", NodeKind::Class, "B", "a.B", "a.py#@module"),
                node("a.py#B.n@function", NodeKind::Function, "n", "a.B.n", "a.py#B@class"),
                node("a.py#f@function", NodeKind::Function, "f", "a.f", "a.py#@module"),
                node("a.py#f~2@function", NodeKind::Function, "f", "a.f", "a.py#@module"),
            ],
            &[file("a.py")],
        )
    }

    #[test]
    fn file_context_takes_module_name() {
        let index = sample();
        let ctx = index.file("a.py").unwrap();
        assert_eq!(ctx.module_name, "a");
        assert_eq!(ctx.module_key, "a.py#@module");
    }

    #[test]
    fn duplicates_resolve_to_the_last_declaration() {
        let index = sample();
        assert_eq!(index.exact("a.f"), Some("a.py#f~2@function"));
        assert_eq!(index.member("a.py#@module", "f"), Some("a.py#f~2@function"));
        assert_eq!(index.exact("a"), Some("a.py#@module"));
    }

    #[test]
    fn walk_follows_members() {
        let index = sample();
        let path = vec!["A".to_string(), "m".to_string()];
        assert_eq!(index.walk("a.py#@module", &path), Some("a.py#A.m@function"));
        assert_eq!(index.enclosing_class("a.py#A.m@function"), Some("a.py#A@class"));
        assert_eq!(index.enclosing_class("a.py#f@function"), None);
    }

    #[test]
    fn mro_is_depth_first_and_cycle_safe() {
        let mut index = sample();
        index.add_supertype("a.py#B@class", "a.py#A@class");
        index.add_supertype("a.py#A@class", "a.py#B@class");
        assert_eq!(index.mro("a.py#B@class"), vec!["a.py#B@class", "a.py#A@class"]);
        assert_eq!(index.mro("a.py#f@function"), vec!["a.py#f@function"]);
        assert_eq!(index.methods("a.py#A@class"), vec![("m", "a.py#A.m@function")]);
    }

    #[test]
    fn mro_visits_parents_left_to_right_before_shared_ancestors() {
        let mut index = GraphIndex::default();
        index.add_supertype("D", "B");
        index.add_supertype("D", "C");
        index.add_supertype("B", "A");
        index.add_supertype("C", "A");
        index.add_supertype("D", "B");
        assert_eq!(index.mro("D"), vec!["D", "B", "A", "C"]);
        assert_eq!(index.mro("C"), vec!["C", "A"]);
    }

    #[test]
    fn imports_bind_aliases_and_wildcards() {
        let mut index = sample();
        let named = ImportSpec {
            module: "a".into(),
            members: vec!["A".into()],
            alias: "Alias".into(),
            level: 0,
        };
        let star = ImportSpec {
            module: "a".into(),
            members: Vec::new(),
            alias: "*".into(),
            level: 0,
        };
        index.bind_import("b.py", &named, "a.py#A@class");
        index.bind_import("b.py", &star, "a.py#@module");
        assert_eq!(index.binding("b.py", "Alias"), Some("a.py#A@class"));
        assert_eq!(index.binding("b.py", "*"), None);
        assert_eq!(index.wildcard_modules("b.py"), ["a.py#@module".to_string()]);
    }
}
