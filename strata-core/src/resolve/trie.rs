//! Qualified-name trie used for suffix matching during resolution.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    /// Node keys whose qualified name ends exactly here.
    keys: Vec<String>,
}

/// Node keys indexed by their dotted qualified names.
///
/// Supports exact lookups, lookups by suffix (`Foo.bar` matches
/// `pkg.mod.Foo.bar`), and suffix lookups restricted to a prefix.
#[derive(Debug, Default)]
pub struct QualifiedNameTrie {
    root: TrieNode,
    /// Last segment → qualified names, for suffix queries.
    by_last: HashMap<String, Vec<String>>,
    len: usize,
}

impl QualifiedNameTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, qualified_name: &str, key: &str) {
        let mut node = &mut self.root;
        for part in qualified_name.split('.') {
            node = node.children.entry(part.to_string()).or_default();
        }
        if node.keys.is_empty() {
            let last = qualified_name.rsplit('.').next().unwrap_or(qualified_name);
            self.by_last
                .entry(last.to_string())
                .or_default()
                .push(qualified_name.to_string());
        }
        if !node.keys.iter().any(|k| k == key) {
            node.keys.push(key.to_string());
            node.keys.sort();
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keys registered under exactly `qualified_name`, sorted.
    pub fn get(&self, qualified_name: &str) -> &[String] {
        self.find_node(qualified_name.split('.'))
            .map_or(&[][..], |n| n.keys.as_slice())
    }

    /// Keys whose qualified name ends with `suffix` (segment-aligned).
    pub fn find_ending_with(&self, suffix: &[String]) -> Vec<&str> {
        let Some(last) = suffix.last() else {
            return Vec::new();
        };
        let Some(candidates) = self.by_last.get(last) else {
            return Vec::new();
        };
        candidates
            .iter()
            .filter(|qn| ends_with_segments(qn, suffix))
            .flat_map(|qn| self.get(qn).iter().map(String::as_str))
            .collect()
    }

    /// Keys under `prefix` whose qualified name ends with `suffix`.
    pub fn find_with_prefix_and_suffix(&self, prefix: &[String], suffix: &[String]) -> Vec<&str> {
        let Some(start) = self.find_node(prefix.iter().map(String::as_str)) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        let mut path: Vec<&str> = prefix.iter().map(String::as_str).collect();
        collect(start, &mut path, suffix, &mut results);
        results
    }

    fn find_node<'a>(&self, parts: impl Iterator<Item = &'a str>) -> Option<&TrieNode> {
        let mut node = &self.root;
        for part in parts {
            node = node.children.get(part)?;
        }
        Some(node)
    }
}

fn ends_with_segments(qualified_name: &str, suffix: &[String]) -> bool {
    let parts: Vec<&str> = qualified_name.split('.').collect();
    parts.len() >= suffix.len()
        && parts[parts.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| *a == b.as_str())
}

fn collect<'t: 'p, 'p>(
    node: &'t TrieNode,
    path: &mut Vec<&'p str>,
    suffix: &[String],
    results: &mut Vec<&'t str>,
) {
    if !node.keys.is_empty()
        && path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| *a == b.as_str())
    {
        results.extend(node.keys.iter().map(String::as_str));
    }
    for (part, child) in &node.children {
        path.push(part);
        collect(child, path, suffix, results);
        path.pop();
    }
}
