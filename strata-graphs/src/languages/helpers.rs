use std::path::{Component, Path};

use tree_sitter::Node;

use crate::adapter::{RawReference, ReferenceBase};

/// Longest hint text kept on an edge.
const MAX_HINT_LEN: usize = 160;

/// Extract the source text for a tree-sitter node.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Text of a field child, if present.
pub fn field_text<'a>(node: Node<'_>, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

/// Find the first child with a specific kind.
pub fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .find(|child| child.kind() == kind)
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn children_by_field<'a>(node: Node<'a>, field: &str) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Kind of the parent node, or "" at the root.
pub fn parent_kind(node: Node<'_>) -> &'static str {
    node.parent().map_or("", |p| p.kind())
}

/// Collapse whitespace runs and cap the length of reference text.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(MAX_HINT_LEN));
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.len() > MAX_HINT_LEN {
        let mut cut = MAX_HINT_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

/// Drop generic arguments: `Vec<T>` becomes `Vec`.
pub fn strip_generics(text: &str) -> &str {
    text.split(['<', '[']).next().unwrap_or(text).trim()
}

pub fn split_path(text: &str, separator: &str) -> Vec<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// Path components of a root-relative file, with the extension dropped
/// from the last one.
pub fn path_segments(relative: &Path) -> Vec<String> {
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str().map(str::to_string),
            _ => None,
        })
        .collect();
    if let Some(last) = segments.last_mut() {
        if let Some((stem, _)) = last.rsplit_once('.') {
            if !stem.is_empty() {
                *last = stem.to_string();
            }
        }
    }
    segments
}

/// Directory components of a root-relative file.
pub fn dir_segments(relative: &Path) -> Vec<String> {
    relative
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    Component::Normal(s) => s.to_str().map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn reference(text: &str, segments: Vec<String>, base: ReferenceBase) -> Option<RawReference> {
    if segments.is_empty() {
        return None;
    }
    Some(RawReference {
        text: collapse_whitespace(text),
        segments,
        base,
    })
}

/// Resolve `.`/`..` segments of a relative specifier against `base`.
pub fn join_relative(base: &[String], specifier: &str) -> Vec<String> {
    let mut out = base.to_vec();
    for part in specifier.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other.to_string()),
        }
    }
    out
}
