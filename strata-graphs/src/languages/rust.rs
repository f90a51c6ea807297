use std::path::Path;

use tree_sitter::Node;

use crate::adapter::{NodeClass, RawReference, ReferenceBase, WalkContext};
use crate::ir::{EntityKind, ImportSpec};

use super::helpers::{
    find_child_by_kind, named_children, node_text, parent_kind, path_segments, reference,
    split_path, strip_generics,
};
use super::{LanguageSupport, ModuleContext};

#[derive(Debug)]
pub struct RustSupport;

const BUILTINS: &[&str] = &[
    "Some", "None", "Ok", "Err", "Box", "Vec", "String", "Option", "Result", "Default", "From",
    "Into", "Arc", "Rc", "HashMap", "HashSet", "BTreeMap", "BTreeSet", "drop", "std", "core",
    "alloc",
];

impl LanguageSupport for RustSupport {
    fn id(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, _source: &str, ctx: &WalkContext) -> NodeClass {
        let declaration = |kind| NodeClass::Declaration {
            kind,
            anonymous: false,
        };
        match node.kind() {
            "function_item" | "function_signature_item" => declaration(EntityKind::Function),
            "struct_item" | "enum_item" | "union_item" | "trait_item" => {
                declaration(EntityKind::Class)
            }
            "mod_item" if node.child_by_field_name("body").is_some() => {
                declaration(EntityKind::Module)
            }
            "const_item" | "static_item" if !ctx.in_callable => declaration(EntityKind::Variable),
            "field_declaration" if ctx.in_class => declaration(EntityKind::Variable),
            "impl_item" => NodeClass::Impl,
            "closure_expression" => NodeClass::Declaration {
                kind: EntityKind::Function,
                anonymous: true,
            },
            "call_expression" => NodeClass::Call,
            "use_declaration" => NodeClass::Import,
            "identifier" if parent_kind(node) == "arguments" => NodeClass::Reference,
            _ => NodeClass::Other,
        }
    }

    fn declared_names(&self, node: Node<'_>, source: &str) -> Vec<String> {
        node.child_by_field_name("name")
            .map(|n| vec![raw_name(node_text(n, source))])
            .unwrap_or_default()
    }

    fn arity(&self, node: Node<'_>, _source: &str) -> Option<usize> {
        let params = node.child_by_field_name("parameters")?;
        Some(
            named_children(params)
                .into_iter()
                .filter(|p| !matches!(p.kind(), "self_parameter" | "attribute_item"))
                .count(),
        )
    }

    fn supertypes(&self, node: Node<'_>, source: &str) -> Vec<RawReference> {
        let types = match node.kind() {
            "impl_item" => node.child_by_field_name("trait").into_iter().collect(),
            "trait_item" => node
                .child_by_field_name("bounds")
                .map(named_children)
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        types
            .into_iter()
            .filter(|t| {
                matches!(
                    t.kind(),
                    "type_identifier" | "scoped_type_identifier" | "generic_type"
                )
            })
            .filter_map(|t| {
                let text = strip_generics(node_text(t, source));
                let segments = split_path(text, "::").into_iter().map(|s| raw_name(&s)).collect();
                reference(text, segments, ReferenceBase::Name)
            })
            .collect()
    }

    fn owner_type(&self, node: Node<'_>, source: &str) -> Option<String> {
        if node.kind() != "impl_item" {
            return None;
        }
        type_name(node.child_by_field_name("type")?, source)
    }

    fn receiver_names(&self, node: Node<'_>, _source: &str, in_class: bool) -> Vec<String> {
        if !in_class || node.kind() == "closure_expression" {
            return Vec::new();
        }
        let mut names = vec!["Self".to_string()];
        let has_self = node
            .child_by_field_name("parameters")
            .is_some_and(|p| find_child_by_kind(p, "self_parameter").is_some());
        if has_self {
            names.push("self".to_string());
        }
        names
    }

    fn call_reference(&self, node: Node<'_>, source: &str) -> Option<RawReference> {
        let function = node.child_by_field_name("function")?;
        let (segments, base) = flatten(function, source);
        reference(node_text(function, source), segments, base)
    }

    fn import_specs(&self, node: Node<'_>, source: &str) -> Vec<ImportSpec> {
        let mut out = Vec::new();
        if let Some(argument) = node.child_by_field_name("argument") {
            collect_use(argument, &[], source, &mut out);
        }
        out
    }

    fn module_path(&self, relative: &Path) -> Vec<String> {
        let segments = path_segments(relative);
        let start = segments
            .iter()
            .position(|s| s == "src")
            .map_or(0, |i| i + 1);
        let mut rest = segments[start..].to_vec();
        match rest.last().map(String::as_str) {
            Some("mod") => {
                rest.pop();
            }
            Some("lib" | "main") if rest.len() == 1 => {
                rest.pop();
            }
            _ => {}
        }
        let mut path = vec!["crate".to_string()];
        path.extend(rest);
        path
    }

    fn is_package_file(&self, file_name: &str) -> bool {
        matches!(file_name, "mod.rs" | "lib.rs" | "main.rs")
    }

    fn builtins(&self) -> &'static [&'static str] {
        BUILTINS
    }

    fn constructor_names(&self, _class_name: &str) -> Vec<String> {
        vec!["new".to_string()]
    }

    fn import_candidates(&self, importer: &ModuleContext, spec: &ImportSpec) -> Vec<Vec<String>> {
        let mut path = split_path(&spec.module, "::");
        path.extend(spec.members.iter().cloned());
        match path.first().map(String::as_str) {
            Some("crate") => vec![path],
            Some("self") => {
                let mut base = importer.segments.clone();
                base.extend(path.into_iter().skip(1));
                vec![base]
            }
            Some("super") => {
                let mut base = importer.segments.clone();
                let mut rest = path.as_slice();
                while let Some(("super", tail)) =
                    rest.split_first().map(|(head, tail)| (head.as_str(), tail))
                {
                    base.pop();
                    rest = tail;
                }
                base.extend(rest.iter().cloned());
                vec![base]
            }
            _ => {
                let mut local = importer.segments.clone();
                local.extend(path.iter().cloned());
                let mut rooted = vec!["crate".to_string()];
                rooted.extend(path.iter().cloned());
                vec![local, rooted, path]
            }
        }
    }
}

fn raw_name(text: &str) -> String {
    text.strip_prefix("r#").unwrap_or(text).to_string()
}

/// Base type name of an impl target: `Foo<T>` and `&mut a::Foo` give `Foo`.
fn type_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "type_identifier" => Some(raw_name(node_text(node, source))),
        "generic_type" | "reference_type" | "pointer_type" => {
            type_name(node.child_by_field_name("type")?, source)
        }
        "scoped_type_identifier" => type_name(node.child_by_field_name("name")?, source),
        _ => {
            let text = strip_generics(node_text(node, source));
            split_path(text, "::").last().map(|s| raw_name(s))
        }
    }
}

/// Flatten a callee path (`a::b`, `x.y.z`, `f()`) into name segments.
fn flatten(node: Node<'_>, source: &str) -> (Vec<String>, ReferenceBase) {
    let empty = || (Vec::new(), ReferenceBase::Expression);
    match node.kind() {
        "identifier" | "type_identifier" | "self" | "super" | "crate" => {
            (vec![raw_name(node_text(node, source))], ReferenceBase::Name)
        }
        "scoped_identifier" | "scoped_type_identifier" => {
            let (mut segments, base) = match node.child_by_field_name("path") {
                Some(path) => flatten(path, source),
                None => (Vec::new(), ReferenceBase::Name),
            };
            if let Some(name) = node.child_by_field_name("name") {
                segments.push(raw_name(node_text(name, source)));
            }
            (segments, base)
        }
        "field_expression" => {
            let (mut segments, base) = node
                .child_by_field_name("value")
                .map_or_else(empty, |v| flatten(v, source));
            if let Some(field) = node.child_by_field_name("field") {
                segments.push(raw_name(node_text(field, source)));
            }
            (segments, base)
        }
        "call_expression" => {
            let (segments, base) = node
                .child_by_field_name("function")
                .map_or_else(empty, |f| flatten(f, source));
            match base {
                ReferenceBase::Expression => (segments, base),
                _ => (segments, ReferenceBase::Called),
            }
        }
        "generic_function" => node
            .child_by_field_name("function")
            .map_or_else(empty, |f| flatten(f, source)),
        "generic_type" => node
            .child_by_field_name("type")
            .map_or_else(empty, |t| flatten(t, source)),
        "parenthesized_expression" => node.named_child(0).map_or_else(empty, |n| flatten(n, source)),
        _ => empty(),
    }
}

fn use_path(node: Node<'_>, source: &str) -> Vec<String> {
    split_path(node_text(node, source), "::")
        .into_iter()
        .map(|s| raw_name(&s))
        .collect()
}

/// Expand a `use` tree into one spec per binding.
fn collect_use(node: Node<'_>, prefix: &[String], source: &str, out: &mut Vec<ImportSpec>) {
    match node.kind() {
        "identifier" | "scoped_identifier" | "crate" | "self" | "super" => {
            let mut path = prefix.to_vec();
            path.extend(use_path(node, source));
            push_use(path, None, out);
        }
        "use_as_clause" => {
            let mut path = prefix.to_vec();
            if let Some(p) = node.child_by_field_name("path") {
                path.extend(use_path(p, source));
            }
            let alias = node
                .child_by_field_name("alias")
                .map(|a| raw_name(node_text(a, source)));
            push_use(path, alias, out);
        }
        "scoped_use_list" => {
            let mut base = prefix.to_vec();
            if let Some(p) = node.child_by_field_name("path") {
                base.extend(use_path(p, source));
            }
            if let Some(list) = node.child_by_field_name("list") {
                for child in named_children(list) {
                    collect_use(child, &base, source, out);
                }
            }
        }
        "use_list" => {
            for child in named_children(node) {
                collect_use(child, prefix, source, out);
            }
        }
        "use_wildcard" => {
            let mut base = prefix.to_vec();
            if let Some(p) = node.named_child(0) {
                base.extend(use_path(p, source));
            }
            out.push(ImportSpec {
                module: base.join("::"),
                members: Vec::new(),
                alias: "*".to_string(),
                level: 0,
            });
        }
        _ => {}
    }
}

fn push_use(mut path: Vec<String>, alias: Option<String>, out: &mut Vec<ImportSpec>) {
    // `use a::{self}` binds `a`.
    if path.len() > 1 && path.last().is_some_and(|s| s == "self") {
        path.pop();
    }
    let Some(last) = path.last().cloned() else {
        return;
    };
    let alias = alias.unwrap_or_else(|| last.clone());
    let spec = if path.len() == 1 {
        ImportSpec {
            module: last,
            members: Vec::new(),
            alias,
            level: 0,
        }
    } else {
        let member = path.pop().unwrap_or_default();
        ImportSpec {
            module: path.join("::"),
            members: vec![member],
            alias,
            level: 0,
        }
    };
    out.push(spec);
}
