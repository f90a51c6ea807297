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
pub struct JavaSupport;

const BUILTINS: &[&str] = &[
    "String", "System", "Object", "Integer", "Long", "Double", "Boolean", "Math", "List", "Map",
    "Set", "ArrayList", "HashMap", "HashSet", "Arrays", "Collections", "Objects", "Optional",
    "Thread", "StringBuilder", "Exception", "RuntimeException", "IllegalArgumentException",
    "IllegalStateException",
];

const SOURCE_PREFIXES: &[&[&str]] = &[&["src", "main", "java"], &["src", "test", "java"], &["src"]];

impl LanguageSupport for JavaSupport {
    fn id(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, _source: &str, ctx: &WalkContext) -> NodeClass {
        let declaration = |kind| NodeClass::Declaration {
            kind,
            anonymous: false,
        };
        match node.kind() {
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => declaration(EntityKind::Class),
            "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
                declaration(EntityKind::Function)
            }
            "class_body" if parent_kind(node) == "object_creation_expression" => {
                NodeClass::Declaration {
                    kind: EntityKind::Class,
                    anonymous: true,
                }
            }
            "lambda_expression" => NodeClass::Declaration {
                kind: EntityKind::Function,
                anonymous: true,
            },
            "field_declaration" | "constant_declaration" if ctx.in_class => {
                declaration(EntityKind::Variable)
            }
            "method_invocation" | "object_creation_expression" => NodeClass::Call,
            "import_declaration" => NodeClass::Import,
            "package_declaration" => NodeClass::Other,
            "identifier" if parent_kind(node) == "argument_list" => NodeClass::Reference,
            _ => NodeClass::Other,
        }
    }

    fn declared_names(&self, node: Node<'_>, source: &str) -> Vec<String> {
        match node.kind() {
            "field_declaration" | "constant_declaration" => named_children(node)
                .into_iter()
                .filter(|c| c.kind() == "variable_declarator")
                .filter_map(|d| d.child_by_field_name("name"))
                .map(|n| node_text(n, source).to_string())
                .collect(),
            _ => node
                .child_by_field_name("name")
                .map(|n| vec![node_text(n, source).to_string()])
                .unwrap_or_default(),
        }
    }

    fn declaration_body<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        match node.kind() {
            "class_body" => None,
            _ => node.child_by_field_name("body"),
        }
    }

    fn arity(&self, node: Node<'_>, _source: &str) -> Option<usize> {
        let params = node.child_by_field_name("parameters")?;
        Some(
            named_children(params)
                .into_iter()
                .filter(|p| matches!(p.kind(), "formal_parameter" | "spread_parameter" | "identifier"))
                .count(),
        )
    }

    fn supertypes(&self, node: Node<'_>, source: &str) -> Vec<RawReference> {
        let mut types = Vec::new();
        if let Some(superclass) = node.child_by_field_name("superclass") {
            types.extend(named_children(superclass));
        }
        let lists = [
            node.child_by_field_name("interfaces"),
            find_child_by_kind(node, "extends_interfaces"),
        ];
        for list in lists.into_iter().flatten() {
            for child in named_children(list) {
                if child.kind() == "type_list" {
                    types.extend(named_children(child));
                } else {
                    types.push(child);
                }
            }
        }
        types
            .into_iter()
            .filter_map(|t| {
                let text = strip_generics(node_text(t, source));
                reference(text, split_path(text, "."), ReferenceBase::Name)
            })
            .collect()
    }

    fn receiver_names(&self, node: Node<'_>, _source: &str, in_class: bool) -> Vec<String> {
        if in_class && node.kind() != "lambda_expression" {
            vec!["this".to_string()]
        } else {
            Vec::new()
        }
    }

    fn call_reference(&self, node: Node<'_>, source: &str) -> Option<RawReference> {
        if node.kind() == "object_creation_expression" {
            let text = strip_generics(node_text(node.child_by_field_name("type")?, source));
            return reference(text, split_path(text, "."), ReferenceBase::Name);
        }
        let name = node.child_by_field_name("name")?;
        let (mut segments, base) = match node.child_by_field_name("object") {
            Some(object) => flatten(object, source),
            None => (Vec::new(), ReferenceBase::Name),
        };
        segments.push(node_text(name, source).to_string());
        reference(callee_text(node, source), segments, base)
    }

    fn import_specs(&self, node: Node<'_>, source: &str) -> Vec<ImportSpec> {
        let Some(path) = named_children(node)
            .into_iter()
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
        else {
            return Vec::new();
        };
        let mut segments = split_path(node_text(path, source), ".");
        if find_child_by_kind(node, "asterisk").is_some() {
            return vec![ImportSpec {
                module: segments.join("."),
                members: Vec::new(),
                alias: "*".to_string(),
                level: 0,
            }];
        }
        let Some(member) = segments.pop() else {
            return Vec::new();
        };
        vec![ImportSpec {
            module: segments.join("."),
            members: vec![member.clone()],
            alias: member,
            level: 0,
        }]
    }

    fn module_path(&self, relative: &Path) -> Vec<String> {
        let mut dirs = path_segments(relative);
        dirs.pop();
        for prefix in SOURCE_PREFIXES {
            if dirs.len() >= prefix.len() && dirs.iter().zip(prefix.iter()).all(|(a, b)| a == b) {
                return dirs.split_off(prefix.len());
            }
        }
        dirs
    }

    fn declared_module(&self, _relative: &Path, root: Node<'_>, source: &str) -> Option<String> {
        let package = find_child_by_kind(root, "package_declaration")?;
        named_children(package)
            .into_iter()
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
            .map(|n| node_text(n, source).to_string())
    }

    fn declares_module_in_source(&self) -> bool {
        true
    }

    fn builtins(&self) -> &'static [&'static str] {
        BUILTINS
    }

    fn constructor_names(&self, class_name: &str) -> Vec<String> {
        vec![class_name.to_string()]
    }

    fn implicit_self(&self) -> bool {
        true
    }

    fn import_candidates(&self, _importer: &ModuleContext, spec: &ImportSpec) -> Vec<Vec<String>> {
        let mut path = split_path(&spec.module, ".");
        path.extend(spec.members.iter().cloned());
        vec![path]
    }
}

fn callee_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    let start = node
        .child_by_field_name("object")
        .unwrap_or(node)
        .start_byte();
    let end = node
        .child_by_field_name("name")
        .map_or(node.end_byte(), |n| n.end_byte());
    &source[start..end]
}

fn flatten(node: Node<'_>, source: &str) -> (Vec<String>, ReferenceBase) {
    let empty = || (Vec::new(), ReferenceBase::Expression);
    match node.kind() {
        "identifier" | "this" | "super" | "type_identifier" => {
            (vec![node_text(node, source).to_string()], ReferenceBase::Name)
        }
        "field_access" => {
            let (mut segments, base) = node
                .child_by_field_name("object")
                .map_or_else(empty, |o| flatten(o, source));
            if let Some(field) = node.child_by_field_name("field") {
                segments.push(node_text(field, source).to_string());
            }
            (segments, base)
        }
        "method_invocation" => {
            let (mut segments, base) = match node.child_by_field_name("object") {
                Some(object) => flatten(object, source),
                None => (Vec::new(), ReferenceBase::Name),
            };
            if let Some(name) = node.child_by_field_name("name") {
                segments.push(node_text(name, source).to_string());
            }
            match base {
                ReferenceBase::Expression => (segments, base),
                _ => (segments, ReferenceBase::Called),
            }
        }
        "object_creation_expression" => {
            let segments = node
                .child_by_field_name("type")
                .map(|t| split_path(strip_generics(node_text(t, source)), "."))
                .unwrap_or_default();
            (segments, ReferenceBase::Called)
        }
        "scoped_identifier" | "scoped_type_identifier" => {
            (split_path(node_text(node, source), "."), ReferenceBase::Name)
        }
        "parenthesized_expression" => node.named_child(0).map_or_else(empty, |n| flatten(n, source)),
        _ => empty(),
    }
}
