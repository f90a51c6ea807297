use std::path::Path;

use tree_sitter::Node;

use crate::adapter::{NodeClass, RawReference, ReferenceBase, WalkContext};
use crate::ir::{EntityKind, ImportSpec};

use super::helpers::{
    children_by_field, dir_segments, find_child_by_kind, named_children, node_text, parent_kind,
    reference, split_path, strip_generics, strip_quotes,
};
use super::{LanguageSupport, ModuleContext};

#[derive(Debug)]
pub struct GoSupport;

const BUILTINS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover", "string", "int", "int64",
    "float64", "byte", "rune", "error",
];

impl LanguageSupport for GoSupport {
    fn id(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, _source: &str, ctx: &WalkContext) -> NodeClass {
        let declaration = |kind| NodeClass::Declaration {
            kind,
            anonymous: false,
        };
        match node.kind() {
            "function_declaration" | "method_declaration" | "method_elem" | "method_spec" => {
                declaration(EntityKind::Function)
            }
            "type_spec" => declaration(EntityKind::Class),
            "func_literal" => NodeClass::Declaration {
                kind: EntityKind::Function,
                anonymous: true,
            },
            "field_declaration" if ctx.in_class && node.child_by_field_name("name").is_some() => {
                declaration(EntityKind::Variable)
            }
            "var_spec" | "const_spec" if !ctx.in_callable => declaration(EntityKind::Variable),
            "call_expression" => NodeClass::Call,
            "import_declaration" => NodeClass::Import,
            "identifier" if parent_kind(node) == "argument_list" => NodeClass::Reference,
            _ => NodeClass::Other,
        }
    }

    fn declared_names(&self, node: Node<'_>, source: &str) -> Vec<String> {
        children_by_field(node, "name")
            .into_iter()
            .map(|n| node_text(n, source).to_string())
            .filter(|n| n != "_")
            .collect()
    }

    fn declaration_body<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        match node.kind() {
            "type_spec" => node.child_by_field_name("type"),
            _ => node.child_by_field_name("body"),
        }
    }

    fn arity(&self, node: Node<'_>, _source: &str) -> Option<usize> {
        let params = node.child_by_field_name("parameters")?;
        Some(
            named_children(params)
                .into_iter()
                .map(|p| match p.kind() {
                    "parameter_declaration" => children_by_field(p, "name").len().max(1),
                    "variadic_parameter_declaration" => 1,
                    _ => 0,
                })
                .sum(),
        )
    }

    fn supertypes(&self, node: Node<'_>, source: &str) -> Vec<RawReference> {
        let Some(ty) = node.child_by_field_name("type") else {
            return Vec::new();
        };
        let embedded: Vec<Node<'_>> = match ty.kind() {
            "struct_type" => find_child_by_kind(ty, "field_declaration_list")
                .map(named_children)
                .unwrap_or_default()
                .into_iter()
                .filter(|f| f.kind() == "field_declaration" && f.child_by_field_name("name").is_none())
                .filter_map(|f| f.child_by_field_name("type"))
                .collect(),
            "interface_type" => named_children(ty)
                .into_iter()
                .filter(|c| c.kind() == "type_elem")
                .filter_map(|c| c.named_child(0))
                .collect(),
            _ => Vec::new(),
        };
        embedded
            .into_iter()
            .filter_map(|t| {
                let text = strip_generics(node_text(t, source).trim_start_matches('*'));
                reference(text, split_path(text, "."), ReferenceBase::Name)
            })
            .collect()
    }

    fn owner_type(&self, node: Node<'_>, source: &str) -> Option<String> {
        if node.kind() != "method_declaration" {
            return None;
        }
        let param = node
            .child_by_field_name("receiver")
            .and_then(|r| find_child_by_kind(r, "parameter_declaration"))?;
        let ty = node_text(param.child_by_field_name("type")?, source);
        let name = strip_generics(ty.trim_start_matches('*'));
        (!name.is_empty()).then(|| name.to_string())
    }

    fn receiver_names(&self, node: Node<'_>, source: &str, _in_class: bool) -> Vec<String> {
        if node.kind() != "method_declaration" {
            return Vec::new();
        }
        node.child_by_field_name("receiver")
            .and_then(|r| find_child_by_kind(r, "parameter_declaration"))
            .and_then(|p| p.child_by_field_name("name"))
            .map(|n| vec![node_text(n, source).to_string()])
            .unwrap_or_default()
    }

    fn call_reference(&self, node: Node<'_>, source: &str) -> Option<RawReference> {
        let function = node.child_by_field_name("function")?;
        let (segments, base) = flatten(function, source);
        reference(node_text(function, source), segments, base)
    }

    fn import_specs(&self, node: Node<'_>, source: &str) -> Vec<ImportSpec> {
        let mut specs = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "import_spec" => specs.extend(import_spec(child, source)),
                "import_spec_list" => specs.extend(
                    named_children(child)
                        .into_iter()
                        .filter(|s| s.kind() == "import_spec")
                        .filter_map(|s| import_spec(s, source)),
                ),
                _ => {}
            }
        }
        specs
    }

    fn module_path(&self, relative: &Path) -> Vec<String> {
        dir_segments(relative)
    }

    /// Files at the root of a source tree are named by their package clause.
    fn declared_module(&self, relative: &Path, root: Node<'_>, source: &str) -> Option<String> {
        if !dir_segments(relative).is_empty() {
            return None;
        }
        let clause = find_child_by_kind(root, "package_clause")?;
        let name = find_child_by_kind(clause, "package_identifier")?;
        Some(node_text(name, source).to_string())
    }

    fn builtins(&self) -> &'static [&'static str] {
        BUILTINS
    }

    fn import_candidates(&self, _importer: &ModuleContext, spec: &ImportSpec) -> Vec<Vec<String>> {
        let path = split_path(&spec.module, "/");
        (0..path.len())
            .map(|start| {
                let mut candidate = path[start..].to_vec();
                candidate.extend(spec.members.iter().cloned());
                candidate
            })
            .collect()
    }
}

fn flatten(node: Node<'_>, source: &str) -> (Vec<String>, ReferenceBase) {
    let empty = || (Vec::new(), ReferenceBase::Expression);
    match node.kind() {
        "identifier" | "field_identifier" | "package_identifier" | "type_identifier" => {
            (vec![node_text(node, source).to_string()], ReferenceBase::Name)
        }
        "selector_expression" => {
            let (mut segments, base) = node
                .child_by_field_name("operand")
                .map_or_else(empty, |o| flatten(o, source));
            if let Some(field) = node.child_by_field_name("field") {
                segments.push(node_text(field, source).to_string());
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
        "parenthesized_expression" => node.named_child(0).map_or_else(empty, |n| flatten(n, source)),
        _ => empty(),
    }
}

fn import_spec(node: Node<'_>, source: &str) -> Option<ImportSpec> {
    let module = strip_quotes(node_text(node.child_by_field_name("path")?, source)).to_string();
    let alias = match node.child_by_field_name("name") {
        Some(name) if name.kind() == "dot" => "*".to_string(),
        Some(name) => node_text(name, source).to_string(),
        None => split_path(&module, "/").pop()?,
    };
    Some(ImportSpec {
        module,
        members: Vec::new(),
        alias,
        level: 0,
    })
}
