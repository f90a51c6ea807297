//! Shared rules for the ECMAScript family (JavaScript, TypeScript, TSX).
//!
//! The three grammars agree on the node kinds the extractor cares about;
//! TypeScript only adds interfaces, enums, signatures and typed heritage
//! clauses.

use std::path::Path;

use tree_sitter::Node;

use crate::adapter::{NodeClass, RawReference, ReferenceBase, WalkContext};
use crate::ir::{EntityKind, ImportSpec};

use super::ModuleContext;
use super::helpers::{
    find_child_by_kind, join_relative, named_children, node_text, parent_kind, path_segments,
    reference, split_path, strip_quotes,
};

pub const BUILTINS: &[&str] = &[
    "console", "Object", "Array", "JSON", "Math", "Promise", "String", "Number", "Boolean",
    "Date", "Error", "TypeError", "Symbol", "Map", "Set", "WeakMap", "RegExp", "parseInt",
    "parseFloat", "isNaN", "setTimeout", "setInterval", "clearTimeout", "clearInterval",
    "require", "fetch", "encodeURIComponent", "decodeURIComponent", "document", "window",
    "process", "super",
];

const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts"];

/// Implements [`LanguageSupport`](super::LanguageSupport) for an ECMAScript grammar.
macro_rules! ecma_support {
    ($ty:ident, $id:literal, $exts:expr, $language:expr) => {
        impl $crate::languages::LanguageSupport for $ty {
            fn id(&self) -> &'static str {
                $id
            }

            fn extensions(&self) -> &'static [&'static str] {
                $exts
            }

            fn tree_sitter_language(&self) -> tree_sitter::Language {
                $language.into()
            }

            fn classify(
                &self,
                node: tree_sitter::Node<'_>,
                source: &str,
                ctx: &$crate::adapter::WalkContext,
            ) -> $crate::adapter::NodeClass {
                $crate::languages::ecma::classify(node, source, ctx)
            }

            fn declared_names(&self, node: tree_sitter::Node<'_>, source: &str) -> Vec<String> {
                $crate::languages::ecma::declared_names(node, source)
            }

            fn declaration_body<'t>(
                &self,
                node: tree_sitter::Node<'t>,
            ) -> Option<tree_sitter::Node<'t>> {
                $crate::languages::ecma::declaration_body(node)
            }

            fn arity(&self, node: tree_sitter::Node<'_>, _source: &str) -> Option<usize> {
                $crate::languages::ecma::arity(node)
            }

            fn supertypes(
                &self,
                node: tree_sitter::Node<'_>,
                source: &str,
            ) -> Vec<$crate::adapter::RawReference> {
                $crate::languages::ecma::supertypes(node, source)
            }

            fn receiver_names(
                &self,
                node: tree_sitter::Node<'_>,
                _source: &str,
                in_class: bool,
            ) -> Vec<String> {
                $crate::languages::ecma::receiver_names(node, in_class)
            }

            fn call_reference(
                &self,
                node: tree_sitter::Node<'_>,
                source: &str,
            ) -> Option<$crate::adapter::RawReference> {
                $crate::languages::ecma::call_reference(node, source)
            }

            fn import_specs(
                &self,
                node: tree_sitter::Node<'_>,
                source: &str,
            ) -> Vec<$crate::ir::ImportSpec> {
                $crate::languages::ecma::import_specs(node, source)
            }

            fn module_path(&self, relative: &std::path::Path) -> Vec<String> {
                $crate::languages::ecma::module_path(relative)
            }

            fn is_package_file(&self, file_name: &str) -> bool {
                $crate::languages::ecma::is_package_file(file_name)
            }

            fn builtins(&self) -> &'static [&'static str] {
                $crate::languages::ecma::BUILTINS
            }

            fn constructor_names(&self, _class_name: &str) -> Vec<String> {
                vec!["constructor".to_string()]
            }

            fn import_candidates(
                &self,
                importer: &$crate::languages::ModuleContext,
                spec: &$crate::ir::ImportSpec,
            ) -> Vec<Vec<String>> {
                $crate::languages::ecma::import_candidates(importer, spec)
            }
        }
    };
}

pub(crate) use ecma_support;

fn is_function_value(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

fn function_value(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("value").filter(|v| is_function_value(*v))
}

fn is_require(node: Node<'_>, source: &str) -> bool {
    node.kind() == "call_expression"
        && node
            .child_by_field_name("function")
            .is_some_and(|f| f.kind() == "identifier" && node_text(f, source) == "require")
        && node
            .child_by_field_name("arguments")
            .and_then(|a| a.named_child(0))
            .is_some_and(|a| a.kind() == "string")
}

pub fn classify(node: Node<'_>, source: &str, ctx: &WalkContext) -> NodeClass {
    let declaration = |kind| NodeClass::Declaration {
        kind,
        anonymous: false,
    };
    match node.kind() {
        "function_declaration"
        | "generator_function_declaration"
        | "method_definition"
        | "method_signature"
        | "abstract_method_signature"
        | "function_signature" => declaration(EntityKind::Function),
        "class_declaration"
        | "abstract_class_declaration"
        | "interface_declaration"
        | "enum_declaration" => declaration(EntityKind::Class),
        "class" => NodeClass::Declaration {
            kind: EntityKind::Class,
            anonymous: node.child_by_field_name("name").is_none(),
        },
        "arrow_function" | "function_expression" | "function" | "generator_function" => {
            NodeClass::Declaration {
                kind: EntityKind::Function,
                anonymous: true,
            }
        }
        "variable_declarator" => {
            if function_value(node).is_some() {
                declaration(EntityKind::Function)
            } else if node
                .child_by_field_name("value")
                .is_some_and(|v| is_require(v, source))
            {
                NodeClass::Import
            } else if ctx.in_callable {
                NodeClass::Other
            } else {
                declaration(EntityKind::Variable)
            }
        }
        "field_definition" | "public_field_definition" => {
            if function_value(node).is_some() {
                declaration(EntityKind::Function)
            } else {
                declaration(EntityKind::Variable)
            }
        }
        "call_expression" | "new_expression" => NodeClass::Call,
        "import_statement" => NodeClass::Import,
        "identifier" if parent_kind(node) == "arguments" => NodeClass::Reference,
        _ => NodeClass::Other,
    }
}

pub fn declared_names(node: Node<'_>, source: &str) -> Vec<String> {
    let name = match node.kind() {
        "variable_declarator" => node
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier"),
        "field_definition" => node
            .child_by_field_name("property")
            .or_else(|| node.child_by_field_name("name")),
        _ => node.child_by_field_name("name"),
    };
    name.map(|n| vec![node_text(n, source).to_string()])
        .unwrap_or_default()
}

pub fn declaration_body(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "variable_declarator" | "field_definition" | "public_field_definition" => {
            function_value(node)?.child_by_field_name("body")
        }
        _ => node.child_by_field_name("body"),
    }
}

pub fn arity(node: Node<'_>) -> Option<usize> {
    let function = match node.kind() {
        "variable_declarator" | "field_definition" | "public_field_definition" => {
            function_value(node)?
        }
        _ => node,
    };
    if function.child_by_field_name("parameter").is_some() {
        return Some(1);
    }
    function
        .child_by_field_name("parameters")
        .map(|p| {
            named_children(p)
                .into_iter()
                .filter(|c| c.kind() != "comment")
                .count()
        })
}

pub fn supertypes(node: Node<'_>, source: &str) -> Vec<RawReference> {
    let mut types = Vec::new();
    if let Some(heritage) = find_child_by_kind(node, "class_heritage") {
        for child in named_children(heritage) {
            match child.kind() {
                "extends_clause" | "implements_clause" => types.extend(
                    named_children(child)
                        .into_iter()
                        .filter(|t| t.kind() != "type_arguments"),
                ),
                _ => types.push(child),
            }
        }
    }
    if let Some(extends) = find_child_by_kind(node, "extends_type_clause") {
        types.extend(named_children(extends));
    }
    types
        .into_iter()
        .filter_map(|t| {
            let (segments, base) = flatten(t, source);
            reference(node_text(t, source), segments, base)
        })
        .filter(|r| r.base == ReferenceBase::Name)
        .collect()
}

pub fn receiver_names(node: Node<'_>, in_class: bool) -> Vec<String> {
    // Class-property arrows capture the instance too.
    if in_class && node.kind() != "function_expression" {
        vec!["this".to_string()]
    } else {
        Vec::new()
    }
}

pub fn call_reference(node: Node<'_>, source: &str) -> Option<RawReference> {
    let callee = match node.kind() {
        "new_expression" => node.child_by_field_name("constructor")?,
        _ => node.child_by_field_name("function")?,
    };
    let (segments, base) = flatten(callee, source);
    reference(node_text(callee, source), segments, base)
}

fn flatten(node: Node<'_>, source: &str) -> (Vec<String>, ReferenceBase) {
    let empty = || (Vec::new(), ReferenceBase::Expression);
    match node.kind() {
        "identifier"
        | "this"
        | "super"
        | "type_identifier"
        | "property_identifier"
        | "private_property_identifier" => {
            (vec![node_text(node, source).to_string()], ReferenceBase::Name)
        }
        "member_expression" => {
            let (mut segments, base) = node
                .child_by_field_name("object")
                .map_or_else(empty, |o| flatten(o, source));
            if let Some(property) = node.child_by_field_name("property") {
                segments.push(node_text(property, source).to_string());
            }
            (segments, base)
        }
        "call_expression" | "new_expression" => {
            let callee = node
                .child_by_field_name("function")
                .or_else(|| node.child_by_field_name("constructor"));
            let (segments, base) = callee.map_or_else(empty, |c| flatten(c, source));
            match base {
                ReferenceBase::Expression => (segments, base),
                _ => (segments, ReferenceBase::Called),
            }
        }
        "generic_type" => node
            .child_by_field_name("name")
            .or_else(|| node.named_child(0))
            .map_or_else(empty, |n| flatten(n, source)),
        "nested_type_identifier" | "nested_identifier" => (
            split_path(node_text(node, source), "."),
            ReferenceBase::Name,
        ),
        "parenthesized_expression" | "non_null_expression" => {
            node.named_child(0).map_or_else(empty, |n| flatten(n, source))
        }
        _ => empty(),
    }
}

pub fn import_specs(node: Node<'_>, source: &str) -> Vec<ImportSpec> {
    match node.kind() {
        "import_statement" => es_import(node, source),
        "variable_declarator" => require_import(node, source),
        _ => Vec::new(),
    }
}

fn es_import(node: Node<'_>, source: &str) -> Vec<ImportSpec> {
    let Some(module) = node
        .child_by_field_name("source")
        .map(|s| strip_quotes(node_text(s, source)).to_string())
    else {
        return Vec::new();
    };
    let spec = |members: Vec<String>, alias: String| ImportSpec {
        module: module.clone(),
        members,
        alias,
        level: 0,
    };
    let Some(clause) = find_child_by_kind(node, "import_clause") else {
        return vec![spec(Vec::new(), String::new())];
    };

    let mut out = Vec::new();
    for child in named_children(clause) {
        match child.kind() {
            "identifier" => out.push(spec(
                vec!["default".to_string()],
                node_text(child, source).to_string(),
            )),
            "namespace_import" => {
                if let Some(alias) = find_child_by_kind(child, "identifier") {
                    out.push(spec(Vec::new(), node_text(alias, source).to_string()));
                }
            }
            "named_imports" => {
                for specifier in named_children(child) {
                    if specifier.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name) = specifier.child_by_field_name("name") else {
                        continue;
                    };
                    let name = strip_quotes(node_text(name, source)).to_string();
                    let alias = specifier
                        .child_by_field_name("alias")
                        .map_or_else(|| name.clone(), |a| node_text(a, source).to_string());
                    out.push(spec(vec![name], alias));
                }
            }
            _ => {}
        }
    }
    out
}

/// `const x = require("m")` and `const { a, b: c } = require("m")`.
fn require_import(node: Node<'_>, source: &str) -> Vec<ImportSpec> {
    let Some(call) = node
        .child_by_field_name("value")
        .filter(|v| is_require(*v, source))
    else {
        return Vec::new();
    };
    let Some(module) = call
        .child_by_field_name("arguments")
        .and_then(|a| a.named_child(0))
        .map(|s| strip_quotes(node_text(s, source)).to_string())
    else {
        return Vec::new();
    };
    let spec = |members: Vec<String>, alias: String| ImportSpec {
        module: module.clone(),
        members,
        alias,
        level: 0,
    };
    let Some(name) = node.child_by_field_name("name") else {
        return Vec::new();
    };
    match name.kind() {
        "identifier" => vec![spec(Vec::new(), node_text(name, source).to_string())],
        "object_pattern" => named_children(name)
            .into_iter()
            .filter_map(|p| match p.kind() {
                "shorthand_property_identifier_pattern" => {
                    let n = node_text(p, source).to_string();
                    Some(spec(vec![n.clone()], n))
                }
                "pair_pattern" => {
                    let key = node_text(p.child_by_field_name("key")?, source).to_string();
                    let value = node_text(p.child_by_field_name("value")?, source).to_string();
                    Some(spec(vec![key], value))
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn module_path(relative: &Path) -> Vec<String> {
    let mut segments = path_segments(relative);
    if segments.last().is_some_and(|s| s == "index") {
        segments.pop();
    }
    segments
}

pub fn is_package_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(stem, _)| stem == "index")
}

fn strip_source_extension(specifier: &str) -> &str {
    SOURCE_EXTENSIONS
        .iter()
        .find_map(|ext| {
            specifier
                .strip_suffix(ext)
                .and_then(|s| s.strip_suffix('.'))
        })
        .unwrap_or(specifier)
}

pub fn import_candidates(importer: &ModuleContext, spec: &ImportSpec) -> Vec<Vec<String>> {
    let module = strip_source_extension(&spec.module);
    let mut path = if module.starts_with('.') {
        let mut base = importer.segments.clone();
        if !importer.is_package {
            base.pop();
        }
        let mut joined = join_relative(&base, module);
        if joined.last().is_some_and(|s| s == "index") {
            joined.pop();
        }
        joined
    } else {
        split_path(module, "/")
    };
    path.extend(spec.members.iter().filter(|m| *m != "default").cloned());
    vec![path]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_specifiers_resolve_against_importer() {
        let importer = ModuleContext {
            segments: vec!["web".into(), "app".into()],
            is_package: false,
        };
        let spec = ImportSpec {
            module: "./util/strings.js".into(),
            members: vec!["pad".into()],
            alias: "pad".into(),
            level: 0,
        };
        assert_eq!(
            import_candidates(&importer, &spec),
            vec![vec!["web", "util", "strings", "pad"]]
        );

        let default = ImportSpec {
            module: "../lib".into(),
            members: vec!["default".into()],
            alias: "lib".into(),
            level: 0,
        };
        assert_eq!(import_candidates(&importer, &default), vec![vec!["lib"]]);
    }

    #[test]
    fn index_files_name_their_directory() {
        assert_eq!(module_path(Path::new("web/ui/index.ts")), vec!["web", "ui"]);
        assert_eq!(module_path(Path::new("web/ui/button.tsx")), vec!["web", "ui", "button"]);
        assert!(is_package_file("index.js"));
        assert!(!is_package_file("indexer.js"));
    }
}
