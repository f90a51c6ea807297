use std::path::Path;

use tree_sitter::Node;

use crate::adapter::{NodeClass, RawReference, ReferenceBase, WalkContext};
use crate::ir::{EntityKind, ImportSpec};

use super::helpers::{
    children_by_field, find_child_by_kind, named_children, node_text, parent_kind, path_segments,
    reference, split_path,
};
use super::{LanguageSupport, ModuleContext};

#[derive(Debug)]
pub struct PythonSupport;

const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "dict", "enumerate", "filter", "float", "format", "getattr",
    "hasattr", "hash", "id", "input", "int", "isinstance", "issubclass", "iter", "len", "list",
    "map", "max", "min", "next", "object", "open", "print", "range", "repr", "reversed", "round",
    "set", "setattr", "sorted", "str", "sum", "super", "tuple", "type", "vars", "zip",
    "Exception", "ValueError", "TypeError", "KeyError", "RuntimeError", "NotImplementedError",
    "staticmethod", "classmethod", "property",
];

impl LanguageSupport for PythonSupport {
    fn id(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, _source: &str, ctx: &WalkContext) -> NodeClass {
        match node.kind() {
            "function_definition" => NodeClass::Declaration {
                kind: EntityKind::Function,
                anonymous: false,
            },
            "class_definition" => NodeClass::Declaration {
                kind: EntityKind::Class,
                anonymous: false,
            },
            "lambda" => NodeClass::Declaration {
                kind: EntityKind::Function,
                anonymous: true,
            },
            "assignment" if !ctx.in_callable => NodeClass::Declaration {
                kind: EntityKind::Variable,
                anonymous: false,
            },
            "call" => NodeClass::Call,
            "import_statement" | "import_from_statement" => NodeClass::Import,
            "decorator" => match node.named_child(0).map(|n| n.kind()) {
                Some("identifier" | "attribute") => NodeClass::Reference,
                _ => NodeClass::Other,
            },
            "identifier" if is_argument(node) => NodeClass::Reference,
            _ => NodeClass::Other,
        }
    }

    fn declared_names(&self, node: Node<'_>, source: &str) -> Vec<String> {
        if node.kind() == "assignment" {
            let Some(left) = node.child_by_field_name("left") else {
                return Vec::new();
            };
            return match left.kind() {
                "identifier" => vec![node_text(left, source).to_string()],
                "pattern_list" | "tuple_pattern" => named_children(left)
                    .into_iter()
                    .filter(|n| n.kind() == "identifier")
                    .map(|n| node_text(n, source).to_string())
                    .collect(),
                _ => Vec::new(),
            };
        }
        node.child_by_field_name("name")
            .map(|n| vec![node_text(n, source).to_string()])
            .unwrap_or_default()
    }

    fn declaration_body<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        match node.kind() {
            "assignment" => None,
            _ => node.child_by_field_name("body"),
        }
    }

    fn arity(&self, node: Node<'_>, source: &str) -> Option<usize> {
        let params = node.child_by_field_name("parameters")?;
        let names = named_children(params);
        let skip_receiver = names.first().is_some_and(|first| {
            first.kind() == "identifier" && matches!(node_text(*first, source), "self" | "cls")
        });
        Some(names.len() - usize::from(skip_receiver))
    }

    fn supertypes(&self, node: Node<'_>, source: &str) -> Vec<RawReference> {
        let Some(args) = node.child_by_field_name("superclasses") else {
            return Vec::new();
        };
        named_children(args)
            .into_iter()
            .filter(|n| matches!(n.kind(), "identifier" | "attribute"))
            .filter_map(|n| {
                let (segments, base) = flatten(n, source);
                reference(node_text(n, source), segments, base)
            })
            .collect()
    }

    fn receiver_names(&self, node: Node<'_>, source: &str, in_class: bool) -> Vec<String> {
        if !in_class || node.kind() != "function_definition" {
            return Vec::new();
        }
        node.child_by_field_name("parameters")
            .and_then(|p| p.named_child(0))
            .filter(|p| p.kind() == "identifier")
            .map(|p| vec![node_text(p, source).to_string()])
            .unwrap_or_default()
    }

    fn call_reference(&self, node: Node<'_>, source: &str) -> Option<RawReference> {
        let function = node.child_by_field_name("function")?;
        let (segments, base) = flatten(function, source);
        reference(node_text(function, source), segments, base)
    }

    fn value_reference(&self, node: Node<'_>, source: &str) -> Option<RawReference> {
        let target = if node.kind() == "decorator" {
            node.named_child(0)?
        } else {
            node
        };
        let (segments, base) = flatten(target, source);
        reference(node_text(target, source), segments, base)
    }

    fn import_specs(&self, node: Node<'_>, source: &str) -> Vec<ImportSpec> {
        match node.kind() {
            "import_statement" => children_by_field(node, "name")
                .into_iter()
                .filter_map(|n| plain_import(n, source))
                .collect(),
            "import_from_statement" => from_import(node, source),
            _ => Vec::new(),
        }
    }

    fn module_path(&self, relative: &Path) -> Vec<String> {
        let mut segments = path_segments(relative);
        if segments.last().is_some_and(|s| s == "__init__") {
            segments.pop();
        }
        segments
    }

    fn is_package_file(&self, file_name: &str) -> bool {
        matches!(file_name, "__init__.py" | "__init__.pyi")
    }

    fn builtins(&self) -> &'static [&'static str] {
        BUILTINS
    }

    fn constructor_names(&self, _class_name: &str) -> Vec<String> {
        vec!["__init__".to_string()]
    }

    fn import_candidates(&self, importer: &ModuleContext, spec: &ImportSpec) -> Vec<Vec<String>> {
        let mut path = if spec.level == 0 {
            Vec::new()
        } else {
            let mut base = importer.segments.clone();
            if !importer.is_package {
                base.pop();
            }
            for _ in 1..spec.level {
                base.pop();
            }
            base
        };
        path.extend(split_path(&spec.module, "."));
        path.extend(spec.members.iter().cloned());
        vec![path]
    }
}

fn is_argument(node: Node<'_>) -> bool {
    match parent_kind(node) {
        "argument_list" => true,
        "keyword_argument" => node
            .parent()
            .and_then(|p| p.child_by_field_name("value"))
            .is_some_and(|v| v.id() == node.id()),
        _ => false,
    }
}

/// Flatten an attribute chain into name segments.
fn flatten(node: Node<'_>, source: &str) -> (Vec<String>, ReferenceBase) {
    match node.kind() {
        "identifier" => (vec![node_text(node, source).to_string()], ReferenceBase::Name),
        "attribute" => {
            let (mut segments, base) = node
                .child_by_field_name("object")
                .map_or((Vec::new(), ReferenceBase::Expression), |o| flatten(o, source));
            if let Some(attr) = node.child_by_field_name("attribute") {
                segments.push(node_text(attr, source).to_string());
            }
            (segments, base)
        }
        "call" => {
            let (segments, base) = node
                .child_by_field_name("function")
                .map_or((Vec::new(), ReferenceBase::Expression), |f| flatten(f, source));
            match base {
                ReferenceBase::Expression => (segments, base),
                _ => (segments, ReferenceBase::Called),
            }
        }
        "parenthesized_expression" => node
            .named_child(0)
            .map_or((Vec::new(), ReferenceBase::Expression), |n| flatten(n, source)),
        _ => (Vec::new(), ReferenceBase::Expression),
    }
}

/// `import a.b` or `import a.b as c`.
fn plain_import(node: Node<'_>, source: &str) -> Option<ImportSpec> {
    let (module, alias) = match node.kind() {
        "dotted_name" => {
            let module = node_text(node, source).to_string();
            let alias = split_path(&module, ".").into_iter().next()?;
            (module, alias)
        }
        "aliased_import" => {
            let module = node_text(node.child_by_field_name("name")?, source).to_string();
            let alias = node_text(node.child_by_field_name("alias")?, source).to_string();
            (module, alias)
        }
        _ => return None,
    };
    Some(ImportSpec {
        module,
        members: Vec::new(),
        alias,
        level: 0,
    })
}

/// `from .x import y as z`, `from a import *`.
fn from_import(node: Node<'_>, source: &str) -> Vec<ImportSpec> {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return Vec::new();
    };
    let (module, level) = if module_node.kind() == "relative_import" {
        let dots = find_child_by_kind(module_node, "import_prefix")
            .map_or(0, |p| node_text(p, source).chars().filter(|c| *c == '.').count());
        let module = find_child_by_kind(module_node, "dotted_name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default();
        (module, u32::try_from(dots).unwrap_or(u32::MAX))
    } else {
        (node_text(module_node, source).to_string(), 0)
    };

    if find_child_by_kind(node, "wildcard_import").is_some() {
        return vec![ImportSpec {
            module,
            members: Vec::new(),
            alias: "*".to_string(),
            level,
        }];
    }

    children_by_field(node, "name")
        .into_iter()
        .filter_map(|n| {
            let (name_node, alias) = match n.kind() {
                "aliased_import" => (
                    n.child_by_field_name("name")?,
                    n.child_by_field_name("alias")
                        .map(|a| node_text(a, source).to_string()),
                ),
                _ => (n, None),
            };
            let members = split_path(node_text(name_node, source), ".");
            let alias = alias.or_else(|| members.last().cloned())?;
            Some(ImportSpec {
                module: module.clone(),
                members,
                alias,
                level,
            })
        })
        .collect()
}
