//! Grammar adapter: tree-sitter parsing plus per-node classification.
//!
//! Adapters never touch the graph. They hand the extractor a syntax tree,
//! the first syntax error (if any), and answer classification questions
//! through [`LanguageSupport`].

use tree_sitter::{Node, Tree};

use crate::ir::EntityKind;
use crate::languages::LanguageSupport;
use crate::{GraphError, Result};

/// What a syntax node means to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Declares one or more entities of `kind`.
    Declaration { kind: EntityKind, anonymous: bool },
    /// Attaches its members to another type (`impl Foo { .. }`).
    Impl,
    /// A call or instantiation expression.
    Call,
    /// An import statement.
    Import,
    /// A non-call use of a name (argument values, decorators).
    Reference,
    Other,
}

/// Lexical position of the node being classified.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkContext {
    /// Inside a function, method or lambda body.
    pub in_callable: bool,
    /// Directly inside a class body or type-owner block.
    pub in_class: bool,
}

/// How the head of a reference chain was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceBase {
    /// A name (possibly dotted).
    Name,
    /// A call result (`A().m`).
    Called,
    /// Any other expression.
    Expression,
}

/// Reference shape as written, before receivers are interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    pub text: String,
    pub segments: Vec<String>,
    pub base: ReferenceBase,
}

/// Location of the first syntax error in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}, column {}", self.message, self.line, self.column)
    }
}

#[derive(Debug)]
pub struct ParsedSource {
    pub tree: Tree,
    pub syntax_error: Option<SyntaxError>,
}

/// Parse `text` with the grammar of `lang`.
pub fn parse(lang: &dyn LanguageSupport, text: &str) -> Result<ParsedSource> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&lang.tree_sitter_language())
        .map_err(|e| GraphError::TreeSitter(format!("{}: {e}", lang.id())))?;
    let tree = parser
        .parse(text, None)
        .ok_or_else(|| GraphError::TreeSitter(format!("{}: parser produced no tree", lang.id())))?;
    let syntax_error = first_error(tree.root_node());
    Ok(ParsedSource { tree, syntax_error })
}

fn first_error(node: Node<'_>) -> Option<SyntaxError> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        let message = if node.is_missing() {
            format!("missing `{}`", node.kind())
        } else {
            "unexpected syntax".to_string()
        };
        return Some(SyntaxError {
            line: pos.row + 1,
            column: pos.column + 1,
            message,
        });
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::python::PythonSupport;

    #[test]
    fn clean_source_has_no_syntax_error() {
        let parsed = parse(&PythonSupport, "def f():\n    return 1\n").unwrap();
        assert!(parsed.syntax_error.is_none());
        assert_eq!(parsed.tree.root_node().kind(), "module");
    }

    #[test]
    fn malformed_source_reports_first_error_location() {
        let parsed = parse(&PythonSupport, "x = 1\ndef broken(:\n    pass\n").unwrap();
        let err = parsed.syntax_error.expect("should detect the syntax error");
        assert_eq!(err.line, 2);
        assert!(err.to_string().contains("line 2"));
    }
}
