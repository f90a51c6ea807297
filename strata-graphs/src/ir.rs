//! Language-neutral intermediate representation produced per file.
//!
//! Every grammar adapter populates the same [`FileExtraction`]: a module
//! entity, the entities declared beneath it, and relationship facts whose
//! targets are either keys declared in the same file or hints for the
//! cross-reference resolver.

use serde::{Deserialize, Serialize};

use crate::TextRange;
use crate::identity;

// ── Kinds ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Variable,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Variable => "variable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(Self::Module),
            "class" => Some(Self::Class),
            "function" => Some(Self::Function),
            "variable" => Some(Self::Variable),
            _ => None,
        }
    }

    /// Whether declarations of this kind open a scope for their children.
    pub fn is_scope(&self) -> bool {
        !matches!(self, Self::Variable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    Contains,
    Defines,
    Calls,
    Imports,
    Inherits,
    References,
    Overrides,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::Defines => "DEFINES",
            Self::Calls => "CALLS",
            Self::Imports => "IMPORTS",
            Self::Inherits => "INHERITS",
            Self::References => "REFERENCES",
            Self::Overrides => "OVERRIDES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONTAINS" => Some(Self::Contains),
            "DEFINES" => Some(Self::Defines),
            "CALLS" => Some(Self::Calls),
            "IMPORTS" => Some(Self::Imports),
            "INHERITS" => Some(Self::Inherits),
            "REFERENCES" => Some(Self::References),
            "OVERRIDES" => Some(Self::Overrides),
            _ => None,
        }
    }

    /// Structural edges are always resolved and never carry a hint.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Contains | Self::Defines)
    }
}

// ── Hints ──────────────────────────────────────────────────────────

/// How the first segment of a reference was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    /// Plain or dotted name: `foo()`, `pkg.foo()`.
    #[default]
    None,
    /// Through the method receiver: `self.m()`, `this.m()`.
    SelfValue,
    /// Through the superclass: `super().m()`, `super.m()`.
    Super,
    /// The head segment is itself called: `A().m()`, `new A().m()`.
    Constructed,
    /// The chain starts at an arbitrary expression (`xs[0].m()`).
    Expression,
}

/// An import statement binding, as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportSpec {
    /// Module path as written (`a.b`, `./util`, `crate::x`, `fmt`).
    pub module: String,
    /// Member path imported from the module; empty when the whole module is bound.
    pub members: Vec<String>,
    /// Local binding name; `*` for wildcard imports.
    pub alias: String,
    /// Leading relative dots (Python `from ..x import y`).
    #[serde(default)]
    pub level: u32,
}

impl ImportSpec {
    pub fn is_wildcard(&self) -> bool {
        self.alias == "*"
    }
}

/// Target-name hint retained on every reference-style edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefHint {
    /// Reference text as written, whitespace-collapsed.
    pub text: String,
    /// Normalized name path (receiver stripped).
    pub segments: Vec<String>,
    #[serde(default)]
    pub receiver: Receiver,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportSpec>,
}

impl RefHint {
    pub fn name(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    pub fn head(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }

    pub fn for_import(spec: ImportSpec) -> Self {
        let mut text = spec.module.clone();
        if !spec.members.is_empty() {
            text.push(':');
            text.push_str(&spec.members.join("."));
        }
        text.push_str(" as ");
        text.push_str(&spec.alias);
        Self {
            text,
            segments: spec.members.clone(),
            receiver: Receiver::None,
            import: Some(spec),
        }
    }
}

// ── Entities and facts ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub key: String,
    pub kind: EntityKind,
    pub name: String,
    pub qualified_name: String,
    /// Key of the `CONTAINS` parent (the file key for the module entity).
    pub parent: String,
    pub span: TextRange,
    pub arity: Option<usize>,
    pub enclosing_type: Option<String>,
    pub supertypes: Vec<String>,
    pub anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Resolved(String),
    Unresolved,
}

impl Target {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Resolved(k) => Some(k),
            Self::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationFact {
    pub kind: RelationKind,
    pub source: String,
    pub target: Target,
    pub hint: Option<RefHint>,
    /// 1-based line of the first occurrence.
    pub line: usize,
    pub occurrences: u32,
    pub confidence: f64,
}

impl RelationFact {
    pub fn structural(kind: RelationKind, source: &str, target: &str, line: usize) -> Self {
        Self {
            kind,
            source: source.to_string(),
            target: Target::Resolved(target.to_string()),
            hint: None,
            line,
            occurrences: 1,
            confidence: 1.0,
        }
    }

    /// Merge key of the edge: stable across re-extraction and resolution.
    pub fn identity_key(&self) -> String {
        let spec = match (&self.hint, &self.target) {
            (Some(hint), _) => hint.text.as_str(),
            (None, Target::Resolved(key)) => key.as_str(),
            (None, Target::Unresolved) => "",
        };
        edge_identity(self.kind, &self.source, spec)
    }
}

/// Identity of an edge given its kind, source and target spec.
pub fn edge_identity(kind: RelationKind, source: &str, spec: &str) -> String {
    format!("{}|{source}|{spec}", kind.as_str())
}

// ── Per-file output ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExtraction {
    /// Store path of the file (also the File node key).
    pub path: String,
    pub language: String,
    /// Qualified name of the file's module.
    pub module_name: String,
    /// Declared entities, module first, in source order.
    pub entities: Vec<EntityDecl>,
    /// Relationship facts sorted by identity key.
    pub relations: Vec<RelationFact>,
}

impl FileExtraction {
    /// Extraction with no entities, used for files that failed to parse.
    pub fn empty(path: &str, language: &str, module_name: &str) -> Self {
        Self {
            path: path.to_string(),
            language: language.to_string(),
            module_name: module_name.to_string(),
            entities: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn module_key(&self) -> String {
        identity::module_key(&self.path)
    }

    pub fn entity(&self, key: &str) -> Option<&EntityDecl> {
        self.entities.iter().find(|e| e.key == key)
    }

    pub fn find_by_qualified_name(&self, qualified_name: &str) -> Vec<&EntityDecl> {
        self.entities
            .iter()
            .filter(|e| e.qualified_name == qualified_name)
            .collect()
    }

    pub fn relations_of(&self, kind: RelationKind) -> impl Iterator<Item = &RelationFact> {
        self.relations.iter().filter(move |r| r.kind == kind)
    }

    /// Re-key this extraction for a file that moved to `new_path` with
    /// identical content. In-file scope chains are preserved; qualified
    /// names take the new module name.
    pub fn relocate(&self, new_path: &str, new_module_name: &str) -> Self {
        let old_path = self.path.as_str();
        let rekey = |key: &str| {
            identity::relocate_key(key, old_path, new_path).unwrap_or_else(|| key.to_string())
        };
        let rename = |qn: &str| {
            if qn == self.module_name {
                new_module_name.to_string()
            } else if let Some(rest) = qn.strip_prefix(&format!("{}.", self.module_name)) {
                identity::join_qualified(new_module_name, rest)
            } else {
                qn.to_string()
            }
        };

        let entities = self
            .entities
            .iter()
            .map(|e| EntityDecl {
                key: rekey(&e.key),
                parent: rekey(&e.parent),
                qualified_name: rename(&e.qualified_name),
                name: if e.kind == EntityKind::Module && e.parent == old_path {
                    identity::last_segment(new_module_name).to_string()
                } else {
                    e.name.clone()
                },
                ..e.clone()
            })
            .collect();

        let mut relations: Vec<RelationFact> = self
            .relations
            .iter()
            .map(|r| RelationFact {
                source: rekey(&r.source),
                target: match &r.target {
                    Target::Resolved(k) => Target::Resolved(rekey(k)),
                    Target::Unresolved => Target::Unresolved,
                },
                ..r.clone()
            })
            .collect();
        relations.sort_by_cached_key(RelationFact::identity_key);

        Self {
            path: new_path.to_string(),
            language: self.language.clone(),
            module_name: new_module_name.to_string(),
            entities,
            relations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> TextRange {
        TextRange {
            start_byte: 0,
            end_byte: 1,
            start_row: 0,
            start_col: 0,
            end_row: 0,
            end_col: 1,
        }
    }

    #[test]
    fn kinds_round_trip_through_strings() {
        for kind in [
            EntityKind::Module,
            EntityKind::Class,
            EntityKind::Function,
            EntityKind::Variable,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RelationKind::parse("CALLS"), Some(RelationKind::Calls));
        assert_eq!(RelationKind::parse("calls"), None);
    }

    #[test]
    fn identity_prefers_hint_text_over_target() {
        let hint = RefHint {
            text: "foo".into(),
            segments: vec!["foo".into()],
            receiver: Receiver::None,
            import: None,
        };
        let mut fact = RelationFact {
            kind: RelationKind::Calls,
            source: "a.py#@module".into(),
            target: Target::Unresolved,
            hint: Some(hint),
            line: 3,
            occurrences: 1,
            confidence: 1.0,
        };
        let unresolved = fact.identity_key();
        fact.target = Target::Resolved("a.py#foo@function".into());
        assert_eq!(fact.identity_key(), unresolved);
        assert_eq!(unresolved, "CALLS|a.py#@module|foo");
    }

    #[test]
    fn import_hint_text_includes_alias() {
        let hint = RefHint::for_import(ImportSpec {
            module: "a".into(),
            members: vec!["A".into()],
            alias: "A".into(),
            level: 0,
        });
        assert_eq!(hint.text, "a:A as A");
        assert_eq!(hint.segments, vec!["A".to_string()]);
    }

    #[test]
    fn relocate_rewrites_keys_and_module_names() {
        let extraction = FileExtraction {
            path: "a.py".into(),
            language: "python".into(),
            module_name: "a".into(),
            entities: vec![
                EntityDecl {
                    key: "a.py#@module".into(),
                    kind: EntityKind::Module,
                    name: "a".into(),
                    qualified_name: "a".into(),
                    parent: "a.py".into(),
                    span: span(),
                    arity: None,
                    enclosing_type: None,
                    supertypes: vec![],
                    anonymous: false,
                },
                EntityDecl {
                    key: "a.py#f@function".into(),
                    kind: EntityKind::Function,
                    name: "f".into(),
                    qualified_name: "a.f".into(),
                    parent: "a.py#@module".into(),
                    span: span(),
                    arity: Some(0),
                    enclosing_type: None,
                    supertypes: vec![],
                    anonymous: false,
                },
            ],
            relations: vec![RelationFact::structural(
                RelationKind::Contains,
                "a.py#@module",
                "a.py#f@function",
                1,
            )],
        };

        let moved = extraction.relocate("pkg/b.py", "pkg.b");
        assert_eq!(moved.path, "pkg/b.py");
        assert_eq!(moved.entities[0].key, "pkg/b.py#@module");
        assert_eq!(moved.entities[0].parent, "pkg/b.py");
        assert_eq!(moved.entities[0].name, "b");
        assert_eq!(moved.entities[1].qualified_name, "pkg.b.f");
        assert_eq!(
            moved.relations[0].target,
            Target::Resolved("pkg/b.py#f@function".into())
        );
    }
}
