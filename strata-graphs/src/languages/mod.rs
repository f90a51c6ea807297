mod ecma;
pub mod go;
mod helpers;
pub mod java;
pub mod javascript;
pub mod python;
pub mod rust;
pub mod typescript;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tree_sitter::Node;

use crate::adapter::{NodeClass, RawReference, WalkContext};
use crate::ir::ImportSpec;

/// Module of an importing file, as seen by import-path rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleContext {
    /// Qualified name segments of the importing module.
    pub segments: Vec<String>,
    /// The file is its directory's package file (`__init__.py`, `index.js`, `mod.rs`).
    pub is_package: bool,
}

/// Trait implemented by each language's grammar adapter.
///
/// Classification and the small set of naming questions below are all the
/// extractor needs to turn a syntax tree into the shared IR; the last group
/// of methods carries the language's resolution rules to the
/// cross-reference resolver.
pub trait LanguageSupport: Send + Sync + std::fmt::Debug {
    /// Language identifier (e.g., "rust", "python").
    fn id(&self) -> &'static str;

    /// File extensions this language handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Tree-sitter language for parsing.
    fn tree_sitter_language(&self) -> tree_sitter::Language;

    // ── Classification ─────────────────────────────────────────────

    fn classify(&self, node: Node<'_>, source: &str, ctx: &WalkContext) -> NodeClass;

    /// Names declared by a declaration node. Variables may declare several.
    fn declared_names(&self, node: Node<'_>, source: &str) -> Vec<String> {
        helpers::field_text(node, "name", source)
            .map(|n| vec![n.to_string()])
            .unwrap_or_default()
    }

    /// Node whose children form the declaration's scope.
    fn declaration_body<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        node.child_by_field_name("body")
    }

    fn arity(&self, node: Node<'_>, _source: &str) -> Option<usize> {
        node.child_by_field_name("parameters")
            .map(|p| p.named_child_count())
    }

    /// Declared supertypes of a class-like declaration (or the trait of an impl).
    fn supertypes(&self, _node: Node<'_>, _source: &str) -> Vec<RawReference> {
        Vec::new()
    }

    /// Type that owns the members of an impl block or a receiver method.
    fn owner_type(&self, _node: Node<'_>, _source: &str) -> Option<String> {
        None
    }

    /// Names that denote the receiver inside a callable declaration.
    fn receiver_names(&self, _node: Node<'_>, _source: &str, _in_class: bool) -> Vec<String> {
        Vec::new()
    }

    fn call_reference(&self, node: Node<'_>, source: &str) -> Option<RawReference>;

    fn value_reference(&self, node: Node<'_>, source: &str) -> Option<RawReference> {
        let text = helpers::node_text(node, source);
        Some(RawReference {
            text: text.to_string(),
            segments: vec![text.to_string()],
            base: crate::adapter::ReferenceBase::Name,
        })
    }

    fn import_specs(&self, node: Node<'_>, source: &str) -> Vec<ImportSpec>;

    // ── Module naming ──────────────────────────────────────────────

    /// Module path derived from a root-relative file path.
    fn module_path(&self, relative: &Path) -> Vec<String>;

    /// Module name declared in the source itself (Java `package`).
    fn declared_module(&self, _relative: &Path, _root: Node<'_>, _source: &str) -> Option<String> {
        None
    }

    /// Whether `declared_module` takes precedence over the file path.
    fn declares_module_in_source(&self) -> bool {
        false
    }

    fn is_package_file(&self, _file_name: &str) -> bool {
        false
    }

    // ── Resolution rules ───────────────────────────────────────────

    /// Names that are always provided by the language runtime.
    fn builtins(&self) -> &'static [&'static str] {
        &[]
    }

    /// Member names that construct an instance of `class_name`.
    fn constructor_names(&self, _class_name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Unqualified calls inside a class may target its members.
    fn implicit_self(&self) -> bool {
        false
    }

    /// Candidate absolute qualified paths for an import, best first.
    fn import_candidates(&self, importer: &ModuleContext, spec: &ImportSpec) -> Vec<Vec<String>>;
}

/// How a file maps onto the registered languages.
#[derive(Debug, Clone)]
pub enum Detection {
    Supported(Arc<dyn LanguageSupport>),
    /// The extension names a language without an enabled grammar.
    Unsupported(String),
    /// Not a source file.
    Unknown,
}

/// Registry of all supported languages.
#[derive(Debug)]
pub struct LanguageRegistry {
    languages: HashMap<String, Arc<dyn LanguageSupport>>,
    extension_map: HashMap<String, String>,
    disabled: HashSet<String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            languages: HashMap::new(),
            extension_map: HashMap::new(),
            disabled: HashSet::new(),
        };
        reg.register(Arc::new(rust::RustSupport));
        reg.register(Arc::new(python::PythonSupport));
        reg.register(Arc::new(typescript::TypeScriptSupport));
        reg.register(Arc::new(typescript::TsxSupport));
        reg.register(Arc::new(javascript::JavaScriptSupport));
        reg.register(Arc::new(go::GoSupport));
        reg.register(Arc::new(java::JavaSupport));
        reg
    }

    fn register(&mut self, lang: Arc<dyn LanguageSupport>) {
        for ext in lang.extensions() {
            self.extension_map
                .insert((*ext).to_string(), lang.id().to_string());
        }
        self.languages.insert(lang.id().to_string(), lang);
    }

    /// Map an extension to a language id, which need not have a grammar.
    pub fn map_extension(&mut self, ext: &str, language: &str) {
        self.extension_map
            .insert(ext.trim_start_matches('.').to_string(), language.to_string());
    }

    /// Keep only the given languages enabled. An empty list enables all.
    pub fn restrict_to(&mut self, enabled: &[String]) {
        if enabled.is_empty() {
            self.disabled.clear();
            return;
        }
        self.disabled = self
            .languages
            .keys()
            .filter(|id| !enabled.iter().any(|e| e == *id))
            .cloned()
            .collect();
    }

    /// Classify a file by its extension.
    pub fn detect(&self, path: &Path) -> Detection {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Detection::Unknown;
        };
        let Some(lang_id) = self.extension_map.get(ext) else {
            return Detection::Unknown;
        };
        match self.languages.get(lang_id) {
            Some(lang) if !self.disabled.contains(lang_id) => Detection::Supported(lang.clone()),
            _ => Detection::Unsupported(lang_id.clone()),
        }
    }

    /// Look up the language support for a file by its extension.
    pub fn for_file(&self, path: &Path) -> Option<Arc<dyn LanguageSupport>> {
        match self.detect(path) {
            Detection::Supported(lang) => Some(lang),
            _ => None,
        }
    }

    /// Get a language by its identifier.
    pub fn get(&self, id: &str) -> Option<Arc<dyn LanguageSupport>> {
        self.languages.get(id).cloned()
    }

    /// Whether the extension belongs to any mapped language, supported or not.
    pub fn is_source_extension(&self, ext: &str) -> bool {
        self.extension_map.contains_key(ext)
    }

    /// List all registered language IDs, sorted.
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
