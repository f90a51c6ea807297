//! Generic entity extractor.
//!
//! One walker serves every language: the [`LanguageSupport`] classifies
//! nodes and the walker turns declarations into entities, tracks lexical
//! scopes, and records call/import/inheritance/reference facts. Facts whose
//! target is declared in the same file are resolved here; everything else
//! keeps its hint for the cross-reference resolver.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use tracing::{debug, instrument};
use tree_sitter::Node;

use crate::adapter::{self, NodeClass, RawReference, ReferenceBase, WalkContext};
use crate::identity::{self, KeyAllocator};
use crate::ir::{
    EntityDecl, EntityKind, FileExtraction, Receiver, RefHint, RelationFact, RelationKind, Target,
};
use crate::languages::LanguageSupport;
use crate::Result;

/// One file handed to the extractor.
#[derive(Debug, Clone, Copy)]
pub struct SourceUnit<'a> {
    /// Store path; becomes the File node key and the prefix of entity keys.
    pub path: &'a str,
    /// Path relative to its source root, used for module naming.
    pub relative: &'a Path,
    pub text: &'a str,
}

#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    Extracted(FileExtraction),
    /// The file failed to parse; the extraction carries no entities.
    Malformed {
        extraction: FileExtraction,
        message: String,
    },
}

impl ExtractOutcome {
    pub fn extraction(&self) -> &FileExtraction {
        match self {
            Self::Extracted(e) | Self::Malformed { extraction: e, .. } => e,
        }
    }

    pub fn into_extraction(self) -> FileExtraction {
        match self {
            Self::Extracted(e) | Self::Malformed { extraction: e, .. } => e,
        }
    }

    pub fn parse_error(&self) -> Option<&str> {
        match self {
            Self::Extracted(_) => None,
            Self::Malformed { message, .. } => Some(message),
        }
    }
}

/// Parse and extract one file.
#[instrument(skip_all, fields(path = unit.path, language = lang.id()))]
pub fn extract_source(lang: &dyn LanguageSupport, unit: &SourceUnit<'_>) -> Result<ExtractOutcome> {
    let parsed = adapter::parse(lang, unit.text)?;
    let root = parsed.tree.root_node();
    let module_name = module_name(lang, unit.relative, root, unit.text);

    if let Some(err) = parsed.syntax_error {
        debug!(error = %err, "File has syntax errors, extracting nothing");
        return Ok(ExtractOutcome::Malformed {
            extraction: FileExtraction::empty(unit.path, lang.id(), &module_name),
            message: err.to_string(),
        });
    }

    let mut walker = Walker::new(lang, unit, module_name);
    walker.walk_module(root);
    let extraction = walker.finish();
    debug!(
        entities = extraction.entities.len(),
        relations = extraction.relations.len(),
        "Extracted file"
    );
    Ok(ExtractOutcome::Extracted(extraction))
}

/// Qualified module name of a file.
pub fn module_name(lang: &dyn LanguageSupport, relative: &Path, root: Node<'_>, source: &str) -> String {
    if let Some(declared) = lang.declared_module(relative, root, source) {
        if !declared.is_empty() {
            return declared;
        }
    }
    let path = lang.module_path(relative);
    if path.is_empty() {
        file_stem(relative)
    } else {
        path.join(".")
    }
}

/// Module name for a file moved to `new_relative` without content changes.
pub fn relocated_module_name(
    lang: &dyn LanguageSupport,
    new_relative: &Path,
    previous: &FileExtraction,
) -> String {
    if lang.declares_module_in_source() {
        return previous.module_name.clone();
    }
    let path = lang.module_path(new_relative);
    if path.is_empty() {
        previous.module_name.clone()
    } else {
        path.join(".")
    }
}

fn file_stem(relative: &Path) -> String {
    relative
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

// ── Walker ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Module,
    Class,
    Callable,
    /// Members attached to a type declared elsewhere.
    Owner,
}

impl FrameKind {
    fn for_entity(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Module => Self::Module,
            EntityKind::Class => Self::Class,
            EntityKind::Function | EntityKind::Variable => Self::Callable,
        }
    }

    fn is_type(self) -> bool {
        matches!(self, Self::Class | Self::Owner)
    }
}

#[derive(Debug)]
struct Frame {
    /// Entity key, or a synthetic scope for an owner without a local entity.
    scope: String,
    entity: bool,
    segment: Option<String>,
    kind: FrameKind,
    receivers: Vec<String>,
}

#[derive(Debug, Clone)]
struct Member {
    name: String,
    segment: String,
    kind: EntityKind,
    key: String,
}

#[derive(Debug)]
struct Pending {
    kind: RelationKind,
    source: String,
    hint: RefHint,
    line: usize,
    /// Enclosing scopes, innermost first.
    scopes: Vec<(String, FrameKind)>,
    owner_scope: Option<String>,
}

struct Walker<'a> {
    lang: &'a dyn LanguageSupport,
    source: &'a str,
    path: &'a str,
    module_name: String,
    alloc: KeyAllocator,
    frames: Vec<Frame>,
    entities: Vec<EntityDecl>,
    entity_index: HashMap<String, usize>,
    members: HashMap<String, Vec<Member>>,
    predeclared: HashMap<usize, (String, String)>,
    structural: Vec<RelationFact>,
    pending: Vec<Pending>,
    imported: HashSet<String>,
}

impl<'a> Walker<'a> {
    fn new(lang: &'a dyn LanguageSupport, unit: &SourceUnit<'a>, module_name: String) -> Self {
        Self {
            lang,
            source: unit.text,
            path: unit.path,
            module_name,
            alloc: KeyAllocator::new(),
            frames: Vec::new(),
            entities: Vec::new(),
            entity_index: HashMap::new(),
            members: HashMap::new(),
            predeclared: HashMap::new(),
            structural: Vec::new(),
            pending: Vec::new(),
            imported: HashSet::new(),
        }
    }

    fn walk_module(&mut self, root: Node<'_>) {
        let module_key = identity::module_key(self.path);
        let file_key = identity::file_key(self.path);
        let name = identity::last_segment(&self.module_name).to_string();
        let qualified_name = self.module_name.clone();
        self.push_entity(EntityDecl {
            key: module_key.clone(),
            kind: EntityKind::Module,
            name,
            qualified_name,
            parent: file_key.clone(),
            span: root.range().into(),
            arity: None,
            enclosing_type: None,
            supertypes: Vec::new(),
            anonymous: false,
        });
        self.structural.push(RelationFact::structural(
            RelationKind::Contains,
            &file_key,
            &module_key,
            1,
        ));

        self.frames.push(Frame {
            scope: module_key,
            entity: true,
            segment: None,
            kind: FrameKind::Module,
            receivers: Vec::new(),
        });
        self.predeclare(root);
        self.walk_children(root);
        self.frames.pop();
    }

    fn context(&self) -> WalkContext {
        WalkContext {
            in_callable: self.frames.iter().any(|f| f.kind == FrameKind::Callable),
            in_class: self.frames.last().is_some_and(|f| f.kind.is_type()),
        }
    }

    fn walk(&mut self, node: Node<'_>) {
        let ctx = self.context();
        match self.lang.classify(node, self.source, &ctx) {
            NodeClass::Declaration { kind, anonymous } => self.declaration(node, kind, anonymous),
            NodeClass::Impl => self.owner_block(node),
            NodeClass::Call => {
                self.call(node);
                self.walk_children(node);
            }
            NodeClass::Import => self.import(node),
            NodeClass::Reference => self.reference(node),
            NodeClass::Other => self.walk_children(node),
        }
    }

    fn walk_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.walk(child);
        }
    }

    // ── Declarations ───────────────────────────────────────────────

    fn declaration(&mut self, node: Node<'_>, kind: EntityKind, anonymous: bool) {
        if !anonymous {
            if let Some(owner) = self.lang.owner_type(node, self.source) {
                self.with_owner(&owner, |w| w.declare_node(node, kind, false));
                return;
            }
        }
        self.declare_node(node, kind, anonymous);
    }

    fn declare_node(&mut self, node: Node<'_>, kind: EntityKind, anonymous: bool) {
        let names = if anonymous {
            Vec::new()
        } else {
            self.lang.declared_names(node, self.source)
        };
        if !anonymous && names.is_empty() {
            self.walk_children(node);
            return;
        }
        if kind == EntityKind::Variable || names.len() > 1 {
            for name in &names {
                self.declare(kind, Some(name), node);
            }
            self.walk_children(node);
            return;
        }

        let ctx = self.context();
        let (key, segment) = match self.predeclared.remove(&node.id()) {
            Some(found) => found,
            None => self.declare(kind, names.first().map(String::as_str), node),
        };
        if kind == EntityKind::Class {
            self.record_supertypes(node, &key);
        }
        let receivers = if kind == EntityKind::Function {
            self.lang.receiver_names(node, self.source, ctx.in_class)
        } else {
            Vec::new()
        };

        self.frames.push(Frame {
            scope: key,
            entity: true,
            segment: Some(segment),
            kind: FrameKind::for_entity(kind),
            receivers,
        });
        let body = self.lang.declaration_body(node);
        if matches!(kind, EntityKind::Class | EntityKind::Module) {
            self.predeclare(body.unwrap_or(node));
        }
        match body {
            Some(body) if body.id() != node.id() => self.walk(body),
            _ => self.walk_children(node),
        }
        self.frames.pop();
    }

    /// Allocate a key for a declaration in the current scope.
    fn declare(&mut self, kind: EntityKind, name: Option<&str>, node: Node<'_>) -> (String, String) {
        let parent_chain = self.chain();
        let parent = self.parent_key();
        let segment = match name {
            Some(n) => self.alloc.named(&parent_chain, n, kind),
            None => self.alloc.anonymous(&parent),
        };
        let mut chain = parent_chain;
        chain.push(segment.clone());
        let key = identity::entity_key(self.path, &chain, kind);
        let line = node.start_position().row + 1;

        let enclosing_type = self
            .frames
            .last()
            .filter(|f| f.kind.is_type())
            .and_then(|f| f.segment.as_deref())
            .map(|s| identity::declared_name(s).to_string());
        let declared = name.map_or_else(|| segment.clone(), str::to_string);
        let qualified_name = identity::qualified_name(&self.module_name, &chain);
        let arity = match kind {
            EntityKind::Function => self.lang.arity(node, self.source),
            _ => None,
        };

        self.push_entity(EntityDecl {
            key: key.clone(),
            kind,
            name: declared.clone(),
            qualified_name,
            parent: parent.clone(),
            span: node.range().into(),
            arity,
            enclosing_type,
            supertypes: Vec::new(),
            anonymous: name.is_none(),
        });

        if let Some(scope) = self.frames.last().map(|f| f.scope.clone()) {
            self.members.entry(scope).or_default().push(Member {
                name: declared,
                segment: segment.clone(),
                kind,
                key: key.clone(),
            });
        }
        self.structural.push(RelationFact::structural(
            RelationKind::Contains,
            &parent,
            &key,
            line,
        ));
        self.structural.push(RelationFact::structural(
            RelationKind::Defines,
            &identity::file_key(self.path),
            &key,
            line,
        ));
        (key, segment)
    }

    fn push_entity(&mut self, entity: EntityDecl) {
        self.entity_index
            .insert(entity.key.clone(), self.entities.len());
        self.entities.push(entity);
    }

    /// Declare the named classes of a scope before walking it, so members
    /// attached from elsewhere in the scope find their owner.
    fn predeclare(&mut self, container: Node<'_>) {
        let mut cursor = container.walk();
        let children: Vec<Node<'_>> = container.named_children(&mut cursor).collect();
        for child in children {
            self.predeclare_node(child, true);
        }
    }

    fn predeclare_node(&mut self, node: Node<'_>, descend: bool) {
        let ctx = self.context();
        match self.lang.classify(node, self.source, &ctx) {
            NodeClass::Declaration {
                kind: EntityKind::Class,
                anonymous: false,
            } => {
                if self.predeclared.contains_key(&node.id())
                    || self.lang.owner_type(node, self.source).is_some()
                {
                    return;
                }
                let names = self.lang.declared_names(node, self.source);
                if let [name] = names.as_slice() {
                    let declared = self.declare(EntityKind::Class, Some(name), node);
                    self.predeclared.insert(node.id(), declared);
                }
            }
            NodeClass::Other if descend => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.predeclare_node(child, false);
                }
            }
            _ => {}
        }
    }

    fn record_supertypes(&mut self, node: Node<'_>, class_key: &str) {
        let supertypes = self.lang.supertypes(node, self.source);
        if supertypes.is_empty() {
            return;
        }
        if let Some(&idx) = self.entity_index.get(class_key) {
            self.entities[idx]
                .supertypes
                .extend(supertypes.iter().map(|s| s.text.clone()));
        }
        let line = node.start_position().row + 1;
        let scopes = self.scopes();
        for raw in supertypes {
            self.pending.push(Pending {
                kind: RelationKind::Inherits,
                source: class_key.to_string(),
                hint: hint_from_base(raw),
                line,
                scopes: scopes.clone(),
                owner_scope: None,
            });
        }
    }

    /// Walk an impl-style block whose members belong to another type.
    fn owner_block(&mut self, node: Node<'_>) {
        let Some(owner) = self.lang.owner_type(node, self.source) else {
            self.walk_children(node);
            return;
        };
        self.with_owner(&owner, |w| {
            let owner_key = w
                .frames
                .last()
                .filter(|f| f.entity && f.kind == FrameKind::Class)
                .map(|f| f.scope.clone());
            if let Some(owner_key) = owner_key {
                w.record_supertypes(node, &owner_key);
            }
            match w.lang.declaration_body(node) {
                Some(body) => w.walk(body),
                None => w.walk_children(node),
            }
        });
    }

    fn with_owner(&mut self, owner: &str, f: impl FnOnce(&mut Self)) {
        let local = self
            .frames
            .last()
            .and_then(|top| self.member(&top.scope, owner))
            .filter(|m| m.kind == EntityKind::Class);
        let frame = match local {
            Some(m) => Frame {
                scope: m.key,
                entity: true,
                segment: Some(m.segment),
                kind: FrameKind::Class,
                receivers: Vec::new(),
            },
            None => {
                let mut chain = self.chain();
                chain.push(owner.to_string());
                Frame {
                    scope: format!("{}#{}@owner", self.path, chain.join(".")),
                    entity: false,
                    segment: Some(owner.to_string()),
                    kind: FrameKind::Owner,
                    receivers: Vec::new(),
                }
            }
        };
        self.frames.push(frame);
        f(self);
        self.frames.pop();
    }

    // ── References ─────────────────────────────────────────────────

    fn call(&mut self, node: Node<'_>) {
        let Some(raw) = self.lang.call_reference(node, self.source) else {
            return;
        };
        if let Some(hint) = self.hint(raw) {
            self.push_pending(RelationKind::Calls, hint, node);
        }
    }

    fn reference(&mut self, node: Node<'_>) {
        let Some(raw) = self.lang.value_reference(node, self.source) else {
            return;
        };
        if let Some(hint) = self.hint(raw) {
            self.push_pending(RelationKind::References, hint, node);
        }
    }

    fn import(&mut self, node: Node<'_>) {
        let line = node.start_position().row + 1;
        let file_key = identity::file_key(self.path);
        for spec in self.lang.import_specs(node, self.source) {
            if !spec.alias.is_empty() && !spec.is_wildcard() {
                self.imported.insert(spec.alias.clone());
            }
            self.pending.push(Pending {
                kind: RelationKind::Imports,
                source: file_key.clone(),
                hint: RefHint::for_import(spec),
                line,
                scopes: Vec::new(),
                owner_scope: None,
            });
        }
    }

    fn push_pending(&mut self, kind: RelationKind, hint: RefHint, node: Node<'_>) {
        let source = self.parent_key();
        let owner_scope = self
            .frames
            .iter()
            .rev()
            .find(|f| f.kind.is_type())
            .map(|f| f.scope.clone());
        let scopes = self.scopes();
        self.pending.push(Pending {
            kind,
            source,
            hint,
            line: node.start_position().row + 1,
            scopes,
            owner_scope,
        });
    }

    /// Interpret receivers on a raw reference.
    fn hint(&self, raw: RawReference) -> Option<RefHint> {
        let RawReference {
            text,
            mut segments,
            base,
        } = raw;
        let mut receiver = match base {
            ReferenceBase::Name => Receiver::None,
            ReferenceBase::Called => Receiver::Constructed,
            ReferenceBase::Expression => Receiver::Expression,
        };
        if base != ReferenceBase::Expression && segments.len() > 1 {
            if segments[0] == "super" {
                receiver = Receiver::Super;
                segments.remove(0);
            } else if base == ReferenceBase::Name && self.receivers().contains(&segments[0]) {
                receiver = Receiver::SelfValue;
                segments.remove(0);
            }
        } else if segments.len() == 1
            && base == ReferenceBase::Name
            && self.receivers().contains(&segments[0])
        {
            return None;
        }
        if segments.is_empty() {
            return None;
        }
        Some(RefHint {
            text,
            segments,
            receiver,
            import: None,
        })
    }

    fn receivers(&self) -> &[String] {
        for frame in self.frames.iter().rev() {
            if !frame.receivers.is_empty() {
                return &frame.receivers;
            }
            if frame.kind.is_type() {
                break;
            }
        }
        &[]
    }

    // ── Scope bookkeeping ──────────────────────────────────────────

    fn chain(&self) -> Vec<String> {
        self.frames
            .iter()
            .filter_map(|f| f.segment.clone())
            .collect()
    }

    /// Innermost declared entity; the module at top level.
    fn parent_key(&self) -> String {
        self.frames
            .iter()
            .rev()
            .find(|f| f.entity)
            .map_or_else(|| identity::module_key(self.path), |f| f.scope.clone())
    }

    fn scopes(&self) -> Vec<(String, FrameKind)> {
        self.frames
            .iter()
            .rev()
            .map(|f| (f.scope.clone(), f.kind))
            .collect()
    }

    fn member(&self, scope: &str, name: &str) -> Option<Member> {
        self.members
            .get(scope)?
            .iter()
            .rev()
            .find(|m| m.name == name)
            .cloned()
    }

    fn lexical(&self, scopes: &[(String, FrameKind)], name: &str) -> Option<Member> {
        let implicit_self = self.lang.implicit_self();
        scopes.iter().enumerate().find_map(|(depth, (scope, kind))| {
            if kind.is_type() && depth > 0 && !implicit_self {
                return None;
            }
            self.member(scope, name)
        })
    }

    // ── Local resolution ───────────────────────────────────────────

    fn resolve_local(&self, pending: &Pending) -> Option<String> {
        let segments = &pending.hint.segments;
        let head = segments.first()?;
        let mut current = match pending.hint.receiver {
            Receiver::SelfValue => self.member(pending.owner_scope.as_deref()?, head)?,
            Receiver::None | Receiver::Constructed => self.lexical(&pending.scopes, head)?,
            Receiver::Super | Receiver::Expression => return None,
        };
        for segment in &segments[1..] {
            current = self.member(&current.key, segment)?;
        }

        if pending.kind == RelationKind::Calls && current.kind == EntityKind::Class {
            for ctor in self.lang.constructor_names(&current.name) {
                if let Some(found) = self
                    .member(&current.key, &ctor)
                    .filter(|m| m.kind == EntityKind::Function)
                {
                    return Some(found.key);
                }
            }
        }
        Some(current.key)
    }

    fn finish(mut self) -> FileExtraction {
        let mut merged: BTreeMap<String, RelationFact> = BTreeMap::new();
        for fact in std::mem::take(&mut self.structural) {
            merged.entry(fact.identity_key()).or_insert(fact);
        }

        for pending in std::mem::take(&mut self.pending) {
            let target = match pending.kind {
                RelationKind::Imports => None,
                _ => self.resolve_local(&pending),
            };
            if pending.kind == RelationKind::References {
                match &target {
                    None if !self.imported.contains(pending.hint.head()) => continue,
                    Some(key) if *key == pending.source => continue,
                    _ => {}
                }
            }
            let fact = RelationFact {
                kind: pending.kind,
                source: pending.source,
                confidence: if target.is_some() { 1.0 } else { 0.0 },
                target: target.map_or(Target::Unresolved, Target::Resolved),
                hint: Some(pending.hint),
                line: pending.line,
                occurrences: 1,
            };
            match merged.entry(fact.identity_key()) {
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    existing.occurrences += 1;
                    existing.line = existing.line.min(fact.line);
                }
                Entry::Vacant(slot) => {
                    slot.insert(fact);
                }
            }
        }

        FileExtraction {
            path: self.path.to_string(),
            language: self.lang.id().to_string(),
            module_name: self.module_name,
            entities: self.entities,
            relations: merged.into_values().collect(),
        }
    }
}

fn hint_from_base(raw: RawReference) -> RefHint {
    RefHint {
        text: raw.text,
        receiver: match raw.base {
            ReferenceBase::Name => Receiver::None,
            ReferenceBase::Called => Receiver::Constructed,
            ReferenceBase::Expression => Receiver::Expression,
        },
        segments: raw.segments,
        import: None,
    }
}
