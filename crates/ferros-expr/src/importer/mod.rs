//! # Declaration Importer
//!
//! Copies declarations from one store into another.
//!
//! ## Copies
//!
//! Every copy is memoised per destination store, keyed by the source
//! declaration, so asking for the same declaration twice always yields the same
//! copy. Aggregates (records, enums, interfaces) are copied as forward-declared
//! shells; their members are imported only when the shell is completed. The
//! shell is memoised before any type it mentions is copied, which is what makes
//! self-referential and mutually referential types terminate.
//!
//! ## Origins
//!
//! Each copy records the declaration it stands for. Origins are collapsed to
//! the true original when the source is itself a copy, and validated against
//! the store liveness table whenever they are followed.
//!
//! ## Equivalence Maps
//!
//! Namespace and interface copies get an equivalence map, filled by the
//! destination's [`MapCompleter`], listing every per-image declaration the
//! copy stands for.

pub mod maps;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

pub use maps::{InterfaceEntry, InterfaceMap, NamespaceEntry, NamespaceMap};
use tracing::{debug, trace};

use crate::ast::{
    AstId, AstStore, BuiltinType, Completeness, Decl, DeclId, DeclKind, DeclKindTag, DeclName, DeclRef, EnumDecl, FieldDecl,
    FunctionDecl, FunctionType, InterfaceDecl, MethodDecl, Type, VariableDecl,
};
use crate::error::{ExprError, ExprResult};

/// Fills equivalence maps for a destination store.
pub trait MapCompleter
{
    /// Add every image namespace named `name` to `map`.
    ///
    /// With a non-empty `parent` the search is restricted to children of the
    /// namespaces listed there; otherwise each image's root namespace is
    /// searched.
    fn complete_namespace_map(&self, map: &mut NamespaceMap, name: &str, parent: Option<&NamespaceMap>);

    /// Add every image interface named `name` to `map`.
    fn complete_interface_map(&self, map: &mut InterfaceMap, name: &str);
}

/// Memo and origin tables of one destination store.
#[derive(Default)]
struct DestinationTables
{
    copies: HashMap<DeclRef, DeclId>,
    origins: HashMap<DeclId, DeclRef>,
    namespace_maps: HashMap<DeclId, NamespaceMap>,
    interface_maps: HashMap<DeclId, InterfaceMap>,
    /// Maps searched before the namespace they belong to was copied, keyed
    /// by the image namespace being copied.
    staged_namespace_maps: HashMap<DeclRef, NamespaceMap>,
    completer: Option<Weak<dyn MapCompleter>>,
}

impl DestinationTables
{
    fn forget_source(&mut self, source: AstId)
    {
        self.copies.retain(|from, _| from.ast != source);
        self.origins.retain(|_, origin| origin.ast != source);
        self.staged_namespace_maps.retain(|from, _| from.ast != source);
        for map in self.namespace_maps.values_mut() {
            map.forget_ast(source);
        }
        for map in self.interface_maps.values_mut() {
            map.forget_ast(source);
        }
    }
}

/// Declarations that can be merged with a same-named declaration already
/// present in the destination.
fn is_mergeable(kind: &DeclKind) -> bool
{
    matches!(
        kind,
        DeclKind::Namespace | DeclKind::Record(_) | DeclKind::Enum(_) | DeclKind::Interface(_)
    )
}

/// The kind a fresh copy starts out with: aggregates forward-declared and all
/// type references cleared until they have been copied themselves.
fn shell_kind(kind: &DeclKind) -> DeclKind
{
    let placeholder = || Type::Builtin(BuiltinType::Void);
    match kind {
        DeclKind::TranslationUnit => DeclKind::TranslationUnit,
        DeclKind::Namespace => DeclKind::Namespace,
        DeclKind::Record(record) => {
            let mut record = record.clone();
            record.completeness = Completeness::Forward;
            DeclKind::Record(record)
        }
        DeclKind::Enum(_) => DeclKind::Enum(EnumDecl {
            completeness: Completeness::Forward,
            underlying: None,
        }),
        DeclKind::Enumerator { value } => DeclKind::Enumerator { value: *value },
        DeclKind::Field(field) => DeclKind::Field(FieldDecl {
            ty: placeholder(),
            offset_bits: field.offset_bits,
        }),
        DeclKind::Typedef { .. } => DeclKind::Typedef {
            underlying: placeholder(),
        },
        DeclKind::Function(function) => DeclKind::Function(FunctionDecl {
            signature: FunctionType::new(placeholder(), Vec::new(), function.signature.variadic),
            storage: function.storage,
            linkage_name: function.linkage_name.clone(),
        }),
        DeclKind::Param { .. } => DeclKind::Param { ty: placeholder() },
        DeclKind::Variable(variable) => DeclKind::Variable(VariableDecl {
            ty: placeholder(),
            storage: variable.storage,
        }),
        DeclKind::Interface(_) => DeclKind::Interface(InterfaceDecl {
            completeness: Completeness::Forward,
            superclass: None,
        }),
        DeclKind::Property { .. } => DeclKind::Property { ty: placeholder() },
        DeclKind::Method(method) => DeclKind::Method(MethodDecl {
            selector: method.selector.clone(),
            result: placeholder(),
            params: Vec::new(),
            is_instance: method.is_instance,
            class_interface: None,
        }),
        DeclKind::UsingDirective { .. } => DeclKind::UsingDirective { nominated: None },
        DeclKind::Label => DeclKind::Label,
    }
}

/// Copy engine shared by every destination store of a target.
#[derive(Default)]
pub struct DeclImporter
{
    tables: RefCell<HashMap<AstId, DestinationTables>>,
}

impl DeclImporter
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn memo(&self, dest: AstId, source: DeclRef) -> Option<DeclId>
    {
        self.tables
            .borrow()
            .get(&dest)
            .and_then(|tables| tables.copies.get(&source).copied())
    }

    fn memoise(&self, dest: AstId, source: DeclRef, copy: DeclId)
    {
        self.tables
            .borrow_mut()
            .entry(dest)
            .or_default()
            .copies
            .entry(source)
            .or_insert(copy);
    }

    /// The copy of `source` previously made in `dest`, if any.
    #[must_use]
    pub fn copied(&self, dest: AstId, source: DeclRef) -> Option<DeclId>
    {
        self.memo(dest, source)
    }

    /// Number of memoised copies held for `dest`.
    #[must_use]
    pub fn copy_count(&self, dest: AstId) -> usize
    {
        self.tables.borrow().get(&dest).map_or(0, |tables| tables.copies.len())
    }

    /// Copy `decl` of `source_ast` into `dest`, or return the existing copy.
    ///
    /// ## Errors
    ///
    /// - `ImportFailure` for using-directives and labels
    /// - `UnknownContext` / `UnknownDecl` when either side is gone
    pub fn copy_decl(&self, store: &AstStore, dest: AstId, source_ast: AstId, decl: DeclId) -> ExprResult<DeclId>
    {
        self.import(store, dest, source_ast, decl, None)
    }

    /// Copy the image namespace `decl`, seeding its equivalence map with `map`.
    ///
    /// Images already marked searched in `map` are not searched again while
    /// the copy's map is built.
    ///
    /// ## Errors
    ///
    /// Same as [`DeclImporter::copy_decl`].
    pub fn copy_namespace(
        &self,
        store: &AstStore,
        dest: AstId,
        source_ast: AstId,
        decl: DeclId,
        map: NamespaceMap,
    ) -> ExprResult<DeclId>
    {
        let source = DeclRef::new(source_ast, decl);
        self.tables
            .borrow_mut()
            .entry(dest)
            .or_default()
            .staged_namespace_maps
            .insert(source, map.clone());
        let copied = self.copy_decl(store, dest, source_ast, decl);
        // Left over when the namespace had been copied before.
        self.take_staged_namespace_map(dest, source);
        let copy = copied?;
        self.register_namespace_map(dest, copy, map);
        Ok(copy)
    }

    fn take_staged_namespace_map(&self, dest: AstId, source: DeclRef) -> Option<NamespaceMap>
    {
        self.tables
            .borrow_mut()
            .get_mut(&dest)
            .and_then(|tables| tables.staged_namespace_maps.remove(&source))
    }

    /// Copy `decl` into `dest` as a child of `parent` instead of the copy of
    /// its own parent.
    ///
    /// Used to attribute members to the destination declaration they are
    /// being looked up in.
    pub fn copy_decl_into(
        &self,
        store: &AstStore,
        dest: AstId,
        source_ast: AstId,
        decl: DeclId,
        parent: DeclId,
    ) -> ExprResult<DeclId>
    {
        self.import(store, dest, source_ast, decl, Some(parent))
    }

    /// Copy a type, copying every declaration it mentions.
    pub fn copy_type(&self, store: &AstStore, dest: AstId, source_ast: AstId, ty: &Type) -> ExprResult<Type>
    {
        if dest == source_ast {
            return Ok(ty.clone());
        }
        ty.map_decls(&mut |decl| self.copy_decl(store, dest, source_ast, decl))
    }

    fn import(
        &self,
        store: &AstStore,
        dest: AstId,
        source_ast: AstId,
        decl: DeclId,
        parent_override: Option<DeclId>,
    ) -> ExprResult<DeclId>
    {
        if !store.is_live(dest) {
            return Err(ExprError::UnknownContext(dest));
        }
        let source = DeclRef::new(source_ast, decl);
        if dest == source_ast {
            store.decl(source)?;
            return Ok(decl);
        }
        if let Some(copy) = self.memo(dest, source) {
            return Ok(copy);
        }
        if decl == DeclId::TRANSLATION_UNIT {
            store.decl(source)?;
            self.memoise(dest, source, DeclId::TRANSLATION_UNIT);
            return Ok(DeclId::TRANSLATION_UNIT);
        }

        let original = store.decl(source)?;
        if matches!(original.tag(), DeclKindTag::UsingDirective | DeclKindTag::Label) {
            return Err(ExprError::ImportFailure {
                kind: original.tag(),
                name: original.name.to_string(),
            });
        }

        let parent = match parent_override {
            Some(parent) => parent,
            None => {
                let source_parent = match &original.kind {
                    DeclKind::Method(method) => method.class_interface.or(original.parent),
                    _ => original.parent,
                }
                .unwrap_or(DeclId::TRANSLATION_UNIT);
                self.import(store, dest, source_ast, source_parent, None)?
            }
        };

        // Importing the parent can re-enter and import this declaration too.
        if let Some(copy) = self.memo(dest, source) {
            return Ok(copy);
        }

        let origin = self.true_origin(source);

        if is_mergeable(&original.kind) && !original.name.is_empty() {
            if let Some(existing) = self.find_equivalent(store, dest, parent, &original)? {
                trace!(dest = %dest, source = %source, existing = existing.raw(), name = %original.name, "merged with existing declaration");
                self.memoise(dest, source, existing);
                self.tables
                    .borrow_mut()
                    .entry(dest)
                    .or_default()
                    .origins
                    .entry(existing)
                    .or_insert(origin);
                if matches!(original.kind, DeclKind::Namespace) {
                    self.build_namespace_map(store, dest, source, existing, parent, &original.name);
                }
                return Ok(existing);
            }
            // The lookup above may have imported it.
            if let Some(copy) = self.memo(dest, source) {
                return Ok(copy);
            }
        }

        let copy = store.try_with_mut(dest, |ast| {
            let copy = ast.add_decl(parent, original.name.clone(), shell_kind(&original.kind))?;
            let entry = ast.decl_mut(copy)?;
            match &original.kind {
                DeclKind::Record(_) | DeclKind::Enum(_) | DeclKind::Interface(_) => entry.external.lexical = true,
                DeclKind::Namespace => entry.external.visible = true,
                _ => {}
            }
            Ok(copy)
        })?;
        self.memoise(dest, source, copy);
        self.tables
            .borrow_mut()
            .entry(dest)
            .or_default()
            .origins
            .insert(copy, origin);
        trace!(dest = %dest, source = %source, copy = copy.raw(), name = %original.name, kind = ?original.tag(), "copied declaration shell");

        if let Err(err) = self.fill_shell(store, dest, source, copy, parent, &original) {
            self.discard_shell(store, dest, source, copy, parent);
            return Err(err);
        }
        Ok(copy)
    }

    /// Undo a shell whose types could not be copied, so a later import
    /// starts over instead of finding the half-built copy.
    fn discard_shell(&self, store: &AstStore, dest: AstId, source: DeclRef, copy: DeclId, parent: DeclId)
    {
        if let Some(tables) = self.tables.borrow_mut().get_mut(&dest) {
            if tables.copies.get(&source) == Some(&copy) {
                tables.copies.remove(&source);
            }
            tables.origins.remove(&copy);
        }
        let detached = store.try_with_mut(dest, |ast| {
            ast.decl_mut(parent)?.children.retain(|child| *child != copy);
            Ok(())
        });
        if let Err(err) = detached {
            debug!(dest = %dest, copy = copy.raw(), error = %err, "could not detach discarded shell");
        }
    }

    /// Copy the types a fresh shell refers to, then its parameters and maps.
    fn fill_shell(
        &self,
        store: &AstStore,
        dest: AstId,
        source: DeclRef,
        copy: DeclId,
        parent: DeclId,
        original: &Decl,
    ) -> ExprResult<()>
    {
        let source_ast = source.ast;
        let copy_type = |ty: &Type| self.copy_type(store, dest, source_ast, ty);
        let kind = match &original.kind {
            DeclKind::Enum(decl) => Some(DeclKind::Enum(EnumDecl {
                completeness: Completeness::Forward,
                underlying: decl.underlying.as_ref().map(copy_type).transpose()?,
            })),
            DeclKind::Field(field) => Some(DeclKind::Field(FieldDecl {
                ty: copy_type(&field.ty)?,
                offset_bits: field.offset_bits,
            })),
            DeclKind::Typedef { underlying } => Some(DeclKind::Typedef {
                underlying: copy_type(underlying)?,
            }),
            DeclKind::Function(function) => Some(DeclKind::Function(FunctionDecl {
                signature: FunctionType {
                    result: Box::new(copy_type(&function.signature.result)?),
                    params: function
                        .signature
                        .params
                        .iter()
                        .map(copy_type)
                        .collect::<ExprResult<Vec<_>>>()?,
                    variadic: function.signature.variadic,
                },
                storage: function.storage,
                linkage_name: function.linkage_name.clone(),
            })),
            DeclKind::Param { ty } => Some(DeclKind::Param { ty: copy_type(ty)? }),
            DeclKind::Variable(variable) => Some(DeclKind::Variable(VariableDecl {
                ty: copy_type(&variable.ty)?,
                storage: variable.storage,
            })),
            DeclKind::Interface(interface) => Some(DeclKind::Interface(InterfaceDecl {
                completeness: Completeness::Forward,
                superclass: interface
                    .superclass
                    .map(|superclass| self.copy_decl(store, dest, source_ast, superclass))
                    .transpose()?,
            })),
            DeclKind::Property { ty } => Some(DeclKind::Property { ty: copy_type(ty)? }),
            DeclKind::Method(method) => Some(DeclKind::Method(MethodDecl {
                selector: method.selector.clone(),
                result: copy_type(&method.result)?,
                params: method.params.iter().map(copy_type).collect::<ExprResult<Vec<_>>>()?,
                is_instance: method.is_instance,
                class_interface: method.class_interface.map(|_| parent),
            })),
            DeclKind::TranslationUnit
            | DeclKind::Namespace
            | DeclKind::Record(_)
            | DeclKind::Enumerator { .. }
            | DeclKind::UsingDirective { .. }
            | DeclKind::Label => None,
        };

        if let Some(kind) = kind {
            store.try_with_mut(dest, |ast| {
                let entry = ast.decl_mut(copy)?;
                // Completion may already have run through a re-entrant path.
                let completeness = entry.kind.completeness();
                entry.kind = kind;
                if completeness == Some(Completeness::Complete) {
                    entry.mark_complete();
                }
                Ok(())
            })?;
        }

        match &original.kind {
            DeclKind::Function(_) => {
                for child in &original.children {
                    let is_param = store
                        .with(source_ast, |ast| ast.decl(*child).map(|decl| decl.tag() == DeclKindTag::Param))??;
                    if is_param {
                        self.import(store, dest, source_ast, *child, Some(copy))?;
                    }
                }
            }
            DeclKind::Namespace => self.build_namespace_map(store, dest, source, copy, parent, &original.name),
            DeclKind::Interface(_) => self.build_interface_map(dest, copy, &original.name),
            _ => {}
        }
        Ok(())
    }

    /// A same-named declaration of the same kind already visible in `parent`.
    fn find_equivalent(&self, store: &AstStore, dest: AstId, parent: DeclId, original: &Decl) -> ExprResult<Option<DeclId>>
    {
        let tag = original.tag();
        let (local, consult_source) = store.try_with(dest, |ast| {
            let local = ast
                .lookup_local(parent, &original.name)
                .into_iter()
                .find(|candidate| ast.decl(*candidate).is_ok_and(|decl| decl.tag() == tag));
            Ok((local, ast.decl(parent)?.external.visible))
        })?;
        if local.is_some() || !consult_source {
            return Ok(local);
        }

        let Some(source) = store.external_source(dest) else {
            return Ok(None);
        };
        let found = source.find_external_visible_decls_by_name(parent, &original.name);
        store.with(dest, |ast| {
            found
                .into_iter()
                .find(|candidate| ast.decl(*candidate).is_ok_and(|decl| decl.tag() == tag))
        })
    }

    fn completer(&self, dest: AstId) -> Option<Rc<dyn MapCompleter>>
    {
        self.tables
            .borrow()
            .get(&dest)
            .and_then(|tables| tables.completer.as_ref())
            .and_then(Weak::upgrade)
    }

    fn build_namespace_map(
        &self,
        store: &AstStore,
        dest: AstId,
        source: DeclRef,
        namespace: DeclId,
        parent: DeclId,
        name: &DeclName,
    )
    {
        let staged = self.take_staged_namespace_map(dest, source);
        let (Some(completer), Some(name)) = (self.completer(dest), name.as_identifier()) else {
            if let Some(staged) = staged {
                self.register_namespace_map(dest, namespace, staged);
            }
            return;
        };
        let parent_is_namespace = store
            .with(dest, |ast| ast.decl(parent).is_ok_and(|decl| matches!(decl.kind, DeclKind::Namespace)))
            .unwrap_or(false);
        let parent_map = if parent_is_namespace {
            self.namespace_map(dest, parent)
        } else {
            None
        };

        let mut map = self.namespace_map(dest, namespace).unwrap_or_default();
        if let Some(staged) = &staged {
            map.merge(staged);
        }
        completer.complete_namespace_map(&mut map, name, parent_map.as_ref());
        debug!(dest = %dest, namespace = name, entries = map.len(), "built namespace map");
        self.register_namespace_map(dest, namespace, map);
    }

    fn build_interface_map(&self, dest: AstId, interface: DeclId, name: &DeclName)
    {
        let Some(completer) = self.completer(dest) else {
            return;
        };
        let Some(name) = name.as_identifier() else {
            return;
        };
        let mut map = self.interface_map(dest, interface).unwrap_or_default();
        completer.complete_interface_map(&mut map, name);
        debug!(dest = %dest, interface = name, entries = map.len(), "built interface map");
        self.register_interface_map(dest, interface, map);
    }

    /// Follow origin links from `decl` to the declaration it ultimately stands for.
    ///
    /// Returns `None` when there is no origin, or when the origin's store has
    /// been destroyed.
    #[must_use]
    pub fn resolve_origin(&self, store: &AstStore, ast: AstId, decl: DeclId) -> Option<DeclRef>
    {
        let start = DeclRef::new(ast, decl);
        let origin = self.true_origin(start);
        if origin == start {
            return None;
        }
        store.with(origin.ast, |ast| ast.decl(origin.decl).is_ok()).unwrap_or(false).then_some(origin)
    }

    /// Like [`DeclImporter::resolve_origin`], reporting why there is no usable origin.
    pub fn require_origin(&self, store: &AstStore, ast: AstId, decl: DeclId) -> ExprResult<DeclRef>
    {
        let start = DeclRef::new(ast, decl);
        let origin = self.true_origin(start);
        if origin == start {
            return Err(ExprError::ResolutionFailure {
                decl,
                reason: format!("no origin recorded in {ast}"),
            });
        }
        if !store.is_live(origin.ast) {
            return Err(ExprError::ResolutionFailure {
                decl,
                reason: format!("origin store {} has been destroyed", origin.ast),
            });
        }
        store.decl(origin).map_err(|err| ExprError::ResolutionFailure {
            decl,
            reason: err.to_string(),
        })?;
        Ok(origin)
    }

    /// End of the origin chain starting at `start` (`start` itself if it has none).
    fn true_origin(&self, start: DeclRef) -> DeclRef
    {
        let tables = self.tables.borrow();
        let mut visited = HashSet::new();
        let mut current = start;
        while visited.insert(current) {
            let next = tables
                .get(&current.ast)
                .and_then(|table| table.origins.get(&current.decl))
                .copied();
            match next {
                Some(origin) => current = origin,
                None => break,
            }
        }
        current
    }

    /// Record that `decl` of `dest` stands for `origin`.
    pub fn register_origin(&self, dest: AstId, decl: DeclId, origin: DeclRef)
    {
        let origin = self.true_origin(origin);
        self.tables
            .borrow_mut()
            .entry(dest)
            .or_default()
            .origins
            .insert(decl, origin);
    }

    /// Complete a forward-declared record or enum from its recorded origin.
    ///
    /// Returns `Ok(false)` without side effects when there is no usable origin
    /// or the origin cannot be completed. Idempotent.
    pub fn complete_tag_decl(&self, store: &AstStore, dest: AstId, decl: DeclId) -> ExprResult<bool>
    {
        let entry = store.decl(DeclRef::new(dest, decl))?;
        if !matches!(entry.kind, DeclKind::Record(_) | DeclKind::Enum(_)) {
            return Ok(false);
        }
        self.complete_from_origin(store, dest, decl, &entry)
    }

    /// Complete a forward-declared interface from its recorded origin.
    pub fn complete_interface_decl(&self, store: &AstStore, dest: AstId, decl: DeclId) -> ExprResult<bool>
    {
        let entry = store.decl(DeclRef::new(dest, decl))?;
        if !matches!(entry.kind, DeclKind::Interface(_)) {
            return Ok(false);
        }
        self.complete_from_origin(store, dest, decl, &entry)
    }

    /// Make `candidate` the origin of `decl` and complete from it.
    ///
    /// The previous origin is restored if completion fails.
    pub fn complete_tag_decl_with_origin(
        &self,
        store: &AstStore,
        dest: AstId,
        decl: DeclId,
        candidate: DeclRef,
    ) -> ExprResult<bool>
    {
        let candidate = self.true_origin(candidate);
        let (candidate_tag, dest_tag) = (store.decl(candidate)?.tag(), store.decl(DeclRef::new(dest, decl))?.tag());
        if candidate_tag != dest_tag {
            return Ok(false);
        }

        let previous = self
            .tables
            .borrow_mut()
            .entry(dest)
            .or_default()
            .origins
            .insert(decl, candidate);
        let completed = if dest_tag == DeclKindTag::Interface {
            self.complete_interface_decl(store, dest, decl)
        } else {
            self.complete_tag_decl(store, dest, decl)
        };

        if !matches!(completed, Ok(true)) {
            let mut tables = self.tables.borrow_mut();
            let table = tables.entry(dest).or_default();
            match previous {
                Some(previous) => table.origins.insert(decl, previous),
                None => table.origins.remove(&decl),
            };
        }
        completed
    }

    fn complete_from_origin(&self, store: &AstStore, dest: AstId, decl: DeclId, entry: &Decl) -> ExprResult<bool>
    {
        if entry.is_complete() {
            return Ok(true);
        }
        let Some(origin) = self.resolve_origin(store, dest, decl) else {
            return Ok(false);
        };

        if !store.with(origin.ast, |ast| ast.is_complete(origin.decl))? {
            if let Some(source) = store.external_source(origin.ast) {
                source.complete_type(origin.decl);
            }
            if !store.with(origin.ast, |ast| ast.is_complete(origin.decl))? {
                debug!(dest = %dest, decl = decl.raw(), origin = %origin, "origin is incomplete");
                return Ok(false);
            }
        }

        // Children copied below name the origin as their parent.
        self.memoise(dest, origin, decl);

        let source_children = store.try_with(origin.ast, |ast| Ok(ast.children(origin.decl)?.to_vec()))?;
        let saved_children = entry.children.clone();
        for child in source_children {
            let copy = match self.import(store, dest, origin.ast, child, Some(decl)) {
                Ok(copy) => copy,
                Err(err @ ExprError::ImportFailure { .. }) => {
                    debug!(dest = %dest, decl = decl.raw(), error = %err, "skipped member");
                    continue;
                }
                Err(err) => {
                    store.try_with_mut(dest, |ast| {
                        ast.decl_mut(decl)?.children = saved_children;
                        Ok(())
                    })?;
                    return Err(err);
                }
            };
            store.try_with_mut(dest, |ast| ast.attach_child(decl, copy))?;
        }

        store.try_with_mut(dest, |ast| {
            let entry = ast.decl_mut(decl)?;
            entry.mark_complete();
            entry.external.lexical_loaded = true;
            Ok(())
        })?;
        debug!(dest = %dest, decl = decl.raw(), origin = %origin, "completed from origin");
        Ok(true)
    }

    /// Install the object that fills equivalence maps for `dest`.
    pub fn install_map_completer(&self, dest: AstId, completer: Weak<dyn MapCompleter>)
    {
        self.tables.borrow_mut().entry(dest).or_default().completer = Some(completer);
    }

    #[must_use]
    pub fn namespace_map(&self, dest: AstId, namespace: DeclId) -> Option<NamespaceMap>
    {
        self.tables
            .borrow()
            .get(&dest)
            .and_then(|tables| tables.namespace_maps.get(&namespace))
            .cloned()
    }

    /// Union `map` into the map registered for `namespace`.
    pub fn register_namespace_map(&self, dest: AstId, namespace: DeclId, map: NamespaceMap)
    {
        let mut tables = self.tables.borrow_mut();
        let maps = &mut tables.entry(dest).or_default().namespace_maps;
        match maps.get_mut(&namespace) {
            Some(existing) => existing.merge(&map),
            None => {
                maps.insert(namespace, map);
            }
        }
    }

    #[must_use]
    pub fn interface_map(&self, dest: AstId, interface: DeclId) -> Option<InterfaceMap>
    {
        self.tables
            .borrow()
            .get(&dest)
            .and_then(|tables| tables.interface_maps.get(&interface))
            .cloned()
    }

    pub fn register_interface_map(&self, dest: AstId, interface: DeclId, map: InterfaceMap)
    {
        let mut tables = self.tables.borrow_mut();
        let maps = &mut tables.entry(dest).or_default().interface_maps;
        match maps.get_mut(&interface) {
            Some(existing) => existing.merge(&map),
            None => {
                maps.insert(interface, map);
            }
        }
    }

    /// Drop everything recorded for `dest`; called when it is torn down.
    pub fn forget_destination(&self, dest: AstId)
    {
        if self.tables.borrow_mut().remove(&dest).is_some() {
            debug!(dest = %dest, "forgot destination");
        }
    }

    /// Drop every copy, origin and map entry of `dest` that refers to `source`.
    pub fn forget_source(&self, dest: AstId, source: AstId)
    {
        if let Some(tables) = self.tables.borrow_mut().get_mut(&dest) {
            tables.forget_source(source);
            debug!(dest = %dest, source = %source, "forgot source");
        }
    }

    /// [`DeclImporter::forget_source`] for every destination, plus the tables
    /// `source` itself may hold as a destination.
    pub fn forget_source_everywhere(&self, source: AstId)
    {
        let mut tables = self.tables.borrow_mut();
        tables.remove(&source);
        for table in tables.values_mut() {
            table.forget_source(source);
        }
    }
}
