//! # External Declaration Source
//!
//! The resolver an expression's compiler consults for names it cannot resolve
//! on its own. One [`ExternalDeclSource`] exists per expression store; it
//! searches the target's images and imports whatever it finds into that store.
//!
//! ## Lookup Order
//!
//! 1. Nothing is resolved while one of our own imports is running.
//! 2. Names debug info cannot answer (builtins, operators, using-directives,
//!    constructors and friends) are recorded as having no external
//!    declarations.
//! 3. Selectors go straight to the Objective-C method search.
//! 4. Until the first name carrying the configured sigil (`$`) has been seen,
//!    nothing else is searched.
//! 5. A name that is already being looked up resolves to nothing.
//! 6. Otherwise the search depends on the context: namespaces search through
//!    their equivalence map, interfaces search their properties, the
//!    translation unit searches every image.
//!
//! Failures never reach the compiler: a lookup that goes wrong simply finds
//! nothing, and a completion that goes wrong leaves the type incomplete.

pub mod builtins;
pub mod search;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

pub use search::{Found, NameSearchContext};
use tracing::{debug, span, trace, warn, Level};

use self::builtins::is_builtin_identifier;
use crate::ast::{
    AstHandle, AstId, Decl, DeclFilter, DeclId, DeclKind, DeclKindTag, DeclName, DeclRef, ExternalAstSource,
    FunctionType, Selector, Type,
};
use crate::error::{ExprError, ExprResult};
use crate::images::{FunctionNameKind, Image, ImageRegistry};
use crate::importer::{InterfaceMap, MapCompleter, NamespaceEntry, NamespaceMap};
use crate::target::Target;

/// Upper bound on variables and functions collected per image and name.
const MAX_SYMBOL_MATCHES: usize = 64;

/// Behaviour of an expression source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig
{
    /// Names starting with this character enable lookups and are never
    /// searched in debug info.
    pub sigil: char,
    /// Start with lookups enabled instead of waiting for the sigil.
    pub lookups_enabled: bool,
    /// How many same-named types the fallback completion search considers.
    pub max_fallback_types: usize,
}

impl Default for SourceConfig
{
    fn default() -> Self
    {
        Self {
            sigil: '$',
            lookups_enabled: false,
            max_fallback_types: 64,
        }
    }
}

/// Correlates the log lines of one top-level request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u32);

impl fmt::Display for RequestId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Removes a name from the active-lookup set when dropped.
struct ActiveLookup<'a>
{
    set: &'a RefCell<HashSet<String>>,
    name: String,
}

impl<'a> ActiveLookup<'a>
{
    fn enter(set: &'a RefCell<HashSet<String>>, name: String) -> Option<Self>
    {
        if !set.borrow_mut().insert(name.clone()) {
            return None;
        }
        Some(Self { set, name })
    }
}

impl Drop for ActiveLookup<'_>
{
    fn drop(&mut self)
    {
        self.set.borrow_mut().remove(&self.name);
    }
}

/// Resolves names for one expression store from the target's images.
///
/// The compiler calls into it through [`ExternalAstSource`]: visible-name
/// lookups, lexical member enumeration and type completion. Everything found
/// is copied into the expression store by the target's importer, and the
/// source also fills the equivalence maps of the namespaces and interfaces it
/// copies.
///
/// Lookups stay disabled until a name starting with
/// [`SourceConfig::sigil`] is looked up, unless
/// [`SourceConfig::lookups_enabled`] says otherwise. A name already being
/// looked up further up the stack resolves to nothing.
pub struct ExternalDeclSource
{
    target: Rc<Target>,
    ast: AstId,
    config: SourceConfig,
    active_lookups: RefCell<HashSet<String>>,
    lookups_enabled: Cell<bool>,
    import_in_progress: Cell<bool>,
    next_request: Cell<u32>,
}

impl ExternalDeclSource
{
    /// Create the expression store and the source that serves it.
    pub(crate) fn new(target: Rc<Target>, config: SourceConfig) -> ExprResult<Rc<Self>>
    {
        let store = target.store().clone();
        let ast = store.create("expression");
        store.try_with_mut(ast, |ast| {
            ast.decl_mut(DeclId::TRANSLATION_UNIT)?.external.visible = true;
            Ok(())
        })?;

        let source = Rc::new(Self {
            lookups_enabled: Cell::new(config.lookups_enabled),
            target,
            ast,
            config,
            active_lookups: RefCell::new(HashSet::new()),
            import_in_progress: Cell::new(false),
            next_request: Cell::new(0),
        });

        let as_source: Weak<dyn ExternalAstSource> = Rc::downgrade(&source) as Weak<_>;
        let as_completer: Weak<dyn MapCompleter> = Rc::downgrade(&source) as Weak<_>;
        store.set_external_source(ast, as_source);
        source.target.importer().install_map_completer(ast, as_completer);
        debug!(ast = %ast, "created expression source");
        Ok(source)
    }

    /// The expression store this source serves.
    #[must_use]
    pub fn ast(&self) -> AstId
    {
        self.ast
    }

    /// The target whose images are searched.
    #[must_use]
    pub fn target(&self) -> &Rc<Target>
    {
        &self.target
    }

    /// Configuration the source was created with.
    #[must_use]
    pub fn config(&self) -> &SourceConfig
    {
        &self.config
    }

    /// Whether name lookups search the images yet.
    #[must_use]
    pub fn lookups_enabled(&self) -> bool
    {
        self.lookups_enabled.get()
    }

    /// Whether `name` is being looked up somewhere up the call stack.
    #[must_use]
    pub fn is_lookup_active(&self, name: &str) -> bool
    {
        self.active_lookups.borrow().contains(name)
    }

    /// Number of lookups in progress; zero between top-level requests.
    #[must_use]
    pub fn active_lookup_count(&self) -> usize
    {
        self.active_lookups.borrow().len()
    }

    /// Copy a declaration of the expression store into the target's scratch
    /// store, where it outlives the expression.
    ///
    /// ## Errors
    ///
    /// Whatever the importer reports, `ImportFailure` included.
    pub fn copy_to_scratch(&self, decl: DeclId) -> ExprResult<DeclId>
    {
        let target = &self.target;
        target
            .importer()
            .copy_decl(target.store(), target.scratch(), self.ast, decl)
    }

    fn next_request(&self) -> RequestId
    {
        let id = self.next_request.get();
        self.next_request.set(id.wrapping_add(1));
        RequestId(id)
    }

    fn handle(&self) -> AstHandle<'_>
    {
        AstHandle::new(self.target.store(), self.ast)
    }

    fn record(&self, ctx: DeclId, name: &DeclName, decls: &[DeclId])
    {
        let name = name.clone();
        let recorded = self.handle().with_mut(|ast| {
            if decls.is_empty() {
                ast.set_no_external_visible_decls(ctx, name);
            } else {
                ast.set_external_visible_decls(ctx, name, decls);
            }
        });
        if let Err(err) = recorded {
            warn!(error = %err, "failed to record lookup result");
        }
    }

    fn guarded<R>(&self, f: impl FnOnce() -> R) -> R
    {
        let previous = self.import_in_progress.replace(true);
        let result = f();
        self.import_in_progress.set(previous);
        result
    }

    fn guarded_copy_type(&self, source_ast: AstId, ty: &Type) -> ExprResult<Type>
    {
        let target = &self.target;
        self.guarded(|| target.importer().copy_type(target.store(), self.ast, source_ast, ty))
    }

    fn lookup(&self, request: RequestId, ctx: DeclId, name: &DeclName) -> Vec<DeclId>
    {
        if self.import_in_progress.get() {
            trace!("import in progress, not resolving");
            return Vec::new();
        }
        if self.target.images().is_empty() {
            self.record(ctx, name, &[]);
            return Vec::new();
        }

        let identifier = match name {
            DeclName::Identifier(identifier) => identifier,
            DeclName::Selector(selector) => {
                let decls = self.find_objc_methods(request, ctx, selector);
                self.record(ctx, name, &decls);
                return decls;
            }
            DeclName::Operator(_)
            | DeclName::LiteralOperator(_)
            | DeclName::UsingDirective
            | DeclName::Constructor(_)
            | DeclName::Destructor(_)
            | DeclName::ConversionFunction(_) => {
                self.record(ctx, name, &[]);
                return Vec::new();
            }
        };
        if identifier.is_empty() || is_builtin_identifier(identifier) {
            self.record(ctx, name, &[]);
            return Vec::new();
        }

        if !self.lookups_enabled.get() {
            if !identifier.starts_with(self.config.sigil) {
                self.record(ctx, name, &[]);
                return Vec::new();
            }
            debug!("enabling lookups");
            self.lookups_enabled.set(true);
        }

        let Some(_active) = ActiveLookup::enter(&self.active_lookups, identifier.clone()) else {
            trace!("already looking this name up");
            self.record(ctx, name, &[]);
            return Vec::new();
        };

        let decls = self.find_visible(request, ctx, name);
        self.record(ctx, name, &decls);
        debug!(found = decls.len(), "lookup finished");
        decls
    }

    fn find_visible(&self, request: RequestId, ctx: DeclId, name: &DeclName) -> Vec<DeclId>
    {
        let store = self.target.store();
        let tag = match store.try_with(self.ast, |ast| Ok(ast.decl(ctx)?.tag())) {
            Ok(tag) => tag,
            Err(err) => {
                warn!(%request, error = %err, "lookup in unknown context");
                return Vec::new();
            }
        };

        let mut search = NameSearchContext::new(self.handle(), ctx, name.clone());
        let mut imported_namespace = None;
        match tag {
            DeclKindTag::Namespace => match self.target.importer().namespace_map(self.ast, ctx) {
                Some(map) => {
                    if !map.is_empty() {
                        imported_namespace = self.find_namespaces(request, &mut search, Some(&map));
                    }
                    for entry in map.iter() {
                        if let Err(err) = self.find_in_scope(request, &mut search, Some(entry)) {
                            warn!(%request, image = entry.image.name(), error = %err, "namespace search failed");
                        }
                    }
                }
                None => debug!(%request, "namespace has no equivalence map"),
            },
            DeclKindTag::Interface => self.find_objc_properties(request, &mut search),
            DeclKindTag::TranslationUnit => {
                imported_namespace = self.find_namespaces(request, &mut search, None);
                if let Err(err) = self.find_in_scope(request, &mut search, None) {
                    warn!(%request, error = %err, "global search failed");
                }
            }
            _ => return Vec::new(),
        }

        match imported_namespace {
            Some(namespace) => {
                search.add_named_decl(namespace);
            }
            None if !search.namespace_map.is_empty() => self.add_namespace(request, &mut search),
            None => {}
        }
        search.into_decls()
    }

    /// Collect the image namespaces the searched name refers to inside the
    /// children of `parent` (or every image's root namespace).
    ///
    /// When an earlier lookup already copied the namespace, its map is only
    /// completed with images not searched yet and the copy is returned.
    fn find_namespaces(
        &self,
        request: RequestId,
        search: &mut NameSearchContext<'_>,
        parent: Option<&NamespaceMap>,
    ) -> Option<DeclId>
    {
        let name = search.name().as_identifier().map(str::to_string)?;
        if name.starts_with(self.config.sigil) {
            return None;
        }

        let importer = self.target.importer();
        let wanted = search.name().clone();
        let ctx = search.ctx();
        let existing = self
            .handle()
            .with(|ast| {
                ast.lookup_local(ctx, &wanted)
                    .into_iter()
                    .find(|decl| ast.decl(*decl).is_ok_and(|decl| matches!(decl.kind, DeclKind::Namespace)))
            })
            .ok()
            .flatten();
        let imported = existing.and_then(|decl| importer.namespace_map(self.ast, decl).map(|map| (decl, map)));
        if let Some((namespace, mut map)) = imported {
            self.complete_namespace_map(&mut map, &name, parent);
            trace!(%request, entries = map.len(), "namespace already imported");
            importer.register_namespace_map(self.ast, namespace, map);
            return Some(namespace);
        }

        self.complete_namespace_map(&mut search.namespace_map, &name, parent);
        None
    }

    /// Search one image namespace (or, with `scope == None`, every image's
    /// root namespace) for types, variables and functions.
    fn find_in_scope(
        &self,
        request: RequestId,
        search: &mut NameSearchContext<'_>,
        scope: Option<&NamespaceEntry>,
    ) -> ExprResult<()>
    {
        let Some(name) = search.name().as_identifier().map(str::to_string) else {
            return Ok(());
        };
        if name.starts_with(self.config.sigil) {
            return Ok(());
        }

        let store = self.target.store();
        let images = self.target.images();

        if !search.found.type_decl && name != "id" && name != "Class" {
            let candidates: Vec<(Rc<Image>, Type)> = match scope {
                Some(entry) => entry
                    .image
                    .find_types(store, &name, Some(entry.namespace), 1)?
                    .into_iter()
                    .map(|ty| (entry.image.clone(), ty))
                    .collect(),
                None => images.find_types(store, &name, 1),
            };
            for (image, ty) in candidates {
                match self.guarded_copy_type(image.ast(), &ty) {
                    Ok(copied) => {
                        if search.add_type_decl(&copied) {
                            trace!(%request, image = image.name(), "found type");
                            break;
                        }
                    }
                    Err(err) => debug!(%request, image = image.name(), error = %err, "could not copy type"),
                }
            }
        }

        let scopes: Vec<(Rc<Image>, DeclId)> = match scope {
            Some(entry) => vec![(entry.image.clone(), entry.namespace)],
            None => images
                .iter()
                .map(|image| (image.clone(), DeclId::TRANSLATION_UNIT))
                .collect(),
        };
        self.find_variables(request, search, &name, &scopes)?;
        if !search.found.variable {
            self.find_functions(request, search, &name, &scopes, scope.is_none())?;
        }
        Ok(())
    }

    fn find_variables(
        &self,
        request: RequestId,
        search: &mut NameSearchContext<'_>,
        name: &str,
        scopes: &[(Rc<Image>, DeclId)],
    ) -> ExprResult<()>
    {
        let store = self.target.store();
        for (image, scope) in scopes {
            let variables = match image.find_global_variables(store, name, MAX_SYMBOL_MATCHES) {
                Ok(variables) => variables,
                Err(err) => {
                    warn!(%request, image = image.name(), error = %err, "variable search failed");
                    continue;
                }
            };
            for variable in variables {
                let origin = DeclRef::new(image.ast(), variable);
                let decl = store.decl(origin)?;
                let DeclKind::Variable(info) = &decl.kind else {
                    continue;
                };
                if decl.parent != Some(*scope) {
                    continue;
                }
                let ty = match self.guarded_copy_type(image.ast(), &info.ty) {
                    Ok(ty) => ty,
                    Err(err) => {
                        debug!(%request, error = %err, "could not copy variable type");
                        continue;
                    }
                };
                let synthesised = search.add_var_decl(ty)?;
                self.target.importer().register_origin(self.ast, synthesised, origin);
                trace!(%request, image = image.name(), "found variable");
            }
        }
        Ok(())
    }

    fn find_functions(
        &self,
        request: RequestId,
        search: &mut NameSearchContext<'_>,
        name: &str,
        scopes: &[(Rc<Image>, DeclId)],
        global: bool,
    ) -> ExprResult<()>
    {
        let store = self.target.store();
        let kind = FunctionNameKind::BASE | FunctionNameKind::FULL;
        for (image, scope) in scopes {
            let matches = match image.find_functions(store, name, kind, MAX_SYMBOL_MATCHES) {
                Ok(matches) => matches,
                Err(err) => {
                    warn!(%request, image = image.name(), error = %err, "function search failed");
                    continue;
                }
            };
            for found in matches {
                let Some(function) = found.decl else {
                    if global {
                        search.add_generic_fun_decl()?;
                        trace!(%request, image = image.name(), "found symbol without debug info");
                    }
                    continue;
                };

                let origin = DeclRef::new(image.ast(), function);
                let decl = store.decl(origin)?;
                if !matches!(decl.kind, DeclKind::Function(_)) || decl.parent != Some(*scope) {
                    continue;
                }
                let synthesised = match self.copy_prototype(image.ast(), &decl) {
                    Ok((signature, params)) => search.add_fun_decl(signature, params)?,
                    Err(err) => {
                        debug!(%request, error = %err, "could not copy prototype");
                        search.add_generic_fun_decl()?
                    }
                };
                self.target.importer().register_origin(self.ast, synthesised, origin);
                trace!(%request, image = image.name(), "found function");
            }
        }
        Ok(())
    }

    /// Signature and named parameters of an image function, copied into the
    /// expression store.
    fn copy_prototype(&self, source_ast: AstId, decl: &Decl) -> ExprResult<(FunctionType, Vec<(DeclName, Type)>)>
    {
        let DeclKind::Function(function) = &decl.kind else {
            return Err(ExprError::InvalidArgument(format!("{} is not a function", decl.name)));
        };
        let names: Vec<DeclName> = self.target.store().try_with(source_ast, |ast| {
            decl.children
                .iter()
                .filter_map(|child| match ast.decl(*child) {
                    Ok(param) if param.tag() == DeclKindTag::Param => Some(Ok(param.name.clone())),
                    Ok(_) => None,
                    Err(err) => Some(Err(err)),
                })
                .collect()
        })?;

        let Type::Function(signature) = self.guarded_copy_type(source_ast, &Type::Function(function.signature.clone()))?
        else {
            return Err(ExprError::InvalidArgument(format!("{} has no prototype", decl.name)));
        };
        let params = signature
            .params
            .iter()
            .enumerate()
            .map(|(index, ty)| {
                let name = names
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| DeclName::identifier(""));
                (name, ty.clone())
            })
            .collect();
        Ok((signature, params))
    }

    /// Turn the namespaces collected by a search into one declaration.
    fn add_namespace(&self, request: RequestId, search: &mut NameSearchContext<'_>)
    {
        let Some(first) = search.namespace_map.iter().next().cloned() else {
            return;
        };
        let target = &self.target;
        let copy = match target.importer().copy_namespace(
            target.store(),
            self.ast,
            first.image.ast(),
            first.namespace,
            search.namespace_map.clone(),
        ) {
            Ok(copy) => copy,
            Err(err) => {
                warn!(%request, error = %err, "could not copy namespace");
                return;
            }
        };
        let marked = self.handle().try_with_mut(|ast| {
            ast.decl_mut(copy)?.external.visible = true;
            Ok(())
        });
        if let Err(err) = marked {
            warn!(%request, error = %err, "could not mark namespace");
        }
        debug!(%request, entries = search.namespace_map.len(), "added namespace");
        search.add_named_decl(copy);
    }

    fn find_objc_methods(&self, request: RequestId, ctx: DeclId, selector: &Selector) -> Vec<DeclId>
    {
        let store = self.target.store();
        let importer = self.target.importer();
        let interface_name = match store.decl(DeclRef::new(self.ast, ctx)) {
            Ok(decl) if decl.tag() == DeclKindTag::Interface => decl.name,
            _ => return Vec::new(),
        };
        let wanted = DeclName::Selector(selector.clone());
        let mut search = NameSearchContext::new(self.handle(), ctx, wanted.clone());

        if let Some(origin) = importer.resolve_origin(store, self.ast, ctx) {
            if self.copy_method(request, &mut search, origin.ast, origin.decl) {
                return search.into_decls();
            }
        }

        if let Some(map) = importer.interface_map(self.ast, ctx) {
            for entry in map.iter() {
                let has_children = store
                    .with(entry.ast, |ast| ast.children(entry.interface).is_ok_and(|children| !children.is_empty()))
                    .unwrap_or(false);
                if has_children && self.copy_method(request, &mut search, entry.ast, entry.interface) {
                    return search.into_decls();
                }
            }
        }

        let text = selector.to_string();
        for (image, found) in self
            .target
            .images()
            .find_functions(store, &text, FunctionNameKind::SELECTOR, MAX_SYMBOL_MATCHES)
        {
            let Some(method) = found.decl else {
                continue;
            };
            let class_name = store
                .try_with(image.ast(), |ast| {
                    Ok(match &ast.decl(method)?.kind {
                        DeclKind::Method(info) => info
                            .class_interface
                            .and_then(|class| ast.decl(class).ok())
                            .map(|class| class.name.clone()),
                        _ => None,
                    })
                })
                .ok()
                .flatten();
            if class_name.as_ref() != Some(&interface_name) {
                continue;
            }
            match self
                .target
                .importer()
                .copy_decl_into(store, self.ast, image.ast(), method, ctx)
            {
                Ok(copy) => {
                    search.add_named_decl(copy);
                    trace!(%request, image = image.name(), selector = %text, "found method implementation");
                }
                Err(err) => debug!(%request, error = %err, "could not copy method"),
            }
        }
        search.into_decls()
    }

    /// Copy the method named by the search out of `interface` of `source_ast`.
    fn copy_method(&self, request: RequestId, search: &mut NameSearchContext<'_>, source_ast: AstId, interface: DeclId)
        -> bool
    {
        let store = self.target.store();
        let method = store
            .with(source_ast, |ast| {
                ast.find_child(interface, search.name(), |decl| matches!(decl.kind, DeclKind::Method(_)))
            })
            .ok()
            .flatten();
        let Some(method) = method else {
            return false;
        };
        match self
            .target
            .importer()
            .copy_decl_into(store, self.ast, source_ast, method, search.ctx())
        {
            Ok(copy) => search.add_named_decl(copy),
            Err(err) => {
                debug!(%request, error = %err, "could not copy method");
                false
            }
        }
    }

    fn find_objc_properties(&self, request: RequestId, search: &mut NameSearchContext<'_>)
    {
        let store = self.target.store();
        let importer = self.target.importer();
        let ctx = search.ctx();

        let origin = match importer.require_origin(store, self.ast, ctx) {
            Ok(origin) => origin,
            Err(err) => {
                warn!(%request, error = %err, "interface has no origin");
                return;
            }
        };
        self.ensure_complete(origin);

        let mut candidates = vec![origin];
        if let Some(map) = importer.interface_map(self.ast, ctx) {
            candidates.extend(map.iter().map(|entry| DeclRef::new(entry.ast, entry.interface)));
        }

        for candidate in candidates {
            let property = store
                .with(candidate.ast, |ast| {
                    ast.find_child(candidate.decl, search.name(), |decl| matches!(decl.kind, DeclKind::Property { .. }))
                })
                .ok()
                .flatten();
            let Some(property) = property else {
                continue;
            };
            match importer.copy_decl_into(store, self.ast, candidate.ast, property, ctx) {
                Ok(copy) => {
                    search.add_named_decl(copy);
                    trace!(%request, "found property");
                    return;
                }
                Err(err) => debug!(%request, error = %err, "could not copy property"),
            }
        }
    }

    /// Ask the origin's own store to complete it, if it is an incomplete aggregate.
    fn ensure_complete(&self, origin: DeclRef)
    {
        let store = self.target.store();
        if store.with(origin.ast, |ast| ast.is_complete(origin.decl)).unwrap_or(true) {
            return;
        }
        if let Some(source) = store.external_source(origin.ast) {
            source.complete_type(origin.decl);
        }
    }

    fn lexical_decls(&self, request: RequestId, ctx: DeclId, filter: Option<DeclFilter<'_>>) -> ExprResult<Vec<DeclId>>
    {
        let store = self.target.store();
        let importer = self.target.importer();

        let origin = importer.require_origin(store, self.ast, ctx).inspect_err(|err| {
            warn!(%request, error = %err, "cannot enumerate children");
        })?;
        self.ensure_complete(origin);

        let children: Vec<(DeclId, DeclKindTag)> = store.try_with(origin.ast, |ast| {
            ast.children(origin.decl)?
                .iter()
                .map(|child| Ok((*child, ast.decl(*child)?.tag())))
                .collect()
        })?;

        let mut imported = Vec::new();
        let mut skipped = false;
        for (child, tag) in children {
            if filter.is_some_and(|accept| !accept(tag)) {
                skipped = true;
                continue;
            }
            let copy = match importer.copy_decl_into(store, self.ast, origin.ast, child, ctx) {
                Ok(copy) => copy,
                Err(err @ ExprError::ImportFailure { .. }) => {
                    debug!(%request, error = %err, "skipped child");
                    skipped = true;
                    continue;
                }
                Err(err) => return Err(err),
            };
            store.try_with_mut(self.ast, |ast| ast.attach_child(ctx, copy))?;

            // Records held by value need their layout.
            let by_value = store.try_with(self.ast, |ast| {
                Ok(match &ast.decl(copy)?.kind {
                    DeclKind::Field(field) => ast.tag_decl_of(&field.ty).filter(|tag| !ast.is_complete(*tag)),
                    _ => None,
                })
            })?;
            if let Some(tag) = by_value {
                if let Err(err) = importer.complete_tag_decl(store, self.ast, tag) {
                    debug!(%request, error = %err, "could not complete field type");
                }
            }
            imported.push(copy);
        }

        store.try_with_mut(self.ast, |ast| {
            let entry = ast.decl_mut(ctx)?;
            if skipped {
                entry.external.lexical = true;
            } else {
                entry.external.lexical_loaded = true;
            }
            Ok(())
        })?;
        debug!(%request, imported = imported.len(), skipped, "enumerated children");
        Ok(imported)
    }

    fn complete(&self, request: RequestId, decl: DeclId) -> bool
    {
        let store = self.target.store();
        let importer = self.target.importer();
        let entry = match store.decl(DeclRef::new(self.ast, decl)) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%request, error = %err, "cannot complete unknown declaration");
                return false;
            }
        };
        if entry.kind.completeness().is_none() {
            return false;
        }
        if entry.is_complete() {
            return true;
        }

        let completed = if entry.tag() == DeclKindTag::Interface {
            importer.complete_interface_decl(store, self.ast, decl)
        } else {
            importer.complete_tag_decl(store, self.ast, decl)
        };
        match completed {
            Ok(true) => return true,
            Ok(false) => debug!(%request, "origin could not complete, searching images"),
            Err(err) => warn!(%request, error = %err, "completion from origin failed"),
        }

        self.complete_from_candidates(request, decl, &entry)
    }

    /// Complete `decl` from the first same-named image type that can.
    ///
    /// Candidates are considered in image order, so the outcome only depends
    /// on the order images were added in.
    fn complete_from_candidates(&self, request: RequestId, decl: DeclId, entry: &Decl) -> bool
    {
        let Some(name) = entry.name.as_identifier().filter(|name| !name.is_empty()) else {
            return false;
        };
        let store = self.target.store();
        let importer = self.target.importer();
        let max = self.config.max_fallback_types;

        let parent = entry.parent.unwrap_or(DeclId::TRANSLATION_UNIT);
        let parent_is_namespace = store
            .with(self.ast, |ast| ast.decl(parent).is_ok_and(|decl| matches!(decl.kind, DeclKind::Namespace)))
            .unwrap_or(false);

        let candidates: Vec<(Rc<Image>, Type)> = if parent_is_namespace {
            importer
                .namespace_map(self.ast, parent)
                .map(|map| {
                    let mut found = Vec::new();
                    for namespace in map.iter() {
                        match namespace.image.find_types(store, name, Some(namespace.namespace), max) {
                            Ok(types) => found.extend(types.into_iter().map(|ty| (namespace.image.clone(), ty))),
                            Err(err) => warn!(%request, error = %err, "type search failed"),
                        }
                    }
                    found
                })
                .unwrap_or_default()
        } else {
            self.target.images().find_types(store, name, max)
        };

        let wanted = entry.tag();
        for (image, ty) in candidates {
            let candidate = store
                .with(image.ast(), |ast| {
                    let id = if wanted == DeclKindTag::Interface {
                        ast.interface_decl_of(&ty)
                    } else {
                        ast.tag_decl_of(&ty)
                    };
                    id.filter(|id| ast.decl(*id).is_ok_and(|decl| decl.tag() == wanted))
                })
                .ok()
                .flatten();
            let Some(candidate) = candidate else {
                continue;
            };
            match importer.complete_tag_decl_with_origin(store, self.ast, decl, DeclRef::new(image.ast(), candidate)) {
                Ok(true) => {
                    debug!(%request, image = image.name(), "completed from image type");
                    return true;
                }
                Ok(false) => {}
                Err(err) => debug!(%request, error = %err, "candidate failed"),
            }
        }
        false
    }
}

impl ExternalAstSource for ExternalDeclSource
{
    fn find_external_visible_decls_by_name(&self, ctx: DeclId, name: &DeclName) -> Vec<DeclId>
    {
        let request = self.next_request();
        let span = span!(Level::DEBUG, "lookup", %request, %name, ctx = ctx.raw());
        let _enter = span.enter();
        self.lookup(request, ctx, name)
    }

    fn find_external_lexical_decls(&self, ctx: DeclId, filter: Option<DeclFilter<'_>>) -> ExprResult<Vec<DeclId>>
    {
        let request = self.next_request();
        let span = span!(Level::DEBUG, "lexical", %request, ctx = ctx.raw());
        let _enter = span.enter();
        self.lexical_decls(request, ctx, filter)
    }

    fn complete_type(&self, decl: DeclId) -> bool
    {
        let request = self.next_request();
        let span = span!(Level::DEBUG, "complete", %request, decl = decl.raw());
        let _enter = span.enter();
        self.complete(request, decl)
    }
}

impl MapCompleter for ExternalDeclSource
{
    fn complete_namespace_map(&self, map: &mut NamespaceMap, name: &str, parent: Option<&NamespaceMap>)
    {
        let store = self.target.store();
        match parent.filter(|parent| !parent.is_empty()) {
            Some(parent) => {
                let mut searched = Vec::new();
                for entry in parent.iter() {
                    if map.was_searched(entry.image.id()) {
                        continue;
                    }
                    searched.push(entry.image.id());
                    match entry.image.find_namespace(store, name, Some(entry.namespace)) {
                        Ok(Some(namespace)) => {
                            map.push(entry.image.clone(), namespace);
                        }
                        Ok(None) => {}
                        Err(err) => warn!(image = entry.image.name(), error = %err, "namespace search failed"),
                    }
                }
                for image in searched {
                    map.mark_searched(image);
                }
            }
            None => {
                for image in self.target.images().iter() {
                    if !map.mark_searched(image.id()) {
                        continue;
                    }
                    match image.find_namespace(store, name, None) {
                        Ok(Some(namespace)) => {
                            map.push(image.clone(), namespace);
                        }
                        Ok(None) => {}
                        Err(err) => warn!(image = image.name(), error = %err, "namespace search failed"),
                    }
                }
            }
        }
        trace!(namespace = name, entries = map.len(), "completed namespace map");
    }

    fn complete_interface_map(&self, map: &mut InterfaceMap, name: &str)
    {
        let store = self.target.store();
        let images: ImageRegistry = self.target.images();
        for image in images.iter() {
            let types = match image.find_types(store, name, None, self.config.max_fallback_types) {
                Ok(types) => types,
                Err(err) => {
                    warn!(image = image.name(), error = %err, "interface search failed");
                    continue;
                }
            };
            for ty in types {
                let interface = store.with(image.ast(), |ast| ast.interface_decl_of(&ty)).ok().flatten();
                if let Some(interface) = interface {
                    map.push(image.clone(), interface);
                }
            }
        }
        trace!(interface = name, entries = map.len(), "completed interface map");
    }
}

impl Drop for ExternalDeclSource
{
    fn drop(&mut self)
    {
        let importer = self.target.importer();
        importer.forget_destination(self.ast);
        importer.forget_source(self.target.scratch(), self.ast);
        self.target.store().destroy(self.ast);
        debug!(ast = %self.ast, "destroyed expression source");
    }
}

impl fmt::Debug for ExternalDeclSource
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ExternalDeclSource")
            .field("ast", &self.ast)
            .field("lookups_enabled", &self.lookups_enabled.get())
            .field("active_lookups", &self.active_lookups.borrow().len())
            .finish_non_exhaustive()
    }
}
