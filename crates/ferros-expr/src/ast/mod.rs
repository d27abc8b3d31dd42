//! # Declaration Stores
//!
//! Every set of declarations lives in an [`AstContext`]: one per loaded image
//! (built from that image's debug info), one scratch store per target and one
//! per expression being compiled. Stores are owned by the [`AstStore`], which
//! doubles as the liveness table: handles into a destroyed store fail with
//! [`ExprError::UnknownContext`] instead of dangling.
//!
//! ## Re-entrancy
//!
//! Resolution is synchronous but re-entrant: importing a declaration may look
//! up names in the destination, which may call back into the resolver, which
//! imports more declarations. The store therefore uses interior mutability and
//! every accessor borrows only for the duration of a closure. Code in this
//! crate never calls out (to a provider, an external source or the importer)
//! from inside one of those closures.

pub mod decl;
pub mod dump;
pub mod types;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

pub use decl::{
    Completeness, Decl, DeclKind, DeclKindTag, DeclName, EnumDecl, ExternalStorage, FieldDecl, FunctionDecl,
    InterfaceDecl, MethodDecl, RecordDecl, Selector, StorageClass, TagKind, VariableDecl,
};
pub use types::{BuiltinType, FunctionType, Type};

use crate::error::{ExprError, ExprResult};

/// Typedef chains longer than this are treated as malformed.
const MAX_DESUGAR_DEPTH: usize = 32;

/// Identifier of one declaration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstId(u32);

impl AstId
{
    #[must_use]
    pub const fn from_raw(value: u32) -> Self
    {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl fmt::Display for AstId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "ast#{}", self.0)
    }
}

/// Index of a declaration inside its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(u32);

impl DeclId
{
    /// Every store keeps its translation unit in slot 0.
    pub const TRANSLATION_UNIT: DeclId = DeclId(0);

    #[must_use]
    pub const fn from_raw(value: u32) -> Self
    {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }

    fn index(self) -> usize
    {
        self.0 as usize
    }
}

/// A declaration together with the store that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclRef
{
    pub ast: AstId,
    pub decl: DeclId,
}

impl DeclRef
{
    #[must_use]
    pub const fn new(ast: AstId, decl: DeclId) -> Self
    {
        Self { ast, decl }
    }
}

impl fmt::Display for DeclRef
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}/{}", self.ast, self.decl.0)
    }
}

/// Predicate over declaration kinds used by lexical enumeration.
pub type DeclFilter<'a> = &'a dyn Fn(DeclKindTag) -> bool;

/// The contract a store's external source fulfils for whoever compiles
/// against that store.
///
/// All three operations are invoked synchronously and may re-enter the same
/// source.
pub trait ExternalAstSource
{
    /// Resolve `name` inside `ctx`, returning the declarations now visible there.
    fn find_external_visible_decls_by_name(&self, ctx: DeclId, name: &DeclName) -> Vec<DeclId>;

    /// Materialise the children of `ctx`, keeping those accepted by `filter`.
    ///
    /// ## Errors
    ///
    /// `ResolutionFailure` when `ctx` has no recorded origin.
    fn find_external_lexical_decls(&self, ctx: DeclId, filter: Option<DeclFilter<'_>>) -> ExprResult<Vec<DeclId>>;

    /// Try to complete a forward-declared record, enum or interface.
    ///
    /// Returns whether the declaration is complete afterwards.
    fn complete_type(&self, decl: DeclId) -> bool;
}

/// Arena of declarations making up one store.
#[derive(Debug, Clone)]
pub struct AstContext
{
    id: AstId,
    label: String,
    decls: Vec<Decl>,
    visible: HashMap<(DeclId, DeclName), Vec<DeclId>>,
}

impl AstContext
{
    fn new(id: AstId, label: String) -> Self
    {
        let unit = Decl::new(DeclName::identifier(""), None, DeclKind::TranslationUnit);
        Self {
            id,
            label,
            decls: vec![unit],
            visible: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> AstId
    {
        self.id
    }

    #[must_use]
    pub fn label(&self) -> &str
    {
        &self.label
    }

    #[must_use]
    pub fn translation_unit(&self) -> DeclId
    {
        DeclId::TRANSLATION_UNIT
    }

    /// Number of declarations ever created in this store.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.decls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.decls.len() <= 1
    }

    pub fn decl(&self, id: DeclId) -> ExprResult<&Decl>
    {
        self.decls.get(id.index()).ok_or(ExprError::UnknownDecl { ast: self.id, decl: id })
    }

    pub fn decl_mut(&mut self, id: DeclId) -> ExprResult<&mut Decl>
    {
        let ast = self.id;
        self.decls.get_mut(id.index()).ok_or(ExprError::UnknownDecl { ast, decl: id })
    }

    /// Create a declaration and append it to `parent`'s lexical children.
    pub fn add_decl(&mut self, parent: DeclId, name: DeclName, kind: DeclKind) -> ExprResult<DeclId>
    {
        let id = self.create_decl(parent, name, kind)?;
        self.decl_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Create a declaration whose parent is `parent` without listing it among
    /// the parent's children (lookup results synthesised for a single name).
    pub fn create_decl(&mut self, parent: DeclId, name: DeclName, kind: DeclKind) -> ExprResult<DeclId>
    {
        self.decl(parent)?;
        let id = DeclId(u32::try_from(self.decls.len()).map_err(|_| {
            ExprError::InvalidArgument(format!("declaration store {} is full", self.id))
        })?);
        self.decls.push(Decl::new(name, Some(parent), kind));
        Ok(id)
    }

    /// Append `child` to `parent`'s children unless it is already listed.
    pub fn attach_child(&mut self, parent: DeclId, child: DeclId) -> ExprResult<()>
    {
        self.decl(child)?;
        let children = &mut self.decl_mut(parent)?.children;
        if !children.contains(&child) {
            children.push(child);
        }
        Ok(())
    }

    pub fn children(&self, ctx: DeclId) -> ExprResult<&[DeclId]>
    {
        Ok(&self.decl(ctx)?.children)
    }

    /// Declarations named `name` directly inside `ctx`, including results a
    /// previous external lookup registered for that name.
    #[must_use]
    pub fn lookup_local(&self, ctx: DeclId, name: &DeclName) -> Vec<DeclId>
    {
        let mut found: Vec<DeclId> = self
            .decl(ctx)
            .map(|decl| {
                decl.children
                    .iter()
                    .copied()
                    .filter(|child| self.decls.get(child.index()).is_some_and(|d| &d.name == name))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(external) = self.visible.get(&(ctx, name.clone())) {
            for decl in external {
                if !found.contains(decl) {
                    found.push(*decl);
                }
            }
        }
        found
    }

    /// Record the outcome of an external lookup for `name` in `ctx`.
    pub fn set_external_visible_decls(&mut self, ctx: DeclId, name: DeclName, decls: &[DeclId])
    {
        let entry = self.visible.entry((ctx, name)).or_default();
        for decl in decls {
            if !entry.contains(decl) {
                entry.push(*decl);
            }
        }
    }

    /// Record that an external lookup for `name` in `ctx` produced nothing.
    pub fn set_no_external_visible_decls(&mut self, ctx: DeclId, name: DeclName)
    {
        self.visible.entry((ctx, name)).or_default();
    }

    /// Results recorded by earlier external lookups, if any were made.
    #[must_use]
    pub fn external_visible_decls(&self, ctx: DeclId, name: &DeclName) -> Option<&[DeclId]>
    {
        self.visible.get(&(ctx, name.clone())).map(Vec::as_slice)
    }

    /// Strip typedefs until a non-typedef type is reached.
    #[must_use]
    pub fn desugar(&self, ty: &Type) -> Type
    {
        let mut current = ty.clone();
        for _ in 0..MAX_DESUGAR_DEPTH {
            let Type::Typedef(id) = current else {
                return current;
            };
            match self.decl(id).map(|decl| &decl.kind) {
                Ok(DeclKind::Typedef { underlying }) => current = underlying.clone(),
                _ => return Type::Typedef(id),
            }
        }
        current
    }

    /// The record or enum declaration behind `ty`, looking through typedefs.
    #[must_use]
    pub fn tag_decl_of(&self, ty: &Type) -> Option<DeclId>
    {
        match self.desugar(ty) {
            Type::Tag(id) => Some(id),
            _ => None,
        }
    }

    /// The interface declaration behind `ty` or a pointer to it.
    #[must_use]
    pub fn interface_decl_of(&self, ty: &Type) -> Option<DeclId>
    {
        match self.desugar(ty) {
            Type::Interface(id) => Some(id),
            Type::Pointer(inner) => match self.desugar(&inner) {
                Type::Interface(id) => Some(id),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether `decl` is complete (declarations without a completeness state are).
    #[must_use]
    pub fn is_complete(&self, decl: DeclId) -> bool
    {
        self.decl(decl).is_ok_and(Decl::is_complete)
    }

    /// `ns::Outer::Inner` style name of `decl`.
    #[must_use]
    pub fn qualified_name(&self, decl: DeclId) -> String
    {
        let mut parts = Vec::new();
        let mut current = Some(decl);
        while let Some(id) = current {
            let Ok(entry) = self.decl(id) else {
                break;
            };
            if !matches!(entry.kind, DeclKind::TranslationUnit) {
                parts.push(entry.name.to_string());
            }
            current = entry.parent;
        }
        parts.reverse();
        parts.join("::")
    }

    /// First child of `ctx` named `name` that satisfies `accept`.
    #[must_use]
    pub fn find_child(&self, ctx: DeclId, name: &DeclName, accept: impl Fn(&Decl) -> bool) -> Option<DeclId>
    {
        self.decl(ctx).ok()?.children.iter().copied().find(|child| {
            self.decls
                .get(child.index())
                .is_some_and(|decl| &decl.name == name && accept(decl))
        })
    }

    /// Iterate every declaration in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (DeclId, &Decl)>
    {
        self.decls
            .iter()
            .enumerate()
            .map(|(index, decl)| (DeclId(u32::try_from(index).unwrap_or(u32::MAX)), decl))
    }
}

/// Owner and liveness table of every declaration store.
#[derive(Default)]
pub struct AstStore
{
    slots: RefCell<Vec<Option<AstContext>>>,
    sources: RefCell<HashMap<AstId, Weak<dyn ExternalAstSource>>>,
}

impl AstStore
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Create an empty store (just a translation unit).
    pub fn create(&self, label: impl Into<String>) -> AstId
    {
        let mut slots = self.slots.borrow_mut();
        let id = AstId(u32::try_from(slots.len()).unwrap_or(u32::MAX));
        slots.push(Some(AstContext::new(id, label.into())));
        id
    }

    /// Destroy a store. Its id is never handed out again.
    pub fn destroy(&self, id: AstId) -> bool
    {
        self.sources.borrow_mut().remove(&id);
        let mut slots = self.slots.borrow_mut();
        slots.get_mut(id.0 as usize).and_then(Option::take).is_some()
    }

    #[must_use]
    pub fn is_live(&self, id: AstId) -> bool
    {
        self.slots
            .borrow()
            .get(id.0 as usize)
            .is_some_and(Option::is_some)
    }

    /// Ids of every live store.
    #[must_use]
    pub fn live_ids(&self) -> Vec<AstId>
    {
        self.slots
            .borrow()
            .iter()
            .filter_map(|slot| slot.as_ref().map(AstContext::id))
            .collect()
    }

    /// Run `f` against a live store.
    pub fn with<R>(&self, id: AstId, f: impl FnOnce(&AstContext) -> R) -> ExprResult<R>
    {
        let slots = self.slots.borrow();
        let ast = slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(ExprError::UnknownContext(id))?;
        Ok(f(ast))
    }

    /// Run `f` against a live store, mutably.
    pub fn with_mut<R>(&self, id: AstId, f: impl FnOnce(&mut AstContext) -> R) -> ExprResult<R>
    {
        let mut slots = self.slots.borrow_mut();
        let ast = slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(ExprError::UnknownContext(id))?;
        Ok(f(ast))
    }

    /// Like [`AstStore::with`] for closures that can fail.
    pub fn try_with<R>(&self, id: AstId, f: impl FnOnce(&AstContext) -> ExprResult<R>) -> ExprResult<R>
    {
        self.with(id, f)?
    }

    /// Like [`AstStore::with_mut`] for closures that can fail.
    pub fn try_with_mut<R>(&self, id: AstId, f: impl FnOnce(&mut AstContext) -> ExprResult<R>) -> ExprResult<R>
    {
        self.with_mut(id, f)?
    }

    /// Clone a declaration out of its store.
    pub fn decl(&self, decl: DeclRef) -> ExprResult<Decl>
    {
        self.try_with(decl.ast, |ast| ast.decl(decl.decl).cloned())
    }

    /// Register the external source consulted for `id`.
    pub fn set_external_source(&self, id: AstId, source: Weak<dyn ExternalAstSource>)
    {
        self.sources.borrow_mut().insert(id, source);
    }

    /// The external source of `id`, if one is registered and still alive.
    #[must_use]
    pub fn external_source(&self, id: AstId) -> Option<Rc<dyn ExternalAstSource>>
    {
        self.sources.borrow().get(&id).and_then(Weak::upgrade)
    }
}

impl fmt::Debug for AstStore
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("AstStore").field("live", &self.live_ids()).finish()
    }
}

/// A store id bundled with the store it lives in, handed to debug-info providers.
#[derive(Clone, Copy)]
pub struct AstHandle<'a>
{
    store: &'a AstStore,
    id: AstId,
}

impl<'a> AstHandle<'a>
{
    #[must_use]
    pub fn new(store: &'a AstStore, id: AstId) -> Self
    {
        Self { store, id }
    }

    #[must_use]
    pub fn id(&self) -> AstId
    {
        self.id
    }

    #[must_use]
    pub fn store(&self) -> &'a AstStore
    {
        self.store
    }

    pub fn with<R>(&self, f: impl FnOnce(&AstContext) -> R) -> ExprResult<R>
    {
        self.store.with(self.id, f)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut AstContext) -> R) -> ExprResult<R>
    {
        self.store.with_mut(self.id, f)
    }

    pub fn try_with<R>(&self, f: impl FnOnce(&AstContext) -> ExprResult<R>) -> ExprResult<R>
    {
        self.store.try_with(self.id, f)
    }

    pub fn try_with_mut<R>(&self, f: impl FnOnce(&mut AstContext) -> ExprResult<R>) -> ExprResult<R>
    {
        self.store.try_with_mut(self.id, f)
    }
}
