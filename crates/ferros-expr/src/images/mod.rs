//! # Image Registry
//!
//! Loaded binary images and the debug-info providers that answer name
//! searches for them.
//!
//! Each image owns one declaration store holding whatever its provider has
//! materialised so far. Providers are free to build that store up front
//! ([`MemoryProvider`]) or lazily as names are requested ([`DwarfProvider`]).
//! Lazy providers also complete forward-declared aggregates on demand, which is
//! exposed to the rest of the crate through the store's external source
//! ([`ImageSource`]).

pub mod demangle;
pub mod dwarf;
pub mod memory;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;
use std::rc::{Rc, Weak};

pub use dwarf::DwarfProvider;
pub use memory::MemoryProvider;
use tracing::{debug, warn};

use crate::ast::{AstHandle, AstId, AstStore, DeclFilter, DeclId, DeclName, ExternalAstSource, Type};
use crate::error::{ExprError, ExprResult};

/// Stable identifier of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

impl ImageId
{
    #[must_use]
    pub fn from_name(name: &str) -> Self
    {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        ImageId(hasher.finish())
    }

    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for ImageId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:016x}", self.0)
    }
}

/// Which spellings of a function name a search should match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionNameKind(u32);

impl FunctionNameKind
{
    /// Unqualified name (`bar` for `foo::bar`).
    pub const BASE: Self = Self(1);
    /// Fully qualified or demangled linkage name.
    pub const FULL: Self = Self(1 << 1);
    /// C++ member function base name.
    pub const METHOD: Self = Self(1 << 2);
    /// Objective-C selector (`doSomething:withValue:`).
    pub const SELECTOR: Self = Self(1 << 3);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool
    {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FunctionNameKind
{
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self
    {
        Self(self.0 | rhs.0)
    }
}

/// A function found by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMatch
{
    /// The function or method declaration in the image store, when the image
    /// has debug info for it. `None` for symbol-table-only matches.
    pub decl: Option<DeclId>,
    /// The name the match was found under.
    pub name: String,
}

/// Per-image search interface over debug info.
///
/// `parent` arguments name a namespace declaration inside the image's own
/// store; `None` means the root namespace.
pub trait DebugInfoProvider
{
    /// Types named `name` declared directly in `parent`, definitions first.
    fn find_types(&self, ast: AstHandle<'_>, name: &str, parent: Option<DeclId>, max: usize) -> ExprResult<Vec<Type>>;

    /// Functions matching `name` under any spelling selected by `kind`.
    fn find_functions(
        &self,
        ast: AstHandle<'_>,
        name: &str,
        kind: FunctionNameKind,
        max: usize,
    ) -> ExprResult<Vec<FunctionMatch>>;

    /// The namespace named `name` directly inside `parent`.
    fn find_namespace(&self, ast: AstHandle<'_>, name: &str, parent: Option<DeclId>) -> ExprResult<Option<DeclId>>;

    /// Global (namespace-scope) variables named `name`.
    fn find_global_variables(&self, ast: AstHandle<'_>, name: &str, max: usize) -> ExprResult<Vec<DeclId>>;

    /// Whether [`DebugInfoProvider::complete_type`] can do anything.
    fn supports_lazy_completion(&self) -> bool
    {
        false
    }

    /// Complete a forward-declared aggregate of the image store in place.
    ///
    /// Returns whether the declaration is complete afterwards.
    fn complete_type(&self, _ast: AstHandle<'_>, _decl: DeclId) -> ExprResult<bool>
    {
        Ok(false)
    }
}

/// One loaded binary image.
pub struct Image
{
    id: ImageId,
    name: String,
    ast: AstId,
    provider: Rc<dyn DebugInfoProvider>,
    // Registered (weakly) as the external source of `ast`; owned here.
    _source: Rc<ImageSource>,
}

impl Image
{
    /// Wrap `provider` as an image whose declarations live in `ast`.
    pub(crate) fn new(store: &Rc<AstStore>, name: String, ast: AstId, provider: Rc<dyn DebugInfoProvider>) -> Self
    {
        let source = Rc::new(ImageSource {
            store: Rc::downgrade(store),
            ast,
            provider: provider.clone(),
        });
        let weak: Weak<dyn ExternalAstSource> = Rc::downgrade(&source) as Weak<dyn ExternalAstSource>;
        store.set_external_source(ast, weak);

        Self {
            id: ImageId::from_name(&name),
            name,
            ast,
            provider,
            _source: source,
        }
    }

    #[must_use]
    pub fn id(&self) -> ImageId
    {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// The store holding this image's declarations.
    #[must_use]
    pub fn ast(&self) -> AstId
    {
        self.ast
    }

    #[must_use]
    pub fn provider(&self) -> &Rc<dyn DebugInfoProvider>
    {
        &self.provider
    }

    pub fn find_types(&self, store: &AstStore, name: &str, parent: Option<DeclId>, max: usize) -> ExprResult<Vec<Type>>
    {
        self.provider.find_types(AstHandle::new(store, self.ast), name, parent, max)
    }

    pub fn find_functions(
        &self,
        store: &AstStore,
        name: &str,
        kind: FunctionNameKind,
        max: usize,
    ) -> ExprResult<Vec<FunctionMatch>>
    {
        self.provider.find_functions(AstHandle::new(store, self.ast), name, kind, max)
    }

    pub fn find_namespace(&self, store: &AstStore, name: &str, parent: Option<DeclId>) -> ExprResult<Option<DeclId>>
    {
        self.provider.find_namespace(AstHandle::new(store, self.ast), name, parent)
    }

    pub fn find_global_variables(&self, store: &AstStore, name: &str, max: usize) -> ExprResult<Vec<DeclId>>
    {
        self.provider.find_global_variables(AstHandle::new(store, self.ast), name, max)
    }
}

impl fmt::Debug for Image
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Image")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ast", &self.ast)
            .finish_non_exhaustive()
    }
}

/// External source of an image store: completes aggregates through the
/// image's provider.
pub struct ImageSource
{
    store: Weak<AstStore>,
    ast: AstId,
    provider: Rc<dyn DebugInfoProvider>,
}

impl ExternalAstSource for ImageSource
{
    fn find_external_visible_decls_by_name(&self, _ctx: DeclId, _name: &DeclName) -> Vec<DeclId>
    {
        Vec::new()
    }

    fn find_external_lexical_decls(&self, ctx: DeclId, filter: Option<DeclFilter<'_>>) -> ExprResult<Vec<DeclId>>
    {
        let store = self.store.upgrade().ok_or(ExprError::UnknownContext(self.ast))?;
        self.complete_type(ctx);
        store.try_with(self.ast, |ast| {
            let children = ast.children(ctx)?;
            Ok(children
                .iter()
                .copied()
                .filter(|child| {
                    filter.is_none_or(|accept| ast.decl(*child).is_ok_and(|decl| accept(decl.tag())))
                })
                .collect())
        })
    }

    fn complete_type(&self, decl: DeclId) -> bool
    {
        let Some(store) = self.store.upgrade() else {
            return false;
        };
        if store.with(self.ast, |ast| ast.is_complete(decl)).unwrap_or(false) {
            return true;
        }
        if !self.provider.supports_lazy_completion() {
            return false;
        }

        match self.provider.complete_type(AstHandle::new(&store, self.ast), decl) {
            Ok(complete) => {
                debug!(ast = %self.ast, decl = decl.raw(), complete, "image completed type");
                complete
            }
            Err(err) => {
                warn!(ast = %self.ast, decl = decl.raw(), error = %err, "image failed to complete type");
                false
            }
        }
    }
}

/// Ordered collection of loaded images.
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry
{
    images: Vec<Rc<Image>>,
}

impl ImageRegistry
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.images.is_empty()
    }

    #[must_use]
    pub fn image_at(&self, index: usize) -> Option<Rc<Image>>
    {
        self.images.get(index).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Image>>
    {
        self.images.iter()
    }

    #[must_use]
    pub fn find(&self, id: ImageId) -> Option<Rc<Image>>
    {
        self.images.iter().find(|image| image.id() == id).cloned()
    }

    /// Append an image. An image with the same id is returned instead of
    /// being registered twice.
    pub fn add(&mut self, image: Rc<Image>) -> Rc<Image>
    {
        if let Some(existing) = self.find(image.id()) {
            return existing;
        }
        self.images.push(image.clone());
        image
    }

    pub fn remove(&mut self, id: ImageId) -> Option<Rc<Image>>
    {
        let index = self.images.iter().position(|image| image.id() == id)?;
        Some(self.images.remove(index))
    }

    /// Search every image, in order, for root-scope types named `name`.
    ///
    /// Stops once `max` types have been collected. Provider errors are logged
    /// and the image is skipped.
    #[must_use]
    pub fn find_types(&self, store: &AstStore, name: &str, max: usize) -> Vec<(Rc<Image>, Type)>
    {
        let mut found = Vec::new();
        for image in &self.images {
            if found.len() >= max {
                break;
            }
            match image.find_types(store, name, None, max - found.len()) {
                Ok(types) => found.extend(types.into_iter().map(|ty| (image.clone(), ty))),
                Err(err) => warn!(image = image.name(), name, error = %err, "type search failed"),
            }
        }
        found
    }

    /// Search every image, in order, for functions matching `name`.
    #[must_use]
    pub fn find_functions(
        &self,
        store: &AstStore,
        name: &str,
        kind: FunctionNameKind,
        max: usize,
    ) -> Vec<(Rc<Image>, FunctionMatch)>
    {
        let mut found = Vec::new();
        for image in &self.images {
            if found.len() >= max {
                break;
            }
            match image.find_functions(store, name, kind, max - found.len()) {
                Ok(matches) => found.extend(matches.into_iter().map(|m| (image.clone(), m))),
                Err(err) => warn!(image = image.name(), name, error = %err, "function search failed"),
            }
        }
        found
    }
}
