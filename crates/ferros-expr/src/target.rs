//! The debug target: its loaded images, the scratch store and the importer
//! shared by every expression evaluated against it.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info};

use crate::ast::{AstId, AstStore};
use crate::error::ExprResult;
use crate::images::{DebugInfoProvider, DwarfProvider, Image, ImageId, ImageRegistry};
use crate::importer::DeclImporter;
use crate::source::{ExternalDeclSource, SourceConfig};

/// Everything expressions are evaluated against.
///
/// A target owns the store of every image, the scratch store and the
/// importer. It hands out [`ExternalDeclSource`]s, one per expression store.
///
/// ## Examples
///
/// ```
/// use std::rc::Rc;
///
/// use ferros_expr::ast::{DeclId, DeclName, ExternalAstSource};
/// use ferros_expr::images::MemoryProvider;
/// use ferros_expr::{SourceConfig, Target};
///
/// let target = Target::new();
/// target.add_image("liba.so", Rc::new(MemoryProvider::new()));
/// let source = target.create_expression_source(SourceConfig::default())?;
///
/// // Nothing is searched until the expression mentions a `$` name.
/// assert!(!source.lookups_enabled());
/// source.find_external_visible_decls_by_name(DeclId::TRANSLATION_UNIT, &DeclName::identifier("$x"));
/// assert!(source.lookups_enabled());
/// # Ok::<(), ferros_expr::ExprError>(())
/// ```
pub struct Target
{
    asts: Rc<AstStore>,
    images: RefCell<ImageRegistry>,
    importer: DeclImporter,
    scratch: AstId,
}

impl Target
{
    #[must_use]
    pub fn new() -> Rc<Self>
    {
        let asts = Rc::new(AstStore::new());
        let scratch = asts.create("scratch");
        Rc::new(Self {
            asts,
            images: RefCell::new(ImageRegistry::new()),
            importer: DeclImporter::new(),
            scratch,
        })
    }

    /// Every declaration store of the target, images and expressions alike.
    #[must_use]
    pub fn store(&self) -> &Rc<AstStore>
    {
        &self.asts
    }

    #[must_use]
    pub fn importer(&self) -> &DeclImporter
    {
        &self.importer
    }

    /// Store holding declarations that outlive a single expression.
    #[must_use]
    pub fn scratch(&self) -> AstId
    {
        self.scratch
    }

    /// Snapshot of the loaded images, in load order.
    ///
    /// Callers iterate the snapshot so providers are free to load images
    /// while a search is running.
    #[must_use]
    pub fn images(&self) -> ImageRegistry
    {
        self.images.borrow().clone()
    }

    /// Register an image whose declarations are supplied by `provider`.
    ///
    /// Adding a second image with the same name returns the first one.
    pub fn add_image(&self, name: impl Into<String>, provider: Rc<dyn DebugInfoProvider>) -> Rc<Image>
    {
        let name = name.into();
        if let Some(existing) = self.images.borrow().find(ImageId::from_name(&name)) {
            return existing;
        }
        let ast = self.asts.create(name.clone());
        let image = Rc::new(Image::new(&self.asts, name, ast, provider));
        debug!(image = image.name(), ast = %ast, "added image");
        self.images.borrow_mut().add(image)
    }

    /// Load an object file with DWARF debug info as an image.
    ///
    /// ## Errors
    ///
    /// `Io` when the file cannot be read, `Dwarf` when it cannot be parsed.
    pub fn load_image(&self, path: impl AsRef<Path>) -> ExprResult<Rc<Image>>
    {
        let path = path.as_ref();
        let provider = DwarfProvider::open(path)?;
        let name = provider.name().to_string();
        let image = self.add_image(name, Rc::new(provider));
        info!(image = image.name(), "loaded image");
        Ok(image)
    }

    /// Unload an image, destroying its store and everything copied from it.
    pub fn remove_image(&self, id: ImageId) -> bool
    {
        let Some(image) = self.images.borrow_mut().remove(id) else {
            return false;
        };
        self.importer.forget_source_everywhere(image.ast());
        self.asts.destroy(image.ast());
        debug!(image = image.name(), "removed image");
        true
    }

    /// Create a fresh expression store and the source that resolves names for it.
    ///
    /// The store is destroyed when the returned source is dropped.
    pub fn create_expression_source(self: &Rc<Self>, config: SourceConfig) -> ExprResult<Rc<ExternalDeclSource>>
    {
        ExternalDeclSource::new(self.clone(), config)
    }
}

impl std::fmt::Debug for Target
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Target")
            .field("images", &self.images.borrow().len())
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}
