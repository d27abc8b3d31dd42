//! # ferros-expr
//!
//! Cross-image declaration resolution for Ferros expression evaluation.
//!
//! When an expression is compiled against a running target, the compiler only
//! knows what the expression itself declares. Everything else (types, globals,
//! functions, namespaces, Objective-C methods and properties) has to be found
//! in the debug info of the target's loaded images and copied into the
//! expression's own declaration store. This crate provides:
//!
//! - Declaration stores with a liveness table ([`ast`])
//! - Image registration and debug-info providers, DWARF included ([`images`])
//! - A memoising cross-store importer with origin tracking ([`importer`])
//! - The external source the compiler calls back into ([`source`])
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ferros_expr::prelude::*;
//!
//! # fn main() -> ferros_expr::ExprResult<()> {
//! let target = Target::new();
//! target.load_image("./a.out")?;
//!
//! let source = target.create_expression_source(SourceConfig::default())?;
//! source.find_external_visible_decls_by_name(DeclId::TRANSLATION_UNIT, &DeclName::identifier("$enable"));
//! let found = source.find_external_visible_decls_by_name(DeclId::TRANSLATION_UNIT, &DeclName::identifier("Point"));
//! println!("{} declarations", found.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading
//!
//! Everything here is single-threaded and re-entrant: a lookup may trigger an
//! import, which may trigger another lookup on the same source. Shared state
//! is reference counted (`Rc`) and uses interior mutability.

pub mod ast;
pub mod error;
pub mod images;
pub mod importer;
pub mod prelude;
pub mod source;
pub mod target;

pub use error::{ExprError, ExprResult};
pub use source::{ExternalDeclSource, SourceConfig};
pub use target::Target;
