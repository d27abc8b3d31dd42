//! Common module for library exports

pub use crate::ast::{
    AstId, AstStore, Decl, DeclId, DeclKind, DeclKindTag, DeclName, DeclRef, ExternalAstSource, Selector, Type,
};
pub use crate::error::{ExprError, ExprResult};
pub use crate::images::{DebugInfoProvider, DwarfProvider, Image, ImageId, MemoryProvider};
pub use crate::importer::DeclImporter;
pub use crate::source::{ExternalDeclSource, RequestId, SourceConfig};
pub use crate::target::Target;
