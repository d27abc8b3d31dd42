//! # Error Types
//!
//! Error handling for declaration resolution.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Most of these never reach the compiler that consults the resolver: lookups
//! fail closed with an empty result, and completions leave the type incomplete.
//! The errors exist so the internal layers can tell the cases apart and log
//! them accordingly.

use thiserror::Error;

use crate::ast::{AstId, DeclId, DeclKindTag};

/// Main error type for resolver operations
///
/// ## Error Categories
///
/// 1. **Lookup errors**: NotFound
/// 2. **Origin errors**: ResolutionFailure
/// 3. **Import errors**: ImportFailure
/// 4. **Store errors**: UnknownContext, UnknownDecl
/// 5. **Debug info errors**: Dwarf, Io, InvalidArgument
#[derive(Error, Debug)]
pub enum ExprError
{
    /// No matching declaration anywhere
    ///
    /// Always recoverable. The compiling context reports it as an ordinary
    /// "use of undeclared identifier" diagnostic.
    #[error("No declaration named '{0}'")]
    NotFound(String),

    /// An imported declaration's origin is missing or lives in a destroyed store
    ///
    /// The declaration is treated as un-completable and stays incomplete.
    #[error("Could not resolve origin of declaration {decl:?}: {reason}")]
    ResolutionFailure
    {
        /// The copied declaration whose origin was requested
        decl: DeclId,
        /// Why the origin could not be used
        reason: String,
    },

    /// A declaration of an unsupported kind was offered for copy
    ///
    /// Callers skip the declaration; its siblings are still imported.
    #[error("Cannot import {kind:?} declaration '{name}'")]
    ImportFailure
    {
        /// Kind of the rejected declaration
        kind: DeclKindTag,
        /// Name of the rejected declaration (may be empty)
        name: String,
    },

    /// The declaration store has been destroyed (or never existed)
    #[error("Unknown declaration store {0}")]
    UnknownContext(AstId),

    /// The declaration id is out of range for its store
    #[error("Unknown declaration {decl:?} in store {ast}")]
    UnknownDecl
    {
        /// Store that was searched
        ast: AstId,
        /// Offending declaration id
        decl: DeclId,
    },

    /// Invalid argument passed to a resolver function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed or unsupported DWARF
    #[error("DWARF error: {0}")]
    Dwarf(String),

    /// I/O error (reading object files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExprError
{
    /// True for the error kinds that callers are expected to skip silently.
    #[must_use]
    pub fn is_recoverable(&self) -> bool
    {
        matches!(
            self,
            ExprError::NotFound(_) | ExprError::ResolutionFailure { .. } | ExprError::ImportFailure { .. }
        )
    }
}

/// Convenience type alias for `Result<T, ExprError>`
///
/// ```rust
/// use ferros_expr::error::ExprResult;
/// fn foo() -> ExprResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type ExprResult<T> = std::result::Result<T, ExprError>;
