//! Linkage-name helpers for function-name matching.
//!
//! Debug info records functions under their mangled linkage names. Name
//! searches compare against the demangled form (`FULL`) and the last path
//! component of it (`BASE`).

use rustc_demangle::try_demangle;

use crate::error::ExprError;

/// Demangle `raw` without the trailing hash suffix, if it is a mangled name.
pub(crate) fn demangled_name(raw: &str) -> Option<String>
{
    try_demangle(raw).ok().map(|demangled| format!("{demangled:#}"))
}

/// Last `::` component of a qualified name, ignoring generic arguments.
pub(crate) fn base_name(qualified: &str) -> &str
{
    let without_generics = match qualified.find('<') {
        Some(index) => &qualified[..index],
        None => qualified,
    };
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}

/// Map a gimli error to an [`ExprError`] with context.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> ExprError
{
    ExprError::Dwarf(format!("{context}: {err}"))
}
