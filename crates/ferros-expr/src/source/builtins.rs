//! Compiler builtins that are never looked up in debug info.

const BUILTIN_PREFIXES: &[&str] = &["__builtin_", "__sync_", "__atomic_", "__c11_atomic_"];

const BUILTIN_NAMES: &[&str] = &[
    "__has_attribute",
    "__has_builtin",
    "__has_extension",
    "__has_feature",
    "__has_include",
    "__is_identifier",
    "__null",
    "__func__",
];

/// Whether `name` is an identifier the compiler resolves itself.
#[must_use]
pub fn is_builtin_identifier(name: &str) -> bool
{
    BUILTIN_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) || BUILTIN_NAMES.contains(&name)
}
