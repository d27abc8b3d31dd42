//! Provider over declarations already present in the image store.
//!
//! Used for symbol files that are converted into declarations up front, and
//! by the test suite to describe images declaratively.

use std::cell::RefCell;

use super::{DebugInfoProvider, FunctionMatch, FunctionNameKind};
use crate::ast::{AstContext, AstHandle, Decl, DeclId, DeclKind, DeclName, Type};
use crate::error::ExprResult;

/// Searches the image store directly; never materialises anything itself.
#[derive(Debug, Default)]
pub struct MemoryProvider
{
    // Function symbols without debug info.
    symbols: RefCell<Vec<String>>,
}

impl MemoryProvider
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add a function symbol for which no declaration exists.
    pub fn add_symbol(&self, name: impl Into<String>)
    {
        self.symbols.borrow_mut().push(name.into());
    }

    fn type_of(decl_id: DeclId, decl: &Decl) -> Option<Type>
    {
        match decl.kind {
            DeclKind::Record(_) | DeclKind::Enum(_) => Some(Type::Tag(decl_id)),
            DeclKind::Typedef { .. } => Some(Type::Typedef(decl_id)),
            DeclKind::Interface(_) => Some(Type::Interface(decl_id)),
            _ => None,
        }
    }

    fn is_global_scope(ast: &AstContext, decl: &Decl) -> bool
    {
        decl.parent
            .and_then(|parent| ast.decl(parent).ok())
            .is_some_and(|parent| matches!(parent.kind, DeclKind::TranslationUnit | DeclKind::Namespace))
    }
}

impl DebugInfoProvider for MemoryProvider
{
    fn find_types(&self, ast: AstHandle<'_>, name: &str, parent: Option<DeclId>, max: usize) -> ExprResult<Vec<Type>>
    {
        let wanted = DeclName::identifier(name);
        ast.try_with(|ast| {
            let scope = parent.unwrap_or_else(|| ast.translation_unit());
            let mut definitions = Vec::new();
            let mut forwards = Vec::new();
            for child in ast.children(scope)? {
                let decl = ast.decl(*child)?;
                if decl.name != wanted {
                    continue;
                }
                if let Some(ty) = Self::type_of(*child, decl) {
                    if decl.is_complete() {
                        definitions.push(ty);
                    } else {
                        forwards.push(ty);
                    }
                }
            }
            definitions.extend(forwards);
            definitions.truncate(max);
            Ok(definitions)
        })
    }

    fn find_functions(
        &self,
        ast: AstHandle<'_>,
        name: &str,
        kind: FunctionNameKind,
        max: usize,
    ) -> ExprResult<Vec<FunctionMatch>>
    {
        let mut found: Vec<FunctionMatch> = ast.with(|ast| {
            ast.iter()
                .filter(|(id, decl)| match &decl.kind {
                    DeclKind::Function(function) => {
                        (kind.contains(FunctionNameKind::BASE) && decl.name.as_identifier() == Some(name))
                            || (kind.contains(FunctionNameKind::FULL)
                                && (ast.qualified_name(*id) == name
                                    || function.linkage_name.as_deref() == Some(name)))
                    }
                    DeclKind::Method(method) => {
                        kind.contains(FunctionNameKind::SELECTOR) && method.selector.to_string() == name
                    }
                    _ => false,
                })
                .map(|(id, _)| FunctionMatch {
                    decl: Some(id),
                    name: name.to_string(),
                })
                .collect()
        })?;

        if kind.contains(FunctionNameKind::BASE) || kind.contains(FunctionNameKind::FULL) {
            for symbol in self.symbols.borrow().iter().filter(|symbol| *symbol == name) {
                found.push(FunctionMatch {
                    decl: None,
                    name: symbol.clone(),
                });
            }
        }

        found.truncate(max);
        Ok(found)
    }

    fn find_namespace(&self, ast: AstHandle<'_>, name: &str, parent: Option<DeclId>) -> ExprResult<Option<DeclId>>
    {
        let wanted = DeclName::identifier(name);
        ast.with(|ast| {
            let scope = parent.unwrap_or_else(|| ast.translation_unit());
            ast.find_child(scope, &wanted, |decl| matches!(decl.kind, DeclKind::Namespace))
        })
    }

    fn find_global_variables(&self, ast: AstHandle<'_>, name: &str, max: usize) -> ExprResult<Vec<DeclId>>
    {
        ast.with(|ast| {
            ast.iter()
                .filter(|(id, decl)| {
                    matches!(decl.kind, DeclKind::Variable(_))
                        && Self::is_global_scope(ast, decl)
                        && (decl.name.as_identifier() == Some(name) || ast.qualified_name(*id) == name)
                })
                .map(|(id, _)| id)
                .take(max)
                .collect()
        })
    }
}
