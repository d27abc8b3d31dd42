//! Per-lookup accumulation of results.

use smallvec::SmallVec;

use crate::ast::{
    AstHandle, DeclId, DeclKind, DeclName, FunctionDecl, FunctionType, StorageClass, Type, VariableDecl,
};
use crate::error::ExprResult;
use crate::importer::NamespaceMap;

/// What kinds of results a search has produced so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Found
{
    pub type_decl: bool,
    pub variable: bool,
    pub function: bool,
}

/// Scratch state of one name lookup in one declaration context.
///
/// Declarations are collected in the order they were added, without
/// duplicates. Namespaces found along the way are not turned into
/// declarations right away; they accumulate in [`NameSearchContext::namespace_map`]
/// and become one declaration once every image has been searched.
pub struct NameSearchContext<'a>
{
    ast: AstHandle<'a>,
    ctx: DeclId,
    name: DeclName,
    decls: SmallVec<[DeclId; 4]>,
    pub namespace_map: NamespaceMap,
    pub found: Found,
}

impl<'a> NameSearchContext<'a>
{
    #[must_use]
    pub fn new(ast: AstHandle<'a>, ctx: DeclId, name: DeclName) -> Self
    {
        Self {
            ast,
            ctx,
            name,
            decls: SmallVec::new(),
            namespace_map: NamespaceMap::new(),
            found: Found::default(),
        }
    }

    #[must_use]
    pub fn ctx(&self) -> DeclId
    {
        self.ctx
    }

    #[must_use]
    pub fn name(&self) -> &DeclName
    {
        &self.name
    }

    #[must_use]
    pub fn decls(&self) -> &[DeclId]
    {
        &self.decls
    }

    #[must_use]
    pub fn into_decls(self) -> Vec<DeclId>
    {
        self.decls.into_vec()
    }

    /// Add an already-copied declaration. Returns `false` for duplicates.
    pub fn add_named_decl(&mut self, decl: DeclId) -> bool
    {
        if self.decls.contains(&decl) {
            return false;
        }
        self.decls.push(decl);
        true
    }

    /// Add the declaration behind a copied named type.
    pub fn add_type_decl(&mut self, ty: &Type) -> bool
    {
        match ty {
            Type::Tag(decl) | Type::Typedef(decl) | Type::Interface(decl) => {
                self.found.type_decl = true;
                self.add_named_decl(*decl)
            }
            _ => false,
        }
    }

    /// Synthesise a variable of type `ty` under the searched name.
    pub fn add_var_decl(&mut self, ty: Type) -> ExprResult<DeclId>
    {
        let (ctx, name) = (self.ctx, self.name.clone());
        let decl = self.ast.try_with_mut(|ast| {
            ast.create_decl(
                ctx,
                name,
                DeclKind::Variable(VariableDecl {
                    ty,
                    storage: StorageClass::Extern,
                }),
            )
        })?;
        self.found.variable = true;
        self.add_named_decl(decl);
        Ok(decl)
    }

    /// Synthesise a function with the given prototype and named parameters.
    pub fn add_fun_decl(&mut self, signature: FunctionType, params: Vec<(DeclName, Type)>) -> ExprResult<DeclId>
    {
        let (ctx, name) = (self.ctx, self.name.clone());
        let decl = self.ast.try_with_mut(|ast| {
            let decl = ast.create_decl(
                ctx,
                name,
                DeclKind::Function(FunctionDecl {
                    signature,
                    storage: StorageClass::Extern,
                    linkage_name: None,
                }),
            )?;
            for (param, ty) in params {
                ast.add_decl(decl, param, DeclKind::Param { ty })?;
            }
            Ok(decl)
        })?;
        self.found.function = true;
        self.add_named_decl(decl);
        Ok(decl)
    }

    /// Synthesise `__unknown_any name(...)` for a function known only by symbol.
    pub fn add_generic_fun_decl(&mut self) -> ExprResult<DeclId>
    {
        self.add_fun_decl(FunctionType::generic(), Vec::new())
    }
}
