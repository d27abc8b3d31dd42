//! Shared fixtures: images described declaratively through `MemoryProvider`.

#![allow(dead_code)]

use std::rc::Rc;

use ferros_expr::ast::{
    AstContext, Completeness, Decl, DeclId, DeclKind, DeclName, DeclRef, ExternalAstSource, FieldDecl, FunctionDecl,
    FunctionType, InterfaceDecl, MethodDecl, RecordDecl, Selector, StorageClass, TagKind, Type, VariableDecl,
};
use ferros_expr::images::{Image, MemoryProvider};
use ferros_expr::{ExprResult, ExternalDeclSource, SourceConfig, Target};

/// Add a `MemoryProvider` image and populate its store with `build`.
pub fn memory_image(
    target: &Rc<Target>,
    name: &str,
    build: impl FnOnce(&mut AstContext) -> ExprResult<()>,
) -> (Rc<Image>, Rc<MemoryProvider>)
{
    let provider = Rc::new(MemoryProvider::new());
    let image = target.add_image(name, provider.clone());
    target
        .store()
        .try_with_mut(image.ast(), build)
        .expect("failed to build image");
    (image, provider)
}

/// An expression source with lookups already enabled.
pub fn enabled_source(target: &Rc<Target>) -> Rc<ExternalDeclSource>
{
    target
        .create_expression_source(SourceConfig {
            lookups_enabled: true,
            ..SourceConfig::default()
        })
        .expect("failed to create expression source")
}

pub fn lookup(source: &ExternalDeclSource, ctx: DeclId, name: &str) -> Vec<DeclId>
{
    source.find_external_visible_decls_by_name(ctx, &DeclName::identifier(name))
}

pub fn lookup_global(source: &ExternalDeclSource, name: &str) -> Vec<DeclId>
{
    lookup(source, DeclId::TRANSLATION_UNIT, name)
}

/// Clone a declaration out of the source's expression store.
pub fn decl(source: &ExternalDeclSource, id: DeclId) -> Decl
{
    source
        .target()
        .store()
        .decl(DeclRef::new(source.ast(), id))
        .expect("unknown declaration")
}

/// Names of the children of `id` in the expression store.
pub fn child_names(source: &ExternalDeclSource, id: DeclId) -> Vec<String>
{
    decl(source, id)
        .children
        .iter()
        .map(|child| decl(source, *child).name.to_string())
        .collect()
}

pub fn namespace(ast: &mut AstContext, parent: DeclId, name: &str) -> ExprResult<DeclId>
{
    ast.add_decl(parent, DeclName::identifier(name), DeclKind::Namespace)
}

/// A complete struct with the given fields laid out back to back.
pub fn record(ast: &mut AstContext, parent: DeclId, name: &str, fields: &[(&str, Type)]) -> ExprResult<DeclId>
{
    let id = forward_record(ast, parent, name)?;
    for (index, (field, ty)) in fields.iter().enumerate() {
        ast.add_decl(
            id,
            DeclName::identifier(*field),
            DeclKind::Field(FieldDecl {
                ty: ty.clone(),
                offset_bits: Some(index as u64 * 32),
            }),
        )?;
    }
    let entry = ast.decl_mut(id)?;
    entry.mark_complete();
    if let DeclKind::Record(record) = &mut entry.kind {
        record.size_bits = Some(fields.len() as u64 * 32);
    }
    Ok(id)
}

pub fn forward_record(ast: &mut AstContext, parent: DeclId, name: &str) -> ExprResult<DeclId>
{
    ast.add_decl(
        parent,
        DeclName::identifier(name),
        DeclKind::Record(RecordDecl {
            tag: TagKind::Struct,
            completeness: Completeness::Forward,
            size_bits: None,
        }),
    )
}

/// Append a field to an existing record.
pub fn field(ast: &mut AstContext, record: DeclId, name: &str, ty: Type) -> ExprResult<DeclId>
{
    ast.add_decl(
        record,
        DeclName::identifier(name),
        DeclKind::Field(FieldDecl { ty, offset_bits: None }),
    )
}

pub fn variable(ast: &mut AstContext, parent: DeclId, name: &str, ty: Type) -> ExprResult<DeclId>
{
    ast.add_decl(
        parent,
        DeclName::identifier(name),
        DeclKind::Variable(VariableDecl {
            ty,
            storage: StorageClass::None,
        }),
    )
}

pub fn function(
    ast: &mut AstContext,
    parent: DeclId,
    name: &str,
    result: Type,
    params: &[(&str, Type)],
) -> ExprResult<DeclId>
{
    let signature = FunctionType::new(result, params.iter().map(|(_, ty)| ty.clone()).collect(), false);
    let id = ast.add_decl(
        parent,
        DeclName::identifier(name),
        DeclKind::Function(FunctionDecl {
            signature,
            storage: StorageClass::None,
            linkage_name: None,
        }),
    )?;
    for (param, ty) in params {
        ast.add_decl(id, DeclName::identifier(*param), DeclKind::Param { ty: ty.clone() })?;
    }
    Ok(id)
}

/// A complete interface at the root of the store.
pub fn interface(ast: &mut AstContext, name: &str) -> ExprResult<DeclId>
{
    let id = ast.add_decl(
        DeclId::TRANSLATION_UNIT,
        DeclName::identifier(name),
        DeclKind::Interface(InterfaceDecl {
            completeness: Completeness::Complete,
            superclass: None,
        }),
    )?;
    Ok(id)
}

pub fn property(ast: &mut AstContext, interface: DeclId, name: &str, ty: Type) -> ExprResult<DeclId>
{
    ast.add_decl(interface, DeclName::identifier(name), DeclKind::Property { ty })
}

/// A method declared under `parent` and implemented by `class`.
pub fn method(
    ast: &mut AstContext,
    parent: DeclId,
    class: DeclId,
    selector: &str,
    params: Vec<Type>,
) -> ExprResult<DeclId>
{
    let selector = Selector::parse(selector);
    ast.add_decl(
        parent,
        DeclName::Selector(selector.clone()),
        DeclKind::Method(MethodDecl {
            selector,
            result: Type::Builtin(ferros_expr::ast::BuiltinType::Void),
            params,
            is_instance: true,
            class_interface: Some(class),
        }),
    )
}
