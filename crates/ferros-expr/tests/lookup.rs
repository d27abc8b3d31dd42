//! Tests for visible-name lookups through the expression source

mod common;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use common::{decl, enabled_source, function, lookup_global, memory_image, record, variable};
use ferros_expr::ast::{
    AstHandle, DeclId, DeclKind, DeclName, DeclRef, ExternalAstSource, FunctionType, StorageClass, Type,
};
use ferros_expr::images::{DebugInfoProvider, FunctionMatch, FunctionNameKind};
use ferros_expr::{ExprResult, ExternalDeclSource, SourceConfig, Target};

fn point_image(target: &Rc<Target>) -> DeclId
{
    let mut point = DeclId::TRANSLATION_UNIT;
    memory_image(target, "libgeo.so", |ast| {
        point = record(ast, DeclId::TRANSLATION_UNIT, "Point", &[("x", Type::int()), ("y", Type::int())])?;
        variable(ast, DeclId::TRANSLATION_UNIT, "counter", Type::int())?;
        Ok(())
    });
    point
}

#[test]
fn test_lookup_finds_global_type()
{
    let target = Target::new();
    point_image(&target);
    let source = enabled_source(&target);

    let found = lookup_global(&source, "Point");
    assert_eq!(found.len(), 1);

    let point = decl(&source, found[0]);
    assert!(matches!(point.kind, DeclKind::Record(_)));
    assert!(!point.is_complete());
    assert!(point.external.lexical);
    assert_eq!(point.parent, Some(DeclId::TRANSLATION_UNIT));
}

#[test]
fn test_lookup_returns_memoised_copy()
{
    let target = Target::new();
    point_image(&target);
    let source = enabled_source(&target);

    let first = lookup_global(&source, "Point");
    let copies = target.importer().copy_count(source.ast());
    let second = lookup_global(&source, "Point");
    assert_eq!(first, second);
    assert_eq!(target.importer().copy_count(source.ast()), copies);
}

#[test]
fn test_lookup_records_result_in_store()
{
    let target = Target::new();
    point_image(&target);
    let source = enabled_source(&target);

    let found = lookup_global(&source, "Point");
    let recorded = target
        .store()
        .with(source.ast(), |ast| {
            ast.external_visible_decls(DeclId::TRANSLATION_UNIT, &DeclName::identifier("Point"))
                .map(<[DeclId]>::to_vec)
        })
        .unwrap();
    assert_eq!(recorded, Some(found));
}

#[test]
fn test_global_variable_lookup()
{
    let target = Target::new();
    point_image(&target);
    let source = enabled_source(&target);

    let found = lookup_global(&source, "counter");
    assert_eq!(found.len(), 1);

    let counter = decl(&source, found[0]);
    match &counter.kind {
        DeclKind::Variable(variable) => {
            assert_eq!(variable.ty, Type::int());
            assert_eq!(variable.storage, StorageClass::Extern);
        }
        other => panic!("Expected a variable, got {other:?}"),
    }

    let image = target.images().image_at(0).unwrap();
    let origin = target
        .importer()
        .resolve_origin(target.store(), source.ast(), found[0])
        .unwrap();
    assert_eq!(origin.ast, image.ast());
}

#[test]
fn test_function_lookup_copies_prototype()
{
    let target = Target::new();
    memory_image(&target, "libmath.so", |ast| {
        function(
            ast,
            DeclId::TRANSLATION_UNIT,
            "add",
            Type::int(),
            &[("a", Type::int()), ("b", Type::int())],
        )?;
        Ok(())
    });
    let source = enabled_source(&target);

    let found = lookup_global(&source, "add");
    assert_eq!(found.len(), 1);

    let add = decl(&source, found[0]);
    let DeclKind::Function(function) = &add.kind else {
        panic!("Expected a function, got {:?}", add.kind);
    };
    assert_eq!(*function.signature.result, Type::int());
    assert_eq!(function.signature.params, vec![Type::int(), Type::int()]);
    assert_eq!(common::child_names(&source, found[0]), ["a", "b"]);
}

#[test]
fn test_symbol_without_debug_info_gets_generic_prototype()
{
    let target = Target::new();
    let (_, provider) = memory_image(&target, "libc.so", |_| Ok(()));
    provider.add_symbol("puts");
    let source = enabled_source(&target);

    let found = lookup_global(&source, "puts");
    assert_eq!(found.len(), 1);
    let DeclKind::Function(function) = decl(&source, found[0]).kind else {
        panic!("Expected a function");
    };
    assert_eq!(function.signature, FunctionType::generic());
}

#[test]
fn test_variable_hides_function_of_same_name()
{
    let target = Target::new();
    memory_image(&target, "libstate.so", |ast| {
        variable(ast, DeclId::TRANSLATION_UNIT, "state", Type::int())?;
        function(ast, DeclId::TRANSLATION_UNIT, "state", Type::int(), &[])?;
        Ok(())
    });
    let source = enabled_source(&target);

    let found = lookup_global(&source, "state");
    assert_eq!(found.len(), 1);
    assert!(matches!(decl(&source, found[0]).kind, DeclKind::Variable(_)));
}

#[test]
fn test_variables_from_every_image()
{
    let target = Target::new();
    memory_image(&target, "liba.so", |ast| {
        variable(ast, DeclId::TRANSLATION_UNIT, "shared", Type::int())
            .map(|_| ())
    });
    memory_image(&target, "libb.so", |ast| {
        variable(ast, DeclId::TRANSLATION_UNIT, "shared", Type::int())
            .map(|_| ())
    });
    let source = enabled_source(&target);

    assert_eq!(lookup_global(&source, "shared").len(), 2);
}

#[test]
fn test_lookups_disabled_until_sigil_name()
{
    let target = Target::new();
    point_image(&target);
    let source = target.create_expression_source(SourceConfig::default()).unwrap();
    assert!(!source.lookups_enabled());

    assert!(lookup_global(&source, "counter").is_empty());
    assert!(!source.lookups_enabled());

    // Sigil names are never found in debug info, but they open the gate.
    assert!(lookup_global(&source, "$my_var").is_empty());
    assert!(source.lookups_enabled());

    assert_eq!(lookup_global(&source, "counter").len(), 1);
    assert!(lookup_global(&source, "$another").is_empty());
    assert!(source.lookups_enabled());
}

#[test]
fn test_builtin_names_are_not_searched()
{
    let target = Target::new();
    let (_, provider) = memory_image(&target, "libc.so", |_| Ok(()));
    provider.add_symbol("__builtin_expect");
    let source = enabled_source(&target);

    let name = DeclName::identifier("__builtin_expect");
    assert!(source
        .find_external_visible_decls_by_name(DeclId::TRANSLATION_UNIT, &name)
        .is_empty());
    let recorded = target
        .store()
        .with(source.ast(), |ast| {
            ast.external_visible_decls(DeclId::TRANSLATION_UNIT, &name)
                .map(<[DeclId]>::len)
        })
        .unwrap();
    assert_eq!(recorded, Some(0));
}

#[test]
fn test_special_names_are_not_searched()
{
    let target = Target::new();
    point_image(&target);
    let source = enabled_source(&target);

    for name in [
        DeclName::Operator("+".to_string()),
        DeclName::LiteralOperator("_km".to_string()),
        DeclName::UsingDirective,
        DeclName::Constructor("Point".to_string()),
        DeclName::Destructor("Point".to_string()),
        DeclName::identifier(""),
    ] {
        assert!(source
            .find_external_visible_decls_by_name(DeclId::TRANSLATION_UNIT, &name)
            .is_empty());
    }
}

#[test]
fn test_lookup_without_images_finds_nothing()
{
    let target = Target::new();
    let source = enabled_source(&target);
    assert!(lookup_global(&source, "Point").is_empty());
}

#[test]
fn test_unknown_context_finds_nothing()
{
    let target = Target::new();
    point_image(&target);
    let source = enabled_source(&target);
    assert!(common::lookup(&source, DeclId::from_raw(999), "Point").is_empty());
}

/// Provider that looks the requested name up again from inside the search.
#[derive(Default)]
struct ReentrantProvider
{
    source: RefCell<Weak<ExternalDeclSource>>,
    observed: RefCell<Vec<(bool, usize)>>,
}

impl DebugInfoProvider for ReentrantProvider
{
    fn find_types(&self, _ast: AstHandle<'_>, name: &str, _parent: Option<DeclId>, _max: usize) -> ExprResult<Vec<Type>>
    {
        let source = self.source.borrow().upgrade();
        if let Some(source) = source {
            let active = source.is_lookup_active(name);
            let nested = lookup_global(&source, name).len();
            self.observed.borrow_mut().push((active, nested));
        }
        Ok(Vec::new())
    }

    fn find_functions(
        &self,
        _ast: AstHandle<'_>,
        _name: &str,
        _kind: FunctionNameKind,
        _max: usize,
    ) -> ExprResult<Vec<FunctionMatch>>
    {
        Ok(Vec::new())
    }

    fn find_namespace(&self, _ast: AstHandle<'_>, _name: &str, _parent: Option<DeclId>) -> ExprResult<Option<DeclId>>
    {
        Ok(None)
    }

    fn find_global_variables(&self, _ast: AstHandle<'_>, _name: &str, _max: usize) -> ExprResult<Vec<DeclId>>
    {
        Ok(Vec::new())
    }
}

#[test]
fn test_reentrant_lookup_of_active_name_finds_nothing()
{
    let target = Target::new();
    let provider = Rc::new(ReentrantProvider::default());
    target.add_image("libloop.so", provider.clone());
    let source = enabled_source(&target);
    *provider.source.borrow_mut() = Rc::downgrade(&source);

    assert!(lookup_global(&source, "Loop").is_empty());
    assert_eq!(*provider.observed.borrow(), [(true, 0)]);
    assert_eq!(source.active_lookup_count(), 0);
    assert!(!source.is_lookup_active("Loop"));
}

#[test]
fn test_sources_have_separate_stores()
{
    let target = Target::new();
    point_image(&target);
    let first = enabled_source(&target);
    let second = enabled_source(&target);

    let a = lookup_global(&first, "Point");
    let b = lookup_global(&second, "Point");
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_ne!(first.ast(), second.ast());

    let origin_a = target.importer().resolve_origin(target.store(), first.ast(), a[0]);
    let origin_b = target.importer().resolve_origin(target.store(), second.ast(), b[0]);
    assert_eq!(origin_a, origin_b);
    assert!(origin_a.is_some_and(|origin: DeclRef| origin.decl != DeclId::TRANSLATION_UNIT));
}
