//! Tests for store teardown and the scratch store

mod common;

use common::{decl, enabled_source, lookup_global, memory_image, record};
use ferros_expr::ast::{DeclId, DeclRef, ExternalAstSource, Type};
use ferros_expr::{ExprError, Target};

fn geo_target() -> (std::rc::Rc<Target>, DeclRef)
{
    let target = Target::new();
    let mut point = DeclId::TRANSLATION_UNIT;
    let (image, _) = memory_image(&target, "libgeo.so", |ast| {
        point = record(ast, DeclId::TRANSLATION_UNIT, "Point", &[("x", Type::int()), ("y", Type::int())])?;
        Ok(())
    });
    let point = DeclRef::new(image.ast(), point);
    (target, point)
}

#[test]
fn test_dropping_source_destroys_its_store()
{
    let (target, _) = geo_target();
    let source = enabled_source(&target);
    let ast = source.ast();
    assert_eq!(lookup_global(&source, "Point").len(), 1);
    assert!(target.importer().copy_count(ast) > 0);

    drop(source);
    assert!(!target.store().is_live(ast));
    assert_eq!(target.importer().copy_count(ast), 0);
    assert!(matches!(
        target.store().with(ast, |_| ()),
        Err(ExprError::UnknownContext(id)) if id == ast
    ));
}

#[test]
fn test_store_ids_are_not_reused()
{
    let (target, _) = geo_target();
    let first = enabled_source(&target);
    let first_ast = first.ast();
    drop(first);

    let second = enabled_source(&target);
    assert_ne!(second.ast(), first_ast);
}

#[test]
fn test_removed_image_leaves_copies_incomplete()
{
    let (target, origin) = geo_target();
    let source = enabled_source(&target);
    let point = lookup_global(&source, "Point")[0];

    let image = target.images().image_at(0).unwrap();
    assert!(target.remove_image(image.id()));
    assert!(!target.store().is_live(origin.ast));
    assert!(!target.remove_image(image.id()));

    assert_eq!(target.importer().resolve_origin(target.store(), source.ast(), point), None);
    assert!(!source.complete_type(point));
    assert!(!decl(&source, point).is_complete());
    assert!(matches!(
        source.find_external_lexical_decls(point, None),
        Err(ExprError::ResolutionFailure { .. })
    ));
}

#[test]
fn test_copy_to_scratch_points_at_image()
{
    let (target, origin) = geo_target();
    let source = enabled_source(&target);
    let point = lookup_global(&source, "Point")[0];
    assert!(source.complete_type(point));

    let persistent = source.copy_to_scratch(point).unwrap();
    let scratch = target.scratch();
    assert_eq!(
        target.importer().resolve_origin(target.store(), scratch, persistent),
        Some(origin)
    );

    let ast = source.ast();
    drop(source);

    // The scratch copy survives; only its link to the expression store is gone.
    assert!(target.store().decl(DeclRef::new(scratch, persistent)).is_ok());
    assert_eq!(target.importer().copied(scratch, DeclRef::new(ast, point)), None);
    assert_eq!(
        target.importer().resolve_origin(target.store(), scratch, persistent),
        Some(origin)
    );
}
