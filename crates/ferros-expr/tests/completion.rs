//! Tests for lazy completion and lexical enumeration

mod common;

use common::{child_names, decl, enabled_source, field, forward_record, lookup_global, memory_image, record};
use ferros_expr::ast::{
    Completeness, DeclId, DeclKind, DeclKindTag, DeclName, DeclRef, ExternalAstSource, RecordDecl, Type,
};
use ferros_expr::{ExprError, Target};

fn point_fields() -> [(&'static str, Type); 2]
{
    [("x", Type::int()), ("y", Type::int())]
}

#[test]
fn test_complete_type_imports_members()
{
    let target = Target::new();
    memory_image(&target, "libgeo.so", |ast| {
        record(ast, DeclId::TRANSLATION_UNIT, "Point", &point_fields()).map(|_| ())
    });
    let source = enabled_source(&target);

    let point = lookup_global(&source, "Point")[0];
    assert!(source.complete_type(point));

    let entry = decl(&source, point);
    assert!(entry.is_complete());
    assert!(entry.external.lexical_loaded);
    assert_eq!(child_names(&source, point), ["x", "y"]);
    for child in &entry.children {
        assert_eq!(decl(&source, *child).parent, Some(point));
    }
}

#[test]
fn test_complete_type_is_idempotent()
{
    let target = Target::new();
    memory_image(&target, "libgeo.so", |ast| {
        record(ast, DeclId::TRANSLATION_UNIT, "Point", &point_fields()).map(|_| ())
    });
    let source = enabled_source(&target);

    let point = lookup_global(&source, "Point")[0];
    assert!(source.complete_type(point));
    let children = decl(&source, point).children;
    assert!(source.complete_type(point));
    assert_eq!(decl(&source, point).children, children);
}

#[test]
fn test_same_struct_in_two_images_completes_once()
{
    let target = Target::new();
    let mut points = Vec::new();
    for name in ["liba.so", "libb.so"] {
        memory_image(&target, name, |ast| {
            points.push(record(ast, DeclId::TRANSLATION_UNIT, "Point", &point_fields())?);
            Ok(())
        });
    }
    let images = target.images();
    let (first, second) = (images.image_at(0).unwrap(), images.image_at(1).unwrap());
    let (first_point, second_point) = (points[0], points[1]);
    let source = enabled_source(&target);

    let point = lookup_global(&source, "Point");
    assert_eq!(point.len(), 1);
    let point = point[0];

    // Copying the other image's Point merges into the existing declaration.
    let merged = target
        .importer()
        .copy_decl(target.store(), source.ast(), second.ast(), second_point)
        .unwrap();
    assert_eq!(merged, point);

    let origin = target.importer().resolve_origin(target.store(), source.ast(), point);
    assert_eq!(origin, Some(DeclRef::new(first.ast(), first_point)));

    assert!(source.complete_type(point));
    assert_eq!(child_names(&source, point), ["x", "y"]);
}

#[test]
fn test_self_referential_record_terminates()
{
    let target = Target::new();
    memory_image(&target, "liblist.so", |ast| {
        let node = record(ast, DeclId::TRANSLATION_UNIT, "Node", &[("value", Type::int())])?;
        field(ast, node, "next", Type::pointer_to(Type::Tag(node)))?;
        Ok(())
    });
    let source = enabled_source(&target);

    let node = lookup_global(&source, "Node")[0];
    assert!(source.complete_type(node));

    let entry = decl(&source, node);
    let next = decl(&source, entry.children[1]);
    let DeclKind::Field(next) = next.kind else {
        panic!("Expected a field");
    };
    assert_eq!(next.ty, Type::pointer_to(Type::Tag(node)));
}

#[test]
fn test_mutually_referential_records_share_copies()
{
    let target = Target::new();
    memory_image(&target, "libcycle.so", |ast| {
        let a = forward_record(ast, DeclId::TRANSLATION_UNIT, "A")?;
        let b = forward_record(ast, DeclId::TRANSLATION_UNIT, "B")?;
        field(ast, a, "b", Type::pointer_to(Type::Tag(b)))?;
        field(ast, b, "a", Type::pointer_to(Type::Tag(a)))?;
        ast.decl_mut(a)?.mark_complete();
        ast.decl_mut(b)?.mark_complete();
        Ok(())
    });
    let source = enabled_source(&target);

    let a = lookup_global(&source, "A")[0];
    assert!(source.complete_type(a));

    let field_b = decl(&source, decl(&source, a).children[0]);
    let DeclKind::Field(field_b) = field_b.kind else {
        panic!("Expected a field");
    };
    let Type::Pointer(inner) = field_b.ty else {
        panic!("Expected a pointer");
    };
    let Type::Tag(b) = *inner else {
        panic!("Expected a tag type");
    };

    assert!(source.complete_type(b));
    let field_a = decl(&source, decl(&source, b).children[0]);
    let DeclKind::Field(field_a) = field_a.kind else {
        panic!("Expected a field");
    };
    assert_eq!(field_a.ty, Type::pointer_to(Type::Tag(a)));

    let bs = target
        .store()
        .with(source.ast(), |ast| ast.lookup_local(DeclId::TRANSLATION_UNIT, &DeclName::identifier("B")))
        .unwrap();
    assert_eq!(bs, [b]);
}

#[test]
fn test_failed_member_import_leaves_shell_untouched()
{
    let target = Target::new();
    memory_image(&target, "libbroken.so", |ast| {
        let broken = record(ast, DeclId::TRANSLATION_UNIT, "Broken", &[("x", Type::int())])?;
        // Names a declaration the image never had.
        field(ast, broken, "dangling", Type::Tag(DeclId::from_raw(9999)))?;
        Ok(())
    });
    let source = enabled_source(&target);
    let broken = lookup_global(&source, "Broken")[0];

    let err = target
        .importer()
        .complete_tag_decl(target.store(), source.ast(), broken)
        .unwrap_err();
    assert!(matches!(err, ExprError::UnknownDecl { .. }));
    assert!(!err.is_recoverable());
    assert!(decl(&source, broken).children.is_empty());
    assert!(!decl(&source, broken).is_complete());

    // A retry fails the same way instead of reusing a half-built member.
    assert!(!source.complete_type(broken));
    let entry = decl(&source, broken);
    assert!(matches!(
        entry.kind,
        DeclKind::Record(RecordDecl {
            completeness: Completeness::Forward,
            ..
        })
    ));
    assert!(entry.children.is_empty());
}

#[test]
fn test_unsupported_members_are_skipped()
{
    let target = Target::new();
    let mut label = DeclId::TRANSLATION_UNIT;
    let (image, _) = memory_image(&target, "libgoto.so", |ast| {
        let state = record(ast, DeclId::TRANSLATION_UNIT, "State", &[("x", Type::int())])?;
        label = ast.add_decl(state, DeclName::identifier("retry"), DeclKind::Label)?;
        field(ast, state, "y", Type::int())?;
        Ok(())
    });
    let source = enabled_source(&target);

    let state = lookup_global(&source, "State")[0];
    assert!(source.complete_type(state));
    assert_eq!(child_names(&source, state), ["x", "y"]);

    let err = target
        .importer()
        .copy_decl(target.store(), source.ast(), image.ast(), label)
        .unwrap_err();
    assert!(matches!(
        err,
        ExprError::ImportFailure {
            kind: DeclKindTag::Label,
            ..
        }
    ));
    assert!(err.is_recoverable());
}

#[test]
fn test_complete_type_of_non_aggregate_is_false()
{
    let target = Target::new();
    memory_image(&target, "libgeo.so", |ast| {
        common::variable(ast, DeclId::TRANSLATION_UNIT, "counter", Type::int()).map(|_| ())
    });
    let source = enabled_source(&target);

    let counter = lookup_global(&source, "counter")[0];
    assert!(!source.complete_type(counter));
    assert!(!source.complete_type(DeclId::from_raw(4242)));
}

/// Number of fields `Blob` ends up with when completed against images
/// defining it with the given field counts, in that order.
fn fallback_fields(counts: &[usize]) -> usize
{
    let target = Target::new();
    for (index, count) in counts.iter().enumerate() {
        let fields: Vec<(String, Type)> = (0..*count).map(|n| (format!("f{n}"), Type::int())).collect();
        memory_image(&target, &format!("lib{index}.so"), |ast| {
            let fields: Vec<(&str, Type)> = fields.iter().map(|(name, ty)| (name.as_str(), ty.clone())).collect();
            record(ast, DeclId::TRANSLATION_UNIT, "Blob", &fields).map(|_| ())
        });
    }
    let source = enabled_source(&target);

    // Declared by the expression itself, so there is no origin to follow.
    let blob = target
        .store()
        .try_with_mut(source.ast(), |ast| forward_record(ast, DeclId::TRANSLATION_UNIT, "Blob"))
        .unwrap();
    assert!(source.complete_type(blob));
    decl(&source, blob).children.len()
}

#[test]
fn test_fallback_completion_is_deterministic()
{
    assert_eq!(fallback_fields(&[1, 3]), 1);
    assert_eq!(fallback_fields(&[1, 3]), 1);
    assert_eq!(fallback_fields(&[3, 1]), 3);
}

#[test]
fn test_fallback_skips_candidates_that_cannot_complete()
{
    let target = Target::new();
    memory_image(&target, "libfwd.so", |ast| {
        forward_record(ast, DeclId::TRANSLATION_UNIT, "Opaque").map(|_| ())
    });
    memory_image(&target, "libdef.so", |ast| {
        record(ast, DeclId::TRANSLATION_UNIT, "Opaque", &[("handle", Type::int())]).map(|_| ())
    });
    let source = enabled_source(&target);

    let opaque = target
        .store()
        .try_with_mut(source.ast(), |ast| forward_record(ast, DeclId::TRANSLATION_UNIT, "Opaque"))
        .unwrap();
    assert!(source.complete_type(opaque));
    assert_eq!(child_names(&source, opaque), ["handle"]);

    let origin = target
        .importer()
        .resolve_origin(target.store(), source.ast(), opaque)
        .unwrap();
    assert_eq!(origin.ast, target.images().image_at(1).unwrap().ast());
}

#[test]
fn test_lexical_enumeration_imports_children()
{
    let target = Target::new();
    memory_image(&target, "libgeo.so", |ast| {
        record(ast, DeclId::TRANSLATION_UNIT, "Point", &point_fields()).map(|_| ())
    });
    let source = enabled_source(&target);

    let point = lookup_global(&source, "Point")[0];
    let children = source.find_external_lexical_decls(point, None).unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(child_names(&source, point), ["x", "y"]);
    assert!(decl(&source, point).external.lexical_loaded);

    // A second enumeration yields the same copies.
    assert_eq!(source.find_external_lexical_decls(point, None).unwrap(), children);
}

#[test]
fn test_filtered_lexical_enumeration()
{
    let target = Target::new();
    memory_image(&target, "libgeo.so", |ast| {
        let point = record(ast, DeclId::TRANSLATION_UNIT, "Point", &point_fields())?;
        ast.add_decl(
            point,
            DeclName::identifier("coord"),
            DeclKind::Typedef {
                underlying: Type::int(),
            },
        )?;
        Ok(())
    });
    let source = enabled_source(&target);

    let point = lookup_global(&source, "Point")[0];
    let only_fields = |tag: DeclKindTag| tag == DeclKindTag::Field;
    let children = source.find_external_lexical_decls(point, Some(&only_fields)).unwrap();
    assert_eq!(children.len(), 2);
    assert!(!decl(&source, point).external.lexical_loaded);

    let all = source.find_external_lexical_decls(point, None).unwrap();
    assert_eq!(all.len(), 3);
    assert!(decl(&source, point).external.lexical_loaded);
}

#[test]
fn test_lexical_enumeration_completes_fields_held_by_value()
{
    let target = Target::new();
    memory_image(&target, "libgeo.so", |ast| {
        let point = record(ast, DeclId::TRANSLATION_UNIT, "Point", &point_fields())?;
        record(
            ast,
            DeclId::TRANSLATION_UNIT,
            "Line",
            &[("start", Type::Tag(point)), ("end", Type::Tag(point))],
        )?;
        Ok(())
    });
    let source = enabled_source(&target);

    let line = lookup_global(&source, "Line")[0];
    let fields = source.find_external_lexical_decls(line, None).unwrap();
    let DeclKind::Field(start) = decl(&source, fields[0]).kind else {
        panic!("Expected a field");
    };
    let Type::Tag(point) = start.ty else {
        panic!("Expected a tag type");
    };
    assert!(decl(&source, point).is_complete());
    assert_eq!(child_names(&source, point), ["x", "y"]);
}

#[test]
fn test_lexical_enumeration_without_origin_fails()
{
    let target = Target::new();
    memory_image(&target, "libgeo.so", |_| Ok(()));
    let source = enabled_source(&target);

    let local = target
        .store()
        .try_with_mut(source.ast(), |ast| forward_record(ast, DeclId::TRANSLATION_UNIT, "Local"))
        .unwrap();
    let err = source.find_external_lexical_decls(local, None).unwrap_err();
    assert!(matches!(err, ExprError::ResolutionFailure { decl, .. } if decl == local));
}
