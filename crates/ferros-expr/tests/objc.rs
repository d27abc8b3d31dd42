//! Tests for Objective-C method and property lookups

mod common;

use common::{decl, enabled_source, interface, lookup, lookup_global, memory_image, method, property};
use ferros_expr::ast::{DeclId, DeclKind, DeclName, ExternalAstSource, Type};
use ferros_expr::Target;

fn lookup_selector(source: &ferros_expr::ExternalDeclSource, ctx: DeclId, selector: &str) -> Vec<DeclId>
{
    source.find_external_visible_decls_by_name(ctx, &DeclName::selector(selector))
}

#[test]
fn test_method_declared_on_interface()
{
    let target = Target::new();
    memory_image(&target, "Widgets", |ast| {
        let widget = interface(ast, "Widget")?;
        method(ast, widget, widget, "count", Vec::new())?;
        Ok(())
    });
    let source = enabled_source(&target);

    let widget = lookup_global(&source, "Widget");
    assert_eq!(widget.len(), 1);
    let widget = widget[0];
    assert!(matches!(decl(&source, widget).kind, DeclKind::Interface(_)));

    let found = lookup_selector(&source, widget, "count");
    assert_eq!(found.len(), 1);
    let count = decl(&source, found[0]);
    assert_eq!(count.parent, Some(widget));
    let DeclKind::Method(count) = count.kind else {
        panic!("Expected a method");
    };
    assert_eq!(count.class_interface, Some(widget));
}

#[test]
fn test_method_found_through_function_search()
{
    let target = Target::new();
    memory_image(&target, "Widgets", |ast| {
        let widget = interface(ast, "Widget")?;
        property(ast, widget, "title", Type::int())?;
        // Implemented, but not declared in the interface.
        method(
            ast,
            DeclId::TRANSLATION_UNIT,
            widget,
            "doSomething:withValue:",
            vec![Type::int(), Type::int()],
        )?;
        let other = interface(ast, "Gadget")?;
        method(ast, DeclId::TRANSLATION_UNIT, other, "doSomething:withValue:", vec![Type::int(), Type::int()])?;
        Ok(())
    });
    let source = enabled_source(&target);

    let widget = lookup_global(&source, "Widget")[0];
    let found = lookup_selector(&source, widget, "doSomething:withValue:");
    assert_eq!(found.len(), 1);

    let entry = decl(&source, found[0]);
    assert_eq!(entry.parent, Some(widget));
    assert_ne!(entry.parent, Some(DeclId::TRANSLATION_UNIT));
    let DeclKind::Method(method) = entry.kind else {
        panic!("Expected a method");
    };
    assert_eq!(method.class_interface, Some(widget));
    assert_eq!(method.selector.num_args(), 2);
    assert_eq!(method.params, [Type::int(), Type::int()]);
}

#[test]
fn test_selector_outside_interface_finds_nothing()
{
    let target = Target::new();
    memory_image(&target, "Widgets", |ast| {
        let widget = interface(ast, "Widget")?;
        method(ast, widget, widget, "count", Vec::new())?;
        Ok(())
    });
    let source = enabled_source(&target);

    assert!(lookup_selector(&source, DeclId::TRANSLATION_UNIT, "count").is_empty());
}

#[test]
fn test_property_lookup()
{
    let target = Target::new();
    memory_image(&target, "Widgets", |ast| {
        let widget = interface(ast, "Widget")?;
        property(ast, widget, "title", Type::pointer_to(Type::int()))?;
        Ok(())
    });
    let source = enabled_source(&target);

    let widget = lookup_global(&source, "Widget")[0];
    let found = lookup(&source, widget, "title");
    assert_eq!(found.len(), 1);

    let title = decl(&source, found[0]);
    assert_eq!(title.parent, Some(widget));
    assert_eq!(title.kind, DeclKind::Property { ty: Type::pointer_to(Type::int()) });

    assert!(lookup(&source, widget, "missing").is_empty());
}

#[test]
fn test_interface_map_lists_every_image()
{
    let target = Target::new();
    for name in ["Widgets", "WidgetExtras"] {
        memory_image(&target, name, |ast| interface(ast, "Widget").map(|_| ()));
    }
    let source = enabled_source(&target);

    let widget = lookup_global(&source, "Widget")[0];
    let map = target.importer().interface_map(source.ast(), widget).unwrap();
    let images: Vec<&str> = map.iter().map(|entry| entry.image.name()).collect();
    assert_eq!(images, ["Widgets", "WidgetExtras"]);
}

#[test]
fn test_interface_completion()
{
    let target = Target::new();
    memory_image(&target, "Widgets", |ast| {
        let widget = interface(ast, "Widget")?;
        property(ast, widget, "title", Type::int())?;
        method(ast, widget, widget, "count", Vec::new())?;
        Ok(())
    });
    let source = enabled_source(&target);

    let widget = lookup_global(&source, "Widget")[0];
    assert!(!decl(&source, widget).is_complete());
    assert!(source.complete_type(widget));
    assert_eq!(common::child_names(&source, widget), ["title", "count"]);
}
