//! Textual dumps of declarations for logs and the CLI.

use std::fmt::Write;

use super::{AstContext, DeclId, DeclKind, Type};

/// Spell `ty` the way a C-family compiler would in a diagnostic.
#[must_use]
pub fn type_name(ast: &AstContext, ty: &Type) -> String
{
    match ty {
        Type::Builtin(builtin) => builtin.name().to_string(),
        Type::Pointer(inner) => format!("{} *", type_name(ast, inner)),
        Type::LValueReference(inner) => format!("{} &", type_name(ast, inner)),
        Type::Const(inner) => format!("const {}", type_name(ast, inner)),
        Type::Array { element, len } => match len {
            Some(len) => format!("{}[{len}]", type_name(ast, element)),
            None => format!("{}[]", type_name(ast, element)),
        },
        Type::Tag(decl) | Type::Typedef(decl) | Type::Interface(decl) => {
            let name = ast.qualified_name(*decl);
            if name.is_empty() {
                "<anonymous>".to_string()
            } else {
                name
            }
        }
        Type::Function(signature) => {
            let mut params: Vec<String> = signature.params.iter().map(|param| type_name(ast, param)).collect();
            if signature.variadic {
                params.push("...".to_string());
            }
            format!("{} ({})", type_name(ast, &signature.result), params.join(", "))
        }
    }
}

/// One-line summary of a declaration.
#[must_use]
pub fn summary(ast: &AstContext, id: DeclId) -> String
{
    let Ok(decl) = ast.decl(id) else {
        return format!("<invalid decl {}>", id.raw());
    };
    let name = &decl.name;
    match &decl.kind {
        DeclKind::TranslationUnit => "translation unit".to_string(),
        DeclKind::Namespace => format!("namespace {name}"),
        DeclKind::Record(record) => {
            let state = if record.completeness.is_complete() { "" } else { " (forward)" };
            format!("{} {name}{state}", record.tag.keyword())
        }
        DeclKind::Enum(decl) => {
            let state = if decl.completeness.is_complete() { "" } else { " (forward)" };
            format!("enum {name}{state}")
        }
        DeclKind::Enumerator { value } => format!("{name} = {value}"),
        DeclKind::Field(field) => format!("{} {name}", type_name(ast, &field.ty)),
        DeclKind::Typedef { underlying } => format!("typedef {} {name}", type_name(ast, underlying)),
        DeclKind::Function(function) => {
            let params: Vec<String> = function
                .signature
                .params
                .iter()
                .map(|param| type_name(ast, param))
                .collect();
            let variadic = if function.signature.variadic { ", ..." } else { "" };
            format!(
                "{} {name}({}{variadic})",
                type_name(ast, &function.signature.result),
                params.join(", ")
            )
        }
        DeclKind::Param { ty } => format!("{} {name}", type_name(ast, ty)),
        DeclKind::Variable(variable) => format!("{} {name}", type_name(ast, &variable.ty)),
        DeclKind::Interface(interface) => {
            let state = if interface.completeness.is_complete() { "" } else { " (forward)" };
            match interface.superclass {
                Some(superclass) => format!("@interface {name} : {}{state}", ast.qualified_name(superclass)),
                None => format!("@interface {name}{state}"),
            }
        }
        DeclKind::Property { ty } => format!("@property {} {name}", type_name(ast, ty)),
        DeclKind::Method(method) => {
            let sign = if method.is_instance { '-' } else { '+' };
            let class = method
                .class_interface
                .map(|interface| ast.qualified_name(interface))
                .unwrap_or_default();
            format!("{sign}[{class} {}] -> {}", method.selector, type_name(ast, &method.result))
        }
        DeclKind::UsingDirective { .. } => "using namespace".to_string(),
        DeclKind::Label => format!("label {name}"),
    }
}

/// Multi-line dump of a declaration and its materialised children.
#[must_use]
pub fn dump(ast: &AstContext, id: DeclId) -> String
{
    let mut out = String::new();
    dump_into(ast, id, 0, &mut out);
    out
}

fn dump_into(ast: &AstContext, id: DeclId, depth: usize, out: &mut String)
{
    let _ = writeln!(out, "{:indent$}{}", "", summary(ast, id), indent = depth * 2);
    let Ok(decl) = ast.decl(id) else {
        return;
    };
    // Function parameters are already part of the summary line.
    if matches!(decl.kind, DeclKind::Function(_)) {
        return;
    }
    for child in &decl.children {
        dump_into(ast, *child, depth + 1, out);
    }
}
