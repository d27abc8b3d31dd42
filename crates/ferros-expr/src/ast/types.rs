//! Type representation shared by every declaration store.
//!
//! Types refer to declarations by [`DeclId`], which is only meaningful inside
//! the store that owns the type. Moving a type between stores therefore always
//! goes through the importer, which rewrites every reference with
//! [`Type::map_decls`].

use super::DeclId;
use crate::error::ExprResult;

/// Builtin (non-declared) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType
{
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
    /// Placeholder for values whose type the debugger cannot know.
    UnknownAny,
    /// Objective-C `id`.
    ObjCId,
    /// Objective-C `Class`.
    ObjCClass,
    /// Objective-C `SEL`.
    ObjCSel,
}

impl BuiltinType
{
    /// Spelling used in diagnostics and dumps.
    #[must_use]
    pub fn name(self) -> &'static str
    {
        match self {
            BuiltinType::Void => "void",
            BuiltinType::Bool => "bool",
            BuiltinType::Char => "char",
            BuiltinType::SignedChar => "signed char",
            BuiltinType::UnsignedChar => "unsigned char",
            BuiltinType::Short => "short",
            BuiltinType::UnsignedShort => "unsigned short",
            BuiltinType::Int => "int",
            BuiltinType::UnsignedInt => "unsigned int",
            BuiltinType::Long => "long",
            BuiltinType::UnsignedLong => "unsigned long",
            BuiltinType::LongLong => "long long",
            BuiltinType::UnsignedLongLong => "unsigned long long",
            BuiltinType::Float => "float",
            BuiltinType::Double => "double",
            BuiltinType::LongDouble => "long double",
            BuiltinType::UnknownAny => "__unknown_any",
            BuiltinType::ObjCId => "id",
            BuiltinType::ObjCClass => "Class",
            BuiltinType::ObjCSel => "SEL",
        }
    }

    /// Parse the spelling a compiler emits for a base type.
    ///
    /// Accepts the common alternative spellings (`long int`, `unsigned`,
    /// `_Bool`, ...) so base types from different producers land on the same
    /// variant.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self>
    {
        let builtin = match name.trim() {
            "void" => BuiltinType::Void,
            "bool" | "_Bool" => BuiltinType::Bool,
            "char" => BuiltinType::Char,
            "signed char" => BuiltinType::SignedChar,
            "unsigned char" => BuiltinType::UnsignedChar,
            "short" | "short int" | "signed short" => BuiltinType::Short,
            "unsigned short" | "short unsigned int" | "unsigned short int" => BuiltinType::UnsignedShort,
            "int" | "signed int" | "signed" => BuiltinType::Int,
            "unsigned int" | "unsigned" => BuiltinType::UnsignedInt,
            "long" | "long int" | "signed long" => BuiltinType::Long,
            "unsigned long" | "long unsigned int" | "unsigned long int" => BuiltinType::UnsignedLong,
            "long long" | "long long int" => BuiltinType::LongLong,
            "unsigned long long" | "long long unsigned int" => BuiltinType::UnsignedLongLong,
            "float" => BuiltinType::Float,
            "double" => BuiltinType::Double,
            "long double" => BuiltinType::LongDouble,
            "id" => BuiltinType::ObjCId,
            "Class" => BuiltinType::ObjCClass,
            "SEL" => BuiltinType::ObjCSel,
            _ => return None,
        };
        Some(builtin)
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType
{
    pub result: Box<Type>,
    pub params: Vec<Type>,
    pub variadic: bool,
}

impl FunctionType
{
    #[must_use]
    pub fn new(result: Type, params: Vec<Type>, variadic: bool) -> Self
    {
        Self {
            result: Box::new(result),
            params,
            variadic,
        }
    }

    /// `__unknown_any (...)`, used when only a symbol name is known.
    #[must_use]
    pub fn generic() -> Self
    {
        Self::new(Type::Builtin(BuiltinType::UnknownAny), Vec::new(), true)
    }
}

/// A type that may reference declarations of its owning store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type
{
    Builtin(BuiltinType),
    Pointer(Box<Type>),
    LValueReference(Box<Type>),
    Const(Box<Type>),
    Array
    {
        element: Box<Type>,
        len: Option<u64>,
    },
    /// A struct, class, union or enum declaration.
    Tag(DeclId),
    Typedef(DeclId),
    /// An Objective-C interface object type (usually behind a `Pointer`).
    Interface(DeclId),
    Function(FunctionType),
}

impl Type
{
    #[must_use]
    pub fn pointer_to(pointee: Type) -> Self
    {
        Type::Pointer(Box::new(pointee))
    }

    #[must_use]
    pub fn int() -> Self
    {
        Type::Builtin(BuiltinType::Int)
    }

    /// The function signature, if this is a function type.
    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionType>
    {
        match self {
            Type::Function(signature) => Some(signature),
            _ => None,
        }
    }

    /// Rebuild the type with every declaration reference passed through `map`.
    ///
    /// This is the only way a type crosses from one store to another. The
    /// first error from `map` aborts the rewrite.
    pub fn map_decls<F>(&self, map: &mut F) -> ExprResult<Type>
    where
        F: FnMut(DeclId) -> ExprResult<DeclId>,
    {
        Ok(match self {
            Type::Builtin(builtin) => Type::Builtin(*builtin),
            Type::Pointer(inner) => Type::Pointer(Box::new(inner.map_decls(map)?)),
            Type::LValueReference(inner) => Type::LValueReference(Box::new(inner.map_decls(map)?)),
            Type::Const(inner) => Type::Const(Box::new(inner.map_decls(map)?)),
            Type::Array { element, len } => Type::Array {
                element: Box::new(element.map_decls(map)?),
                len: *len,
            },
            Type::Tag(decl) => Type::Tag(map(*decl)?),
            Type::Typedef(decl) => Type::Typedef(map(*decl)?),
            Type::Interface(decl) => Type::Interface(map(*decl)?),
            Type::Function(signature) => Type::Function(FunctionType {
                result: Box::new(signature.result.map_decls(map)?),
                params: signature
                    .params
                    .iter()
                    .map(|param| param.map_decls(map))
                    .collect::<ExprResult<Vec<_>>>()?,
                variadic: signature.variadic,
            }),
        })
    }
}
