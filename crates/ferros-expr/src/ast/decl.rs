//! Declarations and declaration names.

use std::fmt;

use super::types::{FunctionType, Type};
use super::DeclId;

/// An Objective-C selector (`count`, `objectAtIndex:`, `doSomething:withValue:`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector
{
    pieces: Vec<String>,
    num_args: usize,
}

impl Selector
{
    /// Parse the textual form of a selector.
    ///
    /// A name without any colon is a zero-argument selector; otherwise every
    /// colon terminates one keyword piece (pieces may be empty, as in `set::`).
    #[must_use]
    pub fn parse(text: &str) -> Self
    {
        if !text.contains(':') {
            return Self {
                pieces: vec![text.to_string()],
                num_args: 0,
            };
        }

        let body = text.strip_suffix(':').unwrap_or(text);
        let pieces: Vec<String> = body.split(':').map(str::to_string).collect();
        let num_args = pieces.len();
        Self { pieces, num_args }
    }

    /// Number of arguments the selector takes.
    #[must_use]
    pub fn num_args(&self) -> usize
    {
        self.num_args
    }

    /// Keyword pieces, one per argument (or the single name of a zero-arg selector).
    #[must_use]
    pub fn pieces(&self) -> &[String]
    {
        &self.pieces
    }
}

impl fmt::Display for Selector
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.num_args == 0 {
            return write!(f, "{}", self.pieces.first().map_or("", String::as_str));
        }
        for piece in &self.pieces {
            write!(f, "{piece}:")?;
        }
        Ok(())
    }
}

/// The name under which a declaration is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclName
{
    /// Ordinary identifier. The translation unit uses the empty identifier.
    Identifier(String),
    Selector(Selector),
    /// `operator+`, `operator[]`, ... (holds the operator spelling).
    Operator(String),
    /// `operator"" _suffix`.
    LiteralOperator(String),
    /// The marker name under which using-directives are registered.
    UsingDirective,
    Constructor(String),
    Destructor(String),
    ConversionFunction(String),
}

impl DeclName
{
    #[must_use]
    pub fn identifier(name: impl Into<String>) -> Self
    {
        DeclName::Identifier(name.into())
    }

    #[must_use]
    pub fn selector(text: &str) -> Self
    {
        DeclName::Selector(Selector::parse(text))
    }

    /// The identifier text, if this is an identifier.
    #[must_use]
    pub fn as_identifier(&self) -> Option<&str>
    {
        match self {
            DeclName::Identifier(name) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        matches!(self, DeclName::Identifier(name) if name.is_empty())
    }
}

impl fmt::Display for DeclName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            DeclName::Identifier(name) => write!(f, "{name}"),
            DeclName::Selector(selector) => write!(f, "{selector}"),
            DeclName::Operator(op) => write!(f, "operator{op}"),
            DeclName::LiteralOperator(suffix) => write!(f, "operator\"\"{suffix}"),
            DeclName::UsingDirective => write!(f, "<using-directive>"),
            DeclName::Constructor(class) => write!(f, "{class}"),
            DeclName::Destructor(class) => write!(f, "~{class}"),
            DeclName::ConversionFunction(ty) => write!(f, "operator {ty}"),
        }
    }
}

/// Whether an aggregate is only forward-declared or fully defined.
///
/// Transitions only go `Forward -> Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Completeness
{
    #[default]
    Forward,
    Complete,
}

impl Completeness
{
    #[must_use]
    pub fn is_complete(self) -> bool
    {
        self == Completeness::Complete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind
{
    Struct,
    Class,
    Union,
}

impl TagKind
{
    #[must_use]
    pub fn keyword(self) -> &'static str
    {
        match self {
            TagKind::Struct => "struct",
            TagKind::Class => "class",
            TagKind::Union => "union",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageClass
{
    #[default]
    None,
    Static,
    Extern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecl
{
    pub tag: TagKind,
    pub completeness: Completeness,
    pub size_bits: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl
{
    pub completeness: Completeness,
    pub underlying: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl
{
    pub ty: Type,
    pub offset_bits: Option<u64>,
}

/// A function. Parameters are `Param` children of the declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl
{
    pub signature: FunctionType,
    pub storage: StorageClass,
    pub linkage_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl
{
    pub ty: Type,
    pub storage: StorageClass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl
{
    pub completeness: Completeness,
    pub superclass: Option<DeclId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl
{
    pub selector: Selector,
    pub result: Type,
    pub params: Vec<Type>,
    pub is_instance: bool,
    /// The interface the method belongs to. Usually the lexical parent, but a
    /// method implementation found through a function search can sit at
    /// translation-unit scope and still name its class here.
    pub class_interface: Option<DeclId>,
}

/// The closed set of declaration kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind
{
    TranslationUnit,
    Namespace,
    Record(RecordDecl),
    Enum(EnumDecl),
    Enumerator
    {
        value: i64
    },
    Field(FieldDecl),
    Typedef
    {
        underlying: Type
    },
    Function(FunctionDecl),
    Param
    {
        ty: Type
    },
    Variable(VariableDecl),
    Interface(InterfaceDecl),
    Property
    {
        ty: Type
    },
    Method(MethodDecl),
    UsingDirective
    {
        nominated: Option<DeclId>
    },
    Label,
}

/// Fieldless mirror of [`DeclKind`] for filters and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKindTag
{
    TranslationUnit,
    Namespace,
    Record,
    Enum,
    Enumerator,
    Field,
    Typedef,
    Function,
    Param,
    Variable,
    Interface,
    Property,
    Method,
    UsingDirective,
    Label,
}

impl DeclKind
{
    #[must_use]
    pub fn tag(&self) -> DeclKindTag
    {
        match self {
            DeclKind::TranslationUnit => DeclKindTag::TranslationUnit,
            DeclKind::Namespace => DeclKindTag::Namespace,
            DeclKind::Record(_) => DeclKindTag::Record,
            DeclKind::Enum(_) => DeclKindTag::Enum,
            DeclKind::Enumerator { .. } => DeclKindTag::Enumerator,
            DeclKind::Field(_) => DeclKindTag::Field,
            DeclKind::Typedef { .. } => DeclKindTag::Typedef,
            DeclKind::Function(_) => DeclKindTag::Function,
            DeclKind::Param { .. } => DeclKindTag::Param,
            DeclKind::Variable(_) => DeclKindTag::Variable,
            DeclKind::Interface(_) => DeclKindTag::Interface,
            DeclKind::Property { .. } => DeclKindTag::Property,
            DeclKind::Method(_) => DeclKindTag::Method,
            DeclKind::UsingDirective { .. } => DeclKindTag::UsingDirective,
            DeclKind::Label => DeclKindTag::Label,
        }
    }

    /// Completeness of records, enums and interfaces; `None` for everything else.
    #[must_use]
    pub fn completeness(&self) -> Option<Completeness>
    {
        match self {
            DeclKind::Record(record) => Some(record.completeness),
            DeclKind::Enum(decl) => Some(decl.completeness),
            DeclKind::Interface(interface) => Some(interface.completeness),
            _ => None,
        }
    }

    /// Whether declarations of this kind can own children.
    #[must_use]
    pub fn is_decl_context(&self) -> bool
    {
        matches!(
            self,
            DeclKind::TranslationUnit
                | DeclKind::Namespace
                | DeclKind::Record(_)
                | DeclKind::Enum(_)
                | DeclKind::Function(_)
                | DeclKind::Interface(_)
                | DeclKind::Method(_)
        )
    }
}

/// External-storage bits of a declaration context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExternalStorage
{
    /// Children may be supplied by the store's external source.
    pub lexical: bool,
    /// Names inside may be resolved by the store's external source.
    pub visible: bool,
    /// The lexical children have already been materialised.
    pub lexical_loaded: bool,
}

/// A named program entity owned by exactly one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl
{
    pub name: DeclName,
    pub parent: Option<DeclId>,
    pub kind: DeclKind,
    pub children: Vec<DeclId>,
    pub external: ExternalStorage,
}

impl Decl
{
    #[must_use]
    pub fn new(name: DeclName, parent: Option<DeclId>, kind: DeclKind) -> Self
    {
        Self {
            name,
            parent,
            kind,
            children: Vec::new(),
            external: ExternalStorage::default(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> DeclKindTag
    {
        self.kind.tag()
    }

    /// True for declarations that have no completeness state or are complete.
    #[must_use]
    pub fn is_complete(&self) -> bool
    {
        self.kind.completeness().is_none_or(Completeness::is_complete)
    }

    /// Move a record, enum or interface to `Complete`. Idempotent.
    pub fn mark_complete(&mut self)
    {
        match &mut self.kind {
            DeclKind::Record(record) => record.completeness = Completeness::Complete,
            DeclKind::Enum(decl) => decl.completeness = Completeness::Complete,
            DeclKind::Interface(interface) => interface.completeness = Completeness::Complete,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_selector_arity()
    {
        assert_eq!(Selector::parse("count").num_args(), 0);
        assert_eq!(Selector::parse("objectAtIndex:").num_args(), 1);

        let selector = Selector::parse("doSomething:withValue:");
        assert_eq!(selector.num_args(), 2);
        assert_eq!(selector.pieces(), ["doSomething", "withValue"]);
    }

    #[test]
    fn test_selector_display()
    {
        for text in ["count", "objectAtIndex:", "doSomething:withValue:", "set::"] {
            assert_eq!(Selector::parse(text).to_string(), text);
        }
        assert_eq!(Selector::parse("set::").pieces(), ["set", ""]);
    }

    #[test]
    fn test_mark_complete_only_moves_forward()
    {
        let mut decl = Decl::new(
            DeclName::identifier("Point"),
            Some(DeclId::TRANSLATION_UNIT),
            DeclKind::Record(RecordDecl {
                tag: TagKind::Struct,
                completeness: Completeness::Forward,
                size_bits: None,
            }),
        );
        assert!(!decl.is_complete());
        decl.mark_complete();
        decl.mark_complete();
        assert!(decl.is_complete());
    }
}
