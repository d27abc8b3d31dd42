//! Materialise DIEs as declarations of the image store.

use std::cell::RefCell;
use std::collections::HashMap;

use gimli::constants;
use tracing::trace;

use super::index::{DieIndex, FunctionEntry, VariableEntry};
use super::{DieRef, DwarfData, MAX_TYPE_REF_DEPTH};
use crate::ast::{
    AstHandle, BuiltinType, Completeness, DeclId, DeclKind, DeclName, EnumDecl, FieldDecl, FunctionDecl, FunctionType,
    RecordDecl, StorageClass, TagKind, Type, VariableDecl,
};
use crate::error::ExprResult;

/// What has been materialised so far.
#[derive(Debug, Default)]
pub(crate) struct Materialised
{
    decls: HashMap<DieRef, DeclId>,
    namespaces: HashMap<Vec<String>, DeclId>,
    paths: HashMap<DeclId, Vec<String>>,
    // Record or enum declaration -> defining DIE.
    definitions: HashMap<DeclId, DieRef>,
}

pub(crate) struct Converter<'a>
{
    data: &'a DwarfData,
    index: &'a DieIndex,
    state: &'a RefCell<Materialised>,
    ast: AstHandle<'a>,
}

impl<'a> Converter<'a>
{
    pub(crate) fn new(
        data: &'a DwarfData,
        index: &'a DieIndex,
        state: &'a RefCell<Materialised>,
        ast: AstHandle<'a>,
    ) -> Self
    {
        Self {
            data,
            index,
            state,
            ast,
        }
    }

    fn memo(&self, die: DieRef) -> Option<DeclId>
    {
        self.state.borrow().decls.get(&die).copied()
    }

    fn remember(&self, die: DieRef, decl: DeclId)
    {
        self.state.borrow_mut().decls.insert(die, decl);
    }

    /// Namespace path of a namespace declaration; `None` for declarations
    /// this provider did not create.
    pub(crate) fn namespace_path(&self, parent: Option<DeclId>) -> Option<Vec<String>>
    {
        match parent {
            None | Some(DeclId::TRANSLATION_UNIT) => Some(Vec::new()),
            Some(decl) => self.state.borrow().paths.get(&decl).cloned(),
        }
    }

    /// The namespace declaration for `path`, creating the chain as needed.
    pub(crate) fn namespace(&self, path: &[String]) -> ExprResult<DeclId>
    {
        let Some((name, outer)) = path.split_last() else {
            return Ok(DeclId::TRANSLATION_UNIT);
        };
        if let Some(decl) = self.state.borrow().namespaces.get(path) {
            return Ok(*decl);
        }

        let parent = self.namespace(outer)?;
        let decl = self
            .ast
            .try_with_mut(|ast| ast.add_decl(parent, DeclName::identifier(name.as_str()), DeclKind::Namespace))?;
        let mut state = self.state.borrow_mut();
        state.namespaces.insert(path.to_vec(), decl);
        state.paths.insert(decl, path.to_vec());
        Ok(decl)
    }

    pub(crate) fn named_type(&self, die: DieRef) -> ExprResult<Type>
    {
        self.resolve_type(die, 0)
    }

    fn inner_type(&self, die: Option<DieRef>, depth: usize) -> ExprResult<Type>
    {
        match die {
            Some(die) => self.resolve_type(die, depth + 1),
            None => Ok(Type::Builtin(BuiltinType::Void)),
        }
    }

    fn resolve_type(&self, die: DieRef, depth: usize) -> ExprResult<Type>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Ok(Type::Builtin(BuiltinType::UnknownAny));
        }

        let (unit, entry) = self.data.entry(die)?;
        let inner = self.data.type_ref(die.unit, &entry)?;
        let ty = match entry.tag() {
            constants::DW_TAG_base_type => {
                let name = self.data.name(unit, &entry)?;
                Type::Builtin(
                    name.as_deref()
                        .and_then(BuiltinType::from_name)
                        .unwrap_or(BuiltinType::UnknownAny),
                )
            }
            constants::DW_TAG_pointer_type => Type::pointer_to(self.inner_type(inner, depth)?),
            constants::DW_TAG_reference_type | constants::DW_TAG_rvalue_reference_type => {
                Type::LValueReference(Box::new(self.inner_type(inner, depth)?))
            }
            constants::DW_TAG_const_type => Type::Const(Box::new(self.inner_type(inner, depth)?)),
            constants::DW_TAG_volatile_type | constants::DW_TAG_restrict_type | constants::DW_TAG_atomic_type => {
                self.inner_type(inner, depth)?
            }
            constants::DW_TAG_array_type => Type::Array {
                element: Box::new(self.inner_type(inner, depth)?),
                len: self.array_len(die)?,
            },
            constants::DW_TAG_subroutine_type => {
                let (params, variadic) = self.parameters(die, depth)?;
                Type::Function(FunctionType::new(
                    self.inner_type(inner, depth)?,
                    params.into_iter().map(|(_, ty)| ty).collect(),
                    variadic,
                ))
            }
            constants::DW_TAG_structure_type
            | constants::DW_TAG_class_type
            | constants::DW_TAG_union_type
            | constants::DW_TAG_enumeration_type => Type::Tag(self.tag_decl(die)?),
            constants::DW_TAG_typedef => Type::Typedef(self.typedef_decl(die, depth)?),
            _ => Type::Builtin(BuiltinType::UnknownAny),
        };
        Ok(ty)
    }

    fn array_len(&self, die: DieRef) -> ExprResult<Option<u64>>
    {
        for child in self.data.children(die)? {
            let (_, entry) = self.data.entry(child)?;
            if entry.tag() != constants::DW_TAG_subrange_type {
                continue;
            }
            if let Some(count) = DwarfData::udata(&entry, constants::DW_AT_count)? {
                return Ok(Some(count));
            }
            // GCC spells `T x[0]` as an upper bound of -1.
            return Ok(DwarfData::udata(&entry, constants::DW_AT_upper_bound)?
                .map(|upper| upper.checked_add(1).unwrap_or(0)));
        }
        Ok(None)
    }

    /// Named parameters of a subprogram or subroutine type, and whether it is variadic.
    fn parameters(&self, die: DieRef, depth: usize) -> ExprResult<(Vec<(String, Type)>, bool)>
    {
        let mut params = Vec::new();
        let mut variadic = false;
        for child in self.data.children(die)? {
            let (unit, entry) = self.data.entry(child)?;
            match entry.tag() {
                constants::DW_TAG_formal_parameter => {
                    let name = self.data.name(unit, &entry)?.unwrap_or_default();
                    let ty = self.inner_type(self.data.type_ref(child.unit, &entry)?, depth)?;
                    params.push((name, ty));
                }
                constants::DW_TAG_unspecified_parameters => variadic = true,
                _ => {}
            }
        }
        Ok((params, variadic))
    }

    /// Declarations and definitions of the same type share one declaration.
    fn canonical_tag(&self, die: DieRef) -> ExprResult<DieRef>
    {
        let (unit, entry) = self.data.entry(die)?;
        if !DwarfData::flag(&entry, constants::DW_AT_declaration)? {
            return Ok(die);
        }
        let Some(name) = self.data.name(unit, &entry)? else {
            return Ok(die);
        };
        Ok(self.index.definition(&self.index.scope_of(die), &name).unwrap_or(die))
    }

    fn tag_decl(&self, die: DieRef) -> ExprResult<DeclId>
    {
        if let Some(decl) = self.memo(die) {
            return Ok(decl);
        }
        let canonical = self.canonical_tag(die)?;
        if let Some(decl) = self.memo(canonical) {
            self.remember(die, decl);
            return Ok(decl);
        }

        let (unit, entry) = self.data.entry(canonical)?;
        let name = self.data.name(unit, &entry)?.unwrap_or_default();
        let declaration = DwarfData::flag(&entry, constants::DW_AT_declaration)?;
        let size_bits = DwarfData::size_bits(&entry)?;
        let kind = match entry.tag() {
            constants::DW_TAG_enumeration_type => {
                let underlying = match self.data.type_ref(canonical.unit, &entry)? {
                    Some(underlying) => Some(self.resolve_type(underlying, 1)?),
                    None => None,
                };
                DeclKind::Enum(EnumDecl {
                    completeness: Completeness::Forward,
                    underlying,
                })
            }
            tag => DeclKind::Record(RecordDecl {
                tag: match tag {
                    constants::DW_TAG_class_type => TagKind::Class,
                    constants::DW_TAG_union_type => TagKind::Union,
                    _ => TagKind::Struct,
                },
                completeness: Completeness::Forward,
                size_bits,
            }),
        };

        let parent = self.namespace(&self.index.scope_of(canonical))?;
        let decl = self.ast.try_with_mut(|ast| {
            let decl = ast.add_decl(parent, DeclName::identifier(name.as_str()), kind)?;
            ast.decl_mut(decl)?.external.lexical = !declaration;
            Ok(decl)
        })?;

        self.remember(canonical, decl);
        self.remember(die, decl);
        if !declaration {
            self.state.borrow_mut().definitions.insert(decl, canonical);
        }
        trace!(name = %name, decl = decl.raw(), declaration, "materialised tag");
        Ok(decl)
    }

    fn typedef_decl(&self, die: DieRef, depth: usize) -> ExprResult<DeclId>
    {
        if let Some(decl) = self.memo(die) {
            return Ok(decl);
        }

        let (unit, entry) = self.data.entry(die)?;
        let name = self.data.name(unit, &entry)?.unwrap_or_default();
        let target = self.data.type_ref(die.unit, &entry)?;
        let parent = self.namespace(&self.index.scope_of(die))?;

        let decl = self.ast.try_with_mut(|ast| {
            ast.add_decl(
                parent,
                DeclName::identifier(name),
                DeclKind::Typedef {
                    underlying: Type::Builtin(BuiltinType::Void),
                },
            )
        })?;
        self.remember(die, decl);

        let resolved = self.inner_type(target, depth)?;
        self.ast.try_with_mut(|ast| {
            if let DeclKind::Typedef { underlying } = &mut ast.decl_mut(decl)?.kind {
                *underlying = resolved;
            }
            Ok(())
        })?;
        Ok(decl)
    }

    fn storage(&self, die: DieRef) -> ExprResult<StorageClass>
    {
        let (_, entry) = self.data.entry(die)?;
        Ok(if DwarfData::flag(&entry, constants::DW_AT_external)? {
            StorageClass::None
        } else {
            StorageClass::Static
        })
    }

    pub(crate) fn function(&self, function: &FunctionEntry) -> ExprResult<DeclId>
    {
        if let Some(decl) = self.memo(function.die) {
            return Ok(decl);
        }

        let (_, entry) = self.data.entry(function.die)?;
        let result = self.inner_type(self.data.type_ref(function.die.unit, &entry)?, 0)?;
        let (params, variadic) = self.parameters(function.die, 0)?;
        let storage = self.storage(function.die)?;
        let parent = self.namespace(&function.scope)?;

        let kind = DeclKind::Function(FunctionDecl {
            signature: FunctionType::new(result, params.iter().map(|(_, ty)| ty.clone()).collect(), variadic),
            storage,
            linkage_name: function.linkage.clone(),
        });
        let decl = self.ast.try_with_mut(|ast| {
            let decl = ast.add_decl(parent, DeclName::identifier(function.base.as_str()), kind)?;
            for (name, ty) in params {
                ast.add_decl(decl, DeclName::identifier(name), DeclKind::Param { ty })?;
            }
            Ok(decl)
        })?;
        self.remember(function.die, decl);
        Ok(decl)
    }

    pub(crate) fn variable(&self, variable: &VariableEntry) -> ExprResult<DeclId>
    {
        if let Some(decl) = self.memo(variable.die) {
            return Ok(decl);
        }

        let (_, entry) = self.data.entry(variable.die)?;
        let ty = self.inner_type(self.data.type_ref(variable.die.unit, &entry)?, 0)?;
        let storage = self.storage(variable.die)?;
        let parent = self.namespace(&variable.scope)?;

        let decl = self.ast.try_with_mut(|ast| {
            ast.add_decl(
                parent,
                DeclName::identifier(variable.name.as_str()),
                DeclKind::Variable(VariableDecl { ty, storage }),
            )
        })?;
        self.remember(variable.die, decl);
        Ok(decl)
    }

    /// Give a materialised record or enum its members.
    pub(crate) fn complete(&self, decl: DeclId) -> ExprResult<bool>
    {
        if self.ast.with(|ast| ast.is_complete(decl))? {
            return Ok(true);
        }
        let Some(die) = self.state.borrow().definitions.get(&decl).copied() else {
            return Ok(false);
        };

        let is_enum = self.data.entry(die)?.1.tag() == constants::DW_TAG_enumeration_type;
        let mut members = Vec::new();
        for child in self.data.children(die)? {
            let (unit, entry) = self.data.entry(child)?;
            match entry.tag() {
                constants::DW_TAG_enumerator if is_enum => {
                    let name = self.data.name(unit, &entry)?.unwrap_or_default();
                    let value = DwarfData::sdata(&entry, constants::DW_AT_const_value)?.unwrap_or_default();
                    members.push((name, DeclKind::Enumerator { value }));
                }
                constants::DW_TAG_member if !is_enum => {
                    let name = self.data.name(unit, &entry)?.unwrap_or_default();
                    let ty = self.inner_type(self.data.type_ref(child.unit, &entry)?, 0)?;
                    let offset_bits = DwarfData::field_offset_bits(&entry)?;
                    members.push((name, DeclKind::Field(FieldDecl { ty, offset_bits })));
                }
                _ => {}
            }
        }

        let count = members.len();
        self.ast.try_with_mut(|ast| {
            if ast.is_complete(decl) {
                return Ok(());
            }
            for (name, kind) in members {
                ast.add_decl(decl, DeclName::identifier(name), kind)?;
            }
            let entry = ast.decl_mut(decl)?;
            entry.mark_complete();
            entry.external.lexical_loaded = true;
            Ok(())
        })?;
        trace!(decl = decl.raw(), members = count, "completed tag from DWARF");
        Ok(true)
    }
}
