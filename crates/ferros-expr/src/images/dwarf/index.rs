//! Name index over every unit of an image.

use std::collections::{HashMap, HashSet};

use gimli::{constants, EntriesTreeNode};

use super::{DieRef, DwarfData, OwnedReader};
use crate::error::ExprResult;
use crate::images::demangle::{demangled_name, map_dwarf_error};
use crate::images::FunctionNameKind;

#[derive(Debug, Clone, Copy)]
struct TypeEntry
{
    die: DieRef,
    declaration: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionEntry
{
    pub(super) die: DieRef,
    pub(super) scope: Vec<String>,
    pub(super) base: String,
    pub(super) linkage: Option<String>,
    full: String,
    demangled: Option<String>,
}

impl FunctionEntry
{
    fn matches(&self, name: &str, kind: FunctionNameKind) -> bool
    {
        let base = (kind.contains(FunctionNameKind::BASE) || kind.contains(FunctionNameKind::METHOD))
            && self.base == name;
        let full = kind.contains(FunctionNameKind::FULL)
            && (self.full == name
                || self.linkage.as_deref() == Some(name)
                || self.demangled.as_deref() == Some(name));
        base || full
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VariableEntry
{
    pub(super) die: DieRef,
    pub(super) scope: Vec<String>,
    pub(super) name: String,
    qualified: String,
}

/// Namespaces, namespace-scope types, functions and variables by name.
///
/// Scopes are namespace paths (`["outer", "inner"]`); the root is empty.
/// Anonymous namespaces are transparent.
#[derive(Debug, Default)]
pub(crate) struct DieIndex
{
    namespaces: HashSet<Vec<String>>,
    types: HashMap<(Vec<String>, String), Vec<TypeEntry>>,
    scopes: HashMap<DieRef, Vec<String>>,
    functions: Vec<FunctionEntry>,
    variables: Vec<VariableEntry>,
}

fn qualify(scope: &[String], name: &str) -> String
{
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{name}", scope.join("::"))
    }
}

impl DieIndex
{
    pub(crate) fn build(data: &DwarfData) -> ExprResult<Self>
    {
        let mut index = Self::default();
        for unit_index in 0..data.units.len() {
            let unit = data.unit(unit_index)?;
            let mut tree = unit
                .entries_tree(None)
                .map_err(|err| map_dwarf_error("building unit tree", err))?;
            let root = tree.root().map_err(|err| map_dwarf_error("navigating unit root", err))?;
            index.walk(data, unit_index, root, &mut Vec::new(), true)?;
        }
        Ok(index)
    }

    fn walk(
        &mut self,
        data: &DwarfData,
        unit_index: usize,
        node: EntriesTreeNode<'_, '_, '_, OwnedReader>,
        scope: &mut Vec<String>,
        namespace_scope: bool,
    ) -> ExprResult<()>
    {
        let unit = data.unit(unit_index)?;
        let mut children = node.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating DIE children", err))?
        {
            let entry = child.entry();
            let tag = entry.tag();
            let die = DieRef {
                unit: unit_index,
                offset: entry.offset(),
            };

            match tag {
                constants::DW_TAG_namespace => match data.name(unit, entry)? {
                    Some(name) => {
                        scope.push(name);
                        self.namespaces.insert(scope.clone());
                        self.walk(data, unit_index, child, scope, true)?;
                        scope.pop();
                    }
                    None => self.walk(data, unit_index, child, scope, true)?,
                },
                constants::DW_TAG_structure_type
                | constants::DW_TAG_class_type
                | constants::DW_TAG_union_type
                | constants::DW_TAG_enumeration_type
                | constants::DW_TAG_typedef => {
                    let name = data.name(unit, entry)?;
                    let declaration = DwarfData::flag(entry, constants::DW_AT_declaration)?;
                    self.scopes.insert(die, scope.clone());
                    if let (true, Some(name)) = (namespace_scope, name) {
                        self.types
                            .entry((scope.clone(), name))
                            .or_default()
                            .push(TypeEntry { die, declaration });
                    }
                    if tag != constants::DW_TAG_typedef {
                        self.walk(data, unit_index, child, scope, false)?;
                    }
                }
                constants::DW_TAG_subprogram if namespace_scope => {
                    if DwarfData::flag(entry, constants::DW_AT_declaration)? {
                        continue;
                    }
                    let Some(base) = data.name(unit, entry)? else {
                        continue;
                    };
                    let linkage = match data.attr_string(unit, entry, constants::DW_AT_linkage_name)? {
                        Some(linkage) => Some(linkage),
                        None => data.attr_string(unit, entry, constants::DW_AT_MIPS_linkage_name)?,
                    };
                    self.functions.push(FunctionEntry {
                        die,
                        scope: scope.clone(),
                        full: qualify(scope, &base),
                        demangled: linkage.as_deref().and_then(demangled_name),
                        base,
                        linkage,
                    });
                }
                constants::DW_TAG_variable if namespace_scope => {
                    let Some(name) = data.name(unit, entry)? else {
                        continue;
                    };
                    self.variables.push(VariableEntry {
                        die,
                        scope: scope.clone(),
                        qualified: qualify(scope, &name),
                        name,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn has_namespace(&self, path: &[String]) -> bool
    {
        self.namespaces.contains(path)
    }

    /// Type DIEs named `name` directly in `scope`, definitions first.
    pub(crate) fn types(&self, scope: &[String], name: &str) -> Vec<DieRef>
    {
        let Some(entries) = self.types.get(&(scope.to_vec(), name.to_string())) else {
            return Vec::new();
        };
        let definitions = entries.iter().filter(|entry| !entry.declaration);
        let declarations = entries.iter().filter(|entry| entry.declaration);
        definitions.chain(declarations).map(|entry| entry.die).collect()
    }

    /// The defining DIE for a type declared as `name` in `scope`.
    pub(crate) fn definition(&self, scope: &[String], name: &str) -> Option<DieRef>
    {
        self.types
            .get(&(scope.to_vec(), name.to_string()))?
            .iter()
            .find(|entry| !entry.declaration)
            .map(|entry| entry.die)
    }

    /// Namespace path enclosing a type DIE (root for DIEs never indexed).
    pub(crate) fn scope_of(&self, die: DieRef) -> Vec<String>
    {
        self.scopes.get(&die).cloned().unwrap_or_default()
    }

    pub(crate) fn functions<'a>(
        &'a self,
        name: &'a str,
        kind: FunctionNameKind,
    ) -> impl Iterator<Item = &'a FunctionEntry> + 'a
    {
        self.functions.iter().filter(move |function| function.matches(name, kind))
    }

    pub(crate) fn variables<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a VariableEntry> + 'a
    {
        self.variables
            .iter()
            .filter(move |variable| variable.name == name || variable.qualified == name)
    }

    pub(crate) fn namespace_count(&self) -> usize
    {
        self.namespaces.len()
    }

    pub(crate) fn type_count(&self) -> usize
    {
        self.types.values().map(Vec::len).sum()
    }

    pub(crate) fn function_count(&self) -> usize
    {
        self.functions.len()
    }

    pub(crate) fn variable_count(&self) -> usize
    {
        self.variables.len()
    }
}
