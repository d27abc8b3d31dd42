//! DWARF-backed debug-info provider.
//!
//! The object file is parsed once when the provider is created; only the
//! DWARF sections are kept. Everything else is lazy:
//!
//! - the compilation units and the name index are built on the first search
//! - declarations are materialised into the image store only for the names
//!   that were actually requested
//! - records and enums start out forward-declared and receive their members
//!   when [`DebugInfoProvider::complete_type`] is called
//!
//! Objective-C is not described by DWARF here, so selector searches never
//! match.

mod convert;
mod index;

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, DwAt, Dwarf, EndianArcSlice, RunTimeEndian, SectionId, Unit,
    UnitOffset, UnitSectionOffset, UnitType,
};
use gimli::Reader as _;
use object::{Object, ObjectSection};
use once_cell::unsync::OnceCell;
use tracing::debug;

use self::convert::Materialised;
use self::index::DieIndex;
use super::demangle::map_dwarf_error;
use super::{DebugInfoProvider, FunctionMatch, FunctionNameKind};
use crate::ast::{AstHandle, DeclId, Type};
use crate::error::{ExprError, ExprResult};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;
type Entry<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, OwnedReader>;

/// Typedef and modifier chains longer than this are treated as malformed.
const MAX_TYPE_REF_DEPTH: usize = 32;

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_types", &[".debug_types", "__debug_types"]),
];

/// A DIE identified by the index of its unit and its offset in that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DieRef
{
    unit: usize,
    offset: UnitOffset<usize>,
}

/// Parsed DWARF plus every unit in it.
pub(crate) struct DwarfData
{
    dwarf: OwnedDwarf,
    units: Vec<Unit<OwnedReader>>,
}

impl DwarfData
{
    fn load(sections: &HashMap<&'static str, Arc<[u8]>>, endian: RunTimeEndian) -> ExprResult<Self>
    {
        let dwarf = Dwarf::load(|section| Ok::<_, gimli::Error>(section_reader(sections, endian, section)))
            .map_err(|err| map_dwarf_error("loading DWARF", err))?;

        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            units.push(
                dwarf
                    .unit(header)
                    .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
            );
        }

        let mut type_headers = dwarf.type_units();
        while let Some(header) = type_headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_types unit header", err))?
        {
            units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing type unit", err))?);
        }

        Ok(Self { dwarf, units })
    }

    fn unit(&self, index: usize) -> ExprResult<&Unit<OwnedReader>>
    {
        self.units
            .get(index)
            .ok_or_else(|| ExprError::Dwarf(format!("no unit at index {index}")))
    }

    fn entry(&self, die: DieRef) -> ExprResult<(&Unit<OwnedReader>, Entry<'_, '_>)>
    {
        let unit = self.unit(die.unit)?;
        let entry = unit
            .entry(die.offset)
            .map_err(|err| map_dwarf_error("resolving DIE", err))?;
        Ok((unit, entry))
    }

    /// Offsets of the direct children of `die`.
    fn children(&self, die: DieRef) -> ExprResult<Vec<DieRef>>
    {
        let unit = self.unit(die.unit)?;
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building DIE tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating DIE root", err))?;
        let mut children = root.children();
        let mut found = Vec::new();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating DIE children", err))?
        {
            found.push(DieRef {
                unit: die.unit,
                offset: child.entry().offset(),
            });
        }
        Ok(found)
    }

    fn attr_string(&self, unit: &Unit<OwnedReader>, entry: &Entry<'_, '_>, at: DwAt) -> ExprResult<Option<String>>
    {
        let Some(value) = entry
            .attr_value(at)
            .map_err(|err| map_dwarf_error("reading string attribute", err))?
        else {
            return Ok(None);
        };
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(Some(owned))
    }

    fn name(&self, unit: &Unit<OwnedReader>, entry: &Entry<'_, '_>) -> ExprResult<Option<String>>
    {
        self.attr_string(unit, entry, constants::DW_AT_name)
    }

    fn flag(entry: &Entry<'_, '_>, at: DwAt) -> ExprResult<bool>
    {
        let value = entry
            .attr_value(at)
            .map_err(|err| map_dwarf_error("reading flag attribute", err))?;
        Ok(matches!(value, Some(AttributeValue::Flag(true))))
    }

    fn udata(entry: &Entry<'_, '_>, at: DwAt) -> ExprResult<Option<u64>>
    {
        Ok(entry
            .attr(at)
            .map_err(|err| map_dwarf_error("reading constant attribute", err))?
            .and_then(|attr| attr.udata_value()))
    }

    fn sdata(entry: &Entry<'_, '_>, at: DwAt) -> ExprResult<Option<i64>>
    {
        Ok(entry
            .attr(at)
            .map_err(|err| map_dwarf_error("reading constant attribute", err))?
            .and_then(|attr| {
                attr.sdata_value()
                    .or_else(|| attr.udata_value().and_then(|value| i64::try_from(value).ok()))
            }))
    }

    fn size_bits(entry: &Entry<'_, '_>) -> ExprResult<Option<u64>>
    {
        if let Some(bits) = Self::udata(entry, constants::DW_AT_bit_size)? {
            return Ok(Some(bits));
        }
        Ok(Self::udata(entry, constants::DW_AT_byte_size)?.and_then(|bytes| bytes.checked_mul(8)))
    }

    fn field_offset_bits(entry: &Entry<'_, '_>) -> ExprResult<Option<u64>>
    {
        if let Some(bits) = Self::udata(entry, constants::DW_AT_data_bit_offset)? {
            return Ok(Some(bits));
        }
        Ok(Self::udata(entry, constants::DW_AT_data_member_location)?.and_then(|bytes| bytes.checked_mul(8)))
    }

    /// The DIE named by `DW_AT_type` of `entry`, which lives in unit `unit_index`.
    fn type_ref(&self, unit_index: usize, entry: &Entry<'_, '_>) -> ExprResult<Option<DieRef>>
    {
        let Some(value) = entry
            .attr_value(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        else {
            return Ok(None);
        };
        Ok(self.reference(unit_index, value))
    }

    fn reference(&self, unit_index: usize, value: AttributeValue<OwnedReader>) -> Option<DieRef>
    {
        match value {
            AttributeValue::UnitRef(offset) => Some(DieRef {
                unit: unit_index,
                offset,
            }),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                self.units.iter().enumerate().find_map(|(index, unit)| {
                    target.to_unit_offset(unit).map(|offset| DieRef { unit: index, offset })
                })
            }
            AttributeValue::DebugTypesRef(signature) => {
                self.units
                    .iter()
                    .enumerate()
                    .find_map(|(index, unit)| match unit.header.type_() {
                        UnitType::Type {
                            type_signature,
                            type_offset,
                        }
                        | UnitType::SplitType {
                            type_signature,
                            type_offset,
                        } if type_signature == signature => Some(DieRef {
                            unit: index,
                            offset: type_offset,
                        }),
                        _ => None,
                    })
            }
            _ => None,
        }
    }
}

fn section_reader(sections: &HashMap<&'static str, Arc<[u8]>>, endian: RunTimeEndian, id: SectionId) -> OwnedReader
{
    let data = sections
        .get(id.name())
        .cloned()
        .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
    EndianArcSlice::new(data, endian)
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> ExprResult<Option<Arc<[u8]>>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| ExprError::Dwarf(format!("failed to read {name}: {err}")))?;
            return Ok(Some(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            }));
        }
    }

    Ok(None)
}

/// Debug-info provider over the DWARF of one object file.
pub struct DwarfProvider
{
    name: String,
    endian: RunTimeEndian,
    sections: HashMap<&'static str, Arc<[u8]>>,
    data: OnceCell<DwarfData>,
    index: OnceCell<DieIndex>,
    state: RefCell<Materialised>,
}

impl DwarfProvider
{
    /// Read and parse the object file at `path`.
    pub fn open(path: impl AsRef<Path>) -> ExprResult<Self>
    {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Self::from_bytes(path.display().to_string(), &bytes)
    }

    /// Parse an in-memory object file.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> ExprResult<Self>
    {
        let name = name.into();
        let file = object::File::parse(bytes)
            .map_err(|err| ExprError::InvalidArgument(format!("failed to parse {name}: {err}")))?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let mut sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            if let Some(data) = load_section_bytes(&file, aliases)? {
                sections.insert(*canonical, data);
            }
        }
        if !sections.contains_key(".debug_info") {
            debug!(image = %name, "object file carries no .debug_info");
        }

        Ok(Self {
            name,
            endian,
            sections,
            data: OnceCell::new(),
            index: OnceCell::new(),
            state: RefCell::new(Materialised::default()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    fn data(&self) -> ExprResult<&DwarfData>
    {
        self.data.get_or_try_init(|| DwarfData::load(&self.sections, self.endian))
    }

    fn index(&self) -> ExprResult<&DieIndex>
    {
        self.index.get_or_try_init(|| {
            let index = DieIndex::build(self.data()?)?;
            debug!(
                image = %self.name,
                namespaces = index.namespace_count(),
                types = index.type_count(),
                functions = index.function_count(),
                variables = index.variable_count(),
                "indexed DWARF"
            );
            Ok(index)
        })
    }

    fn converter<'a>(&'a self, ast: AstHandle<'a>) -> ExprResult<convert::Converter<'a>>
    {
        Ok(convert::Converter::new(self.data()?, self.index()?, &self.state, ast))
    }
}

impl fmt::Debug for DwarfProvider
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("DwarfProvider")
            .field("name", &self.name)
            .field("sections", &self.sections.len())
            .finish_non_exhaustive()
    }
}

impl DebugInfoProvider for DwarfProvider
{
    fn find_types(&self, ast: AstHandle<'_>, name: &str, parent: Option<DeclId>, max: usize) -> ExprResult<Vec<Type>>
    {
        let converter = self.converter(ast)?;
        let Some(scope) = converter.namespace_path(parent) else {
            return Ok(Vec::new());
        };

        let mut types = Vec::new();
        for die in self.index()?.types(&scope, name) {
            if types.len() >= max {
                break;
            }
            let ty = converter.named_type(die)?;
            if !types.contains(&ty) {
                types.push(ty);
            }
        }
        Ok(types)
    }

    fn find_functions(
        &self,
        ast: AstHandle<'_>,
        name: &str,
        kind: FunctionNameKind,
        max: usize,
    ) -> ExprResult<Vec<FunctionMatch>>
    {
        let converter = self.converter(ast)?;
        let mut found = Vec::new();
        for function in self.index()?.functions(name, kind).take(max) {
            found.push(FunctionMatch {
                decl: Some(converter.function(function)?),
                name: name.to_string(),
            });
        }
        Ok(found)
    }

    fn find_namespace(&self, ast: AstHandle<'_>, name: &str, parent: Option<DeclId>) -> ExprResult<Option<DeclId>>
    {
        let converter = self.converter(ast)?;
        let Some(mut path) = converter.namespace_path(parent) else {
            return Ok(None);
        };
        path.push(name.to_string());
        if !self.index()?.has_namespace(&path) {
            return Ok(None);
        }
        converter.namespace(&path).map(Some)
    }

    fn find_global_variables(&self, ast: AstHandle<'_>, name: &str, max: usize) -> ExprResult<Vec<DeclId>>
    {
        let converter = self.converter(ast)?;
        self.index()?
            .variables(name)
            .take(max)
            .map(|variable| converter.variable(variable))
            .collect()
    }

    fn supports_lazy_completion(&self) -> bool
    {
        true
    }

    fn complete_type(&self, ast: AstHandle<'_>, decl: DeclId) -> ExprResult<bool>
    {
        self.converter(ast)?.complete(decl)
    }
}
