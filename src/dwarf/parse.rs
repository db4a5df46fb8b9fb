//! DWARF walk that populates a [`DwarfIndex`].
//!
//! The walk runs in two phases per input file. A name pre-pass assigns every
//! named (or anonymous) type DIE its qualified name, and records the
//! signature-to-name map for type units. The visit pass then dispatches on
//! each top-level DIE tag and builds the type forest, resolving field and
//! parameter type references through the name map.

use crate::error::{Error, Result};
use crate::retriever::FileRetriever;
use gimli::{AttributeValue, EndianSlice, RunTimeEndian, UnitSectionOffset};
use log::{info, warn};
use object::{Object, ObjectSection};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use super::{
    ANON_PREFIX, ANON_SIG_PREFIX, DwarfIndex, FieldInfo, Frame, TypeInfo, TypeKind,
    unwrap_parameterized_storage,
};

/// Producer extension tag attached to heap-allocation statements.
pub const DW_TAG_GOOGLE_HEAPALLOC: gimli::DwTag = gimli::DwTag(0x4090);

type Slice<'i> = EndianSlice<'i, RunTimeEndian>;
type Unit<'i> = gimli::Unit<Slice<'i>>;
type Die<'abbrev, 'unit, 'i> = gimli::DebuggingInformationEntry<'abbrev, 'unit, Slice<'i>>;

/// One binary to index: a build-id plus its path and optional split-debug
/// path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub build_id: String,
    pub binary_path: PathBuf,
    pub dwarf_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub read_subprograms: bool,
    pub parse_thread_count: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            read_subprograms: false,
            parse_thread_count: 1,
        }
    }
}

/// Builds the index for a set of binaries. Paths are resolved through the
/// retriever; the split-debug file of a request is parsed alongside its
/// binary when it is a distinct file.
pub fn fetch(
    retriever: &dyn FileRetriever,
    requests: &[FetchRequest],
    options: &FetchOptions,
) -> Result<DwarfIndex> {
    let mut index = DwarfIndex::default();
    for request in requests {
        info!("processing build_id: {}", request.build_id);
        let binary = retriever.retrieve(&request.build_id, &request.binary_path)?;
        let mut pack = parse_file(&binary, options)?;
        if let Some(dwarf_path) = &request.dwarf_path
            && dwarf_path != &request.binary_path
        {
            match retriever.retrieve(&request.build_id, dwarf_path) {
                Ok(split) => {
                    let split_pack = parse_file(&split, options)?;
                    pack.insert(split_pack)?;
                }
                Err(e) => warn!("failed to get split debug file for {}: {e}", request.build_id),
            }
        }
        index.insert(pack)?;
    }
    index.post_process();
    Ok(index)
}

/// Parses one object file (a binary, split-debug file, or `.dwp`) into a
/// fresh index. Sections are looked up by their regular name first and their
/// `.dwo` name second, so package files parse through the same path.
pub fn parse_file(path: &Path, options: &FetchOptions) -> Result<DwarfIndex> {
    info!("parsing dwarf file: {}", path.display());
    let file = File::open(path)?;
    let mmap = unsafe { memmap2::Mmap::map(&file) }?;
    let object = object::File::parse(&*mmap).map_err(|e| Error::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if object.section_by_name(".debug_info").is_none()
        && object.section_by_name(".debug_info.dwo").is_none()
    {
        return Err(Error::MissingDebugInfo {
            path: path.display().to_string(),
        });
    }

    let endian = if object.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let load_section = |id: gimli::SectionId| -> std::result::Result<Slice<'_>, gimli::Error> {
        let data = object
            .section_by_name(id.name())
            .or_else(|| id.dwo_name().and_then(|name| object.section_by_name(name)))
            .and_then(|section| section.data().ok())
            .unwrap_or(&[]);
        Ok(EndianSlice::new(data, endian))
    };
    let dwarf = gimli::Dwarf::load(load_section).map_err(|e| Error::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    parse_dwarf(&dwarf, options).map_err(|e| match e {
        Error::Parse { reason, .. } => Error::Parse {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

fn gimli_err(e: gimli::Error) -> Error {
    Error::Parse {
        path: String::new(),
        reason: e.to_string(),
    }
}

fn parse_dwarf(dwarf: &gimli::Dwarf<Slice<'_>>, options: &FetchOptions) -> Result<DwarfIndex> {
    let mut units = Vec::new();
    let mut iter = dwarf.units();
    while let Some(header) = iter.next().map_err(gimli_err)? {
        units.push(dwarf.unit(header).map_err(gimli_err)?);
    }
    let mut type_iter = dwarf.debug_types.units();
    while let Some(header) = type_iter.next().map_err(gimli_err)? {
        units.push(dwarf.unit(header).map_err(gimli_err)?);
    }

    let set = UnitSet { dwarf, units };
    let names = set.build_names()?;

    let walker = Walker {
        set: &set,
        names: &names,
        read_subprograms: options.read_subprograms,
    };

    let workers = (options.parse_thread_count.max(1) as usize).min(set.units.len().max(1));
    if workers <= 1 {
        let mut index = DwarfIndex::default();
        for unit in &set.units {
            walker.visit_unit(&mut index, unit)?;
        }
        return Ok(index);
    }

    // Workers take whole units round-robin into private packs; the packs are
    // deep-merged afterwards so the visible root space is written once.
    let partial: Vec<Result<DwarfIndex>> = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let walker = &walker;
            let set = &set;
            handles.push(scope.spawn(move || {
                let mut index = DwarfIndex::default();
                for unit in set.units.iter().skip(worker).step_by(workers) {
                    walker.visit_unit(&mut index, unit)?;
                }
                Ok(index)
            }));
        }
        handles.into_iter().map(|h| h.join().expect("parser worker panicked")).collect()
    });

    let mut index = DwarfIndex::default();
    for pack in partial {
        index.insert(pack?)?;
    }
    Ok(index)
}

/// All units of one file plus the section data, for cross-unit reference
/// resolution.
struct UnitSet<'d, 'i> {
    dwarf: &'d gimli::Dwarf<Slice<'i>>,
    units: Vec<Unit<'i>>,
}

/// Qualified names per DIE plus the type-unit signature map.
#[derive(Default)]
struct Names {
    qualified: HashMap<UnitSectionOffset, String>,
    signature_to_type_name: HashMap<u64, String>,
}

fn is_scope_tag(tag: gimli::DwTag) -> bool {
    matches!(
        tag,
        gimli::DW_TAG_namespace
            | gimli::DW_TAG_class_type
            | gimli::DW_TAG_structure_type
            | gimli::DW_TAG_union_type
    )
}

fn is_named_type_tag(tag: gimli::DwTag) -> bool {
    matches!(
        tag,
        gimli::DW_TAG_namespace
            | gimli::DW_TAG_class_type
            | gimli::DW_TAG_structure_type
            | gimli::DW_TAG_union_type
            | gimli::DW_TAG_enumeration_type
            | gimli::DW_TAG_base_type
            | gimli::DW_TAG_typedef
    )
}

impl<'i> UnitSet<'_, 'i> {
    fn die_short_name(&self, unit: &Unit<'i>, die: &Die<'_, '_, 'i>) -> Option<String> {
        let value = die.attr_value(gimli::DW_AT_name).ok()??;
        let s = self.dwarf.attr_string(unit, value).ok()?;
        Some(s.to_string_lossy().into_owned())
    }

    fn die_linkage_name(&self, unit: &Unit<'i>, die: &Die<'_, '_, 'i>) -> Option<String> {
        let value = die.attr_value(gimli::DW_AT_linkage_name).ok()??;
        let s = self.dwarf.attr_string(unit, value).ok()?;
        Some(s.to_string_lossy().into_owned())
    }

    fn section_offset(&self, unit: &Unit<'i>, die: &Die<'_, '_, 'i>) -> UnitSectionOffset {
        die.offset().to_unit_section_offset(unit)
    }

    /// Follows a reference attribute to its DIE, across units if needed.
    fn referenced_die<'a>(
        &'a self,
        unit: &'a Unit<'i>,
        value: AttributeValue<Slice<'i>>,
    ) -> Option<(&'a Unit<'i>, gimli::UnitOffset)> {
        match value {
            AttributeValue::UnitRef(offset) => Some((unit, offset)),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::DebugInfoOffset(offset);
                self.units
                    .iter()
                    .find_map(|u| target.to_unit_offset(u).map(|off| (u, off)))
            }
            _ => None,
        }
    }

    fn referenced_type<'a>(
        &'a self,
        unit: &'a Unit<'i>,
        die: &Die<'_, '_, 'i>,
    ) -> Option<(&'a Unit<'i>, gimli::UnitOffset)> {
        let value = die.attr_value(gimli::DW_AT_type).ok()??;
        self.referenced_die(unit, value)
    }

    /// Builds the qualified-name map and the signature map, walking each unit
    /// once with a scope stack.
    fn build_names(&self) -> Result<Names> {
        let mut names = Names::default();
        for unit in &self.units {
            let mut cursor = unit.entries();
            let mut depth = 0isize;
            let mut scopes: Vec<(isize, String)> = Vec::new();
            while let Some((delta, entry)) = cursor.next_dfs().map_err(gimli_err)? {
                depth += delta;
                while let Some((scope_depth, _)) = scopes.last() {
                    if *scope_depth >= depth {
                        scopes.pop();
                    } else {
                        break;
                    }
                }
                let tag = entry.tag();
                if !is_named_type_tag(tag) {
                    continue;
                }
                let offset = self.section_offset(unit, entry);
                let short = self
                    .die_short_name(unit, entry)
                    .unwrap_or_else(|| format!("{ANON_PREFIX}{}", section_offset_value(offset)));
                let qualified = if scopes.is_empty() {
                    short.clone()
                } else {
                    let path: Vec<&str> = scopes.iter().map(|(_, n)| n.as_str()).collect();
                    format!("{}::{}", path.join("::"), short)
                };
                names.qualified.insert(offset, qualified);
                if is_scope_tag(tag) {
                    scopes.push((depth, short));
                }
            }

            // Type units additionally publish their root type under the unit
            // signature.
            if let gimli::UnitType::Type { type_signature, type_offset }
            | gimli::UnitType::SplitType { type_signature, type_offset } =
                unit.header.type_()
            {
                let offset = type_offset.to_unit_section_offset(unit);
                let mut type_name = names.qualified.get(&offset).cloned().unwrap_or_default();
                if type_name.is_empty() || type_name.starts_with(ANON_PREFIX) {
                    type_name = format!("{ANON_SIG_PREFIX}{}", type_signature.0);
                }
                names
                    .signature_to_type_name
                    .insert(type_signature.0, type_name);
            }
        }
        Ok(names)
    }
}

fn section_offset_value(offset: UnitSectionOffset) -> usize {
    match offset {
        UnitSectionOffset::DebugInfoOffset(o) => o.0,
        UnitSectionOffset::DebugTypesOffset(o) => o.0,
    }
}

struct Walker<'w, 'd, 'i> {
    set: &'w UnitSet<'d, 'i>,
    names: &'w Names,
    read_subprograms: bool,
}

impl<'i> Walker<'_, '_, 'i> {
    fn visit_unit(&self, index: &mut DwarfIndex, unit: &Unit<'i>) -> Result<()> {
        index.try_update_pointer_size(unit.header.address_size() as i64)?;
        let mut tree = unit.entries_tree(None).map_err(gimli_err)?;
        let root = tree.root().map_err(gimli_err)?;
        let mut children = root.children();
        while let Some(child) = children.next().map_err(gimli_err)? {
            self.visit_child(&mut index.root, unit, child)?;
        }
        Ok(())
    }

    /// Resolves a `DW_AT_signature`, when present, to the type-unit name.
    fn resolve_signature(&self, die: &Die<'_, '_, 'i>) -> Option<String> {
        let value = die.attr_value(gimli::DW_AT_signature).ok()??;
        let AttributeValue::DebugTypesRef(signature) = value else {
            return None;
        };
        match self.names.signature_to_type_name.get(&signature.0) {
            Some(name) => Some(name.clone()),
            None => {
                warn!("signature not found in type units: {:x}", signature.0);
                None
            }
        }
    }

    /// Name of `die`, recursing through the pointee for unnamed pointer-like
    /// entries and appending the matching suffix.
    fn recursive_name<'a>(&'a self, unit: &'a Unit<'i>, die: &Die<'_, '_, 'i>, depth: usize) -> String {
        if depth > 32 {
            return String::new();
        }
        let offset = self.set.section_offset(unit, die);
        if let Some(qualified) = self.names.qualified.get(&offset) {
            return qualified.clone();
        }
        if let Some(short) = self.set.die_short_name(unit, die) {
            return short;
        }
        if die.tag() == gimli::DW_TAG_array_type {
            return self.array_type_name(unit, die, depth);
        }
        let sub_name = match self.set.referenced_type(unit, die) {
            Some((target_unit, target_offset)) => match target_unit.entry(target_offset) {
                Ok(target) => self.recursive_name(target_unit, &target, depth + 1),
                Err(_) => String::new(),
            },
            None => String::new(),
        };
        match die.tag() {
            gimli::DW_TAG_pointer_type | gimli::DW_TAG_ptr_to_member_type => {
                format!("{sub_name}*")
            }
            gimli::DW_TAG_reference_type => format!("{sub_name}&"),
            gimli::DW_TAG_rvalue_reference_type => format!("{sub_name}&&"),
            _ => sub_name,
        }
    }

    /// Renders `T[N]` from an array DIE and its subrange child.
    fn array_type_name<'a>(&'a self, unit: &'a Unit<'i>, die: &Die<'_, '_, 'i>, depth: usize) -> String {
        let element = match self.set.referenced_type(unit, die) {
            Some((target_unit, target_offset)) => match target_unit.entry(target_offset) {
                Ok(target) => self.recursive_name(target_unit, &target, depth + 1),
                Err(_) => String::new(),
            },
            None => String::new(),
        };
        let count = self.array_element_count(unit, die);
        match count {
            Some(n) => format!("{element}[{n}]"),
            None => format!("{element}[]"),
        }
    }

    fn array_element_count(&self, unit: &Unit<'i>, die: &Die<'_, '_, 'i>) -> Option<u64> {
        let mut tree = unit.entries_tree(Some(die.offset())).ok()?;
        let root = tree.root().ok()?;
        let mut children = root.children();
        while let Ok(Some(child)) = children.next() {
            if child.entry().tag() != gimli::DW_TAG_subrange_type {
                continue;
            }
            if let Ok(Some(value)) = child.entry().attr_value(gimli::DW_AT_count)
                && let Some(count) = value.udata_value()
            {
                return Some(count);
            }
            if let Ok(Some(value)) = child.entry().attr_value(gimli::DW_AT_upper_bound)
                && let Some(bound) = value.udata_value()
            {
                return Some(bound + 1);
            }
        }
        None
    }

    fn name_or_anon<'a>(&'a self, unit: &'a Unit<'i>, die: &Die<'_, '_, 'i>) -> String {
        let name = self.recursive_name(unit, die, 0);
        if name.is_empty() {
            let offset = self.set.section_offset(unit, die);
            format!("{ANON_PREFIX}{}", section_offset_value(offset))
        } else {
            name
        }
    }

    /// Chases `DW_AT_type` through qualifiers and typedefs to the defining
    /// type DIE, then renders its qualified name.
    fn type_name_through<'a>(
        &'a self,
        unit: &'a Unit<'i>,
        die: &Die<'_, '_, 'i>,
        stop: &dyn Fn(gimli::DwTag) -> bool,
    ) -> String {
        let mut current_unit = unit;
        let mut current_offset = die.offset();
        for _ in 0..64 {
            let Ok(entry) = current_unit.entry(current_offset) else {
                return String::new();
            };
            if stop(entry.tag()) {
                if let Some(sig_name) = self.resolve_signature(&entry) {
                    return sig_name;
                }
                return self.recursive_name(current_unit, &entry, 0);
            }
            match self.set.referenced_type(current_unit, &entry) {
                Some((next_unit, next_offset)) => {
                    current_unit = next_unit;
                    current_offset = next_offset;
                }
                None => return String::new(),
            }
        }
        String::new()
    }

    fn field_type_name<'a>(&'a self, unit: &'a Unit<'i>, die: &Die<'_, '_, 'i>) -> String {
        self.type_name_through(unit, die, &|tag| {
            matches!(
                tag,
                gimli::DW_TAG_structure_type
                    | gimli::DW_TAG_array_type
                    | gimli::DW_TAG_class_type
                    | gimli::DW_TAG_base_type
                    | gimli::DW_TAG_pointer_type
                    | gimli::DW_TAG_reference_type
                    | gimli::DW_TAG_union_type
            )
        })
    }

    fn formal_param_type_name<'a>(&'a self, unit: &'a Unit<'i>, die: &Die<'_, '_, 'i>) -> String {
        self.type_name_through(unit, die, &|tag| {
            matches!(
                tag,
                gimli::DW_TAG_structure_type
                    | gimli::DW_TAG_class_type
                    | gimli::DW_TAG_base_type
                    | gimli::DW_TAG_union_type
            )
        })
    }

    /// The referenced type of a heap-allocation tag, with typedefs chased to
    /// the canonical target.
    fn heapalloc_type_name<'a>(&'a self, unit: &'a Unit<'i>, die: &Die<'_, '_, 'i>) -> String {
        let Some((mut cur_unit, mut cur_offset)) = self.set.referenced_type(unit, die) else {
            return String::new();
        };
        for _ in 0..64 {
            let Ok(entry) = cur_unit.entry(cur_offset) else {
                return String::new();
            };
            if entry.tag() != gimli::DW_TAG_typedef {
                if let Some(sig_name) = self.resolve_signature(&entry) {
                    return sig_name;
                }
                return self.recursive_name(cur_unit, &entry, 0);
            }
            match self.set.referenced_type(cur_unit, &entry) {
                Some((next_unit, next_offset)) => {
                    cur_unit = next_unit;
                    cur_offset = next_offset;
                }
                None => return String::new(),
            }
        }
        String::new()
    }

    fn parse_field<'a>(&'a self, unit: &'a Unit<'i>, die: &Die<'_, '_, 'i>) -> FieldInfo {
        let mut field = FieldInfo {
            name: self.set.die_short_name(unit, die).unwrap_or_default(),
            offset: -1,
            type_name: String::new(),
            inherited: die.tag() == gimli::DW_TAG_inheritance,
        };
        if let Ok(Some(value)) = die.attr_value(gimli::DW_AT_data_member_location)
            && let Some(offset) = value.udata_value()
        {
            field.offset = offset as i64;
        }
        field.type_name = self.field_type_name(unit, die);
        field
    }

    fn visit_child<'a>(
        &'a self,
        space: &mut TypeInfo,
        unit: &'a Unit<'i>,
        node: gimli::EntriesTreeNode<'_, '_, '_, Slice<'i>>,
    ) -> Result<()> {
        let tag = node.entry().tag();
        match tag {
            gimli::DW_TAG_namespace
            | gimli::DW_TAG_class_type
            | gimli::DW_TAG_structure_type
            | gimli::DW_TAG_base_type
            | gimli::DW_TAG_array_type
            | gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_ptr_to_member_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type
            | gimli::DW_TAG_enumeration_type
            | gimli::DW_TAG_union_type => {
                let child_name = match self.resolve_signature(node.entry()) {
                    Some(name) => name,
                    None => self.name_or_anon(unit, node.entry()),
                };
                // Qualified names land in the type space by their last path
                // component; the enclosing scopes are the parents we are
                // already inside.
                let short = super::split_scopes(&child_name)
                    .last()
                    .copied()
                    .unwrap_or_default()
                    .to_string();
                let key = if short.is_empty() { child_name } else { short };
                let child = space.child_mut(&key);
                self.parse_die(child, unit, node)?;
            }
            gimli::DW_TAG_subprogram => {
                if !self.read_subprograms {
                    return Ok(());
                }
                let child_name = self
                    .set
                    .die_linkage_name(unit, node.entry())
                    .or_else(|| self.set.die_short_name(unit, node.entry()));
                // An allocation made directly in main matters, and main has
                // no linkage name.
                let Some(child_name) = child_name else {
                    return Ok(());
                };
                let child = space.child_mut(&child_name);
                self.parse_die(child, unit, node)?;
            }
            DW_TAG_GOOGLE_HEAPALLOC => {
                let entry = node.entry();
                let type_name = self.heapalloc_type_name(unit, entry);
                let line_offset = entry
                    .attr_value(gimli::DW_AT_decl_line)
                    .ok()
                    .flatten()
                    .and_then(|v| v.udata_value())
                    .unwrap_or(0);
                let column = entry
                    .attr_value(gimli::DW_AT_decl_column)
                    .ok()
                    .flatten()
                    .and_then(|v| v.udata_value())
                    .unwrap_or(0);
                let func_name = self.set.die_short_name(unit, entry).unwrap_or_default();
                space
                    .heapalloc_sites
                    .insert(Frame::new(func_name, line_offset, column), type_name);
            }
            gimli::DW_TAG_typedef => {
                let Some(name) = self.set.die_short_name(unit, node.entry()) else {
                    return Ok(());
                };
                let target = self.type_name_through(unit, node.entry(), &|tag| {
                    tag != gimli::DW_TAG_typedef
                });
                if !target.is_empty() {
                    space.typedefs.insert(name, target);
                }
            }
            gimli::DW_TAG_member | gimli::DW_TAG_inheritance => {
                let mut field = self.parse_field(unit, node.entry());
                if let Some(unwrapped) = unwrap_parameterized_storage(&field.type_name) {
                    field.type_name = unwrapped;
                }
                space.push_field(field);
            }
            gimli::DW_TAG_template_type_parameter | gimli::DW_TAG_formal_parameter => {
                let param_name = self.formal_param_type_name(unit, node.entry());
                if param_name.is_empty() {
                    return Ok(());
                }
                if !space.formal_parameters.contains(&param_name) {
                    space.formal_parameters.push(param_name);
                }
            }
            gimli::DW_TAG_template_value_parameter | gimli::DW_TAG_variable => {
                let Ok(Some(value)) = node.entry().attr_value(gimli::DW_AT_const_value) else {
                    return Ok(());
                };
                let Some(name) = self.set.die_short_name(unit, node.entry()) else {
                    return Ok(());
                };
                let const_value = value.udata_value().unwrap_or(0);
                space.constants.insert(name, const_value);
            }
            _ => {}
        }
        Ok(())
    }

    fn parse_die<'a>(
        &'a self,
        type_info: &mut TypeInfo,
        unit: &'a Unit<'i>,
        node: gimli::EntriesTreeNode<'_, '_, '_, Slice<'i>>,
    ) -> Result<()> {
        let entry = node.entry();
        let tag = entry.tag();
        type_info.kind = match tag {
            gimli::DW_TAG_namespace => TypeKind::Namespace,
            gimli::DW_TAG_class_type => TypeKind::Class,
            gimli::DW_TAG_enumeration_type => TypeKind::Enum,
            gimli::DW_TAG_structure_type => TypeKind::Structure,
            gimli::DW_TAG_base_type => TypeKind::BaseType,
            gimli::DW_TAG_array_type
            | gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_ptr_to_member_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type => TypeKind::PointerLike,
            gimli::DW_TAG_subprogram => TypeKind::Subprogram,
            gimli::DW_TAG_union_type => TypeKind::Union,
            _ => TypeKind::Unknown,
        };

        if tag == gimli::DW_TAG_subprogram
            && let Some(linkage) = self.set.die_linkage_name(unit, entry)
        {
            type_info.name = linkage;
        }

        if matches!(
            type_info.kind,
            TypeKind::BaseType | TypeKind::Class | TypeKind::Structure | TypeKind::Union | TypeKind::Enum
        ) && let Ok(Some(value)) = entry.attr_value(gimli::DW_AT_byte_size)
            && let Some(size) = value.udata_value()
        {
            type_info.size = size as i64;
        }

        if matches!(
            type_info.kind,
            TypeKind::Namespace
                | TypeKind::Class
                | TypeKind::Structure
                | TypeKind::Subprogram
                | TypeKind::Union
        ) {
            let mut children = node.children();
            while let Some(child) = children.next().map_err(gimli_err)? {
                self.visit_child(type_info, unit, child)?;
            }
        }
        Ok(())
    }
}

/// Reads the build-id of a binary, as lowercase hex. Used for retriever keys
/// and log lines; an empty id is tolerated.
pub fn build_id_for_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mmap = unsafe { memmap2::Mmap::map(&file) }?;
    let object = object::File::parse(&*mmap).map_err(|e| Error::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let build_id = object.build_id().map_err(|e| Error::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(build_id
        .map(|bytes| bytes.iter().map(|b| format!("{b:02x}")).collect())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_options_default_is_sequential() {
        let options = FetchOptions::default();
        assert_eq!(options.parse_thread_count, 1);
        assert!(!options.read_subprograms);
    }

    #[test]
    fn parse_file_rejects_non_object_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_elf");
        std::fs::write(&path, b"plain text").unwrap();
        let err = parse_file(&path, &FetchOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
