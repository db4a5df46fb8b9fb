//! In-memory model of the debug information of a profiled binary.
//!
//! The index is a namespaced forest of [`TypeInfo`] nodes built from DWARF
//! (see [`parse`]), plus flat maps derived from it: mangled function name to
//! formal/template parameters, and source frame to the type allocated there.
//! Lookups walk the forest by qualified name, following typedefs and
//! descending through anonymous namespaces.

pub mod parse;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

/// Prefix for anonymous types, completed with the DIE offset.
pub const ANON_PREFIX: &str = "Anon_";
/// Prefix for anonymous type-unit records, completed with the signature hash.
pub const ANON_SIG_PREFIX: &str = "AnonSig_";

/// Storage wrappers whose byte representation is `char[N]` but whose single
/// template argument is the real element type. Field types carrying one of
/// these prefixes are rewritten to the wrapped argument during parsing.
pub const PARAMETERIZED_STORAGE_WRAPPERS: &[&str] = &[
    "__gnu_cxx::__aligned_membuf",
    "__gnu_cxx::__aligned_buffer",
];

/// A source location inside a function, used to key heap-allocation tags and
/// as the element of call-stack keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    pub function_name: String,
    pub line_offset: u64,
    pub column: u64,
}

impl Frame {
    pub fn new(function_name: impl Into<String>, line_offset: u64, column: u64) -> Self {
        Frame {
            function_name: function_name.into(),
            line_offset,
            column,
        }
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.function_name, self.line_offset, self.column)
    }
}

/// An allocation call stack, leaf frame first.
pub type CallStack = Vec<Frame>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    #[default]
    Unknown,
    Class,
    Structure,
    BaseType,
    PointerLike,
    Namespace,
    Subprogram,
    Union,
    Enum,
}

impl TypeKind {
    /// Short keyword used by the index dump.
    pub fn short_str(self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Namespace => "namespace",
            TypeKind::Structure => "struct",
            TypeKind::Subprogram => "func",
            TypeKind::BaseType | TypeKind::PointerLike => "",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::Unknown => "UNKNOWN",
        }
    }
}

/// A data member or inherited base subobject of a type.
#[derive(Debug, Clone, Default)]
pub struct FieldInfo {
    pub name: String,
    /// Byte offset from the enclosing type's base; -1 when absent.
    pub offset: i64,
    /// Qualified name of the referenced type.
    pub type_name: String,
    pub inherited: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, offset: i64, type_name: impl Into<String>) -> Self {
        FieldInfo {
            name: name.into(),
            offset,
            type_name: type_name.into(),
            inherited: false,
        }
    }
}

/// A node in the namespaced type forest: a namespace, type, or subprogram
/// together with everything declared inside it.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    /// Short name, without enclosing namespaces.
    pub name: String,
    /// Byte size in memory; -1 when the debug info carries none.
    pub size: i64,
    pub kind: TypeKind,
    /// Fields in declaration order.
    pub fields: Vec<FieldInfo>,
    /// Byte offset to the indices of fields placed there. Multiple fields can
    /// share an offset (unions, inherited bases, pair-like layouts).
    pub offset_index: BTreeMap<i64, BTreeSet<usize>>,
    /// Local typedef name to the canonical qualified type name.
    pub typedefs: HashMap<String, String>,
    /// Nested types and namespaces by short name.
    pub types: BTreeMap<String, TypeInfo>,
    /// Formal/template parameter type names, in declaration order.
    pub formal_parameters: Vec<String>,
    /// Frame to the qualified type name allocated at that source location.
    pub heapalloc_sites: HashMap<Frame, String>,
    /// Constant members (template value parameters, constexpr members).
    pub constants: HashMap<String, u64>,
}

impl TypeInfo {
    pub fn with_kind(kind: TypeKind) -> Self {
        TypeInfo {
            size: -1,
            kind,
            ..Default::default()
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind, TypeKind::Structure | TypeKind::Class)
    }

    /// Adds `field`, de-duplicating against an existing field with the same
    /// name, offset, and type, and keeping the offset index current.
    pub fn push_field(&mut self, field: FieldInfo) {
        let duplicate = self.fields.iter().any(|f| {
            f.offset == field.offset && f.type_name == field.type_name && f.name == field.name
        });
        if duplicate || field.offset < 0 {
            return;
        }
        self.offset_index
            .entry(field.offset)
            .or_default()
            .insert(self.fields.len());
        self.fields.push(field);
    }

    /// Inserts or returns the nested type of the given short name.
    pub fn child_mut(&mut self, name: &str) -> &mut TypeInfo {
        self.types.entry(name.to_string()).or_insert_with(|| {
            let mut t = TypeInfo::with_kind(TypeKind::Unknown);
            t.name = name.to_string();
            t
        })
    }

    /// Deep-merges `other` into `self`. Scalar attributes are taken from
    /// whichever side knows them; collections are united.
    pub fn absorb(&mut self, other: TypeInfo) {
        if self.kind == TypeKind::Unknown {
            self.kind = other.kind;
        }
        if self.size < 0 {
            self.size = other.size;
        }
        for field in other.fields {
            self.push_field(field);
        }
        for (name, target) in other.typedefs {
            self.typedefs.entry(name).or_insert(target);
        }
        for param in other.formal_parameters {
            if !self.formal_parameters.contains(&param) {
                self.formal_parameters.push(param);
            }
        }
        self.heapalloc_sites.extend(other.heapalloc_sites);
        for (name, value) in other.constants {
            self.constants.entry(name).or_insert(value);
        }
        for (name, child) in other.types {
            match self.types.get_mut(&name) {
                Some(existing) => existing.absorb(child),
                None => {
                    self.types.insert(name, child);
                }
            }
        }
    }

    /// Prints the subtree in a C-like layout, for debugging the index.
    pub fn dump(&self, out: &mut String, level: usize) {
        let indent = "    ".repeat(level);
        let _ = writeln!(
            out,
            "{indent}// size={}, kind={:?}, types={}, fields={}",
            self.size,
            self.kind,
            self.types.len(),
            self.fields.len()
        );
        let name = if self.name.is_empty() { "/*empty*/" } else { self.name.as_str() };
        let _ = write!(out, "{indent}{} {name}", self.kind.short_str());
        if self.fields.is_empty()
            && self.types.is_empty()
            && self.typedefs.is_empty()
            && self.formal_parameters.is_empty()
        {
            let _ = writeln!(out, ";");
            return;
        }
        let _ = writeln!(out, " {{");
        let inner = "    ".repeat(level + 1);
        for field in &self.fields {
            let _ = writeln!(
                out,
                "{inner}{} {}; // offset={}",
                field.type_name, field.name, field.offset
            );
        }
        for param in &self.formal_parameters {
            let _ = writeln!(out, "{inner}formal_param {param};");
        }
        for (name, value) in &self.constants {
            let _ = writeln!(out, "{inner}{name}: {value};");
        }
        for child in self.types.values() {
            child.dump(out, level + 1);
        }
        for (name, target) in &self.typedefs {
            let _ = writeln!(out, "{inner}typedef {target} {name};");
        }
        let _ = writeln!(out, "{inner}}};");
    }
}

/// The fetched, navigable debug-metadata index for one binary (plus its
/// optional split-debug file). Read-only after [`parse::fetch`] returns.
#[derive(Debug, Default)]
pub struct DwarfIndex {
    /// Byte size of a pointer in the profiled binary. A single global
    /// property; binaries disagreeing on it cannot be combined.
    pub pointer_size: i64,
    /// Root of the type forest; its direct children are the top-level
    /// namespaces and types.
    pub root: TypeInfo,
    /// Mangled function (or qualified type) name to its parameter type names.
    pub formal_param_map: HashMap<String, Vec<String>>,
    /// Frame to the qualified type name allocated there, accumulated over the
    /// whole forest.
    pub heapalloc_sites: HashMap<Frame, String>,
}

impl DwarfIndex {
    /// Records the address byte size of a compilation unit, failing on
    /// disagreement with previously seen units.
    pub fn try_update_pointer_size(&mut self, new_size: i64) -> Result<()> {
        if self.pointer_size == 0 {
            self.pointer_size = new_size;
        } else if self.pointer_size != new_size {
            return Err(Error::Internal(
                "the address byte size is inconsistent in the debug info file".to_string(),
            ));
        }
        Ok(())
    }

    /// Walks the forest once after parsing: accumulates heap-allocation
    /// sites, registers parameter lists, and finalizes pointer-like sizes.
    pub fn post_process(&mut self) {
        let pointer_size = self.pointer_size;
        let mut heapalloc = HashMap::new();
        let mut params = HashMap::new();
        Self::post_process_node(&mut self.root, "", pointer_size, &mut heapalloc, &mut params);
        self.heapalloc_sites.extend(heapalloc);
        self.formal_param_map.extend(params);
    }

    fn post_process_node(
        node: &mut TypeInfo,
        namespace_ctx: &str,
        pointer_size: i64,
        heapalloc: &mut HashMap<Frame, String>,
        params: &mut HashMap<String, Vec<String>>,
    ) {
        let ctx = if node.kind == TypeKind::Namespace && !node.name.is_empty() {
            format!("{namespace_ctx}::{}", node.name)
        } else {
            namespace_ctx.to_string()
        };

        heapalloc.extend(node.heapalloc_sites.drain());

        if !node.formal_parameters.is_empty() {
            let key = if node.kind == TypeKind::Subprogram {
                node.name.clone()
            } else {
                format!("{ctx}::{}", node.name)
            };
            params.insert(key, node.formal_parameters.clone());
        }

        if node.kind == TypeKind::PointerLike {
            node.size = pointer_size;
        }

        for child in node.types.values_mut() {
            Self::post_process_node(child, &ctx, pointer_size, heapalloc, params);
        }
    }

    /// Merges another fetched pack into this one. Top-level types are
    /// deep-merged; the pointer size must agree.
    pub fn insert(&mut self, other: DwarfIndex) -> Result<()> {
        if other.root.types.is_empty() && other.root.typedefs.is_empty() {
            return Ok(());
        }
        if self.pointer_size != 0 && self.pointer_size != other.pointer_size {
            return Err(Error::Internal("pointer size inconsistent".to_string()));
        }
        self.pointer_size = other.pointer_size;
        self.root.absorb(other.root);
        self.formal_param_map.extend(other.formal_param_map);
        self.heapalloc_sites.extend(other.heapalloc_sites);
        Ok(())
    }

    /// Looks up a type by qualified name. Returns `InvalidArgument` for an
    /// empty name or a name resolving to a namespace, `NotFound` on a miss.
    pub fn get_type(&self, type_name: &str) -> Result<&TypeInfo> {
        if type_name.is_empty() {
            return Err(Error::InvalidArgument("type_name cannot be empty".to_string()));
        }
        let names = split_scopes(type_name);
        let found = self.search_type(&self.root, &names, 0)?;
        if found.kind == TypeKind::Namespace {
            return Err(Error::InvalidArgument(format!(
                "type_name {type_name} refers to a non-type namespace"
            )));
        }
        Ok(found)
    }

    fn search_type<'a>(
        &'a self,
        parent: &'a TypeInfo,
        names: &[&str],
        cur: usize,
    ) -> Result<&'a TypeInfo> {
        let cur_name = names[cur];

        // The anonymous-namespace step matches any namespace child whose
        // synthesized name carries the Anon prefix, greedily trying each. As
        // the final component it could only name a namespace, which is never
        // a valid result.
        if cur_name == "(anonymous namespace)" && cur + 1 < names.len() {
            for (name, child) in &parent.types {
                if name.starts_with("Anon") && child.kind == TypeKind::Namespace {
                    if let Ok(found) = self.search_type(child, names, cur + 1) {
                        return Ok(found);
                    }
                }
            }
            return Err(Error::NotFound(format!(
                "type not found, stuck in anonymous namespace: {}",
                names.join("::")
            )));
        }

        // A typedef resets the namespace context, so restart from the root
        // with the canonical target.
        if let Some(target) = parent.typedefs.get(cur_name) {
            return self.get_type(target);
        }

        if cur == names.len() - 1 {
            if let Some(found) = parent.types.get(cur_name) {
                return Ok(found);
            }
        } else if let Some(child) = parent.types.get(cur_name) {
            if let Ok(found) = self.search_type(child, names, cur + 1) {
                return Ok(found);
            }
        }
        // The target may sit under an empty-named child, which captures
        // inheritance and base-subobject nesting; such a child is a
        // pass-through level for the current path component.
        if let Some(child) = parent.types.get("") {
            return self.search_type(child, names, cur);
        }
        Err(Error::NotFound(format!("type not found: {}", names.join("::"))))
    }

    /// Returns the field of `type_name` covering `offset` (bytes). The offset
    /// must lie inside the type; an offset shared by several fields is
    /// reported as `NotFound` and left to the caller's conflict resolution.
    pub fn get_field(&self, type_name: &str, offset: i64) -> Result<&FieldInfo> {
        let type_info = self.get_type(type_name)?;
        if offset < 0 || offset >= type_info.size {
            return Err(Error::InvalidArgument(format!("invalid offset value: {offset}")));
        }
        if type_info.fields.is_empty() || type_info.offset_index.is_empty() {
            return Err(Error::NotFound("no field in this type".to_string()));
        }
        let (_, indices) = type_info
            .offset_index
            .range(..=offset)
            .next_back()
            .ok_or_else(|| Error::NotFound("no such field".to_string()))?;
        if indices.len() > 1 {
            return Err(Error::NotFound(format!("multiple fields with offset {offset}")));
        }
        let idx = *indices.iter().next().unwrap();
        Ok(&type_info.fields[idx])
    }

    /// Type allocated at `frame`, from the producer's heap-allocation tags.
    pub fn heapalloc_type(&self, frame: &Frame) -> Result<&str> {
        self.heapalloc_sites
            .get(frame)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no heap-allocation site for frame with func: {} at line {} with column {}",
                    frame.function_name, frame.line_offset, frame.column
                ))
            })
    }

    /// Parameter type names of a subprogram (by linkage name) or type.
    pub fn formal_parameters(&self, linkage_name: &str) -> Result<&[String]> {
        self.formal_param_map
            .get(linkage_name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::NotFound(format!("no subprogram data for {linkage_name}")))
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.root.dump(&mut out, 0);
        out
    }
}

/// Splits a qualified name on top-level `::`, aware of angle brackets.
/// `"AAA::BBB<T>::CCC(aaa)"` yields `["AAA", "BBB<T>", "CCC(aaa)"]`.
pub fn split_scopes(type_name: &str) -> Vec<&str> {
    if type_name.is_empty() {
        return Vec::new();
    }
    let bytes = type_name.as_bytes();
    let mut names = Vec::new();
    let mut prev = 0;
    let mut depth = 0i32;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth -= 1,
            b':' if bytes[i + 1] == b':' && depth == 0 => {
                names.push(&type_name[prev..i]);
                prev = i + 2;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    names.push(&type_name[prev..]);
    names
}

/// Returns the content of the outermost angle-bracket group of `name`, with
/// one trailing space (the `> >` separator) removed.
pub fn consume_angle_bracket(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut opened = 0usize;
    let mut closed = 0usize;
    let mut start = 0;
    let mut end = bytes.len();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'>' => {
                closed += 1;
                if closed == opened {
                    end = if i > 0 && bytes[i - 1] == b' ' { i - 1 } else { i };
                    break;
                }
            }
            b'<' => {
                if opened == 0 {
                    start = i + 1;
                }
                opened += 1;
            }
            _ => {}
        }
    }
    if start >= end {
        return String::new();
    }
    name[start..end].to_string()
}

/// Rewrites an allocator-adjacent storage wrapper (`__aligned_membuf<T>` and
/// friends) to its single template argument. Returns `None` when `type_name`
/// is not a known wrapper.
pub fn unwrap_parameterized_storage(type_name: &str) -> Option<String> {
    for wrapper in PARAMETERIZED_STORAGE_WRAPPERS {
        if type_name.starts_with(wrapper) {
            return Some(consume_angle_bracket(type_name));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_type(name: &str, size: i64) -> TypeInfo {
        let mut t = TypeInfo::with_kind(TypeKind::BaseType);
        t.name = name.to_string();
        t.size = size;
        t
    }

    fn record(name: &str, size: i64, fields: Vec<FieldInfo>) -> TypeInfo {
        let mut t = TypeInfo::with_kind(TypeKind::Structure);
        t.name = name.to_string();
        t.size = size;
        for f in fields {
            t.push_field(f);
        }
        t
    }

    fn index_with(types: Vec<TypeInfo>) -> DwarfIndex {
        let mut index = DwarfIndex {
            pointer_size: 8,
            ..Default::default()
        };
        for t in types {
            let name = t.name.clone();
            index.root.types.insert(name, t);
        }
        index
    }

    #[test]
    fn split_scopes_respects_angle_brackets() {
        assert_eq!(
            split_scopes("AAA::BBB<T>::CCC(aaa)"),
            vec!["AAA", "BBB<T>", "CCC(aaa)"]
        );
        assert_eq!(
            split_scopes("std::map<std::pair<A, B>, C>"),
            vec!["std", "map<std::pair<A, B>, C>"]
        );
        assert_eq!(split_scopes("int"), vec!["int"]);
        assert!(split_scopes("").is_empty());
    }

    #[test]
    fn consume_angle_bracket_takes_outer_group() {
        assert_eq!(consume_angle_bracket("wrap<std::pair<A, B> >"), "std::pair<A, B>");
        assert_eq!(consume_angle_bracket("wrap<int>"), "int");
        assert_eq!(consume_angle_bracket("no_brackets"), "");
    }

    #[test]
    fn unwrap_parameterized_storage_known_wrappers() {
        assert_eq!(
            unwrap_parameterized_storage("__gnu_cxx::__aligned_membuf<std::pair<const long, A> >"),
            Some("std::pair<const long, A>".to_string())
        );
        assert_eq!(
            unwrap_parameterized_storage("__gnu_cxx::__aligned_buffer<int>"),
            Some("int".to_string())
        );
        assert_eq!(unwrap_parameterized_storage("std::vector<int>"), None);
    }

    #[test]
    fn get_type_walks_namespaces() {
        let mut ns = TypeInfo::with_kind(TypeKind::Namespace);
        ns.name = "outer".to_string();
        ns.types.insert("A".to_string(), record("A", 8, vec![]));
        let index = index_with(vec![ns]);

        assert!(index.get_type("outer::A").is_ok());
        assert!(index.get_type("outer::B").unwrap_err().is_not_found());
        // A namespace is not a valid lookup result.
        assert!(matches!(
            index.get_type("outer"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(index.get_type(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn get_type_follows_typedefs_from_root() {
        let mut ns = TypeInfo::with_kind(TypeKind::Namespace);
        ns.name = "n".to_string();
        ns.typedefs
            .insert("alias".to_string(), "target::T".to_string());
        let mut target_ns = TypeInfo::with_kind(TypeKind::Namespace);
        target_ns.name = "target".to_string();
        target_ns.types.insert("T".to_string(), record("T", 4, vec![]));
        let index = index_with(vec![ns, target_ns]);

        let found = index.get_type("n::alias").unwrap();
        assert_eq!(found.name, "T");
    }

    #[test]
    fn get_type_descends_anonymous_namespaces() {
        let mut anon = TypeInfo::with_kind(TypeKind::Namespace);
        anon.name = "Anon_1234".to_string();
        anon.types.insert("Hidden".to_string(), record("Hidden", 16, vec![]));
        let index = index_with(vec![anon]);

        let found = index.get_type("(anonymous namespace)::Hidden").unwrap();
        assert_eq!(found.name, "Hidden");
    }

    #[test]
    fn get_type_descends_empty_named_children() {
        let mut outer = record("Outer", 24, vec![]);
        let mut empty = TypeInfo::with_kind(TypeKind::Structure);
        empty.types.insert("Inner".to_string(), record("Inner", 8, vec![]));
        outer.types.insert(String::new(), empty);
        let index = index_with(vec![outer]);

        assert!(index.get_type("Outer::Inner").is_ok());
    }

    #[test]
    fn get_field_covers_offsets_and_detects_conflicts() {
        let index = index_with(vec![
            record(
                "A",
                16,
                vec![FieldInfo::new("x", 0, "long"), FieldInfo::new("y", 8, "long")],
            ),
            record(
                "P",
                16,
                vec![
                    FieldInfo::new("first", 0, "long"),
                    FieldInfo::new("second", 0, "Empty"),
                ],
            ),
        ]);

        assert_eq!(index.get_field("A", 0).unwrap().name, "x");
        // Offset 4 is covered by x, which starts at 0.
        assert_eq!(index.get_field("A", 4).unwrap().name, "x");
        assert_eq!(index.get_field("A", 8).unwrap().name, "y");
        assert!(matches!(
            index.get_field("A", 16),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            index.get_field("A", -1),
            Err(Error::InvalidArgument(_))
        ));
        // Two fields share offset 0 in P; the caller resolves that.
        assert!(index.get_field("P", 0).unwrap_err().is_not_found());
    }

    #[test]
    fn push_field_dedupes_and_indexes() {
        let mut t = record("T", 8, vec![]);
        t.push_field(FieldInfo::new("x", 0, "int"));
        t.push_field(FieldInfo::new("x", 0, "int"));
        t.push_field(FieldInfo::new("y", 4, "int"));
        assert_eq!(t.fields.len(), 2);
        assert_eq!(t.offset_index.len(), 2);
    }

    #[test]
    fn post_process_assigns_pointer_sizes_and_collects_maps() {
        let mut ptr = TypeInfo::with_kind(TypeKind::PointerLike);
        ptr.name = "A*".to_string();
        let mut func = TypeInfo::with_kind(TypeKind::Subprogram);
        func.name = "_Z3foov".to_string();
        func.formal_parameters = vec!["std::allocator<A>".to_string()];
        func.heapalloc_sites
            .insert(Frame::new("foo", 3, 1), "A".to_string());
        let mut index = index_with(vec![ptr, func]);
        index.post_process();

        assert_eq!(index.root.types["A*"].size, 8);
        assert_eq!(
            index.formal_parameters("_Z3foov").unwrap(),
            &["std::allocator<A>".to_string()][..]
        );
        assert_eq!(index.heapalloc_type(&Frame::new("foo", 3, 1)).unwrap(), "A");
        assert!(index.heapalloc_type(&Frame::new("foo", 3, 2)).unwrap_err().is_not_found());
    }

    #[test]
    fn insert_rejects_pointer_size_mismatch() {
        let mut a = index_with(vec![base_type("int", 4)]);
        let b = DwarfIndex {
            pointer_size: 4,
            root: {
                let mut root = TypeInfo::default();
                root.types.insert("char".to_string(), base_type("char", 1));
                root
            },
            ..Default::default()
        };
        assert!(matches!(a.insert(b), Err(Error::Internal(_))));
    }

    #[test]
    fn absorb_merges_nested_types() {
        let mut a = record("A", 8, vec![FieldInfo::new("x", 0, "long")]);
        let mut other = record("A", -1, vec![FieldInfo::new("x", 0, "long")]);
        other
            .types
            .insert("Inner".to_string(), record("Inner", 4, vec![]));
        a.absorb(other);
        assert_eq!(a.size, 8);
        assert_eq!(a.fields.len(), 1);
        assert!(a.types.contains_key("Inner"));
    }
}
