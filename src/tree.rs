//! Type trees: the structural decomposition of one allocation into fields,
//! array elements, padding, and nested records, annotated with access
//! counters.
//!
//! A tree is either built from the debug index (see `resolver`) or
//! materialized from an [`ObjectLayout`] blueprint for synthetic container
//! nodes. Histograms are projected onto the tree with [`TypeTree::record_access_histogram`].

use crate::dwarf::{TypeInfo, TypeKind};
use crate::error::{Error, Result};
use log::error;
use std::collections::HashMap;
use std::io::Write;

/// Byte span covered by one histogram bucket.
pub const DEFAULT_ACCESS_GRANULARITY: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Access,
    LlcMiss,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessCounters {
    pub total: u64,
    pub access: u64,
    pub llc_miss: u64,
}

impl AccessCounters {
    fn record(&mut self, kind: AccessKind, count: u64) {
        self.total += count;
        match kind {
            AccessKind::Access => self.access += count,
            AccessKind::LlcMiss => self.llc_miss += count,
        }
    }

    fn merge(&mut self, other: &AccessCounters) {
        self.total += other.total;
        self.access += other.access;
        self.llc_miss += other.llc_miss;
    }
}

/// What kind of type a node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Unknown,
    Builtin,
    Record,
    Indirection,
    Array,
    Padding,
    Enum,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Unknown => "UNKNOWN_TYPE",
            NodeKind::Builtin => "BUILTIN_TYPE",
            NodeKind::Record => "RECORD_TYPE",
            NodeKind::Indirection => "INDIRECTION_TYPE",
            NodeKind::Array => "ARRAY_TYPE",
            NodeKind::Padding => "PADDING_TYPE",
            NodeKind::Enum => "ENUM_TYPE",
        }
    }
}

/// What role a node plays inside its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectKind {
    #[default]
    Unknown,
    Field,
    ArrayElements,
    Padding,
    Base,
}

pub fn node_kind_from_dwarf(kind: TypeKind) -> NodeKind {
    match kind {
        TypeKind::Structure | TypeKind::Class | TypeKind::Union => NodeKind::Record,
        TypeKind::BaseType => NodeKind::Builtin,
        TypeKind::PointerLike => NodeKind::Indirection,
        TypeKind::Enum => NodeKind::Enum,
        _ => NodeKind::Unknown,
    }
}

/// The layout attributes of one subobject, shared between tree nodes and
/// blueprint descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutProperties {
    pub name: String,
    pub type_name: String,
    pub offset_bits: i64,
    pub size_bits: i64,
    pub multiplicity: i64,
    pub type_kind: NodeKind,
    pub kind: ObjectKind,
}

/// A plain structural description of an object: the blueprint form of a tree,
/// without counters or global offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectLayout {
    pub properties: LayoutProperties,
    pub subobjects: Vec<ObjectLayout>,
}

fn overlap(a1: i64, a2: i64, b1: i64, b2: i64) -> bool {
    a2.max(b2) - a1.min(b1) < (a2 - a1) + (b2 - b1)
}

#[derive(Debug, Clone)]
pub struct Node {
    properties: LayoutProperties,
    global_offset: i64,
    counters: AccessCounters,
    children: Vec<Node>,
    is_union: bool,
}

impl Node {
    pub fn new(
        name: &str,
        type_name: &str,
        offset_bits: i64,
        size_bits: i64,
        multiplicity: i64,
        type_kind: NodeKind,
        kind: ObjectKind,
        global_offset: i64,
        is_union: bool,
    ) -> Node {
        Node {
            properties: LayoutProperties {
                name: name.to_string(),
                type_name: type_name.to_string(),
                offset_bits,
                size_bits,
                multiplicity,
                type_kind,
                kind,
            },
            global_offset,
            counters: AccessCounters::default(),
            children: Vec::new(),
            is_union,
        }
    }

    pub fn from_type_info(
        name: &str,
        type_name: &str,
        offset_bits: i64,
        multiplicity: i64,
        type_info: &TypeInfo,
        parent_global_offset: i64,
    ) -> Node {
        Node::new(
            name,
            type_name,
            offset_bits,
            type_info.size * 8,
            multiplicity,
            node_kind_from_dwarf(type_info.kind),
            if multiplicity > 1 { ObjectKind::ArrayElements } else { ObjectKind::Field },
            parent_global_offset + offset_bits,
            type_info.kind == TypeKind::Union,
        )
    }

    pub fn root_from_type_info(type_name: &str, type_info: &TypeInfo) -> Node {
        Node::new(
            type_name,
            type_name,
            0,
            type_info.size * 8,
            1,
            node_kind_from_dwarf(type_info.kind),
            ObjectKind::Field,
            0,
            type_info.kind == TypeKind::Union,
        )
    }

    pub fn array(
        name: &str,
        type_name: &str,
        size_bits: i64,
        offset_bits: i64,
        multiplicity: i64,
        parent_global_offset: i64,
    ) -> Node {
        Node::new(
            name,
            type_name,
            offset_bits,
            size_bits,
            multiplicity,
            NodeKind::Array,
            if multiplicity > 1 { ObjectKind::ArrayElements } else { ObjectKind::Field },
            parent_global_offset + offset_bits,
            false,
        )
    }

    pub fn padding(from_offset: i64, to_offset: i64, parent_global_offset: i64) -> Node {
        Node::new(
            "",
            "",
            from_offset,
            to_offset - from_offset,
            1,
            NodeKind::Padding,
            ObjectKind::Padding,
            parent_global_offset + from_offset,
            false,
        )
    }

    pub fn unresolved(
        name: &str,
        type_name: &str,
        offset_bits: i64,
        multiplicity: i64,
        inferred_size: i64,
        parent_global_offset: i64,
    ) -> Node {
        Node::new(
            name,
            type_name,
            offset_bits,
            inferred_size,
            multiplicity,
            NodeKind::Unknown,
            ObjectKind::Unknown,
            parent_global_offset + offset_bits,
            false,
        )
    }

    pub fn pointer(
        name: &str,
        type_name: &str,
        offset_bits: i64,
        multiplicity: i64,
        pointer_size_bits: i64,
        parent_global_offset: i64,
    ) -> Node {
        Node::new(
            name,
            type_name,
            offset_bits,
            pointer_size_bits,
            multiplicity,
            NodeKind::Indirection,
            if multiplicity > 1 { ObjectKind::ArrayElements } else { ObjectKind::Field },
            parent_global_offset + offset_bits,
            false,
        )
    }

    fn from_layout(layout: &ObjectLayout, parent_global_offset: Option<i64>) -> Node {
        Node::new(
            &layout.properties.name,
            &layout.properties.type_name,
            layout.properties.offset_bits,
            layout.properties.size_bits,
            layout.properties.multiplicity,
            layout.properties.type_kind,
            layout.properties.kind,
            match parent_global_offset {
                Some(base) => base + layout.properties.offset_bits,
                None => 0,
            },
            false,
        )
    }

    /// A copy of the node's values, without its children.
    fn copy_without_children(&self) -> Node {
        Node {
            properties: self.properties.clone(),
            global_offset: self.global_offset,
            counters: self.counters,
            children: Vec::new(),
            is_union: self.is_union,
        }
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Appends `child`, inserting a padding node before it when a gap exists
    /// after the previous field, and after it when the last field stops short
    /// of the parent's size. Unions place every child at offset 0 and get no
    /// padding.
    pub fn add_child_with_padding(
        &mut self,
        child: Node,
        field_index: usize,
        resolved_offsets: &[i64],
    ) {
        if self.is_union {
            self.children.push(child);
            return;
        }

        if field_index > 0 {
            let last_end = resolved_offsets[field_index - 1] * 8
                + self.children.last().map_or(0, Node::full_size_bits);
            let current_start = resolved_offsets[field_index] * 8;
            if current_start > last_end {
                let padding = Node::padding(last_end, current_start, self.global_offset);
                self.children.push(padding);
            }
        }

        let mut trailing = None;
        if field_index + 1 == resolved_offsets.len()
            && self.size_bits() > child.offset_bits() + child.full_size_bits()
        {
            trailing = Some(Node::padding(
                child.offset_bits() + child.full_size_bits(),
                self.size_bits(),
                self.global_offset,
            ));
        }
        self.children.push(child);
        if let Some(padding) = trailing {
            self.children.push(padding);
        }
    }

    pub fn child(&self, idx: usize) -> &Node {
        &self.children[idx]
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn type_name(&self) -> &str {
        &self.properties.type_name
    }

    pub fn offset_bits(&self) -> i64 {
        self.properties.offset_bits
    }

    pub fn offset_bytes(&self) -> i64 {
        self.properties.offset_bits / 8
    }

    pub fn size_bits(&self) -> i64 {
        self.properties.size_bits
    }

    pub fn size_bytes(&self) -> i64 {
        self.properties.size_bits / 8
    }

    pub fn set_size_bits(&mut self, size_bits: i64) {
        self.properties.size_bits = size_bits;
    }

    pub fn full_size_bits(&self) -> i64 {
        self.properties.size_bits * self.properties.multiplicity
    }

    pub fn full_size_bytes(&self) -> i64 {
        self.full_size_bits() / 8
    }

    pub fn multiplicity(&self) -> i64 {
        self.properties.multiplicity
    }

    pub fn global_offset_bits(&self) -> i64 {
        self.global_offset
    }

    pub fn global_offset_bytes(&self) -> i64 {
        self.global_offset / 8
    }

    pub fn set_global_offset_bits(&mut self, offset: i64) {
        self.global_offset = offset;
    }

    pub fn type_kind(&self) -> NodeKind {
        self.properties.type_kind
    }

    pub fn total_access_count(&self) -> u64 {
        self.counters.total
    }

    pub fn counters(&self) -> &AccessCounters {
        &self.counters
    }

    pub fn is_padding(&self) -> bool {
        self.properties.type_kind == NodeKind::Padding
    }

    pub fn is_indirection(&self) -> bool {
        self.properties.type_kind == NodeKind::Indirection
    }

    pub fn is_unresolved(&self) -> bool {
        self.properties.type_kind == NodeKind::Unknown
    }

    pub fn is_union(&self) -> bool {
        self.is_union
    }

    pub fn is_array(&self) -> bool {
        self.properties.type_kind == NodeKind::Array
    }

    pub fn is_record(&self) -> bool {
        self.properties.type_kind == NodeKind::Record
    }

    fn display_name<'a>(&self, name: &'a str) -> &'a str {
        if self.is_padding() { "/*padding*/" } else { name }
    }

    pub fn subtree_size(&self) -> u64 {
        1 + self.children.iter().map(Node::subtree_size).sum::<u64>()
    }

    /// Projects one histogram bucket onto the subtree. `element_offsets`
    /// carries the byte offsets at which this subtree repeats because of
    /// array multiplicities on the ancestor path; a node counts an
    /// overlapping bucket once per repeat it overlaps, and its own
    /// multiplicity only widens the set handed to its children.
    fn record_access(
        &mut self,
        offset_bytes: i64,
        count: u64,
        granularity: i64,
        kind: AccessKind,
        element_offsets: &[u64],
    ) -> bool {
        let max_offset = *element_offsets.last().unwrap_or(&0) as i64;
        if !overlap(
            offset_bytes,
            offset_bytes + granularity,
            self.global_offset_bytes(),
            self.global_offset_bytes() + max_offset + self.full_size_bytes(),
        ) {
            return false;
        }

        for &element_offset in element_offsets {
            let base = self.global_offset_bytes() + element_offset as i64;
            if overlap(offset_bytes, offset_bytes + granularity, base, base + self.full_size_bytes()) {
                self.counters.record(kind, count);
            }
        }

        let mut expanded = Vec::with_capacity(element_offsets.len() * self.multiplicity() as usize);
        for i in 0..self.multiplicity() {
            for &element_offset in element_offsets {
                expanded.push(element_offset + (i * self.size_bytes()) as u64);
            }
        }

        let mut overlap_in_children = self.children.is_empty();
        for child in &mut self.children {
            overlap_in_children |= child.record_access(offset_bytes, count, granularity, kind, &expanded);
        }
        overlap_in_children
    }

    /// Pairwise counter addition over structurally identical trees. An array
    /// suffix difference in the type name (`T[8]` vs `T[16]`) is tolerated.
    pub fn merge_counts(&mut self, other: &Node) -> Result<()> {
        let has_same_type = self.type_name() == other.type_name()
            || match self.type_name().find('[') {
                Some(pos) => self.type_name().get(..pos) == other.type_name().get(..pos),
                None => false,
            };
        if self.name() != other.name()
            || self.num_children() != other.num_children()
            || !has_same_type
        {
            return Err(Error::InvalidArgument(format!(
                "trying to merge counts for distinct trees --> {} vs {}",
                self.type_name(),
                other.type_name()
            )));
        }
        self.counters.merge(&other.counters);
        for (child, other_child) in self.children.iter_mut().zip(other.children.iter()) {
            child.merge_counts(other_child)?;
        }
        Ok(())
    }

    pub fn find_node_with_type_name(&self, type_name: &str) -> Option<&Node> {
        for child in &self.children {
            if child.type_name() == type_name {
                return Some(child);
            }
            if let Some(found) = child.find_node_with_type_name(type_name) {
                return Some(found);
            }
        }
        None
    }

    fn find_node_with_type_name_mut(&mut self, type_name: &str) -> Option<&mut Node> {
        for child in &mut self.children {
            if child.type_name() == type_name {
                return Some(child);
            }
            if let Some(found) = child.find_node_with_type_name_mut(type_name) {
                return Some(found);
            }
        }
        None
    }

    /// Grafts deep copies of `other`'s children under this node.
    fn graft_children(&mut self, other: &Node) {
        for child in &other.children {
            let mut copy = child.copy_without_children();
            copy.graft_children(child);
            self.add_child(copy);
        }
    }

    /// Rewrites parent-relative and global offsets from the sizes, packing
    /// children back to back.
    pub fn infer_offsets_from_sizes(&mut self) {
        let mut current = 0;
        let base = self.global_offset;
        for child in &mut self.children {
            child.global_offset = base + current;
            child.properties.offset_bits = current;
            current += child.full_size_bits();
            child.infer_offsets_from_sizes();
        }
    }

    /// Fills in any zero aggregate size as the sum of its children.
    pub fn build_sizes_bottom_up(&mut self) {
        for child in &mut self.children {
            child.build_sizes_bottom_up();
        }
        if self.full_size_bits() == 0 {
            let size_bits = self.children.iter().map(Node::full_size_bits).sum();
            self.set_size_bits(size_bits);
        }
    }

    fn verify_against_union_parent(
        &self,
        parent: &Node,
        older_sibling: Option<&Node>,
        verbose: bool,
    ) -> bool {
        let mut res = true;
        if self.offset_bytes() != 0 && !self.is_padding() {
            if verbose {
                error!(
                    "union child offset not 0: {} != 0 for {self}",
                    self.offset_bytes()
                );
            }
            res = false;
        }
        match older_sibling {
            None => {
                if parent.num_children() == 1
                    && self.total_access_count() != parent.total_access_count()
                {
                    if verbose {
                        error!(
                            "union child access count mismatch: {} != {} for {self}",
                            self.total_access_count(),
                            parent.total_access_count()
                        );
                    }
                    res = false;
                }
            }
            Some(sibling) => {
                if self.full_size_bytes() == sibling.full_size_bytes()
                    && self.total_access_count() != sibling.total_access_count()
                {
                    if verbose {
                        error!(
                            "union child access count mismatch even though size is the same: {} != {} for {self}",
                            self.total_access_count(),
                            sibling.total_access_count()
                        );
                    }
                    res = false;
                }
            }
        }
        res
    }

    pub fn verify(&self, parent: Option<&Node>, older_sibling: Option<&Node>, verbose: bool) -> bool {
        let mut res = true;

        if let Some(parent) = parent
            && parent.is_union()
        {
            return self.verify_against_union_parent(parent, older_sibling, verbose);
        }

        if self.is_union() {
            for child in &self.children {
                if child.offset_bytes() != 0 && !child.is_padding() {
                    if verbose {
                        error!(
                            "union child offset not 0: {} != 0 for {child} on node: {}",
                            child.offset_bytes(),
                            self.name()
                        );
                    }
                    res = false;
                }
            }
            let mut previous = None;
            for child in &self.children {
                res &= child.verify(Some(self), previous, verbose);
                previous = Some(child);
            }
            return res;
        }

        if !self.children.is_empty() {
            let total_child_access: u64 = self.children.iter().map(Node::total_access_count).sum();
            let total_child_size: i64 = self.children.iter().map(Node::full_size_bits).sum();
            if total_child_access < self.total_access_count() {
                if verbose {
                    error!(
                        "total count mismatch: total child access count {total_child_access} < {} for: {self}",
                        self.total_access_count()
                    );
                }
                res = false;
            }
            if total_child_size != self.size_bits() {
                if verbose {
                    error!(
                        "size mismatch: total child size {total_child_size} != {} for: {self}",
                        self.size_bits()
                    );
                }
                res = false;
            }
        }

        if !self.is_padding() && self.type_name().is_empty() {
            if verbose {
                error!("not padding and empty type name for {self}");
            }
            res = false;
        }

        if self.is_unresolved() && verbose {
            error!("unresolved type for {self}");
        }

        match parent {
            Some(parent) => {
                if self.global_offset_bits() != parent.global_offset_bits() + self.offset_bits() {
                    if verbose {
                        error!(
                            "parent-child offset mismatch: {} != {} for {self}",
                            self.global_offset_bits(),
                            parent.global_offset_bits() + self.offset_bits()
                        );
                    }
                    res = false;
                }
            }
            None => {
                if (self.global_offset_bits() != 0 || self.offset_bits() != 0) && verbose {
                    error!(
                        "root offset not 0: {} != {} for {self}",
                        self.global_offset_bits(),
                        self.offset_bits()
                    );
                }
            }
        }

        match older_sibling {
            Some(sibling) => {
                if self.global_offset_bits() <= sibling.global_offset_bits() {
                    if verbose {
                        error!(
                            "siblings do not have partial ordering in global offsets {} <= {} for {sibling} {self}",
                            self.global_offset_bits(),
                            sibling.global_offset_bits()
                        );
                    }
                    res = false;
                }
                if sibling.offset_bits() + sibling.full_size_bits() != self.offset_bits()
                    || sibling.global_offset_bits() + sibling.full_size_bits()
                        != self.global_offset_bits()
                {
                    if verbose {
                        error!(
                            "siblings do not have consistent size and offset {} + {} != {} for {sibling} {self}",
                            sibling.offset_bits(),
                            sibling.full_size_bits(),
                            self.offset_bits()
                        );
                    }
                    res = false;
                }
            }
            None => {
                if parent.is_some() && self.offset_bits() != 0 {
                    if verbose {
                        error!(
                            "first child does not have offset of 0: {} != 0 for {self}",
                            self.offset_bits()
                        );
                    }
                    res = false;
                }
            }
        }

        if self.size_bits() <= 0 {
            if verbose {
                error!("size must be positive: {} for {self}", self.size_bits());
            }
            res = false;
        }

        let mut previous = None;
        for child in &self.children {
            res &= child.verify(Some(self), previous, verbose);
            previous = Some(child);
        }
        res
    }

    pub fn dump(&self, out: &mut dyn Write, level: usize, dump_full_unions: bool) -> std::io::Result<()> {
        let indent = |n: usize| "  ".repeat(n);
        write!(out, "{}- type:   {}", indent(level.saturating_sub(1)), self.display_name(self.type_name()))?;
        if self.is_unresolved() {
            write!(out, " (Unresolved)")?;
        }
        if self.is_union() {
            write!(out, " (Union)")?;
        }
        writeln!(out)?;

        if level > 1 && !self.is_padding() {
            writeln!(out, "{}name:   {}", indent(level), self.display_name(self.name()))?;
        }
        writeln!(out, "{}size:   {}", indent(level), self.size_bytes())?;
        if self.multiplicity() > 1 {
            writeln!(out, "{}multiplicity: {}", indent(level), self.multiplicity())?;
        }
        writeln!(out, "{}total_access: {}", indent(level), self.total_access_count())?;
        writeln!(out, "{}global_offset: {}", indent(level), self.global_offset_bytes())?;
        if self.children.is_empty() {
            return Ok(());
        }
        writeln!(out, "{}children: ", indent(level))?;
        // A union dumps only the child with the largest subtree; that is the
        // one most likely to carry the relevant decomposition.
        if !dump_full_unions && self.is_union() {
            let mut biggest = &self.children[0];
            for child in &self.children[1..] {
                if child.subtree_size() > biggest.subtree_size() {
                    biggest = child;
                }
            }
            biggest.dump(out, level + 1, dump_full_unions)?;
        } else {
            for child in &self.children {
                child.dump(out, level + 1, dump_full_unions)?;
            }
        }
        Ok(())
    }

    fn dump_flamegraph(
        &self,
        out: &mut dyn Write,
        path: &[String],
        root_name: &str,
    ) -> std::io::Result<()> {
        let name = format!(
            "{}|{}|{}",
            self.offset_bytes(),
            self.display_name(self.type_name()),
            self.name()
        );
        write!(out, "{root_name}_")?;
        for part in path {
            write!(out, "{part};")?;
        }
        writeln!(
            out,
            "{name} {}",
            if self.num_children() > 0 { 0 } else { self.total_access_count() }
        )?;
        let mut new_path = path.to_vec();
        new_path.push(name);
        for child in &self.children {
            child.dump_flamegraph(out, &new_path, root_name)?;
        }
        Ok(())
    }

    fn to_layout(&self) -> ObjectLayout {
        ObjectLayout {
            properties: self.properties.clone(),
            subobjects: self.children.iter().map(Node::to_layout).collect(),
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "|{}  {} {}|",
            self.display_name(self.type_name()),
            self.global_offset_bytes(),
            self.size_bytes()
        )
    }
}

/// The attribution result for one allocation site: a root node, the logical
/// root type name, and the container provenance.
#[derive(Debug, Clone)]
pub struct TypeTree {
    root: Node,
    root_type_name: String,
    from_container: bool,
    container_name: String,
}

impl TypeTree {
    pub fn new(
        root: Node,
        root_type_name: impl Into<String>,
        from_container: bool,
        container_name: impl Into<String>,
    ) -> TypeTree {
        TypeTree {
            root,
            root_type_name: root_type_name.into(),
            from_container,
            container_name: container_name.into(),
        }
    }

    /// Materializes a tree from a blueprint, recursively.
    pub fn from_object_layout(
        layout: &ObjectLayout,
        root_type_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> TypeTree {
        fn build(layout: &ObjectLayout, parent_global_offset: Option<i64>) -> Node {
            let mut node = Node::from_layout(layout, parent_global_offset);
            for subobject in &layout.subobjects {
                node.add_child(build(subobject, Some(node.global_offset)));
            }
            node
        }
        let container_name = container_name.into();
        TypeTree {
            root: build(layout, None),
            root_type_name: root_type_name.into(),
            from_container: !container_name.is_empty(),
            container_name,
        }
    }

    /// Extracts the blueprint back out of a tree.
    pub fn to_object_layout(&self) -> ObjectLayout {
        self.root.to_layout()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.root_type_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn from_container(&self) -> bool {
        self.from_container
    }

    pub fn is_record(&self) -> bool {
        self.root.is_record()
    }

    pub fn verify(&self, verbose: bool) -> bool {
        self.root.verify(None, None, verbose)
    }

    pub fn find_node_with_type_name(&self, type_name: &str) -> Result<&Node> {
        self.root.find_node_with_type_name(type_name).ok_or_else(|| {
            Error::NotFound(format!("merge node not found with type name: {type_name}"))
        })
    }

    /// Records one access of `count` events at `offset_bytes`. Offsets past
    /// the covered range wrap around, for bulk allocations that loop over the
    /// same type.
    pub fn record_access(&mut self, offset_bytes: i64, count: u64, kind: AccessKind) -> bool {
        let full = self.root.full_size_bytes();
        let offset = if full > 0 && offset_bytes >= full { offset_bytes % full } else { offset_bytes };
        self.root
            .record_access(offset, count, DEFAULT_ACCESS_GRANULARITY as i64, kind, &[0])
    }

    /// Sums an oversized histogram into `ceil(collapsed_size / g)` buckets,
    /// bucket `j` accumulating source buckets `j, j+L, j+2L, …` where `L` is
    /// the collapsed bucket count.
    pub fn collapse_histogram(histogram: &[u64], collapsed_size_bytes: i64) -> Vec<u64> {
        let granularity = DEFAULT_ACCESS_GRANULARITY as i64;
        let new_len = (1 + (collapsed_size_bytes - 1) / granularity) as usize;
        let rounds = histogram.len() / new_len;
        let mut collapsed = vec![0u64; new_len];
        for round in 0..rounds {
            for (j, slot) in collapsed.iter_mut().enumerate() {
                *slot += histogram[round * new_len + j];
            }
        }
        collapsed
    }

    /// Projects a flat access histogram onto the tree. Histograms covering
    /// less than twice the tree are applied as-is; larger ones are collapsed
    /// first. A length that does not divide evenly reports
    /// `FailedPrecondition` after the counts are applied.
    pub fn record_access_histogram(&mut self, histogram: &[u64], kind: AccessKind) -> Result<()> {
        let granularity = DEFAULT_ACCESS_GRANULARITY as i64;
        let histogram_bytes = histogram.len() as i64 * granularity;
        if histogram_bytes == 0 {
            return Err(Error::InvalidArgument("histogram size is 0".to_string()));
        }
        if DEFAULT_ACCESS_GRANULARITY != 8 {
            return Err(Error::Unimplemented(
                "access granularity must be 8 bytes for now".to_string(),
            ));
        }

        let full = self.root.full_size_bytes();
        let mut collapsed = Vec::new();
        let applied: &[u64] = if histogram_bytes > full && histogram_bytes < 2 * full {
            // Larger than the type but not a bulk allocation; a slight
            // misalignment we record without collapsing.
            histogram
        } else if histogram_bytes > full {
            collapsed = Self::collapse_histogram(histogram, full);
            &collapsed
        } else {
            histogram
        };

        for (i, &count) in applied.iter().enumerate() {
            self.root.record_access(
                i as i64 * granularity,
                count,
                granularity,
                kind,
                &[0],
            );
        }

        if !applied.is_empty() && histogram.len() % applied.len() != 0 {
            return Err(Error::FailedPrecondition(format!(
                "condition failed: histogram_size % new_histogram_size != 0 {} % {} == {}",
                histogram.len(),
                applied.len(),
                histogram.len() % applied.len()
            )));
        }
        Ok(())
    }

    pub fn merge_counts(&mut self, other: &TypeTree) -> Result<()> {
        self.root.merge_counts(&other.root)
    }

    /// Grafts `other` under the leaf of this tree whose type name equals
    /// `other`'s root type name, then recomputes sizes bottom-up and offsets
    /// top-down from the merge point.
    pub fn merge_tree_into_this(&mut self, other: &TypeTree) -> Result<()> {
        let merge_node = self
            .root
            .find_node_with_type_name_mut(other.name())
            .ok_or_else(|| {
                Error::NotFound(format!("merge node not found with type name: {}", other.name()))
            })?;
        if merge_node.num_children() != 0 {
            return Err(Error::InvalidArgument(
                "merging tree into node with children is not supported".to_string(),
            ));
        }
        merge_node.graft_children(&other.root);
        self.root.build_sizes_bottom_up();
        self.root.set_global_offset_bits(0);
        self.root.infer_offsets_from_sizes();
        Ok(())
    }

    pub fn dump(&self, out: &mut dyn Write, level: usize, dump_full_unions: bool) -> std::io::Result<()> {
        let indent = "  ".repeat(level);
        write!(out, "{indent}container: ")?;
        if self.from_container {
            writeln!(out, "{}", self.container_name)?;
        } else {
            writeln!(out, "<none>")?;
        }
        writeln!(out, "{indent}tree: ")?;
        self.root.dump(out, level + 1, dump_full_unions)
    }

    /// One `;`-delimited stack per leaf, weighted by its access count.
    pub fn dump_flamegraph(&self, out: &mut dyn Write, id: u64) -> std::io::Result<()> {
        let root_name = if id == 0 {
            self.container_name.clone()
        } else {
            format!("{}{id}", self.container_name)
        };
        self.root.dump_flamegraph(out, &[], &root_name)
    }
}

/// A flat leaf-only view of a type tree, keyed by global byte offset. More
/// convenient than the tree itself when eyeballing where the counts landed.
#[derive(Debug)]
pub struct FieldAccessHistogram {
    pub root_type_name: String,
    pub size_bits: i64,
    pub offset_to_idx: HashMap<i64, usize>,
    pub nodes: Vec<Node>,
}

impl FieldAccessHistogram {
    pub fn create(tree: &TypeTree) -> Result<FieldAccessHistogram> {
        if tree.root().size_bits() < 0 {
            return Err(Error::InvalidArgument("type tree has negative size".to_string()));
        }
        let mut histogram = FieldAccessHistogram {
            root_type_name: tree.name().to_string(),
            size_bits: tree.root().size_bits(),
            offset_to_idx: HashMap::new(),
            nodes: Vec::new(),
        };
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(tree.root());
        while let Some(node) = queue.pop_front() {
            if node.num_children() == 0 {
                histogram
                    .offset_to_idx
                    .insert(node.global_offset_bytes(), histogram.nodes.len());
                histogram.nodes.push(node.copy_without_children());
            }
            for child in node.children() {
                queue.push_back(child);
            }
        }
        Ok(histogram)
    }

    pub fn size_bytes(&self) -> i64 {
        self.size_bits / 8
    }

    pub fn dump(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "FieldAccessHistogram: {}", self.root_type_name)?;
        for node in &self.nodes {
            writeln!(out, "{node}")?;
        }
        Ok(())
    }
}
