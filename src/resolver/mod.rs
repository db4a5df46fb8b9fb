//! Turns "what was allocated here, and what does it look like" into a fully
//! populated [`TypeTree`].
//!
//! Resolution runs from a type name, a single frame (producer heap-allocation
//! tags), or a whole call stack. The call-stack path first tries the frame
//! lookup on every frame, then falls back to a container strategy scan; the
//! resulting tree is padded, offset-indexed, and for Abseil containers
//! stitched together with a synthetic backing-node layout.

pub mod blueprint;
pub mod containers;
pub mod strategy;

use crate::dwarf::{
    CallStack, DwarfIndex, FieldInfo, Frame, TypeInfo, consume_angle_bracket,
};
use crate::error::{Error, Result};
use crate::tree::{Node, TypeTree};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

use containers::{ALLOCATOR_WRAPPERS, starts_with_any_of};
use strategy::{ContainerStrategy, StrategyKind, select_strategy};

/// SwissMap constants the debug info does not reliably expose.
const SWISSMAP_ALIGNMENT_BYTES: i64 = 8;
const SWISSMAP_GROUP_WIDTH: i64 = 16;
const SWISSMAP_SIZE_T_BITS: i64 = 64;

static ARRAY_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]$").unwrap());

/// A type name shaped like a pointer, reference, or function: all take one
/// pointer of storage.
pub fn is_indirection(type_name: &str) -> bool {
    type_name.ends_with('*')
        || type_name.ends_with('&')
        || type_name.ends_with("()")
        || type_name.ends_with(")>")
}

pub fn array_multiplicity(type_name: &str) -> i64 {
    ARRAY_SUFFIX_RE
        .captures(type_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

pub fn array_child_type_name(type_name: &str) -> String {
    ARRAY_SUFFIX_RE.replace(type_name, "").into_owned()
}

/// Removes exactly one trailing ` *` from a pointer parameter.
pub fn deref_pointer(type_name: &mut String) {
    if let Some(stripped) = type_name.strip_suffix(" *") {
        *type_name = stripped.to_string();
    }
}

/// Normalizes a type name for lookup: `A *` becomes `A*`, and a leading
/// `const` goes away. DWARF type names do not reliably carry const, so it
/// only hurts resolution.
pub fn clean_type_name(type_name: &mut String) {
    if let Some(stripped) = type_name.strip_suffix(" *") {
        *type_name = format!("{stripped}*");
    }
    *type_name = type_name
        .strip_prefix("const")
        .unwrap_or(type_name)
        .trim_start()
        .to_string();
}

/// Unwraps the outermost template argument and cleans it. Trailing
/// `, false`/`, true` tails are polymorphic-allocator artifacts.
pub fn unwrap_and_clean_type_name(type_name: &str) -> String {
    let mut alloc_type = consume_angle_bracket(type_name);
    clean_type_name(&mut alloc_type);
    if let Some(stripped) = alloc_type.strip_suffix(", false") {
        alloc_type = stripped.to_string();
    } else if let Some(stripped) = alloc_type.strip_suffix(", true") {
        alloc_type = stripped.to_string();
    }
    alloc_type
}

pub fn wrap_type(outer: &str, inner: &str) -> String {
    if inner.ends_with('>') {
        format!("{outer}<{inner} >")
    } else {
        format!("{outer}<{inner}>")
    }
}

/// Context carried down the recursive tree build: the node under
/// construction plus what it needs to know about the already-built parent.
struct BuildCtx<'f> {
    type_name: String,
    field_name: String,
    field_index: usize,
    field_offset_bits: i64,
    multiplicity: i64,
    parent_global_offset: i64,
    parent_size_bits: i64,
    /// Byte offsets of the parent's resolved fields; used to infer the size
    /// of fields whose type the debug info is missing.
    resolved_offsets: &'f [i64],
}

/// Resolves type trees against a fetched debug index. The index stays
/// read-only; repeated lookups go through a per-fetch memo.
pub struct TypeResolver<'a> {
    index: &'a DwarfIndex,
    /// In-process profiles split container metadata from element storage, so
    /// synthetic backing layouts are skipped and the slot tree returned bare.
    is_local: bool,
    cache: RefCell<HashMap<String, &'a TypeInfo>>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(index: &'a DwarfIndex, is_local: bool) -> TypeResolver<'a> {
        TypeResolver {
            index,
            is_local,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &'a DwarfIndex {
        self.index
    }

    fn cached_type(&self, type_name: &str) -> Result<&'a TypeInfo> {
        if let Some(&found) = self.cache.borrow().get(type_name) {
            return Ok(found);
        }
        let found = self.index.get_type(type_name)?;
        self.cache
            .borrow_mut()
            .insert(type_name.to_string(), found);
        Ok(found)
    }

    pub fn resolve_from_type_name(&self, type_name: &str) -> Result<TypeTree> {
        self.create_tree_from_dwarf(type_name, false, "")
    }

    /// Resolves the allocation at one frame through the producer's
    /// heap-allocation tags. A miss retries with column 0, since emitters
    /// often drop columns.
    pub fn resolve_from_frame(&self, frame: &Frame) -> Result<TypeTree> {
        let type_name = match self.index.heapalloc_type(frame) {
            Ok(name) => name.to_string(),
            Err(_) => {
                let mut without_column = frame.clone();
                without_column.column = 0;
                self.index.heapalloc_type(&without_column)?.to_string()
            }
        };
        self.create_tree_from_dwarf(&type_name, false, "")
    }

    /// Full call-stack resolution: the tagged-frame fast path first, then the
    /// container strategy scan.
    pub fn resolve_from_callstack(
        &self,
        callstack: &CallStack,
        request_size_bytes: i64,
    ) -> Result<TypeTree> {
        if callstack.is_empty() {
            return Err(Error::InvalidArgument("callstack is empty".to_string()));
        }
        for frame in callstack {
            if let Ok(tree) = self.resolve_from_frame(frame) {
                return Ok(tree);
            }
        }
        let resolution_strategy = select_strategy(self.index, callstack)?;
        self.resolve_from_strategy(&resolution_strategy, callstack, request_size_bytes)
    }

    pub fn create_tree_from_dwarf(
        &self,
        type_name: &str,
        from_container: bool,
        container_name: &str,
    ) -> Result<TypeTree> {
        let root = self.build_tree(type_name)?;
        Ok(TypeTree::new(root, type_name, from_container, container_name))
    }

    fn build_tree(&self, type_name: &str) -> Result<Node> {
        if is_indirection(type_name) {
            return Ok(Node::pointer(
                type_name,
                type_name,
                0,
                1,
                self.index.pointer_size * 8,
                0,
            ));
        }
        let type_info = self.cached_type(type_name)?;
        let mut root = Node::root_from_type_info(type_name, type_info);
        let resolved_fields = self.resolve_field_conflicts(type_info)?;
        let resolved_offsets: Vec<i64> = resolved_fields.iter().map(|f| f.offset).collect();
        for (field_index, field) in resolved_fields.iter().enumerate() {
            let child = self.build_tree_recursive(BuildCtx {
                type_name: field.type_name.clone(),
                field_name: field.name.clone(),
                field_index,
                field_offset_bits: field.offset * 8,
                multiplicity: 1,
                parent_global_offset: root.global_offset_bits(),
                parent_size_bits: root.size_bits(),
                resolved_offsets: &resolved_offsets,
            });
            root.add_child_with_padding(child, field_index, &resolved_offsets);
        }
        Ok(root)
    }

    fn build_tree_recursive(&self, ctx: BuildCtx<'_>) -> Node {
        // Indirections never descend into the pointee; they take one pointer
        // of storage in the enclosing object.
        if is_indirection(&ctx.type_name) {
            return Node::pointer(
                &ctx.field_name,
                &ctx.type_name,
                ctx.field_offset_bits,
                ctx.multiplicity,
                self.index.pointer_size * 8,
                ctx.parent_global_offset,
            );
        }

        let child_multiplicity = array_multiplicity(&ctx.type_name);
        if child_multiplicity > 1 {
            // An array node has exactly one child, the element, carrying the
            // element count as its multiplicity. The array size is only known
            // once the element subtree has resolved.
            let mut array_node = Node::array(
                &ctx.field_name,
                &ctx.type_name,
                -1,
                ctx.field_offset_bits,
                ctx.multiplicity,
                ctx.parent_global_offset,
            );
            let subtree = self.build_tree_recursive(BuildCtx {
                type_name: array_child_type_name(&ctx.type_name),
                field_name: "[_]".to_string(),
                field_index: 0,
                field_offset_bits: 0,
                multiplicity: child_multiplicity,
                parent_global_offset: array_node.global_offset_bits(),
                parent_size_bits: array_node.size_bits(),
                resolved_offsets: &[],
            });
            array_node.set_size_bits(subtree.size_bits() * subtree.multiplicity());
            array_node.add_child_with_padding(subtree, 0, &[]);
            return array_node;
        }

        let Ok(type_info) = self.cached_type(&ctx.type_name) else {
            // Missing debug info: infer the size from the gap up to the next
            // resolved field, or up to the parent's end if this is the last.
            let inferred_size = if ctx.resolved_offsets.is_empty() {
                ctx.parent_size_bits
            } else if ctx.field_index >= ctx.resolved_offsets.len() - 1 {
                ctx.parent_size_bits - ctx.resolved_offsets[ctx.field_index] * 8
            } else {
                (ctx.resolved_offsets[ctx.field_index + 1]
                    - ctx.resolved_offsets[ctx.field_index])
                    * 8
            };
            return Node::unresolved(
                &ctx.field_name,
                &ctx.type_name,
                ctx.field_offset_bits,
                ctx.multiplicity,
                inferred_size,
                ctx.parent_global_offset,
            );
        };

        let mut node = Node::from_type_info(
            &ctx.field_name,
            &ctx.type_name,
            ctx.field_offset_bits,
            ctx.multiplicity,
            type_info,
            ctx.parent_global_offset,
        );

        let resolved_fields = match self.resolve_field_conflicts(type_info) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("field conflict resolution failed for {}: {e}", ctx.type_name);
                return node;
            }
        };
        if resolved_fields.is_empty() {
            return node;
        }
        let resolved_offsets: Vec<i64> = resolved_fields.iter().map(|f| f.offset).collect();
        for (field_index, field) in resolved_fields.iter().enumerate() {
            let subtree = self.build_tree_recursive(BuildCtx {
                type_name: field.type_name.clone(),
                field_name: field.name.clone(),
                field_index,
                field_offset_bits: field.offset * 8,
                multiplicity: 1,
                parent_global_offset: node.global_offset_bits(),
                parent_size_bits: node.size_bits(),
                resolved_offsets: &resolved_offsets,
            });
            node.add_child_with_padding(subtree, field_index, &resolved_offsets);
        }
        node
    }

    /// Picks one field per offset when several share it (pair layouts,
    /// inherited bases). Unions keep every field; that is the one place
    /// conflicts are legal.
    ///
    /// The cascade: larger type size, then more sub-fields, then the field
    /// not tagged inherited, then the name without a `_` prefix, then the
    /// first seen with a warning.
    fn resolve_field_conflicts(&self, type_info: &'a TypeInfo) -> Result<Vec<&'a FieldInfo>> {
        if type_info.kind == crate::dwarf::TypeKind::Union {
            return Ok(type_info.fields.iter().collect());
        }

        let mut resolved_fields: Vec<&'a FieldInfo> = Vec::new();
        for (offset, indices) in &type_info.offset_index {
            if indices.len() == 1 {
                resolved_fields.push(&type_info.fields[*indices.iter().next().unwrap()]);
                continue;
            }

            let mut best: Option<(&'a FieldInfo, &'a TypeInfo)> = None;
            for &idx in indices {
                let field = &type_info.fields[idx];
                let Ok(field_type) = self.index.get_type(&field.type_name) else {
                    continue;
                };
                let Some((best_field, best_type)) = best else {
                    best = Some((field, field_type));
                    continue;
                };
                if best_type.size != field_type.size {
                    if best_type.size < field_type.size {
                        best = Some((field, field_type));
                    }
                } else if best_type.fields.len() != field_type.fields.len() {
                    if best_type.fields.len() < field_type.fields.len() {
                        best = Some((field, field_type));
                    }
                } else if best_field.inherited != field.inherited {
                    if best_field.inherited {
                        best = Some((field, field_type));
                    }
                } else if best_field.name.starts_with('_') && !field.name.starts_with('_') {
                    best = Some((field, field_type));
                } else if !best_field.name.starts_with('_') && !field.name.starts_with('_') {
                    warn!(
                        "multiple fields with same size, field count and tags at offset {offset} \
                         of {}: {} vs {}",
                        type_info.name, best_field.type_name, field.type_name
                    );
                }
            }

            match best {
                Some((field, _)) => resolved_fields.push(field),
                // A conflicted offset with no resolvable candidate poisons
                // the whole layout; callers treat the type as opaque.
                None => return Ok(Vec::new()),
            }
        }

        if resolved_fields.len() != type_info.offset_index.len() {
            return Err(Error::Internal(format!(
                "conflict resolution dropped fields for type {}: {} resolved vs {} offsets",
                type_info.name,
                resolved_fields.len(),
                type_info.offset_index.len()
            )));
        }
        Ok(resolved_fields)
    }

    /// Reads the `Alignment` constant out of the aligned-allocation helper
    /// reachable from the leaf allocator call. Returned in bytes.
    fn alignment_from_allocator_call(&self, function_name: &str) -> Result<i64> {
        let params = self.index.formal_parameters(function_name)?;
        let mut first = params
            .first()
            .cloned()
            .ok_or_else(|| Error::NotFound("no formal parameters found for the allocator call".to_string()))?;
        deref_pointer(&mut first);
        let allocator_type = self.index.get_type(&first)?;
        let mut inner = allocator_type
            .formal_parameters
            .first()
            .cloned()
            .ok_or_else(|| Error::NotFound("no formal parameters found for the allocator call".to_string()))?;
        deref_pointer(&mut inner);
        let inner_type = self.index.get_type(&inner)?;
        inner_type
            .constants
            .get("Alignment")
            .map(|&a| a as i64)
            .ok_or_else(|| {
                Error::NotFound("no constant `Alignment` found in allocator call".to_string())
            })
    }

    /// Applies a selected strategy. The element type is recovered from the
    /// formal parameter or template argument the strategy names, and for
    /// SwissMap/btree wrapped into the synthetic backing layout.
    pub fn resolve_from_strategy(
        &self,
        resolution_strategy: &ContainerStrategy,
        callstack: &CallStack,
        request_size_bytes: i64,
    ) -> Result<TypeTree> {
        let formal_params: Vec<String> = self
            .index
            .formal_parameters(&resolution_strategy.func_name)
            .map(|p| p.to_vec())
            .unwrap_or_default();

        match resolution_strategy.kind {
            StrategyKind::Default => self.create_tree_from_dwarf(
                &resolution_strategy.lookup_type,
                true,
                &resolution_strategy.container_name,
            ),

            StrategyKind::SpecialAllocatingFunction => {
                let mut type_name = formal_params.first().cloned().ok_or_else(|| {
                    Error::NotFound(strategy_error(resolution_strategy, callstack, "no formal parameters"))
                })?;
                clean_type_name(&mut type_name);
                self.create_tree_from_dwarf(&type_name, true, &resolution_strategy.container_name)
            }

            // Char containers and profiler-inserted control allocations both
            // resolve to raw characters.
            StrategyKind::CharContainer | StrategyKind::MemprofInserted => {
                self.create_tree_from_dwarf("char", true, &resolution_strategy.container_name)
            }

            StrategyKind::AllocatorAllocate | StrategyKind::AbslAllocatorAllocate => {
                // Walk from the leaf and take the deepest allocator-like
                // formal parameter.
                for frame in callstack {
                    let Ok(params) = self.index.formal_parameters(&frame.function_name) else {
                        continue;
                    };
                    for param in params {
                        if starts_with_any_of(param, ALLOCATOR_WRAPPERS).is_some() {
                            let type_name = unwrap_and_clean_type_name(param);
                            return self.create_tree_from_dwarf(
                                &type_name,
                                true,
                                &resolution_strategy.container_name,
                            );
                        }
                    }
                }
                Err(Error::NotFound(strategy_error(
                    resolution_strategy,
                    callstack,
                    "there should be a formal param with an allocator type",
                )))
            }

            StrategyKind::LeafContainer => {
                let container_type = self.index.get_type(&resolution_strategy.lookup_type)?;
                for param in &container_type.formal_parameters {
                    if starts_with_any_of(param, ALLOCATOR_WRAPPERS).is_some() {
                        return self.create_tree_from_dwarf(
                            &unwrap_and_clean_type_name(param),
                            true,
                            &resolution_strategy.container_name,
                        );
                    }
                }
                Err(Error::NotFound(strategy_error(
                    resolution_strategy,
                    callstack,
                    "no allocator parameter found on the container class",
                )))
            }

            StrategyKind::AdtContainer => {
                let type_info = self.index.get_type(&resolution_strategy.lookup_type)?;
                let element = type_info.formal_parameters.first().ok_or_else(|| {
                    Error::NotFound(strategy_error(
                        resolution_strategy,
                        callstack,
                        "no formal parameters found for the container class",
                    ))
                })?;
                self.create_tree_from_dwarf(element, true, &resolution_strategy.container_name)
            }

            StrategyKind::AdtDenseContainer => {
                let type_info = self.index.get_type(&resolution_strategy.lookup_type)?;
                let element = type_info.formal_parameters.get(4).ok_or_else(|| {
                    Error::NotFound(strategy_error(resolution_strategy, callstack, ""))
                })?;
                self.create_tree_from_dwarf(element, true, &resolution_strategy.container_name)
            }

            StrategyKind::SwissMapFlatHash | StrategyKind::SwissMapNodeHash => self
                .resolve_swissmap(
                    resolution_strategy,
                    callstack,
                    request_size_bytes,
                    resolution_strategy.kind == StrategyKind::SwissMapNodeHash,
                ),

            StrategyKind::Btree => {
                self.resolve_btree(resolution_strategy, callstack, request_size_bytes)
            }
        }
    }

    /// SwissMap resolution: find the allocator template argument of the hash
    /// set, build the slot tree (a pointer for node storage), and for raw
    /// profiles wrap it into the synthesized backing array sized to the
    /// request.
    fn resolve_swissmap(
        &self,
        resolution_strategy: &ContainerStrategy,
        callstack: &CallStack,
        request_size_bytes: i64,
        node_hash: bool,
    ) -> Result<TypeTree> {
        let type_info = self.index.get_type(&resolution_strategy.lookup_type)?;
        for param in &type_info.formal_parameters {
            if starts_with_any_of(param, ALLOCATOR_WRAPPERS).is_none() {
                continue;
            }
            let mut type_name = unwrap_and_clean_type_name(param);
            if node_hash {
                type_name.push('*');
            }
            let slot_tree = self.create_tree_from_dwarf(
                &type_name,
                true,
                &resolution_strategy.container_name,
            )?;

            // In-process profiles isolate metadata from element storage; the
            // slot tree alone is the allocation.
            if self.is_local {
                return Ok(slot_tree);
            }

            let layout = blueprint::swissmap_backing_array(
                slot_tree.name(),
                slot_tree.root().full_size_bits(),
                SWISSMAP_ALIGNMENT_BYTES,
                SWISSMAP_SIZE_T_BITS,
                SWISSMAP_GROUP_WIDTH,
                request_size_bytes * 8,
                None,
            )?;
            let mut outer_tree = TypeTree::from_object_layout(
                &layout,
                wrap_type("absl::container_internal::raw_hash_set", slot_tree.name()),
                "absl::container_internal::raw_hash_set",
            );
            outer_tree.merge_tree_into_this(&slot_tree)?;
            if request_size_bytes != outer_tree.root().full_size_bytes() {
                return Err(Error::Internal(strategy_error(
                    resolution_strategy,
                    callstack,
                    &format!(
                        "raw hash set backing array does not match allocation size: \
                         request_size: {request_size_bytes} tree size: {}",
                        outer_tree.root().full_size_bytes()
                    ),
                )));
            }
            return Ok(outer_tree);
        }
        Err(Error::NotFound(strategy_error(
            resolution_strategy,
            callstack,
            &format!("type name: {}", type_info.name),
        )))
    }

    /// Btree resolution: pull `kNodeSlots` and the count-field width out of
    /// the container's type data, build the slot tree from the allocator
    /// argument of `set_params`/`map_params`, and wrap it into the
    /// synthesized node layout.
    fn resolve_btree(
        &self,
        resolution_strategy: &ContainerStrategy,
        callstack: &CallStack,
        request_size_bytes: i64,
    ) -> Result<TypeTree> {
        let alignment_bytes =
            self.alignment_from_allocator_call(&callstack[0].function_name)?;
        let type_info = self.index.get_type(&resolution_strategy.lookup_type)?;
        for param in &type_info.formal_parameters {
            if !param.starts_with("absl::container_internal::set_params<")
                && !param.starts_with("absl::container_internal::map_params<")
            {
                continue;
            }
            let params_type = self.index.get_type(param)?;

            let generation_enabled = self
                .index
                .get_type("absl::container_internal::btree_iterator_generation_info_enabled")
                .is_ok();

            let constant_lookup = wrap_type("absl::container_internal::btree_node", param);
            let constant_type = self.index.get_type(&constant_lookup)?;
            let k_node_slots = *constant_type.constants.get("kNodeSlots").ok_or_else(|| {
                Error::NotFound(strategy_error(
                    resolution_strategy,
                    callstack,
                    "no constant kNodeSlots found",
                ))
            })? as i64;

            let field_type_name = format!(
                "{}::field_type",
                wrap_type("absl::container_internal::btree", param)
            );
            let field_type = self.index.get_type(&field_type_name)?;
            let field_type_bits = field_type.size * 8;

            for set_param in &params_type.formal_parameters {
                if starts_with_any_of(set_param, ALLOCATOR_WRAPPERS).is_none() {
                    continue;
                }
                let slot_tree = self.create_tree_from_dwarf(
                    &unwrap_and_clean_type_name(set_param),
                    true,
                    &resolution_strategy.container_name,
                )?;
                if self.is_local {
                    return Ok(slot_tree);
                }

                let layout = blueprint::btree_node(
                    slot_tree.name(),
                    slot_tree.root().full_size_bits(),
                    alignment_bytes,
                    field_type_bits,
                    k_node_slots,
                    self.index.pointer_size * 8,
                    request_size_bytes * 8,
                    generation_enabled,
                )?;
                let mut node_tree = TypeTree::from_object_layout(
                    &layout,
                    wrap_type("absl::container_internal::btree_node", slot_tree.name()),
                    "absl::container_internal::btree",
                );
                node_tree.merge_tree_into_this(&slot_tree)?;
                if node_tree.root().full_size_bytes() != request_size_bytes {
                    return Err(Error::Internal(strategy_error(
                        resolution_strategy,
                        callstack,
                        &format!(
                            "btree node does not match allocation size: request_size: \
                             {request_size_bytes} tree size: {}",
                            node_tree.root().full_size_bytes()
                        ),
                    )));
                }
                return Ok(node_tree);
            }
        }
        Err(Error::NotFound(strategy_error(resolution_strategy, callstack, "")))
    }
}

fn strategy_error(
    resolution_strategy: &ContainerStrategy,
    callstack: &CallStack,
    extra: &str,
) -> String {
    let mut message = format!(
        "type resolution strategy failed: {} for container: {} with container class name: {} at callstack: ",
        resolution_strategy.kind.as_str(),
        resolution_strategy.container_name,
        resolution_strategy.lookup_type,
    );
    for frame in callstack {
        message.push_str(&format!(
            "{} l:{} c:{}; ",
            frame.function_name, frame.line_offset, frame.column
        ));
    }
    if !extra.is_empty() {
        message.push_str(extra);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::TypeKind;
    use crate::tree::AccessKind;

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

    /// An index with the primitive types plus A { long x; long y; } and
    /// B { A a; }.
    fn basic_index() -> DwarfIndex {
        let mut index = DwarfIndex {
            pointer_size: 8,
            ..Default::default()
        };
        for (name, size) in [("long", 8), ("int", 4), ("double", 8), ("char", 1)] {
            index.root.types.insert(name.to_string(), base_type(name, size));
        }
        index.root.types.insert(
            "A".to_string(),
            record(
                "A",
                16,
                vec![FieldInfo::new("x", 0, "long"), FieldInfo::new("y", 8, "long")],
            ),
        );
        index.root.types.insert(
            "B".to_string(),
            record("B", 16, vec![FieldInfo::new("a", 0, "A")]),
        );
        index
    }

    #[test]
    fn basic_record_resolves_two_longs() {
        let index = basic_index();
        let resolver = TypeResolver::new(&index, false);
        let tree = resolver.resolve_from_type_name("A").unwrap();
        assert!(tree.verify(true));
        assert_eq!(tree.root().type_name(), "A");
        assert_eq!(tree.root().size_bytes(), 16);
        assert_eq!(tree.root().num_children(), 2);
        assert_eq!(tree.root().child(0).type_name(), "long");
        assert_eq!(tree.root().child(1).offset_bytes(), 8);
        assert!(!tree.from_container());
    }

    #[test]
    fn embedded_record_keeps_global_offsets() {
        let index = basic_index();
        let resolver = TypeResolver::new(&index, false);
        let tree = resolver.resolve_from_type_name("B").unwrap();
        assert!(tree.verify(true));
        assert_eq!(tree.root().num_children(), 1);
        let a = tree.root().child(0);
        assert_eq!(a.type_name(), "A");
        assert_eq!(a.num_children(), 2);
        assert_eq!(a.child(1).global_offset_bytes(), 8);
    }

    #[test]
    fn pointers_and_references_take_pointer_size() {
        let index = basic_index();
        let resolver = TypeResolver::new(&index, false);
        for name in ["A*", "A&", "void (*)()", "std::function<void ()>"] {
            let tree = resolver.resolve_from_type_name(name).unwrap();
            assert!(tree.verify(true), "{name}");
            assert_eq!(tree.root().size_bytes(), 8, "{name}");
            assert_eq!(tree.root().num_children(), 0, "{name}");
        }
    }

    #[test]
    fn padding_is_inserted_between_and_after_fields() {
        let mut index = basic_index();
        // A2 { int x; /*4*/ long y; }, C { B2 b; /*4*/ double x; } with a
        // packed 12-byte B2.
        index.root.types.insert(
            "A2".to_string(),
            record(
                "A2",
                16,
                vec![FieldInfo::new("x", 0, "int"), FieldInfo::new("y", 8, "long")],
            ),
        );
        index.root.types.insert(
            "B2".to_string(),
            record(
                "B2",
                12,
                vec![FieldInfo::new("y", 0, "long"), FieldInfo::new("x", 8, "int")],
            ),
        );
        index.root.types.insert(
            "C".to_string(),
            record(
                "C",
                24,
                vec![FieldInfo::new("b", 0, "B2"), FieldInfo::new("x", 16, "double")],
            ),
        );
        let resolver = TypeResolver::new(&index, false);

        let tree = resolver.resolve_from_type_name("A2").unwrap();
        assert!(tree.verify(true));
        assert_eq!(tree.root().num_children(), 3);
        assert!(tree.root().child(1).is_padding());
        assert_eq!(tree.root().child(1).size_bytes(), 4);

        let tree = resolver.resolve_from_type_name("C").unwrap();
        assert!(tree.verify(true));
        assert_eq!(tree.root().num_children(), 3);
        assert_eq!(tree.root().child(0).size_bytes(), 12);
        assert!(tree.root().child(1).is_padding());
        assert_eq!(tree.root().child(1).size_bytes(), 4);
        assert_eq!(tree.root().child(2).offset_bytes(), 16);
    }

    #[test]
    fn arrays_expand_into_element_nodes() {
        let mut index = basic_index();
        index.root.types.insert(
            "Holder".to_string(),
            record("Holder", 160, vec![FieldInfo::new("items", 0, "A[10]")]),
        );
        let resolver = TypeResolver::new(&index, false);
        let tree = resolver.resolve_from_type_name("Holder").unwrap();
        assert!(tree.verify(true));
        let array = tree.root().child(0);
        assert!(array.is_array());
        assert_eq!(array.size_bytes(), 160);
        assert_eq!(array.num_children(), 1);
        let element = array.child(0);
        assert_eq!(element.multiplicity(), 10);
        assert_eq!(element.type_name(), "A");
        assert_eq!(element.num_children(), 2);
    }

    #[test]
    fn unions_keep_all_members_at_offset_zero() {
        let mut index = basic_index();
        let mut u = TypeInfo::with_kind(TypeKind::Union);
        u.name = "U".to_string();
        u.size = 8;
        u.push_field(FieldInfo::new("as_long", 0, "long"));
        u.push_field(FieldInfo::new("as_double", 0, "double"));
        index.root.types.insert("U".to_string(), u);
        index.root.types.insert(
            "X".to_string(),
            record("X", 8, vec![FieldInfo::new("u", 0, "U")]),
        );
        let resolver = TypeResolver::new(&index, false);
        let mut tree = resolver.resolve_from_type_name("X").unwrap();
        let u = tree.root().child(0);
        assert!(u.is_union());
        assert_eq!(u.num_children(), 2);
        assert_eq!(u.child(1).offset_bytes(), 0);

        tree.record_access_histogram(&[3], AccessKind::Access).unwrap();
        assert!(tree.verify(true));
    }

    #[test]
    fn offset_conflicts_resolve_to_larger_type() {
        let mut index = basic_index();
        index
            .root
            .types
            .insert("Empty".to_string(), base_type("Empty", 1));
        index.root.types.insert(
            "P".to_string(),
            record(
                "P",
                16,
                vec![
                    FieldInfo::new("first", 0, "A"),
                    FieldInfo::new("_comp", 0, "Empty"),
                ],
            ),
        );
        let resolver = TypeResolver::new(&index, false);
        let tree = resolver.resolve_from_type_name("P").unwrap();
        assert!(tree.verify(true));
        assert_eq!(tree.root().num_children(), 1);
        assert_eq!(tree.root().child(0).type_name(), "A");
    }

    #[test]
    fn missing_field_types_get_inferred_sizes() {
        let mut index = basic_index();
        index.root.types.insert(
            "Gappy".to_string(),
            record(
                "Gappy",
                24,
                vec![
                    FieldInfo::new("m", 0, "Mystery"),
                    FieldInfo::new("y", 16, "long"),
                ],
            ),
        );
        let resolver = TypeResolver::new(&index, false);
        let tree = resolver.resolve_from_type_name("Gappy").unwrap();
        assert!(tree.verify(true));
        let mystery = tree.root().child(0);
        assert!(mystery.is_unresolved());
        assert_eq!(mystery.size_bytes(), 16);
    }

    #[test]
    fn frame_resolution_falls_back_to_column_zero() {
        let mut index = basic_index();
        index
            .heapalloc_sites
            .insert(Frame::new("foo", 12, 0), "A".to_string());
        let resolver = TypeResolver::new(&index, false);

        let tree = resolver.resolve_from_frame(&Frame::new("foo", 12, 7)).unwrap();
        assert_eq!(tree.root().type_name(), "A");
        assert!(resolver.resolve_from_frame(&Frame::new("bar", 12, 0)).is_err());
    }

    #[test]
    fn callstack_resolution_prefers_tagged_frames() {
        let mut index = basic_index();
        index
            .heapalloc_sites
            .insert(Frame::new("operator new", 3, 1), "B".to_string());
        let resolver = TypeResolver::new(&index, false);
        let callstack = vec![Frame::new("malloc", 0, 0), Frame::new("operator new", 3, 1)];
        let tree = resolver.resolve_from_callstack(&callstack, 16).unwrap();
        assert_eq!(tree.root().type_name(), "B");
        assert!(!tree.from_container());
    }

    #[test]
    fn vector_of_unique_ptr_resolves_through_leaf_container() {
        let mut index = basic_index();
        let unique_ptr_name = "std::unique_ptr<A, std::default_delete<A> >";
        let vector_name =
            "std::vector<std::unique_ptr<A, std::default_delete<A> >, std::allocator<std::unique_ptr<A, std::default_delete<A> > > >";

        let mut unique_ptr = record(
            "unique_ptr<A, std::default_delete<A> >",
            8,
            vec![FieldInfo::new("_M_t", 0, "A*")],
        );
        unique_ptr.kind = TypeKind::Class;
        let mut vector = TypeInfo::with_kind(TypeKind::Class);
        vector.name = vector_name
            .strip_prefix("std::")
            .unwrap()
            .to_string();
        vector.formal_parameters = vec![
            unique_ptr_name.to_string(),
            format!("std::allocator<{unique_ptr_name} >"),
        ];
        let mut std_ns = TypeInfo::with_kind(TypeKind::Namespace);
        std_ns.name = "std".to_string();
        std_ns.types.insert(unique_ptr.name.clone(), unique_ptr);
        std_ns.types.insert(vector.name.clone(), vector);
        index.root.types.insert("std".to_string(), std_ns);
        index
            .formal_param_map
            .insert("_Zalloc".to_string(), vec![vector_name.to_string()]);

        let resolver = TypeResolver::new(&index, false);
        let callstack = vec![Frame::new("_Zalloc", 1, 1)];
        let tree = resolver.resolve_from_callstack(&callstack, 8).unwrap();
        assert!(tree.from_container());
        assert_eq!(tree.container_name(), "std::vector");
        assert_eq!(tree.root().type_name(), unique_ptr_name);
        assert_eq!(tree.root().size_bytes(), 8);
        assert_eq!(tree.root().child(0).size_bytes(), 8);
    }

    fn swissmap_index() -> DwarfIndex {
        let mut index = basic_index();
        let raw_hash_set_name =
            "raw_hash_set<absl::container_internal::FlatHashSetPolicy<A>, H, E, std::allocator<A> >";
        let mut raw_hash_set = TypeInfo::with_kind(TypeKind::Class);
        raw_hash_set.name = raw_hash_set_name.to_string();
        raw_hash_set.formal_parameters = vec![
            "absl::container_internal::FlatHashSetPolicy<A>".to_string(),
            "H".to_string(),
            "E".to_string(),
            "std::allocator<A>".to_string(),
        ];
        let mut container_internal = TypeInfo::with_kind(TypeKind::Namespace);
        container_internal.name = "container_internal".to_string();
        container_internal
            .types
            .insert(raw_hash_set_name.to_string(), raw_hash_set);
        let mut absl = TypeInfo::with_kind(TypeKind::Namespace);
        absl.name = "absl".to_string();
        absl.types
            .insert("container_internal".to_string(), container_internal);
        index.root.types.insert("absl".to_string(), absl);
        index.formal_param_map.insert(
            "_Zraw".to_string(),
            vec![format!("absl::container_internal::{raw_hash_set_name}")],
        );
        index
    }

    #[test]
    fn swissmap_local_resolution_returns_bare_slot_tree() {
        let index = swissmap_index();
        let resolver = TypeResolver::new(&index, true);
        let callstack = vec![Frame::new("_Zraw", 1, 1)];
        let tree = resolver.resolve_from_callstack(&callstack, 4096).unwrap();
        assert_eq!(tree.root().type_name(), "A");
        assert!(tree.from_container());
        assert_eq!(tree.container_name(), "absl::container_internal::raw_hash_set");
    }

    #[test]
    fn swissmap_raw_resolution_synthesizes_backing_array() {
        let index = swissmap_index();
        let resolver = TypeResolver::new(&index, false);
        let callstack = vec![Frame::new("_Zraw", 1, 1)];
        // Slot A is 16 bytes: capacity = (128 - 15 - 8) / 17 = 6. The
        // metadata prefix (8 + 6 + 1 + 15 = 30 bytes) pads to 32, and
        // 32 + 6 * 16 = 128 closes the request exactly.
        let tree = resolver.resolve_from_callstack(&callstack, 128).unwrap();
        assert!(tree.verify(true));
        assert!(tree.name().starts_with("absl::container_internal::raw_hash_set<A"));
        assert_eq!(tree.root().full_size_bytes(), 128);
        let slots = tree
            .root()
            .children()
            .iter()
            .find(|c| c.name() == "slots")
            .unwrap();
        let element = slots.child(0);
        assert_eq!(element.multiplicity(), 6);
        // The grafted slot subtree carries A's two longs.
        assert_eq!(element.num_children(), 2);
    }

    #[test]
    fn swissmap_size_mismatch_reports_internal() {
        let index = swissmap_index();
        let resolver = TypeResolver::new(&index, false);
        let callstack = vec![Frame::new("_Zraw", 1, 1)];
        let err = resolver.resolve_from_callstack(&callstack, 130).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    fn btree_index() -> DwarfIndex {
        let mut index = basic_index();
        index
            .root
            .types
            .insert("unsigned short".to_string(), base_type("unsigned short", 2));

        // Alignment chase: leaf allocator call -> helper type -> aligned
        // allocation type carrying the Alignment constant.
        index
            .formal_param_map
            .insert("_Zalloc".to_string(), vec!["AllocHelper".to_string()]);
        let mut helper = TypeInfo::with_kind(TypeKind::Class);
        helper.name = "AllocHelper".to_string();
        helper.formal_parameters = vec!["AlignedAlloc".to_string()];
        index.root.types.insert("AllocHelper".to_string(), helper);
        let mut aligned = TypeInfo::with_kind(TypeKind::Class);
        aligned.name = "AlignedAlloc".to_string();
        aligned.constants.insert("Alignment".to_string(), 8);
        index.root.types.insert("AlignedAlloc".to_string(), aligned);

        let set_params =
            "absl::container_internal::set_params<A, std::less<A>, std::allocator<A>, 256, false>";
        let btree_name = format!("btree<{set_params} >");
        let node_name = format!("btree_node<{set_params} >");

        let mut btree = TypeInfo::with_kind(TypeKind::Class);
        btree.name = btree_name.clone();
        btree.formal_parameters = vec![set_params.to_string()];
        btree
            .typedefs
            .insert("field_type".to_string(), "unsigned short".to_string());

        let mut params = TypeInfo::with_kind(TypeKind::Class);
        params.name = "set_params<A, std::less<A>, std::allocator<A>, 256, false>".to_string();
        params.formal_parameters = vec![
            "A".to_string(),
            "std::less<A>".to_string(),
            "std::allocator<A>".to_string(),
        ];

        let mut node = TypeInfo::with_kind(TypeKind::Class);
        node.name = node_name.clone();
        node.constants.insert("kNodeSlots".to_string(), 6);

        let mut container_internal = TypeInfo::with_kind(TypeKind::Namespace);
        container_internal.name = "container_internal".to_string();
        container_internal.types.insert(btree_name, btree);
        container_internal.types.insert(node_name, node);
        container_internal.types.insert(
            "set_params<A, std::less<A>, std::allocator<A>, 256, false>".to_string(),
            params,
        );
        let mut absl = TypeInfo::with_kind(TypeKind::Namespace);
        absl.name = "absl".to_string();
        absl.types
            .insert("container_internal".to_string(), container_internal);
        index.root.types.insert("absl".to_string(), absl);

        index.formal_param_map.insert(
            "_Zbtree".to_string(),
            vec![format!("absl::container_internal::btree<{set_params} >")],
        );
        index
    }

    #[test]
    fn btree_local_resolution_returns_bare_slot_tree() {
        let index = btree_index();
        let resolver = TypeResolver::new(&index, true);
        let callstack = vec![Frame::new("_Zalloc", 1, 1), Frame::new("_Zbtree", 2, 1)];
        let tree = resolver.resolve_from_callstack(&callstack, 112).unwrap();
        assert_eq!(tree.root().type_name(), "A");
        assert_eq!(tree.container_name(), "absl::container_internal::btree");
    }

    #[test]
    fn btree_raw_resolution_synthesizes_node_layout() {
        let index = btree_index();
        let resolver = TypeResolver::new(&index, false);
        let callstack = vec![Frame::new("_Zalloc", 1, 1), Frame::new("_Zbtree", 2, 1)];
        // Static prefix: pointer + four 2-byte counts = 16 bytes, already
        // aligned; six 16-byte slots make a 112-byte leaf node.
        let tree = resolver.resolve_from_callstack(&callstack, 112).unwrap();
        assert!(tree.verify(true));
        assert!(tree.name().starts_with("absl::container_internal::btree_node<A"));
        assert_eq!(tree.root().full_size_bytes(), 112);
        let values = tree
            .root()
            .children()
            .iter()
            .find(|c| c.name() == "values")
            .unwrap();
        let element = values.child(0);
        assert_eq!(element.multiplicity(), 6);
        assert_eq!(element.num_children(), 2);
        assert!(tree.root().children().iter().all(|c| c.name() != "children"));
    }

    #[test]
    fn unwrap_and_clean_handles_pointers_and_alloc_tails() {
        assert_eq!(unwrap_and_clean_type_name("std::allocator<A>"), "A");
        assert_eq!(
            unwrap_and_clean_type_name("std::allocator<std::pair<const long, A> >"),
            "std::pair<const long, A>"
        );
        assert_eq!(
            unwrap_and_clean_type_name("PolymorphicAllocator<B, false>"),
            "B"
        );
        assert_eq!(unwrap_and_clean_type_name("std::allocator<const A *>"), "A*");
    }

    #[test]
    fn array_suffix_parsing() {
        assert_eq!(array_multiplicity("A[10]"), 10);
        assert_eq!(array_multiplicity("A"), 1);
        assert_eq!(array_multiplicity("A[]"), 1);
        assert_eq!(array_child_type_name("A[10]"), "A");
        assert_eq!(array_child_type_name("std::pair<A, B>[3]"), "std::pair<A, B>");
    }

    #[test]
    fn wrap_type_spaces_nested_closers() {
        assert_eq!(wrap_type("outer", "int"), "outer<int>");
        assert_eq!(wrap_type("outer", "std::pair<A, B>"), "outer<std::pair<A, B> >");
    }
}
