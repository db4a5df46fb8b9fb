//! Blueprints for container backing nodes.
//!
//! SwissMap backing arrays and btree nodes are single heap blocks mixing
//! bookkeeping metadata with user slots, and DWARF never describes them as
//! types of their own. These builders reconstruct their layout as an
//! [`ObjectLayout`] from the container's constants and the requested
//! allocation size; the resolver then materializes a tree from it and grafts
//! the slot-type tree into the `slots`/`values` leaf.

use crate::error::{Error, Result};
use crate::tree::{LayoutProperties, NodeKind, ObjectKind, ObjectLayout};

fn round_up_to(number: i64, multiple: i64) -> i64 {
    (number + multiple - 1) / multiple * multiple
}

fn leaf(name: &str, type_name: &str, size_bits: i64, type_kind: NodeKind) -> ObjectLayout {
    ObjectLayout {
        properties: LayoutProperties {
            name: name.to_string(),
            type_name: type_name.to_string(),
            offset_bits: 0,
            size_bits,
            multiplicity: 1,
            type_kind,
            kind: ObjectKind::Field,
        },
        subobjects: Vec::new(),
    }
}

fn padding(size_bits: i64) -> ObjectLayout {
    ObjectLayout {
        properties: LayoutProperties {
            name: String::new(),
            type_name: String::new(),
            offset_bits: 0,
            size_bits,
            multiplicity: 1,
            type_kind: NodeKind::Padding,
            kind: ObjectKind::Padding,
        },
        subobjects: Vec::new(),
    }
}

/// An array field: an outer node of deferred size holding one element child
/// with the given multiplicity.
fn array(
    name: &str,
    element_type: &str,
    element_size_bits: i64,
    count: i64,
    element_kind: NodeKind,
) -> ObjectLayout {
    ObjectLayout {
        properties: LayoutProperties {
            name: name.to_string(),
            type_name: format!("{element_type}[{count}]"),
            offset_bits: 0,
            size_bits: 0,
            multiplicity: 1,
            type_kind: NodeKind::Array,
            kind: ObjectKind::Field,
        },
        subobjects: vec![ObjectLayout {
            properties: LayoutProperties {
                name: "[_]".to_string(),
                type_name: element_type.to_string(),
                offset_bits: 0,
                size_bits: element_size_bits,
                multiplicity: count,
                type_kind: element_kind,
                kind: ObjectKind::ArrayElements,
            },
            subobjects: Vec::new(),
        }],
    }
}

fn record_root(type_name: String, subobjects: Vec<ObjectLayout>) -> ObjectLayout {
    ObjectLayout {
        properties: LayoutProperties {
            name: type_name.clone(),
            type_name,
            offset_bits: 0,
            size_bits: 0,
            multiplicity: 1,
            type_kind: NodeKind::Record,
            kind: ObjectKind::Base,
        },
        subobjects,
    }
}

/// Layout of a SwissMap backing array: an optional hashtablez handle, the
/// growth counter, `capacity` control bytes plus the sentinel and the cloned
/// group prefix, padding up to the slot alignment, and the slots themselves.
#[allow(clippy::too_many_arguments)]
pub fn swissmap_backing_array(
    slot_type_name: &str,
    slot_size_bits: i64,
    alignment_bytes: i64,
    size_t_bits: i64,
    group_width: i64,
    request_bits: i64,
    hashtablez_handle_bits: Option<i64>,
) -> Result<ObjectLayout> {
    if slot_size_bits <= 0 {
        return Err(Error::InvalidArgument(format!(
            "slot size must be positive, got {slot_size_bits}"
        )));
    }
    let capacity = (request_bits - (group_width - 1) * 8 - size_t_bits) / (slot_size_bits + 8);
    if capacity <= 0 {
        return Err(Error::InvalidArgument(format!(
            "allocation of {request_bits} bits leaves no room for slots of {slot_size_bits} bits"
        )));
    }
    let metadata_bits = hashtablez_handle_bits.unwrap_or(0)
        + size_t_bits
        + (capacity + group_width) * 8;
    let metadata_plus_padding = round_up_to(metadata_bits, alignment_bytes * 8);
    let padding_bits = metadata_plus_padding - metadata_bits;

    let mut subobjects = Vec::new();
    if let Some(handle_bits) = hashtablez_handle_bits {
        subobjects.push(leaf("infoz_", "HashtablezInfoHandle", handle_bits, NodeKind::Builtin));
    }
    subobjects.push(leaf("growth_left", "size_t", size_t_bits, NodeKind::Builtin));
    subobjects.push(array("ctrl", "ctrl_t", 8, capacity, NodeKind::Builtin));
    subobjects.push(leaf("sentinel", "ctrl_t", 8, NodeKind::Array));
    subobjects.push(array("clones", "ctrl_t", 8, group_width - 1, NodeKind::Builtin));
    if padding_bits > 0 {
        subobjects.push(padding(padding_bits));
    }
    subobjects.push(array("slots", slot_type_name, slot_size_bits, capacity, NodeKind::Record));

    Ok(record_root(
        format!("absl::container_internal::raw_hash_set::BackingArray<{slot_type_name}>"),
        subobjects,
    ))
}

/// Layout of a btree node: the parent pointer, the optional generation
/// counter, four count fields, padding up to the alignment, the value slots,
/// and for internal nodes the child-pointer array. Whether the node is a leaf
/// is inferred from which slot count divides the variable area evenly.
#[allow(clippy::too_many_arguments)]
pub fn btree_node(
    slot_type_name: &str,
    slot_size_bits: i64,
    alignment_bytes: i64,
    field_type_bits: i64,
    k_node_slots: i64,
    pointer_bits: i64,
    request_bits: i64,
    enable_generations: bool,
) -> Result<ObjectLayout> {
    if slot_size_bits <= 0 {
        return Err(Error::InvalidArgument(format!(
            "slot size must be positive, got {slot_size_bits}"
        )));
    }
    let static_bits = pointer_bits + field_type_bits * 4 + if enable_generations { 32 } else { 0 };
    let static_bits_aligned = round_up_to(static_bits, alignment_bytes * 8);
    let padding_bits = static_bits_aligned - static_bits;
    let variable_bits = request_bits - static_bits_aligned;
    let children_bits = (k_node_slots + 1) * pointer_bits;

    let internal_slots = (variable_bits - children_bits) / slot_size_bits;
    let leaf_slots = variable_bits / slot_size_bits;
    let (slot_count, is_leaf) = if (variable_bits - children_bits) % slot_size_bits == 0
        && internal_slots > 0
    {
        (internal_slots, false)
    } else if variable_bits % slot_size_bits == 0 && leaf_slots > 0 {
        (leaf_slots, true)
    } else {
        return Err(Error::InvalidArgument(
            "size mismatch in creating btree node template, slots do not fit into type".to_string(),
        ));
    };

    let mut subobjects = vec![leaf("parent", "btree_node *", pointer_bits, NodeKind::Builtin)];
    if enable_generations {
        subobjects.push(leaf("generation", "uint32_t", 32, NodeKind::Builtin));
    }
    for name in ["position", "start", "finish", "max_count"] {
        subobjects.push(leaf(name, "node_count_type", field_type_bits, NodeKind::Builtin));
    }
    if padding_bits > 0 {
        subobjects.push(padding(padding_bits));
    }
    subobjects.push(array("values", slot_type_name, slot_size_bits, slot_count, NodeKind::Record));
    if !is_leaf {
        subobjects.push(array(
            "children",
            "btree_node *",
            pointer_bits,
            k_node_slots + 1,
            NodeKind::Builtin,
        ));
    }

    Ok(record_root(
        format!("absl::container_internal::btree_node<{slot_type_name}>"),
        subobjects,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_bits(layout: &ObjectLayout) -> i64 {
        let own = layout.properties.size_bits * layout.properties.multiplicity;
        if layout.subobjects.is_empty() || own > 0 {
            return own;
        }
        layout.subobjects.iter().map(total_bits).sum()
    }

    #[test]
    fn swissmap_capacity_follows_request_size() {
        // 128 bytes with 2-byte slots: (128 - 15 - 8) / 3 = 35 slots.
        let layout =
            swissmap_backing_array("Slot", 16, 8, 64, 16, 128 * 8, None).unwrap();
        let slots = layout.subobjects.last().unwrap();
        assert_eq!(slots.subobjects[0].properties.multiplicity, 35);
        assert_eq!(slots.properties.type_name, "Slot[35]");
    }

    #[test]
    fn swissmap_layout_can_reconstruct_request_exactly() {
        // 8 slots of 8 bytes: metadata 8 + 8 + 1 + 15 = 32 bytes, already
        // aligned, plus 64 slot bytes gives the 96-byte request back.
        let layout = swissmap_backing_array("Slot", 64, 8, 64, 16, 96 * 8, None).unwrap();
        assert_eq!(total_bits(&layout), 96 * 8);
        let names: Vec<&str> = layout
            .subobjects
            .iter()
            .map(|s| s.properties.name.as_str())
            .collect();
        assert_eq!(names, ["growth_left", "ctrl", "sentinel", "clones", "slots"]);
    }

    #[test]
    fn swissmap_rejects_undersized_requests() {
        assert!(swissmap_backing_array("Slot", 64, 8, 64, 16, 64, None).is_err());
    }

    #[test]
    fn btree_leaf_node_slot_count() {
        // Static prefix 16 bytes; 6 slots of 16 bytes fill a 112-byte leaf.
        let layout = btree_node("Slot", 128, 8, 16, 6, 64, 112 * 8, false).unwrap();
        let values = layout
            .subobjects
            .iter()
            .find(|s| s.properties.name == "values")
            .unwrap();
        assert_eq!(values.subobjects[0].properties.multiplicity, 6);
        assert!(layout.subobjects.iter().all(|s| s.properties.name != "children"));
        assert_eq!(total_bits(&layout), 112 * 8);
    }

    #[test]
    fn btree_internal_node_gets_child_pointers() {
        // 16 static + 56 child pointers + 2 slots of 16 bytes = 104 bytes.
        let layout = btree_node("Slot", 128, 8, 16, 6, 64, 104 * 8, false).unwrap();
        let values = layout
            .subobjects
            .iter()
            .find(|s| s.properties.name == "values")
            .unwrap();
        assert_eq!(values.subobjects[0].properties.multiplicity, 2);
        let children = layout
            .subobjects
            .iter()
            .find(|s| s.properties.name == "children")
            .unwrap();
        assert_eq!(children.subobjects[0].properties.multiplicity, 7);
        assert_eq!(total_bits(&layout), 104 * 8);
    }

    #[test]
    fn btree_rejects_sizes_that_fit_no_slot_count() {
        let err = btree_node("Slot", 128, 8, 16, 6, 64, 111 * 8, false).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn btree_generation_field_is_optional() {
        // 113 bytes leaves a variable area neither slot equation divides.
        assert!(btree_node("Slot", 128, 8, 16, 6, 64, 113 * 8, true).is_err());
        let layout = btree_node("Slot", 128, 8, 16, 6, 64, 120 * 8, true).unwrap();
        assert!(layout.subobjects.iter().any(|s| s.properties.name == "generation"));
    }
}
