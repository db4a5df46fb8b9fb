//! Keyed storage for resolved type trees plus the per-run statistics.
//!
//! The store maps allocation call stacks to their attributed trees. A
//! re-insertion under the same key merges counters pairwise when the root
//! types agree and is an error otherwise; the tree structure under a key
//! never changes after the first insert.

use crate::dwarf::CallStack;
use crate::error::{Error, Result};
use crate::tree::TypeTree;
use indexmap::IndexMap;
use log::info;
use std::io::Write;

/// Whether an insert created a new entry or folded into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Merged,
}

#[derive(Debug, Default)]
pub struct TypeTreeStore {
    trees: IndexMap<CallStack, TypeTree>,
}

impl TypeTreeStore {
    pub fn new() -> TypeTreeStore {
        TypeTreeStore::default()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Inserts `tree` under `callstack`, merging counters into the stored
    /// tree when the key already exists with the same root type.
    pub fn insert(&mut self, callstack: CallStack, tree: TypeTree) -> Result<InsertOutcome> {
        match self.trees.get_mut(&callstack) {
            Some(existing) => {
                if existing.name() != tree.name() {
                    return Err(Error::InvalidArgument(format!(
                        "trying to insert different type trees for the same callstack: {} vs {}",
                        existing.name(),
                        tree.name()
                    )));
                }
                existing.merge_counts(&tree)?;
                Ok(InsertOutcome::Merged)
            }
            None => {
                self.trees.insert(callstack, tree);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    /// Inserts and hands back a reference to the stored tree; valid until the
    /// next insert on the same key.
    pub fn insert_and_get(&mut self, callstack: CallStack, tree: TypeTree) -> Result<&TypeTree> {
        self.insert(callstack.clone(), tree)?;
        Ok(&self.trees[&callstack])
    }

    pub fn get(&self, callstack: &CallStack) -> Result<&TypeTree> {
        self.trees
            .get(callstack)
            .ok_or_else(|| Error::NotFound("type tree not found for callstack".to_string()))
    }

    /// All call stacks whose tree's root type name equals `root_type_name`.
    pub fn callstacks_for_type_name(&self, root_type_name: &str) -> Vec<&CallStack> {
        self.trees
            .iter()
            .filter(|(_, tree)| tree.name() == root_type_name)
            .map(|(callstack, _)| callstack)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CallStack, &TypeTree)> {
        self.trees.iter()
    }

    pub fn dump_callstack(
        callstack: &CallStack,
        out: &mut dyn Write,
        level: usize,
        as_entry: bool,
    ) -> std::io::Result<()> {
        let mut level = level;
        if as_entry {
            writeln!(out, "- entry: ")?;
            level += 2;
        }
        let indent = "  ".repeat(level);
        for frame in callstack {
            writeln!(out, "{indent}- function_name: {}", frame.function_name)?;
            writeln!(out, "{indent}  line_offset: {}", frame.line_offset)?;
            writeln!(out, "{indent}  column: {}", frame.column)?;
        }
        Ok(())
    }

    /// Textual dump of up to `limit` entries; negative means all.
    pub fn dump(&self, out: &mut dyn Write, limit: i64) -> std::io::Result<()> {
        let n = if limit < 0 { self.trees.len() } else { limit as usize };
        for (callstack, tree) in self.trees.iter().take(n) {
            writeln!(out, "- Entry: ")?;
            writeln!(out, "    type_tree: ")?;
            tree.dump(out, 3, false)?;
            writeln!(out, "    callstack: ")?;
            Self::dump_callstack(callstack, out, 3, false)?;
        }
        Ok(())
    }

    /// Flamegraph dump: one stack line per tree leaf, entries numbered from 1
    /// so equal container names stay distinguishable.
    pub fn dump_flamegraph(&self, out: &mut dyn Write, limit: i64) -> std::io::Result<()> {
        let n = if limit < 0 { self.trees.len() } else { limit as usize };
        for (i, (_, tree)) in self.trees.iter().take(n).enumerate() {
            tree.dump_flamegraph(out, i as u64 + 1)?;
        }
        Ok(())
    }
}

/// Per-run counters over allocations and accesses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub total_allocations_count: u64,
    pub total_found_type: u64,
    pub total_verified: u64,
    pub heap_alloc_count: u64,
    pub container_alloc_count: u64,
    pub total_record_count: u64,
    pub total_after_filtering: u64,
    pub duplicate_callstack_count: u64,
    pub total_accesses: u64,
    pub total_accesses_on_heapallocs: u64,
    pub total_accesses_on_containers: u64,
    pub total_accesses_on_records: u64,
}

fn percentify(value: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * (value as f64 / total as f64)
}

impl Statistics {
    pub fn log(&self) {
        let allocs = self.total_allocations_count;
        let accesses = self.total_accesses;
        info!(
            "- \n ====== Statistics ======\n\
             Total allocations count: {}({:.1}%)\n\
             Total found type: {}({:.1}%)\n\
             Total duplicate callstack: {}({:.1}%)\n\
             Total verified: {}({:.1}%)\n\
             Heap alloc count: {}({:.1}%)\n\
             Container alloc count: {}({:.1}%)\n\
             Total record count: {}({:.1}%)\n\
             Total after filtering: {}({:.1}%)\n\
             Total accesses: {}({:.1}%)\n\
             Total accesses on heapallocs: {}({:.1}%)\n\
             Total accesses on containers: {}({:.1}%)\n\
             Total accesses on records: {}({:.1}%)\n\
             ======    End    ======",
            allocs,
            percentify(allocs, allocs),
            self.total_found_type,
            percentify(self.total_found_type, allocs),
            self.duplicate_callstack_count,
            percentify(self.duplicate_callstack_count, allocs),
            self.total_verified,
            percentify(self.total_verified, allocs),
            self.heap_alloc_count,
            percentify(self.heap_alloc_count, allocs),
            self.container_alloc_count,
            percentify(self.container_alloc_count, allocs),
            self.total_record_count,
            percentify(self.total_record_count, allocs),
            self.total_after_filtering,
            percentify(self.total_after_filtering, allocs),
            accesses,
            percentify(accesses, accesses),
            self.total_accesses_on_heapallocs,
            percentify(self.total_accesses_on_heapallocs, accesses),
            self.total_accesses_on_containers,
            percentify(self.total_accesses_on_containers, accesses),
            self.total_accesses_on_records,
            percentify(self.total_accesses_on_records, accesses),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::Frame;
    use crate::tree::{AccessKind, Node, NodeKind, ObjectKind};

    fn simple_tree(type_name: &str) -> TypeTree {
        let mut root = Node::new(
            type_name,
            type_name,
            0,
            64,
            1,
            NodeKind::Record,
            ObjectKind::Field,
            0,
            false,
        );
        root.add_child(Node::new(
            "v",
            "long",
            0,
            64,
            1,
            NodeKind::Builtin,
            ObjectKind::Field,
            0,
            false,
        ));
        TypeTree::new(root, type_name, false, "")
    }

    fn stack(names: &[&str]) -> CallStack {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Frame::new(*name, i as u64, i as u64))
            .collect()
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let mut store = TypeTreeStore::new();
        let callstack = stack(&["foo", "bar", "baz"]);
        assert_eq!(
            store.insert(callstack.clone(), simple_tree("A")).unwrap(),
            InsertOutcome::Inserted
        );
        let tree = store.get(&callstack).unwrap();
        assert_eq!(tree.name(), "A");
        assert!(store.get(&stack(&["nope"])).unwrap_err().is_not_found());
    }

    #[test]
    fn reinsert_same_root_merges_counts() {
        let mut store = TypeTreeStore::new();
        let callstack = stack(&["foo"]);
        let mut tree = simple_tree("A");
        tree.record_access_histogram(&[4], AccessKind::Access).unwrap();
        store.insert(callstack.clone(), tree.clone()).unwrap();
        assert_eq!(
            store.insert(callstack.clone(), tree).unwrap(),
            InsertOutcome::Merged
        );
        assert_eq!(store.get(&callstack).unwrap().root().total_access_count(), 8);
    }

    #[test]
    fn reinsert_different_root_is_an_error() {
        let mut store = TypeTreeStore::new();
        let callstack = stack(&["foo"]);
        store.insert(callstack.clone(), simple_tree("A")).unwrap();
        assert!(matches!(
            store.insert(callstack, simple_tree("B")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn callstacks_are_enumerable_by_root_type() {
        let mut store = TypeTreeStore::new();
        store.insert(stack(&["a"]), simple_tree("A")).unwrap();
        store.insert(stack(&["b"]), simple_tree("A")).unwrap();
        store.insert(stack(&["c"]), simple_tree("B")).unwrap();
        assert_eq!(store.callstacks_for_type_name("A").len(), 2);
        assert_eq!(store.callstacks_for_type_name("B").len(), 1);
        assert!(store.callstacks_for_type_name("C").is_empty());
    }

    #[test]
    fn dump_honors_limit() {
        let mut store = TypeTreeStore::new();
        store.insert(stack(&["a"]), simple_tree("A")).unwrap();
        store.insert(stack(&["b"]), simple_tree("B")).unwrap();

        let mut out = Vec::new();
        store.dump(&mut out, 1).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("- Entry: ").count(), 1);

        let mut out = Vec::new();
        store.dump(&mut out, -1).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("- Entry: ").count(), 2);
        assert!(text.contains("function_name: a"));
    }

    #[test]
    fn flamegraph_numbers_entries() {
        let mut store = TypeTreeStore::new();
        store.insert(stack(&["a"]), simple_tree("A")).unwrap();
        let mut out = Vec::new();
        store.dump_flamegraph(&mut out, -1).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("1_"));
    }
}
