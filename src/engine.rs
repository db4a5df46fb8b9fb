//! The attribution engine: drives profile records through the resolver,
//! projects each site's histogram onto its tree, and collects the trees into
//! a call-stack keyed store.
//!
//! Failures stay per-sample: a site whose type cannot be resolved or whose
//! histogram misbehaves is logged (when verbose) and skipped; only top-level
//! input failures abort the run.

use crate::dwarf::CallStack;
use crate::error::Result;
use crate::profile::ProfileReader;
use crate::resolver::TypeResolver;
use crate::store::{InsertOutcome, Statistics, TypeTreeStore};
use crate::tree::AccessKind;
use log::warn;

pub struct HistogramBuilder<'a> {
    resolver: TypeResolver<'a>,
    /// Prefix include-list over root type names; empty keeps all.
    type_prefix_filter: Vec<String>,
    /// Include-list of mangled function names; empty keeps all stacks.
    callstack_filter: Vec<String>,
    only_records: bool,
    verify_verbose: bool,
    collect_unresolved: bool,
}

/// The engine's output: the keyed trees, the run counters, and the call
/// stacks that failed to resolve (when their collection was requested).
pub struct BuildResults {
    pub store: TypeTreeStore,
    pub stats: Statistics,
    pub unresolved_callstacks: Vec<CallStack>,
}

impl<'a> HistogramBuilder<'a> {
    pub fn new(resolver: TypeResolver<'a>) -> HistogramBuilder<'a> {
        HistogramBuilder {
            resolver,
            type_prefix_filter: Vec::new(),
            callstack_filter: Vec::new(),
            only_records: false,
            verify_verbose: false,
            collect_unresolved: false,
        }
    }

    pub fn with_type_prefix_filter(mut self, filter: Vec<String>) -> Self {
        self.type_prefix_filter = filter;
        self
    }

    pub fn with_callstack_filter(mut self, filter: Vec<String>) -> Self {
        self.callstack_filter = filter;
        self
    }

    pub fn only_records(mut self, value: bool) -> Self {
        self.only_records = value;
        self
    }

    pub fn verify_verbose(mut self, value: bool) -> Self {
        self.verify_verbose = value;
        self
    }

    pub fn collect_unresolved(mut self, value: bool) -> Self {
        self.collect_unresolved = value;
        self
    }

    /// True when the type is excluded by the prefix include-list.
    fn filter_type(&self, type_name: &str) -> bool {
        if self.type_prefix_filter.is_empty() {
            return false;
        }
        !self
            .type_prefix_filter
            .iter()
            .any(|prefix| type_name.starts_with(prefix.as_str()))
    }

    /// True when no frame of the stack matches the include-list.
    fn filter_callstack(&self, callstack: &CallStack) -> bool {
        if self.callstack_filter.is_empty() {
            return false;
        }
        !callstack.iter().any(|frame| {
            self.callstack_filter
                .iter()
                .any(|name| frame.function_name == *name)
        })
    }

    pub fn build(&self, reader: &mut dyn ProfileReader) -> Result<BuildResults> {
        let mut stats = Statistics::default();
        let mut store = TypeTreeStore::new();
        let mut unresolved_callstacks = Vec::new();

        while let Some(record) = reader.next_record()? {
            for site in &record.sites {
                if site.call_stack.is_empty() {
                    warn!("empty callstack for allocation, skipping site");
                    continue;
                }
                if self.filter_callstack(&site.call_stack) {
                    continue;
                }
                stats.total_allocations_count += 1;

                let mut tree = match self
                    .resolver
                    .resolve_from_callstack(&site.call_stack, site.request_size_bytes())
                {
                    Ok(tree) => tree,
                    Err(e) => {
                        if self.verify_verbose {
                            warn!("failed to resolve type from callstack: {e}");
                        }
                        if self.collect_unresolved {
                            unresolved_callstacks.push(site.call_stack.clone());
                        }
                        continue;
                    }
                };
                stats.total_found_type += 1;

                if self.filter_type(tree.name()) {
                    continue;
                }
                stats.total_after_filtering += 1;

                if tree.is_record() {
                    stats.total_record_count += 1;
                }
                if self.only_records && !tree.is_record() {
                    continue;
                }

                if let Err(e) = tree.record_access_histogram(&site.histogram, AccessKind::Access) {
                    if self.verify_verbose {
                        warn!(
                            "histogram does not precisely align with type size, counters may be \
                             distorted for {}: {e}",
                            tree.name()
                        );
                    }
                }

                if tree.verify(self.verify_verbose) {
                    stats.total_verified += 1;
                } else if self.verify_verbose {
                    warn!("verification failed for tree of {}", tree.name());
                }

                let total = tree.root().total_access_count();
                stats.total_accesses += total;
                if tree.from_container() {
                    stats.container_alloc_count += 1;
                    stats.total_accesses_on_containers += total;
                } else {
                    stats.heap_alloc_count += 1;
                    stats.total_accesses_on_heapallocs += total;
                }
                if tree.is_record() {
                    stats.total_accesses_on_records += total;
                }

                // A merge mismatch is fatal to the site, not the run: the
                // caller supplied contradictory data for one key.
                match store.insert(site.call_stack.clone(), tree) {
                    Ok(InsertOutcome::Merged) => stats.duplicate_callstack_count += 1,
                    Ok(InsertOutcome::Inserted) => {}
                    Err(e) => warn!("failed to insert type tree: {e}"),
                }
            }
        }

        Ok(BuildResults {
            store,
            stats,
            unresolved_callstacks,
        })
    }
}
