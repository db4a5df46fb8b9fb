//! Container resolution strategies.
//!
//! Scanning a call stack leaf-to-root yields a tagged strategy that tells the
//! resolver how to reconstruct the allocated object: which formal parameter
//! or template argument carries the element type, and whether a synthetic
//! backing-node layout has to wrap it.

use crate::dwarf::{CallStack, DwarfIndex};
use crate::error::{Error, Result};
use log::debug;

use super::containers::{
    ADT_CONTAINER_TYPES, ADT_DENSE_CONTAINER_TYPES, ALLOCATOR_WRAPPERS, BTREE_INTERNAL_TYPES,
    CHAR_CONTAINER_LEAF_TYPES, FLAT_HASH_POLICY_TYPES, MEMPROF_INSERTED_FUNCTIONS,
    SMART_POINTER_CREATORS, SPECIAL_ALLOCATING_FUNCTIONS, STL_CONTAINER_INTERNAL_TYPES,
    STL_CONTAINER_LEAF_TYPES, SWISSMAP_INTERNAL_TYPES,
};
use super::{clean_type_name, deref_pointer, unwrap_and_clean_type_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// An allocator wrapper was seen somewhere; unwrap its first argument.
    Default,
    /// A make-unique/make-shared/get-temporary-buffer style function; the
    /// allocated type is its first formal parameter.
    SpecialAllocatingFunction,
    /// A string or Cord implementation; the allocation is raw chars.
    CharContainer,
    /// An STL container internal base; walk the stack for the deepest
    /// allocator parameter.
    AllocatorAllocate,
    /// Same walk, reached from a SwissMap whose type data is unavailable.
    AbslAllocatorAllocate,
    /// An STL container front seen on the leaf frame.
    LeafContainer,
    /// SwissMap with node storage: slots hold pointers to elements.
    SwissMapNodeHash,
    /// SwissMap with flat storage: slots hold the elements inline.
    SwissMapFlatHash,
    /// Abseil btree node allocation.
    Btree,
    /// Profiler-inserted control allocation; metadata, kept as chars.
    MemprofInserted,
    /// LLVM-style ADT container; element is the first template parameter.
    AdtContainer,
    /// Dense map; the bucket type is the fifth template parameter.
    AdtDenseContainer,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Default => "Default",
            StrategyKind::SpecialAllocatingFunction => "SpecialAllocatingFunction",
            StrategyKind::CharContainer => "CharContainer",
            StrategyKind::AllocatorAllocate => "AllocatorAllocate",
            StrategyKind::AbslAllocatorAllocate => "AbslAllocatorAllocate",
            StrategyKind::LeafContainer => "LeafContainer",
            StrategyKind::SwissMapNodeHash => "SwissMapNodeHash",
            StrategyKind::SwissMapFlatHash => "SwissMapFlatHash",
            StrategyKind::Btree => "Btree",
            StrategyKind::MemprofInserted => "MemprofInserted",
            StrategyKind::AdtContainer => "AdtContainer",
            StrategyKind::AdtDenseContainer => "AdtDenseContainer",
        }
    }
}

/// The chosen strategy plus the names the resolver needs to apply it.
#[derive(Debug, Clone)]
pub struct ContainerStrategy {
    /// Name of the container the allocation was made within.
    pub container_name: String,
    /// Mangled name of the critical function in the call stack.
    pub func_name: String,
    /// Container class name to look up, when the strategy needs type data.
    pub lookup_type: String,
    pub kind: StrategyKind,
}

impl ContainerStrategy {
    fn new(
        container_name: impl Into<String>,
        func_name: impl Into<String>,
        kind: StrategyKind,
    ) -> ContainerStrategy {
        ContainerStrategy {
            container_name: container_name.into(),
            func_name: func_name.into(),
            lookup_type: String::new(),
            kind,
        }
    }

    fn with_lookup(mut self, lookup_type: impl Into<String>) -> ContainerStrategy {
        self.lookup_type = lookup_type.into();
        self
    }
}

fn strip_trailing_colons(s: &str) -> &str {
    s.trim_end_matches(':')
}

/// Demangles an Itanium symbol down to its qualified name, without the
/// parameter list. Returns `None` for names that are not mangled.
pub fn demangle_no_params(mangled: &str) -> Option<String> {
    let symbol = cpp_demangle::Symbol::new(mangled.as_bytes()).ok()?;
    let options = cpp_demangle::DemangleOptions::default().no_params();
    symbol.demangle(&options).ok()
}

/// Container metadata allocated through a profiler-inserted control function
/// cannot be attributed to a user type; detect those frames first.
fn memprof_inserted_frame(callstack: &CallStack) -> Option<&str> {
    for frame in callstack {
        for needle in MEMPROF_INSERTED_FUNCTIONS {
            if frame.function_name.contains(needle) {
                return Some(&frame.function_name);
            }
        }
    }
    None
}

/// Scans the call stack leaf-to-root and picks the resolution strategy.
///
/// The per-frame checks run in a fixed order: smart-pointer creators by
/// mangled prefix, then special allocating functions and char containers by
/// demangled prefix, then the formal-parameter prefix lists. An allocator
/// wrapper seen before any specific container match is remembered as the
/// fallthrough default strategy.
pub fn select_strategy(index: &DwarfIndex, callstack: &CallStack) -> Result<ContainerStrategy> {
    if callstack.is_empty() {
        return Err(Error::InvalidArgument("empty callstack".to_string()));
    }

    if let Some(func_name) = memprof_inserted_frame(callstack) {
        return Ok(ContainerStrategy::new(
            "__memprof::abseil_container_internal::raw_hash_set",
            func_name,
            StrategyKind::MemprofInserted,
        ));
    }

    let mut fallthrough: Option<ContainerStrategy> = None;
    let mut has_seen_alloc = false;
    let mut is_leaf = true;

    for frame in callstack {
        let func_name = frame.function_name.as_str();
        if func_name.is_empty() {
            return Err(Error::InvalidArgument("empty function name in callstack".to_string()));
        }

        if let Some(creator) = crate::resolver::containers::starts_with_any_of(
            func_name,
            SMART_POINTER_CREATORS,
        ) {
            return Ok(ContainerStrategy::new(
                creator,
                func_name,
                StrategyKind::SpecialAllocatingFunction,
            ));
        }

        let Ok(formal_params) = index.formal_parameters(func_name) else {
            continue;
        };

        if let Some(demangled) = demangle_no_params(func_name) {
            if let Some(special) = crate::resolver::containers::starts_with_any_of(
                &demangled,
                SPECIAL_ALLOCATING_FUNCTIONS,
            ) {
                return Ok(ContainerStrategy::new(
                    special,
                    func_name,
                    StrategyKind::SpecialAllocatingFunction,
                ));
            }
            if let Some(container) = crate::resolver::containers::starts_with_any_of(
                &demangled,
                CHAR_CONTAINER_LEAF_TYPES,
            ) {
                return Ok(ContainerStrategy::new(
                    strip_trailing_colons(container),
                    func_name,
                    StrategyKind::CharContainer,
                ));
            }
        }

        for formal_param_dirty in formal_params {
            let formal_param = formal_param_dirty
                .strip_prefix("const")
                .unwrap_or(formal_param_dirty)
                .trim_start();

            let mut cleaned_formal_param = formal_param.to_string();
            deref_pointer(&mut cleaned_formal_param);
            clean_type_name(&mut cleaned_formal_param);

            if let Some(wrapper) = crate::resolver::containers::starts_with_any_of(
                formal_param,
                ALLOCATOR_WRAPPERS,
            ) && !has_seen_alloc
            {
                debug!("fallthrough allocator wrapper {wrapper} in {func_name}");
                fallthrough = Some(
                    ContainerStrategy::new("unknown", func_name, StrategyKind::Default)
                        .with_lookup(unwrap_and_clean_type_name(formal_param)),
                );
            }

            if is_leaf
                && let Some(container) = crate::resolver::containers::starts_with_any_of(
                    formal_param,
                    STL_CONTAINER_LEAF_TYPES,
                )
            {
                return Ok(ContainerStrategy::new(
                    container,
                    func_name,
                    StrategyKind::LeafContainer,
                )
                .with_lookup(formal_param));
            }

            if let Some(container) = crate::resolver::containers::starts_with_any_of(
                formal_param,
                STL_CONTAINER_INTERNAL_TYPES,
            ) {
                return Ok(ContainerStrategy::new(
                    container,
                    callstack[0].function_name.as_str(),
                    StrategyKind::AllocatorAllocate,
                ));
            }

            if let Some(container) = crate::resolver::containers::starts_with_any_of(
                formal_param,
                ADT_CONTAINER_TYPES,
            ) {
                return Ok(ContainerStrategy::new(
                    container.trim_end_matches(['<', ':']),
                    func_name,
                    StrategyKind::AdtContainer,
                )
                .with_lookup(cleaned_formal_param));
            }

            if let Some(container) = crate::resolver::containers::starts_with_any_of(
                formal_param,
                ADT_DENSE_CONTAINER_TYPES,
            ) {
                return Ok(ContainerStrategy::new(
                    container,
                    func_name,
                    StrategyKind::AdtDenseContainer,
                )
                .with_lookup(cleaned_formal_param));
            }

            if let Some(container) = crate::resolver::containers::starts_with_any_of(
                formal_param,
                SWISSMAP_INTERNAL_TYPES,
            ) {
                return Ok(classify_swissmap(
                    index,
                    container,
                    formal_param,
                    cleaned_formal_param,
                    func_name,
                    callstack,
                ));
            }

            if let Some(container) = crate::resolver::containers::starts_with_any_of(
                formal_param,
                BTREE_INTERNAL_TYPES,
            ) {
                return Ok(ContainerStrategy::new(
                    container.trim_end_matches('<'),
                    func_name,
                    StrategyKind::Btree,
                )
                .with_lookup(cleaned_formal_param));
            }

            let is_allocator_adjacent = ALLOCATOR_WRAPPERS
                .iter()
                .any(|wrapper| formal_param.starts_with(wrapper))
                || formal_param.starts_with("absl::container_internal::");
            if is_allocator_adjacent {
                has_seen_alloc = true;
            }
        }
        if !formal_params.is_empty() {
            is_leaf = false;
        }
    }

    fallthrough.ok_or_else(|| {
        Error::NotFound(format!(
            "no heap alloc or container resolution strategy found in callstack: {}",
            callstack
                .iter()
                .map(|f| f.function_name.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ))
    })
}

/// SwissMap storage flavor is read off the container's first template
/// parameter: a FlatHash policy stores elements inline, anything else through
/// node pointers. A container whose type data is missing degrades to the
/// allocator walk.
fn classify_swissmap(
    index: &DwarfIndex,
    container: &str,
    formal_param: &str,
    cleaned_formal_param: String,
    func_name: &str,
    callstack: &CallStack,
) -> ContainerStrategy {
    let container_name = container.trim_end_matches('<');
    let Ok(hash_set_type) = index.get_type(formal_param) else {
        return ContainerStrategy::new(
            container_name,
            callstack[0].function_name.as_str(),
            StrategyKind::AbslAllocatorAllocate,
        )
        .with_lookup(cleaned_formal_param);
    };
    let policy = hash_set_type.formal_parameters.first();
    let kind = match policy {
        Some(policy)
            if crate::resolver::containers::starts_with_any_of(policy, FLAT_HASH_POLICY_TYPES)
                .is_some() =>
        {
            StrategyKind::SwissMapFlatHash
        }
        _ => StrategyKind::SwissMapNodeHash,
    };
    ContainerStrategy::new(container_name, func_name, kind).with_lookup(cleaned_formal_param)
}
