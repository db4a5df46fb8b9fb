//! Configuration lists for container recognition.
//!
//! Every enumerated prefix here is data, not logic: the resolver scans call
//! stacks and formal parameters against these lists, so supporting another
//! container is an edit here rather than in the strategy code.

/// Internal base classes whose allocator call identifies an STL container
/// allocation anywhere in the stack.
pub const STL_CONTAINER_INTERNAL_TYPES: &[&str] = &[
    "std::_Vector_base",
    "std::__u::_Vector_base",
    "std::_Deque_base",
    "std::__u::_Deque_base",
    "std::_Rb_tree",
    "std::__u::_Rb_tree",
    "std::__u::__tree",
    "std::__tree",
    "std::__detail::_Hashtable_alloc",
    "std::__u::__detail::_Hashtable_alloc",
    "std::_Fwd_list_base",
    "std::__u::_Fwd_list_base",
    "std::__cxx11::_List_base",
    "std::__u::__cxx11::list",
    "absl::FixedArray",
    "xalanc_1_10::XalanVector",
];

/// Container front classes checked on the leaf frame only.
pub const STL_CONTAINER_LEAF_TYPES: &[&str] = &[
    "std::vector",
    "std::__u::vector",
    "std::deque",
    "std::__u::deque",
    "std::set",
    "std::__u::set",
    "std::forward_list",
    "std::__u::forward_list",
    "std::__cxx11::list",
    "std::__u::__cxx11::list",
    "std::stack",
    "std::__u::stack",
    "std::queue",
    "std::__u::queue",
    "std::priority_queue",
    "std::__u::priority_queue",
    "std::map",
    "std::__u::map",
    "std::multimap",
    "std::__u::multimap",
    "std::multiset",
    "std::__u::multiset",
    "std::flat_multiset",
    "std::__u::flat_multiset",
    "std::flat_multimap",
    "std::__u::flat_multimap",
    "std::unordered_set",
    "std::__u::unordered_set",
    "std::unordered_map",
    "std::__u::unordered_map",
    "std::unordered_multiset",
    "std::__u::unordered_multiset",
    "std::unordered_multimap",
    "std::__u::unordered_multimap",
];

/// Mangled prefixes of smart-pointer creators.
pub const SMART_POINTER_CREATORS: &[&str] = &[
    "_ZSt11make_unique",
    "_ZSt11make_shared",
    "_ZNSt3__u15allocate_shared",
    "_ZNSt3__u11make_unique",
];

/// LLVM-style ADT containers; the element is the first template parameter.
pub const ADT_CONTAINER_TYPES: &[&str] = &[
    "llvm::SmallVectorTemplateBase<",
    "llvm::PagedVector<",
    "llvm::SmallPtrSetImpl<",
    "llvm::StringMap<",
    "llvm::ImutAVLFactory<",
    "absl::inlined_vector_internal::",
];

/// Dense maps carry their bucket type as the fifth template parameter.
pub const ADT_DENSE_CONTAINER_TYPES: &[&str] = &["llvm::DenseMapBase"];

/// Demangled prefixes of string/Cord implementations; the allocation is a
/// raw character buffer.
pub const CHAR_CONTAINER_LEAF_TYPES: &[&str] = &[
    "std::__cxx11::basic_string",
    "std::basic_string",
    "absl::cord_internal::",
    "std::__u::basic_string",
    "absl::Cord::",
];

/// SwissMap internal bases.
pub const SWISSMAP_INTERNAL_TYPES: &[&str] = &[
    "absl::container_internal::raw_hash_map<",
    "absl::container_internal::raw_hash_set<",
];

/// Policies distinguishing flat from node SwissMap storage.
pub const FLAT_HASH_POLICY_TYPES: &[&str] = &[
    "absl::container_internal::FlatHashMapPolicy",
    "absl::container_internal::FlatHashSetPolicy",
];

pub const BTREE_INTERNAL_TYPES: &[&str] = &["absl::container_internal::btree<"];

/// Demangled prefixes of functions that allocate raw buffers on behalf of the
/// caller; the first formal parameter is the element type.
pub const SPECIAL_ALLOCATING_FUNCTIONS: &[&str] = &[
    "std::get_temporary_buffer",
    "std::__u::get_temporary_buffer",
];

/// Allocator wrappers whose first template argument is the allocated type.
pub const ALLOCATOR_WRAPPERS: &[&str] = &[
    "std::allocator",
    "std::__u::allocator",
    "std::__new_allocator",
    "muppet::instant::PolymorphicAllocator",
    "xalanc_1_10::MemoryManagedConstructionTraits",
];

/// Functions inserted by the profiler runtime; allocations under them are
/// container metadata rather than user data.
pub const MEMPROF_INSERTED_FUNCTIONS: &[&str] = &["__memprof_ctrl_alloc"];

/// Returns the matching prefix, when `s` starts with any element of `list`.
pub fn starts_with_any_of(s: &str, list: &[&'static str]) -> Option<&'static str> {
    list.iter().find(|prefix| s.starts_with(**prefix)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_any_of_returns_matched_prefix() {
        assert_eq!(
            starts_with_any_of("std::vector<int, std::allocator<int> >", STL_CONTAINER_LEAF_TYPES),
            Some("std::vector")
        );
        assert_eq!(starts_with_any_of("boost::intrusive_list<int>", STL_CONTAINER_LEAF_TYPES), None);
    }
}
