//! Memory effect classification.
//!
//! An [`AliasSet`] names the memory categories an instruction may read
//! (a *load* set) or write (a *store* set). Two memory operations can only
//! interfere when their category bits intersect; [`AliasType`] refines that
//! answer per opcode pair.
//!
//! # Taxonomy
//!
//! Categories are deliberately coarse: object header fields, fixed and
//! dynamic slots, elements, typed-array storage, wasm areas, frame
//! arguments and a few runtime-global cells. `AliasSet::any()` is the union
//! of all of them and is what an instruction reports when it says nothing
//! more precise.

use std::fmt;

bitflags::bitflags! {
    /// Memory categories plus the store discriminator bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AliasFlags: u32 {
        /// Shape, slots pointer, elements pointer, initialized/array length.
        const OBJECT_FIELDS = 1 << 0;
        /// Dense element storage.
        const ELEMENT = 1 << 1;
        /// Typed-array element storage.
        const UNBOXED_ELEMENT = 1 << 2;
        const DYNAMIC_SLOT = 1 << 3;
        const FIXED_SLOT = 1 << 4;
        const DOM_PROPERTY = 1 << 5;
        const WASM_INSTANCE_DATA = 1 << 6;
        const WASM_HEAP = 1 << 7;
        const WASM_HEAP_META = 1 << 8;
        const ARRAY_BUFFER_VIEW_LENGTH_OR_OFFSET = 1 << 9;
        const WASM_GLOBAL_CELL = 1 << 10;
        const WASM_TABLE_ELEMENT = 1 << 11;
        const WASM_TABLE_META = 1 << 12;
        const WASM_STACK_RESULT = 1 << 13;
        const WASM_STRUCT_INLINE_DATA_POINTER = 1 << 14;
        const WASM_STRUCT_OUTLINE_DATA_POINTER = 1 << 15;
        const WASM_STRUCT_INLINE_DATA_AREA = 1 << 16;
        const WASM_STRUCT_OUTLINE_DATA_AREA = 1 << 17;
        const WASM_ARRAY_NUM_ELEMENTS = 1 << 18;
        const WASM_ARRAY_DATA_POINTER = 1 << 19;
        const WASM_ARRAY_DATA_AREA = 1 << 20;
        /// Arguments of the current frame.
        const FRAME_ARGUMENT = 1 << 21;
        const GLOBAL_GENERATION_COUNTER = 1 << 22;
        const MAP_OR_SET_HASH_TABLE = 1 << 23;
        /// Pending exception of the runtime.
        const EXCEPTION_STATE = 1 << 24;
        /// Random number generator state.
        const RNG = 1 << 25;
        /// Store discriminator. Not a memory category.
        const STORE = 1 << 31;
    }
}

/// Union of every memory category.
const ANY_CATEGORY: AliasFlags = AliasFlags::all().difference(AliasFlags::STORE);

// =============================================================================
// AliasSet
// =============================================================================

/// Immutable description of an instruction's memory effect.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasSet(AliasFlags);

impl AliasSet {
    /// No memory effect at all.
    #[inline]
    pub const fn none() -> Self {
        AliasSet(AliasFlags::empty())
    }

    /// Every category.
    #[inline]
    pub const fn any() -> AliasFlags {
        ANY_CATEGORY
    }

    /// Reads from `flags`.
    #[inline]
    pub fn load(flags: AliasFlags) -> Self {
        debug_assert!(!flags.contains(AliasFlags::STORE));
        AliasSet(flags)
    }

    /// Writes to `flags`.
    #[inline]
    pub fn store(flags: AliasFlags) -> Self {
        AliasSet(flags | AliasFlags::STORE)
    }

    /// Categories without the store bit.
    #[inline]
    pub fn flags(self) -> AliasFlags {
        self.0.difference(AliasFlags::STORE)
    }

    /// Raw bits including the store discriminator.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0.bits()
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn is_store(self) -> bool {
        self.0.contains(AliasFlags::STORE)
    }

    #[inline]
    pub fn is_load(self) -> bool {
        !self.is_store() && !self.is_none()
    }

    /// Whether the two sets share a memory category.
    #[inline]
    pub fn intersects(self, other: AliasSet) -> bool {
        self.flags().intersects(other.flags())
    }

    /// Union of categories. The result is a store if either side is.
    #[inline]
    pub fn union(self, other: AliasSet) -> AliasSet {
        AliasSet(self.0 | other.0)
    }
}

impl Default for AliasSet {
    /// Conservative default: writes anything.
    fn default() -> Self {
        AliasSet::store(ANY_CATEGORY)
    }
}

impl fmt::Debug for AliasSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for AliasSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("None");
        }
        let kind = if self.is_store() { "Store" } else { "Load" };
        if self.flags() == ANY_CATEGORY {
            return write!(f, "{}(Any)", kind);
        }
        write!(f, "{}(", kind)?;
        for (i, (name, _)) in self.flags().iter_names().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

// =============================================================================
// AliasType
// =============================================================================

/// Refined answer to "may this load observe that store?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasType {
    /// The store provably does not touch what the load reads.
    NoAlias,
    /// Unknown; the operations must stay ordered.
    MayAlias,
    /// The store writes exactly the location the load reads.
    MustAlias,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_store_any() {
        let set = AliasSet::default();
        assert!(set.is_store());
        assert_eq!(set.flags(), AliasSet::any());
        assert_eq!(set.to_string(), "Store(Any)");
    }

    #[test]
    fn test_load_store_discrimination() {
        let load = AliasSet::load(AliasFlags::FIXED_SLOT);
        let store = AliasSet::store(AliasFlags::FIXED_SLOT);
        let other = AliasSet::store(AliasFlags::ELEMENT);

        assert!(load.is_load());
        assert!(!load.is_store());
        assert!(store.is_store());
        assert!(load.intersects(store));
        assert!(!load.intersects(other));
        assert!(AliasSet::none().is_none());
        assert!(!AliasSet::none().is_load());
    }

    #[test]
    fn test_display_lists_categories() {
        let set = AliasSet::load(AliasFlags::ELEMENT | AliasFlags::OBJECT_FIELDS);
        assert_eq!(set.to_string(), "Load(OBJECT_FIELDS | ELEMENT)");
    }
}
