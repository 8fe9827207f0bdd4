//! Opaque handles to host-owned heap values.
//!
//! The IR never dereferences garbage-collected memory. Strings, symbols,
//! big integers, shapes and objects are referenced by small newtype
//! handles indexing into a [`HostTable`]. The table is shared between the
//! compilations running on different worker threads, so it is the one
//! structure in this crate guarded by a lock.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw table index.
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                $name(raw)
            }

            /// Raw table index.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Interned string.
    StringHandle,
    "str#"
);
define_handle!(
    /// Symbol.
    SymbolHandle,
    "sym#"
);
define_handle!(
    /// Arbitrary precision integer.
    BigIntHandle,
    "bigint#"
);
define_handle!(
    /// Object layout descriptor.
    ShapeHandle,
    "shape#"
);
define_handle!(
    /// Heap object.
    ObjectHandle,
    "obj#"
);

#[derive(Debug, Default)]
struct Tables {
    strings: Vec<Arc<str>>,
    string_index: FxHashMap<Arc<str>, u32>,
    symbols: Vec<Option<Arc<str>>>,
    bigints: Vec<i128>,
    shape_slots: Vec<u32>,
    object_shapes: Vec<ShapeHandle>,
}

/// Host-side storage behind the IR's opaque handles.
///
/// Lookups take a shared lock; interning takes an exclusive one. Handles are
/// validated here, not by the IR.
#[derive(Debug, Default)]
pub struct HostTable {
    tables: RwLock<Tables>,
}

impl HostTable {
    /// Create an empty table, ready to be shared.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Intern `s`, returning the existing handle if it was seen before.
    pub fn intern_string(&self, s: &str) -> StringHandle {
        if let Some(&idx) = self.tables.read().string_index.get(s) {
            return StringHandle(idx);
        }
        let mut tables = self.tables.write();
        if let Some(&idx) = tables.string_index.get(s) {
            return StringHandle(idx);
        }
        let idx = tables.strings.len() as u32;
        let text: Arc<str> = Arc::from(s);
        tables.strings.push(text.clone());
        tables.string_index.insert(text, idx);
        StringHandle(idx)
    }

    /// Contents of an interned string.
    pub fn string(&self, h: StringHandle) -> Option<Arc<str>> {
        self.tables.read().strings.get(h.0 as usize).cloned()
    }

    /// Length in UTF-16 code units, the unit script strings are measured in.
    pub fn string_length(&self, h: StringHandle) -> Option<usize> {
        self.string(h).map(|s| s.encode_utf16().count())
    }

    /// Code-unit ordering of two interned strings.
    pub fn compare_strings(&self, a: StringHandle, b: StringHandle) -> Option<Ordering> {
        if a == b {
            return Some(Ordering::Equal);
        }
        let lhs = self.string(a)?;
        let rhs = self.string(b)?;
        Some(lhs.encode_utf16().cmp(rhs.encode_utf16()))
    }

    // =========================================================================
    // Symbols and BigInts
    // =========================================================================

    /// Create a fresh symbol. Symbols are never interned.
    pub fn new_symbol(&self, description: Option<&str>) -> SymbolHandle {
        let mut tables = self.tables.write();
        let idx = tables.symbols.len() as u32;
        tables.symbols.push(description.map(Arc::from));
        SymbolHandle(idx)
    }

    pub fn symbol_description(&self, h: SymbolHandle) -> Option<Arc<str>> {
        self.tables.read().symbols.get(h.0 as usize).cloned().flatten()
    }

    /// Register a big integer value.
    pub fn new_bigint(&self, value: i128) -> BigIntHandle {
        let mut tables = self.tables.write();
        let idx = tables.bigints.len() as u32;
        tables.bigints.push(value);
        BigIntHandle(idx)
    }

    pub fn bigint(&self, h: BigIntHandle) -> Option<i128> {
        self.tables.read().bigints.get(h.0 as usize).copied()
    }

    // =========================================================================
    // Shapes and Objects
    // =========================================================================

    /// Register a shape with `fixed_slots` inline slots.
    pub fn new_shape(&self, fixed_slots: u32) -> ShapeHandle {
        let mut tables = self.tables.write();
        let idx = tables.shape_slots.len() as u32;
        tables.shape_slots.push(fixed_slots);
        ShapeHandle(idx)
    }

    pub fn shape_fixed_slots(&self, h: ShapeHandle) -> Option<u32> {
        self.tables.read().shape_slots.get(h.0 as usize).copied()
    }

    /// Register a heap object with the given shape.
    pub fn new_object(&self, shape: ShapeHandle) -> ObjectHandle {
        let mut tables = self.tables.write();
        let idx = tables.object_shapes.len() as u32;
        tables.object_shapes.push(shape);
        ObjectHandle(idx)
    }

    pub fn object_shape(&self, h: ObjectHandle) -> Option<ShapeHandle> {
        self.tables.read().object_shapes.get(h.0 as usize).copied()
    }
}
