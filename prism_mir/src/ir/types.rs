//! Result types of MIR definitions.
//!
//! Every definition produces a value of exactly one [`MirType`]. Specialized
//! types (`Int32`, `Double`, ...) come from speculation; `Value` is the boxed
//! catch-all that any type can be widened to with a `Box` instruction.

use std::fmt;

/// The type of value a MIR definition produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MirType {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Int32 = 3,
    Int64 = 4,
    IntPtr = 5,
    Double = 6,
    Float32 = 7,
    String = 8,
    Symbol = 9,
    BigInt = 10,
    Object = 11,
    /// Boxed value of unknown type.
    Value = 12,
    /// Object shape pointer.
    Shape = 13,
    /// Dynamic slots vector of an object.
    Slots = 14,
    /// Elements vector of an object.
    Elements = 15,
    /// Sentinel for values that are unobservable after optimization.
    MagicOptimizedOut = 16,
    /// Array hole sentinel.
    MagicHole = 17,
    /// Constructing-call marker.
    MagicIsConstructing = 18,
    /// Uninitialized lexical binding.
    MagicUninitializedLexical = 19,
    /// Definitions that produce no value (stores, control).
    None = 20,
}

impl MirType {
    /// Every type, in tag order.
    pub const ALL: [MirType; 21] = [
        MirType::Undefined,
        MirType::Null,
        MirType::Boolean,
        MirType::Int32,
        MirType::Int64,
        MirType::IntPtr,
        MirType::Double,
        MirType::Float32,
        MirType::String,
        MirType::Symbol,
        MirType::BigInt,
        MirType::Object,
        MirType::Value,
        MirType::Shape,
        MirType::Slots,
        MirType::Elements,
        MirType::MagicOptimizedOut,
        MirType::MagicHole,
        MirType::MagicIsConstructing,
        MirType::MagicUninitializedLexical,
        MirType::None,
    ];

    /// Decode a type tag as written by [`MirType::tag`].
    pub fn from_tag(tag: u8) -> Option<MirType> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Stable numeric tag, used by the recover encoding.
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// `Int32`, `Double` or `Float32`.
    #[inline]
    pub const fn is_number(self) -> bool {
        matches!(self, MirType::Int32 | MirType::Double | MirType::Float32)
    }

    /// Types whose values are exactly representable as an f64.
    #[inline]
    pub const fn is_representable_as_double(self) -> bool {
        self.is_number()
    }

    #[inline]
    pub const fn is_floating_point(self) -> bool {
        matches!(self, MirType::Double | MirType::Float32)
    }

    /// Machine integer types.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(self, MirType::Int32 | MirType::Int64 | MirType::IntPtr)
    }

    #[inline]
    pub const fn is_magic(self) -> bool {
        matches!(
            self,
            MirType::MagicOptimizedOut
                | MirType::MagicHole
                | MirType::MagicIsConstructing
                | MirType::MagicUninitializedLexical
        )
    }

    #[inline]
    pub const fn is_null_or_undefined(self) -> bool {
        matches!(self, MirType::Null | MirType::Undefined)
    }

    /// Types that carry a script-visible value (everything except the
    /// internal pointer types, magic sentinels and `None`).
    #[inline]
    pub const fn is_script_value(self) -> bool {
        (self as u8) <= (MirType::Value as u8)
    }

    /// Short lowercase name used by the graph printer.
    pub const fn name(self) -> &'static str {
        match self {
            MirType::Undefined => "undefined",
            MirType::Null => "null",
            MirType::Boolean => "bool",
            MirType::Int32 => "int32",
            MirType::Int64 => "int64",
            MirType::IntPtr => "intptr",
            MirType::Double => "double",
            MirType::Float32 => "float32",
            MirType::String => "string",
            MirType::Symbol => "symbol",
            MirType::BigInt => "bigint",
            MirType::Object => "object",
            MirType::Value => "value",
            MirType::Shape => "shape",
            MirType::Slots => "slots",
            MirType::Elements => "elements",
            MirType::MagicOptimizedOut => "magic-optimized-out",
            MirType::MagicHole => "magic-hole",
            MirType::MagicIsConstructing => "magic-is-constructing",
            MirType::MagicUninitializedLexical => "magic-uninitialized-lexical",
            MirType::None => "none",
        }
    }
}

impl fmt::Display for MirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip_through_all() {
        for (i, ty) in MirType::ALL.iter().enumerate() {
            assert_eq!(ty.tag() as usize, i);
        }
        assert_eq!(MirType::from_tag(21), None);
    }

    #[test]
    fn test_classification() {
        assert!(MirType::Float32.is_floating_point());
        assert!(!MirType::Int32.is_floating_point());
        assert!(MirType::Int32.is_number());
        assert!(!MirType::Int64.is_number());
        assert!(MirType::Int64.is_integer());
        assert!(MirType::MagicHole.is_magic());
        assert!(MirType::Value.is_script_value());
        assert!(!MirType::Slots.is_script_value());
    }
}
