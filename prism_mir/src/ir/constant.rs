//! Literal payloads carried by `Constant` definitions.
//!
//! Two constants are equal iff their types and raw payload bits are equal.
//! That makes `Double(NaN)` equal to itself (same bits) and `Double(0.0)`
//! different from `Double(-0.0)`, which is exactly what value numbering and
//! folding need.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::host::{BigIntHandle, HostTable, ObjectHandle, ShapeHandle, StringHandle, SymbolHandle};
use super::types::MirType;

/// Magic sentinel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MagicKind {
    OptimizedOut = 0,
    Hole = 1,
    IsConstructing = 2,
    UninitializedLexical = 3,
}

impl MagicKind {
    pub const fn ty(self) -> MirType {
        match self {
            MagicKind::OptimizedOut => MirType::MagicOptimizedOut,
            MagicKind::Hole => MirType::MagicHole,
            MagicKind::IsConstructing => MirType::MagicIsConstructing,
            MagicKind::UninitializedLexical => MirType::MagicUninitializedLexical,
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(MagicKind::OptimizedOut),
            1 => Some(MagicKind::Hole),
            2 => Some(MagicKind::IsConstructing),
            3 => Some(MagicKind::UninitializedLexical),
            _ => None,
        }
    }
}

/// An immutable tagged literal.
#[derive(Clone, Copy)]
pub enum Constant {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    IntPtr(i64),
    Double(f64),
    Float32(f32),
    String(StringHandle),
    Symbol(SymbolHandle),
    BigInt(BigIntHandle),
    Object(ObjectHandle),
    Shape(ShapeHandle),
    Magic(MagicKind),
}

impl Constant {
    /// The result type of a definition holding this constant.
    pub const fn ty(&self) -> MirType {
        match self {
            Constant::Undefined => MirType::Undefined,
            Constant::Null => MirType::Null,
            Constant::Boolean(_) => MirType::Boolean,
            Constant::Int32(_) => MirType::Int32,
            Constant::Int64(_) => MirType::Int64,
            Constant::IntPtr(_) => MirType::IntPtr,
            Constant::Double(_) => MirType::Double,
            Constant::Float32(_) => MirType::Float32,
            Constant::String(_) => MirType::String,
            Constant::Symbol(_) => MirType::Symbol,
            Constant::BigInt(_) => MirType::BigInt,
            Constant::Object(_) => MirType::Object,
            Constant::Shape(_) => MirType::Shape,
            Constant::Magic(kind) => kind.ty(),
        }
    }

    /// Raw payload bits. Together with [`Constant::ty`] this is the identity
    /// of the constant.
    pub fn payload_bits(&self) -> u64 {
        match *self {
            Constant::Undefined | Constant::Null => 0,
            Constant::Boolean(b) => b as u64,
            Constant::Int32(v) => v as u32 as u64,
            Constant::Int64(v) | Constant::IntPtr(v) => v as u64,
            Constant::Double(v) => v.to_bits(),
            Constant::Float32(v) => v.to_bits() as u64,
            Constant::String(h) => h.raw() as u64,
            Constant::Symbol(h) => h.raw() as u64,
            Constant::BigInt(h) => h.raw() as u64,
            Constant::Object(h) => h.raw() as u64,
            Constant::Shape(h) => h.raw() as u64,
            Constant::Magic(kind) => kind as u64,
        }
    }

    /// Rebuild a constant from its type and payload bits.
    pub fn from_parts(ty: MirType, bits: u64) -> Option<Constant> {
        Some(match ty {
            MirType::Undefined => Constant::Undefined,
            MirType::Null => Constant::Null,
            MirType::Boolean => Constant::Boolean(bits != 0),
            MirType::Int32 => Constant::Int32(bits as u32 as i32),
            MirType::Int64 => Constant::Int64(bits as i64),
            MirType::IntPtr => Constant::IntPtr(bits as i64),
            MirType::Double => Constant::Double(f64::from_bits(bits)),
            MirType::Float32 => Constant::Float32(f32::from_bits(bits as u32)),
            MirType::String => Constant::String(StringHandle::from_raw(bits as u32)),
            MirType::Symbol => Constant::Symbol(SymbolHandle::from_raw(bits as u32)),
            MirType::BigInt => Constant::BigInt(BigIntHandle::from_raw(bits as u32)),
            MirType::Object => Constant::Object(ObjectHandle::from_raw(bits as u32)),
            MirType::Shape => Constant::Shape(ShapeHandle::from_raw(bits as u32)),
            MirType::MagicOptimizedOut
            | MirType::MagicHole
            | MirType::MagicIsConstructing
            | MirType::MagicUninitializedLexical => Constant::Magic(MagicKind::from_raw(bits as u8)?),
            MirType::Value | MirType::Slots | MirType::Elements | MirType::None => return None,
        })
    }

    #[inline]
    pub fn as_int32(&self) -> Option<i32> {
        match *self {
            Constant::Int32(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int64(&self) -> Option<i64> {
        match *self {
            Constant::Int64(v) | Constant::IntPtr(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Constant::Double(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_string(&self) -> Option<StringHandle> {
        match *self {
            Constant::String(h) => Some(h),
            _ => None,
        }
    }

    /// Numeric value of an `Int32`, `Double` or `Float32` constant.
    #[inline]
    pub fn number_to_double(&self) -> Option<f64> {
        match *self {
            Constant::Int32(v) => Some(v as f64),
            Constant::Double(v) => Some(v),
            Constant::Float32(v) => Some(v as f64),
            _ => None,
        }
    }

    /// Whether this is the int32 constant `v`.
    #[inline]
    pub fn is_int32(&self, v: i32) -> bool {
        matches!(*self, Constant::Int32(x) if x == v)
    }

    #[inline]
    pub fn is_nan(&self) -> bool {
        self.number_to_double().is_some_and(f64::is_nan)
    }

    /// Whether the numeric payload survives a round trip through f32.
    pub fn is_float32_representable(&self) -> bool {
        match self.number_to_double() {
            Some(d) => crate::opt::numeric::is_float32_representable(d),
            None => false,
        }
    }

    /// Truthiness of the constant, if it can be decided without running
    /// script code.
    ///
    /// Objects and magic values are not decided here.
    pub fn to_boolean(&self, host: &HostTable) -> Option<bool> {
        match *self {
            Constant::Boolean(b) => Some(b),
            Constant::Int32(v) => Some(v != 0),
            Constant::Int64(v) | Constant::IntPtr(v) => Some(v != 0),
            Constant::Double(v) => Some(!v.is_nan() && v != 0.0),
            Constant::Float32(v) => Some(!v.is_nan() && v != 0.0),
            Constant::Null | Constant::Undefined => Some(false),
            Constant::Symbol(_) => Some(true),
            Constant::BigInt(h) => host.bigint(h).map(|v| v != 0),
            Constant::String(h) => host.string_length(h).map(|len| len != 0),
            Constant::Object(_) | Constant::Shape(_) | Constant::Magic(_) => None,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.ty() == other.ty() && self.payload_bits() == other.payload_bits()
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty().hash(state);
        self.payload_bits().hash(state);
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Undefined => f.write_str("undefined"),
            Constant::Null => f.write_str("null"),
            Constant::Boolean(b) => write!(f, "{}", b),
            Constant::Int32(v) => write!(f, "{}", v),
            Constant::Int64(v) => write!(f, "{}i64", v),
            Constant::IntPtr(v) => write!(f, "{}iptr", v),
            Constant::Double(v) => write!(f, "{:?}", v),
            Constant::Float32(v) => write!(f, "{:?}f", v),
            Constant::String(h) => write!(f, "{:?}", h),
            Constant::Symbol(h) => write!(f, "{:?}", h),
            Constant::BigInt(h) => write!(f, "{:?}", h),
            Constant::Object(h) => write!(f, "{:?}", h),
            Constant::Shape(h) => write!(f, "{:?}", h),
            Constant::Magic(kind) => write!(f, "magic({:?})", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_bitwise() {
        assert_eq!(Constant::Double(f64::NAN), Constant::Double(f64::NAN));
        assert_ne!(Constant::Double(0.0), Constant::Double(-0.0));
        assert_ne!(Constant::Int32(1), Constant::Int64(1));
        assert_ne!(Constant::Int64(1), Constant::IntPtr(1));
        assert_eq!(Constant::Int32(-1), Constant::Int32(-1));
    }

    #[test]
    fn test_from_parts_inverts_payload_bits() {
        for c in [
            Constant::Int32(-7),
            Constant::Double(-0.0),
            Constant::Float32(1.5),
            Constant::Boolean(true),
            Constant::Magic(MagicKind::OptimizedOut),
        ] {
            assert_eq!(Constant::from_parts(c.ty(), c.payload_bits()), Some(c));
        }
        assert_eq!(Constant::from_parts(MirType::Value, 0), None);
    }

    #[test]
    fn test_to_boolean() {
        let host = HostTable::new();
        let empty = host.intern_string("");
        let full = host.intern_string("x");
        assert_eq!(Constant::Double(f64::NAN).to_boolean(&host), Some(false));
        assert_eq!(Constant::Double(-0.0).to_boolean(&host), Some(false));
        assert_eq!(Constant::Int32(3).to_boolean(&host), Some(true));
        assert_eq!(Constant::String(empty).to_boolean(&host), Some(false));
        assert_eq!(Constant::String(full).to_boolean(&host), Some(true));
        assert_eq!(Constant::Undefined.to_boolean(&host), Some(false));
        assert_eq!(
            Constant::Symbol(host.new_symbol(None)).to_boolean(&host),
            Some(true)
        );
        assert_eq!(Constant::BigInt(host.new_bigint(0)).to_boolean(&host), Some(false));
        assert_eq!(Constant::Magic(MagicKind::Hole).to_boolean(&host), None);
    }
}
