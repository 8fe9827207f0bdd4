//! Node specifications.
//!
//! A [`NodeSpec`] describes a definition before it is allocated: its op,
//! result type, operands and initial flags. [`Graph::add_node`] and
//! [`Graph::try_add_node`] turn one into a node, so every constructor here
//! is usable in both allocation modes.
//!
//! [`Graph::add_node`]: super::graph::Graph::add_node
//! [`Graph::try_add_node`]: super::graph::Graph::try_add_node

use smallvec::{smallvec, SmallVec};

use super::block::BlockId;
use super::constant::Constant;
use super::host::{ShapeHandle, StringHandle, SymbolHandle};
use super::node::{BailoutKind, DefFlags, DefId, TruncateKind};
use super::opcode::{
    ArithData, CompareOp, CompareType, DivData, IntConversionInput, MathFunc, ModData, MulData,
    Op, PhiData, SignExtendMode, UnboxMode,
};
use super::types::MirType;

/// A definition waiting to be allocated.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub op: Op,
    pub ty: MirType,
    pub operands: SmallVec<[DefId; 3]>,
    pub flags: DefFlags,
    pub bailout_kind: BailoutKind,
}

impl NodeSpec {
    /// A spec with no flags set.
    pub fn new(op: Op, ty: MirType, operands: &[DefId]) -> Self {
        NodeSpec {
            op,
            ty,
            operands: SmallVec::from_slice(operands),
            flags: DefFlags::empty(),
            bailout_kind: BailoutKind::Unknown,
        }
    }

    fn pure(op: Op, ty: MirType, operands: SmallVec<[DefId; 3]>) -> Self {
        NodeSpec {
            op,
            ty,
            operands,
            flags: DefFlags::MOVABLE,
            bailout_kind: BailoutKind::Unknown,
        }
    }

    fn effectful(op: Op, ty: MirType, operands: SmallVec<[DefId; 3]>) -> Self {
        NodeSpec {
            op,
            ty,
            operands,
            flags: DefFlags::empty(),
            bailout_kind: BailoutKind::Unknown,
        }
    }

    fn guard(op: Op, ty: MirType, operands: SmallVec<[DefId; 3]>, kind: BailoutKind) -> Self {
        NodeSpec {
            op,
            ty,
            operands,
            flags: DefFlags::GUARD | DefFlags::MOVABLE,
            bailout_kind: kind,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: DefFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[must_use]
    pub fn without_flags(mut self, flags: DefFlags) -> Self {
        self.flags.remove(flags);
        self
    }

    #[must_use]
    pub fn with_bailout_kind(mut self, kind: BailoutKind) -> Self {
        self.bailout_kind = kind;
        self
    }

    // =========================================================================
    // Values
    // =========================================================================

    pub fn constant(c: Constant) -> Self {
        Self::pure(Op::Constant(c), c.ty(), SmallVec::new())
    }

    pub fn parameter(index: i32, ty: MirType) -> Self {
        Self::effectful(Op::Parameter { index }, ty, SmallVec::new())
    }

    /// A phi with no operands yet.
    pub fn phi(ty: MirType) -> Self {
        Self::pure(Op::Phi(PhiData::default()), ty, SmallVec::new())
    }

    pub fn box_(value: DefId) -> Self {
        Self::pure(Op::Box, MirType::Value, smallvec![value])
    }

    pub fn unbox(value: DefId, ty: MirType, mode: UnboxMode) -> Self {
        match mode {
            UnboxMode::Fallible => Self::guard(
                Op::Unbox { mode },
                ty,
                smallvec![value],
                BailoutKind::UnboxFolding,
            ),
            UnboxMode::Infallible => Self::pure(Op::Unbox { mode }, ty, smallvec![value]),
        }
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    pub fn add(lhs: DefId, rhs: DefId, ty: MirType) -> Self {
        Self::pure(Op::Add(ArithData::default()), ty, smallvec![lhs, rhs])
    }

    pub fn sub(lhs: DefId, rhs: DefId, ty: MirType) -> Self {
        Self::pure(Op::Sub(ArithData::default()), ty, smallvec![lhs, rhs])
    }

    pub fn mul(lhs: DefId, rhs: DefId, ty: MirType) -> Self {
        Self::pure(Op::Mul(MulData::default()), ty, smallvec![lhs, rhs])
    }

    pub fn div(lhs: DefId, rhs: DefId, ty: MirType) -> Self {
        Self::pure(Op::Div(DivData::default()), ty, smallvec![lhs, rhs])
    }

    /// Integer division with wasm semantics.
    pub fn div_wasm(lhs: DefId, rhs: DefId, ty: MirType, unsigned: bool) -> Self {
        let data = DivData {
            unsigned,
            trap_on_error: true,
            ..DivData::default()
        };
        Self::effectful(Op::Div(data), ty, smallvec![lhs, rhs])
    }

    pub fn mod_(lhs: DefId, rhs: DefId, ty: MirType) -> Self {
        Self::pure(Op::Mod(ModData::default()), ty, smallvec![lhs, rhs])
    }

    /// Integer remainder with wasm semantics.
    pub fn mod_wasm(lhs: DefId, rhs: DefId, ty: MirType, unsigned: bool) -> Self {
        let data = ModData {
            unsigned,
            trap_on_error: true,
            ..ModData::default()
        };
        Self::effectful(Op::Mod(data), ty, smallvec![lhs, rhs])
    }

    pub fn abs(value: DefId, ty: MirType) -> Self {
        // Int32 abs overflows on INT32_MIN.
        let fallible = ty == MirType::Int32;
        let spec = Self::pure(Op::Abs { fallible }, ty, smallvec![value]);
        if fallible {
            spec.with_flags(DefFlags::GUARD)
                .with_bailout_kind(BailoutKind::Overflow)
        } else {
            spec
        }
    }

    pub fn min_max(lhs: DefId, rhs: DefId, is_max: bool, ty: MirType) -> Self {
        Self::pure(Op::MinMax { is_max }, ty, smallvec![lhs, rhs])
    }

    pub fn pow(base: DefId, power: DefId, ty: MirType) -> Self {
        Self::pure(Op::Pow, ty, smallvec![base, power])
    }

    pub fn pow_half(value: DefId) -> Self {
        Self::pure(Op::PowHalf, MirType::Double, smallvec![value])
    }

    pub fn sqrt(value: DefId, ty: MirType) -> Self {
        Self::pure(Op::Sqrt, ty, smallvec![value])
    }

    pub fn sign(value: DefId, ty: MirType) -> Self {
        Self::pure(Op::Sign, ty, smallvec![value])
    }

    pub fn math_function(value: DefId, func: MathFunc, ty: MirType) -> Self {
        Self::pure(Op::MathFunction { func }, ty, smallvec![value])
    }

    pub fn hypot(operands: &[DefId]) -> Self {
        Self::pure(Op::Hypot, MirType::Double, SmallVec::from_slice(operands))
    }

    pub fn nan_to_zero(value: DefId) -> Self {
        Self::pure(
            Op::NaNToZero {
                operand_is_never_nan: false,
                operand_is_never_negative_zero: false,
            },
            MirType::Double,
            smallvec![value],
        )
    }

    pub fn clz(value: DefId, ty: MirType) -> Self {
        Self::pure(Op::Clz { operand_is_never_zero: false }, ty, smallvec![value])
    }

    pub fn ctz(value: DefId, ty: MirType) -> Self {
        Self::pure(Op::Ctz { operand_is_never_zero: false }, ty, smallvec![value])
    }

    pub fn popcnt(value: DefId, ty: MirType) -> Self {
        Self::pure(Op::Popcnt, ty, smallvec![value])
    }

    // =========================================================================
    // Bitwise
    // =========================================================================

    pub fn bit_and(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::BitAnd, MirType::Int32, smallvec![lhs, rhs])
    }

    pub fn bit_or(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::BitOr, MirType::Int32, smallvec![lhs, rhs])
    }

    pub fn bit_xor(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::BitXor, MirType::Int32, smallvec![lhs, rhs])
    }

    pub fn bit_not(value: DefId) -> Self {
        Self::pure(Op::BitNot, MirType::Int32, smallvec![value])
    }

    pub fn lsh(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::Lsh, MirType::Int32, smallvec![lhs, rhs])
    }

    pub fn rsh(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::Rsh, MirType::Int32, smallvec![lhs, rhs])
    }

    /// Unsigned shift. An Int32 result bails out when the value does not
    /// fit; a Double result never does.
    pub fn ursh(lhs: DefId, rhs: DefId, ty: MirType) -> Self {
        let spec = Self::pure(
            Op::Ursh { bailouts_disabled: ty != MirType::Int32 },
            ty,
            smallvec![lhs, rhs],
        );
        if ty == MirType::Int32 {
            spec.with_flags(DefFlags::GUARD)
                .with_bailout_kind(BailoutKind::Overflow)
        } else {
            spec
        }
    }

    pub fn bitwise_int64(op: Op, lhs: DefId, rhs: DefId) -> Self {
        Self::pure(op, MirType::Int64, smallvec![lhs, rhs])
    }

    pub fn sign_extend_int32(value: DefId, mode: SignExtendMode) -> Self {
        Self::pure(Op::SignExtendInt32 { mode }, MirType::Int32, smallvec![value])
    }

    pub fn sign_extend_int64(value: DefId, mode: SignExtendMode) -> Self {
        Self::pure(Op::SignExtendInt64 { mode }, MirType::Int64, smallvec![value])
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn to_double(value: DefId) -> Self {
        Self::pure(Op::ToDouble, MirType::Double, smallvec![value])
    }

    pub fn to_float32(value: DefId) -> Self {
        Self::pure(
            Op::ToFloat32 { must_preserve_nan: false },
            MirType::Float32,
            smallvec![value],
        )
    }

    pub fn to_number_int32(value: DefId, conversion: IntConversionInput) -> Self {
        Self::guard(
            Op::ToNumberInt32 {
                conversion,
                needs_negative_zero_check: true,
            },
            MirType::Int32,
            smallvec![value],
            BailoutKind::PrecisionLoss,
        )
    }

    pub fn truncate_to_int32(value: DefId) -> Self {
        Self::pure(Op::TruncateToInt32, MirType::Int32, smallvec![value])
    }

    pub fn to_int64(value: DefId) -> Self {
        Self::guard(Op::ToInt64, MirType::Int64, smallvec![value], BailoutKind::NonInt32Input)
    }

    pub fn int32_to_intptr(value: DefId) -> Self {
        Self::pure(Op::Int32ToIntPtr, MirType::IntPtr, smallvec![value])
    }

    pub fn wrap_int64_to_int32(value: DefId, bottom_half: bool) -> Self {
        Self::pure(Op::WrapInt64ToInt32 { bottom_half }, MirType::Int32, smallvec![value])
    }

    pub fn extend_int32_to_int64(value: DefId, unsigned: bool) -> Self {
        Self::pure(Op::ExtendInt32ToInt64 { unsigned }, MirType::Int64, smallvec![value])
    }

    pub fn boolean_to_int32(value: DefId) -> Self {
        Self::pure(Op::BooleanToInt32, MirType::Int32, smallvec![value])
    }

    pub fn clamp_to_uint8(value: DefId) -> Self {
        Self::pure(Op::ClampToUint8, MirType::Int32, smallvec![value])
    }

    pub fn limited_truncate(value: DefId, limit: TruncateKind, ty: MirType) -> Self {
        Self::pure(Op::LimitedTruncate { limit }, ty, smallvec![value])
    }

    pub fn to_string(value: DefId) -> Self {
        Self::pure(Op::ToString, MirType::String, smallvec![value])
    }

    pub fn int64_to_bigint(value: DefId, signed: bool) -> Self {
        Self::pure(Op::Int64ToBigInt { signed }, MirType::BigInt, smallvec![value])
    }

    pub fn truncate_bigint_to_int64(value: DefId) -> Self {
        Self::pure(Op::TruncateBigIntToInt64, MirType::Int64, smallvec![value])
    }

    /// Bit-level reinterpretation between same-width types.
    pub fn reinterpret_cast(value: DefId, ty: MirType) -> Self {
        Self::pure(Op::ReinterpretCast, ty, smallvec![value])
    }

    // =========================================================================
    // Comparisons
    // =========================================================================

    pub fn compare(lhs: DefId, rhs: DefId, op: CompareOp, compare_type: CompareType) -> Self {
        Self::pure(
            Op::Compare {
                op,
                compare_type,
                truncate_operands: false,
            },
            MirType::Boolean,
            smallvec![lhs, rhs],
        )
    }

    pub fn not(value: DefId) -> Self {
        Self::pure(Op::Not, MirType::Boolean, smallvec![value])
    }

    pub fn same_value(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::SameValue, MirType::Boolean, smallvec![lhs, rhs])
    }

    pub fn same_value_double(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::SameValueDouble, MirType::Boolean, smallvec![lhs, rhs])
    }

    // =========================================================================
    // Strings
    // =========================================================================

    pub fn string_length(value: DefId) -> Self {
        Self::pure(Op::StringLength, MirType::Int32, smallvec![value])
    }

    pub fn concat(lhs: DefId, rhs: DefId) -> Self {
        Self::pure(Op::Concat, MirType::String, smallvec![lhs, rhs])
    }

    // =========================================================================
    // Memory
    // =========================================================================

    pub fn slots(object: DefId) -> Self {
        Self::pure(Op::Slots, MirType::Slots, smallvec![object])
    }

    pub fn elements(object: DefId) -> Self {
        Self::pure(Op::Elements, MirType::Elements, smallvec![object])
    }

    pub fn initialized_length(elements: DefId) -> Self {
        Self::pure(Op::InitializedLength, MirType::Int32, smallvec![elements])
    }

    pub fn array_length(elements: DefId) -> Self {
        Self::pure(Op::ArrayLength, MirType::Int32, smallvec![elements])
    }

    pub fn set_initialized_length(elements: DefId, index: DefId) -> Self {
        Self::effectful(Op::SetInitializedLength, MirType::None, smallvec![elements, index])
    }

    pub fn load_fixed_slot(object: DefId, slot: u32, ty: MirType) -> Self {
        Self::pure(Op::LoadFixedSlot { slot }, ty, smallvec![object])
    }

    pub fn store_fixed_slot(object: DefId, value: DefId, slot: u32) -> Self {
        Self::effectful(
            Op::StoreFixedSlot {
                slot,
                needs_barrier: true,
            },
            MirType::None,
            smallvec![object, value],
        )
    }

    pub fn load_dynamic_slot(slots: DefId, slot: u32, ty: MirType) -> Self {
        Self::pure(Op::LoadDynamicSlot { slot }, ty, smallvec![slots])
    }

    pub fn store_dynamic_slot(slots: DefId, value: DefId, slot: u32) -> Self {
        Self::effectful(
            Op::StoreDynamicSlot {
                slot,
                needs_barrier: true,
            },
            MirType::None,
            smallvec![slots, value],
        )
    }

    pub fn load_element(elements: DefId, index: DefId, ty: MirType) -> Self {
        Self::guard(
            Op::LoadElement { needs_hole_check: true },
            ty,
            smallvec![elements, index],
            BailoutKind::Bounds,
        )
    }

    pub fn store_element(elements: DefId, index: DefId, value: DefId) -> Self {
        Self::effectful(
            Op::StoreElement { needs_hole_check: false },
            MirType::None,
            smallvec![elements, index, value],
        )
    }

    pub fn array_push(object: DefId, value: DefId) -> Self {
        Self::effectful(Op::ArrayPush, MirType::Int32, smallvec![object, value])
    }

    /// Check `min <= index + offset < length` for offsets in `[min, max]`.
    pub fn bounds_check(index: DefId, length: DefId) -> Self {
        Self::guard(
            Op::BoundsCheck {
                min: 0,
                max: 0,
                fallible: true,
            },
            MirType::Int32,
            smallvec![index, length],
            BailoutKind::Bounds,
        )
    }

    pub fn new_object(shape: ShapeHandle) -> Self {
        Self::effectful(Op::NewObject { shape }, MirType::Object, SmallVec::new())
    }

    pub fn new_array(length: u32) -> Self {
        Self::effectful(Op::NewArray { length }, MirType::Object, SmallVec::new())
    }

    /// Virtual contents of `object`: one operand per slot.
    pub fn object_state(object: DefId, slots: &[DefId]) -> Self {
        let mut operands: SmallVec<[DefId; 3]> = smallvec![object];
        operands.extend_from_slice(slots);
        Self::effectful(Op::ObjectState, MirType::Object, operands)
            .with_flags(DefFlags::RECOVERED_ON_BAILOUT)
    }

    // =========================================================================
    // Guards
    // =========================================================================

    pub fn guard_shape(object: DefId, shape: ShapeHandle) -> Self {
        Self::guard(
            Op::GuardShape { shape },
            MirType::Object,
            smallvec![object],
            BailoutKind::ShapeGuard,
        )
    }

    pub fn guard_value(value: DefId, expected: Constant) -> Self {
        Self::guard(
            Op::GuardValue { expected },
            MirType::Value,
            smallvec![value],
            BailoutKind::ValueGuard,
        )
    }

    pub fn guard_null_or_undefined(value: DefId) -> Self {
        Self::guard(
            Op::GuardNullOrUndefined,
            MirType::Value,
            smallvec![value],
            BailoutKind::NotNullOrUndefined,
        )
    }

    pub fn guard_is_not_object(value: DefId) -> Self {
        Self::guard(Op::GuardIsNotObject, MirType::Value, smallvec![value], BailoutKind::ValueGuard)
    }

    pub fn guard_object_identity(object: DefId, expected: DefId, bail_on_equality: bool) -> Self {
        Self::guard(
            Op::GuardObjectIdentity { bail_on_equality },
            MirType::Object,
            smallvec![object, expected],
            BailoutKind::ValueGuard,
        )
    }

    pub fn guard_specific_atom(string: DefId, atom: StringHandle) -> Self {
        Self::guard(
            Op::GuardSpecificAtom { atom },
            MirType::String,
            smallvec![string],
            BailoutKind::ValueGuard,
        )
    }

    pub fn guard_specific_symbol(symbol_value: DefId, symbol: SymbolHandle) -> Self {
        Self::guard(
            Op::GuardSpecificSymbol { symbol },
            MirType::Symbol,
            smallvec![symbol_value],
            BailoutKind::ValueGuard,
        )
    }

    pub fn guard_specific_int32(value: DefId, expected: i32) -> Self {
        Self::guard(
            Op::GuardSpecificInt32 { expected },
            MirType::Int32,
            smallvec![value],
            BailoutKind::ValueGuard,
        )
    }

    pub fn guard_int32_is_non_negative(value: DefId) -> Self {
        Self::guard(
            Op::GuardInt32IsNonNegative,
            MirType::Int32,
            smallvec![value],
            BailoutKind::Bounds,
        )
    }

    pub fn guard_int32_range(value: DefId, min: i32, max: i32) -> Self {
        Self::guard(
            Op::GuardInt32Range { min, max },
            MirType::Int32,
            smallvec![value],
            BailoutKind::Bounds,
        )
    }

    // =========================================================================
    // Effects and Control
    // =========================================================================

    pub fn call(args: &[DefId], ty: MirType) -> Self {
        Self::effectful(
            Op::Call { argc: args.len() as u32 },
            ty,
            SmallVec::from_slice(args),
        )
    }

    pub fn random() -> Self {
        Self::effectful(Op::Random, MirType::Double, SmallVec::new())
    }

    pub fn throw(value: DefId) -> Self {
        Self::effectful(Op::Throw, MirType::None, smallvec![value])
    }

    pub fn goto(target: BlockId) -> Self {
        Self::effectful(Op::Goto { target }, MirType::None, SmallVec::new())
    }

    pub fn test(cond: DefId, if_true: BlockId, if_false: BlockId) -> Self {
        Self::effectful(Op::Test { if_true, if_false }, MirType::None, smallvec![cond])
    }

    pub fn table_switch(index: DefId, low: i32, cases: Vec<BlockId>, default: BlockId) -> Self {
        Self::effectful(
            Op::TableSwitch { low, cases, default },
            MirType::None,
            smallvec![index],
        )
    }

    pub fn return_(value: DefId) -> Self {
        Self::effectful(Op::Return, MirType::None, smallvec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_ops_are_movable() {
        let a = DefId::new(0);
        let spec = NodeSpec::add(a, a, MirType::Int32);
        assert!(spec.flags.contains(DefFlags::MOVABLE));
        assert!(!spec.flags.contains(DefFlags::GUARD));

        let store = NodeSpec::store_fixed_slot(a, a, 1);
        assert!(store.flags.is_empty());
        assert_eq!(store.ty, MirType::None);
    }

    #[test]
    fn test_guards_carry_bailout_kind() {
        let a = DefId::new(0);
        let spec = NodeSpec::guard_int32_range(a, 0, 10);
        assert!(spec.flags.contains(DefFlags::GUARD));
        assert_eq!(spec.bailout_kind, BailoutKind::Bounds);

        let abs = NodeSpec::abs(a, MirType::Int32);
        assert!(abs.flags.contains(DefFlags::GUARD));
        assert!(!NodeSpec::abs(a, MirType::Double).flags.contains(DefFlags::GUARD));
    }

    #[test]
    fn test_variadic_operands() {
        let a = DefId::new(0);
        let b = DefId::new(1);
        let state = NodeSpec::object_state(a, &[b, b, b]);
        assert_eq!(state.operands.len(), 4);
        assert_eq!(NodeSpec::call(&[a, b], MirType::Value).op, Op::Call { argc: 2 });
    }
}
