//! The closed instruction catalog.
//!
//! Every MIR definition carries one [`Op`]: an opcode tag plus the
//! opcode-specific fields that distinguish two instructions with the same
//! operands (slot index, comparison operator, signedness, ...). Analysis
//! flags that passes refine in place (negative-zero, divide-by-zero,
//! NaN-preservation) also live here, next to the opcode that owns them.
//!
//! [`Opcode`] is the fieldless tag. It has a stable numeric value because it
//! is written into the recover stream.

use std::fmt;

use super::block::BlockId;
use super::constant::Constant;
use super::host::{ShapeHandle, StringHandle, SymbolHandle};
use super::node::TruncateKind;

// =============================================================================
// Opcode-specific enums
// =============================================================================

/// How an `Unbox` reacts to a value of the wrong type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UnboxMode {
    /// Bail out on mismatch.
    Fallible = 0,
    /// Type is known; no check.
    Infallible = 1,
}

/// Sign-extension width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignExtendMode {
    Byte = 0,
    Half = 1,
    Word = 2,
}

impl SignExtendMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(SignExtendMode::Byte),
            1 => Some(SignExtendMode::Half),
            2 => Some(SignExtendMode::Word),
            _ => None,
        }
    }
}

/// Which inputs a `ToNumberInt32` accepts besides numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IntConversionInput {
    NumbersOnly = 0,
    NumbersOrBoolsOnly = 1,
    Any = 2,
}

/// Math library function selected by `MathFunction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MathFunc {
    Floor = 0,
    Ceil = 1,
    Round = 2,
    Trunc = 3,
    Log = 4,
    Exp = 5,
    Sin = 6,
    Cos = 7,
    Tan = 8,
    Atan = 9,
    Cbrt = 10,
    Log2 = 11,
    Log10 = 12,
}

impl MathFunc {
    pub const ALL: [MathFunc; 13] = [
        MathFunc::Floor,
        MathFunc::Ceil,
        MathFunc::Round,
        MathFunc::Trunc,
        MathFunc::Log,
        MathFunc::Exp,
        MathFunc::Sin,
        MathFunc::Cos,
        MathFunc::Tan,
        MathFunc::Atan,
        MathFunc::Cbrt,
        MathFunc::Log2,
        MathFunc::Log10,
    ];

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Rounding functions: exact, and able to consume float32 directly.
    pub const fn is_rounding(self) -> bool {
        matches!(
            self,
            MathFunc::Floor | MathFunc::Ceil | MathFunc::Round | MathFunc::Trunc
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            MathFunc::Floor => "floor",
            MathFunc::Ceil => "ceil",
            MathFunc::Round => "round",
            MathFunc::Trunc => "trunc",
            MathFunc::Log => "log",
            MathFunc::Exp => "exp",
            MathFunc::Sin => "sin",
            MathFunc::Cos => "cos",
            MathFunc::Tan => "tan",
            MathFunc::Atan => "atan",
            MathFunc::Cbrt => "cbrt",
            MathFunc::Log2 => "log2",
            MathFunc::Log10 => "log10",
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareOp {
    Eq = 0,
    Ne = 1,
    StrictEq = 2,
    StrictNe = 3,
    Lt = 4,
    Le = 5,
    Gt = 6,
    Ge = 7,
}

impl CompareOp {
    pub const ALL: [CompareOp; 8] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::StrictEq,
        CompareOp::StrictNe,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
    ];

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    #[inline]
    pub const fn is_equality(self) -> bool {
        matches!(
            self,
            CompareOp::Eq | CompareOp::Ne | CompareOp::StrictEq | CompareOp::StrictNe
        )
    }

    #[inline]
    pub const fn is_strict_equality(self) -> bool {
        matches!(self, CompareOp::StrictEq | CompareOp::StrictNe)
    }

    /// `Ne`/`StrictNe`: the result is the negation of an equality test.
    #[inline]
    pub const fn is_negated_equality(self) -> bool {
        matches!(self, CompareOp::Ne | CompareOp::StrictNe)
    }

    /// Operator with its operands swapped (`a < b` is `b > a`).
    pub const fn swapped(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    /// Evaluate against an ordering. `None` is the unordered (NaN) result.
    pub fn holds(self, ord: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        match (self, ord) {
            (CompareOp::Ne | CompareOp::StrictNe, None) => true,
            (_, None) => false,
            (CompareOp::Eq | CompareOp::StrictEq, Some(o)) => o == Equal,
            (CompareOp::Ne | CompareOp::StrictNe, Some(o)) => o != Equal,
            (CompareOp::Lt, Some(o)) => o == Less,
            (CompareOp::Le, Some(o)) => o != Greater,
            (CompareOp::Gt, Some(o)) => o == Greater,
            (CompareOp::Ge, Some(o)) => o != Less,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::StrictEq => "===",
            CompareOp::StrictNe => "!==",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Operand specialization of a `Compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareType {
    /// `x == undefined` with `x` boxed.
    Undefined = 0,
    /// `x == null` with `x` boxed.
    Null = 1,
    Int32 = 2,
    UInt32 = 3,
    Int64 = 4,
    UInt64 = 5,
    IntPtr = 6,
    UIntPtr = 7,
    Double = 8,
    Float32 = 9,
    String = 10,
    Symbol = 11,
    Object = 12,
    BigInt = 13,
    /// Generic comparison of boxed values.
    Unknown = 14,
}

impl CompareType {
    pub const ALL: [CompareType; 15] = [
        CompareType::Undefined,
        CompareType::Null,
        CompareType::Int32,
        CompareType::UInt32,
        CompareType::Int64,
        CompareType::UInt64,
        CompareType::IntPtr,
        CompareType::UIntPtr,
        CompareType::Double,
        CompareType::Float32,
        CompareType::String,
        CompareType::Symbol,
        CompareType::Object,
        CompareType::BigInt,
        CompareType::Unknown,
    ];

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    #[inline]
    pub const fn is_floating_point(self) -> bool {
        matches!(self, CompareType::Double | CompareType::Float32)
    }

    /// Compare types whose operands are machine integers.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            CompareType::Int32
                | CompareType::UInt32
                | CompareType::Int64
                | CompareType::UInt64
                | CompareType::IntPtr
                | CompareType::UIntPtr
        )
    }
}

// =============================================================================
// Per-opcode data
// =============================================================================

/// Fields shared by `Add` and `Sub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArithData {
    /// A NaN result must keep its payload; identity folds are disabled.
    pub must_preserve_nan: bool,
}

impl Default for ArithData {
    fn default() -> Self {
        ArithData {
            must_preserve_nan: false,
        }
    }
}

/// `Mul` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulData {
    pub must_preserve_nan: bool,
    pub can_be_negative_zero: bool,
}

impl Default for MulData {
    fn default() -> Self {
        MulData {
            must_preserve_nan: false,
            can_be_negative_zero: true,
        }
    }
}

/// `Div` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DivData {
    pub must_preserve_nan: bool,
    pub unsigned: bool,
    /// Wasm semantics: division by zero traps instead of producing 0.
    pub trap_on_error: bool,
    pub can_be_negative_zero: bool,
    pub can_be_negative_overflow: bool,
    pub can_be_divide_by_zero: bool,
}

impl Default for DivData {
    fn default() -> Self {
        DivData {
            must_preserve_nan: false,
            unsigned: false,
            trap_on_error: false,
            can_be_negative_zero: true,
            can_be_negative_overflow: true,
            can_be_divide_by_zero: true,
        }
    }
}

/// `Mod` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModData {
    pub must_preserve_nan: bool,
    pub unsigned: bool,
    pub trap_on_error: bool,
    pub can_be_negative_dividend: bool,
    pub can_be_divide_by_zero: bool,
    pub can_be_power_of_two_divisor: bool,
}

impl Default for ModData {
    fn default() -> Self {
        ModData {
            must_preserve_nan: false,
            unsigned: false,
            trap_on_error: false,
            can_be_negative_dividend: true,
            can_be_divide_by_zero: true,
            can_be_power_of_two_divisor: true,
        }
    }
}

/// Flags a `Phi` collects during float32 analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PhiData {
    pub can_produce_float32: bool,
    pub can_consume_float32: bool,
}

// =============================================================================
// Op
// =============================================================================

/// Opcode plus opcode-specific fields of a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // -- Values --
    Constant(Constant),
    Parameter { index: i32 },
    Phi(PhiData),
    Box,
    Unbox { mode: UnboxMode },

    // -- Arithmetic --
    Add(ArithData),
    Sub(ArithData),
    Mul(MulData),
    Div(DivData),
    Mod(ModData),
    Abs { fallible: bool },
    MinMax { is_max: bool },
    Pow,
    PowHalf,
    Sqrt,
    Sign,
    MathFunction { func: MathFunc },
    Hypot,
    NaNToZero { operand_is_never_nan: bool, operand_is_never_negative_zero: bool },
    Clz { operand_is_never_zero: bool },
    Ctz { operand_is_never_zero: bool },
    Popcnt,

    // -- Bitwise --
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Lsh,
    Rsh,
    Ursh { bailouts_disabled: bool },
    SignExtendInt32 { mode: SignExtendMode },
    SignExtendInt64 { mode: SignExtendMode },

    // -- Conversions --
    ToDouble,
    ToFloat32 { must_preserve_nan: bool },
    ToNumberInt32 { conversion: IntConversionInput, needs_negative_zero_check: bool },
    TruncateToInt32,
    ToInt64,
    Int32ToIntPtr,
    WrapInt64ToInt32 { bottom_half: bool },
    ExtendInt32ToInt64 { unsigned: bool },
    BooleanToInt32,
    ClampToUint8,
    LimitedTruncate { limit: TruncateKind },
    ToString,
    Int64ToBigInt { signed: bool },
    TruncateBigIntToInt64,
    ReinterpretCast,

    // -- Comparisons --
    Compare { op: CompareOp, compare_type: CompareType, truncate_operands: bool },
    Not,
    SameValue,
    SameValueDouble,

    // -- Strings --
    StringLength,
    Concat,

    // -- Memory --
    Slots,
    Elements,
    InitializedLength,
    ArrayLength,
    SetInitializedLength,
    LoadFixedSlot { slot: u32 },
    StoreFixedSlot { slot: u32, needs_barrier: bool },
    LoadDynamicSlot { slot: u32 },
    StoreDynamicSlot { slot: u32, needs_barrier: bool },
    LoadElement { needs_hole_check: bool },
    StoreElement { needs_hole_check: bool },
    ArrayPush,
    BoundsCheck { min: i32, max: i32, fallible: bool },
    NewObject { shape: ShapeHandle },
    NewArray { length: u32 },
    /// Virtual object: operand 0 is the allocation, the rest are slot values.
    ObjectState,

    // -- Guards --
    GuardShape { shape: ShapeHandle },
    GuardValue { expected: Constant },
    GuardNullOrUndefined,
    GuardIsNotObject,
    GuardObjectIdentity { bail_on_equality: bool },
    GuardSpecificAtom { atom: StringHandle },
    GuardSpecificSymbol { symbol: SymbolHandle },
    GuardSpecificInt32 { expected: i32 },
    GuardInt32IsNonNegative,
    GuardInt32Range { min: i32, max: i32 },

    // -- Effects --
    Call { argc: u32 },
    Random,
    Throw,

    // -- Control --
    Goto { target: BlockId },
    Test { if_true: BlockId, if_false: BlockId },
    TableSwitch { low: i32, cases: Vec<BlockId>, default: BlockId },
    Return,
}

/// Fieldless opcode tag with a stable wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum Opcode {
    Constant = 0,
    Parameter,
    Phi,
    Box,
    Unbox,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Abs,
    MinMax,
    Pow,
    PowHalf,
    Sqrt,
    Sign,
    MathFunction,
    Hypot,
    NaNToZero,
    Clz,
    Ctz,
    Popcnt,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Lsh,
    Rsh,
    Ursh,
    SignExtendInt32,
    SignExtendInt64,
    ToDouble,
    ToFloat32,
    ToNumberInt32,
    TruncateToInt32,
    ToInt64,
    Int32ToIntPtr,
    WrapInt64ToInt32,
    ExtendInt32ToInt64,
    BooleanToInt32,
    ClampToUint8,
    LimitedTruncate,
    ToString,
    Int64ToBigInt,
    TruncateBigIntToInt64,
    ReinterpretCast,
    Compare,
    Not,
    SameValue,
    SameValueDouble,
    StringLength,
    Concat,
    Slots,
    Elements,
    InitializedLength,
    ArrayLength,
    SetInitializedLength,
    LoadFixedSlot,
    StoreFixedSlot,
    LoadDynamicSlot,
    StoreDynamicSlot,
    LoadElement,
    StoreElement,
    ArrayPush,
    BoundsCheck,
    NewObject,
    NewArray,
    ObjectState,
    GuardShape,
    GuardValue,
    GuardNullOrUndefined,
    GuardIsNotObject,
    GuardObjectIdentity,
    GuardSpecificAtom,
    GuardSpecificSymbol,
    GuardSpecificInt32,
    GuardInt32IsNonNegative,
    GuardInt32Range,
    Call,
    Random,
    Throw,
    Goto,
    Test,
    TableSwitch,
    Return,
}

impl Op {
    /// The fieldless tag of this op.
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::Constant(_) => Opcode::Constant,
            Op::Parameter { .. } => Opcode::Parameter,
            Op::Phi(_) => Opcode::Phi,
            Op::Box => Opcode::Box,
            Op::Unbox { .. } => Opcode::Unbox,
            Op::Add(_) => Opcode::Add,
            Op::Sub(_) => Opcode::Sub,
            Op::Mul(_) => Opcode::Mul,
            Op::Div(_) => Opcode::Div,
            Op::Mod(_) => Opcode::Mod,
            Op::Abs { .. } => Opcode::Abs,
            Op::MinMax { .. } => Opcode::MinMax,
            Op::Pow => Opcode::Pow,
            Op::PowHalf => Opcode::PowHalf,
            Op::Sqrt => Opcode::Sqrt,
            Op::Sign => Opcode::Sign,
            Op::MathFunction { .. } => Opcode::MathFunction,
            Op::Hypot => Opcode::Hypot,
            Op::NaNToZero { .. } => Opcode::NaNToZero,
            Op::Clz { .. } => Opcode::Clz,
            Op::Ctz { .. } => Opcode::Ctz,
            Op::Popcnt => Opcode::Popcnt,
            Op::BitAnd => Opcode::BitAnd,
            Op::BitOr => Opcode::BitOr,
            Op::BitXor => Opcode::BitXor,
            Op::BitNot => Opcode::BitNot,
            Op::Lsh => Opcode::Lsh,
            Op::Rsh => Opcode::Rsh,
            Op::Ursh { .. } => Opcode::Ursh,
            Op::SignExtendInt32 { .. } => Opcode::SignExtendInt32,
            Op::SignExtendInt64 { .. } => Opcode::SignExtendInt64,
            Op::ToDouble => Opcode::ToDouble,
            Op::ToFloat32 { .. } => Opcode::ToFloat32,
            Op::ToNumberInt32 { .. } => Opcode::ToNumberInt32,
            Op::TruncateToInt32 => Opcode::TruncateToInt32,
            Op::ToInt64 => Opcode::ToInt64,
            Op::Int32ToIntPtr => Opcode::Int32ToIntPtr,
            Op::WrapInt64ToInt32 { .. } => Opcode::WrapInt64ToInt32,
            Op::ExtendInt32ToInt64 { .. } => Opcode::ExtendInt32ToInt64,
            Op::BooleanToInt32 => Opcode::BooleanToInt32,
            Op::ClampToUint8 => Opcode::ClampToUint8,
            Op::LimitedTruncate { .. } => Opcode::LimitedTruncate,
            Op::ToString => Opcode::ToString,
            Op::Int64ToBigInt { .. } => Opcode::Int64ToBigInt,
            Op::TruncateBigIntToInt64 => Opcode::TruncateBigIntToInt64,
            Op::ReinterpretCast => Opcode::ReinterpretCast,
            Op::Compare { .. } => Opcode::Compare,
            Op::Not => Opcode::Not,
            Op::SameValue => Opcode::SameValue,
            Op::SameValueDouble => Opcode::SameValueDouble,
            Op::StringLength => Opcode::StringLength,
            Op::Concat => Opcode::Concat,
            Op::Slots => Opcode::Slots,
            Op::Elements => Opcode::Elements,
            Op::InitializedLength => Opcode::InitializedLength,
            Op::ArrayLength => Opcode::ArrayLength,
            Op::SetInitializedLength => Opcode::SetInitializedLength,
            Op::LoadFixedSlot { .. } => Opcode::LoadFixedSlot,
            Op::StoreFixedSlot { .. } => Opcode::StoreFixedSlot,
            Op::LoadDynamicSlot { .. } => Opcode::LoadDynamicSlot,
            Op::StoreDynamicSlot { .. } => Opcode::StoreDynamicSlot,
            Op::LoadElement { .. } => Opcode::LoadElement,
            Op::StoreElement { .. } => Opcode::StoreElement,
            Op::ArrayPush => Opcode::ArrayPush,
            Op::BoundsCheck { .. } => Opcode::BoundsCheck,
            Op::NewObject { .. } => Opcode::NewObject,
            Op::NewArray { .. } => Opcode::NewArray,
            Op::ObjectState => Opcode::ObjectState,
            Op::GuardShape { .. } => Opcode::GuardShape,
            Op::GuardValue { .. } => Opcode::GuardValue,
            Op::GuardNullOrUndefined => Opcode::GuardNullOrUndefined,
            Op::GuardIsNotObject => Opcode::GuardIsNotObject,
            Op::GuardObjectIdentity { .. } => Opcode::GuardObjectIdentity,
            Op::GuardSpecificAtom { .. } => Opcode::GuardSpecificAtom,
            Op::GuardSpecificSymbol { .. } => Opcode::GuardSpecificSymbol,
            Op::GuardSpecificInt32 { .. } => Opcode::GuardSpecificInt32,
            Op::GuardInt32IsNonNegative => Opcode::GuardInt32IsNonNegative,
            Op::GuardInt32Range { .. } => Opcode::GuardInt32Range,
            Op::Call { .. } => Opcode::Call,
            Op::Random => Opcode::Random,
            Op::Throw => Opcode::Throw,
            Op::Goto { .. } => Opcode::Goto,
            Op::Test { .. } => Opcode::Test,
            Op::TableSwitch { .. } => Opcode::TableSwitch,
            Op::Return => Opcode::Return,
        }
    }

    /// The literal of a `Constant`.
    #[inline]
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Op::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Block terminators.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.opcode().is_control()
    }

    /// Successor blocks of a control op, in edge order. Duplicate targets of
    /// a table switch are listed once.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Op::Goto { target } => vec![*target],
            Op::Test { if_true, if_false } => vec![*if_true, *if_false],
            Op::TableSwitch { cases, default, .. } => {
                let mut out = Vec::with_capacity(cases.len() + 1);
                for &block in cases.iter().chain(std::iter::once(default)) {
                    if !out.contains(&block) {
                        out.push(block);
                    }
                }
                out
            }
            _ => Vec::new(),
        }
    }

    /// Redirect every edge to `from` so it targets `to`.
    pub fn replace_successor(&mut self, from: BlockId, to: BlockId) {
        let swap = |b: &mut BlockId| {
            if *b == from {
                *b = to;
            }
        };
        match self {
            Op::Goto { target } => swap(target),
            Op::Test { if_true, if_false } => {
                swap(if_true);
                swap(if_false);
            }
            Op::TableSwitch { cases, default, .. } => {
                cases.iter_mut().for_each(swap);
                swap(default);
            }
            _ => {}
        }
    }

    /// Whether NaN payloads produced by this op must be kept intact.
    pub fn must_preserve_nan(&self) -> bool {
        match self {
            Op::Add(d) | Op::Sub(d) => d.must_preserve_nan,
            Op::Mul(d) => d.must_preserve_nan,
            Op::Div(d) => d.must_preserve_nan,
            Op::Mod(d) => d.must_preserve_nan,
            Op::ToFloat32 { must_preserve_nan } => *must_preserve_nan,
            _ => false,
        }
    }
}

impl Opcode {
    /// Every opcode, in tag order.
    pub const COUNT: u16 = Opcode::Return as u16 + 1;

    /// Stable numeric tag.
    #[inline]
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// Block terminators.
    #[inline]
    pub const fn is_control(self) -> bool {
        matches!(
            self,
            Opcode::Goto | Opcode::Test | Opcode::TableSwitch | Opcode::Return | Opcode::Throw
        )
    }

    /// Binary ops whose operands may be swapped without changing the result.
    #[inline]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Mul
                | Opcode::BitAnd
                | Opcode::BitOr
                | Opcode::BitXor
                | Opcode::MinMax
        )
    }

    /// `Add`, `Sub`, `Mul`, `Div`, `Mod`.
    #[inline]
    pub const fn is_binary_arith(self) -> bool {
        matches!(
            self,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod
        )
    }

    /// Binary bitwise ops, shifts included.
    #[inline]
    pub const fn is_binary_bitwise(self) -> bool {
        matches!(
            self,
            Opcode::BitAnd
                | Opcode::BitOr
                | Opcode::BitXor
                | Opcode::Lsh
                | Opcode::Rsh
                | Opcode::Ursh
        )
    }

    #[inline]
    pub const fn is_guard_op(self) -> bool {
        matches!(
            self,
            Opcode::GuardShape
                | Opcode::GuardValue
                | Opcode::GuardNullOrUndefined
                | Opcode::GuardIsNotObject
                | Opcode::GuardObjectIdentity
                | Opcode::GuardSpecificAtom
                | Opcode::GuardSpecificSymbol
                | Opcode::GuardSpecificInt32
                | Opcode::GuardInt32IsNonNegative
                | Opcode::GuardInt32Range
        )
    }

    /// Fixed operand count, or `None` for variadic ops.
    pub const fn arity(self) -> Option<usize> {
        use Opcode::*;
        match self {
            Constant | Parameter | Random | Goto | NewObject | NewArray => Some(0),
            Phi | Hypot | Call | ObjectState => None,
            Add | Sub | Mul | Div | Mod | MinMax | Pow | BitAnd | BitOr | BitXor | Lsh
            | Rsh | Ursh | Compare | SameValue | SameValueDouble | Concat | LoadElement
            | SetInitializedLength | StoreFixedSlot | StoreDynamicSlot | ArrayPush
            | BoundsCheck | GuardObjectIdentity => Some(2),
            StoreElement => Some(3),
            Box | Unbox | Abs | PowHalf | Sqrt | Sign | MathFunction | NaNToZero | Clz
            | Ctz | Popcnt | BitNot | SignExtendInt32 | SignExtendInt64 | ToDouble
            | ToFloat32 | ToNumberInt32 | TruncateToInt32 | ToInt64 | Int32ToIntPtr
            | WrapInt64ToInt32 | ExtendInt32ToInt64 | BooleanToInt32 | ClampToUint8
            | LimitedTruncate | ToString | Int64ToBigInt | TruncateBigIntToInt64
            | ReinterpretCast | Not | StringLength | Slots | Elements | InitializedLength
            | ArrayLength | LoadFixedSlot | LoadDynamicSlot | GuardShape | GuardValue
            | GuardNullOrUndefined | GuardIsNotObject | GuardSpecificAtom
            | GuardSpecificSymbol | GuardSpecificInt32 | GuardInt32IsNonNegative
            | GuardInt32Range | Throw | Test | TableSwitch | Return => Some(1),
        }
    }

    pub const fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Constant => "Constant",
            Parameter => "Parameter",
            Phi => "Phi",
            Box => "Box",
            Unbox => "Unbox",
            Add => "Add",
            Sub => "Sub",
            Mul => "Mul",
            Div => "Div",
            Mod => "Mod",
            Abs => "Abs",
            MinMax => "MinMax",
            Pow => "Pow",
            PowHalf => "PowHalf",
            Sqrt => "Sqrt",
            Sign => "Sign",
            MathFunction => "MathFunction",
            Hypot => "Hypot",
            NaNToZero => "NaNToZero",
            Clz => "Clz",
            Ctz => "Ctz",
            Popcnt => "Popcnt",
            BitAnd => "BitAnd",
            BitOr => "BitOr",
            BitXor => "BitXor",
            BitNot => "BitNot",
            Lsh => "Lsh",
            Rsh => "Rsh",
            Ursh => "Ursh",
            SignExtendInt32 => "SignExtendInt32",
            SignExtendInt64 => "SignExtendInt64",
            ToDouble => "ToDouble",
            ToFloat32 => "ToFloat32",
            ToNumberInt32 => "ToNumberInt32",
            TruncateToInt32 => "TruncateToInt32",
            ToInt64 => "ToInt64",
            Int32ToIntPtr => "Int32ToIntPtr",
            WrapInt64ToInt32 => "WrapInt64ToInt32",
            ExtendInt32ToInt64 => "ExtendInt32ToInt64",
            BooleanToInt32 => "BooleanToInt32",
            ClampToUint8 => "ClampToUint8",
            LimitedTruncate => "LimitedTruncate",
            ToString => "ToString",
            Int64ToBigInt => "Int64ToBigInt",
            TruncateBigIntToInt64 => "TruncateBigIntToInt64",
            ReinterpretCast => "ReinterpretCast",
            Compare => "Compare",
            Not => "Not",
            SameValue => "SameValue",
            SameValueDouble => "SameValueDouble",
            StringLength => "StringLength",
            Concat => "Concat",
            Slots => "Slots",
            Elements => "Elements",
            InitializedLength => "InitializedLength",
            ArrayLength => "ArrayLength",
            SetInitializedLength => "SetInitializedLength",
            LoadFixedSlot => "LoadFixedSlot",
            StoreFixedSlot => "StoreFixedSlot",
            LoadDynamicSlot => "LoadDynamicSlot",
            StoreDynamicSlot => "StoreDynamicSlot",
            LoadElement => "LoadElement",
            StoreElement => "StoreElement",
            ArrayPush => "ArrayPush",
            BoundsCheck => "BoundsCheck",
            NewObject => "NewObject",
            NewArray => "NewArray",
            ObjectState => "ObjectState",
            GuardShape => "GuardShape",
            GuardValue => "GuardValue",
            GuardNullOrUndefined => "GuardNullOrUndefined",
            GuardIsNotObject => "GuardIsNotObject",
            GuardObjectIdentity => "GuardObjectIdentity",
            GuardSpecificAtom => "GuardSpecificAtom",
            GuardSpecificSymbol => "GuardSpecificSymbol",
            GuardSpecificInt32 => "GuardSpecificInt32",
            GuardInt32IsNonNegative => "GuardInt32IsNonNegative",
            GuardInt32Range => "GuardInt32Range",
            Call => "Call",
            Random => "Random",
            Throw => "Throw",
            Goto => "Goto",
            Test => "Test",
            TableSwitch => "TableSwitch",
            Return => "Return",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_compare_op_holds() {
        assert!(CompareOp::Lt.holds(Some(Ordering::Less)));
        assert!(!CompareOp::Lt.holds(Some(Ordering::Equal)));
        assert!(CompareOp::Ge.holds(Some(Ordering::Equal)));
        // Unordered: only inequality holds.
        assert!(!CompareOp::Eq.holds(None));
        assert!(!CompareOp::Le.holds(None));
        assert!(CompareOp::Ne.holds(None));
        assert!(CompareOp::StrictNe.holds(None));
    }

    #[test]
    fn test_swapped_is_involution() {
        for op in CompareOp::ALL {
            assert_eq!(op.swapped().swapped(), op);
        }
    }

    #[test]
    fn test_table_switch_successors_are_unique() {
        let a = BlockId::new(1);
        let b = BlockId::new(2);
        let op = Op::TableSwitch {
            low: 0,
            cases: vec![a, b, a],
            default: b,
        };
        assert_eq!(op.successors(), vec![a, b]);
    }

    #[test]
    fn test_replace_successor() {
        let a = BlockId::new(1);
        let b = BlockId::new(2);
        let c = BlockId::new(3);
        let mut op = Op::Test {
            if_true: a,
            if_false: b,
        };
        op.replace_successor(b, c);
        assert_eq!(op.successors(), vec![a, c]);
    }

    #[test]
    fn test_opcode_tags_are_dense() {
        assert_eq!(Opcode::Constant.tag(), 0);
        assert_eq!(Opcode::COUNT, Opcode::Return.tag() + 1);
        assert!(Opcode::Add.is_commutative());
        assert!(!Opcode::Sub.is_commutative());
        assert_eq!(Opcode::StoreElement.arity(), Some(3));
        assert_eq!(Opcode::Phi.arity(), None);
    }
}
