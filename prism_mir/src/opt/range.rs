//! Numeric ranges.
//!
//! A [`Range`] over-approximates the set of numbers a definition can take:
//! integer bounds (possibly beyond int32, up to 2^53) plus flags for
//! fractional parts, negative zero, NaN and infinities. [`compute_range`]
//! derives one definition's range from its operands' ranges; an external
//! range analysis decides iteration order and widening. The truncation and
//! edge-case passes read the results.

use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::{MathFunc, Op, SignExtendMode};
use crate::ir::types::MirType;
use crate::ir::constant::Constant;

/// Largest magnitude bound tracked; beyond it a side is unbounded.
const MAX_BOUND: i64 = 1 << 53;

/// An over-approximation of the values of a numeric definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    lower: i64,
    upper: i64,
    has_lower: bool,
    has_upper: bool,
    fractional: bool,
    negative_zero: bool,
    nan: bool,
    infinite: bool,
}

impl Range {
    /// Integer values in `[lower, upper]`.
    pub fn new(lower: i64, upper: i64) -> Self {
        debug_assert!(lower <= upper);
        let mut r = Range {
            lower,
            upper,
            has_lower: true,
            has_upper: true,
            fractional: false,
            negative_zero: false,
            nan: false,
            infinite: false,
        };
        r.normalize();
        r
    }

    pub fn int32(lower: i32, upper: i32) -> Self {
        Range::new(lower as i64, upper as i64)
    }

    pub fn full_int32() -> Self {
        Range::int32(i32::MIN, i32::MAX)
    }

    pub fn boolean() -> Self {
        Range::new(0, 1)
    }

    /// Any double.
    pub fn unknown() -> Self {
        Range {
            lower: 0,
            upper: 0,
            has_lower: false,
            has_upper: false,
            fractional: true,
            negative_zero: true,
            nan: true,
            infinite: true,
        }
    }

    /// The range of a single double value.
    pub fn from_double(d: f64) -> Self {
        if d.is_nan() {
            return Range {
                nan: true,
                ..Range::new(0, 0)
            };
        }
        if d.is_infinite() {
            let mut r = Range::unknown();
            r.nan = false;
            r.negative_zero = false;
            r.fractional = false;
            if d > 0.0 {
                r.has_lower = true;
                r.lower = MAX_BOUND;
            } else {
                r.has_upper = true;
                r.upper = -MAX_BOUND;
            }
            return r;
        }
        let mut r = Range::new(d.floor() as i64, d.ceil() as i64);
        r.fractional = d.fract() != 0.0;
        r.negative_zero = d == 0.0 && d.is_sign_negative();
        r
    }

    fn normalize(&mut self) {
        if self.has_lower && self.lower.abs() > MAX_BOUND {
            if self.lower > 0 {
                self.lower = MAX_BOUND;
            } else {
                self.has_lower = false;
            }
        }
        if self.has_upper && self.upper.abs() > MAX_BOUND {
            if self.upper < 0 {
                self.upper = -MAX_BOUND;
            } else {
                self.has_upper = false;
            }
        }
        if !self.has_lower || !self.has_upper {
            self.infinite = true;
        }
    }

    #[inline]
    pub fn lower(&self) -> Option<i64> {
        self.has_lower.then_some(self.lower)
    }

    #[inline]
    pub fn upper(&self) -> Option<i64> {
        self.has_upper.then_some(self.upper)
    }

    #[inline]
    pub fn can_have_fractional_part(&self) -> bool {
        self.fractional
    }

    #[inline]
    pub fn can_be_negative_zero(&self) -> bool {
        self.negative_zero
    }

    #[inline]
    pub fn can_be_nan(&self) -> bool {
        self.nan
    }

    #[inline]
    pub fn can_be_infinite(&self) -> bool {
        self.infinite
    }

    fn lower_or(&self, d: i64) -> i64 {
        if self.has_lower {
            self.lower
        } else {
            d
        }
    }

    fn upper_or(&self, d: i64) -> i64 {
        if self.has_upper {
            self.upper
        } else {
            d
        }
    }

    /// Bounds within int32 and no fractional, `-0`, NaN or infinite values.
    pub fn is_int32(&self) -> bool {
        self.has_int32_bounds()
            && !self.fractional
            && !self.negative_zero
            && !self.nan
            && !self.infinite
    }

    pub fn has_int32_bounds(&self) -> bool {
        self.has_lower
            && self.has_upper
            && self.lower >= i32::MIN as i64
            && self.upper <= i32::MAX as i64
    }

    pub fn contains(&self, v: i64) -> bool {
        (!self.has_lower || self.lower <= v) && (!self.has_upper || v <= self.upper)
    }

    /// Zero, or negative zero.
    pub fn can_be_zero(&self) -> bool {
        self.contains(0) || self.negative_zero
    }

    pub fn can_be_negative(&self) -> bool {
        !self.has_lower || self.lower < 0 || self.negative_zero
    }

    pub fn is_finite_non_negative(&self) -> bool {
        self.has_lower && self.lower >= 0 && !self.nan && !self.infinite
    }

    pub fn is_finite_negative(&self) -> bool {
        self.has_upper && self.upper < 0 && !self.nan && !self.infinite
    }

    // =========================================================================
    // Lattice
    // =========================================================================

    pub fn union(&self, other: &Range) -> Range {
        Range {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
            has_lower: self.has_lower && other.has_lower,
            has_upper: self.has_upper && other.has_upper,
            fractional: self.fractional || other.fractional,
            negative_zero: self.negative_zero || other.negative_zero,
            nan: self.nan || other.nan,
            infinite: self.infinite || other.infinite,
        }
    }

    /// Narrow the integer bounds to `[lower, upper]`.
    pub fn intersect_bounds(&self, lower: i64, upper: i64) -> Range {
        let mut r = *self;
        r.lower = if r.has_lower { r.lower.max(lower) } else { lower };
        r.upper = if r.has_upper { r.upper.min(upper) } else { upper };
        r.has_lower = true;
        r.has_upper = true;
        if r.lower > r.upper {
            // Unreachable values; keep a degenerate but valid range.
            r.upper = r.lower;
        }
        r.infinite = false;
        r.negative_zero &= r.contains(0);
        r
    }

    /// The values after `ToInt32`.
    pub fn wrap_around_to_int32(&self) -> Range {
        if self.has_int32_bounds() {
            let mut lower = self.lower;
            let mut upper = self.upper;
            if self.nan || self.negative_zero {
                lower = lower.min(0);
                upper = upper.max(0);
            }
            Range::new(lower, upper)
        } else {
            Range::full_int32()
        }
    }

    /// Clamp to int32 bounds; values outside bail out instead of wrapping.
    pub fn clamp_to_int32(&self) -> Range {
        let mut r = self.intersect_bounds(i32::MIN as i64, i32::MAX as i64);
        r.fractional = false;
        r.negative_zero = false;
        r.nan = false;
        r
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    pub fn add(&self, rhs: &Range) -> Range {
        let mut r = Range {
            lower: self.lower.saturating_add(rhs.lower),
            upper: self.upper.saturating_add(rhs.upper),
            has_lower: self.has_lower && rhs.has_lower,
            has_upper: self.has_upper && rhs.has_upper,
            fractional: self.fractional || rhs.fractional,
            negative_zero: self.negative_zero && rhs.negative_zero,
            nan: self.nan || rhs.nan || (self.infinite && rhs.infinite),
            infinite: self.infinite || rhs.infinite,
        };
        r.normalize();
        r
    }

    pub fn sub(&self, rhs: &Range) -> Range {
        let mut r = Range {
            lower: self.lower.saturating_sub(rhs.upper),
            upper: self.upper.saturating_sub(rhs.lower),
            has_lower: self.has_lower && rhs.has_upper,
            has_upper: self.has_upper && rhs.has_lower,
            fractional: self.fractional || rhs.fractional,
            negative_zero: self.negative_zero && rhs.can_be_zero(),
            nan: self.nan || rhs.nan || (self.infinite && rhs.infinite),
            infinite: self.infinite || rhs.infinite,
        };
        r.normalize();
        r
    }

    pub fn mul(&self, rhs: &Range) -> Range {
        let negative_zero = (self.can_be_zero() && rhs.can_be_negative())
            || (rhs.can_be_zero() && self.can_be_negative());
        let nan = self.nan
            || rhs.nan
            || (self.infinite && rhs.can_be_zero())
            || (rhs.infinite && self.can_be_zero());
        let fractional = self.fractional || rhs.fractional;
        if !(self.has_lower && self.has_upper && rhs.has_lower && rhs.has_upper) {
            return Range {
                fractional,
                negative_zero,
                nan,
                ..Range::unknown()
            };
        }
        let corners = [
            self.lower.saturating_mul(rhs.lower),
            self.lower.saturating_mul(rhs.upper),
            self.upper.saturating_mul(rhs.lower),
            self.upper.saturating_mul(rhs.upper),
        ];
        let mut r = Range {
            lower: corners.iter().copied().min().unwrap_or(0),
            upper: corners.iter().copied().max().unwrap_or(0),
            has_lower: true,
            has_upper: true,
            fractional,
            negative_zero,
            nan,
            infinite: self.infinite || rhs.infinite,
        };
        r.normalize();
        r
    }

    /// Int32 quotient: never larger in magnitude than the dividend.
    pub fn div_int32(&self, _rhs: &Range) -> Range {
        let m = self.lower_or(i32::MIN as i64).abs().max(self.upper_or(i32::MAX as i64).abs());
        Range::new(-m, m).clamp_to_int32()
    }

    /// Remainder: bounded by the divisor, with the dividend's sign.
    pub fn mod_(&self, rhs: &Range) -> Range {
        let nan = self.nan || rhs.nan || self.infinite || rhs.can_be_zero();
        let divisor_max = match (rhs.lower(), rhs.upper()) {
            (Some(l), Some(u)) => l.abs().max(u.abs()),
            _ => MAX_BOUND,
        };
        let bound = if rhs.fractional { divisor_max } else { (divisor_max - 1).max(0) };
        let lower = if self.has_lower && self.lower >= 0 {
            0
        } else {
            -bound.min(self.lower_or(i64::MIN).saturating_abs())
        };
        let upper = if self.has_upper && self.upper <= 0 {
            0
        } else {
            bound.min(self.upper_or(i64::MAX))
        };
        let mut r = Range::new(lower.min(upper), upper.max(lower));
        r.fractional = self.fractional || rhs.fractional;
        r.negative_zero = self.can_be_negative();
        r.nan = nan;
        r
    }

    pub fn abs(&self) -> Range {
        let lo = self.lower_or(i64::MIN);
        let hi = self.upper_or(i64::MAX);
        let upper = lo.saturating_abs().max(hi.saturating_abs());
        let lower = if lo >= 0 {
            lo
        } else if hi <= 0 {
            hi.saturating_abs()
        } else {
            0
        };
        let mut r = Range {
            lower,
            upper,
            has_lower: true,
            has_upper: self.has_lower && self.has_upper,
            fractional: self.fractional,
            negative_zero: false,
            nan: self.nan,
            infinite: self.infinite,
        };
        r.normalize();
        r
    }

    pub fn min(&self, rhs: &Range) -> Range {
        let mut r = Range {
            lower: self.lower.min(rhs.lower),
            upper: self.upper.min(rhs.upper),
            has_lower: self.has_lower && rhs.has_lower,
            has_upper: self.has_upper || rhs.has_upper,
            fractional: self.fractional || rhs.fractional,
            negative_zero: self.negative_zero || rhs.negative_zero,
            nan: self.nan || rhs.nan,
            infinite: self.infinite || rhs.infinite,
        };
        if !self.has_upper {
            r.upper = rhs.upper;
        } else if !rhs.has_upper {
            r.upper = self.upper;
        }
        r
    }

    pub fn max(&self, rhs: &Range) -> Range {
        let mut r = Range {
            lower: self.lower.max(rhs.lower),
            upper: self.upper.max(rhs.upper),
            has_lower: self.has_lower || rhs.has_lower,
            has_upper: self.has_upper && rhs.has_upper,
            fractional: self.fractional || rhs.fractional,
            negative_zero: self.negative_zero || rhs.negative_zero,
            nan: self.nan || rhs.nan,
            infinite: self.infinite || rhs.infinite,
        };
        if !self.has_lower {
            r.lower = rhs.lower;
        } else if !rhs.has_lower {
            r.lower = self.lower;
        }
        r
    }

    pub fn sign(&self) -> Range {
        let lower = if self.has_lower && self.lower >= 0 { 0 } else { -1 };
        let upper = if self.has_upper && self.upper <= 0 { 0 } else { 1 };
        let mut r = Range::new(lower, upper);
        r.negative_zero = self.negative_zero;
        r.nan = self.nan;
        r
    }

    // =========================================================================
    // Bitwise
    // =========================================================================

    pub fn bit_and(&self, rhs: &Range) -> Range {
        let l_nonneg = self.has_lower && self.lower >= 0 && self.has_int32_bounds();
        let r_nonneg = rhs.has_lower && rhs.lower >= 0 && rhs.has_int32_bounds();
        match (l_nonneg, r_nonneg) {
            (true, true) => Range::new(0, self.upper.min(rhs.upper)),
            (true, false) => Range::new(0, self.upper),
            (false, true) => Range::new(0, rhs.upper),
            (false, false) => Range::full_int32(),
        }
    }

    /// Shared bound for `|` and `^` of two non-negative int32 ranges.
    fn bitwise_nonneg_upper(&self, rhs: &Range) -> Option<i64> {
        let ok = |r: &Range| r.has_lower && r.lower >= 0 && r.has_int32_bounds();
        if !ok(self) || !ok(rhs) {
            return None;
        }
        let max = self.upper.max(rhs.upper) as u64;
        Some((max.next_power_of_two() as i64 * 2 - 1).min(i32::MAX as i64))
    }

    pub fn bit_or(&self, rhs: &Range) -> Range {
        match self.bitwise_nonneg_upper(rhs) {
            Some(upper) => Range::new(self.lower.max(rhs.lower), upper),
            None => Range::full_int32(),
        }
    }

    pub fn bit_xor(&self, rhs: &Range) -> Range {
        match self.bitwise_nonneg_upper(rhs) {
            Some(upper) => Range::new(0, upper),
            None => Range::full_int32(),
        }
    }

    pub fn bit_not(&self) -> Range {
        if self.has_int32_bounds() {
            Range::new(!self.upper, !self.lower)
        } else {
            Range::full_int32()
        }
    }

    pub fn lsh(&self, shift: i32) -> Range {
        let shift = (shift & 31) as u32;
        if self.has_int32_bounds() {
            let lower = self.lower << shift;
            let upper = self.upper << shift;
            if lower >= i32::MIN as i64 && upper <= i32::MAX as i64 {
                return Range::new(lower, upper);
            }
        }
        Range::full_int32()
    }

    pub fn rsh(&self, shift: i32) -> Range {
        let shift = (shift & 31) as u32;
        let r = self.wrap_around_to_int32();
        Range::new(r.lower >> shift, r.upper >> shift)
    }

    pub fn ursh(&self, shift: i32) -> Range {
        let shift = (shift & 31) as u32;
        let r = self.wrap_around_to_int32();
        if r.lower >= 0 {
            Range::new(r.lower >> shift, r.upper >> shift)
        } else {
            Range::new(0, (u32::MAX >> shift) as i64)
        }
    }
}

// =============================================================================
// Per-definition computation
// =============================================================================

/// Range implied by a definition's type alone.
pub fn range_for_type(ty: MirType) -> Option<Range> {
    match ty {
        MirType::Int32 => Some(Range::full_int32()),
        MirType::Boolean => Some(Range::boolean()),
        MirType::Double | MirType::Float32 => Some(Range::unknown()),
        _ => None,
    }
}

/// Range of a constant.
pub fn range_for_constant(c: &Constant) -> Option<Range> {
    match *c {
        Constant::Int32(v) => Some(Range::int32(v, v)),
        Constant::Boolean(b) => Some(Range::new(b as i64, b as i64)),
        Constant::Double(d) => Some(Range::from_double(d)),
        Constant::Float32(f) => Some(Range::from_double(f as f64)),
        _ => None,
    }
}

/// The best known range of `def`: its recorded range, its constant value,
/// or what its type implies.
pub fn range_of(g: &Graph, def: DefId) -> Option<Range> {
    if let Some(r) = g.def(def).range() {
        return Some(*r);
    }
    if let Some(c) = g.as_constant(def) {
        return range_for_constant(&c);
    }
    range_for_type(g.ty(def))
}

/// Compute the range of `def` from its operands.
pub fn compute_range(g: &Graph, def: DefId) -> Option<Range> {
    let d = g.def(def);
    let ty = d.ty();
    let operand = |i: usize| range_of(g, g.operand(def, i));
    let int32_result = |r: Range| {
        if ty == MirType::Int32 {
            if d.is_truncated() {
                r.wrap_around_to_int32()
            } else {
                r.clamp_to_int32()
            }
        } else {
            r
        }
    };

    let range = match d.op() {
        Op::Constant(c) => range_for_constant(c)?,
        Op::Add(_) => int32_result(operand(0)?.add(&operand(1)?)),
        Op::Sub(_) => int32_result(operand(0)?.sub(&operand(1)?)),
        Op::Mul(data) => {
            let mut r = int32_result(operand(0)?.mul(&operand(1)?));
            if !data.can_be_negative_zero {
                r.negative_zero = false;
            }
            r
        }
        Op::Div(data) => {
            if ty == MirType::Int32 && !data.unsigned {
                operand(0)?.div_int32(&operand(1)?)
            } else {
                return range_for_type(ty);
            }
        }
        Op::Mod(data) => {
            if data.unsigned {
                return range_for_type(ty);
            }
            int32_result(operand(0)?.mod_(&operand(1)?))
        }
        Op::Abs { .. } => int32_result(operand(0)?.abs()),
        Op::MinMax { is_max } => {
            let (a, b) = (operand(0)?, operand(1)?);
            if *is_max {
                a.max(&b)
            } else {
                a.min(&b)
            }
        }
        Op::Sign => int32_result(operand(0)?.sign()),
        Op::Sqrt => {
            let r = operand(0)?;
            if r.is_finite_non_negative() {
                let upper = r.upper().map(|u| (u as f64).sqrt().ceil() as i64);
                let mut out = Range::new(0, upper.unwrap_or(MAX_BOUND));
                out.fractional = true;
                out.negative_zero = r.negative_zero;
                out
            } else {
                return range_for_type(ty);
            }
        }
        Op::MathFunction { func } if func.is_rounding() => {
            let mut r = operand(0)?;
            r.fractional = false;
            r.negative_zero |= *func != MathFunc::Floor && r.contains(0);
            int32_result(r)
        }
        Op::NaNToZero { .. } => {
            let mut r = operand(0)?;
            if r.nan {
                r = r.union(&Range::new(0, 0));
                r.nan = false;
            }
            r.negative_zero = false;
            r
        }
        Op::Clz { .. } | Op::Ctz { .. } | Op::Popcnt => {
            if ty == MirType::Int64 {
                Range::new(0, 64)
            } else {
                Range::new(0, 32)
            }
        }
        Op::BitAnd if ty == MirType::Int32 => operand(0)?.bit_and(&operand(1)?),
        Op::BitOr if ty == MirType::Int32 => operand(0)?.bit_or(&operand(1)?),
        Op::BitXor if ty == MirType::Int32 => operand(0)?.bit_xor(&operand(1)?),
        Op::BitNot => operand(0)?.bit_not(),
        Op::Lsh | Op::Rsh | Op::Ursh { .. } => {
            let lhs = operand(0)?;
            match g.as_int32(g.operand(def, 1)) {
                Some(shift) => match d.op() {
                    Op::Lsh => lhs.lsh(shift),
                    Op::Rsh => lhs.rsh(shift),
                    _ => int32_result(lhs.ursh(shift)),
                },
                None => match d.op() {
                    Op::Rsh => {
                        let w = lhs.wrap_around_to_int32();
                        Range::new(w.lower.min(0), w.upper.max(0))
                    }
                    Op::Ursh { .. } => int32_result(Range::new(0, u32::MAX as i64)),
                    _ => Range::full_int32(),
                },
            }
        }
        Op::SignExtendInt32 { mode } => match mode {
            SignExtendMode::Byte => Range::new(-128, 127),
            SignExtendMode::Half => Range::new(-32768, 32767),
            SignExtendMode::Word => Range::full_int32(),
        },
        Op::ToDouble | Op::ToFloat32 { .. } => operand(0)?,
        Op::TruncateToInt32 => operand(0)?.wrap_around_to_int32(),
        Op::ToNumberInt32 { .. } => operand(0)?.clamp_to_int32(),
        Op::LimitedTruncate { .. } => operand(0)?,
        Op::BooleanToInt32
        | Op::Compare { .. }
        | Op::Not
        | Op::SameValue
        | Op::SameValueDouble => Range::boolean(),
        Op::ClampToUint8 => Range::new(0, 255),
        Op::StringLength | Op::InitializedLength | Op::ArrayLength => {
            Range::int32(0, i32::MAX)
        }
        Op::Random => {
            let mut r = Range::new(0, 1);
            r.fractional = true;
            r
        }
        Op::Phi(_) => {
            let mut acc: Option<Range> = None;
            for op in g.operands(def) {
                if op == def {
                    continue;
                }
                let r = range_of(g, op)?;
                acc = Some(match acc {
                    Some(a) => a.union(&r),
                    None => r,
                });
            }
            acc?
        }
        Op::GuardInt32Range { min, max } => {
            operand(0)?.intersect_bounds(*min as i64, *max as i64)
        }
        Op::GuardInt32IsNonNegative => operand(0)?.intersect_bounds(0, i32::MAX as i64),
        Op::GuardSpecificInt32 { expected } => Range::int32(*expected, *expected),
        Op::BoundsCheck { min, max, .. } => {
            let index = operand(0)?;
            let length = operand(1)?;
            let upper = length.upper_or(i32::MAX as i64) - 1 - *max as i64;
            index.intersect_bounds(-(*min as i64), upper.max(-(*min as i64)))
        }
        _ => return range_for_type(ty),
    };
    Some(range)
}

/// Record ranges for every definition in the entry-reachable blocks, in
/// reverse postorder. Loop phis see only the ranges known at that point.
pub fn analyze_ranges(g: &mut Graph) {
    let order: Vec<DefId> = g
        .rpo()
        .to_vec()
        .into_iter()
        .flat_map(|b| {
            let block = g.block(b);
            block
                .phis()
                .iter()
                .chain(block.instructions())
                .copied()
                .collect::<Vec<_>>()
        })
        .collect();
    for def in order {
        let range = compute_range(g, def);
        g.def_mut(def).set_range(range);
    }
}
