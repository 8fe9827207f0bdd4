//! Math builtins: min/max, pow and the unary library functions.

use super::{emit, emit_constant};
use crate::error::MirResult;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::{DefFlags, DefId, TruncateKind};
use crate::ir::opcode::{MathFunc, MulData, Op, Opcode};
use crate::ir::types::MirType;
use crate::opt::numeric::{js_max, js_min, js_pow, js_round, js_sign, number_is_int32};

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    match g.opcode(ins) {
        Opcode::MinMax => fold_min_max(g, ins),
        Opcode::Pow => fold_pow(g, ins),
        Opcode::Clz | Opcode::Ctz | Opcode::Popcnt => fold_bit_count(g, ins),
        // Library results may differ from the runtime's by an ulp.
        Opcode::Hypot => Ok(None),
        _ => fold_unary(g, ins),
    }
}

/// Numeric value of a constant operand.
fn number(g: &Graph, def: DefId) -> Option<f64> {
    g.as_constant(def).and_then(|c| c.number_to_double())
}

/// A constant of type `ty` holding `d`, if `ty` can represent it.
/// Int32 accepts `-0` as `0`.
fn typed_constant(ty: MirType, d: f64) -> Option<Constant> {
    match ty {
        MirType::Int32 if d == 0.0 => Some(Constant::Int32(0)),
        MirType::Int32 => number_is_int32(d).map(Constant::Int32),
        MirType::Float32 => Some(Constant::Float32(d as f32)),
        MirType::Double => Some(Constant::Double(d)),
        _ => None,
    }
}

// =============================================================================
// Unary functions
// =============================================================================

fn fold_unary(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let ty = g.ty(ins);
    let Some(x) = number(g, g.operand(ins, 0)) else {
        return Ok(None);
    };
    let result = match *g.op(ins) {
        Op::Abs { .. } => x.abs(),
        Op::Sqrt => x.sqrt(),
        Op::PowHalf => js_pow(x, 0.5),
        Op::Sign => js_sign(x),
        Op::NaNToZero { .. } => {
            if x.is_nan() || x == 0.0 {
                0.0
            } else {
                x
            }
        }
        Op::MathFunction { func } => match func {
            MathFunc::Floor => x.floor(),
            MathFunc::Ceil => x.ceil(),
            MathFunc::Round => js_round(x),
            MathFunc::Trunc => x.trunc(),
            // Library results may differ from the runtime's by an ulp.
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    let folded = match ty {
        // Int32 results must be exact; -0 and overflow decline.
        MirType::Int32 => number_is_int32(result).map(Constant::Int32),
        _ => typed_constant(ty, result),
    };
    match folded {
        Some(c) => emit_constant(g, ins, c).map(Some),
        None => Ok(None),
    }
}

fn fold_bit_count(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let Some(c) = g.as_constant(g.operand(ins, 0)) else {
        return Ok(None);
    };
    let opcode = g.opcode(ins);
    let folded = match c {
        Constant::Int32(v) => Constant::Int32(match opcode {
            Opcode::Clz => v.leading_zeros(),
            Opcode::Ctz => v.trailing_zeros(),
            _ => v.count_ones(),
        } as i32),
        Constant::Int64(v) => Constant::Int64(match opcode {
            Opcode::Clz => v.leading_zeros(),
            Opcode::Ctz => v.trailing_zeros(),
            _ => v.count_ones(),
        } as i64),
        _ => return Ok(None),
    };
    emit_constant(g, ins, folded).map(Some)
}

// =============================================================================
// Pow
// =============================================================================

fn fold_pow(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let ty = g.ty(ins);
    let (base, power) = (g.operand(ins, 0), g.operand(ins, 1));
    let Some(p) = number(g, power) else {
        return Ok(None);
    };

    if let Some(x) = number(g, base) {
        let result = js_pow(x, p);
        let folded = match ty {
            MirType::Int32 => number_is_int32(result).map(Constant::Int32),
            _ => Some(Constant::Double(result)),
        };
        return match folded {
            Some(c) => emit_constant(g, ins, c).map(Some),
            None => Ok(None),
        };
    }

    if p == 0.5 && ty == MirType::Double {
        return emit(g, ins, NodeSpec::pow_half(base)).map(Some);
    }
    if p == -0.5 && ty == MirType::Double {
        let half = emit(g, ins, NodeSpec::pow_half(base))?;
        let one = emit_constant(g, ins, Constant::Double(1.0))?;
        return emit(g, ins, NodeSpec::div(one, half, MirType::Double)).map(Some);
    }
    if p == 1.0 {
        return Ok(Some(base));
    }
    if p == 2.0 {
        return multiply(g, ins, base, base).map(Some);
    }
    if p == 3.0 {
        let square = multiply(g, ins, base, base)?;
        return multiply(g, ins, base, square).map(Some);
    }
    if p == 4.0 {
        let square = multiply(g, ins, base, base)?;
        return multiply(g, ins, square, square).map(Some);
    }
    if p.is_nan() {
        return Ok(Some(power));
    }
    Ok(None)
}

/// `lhs * rhs` with the type and bailout kind of `pow`. A square cannot
/// be negative zero.
fn multiply(g: &mut Graph, pow: DefId, lhs: DefId, rhs: DefId) -> MirResult<DefId> {
    let ty = g.ty(pow);
    let mut spec = NodeSpec::mul(lhs, rhs, ty).with_bailout_kind(g.def(pow).bailout_kind());
    spec.op = Op::Mul(MulData {
        must_preserve_nan: false,
        can_be_negative_zero: lhs != rhs,
    });
    emit(g, pow, spec)
}

// =============================================================================
// Min / Max
// =============================================================================

fn min_max_parts(g: &Graph, def: DefId) -> Option<(bool, DefId, DefId)> {
    match g.op(def) {
        Op::MinMax { is_max } => Some((*is_max, g.operand(def, 0), g.operand(def, 1))),
        _ => None,
    }
}

fn fold_min_max_constants(ty: MirType, a: f64, b: f64, is_max: bool) -> Option<Constant> {
    let result = if is_max { js_max(a, b) } else { js_min(a, b) };
    typed_constant(ty, result)
}

/// Lengths are never negative.
fn fold_length(g: &Graph, operand: DefId, constant: DefId, is_max: bool) -> Option<DefId> {
    let is_length = matches!(g.opcode(operand), Opcode::ArrayLength | Opcode::StringLength);
    match g.as_int32(constant) {
        Some(c) if is_length && c <= 0 => Some(if is_max { operand } else { constant }),
        _ => None,
    }
}

fn fold_min_max(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let Some((is_max, lhs, rhs)) = min_max_parts(g, ins) else {
        return Ok(None);
    };
    let ty = g.ty(ins);
    if lhs == rhs {
        return Ok(Some(lhs));
    }

    // min(min(x, z), min(y, z)) with constant x and y.
    if let (Some(left), Some(right)) = (min_max_parts(g, lhs), min_max_parts(g, rhs)) {
        if left.0 == right.0 {
            let shared = if left.1 == right.1 {
                Some((left.2, right.2, left.1))
            } else if left.1 == right.2 {
                Some((left.2, right.1, left.1))
            } else if left.2 == right.1 {
                Some((left.1, right.2, left.2))
            } else if left.2 == right.2 {
                Some((left.1, right.1, left.2))
            } else {
                None
            };
            if let Some((x, y, z)) = shared {
                if let (Some(a), Some(b)) = (number(g, x), number(g, y)) {
                    if let Some(c) = fold_min_max_constants(g.ty(x), a, b, is_max) {
                        let folded = emit_constant(g, ins, c)?;
                        return emit(g, ins, NodeSpec::min_max(folded, z, left.0, ty)).map(Some);
                    }
                }
            }
        }
    }

    // min(x, min(x, y)) and max(x, min(x, y)).
    let nested = if min_max_parts(g, lhs).is_some() {
        Some((lhs, rhs))
    } else if min_max_parts(g, rhs).is_some() {
        Some((rhs, lhs))
    } else {
        None
    };
    if let Some((other, operand)) = nested {
        if let Some((other_is_max, o_lhs, o_rhs)) = min_max_parts(g, other) {
            if operand == o_lhs || operand == o_rhs {
                if is_max == other_is_max {
                    return Ok(Some(other));
                }
                if !ty.is_floating_point() {
                    let other_op = if operand == o_lhs { o_rhs } else { o_lhs };
                    g.def_mut(other_op).set_flag(DefFlags::GUARD_RANGE_BAILOUTS);
                    return Ok(Some(operand));
                }
            }
        }
    }

    let (l_const, r_const) = (number(g, lhs), number(g, rhs));
    if let (Some(a), Some(b)) = (l_const, r_const) {
        return match fold_min_max_constants(ty, a, b, is_max) {
            Some(c) => emit_constant(g, ins, c).map(Some),
            None => Ok(None),
        };
    }
    let (operand, constant, value) = match (l_const, r_const) {
        (Some(v), None) => (rhs, lhs, v),
        (None, Some(v)) => (lhs, rhs, v),
        _ => return Ok(None),
    };

    // min(int32, c >= INT32_MAX) and max(int32, c <= INT32_MIN) are the int32.
    if g.opcode(operand) == Opcode::ToDouble {
        let int = g.operand(operand, 0);
        let bounded = if is_max {
            value <= i32::MIN as f64
        } else {
            value >= i32::MAX as f64
        };
        if g.ty(int) == MirType::Int32 && bounded {
            let limit = emit(
                g,
                ins,
                NodeSpec::limited_truncate(int, TruncateKind::NoTruncate, MirType::Int32),
            )?;
            return emit(g, ins, NodeSpec::to_double(limit)).map(Some);
        }
    }

    if let Some(folded) = fold_length(g, operand, constant, is_max) {
        return Ok(Some(folded));
    }

    // Nested min/max with constants.
    if let Some((other_is_max, o_lhs, o_rhs)) = min_max_parts(g, operand) {
        let (other_constant, other_operand) = match (number(g, o_lhs), number(g, o_rhs)) {
            (Some(c), _) => (c, o_rhs),
            (None, Some(c)) => (c, o_lhs),
            _ => return Ok(None),
        };
        if is_max == other_is_max {
            // min(c1, min(c2, z)) is min(min(c1, c2), z).
            if let Some(c) = fold_min_max_constants(g.ty(constant), value, other_constant, is_max) {
                let left = emit_constant(g, ins, c)?;
                return emit(g, ins, NodeSpec::min_max(left, other_operand, is_max, ty)).map(Some);
            }
        } else if let Some(right) = fold_length(g, other_operand, constant, is_max) {
            // min(c1, max(c2, z)) is max(min(c1, c2), min(c1, z)).
            if let Some(c) = fold_min_max_constants(g.ty(constant), value, other_constant, is_max) {
                let left = emit_constant(g, ins, c)?;
                return emit(g, ins, NodeSpec::min_max(left, right, !is_max, ty)).map(Some);
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::super::folds_to;
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::host::HostTable;

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    fn double(g: &mut Graph, v: f64) -> DefId {
        g.add_node(NodeSpec::constant(Constant::Double(v)))
    }

    #[test]
    fn test_hypot_of_constants_not_folded() {
        let mut g = graph();
        let a = double(&mut g, 3.0);
        let b = double(&mut g, 4.0);
        let h = g.add_node(NodeSpec::hypot(&[a, b]));
        assert_eq!(folds_to(&mut g, h).unwrap(), h);
        assert!(g.as_constant(h).is_none());
    }

    #[test]
    fn test_min_max_constants() {
        let mut g = graph();
        let a = double(&mut g, 0.0);
        let b = double(&mut g, -0.0);
        let min = g.add_node(NodeSpec::min_max(a, b, false, MirType::Double));
        let folded = folds_to(&mut g, min).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Double(-0.0)));

        let nan = double(&mut g, f64::NAN);
        let max = g.add_node(NodeSpec::min_max(a, nan, true, MirType::Double));
        let folded = folds_to(&mut g, max).unwrap();
        assert!(g.as_constant(folded).is_some_and(|c| c.is_nan()));
    }

    #[test]
    fn test_min_max_same_operand() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let y = g.add_node(NodeSpec::parameter(1, MirType::Int32));
        let same = g.add_node(NodeSpec::min_max(x, x, true, MirType::Int32));
        assert_eq!(folds_to(&mut g, same).unwrap(), x);

        let inner = g.add_node(NodeSpec::min_max(x, y, false, MirType::Int32));
        let outer = g.add_node(NodeSpec::min_max(x, inner, false, MirType::Int32));
        assert_eq!(folds_to(&mut g, outer).unwrap(), inner);

        // max(x, min(x, y)) is x for non-floating types.
        let mixed = g.add_node(NodeSpec::min_max(x, inner, true, MirType::Int32));
        assert_eq!(folds_to(&mut g, mixed).unwrap(), x);
        assert!(g.def(y).is_guard_range_bailouts());
    }

    #[test]
    fn test_min_of_int32_and_large_constant() {
        let mut g = graph();
        let b = g.new_block();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let d = g.push(b, NodeSpec::to_double(x));
        let big = g.push(b, NodeSpec::constant(Constant::Double(3e9)));
        let min = g.push(b, NodeSpec::min_max(d, big, false, MirType::Double));
        let folded = folds_to(&mut g, min).unwrap();
        assert_eq!(g.opcode(folded), Opcode::ToDouble);
        let limit = g.operand(folded, 0);
        assert_eq!(g.opcode(limit), Opcode::LimitedTruncate);
        assert_eq!(g.operand(limit, 0), x);
        assert_eq!(g.def(folded).block(), Some(b));
    }

    #[test]
    fn test_max_of_length_and_non_positive() {
        let mut g = graph();
        let s = g.add_node(NodeSpec::parameter(0, MirType::String));
        let len = g.add_node(NodeSpec::string_length(s));
        let zero = g.add_node(NodeSpec::constant(Constant::Int32(0)));
        let max = g.add_node(NodeSpec::min_max(len, zero, true, MirType::Int32));
        assert_eq!(folds_to(&mut g, max).unwrap(), len);
        let min = g.add_node(NodeSpec::min_max(zero, len, false, MirType::Int32));
        assert_eq!(folds_to(&mut g, min).unwrap(), zero);
    }

    #[test]
    fn test_pow_constant_powers() {
        let mut g = graph();
        let b = g.new_block();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Double));
        let two = g.push(b, NodeSpec::constant(Constant::Double(2.0)));
        let pow = g.push(b, NodeSpec::pow(x, two, MirType::Double));
        let folded = folds_to(&mut g, pow).unwrap();
        assert_eq!(
            g.op(folded),
            &Op::Mul(MulData {
                must_preserve_nan: false,
                can_be_negative_zero: false,
            })
        );
        assert_eq!(g.operands(folded).as_slice(), &[x, x]);

        let half = g.push(b, NodeSpec::constant(Constant::Double(0.5)));
        let pow = g.push(b, NodeSpec::pow(x, half, MirType::Double));
        let folded = folds_to(&mut g, pow).unwrap();
        assert_eq!(g.opcode(folded), Opcode::PowHalf);

        let four = g.push(b, NodeSpec::constant(Constant::Double(4.0)));
        let pow = g.push(b, NodeSpec::pow(x, four, MirType::Double));
        let folded = folds_to(&mut g, pow).unwrap();
        let square = g.operand(folded, 0);
        assert_eq!(g.operands(folded).as_slice(), &[square, square]);
        assert_eq!(g.operands(square).as_slice(), &[x, x]);
    }

    #[test]
    fn test_pow_constants() {
        let mut g = graph();
        let two = double(&mut g, 2.0);
        let ten = double(&mut g, 10.0);
        let pow = g.add_node(NodeSpec::pow(two, ten, MirType::Double));
        let folded = folds_to(&mut g, pow).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Double(1024.0)));

        let base = g.add_node(NodeSpec::constant(Constant::Int32(2)));
        let neg = g.add_node(NodeSpec::constant(Constant::Int32(-1)));
        let int_pow = g.add_node(NodeSpec::pow(base, neg, MirType::Int32));
        assert_eq!(folds_to(&mut g, int_pow).unwrap(), int_pow);
    }

    #[test]
    fn test_unary_constants() {
        let mut g = graph();
        let c = double(&mut g, -2.5);
        let round = g.add_node(NodeSpec::math_function(c, MathFunc::Round, MirType::Double));
        let folded = folds_to(&mut g, round).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Double(-2.0)));

        let sin = g.add_node(NodeSpec::math_function(c, MathFunc::Sin, MirType::Double));
        assert_eq!(folds_to(&mut g, sin).unwrap(), sin);

        let min = g.add_node(NodeSpec::constant(Constant::Int32(i32::MIN)));
        let abs = g.add_node(NodeSpec::abs(min, MirType::Int32));
        assert_eq!(folds_to(&mut g, abs).unwrap(), abs);

        let nan = double(&mut g, f64::NAN);
        let nz = g.add_node(NodeSpec::nan_to_zero(nan));
        let folded = folds_to(&mut g, nz).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Double(0.0)));
    }

    #[test]
    fn test_bit_counts() {
        let mut g = graph();
        let zero = g.add_node(NodeSpec::constant(Constant::Int32(0)));
        let clz = g.add_node(NodeSpec::clz(zero, MirType::Int32));
        let folded = folds_to(&mut g, clz).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(32)));

        let wide = g.add_node(NodeSpec::constant(Constant::Int64(0xff00)));
        let pop = g.add_node(NodeSpec::popcnt(wide, MirType::Int64));
        let folded = folds_to(&mut g, pop).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int64(8)));
    }
}
