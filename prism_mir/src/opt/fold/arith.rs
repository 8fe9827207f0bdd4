//! Binary arithmetic: `Add`, `Sub`, `Mul`, `Div`, `Mod`.
//!
//! Constant evaluation is split by width. Int32, Double and Float32 results
//! are computed in double precision and narrowed afterwards, declining when
//! the narrowed value would differ. Int64 has its own wrapping routine.

use super::{emit, emit_constant};
use crate::error::MirResult;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::{DefFlags, DefId};
use crate::ir::opcode::{MulData, Op, Opcode};
use crate::ir::types::MirType;
use crate::opt::numeric::{number_is_int32, number_mod, to_int32, to_uint32};

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    match g.ty(ins) {
        MirType::Int64 => fold_int64(g, ins),
        ty if ty.is_number() => fold_number(g, ins, ty),
        _ => Ok(None),
    }
}

fn fold_int64(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));
    if let Some(value) = evaluate_int64_operands(g, ins) {
        return emit_constant(g, ins, Constant::Int64(value)).map(Some);
    }
    let identity = match g.opcode(ins) {
        Opcode::Add => 0,
        Opcode::Mul => 1,
        _ => return Ok(None),
    };
    if g.as_constant(rhs).and_then(|c| c.as_int64()) == Some(identity) {
        return Ok(Some(lhs));
    }
    if g.as_constant(lhs).and_then(|c| c.as_int64()) == Some(identity) {
        return Ok(Some(rhs));
    }
    Ok(None)
}

fn fold_number(g: &mut Graph, ins: DefId, ty: MirType) -> MirResult<Option<DefId>> {
    let opcode = g.opcode(ins);
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));
    let truncated = g.def(ins).is_truncated();

    if let Some(folded) = evaluate_constant_operands(g, ins) {
        let constant = emit_constant(g, ins, folded)?;
        if truncated && folded.ty() != MirType::Int32 {
            return emit(g, ins, NodeSpec::truncate_to_int32(constant)).map(Some);
        }
        return Ok(Some(constant));
    }

    if let Some(nan) = constant_nan_operand(g, ins) {
        return Ok(Some(nan));
    }

    match opcode {
        Opcode::Div => return fold_div(g, ins, ty),
        Opcode::Mod => return Ok(None),
        _ => {}
    }

    if g.op(ins).must_preserve_nan() {
        return Ok(None);
    }
    // -0 + 0 is +0, so only int32 additions drop a zero.
    if opcode == Opcode::Add && ty != MirType::Int32 {
        return Ok(None);
    }

    let identity = if opcode == Opcode::Mul { 1.0 } else { 0.0 };
    if is_identity(g, rhs, identity) {
        return pass_through(g, ins, lhs, truncated).map(Some);
    }

    if opcode == Opcode::Sub {
        if ty == MirType::Int32 && lhs == rhs {
            // x - x is 0 only once x is known not to be NaN or infinite.
            g.def_mut(lhs).set_flag(DefFlags::GUARD_RANGE_BAILOUTS);
            return emit_constant(g, ins, Constant::Int32(0)).map(Some);
        }
        return Ok(None);
    }

    if is_identity(g, lhs, identity) {
        return pass_through(g, ins, rhs, truncated).map(Some);
    }

    if opcode == Opcode::Mul && ty == MirType::Int32 && lhs == rhs {
        if let Op::Mul(data) = g.def_mut(ins).op_mut() {
            data.can_be_negative_zero = false;
        }
    }
    Ok(None)
}

/// `x / 2^n` becomes `x * 2^-n` when the reciprocal is exact.
fn fold_div(g: &mut Graph, ins: DefId, ty: MirType) -> MirResult<Option<DefId>> {
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));
    let preserve_nan = g.op(ins).must_preserve_nan();
    if !preserve_nan && is_identity(g, rhs, 1.0) {
        let truncated = g.def(ins).is_truncated();
        return pass_through(g, ins, lhs, truncated).map(Some);
    }
    if !ty.is_floating_point() {
        return Ok(None);
    }
    let Some(divisor) = g.as_constant(rhs).and_then(|c| c.number_to_double()) else {
        return Ok(None);
    };
    let Some(num) = number_is_int32(divisor) else {
        return Ok(None);
    };
    if num == 0 || !num.unsigned_abs().is_power_of_two() {
        return Ok(None);
    }
    let reciprocal = 1.0 / num as f64;
    let constant = match ty {
        MirType::Float32 => Constant::Float32(reciprocal as f32),
        _ => Constant::Double(reciprocal),
    };
    let factor = emit_constant(g, ins, constant)?;
    let mut spec = NodeSpec::mul(lhs, factor, ty);
    spec.op = Op::Mul(MulData {
        must_preserve_nan: preserve_nan,
        ..MulData::default()
    });
    emit(g, ins, spec).map(Some)
}

/// Whether `def` is the number `identity`. `-0` never qualifies: `x - -0`
/// turns `-0` into `+0`.
fn is_identity(g: &Graph, def: DefId, identity: f64) -> bool {
    g.as_constant(def)
        .and_then(|c| c.number_to_double())
        .is_some_and(|v| v == identity && v.is_sign_positive())
}

fn pass_through(g: &mut Graph, ins: DefId, operand: DefId, truncated: bool) -> MirResult<DefId> {
    if truncated && g.ty(operand) != MirType::Int32 {
        return emit(g, ins, NodeSpec::truncate_to_int32(operand));
    }
    Ok(operand)
}

/// A float-typed op with a NaN constant operand yields that NaN.
fn constant_nan_operand(g: &Graph, ins: DefId) -> Option<DefId> {
    let ty = g.ty(ins);
    if !ty.is_floating_point() {
        return None;
    }
    g.operands(ins)
        .into_iter()
        .find(|&op| g.ty(op) == ty && g.as_constant(op).is_some_and(|c| c.is_nan()))
}

/// Evaluate an Int32/Double/Float32 binary op whose operands are both
/// constants.
pub fn evaluate_constant_operands(g: &Graph, ins: DefId) -> Option<Constant> {
    let lhs = g.as_constant(g.operand(ins, 0))?;
    let rhs = g.as_constant(g.operand(ins, 1))?;
    let (l, r) = (lhs.number_to_double()?, rhs.number_to_double()?);
    let ty = g.ty(ins);
    let truncated = g.def(ins).is_truncated();

    // Integer division and remainder trap or bail out on these inputs.
    if ty == MirType::Int32 && matches!(g.opcode(ins), Opcode::Div | Opcode::Mod) {
        if r == 0.0 || (l == i32::MIN as f64 && r == -1.0) {
            return None;
        }
    }

    let ret = match g.op(ins) {
        Op::Add(_) => l + r,
        Op::Sub(_) => l - r,
        Op::Mul(_) => {
            if truncated && ty == MirType::Int32 {
                let (a, b) = (lhs.as_int32()?, rhs.as_int32()?);
                return Some(Constant::Int32(a.wrapping_mul(b)));
            }
            l * r
        }
        Op::Div(d) if d.unsigned => {
            let (a, b) = (to_uint32(l), to_uint32(r));
            if b == 0 {
                return None;
            }
            (a / b) as f64
        }
        Op::Div(_) => l / r,
        Op::Mod(d) if d.unsigned => {
            let (a, b) = (to_uint32(l), to_uint32(r));
            if b == 0 {
                return None;
            }
            (a % b) as f64
        }
        Op::Mod(_) => number_mod(l, r),
        _ => return None,
    };

    match ty {
        MirType::Float32 => Some(Constant::Float32(ret as f32)),
        MirType::Double => Some(Constant::Double(ret)),
        MirType::Int32 if truncated => Some(Constant::Int32(to_int32(ret))),
        MirType::Int32 => {
            let unsigned = matches!(g.op(ins), Op::Div(d) if d.unsigned)
                || matches!(g.op(ins), Op::Mod(d) if d.unsigned);
            if unsigned {
                // Unsigned results live in the int32 register bit-for-bit.
                return Some(Constant::Int32(ret as u32 as i32));
            }
            number_is_int32(ret).map(Constant::Int32)
        }
        _ => None,
    }
}

/// Evaluate an Int64 arithmetic or bitwise op whose operands are both
/// constants.
pub fn evaluate_int64_operands(g: &Graph, ins: DefId) -> Option<i64> {
    let l = g.as_constant(g.operand(ins, 0))?.as_int64()?;
    let r = g.as_constant(g.operand(ins, 1))?.as_int64()?;
    let shift = (r & 0x3f) as u32;
    Some(match g.op(ins) {
        Op::BitAnd => l & r,
        Op::BitOr => l | r,
        Op::BitXor => l ^ r,
        Op::Lsh => ((l as u64) << shift) as i64,
        Op::Rsh => l >> shift,
        Op::Ursh { .. } => ((l as u64) >> shift) as i64,
        Op::Add(_) => l.wrapping_add(r),
        Op::Sub(_) => l.wrapping_sub(r),
        Op::Mul(_) => l.wrapping_mul(r),
        Op::Div(d) => {
            if r == 0 {
                return None;
            }
            if d.unsigned {
                ((l as u64) / (r as u64)) as i64
            } else {
                if l == i64::MIN && r == -1 {
                    return None;
                }
                l / r
            }
        }
        Op::Mod(d) => {
            if r == 0 {
                return None;
            }
            if !d.unsigned && (l < 0 || r < 0) {
                return None;
            }
            ((l as u64) % (r as u64)) as i64
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::super::folds_to;
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::host::HostTable;
    use crate::ir::opcode::{ArithData, DivData};

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    fn int(g: &mut Graph, v: i32) -> DefId {
        g.add_node(NodeSpec::constant(Constant::Int32(v)))
    }

    fn double(g: &mut Graph, v: f64) -> DefId {
        g.add_node(NodeSpec::constant(Constant::Double(v)))
    }

    #[test]
    fn test_add_constants() {
        let mut g = graph();
        let (a, b) = (int(&mut g, 2), int(&mut g, 3));
        let add = g.add_node(NodeSpec::add(a, b, MirType::Int32));
        let folded = folds_to(&mut g, add).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(5)));
    }

    #[test]
    fn test_int32_overflow_declines() {
        let mut g = graph();
        let (a, b) = (int(&mut g, i32::MAX), int(&mut g, 1));
        let add = g.add_node(NodeSpec::add(a, b, MirType::Int32));
        assert_eq!(folds_to(&mut g, add).unwrap(), add);

        // Once truncated the sum wraps.
        g.def_mut(add)
            .set_truncate_kind(crate::ir::node::TruncateKind::Truncate);
        let folded = folds_to(&mut g, add).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(i32::MIN)));
    }

    #[test]
    fn test_negative_zero_result_declines() {
        let mut g = graph();
        let (a, b) = (int(&mut g, -1), int(&mut g, 0));
        let mul = g.add_node(NodeSpec::mul(a, b, MirType::Int32));
        assert_eq!(folds_to(&mut g, mul).unwrap(), mul);
    }

    #[test]
    fn test_division_by_zero_declines() {
        let mut g = graph();
        let (a, zero) = (int(&mut g, 7), int(&mut g, 0));
        let div = g.add_node(NodeSpec::div(a, zero, MirType::Int32));
        let rem = g.add_node(NodeSpec::mod_(a, zero, MirType::Int32));
        assert_eq!(folds_to(&mut g, div).unwrap(), div);
        assert_eq!(folds_to(&mut g, rem).unwrap(), rem);

        let (min, neg) = (int(&mut g, i32::MIN), int(&mut g, -1));
        let overflow = g.add_node(NodeSpec::div(min, neg, MirType::Int32));
        assert_eq!(folds_to(&mut g, overflow).unwrap(), overflow);
        let overflow_mod = g.add_node(NodeSpec::mod_(min, neg, MirType::Int32));
        assert_eq!(folds_to(&mut g, overflow_mod).unwrap(), overflow_mod);
    }

    #[test]
    fn test_int64_evaluation() {
        let mut g = graph();
        let min = g.add_node(NodeSpec::constant(Constant::Int64(i64::MIN)));
        let neg = g.add_node(NodeSpec::constant(Constant::Int64(-1)));
        let zero = g.add_node(NodeSpec::constant(Constant::Int64(0)));
        let seven = g.add_node(NodeSpec::constant(Constant::Int64(7)));

        let div = g.add_node(NodeSpec::div(min, neg, MirType::Int64));
        assert_eq!(folds_to(&mut g, div).unwrap(), div);
        let by_zero = g.add_node(NodeSpec::div(seven, zero, MirType::Int64));
        assert_eq!(folds_to(&mut g, by_zero).unwrap(), by_zero);
        let signed_mod = g.add_node(NodeSpec::mod_(neg, seven, MirType::Int64));
        assert_eq!(folds_to(&mut g, signed_mod).unwrap(), signed_mod);

        let wrap = g.add_node(NodeSpec::sub(min, seven, MirType::Int64));
        let folded = folds_to(&mut g, wrap).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int64(i64::MIN.wrapping_sub(7))));

        let shift = g.add_node(NodeSpec::bitwise_int64(Op::Lsh, seven, seven));
        assert_eq!(evaluate_int64_operands(&g, shift), Some(7 << 7));
    }

    #[test]
    fn test_int64_identities() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Int64));
        let zero = g.add_node(NodeSpec::constant(Constant::Int64(0)));
        let add = g.add_node(NodeSpec::add(zero, x, MirType::Int64));
        assert_eq!(folds_to(&mut g, add).unwrap(), x);
        let sub = g.add_node(NodeSpec::sub(zero, x, MirType::Int64));
        assert_eq!(folds_to(&mut g, sub).unwrap(), sub);
    }

    #[test]
    fn test_identity_folds() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let zero = int(&mut g, 0);
        let one = int(&mut g, 1);

        let add = g.add_node(NodeSpec::add(x, zero, MirType::Int32));
        assert_eq!(folds_to(&mut g, add).unwrap(), x);
        let mul = g.add_node(NodeSpec::mul(one, x, MirType::Int32));
        assert_eq!(folds_to(&mut g, mul).unwrap(), x);
        let sub = g.add_node(NodeSpec::sub(zero, x, MirType::Int32));
        assert_eq!(folds_to(&mut g, sub).unwrap(), sub);
    }

    #[test]
    fn test_double_add_keeps_zero() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Double));
        let zero = double(&mut g, 0.0);
        let add = g.add_node(NodeSpec::add(x, zero, MirType::Double));
        assert_eq!(folds_to(&mut g, add).unwrap(), add);

        let neg_zero = double(&mut g, -0.0);
        let sub = g.add_node(NodeSpec::sub(x, neg_zero, MirType::Double));
        assert_eq!(folds_to(&mut g, sub).unwrap(), sub);
        let sub_pos = g.add_node(NodeSpec::sub(x, zero, MirType::Double));
        assert_eq!(folds_to(&mut g, sub_pos).unwrap(), x);
    }

    #[test]
    fn test_must_preserve_nan_blocks_identity() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Double));
        let one = double(&mut g, 1.0);
        let mut spec = NodeSpec::mul(x, one, MirType::Double);
        spec.op = Op::Mul(MulData {
            must_preserve_nan: true,
            can_be_negative_zero: true,
        });
        let mul = g.add_node(spec);
        assert_eq!(folds_to(&mut g, mul).unwrap(), mul);

        let mut sub = NodeSpec::sub(x, double(&mut g, 0.0), MirType::Double);
        sub.op = Op::Sub(ArithData {
            must_preserve_nan: true,
        });
        let sub = g.add_node(sub);
        assert_eq!(folds_to(&mut g, sub).unwrap(), sub);
    }

    #[test]
    fn test_nan_operand_propagates() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Double));
        let nan = double(&mut g, f64::NAN);
        let add = g.add_node(NodeSpec::add(x, nan, MirType::Double));
        assert_eq!(folds_to(&mut g, add).unwrap(), nan);
    }

    #[test]
    fn test_sub_self_and_mul_self() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let sub = g.add_node(NodeSpec::sub(x, x, MirType::Int32));
        let folded = folds_to(&mut g, sub).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(0)));
        assert!(g.def(x).is_guard_range_bailouts());

        let mul = g.add_node(NodeSpec::mul(x, x, MirType::Int32));
        assert_eq!(folds_to(&mut g, mul).unwrap(), mul);
        assert!(matches!(g.op(mul), Op::Mul(d) if !d.can_be_negative_zero));
    }

    #[test]
    fn test_truncated_identity_wraps_operand() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Double));
        let one = double(&mut g, 1.0);
        let mul = g.add_node(NodeSpec::mul(x, one, MirType::Int32));
        g.def_mut(mul)
            .set_truncate_kind(crate::ir::node::TruncateKind::Truncate);
        let folded = folds_to(&mut g, mul).unwrap();
        assert_eq!(g.opcode(folded), Opcode::TruncateToInt32);
        assert_eq!(g.operand(folded, 0), x);
    }

    #[test]
    fn test_div_by_power_of_two() {
        let mut g = graph();
        let b = g.new_block();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Double));
        let four = g.push(b, NodeSpec::constant(Constant::Double(4.0)));
        let div = g.push(b, NodeSpec::div(x, four, MirType::Double));
        let folded = folds_to(&mut g, div).unwrap();
        assert_eq!(g.opcode(folded), Opcode::Mul);
        let factor = g.operand(folded, 1);
        assert_eq!(g.as_constant(factor), Some(Constant::Double(0.25)));
        // Helpers were placed before the division.
        assert_eq!(g.block(b).instructions(), &[x, four, factor, folded, div]);

        let three = g.push(b, NodeSpec::constant(Constant::Double(3.0)));
        let div3 = g.push(b, NodeSpec::div(x, three, MirType::Double));
        assert_eq!(folds_to(&mut g, div3).unwrap(), div3);
    }

    #[test]
    fn test_unsigned_division() {
        let mut g = graph();
        let a = int(&mut g, -1);
        let b = int(&mut g, 2);
        let mut spec = NodeSpec::div(a, b, MirType::Int32);
        spec.op = Op::Div(DivData {
            unsigned: true,
            ..DivData::default()
        });
        let div = g.add_node(spec);
        let folded = folds_to(&mut g, div).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(0x7fff_ffff)));
    }

    #[test]
    fn test_float32_evaluation() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::constant(Constant::Float32(1.5)));
        let b = g.add_node(NodeSpec::constant(Constant::Float32(2.25)));
        let add = g.add_node(NodeSpec::add(a, b, MirType::Float32));
        let folded = folds_to(&mut g, add).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Float32(3.75)));
    }
}
