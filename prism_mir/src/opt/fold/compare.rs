//! Comparisons and boolean negation.

use std::cmp::Ordering;

use super::{emit, emit_bool, emit_constant};
use crate::error::MirResult;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::{DefFlags, DefId, TruncateKind};
use crate::ir::opcode::{CompareOp, CompareType, Op, Opcode};
use crate::ir::types::MirType;
use crate::opt::range::range_of;

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    match g.opcode(ins) {
        Opcode::Compare => fold_compare(g, ins),
        Opcode::Not => fold_not(g, ins),
        Opcode::SameValue => fold_same_value(g, ins),
        Opcode::SameValueDouble => fold_same_value_double(g, ins),
        _ => Ok(None),
    }
}

// =============================================================================
// Compare
// =============================================================================

fn fold_compare(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let Op::Compare {
        op, compare_type, ..
    } = *g.op(ins)
    else {
        return Ok(None);
    };
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));

    if let Some(result) = fold_equal_operands(g, lhs, rhs, op, compare_type) {
        return emit_bool(g, ins, result);
    }
    if let Some(result) = fold_null_or_undefined(g, lhs, op, compare_type) {
        return emit_bool(g, ins, result);
    }
    if compare_type == CompareType::Double {
        if let Some(result) = fold_double_against_constant(g, ins, lhs, rhs, op)? {
            return emit_bool(g, ins, result);
        }
    }
    if let Some(result) = evaluate_constant_compare(g, lhs, rhs, op, compare_type) {
        return emit_bool(g, ins, result);
    }
    if compare_type == CompareType::String {
        return fold_empty_string_compare(g, ins, lhs, rhs, op);
    }
    Ok(None)
}

/// `x == x`, unless `x` may be NaN.
fn fold_equal_operands(
    g: &mut Graph,
    lhs: DefId,
    rhs: DefId,
    op: CompareOp,
    compare_type: CompareType,
) -> Option<bool> {
    if lhs != rhs || !op.is_equality() || compare_type == CompareType::Unknown {
        return None;
    }
    if compare_type.is_floating_point() && range_of(g, lhs).map_or(true, |r| r.can_be_nan()) {
        return None;
    }
    g.def_mut(lhs).set_flag(DefFlags::GUARD_RANGE_BAILOUTS);
    Some(!op.is_negated_equality())
}

/// The lhs of a null/undefined compare decided by its type.
fn fold_null_or_undefined(
    g: &Graph,
    lhs: DefId,
    op: CompareOp,
    compare_type: CompareType,
) -> Option<bool> {
    let expected = match compare_type {
        CompareType::Null => MirType::Null,
        CompareType::Undefined => MirType::Undefined,
        _ => return None,
    };
    let ty = g.ty(lhs);
    if op.is_strict_equality() {
        if ty == expected {
            return Some(op == CompareOp::StrictEq);
        }
        if ty != MirType::Value {
            return Some(op == CompareOp::StrictNe);
        }
    } else if op.is_equality() {
        if ty.is_null_or_undefined() {
            return Some(op == CompareOp::Eq);
        }
        if ty != MirType::Object && ty != MirType::Value {
            return Some(op == CompareOp::Ne);
        }
    }
    None
}

/// A widened int32 compared against a double outside the int32 range, or
/// against NaN.
fn fold_double_against_constant(
    g: &mut Graph,
    ins: DefId,
    lhs: DefId,
    rhs: DefId,
    op: CompareOp,
) -> MirResult<Option<bool>> {
    let (operand, constant_is_lhs, value) = match (g.as_constant(lhs), g.as_constant(rhs)) {
        (Some(c), None) => (rhs, true, c.number_to_double()),
        (None, Some(c)) => (lhs, false, c.number_to_double()),
        _ => return Ok(None),
    };
    let Some(cte) = value else {
        return Ok(None);
    };

    if g.opcode(operand) == Opcode::ToDouble && !cte.is_nan() {
        let int = g.operand(operand, 0);
        if g.ty(int) == MirType::Int32 {
            // Comparisons with a constant are monotone in the other side, so
            // agreeing at both int32 extremes decides every int32.
            let at = |v: f64| {
                let (a, b) = if constant_is_lhs { (cte, v) } else { (v, cte) };
                op.holds(a.partial_cmp(&b))
            };
            let decided = if op.is_equality() {
                (cte > i32::MAX as f64 || cte < i32::MIN as f64).then(|| op.is_negated_equality())
            } else {
                let low = at(i32::MIN as f64);
                (low == at(i32::MAX as f64)).then_some(low)
            };
            if let Some(result) = decided {
                let spec = NodeSpec::limited_truncate(int, TruncateKind::NoTruncate, MirType::Int32)
                    .with_flags(DefFlags::GUARD);
                emit(g, ins, spec)?;
                return Ok(Some(result));
            }
        }
    }

    if cte.is_nan() {
        return Ok(Some(op.is_negated_equality()));
    }
    Ok(None)
}

fn evaluate_constant_compare(
    g: &Graph,
    lhs: DefId,
    rhs: DefId,
    op: CompareOp,
    compare_type: CompareType,
) -> Option<bool> {
    let l = g.as_constant(lhs)?;
    let r = g.as_constant(rhs)?;
    let ordering: Option<Ordering> = match compare_type {
        CompareType::Int32 | CompareType::Double | CompareType::Float32 => {
            l.number_to_double()?.partial_cmp(&r.number_to_double()?)
        }
        CompareType::UInt32 => Some((l.as_int32()? as u32).cmp(&(r.as_int32()? as u32))),
        CompareType::Int64 | CompareType::IntPtr => Some(l.as_int64()?.cmp(&r.as_int64()?)),
        CompareType::UInt64 | CompareType::UIntPtr => {
            Some((l.as_int64()? as u64).cmp(&(r.as_int64()? as u64)))
        }
        CompareType::String => Some(g.host().compare_strings(l.as_string()?, r.as_string()?)?),
        CompareType::BigInt => match (l, r) {
            (Constant::BigInt(a), Constant::BigInt(b)) => {
                Some(g.host().bigint(a)?.cmp(&g.host().bigint(b)?))
            }
            _ => return None,
        },
        CompareType::Undefined
        | CompareType::Null
        | CompareType::Symbol
        | CompareType::Object
        | CompareType::Unknown => return None,
    };
    Some(op.holds(ordering))
}

/// `s < ""` compares lengths instead.
fn fold_empty_string_compare(
    g: &mut Graph,
    ins: DefId,
    lhs: DefId,
    rhs: DefId,
    op: CompareOp,
) -> MirResult<Option<DefId>> {
    let is_empty = |def: DefId| match g.as_constant(def) {
        Some(Constant::String(h)) => g.host().string_length(h) == Some(0),
        _ => false,
    };
    let constant_is_lhs = if is_empty(lhs) {
        true
    } else if is_empty(rhs) {
        false
    } else {
        return Ok(None);
    };
    let operand = if constant_is_lhs { rhs } else { lhs };
    let length = emit(g, ins, NodeSpec::string_length(operand))?;
    let zero = emit_constant(g, ins, Constant::Int32(0))?;
    let (l, r) = if constant_is_lhs { (zero, length) } else { (length, zero) };
    emit(g, ins, NodeSpec::compare(l, r, op, CompareType::Int32)).map(Some)
}

// =============================================================================
// Not
// =============================================================================

fn fold_not_constant(g: &mut Graph, ins: DefId, input: DefId) -> MirResult<Option<DefId>> {
    let truthy = g
        .as_constant(input)
        .and_then(|c| c.to_boolean(g.host()));
    let Some(b) = truthy else {
        return Ok(None);
    };
    let folded = if g.ty(ins) == MirType::Int32 {
        Constant::Int32(!b as i32)
    } else {
        Constant::Boolean(!b)
    };
    emit_constant(g, ins, folded).map(Some)
}

fn fold_not(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = g.operand(ins, 0);
    if let Some(folded) = fold_not_constant(g, ins, input)? {
        return Ok(Some(folded));
    }
    // !!x keeps the boolean conversion, but !!!x is !x.
    if g.opcode(input) == Opcode::Not {
        let inner = g.operand(input, 0);
        if g.opcode(inner) == Opcode::Not {
            return Ok(Some(inner));
        }
    }
    match g.ty(input) {
        MirType::Undefined | MirType::Null => return emit_bool(g, ins, true),
        MirType::Symbol => return emit_bool(g, ins, false),
        _ => {}
    }
    if g.opcode(input) == Opcode::Int64ToBigInt {
        let int64 = g.operand(input, 0);
        if let Some(folded) = fold_not_constant(g, ins, int64)? {
            return Ok(Some(folded));
        }
        return emit(g, ins, NodeSpec::not(int64)).map(Some);
    }
    Ok(None)
}

// =============================================================================
// SameValue
// =============================================================================

fn fold_same_value(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let strip = |def: DefId| {
        if g.opcode(def) == Opcode::Box {
            g.operand(def, 0)
        } else {
            def
        }
    };
    let (lhs, rhs) = (strip(g.operand(ins, 0)), strip(g.operand(ins, 1)));
    if lhs == rhs {
        return emit_bool(g, ins, true);
    }
    for (ty, compare_type) in [
        (MirType::Null, CompareType::Null),
        (MirType::Undefined, CompareType::Undefined),
    ] {
        if g.ty(lhs) == ty || g.ty(rhs) == ty {
            // The constant side goes on the right.
            let (input, cst) = if g.ty(lhs) == ty { (rhs, lhs) } else { (lhs, rhs) };
            let spec = NodeSpec::compare(input, cst, CompareOp::StrictEq, compare_type);
            return emit(g, ins, spec).map(Some);
        }
    }
    Ok(None)
}

fn fold_same_value_double(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));
    if lhs == rhs {
        return emit_bool(g, ins, true);
    }
    let (input, dbl) = match (g.as_constant(lhs), g.as_constant(rhs)) {
        (Some(c), _) => (rhs, c.number_to_double()),
        (None, Some(c)) => (lhs, c.number_to_double()),
        _ => return Ok(None),
    };
    let Some(dbl) = dbl else {
        return Ok(None);
    };

    // +0 and -0 differ only in their bits.
    if dbl == 0.0 {
        let bits = emit(g, ins, NodeSpec::reinterpret_cast(input, MirType::Int64))?;
        let zero = emit_constant(g, ins, Constant::Int64(dbl.to_bits() as i64))?;
        let spec = NodeSpec::compare(bits, zero, CompareOp::StrictEq, CompareType::Int64);
        return emit(g, ins, spec).map(Some);
    }
    // Object.is(d, NaN) is d !== d.
    if dbl.is_nan() {
        let spec = NodeSpec::compare(input, input, CompareOp::StrictNe, CompareType::Double);
        return emit(g, ins, spec).map(Some);
    }
    let spec = NodeSpec::compare(lhs, rhs, CompareOp::StrictEq, CompareType::Double);
    emit(g, ins, spec).map(Some)
}
