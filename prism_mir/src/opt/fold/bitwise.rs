//! Bitwise ops and shifts.
//!
//! Int32 identities only; Int64 bitops fold constants and nothing else.

use super::arith::evaluate_int64_operands;
use super::{emit, emit_constant};
use crate::error::MirResult;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::{Op, Opcode, SignExtendMode};
use crate::ir::types::MirType;
use crate::opt::range::range_of;

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    match g.opcode(ins) {
        Opcode::BitNot => fold_bit_not(g, ins),
        Opcode::SignExtendInt32 | Opcode::SignExtendInt64 => fold_sign_extend(g, ins),
        _ => fold_binary(g, ins),
    }
}

fn fold_binary(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let ty = g.ty(ins);
    if ty == MirType::Int64 {
        if let Some(v) = evaluate_int64_operands(g, ins) {
            return emit_constant(g, ins, Constant::Int64(v)).map(Some);
        }
        return Ok(None);
    }
    if let Some(c) = evaluate_int32_operands(g, ins) {
        return emit_constant(g, ins, c).map(Some);
    }
    if ty != MirType::Int32 {
        return Ok(None);
    }
    if let Some(folded) = fold_unnecessary_bitop(g, ins) {
        return Ok(Some(folded));
    }
    if g.opcode(ins) == Opcode::Rsh {
        return fold_sign_extension(g, ins);
    }
    Ok(None)
}

/// Constant evaluation. `Ursh` may produce a Double.
fn evaluate_int32_operands(g: &Graph, ins: DefId) -> Option<Constant> {
    let l = g.as_int32(g.operand(ins, 0))?;
    let r = g.as_int32(g.operand(ins, 1))?;
    let shift = (r & 0x1f) as u32;
    let value = match g.op(ins) {
        Op::BitAnd => l & r,
        Op::BitOr => l | r,
        Op::BitXor => l ^ r,
        Op::Lsh => ((l as u32) << shift) as i32,
        Op::Rsh => l >> shift,
        Op::Ursh { bailouts_disabled } => {
            let u = (l as u32) >> shift;
            return match g.ty(ins) {
                MirType::Double => Some(Constant::Double(u as f64)),
                MirType::Int32 if u <= i32::MAX as u32 || *bailouts_disabled => {
                    Some(Constant::Int32(u as i32))
                }
                _ => None,
            };
        }
        _ => return None,
    };
    (g.ty(ins) == MirType::Int32).then_some(Constant::Int32(value))
}

/// `x >>> 0` that is only kept because its result is read as uint32.
pub(crate) fn is_uint32_type(g: &Graph, def: DefId) -> bool {
    matches!(g.op(def), Op::Ursh { bailouts_disabled: true })
        && g.ty(def) == MirType::Int32
        && g.as_int32(g.operand(def, 1)) == Some(0)
}

/// Identities of int32 bitops with 0, -1 or equal operands.
fn fold_unnecessary_bitop(g: &Graph, ins: DefId) -> Option<DefId> {
    let opcode = g.opcode(ins);
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));
    if g.ty(lhs) != MirType::Int32 || g.ty(rhs) != MirType::Int32 {
        return None;
    }

    // (x >>> 0) % y with an unsigned modulo is x % y.
    if opcode == Opcode::Ursh && is_uint32_type(g, ins) {
        if let Some(use_id) = g.maybe_single_def_use(ins) {
            if let Some(consumer) = g.use_edge(use_id).consumer().as_definition() {
                if matches!(g.op(consumer), Op::Mod(d) if d.unsigned) {
                    return Some(lhs);
                }
            }
        }
    }

    let operands = [lhs, rhs];
    let other = |i: usize| operands[1 - i];

    for i in 0..2 {
        if g.as_int32(operands[i]) == Some(0) {
            return match opcode {
                Opcode::BitAnd => Some(operands[i]),
                Opcode::BitOr | Opcode::BitXor => Some(other(i)),
                Opcode::Lsh | Opcode::Rsh => Some(lhs),
                Opcode::Ursh if i == 0 => Some(lhs),
                _ => None,
            };
        }
    }
    for i in 0..2 {
        if g.as_int32(operands[i]) == Some(-1) {
            return match opcode {
                Opcode::BitAnd => Some(other(i)),
                Opcode::BitOr => Some(operands[i]),
                Opcode::Rsh if i == 0 => Some(lhs),
                _ => None,
            };
        }
    }
    if lhs == rhs {
        return match opcode {
            Opcode::BitAnd | Opcode::BitOr => Some(lhs),
            _ => None,
        };
    }

    // A mask covering the whole range of the other operand.
    if opcode == Opcode::BitAnd {
        for i in 0..2 {
            let Some(mask) = g.as_int32(operands[i]) else {
                continue;
            };
            if mask < 0 || (mask as u32) & (mask as u32).wrapping_add(1) != 0 {
                continue;
            }
            let covered = range_of(g, other(i)).is_some_and(|r| {
                r.lower().is_some_and(|lo| lo >= 0)
                    && r.upper().is_some_and(|hi| hi <= mask as i64)
                    && !r.can_have_fractional_part()
            });
            if covered {
                return Some(other(i));
            }
        }
    }
    None
}

/// `(x << 16) >> 16` and `(x << 24) >> 24` are sign extensions.
fn fold_sign_extension(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));
    if g.opcode(lhs) != Opcode::Lsh {
        return Ok(None);
    }
    let (Some(shift), Some(inner)) = (g.as_int32(rhs), g.as_int32(g.operand(lhs, 1))) else {
        return Ok(None);
    };
    if shift != inner {
        return Ok(None);
    }
    let mode = match shift {
        16 => SignExtendMode::Half,
        24 => SignExtendMode::Byte,
        _ => return Ok(None),
    };
    let value = g.operand(lhs, 0);
    emit(g, ins, NodeSpec::sign_extend_int32(value, mode)).map(Some)
}

fn fold_bit_not(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    if g.ty(ins) != MirType::Int32 {
        return Ok(None);
    }
    let input = g.operand(ins, 0);
    if let Some(v) = g.as_int32(input) {
        return emit_constant(g, ins, Constant::Int32(!v)).map(Some);
    }
    if g.opcode(input) == Opcode::BitNot {
        // ~~x is x | 0.
        let inner = g.operand(input, 0);
        return emit(g, ins, NodeSpec::truncate_to_int32(inner)).map(Some);
    }
    Ok(None)
}

fn fold_sign_extend(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let Some(c) = g.as_constant(g.operand(ins, 0)) else {
        return Ok(None);
    };
    let folded = match (g.op(ins), c) {
        (Op::SignExtendInt32 { mode }, Constant::Int32(v)) => Constant::Int32(match mode {
            SignExtendMode::Byte => v as i8 as i32,
            SignExtendMode::Half => v as i16 as i32,
            SignExtendMode::Word => v,
        }),
        (Op::SignExtendInt64 { mode }, Constant::Int64(v)) => Constant::Int64(match mode {
            SignExtendMode::Byte => v as i8 as i64,
            SignExtendMode::Half => v as i16 as i64,
            SignExtendMode::Word => v as i32 as i64,
        }),
        _ => return Ok(None),
    };
    emit_constant(g, ins, folded).map(Some)
}
