//! Conversions, boxing and string ops.

use super::bitwise::is_uint32_type;
use super::{emit, emit_constant};
use crate::error::MirResult;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::{IntConversionInput, Op, Opcode};
use crate::ir::types::MirType;
use crate::opt::numeric::{clamp_to_uint8, number_is_int32, number_to_string, to_int32};

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    match g.opcode(ins) {
        Opcode::Box => Ok(fold_box(g, ins)),
        Opcode::Unbox => fold_unbox(g, ins),
        Opcode::ToDouble => fold_to_double(g, ins),
        Opcode::ToFloat32 => fold_to_float32(g, ins),
        Opcode::ToNumberInt32 => fold_to_number_int32(g, ins),
        Opcode::TruncateToInt32 => fold_truncate_to_int32(g, ins),
        Opcode::WrapInt64ToInt32 => fold_wrap_int64(g, ins),
        Opcode::ExtendInt32ToInt64 => fold_extend_int32(g, ins),
        Opcode::ToString => fold_to_string(g, ins),
        Opcode::Int64ToBigInt => fold_int64_to_bigint(g, ins),
        Opcode::TruncateBigIntToInt64 => fold_truncate_bigint(g, ins),
        Opcode::ReinterpretCast => fold_reinterpret(g, ins),
        Opcode::StringLength => fold_string_length(g, ins),
        Opcode::Concat => fold_concat(g, ins),
        _ => fold_simple_constant(g, ins),
    }
}

/// Look through a `Box`.
fn unboxed(g: &Graph, def: DefId) -> DefId {
    if g.opcode(def) == Opcode::Box {
        g.operand(def, 0)
    } else {
        def
    }
}

fn fold_box(g: &Graph, ins: DefId) -> Option<DefId> {
    let input = g.operand(ins, 0);
    if g.opcode(input) == Opcode::Unbox {
        let boxed = g.operand(input, 0);
        if g.ty(boxed) == MirType::Value {
            return Some(boxed);
        }
    }
    None
}

fn fold_unbox(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let ty = g.ty(ins);
    let input = g.operand(ins, 0);
    let inner = unboxed(g, input);

    if let Some(c) = g.as_constant(inner) {
        if c.ty() == ty {
            return Ok(Some(inner));
        }
        if let (MirType::Double, Constant::Int32(v)) = (ty, c) {
            return emit_constant(g, ins, Constant::Double(v as f64)).map(Some);
        }
        return Ok(None);
    }
    if inner == input {
        return Ok(None);
    }
    let inner_ty = g.ty(inner);
    if inner_ty == ty {
        return Ok(Some(inner));
    }
    // A fallible double unbox accepts int32 values.
    if ty == MirType::Double && inner_ty == MirType::Int32 {
        return emit(g, ins, NodeSpec::to_double(inner)).map(Some);
    }
    Ok(None)
}

fn fold_to_double(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = unboxed(g, g.operand(ins, 0));
    if g.ty(input) == MirType::Double {
        return Ok(Some(input));
    }
    if let Some(d) = g.as_constant(input).and_then(|c| c.number_to_double()) {
        return emit_constant(g, ins, Constant::Double(d)).map(Some);
    }
    Ok(None)
}

fn fold_to_float32(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = unboxed(g, g.operand(ins, 0));
    if g.ty(input) == MirType::Float32 {
        return Ok(Some(input));
    }
    // Widening to double then narrowing again is exact.
    if g.opcode(input) == Opcode::ToDouble {
        let inner = g.operand(input, 0);
        if g.ty(inner) == MirType::Float32 {
            return Ok(Some(inner));
        }
    }
    if let Some(d) = g.as_constant(input).and_then(|c| c.number_to_double()) {
        return emit_constant(g, ins, Constant::Float32(d as f32)).map(Some);
    }
    Ok(None)
}

fn fold_to_number_int32(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = unboxed(g, g.operand(ins, 0));
    if g.ty(input) == MirType::Int32 {
        return Ok(Some(input));
    }
    let Op::ToNumberInt32 {
        conversion,
        needs_negative_zero_check,
    } = *g.op(ins)
    else {
        return Ok(None);
    };
    let Some(c) = g.as_constant(input) else {
        return Ok(None);
    };
    let value = match c {
        Constant::Double(_) | Constant::Float32(_) => {
            let d = c.number_to_double().unwrap_or(f64::NAN);
            match number_is_int32(d) {
                Some(v) => v,
                None if d == 0.0 && !needs_negative_zero_check => 0,
                None => return Ok(None),
            }
        }
        Constant::Boolean(b) if conversion != IntConversionInput::NumbersOnly => b as i32,
        Constant::Null if conversion == IntConversionInput::Any => 0,
        _ => return Ok(None),
    };
    emit_constant(g, ins, Constant::Int32(value)).map(Some)
}

fn fold_truncate_to_int32(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = unboxed(g, g.operand(ins, 0));
    if g.ty(input) == MirType::Int32 && !is_uint32_type(g, input) {
        return Ok(Some(input));
    }
    if g.opcode(input) == Opcode::ToDouble {
        let inner = g.operand(input, 0);
        if g.ty(inner) == MirType::Int32 && !is_uint32_type(g, inner) {
            return Ok(Some(inner));
        }
    }
    match g.as_constant(input) {
        Some(Constant::Boolean(b)) => emit_constant(g, ins, Constant::Int32(b as i32)).map(Some),
        Some(c) => match c.number_to_double() {
            Some(d) => emit_constant(g, ins, Constant::Int32(to_int32(d))).map(Some),
            None => Ok(None),
        },
        None => Ok(None),
    }
}

fn fold_wrap_int64(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let Op::WrapInt64ToInt32 { bottom_half } = *g.op(ins) else {
        return Ok(None);
    };
    let input = g.operand(ins, 0);
    if let Some(v) = g.as_constant(input).and_then(|c| c.as_int64()) {
        let half = if bottom_half { v as i32 } else { (v >> 32) as i32 };
        return emit_constant(g, ins, Constant::Int32(half)).map(Some);
    }
    if bottom_half && g.opcode(input) == Opcode::ExtendInt32ToInt64 {
        return Ok(Some(g.operand(input, 0)));
    }
    Ok(None)
}

fn fold_extend_int32(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let Op::ExtendInt32ToInt64 { unsigned } = *g.op(ins) else {
        return Ok(None);
    };
    let Some(v) = g.as_int32(g.operand(ins, 0)) else {
        return Ok(None);
    };
    let wide = if unsigned { v as u32 as i64 } else { v as i64 };
    emit_constant(g, ins, Constant::Int64(wide)).map(Some)
}

fn fold_to_string(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = unboxed(g, g.operand(ins, 0));
    if g.ty(input) == MirType::String {
        return Ok(Some(input));
    }
    let text = match g.as_constant(input) {
        Some(Constant::Boolean(b)) => b.to_string(),
        Some(Constant::Null) => "null".to_string(),
        Some(Constant::Undefined) => "undefined".to_string(),
        Some(c) => match c.number_to_double() {
            Some(d) => number_to_string(d),
            None => return Ok(None),
        },
        None => return Ok(None),
    };
    let handle = g.host().intern_string(&text);
    emit_constant(g, ins, Constant::String(handle)).map(Some)
}

fn fold_int64_to_bigint(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let Op::Int64ToBigInt { signed } = *g.op(ins) else {
        return Ok(None);
    };
    let Some(v) = g.as_constant(g.operand(ins, 0)).and_then(|c| c.as_int64()) else {
        return Ok(None);
    };
    let value = if signed { v as i128 } else { v as u64 as i128 };
    let handle = g.host().new_bigint(value);
    emit_constant(g, ins, Constant::BigInt(handle)).map(Some)
}

fn fold_truncate_bigint(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = g.operand(ins, 0);
    // Both signednesses keep the same 64 bits.
    if g.opcode(input) == Opcode::Int64ToBigInt {
        return Ok(Some(g.operand(input, 0)));
    }
    let value = match g.as_constant(input) {
        Some(Constant::BigInt(h)) => g.host().bigint(h),
        _ => None,
    };
    match value {
        Some(v) => emit_constant(g, ins, Constant::Int64(v as i64)).map(Some),
        None => Ok(None),
    }
}

fn fold_reinterpret(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let ty = g.ty(ins);
    let input = g.operand(ins, 0);
    if g.opcode(input) == Opcode::ReinterpretCast {
        let inner = g.operand(input, 0);
        if g.ty(inner) == ty {
            return Ok(Some(inner));
        }
    }
    let folded = match (g.as_constant(input), ty) {
        (Some(Constant::Double(d)), MirType::Int64) => Constant::Int64(d.to_bits() as i64),
        (Some(Constant::Int64(v)), MirType::Double) => Constant::Double(f64::from_bits(v as u64)),
        (Some(Constant::Float32(f)), MirType::Int32) => Constant::Int32(f.to_bits() as i32),
        (Some(Constant::Int32(v)), MirType::Float32) => Constant::Float32(f32::from_bits(v as u32)),
        _ => return Ok(None),
    };
    emit_constant(g, ins, folded).map(Some)
}

fn fold_string_length(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let length = match g.as_constant(g.operand(ins, 0)) {
        Some(Constant::String(h)) => g.host().string_length(h),
        _ => None,
    };
    match length.and_then(|len| i32::try_from(len).ok()) {
        Some(len) => emit_constant(g, ins, Constant::Int32(len)).map(Some),
        None => Ok(None),
    }
}

fn fold_concat(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let (lhs, rhs) = (g.operand(ins, 0), g.operand(ins, 1));
    let text = |def: DefId| match g.as_constant(def) {
        Some(Constant::String(h)) => g.host().string(h),
        _ => None,
    };
    let (l, r) = (text(lhs), text(rhs));
    if l.as_deref() == Some("") && g.ty(rhs) == MirType::String {
        return Ok(Some(rhs));
    }
    if r.as_deref() == Some("") && g.ty(lhs) == MirType::String {
        return Ok(Some(lhs));
    }
    let (Some(l), Some(r)) = (l, r) else {
        return Ok(None);
    };
    let joined = format!("{}{}", l, r);
    let handle = g.host().intern_string(&joined);
    emit_constant(g, ins, Constant::String(handle)).map(Some)
}

/// Single-input conversions that only fold constants.
fn fold_simple_constant(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    let input = g.operand(ins, 0);
    let opcode = g.opcode(ins);
    let ty = g.ty(ins);
    if g.ty(input) == ty && matches!(opcode, Opcode::ToInt64 | Opcode::BooleanToInt32) {
        return Ok(Some(input));
    }
    let Some(c) = g.as_constant(input) else {
        return Ok(None);
    };
    let folded = match (opcode, c) {
        (Opcode::ToInt64, Constant::Boolean(b)) => Constant::Int64(b as i64),
        (Opcode::BooleanToInt32, Constant::Boolean(b)) => Constant::Int32(b as i32),
        (Opcode::Int32ToIntPtr, Constant::Int32(v)) => Constant::IntPtr(v as i64),
        (Opcode::ClampToUint8, c) => match c.number_to_double() {
            Some(d) => Constant::Int32(clamp_to_uint8(d)),
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    emit_constant(g, ins, folded).map(Some)
}

#[cfg(test)]
mod tests {
    use super::super::folds_to;
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::host::HostTable;
    use crate::ir::opcode::UnboxMode;

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    #[test]
    fn test_truncate_of_int32_is_identity() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let t = g.add_node(NodeSpec::truncate_to_int32(x));
        assert_eq!(folds_to(&mut g, t).unwrap(), x);

        let d = g.add_node(NodeSpec::to_double(x));
        let t2 = g.add_node(NodeSpec::truncate_to_int32(d));
        assert_eq!(folds_to(&mut g, t2).unwrap(), x);
    }

    #[test]
    fn test_truncate_constant_wraps() {
        let mut g = graph();
        let c = g.add_node(NodeSpec::constant(Constant::Double(4_294_967_301.5)));
        let t = g.add_node(NodeSpec::truncate_to_int32(c));
        let folded = folds_to(&mut g, t).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(5)));
    }

    #[test]
    fn test_box_unbox_cancel() {
        let mut g = graph();
        let v = g.add_node(NodeSpec::parameter(0, MirType::Value));
        let unbox = g.add_node(NodeSpec::unbox(v, MirType::Int32, UnboxMode::Fallible));
        let boxed = g.add_node(NodeSpec::box_(unbox));
        assert_eq!(folds_to(&mut g, boxed).unwrap(), v);

        let x = g.add_node(NodeSpec::parameter(1, MirType::Int32));
        let bx = g.add_node(NodeSpec::box_(x));
        let back = g.add_node(NodeSpec::unbox(bx, MirType::Int32, UnboxMode::Fallible));
        assert_eq!(folds_to(&mut g, back).unwrap(), x);

        let as_double = g.add_node(NodeSpec::unbox(bx, MirType::Double, UnboxMode::Fallible));
        let folded = folds_to(&mut g, as_double).unwrap();
        assert_eq!(g.opcode(folded), Opcode::ToDouble);
        assert_eq!(g.operand(folded, 0), x);
    }

    #[test]
    fn test_to_double_constants() {
        let mut g = graph();
        let c = g.add_node(NodeSpec::constant(Constant::Int32(-3)));
        let d = g.add_node(NodeSpec::to_double(c));
        let folded = folds_to(&mut g, d).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Double(-3.0)));

        let x = g.add_node(NodeSpec::parameter(0, MirType::Double));
        let same = g.add_node(NodeSpec::to_double(x));
        assert_eq!(folds_to(&mut g, same).unwrap(), x);
    }

    #[test]
    fn test_to_number_int32() {
        let mut g = graph();
        let neg_zero = g.add_node(NodeSpec::constant(Constant::Double(-0.0)));
        let checked = g.add_node(NodeSpec::to_number_int32(neg_zero, IntConversionInput::Any));
        assert_eq!(folds_to(&mut g, checked).unwrap(), checked);

        let mut spec = NodeSpec::to_number_int32(neg_zero, IntConversionInput::Any);
        spec.op = Op::ToNumberInt32 {
            conversion: IntConversionInput::Any,
            needs_negative_zero_check: false,
        };
        let unchecked = g.add_node(spec);
        let folded = folds_to(&mut g, unchecked).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(0)));

        let t = g.add_node(NodeSpec::constant(Constant::Boolean(true)));
        let numbers = g.add_node(NodeSpec::to_number_int32(t, IntConversionInput::NumbersOnly));
        assert_eq!(folds_to(&mut g, numbers).unwrap(), numbers);
        let bools = g.add_node(NodeSpec::to_number_int32(t, IntConversionInput::NumbersOrBoolsOnly));
        let folded = folds_to(&mut g, bools).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(1)));
    }

    #[test]
    fn test_int64_wrap_and_extend() {
        let mut g = graph();
        let c = g.add_node(NodeSpec::constant(Constant::Int64(0x1_0000_0002)));
        let lo = g.add_node(NodeSpec::wrap_int64_to_int32(c, true));
        let hi = g.add_node(NodeSpec::wrap_int64_to_int32(c, false));
        let lo_folded = folds_to(&mut g, lo).unwrap();
        let hi_folded = folds_to(&mut g, hi).unwrap();
        assert_eq!(g.as_constant(lo_folded), Some(Constant::Int32(2)));
        assert_eq!(g.as_constant(hi_folded), Some(Constant::Int32(1)));

        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let ext = g.add_node(NodeSpec::extend_int32_to_int64(x, false));
        let wrap = g.add_node(NodeSpec::wrap_int64_to_int32(ext, true));
        assert_eq!(folds_to(&mut g, wrap).unwrap(), x);

        let m1 = g.add_node(NodeSpec::constant(Constant::Int32(-1)));
        let unsigned = g.add_node(NodeSpec::extend_int32_to_int64(m1, true));
        let folded = folds_to(&mut g, unsigned).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int64(0xffff_ffff)));
    }

    #[test]
    fn test_strings() {
        let mut g = graph();
        let host = g.host();
        let empty = host.intern_string("");
        let ab = host.intern_string("ab");
        let cd = host.intern_string("cd");
        let empty = g.add_node(NodeSpec::constant(Constant::String(empty)));
        let ab = g.add_node(NodeSpec::constant(Constant::String(ab)));
        let cd = g.add_node(NodeSpec::constant(Constant::String(cd)));
        let s = g.add_node(NodeSpec::parameter(0, MirType::String));

        let left_empty = g.add_node(NodeSpec::concat(empty, s));
        assert_eq!(folds_to(&mut g, left_empty).unwrap(), s);

        let both = g.add_node(NodeSpec::concat(ab, cd));
        let folded = folds_to(&mut g, both).unwrap();
        let handle = g.as_constant(folded).and_then(|c| c.as_string()).unwrap();
        assert_eq!(g.host().string(handle).as_deref(), Some("abcd"));

        let len = g.add_node(NodeSpec::string_length(folded));
        let folded = folds_to(&mut g, len).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(4)));
    }

    #[test]
    fn test_number_to_string() {
        let mut g = graph();
        let c = g.add_node(NodeSpec::constant(Constant::Double(1.5)));
        let s = g.add_node(NodeSpec::to_string(c));
        let folded = folds_to(&mut g, s).unwrap();
        let handle = g.as_constant(folded).and_then(|c| c.as_string()).unwrap();
        assert_eq!(g.host().string(handle).as_deref(), Some("1.5"));
    }

    #[test]
    fn test_reinterpret_round_trip() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Double));
        let bits = g.add_node(NodeSpec::reinterpret_cast(x, MirType::Int64));
        let back = g.add_node(NodeSpec::reinterpret_cast(bits, MirType::Double));
        assert_eq!(folds_to(&mut g, back).unwrap(), x);

        let one = g.add_node(NodeSpec::constant(Constant::Double(1.0)));
        let cast = g.add_node(NodeSpec::reinterpret_cast(one, MirType::Int64));
        let folded = folds_to(&mut g, cast).unwrap();
        assert_eq!(
            g.as_constant(folded),
            Some(Constant::Int64(0x3ff0_0000_0000_0000))
        );
    }

    #[test]
    fn test_bigint_conversions() {
        let mut g = graph();
        let m1 = g.add_node(NodeSpec::constant(Constant::Int64(-1)));
        let unsigned = g.add_node(NodeSpec::int64_to_bigint(m1, false));
        let folded = folds_to(&mut g, unsigned).unwrap();
        let Some(Constant::BigInt(h)) = g.as_constant(folded) else {
            panic!("expected a bigint constant");
        };
        assert_eq!(g.host().bigint(h), Some(u64::MAX as i128));

        let back = g.add_node(NodeSpec::truncate_bigint_to_int64(folded));
        let folded = folds_to(&mut g, back).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int64(-1)));
    }

    #[test]
    fn test_clamp_to_uint8_constant() {
        let mut g = graph();
        let c = g.add_node(NodeSpec::constant(Constant::Double(2.5)));
        let clamp = g.add_node(NodeSpec::clamp_to_uint8(c));
        let folded = folds_to(&mut g, clamp).unwrap();
        assert_eq!(g.as_constant(folded), Some(Constant::Int32(2)));
    }
}
