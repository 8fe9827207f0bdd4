//! Loads, bounds checks and lengths.

use super::emit;
use crate::error::MirResult;
use crate::ir::alias::AliasType;
use crate::ir::builder::NodeSpec;
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::Op;
use crate::ir::types::MirType;
use crate::opt::alias::might_alias;

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    match g.op(ins) {
        Op::LoadFixedSlot { .. } | Op::LoadDynamicSlot { .. } | Op::LoadElement { .. } => {
            folds_to_store(g, ins)
        }
        Op::BoundsCheck { min, max, .. } => Ok(fold_bounds_check(g, ins, *min, *max)),
        _ => Ok(None),
    }
}

/// Forward the value of the store `load` depends on, when that store
/// writes exactly what `load` reads and its block dominates `load`'s.
///
/// A load typed `Value` reading a narrower stored value gets a `Box` placed
/// before it. Any other type mismatch declines.
pub fn folds_to_store(g: &mut Graph, load: DefId) -> MirResult<Option<DefId>> {
    let Some(store) = g.def(load).dependency() else {
        return Ok(None);
    };
    if g.def(store).is_discarded() || might_alias(g, load, store) != AliasType::MustAlias {
        return Ok(None);
    }
    let (Some(store_block), Some(load_block)) = (g.def(store).block(), g.def(load).block())
    else {
        return Ok(None);
    };
    if !g.dominates(store_block, load_block) {
        return Ok(None);
    }

    let value = match g.op(store) {
        Op::StoreFixedSlot { .. } | Op::StoreDynamicSlot { .. } => g.operand(store, 1),
        Op::StoreElement { .. } => g.operand(store, 2),
        _ => return Ok(None),
    };
    let load_ty = g.ty(load);
    if g.ty(value) == load_ty {
        return Ok(Some(value));
    }
    if load_ty != MirType::Value {
        return Ok(None);
    }
    emit(g, load, NodeSpec::box_(value)).map(Some)
}

fn fold_bounds_check(g: &Graph, ins: DefId, min: i32, max: i32) -> Option<DefId> {
    if g.ty(ins) != MirType::Int32 {
        return None;
    }
    let index = g.operand(ins, 0);
    let idx = g.as_int32(index)? as u32;
    let len = g.as_int32(g.operand(ins, 1))? as u32;
    let in_bounds =
        idx.wrapping_add(min as u32) < len && idx.wrapping_add(max as u32) < len;
    in_bounds.then_some(index)
}
