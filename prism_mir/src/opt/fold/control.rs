//! Branches. Replacements are new, unplaced control instructions.

use super::new_control;
use crate::error::MirResult;
use crate::ir::block::BlockId;
use crate::ir::builder::NodeSpec;
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::{Op, Opcode};
use crate::ir::types::MirType;

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    match g.op(ins).clone() {
        Op::Test { if_true, if_false } => fold_test(g, ins, if_true, if_false),
        Op::TableSwitch {
            low,
            cases,
            default,
        } => fold_table_switch(g, ins, low, &cases, default),
        _ => Ok(None),
    }
}

fn fold_test(
    g: &mut Graph,
    ins: DefId,
    if_true: BlockId,
    if_false: BlockId,
) -> MirResult<Option<DefId>> {
    if let Some(target) = redundant_test_target(g, ins, if_true, if_false) {
        return new_control(g, NodeSpec::goto(target));
    }

    let cond = g.operand(ins, 0);
    if g.opcode(cond) == Opcode::Not {
        let inner = g.operand(cond, 0);
        if g.opcode(inner) == Opcode::Not {
            let input = g.operand(inner, 0);
            return new_control(g, NodeSpec::test(input, if_true, if_false));
        }
        return new_control(g, NodeSpec::test(inner, if_false, if_true));
    }

    let truthy = g
        .as_constant(cond)
        .and_then(|c| c.to_boolean(g.host()));
    if let Some(b) = truthy {
        return new_control(g, NodeSpec::goto(if b { if_true } else { if_false }));
    }

    match g.ty(cond) {
        MirType::Undefined | MirType::Null => return new_control(g, NodeSpec::goto(if_false)),
        MirType::Symbol => return new_control(g, NodeSpec::goto(if_true)),
        _ => {}
    }

    if is_needless_diamond(g, if_true, if_false) {
        return new_control(g, NodeSpec::goto(if_true));
    }
    Ok(None)
}

/// A dominating test of the same condition already decided this one.
fn redundant_test_target(
    g: &Graph,
    ins: DefId,
    if_true: BlockId,
    if_false: BlockId,
) -> Option<BlockId> {
    let block = g.def(ins).block()?;
    let mut cond = g.operand(ins, 0);
    let mut inverted = false;
    if g.opcode(cond) == Opcode::Not {
        cond = g.operand(cond, 0);
        inverted = true;
        if g.opcode(cond) == Opcode::Not {
            cond = g.operand(cond, 0);
            inverted = false;
        }
    }

    for use_id in g.uses(cond) {
        let Some(other) = g.use_edge(use_id).consumer().as_definition() else {
            continue;
        };
        if other == ins || g.def(other).block().is_none() {
            continue;
        }
        let Op::Test {
            if_true: other_true,
            if_false: other_false,
        } = *g.op(other)
        else {
            continue;
        };
        if g.dominates(other_false, block) {
            return Some(if inverted { if_true } else { if_false });
        }
        if g.dominates(other_true, block) {
            return Some(if inverted { if_false } else { if_true });
        }
    }
    None
}

/// Every instruction of `block`, other than its `Goto`, is removable and
/// only used inside `block`.
fn all_dead_if_unused(g: &Graph, block: BlockId) -> bool {
    g.block(block).instructions().iter().all(|&ins| {
        if g.opcode(ins) == Opcode::Goto {
            return true;
        }
        let local = g
            .uses(ins)
            .all(|u| g.consumer_block(g.use_edge(u).consumer()) == Some(block));
        local && g.is_dead_if_unused(ins)
    })
}

/// Both arms are empty and meet at a join without phis.
fn is_needless_diamond(g: &Graph, if_true: BlockId, if_false: BlockId) -> bool {
    if !all_dead_if_unused(g, if_true) || !all_dead_if_unused(g, if_false) {
        return false;
    }
    match (g.single_successor(if_true), g.single_successor(if_false)) {
        (Some(a), Some(b)) if a == b => g.successor_with_phis(if_true).is_none(),
        _ => false,
    }
}

fn fold_table_switch(
    g: &mut Graph,
    ins: DefId,
    low: i32,
    cases: &[BlockId],
    default: BlockId,
) -> MirResult<Option<DefId>> {
    let index = g.operand(ins, 0);
    let ty = g.ty(index);
    if g.op(ins).successors().len() == 1 || (ty != MirType::Value && !ty.is_number()) {
        return new_control(g, NodeSpec::goto(default));
    }
    if let Some(v) = g.as_int32(index) {
        let offset = v as i64 - low as i64;
        let target = usize::try_from(offset)
            .ok()
            .and_then(|i| cases.get(i).copied())
            .unwrap_or(default);
        return new_control(g, NodeSpec::goto(target));
    }
    Ok(None)
}
