//! Phis: redundant operands and `x ? x : c` shaped merges.

use crate::error::MirResult;
use crate::ir::block::BlockId;
use crate::ir::builder::NodeSpec;
use crate::ir::graph::Graph;
use crate::ir::node::{DefFlags, DefId};
use crate::ir::opcode::Op;
use crate::ir::types::MirType;

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    if let Some(def) = operand_if_redundant(g, ins) {
        return Ok(Some(def));
    }
    fold_ternary(g, ins)
}

/// The value `phi` always equals, for `phi(a, a)` and `phi(a, phi)`.
pub fn operand_if_redundant(g: &Graph, phi: DefId) -> Option<DefId> {
    let mut found = None;
    for op in g.operands(phi) {
        if op == phi {
            continue;
        }
        match found {
            None => found = Some(op),
            Some(first) if first == op => {}
            Some(_) => return None,
        }
    }
    found
}

/// `phi(t, f)` at the join of a `Test(x)` where one arm carries `x` and the
/// other a constant.
fn fold_ternary(g: &mut Graph, phi: DefId) -> MirResult<Option<DefId>> {
    if g.num_operands(phi) != 2 {
        return Ok(None);
    }
    let Some(block) = g.def(phi).block() else {
        return Ok(None);
    };
    let preds = g.block(block).predecessors().to_vec();
    let [pred0, pred1] = preds[..] else {
        return Ok(None);
    };
    let Some(dom) = g.immediate_dominator(block) else {
        return Ok(None);
    };
    let Some(test) = g.control_instruction(dom) else {
        return Ok(None);
    };
    let Op::Test { if_true, if_false } = *g.op(test) else {
        return Ok(None);
    };

    let true_first = g.dominates(if_true, pred0);
    if true_first == g.dominates(if_true, pred1)
        || g.dominates(if_false, pred0) == g.dominates(if_false, pred1)
        || true_first == g.dominates(if_false, pred0)
    {
        return Ok(None);
    }

    let (true_def, false_def) = if true_first {
        (g.operand(phi, 0), g.operand(phi, 1))
    } else {
        (g.operand(phi, 1), g.operand(phi, 0))
    };
    let (c, test_arg) = match (g.as_constant(true_def), g.as_constant(false_def)) {
        (Some(c), _) => (c, false_def),
        (None, Some(c)) => (c, true_def),
        (None, None) => return Ok(None),
    };
    let const_def = if test_arg == true_def { false_def } else { true_def };
    if test_arg != g.operand(test, 0) {
        return Ok(None);
    }

    // Skip when a removed branch left the dominance of either arm incomplete.
    let (true_pred, false_pred) = if true_first { (pred0, pred1) } else { (pred1, pred0) };
    let (Some(true_block), Some(false_block)) = (g.def(true_def).block(), g.def(false_def).block())
    else {
        return Ok(None);
    };
    if !g.dominates(true_block, true_pred) || !g.dominates(false_block, false_pred) {
        return Ok(None);
    }

    match g.ty(test_arg) {
        MirType::Int32 if c.number_to_double() == Some(0.0) => {
            g.def_mut(test_arg).set_flag(DefFlags::GUARD_RANGE_BAILOUTS);
            hoist_constant(g, true_def, const_def, block, test);
            Ok(Some(true_def))
        }
        MirType::Double
            if const_def != true_def
                && c.number_to_double().is_some_and(|d| d == 0.0 && d.is_sign_positive()) =>
        {
            let replace = g.try_add_node(NodeSpec::nan_to_zero(test_arg))?;
            g.insert_before(test, replace);
            Ok(Some(replace))
        }
        MirType::String
            if c.as_string()
                .and_then(|s| g.host().string_length(s))
                == Some(0) =>
        {
            hoist_constant(g, true_def, const_def, block, test);
            Ok(Some(true_def))
        }
        _ => Ok(None),
    }
}

/// A folded-to constant from one arm must be visible at the join.
fn hoist_constant(g: &mut Graph, true_def: DefId, const_def: DefId, join: BlockId, test: DefId) {
    if true_def != const_def {
        return;
    }
    let visible = g
        .def(const_def)
        .block()
        .is_some_and(|b| g.dominates(b, join));
    if !visible {
        g.move_before(test, const_def);
    }
}
