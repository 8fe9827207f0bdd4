//! Edge-case analysis.
//!
//! Int32 `Div`, `Mod` and `Mul` carry flags for the cases that force a
//! bailout (division by zero, `INT32_MIN / -1`, negative zero). The forward
//! walk clears flags that constant operands rule out. The backward walk
//! clears negative-zero checks whose result no consumer can observe.

use tracing::{debug, trace};

use crate::error::MirResult;
use crate::ir::graph::Graph;
use crate::ir::node::{Consumer, DefId};
use crate::ir::opcode::Op;
use crate::ir::types::MirType;
use crate::opt::OptimizationPass;

/// Clear the edge-case flags of `def` that its constant operands rule out.
pub fn analyze_edge_cases_forward(g: &mut Graph, def: DefId) {
    if g.ty(def) != MirType::Int32 {
        return;
    }
    let const_int32 = |g: &Graph, i: usize| g.as_int32(g.operand(def, i));
    let is_constant = |g: &Graph, i: usize| g.as_constant(g.operand(def, i)).is_some();

    match g.op(def) {
        Op::Div(_) => {
            let lhs_const = is_constant(g, 0);
            let rhs_const = is_constant(g, 1);
            let lhs = const_int32(g, 0);
            let rhs = const_int32(g, 1);
            if let Op::Div(data) = g.def_mut(def).op_mut() {
                if rhs_const && rhs != Some(0) {
                    data.can_be_divide_by_zero = false;
                }
                if (lhs_const && lhs != Some(i32::MIN)) || (rhs_const && rhs != Some(-1)) {
                    data.can_be_negative_overflow = false;
                }
                if (lhs_const && lhs != Some(0)) || rhs.is_some_and(|r| r >= 0) {
                    data.can_be_negative_zero = false;
                }
            }
        }
        Op::Mod(_) => {
            let rhs_const = is_constant(g, 1);
            let rhs = const_int32(g, 1);
            let lhs = const_int32(g, 0);
            if let Op::Mod(data) = g.def_mut(def).op_mut() {
                if rhs_const && rhs != Some(0) {
                    data.can_be_divide_by_zero = false;
                }
                if let Some(n) = rhs {
                    if n > 0 && !(n as u32).is_power_of_two() {
                        data.can_be_power_of_two_divisor = false;
                    }
                }
                if lhs.is_some_and(|l| l >= 0) {
                    data.can_be_negative_dividend = false;
                }
            }
        }
        Op::Mul(_) => {
            let positive = const_int32(g, 0).is_some_and(|v| v > 0)
                || const_int32(g, 1).is_some_and(|v| v > 0);
            if positive {
                if let Op::Mul(data) = g.def_mut(def).op_mut() {
                    data.can_be_negative_zero = false;
                }
            }
        }
        _ => {}
    }
}

/// Clear the negative-zero check of `def` when no consumer can tell `-0`
/// from `0`.
pub fn analyze_edge_cases_backward(g: &mut Graph, def: DefId) {
    let wants_check = match g.op(def) {
        Op::Div(data) => data.can_be_negative_zero,
        Op::Mul(data) => data.can_be_negative_zero,
        Op::ToNumberInt32 {
            needs_negative_zero_check,
            ..
        } => *needs_negative_zero_check,
        _ => return,
    };
    if !wants_check || need_negative_zero_check(g, def) {
        return;
    }
    trace!("dropping negative zero check on {:?}", def);
    match g.def_mut(def).op_mut() {
        Op::Div(data) => data.can_be_negative_zero = false,
        Op::Mul(data) => data.can_be_negative_zero = false,
        Op::ToNumberInt32 {
            needs_negative_zero_check,
            ..
        } => *needs_negative_zero_check = false,
        _ => {}
    }
}

/// Whether any consumer of `def` could observe a negative zero.
pub fn need_negative_zero_check(g: &Graph, def: DefId) -> bool {
    let d = g.def(def);
    // A fallible conversion is a guard for its own bailout, which says
    // nothing about its consumers.
    let intrinsic_guard = matches!(d.op(), Op::ToNumberInt32 { .. });
    if (d.is_guard() && !intrinsic_guard) || d.is_guard_range_bailouts() {
        return true;
    }

    for u in g.uses(def) {
        let consumer = match g.use_edge(u).consumer() {
            Consumer::Definition(c) => c,
            Consumer::ResumePoint(_) | Consumer::Store(_) => return true,
        };
        let c = g.def(consumer);
        let operand_zero_or_tail = || {
            let operands = g.operands(consumer);
            operands.first() == Some(&def) || operands.iter().skip(2).any(|&op| op == def)
        };
        match c.op() {
            Op::Add(_) => {
                if c.is_truncated() {
                    continue;
                }
                // x + y is -0 only when both are -0: the check can go on
                // whichever operand is computed last.
                let (mut first, mut second) = (g.operand(consumer, 0), g.operand(consumer, 1));
                if first > second {
                    std::mem::swap(&mut first, &mut second);
                }
                if def == first && can_produce_negative_zero(g, second) {
                    return true;
                }
            }
            Op::Sub(_) => {
                if c.is_truncated() {
                    continue;
                }
                let (lhs, rhs) = (g.operand(consumer, 0), g.operand(consumer, 1));
                if rhs < lhs && can_produce_negative_zero(g, lhs) {
                    return true;
                }
                if operand_zero_or_tail() {
                    return true;
                }
            }
            Op::StoreElement { .. } | Op::LoadElement { .. } | Op::Mod(_) | Op::MinMax { .. } => {
                if operand_zero_or_tail() {
                    return true;
                }
            }
            Op::BoundsCheck { .. } => {
                if g.operand(consumer, 1) == def {
                    return true;
                }
            }
            Op::ToString
            | Op::TableSwitch { .. }
            | Op::Compare { .. }
            | Op::BitAnd
            | Op::BitOr
            | Op::BitXor
            | Op::Abs { .. }
            | Op::TruncateToInt32 => {}
            _ => return true,
        }
    }
    false
}

/// Whether `def` may evaluate to `-0`.
pub fn can_produce_negative_zero(g: &Graph, def: DefId) -> bool {
    match g.op(def) {
        Op::Constant(c) => match c.ty() {
            MirType::Double => c.number_to_double() == Some(0.0),
            _ => false,
        },
        Op::BitAnd | Op::BitOr | Op::BitXor | Op::BitNot | Op::Lsh | Op::Rsh => false,
        _ => true,
    }
}

// =============================================================================
// Edge Case Pass
// =============================================================================

/// Statistics from one edge-case run.
#[derive(Debug, Clone, Default)]
pub struct EdgeCaseStats {
    /// Definitions whose flags changed.
    pub refined: usize,
}

/// Forward then backward edge-case analysis over the whole graph.
#[derive(Debug, Default)]
pub struct EdgeCaseAnalysis {
    stats: EdgeCaseStats,
}

impl EdgeCaseAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &EdgeCaseStats {
        &self.stats
    }
}

impl OptimizationPass for EdgeCaseAnalysis {
    fn name(&self) -> &'static str {
        "edge-cases"
    }

    fn run(&mut self, graph: &mut Graph) -> MirResult<bool> {
        self.stats = EdgeCaseStats::default();
        graph.build_dominator_tree();
        let order: Vec<DefId> = graph
            .rpo()
            .iter()
            .flat_map(|&b| graph.block(b).instructions().iter().copied())
            .collect();

        for &def in &order {
            let before = graph.op(def).clone();
            analyze_edge_cases_forward(graph, def);
            if *graph.op(def) != before {
                self.stats.refined += 1;
            }
        }
        for &def in order.iter().rev() {
            let before = graph.op(def).clone();
            analyze_edge_cases_backward(graph, def);
            if *graph.op(def) != before {
                self.stats.refined += 1;
            }
        }

        debug!("edge cases: {} definitions refined", self.stats.refined);
        Ok(self.stats.refined > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::block::BlockId;
    use crate::ir::builder::NodeSpec;
    use crate::ir::constant::Constant;
    use crate::ir::host::HostTable;
    use crate::ir::opcode::{CompareOp, CompareType, IntConversionInput};
    use crate::ir::resume::ResumeMode;

    fn graph() -> (Graph, BlockId) {
        let mut g = Graph::new(HostTable::new(), MirConfig::default());
        let b = g.new_block();
        g.set_entry(b);
        (g, b)
    }

    fn div_data(g: &Graph, def: DefId) -> crate::ir::opcode::DivData {
        match g.op(def) {
            Op::Div(data) => *data,
            op => panic!("not a div: {:?}", op),
        }
    }

    #[test]
    fn test_div_by_constant() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let three = g.push(b, NodeSpec::constant(Constant::Int32(3)));
        let div = g.push(b, NodeSpec::div(x, three, MirType::Int32));
        analyze_edge_cases_forward(&mut g, div);
        let data = div_data(&g, div);
        assert!(!data.can_be_divide_by_zero);
        assert!(!data.can_be_negative_overflow);
        assert!(!data.can_be_negative_zero);

        let minus_one = g.push(b, NodeSpec::constant(Constant::Int32(-1)));
        let div = g.push(b, NodeSpec::div(x, minus_one, MirType::Int32));
        analyze_edge_cases_forward(&mut g, div);
        let data = div_data(&g, div);
        assert!(!data.can_be_divide_by_zero);
        assert!(data.can_be_negative_overflow);
        assert!(data.can_be_negative_zero);
    }

    #[test]
    fn test_double_div_untouched() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Double));
        let three = g.push(b, NodeSpec::constant(Constant::Double(3.0)));
        let div = g.push(b, NodeSpec::div(x, three, MirType::Double));
        analyze_edge_cases_forward(&mut g, div);
        assert!(div_data(&g, div).can_be_divide_by_zero);
    }

    #[test]
    fn test_mod_power_of_two() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let six = g.push(b, NodeSpec::constant(Constant::Int32(6)));
        let eight = g.push(b, NodeSpec::constant(Constant::Int32(8)));
        let m6 = g.push(b, NodeSpec::mod_(x, six, MirType::Int32));
        let m8 = g.push(b, NodeSpec::mod_(x, eight, MirType::Int32));
        analyze_edge_cases_forward(&mut g, m6);
        analyze_edge_cases_forward(&mut g, m8);
        match (g.op(m6), g.op(m8)) {
            (Op::Mod(a), Op::Mod(b)) => {
                assert!(!a.can_be_power_of_two_divisor);
                assert!(b.can_be_power_of_two_divisor);
                assert!(!a.can_be_divide_by_zero && !b.can_be_divide_by_zero);
                assert!(a.can_be_negative_dividend);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_negative_zero_unobservable_through_bitops() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let y = g.push(b, NodeSpec::parameter(1, MirType::Int32));
        let mul = g.push(b, NodeSpec::mul(x, y, MirType::Int32));
        let or = g.push(b, NodeSpec::bit_or(mul, x));
        g.push(b, NodeSpec::return_(or));
        assert!(!need_negative_zero_check(&g, mul));

        let mut pass = EdgeCaseAnalysis::new();
        assert!(pass.run(&mut g).unwrap());
        assert!(matches!(g.op(mul), Op::Mul(data) if !data.can_be_negative_zero));
    }

    #[test]
    fn test_negative_zero_observable() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let y = g.push(b, NodeSpec::parameter(1, MirType::Int32));
        let mul = g.push(b, NodeSpec::mul(x, y, MirType::Int32));
        g.push(b, NodeSpec::return_(mul));
        assert!(need_negative_zero_check(&g, mul));

        // A snapshot observes the exact value.
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let mul = g.push(b, NodeSpec::mul(x, x, MirType::Int32));
        g.push_slot(b, mul);
        g.capture_resume_point(b, 0, ResumeMode::ResumeAt).unwrap();
        assert!(need_negative_zero_check(&g, mul));
    }

    #[test]
    fn test_add_checks_first_operand_only() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let y = g.push(b, NodeSpec::parameter(1, MirType::Int32));
        let first = g.push(b, NodeSpec::mul(x, y, MirType::Int32));
        let second = g.push(b, NodeSpec::mul(y, y, MirType::Int32));
        let add = g.push(b, NodeSpec::add(second, first, MirType::Int32));
        let cmp = g.push(b, NodeSpec::compare(add, x, CompareOp::Lt, CompareType::Int32));
        g.push(b, NodeSpec::return_(cmp));
        assert!(need_negative_zero_check(&g, first));
        assert!(!need_negative_zero_check(&g, second));
    }

    #[test]
    fn test_to_number_int32_check_dropped() {
        let (mut g, b) = graph();
        let v = g.push(b, NodeSpec::parameter(0, MirType::Value));
        let conv = g.push(b, NodeSpec::to_number_int32(v, IntConversionInput::NumbersOnly));
        let y = g.push(b, NodeSpec::parameter(1, MirType::Int32));
        let and = g.push(b, NodeSpec::bit_and(conv, y));
        g.push(b, NodeSpec::return_(and));
        analyze_edge_cases_backward(&mut g, conv);
        assert!(matches!(
            g.op(conv),
            Op::ToNumberInt32 {
                needs_negative_zero_check: false,
                ..
            }
        ));
    }

    #[test]
    fn test_can_produce_negative_zero() {
        let (mut g, b) = graph();
        let zero = g.push(b, NodeSpec::constant(Constant::Double(0.0)));
        let one = g.push(b, NodeSpec::constant(Constant::Double(1.0)));
        let int_zero = g.push(b, NodeSpec::constant(Constant::Int32(0)));
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let and = g.push(b, NodeSpec::bit_and(x, x));
        assert!(can_produce_negative_zero(&g, zero));
        assert!(!can_produce_negative_zero(&g, one));
        assert!(!can_produce_negative_zero(&g, int_zero));
        assert!(!can_produce_negative_zero(&g, and));
        assert!(can_produce_negative_zero(&g, x));
    }
}
