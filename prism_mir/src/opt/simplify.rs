//! Simplifier: drives [`folds_to`] to a fixpoint.
//!
//! Each sweep visits every reachable block in reverse postorder, phis
//! first. A value replacement takes over every use of the folded
//! definition; a control replacement is installed as the block's new
//! terminator. Definitions left without uses are discarded along with any
//! operands that die with them.

use tracing::{debug, trace};

use crate::error::MirResult;
use crate::ir::graph::Graph;
use crate::ir::node::{BailoutKind, DefFlags, DefId};
use crate::opt::fold::folds_to;
use crate::opt::OptimizationPass;

/// Statistics from one simplifier run.
#[derive(Debug, Clone, Default)]
pub struct SimplifyStats {
    /// Value replacements applied.
    pub folded: usize,
    /// Terminators replaced.
    pub control_folded: usize,
    /// Definitions discarded as dead.
    pub discarded: usize,
    /// Sweeps performed.
    pub iterations: usize,
}

/// Fold-to-fixpoint driver.
#[derive(Debug, Default)]
pub struct Simplifier {
    stats: SimplifyStats,
}

impl Simplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &SimplifyStats {
        &self.stats
    }

    /// One sweep over the reachable blocks. Returns whether anything changed.
    fn sweep(&mut self, g: &mut Graph) -> MirResult<bool> {
        let mut changed = false;
        for block in g.rpo().to_vec() {
            let defs: Vec<DefId> = g
                .block(block)
                .phis()
                .iter()
                .chain(g.block(block).instructions().iter())
                .copied()
                .collect();
            for def in defs {
                changed |= self.visit(g, def)?;
            }
        }
        Ok(changed)
    }

    fn visit(&mut self, g: &mut Graph, def: DefId) -> MirResult<bool> {
        if g.def(def).is_discarded() || g.def(def).block().is_none() {
            return Ok(false);
        }
        if g.is_discardable(def) {
            self.discard_recursively(g, def);
            return Ok(true);
        }

        let folded = folds_to(g, def)?;
        if folded == def {
            return Ok(false);
        }

        if g.op(def).is_control() {
            let Some(block) = g.def(def).block() else {
                return Ok(false);
            };
            trace!("replacing terminator of {:?} with {:?}", block, folded);
            g.replace_control_instruction(block, folded);
            self.stats.control_folded += 1;
            return Ok(true);
        }

        // Either the replacement checks the same condition or no check is
        // needed, so the folded node no longer has to stay as a guard.
        let d = g.def(def);
        let range_bailouts = d.is_guard_range_bailouts();
        let kind = d.bailout_kind();
        g.def_mut(def).clear_flag(DefFlags::GUARD);
        if range_bailouts {
            g.def_mut(folded).set_flag(DefFlags::GUARD_RANGE_BAILOUTS);
        }
        if g.def(folded).bailout_kind() == BailoutKind::Unknown {
            g.def_mut(folded).set_bailout_kind(kind);
        }

        g.just_replace_all_uses_with(def, folded);
        self.stats.folded += 1;
        if g.is_discardable(def) {
            self.discard_recursively(g, def);
        }
        Ok(true)
    }

    /// Discard `def`, then every operand that becomes dead as a result.
    fn discard_recursively(&mut self, g: &mut Graph, def: DefId) {
        let mut worklist = vec![def];
        while let Some(def) = worklist.pop() {
            if g.def(def).is_discarded() || !g.is_discardable(def) {
                continue;
            }
            let operands = g.operands(def);
            g.discard(def);
            self.stats.discarded += 1;
            worklist.extend(operands.into_iter().filter(|&op| op != def));
        }
    }
}

impl OptimizationPass for Simplifier {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn run(&mut self, graph: &mut Graph) -> MirResult<bool> {
        self.stats = SimplifyStats::default();
        let max = graph.config().max_fold_iterations;
        let mut changed = false;
        while self.stats.iterations < max {
            graph.build_dominator_tree();
            self.stats.iterations += 1;
            if !self.sweep(graph)? {
                break;
            }
            changed = true;
        }
        debug!(
            "simplify: {} folds, {} terminators, {} discarded in {} sweeps",
            self.stats.folded, self.stats.control_folded, self.stats.discarded, self.stats.iterations
        );
        Ok(changed)
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
    use crate::ir::opcode::Opcode;
    use crate::ir::types::MirType;

    fn graph() -> (Graph, BlockId) {
        let mut g = Graph::new(HostTable::new(), MirConfig::default());
        let b = g.new_block();
        g.set_entry(b);
        (g, b)
    }

    #[test]
    fn test_constant_chain_folds_to_fixpoint() {
        let (mut g, b) = graph();
        let two = g.push(b, NodeSpec::constant(Constant::Int32(2)));
        let three = g.push(b, NodeSpec::constant(Constant::Int32(3)));
        let sum = g.push(b, NodeSpec::add(two, three, MirType::Int32));
        let product = g.push(b, NodeSpec::mul(sum, sum, MirType::Int32));
        let ret = g.push(b, NodeSpec::return_(product));

        let mut pass = Simplifier::new();
        assert!(pass.run(&mut g).unwrap());
        let result = g.operand(ret, 0);
        assert_eq!(g.as_int32(result), Some(25));
        assert!(g.def(sum).is_discarded());
        assert!(g.def(product).is_discarded());
        assert!(pass.stats().folded >= 2);
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_identity_forwards_operand() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let zero = g.push(b, NodeSpec::constant(Constant::Int32(0)));
        let or = g.push(b, NodeSpec::bit_or(x, zero));
        let ret = g.push(b, NodeSpec::return_(or));

        Simplifier::new().run(&mut g).unwrap();
        assert_eq!(g.operand(ret, 0), x);
        assert!(g.def(zero).is_discarded());
    }

    #[test]
    fn test_constant_test_becomes_goto() {
        let mut g = Graph::new(HostTable::new(), MirConfig::default());
        let entry = g.new_block();
        let t = g.new_block();
        let f = g.new_block();
        g.set_entry(entry);
        let cond = g.push(entry, NodeSpec::constant(Constant::Boolean(true)));
        g.push(entry, NodeSpec::test(cond, t, f));
        g.add_predecessor(t, entry);
        g.add_predecessor(f, entry);
        let one = g.push(t, NodeSpec::constant(Constant::Int32(1)));
        g.push(t, NodeSpec::return_(one));
        let two = g.push(f, NodeSpec::constant(Constant::Int32(2)));
        g.push(f, NodeSpec::return_(two));

        let mut pass = Simplifier::new();
        pass.run(&mut g).unwrap();
        let control = g.control_instruction(entry).unwrap();
        assert_eq!(g.opcode(control), Opcode::Goto);
        assert_eq!(g.successors(entry), vec![t]);
        assert!(g.block(f).predecessors().is_empty());
        assert_eq!(pass.stats().control_folded, 1);
        assert!(g.def(cond).is_discarded());
    }

    #[test]
    fn test_effectful_definitions_survive() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Value));
        let call = g.push(b, NodeSpec::call(&[x], MirType::Value));
        let one = g.push(b, NodeSpec::constant(Constant::Int32(1)));
        g.push(b, NodeSpec::return_(one));

        Simplifier::new().run(&mut g).unwrap();
        assert!(!g.def(call).is_discarded());
        assert!(!g.def(x).is_discarded());
    }

    #[test]
    fn test_iterations_bounded_by_config() {
        let mut g = Graph::new(
            HostTable::new(),
            MirConfig {
                max_fold_iterations: 1,
                ..MirConfig::default()
            },
        );
        let b = g.new_block();
        g.set_entry(b);
        let two = g.push(b, NodeSpec::constant(Constant::Int32(2)));
        let sum = g.push(b, NodeSpec::add(two, two, MirType::Int32));
        g.push(b, NodeSpec::return_(sum));

        let mut pass = Simplifier::new();
        pass.run(&mut g).unwrap();
        assert_eq!(pass.stats().iterations, 1);
    }
}
