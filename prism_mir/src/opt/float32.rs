//! Float32 specialization.
//!
//! Double arithmetic whose inputs are exact single-precision values and
//! whose consumers round to single precision anyway computes the same
//! result in float32. The pass marks which phis can produce and consume
//! float32, retypes instructions in reverse postorder, then inserts the
//! `ToDouble`/`ToFloat32` conversions every operand needs to match its
//! consumer.

use tracing::{debug, trace};

use crate::error::MirResult;
use crate::ir::block::BlockId;
use crate::ir::builder::NodeSpec;
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::{CompareType, Op};
use crate::ir::types::MirType;
use crate::opt::OptimizationPass;

// =============================================================================
// Producer / consumer queries
// =============================================================================

/// Whether `def` yields a value exactly representable as float32.
pub fn can_produce_float32(g: &Graph, def: DefId) -> bool {
    let d = g.def(def);
    if d.ty() == MirType::Float32 {
        return true;
    }
    match d.op() {
        Op::Constant(c) => c.ty().is_number() && c.is_float32_representable(),
        Op::Phi(data) => data.can_produce_float32,
        _ => false,
    }
}

/// Whether `consumer` gives the same result when its operand is rounded to
/// float32 first.
pub fn can_consume_float32(g: &Graph, consumer: DefId) -> bool {
    let d = g.def(consumer);
    match d.op() {
        Op::ToFloat32 { .. } | Op::ToDouble | Op::TruncateToInt32 | Op::Test { .. } | Op::Not => {
            true
        }
        Op::Phi(data) => data.can_consume_float32,
        Op::Compare { compare_type, .. } => *compare_type == CompareType::Float32,
        _ if is_float32_commutative(d.op()) => d.ty() == MirType::Float32,
        _ => false,
    }
}

/// Instructions whose float32 version rounds like their double version.
fn is_float32_commutative(op: &Op) -> bool {
    match op {
        Op::Add(_) | Op::Sub(_) | Op::Mul(_) | Op::Div(_) | Op::Sqrt | Op::Abs { .. } => true,
        Op::MinMax { .. } => true,
        Op::MathFunction { func } => func.is_rounding(),
        _ => false,
    }
}

/// Operand types an instruction accepts without a conversion.
fn accepts_float32_operands(g: &Graph, def: DefId) -> bool {
    let d = g.def(def);
    match d.op() {
        Op::ToFloat32 { .. } | Op::ToDouble | Op::TruncateToInt32 | Op::Test { .. } | Op::Not => {
            true
        }
        Op::Compare { compare_type, .. } => *compare_type == CompareType::Float32,
        op if is_float32_commutative(op) => d.ty() == MirType::Float32,
        _ => false,
    }
}

fn all_operands_produce_float32(g: &Graph, def: DefId) -> bool {
    g.operands(def).iter().all(|&op| can_produce_float32(g, op))
}

fn uses_are_float32_consumers(g: &Graph, def: DefId) -> bool {
    if g.def(def).is_implicitly_used() {
        return false;
    }
    g.uses(def).all(|u| match g.use_edge(u).consumer().as_definition() {
        Some(consumer) => can_consume_float32(g, consumer),
        // Snapshots hold the exact value either way.
        None => true,
    })
}

// =============================================================================
// Conversions
// =============================================================================

/// Widen every float32 operand of `def` with an explicit `ToDouble`.
fn convert_operands_to_double(g: &mut Graph, def: DefId) -> MirResult<usize> {
    convert_operands(g, def, |ty| ty == MirType::Float32, NodeSpec::to_double)
}

/// Narrow every operand of a float32 instruction that is not float32 yet.
fn convert_operands_to_float32(g: &mut Graph, def: DefId) -> MirResult<usize> {
    convert_operands(g, def, |ty| ty != MirType::Float32, NodeSpec::to_float32)
}

fn convert_operands(
    g: &mut Graph,
    def: DefId,
    needs: impl Fn(MirType) -> bool,
    make: impl Fn(DefId) -> NodeSpec,
) -> MirResult<usize> {
    let mut inserted = 0;
    for i in 0..g.num_operands(def) {
        let input = g.operand(def, i);
        if input == def || !needs(g.ty(input)) {
            continue;
        }
        let conversion = g.try_add_node(make(input))?;
        if g.def(def).is_phi() {
            let Some(block) = g.def(def).block() else {
                continue;
            };
            let pred = g.block(block).predecessors()[i];
            insert_at_end(g, pred, conversion);
        } else {
            g.insert_before(def, conversion);
        }
        g.replace_operand(def, i, conversion);
        inserted += 1;
    }
    Ok(inserted)
}

fn insert_at_end(g: &mut Graph, block: BlockId, def: DefId) {
    match g.control_instruction(block) {
        Some(last) => g.insert_before(last, def),
        None => g.append(block, def),
    }
}

/// Retype `def` to float32 if its inputs and consumers allow it; otherwise
/// widen its float32 operands. Returns whether `def` was retyped.
pub fn try_specialize_float32(g: &mut Graph, def: DefId) -> MirResult<bool> {
    let d = g.def(def);
    let ty = d.ty();
    match d.op() {
        Op::Add(_) | Op::Sub(_) | Op::Mul(_) | Op::Div(_) | Op::Sqrt => {
            // Int32 arithmetic is better than float32.
            if ty != MirType::Double {
                return Ok(false);
            }
            ensure_float_consumers_and_input_or_convert(g, def)
        }
        Op::MathFunction { func } if func.is_rounding() => {
            if ty != MirType::Double {
                return Ok(false);
            }
            ensure_float_consumers_and_input_or_convert(g, def)
        }
        Op::Abs { .. } => {
            if ty != MirType::Double || g.ty(g.operand(def, 0)) == MirType::Int32 {
                return Ok(false);
            }
            ensure_float_consumers_and_input_or_convert(g, def)
        }
        Op::MinMax { .. } => {
            if ty != MirType::Double {
                return Ok(false);
            }
            let produces = |op: DefId| {
                can_produce_float32(g, op)
                    || (matches!(g.op(op), Op::MinMax { .. }) && g.ty(op) == MirType::Float32)
            };
            if g.operands(def).iter().all(|&op| produces(op)) {
                g.def_mut(def).set_result_type(MirType::Float32);
                Ok(true)
            } else {
                convert_operands_to_double(g, def)?;
                Ok(false)
            }
        }
        Op::Compare {
            compare_type: CompareType::Double,
            ..
        } if all_operands_produce_float32(g, def) => {
            if let Op::Compare { compare_type, .. } = g.def_mut(def).op_mut() {
                *compare_type = CompareType::Float32;
            }
            Ok(true)
        }
        Op::Compare { .. } => {
            convert_operands_to_double(g, def)?;
            Ok(false)
        }
        Op::Not => {
            if !all_operands_produce_float32(g, def) {
                convert_operands_to_double(g, def)?;
            }
            Ok(false)
        }
        _ => Ok(false),
    }
}

fn ensure_float_consumers_and_input_or_convert(g: &mut Graph, def: DefId) -> MirResult<bool> {
    if all_operands_produce_float32(g, def) && uses_are_float32_consumers(g, def) {
        g.def_mut(def).set_result_type(MirType::Float32);
        return Ok(true);
    }
    convert_operands_to_double(g, def)?;
    Ok(false)
}

// =============================================================================
// Float32 Pass
// =============================================================================

/// Statistics from one float32 run.
#[derive(Debug, Clone, Default)]
pub struct Float32Stats {
    /// Instructions retyped to float32.
    pub specialized: usize,
    /// Phis retyped to float32.
    pub phis: usize,
    /// Conversions inserted.
    pub conversions: usize,
}

/// Float32 specialization pass.
#[derive(Debug, Default)]
pub struct Float32Specialization {
    stats: Float32Stats,
}

impl Float32Specialization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &Float32Stats {
        &self.stats
    }

    fn phis(g: &Graph) -> Vec<DefId> {
        g.rpo()
            .iter()
            .flat_map(|&b| g.block(b).phis().iter().copied())
            .collect()
    }

    /// Optimistically assume every double phi produces float32, then drop
    /// the assumption for phis with a non-float32 input until stable.
    fn mark_phi_producers(g: &mut Graph, phis: &[DefId]) {
        for &phi in phis {
            let double = g.ty(phi) == MirType::Double;
            if let Op::Phi(data) = g.def_mut(phi).op_mut() {
                data.can_produce_float32 = double;
            }
        }
        let mut changed = true;
        while changed {
            changed = false;
            for &phi in phis {
                if !can_produce_float32(g, phi) {
                    continue;
                }
                let ok = g
                    .operands(phi)
                    .iter()
                    .all(|&op| op == phi || can_produce_float32(g, op));
                if !ok {
                    if let Op::Phi(data) = g.def_mut(phi).op_mut() {
                        data.can_produce_float32 = false;
                    }
                    changed = true;
                }
            }
        }
    }

    /// Same for consumers: a phi consumes float32 when every consumer does.
    fn mark_phi_consumers(g: &mut Graph, phis: &[DefId]) {
        for &phi in phis {
            let double = g.ty(phi) == MirType::Double && !g.def(phi).is_implicitly_used();
            if let Op::Phi(data) = g.def_mut(phi).op_mut() {
                data.can_consume_float32 = double;
            }
        }
        let mut changed = true;
        while changed {
            changed = false;
            for &phi in phis {
                if !can_consume_float32(g, phi) {
                    continue;
                }
                let ok = g.uses(phi).all(|u| {
                    match g.use_edge(u).consumer().as_definition() {
                        Some(c) => c == phi || can_consume_float32(g, c),
                        None => true,
                    }
                });
                if !ok {
                    if let Op::Phi(data) = g.def_mut(phi).op_mut() {
                        data.can_consume_float32 = false;
                    }
                    changed = true;
                }
            }
        }
    }
}

impl OptimizationPass for Float32Specialization {
    fn name(&self) -> &'static str {
        "float32"
    }

    fn run(&mut self, graph: &mut Graph) -> MirResult<bool> {
        self.stats = Float32Stats::default();
        if !graph.config().float32_specialization {
            return Ok(false);
        }
        graph.build_dominator_tree();

        let phis = Self::phis(graph);
        Self::mark_phi_producers(graph, &phis);
        Self::mark_phi_consumers(graph, &phis);

        let blocks = graph.rpo().to_vec();
        for &block in &blocks {
            let instructions = graph.block(block).instructions().to_vec();
            for def in instructions {
                if graph.def(def).is_discarded() {
                    continue;
                }
                if try_specialize_float32(graph, def)? {
                    trace!("float32 {:?}", def);
                    self.stats.specialized += 1;
                }
            }
        }

        for &phi in &phis {
            let data = match graph.op(phi) {
                Op::Phi(data) => *data,
                _ => continue,
            };
            if data.can_produce_float32 && data.can_consume_float32 {
                graph.def_mut(phi).set_result_type(MirType::Float32);
                self.stats.phis += 1;
            }
        }

        // Make every operand match what its consumer now expects.
        for &phi in &phis {
            self.stats.conversions += if graph.ty(phi) == MirType::Float32 {
                convert_operands_to_float32(graph, phi)?
            } else {
                convert_operands_to_double(graph, phi)?
            };
        }
        for &block in &blocks {
            let instructions = graph.block(block).instructions().to_vec();
            for def in instructions {
                let float32 = match graph.op(def) {
                    Op::Compare { compare_type, .. } => *compare_type == CompareType::Float32,
                    op => is_float32_commutative(op) && graph.ty(def) == MirType::Float32,
                };
                self.stats.conversions += if float32 {
                    convert_operands_to_float32(graph, def)?
                } else if accepts_float32_operands(graph, def) {
                    0
                } else {
                    convert_operands_to_double(graph, def)?
                };
            }
        }

        debug!(
            "float32: {} instructions, {} phis, {} conversions",
            self.stats.specialized, self.stats.phis, self.stats.conversions
        );
        Ok(self.stats.specialized + self.stats.phis + self.stats.conversions > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::constant::Constant;
    use crate::ir::host::HostTable;
    use crate::ir::opcode::{CompareOp, Opcode};

    fn graph() -> (Graph, BlockId) {
        let mut g = Graph::new(HostTable::new(), MirConfig::default());
        let b = g.new_block();
        g.set_entry(b);
        (g, b)
    }

    #[test]
    fn test_rounded_sum_is_specialized() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Float32));
        let y = g.push(b, NodeSpec::parameter(1, MirType::Float32));
        let add = g.push(b, NodeSpec::add(x, y, MirType::Double));
        let round = g.push(b, NodeSpec::to_float32(add));
        g.push(b, NodeSpec::return_(round));

        let mut pass = Float32Specialization::new();
        assert!(pass.run(&mut g).unwrap());
        assert_eq!(g.ty(add), MirType::Float32);
        assert_eq!(g.operands(add).as_slice(), &[x, y]);
        assert_eq!(pass.stats().specialized, 1);
    }

    #[test]
    fn test_double_consumer_widens_operands() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Float32));
        let y = g.push(b, NodeSpec::parameter(1, MirType::Float32));
        let add = g.push(b, NodeSpec::add(x, y, MirType::Double));
        g.push(b, NodeSpec::return_(add));

        Float32Specialization::new().run(&mut g).unwrap();
        assert_eq!(g.ty(add), MirType::Double);
        for i in 0..2 {
            let op = g.operand(add, i);
            assert_eq!(g.opcode(op), Opcode::ToDouble);
            assert_eq!(g.def(op).block(), Some(b));
        }
    }

    #[test]
    fn test_representable_constant_is_narrowed() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Float32));
        let half = g.push(b, NodeSpec::constant(Constant::Double(0.5)));
        let mul = g.push(b, NodeSpec::mul(x, half, MirType::Double));
        let round = g.push(b, NodeSpec::to_float32(mul));
        g.push(b, NodeSpec::return_(round));

        Float32Specialization::new().run(&mut g).unwrap();
        assert_eq!(g.ty(mul), MirType::Float32);
        let narrowed = g.operand(mul, 1);
        assert_eq!(g.opcode(narrowed), Opcode::ToFloat32);
        assert_eq!(g.operand(narrowed, 0), half);

        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Float32));
        let tenth = g.push(b, NodeSpec::constant(Constant::Double(0.1)));
        let mul = g.push(b, NodeSpec::mul(x, tenth, MirType::Double));
        let round = g.push(b, NodeSpec::to_float32(mul));
        g.push(b, NodeSpec::return_(round));
        Float32Specialization::new().run(&mut g).unwrap();
        assert_eq!(g.ty(mul), MirType::Double);
    }

    #[test]
    fn test_compare_specialization() {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Float32));
        let y = g.push(b, NodeSpec::parameter(1, MirType::Float32));
        let cmp = g.push(b, NodeSpec::compare(x, y, CompareOp::Lt, CompareType::Double));
        assert!(try_specialize_float32(&mut g, cmp).unwrap());
        assert!(matches!(
            g.op(cmp),
            Op::Compare {
                compare_type: CompareType::Float32,
                ..
            }
        ));
    }

    #[test]
    fn test_phi_of_float32_inputs() {
        let mut g = Graph::new(HostTable::new(), MirConfig::default());
        let entry = g.new_block();
        let t = g.new_block();
        let f = g.new_block();
        let join = g.new_block();
        g.set_entry(entry);
        let c = g.push(entry, NodeSpec::parameter(0, MirType::Boolean));
        let x = g.push(entry, NodeSpec::parameter(1, MirType::Float32));
        let y = g.push(entry, NodeSpec::parameter(2, MirType::Float32));
        g.push(entry, NodeSpec::test(c, t, f));
        for arm in [t, f] {
            g.add_predecessor(arm, entry);
            g.push(arm, NodeSpec::goto(join));
            g.add_predecessor(join, arm);
        }
        let phi = g.add_node(NodeSpec::phi(MirType::Double));
        g.add_phi(join, phi);
        g.add_operand(phi, x);
        g.add_operand(phi, y);
        let round = g.push(join, NodeSpec::to_float32(phi));
        g.push(join, NodeSpec::return_(round));

        let mut pass = Float32Specialization::new();
        pass.run(&mut g).unwrap();
        assert_eq!(g.ty(phi), MirType::Float32);
        assert_eq!(pass.stats().phis, 1);
        assert_eq!(g.operands(phi).as_slice(), &[x, y]);
        // The rounded result is widened again for the return.
        assert_eq!(g.opcode(g.operand(g.control_instruction(join).unwrap(), 0)), Opcode::ToDouble);
    }

    #[test]
    fn test_disabled_by_config() {
        let mut g = Graph::new(HostTable::new(), MirConfig::minimal());
        let b = g.new_block();
        g.set_entry(b);
        let x = g.push(b, NodeSpec::parameter(0, MirType::Float32));
        let add = g.push(b, NodeSpec::add(x, x, MirType::Double));
        let round = g.push(b, NodeSpec::to_float32(add));
        g.push(b, NodeSpec::return_(round));
        assert!(!Float32Specialization::new().run(&mut g).unwrap());
        assert_eq!(g.ty(add), MirType::Double);
    }
}
