//! Truncation analysis.
//!
//! Walks the graph backwards and asks, for each numeric definition, how
//! strongly its consumers truncate it (see [`TruncateKind`]). Definitions
//! whose every observable consumer truncates are committed to int32 with
//! [`truncate`]; their inputs and outputs are then adjusted so the graph
//! stays well typed.
//!
//! # Resume points
//!
//! A resume point that captures a value sees it before truncation. When the
//! truncated value would differ, the definition is either capped at
//! `TruncateAfterBailouts` or cloned: the original stays for the snapshots
//! and is marked recovered on bailout, and the clone is truncated for the
//! live uses.

use tracing::{debug, trace};

use crate::error::MirResult;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::{BailoutKind, Consumer, DefFlags, DefId, TruncateKind};
use crate::ir::opcode::{CompareType, IntConversionInput, Op, Opcode};
use crate::ir::types::MirType;
use crate::opt::numeric::to_int32;
use crate::opt::range::{analyze_ranges, range_of, Range};
use crate::opt::OptimizationPass;
use crate::recover::can_recover_on_bailout;

// =============================================================================
// Per-opcode queries
// =============================================================================

/// The truncation `consumer` applies to its operand at `_index`. Every
/// operand of an opcode is currently treated alike.
pub fn operand_truncate_kind(g: &Graph, consumer: DefId, _index: usize) -> TruncateKind {
    let d = g.def(consumer);
    let own = d.truncate_kind();
    match d.op() {
        Op::BitAnd
        | Op::BitOr
        | Op::BitXor
        | Op::BitNot
        | Op::Lsh
        | Op::Rsh
        | Op::Ursh { .. }
        | Op::TruncateToInt32 => TruncateKind::Truncate,
        Op::Phi(_) | Op::ToDouble => own,
        Op::Add(_) | Op::Sub(_) | Op::Mul(_) => own.min(TruncateKind::IndirectTruncate),
        Op::Div(_) | Op::Mod(_) => own.min(TruncateKind::TruncateAfterBailouts),
        Op::LimitedTruncate { limit } => own.min(*limit),
        Op::Compare {
            truncate_operands: true,
            ..
        } => TruncateKind::TruncateAfterBailouts,
        _ => TruncateKind::NoTruncate,
    }
}

/// Whether `def` can be committed to int32 at all.
pub fn can_truncate(g: &Graph, def: DefId) -> bool {
    let d = g.def(def);
    let int_or_double = matches!(d.ty(), MirType::Int32 | MirType::Double);
    match d.op() {
        Op::Div(data) => !data.unsigned && !data.trap_on_error && int_or_double,
        Op::Mod(data) => !data.unsigned && !data.trap_on_error && int_or_double,
        Op::Add(_) | Op::Sub(_) | Op::Mul(_) | Op::Phi(_) => int_or_double,
        Op::ToDouble => d.ty() == MirType::Double,
        Op::LimitedTruncate { .. } => true,
        Op::Compare { compare_type, .. } => {
            *compare_type == CompareType::Double
                && g.operands(def)
                    .iter()
                    .all(|&op| range_of(g, op).is_some_and(|r| r.is_int32()))
        }
        Op::Constant(c) => matches!(c, Constant::Double(_) | Constant::Float32(_)),
        _ => false,
    }
}

#[inline]
fn can_have_rounding_errors(r: &Range) -> bool {
    r.can_have_fractional_part() || r.can_be_negative_zero() || r.can_be_nan() || r.can_be_infinite()
}

/// The truncation every observable consumer of `def` accepts, and whether
/// `def` must be cloned so that resume points keep the exact value.
pub fn compute_truncate_kind(g: &Graph, def: DefId) -> (TruncateKind, bool) {
    let d = g.def(def);
    // A compare coerces its inputs once their ranges are known; it does not
    // depend on its consumers.
    if d.op().opcode() == Opcode::Compare {
        return (TruncateKind::TruncateAfterBailouts, false);
    }

    let mut rounding = range_of(g, def).map_or(true, |r| can_have_rounding_errors(&r));
    // Integer division cannot round; infinities and NaN fail its checks.
    if matches!(d.op(), Op::Div(_) | Op::Mod(_)) && d.ty() == MirType::Int32 {
        rounding = false;
    }
    if rounding {
        return (TruncateKind::NoTruncate, false);
    }
    requested_truncate_kind(g, def)
}

fn requested_truncate_kind(g: &Graph, def: DefId) -> (TruncateKind, bool) {
    let d = g.def(def);
    let mut kind = TruncateKind::Truncate;
    let mut captured = false;
    let mut observable = false;
    let mut recoverable = true;
    let mut use_removed = d.is_implicitly_used();

    for use_id in g.uses(def) {
        let edge = g.use_edge(use_id);
        match edge.consumer() {
            Consumer::ResumePoint(rp) => {
                captured = true;
                observable |= g.is_observable_operand(rp, edge.index());
                recoverable &= g.is_recoverable_operand(rp, edge.index());
            }
            Consumer::Store(_) => {
                captured = true;
                recoverable = false;
            }
            Consumer::Definition(consumer) => {
                let c = g.def(consumer);
                if c.is_recovered_on_bailout() {
                    captured = true;
                    use_removed |= c.is_implicitly_used();
                    continue;
                }
                kind = kind.min(operand_truncate_kind(g, consumer, edge.index()));
                if kind == TruncateKind::NoTruncate {
                    break;
                }
            }
        }
    }

    if d.is_guard() || d.is_guard_range_bailouts() {
        kind = kind.min(TruncateKind::TruncateAfterBailouts);
    }

    let needs_conversion = range_of(g, def).map_or(true, |r| !r.is_int32());
    // Resuming with a wrapped value is harmless when the next bytecode
    // truncates it too, unless another frame or a removed use can see it.
    let safe_to_convert = kind == TruncateKind::Truncate && !observable && !use_removed;

    let mut should_clone = false;
    if captured && needs_conversion && !safe_to_convert {
        if recoverable && can_recover_on_bailout(g, def) {
            should_clone = true;
        } else {
            kind = kind.min(TruncateKind::TruncateAfterBailouts);
        }
    }
    (kind, should_clone)
}

/// Raise the truncate kind of `def` to at least `kind`. Never lowers it.
/// Returns the kind now recorded.
pub fn merge_truncate_kind(g: &mut Graph, def: DefId, kind: TruncateKind) -> TruncateKind {
    let d = g.def_mut(def);
    let merged = d.truncate_kind().max(kind);
    d.set_truncate_kind(merged);
    merged
}

/// Commit `def` to int32 under `kind`.
///
/// Retypes the definition, wraps its range and drops the checks the
/// truncation makes unobservable. A compare keeps its boolean result and
/// switches to an int32 comparison instead.
pub fn truncate(g: &mut Graph, def: DefId, kind: TruncateKind) {
    debug_assert!(can_truncate(g, def), "{:?} cannot be truncated", def);
    let kind = merge_truncate_kind(g, def, kind);
    let indirect = kind >= TruncateKind::IndirectTruncate;

    let d = g.def_mut(def);
    match d.op_mut() {
        Op::Compare {
            compare_type,
            truncate_operands,
            ..
        } => {
            *compare_type = CompareType::Int32;
            *truncate_operands = true;
            return;
        }
        Op::Constant(c) => {
            if let Some(v) = c.number_to_double() {
                let value = to_int32(v);
                *c = Constant::Int32(value);
                d.set_range(Some(Range::int32(value, value)));
                d.set_result_type(MirType::Int32);
            }
            return;
        }
        Op::Mul(data) => data.can_be_negative_zero = false,
        Op::Div(data) => {
            data.can_be_negative_zero = false;
            if indirect {
                data.can_be_negative_overflow = false;
                data.can_be_divide_by_zero = false;
            }
        }
        Op::Mod(data) => {
            if indirect {
                data.can_be_divide_by_zero = false;
            }
        }
        _ => {}
    }
    d.set_result_type(MirType::Int32);
    let range = d.range().copied();
    d.set_range(range.map(|r| {
        if indirect {
            r.wrap_around_to_int32()
        } else {
            r.clamp_to_int32()
        }
    }));
}

/// Whether `def` may still bail out given its truncation and range.
pub fn is_fallible(g: &Graph, def: DefId) -> bool {
    let d = g.def(def);
    let int32_bounds = d.range().is_some_and(|r| r.has_int32_bounds());
    match d.op() {
        Op::Add(_) | Op::Sub(_) => {
            d.truncate_kind() < TruncateKind::IndirectTruncate && !int32_bounds
        }
        Op::Mul(data) => {
            !d.is_truncated() && (!int32_bounds || data.can_be_negative_zero)
        }
        Op::Div(_) => !d.is_truncated(),
        Op::Mod(data) => {
            !d.is_truncated()
                && (data.unsigned || data.can_be_divide_by_zero || data.can_be_negative_dividend)
        }
        Op::Abs { fallible } => *fallible && !d.is_truncated() && !int32_bounds,
        _ => d.is_guard(),
    }
}

// =============================================================================
// Truncation Pass
// =============================================================================

/// Statistics from one truncation run.
#[derive(Debug, Clone, Default)]
pub struct TruncationStats {
    /// Definitions committed to int32.
    pub truncated: usize,
    /// Definitions cloned so that resume points keep the exact value.
    pub cloned: usize,
    /// Conversions inserted in front of truncated definitions.
    pub conversions_inserted: usize,
    /// Conversions made redundant by a truncated input.
    pub conversions_removed: usize,
}

/// Truncation pass. Recomputes ranges before it runs.
#[derive(Debug, Default)]
pub struct Truncation {
    stats: TruncationStats,
}

impl Truncation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &TruncationStats {
        &self.stats
    }

    fn visit(&mut self, g: &mut Graph, def: DefId, worklist: &mut Vec<DefId>) -> MirResult<()> {
        let d = g.def(def);
        if d.is_recovered_on_bailout() || d.is_discarded() || d.ty() == MirType::None {
            return Ok(());
        }
        if !can_truncate(g, def) {
            return Ok(());
        }
        let (kind, should_clone) = compute_truncate_kind(g, def);
        if kind == TruncateKind::NoTruncate {
            return Ok(());
        }

        let target = if should_clone {
            self.clone_for_recover(g, def)?
        } else {
            def
        };
        trace!("truncate {:?} ({:?})", target, kind);
        truncate(g, target, kind);
        self.stats.truncated += 1;

        // Inputs and outputs are fixed up once every kind is known, so that
        // conversions for nodes truncated later are never created.
        g.def_mut(target).set_flag(DefFlags::IN_WORKLIST);
        worklist.push(target);
        Ok(())
    }

    /// Leave `def` to the resume points and hand its live uses to a copy.
    fn clone_for_recover(&mut self, g: &mut Graph, def: DefId) -> MirResult<DefId> {
        let d = g.def(def);
        let spec = NodeSpec::new(d.op().clone(), d.ty(), &g.operands(def))
            .with_flags(d.flags() & (DefFlags::MOVABLE | DefFlags::GUARD_RANGE_BAILOUTS))
            .with_bailout_kind(d.bailout_kind());
        let range = d.range().copied();
        let dependency = d.dependency();

        let clone = g.try_add_node(spec)?;
        g.def_mut(clone).set_range(range);
        g.def_mut(clone).set_dependency(dependency);
        g.insert_after(def, clone);
        g.replace_all_live_uses_with(def, clone);
        g.def_mut(def).set_flag(DefFlags::RECOVERED_ON_BAILOUT);
        self.stats.cloned += 1;
        Ok(clone)
    }

    /// Conversions consuming a truncated result are now identities.
    fn remove_truncates_on_output(&mut self, g: &mut Graph, def: DefId) {
        if g.opcode(def) == Opcode::Compare {
            return;
        }
        for use_id in g.uses_vec(def) {
            let Some(consumer) = g.use_edge(use_id).consumer().as_definition() else {
                continue;
            };
            let c = g.def(consumer);
            if c.is_recovered_on_bailout() || c.is_discarded() {
                continue;
            }
            if matches!(c.op(), Op::TruncateToInt32 | Op::ToNumberInt32 { .. }) {
                g.replace_all_uses_with(consumer, def);
                self.stats.conversions_removed += 1;
            }
        }
    }

    /// Give every truncated operand of `def` an int32 input.
    fn adjust_truncated_inputs(&mut self, g: &mut Graph, def: DefId) -> MirResult<()> {
        let Some(block) = g.def(def).block() else {
            return Ok(());
        };
        let is_phi = g.def(def).is_phi();
        for i in 0..g.num_operands(def) {
            let kind = operand_truncate_kind(g, def, i);
            if kind == TruncateKind::NoTruncate {
                continue;
            }
            let input = g.operand(def, i);
            if g.ty(input) == MirType::Int32 {
                continue;
            }
            if g.opcode(input) == Opcode::ToDouble && g.ty(g.operand(input, 0)) == MirType::Int32 {
                let inner = g.operand(input, 0);
                g.replace_operand(def, i, inner);
                continue;
            }

            let spec = if kind == TruncateKind::TruncateAfterBailouts {
                NodeSpec::to_number_int32(input, IntConversionInput::NumbersOnly)
                    .with_bailout_kind(BailoutKind::PrecisionLoss)
            } else {
                NodeSpec::truncate_to_int32(input)
            };
            let conversion = g.try_add_node(spec)?;
            if is_phi {
                let pred = g.block(block).predecessors()[i];
                match g.control_instruction(pred) {
                    Some(last) => g.insert_before(last, conversion),
                    None => g.append(pred, conversion),
                }
            } else {
                g.insert_before(def, conversion);
            }
            g.replace_operand(def, i, conversion);
            self.stats.conversions_inserted += 1;
        }

        if g.opcode(def) == Opcode::ToDouble {
            let input = g.operand(def, 0);
            g.replace_all_uses_with(def, input);
            g.discard(def);
        }
        Ok(())
    }
}

impl OptimizationPass for Truncation {
    fn name(&self) -> &'static str {
        "truncation"
    }

    fn run(&mut self, graph: &mut Graph) -> MirResult<bool> {
        self.stats = TruncationStats::default();
        if !graph.config().truncation {
            return Ok(false);
        }
        graph.build_dominator_tree();
        analyze_ranges(graph);

        let mut worklist = Vec::new();
        let postorder: Vec<_> = graph.rpo().iter().rev().copied().collect();
        for block in postorder {
            let instructions: Vec<DefId> =
                graph.block(block).instructions().iter().rev().copied().collect();
            for def in instructions {
                self.visit(graph, def, &mut worklist)?;
            }
            let phis: Vec<DefId> = graph.block(block).phis().iter().rev().copied().collect();
            for phi in phis {
                self.visit(graph, phi, &mut worklist)?;
            }
        }

        while let Some(def) = worklist.pop() {
            graph.def_mut(def).clear_flag(DefFlags::IN_WORKLIST);
            self.remove_truncates_on_output(graph, def);
            self.adjust_truncated_inputs(graph, def)?;
        }

        debug!(
            "truncation: {} truncated, {} cloned, {} conversions inserted, {} removed",
            self.stats.truncated,
            self.stats.cloned,
            self.stats.conversions_inserted,
            self.stats.conversions_removed
        );
        Ok(self.stats.truncated > 0)
    }
}
