//! Snapshot encoding.

use rustc_hash::FxHashMap;
use tracing::debug;

use super::buffer::CompactBufferWriter;
use super::{FORMAT_VERSION, RECOVER_OPCODES, VALUE_CONSTANT, VALUE_INSTRUCTION, VALUE_LIVE};
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::{Op, Opcode};
use crate::ir::resume::ResumePointId;
use crate::ir::types::MirType;

/// Whether `def` may be left out of the compiled code and re-executed from
/// its operands on bailout.
///
/// Guards never qualify: they must run to check their assumption. Nor does
/// anything with a side effect, since skipping it would drop the effect.
/// Stores are replayed through the store-recovery list instead.
pub fn can_recover_on_bailout(g: &Graph, def: DefId) -> bool {
    if g.config().disable_recover_ins || g.is_effectful(def) {
        return false;
    }
    let d = g.def(def);
    if d.is_guard() || matches!(d.ty(), MirType::Int64 | MirType::IntPtr) {
        return false;
    }
    let opcode = d.op().opcode();
    if !RECOVER_OPCODES.contains(&opcode) {
        return false;
    }
    match d.op() {
        Op::StoreFixedSlot { .. } | Op::StoreDynamicSlot { .. } | Op::StoreElement { .. } => false,
        Op::Div(data) => !data.unsigned && !data.trap_on_error && is_arith_type(d.ty()),
        Op::Mod(data) => !data.unsigned && !data.trap_on_error && is_arith_type(d.ty()),
        Op::Add(_) | Op::Sub(_) | Op::Mul(_) => is_arith_type(d.ty()),
        _ if opcode.is_binary_bitwise() => d.ty() == MirType::Int32,
        _ => true,
    }
}

#[inline]
fn is_arith_type(ty: MirType) -> bool {
    matches!(ty, MirType::Int32 | MirType::Double | MirType::Float32)
}

/// Encodes one resume point, its inline callers, the recover instructions
/// their slots need and their store-recovery lists.
pub struct RecoverWriter<'g> {
    graph: &'g Graph,
    buf: CompactBufferWriter,
    order: Vec<DefId>,
    numbering: FxHashMap<DefId, u32>,
}

impl<'g> RecoverWriter<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            buf: CompactBufferWriter::new(),
            order: Vec::new(),
            numbering: FxHashMap::default(),
        }
    }

    /// Encode the snapshot at `rp`.
    pub fn write_snapshot(mut self, rp: ResumePointId) -> Vec<u8> {
        let g = self.graph;
        let frames = g.frames(rp);
        for &frame in &frames {
            for def in g.resume_point_operands(frame) {
                self.collect(def, false);
            }
            for store in g.stores_of(frame) {
                self.collect(store, true);
            }
        }

        self.buf.write_byte(FORMAT_VERSION);
        self.buf.write_unsigned(self.order.len() as u64);
        for def in std::mem::take(&mut self.order) {
            self.write_instruction(def);
        }

        self.buf.write_unsigned(frames.len() as u64);
        for &frame in &frames {
            let point = g.resume_point(frame);
            self.buf.write_unsigned(point.pc() as u64);
            self.buf.write_byte(point.mode() as u8);
            let slots = g.resume_point_operands(frame);
            self.buf.write_unsigned(slots.len() as u64);
            for def in slots {
                self.write_value(def);
            }
            let stores = g.stores_of(frame);
            self.buf.write_unsigned(stores.len() as u64);
            for def in stores {
                self.write_value(def);
            }
        }

        debug!(
            "recover snapshot {:?}: {} frames, {} instructions, {} bytes",
            rp,
            frames.len(),
            self.numbering.len(),
            self.buf.len()
        );
        self.buf.into_bytes()
    }

    fn is_recovered(&self, def: DefId) -> bool {
        let d = self.graph.def(def);
        d.is_recovered_on_bailout() && !d.is_constant()
    }

    /// Number `root` and the recovered definitions it reads, operands first.
    fn collect(&mut self, root: DefId, force: bool) {
        if self.numbering.contains_key(&root) || !(force || self.is_recovered(root)) {
            return;
        }
        let mut stack = vec![(root, false)];
        while let Some((def, expanded)) = stack.pop() {
            if self.numbering.contains_key(&def) {
                continue;
            }
            if expanded {
                self.numbering.insert(def, self.order.len() as u32);
                self.order.push(def);
                continue;
            }
            stack.push((def, true));
            for op in self.graph.operands(def).into_iter().rev() {
                if self.is_recovered(op) && !self.numbering.contains_key(&op) {
                    stack.push((op, false));
                }
            }
        }
    }

    fn write_value(&mut self, def: DefId) {
        if let Some(c) = self.graph.as_constant(def) {
            self.buf.write_byte(VALUE_CONSTANT);
            self.buf.write_byte(c.ty().tag());
            self.buf.write_unsigned(c.payload_bits());
        } else if let Some(&index) = self.numbering.get(&def) {
            self.buf.write_byte(VALUE_INSTRUCTION);
            self.buf.write_unsigned(index as u64);
        } else {
            self.buf.write_byte(VALUE_LIVE);
            self.buf.write_unsigned(def.index() as u64);
        }
    }

    fn write_instruction(&mut self, def: DefId) {
        let g = self.graph;
        let d = g.def(def);
        debug_assert!(RECOVER_OPCODES.contains(&d.op().opcode()));
        self.buf.write_unsigned(d.op().opcode().tag() as u64);
        self.buf.write_byte(d.ty().tag());
        self.write_fields(d.op());
        let operands = g.operands(def);
        self.buf.write_unsigned(operands.len() as u64);
        for op in operands {
            self.write_value(op);
        }
    }

    /// Opcode-specific fields, in declaration order.
    fn write_fields(&mut self, op: &Op) {
        let b = &mut self.buf;
        match *op {
            Op::Add(data) | Op::Sub(data) => b.write_bool(data.must_preserve_nan),
            Op::Mul(data) => {
                b.write_bool(data.must_preserve_nan);
                b.write_bool(data.can_be_negative_zero);
            }
            Op::Div(data) => {
                b.write_bool(data.must_preserve_nan);
                b.write_bool(data.unsigned);
                b.write_bool(data.trap_on_error);
                b.write_bool(data.can_be_negative_zero);
                b.write_bool(data.can_be_negative_overflow);
                b.write_bool(data.can_be_divide_by_zero);
            }
            Op::Mod(data) => {
                b.write_bool(data.must_preserve_nan);
                b.write_bool(data.unsigned);
                b.write_bool(data.trap_on_error);
                b.write_bool(data.can_be_negative_dividend);
                b.write_bool(data.can_be_divide_by_zero);
                b.write_bool(data.can_be_power_of_two_divisor);
            }
            Op::Abs { fallible } => b.write_bool(fallible),
            Op::MinMax { is_max } => b.write_bool(is_max),
            Op::MathFunction { func } => b.write_byte(func as u8),
            Op::NaNToZero {
                operand_is_never_nan,
                operand_is_never_negative_zero,
            } => {
                b.write_bool(operand_is_never_nan);
                b.write_bool(operand_is_never_negative_zero);
            }
            Op::Clz {
                operand_is_never_zero,
            }
            | Op::Ctz {
                operand_is_never_zero,
            } => b.write_bool(operand_is_never_zero),
            Op::Ursh { bailouts_disabled } => b.write_bool(bailouts_disabled),
            Op::SignExtendInt32 { mode } => b.write_byte(mode as u8),
            Op::ToFloat32 { must_preserve_nan } => b.write_bool(must_preserve_nan),
            Op::Compare {
                op,
                compare_type,
                truncate_operands,
            } => {
                b.write_byte(op as u8);
                b.write_byte(compare_type as u8);
                b.write_bool(truncate_operands);
            }
            Op::NewObject { shape } => b.write_unsigned(shape.raw() as u64),
            Op::NewArray { length } => b.write_unsigned(length as u64),
            Op::StoreFixedSlot { slot, needs_barrier }
            | Op::StoreDynamicSlot { slot, needs_barrier } => {
                b.write_unsigned(slot as u64);
                b.write_bool(needs_barrier);
            }
            Op::StoreElement { needs_hole_check } => b.write_bool(needs_hole_check),
            _ => {}
        }
    }
}

/// Whether `opcode` has a wire encoding.
#[inline]
pub(crate) fn is_recover_opcode(opcode: Opcode) -> bool {
    RECOVER_OPCODES.contains(&opcode)
}
