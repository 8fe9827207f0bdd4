//! Snapshot decoding.

use super::buffer::CompactBufferReader;
use super::{
    RecoverError, RecoverFrame, RecoverInstruction, RecoverSnapshot, RecoverValue, FORMAT_VERSION,
    RECOVER_OPCODES, VALUE_CONSTANT, VALUE_INSTRUCTION, VALUE_LIVE,
};
use crate::ir::constant::Constant;
use crate::ir::host::ShapeHandle;
use crate::ir::opcode::{
    ArithData, CompareOp, CompareType, DivData, MathFunc, ModData, MulData, Op, Opcode,
    SignExtendMode,
};
use crate::ir::resume::ResumeMode;
use crate::ir::types::MirType;

/// Decodes a stream produced by [`super::RecoverWriter`].
pub struct RecoverReader<'a> {
    buf: CompactBufferReader<'a>,
    /// Recover instructions decoded so far.
    defined: u32,
}

impl<'a> RecoverReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            buf: CompactBufferReader::new(bytes),
            defined: 0,
        }
    }

    pub fn read_snapshot(mut self) -> Result<RecoverSnapshot, RecoverError> {
        let version = self.buf.read_byte()?;
        if version != FORMAT_VERSION {
            return Err(RecoverError::Version { found: version });
        }

        let mut snapshot = RecoverSnapshot::default();
        let count = self.buf.read_u32()?;
        for _ in 0..count {
            let ins = self.read_instruction()?;
            snapshot.instructions.push(ins);
            self.defined += 1;
        }

        let frames = self.buf.read_u32()?;
        for _ in 0..frames {
            snapshot.frames.push(self.read_frame()?);
        }

        if self.buf.more() {
            return Err(RecoverError::TrailingBytes {
                remaining: self.buf.remaining(),
            });
        }
        Ok(snapshot)
    }

    fn read_frame(&mut self) -> Result<RecoverFrame, RecoverError> {
        let pc = self.buf.read_u32()?;
        let offset = self.buf.position();
        let raw = self.buf.read_byte()?;
        let mode = ResumeMode::from_raw(raw).ok_or(RecoverError::BadTag {
            what: "resume mode",
            value: raw as u64,
            offset,
        })?;
        let slots = self.read_values()?;
        let stores = self.read_values()?;
        Ok(RecoverFrame {
            pc,
            mode,
            slots,
            stores,
        })
    }

    fn read_values(&mut self) -> Result<Vec<RecoverValue>, RecoverError> {
        let n = self.buf.read_u32()?;
        (0..n).map(|_| self.read_value()).collect()
    }

    fn read_value(&mut self) -> Result<RecoverValue, RecoverError> {
        let offset = self.buf.position();
        match self.buf.read_byte()? {
            VALUE_CONSTANT => {
                let ty = self.read_type()?;
                let bits = self.buf.read_unsigned()?;
                Constant::from_parts(ty, bits)
                    .map(RecoverValue::Constant)
                    .ok_or(RecoverError::BadTag {
                        what: "constant type",
                        value: ty.tag() as u64,
                        offset,
                    })
            }
            VALUE_INSTRUCTION => {
                let index = self.buf.read_u32()?;
                if index >= self.defined {
                    return Err(RecoverError::ForwardReference {
                        index,
                        defined: self.defined,
                    });
                }
                Ok(RecoverValue::Instruction(index))
            }
            VALUE_LIVE => Ok(RecoverValue::Live(self.buf.read_u32()?)),
            tag => Err(RecoverError::BadTag {
                what: "value tag",
                value: tag as u64,
                offset,
            }),
        }
    }

    fn read_type(&mut self) -> Result<MirType, RecoverError> {
        let offset = self.buf.position();
        let tag = self.buf.read_byte()?;
        MirType::from_tag(tag).ok_or(RecoverError::BadTag {
            what: "type",
            value: tag as u64,
            offset,
        })
    }

    fn read_instruction(&mut self) -> Result<RecoverInstruction, RecoverError> {
        let offset = self.buf.position();
        let tag = self.buf.read_unsigned()?;
        let opcode = RECOVER_OPCODES
            .iter()
            .copied()
            .find(|op| op.tag() as u64 == tag)
            .ok_or(RecoverError::BadTag {
                what: "opcode",
                value: tag,
                offset,
            })?;
        let ty = self.read_type()?;
        let op = self.read_op(opcode)?;
        let operands = self.read_values()?;
        Ok(RecoverInstruction { op, ty, operands })
    }

    fn read_enum<T>(
        &mut self,
        what: &'static str,
        from_raw: impl FnOnce(u8) -> Option<T>,
    ) -> Result<T, RecoverError> {
        let offset = self.buf.position();
        let raw = self.buf.read_byte()?;
        from_raw(raw).ok_or(RecoverError::BadTag {
            what,
            value: raw as u64,
            offset,
        })
    }

    fn read_op(&mut self, opcode: Opcode) -> Result<Op, RecoverError> {
        let b = &mut self.buf;
        Ok(match opcode {
            Opcode::Add => Op::Add(ArithData {
                must_preserve_nan: b.read_bool()?,
            }),
            Opcode::Sub => Op::Sub(ArithData {
                must_preserve_nan: b.read_bool()?,
            }),
            Opcode::Mul => Op::Mul(MulData {
                must_preserve_nan: b.read_bool()?,
                can_be_negative_zero: b.read_bool()?,
            }),
            Opcode::Div => Op::Div(DivData {
                must_preserve_nan: b.read_bool()?,
                unsigned: b.read_bool()?,
                trap_on_error: b.read_bool()?,
                can_be_negative_zero: b.read_bool()?,
                can_be_negative_overflow: b.read_bool()?,
                can_be_divide_by_zero: b.read_bool()?,
            }),
            Opcode::Mod => Op::Mod(ModData {
                must_preserve_nan: b.read_bool()?,
                unsigned: b.read_bool()?,
                trap_on_error: b.read_bool()?,
                can_be_negative_dividend: b.read_bool()?,
                can_be_divide_by_zero: b.read_bool()?,
                can_be_power_of_two_divisor: b.read_bool()?,
            }),
            Opcode::Abs => Op::Abs {
                fallible: b.read_bool()?,
            },
            Opcode::MinMax => Op::MinMax {
                is_max: b.read_bool()?,
            },
            Opcode::Pow => Op::Pow,
            Opcode::PowHalf => Op::PowHalf,
            Opcode::Sqrt => Op::Sqrt,
            Opcode::Sign => Op::Sign,
            Opcode::MathFunction => Op::MathFunction {
                func: self.read_enum("math function", MathFunc::from_raw)?,
            },
            Opcode::Hypot => Op::Hypot,
            Opcode::NaNToZero => Op::NaNToZero {
                operand_is_never_nan: b.read_bool()?,
                operand_is_never_negative_zero: b.read_bool()?,
            },
            Opcode::Clz => Op::Clz {
                operand_is_never_zero: b.read_bool()?,
            },
            Opcode::Ctz => Op::Ctz {
                operand_is_never_zero: b.read_bool()?,
            },
            Opcode::Popcnt => Op::Popcnt,
            Opcode::BitAnd => Op::BitAnd,
            Opcode::BitOr => Op::BitOr,
            Opcode::BitXor => Op::BitXor,
            Opcode::BitNot => Op::BitNot,
            Opcode::Lsh => Op::Lsh,
            Opcode::Rsh => Op::Rsh,
            Opcode::Ursh => Op::Ursh {
                bailouts_disabled: b.read_bool()?,
            },
            Opcode::SignExtendInt32 => Op::SignExtendInt32 {
                mode: self.read_enum("sign extend mode", SignExtendMode::from_raw)?,
            },
            Opcode::ToDouble => Op::ToDouble,
            Opcode::ToFloat32 => Op::ToFloat32 {
                must_preserve_nan: b.read_bool()?,
            },
            Opcode::TruncateToInt32 => Op::TruncateToInt32,
            Opcode::BooleanToInt32 => Op::BooleanToInt32,
            Opcode::Compare => {
                let op = self.read_enum("compare op", CompareOp::from_raw)?;
                let compare_type = self.read_enum("compare type", CompareType::from_raw)?;
                Op::Compare {
                    op,
                    compare_type,
                    truncate_operands: self.buf.read_bool()?,
                }
            }
            Opcode::Not => Op::Not,
            Opcode::StringLength => Op::StringLength,
            Opcode::Concat => Op::Concat,
            Opcode::NewObject => Op::NewObject {
                shape: ShapeHandle::from_raw(b.read_u32()?),
            },
            Opcode::NewArray => Op::NewArray {
                length: b.read_u32()?,
            },
            Opcode::ObjectState => Op::ObjectState,
            Opcode::StoreFixedSlot => Op::StoreFixedSlot {
                slot: b.read_u32()?,
                needs_barrier: b.read_bool()?,
            },
            Opcode::StoreDynamicSlot => Op::StoreDynamicSlot {
                slot: b.read_u32()?,
                needs_barrier: b.read_bool()?,
            },
            Opcode::StoreElement => Op::StoreElement {
                needs_hole_check: b.read_bool()?,
            },
            other => {
                return Err(RecoverError::BadTag {
                    what: "opcode",
                    value: other.tag() as u64,
                    offset: self.buf.position(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::builder::NodeSpec;
    use crate::ir::graph::Graph;
    use crate::ir::host::HostTable;
    use crate::ir::node::DefFlags;
    use crate::recover::RecoverWriter;

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    #[test]
    fn test_snapshot_with_recovered_add_and_store() {
        let mut g = graph();
        let b = g.new_block();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let one = g.push(b, NodeSpec::constant(Constant::Int32(1)));
        let sum = g.push(b, NodeSpec::add(x, one, MirType::Int32));
        g.def_mut(sum).set_flag(DefFlags::RECOVERED_ON_BAILOUT);
        let obj = g.push(b, NodeSpec::parameter(1, MirType::Object));
        let store = g.push(b, NodeSpec::store_fixed_slot(obj, sum, 3));
        g.push_slot(b, one);
        g.push_slot(b, x);
        g.push_slot(b, sum);
        let rp = g.capture_resume_point(b, 17, ResumeMode::ResumeAfter).unwrap();
        g.add_store(rp, store, None).unwrap();

        let bytes = RecoverWriter::new(&g).write_snapshot(rp);
        let snap = RecoverReader::new(&bytes).read_snapshot().unwrap();

        assert_eq!(snap.instructions.len(), 2);
        let add = &snap.instructions[0];
        assert_eq!(add.op, Op::Add(ArithData::default()));
        assert_eq!(add.ty, MirType::Int32);
        assert_eq!(
            add.operands,
            vec![
                RecoverValue::Live(x.index()),
                RecoverValue::Constant(Constant::Int32(1)),
            ]
        );
        let st = &snap.instructions[1];
        assert_eq!(
            st.op,
            Op::StoreFixedSlot {
                slot: 3,
                needs_barrier: true
            }
        );
        assert_eq!(st.operands[1], RecoverValue::Instruction(0));

        assert_eq!(snap.frames.len(), 1);
        let frame = &snap.frames[0];
        assert_eq!(frame.pc, 17);
        assert_eq!(frame.mode, ResumeMode::ResumeAfter);
        assert_eq!(
            frame.slots,
            vec![
                RecoverValue::Constant(Constant::Int32(1)),
                RecoverValue::Live(x.index()),
                RecoverValue::Instruction(0),
            ]
        );
        assert_eq!(frame.stores, vec![RecoverValue::Instruction(1)]);
    }

    #[test]
    fn test_inline_frames_outermost_first() {
        let mut g = graph();
        let outer = g.new_block();
        let inner = g.new_block();
        let x = g.push(outer, NodeSpec::parameter(0, MirType::Int32));
        g.push_slot(outer, x);
        let caller = g
            .capture_resume_point(outer, 4, ResumeMode::InlinedStandardCall)
            .unwrap();
        let callee = g.capture_resume_point(inner, 0, ResumeMode::ResumeAt).unwrap();
        g.set_caller(callee, Some(caller));

        let bytes = RecoverWriter::new(&g).write_snapshot(callee);
        let snap = RecoverReader::new(&bytes).read_snapshot().unwrap();
        assert!(snap.instructions.is_empty());
        let pcs: Vec<_> = snap.frames.iter().map(|f| (f.pc, f.mode)).collect();
        assert_eq!(
            pcs,
            vec![(4, ResumeMode::InlinedStandardCall), (0, ResumeMode::ResumeAt)]
        );
        assert_eq!(snap.frames[0].slots, vec![RecoverValue::Live(x.index())]);
        assert!(snap.frames[1].slots.is_empty());
    }

    #[test]
    fn test_malformed_streams() {
        assert_eq!(
            RecoverReader::new(&[9]).read_snapshot(),
            Err(RecoverError::Version { found: 9 })
        );
        assert_eq!(
            RecoverReader::new(&[FORMAT_VERSION, 1]).read_snapshot(),
            Err(RecoverError::UnexpectedEnd { offset: 2 })
        );

        // One Not instruction that reads instruction 0, itself.
        let tag = Opcode::Not.tag() as u8;
        let bytes = [
            FORMAT_VERSION,
            1,
            tag,
            MirType::Boolean.tag(),
            1,
            VALUE_INSTRUCTION,
            0,
        ];
        assert_eq!(
            RecoverReader::new(&bytes).read_snapshot(),
            Err(RecoverError::ForwardReference {
                index: 0,
                defined: 0
            })
        );

        let bytes = [FORMAT_VERSION, 0, 0, 0xaa];
        assert_eq!(
            RecoverReader::new(&bytes).read_snapshot(),
            Err(RecoverError::TrailingBytes { remaining: 1 })
        );

        let call = Opcode::Call.tag();
        let bytes = [FORMAT_VERSION, 1, call as u8];
        assert!(matches!(
            RecoverReader::new(&bytes).read_snapshot(),
            Err(RecoverError::BadTag { what: "opcode", .. })
        ));
    }
}
