//! Recover stream: the bailout contract between compile time and the
//! deoptimization decoder.
//!
//! A snapshot is encoded for one resume point and describes every frame of
//! its inline chain, outermost first. Values are either constants, live
//! definitions the compiled code keeps (named by definition index), or
//! recover instructions re-executed from their own operands on bailout.
//!
//! # Layout
//!
//! ```text
//! u8      FORMAT_VERSION
//! varint  instruction count
//!         per instruction: opcode tag, result type, opcode fields,
//!                          operand count, operands
//! varint  frame count
//!         per frame: pc, mode, slot count, slots, store count, stores
//! ```
//!
//! Instructions precede their users. Stores are listed oldest first, in
//! replay order.

mod buffer;
mod reader;
mod writer;

use thiserror::Error;

use crate::ir::constant::Constant;
use crate::ir::opcode::{Op, Opcode};
use crate::ir::resume::ResumeMode;
use crate::ir::types::MirType;

pub use buffer::{CompactBufferReader, CompactBufferWriter};
pub use reader::RecoverReader;
pub use writer::{can_recover_on_bailout, RecoverWriter};

/// Version byte at the start of every stream.
pub const FORMAT_VERSION: u8 = 1;

/// Tags of a value entry.
const VALUE_CONSTANT: u8 = 0;
const VALUE_INSTRUCTION: u8 = 1;
const VALUE_LIVE: u8 = 2;

/// Opcodes that may appear as recover instructions. Their tags are the wire
/// values.
pub(crate) const RECOVER_OPCODES: &[Opcode] = &[
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::Abs,
    Opcode::MinMax,
    Opcode::Pow,
    Opcode::PowHalf,
    Opcode::Sqrt,
    Opcode::Sign,
    Opcode::MathFunction,
    Opcode::Hypot,
    Opcode::NaNToZero,
    Opcode::Clz,
    Opcode::Ctz,
    Opcode::Popcnt,
    Opcode::BitAnd,
    Opcode::BitOr,
    Opcode::BitXor,
    Opcode::BitNot,
    Opcode::Lsh,
    Opcode::Rsh,
    Opcode::Ursh,
    Opcode::SignExtendInt32,
    Opcode::ToDouble,
    Opcode::ToFloat32,
    Opcode::TruncateToInt32,
    Opcode::BooleanToInt32,
    Opcode::Compare,
    Opcode::Not,
    Opcode::StringLength,
    Opcode::Concat,
    Opcode::NewObject,
    Opcode::NewArray,
    Opcode::ObjectState,
    Opcode::StoreFixedSlot,
    Opcode::StoreDynamicSlot,
    Opcode::StoreElement,
];

/// Errors decoding a recover stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoverError {
    #[error("recover stream ends early at byte {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("varint at byte {offset} does not fit in 64 bits")]
    VarintOverflow { offset: usize },

    #[error("unsupported recover stream version {found}")]
    Version { found: u8 },

    #[error("invalid {what} {value} at byte {offset}")]
    BadTag {
        what: &'static str,
        value: u64,
        offset: usize,
    },

    #[error("recover instruction {index} referenced before it is defined ({defined} so far)")]
    ForwardReference { index: u32, defined: u32 },

    #[error("{remaining} trailing bytes after the last frame")]
    TrailingBytes { remaining: usize },
}

/// One value of a decoded snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoverValue {
    Constant(Constant),
    /// Result of the recover instruction with this index.
    Instruction(u32),
    /// A definition the compiled code keeps alive, by definition index.
    Live(u32),
}

/// A decoded recover instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverInstruction {
    pub op: Op,
    pub ty: MirType,
    pub operands: Vec<RecoverValue>,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverFrame {
    pub pc: u32,
    pub mode: ResumeMode,
    pub slots: Vec<RecoverValue>,
    /// Stores to replay, oldest first.
    pub stores: Vec<RecoverValue>,
}

/// A decoded snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecoverSnapshot {
    pub instructions: Vec<RecoverInstruction>,
    /// Outermost frame first.
    pub frames: Vec<RecoverFrame>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recover_opcodes_are_unique() {
        for (i, a) in RECOVER_OPCODES.iter().enumerate() {
            assert!(RECOVER_OPCODES[i + 1..].iter().all(|b| b != a), "{:?} twice", a);
        }
    }

    #[test]
    fn test_error_display() {
        let err = RecoverError::BadTag {
            what: "opcode",
            value: 999,
            offset: 3,
        };
        assert_eq!(err.to_string(), "invalid opcode 999 at byte 3");
    }
}
