//! SSA graph substrate.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): generational ids and bump storage
//! - **Types** (`types.rs`): result types of definitions
//! - **Alias** (`alias.rs`): memory effect categories
//! - **Host** (`host.rs`): handles for strings, symbols, bigints, shapes, objects
//! - **Constant** (`constant.rs`): literal payloads
//! - **Opcode** (`opcode.rs`): the closed instruction catalog
//! - **Node** (`node.rs`): definitions and use edges
//! - **Graph** (`graph.rs`): storage, use-lists and replacement operations
//! - **Block** (`block.rs`): instruction placement and dominance
//! - **Resume** (`resume.rs`): resume points and store recovery
//! - **Builder** (`builder.rs`): node specifications
//! - **Printer** (`printer.rs`): textual dumps

pub mod alias;
pub mod arena;
pub mod block;
pub mod builder;
pub mod constant;
pub mod graph;
pub mod host;
pub mod node;
pub mod opcode;
mod printer;
pub mod resume;
pub mod types;

pub use alias::{AliasFlags, AliasSet, AliasType};
pub use arena::{Arena, BitSet, Id};
pub use block::{Block, BlockId};
pub use builder::NodeSpec;
pub use constant::{Constant, MagicKind};
pub use graph::Graph;
pub use host::{BigIntHandle, HostTable, ObjectHandle, ShapeHandle, StringHandle, SymbolHandle};
pub use node::{BailoutKind, Consumer, DefFlags, DefId, Definition, TruncateKind, Use, UseId};
pub use opcode::{
    ArithData, CompareOp, CompareType, DivData, IntConversionInput, MathFunc, ModData, MulData,
    Op, Opcode, PhiData, SignExtendMode, UnboxMode,
};
pub use resume::{FrameInfo, ResumeMode, ResumePoint, ResumePointId, StoreId, StoreToRecover};
pub use types::MirType;
