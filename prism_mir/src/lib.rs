//! Mid-level SSA IR for the Prism JIT.
//!
//! - An arena-backed graph of definitions with symmetric use-lists
//! - A closed instruction catalog with per-opcode folding rules
//! - Alias classification and the congruence predicate used by value numbering
//! - Truncation, float32 and edge-case analyses
//! - Resume points and the recover stream decoded on bailout
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod ir;
pub mod opt;
pub mod recover;

pub use config::MirConfig;
pub use error::{MirError, MirResult};
pub use ir::{BlockId, Constant, DefId, Graph, HostTable, MirType, NodeSpec, Op, Opcode};
pub use opt::{optimize, OptimizationPass};
pub use recover::{RecoverError, RecoverReader, RecoverSnapshot, RecoverWriter};
