//! Textual dumps of a graph, for logs and test failure messages.
//!
//! ```text
//! block0:
//!   #0 = Parameter[0] : int32
//!   #2 = Add #0, #1 : int32 [movable]
//!   #3 = Return #2 : none
//! ```

use std::fmt::{self, Write};

use super::block::BlockId;
use super::graph::Graph;
use super::node::{DefFlags, DefId};
use super::opcode::Op;

impl Graph {
    /// One-line rendering of `def`.
    pub fn display_def(&self, def: DefId) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_def(&mut out, def);
        out
    }

    fn write_def(&self, out: &mut String, def: DefId) -> fmt::Result {
        let d = self.def(def);
        write!(out, "{:?} = {}", def, d.op().opcode())?;
        match d.op() {
            Op::Constant(c) => write!(out, " {:?}", c)?,
            Op::Parameter { index } => write!(out, "[{}]", index)?,
            Op::Compare { op, compare_type, .. } => {
                write!(out, " {} ({:?})", op.symbol(), compare_type)?
            }
            Op::MathFunction { func } => write!(out, " {}", func.name())?,
            Op::LoadFixedSlot { slot }
            | Op::StoreFixedSlot { slot, .. }
            | Op::LoadDynamicSlot { slot }
            | Op::StoreDynamicSlot { slot, .. } => write!(out, "[{}]", slot)?,
            Op::Goto { target } => write!(out, " -> {:?}", target)?,
            Op::Test { if_true, if_false } => {
                write!(out, " ? {:?} : {:?}", if_true, if_false)?
            }
            _ => {}
        }
        let operands = self.operands(def);
        for (i, op) in operands.iter().enumerate() {
            out.push_str(if i == 0 { " " } else { ", " });
            write!(out, "{:?}", op)?;
        }
        write!(out, " : {}", d.ty())?;

        let mut tags = Vec::new();
        if d.flags().contains(DefFlags::MOVABLE) {
            tags.push("movable");
        }
        if d.is_guard() {
            tags.push("guard");
        }
        if d.is_recovered_on_bailout() {
            tags.push("recovered");
        }
        if d.is_implicitly_used() {
            tags.push("implicit");
        }
        if d.is_truncated() {
            tags.push("truncated");
        }
        if !tags.is_empty() {
            write!(out, " [{}]", tags.join(", "))?;
        }
        Ok(())
    }

    fn write_block(&self, out: &mut String, block: BlockId) -> fmt::Result {
        let b = self.block(block);
        write!(out, "block{}:", block.index())?;
        if !b.predecessors().is_empty() {
            let preds: Vec<String> = b.predecessors().iter().map(|p| format!("{:?}", p)).collect();
            write!(out, " preds({})", preds.join(", "))?;
        }
        out.push('\n');
        for &def in b.phis().iter().chain(b.instructions()) {
            out.push_str("  ");
            self.write_def(out, def)?;
            out.push('\n');
        }
        Ok(())
    }

    /// Render every block, entry first.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut order: Vec<BlockId> = self.entry().into_iter().collect();
        order.extend(self.block_ids().filter(|&b| Some(b) != self.entry()));
        for block in order {
            let _ = self.write_block(&mut out, block);
        }
        out
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}
