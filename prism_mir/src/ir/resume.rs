//! Resume points and the store-recovery stack.
//!
//! A resume point snapshots the abstract interpreter stack of a block at a
//! bytecode position. Every block has an entry resume point and every
//! effectful instruction carries one describing the state right after it.
//! Inlined frames chain to their caller's resume point.
//!
//! Stores that were optimized away (writes into an allocation that was
//! removed by scalar replacement) are remembered on a per-resume-point
//! list that bailout replays oldest first. Consecutive resume points with
//! the same history share list nodes, forming a spaghetti stack.

use super::arena::{BitSet, Id};
use super::block::BlockId;
use super::graph::Graph;
use super::node::{Consumer, DefId, UseId};
use crate::error::{MirError, MirResult};

/// Resume point identifier.
pub type ResumePointId = Id<ResumePoint>;

/// Store-recovery entry identifier.
pub type StoreId = Id<StoreToRecover>;

/// Where execution resumes relative to `pc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResumeMode {
    /// Re-execute the instruction at `pc`.
    ResumeAt = 0,
    /// Continue with the instruction following `pc`.
    ResumeAfter = 1,
    /// Inlined call frame, resuming inside a standard call.
    InlinedStandardCall = 2,
    /// Inlined getter or setter frame.
    InlinedAccessor = 3,
}

impl ResumeMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ResumeMode::ResumeAt),
            1 => Some(ResumeMode::ResumeAfter),
            2 => Some(ResumeMode::InlinedStandardCall),
            3 => Some(ResumeMode::InlinedAccessor),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_inlined_frame(self) -> bool {
        matches!(self, ResumeMode::InlinedStandardCall | ResumeMode::InlinedAccessor)
    }
}

/// A snapshot of the logical stack at a program point.
#[derive(Debug, Clone)]
pub struct ResumePoint {
    pub(crate) block: BlockId,
    pub(crate) pc: u32,
    pub(crate) mode: ResumeMode,
    pub(crate) operands: Vec<UseId>,
    pub(crate) caller: Option<ResumePointId>,
    /// The instruction this resume point follows, if it is not a block
    /// entry.
    pub(crate) instruction: Option<DefId>,
    /// Top of the store-recovery stack.
    pub(crate) stores: Option<StoreId>,
    pub(crate) discarded: bool,
}

impl ResumePoint {
    #[inline]
    pub fn block(&self) -> BlockId {
        self.block
    }

    #[inline]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[inline]
    pub fn mode(&self) -> ResumeMode {
        self.mode
    }

    #[inline]
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    #[inline]
    pub fn caller(&self) -> Option<ResumePointId> {
        self.caller
    }

    #[inline]
    pub fn instruction(&self) -> Option<DefId> {
        self.instruction
    }

    #[inline]
    pub fn is_discarded(&self) -> bool {
        self.discarded
    }
}

/// One entry of a store-recovery stack.
#[derive(Debug, Clone)]
pub struct StoreToRecover {
    pub(crate) operand: UseId,
    pub(crate) next: Option<StoreId>,
    /// The resume point that pushed this entry. Later resume points may
    /// share it.
    pub(crate) owner: ResumePointId,
}

/// Which stack slots of the compiled frame bailout must reconstruct.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    /// Slots observable after bailout even when the bytecode no longer
    /// reads them (`this`, the environment chain, formals aliased by an
    /// arguments object).
    pub observable: BitSet,
    /// Slots whose value cannot be rebuilt by recover instructions.
    pub unrecoverable: BitSet,
}

impl FrameInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_observable(&mut self, slot: usize) {
        self.observable.insert(slot);
    }

    pub fn mark_unrecoverable(&mut self, slot: usize) {
        self.unrecoverable.insert(slot);
    }
}

impl Graph {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a resume point capturing `operands` for `block` at `pc`.
    ///
    /// Fails with [`MirError::StackDepthMismatch`] if the operand count is
    /// not the block's current stack depth.
    pub fn new_resume_point(
        &mut self,
        block: BlockId,
        pc: u32,
        mode: ResumeMode,
        operands: &[DefId],
    ) -> MirResult<ResumePointId> {
        let expected = self.blocks[block].slots.len();
        if operands.len() != expected {
            return Err(MirError::StackDepthMismatch {
                expected,
                found: operands.len(),
            });
        }
        self.resume_points.try_reserve(1)?;
        self.uses.try_reserve(operands.len())?;
        let id = self.resume_points.alloc(ResumePoint {
            block,
            pc,
            mode,
            operands: Vec::with_capacity(operands.len()),
            caller: None,
            instruction: None,
            stores: None,
            discarded: false,
        });
        for (i, &producer) in operands.iter().enumerate() {
            let use_id = self.new_use(producer, Consumer::ResumePoint(id), i as u32);
            self.resume_points[id].operands.push(use_id);
        }
        Ok(id)
    }

    /// Capture the block's current stack.
    pub fn capture_resume_point(
        &mut self,
        block: BlockId,
        pc: u32,
        mode: ResumeMode,
    ) -> MirResult<ResumePointId> {
        let slots = self.blocks[block].slots.clone();
        self.new_resume_point(block, pc, mode, &slots)
    }

    /// Create a resume point for `block` that copies the operands, caller
    /// and store history of `src`.
    ///
    /// Fails with [`MirError::StackDepthMismatch`] if `src` does not have
    /// `block`'s current stack depth.
    pub fn inherit_resume_point(
        &mut self,
        block: BlockId,
        src: ResumePointId,
    ) -> MirResult<ResumePointId> {
        let operands = self.resume_point_operands(src);
        let expected = self.blocks[block].slots.len();
        if operands.len() != expected {
            return Err(MirError::StackDepthMismatch {
                expected,
                found: operands.len(),
            });
        }
        let (pc, mode, caller, stores) = {
            let rp = &self.resume_points[src];
            (rp.pc, rp.mode, rp.caller, rp.stores)
        };
        self.resume_points.try_reserve(1)?;
        self.uses.try_reserve(operands.len())?;
        let id = self.resume_points.alloc(ResumePoint {
            block,
            pc,
            mode,
            operands: Vec::with_capacity(operands.len()),
            caller,
            instruction: None,
            stores,
            discarded: false,
        });
        for (i, &producer) in operands.iter().enumerate() {
            let use_id = self.new_use(producer, Consumer::ResumePoint(id), i as u32);
            self.resume_points[id].operands.push(use_id);
        }
        Ok(id)
    }

    pub fn set_caller(&mut self, rp: ResumePointId, caller: Option<ResumePointId>) {
        self.resume_points[rp].caller = caller;
    }

    // =========================================================================
    // Access
    // =========================================================================

    #[inline]
    pub fn resume_point(&self, rp: ResumePointId) -> &ResumePoint {
        &self.resume_points[rp]
    }

    pub fn resume_point_operand(&self, rp: ResumePointId, index: usize) -> DefId {
        self.uses[self.resume_points[rp].operands[index]].producer
    }

    pub fn resume_point_operands(&self, rp: ResumePointId) -> Vec<DefId> {
        self.resume_points[rp]
            .operands
            .iter()
            .map(|&u| self.uses[u].producer)
            .collect()
    }

    /// Replace operand `index` of a resume point.
    pub fn replace_resume_point_operand(&mut self, rp: ResumePointId, index: usize, producer: DefId) {
        let use_id = self.resume_points[rp].operands[index];
        self.set_use_producer(use_id, producer);
    }

    /// The chain of resume points from the outermost caller down to `rp`.
    pub fn frames(&self, rp: ResumePointId) -> Vec<ResumePointId> {
        let mut chain = vec![rp];
        let mut cur = self.resume_points[rp].caller;
        while let Some(caller) = cur {
            chain.push(caller);
            cur = self.resume_points[caller].caller;
        }
        chain.reverse();
        chain
    }

    /// Number of inlined frames above the outermost one.
    pub fn inline_depth(&self, rp: ResumePointId) -> usize {
        self.frames(rp).len() - 1
    }

    /// Whether slot `index` must be reconstructed exactly even if nothing
    /// reads it after the bailout.
    pub fn is_observable_operand(&self, _rp: ResumePointId, index: usize) -> bool {
        self.frame.observable.contains(index)
    }

    /// Whether slot `index` may be filled by a recover instruction.
    pub fn is_recoverable_operand(&self, _rp: ResumePointId, index: usize) -> bool {
        !self.frame.unrecoverable.contains(index)
    }

    /// Whether `use_id` is an operand edge of a resume point whose slot is
    /// observable.
    pub fn is_observable_use(&self, use_id: UseId) -> bool {
        let edge = &self.uses[use_id];
        match edge.consumer {
            Consumer::ResumePoint(rp) => self.is_observable_operand(rp, edge.index as usize),
            _ => false,
        }
    }

    // =========================================================================
    // Attachment
    // =========================================================================

    pub fn set_entry_resume_point(&mut self, block: BlockId, rp: ResumePointId) {
        if let Some(old) = self.blocks[block].entry_resume_point.replace(rp) {
            if old != rp {
                self.discard_resume_point(old);
            }
        }
    }

    /// Attach `rp` as the after-state of `ins`, replacing any previous one.
    pub fn set_resume_point(&mut self, ins: DefId, rp: ResumePointId) {
        self.clear_resume_point(ins);
        self.defs[ins].resume_point = Some(rp);
        self.resume_points[rp].instruction = Some(ins);
    }

    /// Move the resume point of `from` onto `to`.
    pub fn steal_resume_point(&mut self, to: DefId, from: DefId) {
        if let Some(rp) = self.defs[from].resume_point.take() {
            self.set_resume_point(to, rp);
        }
    }

    /// Turn the resume point of `ins` into its block's entry resume point,
    /// resuming at the same pc.
    pub fn move_resume_point_as_entry(&mut self, ins: DefId) {
        let Some(rp) = self.defs[ins].resume_point.take() else {
            return;
        };
        let block = self.resume_points[rp].block;
        self.resume_points[rp].instruction = None;
        self.resume_points[rp].mode = ResumeMode::ResumeAt;
        self.set_entry_resume_point(block, rp);
    }

    /// Detach and discard the resume point of `ins`.
    pub fn clear_resume_point(&mut self, ins: DefId) {
        if let Some(rp) = self.defs[ins].resume_point.take() {
            self.discard_resume_point(rp);
        }
    }

    /// Release a resume point's operand edges.
    ///
    /// Store-recovery entries stay linked: they may be shared with later
    /// resume points, and the stores they name are effectful anyway.
    pub fn discard_resume_point(&mut self, rp: ResumePointId) {
        if self.resume_points[rp].discarded {
            return;
        }
        let operands = std::mem::take(&mut self.resume_points[rp].operands);
        for use_id in operands {
            let producer = self.uses[use_id].producer;
            self.remove_use(producer, use_id);
            self.uses[use_id].live = false;
        }
        let point = &mut self.resume_points[rp];
        point.discarded = true;
        point.instruction = None;
    }

    // =========================================================================
    // Store Recovery
    // =========================================================================

    /// Record that `store` must be replayed when bailing out at `rp`.
    ///
    /// `cache` is the previous resume point of the same block, if any. When
    /// its newest entry is the same store on top of the history `rp`
    /// already has, the entry is shared instead of duplicated.
    pub fn add_store(
        &mut self,
        rp: ResumePointId,
        store: DefId,
        cache: Option<ResumePointId>,
    ) -> MirResult<()> {
        debug_assert!(self.is_effectful(store), "{:?} is not a store", store);
        if let Some(cache) = cache {
            if let Some(top) = self.resume_points[cache].stores {
                let entry = &self.stores[top];
                if self.uses[entry.operand].producer == store
                    && entry.next == self.resume_points[rp].stores
                {
                    self.resume_points[rp].stores = Some(top);
                    return Ok(());
                }
            }
        }

        self.stores.try_reserve(1)?;
        self.uses.try_reserve(1)?;
        let next = self.resume_points[rp].stores;
        let id = self.stores.next_id();
        let operand = self.new_use(store, Consumer::Store(id), 0);
        let allocated = self.stores.alloc(StoreToRecover {
            operand,
            next,
            owner: rp,
        });
        debug_assert_eq!(allocated, id);
        self.resume_points[rp].stores = Some(allocated);
        Ok(())
    }

    /// Stores to replay at `rp`, oldest first.
    pub fn stores_of(&self, rp: ResumePointId) -> Vec<DefId> {
        let mut out = Vec::new();
        let mut cur = self.resume_points[rp].stores;
        while let Some(id) = cur {
            let entry = &self.stores[id];
            out.push(self.uses[entry.operand].producer);
            cur = entry.next;
        }
        out.reverse();
        out
    }

    /// Whether `rp` and `other` share the node on top of their store
    /// stacks.
    pub fn shares_store_history(&self, rp: ResumePointId, other: ResumePointId) -> bool {
        let a = self.resume_points[rp].stores;
        a.is_some() && a == self.resume_points[other].stores
    }
}

// =============================================================================
// Tests
// =============================================================================
