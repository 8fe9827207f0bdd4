//! Basic blocks, instruction placement and dominance.
//!
//! A block owns an ordered list of phis and an ordered instruction stream
//! whose last element is a control instruction once the block is complete.
//! Successor edges are read from that control instruction; predecessor
//! edges are stored explicitly because phi operand order follows them.
//!
//! Dominance is computed on demand with the Cooper-Harvey-Kennedy
//! iteration and then numbered in dominator-tree preorder, so
//! [`Graph::dominates`] is a constant-time interval test.

use super::arena::{BitSet, Id};
use super::builder::NodeSpec;
use super::constant::{Constant, MagicKind};
use super::graph::Graph;
use super::node::{DefFlags, DefId};
use super::resume::ResumePointId;
use crate::error::MirResult;

/// Block identifier.
pub type BlockId = Id<Block>;

// =============================================================================
// Basic Block
// =============================================================================

/// A basic block.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub(crate) phis: Vec<DefId>,
    pub(crate) instructions: Vec<DefId>,
    pub(crate) predecessors: Vec<BlockId>,
    pub(crate) entry_resume_point: Option<ResumePointId>,
    /// Abstract interpreter stack at the current build position.
    pub(crate) slots: Vec<DefId>,
    pub(crate) idom: Option<BlockId>,
    pub(crate) dom_index: u32,
    pub(crate) num_dominated: u32,
    pub(crate) optimized_out: Option<DefId>,
    pub(crate) loop_depth: u32,
}

impl Block {
    #[inline]
    pub fn phis(&self) -> &[DefId] {
        &self.phis
    }

    #[inline]
    pub fn instructions(&self) -> &[DefId] {
        &self.instructions
    }

    #[inline]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    #[inline]
    pub fn entry_resume_point(&self) -> Option<ResumePointId> {
        self.entry_resume_point
    }

    /// Current depth of the abstract stack.
    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slots(&self) -> &[DefId] {
        &self.slots
    }

    #[inline]
    pub fn immediate_dominator(&self) -> Option<BlockId> {
        self.idom
    }

    #[inline]
    pub fn loop_depth(&self) -> u32 {
        self.loop_depth
    }
}

impl Graph {
    // =========================================================================
    // Block Creation and Edges
    // =========================================================================

    /// Create an empty block.
    pub fn new_block(&mut self) -> BlockId {
        self.blocks.alloc(Block::default())
    }

    pub fn try_new_block(&mut self) -> MirResult<BlockId> {
        self.blocks.try_alloc(Block::default())
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.ids()
    }

    #[inline]
    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn set_entry(&mut self, block: BlockId) {
        self.entry = Some(block);
    }

    /// Record `pred` as the next predecessor of `block`. Phis of `block`
    /// expect their next operand to flow from it.
    pub fn add_predecessor(&mut self, block: BlockId, pred: BlockId) {
        self.blocks[block].predecessors.push(pred);
    }

    /// Position of `pred` among `block`'s predecessors.
    pub fn predecessor_index(&self, block: BlockId, pred: BlockId) -> Option<usize> {
        self.blocks[block].predecessors.iter().position(|&p| p == pred)
    }

    /// Drop the edge `pred -> block`, together with the matching phi
    /// operands.
    pub fn remove_predecessor(&mut self, block: BlockId, pred: BlockId) {
        let Some(index) = self.predecessor_index(block, pred) else {
            return;
        };
        self.blocks[block].predecessors.remove(index);
        for phi in self.blocks[block].phis.clone() {
            self.remove_operand(phi, index);
        }
    }

    /// The block's control instruction, if it has been terminated.
    pub fn control_instruction(&self, block: BlockId) -> Option<DefId> {
        self.blocks[block]
            .instructions
            .last()
            .copied()
            .filter(|&ins| self.defs[ins].op.is_control())
    }

    /// Successors in edge order.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.control_instruction(block)
            .map(|ins| self.defs[ins].op.successors())
            .unwrap_or_default()
    }

    /// The single successor of `block`, if it has exactly one.
    pub fn single_successor(&self, block: BlockId) -> Option<BlockId> {
        match self.successors(block).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// The successor of `block` that has phis, with `block`'s position among
    /// that successor's predecessors.
    pub fn successor_with_phis(&self, block: BlockId) -> Option<(BlockId, usize)> {
        self.successors(block).into_iter().find_map(|succ| {
            if self.blocks[succ].phis.is_empty() {
                return None;
            }
            self.predecessor_index(succ, block).map(|i| (succ, i))
        })
    }

    // =========================================================================
    // Instruction Placement
    // =========================================================================

    /// Append `def` to the end of `block`.
    pub fn append(&mut self, block: BlockId, def: DefId) {
        debug_assert!(self.defs[def].block.is_none(), "{:?} already placed", def);
        debug_assert!(
            self.control_instruction(block).is_none(),
            "{:?} is already terminated",
            block
        );
        self.blocks[block].instructions.push(def);
        self.defs[def].block = Some(block);
    }

    /// Allocate `spec` and append it to `block`.
    pub fn push(&mut self, block: BlockId, spec: NodeSpec) -> DefId {
        let def = self.add_node(spec);
        self.append(block, def);
        def
    }

    /// Fallible [`Graph::push`].
    pub fn try_push(&mut self, block: BlockId, spec: NodeSpec) -> MirResult<DefId> {
        let def = self.try_add_node(spec)?;
        self.append(block, def);
        Ok(def)
    }

    /// Add a phi to `block`. Its operands are added with
    /// [`Graph::add_operand`] in predecessor order.
    pub fn add_phi(&mut self, block: BlockId, phi: DefId) {
        debug_assert!(self.defs[phi].is_phi());
        self.blocks[block].phis.push(phi);
        self.defs[phi].block = Some(block);
    }

    fn position_of(&self, ins: DefId) -> (BlockId, usize) {
        let block = self.defs[ins].block.unwrap_or_else(|| panic!("{:?} is not in a block", ins));
        let pos = self.blocks[block]
            .instructions
            .iter()
            .position(|&i| i == ins)
            .unwrap_or_else(|| panic!("{:?} missing from {:?}", ins, block));
        (block, pos)
    }

    /// Place `def` immediately before `at`.
    pub fn insert_before(&mut self, at: DefId, def: DefId) {
        let (block, pos) = self.position_of(at);
        self.blocks[block].instructions.insert(pos, def);
        self.defs[def].block = Some(block);
    }

    /// Place `def` immediately after `at`.
    pub fn insert_after(&mut self, at: DefId, def: DefId) {
        let (block, pos) = self.position_of(at);
        self.blocks[block].instructions.insert(pos + 1, def);
        self.defs[def].block = Some(block);
    }

    /// Place `def` at the top of `block`, after its phis.
    pub fn insert_at_start(&mut self, block: BlockId, def: DefId) {
        self.blocks[block].instructions.insert(0, def);
        self.defs[def].block = Some(block);
    }

    /// Allocate `spec` and place it before `at` (fallible mode).
    pub fn try_insert_before(&mut self, at: DefId, spec: NodeSpec) -> MirResult<DefId> {
        let def = self.try_add_node(spec)?;
        self.insert_before(at, def);
        Ok(def)
    }

    /// Move an already placed instruction right before `at`.
    pub fn move_before(&mut self, at: DefId, def: DefId) {
        self.remove_from_block(def);
        self.insert_before(at, def);
    }

    /// Take `def` out of its block without releasing its edges.
    pub fn remove_from_block(&mut self, def: DefId) {
        let Some(block) = self.defs[def].block.take() else {
            return;
        };
        let b = &mut self.blocks[block];
        if let Some(pos) = b.instructions.iter().position(|&i| i == def) {
            b.instructions.remove(pos);
        } else if let Some(pos) = b.phis.iter().position(|&i| i == def) {
            b.phis.remove(pos);
        }
        if b.optimized_out == Some(def) {
            b.optimized_out = None;
        }
    }

    /// Remove `def` from the graph: it leaves its block, drops its operand
    /// edges and its resume point. It must have no remaining uses.
    pub fn discard(&mut self, def: DefId) {
        debug_assert!(
            !self.has_uses(def),
            "discarding {:?} which still has uses",
            def
        );
        self.remove_from_block(def);
        self.release_operands(def);
        self.clear_resume_point(def);
        self.defs[def].flags.insert(DefFlags::DISCARDED);
    }

    /// Replace the control instruction of `block` with `new_control` and
    /// drop the edges to successors that are no longer targeted.
    pub fn replace_control_instruction(&mut self, block: BlockId, new_control: DefId) {
        let old_successors = self.successors(block);
        if let Some(old) = self.control_instruction(block) {
            self.discard(old);
        }
        self.append(block, new_control);
        let new_successors = self.successors(block);
        for succ in old_successors {
            if !new_successors.contains(&succ) {
                self.remove_predecessor(succ, block);
            }
        }
    }

    /// The block's optimized-out sentinel, created at the block's start on
    /// first request.
    pub fn optimized_out_constant(&mut self, block: BlockId) -> MirResult<DefId> {
        if let Some(existing) = self.blocks[block].optimized_out {
            return Ok(existing);
        }
        let sentinel = self.try_add_node(NodeSpec::constant(Constant::Magic(MagicKind::OptimizedOut)))?;
        self.insert_at_start(block, sentinel);
        self.blocks[block].optimized_out = Some(sentinel);
        Ok(sentinel)
    }

    // =========================================================================
    // Abstract Stack
    // =========================================================================

    pub fn push_slot(&mut self, block: BlockId, def: DefId) {
        self.blocks[block].slots.push(def);
    }

    pub fn pop_slot(&mut self, block: BlockId) -> Option<DefId> {
        self.blocks[block].slots.pop()
    }

    pub fn set_slot(&mut self, block: BlockId, index: usize, def: DefId) {
        self.blocks[block].slots[index] = def;
    }

    /// Start `block` with a copy of `pred`'s stack.
    pub fn inherit_slots(&mut self, block: BlockId, pred: BlockId) {
        let slots = self.blocks[pred].slots.clone();
        self.blocks[block].slots = slots;
    }

    // =========================================================================
    // Dominance
    // =========================================================================

    /// Blocks reachable from the entry, in reverse postorder. Valid after
    /// [`Graph::build_dominator_tree`].
    #[inline]
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    fn compute_rpo(&mut self) {
        self.rpo.clear();
        let Some(entry) = self.entry else {
            return;
        };
        let mut visited = BitSet::with_capacity(self.blocks.len());
        let mut postorder = Vec::with_capacity(self.blocks.len());
        // Iterative DFS: (block, next successor index).
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry.as_usize());
        while let Some(top) = stack.last_mut() {
            let (block, next) = *top;
            let succs = self.successors(block);
            if let Some(&succ) = succs.get(next) {
                top.1 += 1;
                if visited.insert(succ.as_usize()) {
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
                stack.pop();
            }
        }
        postorder.reverse();
        self.rpo = postorder;
    }

    /// Compute immediate dominators and the preorder numbering used by
    /// [`Graph::dominates`].
    pub fn build_dominator_tree(&mut self) {
        self.compute_rpo();
        for id in self.blocks.ids().collect::<Vec<_>>() {
            let b = &mut self.blocks[id];
            b.idom = None;
            b.dom_index = u32::MAX;
            b.num_dominated = 0;
        }
        let Some(entry) = self.entry else {
            return;
        };

        let mut rpo_number = vec![u32::MAX; self.blocks.len()];
        for (i, &b) in self.rpo.iter().enumerate() {
            rpo_number[b.as_usize()] = i as u32;
        }
        let mut idom: Vec<Option<BlockId>> = vec![None; self.blocks.len()];
        idom[entry.as_usize()] = Some(entry);

        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| {
            while a != b {
                while rpo_number[a.as_usize()] > rpo_number[b.as_usize()] {
                    a = idom[a.as_usize()].unwrap_or(entry);
                }
                while rpo_number[b.as_usize()] > rpo_number[a.as_usize()] {
                    b = idom[b.as_usize()].unwrap_or(entry);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &block in self.rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in &self.blocks[block].predecessors {
                    if rpo_number[pred.as_usize()] == u32::MAX || idom[pred.as_usize()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(&idom, pred, cur),
                    });
                }
                if new_idom.is_some() && idom[block.as_usize()] != new_idom {
                    idom[block.as_usize()] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];
        for &block in &self.rpo {
            if block == entry {
                continue;
            }
            if let Some(parent) = idom[block.as_usize()] {
                self.blocks[block].idom = Some(parent);
                children[parent.as_usize()].push(block);
            }
        }

        // Preorder numbering; num_dominated counts the block itself.
        let mut counter = 0u32;
        let mut stack = vec![(entry, false)];
        while let Some((block, done)) = stack.pop() {
            if done {
                let size = counter - self.blocks[block].dom_index;
                self.blocks[block].num_dominated = size;
                continue;
            }
            self.blocks[block].dom_index = counter;
            counter += 1;
            stack.push((block, true));
            for &child in children[block.as_usize()].iter().rev() {
                stack.push((child, false));
            }
        }
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let (a, b) = (&self.blocks[a], &self.blocks[b]);
        if a.dom_index == u32::MAX || b.dom_index == u32::MAX {
            return false;
        }
        b.dom_index.wrapping_sub(a.dom_index) < a.num_dominated
    }

    #[inline]
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.blocks[block].idom
    }
}

// =============================================================================
// Tests
// =============================================================================
