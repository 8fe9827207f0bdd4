//! The MIR graph: arenas, use-lists and the replacement operations.
//!
//! The graph provides:
//! - **Arena-based storage**: definitions, use edges, blocks and resume points
//!   are addressed by generational ids
//! - **Use-lists**: every producer knows its consumers, most recently added
//!   first
//! - **Replacement operations**: the only sanctioned ways to redirect edges,
//!   each preserving use-list integrity
//!
//! # Use-list integrity
//!
//! A producer's use-list is exactly the multiset of live edges whose
//! `producer` field names it. Passes never touch edges directly; they call
//! [`Graph::replace_operand`], [`Graph::replace_all_uses_with`] and friends.
//! [`Graph::verify`] checks the invariant in debug builds.

use std::sync::Arc;

use smallvec::SmallVec;

use super::arena::Arena;
use super::block::{Block, BlockId};
use super::builder::NodeSpec;
use super::constant::Constant;
use super::host::HostTable;
use super::node::{Consumer, DefFlags, DefId, Definition, Use, UseId};
use super::opcode::{Op, Opcode};
use super::resume::{FrameInfo, ResumePoint, ResumePointId, StoreToRecover};
use super::types::MirType;
use crate::config::MirConfig;
use crate::error::MirResult;

// =============================================================================
// Graph Structure
// =============================================================================

/// One compilation's MIR.
///
/// The graph exclusively owns every node. It is built and mutated by a
/// single thread; separate compilations use separate graphs and share only
/// the [`HostTable`].
#[derive(Debug)]
pub struct Graph {
    pub(crate) defs: Arena<Definition>,
    pub(crate) uses: Arena<Use>,
    pub(crate) blocks: Arena<Block>,
    pub(crate) resume_points: Arena<ResumePoint>,
    pub(crate) stores: Arena<StoreToRecover>,
    pub(crate) entry: Option<BlockId>,
    pub(crate) rpo: Vec<BlockId>,
    pub(crate) host: Arc<HostTable>,
    pub(crate) config: MirConfig,
    pub(crate) frame: FrameInfo,
    pub(crate) has_try_block: bool,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(host: Arc<HostTable>, config: MirConfig) -> Self {
        let mut graph = Graph {
            defs: Arena::with_capacity(256),
            uses: Arena::with_capacity(512),
            blocks: Arena::new(),
            resume_points: Arena::new(),
            stores: Arena::new(),
            entry: None,
            rpo: Vec::new(),
            host,
            config,
            frame: FrameInfo::default(),
            has_try_block: false,
        };
        let limit = graph.config.alloc_limit;
        graph.defs.set_limit(limit);
        graph.uses.set_limit(limit);
        graph.blocks.set_limit(limit);
        graph.resume_points.set_limit(limit);
        graph.stores.set_limit(limit);
        graph
    }

    #[inline]
    pub fn host(&self) -> &HostTable {
        &self.host
    }

    #[inline]
    pub fn config(&self) -> &MirConfig {
        &self.config
    }

    #[inline]
    pub fn frame_info(&self) -> &FrameInfo {
        &self.frame
    }

    pub fn set_frame_info(&mut self, frame: FrameInfo) {
        self.frame = frame;
    }

    /// Whether the compiled function contains a try block, whose catch
    /// handler can observe values the graph cannot see.
    #[inline]
    pub fn has_try_block(&self) -> bool {
        self.has_try_block
    }

    pub fn set_has_try_block(&mut self, value: bool) {
        self.has_try_block = value;
    }

    // =========================================================================
    // Definition Access
    // =========================================================================

    #[inline]
    pub fn def(&self, id: DefId) -> &Definition {
        &self.defs[id]
    }

    #[inline]
    pub fn def_mut(&mut self, id: DefId) -> &mut Definition {
        &mut self.defs[id]
    }

    #[inline]
    pub fn op(&self, id: DefId) -> &Op {
        &self.defs[id].op
    }

    #[inline]
    pub fn opcode(&self, id: DefId) -> Opcode {
        self.defs[id].op.opcode()
    }

    #[inline]
    pub fn ty(&self, id: DefId) -> MirType {
        self.defs[id].ty
    }

    /// The literal of `id` if it is a `Constant`.
    #[inline]
    pub fn as_constant(&self, id: DefId) -> Option<Constant> {
        self.defs[id].op.as_constant().copied()
    }

    /// The int32 literal of `id` if it is an int32 `Constant`.
    #[inline]
    pub fn as_int32(&self, id: DefId) -> Option<i32> {
        self.as_constant(id).and_then(|c| c.as_int32())
    }

    /// Number of definitions ever allocated.
    #[inline]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Every definition id, discarded ones included.
    pub fn def_ids(&self) -> impl Iterator<Item = DefId> + '_ {
        self.defs.ids()
    }

    #[inline]
    pub fn use_edge(&self, id: UseId) -> &Use {
        &self.uses[id]
    }

    #[inline]
    pub fn operand(&self, def: DefId, index: usize) -> DefId {
        self.uses[self.defs[def].operands[index]].producer
    }

    /// Operand producers in order.
    pub fn operands(&self, def: DefId) -> SmallVec<[DefId; 3]> {
        self.defs[def]
            .operands
            .iter()
            .map(|&u| self.uses[u].producer)
            .collect()
    }

    #[inline]
    pub fn num_operands(&self, def: DefId) -> usize {
        self.defs[def].operands.len()
    }

    /// Use edges of `def`, most recently added first.
    pub fn uses(&self, def: DefId) -> impl DoubleEndedIterator<Item = UseId> + '_ {
        self.defs[def].uses.iter().rev().copied()
    }

    /// Snapshot of the use-list, most recently added first.
    pub fn uses_vec(&self, def: DefId) -> Vec<UseId> {
        self.uses(def).collect()
    }

    // =========================================================================
    // Node Creation
    // =========================================================================

    /// Allocate a definition (infallible mode). The node is not placed in
    /// any block.
    ///
    /// # Panics
    ///
    /// Panics if the operand count does not match the opcode's arity.
    pub fn add_node(&mut self, spec: NodeSpec) -> DefId {
        let opcode = spec.op.opcode();
        if let Some(arity) = opcode.arity() {
            assert_eq!(
                arity,
                spec.operands.len(),
                "{} takes {} operands",
                opcode,
                arity
            );
        }
        let mut def = Definition::new(spec.op, spec.ty);
        def.flags = spec.flags;
        def.bailout_kind = spec.bailout_kind;
        let id = self.defs.alloc(def);
        for producer in spec.operands {
            self.push_operand(id, producer);
        }
        id
    }

    /// Allocate a definition (fallible mode).
    pub fn try_add_node(&mut self, spec: NodeSpec) -> MirResult<DefId> {
        self.defs.try_reserve(1)?;
        self.uses.try_reserve(spec.operands.len())?;
        Ok(self.add_node(spec))
    }

    fn push_operand(&mut self, consumer: DefId, producer: DefId) -> UseId {
        let index = self.defs[consumer].operands.len() as u32;
        let use_id = self.uses.alloc(Use {
            producer,
            consumer: Consumer::Definition(consumer),
            index,
            live: true,
        });
        self.defs[consumer].operands.push(use_id);
        self.add_use(producer, use_id);
        use_id
    }

    pub(crate) fn new_use(&mut self, producer: DefId, consumer: Consumer, index: u32) -> UseId {
        let use_id = self.uses.alloc(Use {
            producer,
            consumer,
            index,
            live: true,
        });
        self.add_use(producer, use_id);
        use_id
    }

    // =========================================================================
    // Use-list Maintenance
    // =========================================================================

    /// Link `use_id` into `producer`'s use-list as the most recent use.
    pub(crate) fn add_use(&mut self, producer: DefId, use_id: UseId) {
        debug_assert_eq!(self.uses[use_id].producer, producer);
        self.defs[producer].uses.push(use_id);
    }

    /// Unlink `use_id` from `producer`'s use-list, keeping the order of the
    /// remaining uses.
    pub(crate) fn remove_use(&mut self, producer: DefId, use_id: UseId) {
        let uses = &mut self.defs[producer].uses;
        if let Some(pos) = uses.iter().rposition(|&u| u == use_id) {
            uses.remove(pos);
        } else {
            debug_assert!(false, "use {:?} missing from {:?}", use_id, producer);
        }
    }

    /// Point an existing edge at a new producer.
    pub(crate) fn set_use_producer(&mut self, use_id: UseId, producer: DefId) {
        let old = self.uses[use_id].producer;
        if old == producer {
            return;
        }
        self.remove_use(old, use_id);
        self.uses[use_id].producer = producer;
        self.add_use(producer, use_id);
    }

    /// Replace operand `index` of `consumer` with `producer`.
    pub fn replace_operand(&mut self, consumer: DefId, index: usize, producer: DefId) {
        let use_id = self.defs[consumer].operands[index];
        self.set_use_producer(use_id, producer);
    }

    /// Append an operand to a variadic definition (phi, call, object state).
    pub fn add_operand(&mut self, consumer: DefId, producer: DefId) -> UseId {
        debug_assert!(self.defs[consumer].op.opcode().arity().is_none());
        self.push_operand(consumer, producer)
    }

    /// Fallible [`Graph::add_operand`].
    pub fn try_add_operand(&mut self, consumer: DefId, producer: DefId) -> MirResult<UseId> {
        self.uses.try_reserve(1)?;
        Ok(self.add_operand(consumer, producer))
    }

    /// Remove operand `index` of a variadic definition; later operands shift
    /// down by one.
    pub fn remove_operand(&mut self, consumer: DefId, index: usize) {
        let use_id = self.defs[consumer].operands.remove(index);
        let producer = self.uses[use_id].producer;
        self.remove_use(producer, use_id);
        self.uses[use_id].live = false;
        let operands = self.defs[consumer].operands.clone();
        for (i, &u) in operands.iter().enumerate().skip(index) {
            self.uses[u].index = i as u32;
        }
    }

    /// Drop every operand edge of `def`.
    pub(crate) fn release_operands(&mut self, def: DefId) {
        let operands = std::mem::take(&mut self.defs[def].operands);
        for use_id in operands {
            let producer = self.uses[use_id].producer;
            self.remove_use(producer, use_id);
            self.uses[use_id].live = false;
        }
    }

    // =========================================================================
    // Replacement Operations
    // =========================================================================

    /// Redirect every use of `def` to `dom`, marking `def`'s operands as
    /// implicitly used: whatever they fed into is gone from the graph.
    pub fn replace_all_uses_with(&mut self, def: DefId, dom: DefId) {
        for operand in self.operands(def) {
            self.defs[operand].flags.insert(DefFlags::IMPLICITLY_USED);
        }
        self.just_replace_all_uses_with(def, dom);
    }

    /// Redirect every use of `def` to `dom` without touching `def`'s
    /// operands.
    ///
    /// The moved uses become the oldest uses of `dom`.
    pub fn just_replace_all_uses_with(&mut self, def: DefId, dom: DefId) {
        assert_ne!(def, dom, "cannot replace a definition with itself");
        if self.defs[def].is_implicitly_used() {
            self.defs[dom].flags.insert(DefFlags::IMPLICITLY_USED);
        }
        let moved = std::mem::take(&mut self.defs[def].uses);
        for &use_id in &moved {
            self.uses[use_id].producer = dom;
        }
        let existing = std::mem::replace(&mut self.defs[dom].uses, moved);
        self.defs[dom].uses.extend(existing);
    }

    /// Redirect every use of `def` to the optimized-out sentinel of the
    /// consumer's block. Used for values no consumer can observe any more.
    pub fn optimize_out_all_uses(&mut self, def: DefId) -> MirResult<()> {
        for use_id in self.uses_vec(def) {
            let block = self.consumer_block(self.uses[use_id].consumer);
            let sentinel = match block {
                Some(block) => self.optimized_out_constant(block)?,
                None => self.try_add_node(NodeSpec::constant(Constant::Magic(
                    super::constant::MagicKind::OptimizedOut,
                )))?,
            };
            self.uses[use_id].producer = sentinel;
            self.defs[sentinel].uses.push(use_id);
        }
        self.defs[def].uses.clear();
        Ok(())
    }

    /// Redirect uses of `def` except those held by resume points and by
    /// definitions recovered on bailout, so snapshots keep seeing `def`.
    pub fn replace_all_live_uses_with(&mut self, def: DefId, dom: DefId) {
        for use_id in self.uses_vec(def) {
            match self.uses[use_id].consumer {
                Consumer::ResumePoint(_) | Consumer::Store(_) => continue,
                Consumer::Definition(consumer) => {
                    if self.defs[consumer].is_recovered_on_bailout() {
                        continue;
                    }
                }
            }
            self.set_use_producer(use_id, dom);
        }
    }

    /// Block in which a consumer lives.
    pub fn consumer_block(&self, consumer: Consumer) -> Option<BlockId> {
        match consumer {
            Consumer::Definition(def) => self.defs[def].block,
            Consumer::ResumePoint(rp) => Some(self.resume_points[rp].block),
            Consumer::Store(store) => Some(self.resume_points[self.stores[store].owner].block),
        }
    }

    // =========================================================================
    // Use Queries
    // =========================================================================

    #[inline]
    pub fn has_uses(&self, def: DefId) -> bool {
        !self.defs[def].uses.is_empty()
    }

    #[inline]
    pub fn use_count(&self, def: DefId) -> usize {
        self.defs[def].uses.len()
    }

    #[inline]
    pub fn has_one_use(&self, def: DefId) -> bool {
        self.defs[def].uses.len() == 1
    }

    fn def_consumers(&self, def: DefId) -> impl Iterator<Item = DefId> + '_ {
        self.uses(def)
            .filter_map(move |u| self.uses[u].consumer.as_definition())
    }

    fn live_def_consumers(&self, def: DefId) -> impl Iterator<Item = DefId> + '_ {
        self.def_consumers(def)
            .filter(move |&c| !self.defs[c].is_recovered_on_bailout())
    }

    /// Number of uses held by definitions.
    pub fn def_use_count(&self, def: DefId) -> usize {
        self.def_consumers(def).count()
    }

    pub fn has_one_def_use(&self, def: DefId) -> bool {
        let mut consumers = self.def_consumers(def);
        consumers.next().is_some() && consumers.next().is_none()
    }

    pub fn has_one_live_def_use(&self, def: DefId) -> bool {
        let mut consumers = self.live_def_consumers(def);
        consumers.next().is_some() && consumers.next().is_none()
    }

    pub fn has_def_uses(&self, def: DefId) -> bool {
        self.def_consumers(def).next().is_some()
    }

    /// Uses by definitions that are actually emitted.
    pub fn has_live_def_uses(&self, def: DefId) -> bool {
        self.live_def_consumers(def).next().is_some()
    }

    /// The only definition consuming `def`, if there is exactly one.
    pub fn maybe_single_def_use(&self, def: DefId) -> Option<UseId> {
        let mut found = None;
        for use_id in self.uses(def) {
            if self.uses[use_id].consumer.is_definition() {
                if found.is_some() {
                    return None;
                }
                found = Some(use_id);
            }
        }
        found
    }

    /// The newest use held by a definition.
    pub fn maybe_most_recently_added_def_use(&self, def: DefId) -> Option<UseId> {
        self.uses(def)
            .find(|&u| self.uses[u].consumer.is_definition())
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Writes memory, per its alias set.
    pub fn is_effectful(&self, def: DefId) -> bool {
        crate::opt::alias::alias_set(self, def).is_store()
    }

    /// Removable when it has no uses: no effect, not a guard, not control,
    /// no resume point attached.
    pub fn is_dead_if_unused(&self, def: DefId) -> bool {
        let d = &self.defs[def];
        !self.is_effectful(def)
            && !d.is_guard()
            && !d.is_guard_range_bailouts()
            && !d.op.is_control()
            && d.resume_point.is_none()
    }

    /// Removable right now.
    pub fn is_discardable(&self, def: DefId) -> bool {
        self.is_dead_if_unused(def) && !self.has_uses(def) && !self.defs[def].is_implicitly_used()
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check use-list integrity, phi arity and resume-point back-links.
    ///
    /// Walks the whole graph; passes only call it in debug builds.
    pub fn verify(&self) -> Result<(), String> {
        for (id, def) in self.defs.iter() {
            for (i, &use_id) in def.operands.iter().enumerate() {
                let edge = &self.uses[use_id];
                if !edge.live {
                    return Err(format!("{:?}: operand {} is a dead edge", id, i));
                }
                if edge.consumer != Consumer::Definition(id) || edge.index as usize != i {
                    return Err(format!("{:?}: operand {} has wrong back-link", id, i));
                }
            }
            for &use_id in &def.uses {
                let edge = &self.uses[use_id];
                if edge.producer != id || !edge.live {
                    return Err(format!("{:?}: use {:?} does not point back", id, use_id));
                }
            }
        }

        // Every live edge appears exactly once in its producer's list.
        for (use_id, edge) in self.uses.iter() {
            if !edge.live {
                continue;
            }
            let count = self.defs[edge.producer]
                .uses
                .iter()
                .filter(|&&u| u == use_id)
                .count();
            if count != 1 {
                return Err(format!(
                    "use {:?} appears {} times in {:?}'s use-list",
                    use_id, count, edge.producer
                ));
            }
        }

        for (block_id, block) in self.blocks.iter() {
            for &phi in &block.phis {
                let n = self.defs[phi].operands.len();
                if n != block.predecessors.len() {
                    return Err(format!(
                        "{:?}: phi {:?} has {} operands for {} predecessors",
                        block_id,
                        phi,
                        n,
                        block.predecessors.len()
                    ));
                }
            }
            for &ins in block.phis.iter().chain(&block.instructions) {
                if self.defs[ins].block != Some(block_id) {
                    return Err(format!("{:?} is listed in {:?} but not owned by it", ins, block_id));
                }
            }
        }

        for (rp_id, rp) in self.resume_points.iter() {
            if rp.discarded {
                continue;
            }
            for (i, &use_id) in rp.operands.iter().enumerate() {
                let edge = &self.uses[use_id];
                if edge.consumer != Consumer::ResumePoint(rp_id) || edge.index as usize != i {
                    return Err(format!("{:?}: operand {} has wrong back-link", rp_id, i));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::TruncateKind;

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    #[test]
    fn test_use_lists_are_symmetric() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let b = g.add_node(NodeSpec::parameter(1, MirType::Int32));
        let add = g.add_node(NodeSpec::add(a, b, MirType::Int32));
        let mul = g.add_node(NodeSpec::mul(add, a, MirType::Int32));

        assert_eq!(g.use_count(a), 2);
        assert_eq!(g.use_count(add), 1);
        assert_eq!(g.operands(mul).as_slice(), &[add, a]);
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_uses_iterate_most_recent_first() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let first = g.add_node(NodeSpec::bit_not(a));
        let second = g.add_node(NodeSpec::bit_not(a));

        let consumers: Vec<_> = g
            .uses(a)
            .map(|u| g.use_edge(u).consumer())
            .collect();
        assert_eq!(
            consumers,
            vec![Consumer::Definition(second), Consumer::Definition(first)]
        );
        assert_eq!(
            g.maybe_most_recently_added_def_use(a)
                .map(|u| g.use_edge(u).consumer()),
            Some(Consumer::Definition(second))
        );
    }

    #[test]
    fn test_replace_all_uses_with_moves_counts() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let b = g.add_node(NodeSpec::parameter(1, MirType::Int32));
        let old = g.add_node(NodeSpec::add(a, b, MirType::Int32));
        let dom = g.add_node(NodeSpec::sub(a, b, MirType::Int32));
        let _u1 = g.add_node(NodeSpec::bit_not(old));
        let _u2 = g.add_node(NodeSpec::bit_not(old));
        let _u3 = g.add_node(NodeSpec::bit_not(dom));

        g.replace_all_uses_with(old, dom);

        assert_eq!(g.use_count(old), 0);
        assert_eq!(g.use_count(dom), 3);
        assert!(g.def(a).is_implicitly_used());
        assert!(g.def(b).is_implicitly_used());
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_just_replace_does_not_mark_operands() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let old = g.add_node(NodeSpec::bit_not(a));
        let dom = g.add_node(NodeSpec::parameter(1, MirType::Int32));
        let user = g.add_node(NodeSpec::bit_not(old));

        g.just_replace_all_uses_with(old, dom);

        assert!(!g.def(a).is_implicitly_used());
        assert_eq!(g.operand(user, 0), dom);
    }

    #[test]
    fn test_replace_operand_and_remove_operand() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let b = g.add_node(NodeSpec::parameter(1, MirType::Int32));
        let c = g.add_node(NodeSpec::parameter(2, MirType::Int32));
        let phi = g.add_node(NodeSpec::phi(MirType::Int32));
        g.add_operand(phi, a);
        g.add_operand(phi, b);
        g.add_operand(phi, c);

        g.replace_operand(phi, 0, c);
        assert_eq!(g.use_count(a), 0);
        assert_eq!(g.use_count(c), 2);

        g.remove_operand(phi, 1);
        assert_eq!(g.operands(phi).as_slice(), &[c, c]);
        assert_eq!(g.use_count(b), 0);
        let indices: Vec<_> = g.uses(c).map(|u| g.use_edge(u).index()).collect();
        assert!(indices.contains(&0) && indices.contains(&1));
        assert!(g.verify().is_ok());
    }

    #[test]
    #[should_panic(expected = "Add takes 2 operands")]
    fn test_arity_violation_panics() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let mut spec = NodeSpec::add(a, a, MirType::Int32);
        spec.operands.pop();
        g.add_node(spec);
    }

    #[test]
    fn test_fallible_mode_reports_exhaustion() {
        let config = MirConfig {
            alloc_limit: Some(2),
            ..MirConfig::default()
        };
        let mut g = Graph::new(HostTable::new(), config);
        let a = g.try_add_node(NodeSpec::parameter(0, MirType::Int32)).unwrap();
        let b = g.try_add_node(NodeSpec::parameter(1, MirType::Int32)).unwrap();
        let err = g.try_add_node(NodeSpec::add(a, b, MirType::Int32)).unwrap_err();
        assert!(err.is_oom());
        // Nothing half-built was left behind.
        assert_eq!(g.len(), 2);
        assert_eq!(g.use_count(a), 0);
    }

    #[test]
    fn test_use_queries() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        assert!(!g.has_uses(a));
        let n = g.add_node(NodeSpec::bit_not(a));
        assert!(g.has_one_use(a));
        assert!(g.has_one_def_use(a));
        assert_eq!(g.maybe_single_def_use(a).map(|u| g.use_edge(u).consumer()), Some(Consumer::Definition(n)));

        g.def_mut(n).set_flag(DefFlags::RECOVERED_ON_BAILOUT);
        assert!(g.has_def_uses(a));
        assert!(!g.has_live_def_uses(a));
        assert!(!g.has_one_live_def_use(a));
        assert_eq!(g.def(n).truncate_kind(), TruncateKind::NoTruncate);
    }
}
