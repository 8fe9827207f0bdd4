//! Definitions and use edges.
//!
//! A [`Definition`] is an SSA value. Its operands are [`Use`] edges it owns;
//! each edge is also linked into the producer's use-list. The two views must
//! always agree: the producer's use-list is exactly the multiset of edges
//! whose `producer` field names it. Only [`Graph`](super::graph::Graph)
//! methods mutate edges, which keeps that invariant in one place.

use smallvec::SmallVec;

use super::arena::Id;
use super::block::BlockId;
use super::opcode::Op;
use super::resume::{ResumePointId, StoreId};
use super::types::MirType;
use crate::opt::range::Range;

/// Definition identifier.
pub type DefId = Id<Definition>;

/// Use-edge identifier.
pub type UseId = Id<Use>;

// =============================================================================
// Flags
// =============================================================================

bitflags::bitflags! {
    /// Per-definition analysis bits.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DefFlags: u16 {
        /// May be hoisted or value-numbered.
        const MOVABLE = 1 << 0;
        /// Must not be removed even if unused; it can bail out.
        const GUARD = 1 << 1;
        /// Its range was used to remove a bailout elsewhere; keep it.
        const GUARD_RANGE_BAILOUTS = 1 << 2;
        /// Not emitted; re-executed from recover data on bailout.
        const RECOVERED_ON_BAILOUT = 1 << 3;
        /// A removed consumer observed this value; it is not dead.
        const IMPLICITLY_USED = 1 << 4;
        /// Scratch bit for worklists.
        const IN_WORKLIST = 1 << 5;
        /// Removed from its block; the node only lives on in the arena.
        const DISCARDED = 1 << 6;
        /// Lowered at each use rather than once.
        const EMITTED_AT_USES = 1 << 7;
        /// An allocation whose slots are still being initialized.
        const INCOMPLETE_OBJECT = 1 << 8;
    }
}

// =============================================================================
// Truncation lattice
// =============================================================================

/// How strongly a value may be treated as a wrapped int32.
///
/// Ordered: `NoTruncate < TruncateAfterBailouts < IndirectTruncate < Truncate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum TruncateKind {
    /// Exact result required.
    #[default]
    NoTruncate = 0,
    /// Truncation is fine once bailout checks have passed.
    TruncateAfterBailouts = 1,
    /// Only consumers that truncate observe the result, through other
    /// arithmetic.
    IndirectTruncate = 2,
    /// Every consumer truncates.
    Truncate = 3,
}

impl TruncateKind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(TruncateKind::NoTruncate),
            1 => Some(TruncateKind::TruncateAfterBailouts),
            2 => Some(TruncateKind::IndirectTruncate),
            3 => Some(TruncateKind::Truncate),
            _ => None,
        }
    }

    /// Whether any truncation is allowed.
    #[inline]
    pub const fn is_truncated(self) -> bool {
        !matches!(self, TruncateKind::NoTruncate)
    }
}

/// Why a guard may bail out. Carried for diagnostics and the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BailoutKind {
    #[default]
    Unknown = 0,
    Inevitable,
    Overflow,
    NegativeZero,
    DivideByZero,
    Bounds,
    ShapeGuard,
    ValueGuard,
    UnboxFolding,
    PrecisionLoss,
    NonInt32Input,
    NotNullOrUndefined,
}

// =============================================================================
// Use edges
// =============================================================================

/// The node on the consuming side of a use edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consumer {
    Definition(DefId),
    ResumePoint(ResumePointId),
    /// An entry of a resume point's store-recovery list.
    Store(StoreId),
}

impl Consumer {
    #[inline]
    pub fn as_definition(self) -> Option<DefId> {
        match self {
            Consumer::Definition(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn is_definition(self) -> bool {
        matches!(self, Consumer::Definition(_))
    }

    /// Resume-point bookkeeping, including store-recovery entries.
    #[inline]
    pub fn is_resume_point(self) -> bool {
        !self.is_definition()
    }
}

/// A directed producer to consumer edge.
#[derive(Debug, Clone, Copy)]
pub struct Use {
    pub(crate) producer: DefId,
    pub(crate) consumer: Consumer,
    /// Operand position within the consumer.
    pub(crate) index: u32,
    /// Cleared once the edge has been removed from its consumer.
    pub(crate) live: bool,
}

impl Use {
    #[inline]
    pub fn producer(&self) -> DefId {
        self.producer
    }

    #[inline]
    pub fn consumer(&self) -> Consumer {
        self.consumer
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }
}

// =============================================================================
// Definition
// =============================================================================

/// An SSA value.
#[derive(Debug, Clone)]
pub struct Definition {
    pub(crate) op: Op,
    pub(crate) ty: MirType,
    pub(crate) operands: SmallVec<[UseId; 3]>,
    /// Oldest first; iteration APIs walk it backwards.
    pub(crate) uses: Vec<UseId>,
    pub(crate) flags: DefFlags,
    pub(crate) block: Option<BlockId>,
    pub(crate) dependency: Option<DefId>,
    pub(crate) range: Option<Range>,
    pub(crate) bailout_kind: BailoutKind,
    pub(crate) truncate_kind: TruncateKind,
    pub(crate) resume_point: Option<ResumePointId>,
}

impl Definition {
    pub(crate) fn new(op: Op, ty: MirType) -> Self {
        Definition {
            op,
            ty,
            operands: SmallVec::new(),
            uses: Vec::new(),
            flags: DefFlags::empty(),
            block: None,
            dependency: None,
            range: None,
            bailout_kind: BailoutKind::Unknown,
            truncate_kind: TruncateKind::NoTruncate,
            resume_point: None,
        }
    }

    #[inline]
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Mutable access to opcode-specific fields. The opcode itself must not
    /// change.
    #[inline]
    pub fn op_mut(&mut self) -> &mut Op {
        &mut self.op
    }

    #[inline]
    pub fn ty(&self) -> MirType {
        self.ty
    }

    #[inline]
    pub fn flags(&self) -> DefFlags {
        self.flags
    }

    #[inline]
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    #[inline]
    pub fn dependency(&self) -> Option<DefId> {
        self.dependency
    }

    #[inline]
    pub fn range(&self) -> Option<&Range> {
        self.range.as_ref()
    }

    #[inline]
    pub fn bailout_kind(&self) -> BailoutKind {
        self.bailout_kind
    }

    #[inline]
    pub fn truncate_kind(&self) -> TruncateKind {
        self.truncate_kind
    }

    #[inline]
    pub fn resume_point(&self) -> Option<ResumePointId> {
        self.resume_point
    }

    #[inline]
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    #[inline]
    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self.op, Op::Constant(_))
    }

    #[inline]
    pub fn is_phi(&self) -> bool {
        matches!(self.op, Op::Phi(_))
    }

    #[inline]
    pub fn is_guard(&self) -> bool {
        self.flags.contains(DefFlags::GUARD)
    }

    #[inline]
    pub fn is_guard_range_bailouts(&self) -> bool {
        self.flags.contains(DefFlags::GUARD_RANGE_BAILOUTS)
    }

    #[inline]
    pub fn is_movable(&self) -> bool {
        self.flags.contains(DefFlags::MOVABLE)
    }

    #[inline]
    pub fn is_recovered_on_bailout(&self) -> bool {
        self.flags.contains(DefFlags::RECOVERED_ON_BAILOUT)
    }

    #[inline]
    pub fn is_implicitly_used(&self) -> bool {
        self.flags.contains(DefFlags::IMPLICITLY_USED)
    }

    #[inline]
    pub fn is_discarded(&self) -> bool {
        self.flags.contains(DefFlags::DISCARDED)
    }

    #[inline]
    pub fn set_flag(&mut self, flag: DefFlags) {
        self.flags.insert(flag);
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: DefFlags) {
        self.flags.remove(flag);
    }

    #[inline]
    pub fn set_dependency(&mut self, dep: Option<DefId>) {
        self.dependency = dep;
    }

    #[inline]
    pub fn set_range(&mut self, range: Option<Range>) {
        self.range = range;
    }

    #[inline]
    pub fn set_bailout_kind(&mut self, kind: BailoutKind) {
        self.bailout_kind = kind;
    }

    #[inline]
    pub fn set_truncate_kind(&mut self, kind: TruncateKind) {
        self.truncate_kind = kind;
    }

    /// Retype the definition. Used by specialization passes.
    #[inline]
    pub fn set_result_type(&mut self, ty: MirType) {
        self.ty = ty;
    }

    /// Truncated (any kind other than `NoTruncate`).
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.truncate_kind.is_truncated()
    }

    /// Truncated only through other arithmetic.
    #[inline]
    pub fn is_truncated_indirectly(&self) -> bool {
        self.truncate_kind == TruncateKind::IndirectTruncate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_kind_ordering() {
        assert!(TruncateKind::NoTruncate < TruncateKind::TruncateAfterBailouts);
        assert!(TruncateKind::TruncateAfterBailouts < TruncateKind::IndirectTruncate);
        assert!(TruncateKind::IndirectTruncate < TruncateKind::Truncate);
        assert!(!TruncateKind::NoTruncate.is_truncated());
        assert_eq!(TruncateKind::from_raw(3), Some(TruncateKind::Truncate));
        assert_eq!(TruncateKind::from_raw(4), None);
    }

    #[test]
    fn test_definition_flags() {
        let mut def = Definition::new(Op::Box, MirType::Value);
        assert!(!def.is_guard());
        def.set_flag(DefFlags::GUARD | DefFlags::MOVABLE);
        assert!(def.is_guard());
        assert!(def.is_movable());
        def.clear_flag(DefFlags::GUARD);
        assert!(!def.is_guard());
        assert!(def.is_movable());
    }

    #[test]
    fn test_consumer_kinds() {
        let def = Consumer::Definition(DefId::new(0));
        let rp = Consumer::ResumePoint(ResumePointId::new(0));
        assert!(def.is_definition());
        assert!(rp.is_resume_point());
        assert_eq!(rp.as_definition(), None);
    }
}
