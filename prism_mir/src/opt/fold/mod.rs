//! Local simplification ("folds-to").
//!
//! [`folds_to`] inspects one definition and returns an equivalent, simpler
//! definition, or the definition itself when no rule applies. Rules never
//! edit the consumers of the folded node; redirecting uses is the caller's
//! job (see [`Simplifier`](crate::opt::simplify::Simplifier)).
//!
//! # Placement
//!
//! - Helper nodes a rule allocates are placed immediately before the folded
//!   definition (at the top of the block when folding a phi).
//! - A value replacement is either an existing definition or a new node
//!   already placed the same way.
//! - A control replacement (`Goto`, or a rewritten `Test`) is returned
//!   unplaced and is installed with
//!   [`Graph::replace_control_instruction`].
//!
//! Rules that meet an operand type they do not handle decline.

mod arith;
mod bitwise;
mod compare;
mod control;
mod convert;
mod guards;
mod math;
mod memory;
mod phi;

use tracing::trace;

use crate::error::MirResult;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::Opcode;

pub use arith::{evaluate_constant_operands, evaluate_int64_operands};
pub use memory::folds_to_store;

/// Simplify `ins`. Returns `ins` itself when nothing applies.
///
/// Fails only when a fallible allocation for a helper node fails.
pub fn folds_to(g: &mut Graph, ins: DefId) -> MirResult<DefId> {
    if g.def(ins).is_discarded() {
        return Ok(ins);
    }
    let opcode = g.opcode(ins);
    let folded = match opcode {
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
            arith::fold(g, ins)?
        }

        Opcode::Abs
        | Opcode::MinMax
        | Opcode::Pow
        | Opcode::PowHalf
        | Opcode::Sqrt
        | Opcode::Sign
        | Opcode::MathFunction
        | Opcode::Hypot
        | Opcode::NaNToZero
        | Opcode::Clz
        | Opcode::Ctz
        | Opcode::Popcnt => math::fold(g, ins)?,

        Opcode::BitAnd
        | Opcode::BitOr
        | Opcode::BitXor
        | Opcode::BitNot
        | Opcode::Lsh
        | Opcode::Rsh
        | Opcode::Ursh
        | Opcode::SignExtendInt32
        | Opcode::SignExtendInt64 => bitwise::fold(g, ins)?,

        Opcode::Box
        | Opcode::Unbox
        | Opcode::ToDouble
        | Opcode::ToFloat32
        | Opcode::ToNumberInt32
        | Opcode::TruncateToInt32
        | Opcode::ToInt64
        | Opcode::Int32ToIntPtr
        | Opcode::WrapInt64ToInt32
        | Opcode::ExtendInt32ToInt64
        | Opcode::BooleanToInt32
        | Opcode::ClampToUint8
        | Opcode::LimitedTruncate
        | Opcode::ToString
        | Opcode::Int64ToBigInt
        | Opcode::TruncateBigIntToInt64
        | Opcode::ReinterpretCast
        | Opcode::StringLength
        | Opcode::Concat => convert::fold(g, ins)?,

        Opcode::Compare | Opcode::Not | Opcode::SameValue | Opcode::SameValueDouble => {
            compare::fold(g, ins)?
        }

        Opcode::Test | Opcode::TableSwitch => control::fold(g, ins)?,

        Opcode::LoadFixedSlot
        | Opcode::LoadDynamicSlot
        | Opcode::LoadElement
        | Opcode::BoundsCheck
        | Opcode::ArrayLength
        | Opcode::InitializedLength => memory::fold(g, ins)?,

        Opcode::GuardValue
        | Opcode::GuardNullOrUndefined
        | Opcode::GuardIsNotObject
        | Opcode::GuardObjectIdentity
        | Opcode::GuardSpecificAtom
        | Opcode::GuardSpecificSymbol
        | Opcode::GuardSpecificInt32
        | Opcode::GuardInt32IsNonNegative
        | Opcode::GuardInt32Range
        | Opcode::GuardShape => guards::fold(g, ins)?,

        Opcode::Phi => phi::fold(g, ins)?,

        Opcode::Constant
        | Opcode::Parameter
        | Opcode::Slots
        | Opcode::Elements
        | Opcode::SetInitializedLength
        | Opcode::StoreFixedSlot
        | Opcode::StoreDynamicSlot
        | Opcode::StoreElement
        | Opcode::ArrayPush
        | Opcode::NewObject
        | Opcode::NewArray
        | Opcode::ObjectState
        | Opcode::Call
        | Opcode::Random
        | Opcode::Throw
        | Opcode::Goto
        | Opcode::Return => None,
    };

    match folded {
        Some(replacement) if replacement != ins => {
            trace!(
                "fold {} {:?} -> {:?}",
                opcode,
                ins,
                replacement
            );
            Ok(replacement)
        }
        _ => Ok(ins),
    }
}

// =============================================================================
// Helpers shared by the rules
// =============================================================================

/// Allocate `spec` and place it before `at`. A phi's helpers go to the top
/// of its block; helpers of an unplaced node stay unplaced.
pub(crate) fn emit(g: &mut Graph, at: DefId, spec: NodeSpec) -> MirResult<DefId> {
    let def = g.try_add_node(spec)?;
    if let Some(block) = g.def(at).block() {
        if g.def(at).is_phi() {
            g.insert_at_start(block, def);
        } else {
            g.insert_before(at, def);
        }
    }
    Ok(def)
}

pub(crate) fn emit_constant(g: &mut Graph, at: DefId, c: Constant) -> MirResult<DefId> {
    emit(g, at, NodeSpec::constant(c))
}

pub(crate) fn emit_bool(g: &mut Graph, at: DefId, value: bool) -> MirResult<Option<DefId>> {
    emit_constant(g, at, Constant::Boolean(value)).map(Some)
}

/// Allocate an unplaced control instruction.
pub(crate) fn new_control(g: &mut Graph, spec: NodeSpec) -> MirResult<Option<DefId>> {
    g.try_add_node(spec).map(Some)
}
