//! Per-opcode memory effects and load/store alias refinement.
//!
//! [`alias_set`] is the single place that says what each opcode reads and
//! writes. Anything not listed conservatively writes everything.
//! [`might_alias`] answers whether a given store can change what a given
//! load observes, first by category intersection and then by comparing
//! the addressed locations.

use crate::ir::alias::{AliasFlags, AliasSet, AliasType};
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::{CompareType, Op};

/// Memory effect of `def`.
pub fn alias_set(g: &Graph, def: DefId) -> AliasSet {
    match g.op(def) {
        Op::Constant(_)
        | Op::Parameter { .. }
        | Op::Phi(_)
        | Op::Box
        | Op::Unbox { .. }
        | Op::Add(_)
        | Op::Sub(_)
        | Op::Mul(_)
        | Op::Div(_)
        | Op::Mod(_)
        | Op::Abs { .. }
        | Op::MinMax { .. }
        | Op::Pow
        | Op::PowHalf
        | Op::Sqrt
        | Op::Sign
        | Op::MathFunction { .. }
        | Op::Hypot
        | Op::NaNToZero { .. }
        | Op::Clz { .. }
        | Op::Ctz { .. }
        | Op::Popcnt
        | Op::BitAnd
        | Op::BitOr
        | Op::BitXor
        | Op::BitNot
        | Op::Lsh
        | Op::Rsh
        | Op::Ursh { .. }
        | Op::SignExtendInt32 { .. }
        | Op::SignExtendInt64 { .. }
        | Op::ToDouble
        | Op::ToFloat32 { .. }
        | Op::ToNumberInt32 { .. }
        | Op::TruncateToInt32
        | Op::ToInt64
        | Op::Int32ToIntPtr
        | Op::WrapInt64ToInt32 { .. }
        | Op::ExtendInt32ToInt64 { .. }
        | Op::BooleanToInt32
        | Op::ClampToUint8
        | Op::LimitedTruncate { .. }
        | Op::ToString
        | Op::Int64ToBigInt { .. }
        | Op::TruncateBigIntToInt64
        | Op::ReinterpretCast
        | Op::Not
        | Op::SameValue
        | Op::SameValueDouble
        | Op::StringLength
        | Op::Concat
        | Op::BoundsCheck { .. }
        | Op::NewObject { .. }
        | Op::NewArray { .. }
        | Op::ObjectState
        | Op::GuardValue { .. }
        | Op::GuardNullOrUndefined
        | Op::GuardIsNotObject
        | Op::GuardObjectIdentity { .. }
        | Op::GuardSpecificAtom { .. }
        | Op::GuardSpecificSymbol { .. }
        | Op::GuardSpecificInt32 { .. }
        | Op::GuardInt32IsNonNegative
        | Op::GuardInt32Range { .. }
        | Op::Goto { .. }
        | Op::Test { .. }
        | Op::TableSwitch { .. }
        | Op::Return => AliasSet::none(),

        // Generic comparison may call user code.
        Op::Compare { compare_type, .. } => {
            if *compare_type == CompareType::Unknown {
                AliasSet::default()
            } else {
                AliasSet::none()
            }
        }

        Op::Slots | Op::Elements | Op::InitializedLength | Op::ArrayLength | Op::GuardShape { .. } => {
            AliasSet::load(AliasFlags::OBJECT_FIELDS)
        }
        Op::SetInitializedLength => AliasSet::store(AliasFlags::OBJECT_FIELDS),
        Op::LoadFixedSlot { .. } => AliasSet::load(AliasFlags::FIXED_SLOT),
        Op::StoreFixedSlot { .. } => AliasSet::store(AliasFlags::FIXED_SLOT),
        Op::LoadDynamicSlot { .. } => AliasSet::load(AliasFlags::DYNAMIC_SLOT),
        Op::StoreDynamicSlot { .. } => AliasSet::store(AliasFlags::DYNAMIC_SLOT),
        Op::LoadElement { .. } => AliasSet::load(AliasFlags::ELEMENT),
        Op::StoreElement { .. } => AliasSet::store(AliasFlags::ELEMENT),
        Op::ArrayPush => AliasSet::store(AliasFlags::OBJECT_FIELDS | AliasFlags::ELEMENT),

        Op::Random => AliasSet::store(AliasFlags::RNG),
        Op::Throw => AliasSet::store(AliasFlags::EXCEPTION_STATE),
        Op::Call { .. } => AliasSet::default(),
    }
}

/// Whether `store` may write what `load` reads.
pub fn might_alias(g: &Graph, load: DefId, store: DefId) -> AliasType {
    let load_set = alias_set(g, load);
    let store_set = alias_set(g, store);
    if !load_set.is_load() || !store_set.is_store() || !load_set.intersects(store_set) {
        return AliasType::NoAlias;
    }

    match (g.op(load), g.op(store)) {
        (Op::LoadFixedSlot { slot: ls }, Op::StoreFixedSlot { slot: ss, .. })
        | (Op::LoadDynamicSlot { slot: ls }, Op::StoreDynamicSlot { slot: ss, .. }) => {
            if ls != ss {
                return AliasType::NoAlias;
            }
            if g.operand(load, 0) != g.operand(store, 0) {
                return AliasType::MayAlias;
            }
            AliasType::MustAlias
        }
        (Op::LoadElement { .. }, Op::StoreElement { .. }) => {
            if g.operand(load, 0) != g.operand(store, 0) {
                return AliasType::MayAlias;
            }
            let (li, si) = (g.operand(load, 1), g.operand(store, 1));
            if li == si {
                return AliasType::MustAlias;
            }
            if definitely_different_value(g, li, si) {
                AliasType::NoAlias
            } else {
                AliasType::MayAlias
            }
        }
        _ => AliasType::MayAlias,
    }
}

/// Whether `a` and `b` provably hold different values, looking through
/// conversions and bounds checks that pass their input through.
pub fn definitely_different_value(g: &Graph, a: DefId, b: DefId) -> bool {
    if a == b {
        return false;
    }
    if matches!(g.op(a), Op::ToNumberInt32 { .. } | Op::BoundsCheck { .. }) {
        return definitely_different_value(g, g.operand(a, 0), b);
    }
    if matches!(g.op(b), Op::ToNumberInt32 { .. } | Op::BoundsCheck { .. }) {
        return definitely_different_value(g, a, g.operand(b, 0));
    }
    match (g.as_constant(a), g.as_constant(b)) {
        (Some(ca), Some(cb)) => ca != cb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::builder::NodeSpec;
    use crate::ir::constant::Constant;
    use crate::ir::host::HostTable;
    use crate::ir::types::MirType;

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    #[test]
    fn test_pure_ops_have_no_effect() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let add = g.add_node(NodeSpec::add(a, a, MirType::Int32));
        assert!(alias_set(&g, add).is_none());
        assert!(!g.is_effectful(add));

        let call = g.add_node(NodeSpec::call(&[a], MirType::Value));
        assert_eq!(alias_set(&g, call), AliasSet::default());
        assert!(g.is_effectful(call));
    }

    #[test]
    fn test_fixed_slot_alias_refinement() {
        let mut g = graph();
        let obj = g.add_node(NodeSpec::parameter(0, MirType::Object));
        let other = g.add_node(NodeSpec::parameter(1, MirType::Object));
        let v = g.add_node(NodeSpec::constant(Constant::Int32(1)));
        let store = g.add_node(NodeSpec::store_fixed_slot(obj, v, 2));
        let same = g.add_node(NodeSpec::load_fixed_slot(obj, 2, MirType::Value));
        let diff_slot = g.add_node(NodeSpec::load_fixed_slot(obj, 3, MirType::Value));
        let diff_obj = g.add_node(NodeSpec::load_fixed_slot(other, 2, MirType::Value));

        assert_eq!(might_alias(&g, same, store), AliasType::MustAlias);
        assert_eq!(might_alias(&g, diff_slot, store), AliasType::NoAlias);
        assert_eq!(might_alias(&g, diff_obj, store), AliasType::MayAlias);
    }

    #[test]
    fn test_disjoint_categories_do_not_alias() {
        let mut g = graph();
        let obj = g.add_node(NodeSpec::parameter(0, MirType::Object));
        let v = g.add_node(NodeSpec::constant(Constant::Int32(1)));
        let store = g.add_node(NodeSpec::store_fixed_slot(obj, v, 0));
        let slots = g.add_node(NodeSpec::slots(obj));
        let load = g.add_node(NodeSpec::load_dynamic_slot(slots, 0, MirType::Value));
        assert_eq!(might_alias(&g, load, store), AliasType::NoAlias);

        let call = g.add_node(NodeSpec::call(&[], MirType::Value));
        assert_eq!(might_alias(&g, load, call), AliasType::MayAlias);
    }

    #[test]
    fn test_element_indices() {
        let mut g = graph();
        let obj = g.add_node(NodeSpec::parameter(0, MirType::Object));
        let elems = g.add_node(NodeSpec::elements(obj));
        let zero = g.add_node(NodeSpec::constant(Constant::Int32(0)));
        let one = g.add_node(NodeSpec::constant(Constant::Int32(1)));
        let v = g.add_node(NodeSpec::parameter(1, MirType::Value));
        let store = g.add_node(NodeSpec::store_element(elems, zero, v));
        let len = g.add_node(NodeSpec::initialized_length(elems));
        let checked = g.add_node(NodeSpec::bounds_check(one, len));
        let load = g.add_node(NodeSpec::load_element(elems, checked, MirType::Value));
        let load_same = g.add_node(NodeSpec::load_element(elems, zero, MirType::Value));

        assert_eq!(might_alias(&g, load, store), AliasType::NoAlias);
        assert_eq!(might_alias(&g, load_same, store), AliasType::MustAlias);
    }
}
