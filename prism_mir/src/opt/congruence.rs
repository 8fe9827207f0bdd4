//! Congruence: the equivalence a global value numbering pass merges by.
//!
//! Two distinct definitions are congruent when they compute the same value
//! from the same inputs:
//!
//! - same opcode, result type and opcode-specific fields
//! - neither writes memory nor allocates
//! - equal operand lists, compared in sorted order for commutative ops
//! - the same load dependency
//! - phis additionally live in the same block
//!
//! Every clause is an equality on a projection of the definition, so the
//! relation is an equivalence. [`value_hash`] hashes the same projection;
//! congruent definitions hash equal.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::Op;
use crate::opt::alias::alias_set;

/// Operands in the order congruence compares them.
fn normalized_operands(g: &Graph, def: DefId) -> SmallVec<[DefId; 3]> {
    let mut ops = g.operands(def);
    if g.opcode(def).is_commutative() && ops.len() == 2 && ops[1] < ops[0] {
        ops.swap(0, 1);
    }
    ops
}

/// Whether `def` may take part in value numbering at all.
#[inline]
fn is_numberable(g: &Graph, def: DefId) -> bool {
    // Each allocation is a distinct object.
    if matches!(g.op(def), Op::NewObject { .. } | Op::NewArray { .. } | Op::ObjectState) {
        return false;
    }
    !alias_set(g, def).is_store() && !g.opcode(def).is_control()
}

/// Whether `a` and `b` compute the same value. Reflexive for every
/// definition; effectful definitions are congruent only to themselves.
pub fn congruent_to(g: &Graph, a: DefId, b: DefId) -> bool {
    if a == b {
        return true;
    }
    if !is_numberable(g, a) || !is_numberable(g, b) {
        return false;
    }
    let (da, db) = (g.def(a), g.def(b));
    if da.op().opcode() != db.op().opcode() || da.ty() != db.ty() {
        return false;
    }
    if da.op() != db.op() || da.dependency() != db.dependency() {
        return false;
    }
    if da.is_phi() && da.block() != db.block() {
        return false;
    }
    normalized_operands(g, a) == normalized_operands(g, b)
}

/// Hash of the fields [`congruent_to`] compares.
pub fn value_hash(g: &Graph, def: DefId) -> u64 {
    let mut h = FxHasher::default();
    let d = g.def(def);
    d.op().opcode().hash(&mut h);
    d.ty().hash(&mut h);
    for op in normalized_operands(g, def) {
        op.hash(&mut h);
    }
    d.dependency().hash(&mut h);
    if d.is_phi() {
        d.block().hash(&mut h);
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::builder::NodeSpec;
    use crate::ir::constant::Constant;
    use crate::ir::host::HostTable;
    use crate::ir::opcode::{CompareOp, CompareType};
    use crate::ir::types::MirType;

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    #[test]
    fn test_commutative_operands() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let y = g.add_node(NodeSpec::parameter(1, MirType::Int32));
        let a = g.add_node(NodeSpec::add(x, y, MirType::Int32));
        let b = g.add_node(NodeSpec::add(y, x, MirType::Int32));
        assert!(congruent_to(&g, a, b));
        assert_eq!(value_hash(&g, a), value_hash(&g, b));

        let s1 = g.add_node(NodeSpec::sub(x, y, MirType::Int32));
        let s2 = g.add_node(NodeSpec::sub(y, x, MirType::Int32));
        assert!(!congruent_to(&g, s1, s2));
    }

    #[test]
    fn test_type_and_fields_discriminate() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Double));
        let y = g.add_node(NodeSpec::parameter(1, MirType::Double));
        let a = g.add_node(NodeSpec::add(x, y, MirType::Double));
        let b = g.add_node(NodeSpec::add(x, y, MirType::Int32));
        assert!(!congruent_to(&g, a, b));

        let lt = g.add_node(NodeSpec::compare(x, y, CompareOp::Lt, CompareType::Double));
        let le = g.add_node(NodeSpec::compare(x, y, CompareOp::Le, CompareType::Double));
        let lt2 = g.add_node(NodeSpec::compare(x, y, CompareOp::Lt, CompareType::Double));
        assert!(!congruent_to(&g, lt, le));
        assert!(congruent_to(&g, lt, lt2));
    }

    #[test]
    fn test_fixed_slot_loads() {
        let mut g = graph();
        let obj = g.add_node(NodeSpec::parameter(0, MirType::Object));
        let a = g.add_node(NodeSpec::load_fixed_slot(obj, 1, MirType::Value));
        let b = g.add_node(NodeSpec::load_fixed_slot(obj, 1, MirType::Value));
        let c = g.add_node(NodeSpec::load_fixed_slot(obj, 2, MirType::Value));
        assert!(congruent_to(&g, a, b));
        assert!(!congruent_to(&g, a, c));

        let v = g.add_node(NodeSpec::constant(Constant::Int32(0)));
        let store = g.add_node(NodeSpec::store_fixed_slot(obj, v, 1));
        g.def_mut(b).set_dependency(Some(store));
        assert!(!congruent_to(&g, a, b));
    }

    #[test]
    fn test_effectful_only_self_congruent() {
        let mut g = graph();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Value));
        let c1 = g.add_node(NodeSpec::call(&[x], MirType::Value));
        let c2 = g.add_node(NodeSpec::call(&[x], MirType::Value));
        assert!(congruent_to(&g, c1, c1));
        assert!(!congruent_to(&g, c1, c2));
    }

    #[test]
    fn test_phis_need_same_block() {
        let mut g = graph();
        let b1 = g.new_block();
        let b2 = g.new_block();
        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let mk = |g: &mut Graph, b| {
            let phi = g.add_node(NodeSpec::phi(MirType::Int32));
            g.add_phi(b, phi);
            g.add_operand(phi, x);
            phi
        };
        let p1 = mk(&mut g, b1);
        let p2 = mk(&mut g, b1);
        let p3 = mk(&mut g, b2);
        assert!(congruent_to(&g, p1, p2));
        assert!(!congruent_to(&g, p1, p3));
    }

    #[test]
    fn test_allocations_never_congruent() {
        let mut g = graph();
        let shape = g.host().new_shape(2);
        let o1 = g.add_node(NodeSpec::new_object(shape));
        let o2 = g.add_node(NodeSpec::new_object(shape));
        let a1 = g.add_node(NodeSpec::new_array(4));
        let a2 = g.add_node(NodeSpec::new_array(4));
        assert!(!congruent_to(&g, o1, o2));
        assert!(!congruent_to(&g, a1, a2));
        assert!(congruent_to(&g, o1, o1));
        assert!(congruent_to(&g, a2, a2));

        let x = g.add_node(NodeSpec::parameter(0, MirType::Int32));
        let s1 = g.add_node(NodeSpec::object_state(o1, &[x, x]));
        let s2 = g.add_node(NodeSpec::object_state(o1, &[x, x]));
        assert!(!congruent_to(&g, s1, s2));
    }

    #[test]
    fn test_constants_by_bits() {
        let mut g = graph();
        let a = g.add_node(NodeSpec::constant(Constant::Double(f64::NAN)));
        let b = g.add_node(NodeSpec::constant(Constant::Double(f64::NAN)));
        let z = g.add_node(NodeSpec::constant(Constant::Double(0.0)));
        let nz = g.add_node(NodeSpec::constant(Constant::Double(-0.0)));
        assert!(congruent_to(&g, a, b));
        assert!(!congruent_to(&g, z, nz));
    }
}
