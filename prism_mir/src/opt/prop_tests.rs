//! Property tests for the graph substrate and the local passes.
//!
//! 1. Congruence is an equivalence, congruent definitions hash equal, and
//!    distinct allocations are never congruent
//! 2. Folding a constant expression reaches a constant that folds to itself
//! 3. Replacing all uses moves exactly the prior use count
//! 4. Merging truncate kinds never lowers the recorded kind

use proptest::prelude::*;

use crate::config::MirConfig;
use crate::ir::block::BlockId;
use crate::ir::builder::NodeSpec;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::host::HostTable;
use crate::ir::node::{DefId, TruncateKind};
use crate::ir::types::MirType;
use crate::opt::congruence::{congruent_to, value_hash};
use crate::opt::fold::folds_to;
use crate::opt::simplify::Simplifier;
use crate::opt::truncate::merge_truncate_kind;
use crate::opt::OptimizationPass;

fn graph() -> (Graph, BlockId) {
    let mut g = Graph::new(HostTable::new(), MirConfig::default());
    let b = g.new_block();
    g.set_entry(b);
    (g, b)
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    BitAnd,
    BitOr,
    BitXor,
}

fn arb_binop() -> impl Strategy<Value = BinOp> {
    prop_oneof![
        Just(BinOp::Add),
        Just(BinOp::Sub),
        Just(BinOp::BitAnd),
        Just(BinOp::BitOr),
        Just(BinOp::BitXor),
    ]
}

fn spec(op: BinOp, lhs: DefId, rhs: DefId) -> NodeSpec {
    match op {
        BinOp::Add => NodeSpec::add(lhs, rhs, MirType::Int32),
        BinOp::Sub => NodeSpec::sub(lhs, rhs, MirType::Int32),
        BinOp::BitAnd => NodeSpec::bit_and(lhs, rhs),
        BinOp::BitOr => NodeSpec::bit_or(lhs, rhs),
        BinOp::BitXor => NodeSpec::bit_xor(lhs, rhs),
    }
}

fn eval(op: BinOp, lhs: i32, rhs: i32) -> i32 {
    match op {
        BinOp::Add => lhs + rhs,
        BinOp::Sub => lhs - rhs,
        BinOp::BitAnd => lhs & rhs,
        BinOp::BitOr => lhs | rhs,
        BinOp::BitXor => lhs ^ rhs,
    }
}

/// Constant expression tree with small leaves, so nothing overflows.
#[derive(Debug, Clone)]
enum Expr {
    Leaf(i32),
    Node(BinOp, Box<Expr>, Box<Expr>),
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = (-100i32..100).prop_map(Expr::Leaf);
    leaf.prop_recursive(4, 16, 2, |inner| {
        (arb_binop(), inner.clone(), inner)
            .prop_map(|(op, l, r)| Expr::Node(op, Box::new(l), Box::new(r)))
    })
}

impl Expr {
    fn value(&self) -> i32 {
        match self {
            Expr::Leaf(v) => *v,
            Expr::Node(op, l, r) => eval(*op, l.value(), r.value()),
        }
    }

    fn build(&self, g: &mut Graph, b: BlockId) -> DefId {
        match self {
            Expr::Leaf(v) => g.push(b, NodeSpec::constant(Constant::Int32(*v))),
            Expr::Node(op, l, r) => {
                let l = l.build(g, b);
                let r = r.build(g, b);
                g.push(b, spec(*op, l, r))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_congruence_is_equivalence(
        ops in prop::collection::vec((arb_binop(), 0usize..3, 0usize..3), 1..12),
        arrays in 0usize..3,
        objects in 0usize..3,
    ) {
        let (mut g, b) = graph();
        let params: Vec<DefId> = (0..3)
            .map(|i| g.push(b, NodeSpec::parameter(i, MirType::Int32)))
            .collect();
        let mut defs: Vec<DefId> = ops
            .iter()
            .map(|&(op, l, r)| g.push(b, spec(op, params[l], params[r])))
            .collect();
        let shape = g.host().new_shape(1);
        let mut allocations: Vec<DefId> = (0..arrays)
            .map(|_| g.push(b, NodeSpec::new_array(4)))
            .collect();
        for _ in 0..objects {
            allocations.push(g.push(b, NodeSpec::new_object(shape)));
        }
        defs.extend(&allocations);

        for &x in &allocations {
            for &y in &allocations {
                prop_assert_eq!(congruent_to(&g, x, y), x == y);
            }
        }

        for &a in &defs {
            prop_assert!(congruent_to(&g, a, a));
            for &c in &defs {
                let ac = congruent_to(&g, a, c);
                prop_assert_eq!(ac, congruent_to(&g, c, a));
                if ac {
                    prop_assert_eq!(value_hash(&g, a), value_hash(&g, c));
                    for &d in &defs {
                        if congruent_to(&g, c, d) {
                            prop_assert!(congruent_to(&g, a, d));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn prop_constant_expression_folds(expr in arb_expr()) {
        let (mut g, b) = graph();
        let root = expr.build(&mut g, b);
        let ret = g.push(b, NodeSpec::return_(root));

        Simplifier::new().run(&mut g).unwrap();
        let result = g.operand(ret, 0);
        prop_assert_eq!(g.as_int32(result), Some(expr.value()));
        prop_assert_eq!(folds_to(&mut g, result).unwrap(), result);
        prop_assert!(g.verify().is_ok());
    }

    #[test]
    fn prop_replace_all_uses_moves_count(
        consumers in prop::collection::vec((any::<bool>(), any::<bool>()), 0..10),
        extra_uses_of_target in 0usize..3,
    ) {
        let (mut g, b) = graph();
        let from = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let to = g.push(b, NodeSpec::parameter(1, MirType::Int32));
        for _ in 0..extra_uses_of_target {
            g.push(b, NodeSpec::add(to, to, MirType::Int32));
        }
        for &(l, r) in &consumers {
            let lhs = if l { from } else { to };
            let rhs = if r { from } else { to };
            g.push(b, NodeSpec::add(lhs, rhs, MirType::Int32));
        }

        let moved = g.use_count(from);
        let before = g.use_count(to);
        if moved > 0 {
            g.replace_all_uses_with(from, to);
        }
        prop_assert_eq!(g.use_count(from), 0);
        prop_assert_eq!(g.use_count(to), before + moved);
        prop_assert!(g.verify().is_ok());
    }

    #[test]
    fn prop_truncate_kind_merge_is_monotone(kinds in prop::collection::vec(0u8..4, 1..8)) {
        let (mut g, b) = graph();
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let add = g.push(b, NodeSpec::add(x, x, MirType::Int32));

        let mut highest = TruncateKind::NoTruncate;
        for raw in kinds {
            let kind = TruncateKind::from_raw(raw).unwrap();
            highest = highest.max(kind);
            let merged = merge_truncate_kind(&mut g, add, kind);
            prop_assert_eq!(merged, highest);
            prop_assert!(merged >= kind);
            prop_assert_eq!(g.def(add).truncate_kind(), highest);
        }
    }
}
