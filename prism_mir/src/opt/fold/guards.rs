//! Guards whose input already satisfies them fold to the input.

use std::cmp::Ordering;

use crate::error::MirResult;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::DefId;
use crate::ir::opcode::Op;
use crate::ir::types::MirType;

pub(super) fn fold(g: &mut Graph, ins: DefId) -> MirResult<Option<DefId>> {
    Ok(fold_guard(g, ins))
}

fn fold_guard(g: &Graph, ins: DefId) -> Option<DefId> {
    let input = g.operand(ins, 0);
    let input_ty = g.ty(input);
    let satisfied = match *g.op(ins) {
        Op::GuardNullOrUndefined => input_ty.is_null_or_undefined(),
        Op::GuardIsNotObject => input_ty != MirType::Object && input_ty != MirType::Value,
        Op::GuardObjectIdentity { bail_on_equality } => {
            let expected = g.operand(ins, 1);
            if bail_on_equality {
                matches!(
                    (g.as_constant(input), g.as_constant(expected)),
                    (Some(Constant::Object(a)), Some(Constant::Object(b))) if a != b
                )
            } else {
                input == expected
            }
        }
        ref op => {
            let c = g.as_constant(input)?;
            constant_satisfies(g, op, c)
        }
    };
    satisfied.then_some(input)
}

fn constant_satisfies(g: &Graph, op: &Op, c: Constant) -> bool {
    match (op, c) {
        (Op::GuardValue { expected }, _) => *expected == c,
        (Op::GuardShape { shape }, Constant::Object(obj)) => {
            g.host().object_shape(obj) == Some(*shape)
        }
        (Op::GuardSpecificAtom { atom }, Constant::String(s)) => {
            s == *atom || g.host().compare_strings(s, *atom) == Some(Ordering::Equal)
        }
        (Op::GuardSpecificSymbol { symbol }, Constant::Symbol(s)) => s == *symbol,
        (Op::GuardSpecificInt32 { expected }, Constant::Int32(v)) => v == *expected,
        (Op::GuardInt32IsNonNegative, Constant::Int32(v)) => v >= 0,
        (Op::GuardInt32Range { min, max }, Constant::Int32(v)) => *min <= v && v <= *max,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::folds_to;
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::builder::NodeSpec;
    use crate::ir::host::HostTable;

    fn graph() -> Graph {
        Graph::new(HostTable::new(), MirConfig::default())
    }

    #[test]
    fn test_int32_guards_on_constants() {
        let mut g = graph();
        let b = g.new_block();
        let five = g.push(b, NodeSpec::constant(Constant::Int32(5)));
        let minus = g.push(b, NodeSpec::constant(Constant::Int32(-5)));

        let guard = g.push(b, NodeSpec::guard_specific_int32(five, 5));
        assert_eq!(folds_to(&mut g, guard).unwrap(), five);
        let guard = g.push(b, NodeSpec::guard_specific_int32(five, 6));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);

        let guard = g.push(b, NodeSpec::guard_int32_is_non_negative(five));
        assert_eq!(folds_to(&mut g, guard).unwrap(), five);
        let guard = g.push(b, NodeSpec::guard_int32_is_non_negative(minus));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);

        let guard = g.push(b, NodeSpec::guard_int32_range(minus, -10, 0));
        assert_eq!(folds_to(&mut g, guard).unwrap(), minus);
        let guard = g.push(b, NodeSpec::guard_int32_range(five, -10, 0));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);
    }

    #[test]
    fn test_guard_value_and_atom() {
        let host = HostTable::new();
        let atom = host.intern_string("length");
        let mut g = Graph::new(host, MirConfig::default());
        let b = g.new_block();
        let s = g.push(b, NodeSpec::constant(Constant::String(atom)));
        let guard = g.push(b, NodeSpec::guard_specific_atom(s, atom));
        assert_eq!(folds_to(&mut g, guard).unwrap(), s);

        let t = g.push(b, NodeSpec::constant(Constant::Boolean(true)));
        let guard = g.push(b, NodeSpec::guard_value(t, Constant::Boolean(true)));
        assert_eq!(folds_to(&mut g, guard).unwrap(), t);
        let guard = g.push(b, NodeSpec::guard_value(t, Constant::Boolean(false)));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);
    }

    #[test]
    fn test_guard_shape_of_constant_object() {
        let host = HostTable::new();
        let shape = host.new_shape(2);
        let other = host.new_shape(4);
        let obj = host.new_object(shape);
        let mut g = Graph::new(host, MirConfig::default());
        let b = g.new_block();
        let c = g.push(b, NodeSpec::constant(Constant::Object(obj)));
        let guard = g.push(b, NodeSpec::guard_shape(c, shape));
        assert_eq!(folds_to(&mut g, guard).unwrap(), c);
        let guard = g.push(b, NodeSpec::guard_shape(c, other));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);
    }

    #[test]
    fn test_type_guards() {
        let mut g = graph();
        let b = g.new_block();
        let undef = g.push(b, NodeSpec::parameter(0, MirType::Undefined));
        let obj = g.push(b, NodeSpec::parameter(1, MirType::Object));
        let val = g.push(b, NodeSpec::parameter(2, MirType::Value));

        let guard = g.push(b, NodeSpec::guard_null_or_undefined(undef));
        assert_eq!(folds_to(&mut g, guard).unwrap(), undef);
        let guard = g.push(b, NodeSpec::guard_null_or_undefined(val));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);

        let guard = g.push(b, NodeSpec::guard_is_not_object(undef));
        assert_eq!(folds_to(&mut g, guard).unwrap(), undef);
        let guard = g.push(b, NodeSpec::guard_is_not_object(obj));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);
    }

    #[test]
    fn test_object_identity() {
        let mut g = graph();
        let b = g.new_block();
        let obj = g.push(b, NodeSpec::parameter(0, MirType::Object));
        let guard = g.push(b, NodeSpec::guard_object_identity(obj, obj, false));
        assert_eq!(folds_to(&mut g, guard).unwrap(), obj);
        let guard = g.push(b, NodeSpec::guard_object_identity(obj, obj, true));
        assert_eq!(folds_to(&mut g, guard).unwrap(), guard);
    }
}
