// The canonical grammar family: every hole built with auto_grammar over the
// candidate lattice structure

use std::sync::Arc;

use crate::auto_grammar::{
    all_node_id_gets, auto_grammar, auto_grammar_pool, expand_lattice_logic, GrammarError,
    GrammarOptions,
};
use crate::ir::{Expr, Type};
use crate::lattices::Lattice;
use crate::synthesis::CrdtGrammars;

pub type OrderPredicate = Arc<dyn Fn(&[Expr], &[Expr]) -> Expr + Send + Sync>;
pub type OpPredicate = Arc<dyn Fn(&[Expr]) -> Expr + Send + Sync>;

/// Guard an expression with the given conditions; each wraps the candidate in
/// an `Ite` whose branches coincide, leaving the backend free to specialize
/// either side.
pub fn fold_conditions(mut out: Expr, conditions: &[Expr]) -> Expr {
    for c in conditions {
        out = Expr::ite(c.clone(), out.clone(), out);
    }
    out
}

/// Wrap a causal order with the clock cascade when operations carry a
/// trailing `ClockInt`: earlier clocks deliver first, concurrent clocks fall
/// back to the base order, later clocks never precede.
pub fn clock_augmented_order(base: OrderPredicate, op_arg_types: &[Type]) -> OrderPredicate {
    if op_arg_types.last() != Some(&Type::ClockInt) {
        return base;
    }
    Arc::new(move |op1: &[Expr], op2: &[Expr]| {
        let clock1 = op1[op1.len() - 1].clone();
        let clock2 = op2[op2.len() - 1].clone();
        Expr::ite(
            Expr::lt(clock1.clone(), clock2.clone()),
            Expr::bool_lit(true),
            Expr::ite(
                Expr::eq(clock1, clock2),
                (*base)(op1, op2),
                Expr::bool_lit(false),
            ),
        )
    })
}

/// The grammar family used by every benchmark: candidate state transitions
/// are per-component `merge(current, candidate)` folds (monotone by
/// construction), queries get one extra level of depth, and the equivalence
/// and invariant stay shallow because lattice validity augments them.
pub struct AutoGrammars {
    in_order: OrderPredicate,
    op_precondition: OpPredicate,
    target_lang: Vec<Expr>,
}

impl AutoGrammars {
    pub fn new(in_order: OrderPredicate, op_precondition: OpPredicate) -> Self {
        AutoGrammars {
            in_order,
            op_precondition,
            target_lang: Vec::new(),
        }
    }

    pub fn with_target_lang(mut self, target_lang: Vec<Expr>) -> Self {
        self.target_lang = target_lang;
        self
    }

    fn enum_conditions(op_args: &[Expr]) -> Vec<Expr> {
        op_args
            .iter()
            .filter(|a| a.ty() == Type::EnumInt)
            .map(|a| Expr::eq(a.clone(), Expr::int_lit(1)))
            .collect()
    }
}

impl CrdtGrammars for AutoGrammars {
    fn init_state(&self, structure: &[Lattice]) -> Result<Expr, GrammarError> {
        let components = structure
            .iter()
            .map(|lattice| {
                auto_grammar(
                    &lattice.ir_type(),
                    1,
                    &[lattice.bottom()],
                    GrammarOptions::default(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::tuple(components))
    }

    fn state_transition(
        &self,
        in_state: &Expr,
        op_args: &[Expr],
        structure: &[Lattice],
        base_depth: usize,
    ) -> Result<Expr, GrammarError> {
        let conditions = Self::enum_conditions(op_args);

        // per-replica effects reach the state through node-id map lookups
        let mut non_associative_data = Vec::new();
        for arg in op_args {
            if arg.ty() == Type::NodeIdInt {
                let pool = auto_grammar_pool(0, op_args, GrammarOptions::default())?;
                non_associative_data = all_node_id_gets(in_state, arg, &pool)?;
                break;
            }
        }

        let mut inputs = op_args.to_vec();
        inputs.extend(non_associative_data);

        let components = structure
            .iter()
            .enumerate()
            .map(|(i, lattice)| {
                let current = Expr::tuple_get(in_state.clone(), i);
                let candidate = auto_grammar(
                    &current.ty(),
                    base_depth,
                    &inputs,
                    GrammarOptions::default(),
                )?;
                Ok(lattice.merge(current, fold_conditions(candidate, &conditions)))
            })
            .collect::<Result<Vec<_>, GrammarError>>()?;
        Ok(Expr::tuple(components))
    }

    fn query(
        &self,
        name: &str,
        args: &[Expr],
        ret: &Type,
        base_depth: usize,
    ) -> Result<Expr, GrammarError> {
        // queries compute more than transitions, so they search deeper
        let summary = if *ret == Type::EnumInt {
            let condition = auto_grammar(
                &Type::Bool,
                base_depth + 1,
                args,
                GrammarOptions::default().with_node_id_reductions(),
            )?;
            Expr::ite(condition, Expr::int_lit(1), Expr::int_lit(0))
        } else {
            auto_grammar(
                ret,
                base_depth + 1,
                args,
                GrammarOptions::default()
                    .with_ite()
                    .with_node_id_reductions(),
            )?
        };
        Ok(Expr::synth(name, summary, args.to_vec()))
    }

    fn equivalence(
        &self,
        input_state: &Expr,
        synth_state: &Expr,
        query_params: &[Expr],
        base_depth: usize,
    ) -> Result<Expr, GrammarError> {
        let mut inputs = vec![input_state.clone(), synth_state.clone()];
        inputs.extend(query_params.iter().cloned());
        auto_grammar(
            &Type::Bool,
            base_depth.saturating_sub(1).max(1),
            &inputs,
            GrammarOptions::default(),
        )
    }

    fn state_invariant(
        &self,
        synth_state: &Expr,
        structure: &[Lattice],
        base_depth: usize,
        invariant_boost: usize,
    ) -> Result<Expr, GrammarError> {
        let state_valid = Expr::and_all(
            structure
                .iter()
                .enumerate()
                .map(|(i, lattice)| {
                    lattice.check_is_valid(Expr::tuple_get(synth_state.clone(), i))
                })
                .collect(),
        );
        let searched = auto_grammar(
            &Type::Bool,
            base_depth.saturating_sub(1).max(1) + invariant_boost,
            &[synth_state.clone()],
            GrammarOptions::default(),
        )?;
        Ok(Expr::and(state_valid, searched))
    }

    fn supported_command(
        &self,
        synth_state: &Expr,
        op_args: &[Expr],
        structure: &[Lattice],
        base_depth: usize,
        invariant_boost: usize,
    ) -> Result<Expr, GrammarError> {
        let conditions = Self::enum_conditions(op_args);

        let lattice_inputs: Vec<(Expr, Lattice)> = structure
            .iter()
            .enumerate()
            .map(|(i, lattice)| {
                (Expr::tuple_get(synth_state.clone(), i), lattice.clone())
            })
            .collect();

        let mut inputs = vec![synth_state.clone()];
        inputs.extend(op_args.iter().cloned());
        inputs.extend(expand_lattice_logic(&lattice_inputs));

        let out = auto_grammar(
            &Type::Bool,
            base_depth + invariant_boost,
            &inputs,
            GrammarOptions::default().with_ite(),
        )?;
        Ok(fold_conditions(out, &conditions))
    }

    fn in_order(&self, op1: &[Expr], op2: &[Expr]) -> Expr {
        (*self.in_order)(op1, op2)
    }

    fn op_precondition(&self, op: &[Expr]) -> Expr {
        (*self.op_precondition)(op)
    }

    fn target_lang(&self) -> Vec<Expr> {
        self.target_lang.clone()
    }
}

#[cfg(test)]
pub(crate) mod bench {
    //! Reference implementations and grammar configurations for the
    //! benchmark datatypes exercised by the test suite.

    use super::*;
    use crate::analysis::RoutineAnalysis;
    use crate::ir::Value;
    use crate::synthesis::CrdtSpec;

    /// Last-writer-wins register: sequential state is the stored value; ops
    /// are `(value, timestamp)` pairs.
    pub fn lww_register_spec() -> CrdtSpec {
        let state = Expr::var("state", Type::OpaqueInt);
        let value = Expr::var("value", Type::OpaqueInt);
        let timestamp = Expr::var("timestamp", Type::ClockInt);

        let next_state = RoutineAnalysis::new(
            "test_next_state",
            vec![state.clone(), value.clone(), timestamp],
            Type::OpaqueInt,
            value,
        );
        let response = RoutineAnalysis::new(
            "test_response",
            vec![state.clone()],
            Type::OpaqueInt,
            state.clone(),
        );
        let init_state = RoutineAnalysis::new(
            "test_init_state",
            vec![],
            Type::OpaqueInt,
            Expr::lit(Value::Int(0), Type::OpaqueInt),
        );
        CrdtSpec::new("sequential_register", "test", next_state, response, init_state)
    }

    pub fn lww_register_structure() -> Vec<Lattice> {
        vec![Lattice::lexical_product(
            Lattice::MaxInt(Type::ClockInt),
            Lattice::MaxInt(Type::OpaqueInt),
        )]
    }

    pub fn lww_register_grammars() -> AutoGrammars {
        // deliverability: a later timestamp may follow an earlier one
        let in_order: OrderPredicate =
            Arc::new(|op1, op2| Expr::ge(op2[1].clone(), op1[1].clone()));
        let pre: OpPredicate = Arc::new(|op| {
            Expr::and(
                Expr::ge(op[1].clone(), Expr::int_lit(1)),
                Expr::ge(op[0].clone(), Expr::int_lit(0)),
            )
        });
        AutoGrammars::new(in_order, pre)
    }

    /// Insert/remove set over opaque elements; ops are `(command, element)`
    /// with command `1` for insert.
    pub fn set_spec() -> CrdtSpec {
        let state = Expr::var("state", Type::set(Type::OpaqueInt));
        let command = Expr::var("command", Type::EnumInt);
        let element = Expr::var("element", Type::OpaqueInt);

        let next_state = RoutineAnalysis::new(
            "test_next_state",
            vec![state.clone(), command.clone(), element.clone()],
            Type::set(Type::OpaqueInt),
            Expr::ite(
                Expr::eq(command.clone(), Expr::int_lit(1)),
                Expr::call(
                    "set-insert",
                    Type::set(Type::OpaqueInt),
                    vec![element.clone(), state.clone()],
                ),
                Expr::call(
                    "set-minus",
                    Type::set(Type::OpaqueInt),
                    vec![
                        state.clone(),
                        Expr::call(
                            "set-singleton",
                            Type::set(Type::OpaqueInt),
                            vec![element.clone()],
                        ),
                    ],
                ),
            ),
        );
        let response = RoutineAnalysis::new(
            "test_response",
            vec![state.clone(), Expr::var("query_elem", Type::OpaqueInt)],
            Type::EnumInt,
            Expr::ite(
                Expr::call(
                    "set-member",
                    Type::Bool,
                    vec![Expr::var("query_elem", Type::OpaqueInt), state.clone()],
                ),
                Expr::int_lit(1),
                Expr::int_lit(0),
            ),
        );
        let init_state = RoutineAnalysis::new(
            "test_init_state",
            vec![],
            Type::set(Type::OpaqueInt),
            Expr::call("set-create", Type::set(Type::OpaqueInt), vec![]),
        );
        CrdtSpec::new("sequential1", "test", next_state, response, init_state)
    }

    /// Grow-only set: inserts precede removals, so removals never apply.
    pub fn g_set_grammars() -> AutoGrammars {
        let in_order: OrderPredicate = Arc::new(|op1, op2| {
            Expr::ite(
                Expr::eq(op1[0].clone(), Expr::int_lit(1)),
                Expr::eq(op2[0].clone(), Expr::int_lit(1)),
                Expr::bool_lit(true),
            )
        });
        let pre: OpPredicate = Arc::new(|_op| Expr::bool_lit(true));
        AutoGrammars::new(in_order, pre)
    }

    pub fn g_set_structure() -> Vec<Lattice> {
        vec![Lattice::Set(Type::OpaqueInt)]
    }

    /// Two-phase set: inserts may precede removals but never follow them.
    pub fn two_phase_set_grammars() -> AutoGrammars {
        let in_order: OrderPredicate = Arc::new(|op1, op2| {
            Expr::ite(
                Expr::eq(op1[0].clone(), Expr::int_lit(1)),
                Expr::bool_lit(true),
                Expr::not(Expr::eq(op2[0].clone(), Expr::int_lit(1))),
            )
        });
        let pre: OpPredicate = Arc::new(|_op| Expr::bool_lit(true));
        AutoGrammars::new(in_order, pre)
    }

    pub fn two_phase_set_structure() -> Vec<Lattice> {
        vec![Lattice::map(Type::OpaqueInt, Lattice::OrBool)]
    }

    /// Grow-only counter: the sequential reference increments on every op,
    /// which is not idempotent; ops are `(command, node id)`.
    pub fn counter_spec() -> CrdtSpec {
        let state = Expr::var("state", Type::Int);
        let command = Expr::var("command", Type::EnumInt);
        let node = Expr::var("node", Type::NodeIdInt);

        let next_state = RoutineAnalysis::new(
            "test_next_state",
            vec![state.clone(), command, node],
            Type::Int,
            Expr::add(state.clone(), Expr::int_lit(1)),
        );
        let response = RoutineAnalysis::new(
            "test_response",
            vec![state.clone()],
            Type::Int,
            state.clone(),
        );
        let init_state =
            RoutineAnalysis::new("test_init_state", vec![], Type::Int, Expr::int_lit(0));
        CrdtSpec::new("sequential2", "test", next_state, response, init_state)
    }

    pub fn counter_grammars() -> AutoGrammars {
        let in_order: OrderPredicate = Arc::new(|op1, op2| {
            Expr::and(
                Expr::eq(op1[0].clone(), Expr::int_lit(1)),
                Expr::eq(op2[0].clone(), Expr::int_lit(1)),
            )
        });
        let pre: OpPredicate =
            Arc::new(|op| Expr::eq(op[0].clone(), Expr::int_lit(1)));
        AutoGrammars::new(in_order, pre)
    }

    pub fn counter_structure() -> Vec<Lattice> {
        vec![Lattice::map(Type::NodeIdInt, Lattice::MaxInt(Type::Int))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ExprNode;

    fn contains_call(e: &Expr, name: &str) -> bool {
        if let ExprNode::Call(n, _, _) = e.node()
            && n == name
        {
            return true;
        }
        e.children().into_iter().any(|c| contains_call(c, name))
    }

    #[test]
    fn test_fold_conditions_nests_ites() {
        let out = Expr::int_lit(5);
        let c1 = Expr::eq(Expr::var("a", Type::EnumInt), Expr::int_lit(1));
        let c2 = Expr::eq(Expr::var("b", Type::EnumInt), Expr::int_lit(1));
        let folded = fold_conditions(out.clone(), &[c1.clone(), c2.clone()]);
        let ExprNode::Ite(cond, then, _) = folded.node() else {
            panic!("expected Ite");
        };
        assert_eq!(*cond, c2);
        assert!(matches!(then.node(), ExprNode::Ite(_, _, _)));
    }

    #[test]
    fn test_state_transition_is_per_component_merge() {
        let grammars = bench::g_set_grammars();
        let structure = bench::g_set_structure();
        let state = Expr::var(
            "cur_state",
            Type::Tuple(vec![Type::set(Type::OpaqueInt)]),
        );
        let args = [
            Expr::var("command", Type::EnumInt),
            Expr::var("element", Type::OpaqueInt),
        ];
        let body = grammars
            .state_transition(&state, &args, &structure, 1)
            .expect("grammar");

        let parts = body.tuple_parts().expect("tuple body");
        assert_eq!(parts.len(), 1);
        // the component is rooted at the lattice merge
        let ExprNode::Call(name, _, merge_args) = parts[0].node() else {
            panic!("expected a set-union merge, got {}", parts[0]);
        };
        assert_eq!(name, "set-union");
        assert_eq!(merge_args[0], Expr::tuple_get(state.clone(), 0));
        // enum-guarded candidate on the other side
        assert!(matches!(merge_args[1].node(), ExprNode::Ite(_, _, _)));
    }

    #[test]
    fn test_state_transition_feeds_node_id_lookups() {
        let grammars = bench::counter_grammars();
        let structure = bench::counter_structure();
        let state = Expr::var(
            "cur_state",
            Type::Tuple(vec![Type::map(Type::NodeIdInt, Type::Int)]),
        );
        let args = [
            Expr::var("command", Type::EnumInt),
            Expr::var("node", Type::NodeIdInt),
        ];
        let body = grammars
            .state_transition(&state, &args, &structure, 1)
            .expect("grammar");
        assert!(contains_call(&body, "map-get"));
        assert!(contains_call(&body, "map-union"));
    }

    #[test]
    fn test_query_wraps_enum_returns_in_indicator() {
        let grammars = bench::g_set_grammars();
        let state = Expr::var("state", Type::Tuple(vec![Type::set(Type::OpaqueInt)]));
        let elem = Expr::var("query_elem", Type::OpaqueInt);
        let synth = grammars
            .query("test_response", &[state, elem], &Type::EnumInt, 1)
            .expect("grammar");
        let ExprNode::Synth(name, body, _) = synth.node() else {
            panic!("expected Synth");
        };
        assert_eq!(name, "test_response");
        let ExprNode::Ite(_, then, otherwise) = body.node() else {
            panic!("expected indicator Ite, got {body}");
        };
        assert_eq!(*then, Expr::int_lit(1));
        assert_eq!(*otherwise, Expr::int_lit(0));
    }

    #[test]
    fn test_init_state_builds_from_bottoms() {
        let grammars = bench::g_set_grammars();
        let init = grammars
            .init_state(&bench::g_set_structure())
            .expect("grammar");
        assert!(contains_call(&init, "set-create"));
    }

    #[test]
    fn test_state_invariant_includes_lattice_validity() {
        let grammars = bench::counter_grammars();
        let structure = bench::counter_structure();
        let state = Expr::var(
            "synthState",
            Type::Tuple(vec![Type::map(Type::NodeIdInt, Type::Int)]),
        );
        let invariant = grammars
            .state_invariant(&state, &structure, 2, 0)
            .expect("grammar");
        // map validity folds value validity over map-values
        assert!(contains_call(&invariant, "reduce_bool"));
        assert!(contains_call(&invariant, "map-values"));
    }

    #[test]
    fn test_supported_command_offers_lattice_rollups() {
        let grammars = bench::two_phase_set_grammars();
        let structure = bench::two_phase_set_structure();
        let state = Expr::var(
            "supported_synthState",
            Type::Tuple(vec![Type::map(Type::OpaqueInt, Type::Bool)]),
        );
        let args = [
            Expr::var("supported_arg_0", Type::EnumInt),
            Expr::var("supported_arg_1", Type::OpaqueInt),
        ];
        let body = grammars
            .supported_command(&state, &args, &structure, 1, 0)
            .expect("grammar");
        // outermost: enum-guard fold
        assert!(matches!(body.node(), ExprNode::Ite(_, _, _)));
        // lattice rollups appear among the candidates
        assert!(contains_call(&body, "map-values"));
    }

    #[test]
    fn test_clock_augmented_order_wraps_clock_carrying_ops() {
        let base: OrderPredicate = Arc::new(|_op1, _op2| Expr::bool_lit(true));
        let augmented = clock_augmented_order(
            base,
            &[Type::OpaqueInt, Type::ClockInt],
        );
        let op1 = [
            Expr::var("v1", Type::OpaqueInt),
            Expr::var("t1", Type::ClockInt),
        ];
        let op2 = [
            Expr::var("v2", Type::OpaqueInt),
            Expr::var("t2", Type::ClockInt),
        ];
        let order = (*augmented)(&op1, &op2);
        let ExprNode::Ite(cond, _, otherwise) = order.node() else {
            panic!("expected clock cascade, got {order}");
        };
        assert_eq!(*cond, Expr::lt(op1[1].clone(), op2[1].clone()));
        assert!(matches!(otherwise.node(), ExprNode::Ite(_, _, _)));
    }

    #[test]
    fn test_clock_augmented_order_is_identity_without_clock() {
        let base: OrderPredicate = Arc::new(|_op1, _op2| Expr::bool_lit(true));
        let augmented = clock_augmented_order(base, &[Type::EnumInt, Type::OpaqueInt]);
        let op = [
            Expr::var("c", Type::EnumInt),
            Expr::var("x", Type::OpaqueInt),
        ];
        assert_eq!((*augmented)(&op, &op), Expr::bool_lit(true));
    }
}
