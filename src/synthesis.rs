// Verification-condition construction and the CRDT synthesis driver

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{self, FrontendError, RoutineAnalysis, VariableTracker};
use crate::auto_grammar::GrammarError;
use crate::ir::{Expr, ExprNode, Type};
use crate::lattices::Lattice;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error("no candidate found within the current grammar")]
    SynthesisFailed,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("invalid synthesis candidate: {0}")]
    InvalidCandidate(String),
}

/// Failure modes reported by the backend synthesizer.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No assignment to the grammar holes satisfies the VC.
    #[error("synthesis failed")]
    SynthesisFailed,
    /// A candidate was found but fails unbounded verification at the
    /// current history bound.
    #[error("verification failed")]
    VerificationFailed,
    #[error("{0}")]
    Other(String),
}

/// One synthesis problem handed to the backend: resolve every `Synth` hole
/// in `inv_and_ps` so the verification condition holds under `target_lang`.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub basename: String,
    /// Background function definitions the VC may call.
    pub target_lang: Vec<Expr>,
    /// Universally quantified VC variables.
    pub vars: Vec<Expr>,
    /// The synthesis holes, as `Synth` nodes.
    pub inv_and_ps: Vec<Expr>,
    pub preds: Vec<Expr>,
    pub vc: Expr,
    pub loop_and_ps_info: Vec<Expr>,
    pub uid: usize,
    /// Skip the unbounded verification step (bounded phase).
    pub no_verify: bool,
    pub unbounded_ints: bool,
    pub optimize_vc_equality: bool,
    /// Backend data-structure / history bound.
    pub list_bound: usize,
    pub log: bool,
}

impl SynthesisRequest {
    /// Reject malformed grammars before they reach a solver: an empty
    /// `Choose` denotes an empty candidate space and is always a
    /// construction bug.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        fn check(e: &Expr) -> Result<(), SynthesisError> {
            if let ExprNode::Choose(args) = e.node()
                && args.is_empty()
            {
                return Err(SynthesisError::InvalidCandidate(
                    "choice node with no alternatives".to_string(),
                ));
            }
            for child in e.children() {
                check(child)?;
            }
            Ok(())
        }
        for e in self.inv_and_ps.iter().chain(self.target_lang.iter()) {
            check(e)?;
        }
        check(&self.vc)
    }
}

/// The backend program synthesizer (e.g. a Rosette/CVC5 harness). Returns
/// the concrete `FnDecl`s resolving every hole in the request.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<Expr>, BackendError>;
}

/// The five grammar families a CRDT synthesis problem is parameterized by,
/// plus the user-supplied operation predicates. Implementations hold their
/// own configuration (depths, boosts); the driver supplies the candidate
/// lattice structure at each call.
pub trait CrdtGrammars: Send + Sync {
    /// Literal initial state of the replicated type, one component per
    /// lattice.
    fn init_state(&self, structure: &[Lattice]) -> Result<Expr, GrammarError>;

    /// Candidate state transitions; must construct the replicated state
    /// tuple (without the history log).
    fn state_transition(
        &self,
        in_state: &Expr,
        op_args: &[Expr],
        structure: &[Lattice],
        base_depth: usize,
    ) -> Result<Expr, GrammarError>;

    /// Candidate query functions, as a `Synth` node.
    fn query(
        &self,
        name: &str,
        args: &[Expr],
        ret: &Type,
        base_depth: usize,
    ) -> Result<Expr, GrammarError>;

    /// Candidate equivalence predicates relating sequential and replicated
    /// states.
    fn equivalence(
        &self,
        input_state: &Expr,
        synth_state: &Expr,
        query_params: &[Expr],
        base_depth: usize,
    ) -> Result<Expr, GrammarError>;

    /// Candidate replicated-state invariants; conjoined with the
    /// equivalence during unbounded verification.
    fn state_invariant(
        &self,
        synth_state: &Expr,
        structure: &[Lattice],
        base_depth: usize,
        invariant_boost: usize,
    ) -> Result<Expr, GrammarError>;

    /// Candidate supported-command predicates; used when histories are not
    /// materialized as an op log.
    fn supported_command(
        &self,
        synth_state: &Expr,
        op_args: &[Expr],
        structure: &[Lattice],
        base_depth: usize,
        invariant_boost: usize,
    ) -> Result<Expr, GrammarError>;

    /// The causal delivery order over operation pairs.
    fn in_order(&self, op1: &[Expr], op2: &[Expr]) -> Expr;

    /// The precondition on a single operation.
    fn op_precondition(&self, op: &[Expr]) -> Expr;

    /// Background definitions shipped with every request.
    fn target_lang(&self) -> Vec<Expr>;
}

/// The analyzed reference implementation: the three sequential routines a
/// replicated design must simulate.
#[derive(Debug, Clone)]
pub struct CrdtSpec {
    pub basename: String,
    pub fn_name_base: String,
    pub next_state: RoutineAnalysis,
    pub response: RoutineAnalysis,
    pub init_state: RoutineAnalysis,
}

impl CrdtSpec {
    pub fn new(
        basename: impl Into<String>,
        fn_name_base: impl Into<String>,
        next_state: RoutineAnalysis,
        response: RoutineAnalysis,
        init_state: RoutineAnalysis,
    ) -> Self {
        CrdtSpec {
            basename: basename.into(),
            fn_name_base: fn_name_base.into(),
            next_state,
            response,
            init_state,
        }
    }

    /// Load all three routine analyses from a lifted bundle.
    pub fn load(
        ll_path: &Path,
        fn_name_base: &str,
        loops_path: &Path,
    ) -> Result<Self, FrontendError> {
        let basename = ll_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(CrdtSpec {
            basename,
            fn_name_base: fn_name_base.to_string(),
            next_state: analysis::analyze(
                ll_path,
                &format!("{fn_name_base}_next_state"),
                loops_path,
            )?,
            response: analysis::analyze(
                ll_path,
                &format!("{fn_name_base}_response"),
                loops_path,
            )?,
            init_state: analysis::analyze(
                ll_path,
                &format!("{fn_name_base}_init_state"),
                loops_path,
            )?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub uid: usize,
    pub unbounded_ints: bool,
    /// Start in the bounded phase with a materialized op log.
    pub use_op_list: bool,
    pub list_bound: usize,
    pub base_depth: usize,
    pub invariant_boost: usize,
    pub log: bool,
    /// Build every grammar and VC but skip the backend call; the search's
    /// dry-run gate.
    pub skip_synth: bool,
    pub state_type_hint: Option<Type>,
    pub op_arg_type_hint: Option<Vec<Type>>,
    pub query_arg_type_hint: Option<Vec<Type>>,
    pub query_ret_type_hint: Option<Type>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        SynthesisOptions {
            uid: 0,
            unbounded_ints: true,
            use_op_list: false,
            list_bound: 1,
            base_depth: 2,
            invariant_boost: 0,
            log: true,
            skip_synth: false,
            state_type_hint: None,
            op_arg_type_hint: None,
            query_arg_type_hint: None,
            query_ret_type_hint: None,
        }
    }
}

/// The operation type carried in history logs: the single argument type, or
/// the positional tuple of argument types.
pub fn op_type_of(op_arg_types: &[Type]) -> Type {
    debug_assert!(!op_arg_types.is_empty());
    if op_arg_types.len() > 1 {
        Type::Tuple(op_arg_types.to_vec())
    } else {
        op_arg_types[0].clone()
    }
}

/// Split an operation expression into its positional components.
pub fn unpack_op(op: &Expr) -> Vec<Expr> {
    match op.ty() {
        Type::Tuple(parts) => (0..parts.len())
            .map(|i| Expr::tuple_get(op.clone(), i))
            .collect(),
        _ => vec![op.clone()],
    }
}

fn op_component_types(op_type: &Type) -> Vec<Type> {
    match op_type {
        Type::Tuple(parts) => parts.clone(),
        other => vec![other.clone()],
    }
}

fn observe_equivalence(input_state: &Expr, synth_state: &Expr, query_params: &[Expr]) -> Expr {
    let mut args = vec![input_state.clone(), synth_state.clone()];
    args.extend(query_params.iter().cloned());
    Expr::call("equivalence", Type::Bool, args)
}

fn supported_command_call(synth_state: &Expr, op_args: &[Expr]) -> Expr {
    let mut args = vec![synth_state.clone()];
    args.extend(op_args.iter().cloned());
    Expr::call("supportedCommand", Type::Bool, args)
}

/// The op-log invariant: the state is exactly the replay of its log, and the
/// log's adjacent pairs respect the delivery order and preconditions.
fn ops_list_invariant(
    fn_name_base: &str,
    synth_state: &Expr,
    synth_state_type: &Type,
    op_type: &Type,
) -> Expr {
    let Type::Tuple(components) = synth_state_type else {
        unreachable!("replicated state is always a tuple");
    };
    let log = Expr::tuple_get(synth_state.clone(), components.len() - 1);

    let mut next_state_params = vec![synth_state_type.clone()];
    next_state_params.extend(op_component_types(op_type));
    let next_state_fn = Expr::var(
        format!("{fn_name_base}_next_state"),
        Type::func(synth_state_type.clone(), next_state_params),
    );
    let init_state_fn = Expr::var(
        format!("{fn_name_base}_init_state"),
        Type::func(synth_state_type.clone(), vec![]),
    );

    Expr::and(
        Expr::eq(
            Expr::call(
                "apply_state_transitions",
                synth_state_type.clone(),
                vec![log.clone(), next_state_fn, init_state_fn],
            ),
            synth_state.clone(),
        ),
        Expr::call("ops_in_order", Type::Bool, vec![log]),
    )
}

/// The recursive definitions backing the op-log invariant:
/// `apply_state_transitions`, `ops_in_order_helper`, and `ops_in_order`.
/// An empty log replays to the initial state and is trivially in order.
fn op_list_additional_fns(
    synth_state_type: &Type,
    op_type: &Type,
    grammars: &dyn CrdtGrammars,
) -> Vec<Expr> {
    let list_t = Type::list(op_type.clone());
    let data = Expr::var("data", list_t.clone());

    let mut next_state_params = vec![synth_state_type.clone()];
    next_state_params.extend(op_component_types(op_type));
    let next_state_fn = Expr::var(
        "next_state_fn",
        Type::func(synth_state_type.clone(), next_state_params),
    );
    let init_state_fn = Expr::var("init_state_fn", Type::func(synth_state_type.clone(), vec![]));

    let list_length = |l: Expr| Expr::call("list_length", Type::Int, vec![l]);
    let list_head = |l: Expr| Expr::call("list_get", op_type.clone(), vec![l, Expr::int_lit(0)]);
    let list_tail = |l: Expr| Expr::call("list_tail", list_t.clone(), vec![l, Expr::int_lit(1)]);

    let mut replay_args = vec![Expr::call(
        "apply_state_transitions",
        synth_state_type.clone(),
        vec![
            list_tail(data.clone()),
            next_state_fn.clone(),
            init_state_fn.clone(),
        ],
    )];
    replay_args.extend(unpack_op(&list_head(data.clone())));

    let apply_state_transitions = Expr::fn_decl(
        "apply_state_transitions",
        synth_state_type.clone(),
        Expr::ite(
            Expr::eq(list_length(data.clone()), Expr::int_lit(0)),
            Expr::call_value(init_state_fn.clone(), vec![]),
            Expr::call_value(next_state_fn.clone(), replay_args),
        ),
        vec![data.clone(), next_state_fn, init_state_fn],
    );

    let next_op = Expr::var("next_op", op_type.clone());
    let ops_in_order_helper = Expr::fn_decl(
        "ops_in_order_helper",
        Type::Bool,
        Expr::and(
            grammars.op_precondition(&unpack_op(&next_op)),
            Expr::ite(
                Expr::eq(list_length(data.clone()), Expr::int_lit(0)),
                Expr::bool_lit(true),
                Expr::and(
                    grammars.in_order(
                        &unpack_op(&list_head(data.clone())),
                        &unpack_op(&next_op),
                    ),
                    Expr::call(
                        "ops_in_order_helper",
                        Type::Bool,
                        vec![list_head(data.clone()), list_tail(data.clone())],
                    ),
                ),
            ),
        ),
        vec![next_op, data.clone()],
    );

    let ops_in_order = Expr::fn_decl(
        "ops_in_order",
        Type::Bool,
        Expr::ite(
            Expr::eq(list_length(data.clone()), Expr::int_lit(0)),
            Expr::bool_lit(true),
            Expr::call(
                "ops_in_order_helper",
                Type::Bool,
                vec![list_head(data.clone()), list_tail(data.clone())],
            ),
        ),
        vec![data],
    );

    vec![apply_state_transitions, ops_in_order_helper, ops_in_order]
}

/// The four synthesized bodies carried from the bounded phase into the
/// invariant-only phases, with the trailing op log stripped from their
/// state types.
#[derive(Debug, Clone)]
struct FixedBodies {
    transition_body: Expr,
    transition_state_param: String,
    transition_op_params: Vec<String>,
    query_name: String,
    query_body: Expr,
    query_state_param: String,
    init_body: Expr,
    equivalence_body: Expr,
    equivalence_state_param: String,
}

impl FixedBodies {
    fn transition_body_for(&self, cur_state: &Expr, op_args: &[Expr]) -> Expr {
        let mut subst = HashMap::new();
        subst.insert(self.transition_state_param.clone(), cur_state.clone());
        for (old, new) in self.transition_op_params.iter().zip(op_args) {
            subst.insert(old.clone(), new.clone());
        }
        self.transition_body.rewrite(&subst)
    }

    fn query_body_for(&self, state: &Expr) -> Expr {
        let mut subst = HashMap::new();
        subst.insert(self.query_state_param.clone(), state.clone());
        self.query_body.rewrite(&subst)
    }

    fn equivalence_body_for(&self, synth_state: &Expr) -> Expr {
        let mut subst = HashMap::new();
        subst.insert(self.equivalence_state_param.clone(), synth_state.clone());
        self.equivalence_body.rewrite(&subst)
    }
}

fn narrow_state_type(t: &Type) -> Result<Type, SynthesisError> {
    match t {
        Type::Tuple(args) if !args.is_empty() => Ok(Type::Tuple(args[..args.len() - 1].to_vec())),
        other => Err(SynthesisError::InvalidCandidate(format!(
            "cannot strip the op log from non-tuple state type {other}"
        ))),
    }
}

fn find_decl<'a>(
    fns: &'a [Expr],
    name: &str,
) -> Result<(&'a Type, &'a Expr, &'a [Expr]), SynthesisError> {
    for e in fns {
        if let ExprNode::FnDecl(n, ret, body, params)
        | ExprNode::FnDeclNonRecursive(n, ret, body, params) = e.node()
            && n == name
        {
            return Ok((ret, body, params));
        }
    }
    Err(SynthesisError::InvalidCandidate(format!(
        "backend result is missing the definition of {name}"
    )))
}

fn param_name(param: &Expr, role: &str) -> Result<String, SynthesisError> {
    param
        .var_name()
        .map(str::to_string)
        .ok_or_else(|| SynthesisError::InvalidCandidate(format!("{role} parameter is not a Var")))
}

/// Extract the four synthesized bodies from a bounded-phase result and strip
/// the trailing op log: state parameters get their tuple type narrowed,
/// in-body references are rewritten, and the tuple constructions of
/// `next_state` and `init_state` drop their last component. Sound because no
/// synthesized body reads the log.
fn fix_and_strip(fns: &[Expr], fn_name_base: &str) -> Result<FixedBodies, SynthesisError> {
    let (_ret, eq_body, eq_params) = find_decl(fns, "equivalence")?;
    if eq_params.len() < 2 {
        return Err(SynthesisError::InvalidCandidate(
            "equivalence must take the sequential and replicated states".to_string(),
        ));
    }
    let eq_state_name = param_name(&eq_params[1], "equivalence state")?;
    let eq_narrowed = Expr::var(eq_state_name.clone(), narrow_state_type(&eq_params[1].ty())?);
    let equivalence_body = eq_body.rewrite(&HashMap::from([(
        eq_state_name.clone(),
        eq_narrowed,
    )]));

    let (_ret, tr_body, tr_params) = find_decl(fns, &format!("{fn_name_base}_next_state"))?;
    let tr_state_name = param_name(&tr_params[0], "state transition state")?;
    let tr_narrowed = Expr::var(tr_state_name.clone(), narrow_state_type(&tr_params[0].ty())?);
    let tr_subst = HashMap::from([(tr_state_name.clone(), tr_narrowed)]);
    let tr_parts = tr_body.tuple_parts().ok_or_else(|| {
        SynthesisError::InvalidCandidate(
            "synthesized state transition does not construct a tuple".to_string(),
        )
    })?;
    let transition_body = Expr::tuple(
        tr_parts[..tr_parts.len() - 1]
            .iter()
            .map(|part| part.rewrite(&tr_subst))
            .collect(),
    );
    let transition_op_params = tr_params[1..]
        .iter()
        .map(|p| param_name(p, "state transition op"))
        .collect::<Result<Vec<_>, _>>()?;

    let response_name = format!("{fn_name_base}_response");
    let (_ret, q_body, q_params) = find_decl(fns, &response_name)?;
    let q_state_name = param_name(&q_params[0], "query state")?;
    let q_narrowed = Expr::var(q_state_name.clone(), narrow_state_type(&q_params[0].ty())?);
    let query_body = q_body.rewrite(&HashMap::from([(q_state_name.clone(), q_narrowed)]));

    let (_ret, init_body, _params) = find_decl(fns, &format!("{fn_name_base}_init_state"))?;
    let init_parts = init_body.tuple_parts().ok_or_else(|| {
        SynthesisError::InvalidCandidate(
            "synthesized initial state does not construct a tuple".to_string(),
        )
    })?;
    let init_body = Expr::tuple(init_parts[..init_parts.len() - 1].to_vec());

    Ok(FixedBodies {
        transition_body,
        transition_state_param: tr_state_name,
        transition_op_params,
        query_name: response_name,
        query_body,
        query_state_param: q_state_name,
        init_body,
        equivalence_body,
        equivalence_state_param: eq_state_name,
    })
}

struct AttemptCfg<'a> {
    use_op_list: bool,
    list_bound: usize,
    invariant_boost: usize,
    fixed: Option<&'a FixedBodies>,
}

enum AttemptResult {
    /// Grammars and VC built successfully; backend skipped.
    DryRun,
    Synthesized(Vec<Expr>),
    SynthesisFailed,
    VerificationFailed,
}

fn attempt(
    spec: &CrdtSpec,
    structure: &[Lattice],
    grammars: &dyn CrdtGrammars,
    backend: &dyn Synthesizer,
    opts: &SynthesisOptions,
    cfg: &AttemptCfg<'_>,
) -> Result<AttemptResult, SynthesisError> {
    let fn_base = &spec.fn_name_base;
    let next_state_name = format!("{fn_base}_next_state");
    let response_name = format!("{fn_base}_response");
    let init_state_name = format!("{fn_base}_init_state");

    let base_components: Vec<Type> = structure.iter().map(Lattice::ir_type).collect();

    let op_arg_types: Vec<Type> = match &opts.op_arg_type_hint {
        Some(types) => types.clone(),
        None => spec.next_state.arguments[1..]
            .iter()
            .map(Expr::ty)
            .collect(),
    };
    let op_type = op_type_of(&op_arg_types);

    let synth_state_type = if cfg.use_op_list {
        let mut components = base_components.clone();
        components.push(Type::list(op_type.clone()));
        Type::Tuple(components)
    } else {
        Type::Tuple(base_components)
    };
    let log_index = match &synth_state_type {
        Type::Tuple(components) => components.len() - 1,
        _ => unreachable!(),
    };

    let query_param_types: Vec<Type> = match &opts.query_arg_type_hint {
        Some(types) => types.clone(),
        None => spec.response.arguments[1..].iter().map(Expr::ty).collect(),
    };
    let query_ret_type = opts
        .query_ret_type_hint
        .clone()
        .unwrap_or_else(|| spec.response.return_type.clone());

    let mut tracker = VariableTracker::new();

    let seq_start_state = tracker.variable("seq_start_state", spec.next_state.arguments[0].ty());
    let synth_start_state = tracker.variable("synth_start_state", synth_state_type.clone());
    let equivalence_query_vars: Vec<Expr> = query_param_types
        .iter()
        .enumerate()
        .map(|(i, t)| tracker.variable(&format!("start_state_query_var_{i}"), t.clone()))
        .collect();
    let synth_after_op = tracker.variable("synth_after_op", synth_state_type.clone());

    let op_arg_names: Vec<String> = spec.next_state.arguments[1..]
        .iter()
        .map(|v| v.var_name().unwrap_or("arg").to_string())
        .collect();

    let first_op_args: Vec<Expr> = {
        let mut group = tracker.group("first_op");
        op_arg_names
            .iter()
            .zip(&op_arg_types)
            .map(|(name, t)| group.variable(name, t.clone()))
            .collect()
    };
    let second_op_args: Vec<Expr> = {
        let mut group = tracker.group("second_op");
        op_arg_names
            .iter()
            .zip(&op_arg_types)
            .map(|(name, t)| group.variable(name, t.clone()))
            .collect()
    };

    // In the bounded phase, supportedness of the next command reduces to
    // ordering against the newest logged operation.
    let supported_with_list = |state: &Expr, args: &[Expr]| -> Expr {
        Expr::and(
            grammars.op_precondition(args),
            Expr::ite(
                Expr::eq(
                    Expr::call(
                        "list_length",
                        Type::Int,
                        vec![Expr::tuple_get(state.clone(), log_index)],
                    ),
                    Expr::int_lit(0),
                ),
                Expr::bool_lit(true),
                grammars.in_order(
                    &unpack_op(&Expr::call(
                        "list_get",
                        op_type.clone(),
                        vec![
                            Expr::tuple_get(state.clone(), log_index),
                            Expr::int_lit(0),
                        ],
                    )),
                    args,
                ),
            ),
        )
    };

    let next_state_call_args: Vec<Expr> = std::iter::once(seq_start_state.clone())
        .chain(first_op_args.iter().cloned())
        .collect();

    let vc_state_transition =
        spec.next_state
            .call(&next_state_call_args, &mut tracker, |tracker, seq_after_op| {
                let mut premise = vec![observe_equivalence(
                    &seq_start_state,
                    &synth_start_state,
                    &equivalence_query_vars,
                )];
                if cfg.use_op_list {
                    premise.push(ops_list_invariant(
                        fn_base,
                        &synth_start_state,
                        &synth_state_type,
                        &op_type,
                    ));
                    premise.push(supported_with_list(&synth_start_state, &first_op_args));
                } else {
                    premise.push(grammars.op_precondition(&first_op_args));
                    premise.push(supported_command_call(&synth_start_state, &first_op_args));
                }
                premise.push(Expr::eq(
                    synth_after_op.clone(),
                    Expr::call(
                        &next_state_name,
                        synth_state_type.clone(),
                        std::iter::once(synth_start_state.clone())
                            .chain(first_op_args.iter().cloned())
                            .collect(),
                    ),
                ));

                let response_start_args: Vec<Expr> = std::iter::once(seq_start_state.clone())
                    .chain(equivalence_query_vars.iter().cloned())
                    .collect();
                let conclusion = spec.response.call(
                    &response_start_args,
                    tracker,
                    |tracker, seq_query_result| {
                        let responses_agree_at_start = Expr::eq(
                            seq_query_result.clone(),
                            Expr::call(
                                &response_name,
                                seq_query_result.ty(),
                                std::iter::once(synth_start_state.clone())
                                    .chain(equivalence_query_vars.iter().cloned())
                                    .collect(),
                            ),
                        );

                        let response_after_args: Vec<Expr> =
                            std::iter::once(seq_after_op.clone())
                                .chain(equivalence_query_vars.iter().cloned())
                                .collect();
                        let mut post = vec![
                            observe_equivalence(
                                &seq_after_op,
                                &synth_after_op,
                                &equivalence_query_vars,
                            ),
                            spec.response.call(
                                &response_after_args,
                                tracker,
                                |_tracker, after_result| {
                                    Expr::eq(
                                        after_result.clone(),
                                        Expr::call(
                                            &response_name,
                                            after_result.ty(),
                                            std::iter::once(synth_after_op.clone())
                                                .chain(equivalence_query_vars.iter().cloned())
                                                .collect(),
                                        ),
                                    )
                                },
                            ),
                        ];
                        if !cfg.use_op_list {
                            post.push(Expr::implies(
                                Expr::and(
                                    grammars.in_order(&first_op_args, &second_op_args),
                                    grammars.op_precondition(&second_op_args),
                                ),
                                supported_command_call(&synth_after_op, &second_op_args),
                            ));
                        }
                        Expr::implies(responses_agree_at_start, Expr::and_all(post))
                    },
                );

                Expr::implies(Expr::and_all(premise), conclusion)
            });

    // state-transition hole
    let cur_state_param = Expr::var("cur_state", synth_state_type.clone());
    let op_arg_vars: Vec<Expr> = op_arg_names
        .iter()
        .zip(&op_arg_types)
        .map(|(name, t)| Expr::var(name.clone(), t.clone()))
        .collect();

    let transition_body = match cfg.fixed {
        Some(fixed) => fixed.transition_body_for(&cur_state_param, &op_arg_vars),
        None => grammars.state_transition(&cur_state_param, &op_arg_vars, structure, opts.base_depth)?,
    };
    let mut transition_params = vec![cur_state_param.clone()];
    transition_params.extend(op_arg_vars.iter().cloned());
    let transition_synth = if cfg.use_op_list {
        let parts = transition_body.tuple_parts().ok_or_else(|| {
            SynthesisError::InvalidCandidate(
                "state transition grammar must construct a tuple".to_string(),
            )
        })?;
        let op_expr = if op_arg_vars.len() > 1 {
            Expr::tuple(op_arg_vars.clone())
        } else {
            op_arg_vars[0].clone()
        };
        let mut with_log = parts.to_vec();
        with_log.push(Expr::call(
            "list_prepend",
            Type::list(op_type.clone()),
            vec![op_expr, Expr::tuple_get(cur_state_param.clone(), log_index)],
        ));
        Expr::synth(&next_state_name, Expr::tuple(with_log), transition_params)
    } else {
        Expr::synth(&next_state_name, transition_body, transition_params)
    };

    // query hole
    let query_state_param = Expr::var(
        spec.response.arguments[0].var_name().unwrap_or("state"),
        synth_state_type.clone(),
    );
    let query_arg_vars: Vec<Expr> = spec
        .response
        .arguments
        .iter()
        .skip(1)
        .zip(&query_param_types)
        .map(|(v, t)| Expr::var(v.var_name().unwrap_or("arg"), t.clone()))
        .collect();
    let mut query_args = vec![query_state_param.clone()];
    query_args.extend(query_arg_vars.iter().cloned());
    let query_synth = match cfg.fixed {
        Some(fixed) => Expr::synth(
            &fixed.query_name,
            fixed.query_body_for(&query_state_param),
            query_args,
        ),
        None => grammars.query(&response_name, &query_args, &query_ret_type, opts.base_depth)?,
    };

    // initial-state obligation
    let synth_init_state = tracker.variable("synth_init_state", synth_state_type.clone());
    let init_op_arg_vars: Vec<Expr> = op_arg_types
        .iter()
        .enumerate()
        .map(|(i, t)| tracker.variable(&format!("init_op_arg_{i}"), t.clone()))
        .collect();
    let init_query_param_vars: Vec<Expr> = query_param_types
        .iter()
        .enumerate()
        .map(|(i, t)| {
            tracker.variable(&format!("init_state_equivalence_query_param_{i}"), t.clone())
        })
        .collect();

    let vc_init_state = spec
        .init_state
        .call(&[], &mut tracker, |tracker, seq_init_state| {
            let is_synth_init = Expr::eq(
                synth_init_state.clone(),
                Expr::call(&init_state_name, synth_state_type.clone(), vec![]),
            );
            let response_args: Vec<Expr> = std::iter::once(seq_init_state.clone())
                .chain(init_query_param_vars.iter().cloned())
                .collect();
            let mut post = vec![
                observe_equivalence(&seq_init_state, &synth_init_state, &init_query_param_vars),
                spec.response
                    .call(&response_args, tracker, |_tracker, seq_query_result| {
                        Expr::eq(
                            seq_query_result.clone(),
                            Expr::call(
                                &response_name,
                                seq_query_result.ty(),
                                std::iter::once(synth_init_state.clone())
                                    .chain(init_query_param_vars.iter().cloned())
                                    .collect(),
                            ),
                        )
                    }),
            ];
            post.push(if cfg.use_op_list {
                Expr::bool_lit(true)
            } else {
                Expr::implies(
                    grammars.op_precondition(&init_op_arg_vars),
                    supported_command_call(&synth_init_state, &init_op_arg_vars),
                )
            });
            Expr::implies(is_synth_init, Expr::and_all(post))
        });

    // initial-state hole
    let init_body = match cfg.fixed {
        Some(fixed) => fixed.init_body.clone(),
        None => grammars.init_state(structure)?,
    };
    let init_parts = init_body
        .tuple_parts()
        .ok_or_else(|| {
            SynthesisError::InvalidCandidate(
                "initial-state grammar must construct a tuple".to_string(),
            )
        })?
        .to_vec();
    let init_synth = if cfg.use_op_list {
        let mut with_log = init_parts;
        with_log.push(Expr::call("list_empty", Type::list(op_type.clone()), vec![]));
        Expr::synth(&init_state_name, Expr::tuple(with_log), vec![])
    } else {
        Expr::synth(&init_state_name, Expr::tuple(init_parts), vec![])
    };

    // equivalence (+ state invariant) hole
    let input_state_for_equiv = Expr::var(
        "inputState",
        opts.state_type_hint
            .clone()
            .unwrap_or_else(|| spec.next_state.arguments[0].ty()),
    );
    let synth_state_for_equiv = Expr::var("synthState", synth_state_type.clone());
    let equiv_query_params: Vec<Expr> = query_param_types
        .iter()
        .enumerate()
        .map(|(i, t)| Expr::var(format!("equivalence_query_param_{i}"), t.clone()))
        .collect();

    let equiv_core = match cfg.fixed {
        Some(fixed) => fixed.equivalence_body_for(&synth_state_for_equiv),
        None => grammars.equivalence(
            &input_state_for_equiv,
            &synth_state_for_equiv,
            &equiv_query_params,
            opts.base_depth,
        )?,
    };
    let equiv_body = if cfg.use_op_list {
        equiv_core
    } else {
        Expr::and(
            equiv_core,
            grammars.state_invariant(
                &synth_state_for_equiv,
                structure,
                opts.base_depth,
                cfg.invariant_boost,
            )?,
        )
    };
    let mut equiv_params = vec![input_state_for_equiv, synth_state_for_equiv];
    equiv_params.extend(equiv_query_params);
    let equivalence_synth = Expr::synth("equivalence", equiv_body, equiv_params);

    // supported-command hole, only when histories are not materialized
    let supported_synth = if cfg.use_op_list {
        None
    } else {
        let state_var = Expr::var("supported_synthState", synth_state_type.clone());
        let arg_vars: Vec<Expr> = op_arg_types
            .iter()
            .enumerate()
            .map(|(i, t)| Expr::var(format!("supported_arg_{i}"), t.clone()))
            .collect();
        let body =
            grammars.supported_command(&state_var, &arg_vars, structure, opts.base_depth, cfg.invariant_boost)?;
        let mut params = vec![state_var];
        params.extend(arg_vars);
        Some(Expr::synth("supportedCommand", body, params))
    };

    let mut inv_and_ps = vec![transition_synth, query_synth, init_synth, equivalence_synth];
    if let Some(supported) = supported_synth {
        inv_and_ps.push(supported);
    }

    let mut target_lang = grammars.target_lang();
    if cfg.use_op_list {
        target_lang.extend(op_list_additional_fns(&synth_state_type, &op_type, grammars));
    }

    if opts.skip_synth {
        return Ok(AttemptResult::DryRun);
    }

    let request = SynthesisRequest {
        basename: spec.basename.clone(),
        target_lang,
        vars: tracker.all().to_vec(),
        inv_and_ps: inv_and_ps.clone(),
        preds: vec![],
        vc: Expr::and(vc_state_transition, vc_init_state),
        loop_and_ps_info: inv_and_ps,
        uid: opts.uid,
        no_verify: cfg.use_op_list,
        unbounded_ints: opts.unbounded_ints,
        optimize_vc_equality: false,
        list_bound: cfg.list_bound,
        log: opts.log,
    };
    request.validate()?;

    match backend.synthesize(&request) {
        Ok(fns) => Ok(AttemptResult::Synthesized(fns)),
        Err(BackendError::SynthesisFailed) => Ok(AttemptResult::SynthesisFailed),
        Err(BackendError::VerificationFailed) => Ok(AttemptResult::VerificationFailed),
        Err(BackendError::Other(message)) => Err(SynthesisError::Backend(message)),
    }
}

/// Synthesize a replicated design for `spec` over the candidate lattice
/// `structure`.
///
/// Runs the bounded-history phase first (when `opts.use_op_list`), then fixes
/// the synthesized bodies and synthesizes only the equivalence and state
/// invariant to close the unbounded proof. Failures drive a three-level
/// refinement: verification failures raise the history bound in place;
/// invariant-synthesis failures retry once with a deeper invariant grammar;
/// a second failure restarts the whole design at the larger bound.
///
/// Returns `Ok(None)` in dry-run mode (`opts.skip_synth`).
pub fn synthesize_crdt(
    spec: &CrdtSpec,
    structure: &[Lattice],
    grammars: &dyn CrdtGrammars,
    backend: &dyn Synthesizer,
    opts: &SynthesisOptions,
) -> Result<Option<Vec<Expr>>, SynthesisError> {
    let uid = opts.uid;
    let mut use_op_list = opts.use_op_list;
    let mut list_bound = opts.list_bound;
    let mut invariant_boost = opts.invariant_boost;
    let mut fixed: Option<FixedBodies> = None;
    let mut in_invariant_retry = false;

    loop {
        debug!(
            uid,
            use_op_list, list_bound, invariant_boost, "starting synthesis attempt"
        );
        let cfg = AttemptCfg {
            use_op_list,
            list_bound,
            invariant_boost,
            fixed: fixed.as_ref(),
        };
        match attempt(spec, structure, grammars, backend, opts, &cfg)? {
            AttemptResult::DryRun => return Ok(None),
            AttemptResult::VerificationFailed => {
                info!(
                    uid,
                    next_bound = list_bound + 1,
                    "backend failed to verify the synthesized design, increasing history bound"
                );
                list_bound += 1;
            }
            AttemptResult::Synthesized(fns) => {
                if use_op_list {
                    info!(
                        uid,
                        list_bound, "synthesizing invariants for unbounded verification"
                    );
                    fixed = Some(fix_and_strip(&fns, &spec.fn_name_base)?);
                    use_op_list = false;
                    in_invariant_retry = false;
                } else {
                    return Ok(Some(fns));
                }
            }
            AttemptResult::SynthesisFailed => {
                if fixed.is_none() {
                    return Err(SynthesisError::SynthesisFailed);
                }
                if !in_invariant_retry {
                    info!(
                        uid,
                        next_bound = list_bound + 1,
                        "re-verifying with a larger history bound and a deeper invariant grammar"
                    );
                    list_bound += 1;
                    invariant_boost += 1;
                    use_op_list = true;
                    in_invariant_retry = true;
                } else {
                    info!(
                        uid,
                        list_bound,
                        "could not synthesize invariants, re-synthesizing the entire design"
                    );
                    fixed = None;
                    in_invariant_retry = false;
                    use_op_list = opts.use_op_list;
                    invariant_boost = opts.invariant_boost;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::grammars::bench;
    use crate::ir::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What each scripted backend call should do.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Script {
        Succeed,
        FailSynthesis,
        FailVerification,
    }

    #[derive(Debug, Clone)]
    pub(crate) struct RequestSummary {
        pub no_verify: bool,
        pub list_bound: usize,
        pub synth_names: Vec<String>,
        pub transition_state_type: Type,
    }

    /// A backend that follows a script and, on success, resolves every
    /// grammar hole to its first alternative.
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<Script>>,
        pub requests: Mutex<Vec<RequestSummary>>,
    }

    impl ScriptedBackend {
        pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
            ScriptedBackend {
                script: Mutex::new(script.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn summaries(&self) -> Vec<RequestSummary> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Resolve every `Choose` to its first alternative and every `Synth` to
    /// a concrete `FnDecl`.
    pub(crate) fn resolve_first_choice(e: &Expr) -> Expr {
        match e.node() {
            ExprNode::Choose(args) => resolve_first_choice(&args[0]),
            ExprNode::Synth(name, body, params) => {
                let body = resolve_first_choice(body);
                Expr::fn_decl(name.clone(), body.ty(), body, params.clone())
            }
            ExprNode::Var(_, _) | ExprNode::Lit(_, _) => e.clone(),
            ExprNode::And(args) => {
                Expr::and_all(args.iter().map(resolve_first_choice).collect())
            }
            ExprNode::Or(args) => args
                .iter()
                .map(resolve_first_choice)
                .reduce(Expr::or)
                .unwrap_or_else(|| Expr::bool_lit(false)),
            ExprNode::Not(a) => Expr::not(resolve_first_choice(a)),
            ExprNode::Eq(a, b) => Expr::eq(resolve_first_choice(a), resolve_first_choice(b)),
            ExprNode::Gt(a, b) => Expr::gt(resolve_first_choice(a), resolve_first_choice(b)),
            ExprNode::Ge(a, b) => Expr::ge(resolve_first_choice(a), resolve_first_choice(b)),
            ExprNode::Lt(a, b) => Expr::lt(resolve_first_choice(a), resolve_first_choice(b)),
            ExprNode::Add(a, b) => Expr::add(resolve_first_choice(a), resolve_first_choice(b)),
            ExprNode::Sub(a, b) => Expr::sub(resolve_first_choice(a), resolve_first_choice(b)),
            ExprNode::Implies(a, b) => {
                Expr::implies(resolve_first_choice(a), resolve_first_choice(b))
            }
            ExprNode::Ite(c, t, f) => Expr::ite(
                resolve_first_choice(c),
                resolve_first_choice(t),
                resolve_first_choice(f),
            ),
            ExprNode::Let(binder, value, body) => Expr::let_in(
                binder.clone(),
                resolve_first_choice(value),
                resolve_first_choice(body),
            ),
            ExprNode::Lambda(ret, body, params) => {
                Expr::lambda(ret.clone(), resolve_first_choice(body), params.clone())
            }
            ExprNode::Call(name, ret, args) => Expr::call(
                name.clone(),
                ret.clone(),
                args.iter().map(resolve_first_choice).collect(),
            ),
            ExprNode::CallValue(f, args) => Expr::call_value(
                resolve_first_choice(f),
                args.iter().map(resolve_first_choice).collect(),
            ),
            ExprNode::Tuple(args) => {
                Expr::tuple(args.iter().map(resolve_first_choice).collect())
            }
            ExprNode::TupleGet(tuple, index) => {
                Expr::tuple_get(resolve_first_choice(tuple), *index)
            }
            _ => e.clone(),
        }
    }

    impl Synthesizer for ScriptedBackend {
        fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<Expr>, BackendError> {
            let transition = request
                .inv_and_ps
                .iter()
                .find(|e| {
                    e.decl_name()
                        .is_some_and(|n| n.ends_with("_next_state"))
                })
                .expect("request has a state-transition hole");
            let transition_state_type = match transition.node() {
                ExprNode::Synth(_, _, params) => params[0].ty(),
                _ => panic!("state transition is not a Synth"),
            };
            self.requests.lock().unwrap().push(RequestSummary {
                no_verify: request.no_verify,
                list_bound: request.list_bound,
                synth_names: request
                    .inv_and_ps
                    .iter()
                    .filter_map(|e| e.decl_name().map(str::to_string))
                    .collect(),
                transition_state_type,
            });

            let action = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted backend ran out of script entries");
            match action {
                Script::Succeed => Ok(request
                    .inv_and_ps
                    .iter()
                    .map(resolve_first_choice)
                    .collect()),
                Script::FailSynthesis => Err(BackendError::SynthesisFailed),
                Script::FailVerification => Err(BackendError::VerificationFailed),
            }
        }
    }

    fn bounded_opts() -> SynthesisOptions {
        SynthesisOptions {
            use_op_list: true,
            op_arg_type_hint: Some(vec![Type::OpaqueInt, Type::ClockInt]),
            query_arg_type_hint: Some(vec![]),
            query_ret_type_hint: Some(Type::OpaqueInt),
            state_type_hint: Some(Type::OpaqueInt),
            log: false,
            ..SynthesisOptions::default()
        }
    }

    #[test]
    fn test_unpack_op_tuple_and_scalar() {
        let tuple_op = Expr::var("op", Type::Tuple(vec![Type::EnumInt, Type::ClockInt]));
        let unpacked = unpack_op(&tuple_op);
        assert_eq!(unpacked.len(), 2);
        assert_eq!(unpacked[0], Expr::tuple_get(tuple_op.clone(), 0));

        let scalar_op = Expr::var("op", Type::OpaqueInt);
        assert_eq!(unpack_op(&scalar_op), vec![scalar_op]);
    }

    #[test]
    fn test_op_list_fns_handle_the_empty_log() {
        let grammars = bench::lww_register_grammars();
        let op_type = Type::Tuple(vec![Type::OpaqueInt, Type::ClockInt]);
        let state_type = Type::Tuple(vec![Type::ClockInt, Type::list(op_type.clone())]);
        let fns = op_list_additional_fns(&state_type, &op_type, &grammars);
        assert_eq!(fns.len(), 3);

        // every definition guards the empty log with a length check
        let empty_guard = Expr::eq(
            Expr::call(
                "list_length",
                Type::Int,
                vec![Expr::var("data", Type::list(op_type))],
            ),
            Expr::int_lit(0),
        );
        for f in &fns {
            let ExprNode::FnDecl(_, _, body, _) = f.node() else {
                panic!("expected FnDecl");
            };
            assert!(body.contains(&empty_guard));
        }
    }

    #[test]
    fn test_request_validation_rejects_empty_choose() {
        let request = SynthesisRequest {
            basename: "t".to_string(),
            target_lang: vec![],
            vars: vec![],
            inv_and_ps: vec![Expr::synth("f", Expr::choose(vec![]), vec![])],
            preds: vec![],
            vc: Expr::bool_lit(true),
            loop_and_ps_info: vec![],
            uid: 0,
            no_verify: false,
            unbounded_ints: true,
            optimize_vc_equality: false,
            list_bound: 1,
            log: false,
        };
        assert!(matches!(
            request.validate(),
            Err(SynthesisError::InvalidCandidate(_))
        ));
    }

    #[test]
    fn test_bounded_then_invariant_cycle() {
        let spec = bench::lww_register_spec();
        let structure = bench::lww_register_structure();
        let grammars = bench::lww_register_grammars();
        let backend = ScriptedBackend::new([Script::Succeed, Script::Succeed]);

        let result = synthesize_crdt(&spec, &structure, &grammars, &backend, &bounded_opts())
            .expect("synthesis")
            .expect("not a dry run");

        let names: Vec<_> = result
            .iter()
            .filter_map(|f| f.decl_name().map(str::to_string))
            .collect();
        assert!(names.contains(&"test_next_state".to_string()));
        assert!(names.contains(&"test_response".to_string()));
        assert!(names.contains(&"test_init_state".to_string()));
        assert!(names.contains(&"equivalence".to_string()));
        assert!(names.contains(&"supportedCommand".to_string()));

        let summaries = backend.summaries();
        assert_eq!(summaries.len(), 2);

        // bounded phase: log appended, no supported-command hole, no verify
        assert!(summaries[0].no_verify);
        assert_eq!(summaries[0].synth_names.len(), 4);
        let Type::Tuple(components) = &summaries[0].transition_state_type else {
            panic!("state is a tuple");
        };
        assert_eq!(components.len(), 2);
        assert_eq!(
            components[1],
            Type::list(Type::Tuple(vec![Type::OpaqueInt, Type::ClockInt]))
        );

        // invariant phase: log stripped, supported-command synthesized
        assert!(!summaries[1].no_verify);
        assert_eq!(summaries[1].synth_names.len(), 5);
        let Type::Tuple(components) = &summaries[1].transition_state_type else {
            panic!("state is a tuple");
        };
        assert_eq!(components.len(), 1);
    }

    #[test]
    fn test_verification_failure_raises_history_bound() {
        let spec = bench::lww_register_spec();
        let structure = bench::lww_register_structure();
        let grammars = bench::lww_register_grammars();
        let backend = ScriptedBackend::new([
            Script::FailVerification,
            Script::Succeed,
            Script::Succeed,
        ]);

        synthesize_crdt(&spec, &structure, &grammars, &backend, &bounded_opts())
            .expect("synthesis")
            .expect("not a dry run");

        let summaries = backend.summaries();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[1].list_bound, summaries[0].list_bound + 1);
    }

    #[test]
    fn test_invariant_failure_retries_with_deeper_grammar() {
        let spec = bench::lww_register_spec();
        let structure = bench::lww_register_structure();
        let grammars = bench::lww_register_grammars();
        let backend = ScriptedBackend::new([
            Script::Succeed,       // bounded
            Script::FailSynthesis, // invariant-only fails
            Script::Succeed,       // bounded retry with fixed bodies
            Script::Succeed,       // invariant-only succeeds
        ]);

        let result = synthesize_crdt(&spec, &structure, &grammars, &backend, &bounded_opts())
            .expect("synthesis");
        assert!(result.is_some());

        let summaries = backend.summaries();
        assert_eq!(summaries.len(), 4);
        assert!(summaries[0].no_verify);
        assert!(!summaries[1].no_verify);
        assert!(summaries[2].no_verify, "retry goes back to the bounded form");
        assert_eq!(summaries[2].list_bound, summaries[1].list_bound + 1);
        assert!(!summaries[3].no_verify);
    }

    #[test]
    fn test_second_invariant_failure_restarts_the_design() {
        let spec = bench::lww_register_spec();
        let structure = bench::lww_register_structure();
        let grammars = bench::lww_register_grammars();
        let backend = ScriptedBackend::new([
            Script::Succeed,       // bounded
            Script::FailSynthesis, // invariant-only fails
            Script::FailSynthesis, // bounded retry fails
            Script::Succeed,       // full restart, bounded
            Script::Succeed,       // invariant-only succeeds
        ]);

        let result = synthesize_crdt(&spec, &structure, &grammars, &backend, &bounded_opts())
            .expect("synthesis");
        assert!(result.is_some());
        assert_eq!(backend.summaries().len(), 5);
    }

    #[test]
    fn test_direct_synthesis_failure_surfaces() {
        let spec = bench::lww_register_spec();
        let structure = bench::lww_register_structure();
        let grammars = bench::lww_register_grammars();
        let backend = ScriptedBackend::new([Script::FailSynthesis]);

        let result = synthesize_crdt(&spec, &structure, &grammars, &backend, &bounded_opts());
        assert!(matches!(result, Err(SynthesisError::SynthesisFailed)));
    }

    #[test]
    fn test_dry_run_skips_the_backend() {
        let spec = bench::lww_register_spec();
        let structure = bench::lww_register_structure();
        let grammars = bench::lww_register_grammars();
        let backend = ScriptedBackend::new([]);

        let opts = SynthesisOptions {
            skip_synth: true,
            ..bounded_opts()
        };
        let result = synthesize_crdt(&spec, &structure, &grammars, &backend, &opts)
            .expect("dry run succeeds");
        assert!(result.is_none());
        assert!(backend.summaries().is_empty());
    }

    #[test]
    fn test_grammar_failure_propagates_from_dry_run() {
        // The tombstone-map structure needs an OpaqueInt to key map inserts,
        // but the counter reference offers none.
        let spec = bench::counter_spec();
        let structure = vec![Lattice::map(Type::OpaqueInt, Lattice::OrBool)];
        let grammars = bench::counter_grammars();
        let backend = ScriptedBackend::new([]);

        let opts = SynthesisOptions {
            skip_synth: true,
            use_op_list: true,
            op_arg_type_hint: Some(vec![Type::EnumInt, Type::NodeIdInt]),
            query_arg_type_hint: Some(vec![]),
            query_ret_type_hint: Some(Type::Int),
            state_type_hint: Some(Type::Int),
            log: false,
            ..SynthesisOptions::default()
        };
        let result = synthesize_crdt(&spec, &structure, &grammars, &backend, &opts);
        assert!(matches!(result, Err(SynthesisError::Grammar(_))));
    }

    #[test]
    fn test_fixed_bodies_drop_the_log_everywhere() {
        let spec = bench::lww_register_spec();
        let structure = bench::lww_register_structure();
        let grammars = bench::lww_register_grammars();
        let backend = ScriptedBackend::new([Script::Succeed, Script::Succeed]);

        let result = synthesize_crdt(&spec, &structure, &grammars, &backend, &bounded_opts())
            .expect("synthesis")
            .expect("not a dry run");

        for f in &result {
            let ExprNode::FnDecl(name, _, body, params) = f.node() else {
                continue;
            };
            for p in params {
                if let Type::Tuple(components) = p.ty() {
                    assert!(
                        components.iter().all(|c| !matches!(c, Type::List(_))),
                        "{name} still carries an op log in {}",
                        p.ty()
                    );
                }
            }
            assert!(
                !body.contains(&Expr::call(
                    "list_empty",
                    Type::list(Type::Tuple(vec![Type::OpaqueInt, Type::ClockInt])),
                    vec![]
                )),
                "{name} still constructs an op log"
            );
        }
    }

    #[test]
    fn test_ops_list_invariant_replays_the_log() {
        let op_type = Type::Tuple(vec![Type::OpaqueInt, Type::ClockInt]);
        let state_type = Type::Tuple(vec![Type::ClockInt, Type::list(op_type.clone())]);
        let state = Expr::var("s", state_type.clone());
        let invariant = ops_list_invariant("test", &state, &state_type, &op_type);

        let log = Expr::tuple_get(state.clone(), 1);
        assert!(invariant.contains(&Expr::call("ops_in_order", Type::Bool, vec![log])));
        let ExprNode::And(parts) = invariant.node() else {
            panic!("invariant is a conjunction");
        };
        assert!(matches!(parts[0].node(), ExprNode::Eq(_, _)));
    }

    #[test]
    fn test_scripted_backend_resolution_is_concrete() {
        let choose = Expr::choose(vec![Expr::int_lit(7), Expr::int_lit(8)]);
        let resolved = resolve_first_choice(&choose);
        assert_eq!(resolved, Expr::int_lit(7));

        let synth = Expr::synth(
            "f",
            Expr::choose(vec![Expr::lit(Value::Int(0), Type::ClockInt)]),
            vec![Expr::var("s", Type::ClockInt)],
        );
        let resolved = resolve_first_choice(&synth);
        assert!(matches!(resolved.node(), ExprNode::FnDecl(name, _, _, _) if name == "f"));
    }
}
