// Commutativity and idempotence checking of reference state transitions

use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::analysis::{RoutineAnalysis, VariableTracker};
use crate::ir::Expr;
use crate::process_tracker;
use crate::smt::{self, ModelValue, SmtError};

#[derive(Debug, Error)]
pub enum AciError {
    #[error(transparent)]
    Smt(#[from] SmtError),
    #[error("failed to run the solver")]
    Io(#[from] std::io::Error),
    #[error("solver answered '{0}' instead of a sat/unsat verdict")]
    NoVerdict(String),
    #[error("counterexample model is missing a value for '{0}'")]
    MissingModelValue(String),
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub cvc_path: String,
    pub scratch_dir: PathBuf,
    pub tlimit_ms: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            cvc_path: "cvc5".to_string(),
            scratch_dir: PathBuf::from("./synthesisLogs"),
            tlimit_ms: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AciProperty {
    Commutativity,
    Idempotence,
}

/// The outcome of one check. `unknown` from the solver counts as refuted:
/// the property is never claimed on a timeout.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Holds,
    Refuted {
        operations: Vec<Vec<ModelValue>>,
        initial_state: ModelValue,
        actors: Vec<(String, ModelValue)>,
    },
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub property: AciProperty,
    pub outcome: CheckOutcome,
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.property, &self.outcome) {
            (AciProperty::Commutativity, CheckOutcome::Holds) => {
                write!(f, "Actor is commutative")
            }
            (AciProperty::Idempotence, CheckOutcome::Holds) => write!(f, "Actor is Idempotent"),
            (property, CheckOutcome::Refuted { operations, initial_state, actors }) => {
                match property {
                    AciProperty::Commutativity => {
                        writeln!(f, "Counterexample Found for Commutativity Check")?;
                        writeln!(f, "Operation 1: {}", format_op(&operations[0]))?;
                        writeln!(f, "Operation 2: {}", format_op(&operations[1]))?;
                    }
                    AciProperty::Idempotence => {
                        writeln!(f, "Counterexample Found for Idempotence Check")?;
                        writeln!(f, "Operations: {}", format_op(&operations[0]))?;
                    }
                }
                writeln!(f, "Initial State: {initial_state}")?;
                for (i, (label, value)) in actors.iter().enumerate() {
                    // blank line between the two actors' state groups
                    if i % 2 == 0 {
                        writeln!(f)?;
                    }
                    writeln!(f, "{label}: {value}")?;
                }
                Ok(())
            }
        }
    }
}

fn format_op(values: &[ModelValue]) -> String {
    let parts: Vec<String> = values.iter().map(ModelValue::to_string).collect();
    format!("[{}]", parts.join(", "))
}

fn model_value(output: &str, var: &Expr) -> Result<ModelValue, AciError> {
    let name = var.var_name().unwrap_or_default();
    smt::lookup_define_fun(output, name)
        .ok_or_else(|| AciError::MissingModelValue(name.to_string()))
}

fn model_values(output: &str, vars: &[Expr]) -> Result<Vec<ModelValue>, AciError> {
    vars.iter().map(|v| model_value(output, v)).collect()
}

fn run_solver(config: &SolverConfig, smt_file: &PathBuf) -> Result<String, AciError> {
    debug!(path = %smt_file.display(), "invoking solver");
    let child = Command::new(&config.cvc_path)
        .arg("--lang=smt")
        .arg("--produce-models")
        .arg(format!("--tlimit={}", config.tlimit_ms))
        .arg(smt_file)
        .stdout(Stdio::piped())
        .spawn()?;
    let handle = process_tracker::track(child);

    let stdout = {
        let mut guard = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.stdout.take()
    };
    let mut output = String::new();
    if let Some(mut stream) = stdout {
        stream.read_to_string(&mut output)?;
    }
    {
        let mut guard = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = guard.wait();
    }
    process_tracker::untrack(&handle);
    Ok(output)
}

fn verdict(output: &str) -> Result<bool, AciError> {
    // true = property refuted (counterexample or timeout), false = proven
    match output.lines().next().map(str::trim) {
        Some("sat") | Some("unknown") => Ok(true),
        Some("unsat") => Ok(false),
        other => Err(AciError::NoVerdict(other.unwrap_or("").to_string())),
    }
}

/// Check that applying two operations in either order reaches the same
/// state: `N(N(s, op1), op2) = N(N(s, op2), op1)`.
pub fn check_c(
    next_state: &RoutineAnalysis,
    config: &SolverConfig,
) -> Result<CheckReport, AciError> {
    let mut tracker = VariableTracker::new();
    let state_type = next_state.arguments[0].ty();

    let initial_state = tracker.variable("initial_state", state_type.clone());
    let op1: Vec<Expr> = {
        let mut group = tracker.group("op1");
        next_state.arguments[1..]
            .iter()
            .map(|v| group.variable(v.var_name().unwrap_or("arg"), v.ty()))
            .collect()
    };
    let op2: Vec<Expr> = {
        let mut group = tracker.group("op2");
        next_state.arguments[1..]
            .iter()
            .map(|v| group.variable(v.var_name().unwrap_or("arg"), v.ty()))
            .collect()
    };

    let after_0_op1 = tracker.variable("afterState_0_op1", state_type.clone());
    let after_0_op2 = tracker.variable("afterState_0_op2", state_type.clone());
    let after_1_op2 = tracker.variable("afterState_1_op2", state_type.clone());
    let after_1_op1 = tracker.variable("afterState_1_op1", state_type.clone());

    let first_args: Vec<Expr> = std::iter::once(initial_state.clone())
        .chain(op1.iter().cloned())
        .collect();
    let vc = next_state.call(&first_args, &mut tracker, |tracker, state_0_op1| {
        let second_args: Vec<Expr> = std::iter::once(state_0_op1.clone())
            .chain(op2.iter().cloned())
            .collect();
        Expr::implies(
            Expr::eq(state_0_op1, after_0_op1.clone()),
            next_state.call(&second_args, tracker, |tracker, state_0_op2| {
                let other_first: Vec<Expr> = std::iter::once(initial_state.clone())
                    .chain(op2.iter().cloned())
                    .collect();
                Expr::implies(
                    Expr::eq(state_0_op2.clone(), after_0_op2.clone()),
                    next_state.call(&other_first, tracker, |tracker, state_1_op2| {
                        let other_second: Vec<Expr> = std::iter::once(state_1_op2.clone())
                            .chain(op1.iter().cloned())
                            .collect();
                        Expr::implies(
                            Expr::eq(state_1_op2, after_1_op2.clone()),
                            next_state.call(&other_second, tracker, |_tracker, state_1_op1| {
                                Expr::implies(
                                    Expr::eq(state_1_op1.clone(), after_1_op1.clone()),
                                    Expr::eq(state_0_op2.clone(), state_1_op1),
                                )
                            }),
                        )
                    }),
                )
            }),
        )
    });

    let smt_file = config.scratch_dir.join("aci-test.smt");
    smt::to_smt(&vc, tracker.all(), &[], &smt_file)?;
    let output = run_solver(config, &smt_file)?;

    let outcome = if verdict(&output)? {
        CheckOutcome::Refuted {
            operations: vec![model_values(&output, &op1)?, model_values(&output, &op2)?],
            initial_state: model_value(&output, &initial_state)?,
            actors: vec![
                (
                    "Actor 1 (after op 1)".to_string(),
                    model_value(&output, &after_0_op1)?,
                ),
                (
                    "Actor 1 (after op 1 + 2)".to_string(),
                    model_value(&output, &after_0_op2)?,
                ),
                (
                    "Actor 2 (after op 2)".to_string(),
                    model_value(&output, &after_1_op2)?,
                ),
                (
                    "Actor 2 (after op 2 + 1)".to_string(),
                    model_value(&output, &after_1_op1)?,
                ),
            ],
        }
    } else {
        CheckOutcome::Holds
    };
    Ok(CheckReport {
        property: AciProperty::Commutativity,
        outcome,
    })
}

/// Check that re-applying an operation is a no-op:
/// `N(N(s, op), op) = N(s, op)`.
pub fn check_i(
    next_state: &RoutineAnalysis,
    config: &SolverConfig,
) -> Result<CheckReport, AciError> {
    let mut tracker = VariableTracker::new();
    let state_type = next_state.arguments[0].ty();

    let initial_state = tracker.variable("initial_state", state_type.clone());
    let op: Vec<Expr> = {
        let mut group = tracker.group("op");
        next_state.arguments[1..]
            .iter()
            .map(|v| group.variable(v.var_name().unwrap_or("arg"), v.ty()))
            .collect()
    };

    let after_op = tracker.variable("afterState_op", state_type.clone());
    let after_op_op = tracker.variable("afterState_op_op", state_type.clone());

    let first_args: Vec<Expr> = std::iter::once(initial_state.clone())
        .chain(op.iter().cloned())
        .collect();
    let vc = next_state.call(&first_args, &mut tracker, |tracker, state_op| {
        let second_args: Vec<Expr> = std::iter::once(state_op.clone())
            .chain(op.iter().cloned())
            .collect();
        Expr::implies(
            Expr::eq(state_op.clone(), after_op.clone()),
            next_state.call(&second_args, tracker, |_tracker, state_op_op| {
                Expr::implies(
                    Expr::eq(state_op_op.clone(), after_op_op.clone()),
                    Expr::eq(state_op.clone(), state_op_op),
                )
            }),
        )
    });

    let smt_file = config.scratch_dir.join("idempotence-test.smt");
    smt::to_smt(&vc, tracker.all(), &[], &smt_file)?;
    let output = run_solver(config, &smt_file)?;

    let outcome = if verdict(&output)? {
        CheckOutcome::Refuted {
            operations: vec![model_values(&output, &op)?],
            initial_state: model_value(&output, &initial_state)?,
            actors: vec![
                (
                    "After 1 operation".to_string(),
                    model_value(&output, &after_op)?,
                ),
                (
                    "After 2 operations (op + op)".to_string(),
                    model_value(&output, &after_op_op)?,
                ),
            ],
        }
    } else {
        CheckOutcome::Holds
    };
    Ok(CheckReport {
        property: AciProperty::Idempotence,
        outcome,
    })
}

/// Run both checks.
pub fn check_aci(
    next_state: &RoutineAnalysis,
    config: &SolverConfig,
) -> Result<(CheckReport, CheckReport), AciError> {
    Ok((check_c(next_state, config)?, check_i(next_state, config)?))
}
