// Lifted reference-routine analyses and fresh-variable tracking

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::{Expr, Type};

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse lifted routines in {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no routine named '{0}' in the lifted bundle")]
    UnknownRoutine(String),
}

/// Allocates fresh variables for verification-condition construction and
/// remembers every variable it handed out.
#[derive(Debug, Default)]
pub struct VariableTracker {
    counts: HashMap<String, usize>,
    all: Vec<Expr>,
}

impl VariableTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh variable; repeated requests for the same base name get a
    /// numeric suffix.
    pub fn variable(&mut self, name: &str, ty: Type) -> Expr {
        let count = self.counts.entry(name.to_string()).or_insert(0);
        let fresh = if *count == 0 {
            name.to_string()
        } else {
            format!("{name}_{count}")
        };
        *count += 1;
        let var = Expr::var(fresh, ty);
        self.all.push(var.clone());
        var
    }

    /// A namespaced sub-allocator; its variables share this tracker's
    /// registry but carry the group prefix.
    pub fn group(&mut self, prefix: &str) -> VariableGroup<'_> {
        VariableGroup {
            tracker: self,
            prefix: prefix.to_string(),
        }
    }

    /// Every variable allocated so far, in allocation order.
    pub fn all(&self) -> &[Expr] {
        &self.all
    }
}

pub struct VariableGroup<'a> {
    tracker: &'a mut VariableTracker,
    prefix: String,
}

impl VariableGroup<'_> {
    pub fn variable(&mut self, name: &str, ty: Type) -> Expr {
        let prefixed = format!("{}_{name}", self.prefix);
        self.tracker.variable(&prefixed, ty)
    }
}

/// The analysis of one lifted reference routine: its signature and its body
/// expressed in the expression algebra. Immutable once constructed.
///
/// The low-level IR lifter producing these is an external collaborator; the
/// in-tree frontend deserializes its JSON output (`load_bundle`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineAnalysis {
    pub name: String,
    /// Ordered typed parameters; the first is the state.
    pub arguments: Vec<Expr>,
    pub return_type: Type,
    pub body: Expr,
}

impl RoutineAnalysis {
    pub fn new(
        name: impl Into<String>,
        arguments: Vec<Expr>,
        return_type: Type,
        body: Expr,
    ) -> Self {
        debug_assert!(arguments.iter().all(|a| a.var_name().is_some()));
        RoutineAnalysis {
            name: name.into(),
            arguments,
            return_type,
            body,
        }
    }

    /// Inline one call of the routine into a verification condition.
    ///
    /// The body is instantiated with `args`, bound to a fresh tracker
    /// variable, and the continuation receives that variable. CPS-shaped so
    /// every inlining gets its own result name.
    pub fn call<K>(&self, args: &[Expr], tracker: &mut VariableTracker, k: K) -> Expr
    where
        K: FnOnce(&mut VariableTracker, Expr) -> Expr,
    {
        debug_assert_eq!(args.len(), self.arguments.len());
        let mut subst = HashMap::new();
        for (param, arg) in self.arguments.iter().zip(args) {
            if let Some(name) = param.var_name() {
                subst.insert(name.to_string(), arg.clone());
            }
        }
        let inlined = self.body.rewrite(&subst);
        let result = tracker.variable(&format!("{}_ret", self.name), self.return_type.clone());
        Expr::let_in(result.clone(), inlined, k(tracker, result))
    }
}

/// A lifted-routine bundle: every routine of one reference implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineBundle {
    pub routines: Vec<RoutineAnalysis>,
}

pub fn load_bundle(path: &Path) -> Result<RoutineBundle, FrontendError> {
    let text = fs::read_to_string(path).map_err(|source| FrontendError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| FrontendError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load the named routine's analysis from a lifted bundle. The loops
/// companion file is part of the frontend interface but carries no
/// information for pre-lifted bundles; the path is accepted and ignored.
pub fn analyze(
    ll_path: &Path,
    routine_name: &str,
    _loops_path: &Path,
) -> Result<RoutineAnalysis, FrontendError> {
    let bundle = load_bundle(ll_path)?;
    bundle
        .routines
        .into_iter()
        .find(|r| r.name == routine_name)
        .ok_or_else(|| FrontendError::UnknownRoutine(routine_name.to_string()))
}
