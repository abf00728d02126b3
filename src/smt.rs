// SMT-LIB2 serialization of verification conditions and model parsing

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::ir::{Expr, ExprNode, Type, Value};

#[derive(Debug, Error)]
pub enum SmtError {
    #[error("cannot serialize to SMT-LIB: {0}")]
    Unsupported(String),
    #[error("failed to write the SMT file")]
    Io(#[from] std::io::Error),
}

/// Serialize `(not vc)` with the given quantifier-free variables and
/// background definitions into an SMT-LIB2 file: a `sat` answer is a
/// counterexample model, `unsat` proves the condition.
pub fn to_smt(vc: &Expr, vars: &[Expr], decls: &[Expr], path: &Path) -> Result<(), SmtError> {
    let mut out = String::new();
    out.push_str("(set-logic ALL)\n");

    let mut arities = BTreeSet::new();
    collect_tuple_arities_expr(vc, &mut arities);
    for var in vars {
        collect_tuple_arities_type(&var.ty(), &mut arities);
    }
    for decl in decls {
        collect_tuple_arities_expr(decl, &mut arities);
    }
    for n in arities {
        out.push_str(&tuple_datatype(n));
    }

    for decl in decls {
        out.push_str(&fn_decl_to_smt(decl)?);
    }

    for var in vars {
        let name = var
            .var_name()
            .ok_or_else(|| SmtError::Unsupported("non-variable in declaration list".into()))?;
        out.push_str(&format!(
            "(declare-const {name} {})\n",
            type_to_smt(&var.ty())?
        ));
    }

    out.push_str(&format!("(assert (not {}))\n", expr_to_smt(vc)?));
    out.push_str("(check-sat)\n(get-model)\n");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, out)?;
    Ok(())
}

fn tuple_datatype(n: usize) -> String {
    let params: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
    let selectors: Vec<String> = (0..n)
        .map(|i| format!("(tuple{n}_{i} T{i})"))
        .collect();
    format!(
        "(declare-datatypes ((Tuple{n} {n})) ((par ({}) ((tuple{n} {})))))\n",
        params.join(" "),
        selectors.join(" ")
    )
}

fn collect_tuple_arities_type(ty: &Type, arities: &mut BTreeSet<usize>) {
    match ty {
        Type::Tuple(args) => {
            arities.insert(args.len());
            for t in args {
                collect_tuple_arities_type(t, arities);
            }
        }
        Type::Set(t) | Type::List(t) => collect_tuple_arities_type(t, arities),
        Type::Map(k, v) => {
            collect_tuple_arities_type(k, arities);
            collect_tuple_arities_type(v, arities);
        }
        Type::Fn(ret, params) => {
            collect_tuple_arities_type(ret, arities);
            for t in params {
                collect_tuple_arities_type(t, arities);
            }
        }
        _ => {}
    }
}

fn collect_tuple_arities_expr(e: &Expr, arities: &mut BTreeSet<usize>) {
    match e.node() {
        ExprNode::Var(_, t) | ExprNode::Lit(_, t) | ExprNode::Call(_, t, _) => {
            collect_tuple_arities_type(t, arities);
        }
        ExprNode::Tuple(args) => {
            arities.insert(args.len());
        }
        _ => {}
    }
    for child in e.children() {
        collect_tuple_arities_expr(child, arities);
    }
}

pub fn type_to_smt(ty: &Type) -> Result<String, SmtError> {
    Ok(match ty {
        Type::Bool => "Bool".to_string(),
        Type::Int | Type::ClockInt | Type::EnumInt | Type::OpaqueInt | Type::NodeIdInt => {
            "Int".to_string()
        }
        Type::Set(t) => format!("(Set {})", type_to_smt(t)?),
        Type::List(t) => format!("(Seq {})", type_to_smt(t)?),
        Type::Map(k, v) => format!("(Array {} {})", type_to_smt(k)?, type_to_smt(v)?),
        Type::Tuple(args) => {
            let inner = args
                .iter()
                .map(type_to_smt)
                .collect::<Result<Vec<_>, _>>()?;
            format!("(Tuple{} {})", args.len(), inner.join(" "))
        }
        Type::Fn(_, _) => {
            return Err(SmtError::Unsupported(
                "first-class function types".to_string(),
            ));
        }
    })
}

fn fn_decl_to_smt(decl: &Expr) -> Result<String, SmtError> {
    let (name, ret, body, params, recursive) = match decl.node() {
        ExprNode::FnDecl(name, ret, body, params) => (name, ret, body, params, true),
        ExprNode::FnDeclNonRecursive(name, ret, body, params) => (name, ret, body, params, false),
        other => {
            return Err(SmtError::Unsupported(format!(
                "background definition that is not a function declaration: {other:?}"
            )));
        }
    };
    let binders = params
        .iter()
        .map(|p| {
            let pname = p
                .var_name()
                .ok_or_else(|| SmtError::Unsupported("non-variable parameter".into()))?;
            Ok(format!("({pname} {})", type_to_smt(&p.ty())?))
        })
        .collect::<Result<Vec<_>, SmtError>>()?;
    let keyword = if recursive { "define-fun-rec" } else { "define-fun" };
    Ok(format!(
        "({keyword} {name} ({}) {} {})\n",
        binders.join(" "),
        type_to_smt(ret)?,
        expr_to_smt(body)?
    ))
}

fn nary(op: &str, args: &[Expr]) -> Result<String, SmtError> {
    let parts = args
        .iter()
        .map(expr_to_smt)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({op} {})", parts.join(" ")))
}

pub fn expr_to_smt(e: &Expr) -> Result<String, SmtError> {
    Ok(match e.node() {
        ExprNode::Var(name, _) => name.clone(),
        ExprNode::Lit(Value::Bool(b), _) => b.to_string(),
        ExprNode::Lit(Value::Int(i), _) => {
            if *i < 0 {
                format!("(- {})", -i)
            } else {
                i.to_string()
            }
        }
        ExprNode::And(args) => nary("and", args)?,
        ExprNode::Or(args) => nary("or", args)?,
        ExprNode::Not(a) => format!("(not {})", expr_to_smt(a)?),
        ExprNode::Eq(a, b) => format!("(= {} {})", expr_to_smt(a)?, expr_to_smt(b)?),
        ExprNode::Gt(a, b) => format!("(> {} {})", expr_to_smt(a)?, expr_to_smt(b)?),
        ExprNode::Ge(a, b) => format!("(>= {} {})", expr_to_smt(a)?, expr_to_smt(b)?),
        ExprNode::Lt(a, b) => format!("(< {} {})", expr_to_smt(a)?, expr_to_smt(b)?),
        ExprNode::Add(a, b) => format!("(+ {} {})", expr_to_smt(a)?, expr_to_smt(b)?),
        ExprNode::Sub(a, b) => format!("(- {} {})", expr_to_smt(a)?, expr_to_smt(b)?),
        ExprNode::Implies(a, b) => format!("(=> {} {})", expr_to_smt(a)?, expr_to_smt(b)?),
        ExprNode::Ite(c, t, f) => format!(
            "(ite {} {} {})",
            expr_to_smt(c)?,
            expr_to_smt(t)?,
            expr_to_smt(f)?
        ),
        ExprNode::Let(binder, value, body) => {
            let name = binder
                .var_name()
                .ok_or_else(|| SmtError::Unsupported("non-variable let binder".into()))?;
            format!(
                "(let (({name} {})) {})",
                expr_to_smt(value)?,
                expr_to_smt(body)?
            )
        }
        ExprNode::Tuple(args) => nary(&format!("tuple{}", args.len()), args)?,
        ExprNode::TupleGet(tuple, index) => {
            let arity = match tuple.ty() {
                Type::Tuple(parts) => parts.len(),
                other => {
                    return Err(SmtError::Unsupported(format!(
                        "tuple projection from {other}"
                    )));
                }
            };
            format!("(tuple{arity}_{index} {})", expr_to_smt(tuple)?)
        }
        ExprNode::Call(name, ret, args) => call_to_smt(name, ret, args)?,
        ExprNode::CallValue(f, args) => {
            let fname = f.var_name().ok_or_else(|| {
                SmtError::Unsupported("higher-order call through a non-variable".into())
            })?;
            if args.is_empty() {
                fname.to_string()
            } else {
                let parts = args
                    .iter()
                    .map(expr_to_smt)
                    .collect::<Result<Vec<_>, _>>()?;
                format!("({fname} {})", parts.join(" "))
            }
        }
        ExprNode::Lambda(_, _, _) => {
            return Err(SmtError::Unsupported("lambda outside a map/reduce call".into()));
        }
        ExprNode::Choose(_) | ExprNode::Synth(_, _, _) => {
            return Err(SmtError::Unsupported(
                "unresolved synthesis hole in a verification condition".into(),
            ));
        }
        other => {
            return Err(SmtError::Unsupported(format!("{other:?}")));
        }
    })
}

fn call_to_smt(name: &str, ret: &Type, args: &[Expr]) -> Result<String, SmtError> {
    Ok(match name {
        "set-union" => nary("set.union", args)?,
        "set-minus" => nary("set.minus", args)?,
        "set-insert" => nary("set.insert", args)?,
        "set-singleton" => nary("set.singleton", args)?,
        "set-member" => nary("set.member", args)?,
        "set-subset" => nary("set.subset", args)?,
        "set-create" => format!("(as set.empty {})", type_to_smt(ret)?),
        "list_length" => format!("(seq.len {})", expr_to_smt(&args[0])?),
        "list_get" => format!(
            "(seq.nth {} {})",
            expr_to_smt(&args[0])?,
            expr_to_smt(&args[1])?
        ),
        "list_tail" => {
            let l = expr_to_smt(&args[0])?;
            let i = expr_to_smt(&args[1])?;
            format!("(seq.extract {l} {i} (- (seq.len {l}) {i}))")
        }
        "list_prepend" => format!(
            "(seq.++ (seq.unit {}) {})",
            expr_to_smt(&args[0])?,
            expr_to_smt(&args[1])?
        ),
        "list_empty" => format!("(as seq.empty {})", type_to_smt(ret)?),
        "map-create" | "map-singleton" | "map-get" | "map-union" | "map-values"
        | "reduce_bool" | "reduce_int" => {
            return Err(SmtError::Unsupported(format!(
                "map primitive '{name}' requires the synthesis backend's map theory"
            )));
        }
        // user-defined or background function
        _ => {
            if args.is_empty() {
                name.to_string()
            } else {
                nary(name, args)?
            }
        }
    })
}

/// A value extracted from a solver model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValue {
    Int(i64),
    Bool(bool),
    Tuple(Vec<ModelValue>),
    Raw(String),
}

impl fmt::Display for ModelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelValue::Int(i) => write!(f, "{i}"),
            ModelValue::Bool(b) => write!(f, "{b}"),
            ModelValue::Tuple(parts) => {
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            ModelValue::Raw(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

fn parse_sexp(input: &str) -> Option<(Sexp, &str)> {
    let input = input.trim_start();
    if let Some(rest) = input.strip_prefix('(') {
        let mut rest = rest;
        let mut items = Vec::new();
        loop {
            let trimmed = rest.trim_start();
            if let Some(after) = trimmed.strip_prefix(')') {
                return Some((Sexp::List(items), after));
            }
            let (item, remaining) = parse_sexp(trimmed)?;
            items.push(item);
            rest = remaining;
        }
    }
    if input.is_empty() || input.starts_with(')') {
        return None;
    }
    let end = input
        .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    Some((Sexp::Atom(input[..end].to_string()), &input[end..]))
}

fn sexp_to_value(sexp: &Sexp) -> ModelValue {
    match sexp {
        Sexp::Atom(a) => {
            if let Ok(i) = a.parse::<i64>() {
                ModelValue::Int(i)
            } else if a == "true" {
                ModelValue::Bool(true)
            } else if a == "false" {
                ModelValue::Bool(false)
            } else {
                ModelValue::Raw(a.clone())
            }
        }
        Sexp::List(items) => {
            if let [Sexp::Atom(op), arg] = items.as_slice()
                && op == "-"
                && let ModelValue::Int(i) = sexp_to_value(arg)
            {
                return ModelValue::Int(-i);
            }
            if let Some(Sexp::Atom(head)) = items.first()
                && head.starts_with("tuple")
            {
                return ModelValue::Tuple(items[1..].iter().map(sexp_to_value).collect());
            }
            ModelValue::Raw(render_sexp(sexp))
        }
    }
}

fn render_sexp(sexp: &Sexp) -> String {
    match sexp {
        Sexp::Atom(a) => a.clone(),
        Sexp::List(items) => {
            let inner: Vec<String> = items.iter().map(render_sexp).collect();
            format!("({})", inner.join(" "))
        }
    }
}

/// Find `(define-fun <name> () <type> <value>)` in solver output and return
/// the parsed value.
pub fn lookup_define_fun(output: &str, name: &str) -> Option<ModelValue> {
    let needle = format!("(define-fun {name} ");
    for line in output.lines() {
        let line = line.trim();
        if line.starts_with(&needle) {
            let (sexp, _) = parse_sexp(line)?;
            if let Sexp::List(items) = &sexp
                && items.len() >= 5
            {
                return Some(sexp_to_value(&items[4]));
            }
        }
    }
    None
}
