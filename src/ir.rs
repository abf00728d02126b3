// Typed expression algebra shared by lifted reference routines and
// synthesized replicated designs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Types carried by every expression node.
///
/// The integer flavours (`ClockInt`, `EnumInt`, `OpaqueInt`, `NodeIdInt`) all
/// share the logical domain of the integers but are deliberately distinct:
/// grammar expansion rules and the lattice catalogue dispatch on the flavour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int,
    ClockInt,
    EnumInt,
    OpaqueInt,
    NodeIdInt,
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    List(Box<Type>),
    Tuple(Vec<Type>),
    /// Function type: return type first, then parameter types.
    Fn(Box<Type>, Vec<Type>),
}

impl Type {
    pub fn set(elem: Type) -> Type {
        Type::Set(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn func(ret: Type, params: Vec<Type>) -> Type {
        Type::Fn(Box::new(ret), params)
    }

    pub fn is_int_flavour(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::ClockInt | Type::EnumInt | Type::OpaqueInt | Type::NodeIdInt
        )
    }

    /// Collapse the integer flavours to plain `Int`; other types unchanged.
    pub fn erase(&self) -> Type {
        if self.is_int_flavour() {
            Type::Int
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::Int => write!(f, "Int"),
            Type::ClockInt => write!(f, "ClockInt"),
            Type::EnumInt => write!(f, "EnumInt"),
            Type::OpaqueInt => write!(f, "OpaqueInt"),
            Type::NodeIdInt => write!(f, "NodeIDInt"),
            Type::Set(t) => write!(f, "Set[{t}]"),
            Type::Map(k, v) => write!(f, "Map[{k}, {v}]"),
            Type::List(t) => write!(f, "List[{t}]"),
            Type::Tuple(args) => {
                write!(f, "Tuple[")?;
                for (i, t) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "]")
            }
            Type::Fn(ret, params) => {
                write!(f, "Fn[{ret}")?;
                for t in params {
                    write!(f, ", {t}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Ground literal payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

/// An immutable, reference-counted expression tree.
///
/// Cloning is cheap (an `Arc` bump); equality and hashing are structural, so
/// `Choose` alternatives deduplicate by shape. Shared subtrees keep their
/// identity through `rewrite` when no substitution applies underneath.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expr(Arc<ExprNode>);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprNode {
    Var(String, Type),
    Lit(Value, Type),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Expr),
    Eq(Expr, Expr),
    Gt(Expr, Expr),
    Ge(Expr, Expr),
    Lt(Expr, Expr),
    Add(Expr, Expr),
    Sub(Expr, Expr),
    Implies(Expr, Expr),
    Ite(Expr, Expr, Expr),
    /// `Let(binder, value, body)`; the binder is a `Var`.
    Let(Expr, Expr, Expr),
    /// `Lambda(return type, body, parameter vars)`.
    Lambda(Type, Expr, Vec<Expr>),
    /// Named library call: `Call(name, result type, args)`.
    Call(String, Type, Vec<Expr>),
    /// Call through a function-typed expression.
    CallValue(Expr, Vec<Expr>),
    Tuple(Vec<Expr>),
    TupleGet(Expr, usize),
    /// Non-deterministic grammar hole: one of the alternatives.
    Choose(Vec<Expr>),
    /// Named synthesis hole: `Synth(name, grammar body, parameters)`.
    Synth(String, Expr, Vec<Expr>),
    /// `FnDecl(name, return type, body, parameters)`.
    FnDecl(String, Type, Expr, Vec<Expr>),
    FnDeclNonRecursive(String, Type, Expr, Vec<Expr>),
    /// Background fact quantified over the given vars.
    Axiom(Expr, Vec<Expr>),
    /// Opaque lifted instruction produced by the IR frontend; carried so
    /// frontend output round-trips through the algebra untouched.
    MLInst(String, Type, Vec<Expr>),
}

impl Expr {
    fn new(node: ExprNode) -> Expr {
        Expr(Arc::new(node))
    }

    pub fn node(&self) -> &ExprNode {
        &self.0
    }

    /// Pointer identity, used to detect untouched subtrees after `rewrite`.
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Expr {
        Expr::new(ExprNode::Var(name.into(), ty))
    }

    pub fn lit(value: Value, ty: Type) -> Expr {
        Expr::new(ExprNode::Lit(value, ty))
    }

    pub fn bool_lit(b: bool) -> Expr {
        Expr::lit(Value::Bool(b), Type::Bool)
    }

    pub fn int_lit(i: i64) -> Expr {
        Expr::lit(Value::Int(i), Type::Int)
    }

    pub fn enum_int_lit(i: i64) -> Expr {
        Expr::lit(Value::Int(i), Type::EnumInt)
    }

    pub fn and(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::And(vec![a, b]))
    }

    /// Variadic conjunction; empty input collapses to `true` and a single
    /// conjunct is returned unchanged.
    pub fn and_all(mut args: Vec<Expr>) -> Expr {
        match args.len() {
            0 => Expr::bool_lit(true),
            1 => args.remove(0),
            _ => Expr::new(ExprNode::And(args)),
        }
    }

    pub fn or(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Or(vec![a, b]))
    }

    pub fn not(e: Expr) -> Expr {
        Expr::new(ExprNode::Not(e))
    }

    pub fn eq(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Eq(a, b))
    }

    pub fn gt(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Gt(a, b))
    }

    pub fn ge(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Ge(a, b))
    }

    pub fn lt(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Lt(a, b))
    }

    pub fn add(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Add(a, b))
    }

    pub fn sub(a: Expr, b: Expr) -> Expr {
        Expr::new(ExprNode::Sub(a, b))
    }

    pub fn implies(premise: Expr, conclusion: Expr) -> Expr {
        Expr::new(ExprNode::Implies(premise, conclusion))
    }

    pub fn ite(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::new(ExprNode::Ite(cond, then, otherwise))
    }

    pub fn let_in(binder: Expr, value: Expr, body: Expr) -> Expr {
        debug_assert!(matches!(binder.node(), ExprNode::Var(..)));
        Expr::new(ExprNode::Let(binder, value, body))
    }

    pub fn lambda(ret: Type, body: Expr, params: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::Lambda(ret, body, params))
    }

    pub fn call(name: impl Into<String>, ret: Type, args: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::Call(name.into(), ret, args))
    }

    pub fn call_value(f: Expr, args: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::CallValue(f, args))
    }

    pub fn tuple(args: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::Tuple(args))
    }

    pub fn tuple_get(tuple: Expr, index: usize) -> Expr {
        Expr::new(ExprNode::TupleGet(tuple, index))
    }

    pub fn choose(args: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::Choose(args))
    }

    pub fn synth(name: impl Into<String>, body: Expr, params: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::Synth(name.into(), body, params))
    }

    pub fn fn_decl(name: impl Into<String>, ret: Type, body: Expr, params: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::FnDecl(name.into(), ret, body, params))
    }

    pub fn fn_decl_non_recursive(
        name: impl Into<String>,
        ret: Type,
        body: Expr,
        params: Vec<Expr>,
    ) -> Expr {
        Expr::new(ExprNode::FnDeclNonRecursive(name.into(), ret, body, params))
    }

    pub fn axiom(statement: Expr, vars: Vec<Expr>) -> Expr {
        Expr::new(ExprNode::Axiom(statement, vars))
    }

    /// The variable's name, if this node is a `Var`.
    pub fn var_name(&self) -> Option<&str> {
        match self.node() {
            ExprNode::Var(name, _) => Some(name),
            _ => None,
        }
    }

    /// The components, if this node is a `Tuple` constructor.
    pub fn tuple_parts(&self) -> Option<&[Expr]> {
        match self.node() {
            ExprNode::Tuple(args) => Some(args),
            _ => None,
        }
    }

    /// The declared name, if this node is a `Synth`, `FnDecl`, or
    /// `FnDeclNonRecursive`.
    pub fn decl_name(&self) -> Option<&str> {
        match self.node() {
            ExprNode::Synth(name, _, _)
            | ExprNode::FnDecl(name, _, _, _)
            | ExprNode::FnDeclNonRecursive(name, _, _, _) => Some(name),
            _ => None,
        }
    }

    /// Result type of this expression.
    ///
    /// Panics on an ill-formed tree (`TupleGet` of a non-tuple or
    /// out-of-range index); construction is expected to keep trees
    /// well-typed, and hiding that bug would poison every downstream VC.
    pub fn ty(&self) -> Type {
        match self.node() {
            ExprNode::Var(_, t) | ExprNode::Lit(_, t) => t.clone(),
            ExprNode::And(_)
            | ExprNode::Or(_)
            | ExprNode::Not(_)
            | ExprNode::Eq(_, _)
            | ExprNode::Gt(_, _)
            | ExprNode::Ge(_, _)
            | ExprNode::Lt(_, _)
            | ExprNode::Implies(_, _)
            | ExprNode::Axiom(_, _) => Type::Bool,
            ExprNode::Add(a, _) | ExprNode::Sub(a, _) => a.ty(),
            ExprNode::Ite(_, then, _) => then.ty(),
            ExprNode::Let(_, _, body) => body.ty(),
            ExprNode::Lambda(ret, _, params) => {
                Type::func(ret.clone(), params.iter().map(Expr::ty).collect())
            }
            ExprNode::Call(_, t, _) | ExprNode::MLInst(_, t, _) => t.clone(),
            ExprNode::CallValue(f, _) => match f.ty() {
                Type::Fn(ret, _) => *ret,
                other => other,
            },
            ExprNode::Tuple(args) => Type::Tuple(args.iter().map(Expr::ty).collect()),
            ExprNode::TupleGet(tuple, index) => match tuple.ty() {
                Type::Tuple(args) => args
                    .get(*index)
                    .cloned()
                    .unwrap_or_else(|| panic!("TupleGet index {index} out of range")),
                other => panic!("TupleGet of non-tuple type {other}"),
            },
            ExprNode::Choose(args) => args
                .first()
                .map(Expr::ty)
                .unwrap_or_else(|| panic!("Choose with no alternatives has no type")),
            ExprNode::Synth(_, body, _) => body.ty(),
            ExprNode::FnDecl(_, ret, _, params)
            | ExprNode::FnDeclNonRecursive(_, ret, _, params) => {
                Type::func(ret.clone(), params.iter().map(Expr::ty).collect())
            }
        }
    }

    /// Deep substitution of free variables by name.
    ///
    /// Structural over all children; `Let`, `Lambda`, `Synth`, and `FnDecl`
    /// binders shadow their names in the subtree they bind. Subtrees the
    /// substitution never touches are returned as the same shared node.
    pub fn rewrite(&self, subst: &HashMap<String, Expr>) -> Expr {
        if subst.is_empty() {
            return self.clone();
        }
        match self.node() {
            ExprNode::Var(name, _) => match subst.get(name) {
                Some(replacement) => replacement.clone(),
                None => self.clone(),
            },
            ExprNode::Lit(_, _) => self.clone(),
            ExprNode::And(args) => {
                let (args2, changed) = rewrite_all(args, subst);
                if changed {
                    Expr::new(ExprNode::And(args2))
                } else {
                    self.clone()
                }
            }
            ExprNode::Or(args) => {
                let (args2, changed) = rewrite_all(args, subst);
                if changed {
                    Expr::new(ExprNode::Or(args2))
                } else {
                    self.clone()
                }
            }
            ExprNode::Not(a) => self.rebuild1(a, subst, ExprNode::Not),
            ExprNode::Eq(a, b) => self.rebuild2(a, b, subst, ExprNode::Eq),
            ExprNode::Gt(a, b) => self.rebuild2(a, b, subst, ExprNode::Gt),
            ExprNode::Ge(a, b) => self.rebuild2(a, b, subst, ExprNode::Ge),
            ExprNode::Lt(a, b) => self.rebuild2(a, b, subst, ExprNode::Lt),
            ExprNode::Add(a, b) => self.rebuild2(a, b, subst, ExprNode::Add),
            ExprNode::Sub(a, b) => self.rebuild2(a, b, subst, ExprNode::Sub),
            ExprNode::Implies(a, b) => self.rebuild2(a, b, subst, ExprNode::Implies),
            ExprNode::Ite(c, t, e) => {
                let c2 = c.rewrite(subst);
                let t2 = t.rewrite(subst);
                let e2 = e.rewrite(subst);
                if c.ptr_eq(&c2) && t.ptr_eq(&t2) && e.ptr_eq(&e2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::Ite(c2, t2, e2))
                }
            }
            ExprNode::Let(binder, value, body) => {
                let value2 = value.rewrite(subst);
                let body2 = rewrite_under(body, subst, std::slice::from_ref(binder));
                if value.ptr_eq(&value2) && body.ptr_eq(&body2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::Let(binder.clone(), value2, body2))
                }
            }
            ExprNode::Lambda(ret, body, params) => {
                let body2 = rewrite_under(body, subst, params);
                if body.ptr_eq(&body2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::Lambda(ret.clone(), body2, params.clone()))
                }
            }
            ExprNode::Call(name, ret, args) => {
                let (args2, changed) = rewrite_all(args, subst);
                if changed {
                    Expr::new(ExprNode::Call(name.clone(), ret.clone(), args2))
                } else {
                    self.clone()
                }
            }
            ExprNode::CallValue(f, args) => {
                let f2 = f.rewrite(subst);
                let (args2, changed) = rewrite_all(args, subst);
                if f.ptr_eq(&f2) && !changed {
                    self.clone()
                } else {
                    Expr::new(ExprNode::CallValue(f2, args2))
                }
            }
            ExprNode::Tuple(args) => {
                let (args2, changed) = rewrite_all(args, subst);
                if changed {
                    Expr::new(ExprNode::Tuple(args2))
                } else {
                    self.clone()
                }
            }
            ExprNode::TupleGet(tuple, index) => {
                let tuple2 = tuple.rewrite(subst);
                if tuple.ptr_eq(&tuple2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::TupleGet(tuple2, *index))
                }
            }
            ExprNode::Choose(args) => {
                let (args2, changed) = rewrite_all(args, subst);
                if changed {
                    Expr::new(ExprNode::Choose(args2))
                } else {
                    self.clone()
                }
            }
            ExprNode::Synth(name, body, params) => {
                let body2 = rewrite_under(body, subst, params);
                if body.ptr_eq(&body2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::Synth(name.clone(), body2, params.clone()))
                }
            }
            ExprNode::FnDecl(name, ret, body, params) => {
                let body2 = rewrite_under(body, subst, params);
                if body.ptr_eq(&body2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::FnDecl(name.clone(), ret.clone(), body2, params.clone()))
                }
            }
            ExprNode::FnDeclNonRecursive(name, ret, body, params) => {
                let body2 = rewrite_under(body, subst, params);
                if body.ptr_eq(&body2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::FnDeclNonRecursive(
                        name.clone(),
                        ret.clone(),
                        body2,
                        params.clone(),
                    ))
                }
            }
            ExprNode::Axiom(statement, vars) => {
                let statement2 = rewrite_under(statement, subst, vars);
                if statement.ptr_eq(&statement2) {
                    self.clone()
                } else {
                    Expr::new(ExprNode::Axiom(statement2, vars.clone()))
                }
            }
            ExprNode::MLInst(name, ret, args) => {
                let (args2, changed) = rewrite_all(args, subst);
                if changed {
                    Expr::new(ExprNode::MLInst(name.clone(), ret.clone(), args2))
                } else {
                    self.clone()
                }
            }
        }
    }

    fn rebuild1(
        &self,
        a: &Expr,
        subst: &HashMap<String, Expr>,
        make: impl FnOnce(Expr) -> ExprNode,
    ) -> Expr {
        let a2 = a.rewrite(subst);
        if a.ptr_eq(&a2) {
            self.clone()
        } else {
            Expr::new(make(a2))
        }
    }

    fn rebuild2(
        &self,
        a: &Expr,
        b: &Expr,
        subst: &HashMap<String, Expr>,
        make: impl FnOnce(Expr, Expr) -> ExprNode,
    ) -> Expr {
        let a2 = a.rewrite(subst);
        let b2 = b.rewrite(subst);
        if a.ptr_eq(&a2) && b.ptr_eq(&b2) {
            self.clone()
        } else {
            Expr::new(make(a2, b2))
        }
    }

    /// All direct children, binders and parameters included.
    pub fn children(&self) -> Vec<&Expr> {
        match self.node() {
            ExprNode::Var(_, _) | ExprNode::Lit(_, _) => vec![],
            ExprNode::And(args)
            | ExprNode::Or(args)
            | ExprNode::Tuple(args)
            | ExprNode::Choose(args) => args.iter().collect(),
            ExprNode::Not(a) | ExprNode::TupleGet(a, _) => vec![a],
            ExprNode::Eq(a, b)
            | ExprNode::Gt(a, b)
            | ExprNode::Ge(a, b)
            | ExprNode::Lt(a, b)
            | ExprNode::Add(a, b)
            | ExprNode::Sub(a, b)
            | ExprNode::Implies(a, b) => vec![a, b],
            ExprNode::Ite(c, t, e) => vec![c, t, e],
            ExprNode::Let(binder, value, body) => vec![binder, value, body],
            ExprNode::Lambda(_, body, params) => {
                let mut out = vec![body];
                out.extend(params.iter());
                out
            }
            ExprNode::Call(_, _, args) | ExprNode::MLInst(_, _, args) => args.iter().collect(),
            ExprNode::CallValue(f, args) => {
                let mut out = vec![f];
                out.extend(args.iter());
                out
            }
            ExprNode::Synth(_, body, params)
            | ExprNode::FnDecl(_, _, body, params)
            | ExprNode::FnDeclNonRecursive(_, _, body, params) => {
                let mut out = vec![body];
                out.extend(params.iter());
                out
            }
            ExprNode::Axiom(statement, vars) => {
                let mut out = vec![statement];
                out.extend(vars.iter());
                out
            }
        }
    }

    /// True iff `needle` occurs (structurally) somewhere in this tree.
    pub fn contains(&self, needle: &Expr) -> bool {
        if self == needle {
            return true;
        }
        self.children().into_iter().any(|child| child.contains(needle))
    }
}

fn rewrite_all(exprs: &[Expr], subst: &HashMap<String, Expr>) -> (Vec<Expr>, bool) {
    let mut changed = false;
    let out = exprs
        .iter()
        .map(|e| {
            let e2 = e.rewrite(subst);
            if !e.ptr_eq(&e2) {
                changed = true;
            }
            e2
        })
        .collect();
    (out, changed)
}

fn rewrite_under(body: &Expr, subst: &HashMap<String, Expr>, binders: &[Expr]) -> Expr {
    let shadowed: Vec<&str> = binders
        .iter()
        .filter_map(Expr::var_name)
        .filter(|name| subst.contains_key(*name))
        .collect();
    if shadowed.is_empty() {
        body.rewrite(subst)
    } else {
        let mut narrowed = subst.clone();
        for name in shadowed {
            narrowed.remove(name);
        }
        body.rewrite(&narrowed)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, head: &str, args: &[Expr]) -> fmt::Result {
            write!(f, "({head}")?;
            for a in args {
                write!(f, " {a}")?;
            }
            write!(f, ")")
        }
        match self.node() {
            ExprNode::Var(name, _) => write!(f, "{name}"),
            ExprNode::Lit(Value::Bool(b), _) => write!(f, "{b}"),
            ExprNode::Lit(Value::Int(i), _) => write!(f, "{i}"),
            ExprNode::And(args) => list(f, "and", args),
            ExprNode::Or(args) => list(f, "or", args),
            ExprNode::Not(a) => write!(f, "(not {a})"),
            ExprNode::Eq(a, b) => write!(f, "(= {a} {b})"),
            ExprNode::Gt(a, b) => write!(f, "(> {a} {b})"),
            ExprNode::Ge(a, b) => write!(f, "(>= {a} {b})"),
            ExprNode::Lt(a, b) => write!(f, "(< {a} {b})"),
            ExprNode::Add(a, b) => write!(f, "(+ {a} {b})"),
            ExprNode::Sub(a, b) => write!(f, "(- {a} {b})"),
            ExprNode::Implies(a, b) => write!(f, "(=> {a} {b})"),
            ExprNode::Ite(c, t, e) => write!(f, "(ite {c} {t} {e})"),
            ExprNode::Let(binder, value, body) => write!(f, "(let (({binder} {value})) {body})"),
            ExprNode::Lambda(_, body, params) => {
                write!(f, "(lambda (")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") {body})")
            }
            ExprNode::Call(name, _, args) => list(f, name, args),
            ExprNode::CallValue(callee, args) => {
                write!(f, "({callee}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            ExprNode::Tuple(args) => list(f, "tuple", args),
            ExprNode::TupleGet(tuple, index) => write!(f, "(tupleGet {tuple} {index})"),
            ExprNode::Choose(args) => list(f, "choose", args),
            ExprNode::Synth(name, body, _) => write!(f, "(synth {name} {body})"),
            ExprNode::FnDecl(name, _, body, params)
            | ExprNode::FnDeclNonRecursive(name, _, body, params) => {
                write!(f, "(define ({name}")?;
                for p in params {
                    write!(f, " {p}")?;
                }
                write!(f, ") {body})")
            }
            ExprNode::Axiom(statement, _) => write!(f, "(axiom {statement})"),
            ExprNode::MLInst(name, _, args) => list(f, name, args),
        }
    }
}
