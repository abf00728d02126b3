// Type-directed construction of candidate-expression grammars

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ir::{Expr, ExprNode, Type, Value};
use crate::lattices::Lattice;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("no expressions of type {0} available in the grammar pool")]
    MissingPoolEntry(Type),
    #[error("unsupported map value type {0} in grammar expansion")]
    UnsupportedMapValue(Type),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GrammarOptions {
    /// Also offer `Ite(cond, x, x)` for non-collection pool types.
    pub enable_ite: bool,
    /// Offer `reduce_int`/`reduce_bool` rollups over node-id-keyed maps,
    /// capturing counter and flag aggregation across replicas.
    pub allow_node_id_reductions: bool,
}

impl GrammarOptions {
    pub fn with_ite(mut self) -> Self {
        self.enable_ite = true;
        self
    }

    pub fn with_node_id_reductions(mut self) -> Self {
        self.allow_node_id_reductions = true;
        self
    }
}

/// A grammar expansion requests sub-expressions from the pool through the
/// lookup; a missing pool entry skips the expansion for this round.
type Lookup<'a> = &'a dyn Fn(&Type) -> Option<Expr>;
type Expansion = Box<dyn Fn(Lookup) -> Option<Expr>>;

fn equality_supported_types() -> [Type; 5] {
    [
        Type::Bool,
        Type::Int,
        Type::ClockInt,
        Type::EnumInt,
        Type::OpaqueInt,
    ]
}

fn comparison_supported_types() -> [Type; 3] {
    [Type::Int, Type::ClockInt, Type::OpaqueInt]
}

fn gen_set_ops(out: &mut IndexMap<Type, Vec<Expansion>>, t: Type) {
    let set_t = Type::set(t.clone());

    let entry = out.entry(set_t.clone()).or_default();
    for name in ["set-minus", "set-union"] {
        let set_t = set_t.clone();
        entry.push(Box::new(move |get| {
            Some(Expr::call(
                name,
                set_t.clone(),
                vec![get(&set_t)?, get(&set_t)?],
            ))
        }));
    }
    {
        let set_t = set_t.clone();
        let t = t.clone();
        entry.push(Box::new(move |get| {
            Some(Expr::call(
                "set-insert",
                set_t.clone(),
                vec![get(&t)?, get(&set_t)?],
            ))
        }));
    }

    let bools = out.entry(Type::Bool).or_default();
    {
        let set_t = set_t.clone();
        bools.push(Box::new(move |get| {
            Some(Expr::eq(get(&set_t)?, get(&set_t)?))
        }));
    }
    {
        let set_t = set_t.clone();
        bools.push(Box::new(move |get| {
            Some(Expr::eq(
                get(&set_t)?,
                Expr::call("set-create", set_t.clone(), vec![]),
            ))
        }));
    }
    {
        let set_t = set_t.clone();
        bools.push(Box::new(move |get| {
            Some(Expr::call(
                "set-subset",
                Type::Bool,
                vec![get(&set_t)?, get(&set_t)?],
            ))
        }));
    }
    {
        let t = t.clone();
        bools.push(Box::new(move |get| {
            Some(Expr::call(
                "set-member",
                Type::Bool,
                vec![get(&t)?, get(&set_t)?],
            ))
        }));
    }
}

fn gen_map_ops(
    out: &mut IndexMap<Type, Vec<Expansion>>,
    key: Type,
    value: Type,
    allow_zero_create: bool,
    input_types: &[Type],
    out_types: &[Type],
    allow_node_id_reductions: bool,
) -> Result<(), GrammarError> {
    let map_t = Type::map(key.clone(), value.clone());

    if out_types.contains(&map_t) {
        let entry = out.entry(map_t.clone()).or_default();
        if allow_zero_create {
            let map_t = map_t.clone();
            entry.push(Box::new(move |_get| {
                Some(Expr::call("map-create", map_t.clone(), vec![]))
            }));
        } else {
            let key = key.clone();
            let value = value.clone();
            entry.push(Box::new(move |get| {
                let k = get(&key)?;
                Some(Expr::call(
                    "map-create",
                    Type::map(k.ty(), value.clone()),
                    vec![],
                ))
            }));
        }
        {
            let map_t = map_t.clone();
            let key = key.clone();
            let value = value.clone();
            entry.push(Box::new(move |get| {
                Some(Expr::call(
                    "map-singleton",
                    map_t.clone(),
                    vec![get(&key)?, get(&value)?],
                ))
            }));
        }
    }

    out.entry(value.clone()).or_default();

    if input_types.contains(&map_t) {
        if value.erase() == Type::Int {
            let entry = out.entry(value.clone()).or_default();
            {
                let map_t = map_t.clone();
                let key = key.clone();
                let value = value.clone();
                entry.push(Box::new(move |get| {
                    Some(Expr::call(
                        "map-get",
                        value.clone(),
                        vec![
                            get(&map_t)?,
                            get(&key)?,
                            Expr::lit(Value::Int(0), value.clone()),
                        ],
                    ))
                }));
            }

            if key == Type::NodeIdInt && allow_node_id_reductions && value == Type::Int {
                let map_t = map_t.clone();
                let value2 = value.clone();
                entry.push(Box::new(move |get| {
                    let merge_a = Expr::var("merge_into", value2.clone());
                    let merge_b = Expr::var("merge_v", value2.clone());
                    Some(Expr::call(
                        "reduce_int",
                        value2.clone(),
                        vec![
                            Expr::call("map-values", Type::list(value2.clone()), vec![get(&map_t)?]),
                            Expr::lambda(
                                value2.clone(),
                                Expr::add(merge_a.clone(), merge_b.clone()),
                                vec![merge_b, merge_a],
                            ),
                            Expr::int_lit(0),
                        ],
                    ))
                }));
            }
        } else if value == Type::Bool {
            let entry = out.entry(value.clone()).or_default();
            {
                let map_t = map_t.clone();
                let key = key.clone();
                entry.push(Box::new(move |get| {
                    Some(Expr::call(
                        "map-get",
                        Type::Bool,
                        vec![
                            get(&map_t)?,
                            get(&key)?,
                            Expr::choose(vec![Expr::bool_lit(false), Expr::bool_lit(true)]),
                        ],
                    ))
                }));
            }

            if key == Type::NodeIdInt && allow_node_id_reductions {
                for disjunctive in [true, false] {
                    let map_t = map_t.clone();
                    entry.push(Box::new(move |get| {
                        let merge_a = Expr::var("merge_into", Type::Bool);
                        let merge_b = Expr::var("merge_v", Type::Bool);
                        let body = if disjunctive {
                            Expr::or(merge_a.clone(), merge_b.clone())
                        } else {
                            Expr::and(merge_a.clone(), merge_b.clone())
                        };
                        Some(Expr::call(
                            "reduce_bool",
                            Type::Bool,
                            vec![
                                Expr::call("map-values", Type::list(Type::Bool), vec![get(&map_t)?]),
                                Expr::lambda(Type::Bool, body, vec![merge_b, merge_a]),
                                Expr::bool_lit(!disjunctive),
                            ],
                        ))
                    }));
                }
            }
        } else if matches!(value, Type::Map(_, _)) {
            let entry = out.entry(value.clone()).or_default();
            let map_t = map_t.clone();
            let key = key.clone();
            let value = value.clone();
            entry.push(Box::new(move |get| {
                Some(Expr::call(
                    "map-get",
                    value.clone(),
                    vec![
                        get(&map_t)?,
                        get(&key)?,
                        Expr::call("map-create", value.clone(), vec![]),
                    ],
                ))
            }));
        } else {
            return Err(GrammarError::UnsupportedMapValue(value));
        }
    }

    Ok(())
}

/// The type-directed expansion table: for each output type, the list of
/// expansion functions applicable this round.
fn get_expansions(
    input_types: &[Type],
    available_types: &[Type],
    out_types: &[Type],
    allow_node_id_reductions: bool,
) -> Result<IndexMap<Type, Vec<Expansion>>, GrammarError> {
    let mut out: IndexMap<Type, Vec<Expansion>> = IndexMap::new();

    let bools = out.entry(Type::Bool).or_default();
    bools.push(Box::new(|_get| Some(Expr::bool_lit(false))));
    bools.push(Box::new(|_get| Some(Expr::bool_lit(true))));
    bools.push(Box::new(|get| {
        Some(Expr::and(get(&Type::Bool)?, get(&Type::Bool)?))
    }));
    bools.push(Box::new(|get| {
        Some(Expr::or(get(&Type::Bool)?, get(&Type::Bool)?))
    }));
    bools.push(Box::new(|get| Some(Expr::not(get(&Type::Bool)?))));
    for t in equality_supported_types() {
        bools.push(Box::new(move |get| Some(Expr::eq(get(&t)?, get(&t)?))));
    }
    for t in comparison_supported_types() {
        bools.push(Box::new(move |get| Some(Expr::gt(get(&t)?, get(&t)?))));
    }
    for t in comparison_supported_types() {
        bools.push(Box::new(move |get| Some(Expr::ge(get(&t)?, get(&t)?))));
    }

    for t in equality_supported_types() {
        if input_types.contains(&t) {
            gen_set_ops(&mut out, t.clone());
        } else {
            out.entry(Type::set(t.clone())).or_default();
        }

        let set_t = Type::set(t.clone());
        if out_types.contains(&set_t) {
            let entry = out.entry(set_t.clone()).or_default();
            if input_types.contains(&t) {
                let set_t = set_t.clone();
                entry.push(Box::new(move |_get| {
                    Some(Expr::call("set-create", set_t.clone(), vec![]))
                }));
            } else {
                let t = t.clone();
                entry.push(Box::new(move |get| {
                    let elem = get(&t)?;
                    Some(Expr::call("set-create", Type::set(elem.ty()), vec![]))
                }));
            }
            let t = t.clone();
            entry.push(Box::new(move |get| {
                Some(Expr::call(
                    "set-singleton",
                    Type::set(t.clone()),
                    vec![get(&t)?],
                ))
            }));
        }
    }

    for t in available_types {
        if let Type::Map(key, value) = t {
            gen_map_ops(
                &mut out,
                (**key).clone(),
                (**value).clone(),
                input_types.contains(key),
                input_types,
                out_types,
                allow_node_id_reductions,
            )?;
        }
    }

    if input_types.contains(&Type::Int) {
        let entry = out.entry(Type::Int).or_default();
        entry.push(Box::new(|_get| Some(Expr::int_lit(0))));
        entry.push(Box::new(|_get| Some(Expr::int_lit(1))));
        entry.push(Box::new(|get| {
            Some(Expr::add(get(&Type::Int)?, get(&Type::Int)?))
        }));
        entry.push(Box::new(|get| {
            Some(Expr::sub(get(&Type::Int)?, get(&Type::Int)?))
        }));
    }

    if available_types.contains(&Type::EnumInt) {
        let entry = out.entry(Type::EnumInt).or_default();
        for i in 0..2 {
            entry.push(Box::new(move |_get| Some(Expr::enum_int_lit(i))));
        }
    }

    if input_types.contains(&Type::ClockInt) {
        out.entry(Type::ClockInt)
            .or_default()
            .push(Box::new(|_get| {
                Some(Expr::lit(Value::Int(0), Type::ClockInt))
            }));
    }

    Ok(out)
}

fn extract_inputs(pool: &mut IndexMap<Type, Vec<Expr>>, ty: &Type, input: Option<Expr>) {
    if let Type::Tuple(parts) = ty {
        for (i, part) in parts.iter().enumerate() {
            let projected = input.as_ref().map(|e| Expr::tuple_get(e.clone(), i));
            extract_inputs(pool, part, projected);
        }
        return;
    }

    let entry = pool.entry(ty.clone()).or_default();
    if let Some(e) = input {
        entry.push(e);
    }
    match ty {
        // component types become known-but-empty, enabling constructors
        Type::Set(elem) => extract_inputs(pool, elem, None),
        Type::Map(key, value) => {
            extract_inputs(pool, key, None);
            extract_inputs(pool, value, None);
        }
        _ => {}
    }
}

fn build_pool(
    out_type: Option<&Type>,
    depth: usize,
    inputs: &[Expr],
    opts: GrammarOptions,
) -> Result<IndexMap<Type, Expr>, GrammarError> {
    let mut input_pool: IndexMap<Type, Vec<Expr>> = IndexMap::new();
    for input in inputs {
        extract_inputs(&mut input_pool, &input.ty(), Some(input.clone()));
    }

    let input_types: Vec<Type> = input_pool.keys().cloned().collect();

    if let Some(out_t) = out_type
        && !input_pool.contains_key(out_t)
    {
        extract_inputs(&mut input_pool, out_t, None);
    }

    let out_types: Vec<Type> = input_pool
        .keys()
        .filter(|t| !input_types.contains(t))
        .cloned()
        .collect();
    let available_types: Vec<Type> = input_pool.keys().cloned().collect();

    let expansions = get_expansions(
        &input_types,
        &available_types,
        &out_types,
        opts.allow_node_id_reductions,
    )?;

    let empty_lookup = |_: &Type| -> Option<Expr> { None };
    let mut pool: IndexMap<Type, Expr> = IndexMap::new();
    for (t, exprs) in &input_pool {
        let mut alternatives = exprs.clone();
        if let Some(exps) = expansions.get(t) {
            for expansion in exps {
                if let Some(e) = expansion(&empty_lookup) {
                    alternatives.push(e);
                }
            }
        }
        if !alternatives.is_empty() {
            pool.insert(t.clone(), Expr::choose(alternatives));
        }
    }

    for _ in 0..depth {
        let mut next_pool = pool.clone();
        {
            let lookup = |ty: &Type| pool.get(ty).cloned();
            for (t, exps) in &expansions {
                let mut new_elements: Vec<Expr> =
                    exps.iter().filter_map(|e| e(&lookup)).collect();

                if let Some(existing) = next_pool.get(t)
                    && let ExprNode::Choose(existing_args) = existing.node()
                {
                    let existing_set: HashSet<&Expr> = existing_args.iter().collect();
                    new_elements.retain(|e| !existing_set.contains(e));
                }

                if !new_elements.is_empty() {
                    let choose = match next_pool.get(t) {
                        Some(prev) => {
                            let mut args = vec![prev.clone()];
                            args.extend(new_elements);
                            Expr::choose(args)
                        }
                        None => Expr::choose(new_elements),
                    };
                    next_pool.insert(t.clone(), choose);
                }
            }

            if opts.enable_ite && pool.contains_key(&Type::Bool) {
                let cond = pool[&Type::Bool].clone();
                for (t, prev) in &pool {
                    if matches!(t, Type::Set(_) | Type::Map(_, _)) {
                        continue;
                    }
                    let cur = next_pool
                        .get(t)
                        .cloned()
                        .unwrap_or_else(|| prev.clone());
                    next_pool.insert(
                        t.clone(),
                        Expr::choose(vec![
                            cur,
                            Expr::ite(cond.clone(), prev.clone(), prev.clone()),
                        ]),
                    );
                }
            }
        }
        pool = next_pool;
    }

    Ok(pool)
}

/// Build a choice tree of candidate expressions of `out_type`, reaching every
/// input as a leaf and growing by `depth` rounds of type-directed expansion.
pub fn auto_grammar(
    out_type: &Type,
    depth: usize,
    inputs: &[Expr],
    opts: GrammarOptions,
) -> Result<Expr, GrammarError> {
    if let Type::Tuple(parts) = out_type {
        let components = parts
            .iter()
            .map(|t| auto_grammar(t, depth, inputs, opts))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::tuple(components));
    }
    let pool = build_pool(Some(out_type), depth, inputs, opts)?;
    pool.get(out_type)
        .cloned()
        .ok_or_else(|| GrammarError::MissingPoolEntry(out_type.clone()))
}

/// The untyped form: the whole per-type pool after `depth` expansion rounds.
pub fn auto_grammar_pool(
    depth: usize,
    inputs: &[Expr],
    opts: GrammarOptions,
) -> Result<IndexMap<Type, Expr>, GrammarError> {
    build_pool(None, depth, inputs, opts)
}

/// Enumerate every `map-get` chain that reaches a node-id-keyed map inside
/// `input`, using `node_id` as the final key and `args` to cross intermediate
/// non-node-id keys.
pub fn all_node_id_gets(
    input: &Expr,
    node_id: &Expr,
    args: &IndexMap<Type, Expr>,
) -> Result<Vec<Expr>, GrammarError> {
    match input.ty() {
        Type::Map(key, value) => {
            let default = if value.erase() == Type::Int {
                Expr::lit(Value::Int(0), (*value).clone())
            } else if *value == Type::Bool {
                Expr::choose(vec![Expr::bool_lit(false), Expr::bool_lit(true)])
            } else if matches!(*value, Type::Map(_, _)) {
                Expr::call("map-create", (*value).clone(), vec![])
            } else {
                return Err(GrammarError::UnsupportedMapValue((*value).clone()));
            };

            if *key == Type::NodeIdInt {
                Ok(vec![Expr::call(
                    "map-get",
                    (*value).clone(),
                    vec![input.clone(), node_id.clone(), default],
                )])
            } else if let Some(key_expr) = args.get(&*key) {
                all_node_id_gets(
                    &Expr::call(
                        "map-get",
                        (*value).clone(),
                        vec![input.clone(), key_expr.clone(), default],
                    ),
                    node_id,
                    args,
                )
            } else {
                Ok(vec![])
            }
        }
        Type::Tuple(parts) => {
            let mut out = Vec::new();
            for i in 0..parts.len() {
                out.extend(all_node_id_gets(
                    &Expr::tuple_get(input.clone(), i),
                    node_id,
                    args,
                )?);
            }
            Ok(out)
        }
        _ => Ok(vec![]),
    }
}

/// Candidate expressions per lattice for invariant-style grammars: the raw
/// inputs, value rollups for map lattices, and a merge of the candidates.
pub fn expand_lattice_logic(inputs: &[(Expr, Lattice)]) -> Vec<Expr> {
    let mut pool: IndexMap<Lattice, Vec<Expr>> = IndexMap::new();
    for (input, lattice) in inputs {
        pool.entry(lattice.clone()).or_default().push(input.clone());
    }

    let snapshot: Vec<(Lattice, Vec<Expr>)> = pool
        .iter()
        .map(|(l, es)| (l.clone(), es.clone()))
        .collect();
    for (lattice, exprs) in snapshot {
        if let Lattice::Map(_, value) = &lattice {
            let merge_a = Expr::var("merge_a", value.ir_type());
            let merge_b = Expr::var("merge_b", value.ir_type());
            for input in exprs {
                let reduce_name = if value.ir_type() == Type::Bool {
                    "reduce_bool"
                } else {
                    "reduce_int"
                };
                let rollup = Expr::call(
                    reduce_name,
                    value.ir_type(),
                    vec![
                        Expr::call("map-values", Type::list(value.ir_type()), vec![input]),
                        Expr::lambda(
                            value.ir_type(),
                            value.merge(merge_a.clone(), merge_b.clone()),
                            vec![merge_a.clone(), merge_b.clone()],
                        ),
                        value.bottom(),
                    ],
                );
                let entry = pool.entry((**value).clone()).or_default();
                if !entry.contains(&rollup) {
                    entry.push(rollup);
                }
            }
        }
    }

    for (lattice, exprs) in pool.iter_mut() {
        let choices = Expr::choose(exprs.clone());
        exprs.push(lattice.merge(choices.clone(), choices));
    }

    pool.values()
        .map(|exprs| Expr::choose(exprs.clone()))
        .collect()
}
