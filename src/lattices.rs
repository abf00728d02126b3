// Join-semilattice catalogue and candidate-structure enumeration

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;

use crate::ir::{Expr, Type, Value};

/// The closed set of join-semilattices the synthesizer composes replicated
/// state from. Each value describes both the carrier type and the merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lattice {
    /// Booleans under disjunction, bottom `false`.
    OrBool,
    /// An integer flavour under `max`, bottom `0`.
    MaxInt(Type),
    /// Sets under union, bottom the empty set.
    Set(Type),
    /// Maps with pointwise join through the value lattice; absent keys are
    /// treated as the value lattice's bottom.
    Map(Type, Box<Lattice>),
    /// Lexicographic cascade: the first lattice picks a winner, the second
    /// merges only when the first ties.
    LexicalProduct(Box<Lattice>, Box<Lattice>),
}

impl Lattice {
    pub fn map(key: Type, value: Lattice) -> Lattice {
        Lattice::Map(key, Box::new(value))
    }

    pub fn lexical_product(first: Lattice, second: Lattice) -> Lattice {
        Lattice::LexicalProduct(Box::new(first), Box::new(second))
    }

    /// The carrier type of this lattice's values.
    pub fn ir_type(&self) -> Type {
        match self {
            Lattice::OrBool => Type::Bool,
            Lattice::MaxInt(t) => t.clone(),
            Lattice::Set(t) => Type::set(t.clone()),
            Lattice::Map(k, v) => Type::map(k.clone(), v.ir_type()),
            Lattice::LexicalProduct(l1, l2) => Type::Tuple(vec![l1.ir_type(), l2.ir_type()]),
        }
    }

    /// The join of `a` and `b` as an expression over the carrier type.
    pub fn merge(&self, a: Expr, b: Expr) -> Expr {
        match self {
            Lattice::OrBool => Expr::or(a, b),
            Lattice::MaxInt(t) => {
                let a_var = Expr::var("max_merge_a", t.clone());
                let b_var = Expr::var("max_merge_b", t.clone());
                Expr::let_in(
                    a_var.clone(),
                    a,
                    Expr::let_in(
                        b_var.clone(),
                        b,
                        Expr::ite(
                            Expr::ge(a_var.clone(), b_var.clone()),
                            a_var,
                            b_var,
                        ),
                    ),
                )
            }
            Lattice::Set(t) => Expr::call("set-union", Type::set(t.clone()), vec![a, b]),
            Lattice::Map(k, v) => {
                let v_a = Expr::var("map_merge_a", v.ir_type());
                let v_b = Expr::var("map_merge_b", v.ir_type());
                Expr::call(
                    "map-union",
                    Type::map(k.clone(), v.ir_type()),
                    vec![
                        a,
                        b,
                        Expr::lambda(
                            v.ir_type(),
                            v.merge(v_a.clone(), v_b.clone()),
                            vec![v_a, v_b],
                        ),
                    ],
                )
            }
            Lattice::LexicalProduct(l1, l2) => {
                let merge_a = Expr::var("cascade_merge_a", self.ir_type());
                let merge_b = Expr::var("cascade_merge_b", self.ir_type());

                let key_a = Expr::tuple_get(merge_a.clone(), 0);
                let key_b = Expr::tuple_get(merge_b.clone(), 0);
                let value_a = Expr::tuple_get(merge_a.clone(), 1);
                let value_b = Expr::tuple_get(merge_b.clone(), 1);

                let key_merged = l1.merge(key_a.clone(), key_b.clone());
                let value_merged = l2.merge(value_a.clone(), value_b.clone());

                // Winner's value cascades against the second lattice's bottom
                // when exactly one side holds the merged key.
                Expr::let_in(
                    merge_a,
                    a,
                    Expr::let_in(
                        merge_b,
                        b,
                        Expr::tuple(vec![
                            key_merged.clone(),
                            Expr::ite(
                                Expr::or(
                                    Expr::eq(key_a.clone(), key_b.clone()),
                                    Expr::and(
                                        Expr::not(Expr::eq(key_a.clone(), key_merged.clone())),
                                        Expr::not(Expr::eq(key_b, key_merged.clone())),
                                    ),
                                ),
                                value_merged,
                                l2.merge(
                                    Expr::ite(Expr::eq(key_a, key_merged), value_a, value_b),
                                    l2.bottom(),
                                ),
                            ),
                        ]),
                    ),
                )
            }
        }
    }

    /// The least element of the lattice.
    pub fn bottom(&self) -> Expr {
        match self {
            Lattice::OrBool => Expr::bool_lit(false),
            Lattice::MaxInt(t) => Expr::lit(Value::Int(0), t.clone()),
            Lattice::Set(t) => Expr::call("set-create", Type::set(t.clone()), vec![]),
            Lattice::Map(_, _) => Expr::call("map-create", self.ir_type(), vec![]),
            Lattice::LexicalProduct(l1, l2) => Expr::tuple(vec![l1.bottom(), l2.bottom()]),
        }
    }

    /// Semantic wellformedness of a carrier value, as a boolean expression.
    pub fn check_is_valid(&self, v: Expr) -> Expr {
        match self {
            Lattice::OrBool | Lattice::Set(_) => Expr::bool_lit(true),
            Lattice::MaxInt(_) => Expr::ge(v, self.bottom()),
            Lattice::Map(_, value) => {
                let acc = Expr::var("merge_into", Type::Bool);
                let elem = Expr::var("merge_v", value.ir_type());
                Expr::call(
                    "reduce_bool",
                    Type::Bool,
                    vec![
                        Expr::call("map-values", Type::list(value.ir_type()), vec![v]),
                        Expr::lambda(
                            Type::Bool,
                            Expr::and(acc.clone(), value.check_is_valid(elem.clone())),
                            vec![elem, acc],
                        ),
                        Expr::bool_lit(true),
                    ],
                )
            }
            Lattice::LexicalProduct(l1, l2) => Expr::and(
                l1.check_is_valid(Expr::tuple_get(v.clone(), 0)),
                l2.check_is_valid(Expr::tuple_get(v, 1)),
            ),
        }
    }

    /// True iff the structure contains a `NodeIdInt` in a key or element
    /// position or in any inner lattice. Structures without one cannot
    /// represent counter-style per-replica state.
    pub fn has_node_id(&self) -> bool {
        match self {
            Lattice::OrBool => false,
            Lattice::MaxInt(t) | Lattice::Set(t) => *t == Type::NodeIdInt,
            Lattice::Map(k, v) => *k == Type::NodeIdInt || v.has_node_id(),
            Lattice::LexicalProduct(l1, l2) => l1.has_node_id() || l2.has_node_id(),
        }
    }
}

impl fmt::Display for Lattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lattice::OrBool => write!(f, "OrBool"),
            Lattice::MaxInt(t) => write!(f, "MaxInt({t})"),
            Lattice::Set(t) => write!(f, "Set({t})"),
            Lattice::Map(k, v) => write!(f, "Map({k}, {v})"),
            Lattice::LexicalProduct(l1, l2) => write!(f, "LexicalProduct({l1}, {l2})"),
        }
    }
}

/// Printable form of a candidate structure, used in reports and logs.
pub fn structure_repr(structure: &[Lattice]) -> String {
    let inner = structure.iter().map(Lattice::to_string).join(", ");
    format!("({inner})")
}

/// Base types available for lattice composition. Depth is accepted for
/// symmetry with the lattice enumerator; no constructed types participate
/// as raw element types yet.
pub fn gen_types(_depth: usize) -> Vec<Type> {
    vec![
        Type::Int,
        Type::ClockInt,
        Type::EnumInt,
        Type::OpaqueInt,
        Type::NodeIdInt,
        Type::Bool,
    ]
}

fn is_comparable_int(t: &Type) -> bool {
    matches!(t, Type::Int | Type::ClockInt | Type::OpaqueInt)
}

fn is_set_supported_elem(t: &Type) -> bool {
    matches!(t, Type::Int | Type::OpaqueInt)
}

fn is_map_supported_key(t: &Type) -> bool {
    matches!(t, Type::OpaqueInt | Type::NodeIdInt)
}

/// All lattices reachable by composition up to `max_depth`. `OrBool` and
/// `MaxInt` at depth 1; `Set`, `Map`, and `LexicalProduct` enter at depth 2
/// over inner lattices of the previous depth. The element/key restrictions
/// are search-pruning heuristics, not semantic requirements.
pub fn gen_lattice_types(max_depth: usize) -> Vec<Lattice> {
    let mut out = Vec::new();
    if max_depth == 1 {
        out.push(Lattice::OrBool);
    }
    for t in gen_types(max_depth) {
        if is_comparable_int(&t) {
            out.push(Lattice::MaxInt(t));
        }
    }
    if max_depth > 1 {
        let inner = gen_lattice_types(max_depth - 1);
        out.extend(inner.iter().cloned());

        for t in gen_types(max_depth - 1) {
            if is_set_supported_elem(&t) {
                out.push(Lattice::Set(t));
            }
        }

        for key in gen_types(max_depth - 1) {
            if is_map_supported_key(&key) {
                for value in &inner {
                    out.push(Lattice::map(key.clone(), value.clone()));
                }
            }
        }

        for (i, l1) in inner.iter().enumerate() {
            for (j, l2) in inner.iter().enumerate() {
                if i != j {
                    out.push(Lattice::lexical_product(l1.clone(), l2.clone()));
                }
            }
        }
    }
    out
}

/// Enumerate candidate structures (tuples of lattices) up to `max_depth`,
/// widening the tuple size within a type depth before advancing the depth.
/// Combination-with-replacement order, deduplicated across the whole stream.
pub fn gen_structures(max_depth: usize) -> impl Iterator<Item = (usize, Vec<Lattice>)> {
    let mut seen: HashSet<Vec<Lattice>> = HashSet::new();
    (1..=max_depth)
        .flat_map(|type_depth| {
            (1..=type_depth).flat_map(move |tuple_size| {
                gen_lattice_types(type_depth)
                    .into_iter()
                    .combinations_with_replacement(tuple_size)
                    .map(move |structure| (tuple_size, structure))
            })
        })
        .filter(move |(_, structure)| seen.insert(structure.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::testing::{eval, Env, Ground};
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn merge_ground(lattice: &Lattice, a: &Ground, b: &Ground) -> Ground {
        let a_var = Expr::var("law_a", lattice.ir_type());
        let b_var = Expr::var("law_b", lattice.ir_type());
        let mut env = Env::new();
        env.insert("law_a".to_string(), a.clone());
        env.insert("law_b".to_string(), b.clone());
        eval(&lattice.merge(a_var, b_var), &env)
    }

    fn bottom_ground(lattice: &Lattice) -> Ground {
        eval(&lattice.bottom(), &Env::new())
    }

    fn valid_ground(lattice: &Lattice, v: &Ground) -> bool {
        let v_var = Expr::var("law_v", lattice.ir_type());
        let mut env = Env::new();
        env.insert("law_v".to_string(), v.clone());
        match eval(&lattice.check_is_valid(v_var), &env) {
            Ground::Bool(b) => b,
            other => panic!("validity evaluated to {other:?}"),
        }
    }

    /// Valid carrier values for lattices whose laws we check concretely.
    fn arb_ground(lattice: &Lattice) -> BoxedStrategy<Ground> {
        match lattice {
            Lattice::OrBool => any::<bool>().prop_map(Ground::Bool).boxed(),
            Lattice::MaxInt(_) => (0i64..50).prop_map(Ground::Int).boxed(),
            Lattice::Set(_) => proptest::collection::btree_set(0i64..20, 0..4)
                .prop_map(|s| Ground::Set(s.into_iter().map(Ground::Int).collect::<BTreeSet<_>>()))
                .boxed(),
            Lattice::Map(_, value) => {
                let value = (**value).clone();
                proptest::collection::btree_map(0i64..4, arb_ground(&value), 0..4)
                    .prop_map(|m| {
                        Ground::Map(
                            m.into_iter()
                                .map(|(k, v)| (Ground::Int(k), v))
                                .collect::<BTreeMap<_, _>>(),
                        )
                    })
                    .boxed()
            }
            Lattice::LexicalProduct(l1, l2) => (arb_ground(l1), arb_ground(l2))
                .prop_map(|(a, b)| Ground::Tuple(vec![a, b]))
                .boxed(),
        }
    }

    /// Lattices sampled for the algebraic-law checks. Lexical products are
    /// only lattices when the first component is totally ordered, so only
    /// those instances appear here.
    fn law_instances() -> Vec<Lattice> {
        vec![
            Lattice::OrBool,
            Lattice::MaxInt(Type::Int),
            Lattice::MaxInt(Type::ClockInt),
            Lattice::Set(Type::OpaqueInt),
            Lattice::map(Type::OpaqueInt, Lattice::OrBool),
            Lattice::map(Type::NodeIdInt, Lattice::MaxInt(Type::Int)),
            Lattice::lexical_product(
                Lattice::MaxInt(Type::ClockInt),
                Lattice::MaxInt(Type::OpaqueInt),
            ),
            Lattice::lexical_product(Lattice::MaxInt(Type::ClockInt), Lattice::OrBool),
        ]
    }

    fn arb_law_case() -> impl Strategy<Value = (usize, Ground, Ground, Ground)> {
        (0usize..law_instances().len()).prop_flat_map(|idx| {
            let lattice = law_instances()[idx].clone();
            (
                Just(idx),
                arb_ground(&lattice),
                arb_ground(&lattice),
                arb_ground(&lattice),
            )
        })
    }

    proptest! {
        #[test]
        fn test_merge_laws((idx, a, b, c) in arb_law_case()) {
            let lattice = &law_instances()[idx];

            // commutativity
            prop_assert_eq!(merge_ground(lattice, &a, &b), merge_ground(lattice, &b, &a));
            // associativity
            prop_assert_eq!(
                merge_ground(lattice, &a, &merge_ground(lattice, &b, &c)),
                merge_ground(lattice, &merge_ground(lattice, &a, &b), &c)
            );
            // idempotence
            prop_assert_eq!(merge_ground(lattice, &a, &a), a.clone());
            // bottom is the identity
            prop_assert_eq!(merge_ground(lattice, &a, &bottom_ground(lattice)), a);
        }
    }

    #[test]
    fn test_lexical_product_cascade_reset() {
        let lattice = Lattice::lexical_product(
            Lattice::MaxInt(Type::ClockInt),
            Lattice::MaxInt(Type::OpaqueInt),
        );
        // Larger key wins; the loser's value is discarded (merged with bottom).
        let merged = merge_ground(
            &lattice,
            &Ground::Tuple(vec![Ground::Int(1), Ground::Int(5)]),
            &Ground::Tuple(vec![Ground::Int(2), Ground::Int(3)]),
        );
        assert_eq!(merged, Ground::Tuple(vec![Ground::Int(2), Ground::Int(3)]));

        // Equal keys merge the values.
        let merged = merge_ground(
            &lattice,
            &Ground::Tuple(vec![Ground::Int(2), Ground::Int(5)]),
            &Ground::Tuple(vec![Ground::Int(2), Ground::Int(3)]),
        );
        assert_eq!(merged, Ground::Tuple(vec![Ground::Int(2), Ground::Int(5)]));
    }

    #[test]
    fn test_map_merge_treats_absent_keys_as_bottom() {
        let lattice = Lattice::map(Type::NodeIdInt, Lattice::MaxInt(Type::Int));
        let a = Ground::Map(
            [(Ground::Int(1), Ground::Int(4))].into_iter().collect(),
        );
        let b = Ground::Map(
            [
                (Ground::Int(1), Ground::Int(2)),
                (Ground::Int(2), Ground::Int(7)),
            ]
            .into_iter()
            .collect(),
        );
        let merged = merge_ground(&lattice, &a, &b);
        assert_eq!(
            merged,
            Ground::Map(
                [
                    (Ground::Int(1), Ground::Int(4)),
                    (Ground::Int(2), Ground::Int(7)),
                ]
                .into_iter()
                .collect()
            )
        );
    }

    #[test]
    fn test_map_validity_folds_value_validity() {
        let lattice = Lattice::map(Type::NodeIdInt, Lattice::MaxInt(Type::Int));
        let ok = Ground::Map([(Ground::Int(1), Ground::Int(5))].into_iter().collect());
        let bad = Ground::Map(
            [
                (Ground::Int(1), Ground::Int(5)),
                (Ground::Int(2), Ground::Int(-1)),
            ]
            .into_iter()
            .collect(),
        );
        assert!(valid_ground(&lattice, &ok));
        assert!(!valid_ground(&lattice, &bad));
    }

    #[test]
    fn test_max_int_validity_requires_bottom_bound() {
        let lattice = Lattice::MaxInt(Type::ClockInt);
        assert!(valid_ground(&lattice, &Ground::Int(0)));
        assert!(valid_ground(&lattice, &Ground::Int(3)));
        assert!(!valid_ground(&lattice, &Ground::Int(-2)));
    }

    #[test]
    fn test_has_node_id() {
        assert!(Lattice::map(Type::NodeIdInt, Lattice::MaxInt(Type::Int)).has_node_id());
        assert!(
            Lattice::lexical_product(
                Lattice::OrBool,
                Lattice::map(Type::NodeIdInt, Lattice::OrBool)
            )
            .has_node_id()
        );
        assert!(!Lattice::Set(Type::OpaqueInt).has_node_id());
        assert!(!Lattice::map(Type::OpaqueInt, Lattice::OrBool).has_node_id());
    }

    #[test]
    fn test_gen_structures_depth_one_is_singletons() {
        let structures: Vec<_> = gen_structures(1).collect();
        assert_eq!(
            structures,
            vec![
                (1, vec![Lattice::OrBool]),
                (1, vec![Lattice::MaxInt(Type::Int)]),
                (1, vec![Lattice::MaxInt(Type::ClockInt)]),
                (1, vec![Lattice::MaxInt(Type::OpaqueInt)]),
            ]
        );
    }

    #[test]
    fn test_gen_structures_yields_each_structure_once() {
        let structures: Vec<_> = gen_structures(2).map(|(_, s)| s).collect();
        let unique: HashSet<_> = structures.iter().cloned().collect();
        assert_eq!(structures.len(), unique.len());
    }

    #[test]
    fn test_gen_structures_tuple_size_bounded_by_depth() {
        for (size, structure) in gen_structures(2) {
            assert_eq!(size, structure.len());
            assert!(size <= 2);
        }
    }

    #[test]
    fn test_gen_structures_depth_two_extends_depth_one() {
        let depth1: HashSet<_> = gen_structures(1).map(|(_, s)| s).collect();
        let depth2: HashSet<_> = gen_structures(2).map(|(_, s)| s).collect();
        assert!(depth1.is_subset(&depth2));
        assert!(depth2.len() > depth1.len());
    }
}
