// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for the rewrite passes using proptest.
//!
//! These tests verify that:
//! 1. Rebuilding any node from its own children is the identity
//! 2. Index substitution removes exactly the substituted indices
//! 3. Binding leaves no declared index free and records a transpose
//!    that matches the loop nesting it produced
//! 4. Extraction binds every reduction, and no temporary escapes a loop
//!    or `Let` whose index or name its value reads

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use crate::ast::{Expr, ExprId, IndexGroups, IndexId, IndexKind, LetBinding};
use crate::binding::BindingPass;
use crate::extract::{ExtractOptions, extract_temporaries};
use crate::rewrite::identity;
use crate::substitute::substitute_indices;
use crate::test_common::{
    TestArena, assert_temporaries_in_scope, distinct_nodes, free_names, observed_loop_order,
};

const POOL: u8 = 4;

#[derive(Clone, Debug)]
enum Shape {
    Var(u8),
    /// A read of a name that `Let` shapes may bind.
    Bound(u8),
    Idx(u8),
    Const(i8),
    Shared(u8),
    Sum(Vec<Shape>),
    Product(Vec<Shape>),
    Abs(Box<Shape>),
    Delta(u8, u8),
    IndexSum(u8, Box<Shape>),
    ForAll(u8, Option<u8>, Box<Shape>),
    Let(u8, Box<Shape>, Box<Shape>),
    Recipe(u8, Box<Shape>),
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        (0u8..3).prop_map(Shape::Var),
        (0u8..2).prop_map(Shape::Bound),
        (0u8..POOL).prop_map(Shape::Idx),
        (-5i8..5).prop_map(Shape::Const),
        (0u8..2).prop_map(Shape::Shared),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Sum),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Product),
            inner.clone().prop_map(|s| Shape::Abs(Box::new(s))),
            (0u8..POOL, 0u8..POOL).prop_map(|(a, b)| Shape::Delta(a, b)),
            (0u8..POOL, inner.clone()).prop_map(|(i, s)| Shape::IndexSum(i, Box::new(s))),
            (0u8..POOL, prop::option::of(0u8..POOL), inner.clone())
                .prop_map(|(i, j, s)| Shape::ForAll(i, j, Box::new(s))),
            (0u8..2, inner.clone(), inner.clone())
                .prop_map(|(n, v, b)| Shape::Let(n, Box::new(v), Box::new(b))),
            (0u8..POOL, inner).prop_map(|(i, s)| Shape::Recipe(i, Box::new(s))),
        ]
    })
}

/// A pool of indices plus two reductions that shapes can share by
/// handle.
fn fixture() -> (TestArena, Vec<ExprId>) {
    let mut fx = TestArena::with_indices(POOL as usize + 2, IndexKind::Free);
    let k0 = fx.indices[POOL as usize];
    let k1 = fx.indices[POOL as usize + 1];
    let k0r = fx.arena.index_ref(k0);
    let k1r = fx.arena.index_ref(k1);
    let i0r = fx.arena.index_ref(fx.indices[0]);
    let product = fx.arena.product(vec![k1r, i0r]);
    let shared = vec![
        fx.arena.index_sum(&[k0], k0r),
        fx.arena.index_sum(&[k1], product),
    ];
    (fx, shared)
}

fn build(fx: &mut TestArena, shared: &[ExprId], shape: &Shape) -> ExprId {
    match shape {
        Shape::Var(n) => fx.arena.variable(&format!("v{n}")),
        Shape::Bound(n) => fx.arena.variable(&format!("x{n}")),
        Shape::Idx(i) => {
            let index = fx.indices[*i as usize];
            fx.arena.index_ref(index)
        }
        Shape::Const(n) => fx.arena.constant(*n as f64),
        Shape::Shared(n) => shared[*n as usize],
        Shape::Sum(terms) => {
            let terms = terms.iter().map(|t| build(fx, shared, t)).collect();
            fx.arena.sum(terms)
        }
        Shape::Product(factors) => {
            let factors = factors.iter().map(|f| build(fx, shared, f)).collect();
            fx.arena.product(factors)
        }
        Shape::Abs(x) => {
            let x = build(fx, shared, x);
            fx.arena.add(Expr::Abs(x))
        }
        Shape::Delta(a, b) => {
            let a = fx.arena.index_ref(fx.indices[*a as usize]);
            let b = fx.arena.index_ref(fx.indices[*b as usize]);
            fx.arena.add(Expr::Delta(a, b))
        }
        Shape::IndexSum(i, body) => {
            let body = build(fx, shared, body);
            let index = fx.indices[*i as usize];
            fx.arena.index_sum(&[index], body)
        }
        Shape::ForAll(i, j, body) => {
            let body = build(fx, shared, body);
            let mut indices = vec![fx.indices[*i as usize]];
            if let Some(j) = *j {
                if j != *i {
                    indices.push(fx.indices[j as usize]);
                }
            }
            fx.arena.for_all(&indices, body)
        }
        Shape::Let(n, value, body) => {
            let value = build(fx, shared, value);
            let body = build(fx, shared, body);
            fx.arena
                .let_in(vec![LetBinding::new(&format!("x{n}"), value)], body)
        }
        Shape::Recipe(i, body) => {
            let body = build(fx, shared, body);
            let index = fx.indices[*i as usize];
            fx.recipe(IndexGroups::new(&[], &[index], &[]), body)
        }
    }
}

#[derive(Clone, Debug)]
struct LoopCase {
    n: usize,
    split: (usize, usize),
    chain: Vec<usize>,
    summed: bool,
    /// Write the chain as one multi-index `ForAll` instead of nested
    /// single-index ones.
    grouped: bool,
}

fn loop_case_strategy() -> impl Strategy<Value = LoopCase> {
    (1usize..=4).prop_flat_map(|n| {
        (
            (0..=n, 0..=n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            0..=n,
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(move |((a, b), order, len, summed, grouped)| LoopCase {
                n,
                split: (a.min(b), a.max(b)),
                chain: order[..len].to_vec(),
                summed,
                grouped,
            })
    })
}

/// Replacement kind per pool index: no entry, a constant, or a fresh
/// index outside the pool.
fn replacement_strategy() -> impl Strategy<Value = Vec<Option<bool>>> {
    prop::collection::vec(prop::option::of(any::<bool>()), POOL as usize)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn rebuild_is_identity(shape in shape_strategy()) {
        let (mut fx, shared) = fixture();
        let root = build(&mut fx, &shared, &shape);

        let before = fx.arena.len();
        prop_assert_eq!(root, identity(&mut fx.arena, root).unwrap());
        prop_assert_eq!(before, fx.arena.len());

        for id in distinct_nodes(&fx.arena, root, |_| true) {
            let expr = fx.arena.get(id).unwrap();
            prop_assert_eq!(expr, &expr.with_children(&expr.children()).unwrap());
        }
    }

    #[test]
    fn substitution_removes_exactly_the_keys(
        shape in shape_strategy(),
        kinds in replacement_strategy(),
    ) {
        let (mut fx, shared) = fixture();
        let root = build(&mut fx, &shared, &shape);
        let free_before = fx.arena.free_indices(root).unwrap();

        let mut replacements = HashMap::new();
        let mut expected: BTreeSet<IndexId> = free_before.clone();
        for (n, kind) in kinds.iter().enumerate() {
            let Some(as_constant) = kind else {
                continue;
            };
            let key = fx.indices[n];
            expected.remove(&key);
            let replacement = if *as_constant {
                fx.arena.constant(n as f64)
            } else {
                let fresh = fx.arena.index(&format!("j{n}"), 2, IndexKind::Free);
                if free_before.contains(&key) {
                    expected.insert(fresh);
                }
                fx.arena.index_ref(fresh)
            };
            replacements.insert(key, replacement);
        }

        let out = substitute_indices(&mut fx.arena, root, replacements).unwrap();
        prop_assert_eq!(expected, fx.arena.free_indices(out).unwrap());
    }

    #[test]
    fn binding_matches_observed_nesting(case in loop_case_strategy()) {
        let mut fx = TestArena::with_indices(case.n + 1, IndexKind::Free);
        let declared: Vec<IndexId> = fx.indices[..case.n].to_vec();
        let k = fx.indices[case.n];

        let leaf = if case.summed {
            let mut all = declared.clone();
            all.push(k);
            let tensor = fx.tensor("u", &all);
            fx.arena.index_sum(&[k], tensor)
        } else {
            fx.tensor("u", &declared)
        };
        let chain: Vec<IndexId> = case.chain.iter().map(|c| declared[*c]).collect();
        let body = if case.grouped && !chain.is_empty() {
            fx.arena.for_all(&chain, leaf)
        } else {
            fx.loops(&chain, leaf)
        };

        let (a, b) = case.split;
        let groups = IndexGroups::new(&declared[..a], &declared[a..b], &declared[b..]);
        let recipe = fx.recipe(groups, body);

        let out = BindingPass::new().bind(&mut fx.arena, recipe).unwrap();
        prop_assert!(fx.arena.free_indices(out).unwrap().is_empty());

        let Expr::Recipe(bound) = fx.arena.get(out).unwrap().clone() else {
            panic!("expected Recipe");
        };
        let transpose = bound.transpose.unwrap();
        let mut sorted = transpose.clone();
        sorted.sort_unstable();
        prop_assert_eq!((0..case.n).collect::<Vec<_>>(), sorted);

        // loops the pass added come first, in declared order
        let added: Vec<IndexId> = declared
            .iter()
            .filter(|i| !chain.contains(*i))
            .copied()
            .collect();
        let mut expected = added.clone();
        expected.extend(chain.iter().copied());
        let observed = observed_loop_order(&fx.arena, bound.body);
        prop_assert_eq!(&expected, &observed);

        // a multi-index ForAll pushes its indices onto the front of the
        // loop order one by one, so the transpose sees them reversed
        let mut loop_order = added;
        if case.grouped {
            loop_order.extend(chain.iter().rev().copied());
        } else {
            loop_order.extend(chain.iter().copied());
        }
        let permuted: Vec<IndexId> = transpose.iter().map(|p| declared[*p]).collect();
        prop_assert_eq!(loop_order, permuted);
    }

    #[test]
    fn extraction_keeps_temporaries_in_scope(shape in shape_strategy()) {
        let (mut fx, shared) = fixture();
        let root = build(&mut fx, &shared, &shape);
        let sums = distinct_nodes(&fx.arena, root, |e| matches!(e, Expr::IndexSum { .. }));

        let mut user_bound = BTreeSet::new();
        for id in distinct_nodes(&fx.arena, root, |e| matches!(e, Expr::Let { .. })) {
            if let Expr::Let { bindings, .. } = fx.arena.get(id).unwrap() {
                for binding in bindings {
                    if sums.contains(&binding.value) {
                        user_bound.insert(binding.value);
                    }
                }
            }
        }
        let free_before = fx.arena.free_indices(root).unwrap();
        let names_before = free_names(&fx.arena, root);

        let out = extract_temporaries(&mut fx.arena, root, &ExtractOptions::default()).unwrap();
        let bindings = assert_temporaries_in_scope(&fx.arena, out, "isum_");
        // at least one temporary per reduction; more when one handle is
        // read under several loops or Let bodies
        prop_assert!(bindings >= sums.difference(&user_bound).count());

        // moving a reduction never frees an index or a name it reads
        prop_assert_eq!(free_before, fx.arena.free_indices(out).unwrap());
        prop_assert_eq!(names_before, free_names(&fx.arena, out));

        let mut values = user_bound;
        for id in distinct_nodes(&fx.arena, out, |e| matches!(e, Expr::Let { .. })) {
            if let Expr::Let { bindings, .. } = fx.arena.get(id).unwrap() {
                values.extend(bindings.iter().map(|b| b.value));
            }
        }
        let remaining = distinct_nodes(&fx.arena, out, |e| matches!(e, Expr::IndexSum { .. }));
        prop_assert!(remaining.is_subset(&values));
    }
}
