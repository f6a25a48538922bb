// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Common test infrastructure for building recipe trees
//!
//! This module provides a small builder over [`Arena`] plus helpers that
//! read properties back out of rewritten trees.

use std::collections::BTreeSet;

use crate::ast::{Arena, Expr, ExprId, IndexGroups, IndexId, IndexKind};
use crate::rewrite::{WalkNode, Walker, walk};

/// Builder for test arenas with a pool of named indices
pub struct TestArena {
    pub arena: Arena,
    pub indices: Vec<IndexId>,
}

impl TestArena {
    /// Create an arena with `n` scalar indices named `i0`, `i1`, ...
    pub fn with_indices(n: usize, kind: IndexKind) -> Self {
        let mut arena = Arena::new();
        let indices = (0..n)
            .map(|k| arena.index(&format!("i{k}"), k + 2, kind))
            .collect();
        TestArena { arena, indices }
    }

    /// `name[i, j, ...]` over the given indices
    pub fn tensor(&mut self, name: &str, indices: &[IndexId]) -> ExprId {
        let aggregate = self.arena.variable(name);
        let refs = indices.iter().map(|i| self.arena.index_ref(*i)).collect();
        self.arena.subscript(aggregate, refs)
    }

    /// Nest one single-index `ForAll` per entry of `order` around `body`,
    /// outermost first
    pub fn loops(&mut self, order: &[IndexId], body: ExprId) -> ExprId {
        order
            .iter()
            .rev()
            .fold(body, |body, index| self.arena.for_all(&[*index], body))
    }

    /// A recipe declaring `groups` over `body`
    pub fn recipe(&mut self, groups: IndexGroups, body: ExprId) -> ExprId {
        self.arena.recipe(groups, body)
    }
}

/// Loop nesting order read off a chain of `ForAll` scopes starting at
/// `body`, outermost first.  `IndexSum` scopes on the chain are skipped.
pub fn observed_loop_order(arena: &Arena, body: ExprId) -> Vec<IndexId> {
    let mut order = Vec::new();
    let mut current = body;
    loop {
        match arena.get(current).unwrap() {
            Expr::ForAll { indices, body } => {
                order.extend(indices.iter().copied());
                current = *body;
            }
            Expr::IndexSum { body, .. } => current = *body,
            _ => return order,
        }
    }
}

struct Collect<F> {
    pred: F,
    found: BTreeSet<ExprId>,
}

impl<F: Fn(&Expr) -> bool> Walker for Collect<F> {
    fn visit(&mut self, _arena: &Arena, node: WalkNode) -> bool {
        if let WalkNode::Expr(id, expr) = node {
            if (self.pred)(expr) {
                self.found.insert(id);
            }
        }
        true
    }
}

/// Distinct handles reachable from `root` whose node satisfies `pred`
pub fn distinct_nodes<F>(arena: &Arena, root: ExprId, pred: F) -> BTreeSet<ExprId>
where
    F: Fn(&Expr) -> bool,
{
    let mut collect = Collect {
        pred,
        found: BTreeSet::new(),
    };
    walk(arena, root, &mut collect).unwrap();
    collect.found
}

/// Variable names read outside any `Let` that binds them.  A binding
/// value sees the names bound before it; the body sees them all.
pub fn free_names(arena: &Arena, root: ExprId) -> BTreeSet<String> {
    fn collect(arena: &Arena, id: ExprId, scope: &mut Vec<String>, free: &mut BTreeSet<String>) {
        match arena.get(id).unwrap() {
            Expr::Variable(name) => {
                if !scope.contains(name) {
                    free.insert(name.clone());
                }
            }
            Expr::Let { bindings, body } => {
                let depth = scope.len();
                for binding in bindings {
                    collect(arena, binding.value, scope, free);
                    scope.push(binding.name.clone());
                }
                collect(arena, *body, scope, free);
                scope.truncate(depth);
            }
            expr => {
                for child in expr.children() {
                    collect(arena, child, scope, free);
                }
            }
        }
    }

    let mut free = BTreeSet::new();
    collect(arena, root, &mut Vec::new(), &mut free);
    free
}

/// Panic unless every reference to a name starting with `prefix` is
/// preceded by a `Let` binding of that name in an enclosing scope.
/// Returns the number of such bindings.
pub fn assert_temporaries_in_scope(arena: &Arena, root: ExprId, prefix: &str) -> usize {
    fn check(arena: &Arena, id: ExprId, prefix: &str, scope: &mut Vec<String>) -> usize {
        match arena.get(id).unwrap() {
            Expr::Variable(name) => {
                if name.starts_with(prefix) {
                    assert!(scope.contains(name), "{name} referenced outside its Let");
                }
                0
            }
            Expr::Let { bindings, body } => {
                let depth = scope.len();
                let mut count = 0;
                for binding in bindings {
                    count += check(arena, binding.value, prefix, scope);
                    if binding.name.starts_with(prefix) {
                        count += 1;
                    }
                    scope.push(binding.name.clone());
                }
                count += check(arena, *body, prefix, scope);
                scope.truncate(depth);
                count
            }
            expr => expr
                .children()
                .iter()
                .map(|child| check(arena, *child, prefix, scope))
                .sum(),
        }
    }

    check(arena, root, prefix, &mut Vec::new())
}
