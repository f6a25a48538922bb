// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Binding of free recipe indices to explicit loops.
//!
//! A recipe declares the indices of the quantity it tabulates, in the
//! order used to address the result.  The body may already nest some of
//! them in `ForAll` scopes, in whatever order data dependencies forced.
//! This pass wraps the remaining free indices in a `ForAll` and records
//! on the recipe the permutation between the declared order and the
//! order loops are actually nested in.

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::ast::{Arena, Expr, ExprId, IndexId, IndexList, LetBinding, NodeKey, Recipe};
use crate::binding_err;
use crate::common::Result;
use crate::diagnostics::Diagnostics;
use crate::rewrite::Rewriter;

/// Loop scope state threaded through the binding pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopScope {
    /// Indices bound by an enclosing `ForAll` or `IndexSum`; a recipe
    /// must not bind them again.
    pub above: BTreeSet<IndexId>,
    /// Indices already committed to loops by the subtrees rewritten so
    /// far, outermost first.
    pub below: VecDeque<IndexId>,
}

impl LoopScope {
    fn enter(above: &BTreeSet<IndexId>, indices: &IndexList) -> BTreeSet<IndexId> {
        let mut above = above.clone();
        above.extend(indices.iter().copied());
        above
    }
}

#[derive(Default)]
pub struct BindingPass {
    diagnostics: Diagnostics,
}

impl BindingPass {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn bind(&mut self, arena: &mut Arena, root: ExprId) -> Result<ExprId> {
        let (id, _) = self.rewrite(arena, root, LoopScope::default())?;
        Ok(id)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Compute `transpose[k]`, the position in the flattened declared
    /// order of the k-th flattened loop index.
    ///
    /// Each loop factor claims the first unclaimed declared position
    /// holding the same index, so repeated factors map one-to-one.  The
    /// result is a bijection, or the first index that breaks it is
    /// marked in the diagnostics and an `UnresolvableIndex` error is
    /// returned:
    /// - a loop factor with no unclaimed declared position, or
    /// - a declared factor no loop claimed.
    fn transpose(
        &mut self,
        arena: &Arena,
        declared: &[IndexId],
        below: &VecDeque<IndexId>,
    ) -> Result<Vec<usize>> {
        let declared = arena.flatten(declared.iter().copied())?;
        let actual = arena.flatten(below.iter().copied())?;

        let mut claimed = vec![false; declared.len()];
        let mut transpose = Vec::with_capacity(actual.len());
        for index in actual.iter() {
            let pos = declared
                .iter()
                .enumerate()
                .position(|(pos, d)| d == index && !claimed[pos]);
            match pos {
                Some(pos) => {
                    claimed[pos] = true;
                    transpose.push(pos);
                }
                None => {
                    return self.unresolvable(arena, *index, &declared, "is not declared");
                }
            }
        }

        if let Some(pos) = claimed.iter().position(|c| !c) {
            return self.unresolvable(arena, declared[pos], &declared, "is never looped over");
        }

        Ok(transpose)
    }

    fn unresolvable(
        &mut self,
        arena: &Arena,
        index: IndexId,
        declared: &[IndexId],
        reason: &str,
    ) -> Result<Vec<usize>> {
        self.diagnostics.mark_error(NodeKey::Index(index));

        let name = arena.index_name(index)?;
        let declared: Vec<&str> = declared
            .iter()
            .map(|i| arena.index_name(*i))
            .collect::<Result<_>>()?;
        let declared = declared.join(", ");
        debug!(index = name, declared = %declared, "unresolvable index");

        binding_err!(
            UnresolvableIndex,
            format!("index '{name}' {reason} (declared: {declared})")
        )
    }
}

impl Rewriter for BindingPass {
    type State = LoopScope;

    fn rewrite_recipe(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        recipe: &Recipe,
        state: LoopScope,
    ) -> Result<(ExprId, LoopScope)> {
        let LoopScope {
            above,
            below: mut outer_below,
        } = state;

        let inner = LoopScope {
            above: above.clone(),
            below: VecDeque::new(),
        };
        let (body, inner) = self.rewrite(arena, recipe.body, inner)?;

        let recipe_indices: Vec<IndexId> = recipe
            .indices
            .iter()
            .filter(|i| !above.contains(i))
            .collect();
        let free: IndexList = recipe_indices
            .iter()
            .filter(|i| !inner.below.contains(*i))
            .copied()
            .collect();

        let mut below = inner.below;
        for index in free.iter().rev() {
            below.push_front(*index);
        }

        let transpose = self.transpose(arena, &recipe_indices, &below)?;
        debug!(
            recipe = %id,
            free = free.len(),
            transpose = ?transpose,
            "bound recipe indices"
        );

        let body = if free.is_empty() {
            body
        } else {
            arena.add(Expr::ForAll {
                indices: free,
                body,
            })
        };

        let new_id = arena.add(Expr::Recipe(Recipe {
            indices: recipe.indices.clone(),
            body,
            transpose: Some(transpose),
        }));

        // the caller sees this recipe's loops as already bound
        for index in below.iter().rev() {
            outer_below.push_front(*index);
        }
        Ok((
            new_id,
            LoopScope {
                above,
                below: outer_below,
            },
        ))
    }

    fn rewrite_index_sum(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        indices: &IndexList,
        body: ExprId,
        state: LoopScope,
    ) -> Result<(ExprId, LoopScope)> {
        let LoopScope { above, below } = state;
        let scoped = LoopScope {
            above: LoopScope::enter(&above, indices),
            below,
        };
        let (new_body, scoped) = self.rewrite(arena, body, scoped)?;

        let new_id = if new_body == body {
            id
        } else {
            arena.add(Expr::IndexSum {
                indices: indices.clone(),
                body: new_body,
            })
        };
        Ok((
            new_id,
            LoopScope {
                above,
                below: scoped.below,
            },
        ))
    }

    fn rewrite_for_all(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        indices: &IndexList,
        body: ExprId,
        state: LoopScope,
    ) -> Result<(ExprId, LoopScope)> {
        let LoopScope { above, below } = state;
        let scoped = LoopScope {
            above: LoopScope::enter(&above, indices),
            below,
        };
        let (new_body, scoped) = self.rewrite(arena, body, scoped)?;

        let mut below = scoped.below;
        for index in indices.iter() {
            below.push_front(*index);
        }

        let new_id = if new_body == body {
            id
        } else {
            arena.add(Expr::ForAll {
                indices: indices.clone(),
                body: new_body,
            })
        };
        Ok((new_id, LoopScope { above, below }))
    }

    fn rewrite_let(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        bindings: &[LetBinding],
        body: ExprId,
        state: LoopScope,
    ) -> Result<(ExprId, LoopScope)> {
        // a temporary's loops are private to it and must not take part in
        // the ordering of the expression that uses it
        let mut new_bindings = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let private = LoopScope {
                above: state.above.clone(),
                below: VecDeque::new(),
            };
            let (value, _) = self.rewrite(arena, binding.value, private)?;
            new_bindings.push(LetBinding {
                name: binding.name.clone(),
                value,
            });
        }
        let (new_body, state) = self.rewrite(arena, body, state)?;

        if new_body == body && new_bindings.as_slice() == bindings {
            return Ok((id, state));
        }
        let new_id = arena.add(Expr::Let {
            bindings: new_bindings,
            body: new_body,
        });
        Ok((new_id, state))
    }
}

/// Bind the free indices of every recipe under `root`.  On failure the
/// offending index is marked in `diagnostics`.
pub fn bind_indices(
    arena: &mut Arena,
    root: ExprId,
    diagnostics: &mut Diagnostics,
) -> Result<ExprId> {
    let mut pass = BindingPass::new();
    let result = pass.bind(arena, root);
    for key in pass.diagnostics().errors() {
        diagnostics.mark_error(key);
    }
    result
}
