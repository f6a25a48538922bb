// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Generic traversal of recipe expressions.
//!
//! Three modes share the node model's `children()`/`with_children()`
//! contract:
//!
//! - rewrite ([`Rewriter`]): rebuild a tree bottom-up, with identity as the
//!   default rule for every variant and per-variant overrides,
//! - walk ([`Walker`]): read-only traversal with pre/post visit hooks,
//! - graph accumulation ([`GraphAccumulator`]): a walker that records
//!   nodes and structural edges for debugging.
//!
//! Dispatch is one exhaustive `match` over [`Expr`], so adding a variant
//! forces every mode to decide how to handle it.

mod graph;
mod walk;

pub use graph::{GraphAccumulator, GraphEdge, GraphNode};
pub use walk::{WalkNode, Walker, walk};

use crate::ast::{Arena, Expr, ExprId, IndexId, IndexList, LetBinding, Recipe};
use crate::common::Result;

/// A rewrite over an [`Arena`].
///
/// `State` is owned by the recursion: each call receives the state
/// produced by its left sibling (or its parent, for the first child) and
/// returns the state its right sibling should see.  Overrides that scope
/// state to a subtree build an extended copy, recurse, and hand back the
/// caller's version instead of mutating shared collections.
///
/// Every `rewrite_*` method defaults to the identity rule; implementors
/// override only the variants whose semantics they change.
pub trait Rewriter {
    type State;

    fn rewrite(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        dispatch(self, arena, id, state)
    }

    fn rewrite_recipe(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        _recipe: &Recipe,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        rewrite_children(self, arena, id, state)
    }

    fn rewrite_for_all(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        _indices: &IndexList,
        _body: ExprId,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        rewrite_children(self, arena, id, state)
    }

    fn rewrite_index_sum(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        _indices: &IndexList,
        _body: ExprId,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        rewrite_children(self, arena, id, state)
    }

    fn rewrite_let(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        _bindings: &[LetBinding],
        _body: ExprId,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        rewrite_children(self, arena, id, state)
    }

    fn rewrite_variable(
        &mut self,
        _arena: &mut Arena,
        id: ExprId,
        _name: &str,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        Ok((id, state))
    }

    fn rewrite_index(
        &mut self,
        _arena: &mut Arena,
        id: ExprId,
        _index: IndexId,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        Ok((id, state))
    }

    /// Structural and arithmetic variants with no binding semantics.
    fn rewrite_node(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        state: Self::State,
    ) -> Result<(ExprId, Self::State)> {
        rewrite_children(self, arena, id, state)
    }
}

/// Route `id` to the [`Rewriter`] method for its variant.  A handle that
/// names no node aborts the rewrite with `UnknownNode`.
pub fn dispatch<R>(
    rewriter: &mut R,
    arena: &mut Arena,
    id: ExprId,
    state: R::State,
) -> Result<(ExprId, R::State)>
where
    R: Rewriter + ?Sized,
{
    // the node is cloned so the rewriter may append to the arena
    let expr = arena.get(id)?.clone();
    match &expr {
        Expr::Recipe(recipe) => rewriter.rewrite_recipe(arena, id, recipe, state),
        Expr::ForAll { indices, body } => {
            rewriter.rewrite_for_all(arena, id, indices, *body, state)
        }
        Expr::IndexSum { indices, body } => {
            rewriter.rewrite_index_sum(arena, id, indices, *body, state)
        }
        Expr::Let { bindings, body } => rewriter.rewrite_let(arena, id, bindings, *body, state),
        Expr::Variable(name) => rewriter.rewrite_variable(arena, id, name, state),
        Expr::Index(index) => rewriter.rewrite_index(arena, id, *index, state),
        Expr::Constant(_)
        | Expr::Sum(_)
        | Expr::Product(_)
        | Expr::Subscript { .. }
        | Expr::Call { .. }
        | Expr::Delta(_, _)
        | Expr::LeviCivita(_)
        | Expr::CompoundVector(_)
        | Expr::Inverse(_)
        | Expr::Det(_)
        | Expr::Abs(_)
        | Expr::Wave(_) => rewriter.rewrite_node(arena, id, state),
    }
}

/// The identity rule: rewrite every child in order, threading state from
/// one child to the next, and rebuild the node.  If no child changed the
/// original handle is returned, so untouched subtrees stay shared.
pub fn rewrite_children<R>(
    rewriter: &mut R,
    arena: &mut Arena,
    id: ExprId,
    state: R::State,
) -> Result<(ExprId, R::State)>
where
    R: Rewriter + ?Sized,
{
    let expr = arena.get(id)?.clone();
    let children = expr.children();

    let mut state = state;
    let mut new_children = Vec::with_capacity(children.len());
    for child in children.iter() {
        let (new_child, next) = rewriter.rewrite(arena, *child, state)?;
        new_children.push(new_child);
        state = next;
    }

    if new_children.as_slice() == children.as_slice() {
        return Ok((id, state));
    }

    let rebuilt = expr.with_children(&new_children)?;
    Ok((arena.add(rebuilt), state))
}

/// Applies the default rule everywhere.  Mostly useful as a reference
/// point: its output is structurally identical to its input.
#[derive(Default)]
pub struct IdentityRewriter;

impl Rewriter for IdentityRewriter {
    type State = ();
}

pub fn identity(arena: &mut Arena, root: ExprId) -> Result<ExprId> {
    let (id, ()) = IdentityRewriter.rewrite(arena, root, ())?;
    Ok(id)
}
