// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::ast::{Arena, Expr, ExprId, IndexData, IndexId, NodeKey};
use crate::common::Result;

/// A node seen by a [`Walker`]: either an expression or one of the
/// indices a `Recipe`, `ForAll` or `IndexSum` carries as an attribute.
#[derive(Copy, Clone, Debug)]
pub enum WalkNode<'a> {
    Expr(ExprId, &'a Expr),
    Index(IndexId, &'a IndexData),
}

impl WalkNode<'_> {
    pub fn key(&self) -> NodeKey {
        match self {
            WalkNode::Expr(id, _) => NodeKey::Expr(*id),
            WalkNode::Index(id, _) => NodeKey::Index(*id),
        }
    }
}

/// Read-only traversal hooks.  Walkers must not mutate the arena.
pub trait Walker {
    /// Called before descending; returning false skips the node's
    /// children and its `post_visit`.
    fn visit(&mut self, _arena: &Arena, _node: WalkNode) -> bool {
        true
    }

    fn post_visit(&mut self, _arena: &Arena, _node: WalkNode) {}
}

/// Depth-first walk from `root`.
///
/// A `Recipe` descends into its domain, basis and point indices, then its
/// body.  `ForAll` and `IndexSum` descend into their indices, then their
/// body.  Index nodes are leaves: neither extents nor factors are
/// visited.
pub fn walk<W: Walker + ?Sized>(arena: &Arena, root: ExprId, walker: &mut W) -> Result<()> {
    let expr = arena.get(root)?;
    let node = WalkNode::Expr(root, expr);
    if !walker.visit(arena, node) {
        return Ok(());
    }

    match expr {
        Expr::Recipe(recipe) => {
            for index in recipe.indices.iter() {
                walk_index(arena, index, walker)?;
            }
            walk(arena, recipe.body, walker)?;
        }
        Expr::ForAll { indices, body } | Expr::IndexSum { indices, body } => {
            for index in indices.iter() {
                walk_index(arena, *index, walker)?;
            }
            walk(arena, *body, walker)?;
        }
        Expr::Let { .. }
        | Expr::Variable(_)
        | Expr::Index(_)
        | Expr::Constant(_)
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
        | Expr::Wave(_) => {
            for child in expr.children() {
                walk(arena, child, walker)?;
            }
        }
    }

    walker.post_visit(arena, node);
    Ok(())
}

fn walk_index<W: Walker + ?Sized>(arena: &Arena, index: IndexId, walker: &mut W) -> Result<()> {
    let node = WalkNode::Index(index, arena.index_data(index)?);
    if walker.visit(arena, node) {
        walker.post_visit(arena, node);
    }
    Ok(())
}
