// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

pub mod expr;
pub mod index;

use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub use expr::{Children, Expr, ExprId, LetBinding, Recipe};
pub use index::{IndexData, IndexGroups, IndexId, IndexKind, IndexList};

use crate::common::Result;
use crate::rewrite_err;

/// Identifies anything a walker can visit: an expression node or an
/// index attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Expr(ExprId),
    Index(IndexId),
}

/// Owns every expression node and index.  Nodes are append-only, so a
/// handle stays valid (and its node unchanged) for the lifetime of the
/// arena; rewritten trees share unchanged subtrees with their inputs.
/// Handle for the next entry of a table holding `len` entries.  Handles
/// are `u32`, so a table cannot grow past `u32::MAX` entries.
fn next_handle(len: usize) -> u32 {
    match u32::try_from(len) {
        Ok(handle) => handle,
        Err(_) => panic!("arena table overflow: {len} entries do not fit a u32 handle"),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    exprs: Vec<Expr>,
    indices: Vec<IndexData>,
}

impl Arena {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(next_handle(self.exprs.len()));
        self.exprs.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> Result<&Expr> {
        match self.exprs.get(id.as_usize()) {
            Some(expr) => Ok(expr),
            None => rewrite_err!(UnknownNode, format!("{id}")),
        }
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn index(&mut self, name: &str, extent: usize, kind: IndexKind) -> IndexId {
        self.intern_index(IndexData {
            name: name.to_owned(),
            extent,
            kind,
            factors: IndexList::new(),
        })
    }

    /// A tensor-product index over `factors`; its extent is the product
    /// of the factor extents.
    pub fn composite_index(
        &mut self,
        name: &str,
        kind: IndexKind,
        factors: &[IndexId],
    ) -> Result<IndexId> {
        let mut extent = 1;
        for factor in factors {
            extent *= self.index_data(*factor)?.extent;
        }
        Ok(self.intern_index(IndexData {
            name: name.to_owned(),
            extent,
            kind,
            factors: factors.iter().copied().collect(),
        }))
    }

    fn intern_index(&mut self, data: IndexData) -> IndexId {
        let id = IndexId(next_handle(self.indices.len()));
        self.indices.push(data);
        id
    }

    pub fn index_data(&self, id: IndexId) -> Result<&IndexData> {
        match self.indices.get(id.as_usize()) {
            Some(data) => Ok(data),
            None => rewrite_err!(UnknownIndex, format!("{id}")),
        }
    }

    pub fn index_name(&self, id: IndexId) -> Result<&str> {
        Ok(self.index_data(id)?.name.as_str())
    }

    /// Expand composite indices into their scalar factors, recursively
    /// and in order.  A scalar index expands to itself.
    pub fn flatten<I>(&self, indices: I) -> Result<Vec<IndexId>>
    where
        I: IntoIterator<Item = IndexId>,
    {
        let mut result = Vec::new();
        for id in indices {
            self.flatten_into(id, &mut result)?;
        }
        Ok(result)
    }

    fn flatten_into(&self, id: IndexId, out: &mut Vec<IndexId>) -> Result<()> {
        let data = self.index_data(id)?;
        if data.is_composite() {
            for factor in data.factors.iter() {
                self.flatten_into(*factor, out)?;
            }
        } else {
            out.push(id);
        }
        Ok(())
    }

    pub fn variable(&mut self, name: &str) -> ExprId {
        self.add(Expr::Variable(name.to_owned()))
    }

    pub fn index_ref(&mut self, index: IndexId) -> ExprId {
        self.add(Expr::Index(index))
    }

    pub fn constant(&mut self, value: f64) -> ExprId {
        self.add(Expr::Constant(OrderedFloat(value)))
    }

    pub fn recipe(&mut self, indices: IndexGroups, body: ExprId) -> ExprId {
        self.add(Expr::Recipe(Recipe {
            indices,
            body,
            transpose: None,
        }))
    }

    pub fn for_all(&mut self, indices: &[IndexId], body: ExprId) -> ExprId {
        self.add(Expr::ForAll {
            indices: indices.iter().copied().collect(),
            body,
        })
    }

    pub fn index_sum(&mut self, indices: &[IndexId], body: ExprId) -> ExprId {
        self.add(Expr::IndexSum {
            indices: indices.iter().copied().collect(),
            body,
        })
    }

    pub fn let_in(&mut self, bindings: Vec<LetBinding>, body: ExprId) -> ExprId {
        self.add(Expr::Let { bindings, body })
    }

    pub fn sum(&mut self, terms: Vec<ExprId>) -> ExprId {
        self.add(Expr::Sum(terms))
    }

    pub fn product(&mut self, factors: Vec<ExprId>) -> ExprId {
        self.add(Expr::Product(factors))
    }

    pub fn subscript(&mut self, aggregate: ExprId, indices: Vec<ExprId>) -> ExprId {
        self.add(Expr::Subscript { aggregate, indices })
    }

    pub fn call(&mut self, function: ExprId, args: Vec<ExprId>) -> ExprId {
        self.add(Expr::Call { function, args })
    }

    /// Indices occurring free in the subtree rooted at `id`.  A
    /// `ForAll`/`IndexSum` binds its indices and their factors; a
    /// `Recipe` only declares its indices and does not bind them.
    pub fn free_indices(&self, id: ExprId) -> Result<BTreeSet<IndexId>> {
        let mut free = BTreeSet::new();
        self.collect_free(id, &mut Vec::new(), &mut free)?;
        Ok(free)
    }

    fn collect_free(
        &self,
        id: ExprId,
        bound: &mut Vec<IndexId>,
        free: &mut BTreeSet<IndexId>,
    ) -> Result<()> {
        let expr = self.get(id)?;
        if let Expr::Index(index) = expr {
            let is_bound = bound.contains(index)
                || self.flatten([*index])?.iter().all(|i| bound.contains(i));
            if !is_bound {
                free.insert(*index);
            }
            return Ok(());
        }

        let depth = bound.len();
        if let Some(scoped) = expr.scoped_indices() {
            bound.extend(scoped.iter().copied());
            bound.extend(self.flatten(scoped.iter().copied())?);
        }
        for child in expr.children() {
            self.collect_free(child, bound, free)?;
        }
        bound.truncate(depth);

        Ok(())
    }
}
