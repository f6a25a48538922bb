// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::ast::{Arena, Expr, ExprId, IndexGroups, IndexId, IndexList, Recipe};
use crate::common::Result;
use crate::rewrite::{Rewriter, rewrite_children};

/// Replaces `Index` leaves according to a mapping from index to
/// replacement expression.  Indices without an entry are left alone.
pub struct IndexSubstitution {
    replacements: HashMap<IndexId, ExprId>,
}

impl IndexSubstitution {
    pub fn new(replacements: HashMap<IndexId, ExprId>) -> Self {
        IndexSubstitution { replacements }
    }

    /// The index `index` becomes after substitution, or None if it is
    /// replaced by something that is not an index.
    fn renamed(&self, arena: &Arena, index: IndexId) -> Result<Option<IndexId>> {
        match self.replacements.get(&index) {
            None => Ok(Some(index)),
            Some(replacement) => match arena.get(*replacement)? {
                Expr::Index(new_index) => Ok(Some(*new_index)),
                _ => Ok(None),
            },
        }
    }

    fn rename_group(&self, arena: &Arena, group: &IndexList) -> Result<IndexList> {
        let mut renamed = IndexList::new();
        for index in group.iter() {
            if let Some(new_index) = self.renamed(arena, *index)? {
                renamed.push(new_index);
            }
        }
        Ok(renamed)
    }

    /// Scoped indices replaced by a non-index keep their original
    /// handle: the scope still iterates, its body just no longer
    /// refers to it.
    fn rename_scope(&self, arena: &Arena, indices: &IndexList) -> Result<IndexList> {
        indices
            .iter()
            .map(|index| Ok(self.renamed(arena, *index)?.unwrap_or(*index)))
            .collect()
    }
}

impl Rewriter for IndexSubstitution {
    type State = ();

    fn rewrite_index(
        &mut self,
        _arena: &mut Arena,
        id: ExprId,
        index: IndexId,
        state: (),
    ) -> Result<(ExprId, ())> {
        Ok((self.replacements.get(&index).copied().unwrap_or(id), state))
    }

    fn rewrite_recipe(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        recipe: &Recipe,
        state: (),
    ) -> Result<(ExprId, ())> {
        let indices = IndexGroups {
            domain: self.rename_group(arena, &recipe.indices.domain)?,
            basis: self.rename_group(arena, &recipe.indices.basis)?,
            point: self.rename_group(arena, &recipe.indices.point)?,
        };
        let (body, state) = self.rewrite(arena, recipe.body, state)?;

        if indices == recipe.indices && body == recipe.body {
            return Ok((id, state));
        }

        // the permutation only survives if it still describes as many
        // scalar loop indices as the recipe declares
        let transpose = match &recipe.transpose {
            Some(transpose)
                if arena.flatten(indices.iter())?.len()
                    == arena.flatten(recipe.indices.iter())?.len() =>
            {
                Some(transpose.clone())
            }
            _ => None,
        };

        let new_id = arena.add(Expr::Recipe(Recipe {
            indices,
            body,
            transpose,
        }));
        Ok((new_id, state))
    }

    fn rewrite_for_all(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        indices: &IndexList,
        body: ExprId,
        state: (),
    ) -> Result<(ExprId, ())> {
        let new_indices = self.rename_scope(arena, indices)?;
        if new_indices == *indices {
            return rewrite_children(self, arena, id, state);
        }
        let (body, state) = self.rewrite(arena, body, state)?;
        let new_id = arena.add(Expr::ForAll {
            indices: new_indices,
            body,
        });
        Ok((new_id, state))
    }

    fn rewrite_index_sum(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        indices: &IndexList,
        body: ExprId,
        state: (),
    ) -> Result<(ExprId, ())> {
        let new_indices = self.rename_scope(arena, indices)?;
        if new_indices == *indices {
            return rewrite_children(self, arena, id, state);
        }
        let (body, state) = self.rewrite(arena, body, state)?;
        let new_id = arena.add(Expr::IndexSum {
            indices: new_indices,
            body,
        });
        Ok((new_id, state))
    }
}

/// Substitute indices throughout the tree rooted at `root`.
pub fn substitute_indices(
    arena: &mut Arena,
    root: ExprId,
    replacements: HashMap<IndexId, ExprId>,
) -> Result<ExprId> {
    let mut substitution = IndexSubstitution::new(replacements);
    let (id, ()) = substitution.rewrite(arena, root, ())?;
    Ok(id)
}
