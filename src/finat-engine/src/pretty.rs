// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::ast::{Arena, Expr, ExprId, IndexId, NodeKey};
use crate::common::Result;
use crate::diagnostics::Diagnostics;

fn child_needs_parens(parent: &Expr, child: &Expr) -> bool {
    match parent {
        // a sum inside a product is the only ambiguous nesting
        Expr::Product(_) => matches!(child, Expr::Sum(_)),
        _ => false,
    }
}

fn pretty_index(arena: &Arena, index: IndexId, diagnostics: &Diagnostics) -> Result<String> {
    let name = arena.index_name(index)?;
    if diagnostics.is_error(NodeKey::Index(index)) {
        Ok(format!("!{name}!"))
    } else {
        Ok(name.to_owned())
    }
}

fn pretty_indices<'a, I>(arena: &Arena, indices: I, diagnostics: &Diagnostics) -> Result<String>
where
    I: IntoIterator<Item = &'a IndexId>,
{
    let names: Vec<String> = indices
        .into_iter()
        .map(|i| pretty_index(arena, *i, diagnostics))
        .collect::<Result<_>>()?;
    Ok(format!("({})", names.join(", ")))
}

fn pretty_list(
    arena: &Arena,
    parent: &Expr,
    ids: &[ExprId],
    sep: &str,
    diagnostics: &Diagnostics,
) -> Result<String> {
    let parts: Vec<String> = ids
        .iter()
        .map(|id| -> Result<String> {
            let eqn = pretty(arena, *id, diagnostics)?;
            if child_needs_parens(parent, arena.get(*id)?) {
                Ok(format!("({eqn})"))
            } else {
                Ok(eqn)
            }
        })
        .collect::<Result<_>>()?;
    Ok(parts.join(sep))
}

/// Render the tree rooted at `id` as a single line.  Indices marked as
/// errors in `diagnostics` are rendered as `!name!`.
pub fn pretty(arena: &Arena, id: ExprId, diagnostics: &Diagnostics) -> Result<String> {
    let expr = arena.get(id)?;
    let eqn = match expr {
        Expr::Recipe(recipe) => {
            let groups: Vec<String> = recipe
                .indices
                .groups()
                .into_iter()
                .map(|group| pretty_indices(arena, group.iter(), diagnostics))
                .collect::<Result<_>>()?;
            let body = pretty(arena, recipe.body, diagnostics)?;
            match &recipe.transpose {
                Some(transpose) => format!(
                    "Recipe({}, {}, transpose={:?})",
                    groups.join(", "),
                    body,
                    transpose
                ),
                None => format!("Recipe({}, {})", groups.join(", "), body),
            }
        }
        Expr::ForAll { indices, body } => format!(
            "ForAll({}, {})",
            pretty_indices(arena, indices.iter(), diagnostics)?,
            pretty(arena, *body, diagnostics)?
        ),
        Expr::IndexSum { indices, body } => format!(
            "IndexSum({}, {})",
            pretty_indices(arena, indices.iter(), diagnostics)?,
            pretty(arena, *body, diagnostics)?
        ),
        Expr::Let { bindings, body } => {
            let bindings: Vec<String> = bindings
                .iter()
                .map(|b| -> Result<String> {
                    Ok(format!("{} = {}", b.name, pretty(arena, b.value, diagnostics)?))
                })
                .collect::<Result<_>>()?;
            format!(
                "let {} in {}",
                bindings.join(", "),
                pretty(arena, *body, diagnostics)?
            )
        }
        Expr::Variable(name) => name.clone(),
        Expr::Index(index) => pretty_index(arena, *index, diagnostics)?,
        Expr::Constant(n) => format!("{n}"),
        Expr::Sum(terms) => pretty_list(arena, expr, terms, " + ", diagnostics)?,
        Expr::Product(factors) => pretty_list(arena, expr, factors, " * ", diagnostics)?,
        Expr::Subscript { aggregate, indices } => format!(
            "{}[{}]",
            pretty(arena, *aggregate, diagnostics)?,
            pretty_list(arena, expr, indices, ", ", diagnostics)?
        ),
        Expr::Call { function, args } => format!(
            "{}({})",
            pretty(arena, *function, diagnostics)?,
            pretty_list(arena, expr, args, ", ", diagnostics)?
        ),
        Expr::Delta(_, _)
        | Expr::LeviCivita(_)
        | Expr::CompoundVector(_)
        | Expr::Inverse(_)
        | Expr::Det(_)
        | Expr::Abs(_)
        | Expr::Wave(_) => format!(
            "{}({})",
            expr.name(),
            pretty_list(arena, expr, &expr.children(), ", ", diagnostics)?
        ),
    };

    Ok(eqn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{IndexGroups, IndexKind, LetBinding};

    #[test]
    fn renders_recipe() {
        let mut arena = Arena::new();
        let i = arena.index("i", 3, IndexKind::BasisFunction);
        let q = arena.index("q", 4, IndexKind::Point);
        let ir = arena.index_ref(i);
        let qr = arena.index_ref(q);
        let u = arena.variable("u");
        let w = arena.variable("w");
        let sub = arena.subscript(u, vec![ir, qr]);
        let two = arena.constant(2.0);
        let sum = arena.sum(vec![sub, two]);
        let product = arena.product(vec![sum, w]);
        let isum = arena.index_sum(&[q], product);
        let recipe = arena.recipe(IndexGroups::new(&[], &[i], &[q]), isum);

        assert_eq!(
            "Recipe((), (i), (q), IndexSum((q), (u[i, q] + 2) * w))",
            pretty(&arena, recipe, &Diagnostics::new()).unwrap()
        );
    }

    #[test]
    fn marks_error_indices() {
        let mut arena = Arena::new();
        let j = arena.index("j", 5, IndexKind::Free);
        let jr = arena.index_ref(j);
        let abs = arena.add(Expr::Abs(jr));
        let root = arena.let_in(vec![LetBinding::new("t", abs)], jr);

        let mut diagnostics = Diagnostics::new();
        diagnostics.mark_error(NodeKey::Index(j));
        assert_eq!(
            "let t = Abs(!j!) in !j!",
            pretty(&arena, root, &diagnostics).unwrap()
        );
    }
}
