// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Scheduling of finite-element recipes.
//!
//! A recipe is an index-free expression tree held in an [`Arena`].
//! [`schedule`] turns it into one a code generator can run: the binding
//! pass wraps the recipe's free indices in loops and records the
//! permutation from declared to loop order, then the extraction pass
//! binds every reduction to a named temporary computed once.
//!
//! ```
//! use finat_engine::{Arena, Diagnostics, ExtractOptions, IndexGroups, IndexKind, pretty, schedule};
//!
//! let mut arena = Arena::new();
//! let i = arena.index("i", 3, IndexKind::BasisFunction);
//! let ir = arena.index_ref(i);
//! let u = arena.variable("u");
//! let body = arena.subscript(u, vec![ir]);
//! let recipe = arena.recipe(IndexGroups::new(&[], &[i], &[]), body);
//!
//! let scheduled = schedule(&mut arena, recipe, &ExtractOptions::default()).unwrap();
//! assert_eq!(
//!     "Recipe((), (i), (), ForAll((i), u[i]), transpose=[0])",
//!     pretty(&arena, scheduled.root, &Diagnostics::new()).unwrap()
//! );
//! ```

#![forbid(unsafe_code)]

use tracing::info_span;

pub mod ast;
pub mod binding;
pub mod common;
pub mod diagnostics;
pub mod extract;
pub mod pretty;
pub mod rewrite;
pub mod substitute;

#[cfg(test)]
mod rewrite_proptest;
#[cfg(test)]
mod test_common;

pub use self::ast::{
    Arena, Expr, ExprId, IndexData, IndexGroups, IndexId, IndexKind, LetBinding, NodeKey, Recipe,
};
pub use self::binding::{BindingPass, bind_indices};
pub use self::common::{Error, ErrorCode, ErrorKind, Result};
pub use self::diagnostics::Diagnostics;
pub use self::extract::{ExtractOptions, ExtractionPass, extract_temporaries};
pub use self::pretty::pretty;
pub use self::rewrite::{GraphAccumulator, Rewriter, Walker};
pub use self::substitute::substitute_indices;

/// A recipe ready for code generation.
#[derive(Clone, Debug)]
pub struct Scheduled {
    pub root: ExprId,
    pub diagnostics: Diagnostics,
}

/// Bind the free indices of `recipe` to loops, then extract its
/// reductions into temporaries.
pub fn schedule(arena: &mut Arena, recipe: ExprId, options: &ExtractOptions) -> Result<Scheduled> {
    let mut diagnostics = Diagnostics::new();

    let bound = {
        let _span = info_span!("bind", recipe = %recipe).entered();
        bind_indices(arena, recipe, &mut diagnostics)?
    };

    let root = {
        let _span = info_span!("extract", recipe = %bound).entered();
        extract_temporaries(arena, bound, options)?
    };

    Ok(Scheduled { root, diagnostics })
}
