// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use super::index::{IndexGroups, IndexId, IndexList};
use crate::common::Result;
use crate::rewrite_err;

/// Handle of a node in an [`Arena`](super::Arena).  Nodes are immutable
/// once added, so a handle always denotes the same expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expr#{}", self.0)
    }
}

pub type Children = SmallVec<[ExprId; 4]>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipe {
    pub indices: IndexGroups,
    pub body: ExprId,
    /// Set by the binding pass.  `transpose[k]` is the position in the
    /// flattened declared order of the k-th flattened loop index.
    pub transpose: Option<Vec<usize>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LetBinding {
    pub name: String,
    pub value: ExprId,
}

impl LetBinding {
    pub fn new(name: &str, value: ExprId) -> Self {
        LetBinding {
            name: name.to_owned(),
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Recipe(Recipe),
    ForAll {
        indices: IndexList,
        body: ExprId,
    },
    IndexSum {
        indices: IndexList,
        body: ExprId,
    },
    Let {
        bindings: Vec<LetBinding>,
        body: ExprId,
    },
    Variable(String),
    /// An index used as a value, e.g. to address storage.
    Index(IndexId),
    Constant(OrderedFloat<f64>),
    Sum(Vec<ExprId>),
    Product(Vec<ExprId>),
    Subscript {
        aggregate: ExprId,
        indices: Vec<ExprId>,
    },
    Call {
        function: ExprId,
        args: Vec<ExprId>,
    },
    Delta(ExprId, ExprId),
    LeviCivita(Vec<ExprId>),
    CompoundVector(Vec<ExprId>),
    Inverse(ExprId),
    Det(ExprId),
    Abs(ExprId),
    /// The last child is the body; the others are the wave's state.
    Wave(Vec<ExprId>),
}

impl Expr {
    /// Stable display name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Expr::Recipe(_) => "Recipe",
            Expr::ForAll { .. } => "ForAll",
            Expr::IndexSum { .. } => "IndexSum",
            Expr::Let { .. } => "Let",
            Expr::Variable(_) => "Variable",
            Expr::Index(_) => "Index",
            Expr::Constant(_) => "Constant",
            Expr::Sum(_) => "Sum",
            Expr::Product(_) => "Product",
            Expr::Subscript { .. } => "Subscript",
            Expr::Call { .. } => "Call",
            Expr::Delta(_, _) => "Delta",
            Expr::LeviCivita(_) => "LeviCivita",
            Expr::CompoundVector(_) => "CompoundVector",
            Expr::Inverse(_) => "Inverse",
            Expr::Det(_) => "Det",
            Expr::Abs(_) => "Abs",
            Expr::Wave(_) => "Wave",
        }
    }

    /// Expression children in rebuild order.  Index lists scoped by
    /// `ForAll`/`IndexSum` and the declared groups of a `Recipe` are
    /// attributes, not children.
    pub fn children(&self) -> Children {
        match self {
            Expr::Recipe(recipe) => smallvec![recipe.body],
            Expr::ForAll { body, .. } | Expr::IndexSum { body, .. } => smallvec![*body],
            Expr::Let { bindings, body } => bindings
                .iter()
                .map(|b| b.value)
                .chain(std::iter::once(*body))
                .collect(),
            Expr::Variable(_) | Expr::Index(_) | Expr::Constant(_) => SmallVec::new(),
            Expr::Sum(args)
            | Expr::Product(args)
            | Expr::LeviCivita(args)
            | Expr::CompoundVector(args)
            | Expr::Wave(args) => args.iter().copied().collect(),
            Expr::Subscript { aggregate, indices } => std::iter::once(*aggregate)
                .chain(indices.iter().copied())
                .collect(),
            Expr::Call { function, args } => std::iter::once(*function)
                .chain(args.iter().copied())
                .collect(),
            Expr::Delta(a, b) => smallvec![*a, *b],
            Expr::Inverse(x) | Expr::Det(x) | Expr::Abs(x) => smallvec![*x],
        }
    }

    /// Rebuild this node with new children, given in the order
    /// [`children`](Self::children) returns them.  Variant, arity and
    /// all non-child attributes are preserved.
    pub fn with_children(&self, children: &[ExprId]) -> Result<Expr> {
        let expected = self.children().len();
        if children.len() != expected {
            return rewrite_err!(
                MismatchedArity,
                format!(
                    "{} expects {} children, got {}",
                    self.name(),
                    expected,
                    children.len()
                )
            );
        }

        let expr = match self {
            Expr::Recipe(recipe) => Expr::Recipe(Recipe {
                indices: recipe.indices.clone(),
                body: children[0],
                transpose: recipe.transpose.clone(),
            }),
            Expr::ForAll { indices, .. } => Expr::ForAll {
                indices: indices.clone(),
                body: children[0],
            },
            Expr::IndexSum { indices, .. } => Expr::IndexSum {
                indices: indices.clone(),
                body: children[0],
            },
            Expr::Let { bindings, .. } => {
                let (values, body) = children.split_at(bindings.len());
                Expr::Let {
                    bindings: bindings
                        .iter()
                        .zip(values)
                        .map(|(b, value)| LetBinding {
                            name: b.name.clone(),
                            value: *value,
                        })
                        .collect(),
                    body: body[0],
                }
            }
            Expr::Variable(_) | Expr::Index(_) | Expr::Constant(_) => self.clone(),
            Expr::Sum(_) => Expr::Sum(children.to_vec()),
            Expr::Product(_) => Expr::Product(children.to_vec()),
            Expr::LeviCivita(_) => Expr::LeviCivita(children.to_vec()),
            Expr::CompoundVector(_) => Expr::CompoundVector(children.to_vec()),
            Expr::Wave(_) => Expr::Wave(children.to_vec()),
            Expr::Subscript { .. } => Expr::Subscript {
                aggregate: children[0],
                indices: children[1..].to_vec(),
            },
            Expr::Call { .. } => Expr::Call {
                function: children[0],
                args: children[1..].to_vec(),
            },
            Expr::Delta(_, _) => Expr::Delta(children[0], children[1]),
            Expr::Inverse(_) => Expr::Inverse(children[0]),
            Expr::Det(_) => Expr::Det(children[0]),
            Expr::Abs(_) => Expr::Abs(children[0]),
        };

        Ok(expr)
    }

    /// Indices introduced by this node for the scope of its body.
    pub fn scoped_indices(&self) -> Option<&IndexList> {
        match self {
            Expr::ForAll { indices, .. } | Expr::IndexSum { indices, .. } => Some(indices),
            _ => None,
        }
    }
}
