// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::ast::{Arena, Expr, NodeKey};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    /// The node caused a pass to fail.
    Error,
}

/// Side table of annotations keyed by node, filled in by passes and read
/// by renderers.  Nodes themselves never carry presentation state.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    annotations: HashMap<NodeKey, Annotation>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn mark_error(&mut self, key: NodeKey) {
        self.annotations.insert(key, Annotation::Error);
    }

    pub fn get(&self, key: NodeKey) -> Option<Annotation> {
        self.annotations.get(&key).copied()
    }

    pub fn is_error(&self, key: NodeKey) -> bool {
        self.get(key) == Some(Annotation::Error)
    }

    pub fn errors(&self) -> Vec<NodeKey> {
        let mut errors: Vec<NodeKey> = self
            .annotations
            .iter()
            .filter(|(_, a)| **a == Annotation::Error)
            .map(|(k, _)| *k)
            .collect();
        errors.sort();
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Display class for a node: "error" if marked, otherwise the role of
    /// an index or "variable" for variables.
    pub fn class_of(&self, arena: &Arena, key: NodeKey) -> &'static str {
        if self.is_error(key) {
            return "error";
        }
        match key {
            NodeKey::Index(id) => arena
                .index_data(id)
                .map(|data| data.kind.as_str())
                .unwrap_or("error"),
            NodeKey::Expr(id) => match arena.get(id) {
                Ok(Expr::Index(index)) => self.class_of(arena, NodeKey::Index(*index)),
                Ok(Expr::Variable(_)) => "variable",
                Ok(_) => "plain",
                Err(_) => "error",
            },
        }
    }
}

#[test]
fn test_class_of() {
    use crate::ast::IndexKind;

    let mut arena = Arena::new();
    let q = arena.index("q", 3, IndexKind::Point);
    let qr = arena.index_ref(q);
    let u = arena.variable("u");

    let mut diags = Diagnostics::new();
    assert_eq!("point", diags.class_of(&arena, NodeKey::Index(q)));
    assert_eq!("point", diags.class_of(&arena, NodeKey::Expr(qr)));
    assert_eq!("variable", diags.class_of(&arena, NodeKey::Expr(u)));

    diags.mark_error(NodeKey::Index(q));
    assert_eq!("error", diags.class_of(&arena, NodeKey::Index(q)));
    assert_eq!("error", diags.class_of(&arena, NodeKey::Expr(qr)));
    assert_eq!(vec![NodeKey::Index(q)], diags.errors());
}
