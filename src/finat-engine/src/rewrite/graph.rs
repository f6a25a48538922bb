// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::fmt;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use super::walk::{WalkNode, Walker, walk};
use crate::ast::{Arena, Expr, ExprId, NodeKey};
use crate::common::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphNode {
    pub key: NodeKey,
    pub label: String,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Structural parent to child edge; carries no label.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphEdge;

impl fmt::Display for GraphEdge {
    fn fmt(&self, _f: &mut fmt::Formatter) -> fmt::Result {
        Ok(())
    }
}

/// Records one graph node per distinct node reached by a walk and one
/// edge per structural parent/child pair.  Shared subtrees appear once
/// with several incoming edges.
#[derive(Default)]
pub struct GraphAccumulator {
    graph: DiGraph<GraphNode, GraphEdge>,
    seen: HashMap<NodeKey, NodeIndex>,
    stack: Vec<NodeIndex>,
}

impl GraphAccumulator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_expr(arena: &Arena, root: ExprId) -> Result<Self> {
        let mut acc = GraphAccumulator::new();
        walk(arena, root, &mut acc)?;
        Ok(acc)
    }

    pub fn graph(&self) -> &DiGraph<GraphNode, GraphEdge> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Graphviz source for the accumulated graph.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[Config::EdgeNoLabel]))
    }
}

fn label(node: &WalkNode) -> String {
    match node {
        WalkNode::Index(_, data) => data.name.clone(),
        WalkNode::Expr(_, expr) => match expr {
            Expr::Variable(name) => name.clone(),
            Expr::Constant(value) => format!("{value}"),
            _ => expr.name().to_owned(),
        },
    }
}

impl Walker for GraphAccumulator {
    fn visit(&mut self, _arena: &Arena, node: WalkNode) -> bool {
        let key = node.key();
        let (ix, fresh) = match self.seen.get(&key) {
            Some(ix) => (*ix, false),
            None => {
                let ix = self.graph.add_node(GraphNode {
                    key,
                    label: label(&node),
                });
                self.seen.insert(key, ix);
                (ix, true)
            }
        };

        if let Some(parent) = self.stack.last() {
            self.graph.update_edge(*parent, ix, GraphEdge);
        }

        if fresh {
            self.stack.push(ix);
        }
        fresh
    }

    fn post_visit(&mut self, _arena: &Arena, _node: WalkNode) {
        self.stack.pop();
    }
}
