// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Extraction of reductions into named temporaries.
//!
//! Every `IndexSum` that is not already the value of a user-written `Let`
//! binding is computed once, bound to a fresh name, and referenced by
//! that name everywhere it was used.  The pass runs in two phases per
//! region (a recipe body, or the root when the root is not a recipe):
//!
//! 1. A rewrite replaces each unbound `IndexSum` with a `Variable`,
//!    recording the sum (with its own body already rewritten) as a
//!    pending temporary.  Encountering the same handle again in the same
//!    binding scope yields another reference to the same temporary.  The
//!    binding scope of a sum is the innermost enclosing `ForAll`,
//!    `IndexSum` or user `Let` that binds an index or name the sum reads;
//!    the same handle under two such scopes reads different values and
//!    gets a temporary in each.
//! 2. Placement rebuilds the region bottom-up, counting references per
//!    subtree.  A temporary is bound by a `Let` around the lowest node
//!    whose subtree holds every reference to it, including references
//!    from the values of temporaries placed below that node.  A bare
//!    reference is never a placement point unless it is the body of a
//!    `ForAll`/`IndexSum` or a value or body of a `Let`, so a temporary
//!    is not hoisted out of a scope that contains all of its uses.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ast::{Arena, Expr, ExprId, IndexId, IndexList, LetBinding, Recipe};
use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::rewrite::{Rewriter, WalkNode, Walker, rewrite_children, walk};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Prefix of minted temporary names; temporaries are named
    /// `{prefix}_{n}`.
    pub temp_prefix: String,
    /// Emit a warning for temporaries that are never referenced.
    pub warn_unused: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            temp_prefix: "isum".to_owned(),
            warn_unused: true,
        }
    }
}

impl ExtractOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| {
            Error::new(ErrorKind::Extraction, ErrorCode::Generic, Some(err.to_string()))
        })
    }
}

/// Mints temporary names that collide neither with each other nor with
/// any reserved name.
#[derive(Clone, Debug)]
pub struct TempNamer {
    prefix: String,
    next: usize,
    reserved: HashSet<String>,
}

impl TempNamer {
    pub fn new(prefix: &str) -> Self {
        TempNamer {
            prefix: prefix.to_owned(),
            next: 0,
            reserved: HashSet::new(),
        }
    }

    pub fn reserve(&mut self, name: &str) {
        self.reserved.insert(name.to_owned());
    }

    pub fn fresh(&mut self) -> String {
        loop {
            let name = format!("{}_{}", self.prefix, self.next);
            self.next += 1;
            if !self.reserved.contains(&name) {
                self.reserved.insert(name.clone());
                return name;
            }
        }
    }
}

#[derive(Clone, Debug)]
struct Temporary {
    name: String,
    value: ExprId,
}

/// Extraction state local to one recipe body.
#[derive(Default)]
struct Region {
    /// Temporary minted for each `IndexSum` handle seen so far, per
    /// binding scope.  Scope `0` is the region itself.
    memo: HashMap<(ExprId, usize), String>,
    /// Temporaries in completion order: a temporary's value only refers
    /// to temporaries that precede it.
    pending: Vec<Temporary>,
}

/// Collects the sums users bound explicitly and every name already in
/// use.
struct Prescan<'a> {
    bound: &'a mut HashSet<ExprId>,
    namer: &'a mut TempNamer,
}

impl Walker for Prescan<'_> {
    fn visit(&mut self, arena: &Arena, node: WalkNode) -> bool {
        match node {
            WalkNode::Expr(_, Expr::Let { bindings, .. }) => {
                for binding in bindings {
                    self.namer.reserve(&binding.name);
                    if let Ok(Expr::IndexSum { .. }) = arena.get(binding.value) {
                        self.bound.insert(binding.value);
                    }
                }
            }
            WalkNode::Expr(_, Expr::Variable(name)) => self.namer.reserve(name),
            _ => {}
        }
        true
    }
}

/// Variable names read anywhere under a node.
#[derive(Default)]
struct Names(HashSet<String>);

impl Walker for Names {
    fn visit(&mut self, _arena: &Arena, node: WalkNode) -> bool {
        if let WalkNode::Expr(_, Expr::Variable(name)) = node {
            self.0.insert(name.clone());
        }
        true
    }
}

/// A scope entered during the rewrite, with the indices (and their
/// factors) or user names it binds.
struct Scope {
    serial: usize,
    indices: HashSet<IndexId>,
    names: HashSet<String>,
}

pub struct ExtractionPass {
    options: ExtractOptions,
    namer: TempNamer,
    bound: HashSet<ExprId>,
    region: Region,
    scopes: Vec<Scope>,
    next_scope: usize,
}

impl ExtractionPass {
    pub fn new(options: ExtractOptions) -> Self {
        let namer = TempNamer::new(&options.temp_prefix);
        ExtractionPass {
            options,
            namer,
            bound: HashSet::new(),
            region: Region::default(),
            scopes: Vec::new(),
            next_scope: 0,
        }
    }

    pub fn extract(&mut self, arena: &mut Arena, root: ExprId) -> Result<ExprId> {
        walk(
            arena,
            root,
            &mut Prescan {
                bound: &mut self.bound,
                namer: &mut self.namer,
            },
        )?;

        let (id, ()) = self.rewrite(arena, root, ())?;
        // a recipe root has already placed its own region
        let region = std::mem::take(&mut self.region);
        place_region(arena, id, &region.pending, self.options.warn_unused)
    }

    /// Run `f` inside a new scope binding `indices` and `names`.  Every
    /// entry gets a fresh serial, so two visits of one shared node are
    /// distinct scopes.
    fn scoped<T>(
        &mut self,
        arena: &mut Arena,
        indices: &[IndexId],
        names: HashSet<String>,
        f: impl FnOnce(&mut Self, &mut Arena) -> Result<T>,
    ) -> Result<T> {
        let mut bound: HashSet<IndexId> = indices.iter().copied().collect();
        bound.extend(arena.flatten(indices.iter().copied())?);
        self.next_scope += 1;
        self.scopes.push(Scope {
            serial: self.next_scope,
            indices: bound,
            names,
        });
        let result = f(self, arena);
        self.scopes.pop();
        result
    }

    /// Serial of the innermost open scope that binds something `sum`
    /// reads, or `0` when the sum reads nothing bound inside the region.
    fn binding_scope(&self, arena: &Arena, sum: ExprId) -> Result<usize> {
        let mut reads = HashSet::new();
        for index in arena.free_indices(sum)? {
            reads.insert(index);
            reads.extend(arena.flatten([index])?);
        }
        let mut names = Names::default();
        walk(arena, sum, &mut names)?;

        Ok(self
            .scopes
            .iter()
            .rev()
            .find(|scope| {
                !scope.indices.is_disjoint(&reads) || !scope.names.is_disjoint(&names.0)
            })
            .map_or(0, |scope| scope.serial))
    }
}

impl Rewriter for ExtractionPass {
    type State = ();

    fn rewrite_index_sum(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        indices: &IndexList,
        body: ExprId,
        state: (),
    ) -> Result<(ExprId, ())> {
        if self.bound.contains(&id) {
            return self.scoped(arena, indices, HashSet::new(), |pass, arena| {
                rewrite_children(pass, arena, id, state)
            });
        }
        let key = (id, self.binding_scope(arena, id)?);
        if let Some(name) = self.region.memo.get(&key) {
            let name = name.clone();
            return Ok((arena.variable(&name), state));
        }

        let (new_body, state) = self.scoped(arena, indices, HashSet::new(), |pass, arena| {
            pass.rewrite(arena, body, state)
        })?;
        let value = if new_body == body {
            id
        } else {
            arena.add(Expr::IndexSum {
                indices: indices.clone(),
                body: new_body,
            })
        };

        let name = self.namer.fresh();
        debug!(temporary = %name, sum = %id, scope = key.1, "extracted reduction");
        self.region.memo.insert(key, name.clone());
        self.region.pending.push(Temporary {
            name: name.clone(),
            value,
        });

        Ok((arena.variable(&name), state))
    }

    fn rewrite_for_all(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        indices: &IndexList,
        _body: ExprId,
        state: (),
    ) -> Result<(ExprId, ())> {
        self.scoped(arena, indices, HashSet::new(), |pass, arena| {
            rewrite_children(pass, arena, id, state)
        })
    }

    fn rewrite_let(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        bindings: &[LetBinding],
        body: ExprId,
        state: (),
    ) -> Result<(ExprId, ())> {
        // each value sees the names bound before it; the body sees them all
        let mut names = HashSet::new();
        let mut new_bindings = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let (value, ()) = self.scoped(arena, &[], names.clone(), |pass, arena| {
                pass.rewrite(arena, binding.value, state)
            })?;
            new_bindings.push(LetBinding {
                name: binding.name.clone(),
                value,
            });
            names.insert(binding.name.clone());
        }
        let (new_body, state) =
            self.scoped(arena, &[], names, |pass, arena| pass.rewrite(arena, body, state))?;

        if new_body == body && new_bindings.as_slice() == bindings {
            return Ok((id, state));
        }
        let new_id = arena.add(Expr::Let {
            bindings: new_bindings,
            body: new_body,
        });
        Ok((new_id, state))
    }

    fn rewrite_recipe(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        recipe: &Recipe,
        state: (),
    ) -> Result<(ExprId, ())> {
        let outer = std::mem::take(&mut self.region);
        let (body, state) = self.rewrite(arena, recipe.body, state)?;
        let region = std::mem::replace(&mut self.region, outer);
        let body = place_region(arena, body, &region.pending, self.options.warn_unused)?;

        if body == recipe.body {
            return Ok((id, state));
        }
        let new_id = arena.add(Expr::Recipe(Recipe {
            indices: recipe.indices.clone(),
            body,
            transpose: recipe.transpose.clone(),
        }));
        Ok((new_id, state))
    }
}

/// Reference counts per temporary, keyed by completion index.
type Uses = BTreeMap<usize, usize>;

fn merge(uses: &mut Uses, other: Uses) {
    for (temp, n) in other {
        *uses.entry(temp).or_default() += n;
    }
}

struct Placement<'a> {
    temps: &'a [Temporary],
    by_name: HashMap<&'a str, usize>,
    total: Vec<usize>,
    placed: Vec<bool>,
}

impl<'a> Placement<'a> {
    fn new(arena: &Arena, root: ExprId, temps: &'a [Temporary]) -> Result<Self> {
        let mut placement = Placement {
            temps,
            by_name: temps
                .iter()
                .enumerate()
                .map(|(n, temp)| (temp.name.as_str(), n))
                .collect(),
            total: vec![0; temps.len()],
            placed: vec![false; temps.len()],
        };

        let mut total = Uses::new();
        placement.count(arena, root, &mut total)?;
        for temp in temps {
            placement.count(arena, temp.value, &mut total)?;
        }
        for (temp, n) in total {
            placement.total[temp] = n;
        }
        Ok(placement)
    }

    fn temp_of(&self, expr: &Expr) -> Option<usize> {
        match expr {
            Expr::Variable(name) => self.by_name.get(name.as_str()).copied(),
            _ => None,
        }
    }

    fn count(&self, arena: &Arena, id: ExprId, uses: &mut Uses) -> Result<()> {
        let expr = arena.get(id)?;
        if let Some(temp) = self.temp_of(expr) {
            *uses.entry(temp).or_default() += 1;
            return Ok(());
        }
        for child in expr.children() {
            self.count(arena, child, uses)?;
        }
        Ok(())
    }

    /// Rebuild the subtree at `id`, binding every temporary whose
    /// references all lie inside it.  `scope_body` marks the body of a
    /// `ForAll`/`IndexSum` and the values and body of a `Let`, which are
    /// placement points even when they are a bare reference.
    fn place(&mut self, arena: &mut Arena, id: ExprId, scope_body: bool) -> Result<(ExprId, Uses)> {
        let expr = arena.get(id)?.clone();

        if let Some(temp) = self.temp_of(&expr) {
            let uses = Uses::from([(temp, 1)]);
            if !scope_body {
                return Ok((id, uses));
            }
            return self.settle(arena, id, uses);
        }

        let in_scope = matches!(
            expr,
            Expr::ForAll { .. } | Expr::IndexSum { .. } | Expr::Let { .. }
        );
        let children = expr.children();
        let mut uses = Uses::new();
        let mut new_children = Vec::with_capacity(children.len());
        for child in children.iter() {
            let (new_child, child_uses) = self.place(arena, *child, in_scope)?;
            merge(&mut uses, child_uses);
            new_children.push(new_child);
        }

        let id = if new_children.as_slice() == children.as_slice() {
            id
        } else {
            arena.add(expr.with_children(&new_children)?)
        };
        self.settle(arena, id, uses)
    }

    /// Wrap `id` in a `Let` for the temporaries that became complete at
    /// it.  Placing a temporary brings its value's references into this
    /// subtree, which may complete others, so this runs to a fixpoint.
    fn settle(&mut self, arena: &mut Arena, id: ExprId, mut uses: Uses) -> Result<(ExprId, Uses)> {
        let mut ready_here: Vec<(usize, ExprId)> = Vec::new();
        loop {
            let ready: Vec<usize> = uses
                .iter()
                .filter(|(temp, n)| !self.placed[**temp] && **n == self.total[**temp])
                .map(|(temp, _)| *temp)
                .collect();
            if ready.is_empty() {
                break;
            }
            for temp in ready {
                self.placed[temp] = true;
                let (value, value_uses) = self.place(arena, self.temps[temp].value, false)?;
                trace!(temporary = %self.temps[temp].name, at = %id, "placed temporary");
                merge(&mut uses, value_uses);
                ready_here.push((temp, value));
            }
        }

        if ready_here.is_empty() {
            return Ok((id, uses));
        }

        ready_here.sort_by_key(|(temp, _)| *temp);
        let bindings = ready_here
            .into_iter()
            .map(|(temp, value)| LetBinding {
                name: self.temps[temp].name.clone(),
                value,
            })
            .collect();
        Ok((arena.add(Expr::Let { bindings, body: id }), uses))
    }
}

/// Place a region's pending temporaries into its body.  Whatever is not
/// placed by the time the region root is reached is bound around it.
fn place_region(
    arena: &mut Arena,
    body: ExprId,
    temps: &[Temporary],
    warn_unused: bool,
) -> Result<ExprId> {
    if temps.is_empty() {
        return Ok(body);
    }

    let mut placement = Placement::new(arena, body, temps)?;
    let (body, _) = placement.place(arena, body, true)?;

    let mut bindings = Vec::new();
    for (n, temp) in temps.iter().enumerate() {
        if placement.placed[n] {
            continue;
        }
        placement.placed[n] = true;
        if warn_unused && placement.total[n] == 0 {
            warn!(temporary = %temp.name, "temporary is never referenced");
        }
        let (value, _) = placement.place(arena, temp.value, false)?;
        bindings.push(LetBinding {
            name: temp.name.clone(),
            value,
        });
    }

    if bindings.is_empty() {
        return Ok(body);
    }
    Ok(arena.add(Expr::Let { bindings, body }))
}

pub fn extract_temporaries(
    arena: &mut Arena,
    root: ExprId,
    options: &ExtractOptions,
) -> Result<ExprId> {
    ExtractionPass::new(options.clone()).extract(arena, root)
}
