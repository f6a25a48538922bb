// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Handle of an interned index.  Two indices are the same index iff
/// their handles are equal; names are for display only.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub(crate) u32);

impl IndexId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "index#{}", self.0)
    }
}

pub type IndexList = SmallVec<[IndexId; 4]>;

/// The role an index plays in a recipe.  Declared index groups are
/// partitioned by role, and renderers use the role to pick a display
/// class.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Domain,
    BasisFunction,
    Point,
    Free,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Domain => "domain",
            IndexKind::BasisFunction => "basis_function",
            IndexKind::Point => "point",
            IndexKind::Free => "free",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexData {
    pub name: String,
    pub extent: usize,
    pub kind: IndexKind,
    /// Tensor-product factors of a composite index, outermost first.
    /// Empty for a scalar index.
    pub factors: IndexList,
}

impl IndexData {
    pub fn is_composite(&self) -> bool {
        !self.factors.is_empty()
    }
}

/// The declared indices of a recipe, partitioned by role.  Order
/// within each group is significant: it is the storage-addressing order
/// of the tabulated result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexGroups {
    pub domain: IndexList,
    pub basis: IndexList,
    pub point: IndexList,
}

impl IndexGroups {
    pub fn new(domain: &[IndexId], basis: &[IndexId], point: &[IndexId]) -> Self {
        IndexGroups {
            domain: domain.iter().copied().collect(),
            basis: basis.iter().copied().collect(),
            point: point.iter().copied().collect(),
        }
    }

    /// Iterate declared indices in `domain ++ basis ++ point` order.
    pub fn iter(&self) -> impl Iterator<Item = IndexId> + '_ {
        self.domain
            .iter()
            .chain(self.basis.iter())
            .chain(self.point.iter())
            .copied()
    }

    pub fn groups(&self) -> [&IndexList; 3] {
        [&self.domain, &self.basis, &self.point]
    }

    pub fn len(&self) -> usize {
        self.domain.len() + self.basis.len() + self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[test]
fn test_index_groups_order() {
    let (a, b, c, d) = (IndexId(0), IndexId(1), IndexId(2), IndexId(3));
    let groups = IndexGroups::new(&[a], &[b, c], &[d]);
    assert_eq!(vec![a, b, c, d], groups.iter().collect::<Vec<_>>());
    assert_eq!(4, groups.len());
    assert!(IndexGroups::default().is_empty());
}
