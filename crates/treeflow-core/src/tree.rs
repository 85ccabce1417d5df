//! Hierarchical value trees and their traversal algorithms.
//!
//! A [`ValueTree`] owns a single root [`Branch`] (the trunk). A branch holds
//! an ordered sequence of leaves and an ordered sequence of child branches;
//! the two index spaces are independent, there is no interleaving order
//! between a branch's leaves and its children.
//!
//! # Traversals
//!
//! - [`find_first_leaf`]: depth-first, leaves before branches.
//! - [`zip_apply`]: pairs two trees by position. Where the second tree is
//!   shorter (fewer leaves or fewer child branches at some branch), the excess
//!   of the first tree is skipped silently. Entries that exist only in the
//!   second tree are never visited.
//! - [`broadcast_apply`]: pairs every leaf of a tree with one scalar, with no
//!   truncation.

use serde::{Deserialize, Serialize};

use crate::id::ExternalRef;
use crate::value::LeafValue;

/// One level of a value tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default)]
    pub leaves: Vec<LeafValue>,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

impl Branch {
    /// Creates an empty branch.
    pub fn new() -> Self {
        Branch::default()
    }

    /// Creates a branch holding the given leaves and no children.
    pub fn with_leaves<I, V>(leaves: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<LeafValue>,
    {
        Branch {
            leaves: leaves.into_iter().map(Into::into).collect(),
            branches: Vec::new(),
        }
    }

    /// Builder form of [`push_branch`](Self::push_branch).
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    /// Appends a leaf.
    pub fn push_leaf(&mut self, value: impl Into<LeafValue>) {
        self.leaves.push(value.into());
    }

    /// Appends a child branch and returns a handle to it.
    pub fn push_branch(&mut self, branch: Branch) -> &mut Branch {
        self.branches.push(branch);
        let last = self.branches.len() - 1;
        &mut self.branches[last]
    }

    /// Returns `true` if this branch has no leaves and no children.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.branches.is_empty()
    }

    /// Total number of leaves in this branch and all descendants.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len() + self.branches.iter().map(Branch::leaf_count).sum::<usize>()
    }

    /// Total number of descendant branches (this branch excluded).
    pub fn branch_count(&self) -> usize {
        self.branches.len() + self.branches.iter().map(Branch::branch_count).sum::<usize>()
    }

    /// Depth-first iterator over all leaves, leaves before branches.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            current: Default::default(),
            pending: vec![self],
        }
    }

    /// Returns a branch with the same shape where each leaf is replaced by
    /// `f(leaf)`; leaves for which `f` yields `None` are dropped, so the
    /// corresponding output branch is shorter.
    fn map_leaves_with<F>(&self, f: &mut F) -> Branch
    where
        F: FnMut(&LeafValue) -> Option<LeafValue>,
    {
        let leaves = self.leaves.iter().filter_map(|leaf| f(leaf)).collect();
        let branches = self
            .branches
            .iter()
            .map(|child| child.map_leaves_with(f))
            .collect();
        Branch { leaves, branches }
    }
}

/// Iterator returned by [`Branch::leaves`] and [`ValueTree::leaves`].
#[derive(Debug)]
pub struct Leaves<'a> {
    current: std::slice::Iter<'a, LeafValue>,
    pending: Vec<&'a Branch>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a LeafValue;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(leaf) = self.current.next() {
                return Some(leaf);
            }
            let branch = self.pending.pop()?;
            // Children go on the stack in reverse so the first child pops first.
            self.pending.extend(branch.branches.iter().rev());
            self.current = branch.leaves.iter();
        }
    }
}

/// A recursive nested-value container rooted at a single trunk branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueTree {
    trunk: Branch,
}

impl ValueTree {
    /// Creates a tree with an empty trunk.
    pub fn new() -> Self {
        ValueTree::default()
    }

    /// Creates a tree rooted at `trunk`.
    pub fn from_trunk(trunk: Branch) -> Self {
        ValueTree { trunk }
    }

    /// Creates a tree whose trunk holds the single leaf `value`.
    pub fn from_leaf(value: impl Into<LeafValue>) -> Self {
        ValueTree {
            trunk: Branch::with_leaves([value.into()]),
        }
    }

    /// Returns the root branch.
    pub fn trunk(&self) -> &Branch {
        &self.trunk
    }

    /// Returns the root branch for in-place building.
    pub fn trunk_mut(&mut self) -> &mut Branch {
        &mut self.trunk
    }

    /// Consumes the tree and returns its trunk.
    pub fn into_trunk(self) -> Branch {
        self.trunk
    }

    /// Returns `true` if the trunk has no leaves and no branches.
    pub fn is_empty(&self) -> bool {
        self.trunk.is_empty()
    }

    /// Removes every leaf and branch, keeping the tree itself.
    pub fn clear(&mut self) {
        self.trunk = Branch::new();
    }

    /// Total number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.trunk.leaf_count()
    }

    /// Total number of branches below the trunk.
    pub fn branch_count(&self) -> usize {
        self.trunk.branch_count()
    }

    /// Depth-first iterator over all leaves, leaves before branches.
    pub fn leaves(&self) -> Leaves<'_> {
        self.trunk.leaves()
    }

    /// See [`find_first_leaf`].
    pub fn first_leaf(&self) -> Option<&LeafValue> {
        find_first_leaf(self)
    }

    /// Returns `true` if any leaf references `object`.
    pub fn contains_ref(&self, object: ExternalRef) -> bool {
        self.leaves()
            .any(|leaf| leaf.as_external_ref() == Some(object))
    }

    /// Builds a tree with the same branch structure, mapping each leaf
    /// through `f` and dropping the leaves for which it returns `None`.
    pub fn map_leaves<F>(&self, mut f: F) -> ValueTree
    where
        F: FnMut(&LeafValue) -> Option<LeafValue>,
    {
        ValueTree {
            trunk: self.trunk.map_leaves_with(&mut f),
        }
    }
}

impl From<Branch> for ValueTree {
    fn from(trunk: Branch) -> Self {
        ValueTree::from_trunk(trunk)
    }
}

/// Counts gathered by [`zip_apply`].
///
/// For any pair of trees, `paired_leaves + skipped_leaves` equals the first
/// tree's leaf count, and likewise for branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZipSummary {
    /// Leaf pairs handed to the leaf operation.
    pub paired_leaves: usize,
    /// Branch pairs recursed into (the trunks are not counted).
    pub paired_branches: usize,
    /// Leaves of the first tree with no counterpart, including every leaf
    /// below a skipped branch.
    pub skipped_leaves: usize,
    /// Branches of the first tree with no counterpart, including descendants.
    pub skipped_branches: usize,
}

impl ZipSummary {
    /// Returns `true` if the second tree was shorter somewhere.
    pub fn is_truncated(&self) -> bool {
        self.skipped_leaves > 0 || self.skipped_branches > 0
    }
}

/// Returns the first leaf of the tree in depth-first, leaves-before-branches
/// order, or `None` when the tree holds no leaves.
pub fn find_first_leaf(tree: &ValueTree) -> Option<&LeafValue> {
    tree.leaves().next()
}

/// Walks `a` and `b` in lock-step, calling `op(leaf_a, leaf_b)` for every
/// positionally corresponding pair of leaves.
///
/// At each branch the leaves of `a` are visited in order, then its children.
/// When `b` has fewer leaves or fewer children at that branch, the excess of
/// `a` (and everything below a skipped child) is skipped without error.
pub fn zip_apply<F>(a: &ValueTree, b: &ValueTree, mut op: F) -> ZipSummary
where
    F: FnMut(&LeafValue, &LeafValue),
{
    let mut summary = ZipSummary::default();
    zip_branch(&a.trunk, &b.trunk, &mut op, &mut summary);
    summary
}

fn zip_branch<F>(a: &Branch, b: &Branch, op: &mut F, summary: &mut ZipSummary)
where
    F: FnMut(&LeafValue, &LeafValue),
{
    for (i, leaf_a) in a.leaves.iter().enumerate() {
        match b.leaves.get(i) {
            Some(leaf_b) => {
                op(leaf_a, leaf_b);
                summary.paired_leaves += 1;
            }
            None => summary.skipped_leaves += 1,
        }
    }

    for (j, child_a) in a.branches.iter().enumerate() {
        match b.branches.get(j) {
            Some(child_b) => {
                summary.paired_branches += 1;
                zip_branch(child_a, child_b, op, summary);
            }
            None => {
                summary.skipped_branches += 1 + child_a.branch_count();
                summary.skipped_leaves += child_a.leaf_count();
            }
        }
    }
}

/// Calls `op(leaf, scalar)` once for every leaf of `tree`, recursively.
///
/// Returns the number of invocations, which always equals the tree's leaf
/// count.
pub fn broadcast_apply<F>(tree: &ValueTree, scalar: &LeafValue, mut op: F) -> usize
where
    F: FnMut(&LeafValue, &LeafValue),
{
    let mut count = 0;
    for leaf in tree.leaves() {
        op(leaf, scalar);
        count += 1;
    }
    count
}
