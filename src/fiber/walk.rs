//! Sibling chain iteration.

use super::{FiberId, FiberTree};

/// Iterates a fiber's children by following `next_sibling` links.
pub(crate) struct ChildIter<'a> {
    tree: &'a FiberTree,
    next: Option<FiberId>,
}

impl<'a> ChildIter<'a> {
    pub(crate) fn new(tree: &'a FiberTree, first: Option<FiberId>) -> Self {
        Self { tree, next: first }
    }
}

impl Iterator for ChildIter<'_> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        let current = self.next?;
        self.next = self.tree.get(current).and_then(|fiber| fiber.next_sibling);
        Some(current)
    }
}
