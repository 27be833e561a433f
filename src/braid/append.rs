//! Direct bulk append: pouring a flat source into the rightmost edge of a
//! tree without going through the tail one element at a time.
//!
//! The append runs in three strokes: decide how much of the source this
//! mode may consume, grow the root until the rightmost path has capacity
//! for it, then make one editable walk that tops off the existing
//! rightmost leaf and attaches freshly built subtrees in span-sized
//! chunks. Sized ancestors have their tables extended by the exact counts
//! as the walk returns, so a short final leaf never leaves a stale table
//! behind.

use std::sync::Arc;

use super::node::{Children, Inner, Items, Node, OwnerBits, SHIFT, SPAN};

/// How much of the source a bulk append may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AppendMode {
    /// Consume the entire source.
    AlwaysEmptySrc,
    /// Consume up to a whole-leaf boundary: top off the rightmost leaf,
    /// then whole leaves only. A trailing partial leaf stays in the source.
    EmptySrcToFill,
    /// Like `EmptySrcToFill`, but always leave between 1 and `SPAN`
    /// elements behind to seed the caller's tail.
    NeverEmptySrc,
}

/// A detached root handle: a container's root (or a split half) travelling
/// through the structural algorithms without its tail.
#[derive(Debug)]
pub(crate) struct RawTree<T> {
    pub(crate) node: Option<Arc<Node<T>>>,
    pub(crate) owned: bool,
    pub(crate) shift: usize,
    pub(crate) size: usize,
}

impl<T> RawTree<T> {
    pub(crate) fn empty() -> Self {
        RawTree {
            node: None,
            owned: true,
            shift: 0,
            size: 0,
        }
    }

    /// Free element slots along the rightmost path. Interior slack in sized
    /// nodes is invisible to the append walk and deliberately not counted.
    fn rightmost_capacity(&self) -> usize {
        let Some(root) = &self.node else { return 0 };
        let mut capacity = 0;
        let mut node = &**root;
        let mut shift = self.shift;
        loop {
            match node {
                Node::Leaf(items) => return capacity + (SPAN - items.len()),
                Node::Inner(inner) => {
                    capacity += (SPAN - inner.children.len()) << shift;
                    node = &inner.children[inner.children.len() - 1];
                    shift -= SHIFT;
                }
            }
        }
    }

    fn rightmost_leaf_space(&self) -> usize {
        let Some(root) = &self.node else { return 0 };
        let mut node = &**root;
        loop {
            match node {
                Node::Leaf(items) => return SPAN - items.len(),
                Node::Inner(inner) => node = &inner.children[inner.children.len() - 1],
            }
        }
    }

    fn consume_for(&self, available: usize, mode: AppendMode) -> usize {
        match mode {
            AppendMode::AlwaysEmptySrc => available,
            AppendMode::EmptySrcToFill | AppendMode::NeverEmptySrc => {
                let fill = self.rightmost_leaf_space();
                let whole = if available <= fill {
                    available
                } else {
                    fill + (available - fill) / SPAN * SPAN
                };
                if mode == AppendMode::NeverEmptySrc && whole == available {
                    whole.saturating_sub(SPAN)
                } else {
                    whole
                }
            }
        }
    }
}

impl<T: Clone> RawTree<T> {
    fn root_mut(&mut self) -> &mut Node<T> {
        let arc = self.node.as_mut().expect("editing requires a root");
        let unique = Arc::get_mut(arc).is_some();
        if !self.owned || !unique {
            let fresh = arc.owned_copy();
            *arc = Arc::new(fresh);
            self.owned = true;
        }
        Arc::get_mut(arc).expect("freshly copied root is unique")
    }

    /// Wrap the root in a single-child parent, raising the tree one level.
    fn grow(&mut self) {
        let child = self.node.take().expect("growth requires a root");
        let mut children = Children::new();
        children.push(child);
        let inner = Inner::strict(children, OwnerBits::single(self.owned));
        self.node = Some(Arc::new(Node::Inner(inner)));
        self.owned = true;
        self.shift += SHIFT;
    }

    /// Append as much of `src` as `mode` permits, given that `available`
    /// elements remain in it. Returns the number consumed.
    pub(crate) fn append<I: Iterator<Item = T>>(
        &mut self,
        src: &mut I,
        available: usize,
        mode: AppendMode,
    ) -> usize {
        let count = self.consume_for(available, mode);
        let mut remaining = count;
        if remaining == 0 {
            return 0;
        }
        if self.node.is_none() {
            let take = remaining.min(SPAN);
            let leaf: Items<T> = src.by_ref().take(take).collect();
            debug_assert_eq!(leaf.len(), take);
            self.node = Some(Arc::new(Node::Leaf(leaf)));
            self.owned = true;
            self.shift = 0;
            self.size = take;
            remaining -= take;
        }
        while self.rightmost_capacity() < remaining {
            self.grow();
        }
        if remaining > 0 {
            let shift = self.shift;
            let total = self.size;
            let filled = fill_rightmost(self.root_mut(), shift, total, src, remaining);
            debug_assert_eq!(filled, remaining);
            self.size += filled;
        }
        count
    }
}

/// Fill the rightmost edge of `node` (whose subtree holds `total` elements)
/// with up to `want` source elements; capacity has been verified by the
/// caller. Returns the number actually placed.
fn fill_rightmost<T: Clone, I: Iterator<Item = T>>(
    node: &mut Node<T>,
    shift: usize,
    total: usize,
    src: &mut I,
    want: usize,
) -> usize {
    match node {
        Node::Leaf(items) => {
            let take = want.min(SPAN - items.len());
            items.extend(src.by_ref().take(take));
            take
        }
        Node::Inner(inner) => {
            let mut filled = 0;
            let last = inner.children.len() - 1;
            let last_size = inner.child_size(last, shift, total);
            if last_size < 1 << shift {
                let cap = (1 << shift) - last_size;
                let child = inner.editable_child(last);
                filled = fill_rightmost(child, shift - SHIFT, last_size, src, want.min(cap));
                if let Some(table) = &mut inner.sizes {
                    table.grow_last(filled);
                }
            }
            while filled < want {
                debug_assert!(inner.children.len() < SPAN);
                // Appending after a short last child forces the sized form.
                if inner.sizes.is_none() {
                    let last = inner.children.len() - 1;
                    if inner.child_size(last, shift, total + filled) != 1 << shift {
                        inner.make_sized(shift, total + filled);
                    }
                }
                let chunk = (want - filled).min(1 << shift);
                let subtree = build_subtree(src, shift - SHIFT, chunk);
                if let Some(table) = &mut inner.sizes {
                    let cum = table.total() + chunk;
                    table.push(cum);
                }
                inner.owns.set(inner.children.len());
                inner.children.push(subtree);
                filled += chunk;
            }
            filled
        }
    }
}

/// Build a fresh subtree of exactly `count` elements at `shift`. Greedy
/// packing keeps every child but the last full, so the result is strict.
fn build_subtree<T: Clone, I: Iterator<Item = T>>(
    src: &mut I,
    shift: usize,
    count: usize,
) -> Arc<Node<T>> {
    debug_assert!(count >= 1 && count <= SPAN << shift);
    if shift == 0 {
        let items: Items<T> = src.by_ref().take(count).collect();
        debug_assert_eq!(items.len(), count);
        return Arc::new(Node::Leaf(items));
    }
    let mut children = Children::new();
    let mut owns = OwnerBits::none();
    let mut built = 0;
    while built < count {
        let chunk = (count - built).min(1 << shift);
        owns.set(children.len());
        children.push(build_subtree(src, shift - SHIFT, chunk));
        built += chunk;
    }
    Arc::new(Node::Inner(Inner {
        children,
        sizes: None,
        owns,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(tree: &RawTree<u32>) -> Vec<u32> {
        fn walk(node: &Node<u32>, out: &mut Vec<u32>) {
            match node {
                Node::Leaf(items) => out.extend(items.iter().copied()),
                Node::Inner(inner) => {
                    for child in &inner.children {
                        walk(child, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        if let Some(root) = &tree.node {
            walk(root, &mut out);
        }
        out
    }

    #[test]
    fn append_builds_multiple_levels() {
        let mut tree = RawTree::empty();
        let total = SPAN * SPAN * 2 + 17;
        let mut src = 0..total as u32;
        let consumed = tree.append(&mut src, total, AppendMode::AlwaysEmptySrc);
        assert_eq!(consumed, total);
        assert_eq!(tree.size, total);
        assert_eq!(tree.shift, 2 * SHIFT);
        assert_eq!(drain(&tree), (0..total as u32).collect::<Vec<_>>());
    }

    #[test]
    fn never_empty_src_leaves_a_tail_seed() {
        for total in [1usize, SPAN, SPAN + 1, 3 * SPAN, 3 * SPAN + 5] {
            let mut tree = RawTree::<u32>::empty();
            let mut src = 0..total as u32;
            let consumed = tree.append(&mut src, total, AppendMode::NeverEmptySrc);
            let left = total - consumed;
            assert!(
                (1..=SPAN).contains(&left),
                "total {total} left {left} elements"
            );
            assert_eq!(consumed % SPAN, 0);
        }
    }

    #[test]
    fn empty_src_to_fill_stops_at_a_leaf_boundary() {
        let mut tree = RawTree::<u32>::empty();
        let mut src = 0..100u32;
        let consumed = tree.append(&mut src, 100, AppendMode::EmptySrcToFill);
        assert_eq!(consumed, 96);
        assert_eq!(src.next(), Some(96));
    }

    #[test]
    fn appends_continue_through_a_partial_leaf() {
        let mut tree = RawTree::empty();
        let mut first = 0..10u32;
        tree.append(&mut first, 10, AppendMode::AlwaysEmptySrc);
        let mut second = 10..100u32;
        tree.append(&mut second, 90, AppendMode::AlwaysEmptySrc);
        assert_eq!(tree.size, 100);
        assert_eq!(drain(&tree), (0..100).collect::<Vec<_>>());
    }
}
