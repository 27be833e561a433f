//! Node model of the backing trie.
//!
//! A tree position is either a [`Leaf`](Node::Leaf) holding up to `SPAN`
//! elements or an [`Inner`] node holding up to `SPAN` child pointers. An
//! inner node is *strict* when every child except possibly the last holds
//! exactly `1 << shift` elements; otherwise it is *sized* and carries an
//! explicit cumulative-size table. Each inner node also carries one
//! ownership bit per child slot: a set bit records that this tree believes
//! it is the sole mutator of that child, and grants in-place edits.

use std::sync::Arc;

use arrayvec::ArrayVec;

use super::sizes::SizeTable;

/// log2 of the branching factor.
pub(crate) const SHIFT: usize = 5;
/// Branching factor: children per inner node, elements per leaf.
pub(crate) const SPAN: usize = 1 << SHIFT;
/// Low-bits mask for one radix digit.
pub(crate) const MASK: usize = SPAN - 1;
/// Permitted slack in child count after a concatenation rebalance.
pub(crate) const TOLERANCE: usize = 2;
/// Children at or above this slot count are kept intact during rebalance.
pub(crate) const DO_NOT_REDISTRIBUTE: usize = SPAN - TOLERANCE / 2;
/// Largest representable sequence length.
pub(crate) const MAX_LEN: usize = u32::MAX as usize;

pub(crate) type Items<T> = ArrayVec<T, SPAN>;
pub(crate) type Children<T> = ArrayVec<Arc<Node<T>>, SPAN>;

/// One ownership bit per child slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OwnerBits(u32);

fn low_mask(n: usize) -> u32 {
    debug_assert!(n <= SPAN);
    if n == 0 {
        0
    } else {
        u32::MAX >> (SPAN - n)
    }
}

impl OwnerBits {
    pub(crate) fn none() -> Self {
        OwnerBits(0)
    }

    pub(crate) fn single(owned: bool) -> Self {
        OwnerBits(owned as u32)
    }

    pub(crate) fn get(self, i: usize) -> bool {
        debug_assert!(i < SPAN);
        self.0 >> i & 1 != 0
    }

    pub(crate) fn set(&mut self, i: usize) {
        debug_assert!(i < SPAN);
        self.0 |= 1 << i;
    }

    pub(crate) fn set_to(&mut self, i: usize, owned: bool) {
        debug_assert!(i < SPAN);
        self.0 = self.0 & !(1 << i) | (owned as u32) << i;
    }

    /// Keep the bits for slots `[0, n)`.
    pub(crate) fn low(self, n: usize) -> Self {
        OwnerBits(self.0 & low_mask(n))
    }

    /// Extract the bits for slots `[from, from + len)`, renumbered from zero.
    pub(crate) fn slice(self, from: usize, len: usize) -> Self {
        OwnerBits(self.0 >> from & low_mask(len))
    }

    pub(crate) fn shift_up(self, by: usize) -> Self {
        debug_assert!(by < SPAN);
        OwnerBits(self.0 << by)
    }
}

/// A trie node: a leaf of elements or an inner node of children.
#[derive(Debug)]
pub(crate) enum Node<T> {
    Leaf(Items<T>),
    Inner(Inner<T>),
}

#[derive(Debug)]
pub(crate) struct Inner<T> {
    pub(crate) children: Children<T>,
    /// `None` while the node is strict.
    pub(crate) sizes: Option<SizeTable>,
    pub(crate) owns: OwnerBits,
}

impl<T> Node<T> {
    pub(crate) fn empty_leaf() -> Self {
        Node::Leaf(ArrayVec::new())
    }

    pub(crate) fn as_leaf(&self) -> &Items<T> {
        match self {
            Node::Leaf(items) => items,
            Node::Inner(_) => unreachable!("expected a leaf node"),
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> &mut Items<T> {
        match self {
            Node::Leaf(items) => items,
            Node::Inner(_) => unreachable!("expected a leaf node"),
        }
    }

    pub(crate) fn as_inner(&self) -> &Inner<T> {
        match self {
            Node::Inner(inner) => inner,
            Node::Leaf(_) => unreachable!("expected an inner node"),
        }
    }

    pub(crate) fn as_inner_mut(&mut self) -> &mut Inner<T> {
        match self {
            Node::Inner(inner) => inner,
            Node::Leaf(_) => unreachable!("expected an inner node"),
        }
    }

    /// Occupied slots at this node: elements for a leaf, children for an
    /// inner node. This is the unit the rebalance tolerance is measured in.
    pub(crate) fn slot_count(&self) -> usize {
        match self {
            Node::Leaf(items) => items.len(),
            Node::Inner(inner) => inner.children.len(),
        }
    }
}

impl<T: Clone> Node<T> {
    /// The copy-on-write primitive: a shallow clone whose child-ownership
    /// bits are cleared. The copy is owned by whoever requested it; the
    /// original's children must now be treated as shared until the copied
    /// path re-acquires them.
    pub(crate) fn owned_copy(&self) -> Node<T> {
        match self {
            Node::Leaf(items) => Node::Leaf(items.clone()),
            Node::Inner(inner) => Node::Inner(Inner {
                children: inner.children.clone(),
                sizes: inner.sizes.clone(),
                owns: OwnerBits::none(),
            }),
        }
    }
}

impl<T> Inner<T> {
    pub(crate) fn strict(children: Children<T>, owns: OwnerBits) -> Self {
        Inner {
            children,
            sizes: None,
            owns,
        }
    }

    /// Locate `index` below this node at `shift`: returns the child slot and
    /// the residual index within that child. For sized nodes the radix
    /// estimate is a lower bound on the true slot, so a short forward scan
    /// over the cumulative table finishes the lookup.
    pub(crate) fn position(&self, index: usize, shift: usize) -> (usize, usize) {
        let mut slot = index >> shift & MASK;
        match &self.sizes {
            None => (slot, index & ((1 << shift) - 1)),
            Some(sizes) => {
                while sizes.get(slot) <= index {
                    slot += 1;
                }
                let before = if slot == 0 { 0 } else { sizes.get(slot - 1) };
                (slot, index - before)
            }
        }
    }

    /// Exact element count under child `i`, given this subtree's own total.
    pub(crate) fn child_size(&self, i: usize, shift: usize, total: usize) -> usize {
        match &self.sizes {
            Some(sizes) => sizes.child_size(i),
            None => {
                if i + 1 == self.children.len() {
                    total - (i << shift)
                } else {
                    1 << shift
                }
            }
        }
    }

    /// Convert a strict node into its sized form without changing contents.
    pub(crate) fn make_sized(&mut self, shift: usize, total: usize) {
        if self.sizes.is_some() {
            return;
        }
        let mut table = SizeTable::new(shift);
        let mut cum = 0;
        for i in 0..self.children.len() {
            cum += self.child_size(i, shift, total);
            table.push(cum);
        }
        self.sizes = Some(table);
    }
}

impl<T: Clone> Inner<T> {
    /// The path-copy workhorse: returns a mutable view of child `i`,
    /// copying it first unless this node owns it and no other tree holds a
    /// reference. Ownership of the surviving node is recorded in the bitmap.
    pub(crate) fn editable_child(&mut self, i: usize) -> &mut Node<T> {
        let unique = Arc::get_mut(&mut self.children[i]).is_some();
        if !self.owns.get(i) || !unique {
            let fresh = self.children[i].owned_copy();
            self.children[i] = Arc::new(fresh);
            self.owns.set(i);
        }
        Arc::get_mut(&mut self.children[i]).expect("freshly copied child is unique")
    }
}

/// Exact element count under `node` at `shift`. Sized nodes answer from
/// their table; strict nodes recurse down the rightmost path, whose last
/// child is the only one allowed to be short.
pub(crate) fn subtree_size<T>(node: &Node<T>, shift: usize) -> usize {
    match node {
        Node::Leaf(items) => items.len(),
        Node::Inner(inner) => match &inner.sizes {
            Some(sizes) => sizes.total(),
            None => {
                let last = inner.children.len() - 1;
                (last << shift) + subtree_size(&inner.children[last], shift - SHIFT)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_bits_slice_and_shift() {
        let mut bits = OwnerBits::none();
        bits.set(0);
        bits.set(3);
        bits.set(7);
        let sliced = bits.slice(3, 4);
        assert!(sliced.get(0));
        assert!(!sliced.get(1));
        assert!(!sliced.get(4));
        let shifted = sliced.shift_up(1);
        assert!(!shifted.get(0));
        assert!(shifted.get(1));
        assert!(bits.low(3).get(0));
        assert!(!bits.low(3).get(3));
    }

    #[test]
    fn owner_bits_set_to() {
        let mut bits = OwnerBits::none();
        bits.set_to(5, true);
        assert!(bits.get(5));
        bits.set_to(5, false);
        assert!(!bits.get(5));
    }

    #[test]
    fn strict_position_is_pure_radix() {
        let mut children = Children::<u32>::new();
        for _ in 0..4 {
            children.push(Arc::new(Node::Leaf((0..SPAN as u32).collect())));
        }
        let inner = Inner::strict(children, OwnerBits::none());
        assert_eq!(inner.position(0, SHIFT), (0, 0));
        assert_eq!(inner.position(SPAN, SHIFT), (1, 0));
        assert_eq!(inner.position(3 * SPAN + 7, SHIFT), (3, 7));
    }

    #[test]
    fn sized_position_scans_forward() {
        // Children of 20, 32, 5 elements: the radix estimate undershoots.
        let mut children = Children::<u32>::new();
        for len in [20usize, 32, 5] {
            children.push(Arc::new(Node::Leaf((0..len as u32).collect())));
        }
        let mut table = SizeTable::new(SHIFT);
        table.push(20);
        table.push(52);
        table.push(57);
        let inner = Inner {
            children,
            sizes: Some(table),
            owns: OwnerBits::none(),
        };
        assert_eq!(inner.position(0, SHIFT), (0, 0));
        assert_eq!(inner.position(19, SHIFT), (0, 19));
        assert_eq!(inner.position(20, SHIFT), (1, 0));
        assert_eq!(inner.position(51, SHIFT), (1, 31));
        assert_eq!(inner.position(52, SHIFT), (2, 0));
        assert_eq!(inner.position(56, SHIFT), (2, 4));
        assert_eq!(inner.child_size(0, SHIFT, 57), 20);
        assert_eq!(inner.child_size(1, SHIFT, 57), 32);
        assert_eq!(inner.child_size(2, SHIFT, 57), 5);
    }

    #[test]
    fn editable_child_copies_shared_structure() {
        let shared = Arc::new(Node::Leaf(Items::<u32>::from_iter(0..4)));
        let mut children = Children::new();
        children.push(shared.clone());
        let mut inner = Inner::strict(children, OwnerBits::none());

        let child = inner.editable_child(0);
        child.as_leaf_mut()[0] = 99;

        // The outside reference still sees the original elements.
        assert_eq!(shared.as_leaf()[0], 0);
        assert_eq!(inner.children[0].as_leaf()[0], 99);
        assert!(inner.owns.get(0));
    }
}
