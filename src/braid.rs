//! A sequence with O(1) fork and O(log n) join, backed by a relaxed radix
//! balanced trie.
//!
//! All elements except a trailing buffer live under a 32-ary tree. Strict
//! interior nodes locate children by pure radix arithmetic; relaxed nodes
//! carry a cumulative-size table and finish the lookup with a short
//! forward scan. The trailing buffer — the tail — absorbs pushes and pops
//! at the end, amortizing leaf creation.
//!
//! Structure is shared, never copied, until written: every inner node
//! carries one ownership bit per child and the container carries two (root
//! and tail). [`Braid::fork`] clears the container bits on both sides and
//! hands out a second handle to the same tree; the first write on either
//! side then copies the path from the root to the touched leaf, claiming
//! the copies as it goes. The bitmap is a conservative approximation —
//! each in-place edit additionally verifies that no other handle holds the
//! node, so a plain [`Clone`] (which cannot clear the source's bits) is
//! just as safe.
//!
//! Concatenation pushes the left tail down, walks the two facing edges,
//! and rebalances only along that seam: a node may keep up to `TOLERANCE`
//! more children than the packing optimum before grandchildren are
//! redistributed. Splits copy only the cut path and share everything that
//! falls entirely on one side.

pub(crate) mod append;
pub(crate) mod concat;
pub mod cursor;
pub(crate) mod node;
pub(crate) mod sizes;
pub(crate) mod split;
pub mod view;

use std::fmt;
use std::mem;
use std::ops::{Bound, Index, IndexMut, RangeBounds};
use std::sync::Arc;

use append::{AppendMode, RawTree};
use concat::concat_trees;
use cursor::{CursorMut, Iter};
use node::{subtree_size, Children, Inner, Items, Node, OwnerBits, MAX_LEN, SHIFT, SPAN, TOLERANCE};
use sizes::SizeTable;
use split::{split_around, take_prefix, take_suffix};
use view::{Reversed, Slice, SliceMut};

/// An ordered sequence with cheap structural forking and joining.
///
/// `Braid<T>` behaves like a vector with logarithmic positional updates:
/// `get` and `set` walk one root-to-leaf path, `insert` and `remove` split
/// and rejoin the tree around the position, and [`fork`](Braid::fork)
/// produces an independent second sequence in constant time by sharing
/// the tree. Mutating operations require `T: Clone` because a write to
/// shared structure copies the affected path, and leaf copies clone their
/// elements.
pub struct Braid<T> {
    root: Option<Arc<Node<T>>>,
    /// Leaf-sized buffer logically after the root; non-empty whenever the
    /// sequence is.
    tail: Arc<Node<T>>,
    len: usize,
    /// Height of the root in `SHIFT` units; zero means the root is a leaf.
    shift: usize,
    owned_root: bool,
    owned_tail: bool,
}

impl<T> Braid<T> {
    /// An empty sequence.
    pub fn new() -> Self {
        Braid {
            root: None,
            tail: Arc::new(Node::empty_leaf()),
            len: 0,
            shift: 0,
            owned_root: true,
            owned_tail: true,
        }
    }

    /// Number of elements in the sequence.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The element at `index`, or `None` out of bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let tail_off = self.tail_offset();
        if index >= tail_off {
            return Some(&self.tail_items()[index - tail_off]);
        }
        let mut node = self
            .root
            .as_deref()
            .expect("indices below the tail offset lie under the root");
        let mut shift = self.shift;
        let mut idx = index;
        loop {
            match node {
                Node::Leaf(items) => return Some(&items[idx]),
                Node::Inner(inner) => {
                    let (slot, rest) = inner.position(idx, shift);
                    node = &inner.children[slot];
                    shift -= SHIFT;
                    idx = rest;
                }
            }
        }
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// A borrowing iterator over the whole sequence.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::over(self, 0, self.len)
    }

    /// A read-only view of the sub-range.
    ///
    /// # Panics
    ///
    /// Panics if the range is inverted or extends past the length.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Slice<'_, T> {
        let (from, to) = self.resolve_range(range);
        Slice::new(self, from, to - from)
    }

    /// An order-reversing view of the whole sequence. No structure moves.
    pub fn reversed(&self) -> Reversed<'_, T> {
        self.slice(..).reversed()
    }

    fn tail_items(&self) -> &Items<T> {
        self.tail.as_leaf()
    }

    /// Index of the first tail element; everything below lies under the root.
    fn tail_offset(&self) -> usize {
        self.len - self.tail_items().len()
    }

    fn resolve_range<R: RangeBounds<usize>>(&self, range: R) -> (usize, usize) {
        let from = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let to = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => self.len,
        };
        assert!(
            from <= to && to <= self.len,
            "range {from}..{to} out of bounds for length {}",
            self.len
        );
        (from, to)
    }

    fn check_new_len(&self, extra: usize) {
        let fits = self
            .len
            .checked_add(extra)
            .is_some_and(|new_len| new_len <= MAX_LEN);
        assert!(fits, "sequence length overflow");
    }

    /// The leaf slice containing `index` and its global start position.
    pub(crate) fn leaf_position(&self, index: usize) -> (&[T], usize) {
        debug_assert!(index < self.len);
        let tail_off = self.tail_offset();
        if index >= tail_off {
            return (self.tail_items(), tail_off);
        }
        let mut node = self
            .root
            .as_deref()
            .expect("indices below the tail offset lie under the root");
        let mut shift = self.shift;
        let mut start = 0;
        let mut idx = index;
        loop {
            match node {
                Node::Leaf(items) => return (items, start),
                Node::Inner(inner) => {
                    let (slot, rest) = inner.position(idx, shift);
                    start += idx - rest;
                    idx = rest;
                    node = &inner.children[slot];
                    shift -= SHIFT;
                }
            }
        }
    }

    /// Walk the whole tree asserting the structural invariants: size tables
    /// agree with recursive sizes, strict nodes have full non-last
    /// children, child counts stay within the rebalance tolerance (plus
    /// the slack that rightmost trims and tail pushes may leave until the
    /// next concatenation), and a leaf root is full.
    #[doc(hidden)]
    pub fn debug_validate(&self) {
        let tail_len = self.tail_items().len();
        let root_size = match self.root.as_deref() {
            Some(root) => {
                if let Node::Leaf(items) = root {
                    assert_eq!(items.len(), SPAN, "a leaf root must be full");
                }
                let size = validate_node(root, self.shift);
                assert_eq!(size, subtree_size(root, self.shift));
                size
            }
            None => {
                assert_eq!(self.shift, 0, "an empty root has no height");
                0
            }
        };
        assert_eq!(
            root_size + tail_len,
            self.len,
            "root and tail account for every element"
        );
        assert!(
            self.len == 0 || tail_len > 0,
            "the tail of a non-empty sequence holds at least one element"
        );
    }
}

fn validate_node<T>(node: &Node<T>, shift: usize) -> usize {
    match node {
        Node::Leaf(items) => {
            assert_eq!(shift, 0, "leaves sit at height zero");
            assert!(!items.is_empty(), "no empty leaves");
            items.len()
        }
        Node::Inner(inner) => {
            assert!(shift >= SHIFT);
            let n = inner.children.len();
            assert!(n >= 1, "no empty inner nodes");
            let sizes: Vec<usize> = inner
                .children
                .iter()
                .map(|child| validate_node(child, shift - SHIFT))
                .collect();
            match &inner.sizes {
                Some(table) => {
                    assert_eq!(table.len(), n, "one table entry per child");
                    let mut cum = 0;
                    for (i, size) in sizes.iter().enumerate() {
                        cum += size;
                        assert_eq!(table.get(i), cum, "size table entry {i} is exact");
                    }
                }
                None => {
                    for (i, size) in sizes.iter().enumerate().take(n - 1) {
                        assert_eq!(
                            *size,
                            1 << shift,
                            "strict child {i} holds a full subtree"
                        );
                    }
                }
            }
            let grandchildren: usize = inner.children.iter().map(|c| c.slot_count()).sum();
            assert!(
                n <= grandchildren.div_ceil(SPAN) + TOLERANCE + 2,
                "child count {n} within the balance tolerance for {grandchildren} grandchildren"
            );
            sizes.iter().sum()
        }
    }
}

impl<T: Clone> Braid<T> {
    /// The element at `index` for in-place update, or `None` out of
    /// bounds. The path from the root to the element is copied first where
    /// it might be shared.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let tail_off = self.tail_offset();
        if index >= tail_off {
            return Some(&mut self.tail_mut()[index - tail_off]);
        }
        let mut shift = self.shift;
        let mut idx = index;
        let mut node = self.root_mut();
        loop {
            match node {
                Node::Leaf(items) => return Some(&mut items[idx]),
                Node::Inner(inner) => {
                    let (slot, rest) = inner.position(idx, shift);
                    shift -= SHIFT;
                    idx = rest;
                    node = inner.editable_child(slot);
                }
            }
        }
    }

    /// Replace the element at `index`, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: T) -> T {
        assert!(
            index < self.len,
            "index out of bounds: the len is {} but the index is {}",
            self.len,
            index
        );
        let slot = self.get_mut(index).expect("index checked against length");
        mem::replace(slot, value)
    }

    /// Append an element.
    pub fn push_back(&mut self, value: T) {
        self.check_new_len(1);
        if self.tail_items().len() == SPAN {
            self.push_down_tail();
        }
        self.tail_mut().push(value);
        self.len += 1;
    }

    /// Remove and return the last element.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self
            .tail_mut()
            .pop()
            .expect("the tail of a non-empty sequence holds at least one element");
        self.len -= 1;
        if self.tail_items().is_empty() && self.root.is_some() {
            self.pull_up_tail();
        }
        Some(value)
    }

    /// Insert `value` before `index`. Positions inside the tail shift in
    /// place; positions under the root split the tree around the point,
    /// append to the left half and rejoin.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) {
        assert!(
            index <= self.len,
            "insertion index (is {index}) should be <= len (is {})",
            self.len
        );
        if index == self.len {
            return self.push_back(value);
        }
        self.check_new_len(1);
        let tail_off = self.tail_offset();
        if index >= tail_off {
            let pos = index - tail_off;
            if self.tail_items().len() < SPAN {
                self.tail_mut().insert(pos, value);
                self.len += 1;
            } else {
                let spill = self.tail_mut().pop().expect("full tail");
                self.tail_mut().insert(pos, value);
                self.push_back(spill);
            }
            return;
        }
        let (mut left, right) = self.split_root_around(index.checked_sub(1), index);
        let mut single = std::iter::once(value);
        left.append(&mut single, 1, AppendMode::AlwaysEmptySrc);
        let merged = concat_trees(left, right);
        self.install_root(merged);
        self.len += 1;
        self.normalize();
    }

    /// Remove and return the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "removal index (is {index}) should be < len (is {})",
            self.len
        );
        let tail_off = self.tail_offset();
        if index >= tail_off {
            let value = self.tail_mut().remove(index - tail_off);
            self.len -= 1;
            if self.tail_items().is_empty() && self.root.is_some() {
                self.pull_up_tail();
            }
            return value;
        }
        let value = self.get(index).cloned().expect("index checked against length");
        let (left, right) = self.split_root_around(index.checked_sub(1), index + 1);
        let merged = concat_trees(left, right);
        self.install_root(merged);
        self.len -= 1;
        self.normalize();
        value
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        *self = Braid::new();
    }

    /// Shorten the sequence to at most `new_len` elements.
    pub fn truncate(&mut self, new_len: usize) {
        if new_len < self.len {
            self.remove_range_at(new_len, self.len);
        }
    }

    /// Remove the elements in `range`, closing the gap.
    ///
    /// # Panics
    ///
    /// Panics if the range is inverted or extends past the length.
    pub fn remove_range<R: RangeBounds<usize>>(&mut self, range: R) {
        let (from, to) = self.resolve_range(range);
        self.remove_range_at(from, to);
    }

    fn remove_range_at(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        if from == 0 && to == self.len {
            self.clear();
            return;
        }
        let tail_off = self.tail_offset();
        if from >= tail_off {
            self.tail_mut().drain(from - tail_off..to - tail_off);
            self.len -= to - from;
            self.normalize();
            return;
        }
        if to >= tail_off {
            // Drop a root suffix and a tail prefix.
            self.tail_mut().drain(..to - tail_off);
            let tree = self.take_root_tree();
            let trimmed = if from == 0 {
                RawTree::empty()
            } else {
                let root = tree.node.expect("straddling range starts under the root");
                let (node, owned) = take_prefix(&root, tree.shift, tree.size, from - 1, tree.owned);
                RawTree {
                    node: Some(node),
                    owned,
                    shift: tree.shift,
                    size: from,
                }
            };
            self.install_root(trimmed);
            self.len -= to - from;
            self.normalize();
            return;
        }
        let (left, right) = self.split_root_around(from.checked_sub(1), to);
        let merged = concat_trees(left, right);
        self.install_root(merged);
        self.len -= to - from;
        self.normalize();
    }

    /// Keep only the elements `pred` accepts, preserving order.
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, mut pred: F) {
        self.retain_range(0, self.len, &mut pred);
    }

    /// Like [`retain`](Braid::retain), with mutable access to each element
    /// during the test. Edits apply through the in-place write path whether
    /// or not the element survives.
    pub fn retain_mut<F: FnMut(&mut T) -> bool>(&mut self, mut pred: F) {
        let len = self.len;
        if len == 0 {
            return;
        }
        let mut keep = vec![0u64; len.div_ceil(64)];
        let mut kept = 0;
        for i in 0..len {
            let item = self.get_mut(i).expect("index stays within the length");
            if pred(item) {
                keep[i / 64] |= 1 << (i % 64);
                kept += 1;
            }
        }
        if kept == len {
            return;
        }
        self.compact_marked(0, len, &keep);
    }

    /// Remove every element equal to one of `items`. Requires `T: PartialEq`.
    pub fn remove_all(&mut self, items: &[T])
    where
        T: PartialEq,
    {
        self.retain(|value| !items.contains(value));
    }

    /// Keep only elements equal to one of `items`. Requires `T: PartialEq`.
    pub fn retain_all(&mut self, items: &[T])
    where
        T: PartialEq,
    {
        self.retain(|value| items.contains(value));
    }

    /// Two-pass range retain: a marking pass records survivors in a
    /// bitmap, a compacting pass shifts them left over the in-place write
    /// path, and one bulk removal drops the vacated suffix. Returns the
    /// number removed.
    pub(crate) fn retain_range<F: FnMut(&T) -> bool>(
        &mut self,
        from: usize,
        to: usize,
        pred: &mut F,
    ) -> usize {
        debug_assert!(from <= to && to <= self.len);
        let span = to - from;
        if span == 0 {
            return 0;
        }
        let mut keep = vec![0u64; span.div_ceil(64)];
        let mut kept = 0;
        for (i, item) in Iter::over(self, from, to).enumerate() {
            if pred(item) {
                keep[i / 64] |= 1 << (i % 64);
                kept += 1;
            }
        }
        if kept == span {
            return 0;
        }
        self.compact_marked(from, to, &keep);
        span - kept
    }

    /// Shift the marked survivors of `[from, to)` to the front of the range
    /// with a read/write cursor pair over the in-place write path, then drop
    /// the vacated suffix in one bulk removal. Bit `i` of `keep` covers
    /// position `from + i`.
    fn compact_marked(&mut self, from: usize, to: usize, keep: &[u64]) {
        let mut write = from;
        for i in 0..to - from {
            if keep[i / 64] >> (i % 64) & 1 == 1 {
                let read = from + i;
                if read != write {
                    let value = self.get(read).cloned().expect("read cursor in bounds");
                    self.set(write, value);
                }
                write += 1;
            }
        }
        self.remove_range_at(write, to);
    }

    /// Apply `f` to every element in place, taking ownership of the whole
    /// tree leaf by leaf.
    pub fn for_each_mut<F: FnMut(&mut T)>(&mut self, mut f: F) {
        if self.root.is_some() {
            for_each_node_mut(self.root_mut(), &mut f);
        }
        for item in self.tail_mut().iter_mut() {
            f(item);
        }
    }

    /// An independent copy of the sequence in O(1).
    ///
    /// Both handles keep the same tree and both lose their ownership of
    /// it, so the first write on either side copies the affected path
    /// while everything else stays shared.
    pub fn fork(&mut self) -> Braid<T> {
        self.owned_root = false;
        self.owned_tail = false;
        Braid {
            root: self.root.clone(),
            tail: self.tail.clone(),
            len: self.len,
            shift: self.shift,
            owned_root: false,
            owned_tail: false,
        }
    }

    /// An independent copy of the sub-range, sharing structure with this
    /// sequence wherever a subtree falls entirely inside the range.
    ///
    /// # Panics
    ///
    /// Panics if the range is inverted or extends past the length.
    pub fn fork_range<R: RangeBounds<usize>>(&mut self, range: R) -> Braid<T> {
        let (from, to) = self.resolve_range(range);
        if from == to {
            return Braid::new();
        }
        if from == 0 && to == self.len {
            return self.fork();
        }
        // Everything reachable from the extracted range is now potentially
        // shared; disown both slots so the next write copies.
        self.owned_root = false;
        self.owned_tail = false;
        self.extract_range(from, to)
    }

    /// Split into `[0, at)` (kept) and `[at, len)` (returned); both sides
    /// keep ownership of the structure that falls entirely on their side.
    ///
    /// # Panics
    ///
    /// Panics if `at > len`.
    pub fn split_off(&mut self, at: usize) -> Braid<T> {
        assert!(
            at <= self.len,
            "split index (is {at}) should be <= len (is {})",
            self.len
        );
        if at == 0 {
            return mem::take(self);
        }
        if at == self.len {
            return Braid::new();
        }
        let tail_off = self.tail_offset();
        if at >= tail_off {
            let items: Items<T> = self.tail_mut().drain(at - tail_off..).collect();
            let other_len = items.len();
            self.len -= other_len;
            let other = Braid {
                root: None,
                tail: Arc::new(Node::Leaf(items)),
                len: other_len,
                shift: 0,
                owned_root: true,
                owned_tail: true,
            };
            self.normalize();
            return other;
        }
        let (left, right) = self.split_root_around(at.checked_sub(1), at);
        let old_tail = mem::replace(&mut self.tail, Arc::new(Node::empty_leaf()));
        let old_tail_owned = mem::replace(&mut self.owned_tail, true);
        let other_len = right.size + old_tail.as_leaf().len();
        let mut other = Braid {
            root: right.node,
            tail: old_tail,
            len: other_len,
            shift: right.shift,
            owned_root: right.owned,
            owned_tail: old_tail_owned,
        };
        other.normalize();
        self.install_root(left);
        self.len = at;
        self.normalize();
        other
    }

    /// Concatenate `other` onto the end. The left tail is pushed under the
    /// root, the two trees are joined with seam rebalancing, and `other`'s
    /// tail is adopted. To join with sharing instead of consuming, pass
    /// `other.fork()`.
    ///
    /// # Panics
    ///
    /// Panics if the combined length overflows.
    pub fn append(&mut self, other: Braid<T>) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        self.check_new_len(other.len);
        if other.root.is_none() {
            // The right side is tail-only; fill our tail from it and spill
            // the rest into a fresh one.
            let items = other.tail_items();
            let space = SPAN - self.tail_items().len();
            if items.len() <= space {
                let add = items.len();
                let cloned: Items<T> = items.iter().cloned().collect();
                self.tail_mut().extend(cloned);
                self.len += add;
            } else {
                let fill: Items<T> = items[..space].iter().cloned().collect();
                let rest: Items<T> = items[space..].iter().cloned().collect();
                let rest_len = rest.len();
                self.tail_mut().extend(fill);
                self.len += space;
                self.push_down_tail();
                self.tail = Arc::new(Node::Leaf(rest));
                self.owned_tail = true;
                self.len += rest_len;
            }
            return;
        }
        self.push_down_tail();
        let mut other = other;
        let left = self.take_root_tree();
        let right = other.take_root_tree();
        let merged = concat_trees(left, right);
        self.install_root(merged);
        self.tail = other.tail;
        self.owned_tail = other.owned_tail;
        self.len += other.len;
        self.normalize();
    }

    /// Insert all of `other` before `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` or the combined length overflows.
    pub fn splice(&mut self, index: usize, other: Braid<T>) {
        assert!(
            index <= self.len,
            "insertion index (is {index}) should be <= len (is {})",
            self.len
        );
        if index == self.len {
            return self.append(other);
        }
        if index == 0 {
            let rest = mem::replace(self, other);
            return self.append(rest);
        }
        let rest = self.split_off(index);
        self.append(other);
        self.append(rest);
    }

    /// Insert every element of `iter` before `index`, in order.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` or the combined length overflows.
    pub fn insert_all<I: IntoIterator<Item = T>>(&mut self, index: usize, iter: I) {
        assert!(
            index <= self.len,
            "insertion index (is {index}) should be <= len (is {})",
            self.len
        );
        if index == self.len {
            return self.extend(iter);
        }
        let buf: Vec<T> = iter.into_iter().collect();
        if buf.is_empty() {
            return;
        }
        self.check_new_len(buf.len());
        let tail_off = self.tail_offset();
        if index >= tail_off {
            // Carve off the tail suffix, bulk-extend, then put it back.
            let suffix: Vec<T> = self.tail_mut().drain(index - tail_off..).collect();
            self.len -= suffix.len();
            self.extend_from_vec(buf);
            self.extend_from_vec(suffix);
            return;
        }
        let count = buf.len();
        let (mut left, right) = self.split_root_around(index.checked_sub(1), index);
        let mut src = buf.into_iter();
        left.append(&mut src, count, AppendMode::AlwaysEmptySrc);
        let merged = concat_trees(left, right);
        self.install_root(merged);
        self.len += count;
        self.normalize();
    }

    /// A mutable cursor starting before the first element.
    pub fn cursor_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut::new(self)
    }

    /// A mutable view of the sub-range; its mutations write through.
    ///
    /// # Panics
    ///
    /// Panics if the range is inverted or extends past the length.
    pub fn slice_mut<R: RangeBounds<usize>>(&mut self, range: R) -> SliceMut<'_, T> {
        let (from, to) = self.resolve_range(range);
        SliceMut::new(self, from, to - from)
    }

    /// Build a sequence from a flat slice: the bulk path fills a tail and
    /// pours the rest directly under the root.
    pub fn from_slice(values: &[T]) -> Self {
        let mut braid = Braid::new();
        braid.extend_from_vec(values.to_vec());
        braid
    }

    /// An in-order flat copy.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    // -- internal machinery ------------------------------------------------

    fn tail_mut(&mut self) -> &mut Items<T> {
        let unique = Arc::get_mut(&mut self.tail).is_some();
        if !self.owned_tail || !unique {
            let fresh = self.tail.owned_copy();
            self.tail = Arc::new(fresh);
            self.owned_tail = true;
        }
        Arc::get_mut(&mut self.tail)
            .expect("freshly copied tail is unique")
            .as_leaf_mut()
    }

    fn root_mut(&mut self) -> &mut Node<T> {
        let arc = self.root.as_mut().expect("operation requires a root");
        let unique = Arc::get_mut(arc).is_some();
        if !self.owned_root || !unique {
            let fresh = arc.owned_copy();
            *arc = Arc::new(fresh);
            self.owned_root = true;
        }
        Arc::get_mut(self.root.as_mut().expect("present above"))
            .expect("freshly copied root is unique")
    }

    fn take_root_tree(&mut self) -> RawTree<T> {
        let size = self.tail_offset();
        RawTree {
            node: self.root.take(),
            owned: mem::replace(&mut self.owned_root, true),
            shift: mem::replace(&mut self.shift, 0),
            size,
        }
    }

    fn install_root(&mut self, tree: RawTree<T>) {
        self.shift = if tree.node.is_some() { tree.shift } else { 0 };
        self.owned_root = tree.node.is_none() || tree.owned;
        self.root = tree.node;
    }

    /// Split the root around a cut: the left half keeps `[0, last_left]`,
    /// the right half keeps `[first_right, root size)`. `None` means the
    /// left half is empty.
    fn split_root_around(
        &mut self,
        last_left: Option<usize>,
        first_right: usize,
    ) -> (RawTree<T>, RawTree<T>) {
        let tree = self.take_root_tree();
        let root = tree.node.expect("interior split requires a root");
        match last_left {
            None => {
                let right = if first_right == 0 {
                    RawTree {
                        node: Some(root),
                        owned: tree.owned,
                        shift: tree.shift,
                        size: tree.size,
                    }
                } else {
                    let (node, owned) =
                        take_suffix(&root, tree.shift, tree.size, first_right, tree.owned);
                    RawTree {
                        node: Some(node),
                        owned,
                        shift: tree.shift,
                        size: tree.size - first_right,
                    }
                };
                (RawTree::empty(), right)
            }
            Some(last) if first_right == tree.size => {
                let (node, owned) = take_prefix(&root, tree.shift, tree.size, last, tree.owned);
                let left = RawTree {
                    node: Some(node),
                    owned,
                    shift: tree.shift,
                    size: last + 1,
                };
                (left, RawTree::empty())
            }
            Some(last) => {
                let ((lnode, lowned), (rnode, rowned)) =
                    split_around(&root, tree.shift, tree.size, last, first_right, tree.owned);
                let left = RawTree {
                    node: Some(lnode),
                    owned: lowned,
                    shift: tree.shift,
                    size: last + 1,
                };
                let right = RawTree {
                    node: Some(rnode),
                    owned: rowned,
                    shift: tree.shift,
                    size: tree.size - first_right,
                };
                (left, right)
            }
        }
    }

    /// Copy `[from, to)` into a fresh container without claiming any node
    /// of this one; shared interiors stay disowned on the new side.
    pub(crate) fn extract_range(&self, from: usize, to: usize) -> Braid<T> {
        debug_assert!(from < to && to <= self.len);
        let len = to - from;
        let tail_off = self.tail_offset();
        if from >= tail_off {
            let items: Items<T> = self.tail_items()[from - tail_off..to - tail_off]
                .iter()
                .cloned()
                .collect();
            return Braid {
                root: None,
                tail: Arc::new(Node::Leaf(items)),
                len,
                shift: 0,
                owned_root: true,
                owned_tail: true,
            };
        }
        let root = self
            .root
            .as_ref()
            .expect("range starts under the root");
        let root_size = tail_off;
        let mut out = if to <= tail_off {
            let (prefix, prefix_owned) = if to == root_size {
                (root.clone(), false)
            } else {
                take_prefix(root, self.shift, root_size, to - 1, false)
            };
            let (mid, mid_owned) = if from == 0 {
                (prefix, prefix_owned)
            } else {
                take_suffix(&prefix, self.shift, to, from, prefix_owned)
            };
            Braid {
                root: Some(mid),
                tail: Arc::new(Node::empty_leaf()),
                len,
                shift: self.shift,
                owned_root: mid_owned,
                owned_tail: true,
            }
        } else {
            let (part, part_owned) = if from == 0 {
                (root.clone(), false)
            } else {
                take_suffix(root, self.shift, root_size, from, false)
            };
            let items: Items<T> = self.tail_items()[..to - tail_off].iter().cloned().collect();
            Braid {
                root: Some(part),
                tail: Arc::new(Node::Leaf(items)),
                len,
                shift: self.shift,
                owned_root: part_owned,
                owned_tail: true,
            }
        };
        out.normalize();
        out
    }

    /// Restore the container invariants after structural surgery: collapse
    /// single-child roots, refill an empty tail from the tree, and never
    /// leave a non-full leaf as the root.
    fn normalize(&mut self) {
        self.shrink_root();
        if self.len > 0 && self.tail_items().is_empty() && self.root.is_some() {
            self.pull_up_tail();
        }
        self.prevent_non_full_leaf_root();
    }

    fn shrink_root(&mut self) {
        loop {
            let step = match self.root.as_deref() {
                Some(Node::Inner(inner)) if inner.children.len() == 1 => {
                    Some((inner.children[0].clone(), self.owned_root && inner.owns.get(0)))
                }
                _ => None,
            };
            match step {
                Some((child, owned)) => {
                    self.root = Some(child);
                    self.owned_root = owned;
                    self.shift -= SHIFT;
                }
                None => break,
            }
        }
    }

    /// A short leaf root either empties into the tail or fills from it.
    fn prevent_non_full_leaf_root(&mut self) {
        let leaf_len = match self.root.as_deref() {
            Some(Node::Leaf(items)) => items.len(),
            _ => return,
        };
        if leaf_len == SPAN {
            return;
        }
        let tail_len = self.tail_items().len();
        if leaf_len + tail_len <= SPAN {
            let root = self.root.take().expect("checked above");
            let merged: Items<T> = root
                .as_leaf()
                .iter()
                .chain(self.tail_items().iter())
                .cloned()
                .collect();
            self.shift = 0;
            self.owned_root = true;
            self.tail = Arc::new(Node::Leaf(merged));
            self.owned_tail = true;
        } else {
            let need = SPAN - leaf_len;
            let moved: Items<T> = self.tail_mut().drain(..need).collect();
            self.root_mut().as_leaf_mut().extend(moved);
        }
    }

    /// Install the tail as the new rightmost leaf of the root, growing the
    /// tree if no ancestor on the rightmost path has a free slot, and hand
    /// the container a fresh empty tail.
    fn push_down_tail(&mut self) {
        let tail_len = self.tail_items().len();
        debug_assert!(tail_len > 0, "push-down requires a non-empty tail");
        let tail_owned = mem::replace(&mut self.owned_tail, true);
        let tail = mem::replace(&mut self.tail, Arc::new(Node::empty_leaf()));
        let root_size = self.len - tail_len;
        if self.root.is_none() {
            self.root = Some(tail);
            self.owned_root = tail_owned;
            self.shift = 0;
            return;
        }
        match self.find_push_anchor() {
            None => {
                let old_shift = self.shift;
                let new_shift = old_shift + SHIFT;
                let old_root = self.root.take().expect("present above");
                let old_owned = self.owned_root;
                let (spine, spine_owned) = make_spine(tail, tail_owned, old_shift);
                let mut children = Children::new();
                let mut owns = OwnerBits::none();
                owns.set_to(0, old_owned);
                owns.set_to(1, spine_owned);
                children.push(old_root);
                children.push(spine);
                let sizes = (root_size != 1 << new_shift)
                    .then(|| SizeTable::from_sizes(new_shift, [root_size, tail_len]));
                self.root = Some(Arc::new(Node::Inner(Inner {
                    children,
                    sizes,
                    owns,
                })));
                self.owned_root = true;
                self.shift = new_shift;
            }
            Some(anchor_shift) => {
                let mut shift = self.shift;
                let mut total = root_size;
                let mut node = self.root_mut();
                loop {
                    let inner = node.as_inner_mut();
                    if shift == anchor_shift {
                        // Appending after a short last child forces the
                        // sized form before the new slot lands.
                        if inner.sizes.is_none() {
                            let last = inner.children.len() - 1;
                            if inner.child_size(last, shift, total) != 1 << shift {
                                inner.make_sized(shift, total);
                            }
                        }
                        let (spine, spine_owned) = make_spine(tail, tail_owned, shift - SHIFT);
                        if let Some(table) = &mut inner.sizes {
                            table.push(total + tail_len);
                        }
                        inner.owns.set_to(inner.children.len(), spine_owned);
                        inner.children.push(spine);
                        break;
                    }
                    let last = inner.children.len() - 1;
                    let child_total = inner.child_size(last, shift, total);
                    if let Some(table) = &mut inner.sizes {
                        table.grow_last(tail_len);
                    }
                    total = child_total;
                    shift -= SHIFT;
                    node = inner.editable_child(last);
                }
            }
        }
    }

    /// Shift of the deepest rightmost-path node with a free child slot.
    fn find_push_anchor(&self) -> Option<usize> {
        let mut node = self.root.as_deref()?;
        let mut shift = self.shift;
        let mut anchor = None;
        while let Node::Inner(inner) = node {
            if inner.children.len() < SPAN {
                anchor = Some(shift);
            }
            node = &inner.children[inner.children.len() - 1];
            shift -= SHIFT;
        }
        anchor
    }

    /// Promote the rightmost leaf of the root to be the new tail, cutting
    /// its spine out of the tree and shrinking the root as needed.
    fn pull_up_tail(&mut self) {
        debug_assert!(self.tail_items().is_empty());
        if matches!(self.root.as_deref(), Some(Node::Leaf(_))) {
            self.tail = self.root.take().expect("checked above");
            self.owned_tail = self.owned_root;
            self.owned_root = true;
            self.shift = 0;
            return;
        }
        let root_size = self.len;
        // Deepest rightmost-path node that keeps more than one child once
        // the spine below it is cut away, and the promoted leaf's length.
        let (cut_shift, leaf_len) = {
            let mut node = self.root.as_deref().expect("pull-up requires a root");
            let mut shift = self.shift;
            let mut cut = None;
            loop {
                match node {
                    Node::Leaf(items) => break (cut, items.len()),
                    Node::Inner(inner) => {
                        if inner.children.len() > 1 {
                            cut = Some(shift);
                        }
                        node = &inner.children[inner.children.len() - 1];
                        shift -= SHIFT;
                    }
                }
            }
        };
        let Some(cut_shift) = cut_shift else {
            // The root is a bare spine over a single leaf.
            let root = self.root.take().expect("present above");
            let (leaf, leaf_owned) = descend_spine(root, self.owned_root);
            self.tail = leaf;
            self.owned_tail = leaf_owned;
            self.owned_root = true;
            self.shift = 0;
            return;
        };
        let mut shift = self.shift;
        let mut total = root_size;
        let mut node = self.root_mut();
        let (spine, spine_owned) = loop {
            let inner = node.as_inner_mut();
            if shift == cut_shift {
                let last = inner.children.len() - 1;
                let owned = inner.owns.get(last);
                let spine = inner.children.pop().expect("cut node keeps a child");
                if let Some(table) = &mut inner.sizes {
                    table.pop();
                }
                break (spine, owned);
            }
            let last = inner.children.len() - 1;
            let child_total = inner.child_size(last, shift, total);
            if let Some(table) = &mut inner.sizes {
                table.shrink_last(leaf_len);
            }
            total = child_total;
            shift -= SHIFT;
            node = inner.editable_child(last);
        };
        let (leaf, leaf_owned) = descend_spine(spine, spine_owned);
        self.tail = leaf;
        self.owned_tail = leaf_owned;
        self.shrink_root();
        self.prevent_non_full_leaf_root();
    }

    fn extend_from_vec(&mut self, buf: Vec<T>) {
        let count = buf.len();
        if count == 0 {
            return;
        }
        self.check_new_len(count);
        let mut src = buf.into_iter();
        let space = SPAN - self.tail_items().len();
        let take = count.min(space);
        if take > 0 {
            let head: Items<T> = src.by_ref().take(take).collect();
            self.tail_mut().extend(head);
            self.len += take;
        }
        let rest = count - take;
        if rest == 0 {
            return;
        }
        self.push_down_tail();
        let mut tree = self.take_root_tree();
        // Keep 1..=SPAN elements back to seed the new tail.
        let mode = if rest % SPAN == 0 {
            AppendMode::NeverEmptySrc
        } else {
            AppendMode::EmptySrcToFill
        };
        let consumed = tree.append(&mut src, rest, mode);
        self.install_root(tree);
        self.len += consumed;
        let seed = rest - consumed;
        debug_assert!((1..=SPAN).contains(&seed));
        let items: Items<T> = src.collect();
        debug_assert_eq!(items.len(), seed);
        self.tail = Arc::new(Node::Leaf(items));
        self.owned_tail = true;
        self.len += seed;
    }
}

/// Follow a single-child spine down to its leaf, accumulating ownership.
fn descend_spine<T>(node: Arc<Node<T>>, owned: bool) -> (Arc<Node<T>>, bool) {
    let mut arc = node;
    let mut owned = owned;
    loop {
        let step = match &*arc {
            Node::Leaf(_) => None,
            Node::Inner(inner) => {
                debug_assert_eq!(inner.children.len(), 1, "spines are single-child");
                Some((inner.children[0].clone(), owned && inner.owns.get(0)))
            }
        };
        match step {
            Some((next, next_owned)) => {
                arc = next;
                owned = next_owned;
            }
            None => return (arc, owned),
        }
    }
}

/// Chain single-child wrappers from a leaf up to `top_shift`.
fn make_spine<T>(leaf: Arc<Node<T>>, leaf_owned: bool, top_shift: usize) -> (Arc<Node<T>>, bool) {
    let mut node = leaf;
    let mut owned = leaf_owned;
    let mut shift = SHIFT;
    while shift <= top_shift {
        let mut children = Children::new();
        children.push(node);
        node = Arc::new(Node::Inner(Inner::strict(children, OwnerBits::single(owned))));
        owned = true;
        shift += SHIFT;
    }
    (node, owned)
}

fn for_each_node_mut<T: Clone, F: FnMut(&mut T)>(node: &mut Node<T>, f: &mut F) {
    match node {
        Node::Leaf(items) => {
            for item in items.iter_mut() {
                f(item);
            }
        }
        Node::Inner(inner) => {
            for i in 0..inner.children.len() {
                for_each_node_mut(inner.editable_child(i), f);
            }
        }
    }
}

// -- trait impls -----------------------------------------------------------

impl<T> Default for Braid<T> {
    fn default() -> Self {
        Braid::new()
    }
}

/// An O(1) copy sharing the whole tree. Unlike [`Braid::fork`] this cannot
/// clear the source's ownership bits; the per-edit uniqueness check makes
/// that safe, at the cost of one copied path on the source's next write.
impl<T> Clone for Braid<T> {
    fn clone(&self) -> Self {
        Braid {
            root: self.root.clone(),
            tail: self.tail.clone(),
            len: self.len,
            shift: self.shift,
            owned_root: false,
            owned_tail: false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Braid<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for Braid<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for Braid<T> {}

impl<T> Index<usize> for Braid<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.get(index).unwrap_or_else(|| {
            panic!(
                "index out of bounds: the len is {} but the index is {}",
                self.len, index
            )
        })
    }
}

impl<T: Clone> IndexMut<usize> for Braid<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len;
        self.get_mut(index).unwrap_or_else(|| {
            panic!("index out of bounds: the len is {len} but the index is {index}")
        })
    }
}

impl<T: Clone> Extend<T> for Braid<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.extend_from_vec(iter.into_iter().collect());
    }
}

impl<T: Clone> FromIterator<T> for Braid<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut braid = Braid::new();
        braid.extend(iter);
        braid
    }
}

impl<T: Clone> From<Vec<T>> for Braid<T> {
    fn from(values: Vec<T>) -> Self {
        let mut braid = Braid::new();
        braid.extend_from_vec(values);
        braid
    }
}

impl<T: Clone> From<&[T]> for Braid<T> {
    fn from(values: &[T]) -> Self {
        Braid::from_slice(values)
    }
}

impl<T: Clone, const N: usize> From<[T; N]> for Braid<T> {
    fn from(values: [T; N]) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Clone> From<Braid<T>> for Vec<T> {
    fn from(braid: Braid<T>) -> Self {
        braid.into_iter().collect()
    }
}
