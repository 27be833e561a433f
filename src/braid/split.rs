//! Structural splitting: prefix trims, suffix trims, and splitting around
//! an excised range.
//!
//! All three walks copy only the nodes on the cut path; subtrees that lie
//! entirely on one side of the cut are shared with the original by
//! reference. When `owned` is true the walk may carry the original's
//! ownership bits over to the kept slots (the caller keeps both halves, so
//! no slot is claimed twice); when it is false — the fork case, where the
//! original must remain valid — every shared slot is left disowned and
//! only freshly built cut-path nodes are claimed. Either way the cut may
//! leave thin single-child spines behind; callers tolerate or collapse
//! them.

use std::sync::Arc;

use super::node::{Children, Inner, Items, Node, OwnerBits, SHIFT};
use super::sizes::SizeTable;

/// A trimmed subtree plus whether the caller owns it.
pub(crate) type Trimmed<T> = (Arc<Node<T>>, bool);

/// Keep elements `[0, last]` of the subtree.
pub(crate) fn take_prefix<T: Clone>(
    node: &Arc<Node<T>>,
    shift: usize,
    total: usize,
    last: usize,
    owned: bool,
) -> Trimmed<T> {
    debug_assert!(last < total);
    if last + 1 == total {
        return (node.clone(), owned);
    }
    match &**node {
        Node::Leaf(items) => {
            let kept: Items<T> = items[..=last].iter().cloned().collect();
            (Arc::new(Node::Leaf(kept)), true)
        }
        Node::Inner(inner) => {
            let (slot, sub) = inner.position(last, shift);
            let child_total = inner.child_size(slot, shift, total);
            let child_owned = owned && inner.owns.get(slot);
            let trimmed = take_prefix(
                &inner.children[slot],
                shift - SHIFT,
                child_total,
                sub,
                child_owned,
            );
            rebuild_prefix(inner, slot, trimmed, sub + 1, owned)
        }
    }
}

/// Keep elements `[first, total)` of the subtree.
pub(crate) fn take_suffix<T: Clone>(
    node: &Arc<Node<T>>,
    shift: usize,
    total: usize,
    first: usize,
    owned: bool,
) -> Trimmed<T> {
    debug_assert!(first < total);
    if first == 0 {
        return (node.clone(), owned);
    }
    match &**node {
        Node::Leaf(items) => {
            let kept: Items<T> = items[first..].iter().cloned().collect();
            (Arc::new(Node::Leaf(kept)), true)
        }
        Node::Inner(inner) => {
            let (slot, sub) = inner.position(first, shift);
            let child_total = inner.child_size(slot, shift, total);
            let child_owned = owned && inner.owns.get(slot);
            let trimmed = take_suffix(
                &inner.children[slot],
                shift - SHIFT,
                child_total,
                sub,
                child_owned,
            );
            rebuild_suffix(inner, shift, total, slot, trimmed, child_total - sub, owned)
        }
    }
}

/// Split the subtree around an excised range: the left output keeps
/// `[0, last_left]`, the right output keeps `[first_right, total)`. The two
/// walks descend in lockstep while the cut points share a child and
/// independently once they diverge.
pub(crate) fn split_around<T: Clone>(
    node: &Arc<Node<T>>,
    shift: usize,
    total: usize,
    last_left: usize,
    first_right: usize,
    owned: bool,
) -> (Trimmed<T>, Trimmed<T>) {
    debug_assert!(last_left < first_right && first_right < total);
    match &**node {
        Node::Leaf(items) => {
            let left: Items<T> = items[..=last_left].iter().cloned().collect();
            let right: Items<T> = items[first_right..].iter().cloned().collect();
            (
                (Arc::new(Node::Leaf(left)), true),
                (Arc::new(Node::Leaf(right)), true),
            )
        }
        Node::Inner(inner) => {
            let (lslot, lsub) = inner.position(last_left, shift);
            let (rslot, rsub) = inner.position(first_right, shift);
            if lslot == rslot {
                let child_total = inner.child_size(lslot, shift, total);
                let child_owned = owned && inner.owns.get(lslot);
                let (left, right) = split_around(
                    &inner.children[lslot],
                    shift - SHIFT,
                    child_total,
                    lsub,
                    rsub,
                    child_owned,
                );
                (
                    rebuild_prefix(inner, lslot, left, lsub + 1, owned),
                    rebuild_suffix(inner, shift, total, rslot, right, child_total - rsub, owned),
                )
            } else {
                let left_total = inner.child_size(lslot, shift, total);
                let right_total = inner.child_size(rslot, shift, total);
                let left = take_prefix(
                    &inner.children[lslot],
                    shift - SHIFT,
                    left_total,
                    lsub,
                    owned && inner.owns.get(lslot),
                );
                let right = take_suffix(
                    &inner.children[rslot],
                    shift - SHIFT,
                    right_total,
                    rsub,
                    owned && inner.owns.get(rslot),
                );
                (
                    rebuild_prefix(inner, lslot, left, lsub + 1, owned),
                    rebuild_suffix(inner, shift, total, rslot, right, right_total - rsub, owned),
                )
            }
        }
    }
}

/// Rebuild a node keeping children `[0, slot)` plus a trimmed final child
/// of `kept` elements. A strict prefix stays strict (its kept children are
/// full and the trimmed child sits last); a sized prefix keeps its sized
/// form even if the trim happened to restore strictness.
fn rebuild_prefix<T: Clone>(
    inner: &Inner<T>,
    slot: usize,
    trimmed: Trimmed<T>,
    kept: usize,
    owned: bool,
) -> Trimmed<T> {
    let (node, node_owned) = trimmed;
    let mut children: Children<T> = inner.children[..slot].iter().cloned().collect();
    let mut owns = if owned {
        inner.owns.low(slot)
    } else {
        OwnerBits::none()
    };
    owns.set_to(slot, node_owned);
    children.push(node);
    let sizes = inner.sizes.as_ref().map(|table| {
        let before = if slot == 0 { 0 } else { table.get(slot - 1) };
        let mut prefix = table.prefix(slot);
        prefix.push(before + kept);
        prefix
    });
    (
        Arc::new(Node::Inner(Inner {
            children,
            sizes,
            owns,
        })),
        true,
    )
}

/// Rebuild a node keeping a trimmed first child of `kept` elements plus
/// children `(slot, n)`. The result needs a size table unless the original
/// was strict and the first child is still full (or is the only child).
fn rebuild_suffix<T: Clone>(
    inner: &Inner<T>,
    shift: usize,
    total: usize,
    slot: usize,
    trimmed: Trimmed<T>,
    kept: usize,
    owned: bool,
) -> Trimmed<T> {
    let (node, node_owned) = trimmed;
    let n = inner.children.len();
    let mut children: Children<T> = Children::new();
    children.push(node);
    children.extend(inner.children[slot + 1..].iter().cloned());
    let mut owns = if owned {
        inner.owns.slice(slot + 1, n - slot - 1).shift_up(1)
    } else {
        OwnerBits::none()
    };
    owns.set_to(0, node_owned);
    let sizes = if inner.sizes.is_none() && (kept == 1 << shift || slot + 1 == n) {
        None
    } else {
        let mut table = SizeTable::new(shift);
        let mut cum = kept;
        table.push(cum);
        for i in slot + 1..n {
            cum += inner.child_size(i, shift, total);
            table.push(cum);
        }
        Some(table)
    };
    (
        Arc::new(Node::Inner(Inner {
            children,
            sizes,
            owns,
        })),
        true,
    )
}
