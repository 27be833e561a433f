//! Concatenation of two trees with rebalancing along the seam.
//!
//! The recursion descends the rightmost path of the left tree and the
//! leftmost path of the right tree until the two sides reach matching
//! height, merges the facing leaves when they fit in one, and then unwinds
//! one level at a time. At each level the surviving children of both sides
//! are pooled; if the pool exceeds the packing optimum by more than
//! `TOLERANCE` slots, grandchildren are redistributed left to right —
//! skipping children already near capacity — until the bound holds. The
//! pool is finally packed into at most two nodes, right into left, and a
//! fresh parent is added on top only if the right node survives to the
//! root.

use std::iter::once;
use std::sync::Arc;

use itertools::chain;

use super::append::RawTree;
use super::node::{
    Children, Inner, Items, Node, OwnerBits, DO_NOT_REDISTRIBUTE, SHIFT, SPAN, TOLERANCE,
};
use super::sizes::SizeTable;

/// A subtree moving through the rebalance machinery, with its exact
/// element count and whether the caller owns it.
struct Part<T> {
    node: Arc<Node<T>>,
    owned: bool,
    size: usize,
}

/// Up to two sibling nodes produced by one unwind level.
struct Seam<T> {
    left: Part<T>,
    right: Option<Part<T>>,
    shift: usize,
}

/// Concatenate two detached trees into one.
pub(crate) fn concat_trees<T: Clone>(left: RawTree<T>, right: RawTree<T>) -> RawTree<T> {
    let size = left.size + right.size;
    let Some(lnode) = left.node else {
        return right;
    };
    let Some(rnode) = right.node else {
        return RawTree {
            node: Some(lnode),
            owned: left.owned,
            shift: left.shift,
            size,
        };
    };
    let seam = concat_rec(
        Part {
            node: lnode,
            owned: left.owned,
            size: left.size,
        },
        left.shift,
        Part {
            node: rnode,
            owned: right.owned,
            size: right.size,
        },
        right.shift,
    );
    match seam.right {
        None => RawTree {
            node: Some(seam.left.node),
            owned: seam.left.owned,
            shift: seam.shift,
            size,
        },
        Some(rpart) => {
            let lpart = seam.left;
            let shift = seam.shift + SHIFT;
            let mut owns = OwnerBits::none();
            owns.set_to(0, lpart.owned);
            owns.set_to(1, rpart.owned);
            let full = 1usize << shift;
            let sizes = (lpart.size != full || rpart.size != full)
                .then(|| SizeTable::from_sizes(shift, [lpart.size, rpart.size]));
            let mut children = Children::new();
            children.push(lpart.node);
            children.push(rpart.node);
            RawTree {
                node: Some(Arc::new(Node::Inner(Inner {
                    children,
                    sizes,
                    owns,
                }))),
                owned: true,
                shift,
                size,
            }
        }
    }
}

fn concat_rec<T: Clone>(left: Part<T>, lshift: usize, right: Part<T>, rshift: usize) -> Seam<T> {
    if lshift == 0 && rshift == 0 {
        let merged = left.node.as_leaf().len() + right.node.as_leaf().len();
        if merged <= SPAN {
            let items: Items<T> = left
                .node
                .as_leaf()
                .iter()
                .chain(right.node.as_leaf().iter())
                .cloned()
                .collect();
            return Seam {
                left: Part {
                    node: Arc::new(Node::Leaf(items)),
                    owned: true,
                    size: merged,
                },
                right: None,
                shift: 0,
            };
        }
        return Seam {
            left,
            right: Some(right),
            shift: 0,
        };
    }
    if lshift > rshift {
        let inner = left.node.as_inner();
        let n = inner.children.len();
        let seam = concat_rec(
            child_part(inner, lshift, left.size, n - 1, left.owned),
            lshift - SHIFT,
            right,
            rshift,
        );
        let parts: Vec<Part<T>> =
            chain!(slot_parts(inner, lshift, left.size, 0, n - 1, left.owned), seam_parts(seam)).collect();
        rebalance_level(parts, lshift)
    } else if rshift > lshift {
        let inner = right.node.as_inner();
        let n = inner.children.len();
        let seam = concat_rec(
            left,
            lshift,
            child_part(inner, rshift, right.size, 0, right.owned),
            rshift - SHIFT,
        );
        let parts: Vec<Part<T>> =
            chain!(seam_parts(seam), slot_parts(inner, rshift, right.size, 1, n, right.owned)).collect();
        rebalance_level(parts, rshift)
    } else {
        let lin = left.node.as_inner();
        let rin = right.node.as_inner();
        let ln = lin.children.len();
        let rn = rin.children.len();
        let seam = concat_rec(
            child_part(lin, lshift, left.size, ln - 1, left.owned),
            lshift - SHIFT,
            child_part(rin, rshift, right.size, 0, right.owned),
            rshift - SHIFT,
        );
        let parts: Vec<Part<T>> = chain!(
            slot_parts(lin, lshift, left.size, 0, ln - 1, left.owned),
            seam_parts(seam),
            slot_parts(rin, rshift, right.size, 1, rn, right.owned),
        )
        .collect();
        rebalance_level(parts, lshift)
    }
}

fn child_part<T>(inner: &Inner<T>, shift: usize, total: usize, i: usize, owned: bool) -> Part<T> {
    Part {
        node: inner.children[i].clone(),
        owned: owned && inner.owns.get(i),
        size: inner.child_size(i, shift, total),
    }
}

fn slot_parts<'a, T>(
    inner: &'a Inner<T>,
    shift: usize,
    total: usize,
    from: usize,
    to: usize,
    owned: bool,
) -> impl Iterator<Item = Part<T>> + 'a {
    (from..to).map(move |i| child_part(inner, shift, total, i, owned))
}

fn seam_parts<T>(seam: Seam<T>) -> impl Iterator<Item = Part<T>> {
    once(seam.left).chain(seam.right)
}

/// Pool one level's children, rebalance if the tolerance is exceeded, and
/// pack the result into at most two nodes at `shift`.
fn rebalance_level<T: Clone>(mut parts: Vec<Part<T>>, shift: usize) -> Seam<T> {
    let slots: usize = parts.iter().map(|p| p.node.slot_count()).sum();
    let min_len = slots.div_ceil(SPAN);
    if parts.len() > min_len + TOLERANCE {
        parts = redistribute(parts, shift, min_len);
    }
    if parts.len() <= SPAN {
        Seam {
            left: build_node(parts, shift),
            right: None,
            shift,
        }
    } else {
        let right = parts.split_off(SPAN);
        Seam {
            left: build_node(parts, shift),
            right: Some(build_node(right, shift)),
            shift,
        }
    }
}

/// Plan the post-rebalance slot counts, then execute the plan. Children
/// already holding `DO_NOT_REDISTRIBUTE` or more slots are kept intact;
/// each undersized child is drained into its successors, capping at
/// `SPAN`, which retires exactly one slot per round.
fn redistribute<T: Clone>(parts: Vec<Part<T>>, shift: usize, min_len: usize) -> Vec<Part<T>> {
    let mut plan: Vec<usize> = parts.iter().map(|p| p.node.slot_count()).collect();
    let mut i = 0;
    while plan.len() > min_len + TOLERANCE {
        while plan[i] >= DO_NOT_REDISTRIBUTE {
            i += 1;
        }
        let mut carry = plan[i];
        let mut j = i;
        while carry > 0 {
            debug_assert!(j + 1 < plan.len(), "redistribution needs a successor");
            let merged = (carry + plan[j + 1]).min(SPAN);
            carry = carry + plan[j + 1] - merged;
            plan[j] = merged;
            j += 1;
        }
        plan.remove(j);
    }
    execute_plan(parts, plan, shift)
}

/// Rebuild the child list to the planned slot counts, carving grandchild
/// runs left to right. A child whose planned count matches its current one
/// passes through untouched, keeping its identity and ownership.
fn execute_plan<T: Clone>(parts: Vec<Part<T>>, plan: Vec<usize>, shift: usize) -> Vec<Part<T>> {
    let child_shift = shift - SHIFT;
    let mut out = Vec::with_capacity(plan.len());
    let mut src = parts.into_iter();
    let mut cur = src.next();
    let mut offset = 0;
    for want in plan {
        let reuse = {
            let part = cur.as_ref().expect("plan covers exactly the input slots");
            offset == 0 && part.node.slot_count() == want
        };
        if reuse {
            out.push(cur.take().expect("checked above"));
            cur = src.next();
            continue;
        }
        if child_shift == 0 {
            let mut items = Items::new();
            while items.len() < want {
                let part = cur.as_ref().expect("plan covers exactly the input slots");
                let leaf = part.node.as_leaf();
                let take = (want - items.len()).min(leaf.len() - offset);
                items.extend(leaf[offset..offset + take].iter().cloned());
                offset += take;
                if offset == leaf.len() {
                    cur = src.next();
                    offset = 0;
                }
            }
            out.push(Part {
                node: Arc::new(Node::Leaf(items)),
                owned: true,
                size: want,
            });
        } else {
            let mut children = Children::new();
            let mut owns = OwnerBits::none();
            let mut grand_sizes = Vec::with_capacity(want);
            while children.len() < want {
                let part = cur.as_ref().expect("plan covers exactly the input slots");
                let inner = part.node.as_inner();
                let take = (want - children.len()).min(inner.children.len() - offset);
                for k in offset..offset + take {
                    owns.set_to(children.len(), part.owned && inner.owns.get(k));
                    grand_sizes.push(inner.child_size(k, child_shift, part.size));
                    children.push(inner.children[k].clone());
                }
                offset += take;
                if offset == inner.children.len() {
                    cur = src.next();
                    offset = 0;
                }
            }
            let size = grand_sizes.iter().sum();
            let full = 1usize << child_shift;
            let strict = grand_sizes[..grand_sizes.len() - 1]
                .iter()
                .all(|&s| s == full);
            let sizes =
                (!strict).then(|| SizeTable::from_sizes(child_shift, grand_sizes.iter().copied()));
            out.push(Part {
                node: Arc::new(Node::Inner(Inner {
                    children,
                    sizes,
                    owns,
                })),
                owned: true,
                size,
            });
        }
    }
    debug_assert!(cur.is_none());
    out
}

/// Pack parts into a single node at `shift`, sized unless every child but
/// the last is full for its height.
fn build_node<T: Clone>(parts: Vec<Part<T>>, shift: usize) -> Part<T> {
    debug_assert!(!parts.is_empty() && parts.len() <= SPAN);
    let full = 1usize << shift;
    let strict = parts[..parts.len() - 1].iter().all(|p| p.size == full);
    let sizes = (!strict).then(|| SizeTable::from_sizes(shift, parts.iter().map(|p| p.size)));
    let mut children = Children::new();
    let mut owns = OwnerBits::none();
    let mut size = 0;
    for part in parts {
        owns.set_to(children.len(), part.owned);
        size += part.size;
        children.push(part.node);
    }
    Part {
        node: Arc::new(Node::Inner(Inner {
            children,
            sizes,
            owns,
        })),
        owned: true,
        size,
    }
}
