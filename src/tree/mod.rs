// Copyright 2025 Sumtree Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core order-statistics red-black tree engine
//!
//! One balancing engine serves both public collections: the rank-keyed
//! list and the key-ordered set differ only in how a descent target
//! compares against a node ([`SearchTarget`]) and in what the payload
//! carries ([`Item`]). Balancing is top-down 2-3-4 style: insertion splits
//! every 4-node it passes and repairs red-red pairs with one of four
//! rotation shapes; deletion guarantees on the way down that no node on
//! the path is a 2-node, so the final splice needs no second pass.
//!
//! Rank search never stores a position: each node's rank inside its
//! subtree is derived from the left child's leaf count. Because rotations
//! reshuffle exactly those counts, a positional insertion descent restarts
//! from the root after any 4-node split; key comparisons are absolute and
//! keep descending.

pub(crate) mod node;

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::numeric::Numeric;

pub(crate) use node::{
    ByRank, Color, EqualPolicy, Item, NodeArena, NodeId, SearchTarget, NIL,
};

/// Inline capacity for descent/walk stacks: the maximum height of a
/// red-black tree is `2*log2(n+1)`, so 32 covers every tree that fits in
/// the arena's `u32` index space.
pub(crate) const STACK_CAPACITY: usize = 32;

pub(crate) type WalkStack = SmallVec<[NodeId; STACK_CAPACITY]>;

/// Process-unique identity stamp for a collection instance. Views and
/// cursors record the stamp of the collection they were created from, so
/// presenting them a different instance (including a clone) is caught
/// instead of silently reading foreign nodes.
pub(crate) fn next_collection_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Augmented red-black tree over an arena of nodes
#[derive(Clone)]
pub(crate) struct CoreTree<T: Item> {
    pub(crate) arena: NodeArena<T>,
    pub(crate) root: NodeId,
    pub(crate) size: usize,
    pub(crate) version: u64,
}

impl<T: Item> CoreTree<T> {
    pub(crate) fn new() -> Self {
        Self {
            arena: NodeArena::new(),
            root: NIL,
            size: 0,
            version: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Aggregate sum over the whole tree
    pub(crate) fn values_sum(&self) -> T::Weight {
        self.arena.sum_of(self.root)
    }

    /// Recycle every node and forget the structure
    pub(crate) fn clear(&mut self) {
        if self.root.is_nil() {
            return;
        }
        self.arena.recycle_subtree(self.root);
        self.root = NIL;
        self.size = 0;
        self.version += 1;
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Locate the node a target compares equal to, `NIL` if absent
    pub(crate) fn find<S: SearchTarget<T>>(&self, mut target: S) -> NodeId {
        let mut current = self.root;
        while !current.is_nil() {
            match target.cmp(&self.arena, current) {
                Ordering::Equal => return current,
                Ordering::Less => current = self.arena.left(current),
                Ordering::Greater => {
                    target.descend_right(&self.arena, current);
                    current = self.arena.right(current);
                }
            }
        }
        NIL
    }

    pub(crate) fn get<S: SearchTarget<T>>(&self, target: S) -> Option<&T> {
        let node = self.find(target);
        if node.is_nil() {
            None
        } else {
            Some(self.arena.item(node))
        }
    }

    /// Leftmost node, `NIL` when empty
    pub(crate) fn min_node(&self) -> NodeId {
        let mut current = self.root;
        if current.is_nil() {
            return NIL;
        }
        loop {
            let left = self.arena.left(current);
            if left.is_nil() {
                return current;
            }
            current = left;
        }
    }

    /// Rightmost node, `NIL` when empty
    pub(crate) fn max_node(&self) -> NodeId {
        let mut current = self.root;
        if current.is_nil() {
            return NIL;
        }
        loop {
            let right = self.arena.right(current);
            if right.is_nil() {
                return current;
            }
            current = right;
        }
    }

    /// Change the value a found node contributes; sums re-derive to the
    /// root, structure and version stay put
    pub(crate) fn update_node(&mut self, id: NodeId, value: T::Weight) {
        self.arena.update_weight(id, value);
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Top-down insert. Returns `false` without changing membership when a
    /// rejecting target finds an equal node already present.
    pub(crate) fn insert<S: SearchTarget<T>>(&mut self, mut target: S, item: T) -> bool {
        if self.root.is_nil() {
            // The tree is empty and this is the first element
            self.root = self.arena.alloc(item, Color::Black);
            self.size = 1;
            self.version += 1;
            return true;
        }
        // Even a rejected insert may already have rotated the structure,
        // so the version bumps before the descent starts
        self.version += 1;
        let mut current = self.root;
        let mut parent = NIL;
        let mut grandparent = NIL;
        let mut great_grandparent = NIL;
        let mut order = Ordering::Greater;
        let mut steered = false;
        while !current.is_nil() {
            order = if steered {
                Ordering::Greater
            } else {
                target.cmp(&self.arena, current)
            };
            if order == Ordering::Equal {
                match S::ON_EQUAL {
                    EqualPolicy::Reject => {
                        // The descent may have reddened the root; restore it
                        self.arena.color_black(self.root);
                        return false;
                    }
                    EqualPolicy::SteerLeft => {
                        self.arena.color_black(self.root);
                        steered = true;
                    }
                }
            }
            // Split a 4-node into two 2-nodes before descending past it
            if self.arena.is_four_node(current) {
                self.arena.split_four_node(current);
                // The split may have created two consecutive red nodes
                if self.arena.is_red(parent) {
                    self.insertion_balance(current, &mut parent, grandparent, great_grandparent);
                }
                if S::POSITIONAL {
                    // The rotation reshuffled left-subtree leaf counts on
                    // the path, so the running rank is stale
                    target.reset();
                    steered = false;
                    current = self.root;
                    parent = NIL;
                    grandparent = NIL;
                    great_grandparent = NIL;
                    continue;
                }
            }
            great_grandparent = grandparent;
            grandparent = parent;
            parent = current;
            if order == Ordering::Greater {
                target.descend_right(&self.arena, current);
                current = self.arena.right(current);
            } else {
                current = self.arena.left(current);
            }
        }
        debug_assert!(!parent.is_nil());
        let new_node = self.arena.alloc(item, Color::Red);
        if order == Ordering::Greater {
            self.arena.set_right(parent, new_node);
        } else {
            self.arena.set_left(parent, new_node);
        }
        // The new node is red; repair if its parent is red as well
        if self.arena.is_red(parent) {
            self.insertion_balance(new_node, &mut parent, grandparent, great_grandparent);
        }
        self.arena.color_black(self.root);
        self.size += 1;
        true
    }

    /// One of four rotation shapes repairing a red `current` under a red
    /// `parent`, chosen by the orientation of parent-under-grandparent and
    /// current-under-parent. `parent` is re-anchored for the caller after a
    /// double rotation.
    fn insertion_balance(
        &mut self,
        current: NodeId,
        parent: &mut NodeId,
        grandparent: NodeId,
        great_grandparent: NodeId,
    ) {
        debug_assert!(!parent.is_nil() && !grandparent.is_nil());
        let parent_is_right = self.arena.right(grandparent) == *parent;
        let current_is_right = self.arena.right(*parent) == current;
        let new_child = if parent_is_right == current_is_right {
            if current_is_right {
                self.arena.rotate_left(grandparent)
            } else {
                self.arena.rotate_right(grandparent)
            }
        } else {
            let rotated = if current_is_right {
                self.arena.rotate_left_right(grandparent)
            } else {
                self.arena.rotate_right_left(grandparent)
            };
            // After a double rotation the inserted node sits on top, so its
            // parent is whatever held the grandparent
            *parent = great_grandparent;
            rotated
        };
        self.arena.color_red(grandparent);
        self.arena.color_black(new_child);
        self.replace_child_or_root(great_grandparent, grandparent, new_child);
    }

    /// Replace `child` under `parent`, or the tree root when `parent` is
    /// `NIL`
    fn replace_child_or_root(&mut self, parent: NodeId, child: NodeId, new_child: NodeId) {
        if !parent.is_nil() {
            self.arena.replace_child(parent, child, new_child);
        } else {
            self.root = new_child;
            if !new_child.is_nil() {
                self.arena.isolate(new_child);
            }
        }
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Single-pass top-down removal. Every 2-node on the path is fixed up
    /// before the descent continues, so the matched node can be spliced out
    /// without walking back up. Returns the removed payload, `None` when
    /// the target is absent.
    pub(crate) fn remove<S: SearchTarget<T>>(&mut self, mut target: S) -> Option<T> {
        if self.root.is_nil() {
            return None;
        }
        // A miss can still have restructured the tree on the way down
        self.version += 1;
        let mut current = self.root;
        let mut parent = NIL;
        let mut grandparent = NIL;
        let mut matched = NIL;
        let mut parent_of_match = NIL;
        let mut found = false;
        while !current.is_nil() {
            if self.arena.is_two_node(current) {
                if parent.is_nil() {
                    // A 2-node root can simply be reddened
                    self.arena.color_red(current);
                } else if !self.arena.left(parent).is_nil() && !self.arena.right(parent).is_nil() {
                    let mut sibling = self.arena.sibling(parent, current);
                    if self.arena.is_red(sibling) {
                        // The parent is a 3-node; one rotation flips the red
                        // link so the sibling below is guaranteed black
                        debug_assert!(!self.arena.is_red(parent));
                        if self.arena.right(parent) == sibling {
                            self.arena.rotate_left(parent);
                        } else {
                            self.arena.rotate_right(parent);
                        }
                        self.arena.color_red(parent);
                        self.arena.color_black(sibling);
                        self.replace_child_or_root(grandparent, parent, sibling);
                        grandparent = sibling;
                        if parent == matched {
                            parent_of_match = sibling;
                        }
                        sibling = self.arena.sibling(parent, current);
                    }
                    debug_assert!(!sibling.is_nil() && !self.arena.is_red(sibling));
                    if self.arena.is_two_node(sibling) {
                        self.arena.merge_two_nodes(parent);
                    } else {
                        // The sibling is a 3- or 4-node: borrow from it so
                        // `current` can be recolored red
                        let rotation = self.arena.removal_rotation(parent, current, sibling);
                        let new_grandparent = self.arena.rotate(parent, rotation);
                        let parent_color = self.arena.color(parent);
                        self.arena.set_color(new_grandparent, parent_color);
                        self.arena.color_black(parent);
                        self.arena.color_red(current);
                        self.replace_child_or_root(grandparent, parent, new_grandparent);
                        if parent == matched {
                            parent_of_match = new_grandparent;
                        }
                    }
                }
            }
            // After the match, keep left to land on the in-order successor
            let order = if found {
                Ordering::Less
            } else {
                target.cmp(&self.arena, current)
            };
            if order == Ordering::Equal {
                found = true;
                matched = current;
                parent_of_match = parent;
            }
            grandparent = parent;
            parent = current;
            current = match order {
                Ordering::Less => self.arena.left(current),
                Ordering::Equal => self.arena.right(current),
                Ordering::Greater => {
                    target.descend_right(&self.arena, current);
                    self.arena.right(current)
                }
            };
        }
        let removed = if !matched.is_nil() {
            self.replace_node(matched, parent_of_match, parent, grandparent);
            self.size -= 1;
            Some(self.arena.take_item(matched))
        } else {
            None
        };
        if !self.root.is_nil() {
            self.arena.color_black(self.root);
        }
        removed
    }

    /// Splice the matched node out, re-linking its in-order successor into
    /// its place (never copying payloads between live nodes)
    fn replace_node(
        &mut self,
        matched: NodeId,
        parent_of_match: NodeId,
        mut successor: NodeId,
        parent_of_successor: NodeId,
    ) {
        if successor == matched {
            // No successor: the matched node's right child is absent
            debug_assert!(self.arena.right(matched).is_nil());
            successor = self.arena.left(matched);
        } else {
            debug_assert!(!parent_of_successor.is_nil());
            debug_assert!(self.arena.left(successor).is_nil());
            let successor_right = self.arena.right(successor);
            if !successor_right.is_nil() {
                self.arena.color_black(successor_right);
            }
            if parent_of_successor != matched {
                // Detach the successor, handing its right child to the
                // parent it leaves behind
                self.arena.set_left(parent_of_successor, successor_right);
                let matched_right = self.arena.right(matched);
                self.arena.set_right(successor, matched_right);
                self.arena.fix_up(parent_of_successor);
            }
            let matched_left = self.arena.left(matched);
            self.arena.set_left(successor, matched_left);
        }
        if !successor.is_nil() {
            let color = self.arena.color(matched);
            self.arena.set_color(successor, color);
        }
        self.replace_child_or_root(parent_of_match, matched, successor);
    }

    // =========================================================================
    // Bulk construction
    // =========================================================================

    /// O(n) balanced build from an ordered slice, replacing the current
    /// contents; recycled slots are reused first
    pub(crate) fn rebuild_from_sorted(&mut self, items: &[T]) {
        if !self.root.is_nil() {
            self.arena.recycle_subtree(self.root);
            self.root = NIL;
        }
        self.root = Self::construct(&mut self.arena, items, NIL);
        self.size = items.len();
        self.version += 1;
    }

    /// Recursive midpoint construction. An even half saves its right-middle
    /// element as a red node threaded down to the leftmost position of the
    /// right branch, which keeps every path within red-black depth bounds.
    fn construct(arena: &mut NodeArena<T>, items: &[T], red: NodeId) -> NodeId {
        match items.len() {
            0 => {
                debug_assert!(red.is_nil());
                NIL
            }
            1 => {
                let root = arena.alloc(items[0].clone(), Color::Black);
                if !red.is_nil() {
                    arena.set_left(root, red);
                }
                root
            }
            2 => {
                let root = arena.alloc(items[0].clone(), Color::Black);
                let right = arena.alloc(items[1].clone(), Color::Red);
                arena.set_right(root, right);
                if !red.is_nil() {
                    arena.set_left(root, red);
                }
                root
            }
            3 => {
                let root = arena.alloc(items[1].clone(), Color::Black);
                let left = arena.alloc(items[0].clone(), Color::Black);
                let right = arena.alloc(items[2].clone(), Color::Black);
                arena.set_left(root, left);
                arena.set_right(root, right);
                if !red.is_nil() {
                    arena.set_left(left, red);
                }
                root
            }
            len => {
                let mid = (len - 1) / 2;
                let root = arena.alloc(items[mid].clone(), Color::Black);
                let left = Self::construct(arena, &items[..mid], red);
                arena.set_left(root, left);
                let right = if len % 2 == 0 {
                    let carry = arena.alloc(items[mid + 1].clone(), Color::Red);
                    Self::construct(arena, &items[mid + 2..], carry)
                } else {
                    Self::construct(arena, &items[mid + 1..], NIL)
                };
                arena.set_right(root, right);
                root
            }
        }
    }

    // =========================================================================
    // Prefix-sum & rank queries
    // =========================================================================

    /// Sum of the values of every element ordered strictly before the
    /// target, plus the target's own value (zero when absent)
    pub(crate) fn left_values_sum<S: SearchTarget<T>>(&self, mut target: S) -> (T::Weight, T::Weight) {
        let mut current = self.root;
        let mut sum = T::Weight::zero();
        while !current.is_nil() {
            match target.cmp(&self.arena, current) {
                Ordering::Equal => {
                    self.arena.add_sum_of(self.arena.left(current), &mut sum);
                    return (sum, self.arena.item(current).weight().clone());
                }
                Ordering::Less => current = self.arena.left(current),
                Ordering::Greater => {
                    self.arena.add_sum_of(self.arena.left(current), &mut sum);
                    sum.add_assign(self.arena.item(current).weight());
                    target.descend_right(&self.arena, current);
                    current = self.arena.right(current);
                }
            }
        }
        (sum, T::Weight::zero())
    }

    /// Binary search by aggregate sum: the greatest rank whose inclusive
    /// prefix sum does not exceed `target`, plus the budget left after
    /// covering it. `None` when even rank 0 exceeds the target; `len` when
    /// the target covers the whole tree.
    pub(crate) fn index_of_not_greater_sum(&self, target: &T::Weight) -> (Option<usize>, T::Weight) {
        let total = self.values_sum();
        if *target >= total {
            let mut leftover = target.clone();
            leftover.sub_assign(&total);
            return (Some(self.size), leftover);
        }
        let mut remaining = target.clone();
        let mut index = 0usize;
        let mut current = self.root;
        while !current.is_nil() {
            let left = self.arena.left(current);
            let left_sum = self.arena.sum_of(left);
            if remaining < left_sum {
                current = left;
                continue;
            }
            let mut threshold = left_sum.clone();
            threshold.add_assign(self.arena.item(current).weight());
            if remaining < threshold {
                // The current element does not fit; the answer is its
                // in-order predecessor
                let rank = index + self.arena.leaves(left) as usize;
                remaining.sub_assign(&left_sum);
                return if rank == 0 {
                    (None, remaining)
                } else {
                    (Some(rank - 1), remaining)
                };
            }
            remaining.sub_assign(&threshold);
            index += self.arena.leaves(left) as usize + 1;
            current = self.arena.right(current);
        }
        if index == 0 {
            (None, remaining)
        } else {
            (Some(index - 1), remaining)
        }
    }

    // =========================================================================
    // Walks
    // =========================================================================

    /// Node ids in left-to-right breadth-first order
    pub(crate) fn breadth_first(&self) -> Vec<NodeId> {
        let mut queue = Vec::with_capacity(self.size);
        if !self.root.is_nil() {
            queue.push(self.root);
        }
        let mut head = 0;
        while head < queue.len() {
            let id = queue[head];
            head += 1;
            let left = self.arena.left(id);
            if !left.is_nil() {
                queue.push(left);
            }
            let right = self.arena.right(id);
            if !right.is_nil() {
                queue.push(right);
            }
        }
        queue
    }

    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter::new(self, false, self.size)
    }

    pub(crate) fn iter_rev(&self) -> Iter<'_, T> {
        Iter::new(self, true, self.size)
    }

    /// Forward in-order iteration over `count` elements starting at `rank`
    pub(crate) fn iter_range(&self, rank: usize, count: usize) -> Iter<'_, T> {
        let mut iter = Iter {
            tree: self,
            stack: SmallVec::new(),
            remaining: count,
            reverse: false,
        };
        let mut current = self.root;
        let mut rank = rank;
        while !current.is_nil() {
            let left_leaves = self.arena.left_leaves(current) as usize;
            match rank.cmp(&left_leaves) {
                Ordering::Less => {
                    iter.stack.push(current);
                    current = self.arena.left(current);
                }
                Ordering::Equal => {
                    iter.stack.push(current);
                    break;
                }
                Ordering::Greater => {
                    rank -= left_leaves + 1;
                    current = self.arena.right(current);
                }
            }
        }
        iter
    }

    /// Tree height in nodes (0 for the empty tree)
    pub(crate) fn height(&self) -> usize {
        fn depth<T: Item>(tree: &CoreTree<T>, id: NodeId) -> usize {
            if id.is_nil() {
                0
            } else {
                1 + depth(tree, tree.arena.left(id)).max(depth(tree, tree.arena.right(id)))
            }
        }
        depth(self, self.root)
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Invariant check for debugging and tests: recomputes every aggregate
    /// and red-black property from scratch and aborts on the first
    /// mismatch. Any failure here is a balancing-logic bug, never a
    /// runtime condition.
    pub(crate) fn verify(&self) {
        if self.root.is_nil() {
            assert_eq!(self.size, 0, "empty tree with nonzero size");
            return;
        }
        assert!(!self.arena.is_red(self.root), "root must be black");
        assert!(
            self.arena.parent(self.root).is_nil(),
            "root must have no parent"
        );
        let (_, leaves, _) = self.verify_node(self.root);
        assert_eq!(self.size, leaves as usize, "size does not match leaf count");
    }

    fn verify_node(&self, id: NodeId) -> (u32, u32, T::Weight) {
        let node = self.arena.node(id);
        if self.arena.is_red(id) {
            assert!(
                !self.arena.is_red(node.left) && !self.arena.is_red(node.right),
                "red node with a red child"
            );
        }
        let (left_height, left_leaves, left_sum) = if node.left.is_nil() {
            (1, 0, T::Weight::zero())
        } else {
            assert_eq!(self.arena.parent(node.left), id, "left child parent link");
            self.verify_node(node.left)
        };
        let (right_height, right_leaves, right_sum) = if node.right.is_nil() {
            (1, 0, T::Weight::zero())
        } else {
            assert_eq!(self.arena.parent(node.right), id, "right child parent link");
            self.verify_node(node.right)
        };
        assert_eq!(left_height, right_height, "unequal black heights");
        assert_eq!(
            node.leaves,
            left_leaves + right_leaves + 1,
            "cached leaf count diverged"
        );
        let mut sum = left_sum;
        sum.add_assign(&right_sum);
        sum.add_assign(node.item.weight());
        assert!(sum == node.sum, "cached value sum diverged");
        let black = if self.arena.is_red(id) { 0 } else { 1 };
        (left_height + black, node.leaves, sum)
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Borrowing in-order iterator; the borrow rules out structural mutation
/// for its whole lifetime, so no version checking is needed
pub(crate) struct Iter<'a, T: Item> {
    tree: &'a CoreTree<T>,
    stack: WalkStack,
    remaining: usize,
    reverse: bool,
}

impl<'a, T: Item> Iter<'a, T> {
    fn new(tree: &'a CoreTree<T>, reverse: bool, count: usize) -> Self {
        let mut iter = Self {
            tree,
            stack: SmallVec::new(),
            remaining: count,
            reverse,
        };
        iter.push_spine(tree.root);
        iter
    }

    fn push_spine(&mut self, mut node: NodeId) {
        while !node.is_nil() {
            self.stack.push(node);
            node = if self.reverse {
                self.tree.arena.right(node)
            } else {
                self.tree.arena.left(node)
            };
        }
    }
}

impl<'a, T: Item> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.stack.pop()?;
        self.remaining -= 1;
        let follow = if self.reverse {
            self.tree.arena.left(node)
        } else {
            self.tree.arena.right(node)
        };
        self.push_spine(follow);
        Some(self.tree.arena.item(node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Detached in-order cursor. Unlike [`Iter`] it holds no borrow, so the
/// tree can be mutated while it exists — the first advance afterwards
/// reports [`Error::ConcurrentModification`] instead of yielding stale
/// nodes.
pub(crate) struct CoreCursor {
    stack: WalkStack,
    version: u64,
    owner: u64,
    reverse: bool,
}

impl CoreCursor {
    pub(crate) fn new<T: Item>(tree: &CoreTree<T>, owner: u64, reverse: bool) -> Self {
        let mut cursor = Self {
            stack: SmallVec::new(),
            version: tree.version,
            owner,
            reverse,
        };
        cursor.push_spine(tree, tree.root);
        cursor
    }

    fn push_spine<T: Item>(&mut self, tree: &CoreTree<T>, mut node: NodeId) {
        while !node.is_nil() {
            self.stack.push(node);
            node = if self.reverse {
                tree.arena.right(node)
            } else {
                tree.arena.left(node)
            };
        }
    }

    pub(crate) fn next<'a, T: Item>(
        &mut self,
        tree: &'a CoreTree<T>,
        owner: u64,
    ) -> Result<Option<&'a T>> {
        if owner != self.owner {
            return Err(Error::ForeignView);
        }
        if tree.version != self.version {
            return Err(Error::ConcurrentModification);
        }
        let node = match self.stack.pop() {
            Some(node) => node,
            None => return Ok(None),
        };
        let follow = if self.reverse {
            tree.arena.left(node)
        } else {
            tree.arena.right(node)
        };
        self.push_spine(tree, follow);
        Ok(Some(tree.arena.item(node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank_tree(values: &[i64]) -> CoreTree<i64> {
        let mut tree = CoreTree::new();
        for (i, &v) in values.iter().enumerate() {
            assert!(tree.insert(ByRank::new(i), v));
            tree.verify();
        }
        tree
    }

    fn contents(tree: &CoreTree<i64>) -> Vec<i64> {
        tree.iter().copied().collect()
    }

    #[test]
    fn test_insert_at_front() {
        let mut tree = CoreTree::new();
        for &v in &[5i64, 3, 8, 1] {
            assert!(tree.insert(ByRank::new(0), v));
            tree.verify();
        }
        assert_eq!(contents(&tree), vec![1, 8, 3, 5]);
        assert_eq!(tree.values_sum(), 17);
    }

    #[test]
    fn test_insert_append_and_middle() {
        let mut tree = rank_tree(&[1, 2, 3, 4, 5]);
        assert!(tree.insert(ByRank::new(2), 99));
        tree.verify();
        assert_eq!(contents(&tree), vec![1, 2, 99, 3, 4, 5]);
        assert_eq!(tree.values_sum(), 114);
    }

    #[test]
    fn test_remove_each_position() {
        for victim in 0..7usize {
            let mut tree = rank_tree(&[10, 20, 30, 40, 50, 60, 70]);
            let removed = tree.remove(ByRank::new(victim));
            tree.verify();
            assert_eq!(removed, Some((victim as i64 + 1) * 10));
            let mut expect: Vec<i64> = (1..=7).map(|x| x * 10).collect();
            expect.remove(victim);
            assert_eq!(contents(&tree), expect);
        }
    }

    #[test]
    fn test_remove_until_empty() {
        let mut tree = rank_tree(&(1..=64i64).collect::<Vec<_>>());
        for remaining in (0..64usize).rev() {
            assert!(tree.remove(ByRank::new(0)).is_some());
            tree.verify();
            assert_eq!(tree.len(), remaining);
        }
        assert!(tree.root.is_nil());
        assert_eq!(tree.values_sum(), 0);
    }

    #[test]
    fn test_many_front_inserts_stay_balanced() {
        let mut tree = CoreTree::new();
        for v in 0..1_000i64 {
            assert!(tree.insert(ByRank::new(0), v + 1));
        }
        tree.verify();
        // Max red-black height is 2*log2(n+1)
        assert!(tree.height() <= 20, "height {} too large", tree.height());
    }

    #[test]
    fn test_bulk_build_round_trip() {
        for n in [0usize, 1, 2, 3, 4, 7, 8, 100, 1000] {
            let values: Vec<i64> = (1..=n as i64).collect();
            let mut tree = CoreTree::new();
            tree.rebuild_from_sorted(&values);
            tree.verify();
            assert_eq!(contents(&tree), values);
        }
    }

    #[test]
    fn test_bulk_build_reuses_pool() {
        let mut tree = CoreTree::new();
        tree.rebuild_from_sorted(&(1..=100i64).collect::<Vec<_>>());
        tree.clear();
        assert_eq!(tree.arena.pooled(), 100);
        tree.rebuild_from_sorted(&(1..=50i64).collect::<Vec<_>>());
        tree.verify();
        assert_eq!(tree.arena.pooled(), 50);
    }

    #[test]
    fn test_left_values_sum() {
        let tree = rank_tree(&[4, 6, 2, 8]);
        assert_eq!(tree.left_values_sum(ByRank::new(0)), (0, 4));
        assert_eq!(tree.left_values_sum(ByRank::new(2)), (10, 2));
        assert_eq!(tree.left_values_sum(ByRank::new(3)), (12, 8));
        // One past the end: total sum, absent value reads as zero
        assert_eq!(tree.left_values_sum(ByRank::new(4)), (20, 0));
    }

    #[test]
    fn test_index_of_not_greater_sum() {
        // Prefix sums: 1, 9, 12, 17
        let mut tree = CoreTree::new();
        for &v in &[5i64, 3, 8, 1] {
            tree.insert(ByRank::new(0), v);
        }
        assert_eq!(tree.index_of_not_greater_sum(&9), (Some(1), 0));
        assert_eq!(tree.index_of_not_greater_sum(&10), (Some(1), 1));
        assert_eq!(tree.index_of_not_greater_sum(&0), (None, 0));
        assert_eq!(tree.index_of_not_greater_sum(&16), (Some(2), 4));
        assert_eq!(tree.index_of_not_greater_sum(&17), (Some(4), 0));
        assert_eq!(tree.index_of_not_greater_sum(&40), (Some(4), 23));
    }

    #[test]
    fn test_iteration_directions() {
        let tree = rank_tree(&[1, 2, 3, 4, 5]);
        assert_eq!(contents(&tree), vec![1, 2, 3, 4, 5]);
        let rev: Vec<i64> = tree.iter_rev().copied().collect();
        assert_eq!(rev, vec![5, 4, 3, 2, 1]);
        let mid: Vec<i64> = tree.iter_range(1, 3).copied().collect();
        assert_eq!(mid, vec![2, 3, 4]);
    }

    #[test]
    fn test_cursor_detects_mutation() {
        let mut tree = rank_tree(&[1, 2, 3]);
        let mut cursor = CoreCursor::new(&tree, 7, false);
        assert_eq!(cursor.next(&tree, 7).unwrap(), Some(&1));
        tree.insert(ByRank::new(0), 9);
        assert_eq!(
            cursor.next(&tree, 7),
            Err(Error::ConcurrentModification)
        );
        // The tree itself is intact
        tree.verify();
        assert_eq!(contents(&tree), vec![9, 1, 2, 3]);
    }

    #[test]
    fn test_breadth_first_covers_all_nodes() {
        let tree = rank_tree(&[1, 2, 3, 4, 5, 6, 7]);
        let order = tree.breadth_first();
        assert_eq!(order.len(), 7);
        assert_eq!(order[0], tree.root);
    }

    #[test]
    fn test_random_insert_remove_torture() {
        let mut tree = CoreTree::new();
        let mut model: Vec<i64> = Vec::new();
        // Multiplicative pseudo-random sequence, deterministic
        for i in 0..500i64 {
            let r = (i * 7919 + 13) % 1000;
            if r % 3 != 0 || model.is_empty() {
                let at = (r as usize) % (model.len() + 1);
                let value = r + 1;
                assert!(tree.insert(ByRank::new(at), value));
                model.insert(at, value);
            } else {
                let at = (r as usize) % model.len();
                let removed = tree.remove(ByRank::new(at));
                assert_eq!(removed, Some(model.remove(at)));
            }
            tree.verify();
            assert_eq!(tree.len(), model.len());
            assert_eq!(tree.values_sum(), model.iter().sum::<i64>());
        }
        assert_eq!(contents(&tree), model);
    }
}
