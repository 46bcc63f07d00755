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

//! Node arena for the augmented red-black tree
//!
//! Nodes live in a `Vec`-backed arena; links are plain `u32` indices with a
//! `NIL` sentinel, so the parent back-reference carries no ownership and the
//! classic parent/child reference cycle disappears. Removed slots go onto a
//! free-index list and are reconstructed in place on the next allocation —
//! the arena is its own node pool. Pool exhaustion is not a condition: an
//! empty free list just grows the slot vector.
//!
//! Every child reassignment goes through [`NodeArena::set_left`] /
//! [`NodeArena::set_right`], which detach a stale parent link, apply the
//! leaf-count and value-sum delta between the outgoing and incoming child,
//! and ripple that delta up the parent chain to the root. Rotations are
//! built purely from these setters and never touch an aggregate directly.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::numeric::Numeric;

/// Node color in the red-black tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    Black,
}

/// Index of a node in the arena. `NIL` is the absent-child sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(u32);

/// The absent-node sentinel
pub(crate) const NIL: NodeId = NodeId(u32::MAX);

impl NodeId {
    #[inline]
    pub(crate) fn is_nil(self) -> bool {
        self == NIL
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Rotation shape applied while borrowing from a sibling during removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rotation {
    Left,
    Right,
    LeftRight,
    RightLeft,
}

/// Payload stored in a node: a weight plus whatever identifies the element
/// (nothing for rank-keyed lists, a key for key-ordered sets).
pub(crate) trait Item: Clone {
    type Weight: Numeric;

    /// The value this element contributes to every enclosing subtree sum
    fn weight(&self) -> &Self::Weight;

    /// Replace the contributed value in place
    fn set_weight(&mut self, weight: Self::Weight);
}

/// A tree node: payload, color, child/parent links, and the two subtree
/// aggregates (leaf count and value sum) every structural mutation keeps
/// correct incrementally.
#[derive(Clone)]
pub(crate) struct Node<T: Item> {
    pub(crate) item: T,
    pub(crate) color: Color,
    pub(crate) left: NodeId,
    pub(crate) right: NodeId,
    pub(crate) parent: NodeId,
    pub(crate) leaves: u32,
    pub(crate) sum: T::Weight,
}

/// Slot vector plus free-index list
#[derive(Clone)]
pub(crate) struct NodeArena<T: Item> {
    slots: Vec<Node<T>>,
    free: Vec<u32>,
}

impl<T: Item> NodeArena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node<T> {
        &self.slots[id.index()]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.slots[id.index()]
    }

    #[inline]
    pub(crate) fn item(&self, id: NodeId) -> &T {
        &self.node(id).item
    }

    #[inline]
    pub(crate) fn left(&self, id: NodeId) -> NodeId {
        self.node(id).left
    }

    #[inline]
    pub(crate) fn right(&self, id: NodeId) -> NodeId {
        self.node(id).right
    }

    #[inline]
    pub(crate) fn parent(&self, id: NodeId) -> NodeId {
        self.node(id).parent
    }

    /// Subtree leaf count, zero for `NIL`
    #[inline]
    pub(crate) fn leaves(&self, id: NodeId) -> u32 {
        if id.is_nil() {
            0
        } else {
            self.node(id).leaves
        }
    }

    /// Leaf count of `id`'s left subtree — the derived rank of `id` within
    /// its own subtree
    #[inline]
    pub(crate) fn left_leaves(&self, id: NodeId) -> u32 {
        self.leaves(self.node(id).left)
    }

    /// Add the subtree sum of `id` (nothing for `NIL`) into `acc`
    #[inline]
    pub(crate) fn add_sum_of(&self, id: NodeId, acc: &mut T::Weight) {
        if !id.is_nil() {
            acc.add_assign(&self.node(id).sum);
        }
    }

    /// Subtree sum of `id`, zero for `NIL`
    pub(crate) fn sum_of(&self, id: NodeId) -> T::Weight {
        if id.is_nil() {
            T::Weight::zero()
        } else {
            self.node(id).sum.clone()
        }
    }

    #[inline]
    pub(crate) fn is_red(&self, id: NodeId) -> bool {
        !id.is_nil() && self.node(id).color == Color::Red
    }

    #[inline]
    pub(crate) fn is_null_or_black(&self, id: NodeId) -> bool {
        !self.is_red(id)
    }

    #[inline]
    pub(crate) fn color(&self, id: NodeId) -> Color {
        self.node(id).color
    }

    #[inline]
    pub(crate) fn set_color(&mut self, id: NodeId, color: Color) {
        self.node_mut(id).color = color;
    }

    #[inline]
    pub(crate) fn color_red(&mut self, id: NodeId) {
        self.set_color(id, Color::Red);
    }

    #[inline]
    pub(crate) fn color_black(&mut self, id: NodeId) {
        self.set_color(id, Color::Black);
    }

    /// A conceptual 2-node: black with no red child
    pub(crate) fn is_two_node(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.color == Color::Black
            && self.is_null_or_black(node.left)
            && self.is_null_or_black(node.right)
    }

    /// A conceptual 4-node: both children red
    pub(crate) fn is_four_node(&self, id: NodeId) -> bool {
        let node = self.node(id);
        self.is_red(node.left) && self.is_red(node.right)
    }

    /// Pop a recycled slot and reconstruct it as a fresh leaf, or grow the
    /// slot vector
    pub(crate) fn alloc(&mut self, item: T, color: Color) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let node = &mut self.slots[index as usize];
                node.sum.set_from(item.weight());
                node.item = item;
                node.color = color;
                node.left = NIL;
                node.right = NIL;
                node.parent = NIL;
                node.leaves = 1;
                NodeId(index)
            }
            None => {
                let sum = item.weight().clone();
                self.slots.push(Node {
                    item,
                    color,
                    left: NIL,
                    right: NIL,
                    parent: NIL,
                    leaves: 1,
                    sum,
                });
                NodeId(self.slots.len() as u32 - 1)
            }
        }
    }

    /// Recycle a single detached node, handing back its payload
    pub(crate) fn take_item(&mut self, id: NodeId) -> T {
        let item = self.node(id).item.clone();
        self.free.push(id.0);
        item
    }

    /// Recycle an entire detached subtree
    pub(crate) fn recycle_subtree(&mut self, root: NodeId) {
        let mut stack: SmallVec<[NodeId; 32]> = SmallVec::new();
        if !root.is_nil() {
            stack.push(root);
        }
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            let (left, right) = (node.left, node.right);
            if !left.is_nil() {
                stack.push(left);
            }
            if !right.is_nil() {
                stack.push(right);
            }
            self.free.push(id.0);
        }
    }

    /// Number of slots currently on the free list
    #[cfg(test)]
    pub(crate) fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Apply a leaf-count/value-sum delta from `id` up to the root
    fn propagate(&mut self, mut id: NodeId, leaves_delta: i64, sum_delta: &T::Weight) {
        let unchanged = leaves_delta == 0 && sum_delta.is_zero();
        if unchanged {
            return;
        }
        while !id.is_nil() {
            let node = &mut self.slots[id.index()];
            debug_assert!(node.leaves as i64 + leaves_delta >= 1);
            node.leaves = (node.leaves as i64 + leaves_delta) as u32;
            node.sum.add_assign(sum_delta);
            id = node.parent;
        }
    }

    /// Reassign the left child of `id`, detaching the previous child's
    /// stale parent link and rippling the aggregate delta to the root
    pub(crate) fn set_left(&mut self, id: NodeId, child: NodeId) {
        let old = self.node(id).left;
        if old == child {
            return;
        }
        if !old.is_nil() && self.node(old).parent != child {
            self.node_mut(old).parent = NIL;
        }
        let leaves_delta = self.leaves(child) as i64 - self.leaves(old) as i64;
        let mut sum_delta = self.sum_of(child);
        if !old.is_nil() {
            sum_delta.sub_assign(&self.node(old).sum);
        }
        self.propagate(id, leaves_delta, &sum_delta);
        self.node_mut(id).left = child;
        if !child.is_nil() {
            self.node_mut(child).parent = id;
        }
    }

    /// Reassign the right child of `id`; mirror of [`Self::set_left`]
    pub(crate) fn set_right(&mut self, id: NodeId, child: NodeId) {
        let old = self.node(id).right;
        if old == child {
            return;
        }
        if !old.is_nil() && self.node(old).parent != child {
            self.node_mut(old).parent = NIL;
        }
        let leaves_delta = self.leaves(child) as i64 - self.leaves(old) as i64;
        let mut sum_delta = self.sum_of(child);
        if !old.is_nil() {
            sum_delta.sub_assign(&self.node(old).sum);
        }
        self.propagate(id, leaves_delta, &sum_delta);
        self.node_mut(id).right = child;
        if !child.is_nil() {
            self.node_mut(child).parent = id;
        }
    }

    /// Change a node's contributed value in place, rippling the sum delta
    /// to the root; leaf counts are untouched
    pub(crate) fn update_weight(&mut self, id: NodeId, value: T::Weight) {
        let mut delta = value.clone();
        delta.sub_assign(self.node(id).item.weight());
        self.node_mut(id).item.set_weight(value);
        self.propagate(id, 0, &delta);
    }

    /// Swap `child` for `new_child` under `id` (whichever side it is on)
    pub(crate) fn replace_child(&mut self, id: NodeId, child: NodeId, new_child: NodeId) {
        if self.node(id).left == child {
            self.set_left(id, new_child);
        } else if self.node(id).right == child {
            self.set_right(id, new_child);
        }
    }

    /// Drop `id` out of its parent's child links (aggregates adjust)
    pub(crate) fn isolate(&mut self, id: NodeId) {
        let parent = self.node(id).parent;
        if parent.is_nil() {
            return;
        }
        if self.node(parent).left == id {
            self.set_left(parent, NIL);
        }
        if self.node(parent).right == id {
            self.set_right(parent, NIL);
        }
    }

    /// Re-point both children's parent links at `id`
    pub(crate) fn fix_up(&mut self, id: NodeId) {
        let left = self.node(id).left;
        if !left.is_nil() {
            self.node_mut(left).parent = id;
        }
        let right = self.node(id).right;
        if !right.is_nil() {
            self.node_mut(right).parent = id;
        }
    }

    /// The other child of `parent`
    pub(crate) fn sibling(&self, parent: NodeId, child: NodeId) -> NodeId {
        let node = self.node(parent);
        debug_assert!((node.left == child) ^ (node.right == child));
        if node.left == child {
            node.right
        } else {
            node.left
        }
    }

    /// Left rotation: `id` becomes the left child of its right child. The
    /// rotated subtree is re-pointed into whichever side of the old parent
    /// it occupied; the caller handles the tree-root case.
    pub(crate) fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let child = self.node(id).right;
        let parent = self.node(id).parent;
        let was_right = !parent.is_nil() && self.node(parent).right == id;
        let grandchild = self.node(child).left;
        self.set_right(id, grandchild);
        self.set_left(child, id);
        if !parent.is_nil() {
            if was_right {
                self.set_right(parent, child);
            } else {
                self.set_left(parent, child);
            }
        }
        child
    }

    /// Right rotation: mirror of [`Self::rotate_left`]
    pub(crate) fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let child = self.node(id).left;
        let parent = self.node(id).parent;
        let was_right = !parent.is_nil() && self.node(parent).right == id;
        let grandchild = self.node(child).right;
        self.set_left(id, grandchild);
        self.set_right(child, id);
        if !parent.is_nil() {
            if was_right {
                self.set_right(parent, child);
            } else {
                self.set_left(parent, child);
            }
        }
        child
    }

    /// Left-right double rotation: the left child rotates left, then `id`
    /// rotates right; the left grandchild ends up on top
    pub(crate) fn rotate_left_right(&mut self, id: NodeId) -> NodeId {
        let child = self.node(id).left;
        let grandchild = self.node(child).right;
        let parent = self.node(id).parent;
        let was_right = !parent.is_nil() && self.node(parent).right == id;
        let moved = self.node(grandchild).right;
        self.set_left(id, moved);
        self.set_right(grandchild, id);
        let moved = self.node(grandchild).left;
        self.set_right(child, moved);
        self.set_left(grandchild, child);
        if !parent.is_nil() {
            if was_right {
                self.set_right(parent, grandchild);
            } else {
                self.set_left(parent, grandchild);
            }
        }
        grandchild
    }

    /// Right-left double rotation: mirror of [`Self::rotate_left_right`]
    pub(crate) fn rotate_right_left(&mut self, id: NodeId) -> NodeId {
        let child = self.node(id).right;
        let grandchild = self.node(child).left;
        let parent = self.node(id).parent;
        let was_right = !parent.is_nil() && self.node(parent).right == id;
        let moved = self.node(grandchild).left;
        self.set_right(id, moved);
        self.set_left(grandchild, id);
        let moved = self.node(grandchild).right;
        self.set_left(child, moved);
        self.set_right(grandchild, child);
        if !parent.is_nil() {
            if was_right {
                self.set_right(parent, grandchild);
            } else {
                self.set_left(parent, grandchild);
            }
        }
        grandchild
    }

    /// Split a 4-node into two 2-nodes during the insertion descent
    pub(crate) fn split_four_node(&mut self, id: NodeId) {
        let node = self.node(id);
        let (left, right) = (node.left, node.right);
        debug_assert!(!left.is_nil() && !right.is_nil());
        self.color_red(id);
        self.color_black(left);
        self.color_black(right);
    }

    /// Combine a red parent and its two black 2-node children into a
    /// 4-node during the removal descent
    pub(crate) fn merge_two_nodes(&mut self, id: NodeId) {
        let node = self.node(id);
        debug_assert!(node.color == Color::Red);
        let (left, right) = (node.left, node.right);
        debug_assert!(self.is_two_node(left) && self.is_two_node(right));
        self.color_black(id);
        self.color_red(left);
        self.color_red(right);
    }

    /// The rotation shape that borrows a node from `sibling` so `current`
    /// can be recolored red during the removal descent. `id` is the parent
    /// of both.
    pub(crate) fn removal_rotation(
        &self,
        id: NodeId,
        current: NodeId,
        sibling: NodeId,
    ) -> Rotation {
        let node = self.node(sibling);
        debug_assert!(self.is_red(node.left) || self.is_red(node.right));
        let current_is_left = self.node(id).left == current;
        if self.is_red(node.left) {
            if current_is_left {
                Rotation::RightLeft
            } else {
                Rotation::Right
            }
        } else if current_is_left {
            Rotation::Left
        } else {
            Rotation::LeftRight
        }
    }

    /// Perform a removal rotation on `id`; the single-rotation shapes also
    /// recolor the far red grandchild black
    pub(crate) fn rotate(&mut self, id: NodeId, rotation: Rotation) -> NodeId {
        match rotation {
            Rotation::Right => {
                let red = self.node(self.node(id).left).left;
                debug_assert!(self.is_red(red));
                self.color_black(red);
                self.rotate_right(id)
            }
            Rotation::Left => {
                let red = self.node(self.node(id).right).right;
                debug_assert!(self.is_red(red));
                self.color_black(red);
                self.rotate_left(id)
            }
            Rotation::RightLeft => self.rotate_right_left(id),
            Rotation::LeftRight => self.rotate_left_right(id),
        }
    }
}

/// How an insertion treats a node comparing equal to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EqualPolicy {
    /// Step left once, then keep right: the new element lands exactly at
    /// the target rank (rank-keyed insert)
    SteerLeft,
    /// An equal key already exists; report failure (key-keyed insert)
    Reject,
}

/// Descent target: how a search goal compares against a node on the path.
/// The rank-keyed target carries a running index that must be adjusted on
/// every step into a right subtree; the key-keyed target is stateless.
pub(crate) trait SearchTarget<T: Item> {
    /// Whether rotations on the descent path invalidate the running state,
    /// forcing the insertion descent to restart from the root after a
    /// 4-node split
    const POSITIONAL: bool;

    /// Insertion behavior on an equal comparison
    const ON_EQUAL: EqualPolicy;

    fn cmp(&self, arena: &NodeArena<T>, node: NodeId) -> Ordering;

    /// The descent is stepping into the right child of `node`
    fn descend_right(&mut self, arena: &NodeArena<T>, node: NodeId);

    /// Restart the descent from the root
    fn reset(&mut self);
}

/// Rank-keyed descent target: compares a running index against each node's
/// left-subtree leaf count
#[derive(Debug, Clone, Copy)]
pub(crate) struct ByRank {
    index: usize,
    start: usize,
}

impl ByRank {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            start: index,
        }
    }
}

impl<T: Item> SearchTarget<T> for ByRank {
    const POSITIONAL: bool = true;
    const ON_EQUAL: EqualPolicy = EqualPolicy::SteerLeft;

    #[inline]
    fn cmp(&self, arena: &NodeArena<T>, node: NodeId) -> Ordering {
        self.index.cmp(&(arena.left_leaves(node) as usize))
    }

    #[inline]
    fn descend_right(&mut self, arena: &NodeArena<T>, node: NodeId) {
        // Saturating: once an insertion has steered past its target rank
        // the residual index no longer matters
        self.index = self
            .index
            .saturating_sub(arena.left_leaves(node) as usize + 1);
    }

    #[inline]
    fn reset(&mut self) {
        self.index = self.start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Item for i64 {
        type Weight = i64;

        fn weight(&self) -> &i64 {
            self
        }

        fn set_weight(&mut self, weight: i64) {
            *self = weight;
        }
    }

    fn leaf(arena: &mut NodeArena<i64>, value: i64, color: Color) -> NodeId {
        arena.alloc(value, color)
    }

    /// Build the three-node tree `b(a, c)` with all links through setters
    fn small_tree(arena: &mut NodeArena<i64>) -> (NodeId, NodeId, NodeId) {
        let b = leaf(arena, 20, Color::Black);
        let a = leaf(arena, 10, Color::Red);
        let c = leaf(arena, 30, Color::Red);
        arena.set_left(b, a);
        arena.set_right(b, c);
        (a, b, c)
    }

    #[test]
    fn test_setters_maintain_aggregates() {
        let mut arena = NodeArena::new();
        let (a, b, c) = small_tree(&mut arena);

        assert_eq!(arena.leaves(b), 3);
        assert_eq!(arena.sum_of(b), 60);
        assert_eq!(arena.parent(a), b);
        assert_eq!(arena.parent(c), b);

        // Detach the left child; aggregates shrink
        arena.set_left(b, NIL);
        assert_eq!(arena.leaves(b), 2);
        assert_eq!(arena.sum_of(b), 50);
        assert!(arena.parent(a).is_nil());
    }

    #[test]
    fn test_delta_ripples_to_root() {
        let mut arena = NodeArena::new();
        let (_, b, c) = small_tree(&mut arena);

        // Hang a new leaf under c: both c and the root see the delta
        let d = leaf(&mut arena, 5, Color::Red);
        arena.set_right(c, d);
        assert_eq!(arena.leaves(c), 2);
        assert_eq!(arena.sum_of(c), 35);
        assert_eq!(arena.leaves(b), 4);
        assert_eq!(arena.sum_of(b), 65);
    }

    #[test]
    fn test_update_weight_ripples() {
        let mut arena = NodeArena::new();
        let (a, b, _) = small_tree(&mut arena);

        arena.update_weight(a, 17);
        assert_eq!(*arena.item(a), 17);
        assert_eq!(arena.sum_of(a), 17);
        assert_eq!(arena.sum_of(b), 67);
        assert_eq!(arena.leaves(b), 3);
    }

    #[test]
    fn test_rotate_left_preserves_aggregates() {
        let mut arena = NodeArena::new();
        let (_, b, c) = small_tree(&mut arena);
        let d = leaf(&mut arena, 5, Color::Black);
        arena.set_right(c, d);

        let new_root = arena.rotate_left(b);
        assert_eq!(new_root, c);
        assert_eq!(arena.left(c), b);
        assert_eq!(arena.right(c), d);
        assert!(arena.parent(c).is_nil());
        assert_eq!(arena.parent(b), c);
        assert_eq!(arena.leaves(c), 4);
        assert_eq!(arena.sum_of(c), 65);
        assert_eq!(arena.leaves(b), 2);
        assert_eq!(arena.sum_of(b), 30);
    }

    #[test]
    fn test_rotate_right_under_parent() {
        let mut arena = NodeArena::new();
        // root(sub(x, _), _) where sub rotates right under root
        let root = leaf(&mut arena, 1, Color::Black);
        let sub = leaf(&mut arena, 2, Color::Black);
        let x = leaf(&mut arena, 3, Color::Red);
        arena.set_left(root, sub);
        arena.set_left(sub, x);

        let top = arena.rotate_right(sub);
        assert_eq!(top, x);
        assert_eq!(arena.left(root), x);
        assert_eq!(arena.parent(x), root);
        assert_eq!(arena.right(x), sub);
        assert_eq!(arena.leaves(root), 3);
        assert_eq!(arena.sum_of(root), 6);
    }

    #[test]
    fn test_double_rotations() {
        let mut arena = NodeArena::new();
        // z(x(_, y), _) — left-right brings y on top
        let z = leaf(&mut arena, 1, Color::Black);
        let x = leaf(&mut arena, 2, Color::Red);
        let y = leaf(&mut arena, 4, Color::Red);
        arena.set_left(z, x);
        arena.set_right(x, y);

        let top = arena.rotate_left_right(z);
        assert_eq!(top, y);
        assert_eq!(arena.left(y), x);
        assert_eq!(arena.right(y), z);
        assert_eq!(arena.leaves(y), 3);
        assert_eq!(arena.sum_of(y), 7);

        // Mirror: z(_, x(y, _)) — right-left brings y on top
        let mut arena = NodeArena::new();
        let z = leaf(&mut arena, 1, Color::Black);
        let x = leaf(&mut arena, 2, Color::Red);
        let y = leaf(&mut arena, 4, Color::Red);
        arena.set_right(z, x);
        arena.set_left(x, y);

        let top = arena.rotate_right_left(z);
        assert_eq!(top, y);
        assert_eq!(arena.left(y), z);
        assert_eq!(arena.right(y), x);
        assert_eq!(arena.sum_of(y), 7);
    }

    #[test]
    fn test_alloc_reuses_recycled_slots() {
        let mut arena: NodeArena<i64> = NodeArena::new();
        let a = arena.alloc(1, Color::Black);
        let b = arena.alloc(2, Color::Red);
        assert_eq!(arena.pooled(), 0);

        arena.take_item(b);
        assert_eq!(arena.pooled(), 1);

        let c = arena.alloc(3, Color::Red);
        assert_eq!(c, b, "freed slot is reconstructed in place");
        assert_eq!(arena.pooled(), 0);
        assert_eq!(*arena.item(c), 3);
        assert_eq!(arena.leaves(c), 1);
        assert_eq!(arena.sum_of(c), 3);
        assert!(arena.left(c).is_nil() && arena.right(c).is_nil());
        let _ = a;
    }

    #[test]
    fn test_recycle_subtree() {
        let mut arena = NodeArena::new();
        let (_, b, c) = small_tree(&mut arena);
        let d = leaf(&mut arena, 5, Color::Red);
        arena.set_right(c, d);

        arena.recycle_subtree(b);
        assert_eq!(arena.pooled(), 4);
    }

    #[test]
    fn test_split_and_merge_recolor() {
        let mut arena = NodeArena::new();
        let (a, b, c) = small_tree(&mut arena);
        assert!(arena.is_four_node(b));

        arena.split_four_node(b);
        assert!(arena.is_red(b));
        assert!(!arena.is_red(a) && !arena.is_red(c));

        arena.merge_two_nodes(b);
        assert!(!arena.is_red(b));
        assert!(arena.is_red(a) && arena.is_red(c));
    }

    #[test]
    fn test_removal_rotation_shapes() {
        let mut arena = NodeArena::new();
        // parent with current on the left and a 3-node sibling on the right
        let parent = leaf(&mut arena, 1, Color::Black);
        let current = leaf(&mut arena, 2, Color::Black);
        let sibling = leaf(&mut arena, 3, Color::Black);
        let nephew = leaf(&mut arena, 4, Color::Red);
        arena.set_left(parent, current);
        arena.set_right(parent, sibling);
        arena.set_right(sibling, nephew);
        assert_eq!(
            arena.removal_rotation(parent, current, sibling),
            Rotation::Left
        );

        // Red nephew on the sibling's inner side instead
        arena.set_right(sibling, NIL);
        arena.set_left(sibling, nephew);
        assert_eq!(
            arena.removal_rotation(parent, current, sibling),
            Rotation::RightLeft
        );
    }
}
