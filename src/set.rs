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

//! Key-ordered weighted set
//!
//! [`SumSet`] combines binary-search-tree set semantics — key lookup,
//! rank queries, union/intersection/difference, subset and superset tests
//! — with the same rank and value-sum augmentation the positional list
//! uses, so "sum of every value with a lesser key" and "greatest rank
//! whose cumulative value fits a budget" are O(log n) too.
//!
//! [`SumSetView`] is a live, range-restricted facade over a set: it shares
//! the parent's nodes and lazily resynchronizes against the parent's
//! version counter on every access, so mutations made through the parent
//! become visible without recreating the view.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Bound, RangeBounds};

use crate::error::{Error, Result};
use crate::numeric::Numeric;
use crate::tree::{
    next_collection_id, ByRank, CoreCursor, CoreTree, EqualPolicy, Item, NodeArena, NodeId,
    SearchTarget, WalkStack, NIL,
};

/// Key-keyed payload: a key plus the value it contributes to subtree sums
#[derive(Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

impl<K: Clone, V: Numeric> Item for Entry<K, V> {
    type Weight = V;

    #[inline]
    fn weight(&self) -> &V {
        &self.value
    }

    #[inline]
    fn set_weight(&mut self, weight: V) {
        self.value = weight;
    }
}

/// Key-ordered descent target. Key comparisons are absolute, so rotations
/// on the path never invalidate the descent, and an equal key on insert
/// means a duplicate to reject.
pub(crate) struct ByKey<Q>(pub(crate) Q);

impl<K, V, Q> SearchTarget<Entry<K, V>> for ByKey<Q>
where
    K: Ord + Clone,
    V: Numeric,
    Q: Borrow<K>,
{
    const POSITIONAL: bool = false;
    const ON_EQUAL: EqualPolicy = EqualPolicy::Reject;

    #[inline]
    fn cmp(&self, arena: &NodeArena<Entry<K, V>>, node: NodeId) -> Ordering {
        self.0.borrow().cmp(&arena.item(node).key)
    }

    #[inline]
    fn descend_right(&mut self, _arena: &NodeArena<Entry<K, V>>, _node: NodeId) {}

    #[inline]
    fn reset(&mut self) {}
}

/// Whether `key` fails the lower bound of a range
fn below_lower<K: Ord>(key: &K, lower: &Bound<K>) -> bool {
    match lower {
        Bound::Unbounded => false,
        Bound::Included(l) => key < l,
        Bound::Excluded(l) => key <= l,
    }
}

/// Whether `key` fails the upper bound of a range
fn above_upper<K: Ord>(key: &K, upper: &Bound<K>) -> bool {
    match upper {
        Bound::Unbounded => false,
        Bound::Included(u) => key > u,
        Bound::Excluded(u) => key >= u,
    }
}

/// Whether `inner` admits no key below `outer` (narrowing check)
fn lower_covers<K: Ord>(outer: &Bound<K>, inner: &Bound<K>) -> bool {
    match (outer, inner) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        (Bound::Included(o), Bound::Included(i)) => i >= o,
        (Bound::Included(o), Bound::Excluded(i)) => i >= o,
        (Bound::Excluded(o), Bound::Included(i)) => i > o,
        (Bound::Excluded(o), Bound::Excluded(i)) => i >= o,
    }
}

/// Whether `inner` admits no key above `outer` (narrowing check)
fn upper_covers<K: Ord>(outer: &Bound<K>, inner: &Bound<K>) -> bool {
    match (outer, inner) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        (Bound::Included(o), Bound::Included(i)) => i <= o,
        (Bound::Included(o), Bound::Excluded(i)) => i <= o,
        (Bound::Excluded(o), Bound::Included(i)) => i < o,
        (Bound::Excluded(o), Bound::Excluded(i)) => i <= o,
    }
}

/// Topmost node whose key falls inside the bounds: the subtree it roots
/// contains every in-range element
fn find_range<K: Ord + Clone, V: Numeric>(
    tree: &CoreTree<Entry<K, V>>,
    lower: &Bound<K>,
    upper: &Bound<K>,
) -> NodeId {
    let mut current = tree.root;
    while !current.is_nil() {
        let key = &tree.arena.item(current).key;
        if below_lower(key, lower) {
            current = tree.arena.right(current);
        } else if above_upper(key, upper) {
            current = tree.arena.left(current);
        } else {
            return current;
        }
    }
    NIL
}

/// A set of `(key, value)` pairs ordered by key, where every subtree
/// tracks its leaf count and value sum.
///
/// # Example
/// ```
/// use sumtree::SumSet;
///
/// let mut set: SumSet<&str, i64> = SumSet::new();
/// assert!(set.try_add("b", 2));
/// assert!(set.try_add("a", 5));
/// assert!(!set.try_add("a", 9)); // duplicate key: rejected, not replaced
///
/// assert_eq!(set.values_sum(), 7);
/// assert_eq!(set.left_values_sum(&"b"), (5, 2));
/// ```
pub struct SumSet<K: Ord + Clone, V: Numeric> {
    tree: CoreTree<Entry<K, V>>,
    id: u64,
}

impl<K: Ord + Clone, V: Numeric> SumSet<K, V> {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            tree: CoreTree::new(),
            id: next_collection_id(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Sum of every stored value, read off the root in O(1)
    pub fn values_sum(&self) -> V {
        self.tree.values_sum()
    }

    /// Insert a pair unless the key is already present; a duplicate key is
    /// a defined no-op answering `false`, never an error
    pub fn try_add(&mut self, key: K, value: V) -> bool {
        let target = ByKey(key.clone());
        self.tree.insert(target, Entry { key, value })
    }

    /// Value stored under `key`
    pub fn try_get_value(&self, key: &K) -> Option<&V> {
        self.tree.get(ByKey(key)).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.try_get_value(key).is_some()
    }

    /// Pair at rank `index` in key order
    pub fn get(&self, index: usize) -> Option<(&K, &V)> {
        self.tree
            .get(ByRank::new(index))
            .map(|entry| (&entry.key, &entry.value))
    }

    /// Rank of `key`, or the rank it would be inserted at
    pub fn rank(&self, key: &K) -> std::result::Result<usize, usize> {
        let mut current = self.tree.root;
        let mut rank = 0usize;
        while !current.is_nil() {
            match key.cmp(&self.tree.arena.item(current).key) {
                Ordering::Equal => {
                    return Ok(rank + self.tree.arena.left_leaves(current) as usize)
                }
                Ordering::Less => current = self.tree.arena.left(current),
                Ordering::Greater => {
                    rank += self.tree.arena.left_leaves(current) as usize + 1;
                    current = self.tree.arena.right(current);
                }
            }
        }
        Err(rank)
    }

    /// Remove the pair under `key`; a missing key is a no-op answering
    /// `false`
    pub fn remove(&mut self, key: &K) -> bool {
        self.tree.remove(ByKey(key)).is_some()
    }

    /// Remove and return the pair at rank `index`
    pub fn remove_at(&mut self, index: usize) -> Result<(K, V)> {
        if index >= self.len() {
            return Err(Error::index_out_of_range(index, self.len()));
        }
        match self.tree.remove(ByRank::new(index)) {
            Some(entry) => Ok((entry.key, entry.value)),
            None => unreachable!("index verified in range"),
        }
    }

    /// Replace the value under `key`, rippling the sum change to the root.
    /// A new value of zero or below removes the pair instead. Answers
    /// whether anything changed.
    pub fn update(&mut self, key: &K, value: V) -> bool {
        if value <= V::zero() {
            return self.remove(key);
        }
        let node = self.tree.find(ByKey(key));
        if node.is_nil() {
            return false;
        }
        self.tree.update_node(node, value);
        true
    }

    /// Add one to the value under `key`, inserting the key with value one
    /// when absent
    pub fn increase(&mut self, key: &K) -> bool {
        let node = self.tree.find(ByKey(key));
        if node.is_nil() {
            return self.try_add(key.clone(), V::one());
        }
        let mut value = self.tree.arena.item(node).value.clone();
        value.add_assign(&V::one());
        self.tree.update_node(node, value);
        true
    }

    /// Subtract one from the value under `key`; reaching zero removes the
    /// pair. Answers `false` when the key is absent.
    pub fn decrease(&mut self, key: &K) -> bool {
        match self.try_get_value(key) {
            Some(current) => {
                let mut value = current.clone();
                value.sub_assign(&V::one());
                self.update(key, value)
            }
            None => false,
        }
    }

    /// Pair with the least key
    pub fn min(&self) -> Option<(&K, &V)> {
        let node = self.tree.min_node();
        if node.is_nil() {
            None
        } else {
            let entry = self.tree.arena.item(node);
            Some((&entry.key, &entry.value))
        }
    }

    /// Pair with the greatest key
    pub fn max(&self) -> Option<(&K, &V)> {
        let node = self.tree.max_node();
        if node.is_nil() {
            None
        } else {
            let entry = self.tree.arena.item(node);
            Some((&entry.key, &entry.value))
        }
    }

    /// Sum of the values of every key ordered before `key`, plus the value
    /// stored under `key` itself (zero when absent)
    pub fn left_values_sum(&self, key: &K) -> (V, V) {
        self.tree.left_values_sum(ByKey(key))
    }

    /// The greatest rank whose inclusive prefix sum does not exceed `sum`,
    /// plus the leftover budget; see
    /// [`SumList::index_of_not_greater_sum`](crate::SumList::index_of_not_greater_sum)
    pub fn index_of_not_greater_sum(&self, sum: &V) -> (Option<usize>, V) {
        self.tree.index_of_not_greater_sum(sum)
    }

    /// Remove every pair; the nodes stay pooled for reuse
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Keep only the pairs the predicate accepts; answers how many were
    /// removed
    pub fn retain<F: FnMut(&K, &V) -> bool>(&mut self, mut keep: F) -> usize {
        let mut doomed: Vec<K> = Vec::new();
        for id in self.tree.breadth_first() {
            let entry = self.tree.arena.item(id);
            if !keep(&entry.key, &entry.value) {
                doomed.push(entry.key.clone());
            }
        }
        for key in doomed.iter().rev() {
            self.remove(key);
        }
        doomed.len()
    }

    /// Forward iteration in key order
    pub fn iter(&self) -> SetIter<'_, K, V> {
        SetIter {
            inner: self.tree.iter(),
        }
    }

    /// Backward iteration
    pub fn iter_rev(&self) -> SetIter<'_, K, V> {
        SetIter {
            inner: self.tree.iter_rev(),
        }
    }

    /// Detached forward cursor; advancing it after any structural mutation
    /// reports [`Error::ConcurrentModification`]
    pub fn cursor(&self) -> SetCursor {
        SetCursor {
            inner: CoreCursor::new(&self.tree, self.id, false),
        }
    }

    /// Detached backward cursor
    pub fn cursor_rev(&self) -> SetCursor {
        SetCursor {
            inner: CoreCursor::new(&self.tree, self.id, true),
        }
    }

    /// A live view of the keys inside `range`. The view holds no borrow;
    /// pass the set back into its methods, and it resynchronizes against
    /// the set's version counter on every access.
    pub fn view_between<R: RangeBounds<K>>(&self, range: R) -> Result<SumSetView<K>> {
        let lower = range.start_bound().cloned();
        let upper = range.end_bound().cloned();
        let inverted = match (&lower, &upper) {
            (
                Bound::Included(l) | Bound::Excluded(l),
                Bound::Included(u) | Bound::Excluded(u),
            ) => l > u,
            _ => false,
        };
        if inverted {
            return Err(Error::InvertedBounds);
        }
        Ok(SumSetView {
            owner: self.id,
            cached_root: find_range(&self.tree, &lower, &upper),
            version: self.tree.version,
            count_version: u64::MAX,
            cached_len: 0,
            lower,
            upper,
        })
    }

    // =========================================================================
    // Set algebra
    // =========================================================================

    /// Add every pair of `other` not already keyed here; on a duplicate
    /// key this set's value wins. A large `other` triggers a sorted-merge
    /// rebuild instead of repeated insertion.
    pub fn union_with(&mut self, other: &SumSet<K, V>) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            let version = self.tree.version;
            self.tree = other.tree.clone();
            self.tree.version = version + 1;
            return;
        }
        if other.len() > self.len() / 2 {
            let mut merged: Vec<Entry<K, V>> = Vec::with_capacity(self.len() + other.len());
            let mut mine = self.tree.iter().peekable();
            let mut theirs = other.tree.iter().peekable();
            loop {
                match (mine.peek(), theirs.peek()) {
                    (Some(m), Some(t)) => match m.key.cmp(&t.key) {
                        Ordering::Less => merged.push((*mine.next().unwrap()).clone()),
                        Ordering::Greater => merged.push((*theirs.next().unwrap()).clone()),
                        Ordering::Equal => {
                            merged.push((*mine.next().unwrap()).clone());
                            theirs.next();
                        }
                    },
                    (Some(_), None) => merged.push((*mine.next().unwrap()).clone()),
                    (None, Some(_)) => merged.push((*theirs.next().unwrap()).clone()),
                    (None, None) => break,
                }
            }
            self.tree.rebuild_from_sorted(&merged);
        } else {
            for (key, value) in other.iter() {
                self.try_add(key.clone(), value.clone());
            }
        }
    }

    /// Keep only the keys also present in `other`, preserving this set's
    /// values; rebuilt from a sorted merge walk
    pub fn intersect_with(&mut self, other: &SumSet<K, V>) {
        if self.is_empty() {
            return;
        }
        if other.is_empty() {
            self.clear();
            return;
        }
        let mut merged: Vec<Entry<K, V>> = Vec::with_capacity(self.len().min(other.len()));
        let mut mine = self.tree.iter().peekable();
        let mut theirs = other.tree.iter().peekable();
        while let (Some(m), Some(t)) = (mine.peek(), theirs.peek()) {
            match m.key.cmp(&t.key) {
                Ordering::Less => {
                    mine.next();
                }
                Ordering::Greater => {
                    theirs.next();
                }
                Ordering::Equal => {
                    merged.push((*mine.next().unwrap()).clone());
                    theirs.next();
                }
            }
        }
        self.tree.rebuild_from_sorted(&merged);
    }

    /// Remove every key present in `other`, skipping the parts of `other`
    /// outside this set's key range
    pub fn except_with(&mut self, other: &SumSet<K, V>) {
        if self.is_empty() || other.is_empty() {
            return;
        }
        let min = self.min().map(|(k, _)| k.clone());
        let max = self.max().map(|(k, _)| k.clone());
        let (min, max) = match (min, max) {
            (Some(min), Some(max)) => (min, max),
            _ => return,
        };
        for (key, _) in other.iter() {
            if *key < min {
                continue;
            }
            if *key > max {
                break;
            }
            self.remove(key);
        }
    }

    /// Toggle membership of every key in `other`: shared keys are removed,
    /// unshared keys are added with `other`'s value
    pub fn symmetric_except_with(&mut self, other: &SumSet<K, V>) {
        for (key, value) in other.iter() {
            if self.contains(key) {
                self.remove(key);
            } else {
                self.try_add(key.clone(), value.clone());
            }
        }
    }

    /// Whether every key here is present in `other` (values ignored)
    pub fn is_subset(&self, other: &SumSet<K, V>) -> bool {
        if self.len() > other.len() {
            return false;
        }
        let mut theirs = other.iter();
        'mine: for (key, _) in self.iter() {
            for (other_key, _) in theirs.by_ref() {
                match other_key.cmp(key) {
                    Ordering::Less => continue,
                    Ordering::Equal => continue 'mine,
                    Ordering::Greater => return false,
                }
            }
            return false;
        }
        true
    }

    pub fn is_proper_subset(&self, other: &SumSet<K, V>) -> bool {
        self.len() < other.len() && self.is_subset(other)
    }

    pub fn is_superset(&self, other: &SumSet<K, V>) -> bool {
        other.is_subset(self)
    }

    pub fn is_proper_superset(&self, other: &SumSet<K, V>) -> bool {
        other.len() < self.len() && other.is_subset(self)
    }

    /// Whether any key is shared with `other`
    pub fn overlaps(&self, other: &SumSet<K, V>) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let mut mine = self.iter().peekable();
        let mut theirs = other.iter().peekable();
        while let (Some((m, _)), Some((t, _))) = (mine.peek(), theirs.peek()) {
            match m.cmp(t) {
                Ordering::Less => {
                    mine.next();
                }
                Ordering::Greater => {
                    theirs.next();
                }
                Ordering::Equal => return true,
            }
        }
        false
    }

    /// Whether both sets hold exactly the same keys (values ignored)
    pub fn set_equals(&self, other: &SumSet<K, V>) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((a, _), (b, _))| a == b)
    }

    /// Tree height in nodes; bounded by `2*log2(len + 1)`
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    /// Full invariant check, for tests and debugging: recomputes every
    /// aggregate and red-black property and panics on any corruption
    pub fn verify(&self) {
        self.tree.verify();
    }
}

impl<K: Ord + Clone, V: Numeric> Default for SumSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Numeric> Clone for SumSet<K, V> {
    /// Structural deep clone: every node is copied, no state is shared
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            id: next_collection_id(),
        }
    }
}

impl<K: Ord + Clone, V: Numeric> FromIterator<(K, V)> for SumSet<K, V> {
    /// Sort, drop later duplicates of a key, then bulk-build in O(n)
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut items: Vec<Entry<K, V>> = iter
            .into_iter()
            .map(|(key, value)| Entry { key, value })
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items.dedup_by(|a, b| a.key == b.key);
        let mut tree = CoreTree::new();
        tree.rebuild_from_sorted(&items);
        Self {
            tree,
            id: next_collection_id(),
        }
    }
}

impl<K: Ord + Clone, V: Numeric> Extend<(K, V)> for SumSet<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.try_add(key, value);
        }
    }
}

impl<K: Ord + Clone + fmt::Debug, V: Numeric + fmt::Debug> fmt::Debug for SumSet<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Numeric> PartialEq for SumSet<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Ord + Clone, V: Numeric> Eq for SumSet<K, V> {}

impl<'a, K: Ord + Clone, V: Numeric> IntoIterator for &'a SumSet<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = SetIter<'a, K, V>;

    fn into_iter(self) -> SetIter<'a, K, V> {
        self.iter()
    }
}

/// Borrowing in-order iterator over a [`SumSet`]
pub struct SetIter<'a, K: Ord + Clone, V: Numeric> {
    inner: crate::tree::Iter<'a, Entry<K, V>>,
}

impl<'a, K: Ord + Clone, V: Numeric> Iterator for SetIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        self.inner.next().map(|entry| (&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Detached cursor over a [`SumSet`]; see [`SumSet::cursor`]
pub struct SetCursor {
    inner: CoreCursor,
}

impl SetCursor {
    /// Advance to the next pair of `set`. Fails with
    /// [`Error::ConcurrentModification`] once the set has been
    /// structurally mutated.
    pub fn next<'a, K: Ord + Clone, V: Numeric>(
        &mut self,
        set: &'a SumSet<K, V>,
    ) -> Result<Option<(&'a K, &'a V)>> {
        Ok(self
            .inner
            .next(&set.tree, set.id)?
            .map(|entry| (&entry.key, &entry.value)))
    }
}

/// A live, range-restricted view over a [`SumSet`].
///
/// The view shares the parent's nodes: it caches the topmost node whose
/// key falls inside its bounds plus the parent version that root was
/// computed under, and recomputes the root on the first access after the
/// version diverges. The element count is cached under a second, coarser
/// version so `len` only pays its O(size) recount when the count is
/// actually requested after a mutation. Mutating accessors delegate to the
/// parent and then resynchronize; read-only accessors never mutate the
/// parent.
#[derive(Debug, Clone)]
pub struct SumSetView<K> {
    owner: u64,
    lower: Bound<K>,
    upper: Bound<K>,
    cached_root: NodeId,
    version: u64,
    count_version: u64,
    cached_len: usize,
}

impl<K: Ord + Clone> SumSetView<K> {
    /// Whether `key` falls inside the view's bounds
    pub fn in_range(&self, key: &K) -> bool {
        !below_lower(key, &self.lower) && !above_upper(key, &self.upper)
    }

    /// Refresh the cached range root if the parent has moved on
    fn sync<V: Numeric>(&mut self, set: &SumSet<K, V>) -> Result<()> {
        if self.owner != set.id {
            return Err(Error::ForeignView);
        }
        if self.version != set.tree.version {
            self.cached_root = find_range(&set.tree, &self.lower, &self.upper);
            self.version = set.tree.version;
        }
        Ok(())
    }

    /// Number of parent pairs currently inside the bounds; recounted only
    /// when the parent mutated since the last count
    pub fn len<V: Numeric>(&mut self, set: &SumSet<K, V>) -> Result<usize> {
        self.sync(set)?;
        if self.count_version != self.version {
            let count = SetViewIter::new(&set.tree, &self.lower, &self.upper, self.cached_root)
                .count();
            self.cached_len = count;
            self.count_version = self.version;
        }
        Ok(self.cached_len)
    }

    pub fn is_empty<V: Numeric>(&mut self, set: &SumSet<K, V>) -> Result<bool> {
        Ok(self.len(set)? == 0)
    }

    /// Value under `key` if the key is in bounds and present
    pub fn try_get_value<'a, V: Numeric>(
        &mut self,
        set: &'a SumSet<K, V>,
        key: &K,
    ) -> Result<Option<&'a V>> {
        self.sync(set)?;
        if !self.in_range(key) {
            return Ok(None);
        }
        let mut current = self.cached_root;
        while !current.is_nil() {
            let entry = set.tree.arena.item(current);
            match key.cmp(&entry.key) {
                Ordering::Equal => return Ok(Some(&entry.value)),
                Ordering::Less => current = set.tree.arena.left(current),
                Ordering::Greater => current = set.tree.arena.right(current),
            }
        }
        Ok(None)
    }

    pub fn contains<V: Numeric>(&mut self, set: &SumSet<K, V>, key: &K) -> Result<bool> {
        Ok(self.try_get_value(set, key)?.is_some())
    }

    /// Insert through the parent; the key must be inside the bounds
    pub fn try_add<V: Numeric>(
        &mut self,
        set: &mut SumSet<K, V>,
        key: K,
        value: V,
    ) -> Result<bool> {
        if self.owner != set.id {
            return Err(Error::ForeignView);
        }
        if !self.in_range(&key) {
            return Err(Error::OutsideViewBounds);
        }
        let added = set.try_add(key, value);
        self.sync(set)?;
        Ok(added)
    }

    /// Remove through the parent; a key outside the bounds is a no-op
    pub fn remove<V: Numeric>(&mut self, set: &mut SumSet<K, V>, key: &K) -> Result<bool> {
        if self.owner != set.id {
            return Err(Error::ForeignView);
        }
        if !self.in_range(key) {
            return Ok(false);
        }
        let removed = set.remove(key);
        self.sync(set)?;
        Ok(removed)
    }

    /// Pair with the least in-bounds key
    pub fn min<'a, V: Numeric>(&mut self, set: &'a SumSet<K, V>) -> Result<Option<(&'a K, &'a V)>> {
        self.sync(set)?;
        let mut current = self.cached_root;
        let mut result = None;
        while !current.is_nil() {
            let entry = set.tree.arena.item(current);
            if below_lower(&entry.key, &self.lower) {
                current = set.tree.arena.right(current);
            } else {
                result = Some((&entry.key, &entry.value));
                current = set.tree.arena.left(current);
            }
        }
        Ok(result.filter(|(key, _)| self.in_range(key)))
    }

    /// Pair with the greatest in-bounds key
    pub fn max<'a, V: Numeric>(&mut self, set: &'a SumSet<K, V>) -> Result<Option<(&'a K, &'a V)>> {
        self.sync(set)?;
        let mut current = self.cached_root;
        let mut result = None;
        while !current.is_nil() {
            let entry = set.tree.arena.item(current);
            if above_upper(&entry.key, &self.upper) {
                current = set.tree.arena.left(current);
            } else {
                result = Some((&entry.key, &entry.value));
                current = set.tree.arena.right(current);
            }
        }
        Ok(result.filter(|(key, _)| self.in_range(key)))
    }

    /// Sum of the in-bounds values, by walking the bounded range
    pub fn values_sum<V: Numeric>(&mut self, set: &SumSet<K, V>) -> Result<V> {
        self.sync(set)?;
        let mut sum = V::zero();
        for (_, value) in SetViewIter::new(&set.tree, &self.lower, &self.upper, self.cached_root) {
            sum.add_assign(value);
        }
        Ok(sum)
    }

    /// Iterate the in-bounds pairs in key order
    pub fn iter<'s, V: Numeric>(
        &'s mut self,
        set: &'s SumSet<K, V>,
    ) -> Result<SetViewIter<'s, K, V>> {
        self.sync(set)?;
        Ok(SetViewIter::new(
            &set.tree,
            &self.lower,
            &self.upper,
            self.cached_root,
        ))
    }

    /// Remove every in-bounds pair from the parent, back to front
    pub fn clear<V: Numeric>(&mut self, set: &mut SumSet<K, V>) -> Result<()> {
        self.sync(set)?;
        let doomed: Vec<K> =
            SetViewIter::new(&set.tree, &self.lower, &self.upper, self.cached_root)
                .map(|(key, _)| key.clone())
                .collect();
        for key in doomed.iter().rev() {
            set.remove(key);
        }
        self.sync(set)
    }

    /// A narrower view over the same set; the new bounds may only shrink
    /// the current ones
    pub fn view_between<V: Numeric, R: RangeBounds<K>>(
        &self,
        set: &SumSet<K, V>,
        range: R,
    ) -> Result<SumSetView<K>> {
        if self.owner != set.id {
            return Err(Error::ForeignView);
        }
        let lower = range.start_bound().cloned();
        let upper = range.end_bound().cloned();
        if !lower_covers(&self.lower, &lower) || !upper_covers(&self.upper, &upper) {
            return Err(Error::OutsideViewBounds);
        }
        set.view_between((lower, upper))
    }
}

/// Bounded in-order iterator produced by [`SumSetView::iter`]
pub struct SetViewIter<'a, K: Ord + Clone, V: Numeric> {
    tree: &'a CoreTree<Entry<K, V>>,
    lower: &'a Bound<K>,
    upper: &'a Bound<K>,
    stack: WalkStack,
}

impl<'a, K: Ord + Clone, V: Numeric> SetViewIter<'a, K, V> {
    fn new(
        tree: &'a CoreTree<Entry<K, V>>,
        lower: &'a Bound<K>,
        upper: &'a Bound<K>,
        root: NodeId,
    ) -> Self {
        let mut iter = Self {
            tree,
            lower,
            upper,
            stack: WalkStack::new(),
        };
        iter.push_in_range(root);
        iter
    }

    /// Descend from `node`, stacking in-bounds nodes and skipping whole
    /// subtrees the bounds exclude
    fn push_in_range(&mut self, mut node: NodeId) {
        while !node.is_nil() {
            let key = &self.tree.arena.item(node).key;
            if below_lower(key, self.lower) {
                node = self.tree.arena.right(node);
            } else if above_upper(key, self.upper) {
                node = self.tree.arena.left(node);
            } else {
                self.stack.push(node);
                node = self.tree.arena.left(node);
            }
        }
    }
}

impl<'a, K: Ord + Clone, V: Numeric> Iterator for SetViewIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        let node = self.stack.pop()?;
        self.push_in_range(self.tree.arena.right(node));
        let entry = self.tree.arena.item(node);
        Some((&entry.key, &entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_set() -> SumSet<&'static str, i64> {
        let mut set = SumSet::new();
        assert!(set.try_add("b", 2));
        assert!(set.try_add("a", 5));
        assert!(set.try_add("c", 1));
        set.verify();
        set
    }

    fn keys(set: &SumSet<&'static str, i64>) -> Vec<&'static str> {
        set.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_insert_orders_by_key() {
        let set = abc_set();
        assert_eq!(keys(&set), vec!["a", "b", "c"]);
        assert_eq!(set.values_sum(), 8);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut set = abc_set();
        assert!(!set.try_add("b", 99));
        assert_eq!(set.try_get_value(&"b"), Some(&2));
        assert_eq!(set.len(), 3);
        set.verify();
    }

    #[test]
    fn test_lookup_and_rank() {
        let set = abc_set();
        assert_eq!(set.try_get_value(&"a"), Some(&5));
        assert_eq!(set.try_get_value(&"x"), None);
        assert!(set.contains(&"c"));

        assert_eq!(set.rank(&"a"), Ok(0));
        assert_eq!(set.rank(&"c"), Ok(2));
        assert_eq!(set.rank(&"bb"), Err(2));

        assert_eq!(set.get(1), Some((&"b", &2)));
        assert_eq!(set.get(3), None);
    }

    #[test]
    fn test_remove() {
        let mut set = abc_set();
        assert!(set.remove(&"b"));
        assert!(!set.remove(&"b"));
        set.verify();
        assert_eq!(keys(&set), vec!["a", "c"]);
        assert_eq!(set.values_sum(), 6);

        assert_eq!(set.remove_at(0), Ok(("a", 5)));
        assert!(set.remove_at(5).is_err());
    }

    #[test]
    fn test_left_values_sum() {
        let set = abc_set();
        assert_eq!(set.left_values_sum(&"c"), (7, 1));
        assert_eq!(set.left_values_sum(&"a"), (0, 5));
        // Absent key: sum of lesser keys, zero value
        assert_eq!(set.left_values_sum(&"bb"), (7, 0));
    }

    #[test]
    fn test_update_increase_decrease() {
        let mut set = abc_set();
        assert!(set.update(&"b", 10));
        assert_eq!(set.values_sum(), 16);
        assert!(!set.update(&"zz", 1));

        // Updating to zero removes
        assert!(set.update(&"b", 0));
        assert_eq!(keys(&set), vec!["a", "c"]);

        assert!(set.increase(&"c"));
        assert_eq!(set.try_get_value(&"c"), Some(&2));
        // Increasing an absent key inserts it with one
        assert!(set.increase(&"d"));
        assert_eq!(set.try_get_value(&"d"), Some(&1));

        assert!(set.decrease(&"d"));
        assert!(!set.contains(&"d"));
        assert!(!set.decrease(&"d"));
        set.verify();
    }

    #[test]
    fn test_min_max() {
        let set = abc_set();
        assert_eq!(set.min(), Some((&"a", &5)));
        assert_eq!(set.max(), Some((&"c", &1)));
        let empty: SumSet<&str, i64> = SumSet::new();
        assert_eq!(empty.min(), None);
    }

    #[test]
    fn test_from_iter_dedups() {
        let set: SumSet<i64, i64> =
            [(3, 30), (1, 10), (2, 20), (3, 99)].into_iter().collect();
        set.verify();
        assert_eq!(set.len(), 3);
        assert_eq!(set.try_get_value(&3), Some(&30));
        assert_eq!(set.values_sum(), 60);
    }

    #[test]
    fn test_union() {
        let mut a: SumSet<i64, i64> = [(1, 1), (3, 3)].into_iter().collect();
        let b: SumSet<i64, i64> = [(2, 2), (3, 99), (4, 4)].into_iter().collect();
        a.union_with(&b);
        a.verify();
        assert_eq!(a.len(), 4);
        // This set's value wins on shared keys
        assert_eq!(a.try_get_value(&3), Some(&3));
        assert_eq!(a.values_sum(), 10);
    }

    #[test]
    fn test_union_into_empty_clones() {
        let mut a: SumSet<i64, i64> = SumSet::new();
        let b: SumSet<i64, i64> = [(1, 1), (2, 2)].into_iter().collect();
        a.union_with(&b);
        a.verify();
        assert_eq!(a, b);
    }

    #[test]
    fn test_intersection() {
        let mut a: SumSet<i64, i64> = [(1, 1), (2, 2), (3, 3)].into_iter().collect();
        let b: SumSet<i64, i64> = [(2, 20), (3, 30), (4, 40)].into_iter().collect();
        a.intersect_with(&b);
        a.verify();
        assert_eq!(a.len(), 2);
        assert_eq!(a.try_get_value(&2), Some(&2));
        assert_eq!(a.values_sum(), 5);
    }

    #[test]
    fn test_except_and_symmetric_except() {
        let mut a: SumSet<i64, i64> = [(1, 1), (2, 2), (3, 3)].into_iter().collect();
        let b: SumSet<i64, i64> = [(2, 2), (9, 9)].into_iter().collect();
        a.except_with(&b);
        a.verify();
        assert_eq!(a.len(), 2);
        assert!(!a.contains(&2));

        let mut c: SumSet<i64, i64> = [(1, 1), (2, 2)].into_iter().collect();
        let d: SumSet<i64, i64> = [(2, 2), (3, 3)].into_iter().collect();
        c.symmetric_except_with(&d);
        c.verify();
        assert_eq!(
            c.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_subset_superset_overlap() {
        let small: SumSet<i64, i64> = [(1, 1), (2, 2)].into_iter().collect();
        let big: SumSet<i64, i64> = [(1, 1), (2, 2), (3, 3)].into_iter().collect();
        let other: SumSet<i64, i64> = [(8, 8)].into_iter().collect();

        assert!(small.is_subset(&big));
        assert!(small.is_proper_subset(&big));
        assert!(big.is_superset(&small));
        assert!(big.is_proper_superset(&small));
        assert!(small.is_subset(&small));
        assert!(!small.is_proper_subset(&small));
        assert!(!big.is_subset(&small));

        assert!(small.overlaps(&big));
        assert!(!small.overlaps(&other));
        assert!(small.set_equals(&small));
        assert!(!small.set_equals(&big));
    }

    #[test]
    fn test_retain() {
        let mut set: SumSet<i64, i64> = (1..=10).map(|i| (i, i)).collect();
        let removed = set.retain(|k, _| k % 2 == 0);
        set.verify();
        assert_eq!(removed, 5);
        assert_eq!(set.len(), 5);
        assert!(set.contains(&2) && !set.contains(&3));
    }

    #[test]
    fn test_view_lazy_resync() {
        let mut set: SumSet<String, i64> = SumSet::new();
        set.try_add("b".into(), 2);
        set.try_add("a".into(), 5);
        set.try_add("c".into(), 1);

        let mut view = set.view_between("a".to_string()..="b".to_string()).unwrap();
        assert_eq!(view.len(&set).unwrap(), 2);

        // Mutate the parent directly: the view picks the change up on its
        // next access
        set.try_add("aa".into(), 3);
        let seen: Vec<&str> = view
            .iter(&set)
            .unwrap()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(seen, vec!["a", "aa", "b"]);
        assert_eq!(view.len(&set).unwrap(), 3);
        assert_eq!(view.values_sum(&set).unwrap(), 10);
    }

    #[test]
    fn test_view_bounds_and_mutation() {
        let mut set: SumSet<i64, i64> = (1..=9).map(|i| (i, i)).collect();
        let mut view = set.view_between(3..=6).unwrap();

        assert!(view.try_get_value(&set, &4).unwrap().is_some());
        assert!(view.try_get_value(&set, &8).unwrap().is_none());
        assert_eq!(view.min(&set).unwrap(), Some((&3, &3)));
        assert_eq!(view.max(&set).unwrap(), Some((&6, &6)));

        assert_eq!(
            view.try_add(&mut set, 99, 1).unwrap_err(),
            Error::OutsideViewBounds
        );
        assert!(!view.remove(&mut set, &99).unwrap());
        assert!(view.remove(&mut set, &4).unwrap());
        assert_eq!(view.len(&set).unwrap(), 3);
        set.verify();

        view.clear(&mut set).unwrap();
        set.verify();
        assert_eq!(
            set.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![1, 2, 7, 8, 9]
        );
    }

    #[test]
    fn test_view_narrowing() {
        let set: SumSet<i64, i64> = (1..=9).map(|i| (i, i)).collect();
        let mut view = set.view_between(2..=8).unwrap();
        let mut narrow = view.view_between(&set, 3..=5).unwrap();
        assert_eq!(narrow.len(&set).unwrap(), 3);
        assert_eq!(
            view.view_between(&set, 1..=5).unwrap_err(),
            Error::OutsideViewBounds
        );
    }

    #[test]
    fn test_view_excluded_and_unbounded() {
        let set: SumSet<i64, i64> = (1..=5).map(|i| (i, i)).collect();
        let mut half_open = set.view_between(2..4).unwrap();
        assert_eq!(half_open.len(&set).unwrap(), 2);
        let mut tail = set.view_between(3..).unwrap();
        assert_eq!(tail.len(&set).unwrap(), 3);
        assert!(set.view_between(5..=1).is_err());
    }

    #[test]
    fn test_cursor_invalidation() {
        let mut set = abc_set();
        let mut cursor = set.cursor();
        assert_eq!(cursor.next(&set).unwrap(), Some((&"a", &5)));
        set.try_add("d", 4);
        assert_eq!(cursor.next(&set), Err(Error::ConcurrentModification));
    }

    #[test]
    fn test_clone_independence() {
        let mut set = abc_set();
        let snapshot = set.clone();
        set.remove(&"a");
        set.update(&"b", 100);
        assert_eq!(snapshot.try_get_value(&"a"), Some(&5));
        assert_eq!(snapshot.try_get_value(&"b"), Some(&2));
        assert_eq!(snapshot.values_sum(), 8);
    }

    #[test]
    fn test_reverse_iteration() {
        let set = abc_set();
        let reversed: Vec<&str> = set.iter_rev().map(|(k, _)| *k).collect();
        assert_eq!(reversed, vec!["c", "b", "a"]);
    }
}
