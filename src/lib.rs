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

//! # Sumtree - Order-statistics sum collections
//!
//! Sumtree provides "sum collections": positional lists and key-ordered
//! weighted sets backed by one augmented red-black tree, where every
//! subtree tracks its leaf count and the sum of its stored values. That
//! augmentation turns the operations arrays and hash maps each do poorly
//! into a uniform O(log n):
//!
//! - **Index access without shifting** - insert, remove, and read by
//!   position; position is derived from subtree leaf counts, never stored
//! - **Prefix-sum search** - "the greatest position whose cumulative sum
//!   fits a budget", the primitive behind weighted sampling and
//!   cumulative-quota lookup, with no Fenwick-tree index bookkeeping
//! - **Top-down 2-3-4 balancing** - single-pass insertion and deletion,
//!   no separate fixup walk back to the root
//! - **O(n) bulk construction** - balanced midpoint build from an ordered
//!   sequence instead of n repeated insertions
//! - **Live range views** - a bounded facade sharing the parent's nodes,
//!   lazily resynchronized through a version counter
//! - **Node recycling** - nodes live in an arena with a free-index list,
//!   so churn reuses slots instead of reallocating
//!
//! ## Quick Start
//!
//! ```rust
//! use sumtree::SumList;
//!
//! let mut list: SumList<i64> = SumList::new();
//!
//! // Positional inserts, O(log n) each
//! for value in [5, 3, 8, 1] {
//!     list.insert(0, value).unwrap();
//! }
//! assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 8, 3, 5]);
//! assert_eq!(list.values_sum(), 17);
//!
//! // Greatest index whose inclusive prefix sum stays within 9
//! assert_eq!(list.index_of_not_greater_sum(&9), (Some(1), 0));
//! ```
//!
//! ## Types
//!
//! - [`SumList`] - rank-keyed list of positive values, with
//!   [`SumListView`], [`ListIter`], [`ListCursor`]
//! - [`SumSet`] - key-ordered weighted set with set algebra, with
//!   [`SumSetView`], [`SetIter`], [`SetViewIter`], [`SetCursor`]
//! - [`Numeric`] - the trait summed values implement; signed primitives
//!   are covered, arbitrary-precision integers plug in externally
//! - [`Error`] / [`Result`] - argument and staleness errors
//!
//! Single-threaded per instance by design: mutation requires exclusive
//! access (`&mut self`), and the only cross-instance machinery — the node
//! pool — is a per-arena free list with no shared state. Detached cursors
//! and range views detect structural mutation through a version counter
//! instead of yielding stale nodes.

mod error;
mod list;
mod numeric;
mod set;
mod tree;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use list::{ListCursor, ListIter, SumList, SumListView};
pub use numeric::Numeric;
pub use set::{SetCursor, SetIter, SetViewIter, SumSet, SumSetView};

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_list_and_set_share_engine_behavior() {
        // The same weights through both front doors give the same
        // aggregate answers
        let list: SumList<i64> = [5, 2, 1].as_slice().into();
        let set: SumSet<&str, i64> = [("a", 5), ("b", 2), ("c", 1)].into_iter().collect();

        assert_eq!(list.values_sum(), set.values_sum());
        assert_eq!(
            list.index_of_not_greater_sum(&7),
            set.index_of_not_greater_sum(&7)
        );
        assert_eq!(list.left_values_sum(2).0, set.left_values_sum(&"c").0);
    }

    #[test]
    fn test_errors_are_exposed_at_the_root() {
        let mut list: SumList<i64> = SumList::new();
        let err = list.insert(3, 1).unwrap_err();
        assert!(err.is_argument_error());
        assert_eq!(err, Error::IndexOutOfRange { index: 3, len: 0 });
    }
}
