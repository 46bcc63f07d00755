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

//! Error types for sumtree
//!
//! This module defines all error types surfaced by the sum collections.
//! Every error is local and synchronous: either a caller-side argument
//! problem or a recoverable staleness condition. Internal invariant
//! violations are never reported through [`Error`] — they indicate a
//! balancing bug and abort via the debug verification pass instead.

use thiserror::Error;

/// Result type alias for sumtree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sum collection operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Index outside the valid range of the collection
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A rank-keyed list rejects negative values; zero is a defined no-op
    #[error("cannot insert a negative value")]
    NegativeValue,

    /// A range's lower bound is greater than its upper bound
    #[error("lower bound greater than upper bound")]
    InvertedBounds,

    /// Key or index outside the bounds of a range view; a sub-view may
    /// only narrow its parent's bounds, never widen them
    #[error("key or index outside the view's bounds")]
    OutsideViewBounds,

    /// A view or cursor was presented a collection it was not created from
    #[error("view does not belong to this collection")]
    ForeignView,

    /// The collection was structurally mutated after this cursor was
    /// created; the cursor is permanently invalid, the collection is fine
    #[error("collection was modified during iteration")]
    ConcurrentModification,
}

impl Error {
    /// Create an index-out-of-range error
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { index, len }
    }

    /// Whether this error is a caller argument problem (bad index, bad
    /// bounds, negative value) as opposed to a staleness condition
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Error::IndexOutOfRange { .. }
                | Error::NegativeValue
                | Error::InvertedBounds
                | Error::OutsideViewBounds
        )
    }

    /// Whether retrying the operation against the live collection can
    /// succeed (stale cursor, view handed the wrong collection)
    pub fn is_staleness_error(&self) -> bool {
        matches!(self, Error::ForeignView | Error::ConcurrentModification)
    }
}
