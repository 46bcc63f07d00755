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

//! Numeric payload trait
//!
//! Aggregate maintenance only needs a handful of operations: an additive
//! identity, increment/decrement for the locate-then-adjust operations,
//! signed addition and subtraction for delta propagation, and an in-place
//! overwrite. Arbitrary-precision integers implement this trait externally
//! and plug into [`SumList`](crate::SumList) unchanged; `set_from` exists
//! so such types can reuse their allocation instead of reallocating on
//! every aggregate update.
//!
//! Deltas can be negative, so implementations must be signed.

/// Numeric operations required of a summed value.
pub trait Numeric: Clone + Ord {
    /// The additive identity
    fn zero() -> Self;

    /// The unit used by `increase`/`decrease`
    fn one() -> Self;

    /// Whether this value equals the additive identity
    fn is_zero(&self) -> bool;

    /// `self += rhs`
    fn add_assign(&mut self, rhs: &Self);

    /// `self -= rhs`
    fn sub_assign(&mut self, rhs: &Self);

    /// In-place overwrite with `rhs`
    fn set_from(&mut self, rhs: &Self);
}

macro_rules! impl_numeric_for_int {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                #[inline]
                fn zero() -> Self {
                    0
                }

                #[inline]
                fn one() -> Self {
                    1
                }

                #[inline]
                fn is_zero(&self) -> bool {
                    *self == 0
                }

                #[inline]
                fn add_assign(&mut self, rhs: &Self) {
                    *self += rhs;
                }

                #[inline]
                fn sub_assign(&mut self, rhs: &Self) {
                    *self -= rhs;
                }

                #[inline]
                fn set_from(&mut self, rhs: &Self) {
                    *self = *rhs;
                }
            }
        )*
    };
}

impl_numeric_for_int!(i8, i16, i32, i64, i128, isize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities() {
        assert_eq!(i64::zero(), 0);
        assert_eq!(i64::one(), 1);
        assert!(i64::zero().is_zero());
        assert!(!i64::one().is_zero());
    }

    #[test]
    fn test_arithmetic() {
        let mut x = 10i32;
        x.add_assign(&5);
        assert_eq!(x, 15);
        x.sub_assign(&20);
        assert_eq!(x, -5);
        x.set_from(&7);
        assert_eq!(x, 7);
    }

    #[test]
    fn test_negative_delta_roundtrip() {
        // Delta propagation relies on add(a - b) being exact for signed types
        let (a, b) = (3i64, 11i64);
        let mut delta = a;
        delta.sub_assign(&b);
        let mut sum = 100i64;
        sum.add_assign(&delta);
        assert_eq!(sum, 92);
    }
}
