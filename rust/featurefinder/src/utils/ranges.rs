use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// TupleRange represents a range defined by a tuple of two elements (T, T).
///
/// It represents a range as closed-closed [a, b], meaning both endpoints are inclusive.
/// Importantly, it ensures that the first element is always less than or equal to the second,
/// to enforce early exit in cases where a range would be propagated poinlessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleRange<T: Copy + PartialOrd>(T, T);

#[derive(Error, Debug)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    #[error(
        "Expected the first element to be less than or equal to the second, got ({0:?}, {1:?})"
    )]
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    pub fn try_new(left: T, right: T) -> Result<Self, TupleRangeError<T>> {
        if left > right {
            Err(TupleRangeError::ExpectedOrderedRange(left, right))
        } else {
            Ok(Self(left, right))
        }
    }

    /// Builds the range from two values in any order.
    pub fn spanning(a: T, b: T) -> Self {
        if a > b { Self(b, a) } else { Self(a, b) }
    }

    pub fn as_tuple(&self) -> (T, T) {
        (self.0, self.1)
    }

    pub fn contains(&self, x: T) -> bool {
        self.0 <= x && x <= self.1
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }

    pub fn intersects(&self, other: Self) -> bool {
        !(self.end() < other.start() || other.end() < self.start())
    }
}

impl TupleRange<f64> {
    /// Range of `center` +/- `half_width`.
    pub fn around(center: f64, half_width: f64) -> Self {
        Self::spanning(center - half_width, center + half_width)
    }

    pub fn width(&self) -> f64 {
        self.1 - self.0
    }
}

impl TupleRange<usize> {
    /// Range of `center` +/- `half_width`, clamped to `[0, max]`.
    pub fn around_clamped(center: usize, half_width: usize, max: usize) -> Self {
        Self(center.saturating_sub(half_width), (center + half_width).min(max))
    }

    pub fn len(&self) -> usize {
        self.1 - self.0 + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn center(&self) -> usize {
        (self.0 + self.1) / 2
    }
}

/// Finds the index range of elements in a slice sorted by a float key
/// whose keys fall within the closed `key_range`.
///
/// Same contract as a binary search on an `Ord` key but for `f64`,
/// which is what m/z values are.
///
/// ```
/// use featurefinder::utils::ranges::{binary_search_range_by_f64_key, TupleRange};
///
/// let mzs = vec![100.0, 200.0, 300.0, 300.0, 400.0];
/// let range = binary_search_range_by_f64_key(&mzs, TupleRange::try_new(150.0, 300.0).unwrap(), |x| *x);
/// assert_eq!(range, 1..4);
/// ```
pub fn binary_search_range_by_f64_key<T, F>(
    slice: &[T],
    key_range: TupleRange<f64>,
    key_fn: F,
) -> std::ops::Range<usize>
where
    F: Fn(&T) -> f64,
{
    let start_idx = slice.partition_point(|x| key_fn(x) < key_range.start());
    let end_idx =
        start_idx + slice[start_idx..].partition_point(|x| key_fn(x) <= key_range.end());
    start_idx..end_idx
}
