//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;
use ordered_float::OrderedFloat;

/// Clamp a value into the inclusive range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Arithmetic mean of the values, or `None` if there are none.
pub fn mean<T>(values: &[T]) -> Option<T>
where
    T: Float,
{
    if values.is_empty() {
        return None;
    }

    let sum = values.iter().fold(T::zero(), |acc, v| acc + *v);

    T::from(values.len()).map(|n| sum / n)
}

/// Median of the values, or `None` if there are none.
///
/// For an even number of values the two middle values are averaged.
pub fn median<T>(values: &[T]) -> Option<T>
where
    T: Float,
{
    if values.is_empty() {
        return None;
    }

    let mut sorted: Vec<OrderedFloat<T>> = values.iter().map(|v| OrderedFloat(*v)).collect();
    sorted.sort();

    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        let two = T::one() + T::one();
        Some((sorted[mid - 1].into_inner() + sorted[mid].into_inner()) / two)
    } else {
        Some(sorted[mid].into_inner())
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// Equivalent to the std `rem_euclid`, which `num_traits::Float` does not expose. Due to floating
/// point round-off the result may equal `rhs.abs()` when `lhs` is a tiny negative number.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

/// Signed distance of an angle in degrees from zero, in the range (-180, 180].
///
/// Angles are expected in [0, 360) but any finite value is accepted.
pub fn signed_deg<T>(angle_deg: T) -> T
where
    T: Float,
{
    let full = T::from(360.0).unwrap_or_else(T::max_value);
    let half = full / (T::one() + T::one());

    let wrapped = rem_euclid(angle_deg, full);

    if wrapped > half {
        wrapped - full
    } else {
        wrapped
    }
}
