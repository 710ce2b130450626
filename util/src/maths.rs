//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
///
/// The ranges may be reversed (`target_range.0 > target_range.1`), in which case the mapping is
/// decreasing. No clamping is applied.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Limit a value to `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: PartialOrd
{
    if value > max {
        max
    }
    else if value < min {
        min
    }
    else {
        value
    }
}

/// Limit a value to the range spanned by `a` and `b`, whichever order they are given in.
pub fn clamp_between<T>(value: T, a: T, b: T) -> T
where
    T: PartialOrd
{
    if a <= b {
        clamp(value, a, b)
    }
    else {
        clamp(value, b, a)
    }
}

/// Round `value` to the nearest multiple of `step`, halves away from zero.
pub fn quantise<T>(value: T, step: T) -> T
where
    T: Float
{
    (value / step).round() * step
}
