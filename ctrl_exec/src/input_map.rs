//! # Input mapping
//!
//! Pure functions converting raw controller samples into actuator command values.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::input::{AnalogSample, AXIS_MAX};
use util::maths::{clamp_between, quantise};

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Integer linear conversion of `value` from `source` into `target`, clamped to `target`.
///
/// `target` may be reversed. The result is truncated towards zero.
pub fn linear_conversion(value: i32, source: (i32, i32), target: (i32, i32)) -> i32 {
    let span = source.1 as i64 - source.0 as i64;
    if span == 0 {
        return target.0;
    }

    let result = target.0 as i64
        + (value as i64 - source.0 as i64) * (target.1 as i64 - target.0 as i64) / span;

    let (lo, hi) = if target.0 <= target.1 {
        (target.0 as i64, target.1 as i64)
    } else {
        (target.1 as i64, target.0 as i64)
    };

    result.max(lo).min(hi) as i32
}

/// Remove the deadzone from a raw axis value.
///
/// Magnitudes up to `deadzone` become 0. Larger magnitudes are remapped from
/// `[deadzone, max_range]` onto the same range and keep their sign.
pub fn deadzone_scale(raw: i32, deadzone: i32, max_range: i32) -> i32 {
    let magnitude = (raw as i64).abs().min(i32::MAX as i64) as i32;

    if magnitude <= deadzone {
        return 0;
    }

    let scaled = linear_conversion(magnitude, (deadzone, max_range), (deadzone, max_range));

    if raw < 0 {
        -scaled
    } else {
        scaled
    }
}

/// Deadzone-scale both axes of a sample.
pub fn scale_sample(sample: &AnalogSample, deadzone: i32, max_range: i32) -> AnalogSample {
    AnalogSample {
        x: deadzone_scale(sample.x, deadzone, max_range),
        y: deadzone_scale(sample.y, deadzone, max_range),
    }
}

/// True if either axis is outside the deadzone.
pub fn is_pressed(sample: &AnalogSample, deadzone: i32) -> bool {
    (sample.x as i64).abs() > deadzone as i64 || (sample.y as i64).abs() > deadzone as i64
}

/// Map a raw stick value onto an angle.
///
/// Positive values run from `angle_max` at zero to `angle_min` at full deflection. Negative
/// values run from `angle_max` at full deflection to `angle_min` next to zero. The angle is
/// rounded to the nearest multiple of `step` (halves away from zero) and clamped to the range
/// spanned by `angle_min` and `angle_max`.
pub fn stick_to_angle(raw: i32, angle_min: f32, angle_max: f32, step: f32) -> f32 {
    let max = AXIS_MAX as f32;

    let angle = if raw >= 0 {
        angle_max - raw as f32 / max * (angle_max - angle_min)
    } else {
        let raw = (raw as f32).max(-max);
        angle_max + ((raw + max) / max) * (angle_min - angle_max)
    };

    clamp_between(quantise(angle, step), angle_min, angle_max)
}

/// Trigger value as a speed percentage, `round(raw / max_range * 100)`.
pub fn trigger_to_speed(raw: i32, max_range: i32) -> i32 {
    (raw as f32 / max_range as f32 * 100.0).round() as i32
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
