//! # Pulse width mapping
//!
//! Pure functions converting logical actuator values (angles, speeds) into the pulse widths sent
//! to the PWM driver. Every pulse width is truncated to whole microseconds.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::Direction;
use serde::{Deserialize, Serialize};
use util::maths::{clamp, lin_map};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Gear to maximum speed table. Gears without an entry are uncapped.
pub const GEAR_SPEED_CAPS: [(i32, i32); 6] = [(1, 20), (2, 35), (3, 50), (5, 70), (6, 85), (8, 100)];

/// Lowest transmission gear
pub const MIN_GEAR: i32 = 1;

/// Highest transmission gear
pub const MAX_GEAR: i32 = 8;

/// Maximum speed percentage
pub const MAX_SPEED: i32 = 100;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Pulse width limits of a positional servo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoLimits {
    /// Units: microseconds
    pub min_pulse_us: u32,

    /// Units: microseconds
    pub max_pulse_us: u32,
}

/// Pulse widths of the ESC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscPulses {
    /// Full reverse. Units: microseconds
    pub min_pulse_us: u32,

    /// Stopped. Units: microseconds
    pub neutral_pulse_us: u32,

    /// Full forward. Units: microseconds
    pub max_pulse_us: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoLimits {
    /// Steering servo limits: 500 to 2500 µs over 0 to 180 degrees.
    pub fn steering() -> Self {
        Self {
            min_pulse_us: 500,
            max_pulse_us: 2500,
        }
    }

    /// Gimbal servo limits: 1000 to 2000 µs over -90 to 90 degrees.
    pub fn gimbal() -> Self {
        Self {
            min_pulse_us: 1000,
            max_pulse_us: 2000,
        }
    }
}

impl Default for EscPulses {
    fn default() -> Self {
        Self {
            min_pulse_us: 1000,
            neutral_pulse_us: 1500,
            max_pulse_us: 2000,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Steering pulse width for an angle in `[0, 180]` degrees (clamped).
pub fn steering_pulse(degrees: f32, limits: &ServoLimits) -> u32 {
    let degrees = clamp(degrees, 0.0, 180.0);

    lin_map(
        (0.0, 180.0),
        (limits.min_pulse_us as f32, limits.max_pulse_us as f32),
        degrees,
    )
    .floor() as u32
}

/// Gimbal pulse width for an angle in `[-90, 90]` degrees (clamped).
pub fn gimbal_pulse(degrees: f32, limits: &ServoLimits) -> u32 {
    let degrees = clamp(degrees, -90.0, 90.0);

    lin_map(
        (-90.0, 90.0),
        (limits.min_pulse_us as f32, limits.max_pulse_us as f32),
        degrees,
    )
    .floor() as u32
}

/// ESC pulse width for a speed percentage (clamped to `[0, 100]`) in the given direction.
///
/// Forward scales from neutral towards the maximum pulse, backward from neutral towards the
/// minimum pulse.
pub fn esc_pulse(speed: i32, direction: Direction, esc: &EscPulses) -> u32 {
    let speed = clamp(speed, 0, MAX_SPEED) as f32;
    let neutral = esc.neutral_pulse_us as f32;

    let end = match direction {
        Direction::Forward => esc.max_pulse_us as f32,
        Direction::Backward => esc.min_pulse_us as f32,
    };

    lin_map((0.0, MAX_SPEED as f32), (neutral, end), speed).floor() as u32
}

/// Maximum speed permitted in `gear`, `None` if the gear is uncapped.
pub fn gear_speed_cap(gear: i32) -> Option<i32> {
    GEAR_SPEED_CAPS
        .iter()
        .find(|(g, _)| *g == gear)
        .map(|(_, cap)| *cap)
}

/// Apply every speed limit in turn: `[0, 100]`, then the gear cap, then the `Init` limit.
pub fn limit_speed(speed: i32, gear: i32, speed_limit: i32) -> i32 {
    let mut speed = clamp(speed, 0, MAX_SPEED);

    if let Some(cap) = gear_speed_cap(gear) {
        speed = speed.min(cap);
    }

    speed.min(clamp(speed_limit, 0, MAX_SPEED))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
