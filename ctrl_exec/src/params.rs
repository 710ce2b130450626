//! # Operator Station Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::input::AXIS_MAX;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrlExecParams {
    /// Raw stick magnitude treated as neutral
    pub deadzone: i32,

    /// Largest raw axis magnitude
    pub max_axis_range: i32,

    /// Raw trigger value above which a trigger drives the car
    pub trigger_threshold: i32,

    /// Steering angle at full left deflection.
    ///
    /// Units: degrees
    pub steering_upper_limit_deg: f32,

    /// Resolution of the angles sent to the car.
    ///
    /// Units: degrees
    pub angle_step_deg: f32,

    /// Straight-ahead steering angle at startup.
    ///
    /// Units: degrees
    pub degree_of_turns: f32,

    /// Speed limit sent with `Init`, percent
    pub init_speed: i32,

    /// Where controller events come from
    pub input: InputKind,

    /// Channel the commands are sent over
    pub transport: Transport,

    /// Time between polls of the input source.
    ///
    /// Units: milliseconds
    pub poll_period_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Replay an input script
    Script,

    /// Read a live gamepad event device, needs the `gamepad` feature
    Gamepad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Binary frames straight to the car
    Udp,

    /// JSON envelopes through the message router
    Router,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CtrlExecParams {
    fn default() -> Self {
        Self {
            deadzone: 3000,
            max_axis_range: AXIS_MAX,
            trigger_threshold: 1000,
            steering_upper_limit_deg: 140.0,
            angle_step_deg: 0.01,
            degree_of_turns: 83.0,
            init_speed: 50,
            input: InputKind::Script,
            transport: Transport::Udp,
            poll_period_ms: 10,
        }
    }
}
