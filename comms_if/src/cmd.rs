//! # Actuator commands
//!
//! This module defines the commands the operator station sends to the car. Every command has
//! exactly one action name (used by the JSON envelope) and one command id (used by the binary
//! frame). Both mappings are stable and must not be reordered.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// All known action names, ordered by command id (index 0 is command id 1).
pub const ACTION_NAMES: [&str; 14] = [
    "init",
    "change-degree-of-turns",
    "reset-turns",
    "turn-to",
    "forward",
    "backward",
    "set-esc-to-neutral-position",
    "start-camera",
    "stop-camera",
    "camera-gimbal-turn-to",
    "camera-gimbal-set-pitch-angle",
    "reset-camera-gimbal",
    "steering-calibration-on",
    "steering-calibration-off",
];

/// Action name reported for [`ActuatorCommand::Unknown`].
pub const UNKNOWN_ACTION: &str = "unknown";

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction of travel for a [`ActuatorCommand::Move`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// A command to be applied by the actuator node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActuatorCommand {
    /// Steer to an absolute servo angle, marking the turn as manual.
    ///
    /// Units: degrees, [0, 180]
    TurnTo { degrees: f32 },

    /// Return the steering to the given angle and release manual steering.
    ResetTurns { degrees: f32 },

    /// Steer to a new straight-ahead trim angle, marking the turn as manual.
    ChangeDegreeOfTurns { degrees: f32 },

    /// Drive the ESC at the given speed percentage in the given direction.
    Move { speed: i32, direction: Direction },

    /// Put the ESC into its neutral position.
    SetEscNeutral,

    /// Start the camera streaming helper.
    CameraStart,

    /// Stop the camera streaming helper.
    CameraStop,

    /// Turn the gimbal yaw axis.
    ///
    /// Units: degrees, [-90, 90]
    GimbalTurnTo { degrees: f32 },

    /// Set the gimbal pitch axis.
    ///
    /// Units: degrees, [-90, 90]
    GimbalSetPitch { degrees: f32 },

    /// Centre the gimbal yaw axis.
    ResetGimbal,

    /// Start (`on = true`) or stop the gyroscope steering correction.
    SteeringCalibration { on: bool },

    /// Bring the car into a known state: steering, ESC neutral, gimbal centred.
    Init { speed: i32, degrees: f32 },

    /// A command whose action name or id is not recognised. Always ignored by the car.
    Unknown,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActuatorCommand {
    /// The action name of this command on the JSON channel.
    pub fn action_name(&self) -> &'static str {
        match self.command_id() {
            Some(id) => ACTION_NAMES[id as usize - 1],
            None => UNKNOWN_ACTION,
        }
    }

    /// The command id of this command on the binary channel, `None` for `Unknown`.
    pub fn command_id(&self) -> Option<u16> {
        let id = match self {
            ActuatorCommand::Init { .. } => 1,
            ActuatorCommand::ChangeDegreeOfTurns { .. } => 2,
            ActuatorCommand::ResetTurns { .. } => 3,
            ActuatorCommand::TurnTo { .. } => 4,
            ActuatorCommand::Move {
                direction: Direction::Forward,
                ..
            } => 5,
            ActuatorCommand::Move {
                direction: Direction::Backward,
                ..
            } => 6,
            ActuatorCommand::SetEscNeutral => 7,
            ActuatorCommand::CameraStart => 8,
            ActuatorCommand::CameraStop => 9,
            ActuatorCommand::GimbalTurnTo { .. } => 10,
            ActuatorCommand::GimbalSetPitch { .. } => 11,
            ActuatorCommand::ResetGimbal => 12,
            ActuatorCommand::SteeringCalibration { on: true } => 13,
            ActuatorCommand::SteeringCalibration { on: false } => 14,
            ActuatorCommand::Unknown => return None,
        };

        Some(id)
    }

    /// Look up the command id for an action name.
    pub fn id_for_action(action: &str) -> Option<u16> {
        ACTION_NAMES
            .iter()
            .position(|a| *a == action)
            .map(|i| i as u16 + 1)
    }

    /// Build a command from its id and the seven numeric parameters carried by a binary frame.
    ///
    /// Unrecognised ids produce [`ActuatorCommand::Unknown`].
    pub fn from_id_params(id: u16, params: &[f32; 7]) -> Self {
        let degrees = params[0];
        let speed = params[0] as i32;

        match id {
            1 => ActuatorCommand::Init {
                speed,
                degrees: params[1],
            },
            2 => ActuatorCommand::ChangeDegreeOfTurns { degrees },
            3 => ActuatorCommand::ResetTurns { degrees },
            4 => ActuatorCommand::TurnTo { degrees },
            5 => ActuatorCommand::Move {
                speed,
                direction: Direction::Forward,
            },
            6 => ActuatorCommand::Move {
                speed,
                direction: Direction::Backward,
            },
            7 => ActuatorCommand::SetEscNeutral,
            8 => ActuatorCommand::CameraStart,
            9 => ActuatorCommand::CameraStop,
            10 => ActuatorCommand::GimbalTurnTo { degrees },
            11 => ActuatorCommand::GimbalSetPitch { degrees },
            12 => ActuatorCommand::ResetGimbal,
            13 => ActuatorCommand::SteeringCalibration { on: true },
            14 => ActuatorCommand::SteeringCalibration { on: false },
            _ => ActuatorCommand::Unknown,
        }
    }

    /// The numeric parameters of this command laid out in binary frame slots. Unused slots are
    /// zero.
    pub fn params(&self) -> [f32; 7] {
        let mut params = [0f32; 7];

        match *self {
            ActuatorCommand::TurnTo { degrees }
            | ActuatorCommand::ResetTurns { degrees }
            | ActuatorCommand::ChangeDegreeOfTurns { degrees }
            | ActuatorCommand::GimbalTurnTo { degrees }
            | ActuatorCommand::GimbalSetPitch { degrees } => params[0] = degrees,
            ActuatorCommand::Move { speed, .. } => params[0] = speed as f32,
            ActuatorCommand::Init { speed, degrees } => {
                params[0] = speed as f32;
                params[1] = degrees;
            }
            _ => (),
        }

        params
    }
}

impl Direction {
    /// The action name of a move in this direction.
    pub fn action_name(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_action_names_match_ids() {
        for (i, name) in ACTION_NAMES.iter().enumerate() {
            assert_eq!(ActuatorCommand::id_for_action(name), Some(i as u16 + 1));
        }

        assert_eq!(ActuatorCommand::id_for_action("stop-car"), None);
        assert_eq!(ActuatorCommand::Unknown.action_name(), UNKNOWN_ACTION);
        assert_eq!(ActuatorCommand::Unknown.command_id(), None);
    }

    #[test]
    fn test_from_id_params() {
        let mut params = [0f32; 7];
        params[0] = 42.0;
        params[1] = 83.0;

        assert_eq!(
            ActuatorCommand::from_id_params(1, &params),
            ActuatorCommand::Init {
                speed: 42,
                degrees: 83.0
            }
        );
        assert_eq!(
            ActuatorCommand::from_id_params(6, &params),
            ActuatorCommand::Move {
                speed: 42,
                direction: Direction::Backward
            }
        );
        assert_eq!(
            ActuatorCommand::from_id_params(13, &params),
            ActuatorCommand::SteeringCalibration { on: true }
        );
        assert_eq!(ActuatorCommand::from_id_params(0, &params), ActuatorCommand::Unknown);
        assert_eq!(ActuatorCommand::from_id_params(15, &params), ActuatorCommand::Unknown);
    }

    #[test]
    fn test_params_layout() {
        let cmd = ActuatorCommand::Init {
            speed: 50,
            degrees: 83.0,
        };
        assert_eq!(cmd.params(), [50.0, 83.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(ActuatorCommand::CameraStop.params(), [0f32; 7]);
        assert_eq!(cmd.action_name(), "init");
        assert_eq!(
            ActuatorCommand::Move {
                speed: 1,
                direction: Direction::Forward
            }
            .action_name(),
            Direction::Forward.action_name()
        );
    }
}
