//! # Controller session
//!
//! Turns the stream of controller events into actuator commands. The session keeps the little
//! state needed for this: the last raw position of each stick, whether each stick and trigger was
//! engaged, the straight-ahead steering trim and the gimbal pitch.
//!
//! Sticks only emit while pressed. Releasing a stick emits a single reset command, and moving a
//! stick that stays inside its deadzone emits nothing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    cmd::{ActuatorCommand, Direction},
    input::{AnalogSample, Axis, Button, InputEvent},
};
use log::trace;
use util::maths::clamp;

use crate::{
    input_map::{is_pressed, scale_sample, stick_to_angle, trigger_to_speed},
    params::CtrlExecParams,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Range of the straight-ahead steering trim.
const TRIM_RANGE_DEG: (f32, f32) = (0.0, 180.0);

/// Range of the gimbal pitch.
const PITCH_RANGE_DEG: (i32, i32) = (-90, 90);

/// Gimbal yaw at full stick deflection.
const GIMBAL_YAW_LIMIT_DEG: f32 = 90.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Press state of one analog stick.
#[derive(Debug, Default, Clone, Copy)]
struct StickState {
    /// Last raw position
    raw: AnalogSample,

    /// Whether the stick was outside its deadzone when last evaluated
    pressed: bool,
}

/// Operator station mapping state.
#[derive(Debug, Clone)]
pub struct ControllerSession {
    params: CtrlExecParams,

    left_stick: StickState,
    right_stick: StickState,

    right_trigger_engaged: bool,
    left_trigger_engaged: bool,

    /// Straight-ahead steering angle, degrees
    degree_of_turns: f32,

    /// Gimbal pitch, degrees
    pitch_angle: i32,
}

/// Outcome of a stick update.
enum StickChange {
    Held(i32),
    Released,
    Idle,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControllerSession {
    pub fn new(params: CtrlExecParams) -> Self {
        let degree_of_turns = clamp(params.degree_of_turns, TRIM_RANGE_DEG.0, TRIM_RANGE_DEG.1);

        Self {
            params,
            left_stick: StickState::default(),
            right_stick: StickState::default(),
            right_trigger_engaged: false,
            left_trigger_engaged: false,
            degree_of_turns,
            pitch_angle: 0,
        }
    }

    pub fn degree_of_turns(&self) -> f32 {
        self.degree_of_turns
    }

    pub fn pitch_angle(&self) -> i32 {
        self.pitch_angle
    }

    /// Map one controller event to the command it produces, if any.
    pub fn handle(&mut self, event: &InputEvent) -> Option<ActuatorCommand> {
        let cmd = match *event {
            InputEvent::Axis { axis, value } => self.handle_axis(axis, value),
            InputEvent::Button { button } => self.handle_button(button),
        };

        if let Some(ref c) = cmd {
            trace!("{:?} -> {:?}", event, c);
        }

        cmd
    }

    fn handle_axis(&mut self, axis: Axis, value: i32) -> Option<ActuatorCommand> {
        let step = self.params.angle_step_deg;

        match axis {
            Axis::LeftX => match self.update_stick(true, value) {
                StickChange::Held(raw) => {
                    // A centred X held through Y steers straight ahead, not to the left limit
                    let degrees = if raw >= 0 {
                        stick_to_angle(raw, 0.0, self.degree_of_turns, step)
                    } else {
                        stick_to_angle(
                            raw,
                            self.degree_of_turns,
                            self.params.steering_upper_limit_deg,
                            step,
                        )
                    };
                    Some(ActuatorCommand::TurnTo { degrees })
                }
                StickChange::Released => Some(ActuatorCommand::ResetTurns {
                    degrees: self.degree_of_turns,
                }),
                StickChange::Idle => None,
            },
            Axis::RightX => match self.update_stick(false, value) {
                StickChange::Held(raw) => {
                    // A centred X held through Y faces the gimbal forwards
                    let degrees = if raw >= 0 {
                        stick_to_angle(raw, GIMBAL_YAW_LIMIT_DEG, 0.0, step)
                    } else {
                        -stick_to_angle(raw, 0.0, GIMBAL_YAW_LIMIT_DEG, step)
                    };
                    Some(ActuatorCommand::GimbalTurnTo { degrees })
                }
                StickChange::Released => Some(ActuatorCommand::ResetGimbal),
                StickChange::Idle => None,
            },
            // Y axes only contribute to the press state of their stick
            Axis::LeftY => {
                self.left_stick.raw.y = value;
                None
            }
            Axis::RightY => {
                self.right_stick.raw.y = value;
                None
            }
            Axis::TriggerRight => self.handle_trigger(value, Direction::Forward),
            Axis::TriggerLeft => self.handle_trigger(value, Direction::Backward),
        }
    }

    fn handle_button(&mut self, button: Button) -> Option<ActuatorCommand> {
        match button {
            Button::DpadUp => Some(ActuatorCommand::Init {
                speed: self.params.init_speed,
                degrees: self.degree_of_turns,
            }),
            Button::DpadLeft => Some(self.trim_steering(1.0)),
            Button::DpadRight => Some(self.trim_steering(-1.0)),
            Button::LeftShoulder => Some(self.tilt_gimbal(-1)),
            Button::RightShoulder => Some(self.tilt_gimbal(1)),
            Button::Y => Some(ActuatorCommand::CameraStart),
            Button::A => Some(ActuatorCommand::CameraStop),
            _ => None,
        }
    }

    /// Update a stick with a new raw X value and classify the change.
    fn update_stick(&mut self, left: bool, x: i32) -> StickChange {
        let deadzone = self.params.deadzone;
        let max_range = self.params.max_axis_range;

        let stick = if left {
            &mut self.left_stick
        } else {
            &mut self.right_stick
        };

        stick.raw.x = x;

        let pressed = is_pressed(&scale_sample(&stick.raw, deadzone, max_range), deadzone);
        let was_pressed = stick.pressed;
        stick.pressed = pressed;

        match (was_pressed, pressed) {
            (_, true) => StickChange::Held(stick.raw.x),
            (true, false) => StickChange::Released,
            (false, false) => StickChange::Idle,
        }
    }

    fn handle_trigger(&mut self, value: i32, direction: Direction) -> Option<ActuatorCommand> {
        let engaged = match direction {
            Direction::Forward => &mut self.right_trigger_engaged,
            Direction::Backward => &mut self.left_trigger_engaged,
        };

        if value > self.params.trigger_threshold {
            *engaged = true;
            Some(ActuatorCommand::Move {
                speed: trigger_to_speed(value, self.params.max_axis_range),
                direction,
            })
        } else if *engaged {
            *engaged = false;
            Some(ActuatorCommand::SetEscNeutral)
        } else {
            None
        }
    }

    fn trim_steering(&mut self, delta: f32) -> ActuatorCommand {
        self.degree_of_turns = clamp(
            self.degree_of_turns + delta,
            TRIM_RANGE_DEG.0,
            TRIM_RANGE_DEG.1,
        );

        ActuatorCommand::ChangeDegreeOfTurns {
            degrees: self.degree_of_turns,
        }
    }

    fn tilt_gimbal(&mut self, delta: i32) -> ActuatorCommand {
        self.pitch_angle = clamp(
            self.pitch_angle + delta,
            PITCH_RANGE_DEG.0,
            PITCH_RANGE_DEG.1,
        );

        ActuatorCommand::GimbalSetPitch {
            degrees: self.pitch_angle as f32,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn session() -> ControllerSession {
        ControllerSession::new(CtrlExecParams::default())
    }

    fn axis(axis: Axis, value: i32) -> InputEvent {
        InputEvent::Axis { axis, value }
    }

    fn button(button: Button) -> InputEvent {
        InputEvent::Button { button }
    }

    #[test]
    fn test_left_stick_press_hold_release() {
        let mut s = session();

        // Inside the deadzone from rest: nothing
        assert_eq!(s.handle(&axis(Axis::LeftX, 2000)), None);
        assert_eq!(s.handle(&axis(Axis::LeftX, -2999)), None);

        // Full right is 0 degrees, full left the upper limit
        assert_eq!(
            s.handle(&axis(Axis::LeftX, 32768)),
            Some(ActuatorCommand::TurnTo { degrees: 0.0 })
        );
        assert_eq!(
            s.handle(&axis(Axis::LeftX, -32768)),
            Some(ActuatorCommand::TurnTo { degrees: 140.0 })
        );

        // Back into the deadzone: one reset, then silence
        assert_eq!(
            s.handle(&axis(Axis::LeftX, 100)),
            Some(ActuatorCommand::ResetTurns { degrees: 83.0 })
        );
        assert_eq!(s.handle(&axis(Axis::LeftX, 0)), None);
        assert_eq!(s.handle(&axis(Axis::LeftX, -50)), None);
    }

    #[test]
    fn test_stick_held_by_y_axis() {
        let mut s = session();

        assert_eq!(s.handle(&axis(Axis::LeftY, 20000)), None);

        // X inside the deadzone, but the stick is pressed through Y
        match s.handle(&axis(Axis::LeftX, 0)) {
            Some(ActuatorCommand::TurnTo { degrees }) => assert!((degrees - 83.0).abs() < 1e-3),
            other => panic!("Expected a turn, got {:?}", other),
        }

        assert_eq!(s.handle(&axis(Axis::LeftY, 0)), None);
        assert_eq!(
            s.handle(&axis(Axis::LeftX, 0)),
            Some(ActuatorCommand::ResetTurns { degrees: 83.0 })
        );
    }

    #[test]
    fn test_centred_x_held_by_y_goes_straight() {
        let mut s = session();

        // Straight ahead uses the current trim, never the left steering limit
        s.handle(&button(Button::DpadLeft));
        assert_eq!(s.handle(&axis(Axis::LeftY, -30000)), None);
        match s.handle(&axis(Axis::LeftX, 0)) {
            Some(ActuatorCommand::TurnTo { degrees }) => {
                assert!((degrees - 84.0).abs() < 1e-3, "steered to {}", degrees)
            }
            other => panic!("Expected a turn, got {:?}", other),
        }

        // The gimbal faces forwards rather than full right or left
        assert_eq!(s.handle(&axis(Axis::RightY, 30000)), None);
        match s.handle(&axis(Axis::RightX, 0)) {
            Some(ActuatorCommand::GimbalTurnTo { degrees }) => {
                assert!(degrees.abs() < 1e-3, "yawed to {}", degrees)
            }
            other => panic!("Expected a gimbal turn, got {:?}", other),
        }
    }

    #[test]
    fn test_right_stick_gimbal() {
        let mut s = session();

        assert_eq!(
            s.handle(&axis(Axis::RightX, 32768)),
            Some(ActuatorCommand::GimbalTurnTo { degrees: 90.0 })
        );
        assert_eq!(
            s.handle(&axis(Axis::RightX, -32768)),
            Some(ActuatorCommand::GimbalTurnTo { degrees: -90.0 })
        );
        assert_eq!(
            s.handle(&axis(Axis::RightX, 0)),
            Some(ActuatorCommand::ResetGimbal)
        );
        assert_eq!(s.handle(&axis(Axis::RightX, 0)), None);
    }

    #[test]
    fn test_triggers() {
        let mut s = session();

        // Below the threshold from rest: nothing
        assert_eq!(s.handle(&axis(Axis::TriggerRight, 900)), None);

        assert_eq!(
            s.handle(&axis(Axis::TriggerRight, 16384)),
            Some(ActuatorCommand::Move {
                speed: 50,
                direction: Direction::Forward
            })
        );
        assert_eq!(
            s.handle(&axis(Axis::TriggerRight, 0)),
            Some(ActuatorCommand::SetEscNeutral)
        );
        assert_eq!(s.handle(&axis(Axis::TriggerRight, 0)), None);

        assert_eq!(
            s.handle(&axis(Axis::TriggerLeft, 32768)),
            Some(ActuatorCommand::Move {
                speed: 100,
                direction: Direction::Backward
            })
        );
        assert_eq!(
            s.handle(&axis(Axis::TriggerLeft, 1000)),
            Some(ActuatorCommand::SetEscNeutral)
        );
    }

    #[test]
    fn test_steering_trim() {
        let mut s = session();

        assert_eq!(
            s.handle(&button(Button::DpadLeft)),
            Some(ActuatorCommand::ChangeDegreeOfTurns { degrees: 84.0 })
        );
        assert_eq!(
            s.handle(&button(Button::DpadRight)),
            Some(ActuatorCommand::ChangeDegreeOfTurns { degrees: 83.0 })
        );

        // The trim feeds Init and the steering reset
        assert_eq!(
            s.handle(&button(Button::DpadUp)),
            Some(ActuatorCommand::Init {
                speed: 50,
                degrees: 83.0
            })
        );

        for _ in 0..200 {
            s.handle(&button(Button::DpadLeft));
        }
        assert_eq!(s.degree_of_turns(), 180.0);

        for _ in 0..200 {
            s.handle(&button(Button::DpadRight));
        }
        assert_eq!(s.degree_of_turns(), 0.0);
    }

    #[test]
    fn test_gimbal_pitch() {
        let mut s = session();

        assert_eq!(
            s.handle(&button(Button::RightShoulder)),
            Some(ActuatorCommand::GimbalSetPitch { degrees: 1.0 })
        );
        assert_eq!(
            s.handle(&button(Button::LeftShoulder)),
            Some(ActuatorCommand::GimbalSetPitch { degrees: 0.0 })
        );

        for _ in 0..100 {
            s.handle(&button(Button::LeftShoulder));
        }
        assert_eq!(s.pitch_angle(), -90);
        assert_eq!(
            s.handle(&button(Button::LeftShoulder)),
            Some(ActuatorCommand::GimbalSetPitch { degrees: -90.0 })
        );
    }

    #[test]
    fn test_camera_and_unmapped_buttons() {
        let mut s = session();

        assert_eq!(
            s.handle(&button(Button::Y)),
            Some(ActuatorCommand::CameraStart)
        );
        assert_eq!(s.handle(&button(Button::A)), Some(ActuatorCommand::CameraStop));
        assert_eq!(s.handle(&button(Button::Start)), None);
        assert_eq!(s.handle(&button(Button::X)), None);
    }
}
