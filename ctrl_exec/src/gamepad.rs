//! # Gamepad input
//!
//! Maps Linux evdev gamepad events onto controller [`InputEvent`]s. Axis values are rescaled from
//! the range the device reports to the native controller range, so the deadzone and trigger
//! threshold parameters mean the same thing for every pad.
//!
//! [`GamepadMapping`] is always built. [`EvdevSource`], which reads a real device, needs the
//! `gamepad` feature.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use comms_if::input::{Axis, Button, InputEvent, AXIS_MAX};

#[cfg(feature = "gamepad")]
use {
    crate::source::{InputSource, Polled},
    log::{info, warn},
    std::{io::ErrorKind, path::Path},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

// Event types, linux/input-event-codes.h
const EV_KEY: u16 = 0x01;
const EV_ABS: u16 = 0x03;

// Absolute axes
const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;
const ABS_Z: u16 = 0x02;
const ABS_RX: u16 = 0x03;
const ABS_RY: u16 = 0x04;
const ABS_RZ: u16 = 0x05;
const ABS_HAT0X: u16 = 0x10;
const ABS_HAT0Y: u16 = 0x11;

// Buttons
const BTN_SOUTH: u16 = 0x130;
const BTN_EAST: u16 = 0x131;
const BTN_NORTH: u16 = 0x133;
const BTN_WEST: u16 = 0x134;
const BTN_TL: u16 = 0x136;
const BTN_TR: u16 = 0x137;
const BTN_SELECT: u16 = 0x13a;
const BTN_START: u16 = 0x13b;
const BTN_DPAD_UP: u16 = 0x220;
const BTN_DPAD_DOWN: u16 = 0x221;
const BTN_DPAD_LEFT: u16 = 0x222;
const BTN_DPAD_RIGHT: u16 = 0x223;

/// Key event value of a press. Releases (0) and autorepeats (2) produce no event.
const KEY_PRESSED: i32 = 1;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Range of raw values a device reports for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

/// Translation from evdev codes to controller events.
#[derive(Debug, Clone)]
pub struct GamepadMapping {
    ranges: HashMap<Axis, AxisRange>,
}

/// Live gamepad read through the Linux event interface.
#[cfg(feature = "gamepad")]
pub struct EvdevSource {
    device: evdev::Device,
    mapping: GamepadMapping,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GamepadError {
    #[error("Could not open the gamepad at {0}: {1}")]
    OpenError(String, std::io::Error),

    #[error("Could not configure the gamepad: {0}")]
    ConfigError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GamepadMapping {
    /// Axis reported under an absolute axis code.
    ///
    /// Triggers are `ABS_Z` (left) and `ABS_RZ` (right), as the xpad and PlayStation drivers
    /// report them.
    pub fn axis_for_code(code: u16) -> Option<Axis> {
        match code {
            ABS_X => Some(Axis::LeftX),
            ABS_Y => Some(Axis::LeftY),
            ABS_RX => Some(Axis::RightX),
            ABS_RY => Some(Axis::RightY),
            ABS_Z => Some(Axis::TriggerLeft),
            ABS_RZ => Some(Axis::TriggerRight),
            _ => None,
        }
    }

    /// Button reported under a key code. Face buttons are named by position (south is A).
    pub fn button_for_code(code: u16) -> Option<Button> {
        match code {
            BTN_SOUTH => Some(Button::A),
            BTN_EAST => Some(Button::B),
            BTN_WEST => Some(Button::X),
            BTN_NORTH => Some(Button::Y),
            BTN_TL => Some(Button::LeftShoulder),
            BTN_TR => Some(Button::RightShoulder),
            BTN_SELECT => Some(Button::Back),
            BTN_START => Some(Button::Start),
            BTN_DPAD_UP => Some(Button::DpadUp),
            BTN_DPAD_DOWN => Some(Button::DpadDown),
            BTN_DPAD_LEFT => Some(Button::DpadLeft),
            BTN_DPAD_RIGHT => Some(Button::DpadRight),
            _ => None,
        }
    }

    /// Use the range a device reports for `axis`. Empty ranges are ignored.
    pub fn set_range(&mut self, axis: Axis, range: AxisRange) {
        if range.max > range.min {
            self.ranges.insert(axis, range);
        }
    }

    /// Translate one raw evdev event.
    pub fn map(&self, event_type: u16, code: u16, value: i32) -> Option<InputEvent> {
        match event_type {
            EV_ABS => match code {
                // Pads without D-pad buttons report the D-pad as a hat
                ABS_HAT0X => hat_button(value, Button::DpadLeft, Button::DpadRight),
                ABS_HAT0Y => hat_button(value, Button::DpadUp, Button::DpadDown),
                _ => Self::axis_for_code(code).map(|axis| InputEvent::Axis {
                    axis,
                    value: self.normalise(axis, value),
                }),
            },
            EV_KEY if value == KEY_PRESSED => {
                Self::button_for_code(code).map(|button| InputEvent::Button { button })
            }
            _ => None,
        }
    }

    /// Rescale a raw value to `[-AXIS_MAX, AXIS_MAX]` for sticks, `[0, AXIS_MAX]` for triggers.
    fn normalise(&self, axis: Axis, value: i32) -> i32 {
        let range = match self.ranges.get(&axis) {
            Some(r) => *r,
            None => return value,
        };

        let span = range.max as i64 - range.min as i64;
        let offset = (value as i64 - range.min as i64).max(0).min(span);
        let max = AXIS_MAX as i64;

        let scaled = match axis {
            Axis::TriggerLeft | Axis::TriggerRight => offset * max / span,
            _ => 2 * offset * max / span - max,
        };

        scaled as i32
    }
}

impl Default for GamepadMapping {
    /// Ranges of an xpad driven controller.
    fn default() -> Self {
        let stick = AxisRange {
            min: -AXIS_MAX,
            max: AXIS_MAX - 1,
        };
        let trigger = AxisRange { min: 0, max: 1023 };

        let mut ranges = HashMap::new();
        for axis in [Axis::LeftX, Axis::LeftY, Axis::RightX, Axis::RightY].iter() {
            ranges.insert(*axis, stick);
        }
        ranges.insert(Axis::TriggerLeft, trigger);
        ranges.insert(Axis::TriggerRight, trigger);

        Self { ranges }
    }
}

#[cfg(feature = "gamepad")]
impl EvdevSource {
    /// Open an event device, e.g. `/dev/input/event3`, and read its axis ranges.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GamepadError> {
        let path = path.as_ref();

        let mut device = evdev::Device::open(path)
            .map_err(|e| GamepadError::OpenError(path.display().to_string(), e))?;
        device
            .set_nonblocking(true)
            .map_err(GamepadError::ConfigError)?;

        let mut mapping = GamepadMapping::default();

        match device.get_abs_state() {
            Ok(state) => {
                for code in [ABS_X, ABS_Y, ABS_RX, ABS_RY, ABS_Z, ABS_RZ].iter() {
                    if let (Some(axis), Some(info)) = (
                        GamepadMapping::axis_for_code(*code),
                        state.get(*code as usize),
                    ) {
                        mapping.set_range(
                            axis,
                            AxisRange {
                                min: info.minimum,
                                max: info.maximum,
                            },
                        );
                    }
                }
            }
            Err(e) => warn!("Could not read the gamepad axis ranges, using defaults: {}", e),
        }

        info!(
            "Opened gamepad \"{}\" at {}",
            device.name().unwrap_or("unnamed"),
            path.display()
        );

        Ok(Self { device, mapping })
    }
}

#[cfg(feature = "gamepad")]
impl InputSource for EvdevSource {
    fn poll(&mut self) -> Polled {
        let mapping = &self.mapping;

        match self.device.fetch_events() {
            Ok(events) => {
                let events: Vec<InputEvent> = events
                    .filter_map(|e| mapping.map(e.event_type().0, e.code(), e.value()))
                    .collect();

                if events.is_empty() {
                    Polled::Idle
                } else {
                    Polled::Events(events)
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Polled::Idle,
            Err(e) => {
                warn!("Gamepad read failed, was it unplugged? {}", e);
                Polled::Finished
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn hat_button(value: i32, negative: Button, positive: Button) -> Option<InputEvent> {
    let button = match value {
        v if v < 0 => negative,
        v if v > 0 => positive,
        _ => return None,
    };

    Some(InputEvent::Button { button })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
