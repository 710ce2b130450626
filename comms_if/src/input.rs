//! # Controller input events
//!
//! Raw samples produced by whatever is polling the game controller. Axis values are signed
//! integers in the controller's native range (±32768), triggers are in `[0, 32768]`.
//!
//! Events serialise as tagged JSON, for example
//!
//! ```json
//! {"type": "axis", "axis": "left_x", "value": 20000}
//! {"type": "button", "button": "dpad_up"}
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Magnitude of the largest raw axis value.
pub const AXIS_MAX: i32 = 32768;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Two-axis reading of one analog stick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogSample {
    pub x: i32,
    pub y: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Analog axes on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    TriggerLeft,
    TriggerRight,
}

/// Digital buttons on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    LeftShoulder,
    RightShoulder,
    A,
    B,
    X,
    Y,
    Start,
    Back,
}

/// A single event from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// An axis moved to a new raw value
    Axis { axis: Axis, value: i32 },

    /// A button was pressed
    Button { button: Button },
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
