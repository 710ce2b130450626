//! # Operator Station Library
//!
//! Maps game controller input onto actuator commands and sends them to the car.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Live gamepad input through evdev.
pub mod gamepad;

/// Pure raw input to command value mapping.
pub mod input_map;

/// Parameters for the operator station.
pub mod params;

/// Controller session state and edge transitions.
pub mod session;

/// Command transports.
pub mod sink;

/// Controller event sources.
pub mod source;
