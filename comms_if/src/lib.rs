//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software: the actuator commands, their
//! two wire representations, and the controller input events.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuator commands and their stable wire identifiers
pub mod cmd;

/// JSON envelope used on the router text channel
pub mod envelope;

/// Binary command frames used on the UDP channel
pub mod frame;

/// Raw controller input events
pub mod input;

/// Network parameters
pub mod net;
