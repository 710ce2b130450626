//! # Car Library
//!
//! Actuator node of the RC car. Commands arrive either as binary frames over UDP or as JSON
//! envelopes from the message router, and are applied to the steering servo, the ESC, the camera
//! gimbal and the camera helper process.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Camera helper process lifecycle.
pub mod camera;

/// The actuator controller and its command dispatch.
pub mod controller;

/// Gyro based steering correction loop.
pub mod correction;

/// Gyro sensor drivers.
pub mod imu;

/// Angle, speed and gear to pulse width mapping.
pub mod mapping;

/// Parameters for the car executable.
pub mod params;

/// PWM output drivers.
pub mod pwm;

/// Text channel client connecting the car to the router.
pub mod router_client;

/// Binary frame receiver.
pub mod udp_server;
