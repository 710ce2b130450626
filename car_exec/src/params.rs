//! # Car Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{
    correction::CorrectionParams,
    imu::MPU6050_ADDRESS,
    mapping::{EscPulses, ServoLimits},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarExecParams {
    /// Which drivers to use for the outputs and the IMU
    pub backend: Backend,

    /// BCM pin assignments
    pub pins: PinParams,

    /// Steering servo limits, 0 to 180 degrees
    pub steering: ServoLimits,

    /// ESC pulse widths
    pub esc: EscPulses,

    /// Gimbal servo limits, -90 to 90 degrees
    pub gimbal: ServoLimits,

    /// Servo frame period.
    ///
    /// Units: milliseconds
    pub pwm_period_ms: u64,

    /// Transmission gear at startup, 1 to 8
    pub transmission_gear: i32,

    /// Steering correction tuning
    pub correction: CorrectionParams,

    /// Location of the IMU
    pub imu: ImuParams,

    /// Camera helper program followed by its arguments
    pub camera_command: Vec<String>,

    /// Time the camera helper has to exit after SIGTERM before it is killed.
    ///
    /// Units: milliseconds
    pub camera_stop_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PinParams {
    pub steering: u8,
    pub esc: u8,
    pub esc_enable: u8,
    pub gimbal_mode: u8,
    pub gimbal_pitch: u8,
    pub gimbal_yaw: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImuParams {
    /// I2C bus number
    pub bus: u8,

    /// I2C device address
    pub address: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Recording PWM and a constant-rate IMU
    Sim,

    /// GPIO software PWM and the MPU6050 over I2C
    Hardware,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CarExecParams {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            pins: PinParams::default(),
            steering: ServoLimits::steering(),
            esc: EscPulses::default(),
            gimbal: ServoLimits::gimbal(),
            pwm_period_ms: 20,
            transmission_gear: 8,
            correction: CorrectionParams::default(),
            imu: ImuParams {
                bus: 1,
                address: MPU6050_ADDRESS,
            },
            camera_command: vec!["mediamtx".into(), "mediamtx.yml".into()],
            camera_stop_timeout_ms: 2000,
        }
    }
}

impl Default for PinParams {
    fn default() -> Self {
        Self {
            steering: 17,
            esc: 23,
            esc_enable: 25,
            gimbal_mode: 27,
            gimbal_pitch: 22,
            gimbal_yaw: 24,
        }
    }
}
