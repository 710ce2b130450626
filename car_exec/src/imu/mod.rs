//! # IMU Module
//!
//! Gyroscope access for the steering correction loop. The correction loop only needs the raw yaw
//! rate, so a sensor is anything implementing [`GyroSensor`]. Sensors are opened on demand through
//! an [`ImuSource`], as the sensor is released whenever steering calibration is turned off.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ImuBus`] implementation on the Raspberry Pi I2C peripheral.
#[cfg(feature = "hardware")]
pub mod i2c;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, AtomicI32, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default I2C address of the MPU6050.
pub const MPU6050_ADDRESS: u16 = 0x68;

/// Power management register, written with zero to wake the device.
const PWR_MGMT_1: u8 = 0x6B;

/// High byte of the gyroscope Z axis output. The low byte follows it.
const GYRO_ZOUT_H: u8 = 0x47;

/// Gyroscope sensitivity at the default ±250 °/s range.
///
/// Units: LSB per degree per second
pub const GYRO_SENSITIVITY: f32 = 131.0;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Byte-wise register access to a device on a bus.
pub trait ImuBus: Send {
    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), ImuError>;

    fn read_byte(&mut self, register: u8) -> Result<u8, ImuError>;
}

/// A gyroscope able to report its raw yaw rate.
pub trait GyroSensor: Send {
    /// Raw Z axis rate as reported by the device.
    fn read_gyro_z(&mut self) -> Result<i16, ImuError>;
}

/// Opens a fresh gyroscope whenever steering calibration starts.
pub trait ImuSource: Send {
    type Sensor: GyroSensor + 'static;

    fn open(&mut self) -> Result<Self::Sensor, ImuError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// MPU6050 accelerometer and gyroscope.
pub struct Mpu6050<B: ImuBus> {
    bus: B,
}

/// Simulated gyroscope returning a settable raw value.
#[derive(Debug, Clone)]
pub struct SimImu {
    raw: Arc<AtomicI32>,
}

/// Source of [`SimImu`] sensors which all share the same raw value.
#[derive(Debug, Clone)]
pub struct SimImuSource {
    raw: Arc<AtomicI32>,
    available: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ImuError {
    #[error("Could not open the IMU bus: {0}")]
    OpenFailed(String),

    #[error("Could not read register 0x{0:02X}: {1}")]
    ReadFailed(u8, String),

    #[error("Could not write register 0x{0:02X}: {1}")]
    WriteFailed(u8, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<B: ImuBus> Mpu6050<B> {
    /// Wake the device and wait for it to start up.
    pub fn new(mut bus: B) -> Result<Self, ImuError> {
        bus.write_byte(PWR_MGMT_1, 0x00)?;
        thread::sleep(Duration::from_millis(100));

        Ok(Self { bus })
    }
}

impl<B: ImuBus> GyroSensor for Mpu6050<B> {
    fn read_gyro_z(&mut self) -> Result<i16, ImuError> {
        let high = self.bus.read_byte(GYRO_ZOUT_H)?;
        let low = self.bus.read_byte(GYRO_ZOUT_H + 1)?;

        Ok(i16::from_be_bytes([high, low]))
    }
}

impl SimImu {
    /// Set the raw rate returned by every sensor sharing this value.
    pub fn set_raw(&self, raw: i16) {
        self.raw.store(raw as i32, Ordering::Relaxed);
    }
}

impl GyroSensor for SimImu {
    fn read_gyro_z(&mut self) -> Result<i16, ImuError> {
        Ok(self.raw.load(Ordering::Relaxed) as i16)
    }
}

impl SimImuSource {
    /// A source whose sensors start at the given raw rate.
    pub fn new(raw: i16) -> Self {
        Self {
            raw: Arc::new(AtomicI32::new(raw as i32)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle to the shared raw value.
    pub fn handle(&self) -> SimImu {
        SimImu {
            raw: self.raw.clone(),
        }
    }

    /// Make future `open` calls fail, as if the device were unplugged.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }
}

impl Default for SimImuSource {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ImuSource for SimImuSource {
    type Sensor = SimImu;

    fn open(&mut self) -> Result<SimImu, ImuError> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(ImuError::OpenFailed("simulated IMU unavailable".into()));
        }

        Ok(self.handle())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
