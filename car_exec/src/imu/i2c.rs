//! [`ImuBus`] implementation for the Raspberry Pi I2C peripheral

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use rppal::i2c::I2c;

use super::{ImuBus, ImuError, ImuSource, Mpu6050};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An I2C bus addressed to a single device.
pub struct I2cBus {
    i2c: I2c,
}

/// Opens an MPU6050 on the given bus and address.
pub struct I2cImuSource {
    pub bus: u8,
    pub address: u16,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl I2cBus {
    pub fn open(bus: u8, address: u16) -> Result<Self, ImuError> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| ImuError::OpenFailed(e.to_string()))?;

        i2c.set_slave_address(address)
            .map_err(|e| ImuError::OpenFailed(e.to_string()))?;

        Ok(Self { i2c })
    }
}

impl ImuBus for I2cBus {
    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), ImuError> {
        self.i2c
            .smbus_write_byte(register, value)
            .map_err(|e| ImuError::WriteFailed(register, e.to_string()))
    }

    fn read_byte(&mut self, register: u8) -> Result<u8, ImuError> {
        self.i2c
            .smbus_read_byte(register)
            .map_err(|e| ImuError::ReadFailed(register, e.to_string()))
    }
}

impl ImuSource for I2cImuSource {
    type Sensor = Mpu6050<I2cBus>;

    fn open(&mut self) -> Result<Self::Sensor, ImuError> {
        Mpu6050::new(I2cBus::open(self.bus, self.address)?)
    }
}
