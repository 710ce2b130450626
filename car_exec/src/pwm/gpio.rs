//! [`PwmDriver`] implementation for the Raspberry Pi GPIO header

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{hash_map::Entry, HashMap};
use std::time::Duration;

use log::debug;
use rppal::gpio::{Gpio, OutputPin};

use super::{PwmDriver, PwmError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Software PWM on BCM pins. Pins are claimed as outputs on first use.
pub struct GpioPwm {
    gpio: Gpio,
    pins: HashMap<u8, OutputPin>,
    period: Duration,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GpioPwm {
    /// Open the GPIO peripheral. `period` is the servo frame period, usually 20 ms.
    pub fn new(period: Duration) -> Result<Self, PwmError> {
        let gpio = Gpio::new().map_err(|e| PwmError::GpioUnavailable(e.to_string()))?;

        Ok(Self {
            gpio,
            pins: HashMap::new(),
            period,
        })
    }

    fn pin(&mut self, channel: u8) -> Result<&mut OutputPin, PwmError> {
        match self.pins.entry(channel) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                let pin = self
                    .gpio
                    .get(channel)
                    .map_err(|e| PwmError::WriteFailed(channel, e.to_string()))?
                    .into_output();

                debug!("Claimed BCM pin {} as output", channel);

                Ok(v.insert(pin))
            }
        }
    }
}

impl PwmDriver for GpioPwm {
    fn set_pulse_width(&mut self, channel: u8, pulse_us: u32) -> Result<(), PwmError> {
        let period = self.period;

        self.pin(channel)?
            .set_pwm(period, Duration::from_micros(pulse_us as u64))
            .map_err(|e| PwmError::WriteFailed(channel, e.to_string()))
    }

    fn set_level(&mut self, channel: u8, high: bool) -> Result<(), PwmError> {
        let pin = self.pin(channel)?;

        if high {
            pin.set_high();
        } else {
            pin.set_low();
        }

        Ok(())
    }
}
