//! # PWM Driver Module
//!
//! This module provides the output seam between the car and its hardware. The car only ever asks
//! a [`PwmDriver`] to hold a pulse width on a pin, or to drive a pin high or low.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`PwmDriver`] implementation using software PWM on the Raspberry Pi GPIO.
#[cfg(feature = "hardware")]
pub mod gpio;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of writes a [`SimPwm`] keeps. Older writes are discarded.
pub const SIM_RECORD_LEN: usize = 1024;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for driving servo and ESC outputs.
pub trait PwmDriver: Send {
    /// Hold the given pulse width on a channel.
    ///
    /// ## Arguments
    /// - `channel` - The BCM pin number of the output
    /// - `pulse_us` - The pulse width in microseconds
    fn set_pulse_width(&mut self, channel: u8, pulse_us: u32) -> Result<(), PwmError>;

    /// Drive a channel as a plain digital output.
    fn set_level(&mut self, channel: u8, high: bool) -> Result<(), PwmError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated PWM driver which records the last [`SIM_RECORD_LEN`] writes.
///
/// Clones share the same record, so a test can keep one handle while the car owns another.
#[derive(Debug, Clone, Default)]
pub struct SimPwm {
    writes: Arc<Mutex<VecDeque<PwmWrite>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum PwmError {
    #[error("Could not access the GPIO peripheral: {0}")]
    GpioUnavailable(String),

    #[error("Could not write to channel {0}: {1}")]
    WriteFailed(u8, String),

    #[error("The simulated driver's record is poisoned")]
    RecordPoisoned,
}

/// A single write made to a [`SimPwm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmWrite {
    Pulse { channel: u8, pulse_us: u32 },
    Level { channel: u8, high: bool },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded writes, oldest first.
    pub fn writes(&self) -> Vec<PwmWrite> {
        match self.writes.lock() {
            Ok(w) => w.iter().copied().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Pulse widths written to `channel`, oldest first.
    pub fn pulses_on(&self, channel: u8) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                PwmWrite::Pulse {
                    channel: c,
                    pulse_us,
                } if c == channel => Some(pulse_us),
                _ => None,
            })
            .collect()
    }

    /// Last pulse width written to `channel`.
    pub fn last_pulse(&self, channel: u8) -> Option<u32> {
        self.pulses_on(channel).last().copied()
    }

    fn record(&self, write: PwmWrite) -> Result<(), PwmError> {
        let mut writes = self.writes.lock().map_err(|_| PwmError::RecordPoisoned)?;

        if writes.len() == SIM_RECORD_LEN {
            writes.pop_front();
        }
        writes.push_back(write);

        Ok(())
    }
}

impl PwmDriver for SimPwm {
    fn set_pulse_width(&mut self, channel: u8, pulse_us: u32) -> Result<(), PwmError> {
        self.record(PwmWrite::Pulse { channel, pulse_us })
    }

    fn set_level(&mut self, channel: u8, high: bool) -> Result<(), PwmError> {
        self.record(PwmWrite::Level { channel, high })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
