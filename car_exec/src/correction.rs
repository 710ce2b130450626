//! # Steering correction loop
//!
//! Holds the car straight while no manual turn is active. A background thread reads the yaw rate,
//! converts it into a smoothed counter-steer angle and writes it to the steering servo.
//!
//! The manual turn flag is checked twice per cycle: once without blocking, and again after the PWM
//! lock is taken. Manual commands set the flag while holding the same lock, so no correction write
//! can follow a manual turn until the turn is reset.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use util::maths::clamp;

use crate::{
    imu::{GyroSensor, ImuError, GYRO_SENSITIVITY},
    mapping::{steering_pulse, ServoLimits},
    pwm::{PwmDriver, PwmError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Tuning of the correction loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionParams {
    /// Counter-steer per unit of yaw rate.
    ///
    /// Units: degrees per (degree per second)
    pub scaling_factor: f32,

    /// Yaw rates at or below this are ignored.
    ///
    /// Units: degrees per second
    pub deadzone_dps: f32,

    /// Largest correction in either direction.
    ///
    /// Units: degrees
    pub max_correction_deg: f32,

    /// Weight of each new correction in the exponential smoothing
    pub smoothing_alpha: f32,

    /// Steering angle driving straight ahead.
    ///
    /// Units: degrees
    pub neutral_deg: f32,

    /// Loop period.
    ///
    /// Units: milliseconds
    pub period_ms: u64,

    /// Samples averaged to find the gyroscope offset
    pub calibration_samples: u32,

    /// Delay between calibration samples.
    ///
    /// Units: milliseconds
    pub calibration_interval_ms: u64,

    /// Time given to the steering to centre before the loop starts.
    ///
    /// Units: milliseconds
    pub settle_ms: u64,
}

/// Filter state carried between cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorrectionState {
    /// Gyroscope reading at rest.
    ///
    /// Units: degrees per second
    pub gyro_offset: f32,

    /// Smoothed correction of the previous cycle.
    ///
    /// Units: degrees
    pub previous_correction: f32,
}

/// Everything the loop shares with the car.
pub struct SteeringOutput<P: PwmDriver> {
    pub pwm: Arc<Mutex<P>>,
    pub manual_turn: Arc<AtomicBool>,
    pub channel: u8,
    pub limits: ServoLimits,
}

/// Handle to a running correction loop. Dropping the handle stops the loop.
pub struct CorrectionLoop {
    stop: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Outcome of a single correction cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// The steering was written with this angle
    Written(f32),

    /// A manual turn is active, nothing was written
    Suppressed,
}

#[derive(thiserror::Error, Debug)]
pub enum CorrectionError {
    #[error("Could not read the gyroscope: {0}")]
    Imu(#[from] ImuError),

    #[error("Could not write the steering: {0}")]
    Pwm(#[from] PwmError),

    #[error("The PWM driver lock is poisoned")]
    LockPoisoned,

    #[error("Could not start the correction thread: {0}")]
    SpawnFailed(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CorrectionParams {
    fn default() -> Self {
        Self {
            scaling_factor: 15.0,
            deadzone_dps: 0.5,
            max_correction_deg: 30.0,
            smoothing_alpha: 0.05,
            neutral_deg: 90.0,
            period_ms: 20,
            calibration_samples: 100,
            calibration_interval_ms: 10,
            settle_ms: 1000,
        }
    }
}

impl CorrectionState {
    /// Average `params.calibration_samples` readings, blocking for the whole calibration.
    pub fn calibrate<G: GyroSensor>(
        sensor: &mut G,
        params: &CorrectionParams,
    ) -> Result<Self, ImuError> {
        let samples = params.calibration_samples.max(1);
        let mut sum = 0f32;

        for _ in 0..samples {
            sum += sensor.read_gyro_z()? as f32 / GYRO_SENSITIVITY;
            thread::sleep(Duration::from_millis(params.calibration_interval_ms));
        }

        let gyro_offset = sum / samples as f32;
        info!("Gyro Z offset: {:.2} °/s", gyro_offset);

        Ok(Self {
            gyro_offset,
            previous_correction: 0.0,
        })
    }

    /// Advance the filter with one raw reading and return the target steering angle.
    pub fn step(&mut self, raw: i16, params: &CorrectionParams) -> f32 {
        let velocity = raw as f32 / GYRO_SENSITIVITY - self.gyro_offset;

        let raw_correction = if velocity.abs() > params.deadzone_dps {
            -velocity * params.scaling_factor
        } else {
            0.0
        };

        let raw_correction = clamp(
            raw_correction,
            -params.max_correction_deg,
            params.max_correction_deg,
        );

        let smoothed = self.previous_correction
            + (raw_correction - self.previous_correction) * params.smoothing_alpha;
        self.previous_correction = smoothed;

        clamp(params.neutral_deg + smoothed, 0.0, 180.0)
    }
}

impl<P: PwmDriver> SteeringOutput<P> {
    /// Write `degrees` to the steering unless a manual turn is active.
    pub fn write_unless_manual(&self, degrees: f32) -> Result<CycleOutcome, CorrectionError> {
        // Cheap check first, without waiting on the command path
        if self.manual_turn.load(Ordering::Acquire) {
            return Ok(CycleOutcome::Suppressed);
        }

        let mut pwm = self.pwm.lock().map_err(|_| CorrectionError::LockPoisoned)?;

        // The flag may have been raised while we waited for the lock
        if self.manual_turn.load(Ordering::Acquire) {
            return Ok(CycleOutcome::Suppressed);
        }

        pwm.set_pulse_width(self.channel, steering_pulse(degrees, &self.limits))?;

        Ok(CycleOutcome::Written(degrees))
    }
}

impl<P: PwmDriver> Clone for SteeringOutput<P> {
    fn clone(&self) -> Self {
        Self {
            pwm: self.pwm.clone(),
            manual_turn: self.manual_turn.clone(),
            channel: self.channel,
            limits: self.limits,
        }
    }
}

impl CorrectionLoop {
    /// Spawn the loop thread. The sensor is moved into the thread and dropped when it exits.
    pub fn spawn<G, P>(
        mut sensor: G,
        mut state: CorrectionState,
        params: CorrectionParams,
        output: SteeringOutput<P>,
    ) -> Result<Self, CorrectionError>
    where
        G: GyroSensor + 'static,
        P: PwmDriver + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();

        let join_handle = thread::Builder::new()
            .name("steering_correction".into())
            .spawn(move || {
                let period = Duration::from_millis(params.period_ms);

                while !stop_clone.load(Ordering::Relaxed) {
                    if let Err(e) = run_cycle(&mut sensor, &mut state, &params, &output) {
                        warn!("Steering correction cycle failed: {}", e);
                    }

                    thread::sleep(period);
                }

                debug!("Steering correction thread exiting");
            })
            .map_err(CorrectionError::SpawnFailed)?;

        Ok(Self {
            stop,
            join_handle: Some(join_handle),
        })
    }

    /// True while the loop thread is running.
    pub fn is_running(&self) -> bool {
        self.join_handle.is_some() && !self.stop.load(Ordering::Relaxed)
    }

    /// Ask the loop to stop and wait for the current cycle to finish.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(jh) = self.join_handle.take() {
            if jh.join().is_err() {
                warn!("Steering correction thread panicked");
            }
        }
    }
}

impl Drop for CorrectionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read the gyroscope once, advance the filter and write the result.
pub fn run_cycle<G: GyroSensor, P: PwmDriver>(
    sensor: &mut G,
    state: &mut CorrectionState,
    params: &CorrectionParams,
    output: &SteeringOutput<P>,
) -> Result<CycleOutcome, CorrectionError> {
    let raw = sensor.read_gyro_z()?;
    let target = state.step(raw, params);

    output.write_unless_manual(target)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::imu::{ImuSource, SimImuSource};
    use crate::pwm::SimPwm;

    fn quick_params() -> CorrectionParams {
        CorrectionParams {
            period_ms: 1,
            calibration_samples: 5,
            calibration_interval_ms: 0,
            settle_ms: 0,
            ..Default::default()
        }
    }

    fn output(pwm: &SimPwm) -> SteeringOutput<SimPwm> {
        SteeringOutput {
            pwm: Arc::new(Mutex::new(pwm.clone())),
            manual_turn: Arc::new(AtomicBool::new(false)),
            channel: 17,
            limits: ServoLimits::steering(),
        }
    }

    #[test]
    fn test_calibrate_offset() {
        let mut source = SimImuSource::new(262);
        let mut sensor = source.open().unwrap();

        let state = CorrectionState::calibrate(&mut sensor, &quick_params()).unwrap();

        assert!((state.gyro_offset - 2.0).abs() < 1e-6);
        assert_eq!(state.previous_correction, 0.0);
    }

    #[test]
    fn test_step_filter() {
        let params = CorrectionParams::default();
        let mut state = CorrectionState::default();

        // Inside the deadzone nothing changes
        assert_eq!(state.step(50, &params), 90.0);

        // 1 °/s to the left: raw correction -15, smoothed -0.75
        let target = state.step(131, &params);
        assert!((target - 89.25).abs() < 1e-4);
        assert!((state.previous_correction + 0.75).abs() < 1e-5);

        // Large rates saturate at the max correction before smoothing
        let mut state = CorrectionState::default();
        let target = state.step(-131 * 100, &params);
        assert!((target - 91.5).abs() < 1e-4);

        // Repeated saturation converges towards neutral + max correction, never past it
        for _ in 0..1000 {
            state.step(-131 * 100, &params);
        }
        let target = state.step(-131 * 100, &params);
        assert!(target <= 120.0 && target > 119.0);
    }

    #[test]
    fn test_step_subtracts_offset() {
        let params = CorrectionParams::default();
        let mut state = CorrectionState {
            gyro_offset: 2.0,
            previous_correction: 0.0,
        };

        assert_eq!(state.step(262, &params), 90.0);
    }

    #[test]
    fn test_manual_turn_suppresses_writes() {
        let pwm = SimPwm::new();
        let out = output(&pwm);
        let params = CorrectionParams::default();
        let mut state = CorrectionState::default();
        let mut sensor = SimImuSource::new(131 * 4).handle();

        assert!(matches!(
            run_cycle(&mut sensor, &mut state, &params, &out).unwrap(),
            CycleOutcome::Written(_)
        ));
        let writes_before = pwm.pulses_on(17).len();

        out.manual_turn.store(true, Ordering::Release);
        for _ in 0..10 {
            assert_eq!(
                run_cycle(&mut sensor, &mut state, &params, &out).unwrap(),
                CycleOutcome::Suppressed
            );
        }
        assert_eq!(pwm.pulses_on(17).len(), writes_before);

        out.manual_turn.store(false, Ordering::Release);
        run_cycle(&mut sensor, &mut state, &params, &out).unwrap();
        assert_eq!(pwm.pulses_on(17).len(), writes_before + 1);
    }

    #[test]
    fn test_loop_start_stop() {
        let pwm = SimPwm::new();
        let out = output(&pwm);
        let mut source = SimImuSource::new(0);

        let mut lp = CorrectionLoop::spawn(
            source.open().unwrap(),
            CorrectionState::default(),
            quick_params(),
            out,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(lp.is_running());

        lp.stop();
        assert!(!lp.is_running());

        let written = pwm.pulses_on(17);
        assert!(!written.is_empty());
        assert!(written.iter().all(|p| *p == 1500));

        // No writes after stop returns
        thread::sleep(Duration::from_millis(20));
        assert_eq!(pwm.pulses_on(17).len(), written.len());
    }
}
