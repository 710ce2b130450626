//! # Actuator controller
//!
//! The [`ActuatorController`] trait exposes one operation per command the car accepts. [`Car`]
//! implements it over any [`PwmDriver`] and [`ImuSource`], so the same logic drives the real
//! hardware and the simulated doubles used in tests.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::thread;
use std::time::Duration;

use comms_if::cmd::{ActuatorCommand, Direction};
use log::{debug, error, info, warn};
use util::maths::clamp;

use crate::{
    camera::{Camera, CameraError},
    correction::{CorrectionError, CorrectionLoop, CorrectionState, SteeringOutput},
    imu::{ImuError, ImuSource, SimImuSource},
    mapping::{esc_pulse, gimbal_pulse, limit_speed, steering_pulse, MAX_GEAR, MAX_SPEED, MIN_GEAR},
    params::CarExecParams,
    pwm::{PwmDriver, PwmError, SimPwm},
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Operations of the actuator node.
pub trait ActuatorController {
    /// Steer to `degrees`, start the ESC in neutral and centre the gimbal. `speed` becomes the
    /// upper limit for later moves.
    fn init(&mut self, speed: i32, degrees: f32) -> Result<(), CarError>;

    /// Steer to an absolute angle and hold it against the correction loop.
    fn turn_to(&mut self, degrees: f32) -> Result<(), CarError>;

    /// Steer to `degrees` and hand the steering back to the correction loop.
    fn reset_turns(&mut self, degrees: f32) -> Result<(), CarError>;

    /// Steer to a new straight-ahead trim angle, held like [`ActuatorController::turn_to`].
    fn change_degree_of_turns(&mut self, degrees: f32) -> Result<(), CarError>;

    /// Drive at `speed` percent, limited by the gear and the `init` speed.
    fn drive(&mut self, speed: i32, direction: Direction) -> Result<(), CarError>;

    fn set_esc_neutral(&mut self) -> Result<(), CarError>;

    fn camera_start(&mut self) -> Result<(), CarError>;

    fn camera_stop(&mut self) -> Result<(), CarError>;

    fn gimbal_turn_to(&mut self, degrees: f32) -> Result<(), CarError>;

    fn gimbal_set_pitch(&mut self, degrees: f32) -> Result<(), CarError>;

    fn reset_gimbal(&mut self) -> Result<(), CarError>;

    /// Start (after a blocking calibration) or stop the steering correction loop.
    fn steering_calibration(&mut self, on: bool) -> Result<(), CarError>;

    /// Select the transmission gear, clamped to 1..=8.
    fn set_transmission_gear(&mut self, gear: i32);

    /// Snapshot of the actuator state.
    fn state(&self) -> ActuatorState;

    /// Dispatch a decoded command to its operation. Unknown commands are ignored.
    fn apply(&mut self, cmd: &ActuatorCommand) -> Result<(), CarError> {
        match *cmd {
            ActuatorCommand::Init { speed, degrees } => self.init(speed, degrees),
            ActuatorCommand::TurnTo { degrees } => self.turn_to(degrees),
            ActuatorCommand::ResetTurns { degrees } => self.reset_turns(degrees),
            ActuatorCommand::ChangeDegreeOfTurns { degrees } => {
                self.change_degree_of_turns(degrees)
            }
            ActuatorCommand::Move { speed, direction } => self.drive(speed, direction),
            ActuatorCommand::SetEscNeutral => self.set_esc_neutral(),
            ActuatorCommand::CameraStart => self.camera_start(),
            ActuatorCommand::CameraStop => self.camera_stop(),
            ActuatorCommand::GimbalTurnTo { degrees } => self.gimbal_turn_to(degrees),
            ActuatorCommand::GimbalSetPitch { degrees } => self.gimbal_set_pitch(degrees),
            ActuatorCommand::ResetGimbal => self.reset_gimbal(),
            ActuatorCommand::SteeringCalibration { on } => self.steering_calibration(on),
            ActuatorCommand::Unknown => {
                debug!("Ignoring unknown command");
                Ok(())
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Snapshot of the logical actuator state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorState {
    /// Last commanded steering angle, [0, 180] degrees
    pub turn_degrees: f32,

    /// Last commanded gimbal yaw, [-90, 90] degrees
    pub yaw_degrees: f32,

    /// Last commanded gimbal pitch, [-90, 90] degrees
    pub pitch_angle: i32,

    /// Applied speed after all limits, [0, 100] percent
    pub speed: i32,

    /// Transmission gear, [1, 8]
    pub transmission_gear: i32,

    /// Speed limit set by `init`, [0, 100] percent
    pub speed_limit: i32,

    /// True while a manual turn holds the steering
    pub is_manual_turn_active: bool,

    /// True while the steering correction loop runs
    pub is_correction_active: bool,
}

/// The car's actuators.
pub struct Car<P, S>
where
    P: PwmDriver + 'static,
    S: ImuSource,
{
    params: CarExecParams,

    pwm: Arc<Mutex<P>>,
    manual_turn: Arc<AtomicBool>,

    imu_source: S,
    correction: Option<CorrectionLoop>,

    camera: Camera,

    turn_degrees: f32,
    yaw_degrees: f32,
    pitch_angle: i32,
    speed: i32,
    transmission_gear: i32,
    speed_limit: i32,
}

/// A car driving simulated outputs.
pub type SimCar = Car<SimPwm, SimImuSource>;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum CarError {
    #[error("PWM driver error: {0}")]
    Pwm(#[from] PwmError),

    #[error("The PWM driver lock is poisoned")]
    LockPoisoned,

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Could not start steering calibration: {0}")]
    Imu(#[from] ImuError),

    #[error("Steering correction error: {0}")]
    Correction(#[from] CorrectionError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<P, S> Car<P, S>
where
    P: PwmDriver + 'static,
    S: ImuSource,
{
    /// Create a new car. Nothing is written to the outputs until a command arrives.
    pub fn new(params: CarExecParams, pwm: P, imu_source: S) -> Self {
        let transmission_gear = clamp(params.transmission_gear, MIN_GEAR, MAX_GEAR);
        let camera = Camera::new(
            params.camera_command.clone(),
            Duration::from_millis(params.camera_stop_timeout_ms),
        );
        let neutral = params.correction.neutral_deg;

        Self {
            params,
            pwm: Arc::new(Mutex::new(pwm)),
            manual_turn: Arc::new(AtomicBool::new(false)),
            imu_source,
            correction: None,
            camera,
            turn_degrees: neutral,
            yaw_degrees: 0.0,
            pitch_angle: 0,
            speed: 0,
            transmission_gear,
            speed_limit: MAX_SPEED,
        }
    }

    /// Stop the correction loop, put the ESC in neutral and stop the camera helper.
    pub fn shutdown(&mut self) -> Result<(), CarError> {
        info!("Shutting down actuators");

        self.steering_calibration(false)?;
        self.set_esc_neutral()?;
        self.camera_stop()
    }

    fn lock_pwm(&self) -> Result<MutexGuard<'_, P>, CarError> {
        self.pwm.lock().map_err(|_| CarError::LockPoisoned)
    }

    /// Write the steering, optionally changing the manual turn flag under the same lock.
    fn write_steering(&mut self, degrees: f32, manual: Option<bool>) -> Result<(), CarError> {
        let degrees = clamp(degrees, 0.0, 180.0);
        let pulse = steering_pulse(degrees, &self.params.steering);
        let channel = self.params.pins.steering;

        {
            let mut pwm = self.lock_pwm()?;

            if let Some(m) = manual {
                self.manual_turn.store(m, Ordering::Release);
            }

            pwm.set_pulse_width(channel, pulse)?;
        }

        self.turn_degrees = degrees;
        debug!("Steering {:.2}° ({} µs)", degrees, pulse);

        Ok(())
    }

    fn write_pulse(&self, channel: u8, pulse_us: u32) -> Result<(), CarError> {
        self.lock_pwm()?.set_pulse_width(channel, pulse_us)?;

        Ok(())
    }
}

impl<P, S> ActuatorController for Car<P, S>
where
    P: PwmDriver + 'static,
    S: ImuSource,
{
    fn init(&mut self, speed: i32, degrees: f32) -> Result<(), CarError> {
        info!("Initialising actuators (speed limit {}, steering {:.2}°)", speed, degrees);

        self.write_steering(degrees, None)?;

        let pins = self.params.pins;
        let gimbal_centre = gimbal_pulse(0.0, &self.params.gimbal);

        {
            let mut pwm = self.lock_pwm()?;

            // Neutral must be held before the ESC is powered
            pwm.set_pulse_width(pins.esc, self.params.esc.neutral_pulse_us)?;
            pwm.set_level(pins.esc_enable, true)?;

            pwm.set_pulse_width(pins.gimbal_mode, self.params.gimbal.max_pulse_us)?;
            pwm.set_pulse_width(pins.gimbal_yaw, gimbal_centre)?;
            pwm.set_pulse_width(pins.gimbal_pitch, gimbal_centre)?;
        }

        self.speed = 0;
        self.speed_limit = clamp(speed, 0, MAX_SPEED);
        self.yaw_degrees = 0.0;
        self.pitch_angle = 0;

        Ok(())
    }

    fn turn_to(&mut self, degrees: f32) -> Result<(), CarError> {
        self.write_steering(degrees, Some(true))
    }

    fn reset_turns(&mut self, degrees: f32) -> Result<(), CarError> {
        self.write_steering(degrees, Some(false))
    }

    fn change_degree_of_turns(&mut self, degrees: f32) -> Result<(), CarError> {
        self.write_steering(degrees, Some(true))
    }

    fn drive(&mut self, speed: i32, direction: Direction) -> Result<(), CarError> {
        let applied = limit_speed(speed, self.transmission_gear, self.speed_limit);
        if applied != speed {
            debug!(
                "Requested speed {} limited to {} (gear {}, limit {})",
                speed, applied, self.transmission_gear, self.speed_limit
            );
        }

        let pulse = esc_pulse(applied, direction, &self.params.esc);
        self.write_pulse(self.params.pins.esc, pulse)?;
        self.speed = applied;

        Ok(())
    }

    fn set_esc_neutral(&mut self) -> Result<(), CarError> {
        self.write_pulse(self.params.pins.esc, self.params.esc.neutral_pulse_us)?;
        self.speed = 0;

        Ok(())
    }

    fn camera_start(&mut self) -> Result<(), CarError> {
        Ok(self.camera.start()?)
    }

    fn camera_stop(&mut self) -> Result<(), CarError> {
        Ok(self.camera.stop()?)
    }

    fn gimbal_turn_to(&mut self, degrees: f32) -> Result<(), CarError> {
        let degrees = clamp(degrees, -90.0, 90.0);

        self.write_pulse(
            self.params.pins.gimbal_yaw,
            gimbal_pulse(degrees, &self.params.gimbal),
        )?;
        self.yaw_degrees = degrees;

        Ok(())
    }

    fn gimbal_set_pitch(&mut self, degrees: f32) -> Result<(), CarError> {
        let degrees = clamp(degrees, -90.0, 90.0);

        self.write_pulse(
            self.params.pins.gimbal_pitch,
            gimbal_pulse(degrees, &self.params.gimbal),
        )?;
        self.pitch_angle = degrees.round() as i32;

        Ok(())
    }

    fn reset_gimbal(&mut self) -> Result<(), CarError> {
        self.gimbal_turn_to(0.0)
    }

    fn steering_calibration(&mut self, on: bool) -> Result<(), CarError> {
        if !on {
            if let Some(mut lp) = self.correction.take() {
                lp.stop();
                info!("Steering correction stopped");
            }
            return Ok(());
        }

        if self.correction.is_some() {
            debug!("Steering correction already running");
            return Ok(());
        }

        let correction_params = self.params.correction.clone();

        let mut sensor = self.imu_source.open()?;
        info!("Calibrating gyro...");
        let state = CorrectionState::calibrate(&mut sensor, &correction_params)?;

        self.write_steering(correction_params.neutral_deg, None)?;
        thread::sleep(Duration::from_millis(correction_params.settle_ms));

        let output = SteeringOutput {
            pwm: self.pwm.clone(),
            manual_turn: self.manual_turn.clone(),
            channel: self.params.pins.steering,
            limits: self.params.steering,
        };

        self.correction = Some(CorrectionLoop::spawn(
            sensor,
            state,
            correction_params,
            output,
        )?);
        info!("Steering correction running");

        Ok(())
    }

    fn set_transmission_gear(&mut self, gear: i32) {
        let clamped = clamp(gear, MIN_GEAR, MAX_GEAR);
        if clamped != gear {
            warn!("Gear {} out of range, using {}", gear, clamped);
        }
        self.transmission_gear = clamped;
    }

    fn state(&self) -> ActuatorState {
        ActuatorState {
            turn_degrees: self.turn_degrees,
            yaw_degrees: self.yaw_degrees,
            pitch_angle: self.pitch_angle,
            speed: self.speed,
            transmission_gear: self.transmission_gear,
            speed_limit: self.speed_limit,
            is_manual_turn_active: self.manual_turn.load(Ordering::Acquire),
            is_correction_active: self.correction.is_some(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Apply a command to a shared controller, logging any failure.
///
/// Returns `false` if the command failed. A failure never stops later commands from being applied.
pub fn dispatch<C: ActuatorController>(car: &Mutex<C>, cmd: &ActuatorCommand, origin: &str) -> bool {
    debug!("{} from {}", cmd.action_name(), origin);

    let mut car = match car.lock() {
        Ok(c) => c,
        Err(_) => {
            error!("Car lock poisoned, dropping {}", cmd.action_name());
            return false;
        }
    };

    match car.apply(cmd) {
        Ok(_) => true,
        Err(e) => {
            warn!("Could not apply {} from {}: {}", cmd.action_name(), origin, e);
            false
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{correction::CorrectionParams, pwm::PwmWrite};

    fn sim_car(imu: &SimImuSource) -> (SimCar, SimPwm) {
        let params = CarExecParams {
            correction: CorrectionParams {
                period_ms: 1,
                calibration_samples: 3,
                calibration_interval_ms: 0,
                settle_ms: 0,
                ..Default::default()
            },
            camera_command: vec!["sleep".into(), "30".into()],
            ..Default::default()
        };

        let pwm = SimPwm::new();
        (Car::new(params, pwm.clone(), imu.clone()), pwm)
    }

    #[test]
    fn test_turn_to_pulse() {
        let (mut car, pwm) = sim_car(&SimImuSource::default());

        car.apply(&ActuatorCommand::TurnTo { degrees: 90.0 }).unwrap();

        assert_eq!(pwm.last_pulse(17), Some(1500));
        assert!(car.state().is_manual_turn_active);

        car.apply(&ActuatorCommand::ResetTurns { degrees: 83.0 })
            .unwrap();
        assert_eq!(pwm.last_pulse(17), Some(1422));
        assert!(!car.state().is_manual_turn_active);

        car.apply(&ActuatorCommand::ChangeDegreeOfTurns { degrees: 250.0 })
            .unwrap();
        assert_eq!(pwm.last_pulse(17), Some(2500));
        assert_eq!(car.state().turn_degrees, 180.0);
        assert!(car.state().is_manual_turn_active);
    }

    #[test]
    fn test_speed_capped_by_gear() {
        let (mut car, pwm) = sim_car(&SimImuSource::default());

        car.set_transmission_gear(1);
        car.apply(&ActuatorCommand::Move {
            speed: 100,
            direction: Direction::Forward,
        })
        .unwrap();

        assert_eq!(car.state().speed, 20);
        assert_eq!(pwm.last_pulse(23), Some(1600));

        car.set_transmission_gear(4);
        car.drive(100, Direction::Backward).unwrap();
        assert_eq!(car.state().speed, 100);
        assert_eq!(pwm.last_pulse(23), Some(1000));

        car.set_transmission_gear(12);
        assert_eq!(car.state().transmission_gear, 8);
        car.set_transmission_gear(-3);
        assert_eq!(car.state().transmission_gear, 1);

        car.set_esc_neutral().unwrap();
        assert_eq!(pwm.last_pulse(23), Some(1500));
        assert_eq!(car.state().speed, 0);
    }

    #[test]
    fn test_init_order_and_speed_limit() {
        let (mut car, pwm) = sim_car(&SimImuSource::default());

        car.apply(&ActuatorCommand::Init {
            speed: 50,
            degrees: 83.0,
        })
        .unwrap();

        assert_eq!(
            pwm.writes(),
            vec![
                PwmWrite::Pulse {
                    channel: 17,
                    pulse_us: 1422
                },
                PwmWrite::Pulse {
                    channel: 23,
                    pulse_us: 1500
                },
                PwmWrite::Level {
                    channel: 25,
                    high: true
                },
                PwmWrite::Pulse {
                    channel: 27,
                    pulse_us: 2000
                },
                PwmWrite::Pulse {
                    channel: 24,
                    pulse_us: 1500
                },
                PwmWrite::Pulse {
                    channel: 22,
                    pulse_us: 1500
                },
            ]
        );

        car.drive(100, Direction::Forward).unwrap();
        assert_eq!(car.state().speed, 50);
        assert_eq!(car.state().speed_limit, 50);
    }

    #[test]
    fn test_gimbal() {
        let (mut car, pwm) = sim_car(&SimImuSource::default());

        car.apply(&ActuatorCommand::GimbalSetPitch { degrees: 120.0 })
            .unwrap();
        assert_eq!(car.state().pitch_angle, 90);
        assert_eq!(pwm.last_pulse(22), Some(2000));

        car.apply(&ActuatorCommand::GimbalTurnTo { degrees: -45.0 })
            .unwrap();
        assert_eq!(pwm.last_pulse(24), Some(1250));

        car.apply(&ActuatorCommand::ResetGimbal).unwrap();
        assert_eq!(pwm.last_pulse(24), Some(1500));
        assert_eq!(car.state().yaw_degrees, 0.0);
    }

    #[test]
    fn test_unknown_is_ignored() {
        let (mut car, pwm) = sim_car(&SimImuSource::default());
        let before = car.state();

        car.apply(&ActuatorCommand::Unknown).unwrap();

        assert!(pwm.writes().is_empty());
        assert_eq!(car.state(), before);
    }

    #[test]
    fn test_camera_commands() {
        let (mut car, _pwm) = sim_car(&SimImuSource::default());

        car.apply(&ActuatorCommand::CameraStop).unwrap();
        car.apply(&ActuatorCommand::CameraStart).unwrap();
        let pid = car.camera.pid();
        assert!(pid.is_some());

        car.apply(&ActuatorCommand::CameraStart).unwrap();
        assert_eq!(car.camera.pid(), pid);

        car.apply(&ActuatorCommand::CameraStop).unwrap();
        car.apply(&ActuatorCommand::CameraStop).unwrap();
        assert_eq!(car.camera.pid(), None);
    }

    #[test]
    fn test_calibration_unavailable_imu() {
        let imu = SimImuSource::default();
        imu.set_available(false);
        let (mut car, pwm) = sim_car(&imu);

        assert!(matches!(
            car.apply(&ActuatorCommand::SteeringCalibration { on: true }),
            Err(CarError::Imu(_))
        ));
        assert!(!car.state().is_correction_active);

        // Later commands still work
        car.turn_to(90.0).unwrap();
        assert_eq!(pwm.last_pulse(17), Some(1500));

        // Turning off while off is fine
        car.steering_calibration(false).unwrap();
    }

    #[test]
    fn test_manual_turn_blocks_correction() {
        let imu = SimImuSource::default();
        let (mut car, pwm) = sim_car(&imu);

        car.apply(&ActuatorCommand::SteeringCalibration { on: true })
            .unwrap();
        assert!(car.state().is_correction_active);

        // Drift to the left after calibration so the loop counter-steers
        imu.handle().set_raw(131 * 4);
        thread::sleep(Duration::from_millis(20));
        assert!(pwm.pulses_on(17).len() > 1);

        for i in 0..20 {
            let degrees = 30.0 + i as f32;
            car.turn_to(degrees).unwrap();

            let held = pwm.pulses_on(17).len();
            thread::sleep(Duration::from_millis(3));

            // Nothing but the manual write reaches the steering
            assert_eq!(pwm.pulses_on(17).len(), held);
            assert_eq!(
                pwm.last_pulse(17),
                Some(steering_pulse(degrees, &car.params.steering))
            );

            car.reset_turns(90.0).unwrap();
            thread::sleep(Duration::from_millis(1));
        }

        // Correction resumes after the last reset
        let resumed = pwm.pulses_on(17).len();
        thread::sleep(Duration::from_millis(20));
        assert!(pwm.pulses_on(17).len() > resumed);

        car.apply(&ActuatorCommand::SteeringCalibration { on: false })
            .unwrap();
        assert!(!car.state().is_correction_active);
        let stopped = pwm.pulses_on(17).len();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(pwm.pulses_on(17).len(), stopped);
    }

    #[test]
    fn test_dispatch_continues_after_failure() {
        let imu = SimImuSource::default();
        imu.set_available(false);
        let (car, pwm) = sim_car(&imu);
        let car = Mutex::new(car);

        assert!(!dispatch(
            &car,
            &ActuatorCommand::SteeringCalibration { on: true },
            "test"
        ));
        assert!(dispatch(&car, &ActuatorCommand::TurnTo { degrees: 0.0 }, "test"));
        assert_eq!(pwm.last_pulse(17), Some(500));
    }

    #[test]
    fn test_shutdown() {
        let (mut car, pwm) = sim_car(&SimImuSource::default());

        car.camera_start().unwrap();
        car.steering_calibration(true).unwrap();
        car.drive(40, Direction::Forward).unwrap();

        car.shutdown().unwrap();

        assert!(!car.state().is_correction_active);
        assert_eq!(pwm.last_pulse(23), Some(1500));
        assert_eq!(car.camera.pid(), None);
    }
}
