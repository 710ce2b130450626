//! # Command Line Car
//!
//! Bench testing REPL. Each line is parsed into a single actuator command which is sent to the car
//! as a binary frame over UDP.

use std::net::UdpSocket;

use color_eyre::{eyre::WrapErr, Result};
use comms_if::{
    cmd::{ActuatorCommand, Direction},
    frame::FrameEncoder,
    net::NetParams,
};
use rustyline::{error::ReadlineError, DefaultEditor};
use structopt::{clap::AppSettings, StructOpt};

const PROMPT: &str = "rc-car $ ";
const HISTORY_PATH: &str = "data/history.txt";

/// Commands accepted at the prompt.
#[derive(Debug, PartialEq, StructOpt)]
#[structopt(
    name = "rc-car",
    no_version,
    global_settings = &[AppSettings::NoBinaryName, AppSettings::AllowNegativeNumbers]
)]
enum Line {
    /// Steer, put the ESC in neutral and centre the gimbal, limiting later speeds
    Init { speed: i32, degrees: f32 },

    /// Steer to an absolute angle (0 to 180 degrees)
    Turn { degrees: f32 },

    /// Steer to an angle and hand the steering back to the correction loop
    Reset { degrees: f32 },

    /// Set a new straight-ahead trim angle
    Trim { degrees: f32 },

    /// Drive forwards at a speed percentage
    Forward { speed: i32 },

    /// Drive backwards at a speed percentage
    Backward { speed: i32 },

    /// Put the ESC in neutral
    Neutral,

    CameraStart,

    CameraStop,

    /// Turn the gimbal to a yaw angle (-90 to 90 degrees)
    Yaw { degrees: f32 },

    /// Set the gimbal pitch angle (-90 to 90 degrees)
    Pitch { degrees: f32 },

    /// Centre the gimbal
    Centre,

    /// Calibrate the gyro and start the steering correction loop
    CalibrationOn,

    /// Stop the steering correction loop
    CalibrationOff,

    /// Leave the REPL
    Exit,
}

impl Line {
    /// The command this line sends, `None` for `exit`.
    fn command(&self) -> Option<ActuatorCommand> {
        Some(match *self {
            Line::Init { speed, degrees } => ActuatorCommand::Init { speed, degrees },
            Line::Turn { degrees } => ActuatorCommand::TurnTo { degrees },
            Line::Reset { degrees } => ActuatorCommand::ResetTurns { degrees },
            Line::Trim { degrees } => ActuatorCommand::ChangeDegreeOfTurns { degrees },
            Line::Forward { speed } => ActuatorCommand::Move {
                speed,
                direction: Direction::Forward,
            },
            Line::Backward { speed } => ActuatorCommand::Move {
                speed,
                direction: Direction::Backward,
            },
            Line::Neutral => ActuatorCommand::SetEscNeutral,
            Line::CameraStart => ActuatorCommand::CameraStart,
            Line::CameraStop => ActuatorCommand::CameraStop,
            Line::Yaw { degrees } => ActuatorCommand::GimbalTurnTo { degrees },
            Line::Pitch { degrees } => ActuatorCommand::GimbalSetPitch { degrees },
            Line::Centre => ActuatorCommand::ResetGimbal,
            Line::CalibrationOn => ActuatorCommand::SteeringCalibration { on: true },
            Line::CalibrationOff => ActuatorCommand::SteeringCalibration { on: false },
            Line::Exit => return None,
        })
    }
}

fn main() -> Result<()> {
    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    let socket = UdpSocket::bind("0.0.0.0:0").wrap_err("Could not bind the UDP socket")?;
    let mut encoder = FrameEncoder::default();

    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    println!(
        "Sending to {}, type `help` for the commands",
        net_params.car_udp_target
    );

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Unhandled Error: {:?}", err);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let _ = rl.add_history_entry(line.as_str());

        let parsed = match Line::from_iter_safe(line.split_whitespace()) {
            Ok(p) => p,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        let cmd = match parsed.command() {
            Some(c) => c,
            None => break,
        };

        // Every parsed line has a command id, encode only fails for the unknown command
        let frame = match encoder.encode(&cmd) {
            Some(f) => f,
            None => continue,
        };

        match socket.send_to(&frame, net_params.car_udp_target.as_str()) {
            Ok(_) => println!("Sent {}", cmd.action_name()),
            Err(e) => println!("Could not send {}: {}", cmd.action_name(), e),
        }
    }

    if let Err(e) = rl.save_history(HISTORY_PATH) {
        println!("Could not save the history: {}", e);
    }

    println!("Exiting...");

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(line: &str) -> Line {
        Line::from_iter_safe(line.split_whitespace()).unwrap()
    }

    #[test]
    fn test_parse_lines() {
        assert_eq!(
            parse("init 50 83").command(),
            Some(ActuatorCommand::Init {
                speed: 50,
                degrees: 83.0
            })
        );
        assert_eq!(
            parse("backward 20").command(),
            Some(ActuatorCommand::Move {
                speed: 20,
                direction: Direction::Backward
            })
        );
        assert_eq!(
            parse("pitch -15").command(),
            Some(ActuatorCommand::GimbalSetPitch { degrees: -15.0 })
        );
        assert_eq!(
            parse("calibration-on").command(),
            Some(ActuatorCommand::SteeringCalibration { on: true })
        );
        assert_eq!(parse("exit").command(), None);
    }

    #[test]
    fn test_bad_lines() {
        assert!(Line::from_iter_safe("turn".split_whitespace()).is_err());
        assert!(Line::from_iter_safe("turn left".split_whitespace()).is_err());
        assert!(Line::from_iter_safe("fly 10".split_whitespace()).is_err());
    }
}
