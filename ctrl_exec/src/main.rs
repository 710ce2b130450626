//! # Operator Station Executable
//!
//! Maps controller input onto actuator commands and sends them to the car, either as binary
//! frames over UDP or as JSON envelopes through the message router.
//!
//! Usage: `ctrl_exec <input>`. With `input = "script"` the argument is an input script replaying
//! controller events (see `util::script_interpreter` for the format). With `input = "gamepad"` it
//! is the evdev device of a live gamepad, e.g. `/dev/input/event3`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{debug, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::env;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

// Internal
use comms_if::{cmd::ActuatorCommand, net::NetParams};
use ctrl_lib::{
    params::{CtrlExecParams, InputKind, Transport},
    session::ControllerSession,
    sink::{CommandSink, RouterSink, UdpFrameSink},
    source::{InputSource, Polled, ScriptSource},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("ctrl_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("RC Car Operator Station\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- SIGNALS ----

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, shutdown.clone())
        .wrap_err("Failed to register the SIGINT handler")?;
    signal_hook::flag::register(SIGTERM, shutdown.clone())
        .wrap_err("Failed to register the SIGTERM handler")?;

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let params: CtrlExecParams =
        util::params::load("ctrl_exec.toml").wrap_err("Could not load operator params")?;

    info!("Parameters loaded");

    // ---- INPUT SOURCE ----

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    if args.len() != 2 {
        return Err(eyre!(
            "Expected one argument (the input script or gamepad device path), found {}",
            args.len() - 1
        ));
    }

    let mut source = open_source(params.input, &args[1])?;

    // ---- COMMAND SINK ----

    let mut sink: Box<dyn CommandSink> = match params.transport {
        Transport::Udp => {
            info!("Sending frames to {}", net_params.car_udp_target);
            Box::new(UdpFrameSink::new(&net_params).wrap_err("Failed to open the UDP sink")?)
        }
        Transport::Router => Box::new(
            RouterSink::connect(&net_params).wrap_err("Failed to connect to the router")?,
        ),
    };

    let poll_period = Duration::from_millis(params.poll_period_ms);
    let mut ctrl_session = ControllerSession::new(params);

    // ---- MAIN LOOP ----

    info!("Initialisation complete, starting the camera");

    send(sink.as_mut(), &ActuatorCommand::CameraStart);

    while !shutdown.load(Ordering::Relaxed) {
        match source.poll() {
            Polled::Idle => (),
            Polled::Events(events) => {
                for event in events.iter() {
                    if let Some(cmd) = ctrl_session.handle(event) {
                        send(sink.as_mut(), &cmd);
                    }
                }
            }
            Polled::Finished => {
                info!("Input source finished, stopping");
                break;
            }
        }

        sink.service().wrap_err("Command transport failed")?;

        thread::sleep(poll_period);
    }

    info!("End of execution");

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open the configured input source at `path`.
fn open_source(kind: InputKind, path: &str) -> Result<Box<dyn InputSource>> {
    match kind {
        InputKind::Script => {
            info!("Loading input script from \"{}\"", path);

            let source = ScriptSource::new(path).wrap_err("Failed to load the input script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} events\n",
                source.duration(),
                source.num_events()
            );

            Ok(Box::new(source))
        }
        InputKind::Gamepad => open_gamepad(path),
    }
}

#[cfg(feature = "gamepad")]
fn open_gamepad(path: &str) -> Result<Box<dyn InputSource>> {
    use ctrl_lib::gamepad::EvdevSource;

    Ok(Box::new(
        EvdevSource::open(path).wrap_err("Failed to open the gamepad")?,
    ))
}

#[cfg(not(feature = "gamepad"))]
fn open_gamepad(_path: &str) -> Result<Box<dyn InputSource>> {
    Err(eyre!(
        "Gamepad input was requested but ctrl_exec was built without the \"gamepad\" feature"
    ))
}

/// Send a command, logging rather than propagating failures.
fn send(sink: &mut dyn CommandSink, cmd: &ActuatorCommand) {
    match sink.send(cmd) {
        Ok(()) => debug!("Sent {:?}", cmd),
        Err(e) => warn!("Could not send {}: {}", cmd.action_name(), e),
    }
}
