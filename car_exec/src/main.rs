//! # Car Executable
//!
//! Runs on the car and drives its actuators:
//! - Steering servo, with optional gyro based heading correction
//! - ESC (drive motor)
//! - Camera gimbal (yaw and pitch)
//! - Camera streaming helper
//!
//! Commands are accepted from the operator station over UDP (binary frames) and from the message
//! router (JSON envelopes) at the same time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

// Internal
use car_lib::{
    controller::Car,
    imu::{ImuSource, SimImuSource},
    params::{Backend, CarExecParams},
    pwm::{PwmDriver, SimPwm},
    router_client::RouterClient,
    udp_server::UdpFrameServer,
};
use comms_if::net::NetParams;
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
    let session = Session::new("car_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("RC Car Actuator Executable\n");
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
    let params: CarExecParams =
        util::params::load("car_exec.toml").wrap_err("Could not load car params")?;

    info!("Parameters loaded");

    // ---- BACKEND SELECTION ----

    match params.backend {
        Backend::Sim => {
            info!("Using the simulated backend");
            run(params, net_params, SimPwm::new(), SimImuSource::default(), shutdown)
        }
        Backend::Hardware => run_hardware(params, net_params, shutdown),
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

#[cfg(feature = "hardware")]
fn run_hardware(
    params: CarExecParams,
    net_params: NetParams,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    use car_lib::{imu::i2c::I2cImuSource, pwm::gpio::GpioPwm};

    if !host::is_arm_host() {
        warn!("Hardware backend selected on a non-ARM host");
    }

    let pwm = GpioPwm::new(Duration::from_millis(params.pwm_period_ms))
        .wrap_err("Failed to open the GPIO outputs")?;
    let imu = I2cImuSource {
        bus: params.imu.bus,
        address: params.imu.address,
    };

    info!("Using the hardware backend");

    run(params, net_params, pwm, imu, shutdown)
}

#[cfg(not(feature = "hardware"))]
fn run_hardware(
    _params: CarExecParams,
    _net_params: NetParams,
    _shutdown: Arc<AtomicBool>,
) -> Result<()> {
    Err(eyre!(
        "The hardware backend was requested but car_exec was built without the \"hardware\" feature"
    ))
}

/// Serve both command channels until a shutdown signal, then put the actuators in a safe state.
fn run<P, S>(
    params: CarExecParams,
    net_params: NetParams,
    pwm: P,
    imu: S,
    shutdown: Arc<AtomicBool>,
) -> Result<()>
where
    P: PwmDriver + 'static,
    S: ImuSource + 'static,
{
    let udp_server = UdpFrameServer::bind(
        &net_params.car_udp_bind,
        Duration::from_millis(net_params.udp_recv_timeout_ms),
    )
    .wrap_err("Failed to start the UDP frame server")?;

    let car = Arc::new(Mutex::new(Car::new(params, pwm, imu)));

    // ---- ROUTER CLIENT ----

    let router_client = RouterClient::new(&net_params);
    let router_car = car.clone();
    let router_shutdown = shutdown.clone();
    let router_jh = thread::Builder::new()
        .name("router_client".into())
        .spawn(move || router_client.run(router_car, router_shutdown))
        .wrap_err("Failed to start the router client")?;

    // ---- MAIN LOOP ----

    info!("Initialisation complete, waiting for commands");

    let udp_result = udp_server.run(car.clone(), shutdown.clone());

    match udp_result {
        Ok(()) => info!("Shutdown requested"),
        Err(ref e) => {
            error!("UDP frame server failed: {}", e);
            shutdown.store(true, Ordering::Relaxed);
        }
    }

    if router_jh.join().is_err() {
        warn!("Router client thread panicked");
    }

    // ---- SHUTDOWN ----

    car.lock()
        .map_err(|_| eyre!("Car lock poisoned during shutdown"))?
        .shutdown()
        .wrap_err("Failed to put the actuators in a safe state")?;

    udp_result.wrap_err("The UDP frame server stopped")?;

    info!("End of execution");

    Ok(())
}
