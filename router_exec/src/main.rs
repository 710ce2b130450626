//! # Router Executable
//!
//! Runs the message router that relays JSON envelopes between the operator station and the car.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::info;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::{atomic::AtomicBool, Arc};

// Internal
use comms_if::net::NetParams;
use router_lib::{params::RouterExecParams, server::RouterServer};
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
    let session =
        Session::new("router_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("RC Car Message Router\n");
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
    let params: RouterExecParams =
        util::params::load("router_exec.toml").wrap_err("Could not load router params")?;

    info!("Parameters loaded");

    // ---- SERVER ----

    let server = RouterServer::bind(&net_params.router_bind, &params)
        .wrap_err("Failed to start the router")?;

    info!(
        "Initialisation complete, accepting up to {} clients",
        params.capacity
    );

    server.run(shutdown);

    info!("End of execution");

    Ok(())
}
