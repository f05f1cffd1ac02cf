//! Main MPC controller executable entry point.
//!
//! # Architecture
//!
//! The executable serves the simulator link and runs one control cycle per telemetry message:
//!
//!     - Initialise the session, logging, parameters and MpcCtrl
//!     - Main loop:
//!         - Receive a frame from the simulator
//!         - Telemetry: run MpcCtrl, archive the cycle, wait the emulated actuator latency and
//!           reply with the command
//!         - No data: reply with manual driving
//!         - Anything else: reply with nothing

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, error, info, warn};
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use comms_if::{net::NetParams, sim::SimMsg};
use mpc_lib::{
    mpc_ctrl::{MpcCtrl, OutputData},
    sim_server::{SimServer, SimServerError},
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_exec", about = "MPC trajectory controller for the driving simulator")]
struct Opt {
    /// MpcCtrl parameter file, relative to the params directory
    #[structopt(long, default_value = "mpc_ctrl.toml")]
    params: String,

    /// Network parameter file, relative to the params directory
    #[structopt(long, default_value = "net.toml")]
    net_params: String,

    /// Time to wait before replying, emulating the actuator latency
    #[structopt(long, default_value = "100")]
    latency_ms: u64,

    /// Stop after this many telemetry cycles
    #[structopt(long)]
    num_cycles: Option<u64>,

    /// Log each optimiser iteration
    #[structopt(long)]
    trace_solver: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("mpc_exec", "sessions").wrap_err("Failed to create the session")?;

    let solver_level = match opt.trace_solver {
        true => LevelFilter::Trace,
        false => LevelFilter::Debug,
    };
    logger_init(
        LevelFilter::Trace,
        &[("mpc_lib::mpc::optim", solver_level)],
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    info!("MPC Controller Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load(&opt.net_params).wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut mpc_ctrl = MpcCtrl::default();
    mpc_ctrl
        .init(opt.params.clone(), &session)
        .wrap_err("Failed to initialise MpcCtrl")?;
    info!("MpcCtrl init complete");

    // ---- INITIALISE NETWORK ----

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let sim_server = SimServer::new(&zmq_ctx, &net_params)
        .wrap_err("Failed to initialise the SimServer")?;
    info!("SimServer listening on {}", net_params.sim_endpoint);

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let latency = Duration::from_millis(opt.latency_ms);
    let mut num_cycles = 0u64;

    loop {
        if let Some(max) = opt.num_cycles {
            if num_cycles >= max {
                info!("{} cycles complete, stopping", num_cycles);
                break;
            }
        }

        let msg = match sim_server.receive() {
            Ok(Some(m)) => m,
            Ok(None) => continue,
            Err(SimServerError::ParseError(e)) => {
                warn!("Could not parse the simulator frame: {}", e);
                continue;
            }
            Err(SimServerError::NonUtf8Frame) => {
                warn!("Received a non UTF-8 frame");
                continue;
            }
            Err(e) => {
                return Err(e).wrap_err("An error occurred while receiving from the simulator")
            }
        };

        let reply_result = match msg {
            SimMsg::Telemetry(telem) => {
                num_cycles += 1;

                let output = match mpc_ctrl.proc(&telem) {
                    Ok((o, _)) => o,
                    Err(e) => {
                        error!("Error during MpcCtrl processing: {}", e);
                        OutputData::Manual
                    }
                };

                if let Err(e) = mpc_ctrl.write() {
                    warn!("Could not write MpcCtrl archive: {}", e);
                }

                // Commands don't take effect immediately on a real vehicle
                thread::sleep(latency);

                match output {
                    OutputData::Steer(cmd) => sim_server.reply_steer(&cmd),
                    OutputData::Manual => sim_server.reply_manual(),
                }
            }
            SimMsg::NoData => sim_server.reply_manual(),
            SimMsg::Other(event) => {
                debug!("Ignoring \"{}\" event", event);
                sim_server.reply_empty()
            }
            SimMsg::NotEvent => sim_server.reply_empty(),
        };

        if let Err(e) = reply_result {
            warn!("Could not reply to the simulator: {}", e);
        }
    }

    session.exit();

    Ok(())
}
