//! # Track Test
//!
//! This binary runs the controller in closed loop without requiring the simulator. A kinematic
//! vehicle is driven around a synthetic track, with telemetry generated from its state each cycle.
//!
//! The actuation reported in telemetry is the one in effect while the controller is solving. A new
//! command only takes effect at the end of the cycle it was computed in, so the controller's
//! `actuator_delay_s` should match the cycle period for the test to be representative.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use comms_if::sim::Telemetry;
use log::{info, warn};
use structopt::StructOpt;

use mpc_lib::{
    mpc::{Actuation, KinematicModel, RefPoly, VehicleState},
    mpc_ctrl::{MpcCtrl, OutputData},
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    maths::lin_map,
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Simulated time between two telemetry messages.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Distance between two track waypoints along x.
const WAYPOINT_SPACING: f64 = 5.0;

/// Number of waypoints sent in each telemetry message.
const NUM_WAYPOINTS: usize = 8;

// ------------------------------------------------------------------------------------------------
// CLI
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "track_test", about = "Closed loop MPC test on a synthetic track")]
struct Opt {
    /// MpcCtrl parameter file, relative to the params directory
    #[structopt(long, default_value = "mpc_ctrl.toml")]
    params: String,

    /// Number of cycles to run
    #[structopt(long, default_value = "300")]
    num_cycles: usize,

    /// Amplitude of the sinusoidal track
    #[structopt(long, default_value = "10.0")]
    amplitude: f64,

    /// Wavelength of the sinusoidal track
    #[structopt(long, default_value = "400.0")]
    wavelength: f64,

    /// Lateral offset of the vehicle from the track at the start
    #[structopt(long, default_value = "1.0")]
    start_offset: f64,

    /// Speed of the vehicle at the start
    #[structopt(long, default_value = "0.0")]
    start_speed: f64,
}

/// A sinusoidal track, `y = a sin(2 pi x / l)`.
struct Track {
    amplitude: f64,
    wavelength: f64,
}

/// The simulated vehicle.
///
/// Commands are latched: the actuation in effect during a cycle is the one commanded in the
/// previous cycle.
struct Plant {
    model: KinematicModel,
    state: VehicleState,
    in_effect: Actuation,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("track_test", "sessions").wrap_err("Failed to create the session")?;

    logger_init(
        LevelFilter::Trace,
        &[("mpc_lib::mpc::optim", LevelFilter::Debug)],
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    info!("Track Test\n");
    info!("Session directory: {:?}\n", session.session_root);

    if !(opt.wavelength > 0.0) {
        return Err(eyre!("The track wavelength must be positive"));
    }

    // ---- MODULE INIT ----

    let mut mpc_ctrl = MpcCtrl::default();
    mpc_ctrl
        .init(opt.params.clone(), &session)
        .wrap_err("Failed to initialise MpcCtrl")?;
    info!("MpcCtrl init complete");

    let params = mpc_ctrl
        .params()
        .ok_or_else(|| eyre!("MpcCtrl has no parameters"))?
        .clone();

    if (params.mpc.actuator_delay_s - CYCLE_PERIOD_S).abs() > 1e-9 {
        warn!(
            "Controller delay ({} s) differs from the simulated actuation delay ({} s)",
            params.mpc.actuator_delay_s, CYCLE_PERIOD_S
        );
    }

    let track = Track {
        amplitude: opt.amplitude,
        wavelength: opt.wavelength,
    };

    let mut plant = Plant::new(
        KinematicModel::new(params.mpc.wheelbase_m),
        track.start_state(opt.start_offset, opt.start_speed),
    );

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut sum_sq_error = 0.0;
    let mut max_error: f64 = 0.0;
    let mut num_fallbacks = 0;

    for cycle in 0..opt.num_cycles {
        let telem = plant.telemetry(&track);

        let (output, report) = mpc_ctrl.proc(&telem).wrap_err("MpcCtrl processing failed")?;

        if let Err(e) = mpc_ctrl.write() {
            warn!("Could not write MpcCtrl archive: {}", e);
        }

        if report.fallback.is_some() {
            num_fallbacks += 1;
        }

        let applied = plant.in_effect;
        plant.step(command(&output, params.mpc.bounds.max_steer_rad));

        let error = track.lateral_error(&plant.state);
        sum_sq_error += error * error;
        max_error = max_error.max(error.abs());

        info!(
            "Cycle {:4}: x = {:8.2}, v = {:6.2}, steer = {:7.4} rad, throttle = {:5.2}, \
             lateral error = {:7.4}",
            cycle, plant.state.x, plant.state.v, applied.steer_rad, applied.throttle, error
        );
    }

    // ---- SUMMARY ----

    let rms_error = (sum_sq_error / opt.num_cycles.max(1) as f64).sqrt();
    info!(
        "Track test complete: RMS lateral error {:.4}, max lateral error {:.4}, {} fallbacks",
        rms_error, max_error, num_fallbacks
    );

    session.exit();

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert the controller output into the actuation applied to the vehicle.
fn command(output: &OutputData, max_steer_rad: f64) -> Actuation {
    match output {
        OutputData::Steer(cmd) => Actuation {
            steer_rad: lin_map((-1.0, 1.0), (-max_steer_rad, max_steer_rad), cmd.steering_angle),
            throttle: cmd.throttle,
        },
        // Nobody to take over, so coast straight
        OutputData::Manual => Actuation::default(),
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Track {
    fn y(&self, x: f64) -> f64 {
        self.amplitude * (self.phase(x)).sin()
    }

    fn heading(&self, x: f64) -> f64 {
        let slope = self.amplitude * 2.0 * std::f64::consts::PI / self.wavelength
            * self.phase(x).cos();
        slope.atan()
    }

    fn phase(&self, x: f64) -> f64 {
        2.0 * std::f64::consts::PI * x / self.wavelength
    }

    /// Vehicle state at the start of the track, `offset` to the right of it.
    fn start_state(&self, offset: f64, speed: f64) -> VehicleState {
        VehicleState {
            y: self.y(0.0) - offset,
            psi: self.heading(0.0),
            v: speed,
            ..Default::default()
        }
    }

    fn lateral_error(&self, state: &VehicleState) -> f64 {
        state.y - self.y(state.x)
    }

    /// Waypoints starting just behind `x`.
    fn waypoints_ahead(&self, x: f64) -> (Vec<f64>, Vec<f64>) {
        let first = (x / WAYPOINT_SPACING).floor() * WAYPOINT_SPACING;

        (0..NUM_WAYPOINTS)
            .map(|i| {
                let wx = first + WAYPOINT_SPACING * i as f64;
                (wx, self.y(wx))
            })
            .unzip()
    }
}

impl Plant {
    fn new(model: KinematicModel, state: VehicleState) -> Self {
        Self {
            model,
            state,
            in_effect: Actuation::default(),
        }
    }

    /// Telemetry describing the current pose and the actuation in effect.
    fn telemetry(&self, track: &Track) -> Telemetry {
        let (ptsx, ptsy) = track.waypoints_ahead(self.state.x);

        Telemetry {
            ptsx,
            ptsy,
            x: self.state.x,
            y: self.state.y,
            psi: self.state.psi,
            speed: self.state.v,
            steering_angle: self.in_effect.steer_rad,
            throttle: self.in_effect.throttle,
        }
    }

    /// Advance one cycle on the actuation in effect, then latch `next` for the following cycle.
    fn step(&mut self, next: Actuation) {
        // The reference does not affect the pose update
        let flat = RefPoly::new(vec![0.0]);

        self.state = self
            .model
            .step(&self.state, &self.in_effect, CYCLE_PERIOD_S, &flat);
        self.in_effect = next;
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use mpc_lib::mpc_ctrl::Params;

    fn track() -> Track {
        Track {
            amplitude: 10.0,
            wavelength: 400.0,
        }
    }

    #[test]
    fn test_plant_latches_command() {
        let model = KinematicModel::new(2.67);
        let mut plant = Plant::new(
            model,
            VehicleState {
                v: 10.0,
                ..Default::default()
            },
        );

        let turn = Actuation {
            steer_rad: 0.2,
            throttle: 0.5,
        };

        // The first cycle still runs on the previous (zero) actuation
        plant.step(turn);
        assert_abs_diff_eq!(plant.state.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(plant.state.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(plant.state.psi, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(plant.state.v, 10.0, epsilon = 1e-12);

        let telem = plant.telemetry(&track());
        assert_eq!(telem.steering_angle, 0.2);
        assert_eq!(telem.throttle, 0.5);

        // The command takes effect on the next cycle
        plant.step(Actuation::default());
        assert!(plant.state.psi < 0.0);
        assert_abs_diff_eq!(plant.state.v, 10.05, epsilon = 1e-12);
    }

    #[test]
    fn test_closed_loop_tracking() {
        let mut params = Params::default();
        params.mpc.actuator_delay_s = CYCLE_PERIOD_S;
        params.mpc.solver.max_solve_time_s = 5.0;
        let max_steer = params.mpc.bounds.max_steer_rad;

        let mut ctrl = MpcCtrl::from_params(params).unwrap();

        let track = track();
        let mut plant = Plant::new(KinematicModel::new(2.67), track.start_state(1.0, 20.0));

        let mut max_error: f64 = 0.0;
        for cycle in 0..150 {
            let (output, report) = ctrl.proc(&plant.telemetry(&track)).unwrap();
            assert!(report.fallback.is_none(), "fallback at cycle {}", cycle);

            plant.step(command(&output, max_steer));

            if cycle >= 50 {
                max_error = max_error.max(track.lateral_error(&plant.state).abs());
            }
        }

        assert!(max_error < 0.5, "max lateral error {}", max_error);
    }
}
