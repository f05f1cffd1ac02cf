//! Implementations for the MpcCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use nalgebra::Point2;
use serde::Serialize;
use std::sync::Arc;

// Internal
use super::{FallbackMode, MpcCtrlError, Params};
use crate::mpc::{Actuation, Mpc, MpcError, MpcInput, MpcOutput};
use comms_if::sim::{SteerCmd, Telemetry};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    maths::lin_map,
    module::State,
    params,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// MPC control module state
#[derive(Default)]
pub struct MpcCtrl {
    params: Option<Arc<Params>>,

    mpc: Option<Mpc>,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    /// Save failed problems into the session
    save_failures: bool,
}

/// Output of one control cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputData {
    /// Steering command for the simulator
    Steer(SteerCmd),

    /// Hand control back to the driver
    Manual,
}

/// Status report for MpcCtrl processing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub time_s: f64,

    /// Speed passed to the MPC
    pub speed: f64,

    /// Errors of the latency compensated state
    pub cte: Option<f64>,
    pub epsi: Option<f64>,

    /// The command sent, `None` for manual driving
    pub steer_rad: Option<f64>,
    pub throttle: Option<f64>,

    pub cost: Option<f64>,
    pub iterations: Option<usize>,
    pub solve_time_s: Option<f64>,

    pub fallback: Option<Fallback>,
}

/// A failed solve, saved so it can be reproduced offline.
#[derive(Serialize)]
struct FailedSolve {
    telemetry: Telemetry,
    error: String,
    params: Params,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The fallback taken in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Fallback {
    Manual,
    HoldLast,
    Decelerate,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for MpcCtrl {
    type InitData = String;
    type InitError = MpcCtrlError;

    type InputData = Telemetry;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(
        &mut self,
        init_data: Self::InitData,
        session: &Session,
    ) -> Result<(), Self::InitError> {
        let params: Params = params::load(&init_data).map_err(MpcCtrlError::ParamLoadError)?;

        *self = Self::from_params(params)?;

        self.arch_report = Archiver::from_path(session, "mpc_ctrl/status_report.csv")
            .map_err(MpcCtrlError::ArchiveError)?;
        self.save_failures = true;

        Ok(())
    }

    /// Process one telemetry message.
    ///
    /// Failures of the MPC are turned into fallback outputs, so the only error is calling this
    /// before initialisation.
    fn proc(
        &mut self,
        telem: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let params = match self.params {
            Some(ref p) => p.clone(),
            None => return Err(MpcCtrlError::NotInitialised),
        };
        let mpc = match self.mpc {
            Some(ref mut m) => m,
            None => return Err(MpcCtrlError::NotInitialised),
        };

        trace!("MpcCtrl input: {:?}", telem);

        self.report = StatusReport {
            time_s: session::get_elapsed_seconds(),
            speed: telem.speed * params.speed_scale,
            ..Default::default()
        };

        // The simulator reports the steering angle in radians
        let current = Actuation {
            steer_rad: telem.steering_angle,
            throttle: telem.throttle,
        };

        let result = mpc.solve(&MpcInput {
            ptsx: &telem.ptsx,
            ptsy: &telem.ptsy,
            position: Point2::new(telem.x, telem.y),
            heading_rad: telem.psi,
            speed: self.report.speed,
            current,
        });

        let output = match result {
            Ok(out) => {
                self.report.cte = Some(out.init_state.cte);
                self.report.epsi = Some(out.init_state.epsi);
                self.report.cost = Some(out.solution.cost);
                self.report.iterations = Some(out.solution.iterations);
                self.report.solve_time_s = Some(out.solution.solve_time_s);

                OutputData::Steer(steer_cmd(&params, &out))
            }
            Err(e) => {
                let (output, fallback) = fallback(&params, &e, telem);

                warn!("MPC cycle failed ({}), falling back to {:?}", e, fallback);

                if self.save_failures {
                    if let MpcError::OptimisationFailure(_) = e {
                        session::save_with_timestamp(
                            "mpc_ctrl/failed_solve.json",
                            FailedSolve {
                                telemetry: telem.clone(),
                                error: e.to_string(),
                                params: (*params).clone(),
                            },
                        );
                    }
                }

                self.report.fallback = Some(fallback);
                output
            }
        };

        if let OutputData::Steer(ref cmd) = output {
            self.report.steer_rad = Some(denormalise_steer(&params, cmd.steering_angle));
            self.report.throttle = Some(cmd.throttle);
        }

        Ok((output, self.report.clone()))
    }
}

impl MpcCtrl {
    /// Create the module from already loaded parameters, without any archiving.
    pub fn from_params(params: Params) -> Result<Self, MpcCtrlError> {
        params.validate()?;

        let params = Arc::new(params);
        let mpc =
            Mpc::new(Arc::new(params.mpc.clone())).map_err(MpcCtrlError::InvalidMpcParams)?;

        Ok(Self {
            params: Some(params),
            mpc: Some(mpc),
            ..Default::default()
        })
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_deref()
    }
}

impl Archived for MpcCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(&self.report)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Package a successful solve for the simulator.
fn steer_cmd(params: &Params, out: &MpcOutput) -> SteerCmd {
    let (next_x, next_y) = out
        .poly
        .sample(params.overlay_spacing, params.overlay_num_points);

    let (mpc_x, mpc_y) = out.solution.states[1..].iter().map(|s| (s.x, s.y)).unzip();

    SteerCmd {
        steering_angle: normalise_steer(params, out.actuation.steer_rad),
        throttle: out.actuation.throttle,
        mpc_x,
        mpc_y,
        next_x,
        next_y,
    }
}

/// Select the output for a failed cycle.
fn fallback(params: &Params, err: &MpcError, telem: &Telemetry) -> (OutputData, Fallback) {
    match err {
        MpcError::InputShape(_) | MpcError::DegenerateFit(_) => {
            (OutputData::Manual, Fallback::Manual)
        }
        MpcError::OptimisationFailure(_) => match params.fallback_mode {
            FallbackMode::HoldLast => (
                OutputData::Steer(SteerCmd {
                    steering_angle: normalise_steer(params, telem.steering_angle),
                    throttle: telem.throttle,
                    ..Default::default()
                }),
                Fallback::HoldLast,
            ),
            FallbackMode::Decelerate => (
                OutputData::Steer(SteerCmd {
                    steering_angle: 0.0,
                    throttle: params.decel_throttle,
                    ..Default::default()
                }),
                Fallback::Decelerate,
            ),
        },
    }
}

/// Steering angle to the simulator's [-1, 1] range.
fn normalise_steer(params: &Params, steer_rad: f64) -> f64 {
    let max = params.mpc.bounds.max_steer_rad;
    lin_map((-max, max), (-1.0, 1.0), steer_rad).max(-1.0).min(1.0)
}

fn denormalise_steer(params: &Params, steer: f64) -> f64 {
    let max = params.mpc.bounds.max_steer_rad;
    lin_map((-1.0, 1.0), (-max, max), steer)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params() -> Params {
        let mut p = Params::default();
        p.mpc.solver.max_solve_time_s = 5.0;
        p.mpc.actuator_delay_s = 0.0;
        p
    }

    /// Vehicle one unit to the right of a gentle left hand curve, heading along it.
    fn telemetry() -> Telemetry {
        let ptsx: Vec<f64> = vec![-5.0, 0.0, 5.0, 10.0, 15.0, 20.0, 25.0];
        let ptsy = ptsx.iter().map(|x| 0.02 * x * x).collect();

        Telemetry {
            ptsx,
            ptsy,
            x: 0.0,
            y: -1.0,
            psi: 0.0,
            speed: 20.0,
            steering_angle: 0.0,
            throttle: 0.0,
        }
    }

    #[test]
    fn test_uninitialised() {
        let mut ctrl = MpcCtrl::default();
        assert!(matches!(
            ctrl.proc(&telemetry()),
            Err(MpcCtrlError::NotInitialised)
        ));
    }

    #[test]
    fn test_steer_output() {
        let p = params();
        let mut ctrl = MpcCtrl::from_params(p.clone()).unwrap();

        let (output, report) = ctrl.proc(&telemetry()).unwrap();

        let cmd = match output {
            OutputData::Steer(c) => c,
            o => panic!("Expected a steer command, got {:?}", o),
        };

        assert!(cmd.steering_angle < 0.0 && cmd.steering_angle >= -1.0);
        assert!(cmd.throttle >= -1.0 && cmd.throttle <= 1.0);
        assert_eq!(cmd.mpc_x.len(), p.mpc.horizon.num_steps);
        assert_eq!(cmd.mpc_y.len(), p.mpc.horizon.num_steps);
        assert_eq!(cmd.next_x.len(), 25);
        assert_eq!(cmd.next_y.len(), 25);
        assert_eq!(cmd.next_x[1], 2.5);

        assert!(report.fallback.is_none());
        assert_abs_diff_eq!(
            report.steer_rad.unwrap(),
            cmd.steering_angle * p.mpc.bounds.max_steer_rad,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_manual_fallback() {
        let mut ctrl = MpcCtrl::from_params(params()).unwrap();

        let mut telem = telemetry();
        telem.ptsy.pop();
        let (output, report) = ctrl.proc(&telem).unwrap();
        assert_eq!(output, OutputData::Manual);
        assert_eq!(report.fallback, Some(Fallback::Manual));
        assert!(report.steer_rad.is_none());

        let mut telem = telemetry();
        telem.ptsx.truncate(2);
        telem.ptsy.truncate(2);
        let (output, _) = ctrl.proc(&telem).unwrap();
        assert_eq!(output, OutputData::Manual);
    }

    #[test]
    fn test_optimisation_fallbacks() {
        let mut p = params();
        p.mpc.solver.max_iters = 1;
        p.mpc.solver.grad_tol = 0.0;
        p.mpc.solver.cost_rel_tol = 0.0;

        let mut telem = telemetry();
        telem.steering_angle = -0.2;
        telem.throttle = 0.4;

        p.fallback_mode = FallbackMode::HoldLast;
        let mut ctrl = MpcCtrl::from_params(p.clone()).unwrap();
        let (output, report) = ctrl.proc(&telem).unwrap();
        assert_eq!(report.fallback, Some(Fallback::HoldLast));
        match output {
            OutputData::Steer(cmd) => {
                assert_abs_diff_eq!(cmd.steering_angle, -0.2 / 0.436332, epsilon = 1e-9);
                assert_eq!(cmd.throttle, 0.4);
                assert!(cmd.mpc_x.is_empty());
            }
            o => panic!("Expected a steer command, got {:?}", o),
        }

        p.fallback_mode = FallbackMode::Decelerate;
        let mut ctrl = MpcCtrl::from_params(p.clone()).unwrap();
        let (output, report) = ctrl.proc(&telem).unwrap();
        assert_eq!(report.fallback, Some(Fallback::Decelerate));
        match output {
            OutputData::Steer(cmd) => {
                assert_eq!(cmd.steering_angle, 0.0);
                assert_eq!(cmd.throttle, p.decel_throttle);
            }
            o => panic!("Expected a steer command, got {:?}", o),
        }
    }

    #[test]
    fn test_invalid_params() {
        let mut p = params();
        p.decel_throttle = -2.0;
        assert!(matches!(
            MpcCtrl::from_params(p),
            Err(MpcCtrlError::InvalidParam("decel_throttle", _))
        ));

        let mut p = params();
        p.mpc.horizon.num_steps = 0;
        assert!(matches!(
            MpcCtrl::from_params(p),
            Err(MpcCtrlError::InvalidMpcParams(_))
        ));
    }

    #[test]
    fn test_load_params_file() {
        let p: Params = util::params::load_from_path(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../params/mpc_ctrl.toml"
        ))
        .unwrap();

        p.validate().unwrap();
        assert_eq!(p.overlay_num_points, 25);
        assert_eq!(p.mpc.horizon.num_steps, 10);
    }
}
