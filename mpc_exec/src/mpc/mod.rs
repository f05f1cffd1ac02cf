//! # Model Predictive Control module
//!
//! Computes the actuation which keeps the vehicle on a reference path. Each cycle:
//!
//!  1. Waypoints are transformed from the world frame into the vehicle frame.
//!  2. A reference polynomial is fitted through them.
//!  3. The current state is projected forward by the actuator delay.
//!  4. The actuation sequence over the horizon is optimised against the tracking cost, subject to
//!     the kinematic model and the actuation bounds.
//!
//! Only the first actuation of the sequence is applied, the whole problem is solved again on the
//! next cycle. Nothing except the parameters is kept between cycles.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod cost;
pub mod frame;
pub mod latency;
pub mod model;
pub mod optim;
pub mod params;
pub mod poly;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::Point2;
use std::sync::Arc;
use thiserror::Error;

// Internal
pub use cost::CostFunction;
pub use frame::{to_vehicle_frame, FrameError};
pub use latency::LatencyCompensator;
pub use model::{Actuation, KinematicModel, VehicleState};
pub use optim::{OptimError, Solution, Termination, TrajectoryOptimizer};
pub use params::*;
pub use poly::{FitError, RefPoly};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The MPC pipeline for one vehicle.
///
/// Solves are serialised through `&mut self`, separate vehicles need separate instances.
pub struct Mpc {
    params: Arc<Params>,
    compensator: LatencyCompensator,
    optimizer: TrajectoryOptimizer,
}

/// Vehicle data needed for one cycle, in the world frame.
#[derive(Debug, Clone)]
pub struct MpcInput<'a> {
    pub ptsx: &'a [f64],
    pub ptsy: &'a [f64],
    pub position: Point2<f64>,
    pub heading_rad: f64,
    pub speed: f64,

    /// The actuation in effect while the command is being computed
    pub current: Actuation,
}

/// Result of one cycle.
#[derive(Debug, Clone)]
pub struct MpcOutput {
    /// The actuation to apply
    pub actuation: Actuation,

    /// The reference fitted in the vehicle frame
    pub poly: RefPoly,

    /// The latency compensated state the solve started from
    pub init_state: VehicleState,

    pub solution: Solution,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MpcError {
    #[error("Invalid waypoints: {0}")]
    InputShape(FrameError),

    #[error("Could not fit the reference: {0}")]
    DegenerateFit(FitError),

    #[error("Optimisation failed: {0}")]
    OptimisationFailure(OptimError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Mpc {
    /// Build the pipeline, rejecting invalid parameters.
    pub fn new(params: Arc<Params>) -> Result<Self, ParamsError> {
        let model = KinematicModel::new(params.wheelbase_m);

        Ok(Self {
            compensator: LatencyCompensator::new(model, params.actuator_delay_s),
            optimizer: TrajectoryOptimizer::new(&params)?,
            params,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Run one control cycle.
    pub fn solve(&mut self, input: &MpcInput) -> Result<MpcOutput, MpcError> {
        let local = to_vehicle_frame(input.ptsx, input.ptsy, input.position, input.heading_rad)
            .map_err(MpcError::InputShape)?;

        let poly = RefPoly::fit(&local, self.params.poly_order).map_err(MpcError::DegenerateFit)?;

        let raw = LatencyCompensator::raw_state(input.speed, &poly);
        let init_state = self.compensator.compensate(&raw, &input.current, &poly);

        let solution = self
            .optimizer
            .solve(&init_state, &poly)
            .map_err(MpcError::OptimisationFailure)?;

        debug!(
            "MPC solved in {} iterations ({:.2} ms, {:?}), cost {:.4}",
            solution.iterations,
            solution.solve_time_s * 1000.0,
            solution.termination,
            solution.cost
        );

        Ok(MpcOutput {
            actuation: solution.actuations[0],
            poly,
            init_state,
            solution,
        })
    }
}
