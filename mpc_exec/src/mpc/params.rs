//! MPC parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the MPC core.
///
/// All values are fixed once loaded, the controller holds no other persistent state.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Params {
    /// Distance between the front axle and the centre of gravity (`Lf`).
    ///
    /// Units: meters
    pub wheelbase_m: f64,

    /// Order of the reference polynomial fitted through the waypoints.
    pub poly_order: usize,

    /// Time between computing a command and the command taking effect.
    ///
    /// Units: seconds
    pub actuator_delay_s: f64,

    /// Speed the controller tries to hold, in the same units as the telemetry speed.
    pub ref_speed: f64,

    pub horizon: Horizon,

    pub weights: CostWeights,

    pub bounds: ActuationBounds,

    pub solver: SolverParams,
}

/// The prediction horizon.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct Horizon {
    /// Number of actuation steps planned
    pub num_steps: usize,

    /// Length of one step
    ///
    /// Units: seconds
    pub step_s: f64,
}

/// Weights of each term in the cost function.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct CostWeights {
    pub cte: f64,
    pub epsi: f64,
    pub speed: f64,
    pub steer: f64,
    pub throttle: f64,

    /// Change in steering between two consecutive steps
    pub steer_rate: f64,

    /// Change in throttle between two consecutive steps
    pub throttle_rate: f64,
}

/// Hard limits on the actuation.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct ActuationBounds {
    /// Units: radians
    pub max_steer_rad: f64,

    pub min_throttle: f64,

    pub max_throttle: f64,
}

/// Limits and tolerances of the trajectory optimiser.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct SolverParams {
    /// Maximum number of accepted-or-rejected linearisations
    pub max_iters: usize,

    /// Wall clock budget of one solve
    ///
    /// Units: seconds
    pub max_solve_time_s: f64,

    /// Projected gradient tolerance, relative to `1 + cost`
    pub grad_tol: f64,

    /// Relative cost decrease below which the solve is considered converged
    pub cost_rel_tol: f64,

    /// Initial Levenberg-Marquardt damping
    pub init_damping: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("The horizon must have at least one step")]
    EmptyHorizon,

    #[error("The horizon step must be positive and finite (got {0})")]
    InvalidStep(f64),

    #[error("The wheelbase must be positive and finite (got {0})")]
    InvalidWheelbase(f64),

    #[error("The polynomial order must be between 1 and 3 (got {0})")]
    InvalidPolyOrder(usize),

    #[error("The actuator delay must be non-negative and finite (got {0})")]
    InvalidDelay(f64),

    #[error("The reference speed must be finite (got {0})")]
    InvalidRefSpeed(f64),

    #[error("The {0} weight must be non-negative and finite (got {1})")]
    InvalidWeight(&'static str, f64),

    #[error("The steering bound must be positive and finite (got {0})")]
    InvalidSteerBound(f64),

    #[error("The throttle bounds must be finite and contain zero (got [{0}, {1}])")]
    InvalidThrottleBounds(f64, f64),

    #[error("Invalid solver parameter {0}")]
    InvalidSolver(&'static str),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check that the parameters describe a well-posed problem.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.horizon.num_steps == 0 {
            return Err(ParamsError::EmptyHorizon);
        }
        if !is_positive(self.horizon.step_s) {
            return Err(ParamsError::InvalidStep(self.horizon.step_s));
        }
        if !is_positive(self.wheelbase_m) {
            return Err(ParamsError::InvalidWheelbase(self.wheelbase_m));
        }
        if self.poly_order < 1 || self.poly_order > 3 {
            return Err(ParamsError::InvalidPolyOrder(self.poly_order));
        }
        if !(self.actuator_delay_s >= 0.0) || !self.actuator_delay_s.is_finite() {
            return Err(ParamsError::InvalidDelay(self.actuator_delay_s));
        }
        if !self.ref_speed.is_finite() {
            return Err(ParamsError::InvalidRefSpeed(self.ref_speed));
        }

        self.weights.validate()?;
        self.bounds.validate()?;
        self.solver.validate()?;

        Ok(())
    }
}

impl CostWeights {
    fn validate(&self) -> Result<(), ParamsError> {
        let weights = [
            ("cte", self.cte),
            ("epsi", self.epsi),
            ("speed", self.speed),
            ("steer", self.steer),
            ("throttle", self.throttle),
            ("steer_rate", self.steer_rate),
            ("throttle_rate", self.throttle_rate),
        ];

        for (name, w) in weights.iter() {
            if !(*w >= 0.0) || !w.is_finite() {
                return Err(ParamsError::InvalidWeight(*name, *w));
            }
        }

        Ok(())
    }
}

impl ActuationBounds {
    /// Lower and upper bound on the steering angle.
    pub fn steer_range(&self) -> (f64, f64) {
        (-self.max_steer_rad, self.max_steer_rad)
    }

    /// Lower and upper bound on the throttle.
    pub fn throttle_range(&self) -> (f64, f64) {
        (self.min_throttle, self.max_throttle)
    }

    fn validate(&self) -> Result<(), ParamsError> {
        if !is_positive(self.max_steer_rad) {
            return Err(ParamsError::InvalidSteerBound(self.max_steer_rad));
        }

        // The optimiser starts from zero actuation, which must be feasible
        if !self.min_throttle.is_finite()
            || !self.max_throttle.is_finite()
            || self.min_throttle > 0.0
            || self.max_throttle < 0.0
            || self.min_throttle >= self.max_throttle
        {
            return Err(ParamsError::InvalidThrottleBounds(
                self.min_throttle,
                self.max_throttle,
            ));
        }

        Ok(())
    }
}

impl SolverParams {
    fn validate(&self) -> Result<(), ParamsError> {
        if self.max_iters == 0 {
            return Err(ParamsError::InvalidSolver("max_iters"));
        }
        if !is_positive(self.max_solve_time_s) {
            return Err(ParamsError::InvalidSolver("max_solve_time_s"));
        }
        if !(self.grad_tol >= 0.0) || !self.grad_tol.is_finite() {
            return Err(ParamsError::InvalidSolver("grad_tol"));
        }
        if !(self.cost_rel_tol >= 0.0) || !self.cost_rel_tol.is_finite() {
            return Err(ParamsError::InvalidSolver("cost_rel_tol"));
        }
        if !is_positive(self.init_damping) {
            return Err(ParamsError::InvalidSolver("init_damping"));
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            wheelbase_m: 2.67,
            poly_order: 3,
            actuator_delay_s: 0.1,
            ref_speed: 40.0,
            horizon: Horizon {
                num_steps: 10,
                step_s: 0.1,
            },
            weights: CostWeights {
                cte: 2000.0,
                epsi: 2000.0,
                speed: 1.0,
                steer: 5.0,
                throttle: 5.0,
                steer_rate: 200.0,
                throttle_rate: 10.0,
            },
            bounds: ActuationBounds {
                max_steer_rad: 0.436332,
                min_throttle: -1.0,
                max_throttle: 1.0,
            },
            solver: SolverParams {
                max_iters: 150,
                max_solve_time_s: 0.5,
                grad_tol: 1e-6,
                cost_rel_tol: 1e-6,
                init_damping: 1e-3,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}
