//! # Trajectory optimiser
//!
//! Solves the finite horizon problem
//!
//! ```text
//! minimise    cost(states, actuations)
//! subject to  states[0]     = initial state
//!             states[k + 1] = model(states[k], actuations[k])
//!             actuations within their bounds
//! ```
//!
//! The dynamics constraints are eliminated by forward simulation (single shooting), leaving the
//! `2N` actuations as the only decision variables, so every returned trajectory satisfies the
//! dynamics exactly. Each iteration linearises the cost residuals using sensitivities propagated
//! through the model Jacobians and solves a Levenberg-Marquardt damped Gauss-Newton subproblem over
//! the variables not held on a bound. The step is projected onto the bounds and only accepted if
//! it reduces the cost.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{DMatrix, DVector, Matrix6xX};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

// Internal
use super::{
    ActuationBounds, Actuation, CostFunction, KinematicModel, Params, ParamsError, RefPoly,
    SolverParams, VehicleState,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Factor the damping is scaled by on each rejected or accepted step.
const DAMPING_FACTOR: f64 = 10.0;

const MIN_DAMPING: f64 = 1e-12;

/// Damping above which no further descent is considered possible.
const MAX_DAMPING: f64 = 1e12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The trajectory optimiser.
///
/// Holds the scratch buffers used during a solve, no state carries over between solves.
pub struct TrajectoryOptimizer {
    num_steps: usize,
    step_s: f64,

    model: KinematicModel,
    cost: CostFunction,
    solver: SolverParams,

    /// Lower and upper bound of each decision variable
    lower: DVector<f64>,
    upper: DVector<f64>,

    // Scratch
    states: Vec<VehicleState>,
    trial_states: Vec<VehicleState>,
    acts: Vec<Actuation>,
    residuals: DVector<f64>,
    trial_residuals: DVector<f64>,
    jacobian: DMatrix<f64>,
    sens: Vec<Matrix6xX<f64>>,
}

/// The result of a converged solve.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// The optimal actuation sequence, `N` long.
    pub actuations: Vec<Actuation>,

    /// The predicted states, `N + 1` long, starting with the initial state.
    pub states: Vec<VehicleState>,

    pub cost: f64,

    pub iterations: usize,

    pub solve_time_s: f64,

    pub termination: Termination,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reason a solve converged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Termination {
    /// The projected gradient fell below tolerance
    Gradient,

    /// The relative cost decrease of an accepted step fell below tolerance
    CostDecrease,

    /// No step along the free variables reduces the cost
    NoDescent,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimError {
    #[error("Did not converge within {iterations} iterations (cost {cost})")]
    MaxIterations { iterations: usize, cost: f64 },

    #[error("Did not converge within the time budget ({elapsed_s:.3} s, {iterations} iterations)")]
    Timeout { elapsed_s: f64, iterations: usize },

    #[error("Encountered a non-finite cost or state at iteration {0}")]
    NonFinite(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajectoryOptimizer {
    /// Allocate the solver for the given parameters, which are validated first.
    pub fn new(params: &Params) -> Result<Self, ParamsError> {
        params.validate()?;

        let n = params.horizon.num_steps;
        let num_vars = 2 * n;
        let cost = CostFunction::new(params.weights, params.ref_speed, n);
        let num_res = cost.num_residuals();

        let (lower, upper) = variable_bounds(&params.bounds, n);

        Ok(Self {
            num_steps: n,
            step_s: params.horizon.step_s,
            model: KinematicModel::new(params.wheelbase_m),
            cost,
            solver: params.solver,
            lower,
            upper,
            states: vec![VehicleState::default(); n + 1],
            trial_states: vec![VehicleState::default(); n + 1],
            acts: vec![Actuation::default(); n],
            residuals: DVector::zeros(num_res),
            trial_residuals: DVector::zeros(num_res),
            jacobian: DMatrix::zeros(num_res, num_vars),
            sens: vec![Matrix6xX::zeros(num_vars); n],
        })
    }

    /// Optimise the actuation sequence from the given initial state along the reference.
    pub fn solve(&mut self, init: &VehicleState, poly: &RefPoly) -> Result<Solution, OptimError> {
        let start = Instant::now();

        if !init.is_finite() {
            return Err(OptimError::NonFinite(0));
        }

        // Zero actuation, clamped into the bounds
        let mut u = DVector::zeros(2 * self.num_steps);
        for i in 0..u.len() {
            u[i] = clamp(0.0, self.lower[i], self.upper[i]);
        }

        let mut cost = self.rollout(init, &u, poly, false);
        if !cost.is_finite() {
            return Err(OptimError::NonFinite(0));
        }

        let mut damping = self.solver.init_damping;
        let mut free: Vec<usize> = Vec::with_capacity(u.len());
        let mut iterations = 0;

        let termination = 'outer: loop {
            if iterations >= self.solver.max_iters {
                return Err(OptimError::MaxIterations { iterations, cost });
            }
            iterations += 1;

            self.linearise(poly);
            let grad = self.jacobian.tr_mul(&self.residuals);
            let jtj = self.jacobian.tr_mul(&self.jacobian);

            // Variables on a bound whose descent direction points out of the box are held
            free.clear();
            let mut proj_grad_norm: f64 = 0.0;
            for i in 0..u.len() {
                if !self.blocked(&u, i, -grad[i]) {
                    free.push(i);
                    proj_grad_norm = proj_grad_norm.max(grad[i].abs());
                }
            }

            trace!(
                "Iteration {}: cost {:.6e}, projected gradient {:.3e}, damping {:.1e}, {} free",
                iterations,
                cost,
                proj_grad_norm,
                damping,
                free.len()
            );

            if proj_grad_norm <= self.solver.grad_tol * (1.0 + cost) {
                break Termination::Gradient;
            }

            // Try steps with increasing damping until one reduces the cost
            loop {
                self.check_time(start, iterations)?;

                let step = match self.damped_step(&u, &jtj, &grad, &free, damping) {
                    StepResult::Step(s) => s,
                    StepResult::AllHeld => break 'outer Termination::NoDescent,
                    StepResult::NotPositiveDefinite => {
                        damping *= DAMPING_FACTOR;
                        if damping > MAX_DAMPING {
                            break 'outer Termination::NoDescent;
                        }
                        continue;
                    }
                };

                let mut trial = &u + step;
                for i in 0..trial.len() {
                    trial[i] = clamp(trial[i], self.lower[i], self.upper[i]);
                }

                let trial_cost = self.rollout(init, &trial, poly, true);

                if trial_cost.is_finite() && trial_cost < cost {
                    let rel_decrease = (cost - trial_cost) / cost.max(std::f64::MIN_POSITIVE);

                    u = trial;
                    cost = trial_cost;
                    std::mem::swap(&mut self.states, &mut self.trial_states);
                    std::mem::swap(&mut self.residuals, &mut self.trial_residuals);
                    damping = (damping / DAMPING_FACTOR).max(MIN_DAMPING);

                    if rel_decrease < self.solver.cost_rel_tol {
                        break 'outer Termination::CostDecrease;
                    }
                    break;
                }

                damping *= DAMPING_FACTOR;
                if damping > MAX_DAMPING {
                    break 'outer Termination::NoDescent;
                }
            }
        };

        if !cost.is_finite() || !self.states.iter().all(|s| s.is_finite()) {
            return Err(OptimError::NonFinite(iterations));
        }

        set_actuations(&u, &mut self.acts);

        Ok(Solution {
            actuations: self.acts.clone(),
            states: self.states.clone(),
            cost,
            iterations,
            solve_time_s: start.elapsed().as_secs_f64(),
            termination,
        })
    }

    /// Simulate the actuation sequence from the initial state, returning the cost.
    ///
    /// Results go into the trial buffers if `trial` is set, otherwise into the current ones.
    fn rollout(
        &mut self,
        init: &VehicleState,
        u: &DVector<f64>,
        poly: &RefPoly,
        trial: bool,
    ) -> f64 {
        set_actuations(u, &mut self.acts);

        let (states, residuals) = match trial {
            true => (&mut self.trial_states, &mut self.trial_residuals),
            false => (&mut self.states, &mut self.residuals),
        };

        states[0] = *init;
        for k in 0..self.num_steps {
            states[k + 1] = self.model.step(&states[k], &self.acts[k], self.step_s, poly);
        }

        self.cost.residuals(&states[..], &self.acts, residuals);

        residuals.norm_squared()
    }

    /// Compute the residual Jacobian at the current trajectory.
    ///
    /// Expects `self.acts` and `self.states` to hold the current iterate.
    fn linearise(&mut self, poly: &RefPoly) {
        // The initial state is fixed
        self.sens[0].fill(0.0);

        for k in 0..self.num_steps.saturating_sub(1) {
            let (a, b) = self
                .model
                .jacobians(&self.states[k], &self.acts[k], self.step_s, poly);

            let mut next = a * &self.sens[k];
            for r in 0..6 {
                next[(r, 2 * k)] += b[(r, 0)];
                next[(r, 2 * k + 1)] += b[(r, 1)];
            }
            self.sens[k + 1] = next;
        }

        self.cost.jacobian(&self.sens, &mut self.jacobian);
    }

    /// Solve the damped Gauss-Newton system over the free variables.
    ///
    /// Free variables on a bound whose step points out of the box are moved into the held set and
    /// the system is solved again.
    fn damped_step(
        &self,
        u: &DVector<f64>,
        jtj: &DMatrix<f64>,
        grad: &DVector<f64>,
        free: &[usize],
        damping: f64,
    ) -> StepResult {
        let mut free = free.to_vec();

        loop {
            if free.is_empty() {
                return StepResult::AllHeld;
            }

            let nf = free.len();
            let h = DMatrix::from_fn(nf, nf, |i, j| {
                jtj[(free[i], free[j])] + if i == j { damping } else { 0.0 }
            });
            let rhs = DVector::from_fn(nf, |i, _| -grad[free[i]]);

            let step_free = match h.cholesky() {
                Some(c) => c.solve(&rhs),
                None => return StepResult::NotPositiveDefinite,
            };

            let before = free.len();
            let mut kept = Vec::with_capacity(nf);
            for (i, &var) in free.iter().enumerate() {
                if !self.blocked(u, var, step_free[i]) {
                    kept.push(var);
                }
            }

            if kept.len() == before {
                let mut step = DVector::zeros(u.len());
                for (i, &var) in free.iter().enumerate() {
                    step[var] = step_free[i];
                }
                return StepResult::Step(step);
            }

            free = kept;
        }
    }

    /// True if variable `i` sits on a bound and `direction` points out of the box.
    fn blocked(&self, u: &DVector<f64>, i: usize, direction: f64) -> bool {
        (u[i] <= self.lower[i] && direction < 0.0) || (u[i] >= self.upper[i] && direction > 0.0)
    }

    fn check_time(&self, start: Instant, iterations: usize) -> Result<(), OptimError> {
        let elapsed_s = start.elapsed().as_secs_f64();

        match elapsed_s > self.solver.max_solve_time_s {
            true => Err(OptimError::Timeout {
                elapsed_s,
                iterations,
            }),
            false => Ok(()),
        }
    }
}

enum StepResult {
    Step(DVector<f64>),
    AllHeld,
    NotPositiveDefinite,
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn variable_bounds(bounds: &ActuationBounds, num_steps: usize) -> (DVector<f64>, DVector<f64>) {
    let (min_steer, max_steer) = bounds.steer_range();
    let (min_throttle, max_throttle) = bounds.throttle_range();

    let lower = DVector::from_fn(2 * num_steps, |i, _| match i % 2 {
        0 => min_steer,
        _ => min_throttle,
    });
    let upper = DVector::from_fn(2 * num_steps, |i, _| match i % 2 {
        0 => max_steer,
        _ => max_throttle,
    });

    (lower, upper)
}

fn set_actuations(u: &DVector<f64>, acts: &mut [Actuation]) {
    for (k, act) in acts.iter_mut().enumerate() {
        act.steer_rad = u[2 * k];
        act.throttle = u[2 * k + 1];
    }
}

fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    value.max(lower).min(upper)
}
