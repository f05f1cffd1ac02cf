//! Tracking cost
//!
//! Every term of the cost is a weighted square, so the cost is held as the squared norm of a
//! residual vector with each residual scaled by the square root of its weight. Residuals are laid
//! out as:
//!
//! - `[3k, 3k + 3)`: cte, epsi and speed error of state `k`, for `k` in `0..N`
//! - `[3N + 2k, 3N + 2k + 2)`: steering and throttle of actuation `k`, for `k` in `0..N`
//! - `[5N + 2k, 5N + 2k + 2)`: change in steering and throttle from actuation `k` to `k + 1`, for
//!   `k` in `0..N - 1`

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector, Matrix6xX};

// Internal
use super::{Actuation, CostWeights, VehicleState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The cost function over one horizon.
#[derive(Debug, Clone)]
pub struct CostFunction {
    weights: CostWeights,

    /// Square roots of `weights`
    sqrt_w: SqrtWeights,

    ref_speed: f64,

    num_steps: usize,
}

#[derive(Debug, Clone, Copy)]
struct SqrtWeights {
    cte: f64,
    epsi: f64,
    speed: f64,
    steer: f64,
    throttle: f64,
    steer_rate: f64,
    throttle_rate: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CostFunction {
    pub fn new(weights: CostWeights, ref_speed: f64, num_steps: usize) -> Self {
        Self {
            weights,
            sqrt_w: SqrtWeights {
                cte: weights.cte.sqrt(),
                epsi: weights.epsi.sqrt(),
                speed: weights.speed.sqrt(),
                steer: weights.steer.sqrt(),
                throttle: weights.throttle.sqrt(),
                steer_rate: weights.steer_rate.sqrt(),
                throttle_rate: weights.throttle_rate.sqrt(),
            },
            ref_speed,
            num_steps,
        }
    }

    /// Length of the residual vector.
    pub fn num_residuals(&self) -> usize {
        (7 * self.num_steps).saturating_sub(2)
    }

    /// Evaluate the cost directly from the weighted sums.
    ///
    /// `states` must hold at least `N` states and `acts` exactly `N` actuations. The state at
    /// the end of the horizon carries no cost.
    pub fn evaluate(&self, states: &[VehicleState], acts: &[Actuation]) -> f64 {
        let w = &self.weights;
        let n = self.num_steps;

        let tracking: f64 = states[..n]
            .iter()
            .map(|s| {
                w.cte * s.cte.powi(2)
                    + w.epsi * s.epsi.powi(2)
                    + w.speed * (s.v - self.ref_speed).powi(2)
            })
            .sum();

        let effort: f64 = acts
            .iter()
            .map(|a| w.steer * a.steer_rad.powi(2) + w.throttle * a.throttle.powi(2))
            .sum();

        let smoothness: f64 = acts
            .windows(2)
            .map(|p| {
                w.steer_rate * (p[1].steer_rad - p[0].steer_rad).powi(2)
                    + w.throttle_rate * (p[1].throttle - p[0].throttle).powi(2)
            })
            .sum();

        tracking + effort + smoothness
    }

    /// Fill `out` with the residual vector.
    pub fn residuals(&self, states: &[VehicleState], acts: &[Actuation], out: &mut DVector<f64>) {
        let sw = &self.sqrt_w;
        let n = self.num_steps;

        for (k, s) in states[..n].iter().enumerate() {
            out[3 * k] = sw.cte * s.cte;
            out[3 * k + 1] = sw.epsi * s.epsi;
            out[3 * k + 2] = sw.speed * (s.v - self.ref_speed);
        }

        let effort = 3 * n;
        for (k, a) in acts.iter().enumerate() {
            out[effort + 2 * k] = sw.steer * a.steer_rad;
            out[effort + 2 * k + 1] = sw.throttle * a.throttle;
        }

        let smooth = 5 * n;
        for (k, p) in acts.windows(2).enumerate() {
            out[smooth + 2 * k] = sw.steer_rate * (p[1].steer_rad - p[0].steer_rad);
            out[smooth + 2 * k + 1] = sw.throttle_rate * (p[1].throttle - p[0].throttle);
        }
    }

    /// Fill `out` with the Jacobian of the residuals with respect to the actuation sequence
    /// `[steer_0, throttle_0, steer_1, ...]`.
    ///
    /// `sens[k]` is the sensitivity of state `k` to the actuation sequence.
    pub fn jacobian(&self, sens: &[Matrix6xX<f64>], out: &mut DMatrix<f64>) {
        let sw = &self.sqrt_w;
        let n = self.num_steps;
        let num_vars = 2 * n;

        out.fill(0.0);

        for (k, s) in sens[..n].iter().enumerate() {
            for j in 0..num_vars {
                out[(3 * k, j)] = sw.cte * s[(4, j)];
                out[(3 * k + 1, j)] = sw.epsi * s[(5, j)];
                out[(3 * k + 2, j)] = sw.speed * s[(3, j)];
            }
        }

        let effort = 3 * n;
        for k in 0..n {
            out[(effort + 2 * k, 2 * k)] = sw.steer;
            out[(effort + 2 * k + 1, 2 * k + 1)] = sw.throttle;
        }

        let smooth = 5 * n;
        for k in 0..n.saturating_sub(1) {
            out[(smooth + 2 * k, 2 * k)] = -sw.steer_rate;
            out[(smooth + 2 * k, 2 * k + 2)] = sw.steer_rate;
            out[(smooth + 2 * k + 1, 2 * k + 1)] = -sw.throttle_rate;
            out[(smooth + 2 * k + 1, 2 * k + 3)] = sw.throttle_rate;
        }
    }
}
