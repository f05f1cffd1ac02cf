//! Kinematic bicycle model
//!
//! The model propagates the vehicle state together with its cross track and heading errors
//! relative to a reference polynomial. Positive steering turns the vehicle to the right.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix6, Matrix6x2, Vector6};
use serde::{Deserialize, Serialize};

// Internal
use super::RefPoly;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of the vehicle in its local frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    pub psi: f64,
    pub v: f64,

    /// Cross track error
    pub cte: f64,

    /// Heading error
    pub epsi: f64,
}

/// An actuation pair applied over one step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Actuation {
    /// Units: radians
    pub steer_rad: f64,

    pub throttle: f64,
}

/// The kinematic bicycle model.
#[derive(Debug, Clone, Copy)]
pub struct KinematicModel {
    wheelbase_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleState {
    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(self.x, self.y, self.psi, self.v, self.cte, self.epsi)
    }

    pub fn from_vector(vec: &Vector6<f64>) -> Self {
        Self {
            x: vec[0],
            y: vec[1],
            psi: vec[2],
            v: vec[3],
            cte: vec[4],
            epsi: vec[5],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

impl KinematicModel {
    pub fn new(wheelbase_m: f64) -> Self {
        Self { wheelbase_m }
    }

    /// Propagate the state by `dt` seconds under the given actuation.
    pub fn step(
        &self,
        state: &VehicleState,
        act: &Actuation,
        dt: f64,
        poly: &RefPoly,
    ) -> VehicleState {
        let (sin_psi, cos_psi) = state.psi.sin_cos();
        let yaw_change = state.v * act.steer_rad * dt / self.wheelbase_m;

        VehicleState {
            x: state.x + state.v * cos_psi * dt,
            y: state.y + state.v * sin_psi * dt,
            psi: state.psi - yaw_change,
            v: state.v + act.throttle * dt,
            cte: poly.eval(state.x) - state.y + state.v * state.epsi.sin() * dt,
            epsi: state.psi - poly.deriv(state.x).atan() - yaw_change,
        }
    }

    /// Jacobians of [`KinematicModel::step`] with respect to the state and the actuation.
    ///
    /// State ordering is `[x, y, psi, v, cte, epsi]`, actuation ordering is `[steer, throttle]`.
    pub fn jacobians(
        &self,
        state: &VehicleState,
        act: &Actuation,
        dt: f64,
        poly: &RefPoly,
    ) -> (Matrix6<f64>, Matrix6x2<f64>) {
        let (sin_psi, cos_psi) = state.psi.sin_cos();
        let (sin_epsi, cos_epsi) = state.epsi.sin_cos();
        let slope = poly.deriv(state.x);
        let dt_lf = dt / self.wheelbase_m;

        let mut a = Matrix6::zeros();

        // x
        a[(0, 0)] = 1.0;
        a[(0, 2)] = -state.v * sin_psi * dt;
        a[(0, 3)] = cos_psi * dt;

        // y
        a[(1, 1)] = 1.0;
        a[(1, 2)] = state.v * cos_psi * dt;
        a[(1, 3)] = sin_psi * dt;

        // psi
        a[(2, 2)] = 1.0;
        a[(2, 3)] = -act.steer_rad * dt_lf;

        // v
        a[(3, 3)] = 1.0;

        // cte
        a[(4, 0)] = slope;
        a[(4, 1)] = -1.0;
        a[(4, 3)] = sin_epsi * dt;
        a[(4, 5)] = state.v * cos_epsi * dt;

        // epsi
        a[(5, 0)] = -poly.deriv2(state.x) / (1.0 + slope * slope);
        a[(5, 2)] = 1.0;
        a[(5, 3)] = -act.steer_rad * dt_lf;

        let mut b = Matrix6x2::zeros();
        b[(2, 0)] = -state.v * dt_lf;
        b[(3, 1)] = dt;
        b[(5, 0)] = -state.v * dt_lf;

        (a, b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    const LF: f64 = 2.67;

    #[test]
    fn test_straight_line() {
        let model = KinematicModel::new(LF);
        let poly = RefPoly::new(vec![0.0, 0.0, 0.0, 0.0]);
        let state = VehicleState {
            x: 1.0,
            v: 10.0,
            ..Default::default()
        };

        let next = model.step(&state, &Actuation::default(), 0.1, &poly);

        assert_abs_diff_eq!(next.x, 2.0, epsilon = 1e-12);
        assert_eq!(next.y, 0.0);
        assert_eq!(next.psi, 0.0);
        assert_eq!(next.v, 10.0);
        assert_eq!(next.cte, 0.0);
        assert_eq!(next.epsi, 0.0);
    }

    #[test]
    fn test_steer_sign() {
        // Positive steering reduces the heading, i.e. turns right
        let model = KinematicModel::new(LF);
        let poly = RefPoly::new(vec![0.0]);
        let state = VehicleState {
            v: 10.0,
            ..Default::default()
        };
        let act = Actuation {
            steer_rad: 0.2,
            throttle: 0.5,
        };

        let next = model.step(&state, &act, 0.1, &poly);

        assert!(next.psi < 0.0);
        assert_abs_diff_eq!(next.psi, -10.0 * 0.2 * 0.1 / LF, epsilon = 1e-12);
        assert_abs_diff_eq!(next.v, 10.05, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobians_finite_difference() {
        let model = KinematicModel::new(LF);
        let poly = RefPoly::new(vec![0.8, -0.1, 0.03, -0.002]);
        let state = VehicleState {
            x: 1.3,
            y: -0.4,
            psi: 0.2,
            v: 12.0,
            cte: 0.7,
            epsi: -0.15,
        };
        let act = Actuation {
            steer_rad: 0.1,
            throttle: -0.3,
        };
        let dt = 0.1;
        let h = 1e-6;

        let (a, b) = model.jacobians(&state, &act, dt, &poly);

        for j in 0..6 {
            let mut plus = state.to_vector();
            let mut minus = state.to_vector();
            plus[j] += h;
            minus[j] -= h;

            let fd = (model
                .step(&VehicleState::from_vector(&plus), &act, dt, &poly)
                .to_vector()
                - model
                    .step(&VehicleState::from_vector(&minus), &act, dt, &poly)
                    .to_vector())
                / (2.0 * h);

            for i in 0..6 {
                assert_abs_diff_eq!(a[(i, j)], fd[i], epsilon = 1e-6);
            }
        }

        for j in 0..2 {
            let mut plus = act;
            let mut minus = act;
            match j {
                0 => {
                    plus.steer_rad += h;
                    minus.steer_rad -= h;
                }
                _ => {
                    plus.throttle += h;
                    minus.throttle -= h;
                }
            }

            let fd = (model.step(&state, &plus, dt, &poly).to_vector()
                - model.step(&state, &minus, dt, &poly).to_vector())
                / (2.0 * h);

            for i in 0..6 {
                assert_abs_diff_eq!(b[(i, j)], fd[i], epsilon = 1e-6);
            }
        }
    }
}
