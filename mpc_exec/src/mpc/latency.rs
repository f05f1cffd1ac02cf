//! Actuator latency compensation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{Actuation, KinematicModel, RefPoly, VehicleState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Projects the current state forward by the actuator delay, so the optimiser plans from where
/// the vehicle will be when its command takes effect.
#[derive(Debug, Clone, Copy)]
pub struct LatencyCompensator {
    model: KinematicModel,
    delay_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LatencyCompensator {
    pub fn new(model: KinematicModel, delay_s: f64) -> Self {
        Self { model, delay_s }
    }

    /// The current state in the vehicle frame before compensation.
    ///
    /// The vehicle sits at the origin facing along x, so the cross track error is the reference
    /// value at `x = 0` and the heading error is minus the reference's tangent angle there.
    pub fn raw_state(speed: f64, poly: &RefPoly) -> VehicleState {
        VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: speed,
            cte: poly.eval(0.0),
            epsi: -poly.deriv(0.0).atan(),
        }
    }

    /// Apply the actuation currently in effect over the delay.
    pub fn compensate(
        &self,
        raw: &VehicleState,
        current: &Actuation,
        poly: &RefPoly,
    ) -> VehicleState {
        self.model.step(raw, current, self.delay_s, poly)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_raw_state() {
        let poly = RefPoly::new(vec![1.5, 1.0, 0.3]);
        let raw = LatencyCompensator::raw_state(20.0, &poly);

        assert_eq!(raw.cte, 1.5);
        assert_abs_diff_eq!(raw.epsi, -std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
        assert_eq!(raw.v, 20.0);
    }

    #[test]
    fn test_zero_delay_is_identity() {
        let comp = LatencyCompensator::new(KinematicModel::new(2.67), 0.0);
        let poly = RefPoly::new(vec![-0.7, 0.25, -0.01, 0.001]);
        let raw = LatencyCompensator::raw_state(17.3, &poly);
        let act = Actuation {
            steer_rad: -0.3,
            throttle: 0.8,
        };

        assert_eq!(comp.compensate(&raw, &act, &poly), raw);
    }

    #[test]
    fn test_delay() {
        let comp = LatencyCompensator::new(KinematicModel::new(2.67), 0.1);
        let poly = RefPoly::new(vec![0.0]);
        let raw = LatencyCompensator::raw_state(10.0, &poly);
        let act = Actuation {
            steer_rad: 0.1,
            throttle: 1.0,
        };

        let comp_state = comp.compensate(&raw, &act, &poly);

        assert_abs_diff_eq!(comp_state.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(comp_state.v, 10.1, epsilon = 1e-12);
        assert_abs_diff_eq!(comp_state.psi, -10.0 * 0.1 * 0.1 / 2.67, epsilon = 1e-12);
        assert_eq!(comp_state.psi, comp_state.epsi);
    }
}
