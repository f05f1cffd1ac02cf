//! MpcCtrl parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::{FallbackMode, MpcCtrlError};
use crate::mpc;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for MPC control
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Params {
    /// Output used when the optimisation fails
    pub fallback_mode: FallbackMode,

    /// Throttle demanded in `FallbackMode::Decelerate`
    pub decel_throttle: f64,

    /// Factor applied to the telemetry speed before it's passed to the MPC
    pub speed_scale: f64,

    /// Distance between two points of the reference overlay
    pub overlay_spacing: f64,

    /// Number of points in the reference overlay
    pub overlay_num_points: usize,

    /// The MPC parameters themselves
    pub mpc: mpc::Params,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    pub fn validate(&self) -> Result<(), MpcCtrlError> {
        self.mpc.validate().map_err(MpcCtrlError::InvalidMpcParams)?;

        let (min_throttle, max_throttle) = self.mpc.bounds.throttle_range();
        if !(self.decel_throttle >= min_throttle && self.decel_throttle <= max_throttle) {
            return Err(MpcCtrlError::InvalidParam(
                "decel_throttle",
                self.decel_throttle,
            ));
        }

        if !(self.speed_scale > 0.0) || !self.speed_scale.is_finite() {
            return Err(MpcCtrlError::InvalidParam("speed_scale", self.speed_scale));
        }

        if !(self.overlay_spacing > 0.0) || !self.overlay_spacing.is_finite() {
            return Err(MpcCtrlError::InvalidParam(
                "overlay_spacing",
                self.overlay_spacing,
            ));
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            fallback_mode: FallbackMode::Decelerate,
            decel_throttle: -0.2,
            speed_scale: 1.0,
            overlay_spacing: 2.5,
            overlay_num_points: 25,
            mpc: mpc::Params::default(),
        }
    }
}
