//! # MPC control module
//!
//! Drives the MPC once per telemetry message and packages the result for the simulator. When a
//! cycle fails the module falls back instead of returning an error:
//!
//! - Invalid waypoints or a degenerate reference: the simulator is told to drive manually.
//! - A failed optimisation: depending on the configured [`FallbackMode`] either the actuation in
//!   effect is held, or the vehicle is straightened and slowed down.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
pub use params::*;
pub use state::*;
use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What to send when the optimisation fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FallbackMode {
    /// Re-send the actuation reported by the telemetry
    HoldLast,

    /// Zero steering and the configured deceleration throttle
    Decelerate,
}

/// Possible errors that can occur during MpcCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Invalid MPC parameters: {0}")]
    InvalidMpcParams(crate::mpc::ParamsError),

    #[error("Invalid parameter {0}: {1}")]
    InvalidParam(&'static str, f64),

    #[error("Could not create the archive: {0}")]
    ArchiveError(ArchiveError),

    #[error("MpcCtrl has not been initialised")]
    NotInitialised,
}
