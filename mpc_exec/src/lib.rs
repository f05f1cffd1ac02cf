//! # MPC library.
//!
//! This library allows other crates in the workspace, and the exec's own binaries, to access items
//! defined inside the MPC crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Model predictive control - the trajectory optimisation itself
pub mod mpc;

/// MPC control module - runs the MPC on each telemetry message and handles its failures
pub mod mpc_ctrl;

/// Simulator server - receives telemetry from and sends commands to the simulator
pub mod sim_server;
