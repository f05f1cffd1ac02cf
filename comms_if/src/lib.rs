//! # Communications interface crate.
//!
//! Provides the communications interfaces between the controller and the simulator.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Network module
pub mod net;

/// Simulator event frames
pub mod sim;
