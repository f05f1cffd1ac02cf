//! # Simulator message module
//!
//! Encoding and decoding of the text frames exchanged with the driving simulator. Each frame is
//! an event frame: the `42` prefix followed by a JSON array `["<event>", <payload>]`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Prefix marking a frame as an event frame.
pub const EVENT_PREFIX: &str = "42";

/// Name of the inbound telemetry event.
pub const TELEMETRY_EVENT: &str = "telemetry";

/// Name of the outbound steering event.
pub const STEER_EVENT: &str = "steer";

/// Frame telling the simulator to hand control back to the driver.
pub const MANUAL_FRAME: &str = "42[\"manual\",{}]";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Telemetry sent by the simulator once per cycle.
///
/// Waypoints and pose are in the world frame, angles are in radians.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Telemetry {
    /// World x positions of the reference waypoints
    pub ptsx: Vec<f64>,

    /// World y positions of the reference waypoints
    pub ptsy: Vec<f64>,

    pub x: f64,
    pub y: f64,

    /// Heading of the vehicle
    pub psi: f64,

    pub speed: f64,

    /// Steering angle currently applied
    pub steering_angle: f64,

    /// Throttle currently applied
    pub throttle: f64,
}

/// Steering command returned to the simulator.
///
/// The overlays are given in the vehicle frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SteerCmd {
    /// Steering demand normalised to [-1, 1]
    pub steering_angle: f64,

    /// Throttle demand in [-1, 1]
    pub throttle: f64,

    /// Predicted path
    pub mpc_x: Vec<f64>,
    pub mpc_y: Vec<f64>,

    /// Reference path
    pub next_x: Vec<f64>,
    pub next_y: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A decoded simulator frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SimMsg {
    /// Telemetry for a new control cycle
    Telemetry(Telemetry),

    /// An event frame carrying no data, the vehicle should be driven manually
    NoData,

    /// An event other than telemetry
    Other(String),

    /// Not an event frame at all
    NotEvent,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum SimMsgError {
    #[error("Frame contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Frame is not a [event, payload] array")]
    InvalidFrame,

    #[error("Telemetry payload is invalid: {0}")]
    InvalidTelemetry(serde_json::Error),

    #[error("Could not serialise the message: {0}")]
    SerialiseError(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SteerCmd {
    /// Encode the command as a `steer` event frame.
    pub fn to_frame(&self) -> Result<String, SimMsgError> {
        let payload = serde_json::to_string(self).map_err(SimMsgError::SerialiseError)?;

        Ok(format!("{}[\"{}\",{}]", EVENT_PREFIX, STEER_EVENT, payload))
    }
}

impl Telemetry {
    /// Encode the telemetry as a `telemetry` event frame.
    pub fn to_frame(&self) -> Result<String, SimMsgError> {
        let payload = serde_json::to_string(self).map_err(SimMsgError::SerialiseError)?;

        Ok(format!("{}[\"{}\",{}]", EVENT_PREFIX, TELEMETRY_EVENT, payload))
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse a frame received from the simulator.
pub fn parse_frame(frame: &str) -> Result<SimMsg, SimMsgError> {
    if frame.len() <= EVENT_PREFIX.len() || !frame.starts_with(EVENT_PREFIX) {
        return Ok(SimMsg::NotEvent);
    }

    let data = match event_data(frame) {
        Some(d) => d,
        None => return Ok(SimMsg::NoData),
    };

    let mut array = match serde_json::from_str::<Value>(data).map_err(SimMsgError::InvalidJson)? {
        Value::Array(a) => a,
        _ => return Err(SimMsgError::InvalidFrame),
    };

    let event = match array.get(0) {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(SimMsgError::InvalidFrame),
    };

    if event != TELEMETRY_EVENT {
        return Ok(SimMsg::Other(event));
    }

    if array.len() < 2 {
        return Err(SimMsgError::InvalidFrame);
    }

    let telem = serde_json::from_value(array.swap_remove(1))
        .map_err(SimMsgError::InvalidTelemetry)?;

    Ok(SimMsg::Telemetry(telem))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Extract the `[...}]` part of an event frame, or `None` if the frame carries no data.
fn event_data(frame: &str) -> Option<&str> {
    if frame.contains("null") {
        return None;
    }

    let start = frame.find('[')?;
    let end = frame.rfind("}]")?;

    if end < start {
        return None;
    }

    Some(&frame[start..end + 2])
}
