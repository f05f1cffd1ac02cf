//! # Simulator server
//!
//! Serves the simulator link over a bound REP socket. The simulator sends one frame per cycle and
//! waits for the reply, so every received frame must be answered before the next can be received.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    sim::{self, SimMsg, SimMsgError, SteerCmd, MANUAL_FRAME},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulator server
pub struct SimServer {
    socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send the reply: {0}")]
    SendError(zmq::Error),

    #[error("Could not receive a frame from the simulator: {0}")]
    RecvError(zmq::Error),

    #[error("The simulator sent a non UTF-8 frame")]
    NonUtf8Frame,

    #[error("Could not parse the frame: {0}")]
    ParseError(SimMsgError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServer {
    /// Create a new instance of the simulator server.
    ///
    /// This function will not block until the simulator connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, SimServerError> {
        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            linger: 1,
            recv_timeout: 10,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::REP, socket_options, &params.sim_endpoint)
            .map_err(SimServerError::SocketError)?;

        Ok(Self { socket })
    }

    pub fn is_connected(&self) -> bool {
        self.socket.connected()
    }

    /// Receive a frame from the simulator.
    ///
    /// Returns `Ok(None)` if there was no frame waiting. After recieving a frame a reply must be
    /// sent before recieving again. If the frame is invalid an empty reply is sent by this
    /// function.
    pub fn receive(&self) -> Result<Option<SimMsg>, SimServerError> {
        let frame = match self.socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                self.reply_empty()?;
                return Err(SimServerError::NonUtf8Frame);
            }
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(SimServerError::RecvError(e)),
        };

        match sim::parse_frame(&frame) {
            Ok(m) => Ok(Some(m)),
            Err(e) => {
                self.reply_empty()?;
                Err(SimServerError::ParseError(e))
            }
        }
    }

    /// Reply with a steering command.
    pub fn reply_steer(&self, cmd: &SteerCmd) -> Result<(), SimServerError> {
        // A command that can't be encoded still needs a reply
        match cmd.to_frame() {
            Ok(f) => self.send(&f),
            Err(e) => {
                self.reply_empty()?;
                Err(SimServerError::ParseError(e))
            }
        }
    }

    /// Reply telling the simulator to drive manually.
    pub fn reply_manual(&self) -> Result<(), SimServerError> {
        self.send(MANUAL_FRAME)
    }

    /// Reply with nothing, for frames which don't need an answer.
    pub fn reply_empty(&self) -> Result<(), SimServerError> {
        self.send("")
    }

    fn send(&self, frame: &str) -> Result<(), SimServerError> {
        self.socket
            .send(frame, 0)
            .map_err(SimServerError::SendError)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::sim::Telemetry;

    #[test]
    fn test_round_trip() {
        let ctx = zmq::Context::new();
        let params = NetParams {
            sim_endpoint: "inproc://sim_server_test".into(),
            sim_client_endpoint: "inproc://sim_server_test".into(),
        };

        let server = SimServer::new(&ctx, &params).unwrap();

        let client = ctx.socket(zmq::REQ).unwrap();
        client.set_rcvtimeo(2000).unwrap();
        client.set_linger(0).unwrap();
        client.connect(&params.sim_client_endpoint).unwrap();

        let telem = Telemetry {
            ptsx: vec![1.0, 2.0],
            ptsy: vec![0.0, 0.0],
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            speed: 1.0,
            steering_angle: 0.0,
            throttle: 0.0,
        };
        client.send(telem.to_frame().unwrap().as_str(), 0).unwrap();

        // Server polls with a short timeout
        let mut msg = None;
        for _ in 0..200 {
            if let Some(m) = server.receive().unwrap() {
                msg = Some(m);
                break;
            }
        }
        assert_eq!(msg, Some(SimMsg::Telemetry(telem)));

        server.reply_manual().unwrap();
        assert_eq!(client.recv_string(0).unwrap().unwrap(), MANUAL_FRAME);
    }
}
