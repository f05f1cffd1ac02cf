//! Send a single telemetry frame to the controller and print its reply
//!
//! The telemetry is read from a JSON file holding a `Telemetry` object.

use comms_if::{
    net::{MonitoredSocket, SocketOptions},
    sim::{self, SimMsg, Telemetry},
};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "send_telemetry",
    about = "Send a telemetry frame to the MPC controller"
)]
struct Opt {
    /// JSON file containing the telemetry to send
    #[structopt(parse(from_os_str))]
    telemetry: PathBuf,

    /// Endpoint of the controller
    #[structopt(short, long, default_value = "tcp://localhost:4567")]
    endpoint: String,

    /// Send an empty event frame instead, which should be answered with a manual frame
    #[structopt(long)]
    no_data: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let frame = match opt.no_data {
        true => String::from("42[\"telemetry\",null]"),
        false => {
            let telem: Telemetry = serde_json::from_str(&std::fs::read_to_string(&opt.telemetry)?)?;
            telem.to_frame()?
        }
    };

    let ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        connect_timeout: 1000,
        linger: 1,
        recv_timeout: 5000,
        send_timeout: 1000,
        req_correlate: true,
        req_relaxed: true,
        ..Default::default()
    };

    let socket = match MonitoredSocket::new(&ctx, zmq::REQ, socket_options, &opt.endpoint) {
        Ok(s) => s,
        Err(e) => {
            println!("Could not connect to the controller at {}", opt.endpoint);
            return Err(e.into());
        }
    };

    println!("Sending: {}", frame);
    socket.send(frame.as_str(), 0)?;

    let reply = match socket.recv_string(0)? {
        Ok(r) => r,
        Err(_) => {
            println!("Reply is not valid UTF-8");
            return Ok(());
        }
    };

    println!("Reply: {}", reply);

    match sim::parse_frame(&reply) {
        Ok(SimMsg::Other(event)) => println!("Event: {}", event),
        Ok(SimMsg::NotEvent) => println!("Empty reply"),
        Ok(m) => println!("Unexpected reply: {:?}", m),
        Err(e) => println!("Could not decode reply: {}", e),
    }

    Ok(())
}
