//! spat-client: example OSC client for a running spatialiser
//!
//! Continually repositions one sound source, sweeping it from left to
//! right along the x axis. Positioning messages have the format
//!
//!   /source/<index>/xyz <x> <y> <z>
//!
//! where <index> is the 1-based source number and the coordinates are
//! floating-point metres.

use clap::Parser;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::f32::consts::TAU;
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "spat-client")]
#[command(about = "Sweep a spatialiser source from side to side over OSC", long_about = None)]
struct Cli {
    /// Port the spatialiser is listening on
    #[arg(short = 'p', long, default_value = "9130")]
    osc_port: u16,

    /// Source number to move (1-based)
    #[arg(short, long, default_value = "1")]
    source: usize,

    /// Sweep amplitude in metres
    #[arg(short, long, default_value = "1.0")]
    amplitude: f32,

    /// Sweep frequency in Hz
    #[arg(short, long, default_value = "0.2")]
    frequency: f32,

    /// Interval between position updates in milliseconds
    #[arg(short, long, default_value = "10")]
    interval_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    let target = format!("127.0.0.1:{}", cli.osc_port);
    let addr = format!("/source/{}/xyz", cli.source);
    let interval = Duration::from_millis(cli.interval_ms);

    println!("Sweeping {addr} via {target} every {}ms", cli.interval_ms);

    let mut frame: u64 = 0;
    loop {
        let t = frame as f32 * interval.as_secs_f32();
        let x = cli.amplitude * (cli.frequency * TAU * t).sin();
        let packet = OscPacket::Message(OscMessage {
            addr: addr.clone(),
            args: vec![OscType::Float(x), OscType::Float(3.0), OscType::Float(0.0)],
        });
        socket.send_to(&encoder::encode(&packet)?, &target)?;
        frame += 1;
        thread::sleep(interval);
    }
}
