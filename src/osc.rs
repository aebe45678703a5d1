//! OSC server for source position control.
//!
//! Listens on UDP for `/source/<n>/xyz` messages with three float arguments
//! and writes the decoded targets straight into the matching renderer's
//! target cell. Source numbers are 1-indexed on the wire. Anything else is
//! logged and dropped; a malformed packet never stops the server.

use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::geometry::Vec3;
use crate::renderer::SourceRenderer;

pub struct OscServer {
    socket: UdpSocket,
    port: u16,
    running: Arc<Mutex<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl OscServer {
    pub fn new(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(format!("0.0.0.0:{port}"))?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            port,
            running: Arc::new(Mutex::new(false)),
            thread: None,
        })
    }

    /// Start the receive thread. Positions are applied to `renderers` as
    /// they arrive.
    pub fn start(&mut self, renderers: Arc<Vec<SourceRenderer>>) -> Result<()> {
        *self.running.lock().unwrap() = true;

        let socket = self.socket.try_clone()?;
        let running = self.running.clone();
        info!("listening for OSC on port {}", self.port);

        self.thread = Some(thread::spawn(move || {
            let mut buf = [0u8; 1024];

            while *running.lock().unwrap() {
                match socket.recv_from(&mut buf) {
                    Ok((size, _addr)) => match rosc::decoder::decode_udp(&buf[..size]) {
                        Ok((_, packet)) => Self::handle_packet(&renderers, packet),
                        Err(e) => warn!("dropping malformed OSC packet: {}", e),
                    },
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) => {
                        error!("OSC server error: {}", e);
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    /// Stop the receive thread and wait for it to exit.
    pub fn stop(&mut self) {
        *self.running.lock().unwrap() = false;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn handle_packet(renderers: &[SourceRenderer], packet: OscPacket) {
        match packet {
            OscPacket::Message(msg) => Self::handle_message(renderers, &msg),
            OscPacket::Bundle(bundle) => {
                for inner in bundle.content {
                    Self::handle_packet(renderers, inner);
                }
            }
        }
    }

    fn handle_message(renderers: &[SourceRenderer], msg: &OscMessage) {
        if let Some((index, position)) = parse_source_position(msg) {
            match renderers.get(index) {
                Some(renderer) => {
                    debug!(
                        "set source {} position: {} {} {}",
                        index, position.x, position.y, position.z
                    );
                    renderer.set_target(position);
                }
                None => warn!("OSC position for unknown source {}", index + 1),
            }
        } else {
            warn!("OSC address not handled: {} ({:?})", msg.addr, msg.args);
        }
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Parse `/source/<n>/xyz` with three float arguments into a 0-based source
/// index and position. Returns `None` for anything else, including source
/// number 0.
fn parse_source_position(msg: &OscMessage) -> Option<(usize, Vec3)> {
    let parts: Vec<&str> = msg.addr.split('/').collect();
    let index = match parts.as_slice() {
        ["", "source", number, "xyz"] => number.parse::<usize>().ok()?.checked_sub(1)?,
        _ => return None,
    };

    if msg.args.len() != 3 {
        return None;
    }
    let mut coords = [0.0f32; 3];
    for (slot, arg) in coords.iter_mut().zip(&msg.args) {
        match arg {
            OscType::Float(value) => *slot = *value,
            _ => return None,
        }
    }
    Some((index, Vec3::new(coords[0], coords[1], coords[2])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyz_message(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    fn float_args(x: f32, y: f32, z: f32) -> Vec<OscType> {
        vec![OscType::Float(x), OscType::Float(y), OscType::Float(z)]
    }

    #[test]
    fn test_server_creation() {
        let result = OscServer::new(9531);
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_source_position() {
        let msg = xyz_message("/source/3/xyz", float_args(1.5, -0.5, 0.25));
        let (index, position) = parse_source_position(&msg).unwrap();
        assert_eq!(index, 2);
        assert_eq!(position, Vec3::new(1.5, -0.5, 0.25));
    }

    #[test]
    fn test_parse_rejects_source_zero() {
        // Sources are 1-indexed on the wire.
        let msg = xyz_message("/source/0/xyz", float_args(0.0, 0.0, 0.0));
        assert!(parse_source_position(&msg).is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_arg_count() {
        let msg = xyz_message(
            "/source/1/xyz",
            vec![OscType::Float(1.0), OscType::Float(2.0)],
        );
        assert!(parse_source_position(&msg).is_none());
    }

    #[test]
    fn test_parse_rejects_non_float_args() {
        let msg = xyz_message(
            "/source/1/xyz",
            vec![OscType::Int(1), OscType::Int(2), OscType::Int(3)],
        );
        assert!(parse_source_position(&msg).is_none());
    }

    #[test]
    fn test_parse_rejects_other_addresses() {
        for addr in [
            "/speaker/1/xyz",
            "/source/1/color",
            "/source/xyz",
            "/source/abc/xyz",
            "/source/1/xyz/extra",
        ] {
            let msg = xyz_message(addr, float_args(0.0, 0.0, 0.0));
            assert!(parse_source_position(&msg).is_none(), "accepted {addr}");
        }
    }
}
