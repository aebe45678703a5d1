//! OSC client for the external grid visualiser.
//!
//! The visualiser is a separate process listening on UDP. It is told about
//! the grid, the speaker layout and the sources once at startup, then
//! receives a position message per source per render tick. All traffic is
//! best effort: a missing visualiser must never disturb rendering, so send
//! failures are logged at debug level and dropped.

use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};
use tracing::debug;

use crate::error::{Result, SpatError};
use crate::geometry::{Speaker, Vec3};

/// RGBA palette cycled over source indices.
pub const SOURCE_COLOURS: [[f32; 4]; 11] = [
    [1.0, 0.0, 0.0, 1.0],
    [1.0, 0.5, 0.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
    [0.5, 1.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 1.0, 0.5, 1.0],
    [0.0, 1.0, 1.0, 1.0],
    [0.0, 0.5, 1.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
    [0.5, 0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0, 1.0],
];

/// Colour assigned to a source index, wrapping around the palette.
pub fn source_colour(index: usize) -> [f32; 4] {
    SOURCE_COLOURS[index % SOURCE_COLOURS.len()]
}

/// UDP client towards the visualiser process.
pub struct VisualiserClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl VisualiserClient {
    pub fn new(target: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let target = target
            .parse()
            .map_err(|e| SpatError::config(format!("invalid visualiser target {target}: {e}")))?;
        Ok(Self { socket, target })
    }

    fn send(&self, address: &str, args: Vec<OscType>) {
        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args,
        });
        match rosc::encoder::encode(&packet) {
            Ok(buf) => {
                if let Err(e) = self.socket.send_to(&buf, self.target) {
                    debug!("visualiser send to {} failed: {}", self.target, e);
                }
            }
            Err(e) => debug!("visualiser encode failed for {}: {}", address, e),
        }
    }

    /// Configure the background grid. The sleeps pace the messages so the
    /// visualiser applies them in order.
    pub fn send_grid_setup(&self) {
        self.send("/grid/xy/on", vec![OscType::Int(1)]);
        thread::sleep(Duration::from_millis(100));
        self.send("/grid/size", vec![OscType::Int(4)]);
        self.send("/grid/section/size", vec![OscType::Int(1)]);
        self.send("/grid/subdiv/num", vec![OscType::Int(10)]);
        thread::sleep(Duration::from_millis(100));
        self.send("/source/size", vec![OscType::Float(30.0)]);
        self.send("/source/fade", vec![OscType::Int(0)]);
    }

    /// Announce the speaker count and per-speaker positions. Speaker
    /// addresses are 1-indexed on the wire.
    pub fn send_speaker_layout(&self, speakers: &[Speaker]) {
        self.send("/speaker/number", vec![OscType::Int(speakers.len() as i32)]);
        thread::sleep(Duration::from_millis(200));
        self.send("/speaker/size", vec![OscType::Float(30.0)]);
        thread::sleep(Duration::from_millis(100));
        for speaker in speakers {
            self.send(
                &format!("/speaker/{}/xyz", speaker.index + 1),
                vec![
                    OscType::Float(speaker.position.x),
                    OscType::Float(speaker.position.y),
                    OscType::Float(speaker.position.z),
                ],
            );
        }
    }

    /// Register one source and its colour.
    pub fn send_source_setup(&self, index: usize, colour: [f32; 4]) {
        self.send("/source/number", vec![OscType::Int(index as i32 + 1)]);
        thread::sleep(Duration::from_millis(100));
        self.send(
            &format!("/source/{}/color", index + 1),
            colour.iter().map(|&c| OscType::Float(c)).collect(),
        );
    }

    /// Switch on the numeric source labels. Must be sent after every source
    /// has been registered.
    pub fn send_num_display(&self) {
        thread::sleep(Duration::from_millis(100));
        self.send("/source/numDisplay", vec![OscType::Int(1)]);
    }

    pub fn send_source_position(&self, index: usize, position: Vec3) {
        self.send(
            &format!("/source/{}/xyz", index + 1),
            vec![
                OscType::Float(position.x),
                OscType::Float(position.y),
                OscType::Float(position.z),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_target() {
        assert!(VisualiserClient::new("not-an-address").is_err());
    }

    #[test]
    fn test_send_to_dead_target_does_not_panic() {
        let client = VisualiserClient::new("127.0.0.1:9").unwrap();
        client.send_source_position(0, Vec3::ZERO);
    }

    #[test]
    fn test_colour_palette_wraps() {
        assert_eq!(source_colour(0), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(source_colour(11), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(source_colour(12), [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_source_position_message() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let target = listener.local_addr().unwrap();
        let client = VisualiserClient::new(&target.to_string()).unwrap();

        client.send_source_position(1, Vec3::new(0.5, -0.25, 1.0));

        let mut buf = [0u8; 256];
        let (size, _) = listener.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..size]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/source/2/xyz");
                assert_eq!(
                    msg.args,
                    vec![
                        OscType::Float(0.5),
                        OscType::Float(-0.25),
                        OscType::Float(1.0)
                    ]
                );
            }
            OscPacket::Bundle(_) => panic!("expected a message packet"),
        }
    }
}
