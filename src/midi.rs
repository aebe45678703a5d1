//! MIDI input for live source control.
//!
//! Only control change messages are of interest: the channel selects the
//! source and the controller number selects the parameter. Interpretation of
//! the values happens in the control plane; this module just finds the port
//! and delivers parsed control changes to a callback.

use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::info;

use crate::error::{Result, SpatError};

/// A parsed control change. The channel is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiControlChange {
    pub channel: u8,
    pub controller: u8,
    pub value: u8,
}

/// Parse raw MIDI bytes, keeping control changes and dropping everything
/// else.
pub fn parse_control_change(bytes: &[u8]) -> Option<MidiControlChange> {
    if bytes.len() < 3 {
        return None;
    }
    let status = bytes[0];
    if status & 0xF0 != 0xB0 {
        return None;
    }
    Some(MidiControlChange {
        channel: status & 0x0F,
        controller: bytes[1],
        value: bytes[2],
    })
}

/// An open MIDI input connection. Dropping it closes the port.
pub struct MidiController {
    _connection: MidiInputConnection<()>,
}

impl MidiController {
    /// Connect to the first input port whose name contains `device_name` and
    /// invoke `handler` for every control change received.
    pub fn connect(
        device_name: &str,
        handler: impl Fn(MidiControlChange) + Send + 'static,
    ) -> Result<Self> {
        let mut midi_in =
            MidiInput::new("spatialiser").map_err(|e| SpatError::Midi(e.to_string()))?;
        midi_in.ignore(Ignore::Sysex | Ignore::Time);

        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map_or(false, |n| n.contains(device_name))
            })
            .ok_or_else(|| SpatError::Midi(format!("MIDI device '{device_name}' not found")))?;

        let port_name = midi_in.port_name(port).unwrap_or_default();
        let connection = midi_in
            .connect(
                port,
                "spatialiser-input",
                move |_timestamp, message, _| {
                    if let Some(change) = parse_control_change(message) {
                        handler(change);
                    }
                },
                (),
            )
            .map_err(|e| SpatError::Midi(e.to_string()))?;
        info!("listening for MIDI control changes on '{}'", port_name);

        Ok(MidiController {
            _connection: connection,
        })
    }
}
