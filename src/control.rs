//! The control plane: OSC input, MIDI input, and the animator.
//!
//! Control inputs only ever write into renderer cells; the animator is the
//! single clock that turns those targets into rendered frames, posting one
//! tick per renderer per period.
//!
//! MIDI mapping: the channel selects the source, and controllers 1..=7 map
//! to x, y, z, x-jitter amplitude, x-jitter frequency, y-jitter amplitude
//! and y-jitter frequency. Position values scale either across the
//! environment extents or across a fixed range, depending on configuration.
//! Frequencies scale exponentially so the knob sweeps musical octaves.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{EnvironmentConfig, MidiAxisScale, MidiConfig, SpatialiserConfig};
use crate::error::Result;
use crate::geometry::Axis;
use crate::midi::{MidiControlChange, MidiController};
use crate::osc::OscServer;
use crate::renderer::SourceRenderer;

/// Map a normalised [0, 1] value onto [-radius, +radius].
pub fn scale_normalised_to_coord(value: f32, radius: f32) -> f32 {
    value * (radius * 2.0) - radius
}

/// Map `value` from a linear input range onto an exponential output range.
pub fn scale_lin_exp(value: f32, in_lo: f32, in_hi: f32, out_lo: f32, out_hi: f32) -> f32 {
    let normalised = (value - in_lo) / (in_hi - in_lo);
    out_lo * (out_hi / out_lo).powf(normalised)
}

/// Jitter frequency range swept by a MIDI controller, Hz.
const LFO_FREQ_LO: f32 = 0.01;
const LFO_FREQ_HI: f32 = 10.0;

/// Apply one control change to the renderer it addresses.
pub fn apply_control_change(
    renderers: &[SourceRenderer],
    environment: &EnvironmentConfig,
    midi: &MidiConfig,
    change: MidiControlChange,
) {
    let renderer = match renderers.get(change.channel as usize) {
        Some(renderer) => renderer,
        None => {
            warn!(
                "MIDI control change on channel {} has no matching source",
                change.channel
            );
            return;
        }
    };
    // Controllers are 1-indexed on the wire; controller 0 is unused.
    let slot = match change.controller.checked_sub(1) {
        Some(slot) => slot,
        None => {
            debug!("ignoring MIDI controller 0");
            return;
        }
    };
    let value = change.value as f32 / 127.0;

    match slot {
        0 | 1 | 2 => {
            let axis = [Axis::X, Axis::Y, Axis::Z][slot as usize];
            let coord = match midi.axis_scale {
                MidiAxisScale::Radius => scale_normalised_to_coord(value, environment.radius(axis)),
                MidiAxisScale::Literal => {
                    let lo = midi.literal_min[slot as usize];
                    let hi = midi.literal_max[slot as usize];
                    lo + value * (hi - lo)
                }
            };
            debug!(
                "MIDI set source {} axis {:?} to {:.3}",
                change.channel, axis, coord
            );
            renderer.set_axis(axis, coord);
        }
        3 => renderer.update_lfo(|params| params.x_amp = value),
        4 => renderer.update_lfo(|params| {
            params.x_freq = scale_lin_exp(value, 0.0, 1.0, LFO_FREQ_LO, LFO_FREQ_HI)
        }),
        5 => renderer.update_lfo(|params| params.y_amp = value),
        6 => renderer.update_lfo(|params| {
            params.y_freq = scale_lin_exp(value, 0.0, 1.0, LFO_FREQ_LO, LFO_FREQ_HI)
        }),
        _ => debug!("unhandled MIDI controller {}", change.controller),
    }
}

/// Running control threads: the OSC server, the optional MIDI connection and
/// the animator.
pub struct ControlPlane {
    osc: OscServer,
    midi: Option<MidiController>,
    animator: Option<JoinHandle<()>>,
    running: Arc<Mutex<bool>>,
}

impl ControlPlane {
    /// Start every control input against the given renderers.
    pub fn start(
        config: &SpatialiserConfig,
        renderers: Arc<Vec<SourceRenderer>>,
    ) -> Result<ControlPlane> {
        let mut osc = OscServer::new(config.osc_port)?;
        osc.start(renderers.clone())?;

        let midi = if config.midi.enabled {
            let midi_renderers = renderers.clone();
            let environment = config.environment;
            let midi_config = config.midi.clone();
            Some(MidiController::connect(
                &config.midi.device_name,
                move |change| {
                    apply_control_change(
                        midi_renderers.as_slice(),
                        &environment,
                        &midi_config,
                        change,
                    )
                },
            )?)
        } else {
            None
        };

        let running = Arc::new(Mutex::new(true));
        let tick_interval = Duration::from_millis(config.tick_interval_ms);
        let dt = config.tick_interval_ms as f32 / 1000.0;
        let animator_running = running.clone();
        let animator = thread::spawn(move || {
            while *animator_running.lock().unwrap() {
                for renderer in renderers.iter() {
                    renderer.tick(dt);
                }
                thread::sleep(tick_interval);
            }
        });

        Ok(ControlPlane {
            osc,
            midi,
            animator: Some(animator),
            running,
        })
    }

    /// Stop the animator and both inputs, waiting for their threads.
    pub fn stop(&mut self) {
        *self.running.lock().unwrap() = false;
        if let Some(animator) = self.animator.take() {
            let _ = animator.join();
        }
        self.osc.stop();
        self.midi = None;
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.stop();
    }
}
