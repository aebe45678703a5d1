//! Configuration for the spatialiser engine.
//!
//! All settings live in one immutable [`SpatialiserConfig`], loaded from a
//! TOML file or built from defaults, validated once, and passed by reference
//! into every constructor. Nothing reads configuration from globals.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SpatError};
use crate::geometry::{Axis, ModulePlacement, Vec3};
use crate::panner::PanningAlgorithm;

pub const DEFAULT_OSC_PORT: u16 = 9130;
pub const DEFAULT_VISUALISER_TARGET: &str = "127.0.0.1:9129";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialiserConfig {
    /// Port to listen on for `/source/<n>/xyz` position messages.
    pub osc_port: u16,
    pub num_sources: usize,
    /// Drivers taken from the template for each module.
    pub drivers_per_module: usize,
    /// Per-tick retention factor of the position smoother, in (0, 1).
    pub smoothing_coeff: f32,
    /// Animator period in milliseconds.
    pub tick_interval_ms: u64,
    /// Give each source a random initial height in [0, 1) metres.
    pub randomise_source_z: bool,
    /// Seed each source with gentle random positional oscillations.
    pub randomise_lfos: bool,
    /// Discard coefficient frames instead of handing them to an audio engine.
    pub disable_audio: bool,
    /// Raw driver offsets in millimetres, as drawn in the mechanical layout.
    pub driver_template: Vec<[f32; 2]>,
    /// Centre coordinates and rotation of each module, in metres / radians.
    pub modules: Vec<ModuleConfig>,
    pub environment: EnvironmentConfig,
    pub panning: PanningConfig,
    pub routing: RoutingConfig,
    pub lfe: LfeConfig,
    pub midi: MidiConfig,
    pub visualiser: VisualiserConfig,
    pub sound_check: SoundCheckConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: f32,
}

impl ModuleConfig {
    pub fn placement(&self) -> ModulePlacement {
        ModulePlacement::new(Vec3::new(self.x, self.y, self.z), self.rotation)
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        ModuleConfig {
            x: 0.0,
            y: 4.0,
            z: 0.0,
            rotation: 0.0,
        }
    }
}

/// Environment extents, metres. Only used to map normalised MIDI values into
/// world coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub radius_x: f32,
    pub radius_y: f32,
    pub radius_z: f32,
}

impl EnvironmentConfig {
    pub fn radius(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.radius_x,
            Axis::Y => self.radius_y,
            Axis::Z => self.radius_z,
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            radius_x: 2.0,
            radius_y: 1.0,
            radius_z: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PanningConfig {
    pub algorithm: PanningAlgorithm,
    /// Beamformer active radius, metres.
    pub radius: f32,
}

impl Default for PanningConfig {
    fn default() -> Self {
        PanningConfig {
            algorithm: PanningAlgorithm::Beamformer,
            radius: 0.5,
        }
    }
}

/// Per-source input chain parameters, exported to the external audio engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub input_gain: f32,
    pub highpass_cutoff_hz: f32,
    /// Hard ceiling applied to every output gain.
    pub limiter_ceiling: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            input_gain: 0.15,
            highpass_cutoff_hz: 300.0,
            limiter_ceiling: 0.25,
        }
    }
}

/// Optional low-frequency effects bus: a low-passed mono mixdown routed to
/// one designated channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LfeConfig {
    pub enabled: bool,
    pub lowpass_cutoff_hz: f32,
    pub gain: f32,
    /// Output channel for the bus; defaults to the last speaker.
    pub channel: Option<usize>,
}

impl Default for LfeConfig {
    fn default() -> Self {
        LfeConfig {
            enabled: false,
            lowpass_cutoff_hz: 180.0,
            gain: 40.0,
            channel: None,
        }
    }
}

/// How normalised MIDI axis values map into world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MidiAxisScale {
    /// Value 0 maps to -radius, 127 to +radius, per environment axis.
    Radius,
    /// Value 0..127 maps linearly onto a fixed per-axis range.
    Literal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    pub enabled: bool,
    /// Input port, matched by substring.
    pub device_name: String,
    pub axis_scale: MidiAxisScale,
    pub literal_min: [f32; 3],
    pub literal_max: [f32; 3],
}

impl Default for MidiConfig {
    fn default() -> Self {
        MidiConfig {
            enabled: false,
            device_name: "IAC Driver Bus 1".to_string(),
            axis_scale: MidiAxisScale::Radius,
            literal_min: [-2.0, -1.0, -0.5],
            literal_max: [2.0, 1.0, 0.5],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualiserConfig {
    pub enabled: bool,
    pub target: String,
}

impl Default for VisualiserConfig {
    fn default() -> Self {
        VisualiserConfig {
            enabled: true,
            target: DEFAULT_VISUALISER_TARGET.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundCheckConfig {
    /// Test gain applied to each channel in turn.
    pub level: f32,
    pub burst_interval_ms: u64,
}

impl Default for SoundCheckConfig {
    fn default() -> Self {
        SoundCheckConfig {
            level: 0.02,
            burst_interval_ms: 250,
        }
    }
}

impl Default for SpatialiserConfig {
    fn default() -> Self {
        SpatialiserConfig {
            osc_port: DEFAULT_OSC_PORT,
            num_sources: 2,
            drivers_per_module: 32,
            smoothing_coeff: 0.9,
            tick_interval_ms: 20,
            randomise_source_z: true,
            randomise_lfos: false,
            disable_audio: false,
            driver_template: default_driver_template(),
            modules: default_module_layout(),
            environment: EnvironmentConfig::default(),
            panning: PanningConfig::default(),
            routing: RoutingConfig::default(),
            lfe: LfeConfig::default(),
            midi: MidiConfig::default(),
            visualiser: VisualiserConfig::default(),
            sound_check: SoundCheckConfig::default(),
        }
    }
}

impl SpatialiserConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SpatError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: SpatialiserConfig =
            toml::from_str(&text).map_err(|e| SpatError::ConfigFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn num_speakers(&self) -> usize {
        self.modules.len() * self.drivers_per_module
    }

    pub fn module_placements(&self) -> Vec<ModulePlacement> {
        self.modules.iter().map(|m| m.placement()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_sources == 0 {
            return Err(SpatError::config("num_sources must be at least 1"));
        }
        if self.drivers_per_module == 0 {
            return Err(SpatError::config("drivers_per_module must be at least 1"));
        }
        if self.modules.is_empty() {
            return Err(SpatError::config("module layout is empty"));
        }
        if self.driver_template.len() < self.drivers_per_module {
            return Err(SpatError::config(format!(
                "driver template has {} rows, but {} drivers per module are configured",
                self.driver_template.len(),
                self.drivers_per_module
            )));
        }
        if !(self.smoothing_coeff > 0.0 && self.smoothing_coeff < 1.0) {
            return Err(SpatError::config(format!(
                "smoothing_coeff must be in (0, 1), got {}",
                self.smoothing_coeff
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(SpatError::config("tick_interval_ms must be at least 1"));
        }
        if self.panning.algorithm == PanningAlgorithm::Beamformer && !(self.panning.radius > 0.0) {
            return Err(SpatError::config(format!(
                "beamformer radius must be positive, got {}",
                self.panning.radius
            )));
        }
        if !(self.routing.limiter_ceiling > 0.0) {
            return Err(SpatError::config("limiter ceiling must be positive"));
        }
        if self.routing.input_gain < 0.0 {
            return Err(SpatError::config("input gain must not be negative"));
        }
        if let Some(channel) = self.lfe.channel {
            if channel >= self.num_speakers() {
                return Err(SpatError::config(format!(
                    "LFE channel {} is out of range for {} speakers",
                    channel,
                    self.num_speakers()
                )));
            }
        }
        if self.midi.axis_scale == MidiAxisScale::Literal {
            for axis in 0..3 {
                if self.midi.literal_min[axis] >= self.midi.literal_max[axis] {
                    return Err(SpatError::config(format!(
                        "literal MIDI range for axis {} is empty",
                        axis
                    )));
                }
            }
        }
        if !(self.sound_check.level > 0.0) {
            return Err(SpatError::config("sound check level must be positive"));
        }
        Ok(())
    }
}

/// The four-module wall of the reference installation, centred 4 m in front
/// of the listener.
fn default_module_layout() -> Vec<ModuleConfig> {
    [-1.598, -0.533, 0.533, 1.598]
        .iter()
        .map(|&x| ModuleConfig {
            x,
            y: 4.0,
            z: 0.0,
            rotation: 0.0,
        })
        .collect()
}

/// Uniform 8 x 4 grid of 32 drivers. Real installations replace this with
/// the measured driver layout of their module.
fn default_driver_template() -> Vec<[f32; 2]> {
    let mut rows = Vec::with_capacity(32);
    for row in 0..4 {
        for col in 0..8 {
            rows.push([col as f32 * 62.0, row as f32 * 120.0]);
        }
    }
    rows
}
