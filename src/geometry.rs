//! Speaker-array geometry: module placements, driver templates, and the
//! resolved speaker table.
//!
//! The array is built from identical physical modules, each carrying the same
//! driver layout. A [`DriverTemplate`] holds the per-module driver offsets in
//! millimetres; [`resolve_speakers`] instantiates it once per module placement
//! to produce the absolute speaker table used by every panner.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpatError};

/// A point or offset in world space, metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn axis(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Copy of this point with one coordinate replaced.
    pub fn with_axis(mut self, axis: Axis, value: f32) -> Vec3 {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }
}

/// World-space coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Position and orientation of one physical module.
///
/// Rotation is in radians about the vertical axis; it turns the module's
/// in-plane driver row, not its vertical stacking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulePlacement {
    pub position: Vec3,
    pub rotation: f32,
}

impl ModulePlacement {
    pub fn new(position: Vec3, rotation: f32) -> Self {
        ModulePlacement { position, rotation }
    }
}

/// Per-module driver offsets, in millimetres, ordered as wired.
///
/// The first offset axis runs along the module face (subject to the module's
/// rotation); the second maps straight to world height.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverTemplate {
    offsets: Vec<(f32, f32)>,
}

impl DriverTemplate {
    /// Build from offsets that are already centred and oriented.
    pub fn from_offsets(offsets: Vec<(f32, f32)>) -> Self {
        DriverTemplate { offsets }
    }

    /// Build from raw rows as drawn in the mechanical layout.
    ///
    /// The physical design is mounted upside down, so the second axis is
    /// flipped, then both axes are centred on their extents.
    pub fn from_raw_rows(rows: &[(f32, f32)]) -> Self {
        let mut offsets: Vec<(f32, f32)> = rows.iter().map(|&(x, y)| (x, -y)).collect();
        if !offsets.is_empty() {
            let (min_x, max_x) = offsets
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &(x, _)| {
                    (lo.min(x), hi.max(x))
                });
            let (min_y, max_y) = offsets
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &(_, y)| {
                    (lo.min(y), hi.max(y))
                });
            let mid_x = (min_x + max_x) / 2.0;
            let mid_y = (min_y + max_y) / 2.0;
            for offset in &mut offsets {
                offset.0 -= mid_x;
                offset.1 -= mid_y;
            }
        }
        DriverTemplate { offsets }
    }

    pub fn offsets(&self) -> &[(f32, f32)] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// One resolved driver: its channel index and absolute position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speaker {
    pub index: usize,
    pub position: Vec3,
}

/// Resolve the absolute speaker table from module placements and the driver
/// template.
///
/// Speakers are emitted in module order, then template order, so channel
/// indices are stable for a given configuration. Template offsets are
/// millimetres; output positions are metres.
pub fn resolve_speakers(
    modules: &[ModulePlacement],
    template: &DriverTemplate,
    drivers_per_module: usize,
) -> Result<Vec<Speaker>> {
    if modules.is_empty() {
        return Err(SpatError::config("module layout is empty"));
    }
    if template.len() < drivers_per_module {
        return Err(SpatError::config(format!(
            "driver template has {} rows, but {} drivers per module are configured",
            template.len(),
            drivers_per_module
        )));
    }

    let mut speakers = Vec::with_capacity(modules.len() * drivers_per_module);
    for module in modules {
        let (sin_rot, cos_rot) = module.rotation.sin_cos();
        for &(offset_x, offset_y) in template.offsets().iter().take(drivers_per_module) {
            let offset_x_m = offset_x * 0.001;
            let offset_y_m = offset_y * 0.001;
            let position = Vec3::new(
                module.position.x + cos_rot * offset_x_m,
                module.position.y + sin_rot * offset_x_m,
                module.position.z + offset_y_m,
            );
            speakers.push(Speaker {
                index: speakers.len(),
                position,
            });
        }
    }
    Ok(speakers)
}
