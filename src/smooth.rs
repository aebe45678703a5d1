//! Position smoothing and low-frequency jitter.
//!
//! Sources glide toward their targets through a one-pole low-pass per axis,
//! so abrupt control messages never teleport a source across the array. An
//! optional pair of LFOs adds slow sinusoidal drift on top of the smoothed
//! position for ambient-motion installations.

use rand::Rng;
use std::f32::consts::TAU;

use crate::geometry::Vec3;

/// One-pole low-pass toward a target position, one filter per axis.
///
/// `coeff` is the per-tick retention factor: each call moves the value by
/// `(1 - coeff)` of the remaining distance. Values in (0, 1) converge without
/// overshoot.
#[derive(Debug, Clone)]
pub struct PositionSmoother {
    value: Vec3,
    coeff: f32,
}

impl PositionSmoother {
    pub fn new(initial: Vec3, coeff: f32) -> Self {
        PositionSmoother {
            value: initial,
            coeff,
        }
    }

    /// Advance one tick toward `target` and return the new value.
    pub fn advance(&mut self, target: Vec3) -> Vec3 {
        let step = 1.0 - self.coeff;
        self.value.x += step * (target.x - self.value.x);
        self.value.y += step * (target.y - self.value.y);
        self.value.z += step * (target.z - self.value.z);
        self.value
    }

    pub fn value(&self) -> Vec3 {
        self.value
    }
}

/// Amplitudes (metres) and frequencies (Hz) for the per-source jitter LFOs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LfoParams {
    pub x_amp: f32,
    pub x_freq: f32,
    pub y_amp: f32,
    pub y_freq: f32,
}

impl LfoParams {
    /// Random gentle drift, for installations that want sources to wander on
    /// their own.
    pub fn randomised<R: Rng>(rng: &mut R) -> Self {
        LfoParams {
            x_amp: rng.gen_range(0.1..0.25),
            x_freq: rng.gen_range(0.25..1.0),
            y_amp: rng.gen_range(0.1..0.25),
            y_freq: rng.gen_range(0.25..1.0),
        }
    }
}

/// Running LFO phases for one source. Phases are in cycles, wrapped to
/// [0, 1); the X and Y oscillators are in quadrature.
#[derive(Debug, Clone, Default)]
pub struct LfoState {
    params: LfoParams,
    x_phase: f32,
    y_phase: f32,
}

impl LfoState {
    pub fn set_params(&mut self, params: LfoParams) {
        self.params = params;
    }

    pub fn params(&self) -> LfoParams {
        self.params
    }

    /// Advance both phases by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.x_phase += self.params.x_freq * dt;
        while self.x_phase >= 1.0 {
            self.x_phase -= 1.0;
        }
        self.y_phase += self.params.y_freq * dt;
        while self.y_phase >= 1.0 {
            self.y_phase -= 1.0;
        }
    }

    /// Current (x, y) offset in metres. Zero amplitudes give a zero offset.
    pub fn offset(&self) -> (f32, f32) {
        (
            self.params.x_amp * (TAU * self.x_phase).sin(),
            self.params.y_amp * (TAU * self.y_phase).cos(),
        )
    }
}
