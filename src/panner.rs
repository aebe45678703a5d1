//! Per-speaker gain and delay computation.
//!
//! Two algorithms are supported: distance-based amplitude panning (DBAP),
//! which weights every speaker by inverse square distance, and a near-field
//! beamformer, which drives only the speakers within a radius of the source
//! and compensates their wavefront arrival times with per-channel delays.
//!
//! `compute` is pure: no internal state, safe to call from any thread.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpatError};
use crate::geometry::{Speaker, Vec3};

/// Speed of sound in air, metres per second.
pub const SPEED_OF_SOUND: f32 = 343.0;

/// Distance floor, metres. Keeps weights finite when a source sits on a
/// speaker.
const MIN_DISTANCE: f32 = 1e-4;

/// DBAP rolloff exponent.
const DBAP_ROLLOFF: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanningAlgorithm {
    Dbap,
    Beamformer,
}

/// Gain and delay for one output channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCoefficient {
    pub speaker: usize,
    pub gain: f32,
    pub delay: f32,
}

/// One coefficient per speaker, in speaker-table order.
pub type PanningResult = Vec<ChannelCoefficient>;

/// Maps a source position onto the speaker table.
pub struct Panner {
    speakers: Arc<[Speaker]>,
    algorithm: PanningAlgorithm,
    radius: f32,
}

impl Panner {
    pub fn new(
        speakers: Arc<[Speaker]>,
        algorithm: PanningAlgorithm,
        radius: f32,
    ) -> Result<Self> {
        if algorithm == PanningAlgorithm::Beamformer && !(radius > 0.0) {
            return Err(SpatError::config(format!(
                "beamformer radius must be positive, got {radius}"
            )));
        }
        Ok(Panner {
            speakers,
            algorithm,
            radius,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.speakers.len()
    }

    /// Compute per-speaker coefficients for a source at `position`.
    ///
    /// The result always has one entry per speaker, in table order, and never
    /// contains NaN or infinite values.
    pub fn compute(&self, position: Vec3) -> PanningResult {
        match self.algorithm {
            PanningAlgorithm::Dbap => self.compute_dbap(position),
            PanningAlgorithm::Beamformer => self.compute_beamformer(position),
        }
    }

    fn compute_dbap(&self, position: Vec3) -> PanningResult {
        let mut result: PanningResult = self
            .speakers
            .iter()
            .map(|speaker| {
                let distance = speaker.position.distance(&position).max(MIN_DISTANCE);
                ChannelCoefficient {
                    speaker: speaker.index,
                    gain: distance.powf(-DBAP_ROLLOFF),
                    delay: 0.0,
                }
            })
            .collect();
        normalize_constant_power(&mut result);
        result
    }

    fn compute_beamformer(&self, position: Vec3) -> PanningResult {
        let mut result: PanningResult = self
            .speakers
            .iter()
            .map(|speaker| {
                let distance = speaker.position.distance(&position).max(MIN_DISTANCE);
                if distance > self.radius {
                    ChannelCoefficient {
                        speaker: speaker.index,
                        gain: 0.0,
                        delay: 0.0,
                    }
                } else {
                    ChannelCoefficient {
                        speaker: speaker.index,
                        gain: 1.0 / distance,
                        delay: distance / SPEED_OF_SOUND,
                    }
                }
            })
            .collect();
        normalize_constant_power(&mut result);
        result
    }
}

/// Scale gains so the sum of their squares is 1. A frame with no active
/// speakers is left silent.
fn normalize_constant_power(result: &mut [ChannelCoefficient]) {
    let sum_squares: f32 = result.iter().map(|c| c.gain * c.gain).sum();
    if sum_squares > 0.0 {
        let scale = 1.0 / sum_squares.sqrt();
        for coefficient in result.iter_mut() {
            coefficient.gain *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn speaker_table(positions: &[(f32, f32, f32)]) -> Arc<[Speaker]> {
        positions
            .iter()
            .enumerate()
            .map(|(index, &(x, y, z))| Speaker {
                index,
                position: Vec3::new(x, y, z),
            })
            .collect()
    }

    fn sum_squares(result: &PanningResult) -> f32 {
        result.iter().map(|c| c.gain * c.gain).sum()
    }

    #[test]
    fn test_dbap_constant_power() {
        let speakers = speaker_table(&[(-1.0, 4.0, 0.0), (0.0, 4.0, 0.0), (1.0, 4.0, 0.0)]);
        let panner = Panner::new(speakers, PanningAlgorithm::Dbap, 0.5).unwrap();

        let result = panner.compute(Vec3::new(0.3, 1.0, 0.0));
        assert_eq!(result.len(), 3);
        assert!((sum_squares(&result) - 1.0).abs() < EPSILON);
        for c in &result {
            assert_eq!(c.delay, 0.0);
        }
    }

    #[test]
    fn test_dbap_closer_speaker_louder() {
        let speakers = speaker_table(&[(-1.0, 0.0, 0.0), (1.0, 0.0, 0.0)]);
        let panner = Panner::new(speakers, PanningAlgorithm::Dbap, 0.5).unwrap();

        let near = panner.compute(Vec3::new(-0.6, 0.0, 0.0));
        let far = panner.compute(Vec3::new(-0.4, 0.0, 0.0));
        assert!(near[0].gain > far[0].gain);
        assert!(near[0].gain > near[1].gain);
    }

    #[test]
    fn test_dbap_source_on_speaker_is_finite() {
        let speakers = speaker_table(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)]);
        let panner = Panner::new(speakers, PanningAlgorithm::Dbap, 0.5).unwrap();

        // Coincident with speaker 0; the distance floor keeps this finite.
        let result = panner.compute(Vec3::ZERO);
        for c in &result {
            assert!(c.gain.is_finite());
        }
        assert!((sum_squares(&result) - 1.0).abs() < EPSILON);
        assert!(result[0].gain > result[1].gain);
    }

    #[test]
    fn test_beamformer_outside_radius_is_zero() {
        let speakers = speaker_table(&[(0.0, 0.0, 0.0), (0.3, 0.0, 0.0), (2.0, 0.0, 0.0)]);
        let panner = Panner::new(speakers, PanningAlgorithm::Beamformer, 0.5).unwrap();

        let result = panner.compute(Vec3::ZERO);
        assert!(result[0].gain > 0.0);
        assert!(result[1].gain > 0.0);
        assert_eq!(result[2].gain, 0.0);
        assert_eq!(result[2].delay, 0.0);
        assert!((sum_squares(&result) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_beamformer_no_active_speakers_is_silent() {
        // A 2 m square of speakers panned from the centre: every distance is
        // sqrt(2), outside a 0.5 m radius.
        let speakers = speaker_table(&[
            (-1.0, -1.0, 0.0),
            (1.0, -1.0, 0.0),
            (-1.0, 1.0, 0.0),
            (1.0, 1.0, 0.0),
        ]);
        let panner = Panner::new(speakers, PanningAlgorithm::Beamformer, 0.5).unwrap();

        let result = panner.compute(Vec3::ZERO);
        assert_eq!(result.len(), 4);
        for c in &result {
            assert_eq!(c.gain, 0.0);
            assert!(c.gain.is_finite());
        }
    }

    #[test]
    fn test_beamformer_delay_is_distance_over_speed_of_sound() {
        let speakers = speaker_table(&[(0.0, 3.43, 0.0)]);
        let panner = Panner::new(speakers, PanningAlgorithm::Beamformer, 4.0).unwrap();

        let result = panner.compute(Vec3::ZERO);
        assert!((result[0].delay - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_beamformer_rejects_non_positive_radius() {
        let speakers = speaker_table(&[(0.0, 0.0, 0.0)]);
        assert!(matches!(
            Panner::new(speakers.clone(), PanningAlgorithm::Beamformer, 0.0),
            Err(SpatError::Config(_))
        ));
        assert!(matches!(
            Panner::new(speakers, PanningAlgorithm::Beamformer, -1.0),
            Err(SpatError::Config(_))
        ));
    }

    #[test]
    fn test_dbap_ignores_radius() {
        let speakers = speaker_table(&[(0.0, 0.0, 0.0)]);
        // Radius is a beamformer parameter; DBAP construction takes anything.
        assert!(Panner::new(speakers, PanningAlgorithm::Dbap, 0.0).is_ok());
    }
}
