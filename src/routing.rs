//! Output routing: coefficient frames, the sink seam towards the audio
//! engine, and the static routing topology exported for it.
//!
//! The engine itself computes gains and delays only. Actual signal flow
//! (input conditioning, per-channel matrix, LFE bus) lives in an external
//! audio process, which consumes [`CoefficientFrame`]s through a
//! [`CoefficientSink`] and builds its graph from the [`RoutingTopology`].

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::config::SpatialiserConfig;
use crate::panner::{PanningAlgorithm, PanningResult};

/// One complete set of per-channel coefficients for one source.
#[derive(Debug, Clone)]
pub struct CoefficientFrame {
    pub source: usize,
    pub channels: PanningResult,
}

/// Consumer of coefficient frames. Implementations are owned by one render
/// worker each and may block briefly, but must never panic in normal
/// operation.
pub trait CoefficientSink: Send {
    fn apply(&mut self, frame: &CoefficientFrame);
}

/// Sink that drops every frame. Used when audio is disabled.
#[derive(Debug, Default)]
pub struct NullSink;

impl CoefficientSink for NullSink {
    fn apply(&mut self, frame: &CoefficientFrame) {
        trace!(
            "discarding frame for source {} ({} channels)",
            frame.source,
            frame.channels.len()
        );
    }
}

/// Sink that records every frame, for tests and offline inspection.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    frames: Arc<Mutex<Vec<CoefficientFrame>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        CaptureSink::default()
    }

    pub fn frames(&self) -> Vec<CoefficientFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CoefficientSink for CaptureSink {
    fn apply(&mut self, frame: &CoefficientFrame) {
        self.frames.lock().unwrap().push(frame.clone());
    }
}

/// Input conditioning and panning parameters for one source strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceChain {
    pub source: usize,
    /// Hardware input channel feeding this strip.
    pub input_channel: usize,
    pub input_gain: f32,
    pub highpass_cutoff_hz: f32,
    pub algorithm: PanningAlgorithm,
    pub radius: f32,
    pub limiter_ceiling: f32,
}

/// Mono low-frequency bus summed from all source inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LfeBus {
    pub lowpass_cutoff_hz: f32,
    pub gain: f32,
    pub channel: usize,
}

/// Static description of the signal graph the audio engine should build.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTopology {
    pub num_channels: usize,
    pub sources: Vec<SourceChain>,
    pub lfe: Option<LfeBus>,
}

impl RoutingTopology {
    pub fn from_config(config: &SpatialiserConfig) -> Self {
        let num_channels = config.num_speakers();
        let sources = (0..config.num_sources)
            .map(|source| SourceChain {
                source,
                input_channel: source,
                input_gain: config.routing.input_gain,
                highpass_cutoff_hz: config.routing.highpass_cutoff_hz,
                algorithm: config.panning.algorithm,
                radius: config.panning.radius,
                limiter_ceiling: config.routing.limiter_ceiling,
            })
            .collect();
        let lfe = config.lfe.enabled.then(|| LfeBus {
            lowpass_cutoff_hz: config.lfe.lowpass_cutoff_hz,
            gain: config.lfe.gain,
            channel: config.lfe.channel.unwrap_or(num_channels - 1),
        });
        RoutingTopology {
            num_channels,
            sources,
            lfe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_from_default_config() {
        let config = SpatialiserConfig::default();
        let topology = RoutingTopology::from_config(&config);

        assert_eq!(topology.num_channels, 128);
        assert_eq!(topology.sources.len(), 2);
        assert!(topology.lfe.is_none());

        let chain = &topology.sources[1];
        assert_eq!(chain.source, 1);
        assert_eq!(chain.input_channel, 1);
        assert_eq!(chain.input_gain, 0.15);
        assert_eq!(chain.highpass_cutoff_hz, 300.0);
        assert_eq!(chain.algorithm, PanningAlgorithm::Beamformer);
        assert_eq!(chain.limiter_ceiling, 0.25);
    }

    #[test]
    fn test_lfe_defaults_to_last_channel() {
        let mut config = SpatialiserConfig::default();
        config.lfe.enabled = true;
        let topology = RoutingTopology::from_config(&config);

        let lfe = topology.lfe.unwrap();
        assert_eq!(lfe.channel, 127);
        assert_eq!(lfe.lowpass_cutoff_hz, 180.0);
        assert_eq!(lfe.gain, 40.0);
    }

    #[test]
    fn test_lfe_explicit_channel() {
        let mut config = SpatialiserConfig::default();
        config.lfe.enabled = true;
        config.lfe.channel = Some(3);
        let topology = RoutingTopology::from_config(&config);
        assert_eq!(topology.lfe.unwrap().channel, 3);
    }

    #[test]
    fn test_capture_sink_records_frames() {
        let capture = CaptureSink::new();
        let mut sink = capture.clone();
        assert!(capture.is_empty());

        sink.apply(&CoefficientFrame {
            source: 0,
            channels: Vec::new(),
        });
        sink.apply(&CoefficientFrame {
            source: 1,
            channels: Vec::new(),
        });

        let frames = capture.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].source, 0);
        assert_eq!(frames[1].source, 1);
    }
}
