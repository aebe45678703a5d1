//! Engine assembly and lifecycle.
//!
//! A [`Spatialiser`] owns the resolved speaker table, one render worker per
//! source, the optional visualiser client, and (while running) the control
//! plane. Construction resolves geometry, announces the layout to the
//! visualiser and spawns the workers; `start` brings up OSC, MIDI and the
//! animator; `stop` tears everything down in reverse order.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use crate::config::SpatialiserConfig;
use crate::control::ControlPlane;
use crate::error::Result;
use crate::geometry::{resolve_speakers, DriverTemplate, Speaker, Vec3};
use crate::panner::{ChannelCoefficient, Panner};
use crate::renderer::SourceRenderer;
use crate::routing::{CoefficientFrame, CoefficientSink, NullSink, RoutingTopology};
use crate::smooth::LfoParams;
use crate::visualiser::{source_colour, VisualiserClient};

pub struct Spatialiser {
    config: SpatialiserConfig,
    speakers: Arc<[Speaker]>,
    renderers: Arc<Vec<SourceRenderer>>,
    visualiser: Option<Arc<VisualiserClient>>,
    control: Option<ControlPlane>,
    running: bool,
}

impl Spatialiser {
    /// Build the engine with frames discarded at the sink. This is the
    /// configuration used when no audio engine is attached.
    pub fn new(config: SpatialiserConfig) -> Result<Self> {
        Self::with_sink_factory(config, |_| Box::new(NullSink))
    }

    /// Build the engine with one sink per source, supplied by `sink_factory`.
    pub fn with_sink_factory(
        config: SpatialiserConfig,
        mut sink_factory: impl FnMut(usize) -> Box<dyn CoefficientSink>,
    ) -> Result<Self> {
        config.validate()?;

        let rows: Vec<(f32, f32)> = config.driver_template.iter().map(|&[x, y]| (x, y)).collect();
        let template = DriverTemplate::from_raw_rows(&rows);
        let speakers: Arc<[Speaker]> = resolve_speakers(
            &config.module_placements(),
            &template,
            config.drivers_per_module,
        )?
        .into();
        info!(
            "resolved {} speakers across {} modules",
            speakers.len(),
            config.modules.len()
        );
        for speaker in speakers.iter() {
            debug!(
                "speaker {} at ({:.3}, {:.3}, {:.3})",
                speaker.index, speaker.position.x, speaker.position.y, speaker.position.z
            );
        }

        let visualiser = if config.visualiser.enabled {
            let client = Arc::new(VisualiserClient::new(&config.visualiser.target)?);
            client.send_grid_setup();
            client.send_speaker_layout(&speakers);
            Some(client)
        } else {
            None
        };

        if config.disable_audio {
            info!("audio disabled, coefficient frames will be discarded");
        }

        let mut rng = rand::thread_rng();
        let mut renderers = Vec::with_capacity(config.num_sources);
        for index in 0..config.num_sources {
            let z = if config.randomise_source_z {
                rng.gen_range(0.0..1.0)
            } else {
                0.0
            };
            let initial = Vec3::new(-0.75 + 0.25 * index as f32, 0.0, z);
            let lfo = if config.randomise_lfos {
                LfoParams::randomised(&mut rng)
            } else {
                LfoParams::default()
            };
            info!(
                "added source {} at ({:.3}, {:.3}, {:.3})",
                index, initial.x, initial.y, initial.z
            );

            if let Some(client) = &visualiser {
                client.send_source_setup(index, source_colour(index));
            }

            let panner = Panner::new(
                speakers.clone(),
                config.panning.algorithm,
                config.panning.radius,
            )?;
            let sink: Box<dyn CoefficientSink> = if config.disable_audio {
                Box::new(NullSink)
            } else {
                sink_factory(index)
            };
            renderers.push(SourceRenderer::new(
                index,
                initial,
                config.smoothing_coeff,
                lfo,
                panner,
                config.routing.limiter_ceiling,
                sink,
                visualiser.clone(),
            ));
        }
        if let Some(client) = &visualiser {
            client.send_num_display();
        }

        Ok(Spatialiser {
            config,
            speakers,
            renderers: Arc::new(renderers),
            visualiser,
            control: None,
            running: false,
        })
    }

    /// Start the control plane. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.control = Some(ControlPlane::start(&self.config, self.renderers.clone())?);
        self.running = true;
        info!(
            "spatialiser running: {} sources, {} speakers, OSC port {}",
            self.config.num_sources,
            self.speakers.len(),
            self.config.osc_port
        );
        Ok(())
    }

    /// Stop the control plane and every render worker. Idempotent.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Some(mut control) = self.control.take() {
            control.stop();
        }
        for renderer in self.renderers.iter() {
            renderer.stop();
        }
        self.running = false;
        info!("spatialiser stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &SpatialiserConfig {
        &self.config
    }

    pub fn speakers(&self) -> &[Speaker] {
        &self.speakers
    }

    pub fn renderers(&self) -> &[SourceRenderer] {
        &self.renderers
    }

    pub fn visualiser(&self) -> Option<&Arc<VisualiserClient>> {
        self.visualiser.as_ref()
    }

    /// The signal graph the external audio engine should build for this
    /// configuration.
    pub fn routing_topology(&self) -> RoutingTopology {
        RoutingTopology::from_config(&self.config)
    }

    /// Play a test level through each channel in turn, ending with silence.
    ///
    /// Frames go to `sink` directly rather than through the render workers,
    /// so a sound check can run without starting the engine.
    pub fn sound_check(&self, sink: &mut dyn CoefficientSink) {
        info!("starting sound check");
        info!("each channel should sound in turn, in speaker-table order");
        let interval = Duration::from_millis(self.config.sound_check.burst_interval_ms);
        for active in 0..self.speakers.len() {
            sink.apply(&self.sound_check_frame(Some(active)));
            thread::sleep(interval);
        }
        sink.apply(&self.sound_check_frame(None));
        info!("sound check complete");
    }

    fn sound_check_frame(&self, active: Option<usize>) -> CoefficientFrame {
        let level = self.config.sound_check.level;
        let channels = self
            .speakers
            .iter()
            .map(|speaker| ChannelCoefficient {
                speaker: speaker.index,
                gain: if Some(speaker.index) == active {
                    level
                } else {
                    0.0
                },
                delay: 0.0,
            })
            .collect();
        CoefficientFrame {
            source: 0,
            channels,
        }
    }

    /// One-line layout export consumed by external spatialisation tooling.
    pub fn spat_layout(&self) -> String {
        let mut output = String::from("/speakers/xyz ");
        for speaker in self.speakers.iter() {
            output.push_str(&format!(
                "{:.3} {:.3} {:.3} ",
                speaker.position.x, speaker.position.y, speaker.position.z
            ));
        }
        let mut output = output.trim_end().to_string();
        output.push_str(", /speaker/*/direction/xy 0 -1");
        output
    }
}

impl Drop for Spatialiser {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleConfig;
    use crate::error::SpatError;
    use crate::routing::CaptureSink;

    fn small_config() -> SpatialiserConfig {
        let mut config = SpatialiserConfig::default();
        config.num_sources = 2;
        config.drivers_per_module = 2;
        config.driver_template = vec![[0.0, 0.0], [100.0, 0.0]];
        config.modules = vec![ModuleConfig {
            x: 0.0,
            y: 4.0,
            z: 0.0,
            rotation: 0.0,
        }];
        config.visualiser.enabled = false;
        config.randomise_source_z = false;
        config.sound_check.burst_interval_ms = 1;
        config
    }

    #[test]
    fn test_construction_resolves_sources_and_speakers() {
        let mut config = small_config();
        config.num_sources = 3;
        let spatialiser = Spatialiser::new(config).unwrap();

        assert_eq!(spatialiser.speakers().len(), 2);
        assert_eq!(spatialiser.renderers().len(), 3);
        assert!(!spatialiser.is_running());

        // Sources line up a quarter metre apart starting at -0.75.
        let targets: Vec<f32> = spatialiser
            .renderers()
            .iter()
            .map(|r| r.target().x)
            .collect();
        assert_eq!(targets, vec![-0.75, -0.5, -0.25]);
        for renderer in spatialiser.renderers() {
            assert_eq!(renderer.target().z, 0.0);
        }
    }

    #[test]
    fn test_construction_rejects_invalid_config() {
        let mut config = small_config();
        config.smoothing_coeff = 1.5;
        assert!(matches!(
            Spatialiser::new(config),
            Err(SpatError::Config(_))
        ));
    }

    #[test]
    fn test_spat_layout_format() {
        let mut config = small_config();
        config.drivers_per_module = 1;
        config.driver_template = vec![[0.0, 0.0]];
        let spatialiser = Spatialiser::new(config).unwrap();

        assert_eq!(
            spatialiser.spat_layout(),
            "/speakers/xyz 0.000 4.000 0.000, /speaker/*/direction/xy 0 -1"
        );
    }

    #[test]
    fn test_sound_check_sweeps_every_channel() {
        let spatialiser = Spatialiser::new(small_config()).unwrap();
        let mut capture = CaptureSink::new();
        spatialiser.sound_check(&mut capture);

        let frames = capture.frames();
        assert_eq!(frames.len(), 3);
        for (burst, frame) in frames[..2].iter().enumerate() {
            for channel in &frame.channels {
                let expected = if channel.speaker == burst { 0.02 } else { 0.0 };
                assert_eq!(channel.gain, expected);
            }
        }
        // Final frame returns the array to silence.
        assert!(frames[2].channels.iter().all(|c| c.gain == 0.0));
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut config = small_config();
        config.osc_port = 9533;
        let mut spatialiser = Spatialiser::new(config).unwrap();

        spatialiser.start().unwrap();
        assert!(spatialiser.is_running());
        spatialiser.start().unwrap();

        spatialiser.stop();
        assert!(!spatialiser.is_running());
        spatialiser.stop();
    }

    #[test]
    fn test_routing_topology_matches_config() {
        let mut config = small_config();
        config.lfe.enabled = true;
        let spatialiser = Spatialiser::new(config).unwrap();

        let topology = spatialiser.routing_topology();
        assert_eq!(topology.num_channels, 2);
        assert_eq!(topology.sources.len(), 2);
        assert_eq!(topology.lfe.unwrap().channel, 1);
    }
}
