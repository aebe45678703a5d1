//! # Spatialiser - Real-Time Spatial Audio Control
//!
//! Spatialiser is the control engine for modular wavefield loudspeaker
//! arrays: walls of identical speaker modules, each carrying dozens of small
//! drivers. It listens for source positions over OSC and MIDI, glides each
//! source toward its target, and continuously computes per-channel gain and
//! delay coefficients that an external audio engine applies to the live
//! inputs. A grid visualiser can mirror the whole scene over UDP.
//!
//! ## Core Features
//!
//! - **Array geometry**: module placements plus a shared driver template
//!   resolve into a stable speaker table with absolute positions
//! - **Two panning laws**: distance-based amplitude panning (DBAP) and a
//!   near-field beamformer with per-channel delay compensation
//! - **Smoothed motion**: one-pole position smoothing with optional slow
//!   sinusoidal jitter per source
//! - **Actor-style rendering**: one worker thread per source with a bounded
//!   mailbox, so a slow or faulty consumer never stalls the others
//! - **Control plane**: OSC position messages, MIDI control change mapping,
//!   and a fixed-rate animator driving the render ticks
//! - **Operational tooling**: sound check sweep, speaker layout export, and
//!   a routing topology for the downstream audio engine
//!
//! ## Quick Start
//!
//! ```rust
//! use spatialiser::config::SpatialiserConfig;
//! use spatialiser::spatialiser::Spatialiser;
//!
//! let mut config = SpatialiserConfig::default();
//! config.visualiser.enabled = false;
//! config.randomise_source_z = false;
//!
//! // Two sources, four modules of 32 drivers each.
//! let engine = Spatialiser::new(config).unwrap();
//! assert_eq!(engine.speakers().len(), 128);
//! assert_eq!(engine.renderers().len(), 2);
//! ```
//!
//! Panners can also be driven directly:
//!
//! ```rust
//! use std::sync::Arc;
//! use spatialiser::geometry::{Speaker, Vec3};
//! use spatialiser::panner::{Panner, PanningAlgorithm};
//!
//! let speakers: Arc<[Speaker]> = (0..4)
//!     .map(|index| Speaker {
//!         index,
//!         position: Vec3::new(index as f32 * 0.1, 4.0, 0.0),
//!     })
//!     .collect();
//!
//! let panner = Panner::new(speakers, PanningAlgorithm::Beamformer, 0.5).unwrap();
//! let coefficients = panner.compute(Vec3::new(0.15, 4.0, 0.0));
//! assert_eq!(coefficients.len(), 4);
//! ```
//!
//! ## Architecture
//!
//! - [`geometry`] - module placements, driver templates, speaker resolution
//! - [`panner`] - DBAP and beamformer coefficient computation
//! - [`smooth`] - position smoothing and jitter LFOs
//! - [`renderer`] - per-source worker threads and the gain limiter
//! - [`routing`] - coefficient frames, sinks, and the exported topology
//! - [`osc`] / [`midi`] / [`control`] - the control plane
//! - [`visualiser`] - UDP client for the external grid visualiser
//! - [`spatialiser`] - engine assembly and lifecycle (start here)
//!
//! ## Control Protocol
//!
//! Positions arrive as OSC messages `/source/<n>/xyz` with three float
//! arguments in metres; source numbers are 1-indexed on the wire. MIDI
//! control changes address sources by channel: controllers 1-3 set x/y/z,
//! controllers 4-7 set the jitter LFO amplitudes and frequencies.

pub mod config;
pub mod control;
pub mod error;
pub mod geometry;
pub mod midi;
pub mod osc;
pub mod panner;
pub mod renderer;
pub mod routing;
pub mod smooth;
pub mod spatialiser;
pub mod visualiser;
