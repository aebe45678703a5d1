//! Per-source render workers.
//!
//! Each source owns one worker thread. Control threads (OSC, MIDI, the
//! animator) never compute panning themselves; they write targets into
//! lock-free cells and the animator posts a tick into the worker's bounded
//! mailbox. The worker smooths, applies the jitter LFOs, pans, limits, and
//! hands the finished coefficient frame to its sink.
//!
//! A slow sink therefore backs up only its own mailbox. Ticks carry absolute
//! state, so when the mailbox backlog is drained only the newest tick is
//! rendered and the rest are discarded. A panicking sink kills only its own
//! worker; the source goes silent and every other source keeps rendering.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error};

use crate::geometry::{Axis, Vec3};
use crate::panner::{ChannelCoefficient, Panner};
use crate::routing::{CoefficientFrame, CoefficientSink};
use crate::smooth::{LfoParams, LfoState, PositionSmoother};
use crate::visualiser::VisualiserClient;

/// Ticks queued per worker before the animator starts dropping them.
const MAILBOX_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererStatus {
    Running,
    Stopped,
    /// The worker panicked and the source is muted. Other sources are
    /// unaffected.
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum RendererCommand {
    Tick {
        target: Vec3,
        lfo: LfoParams,
        dt: f32,
    },
    Stop,
}

/// Hard clamp applied to every output gain.
#[derive(Debug, Clone, Copy)]
pub struct GainLimiter {
    ceiling: f32,
}

impl GainLimiter {
    pub fn new(ceiling: f32) -> Self {
        GainLimiter { ceiling }
    }

    pub fn apply(&self, channels: &mut [ChannelCoefficient]) {
        for channel in channels.iter_mut() {
            channel.gain = channel.gain.clamp(0.0, self.ceiling);
        }
    }
}

/// One spatial source and its render worker.
///
/// All methods take `&self`, so a `SourceRenderer` can be shared between the
/// OSC thread, the MIDI callback and the animator behind a plain `Arc`.
pub struct SourceRenderer {
    index: usize,
    target: ArcSwap<Vec3>,
    lfo: ArcSwap<LfoParams>,
    command_tx: Sender<RendererCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    status: Arc<Mutex<RendererStatus>>,
}

impl SourceRenderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        initial_position: Vec3,
        smoothing_coeff: f32,
        lfo: LfoParams,
        panner: Panner,
        limiter_ceiling: f32,
        sink: Box<dyn CoefficientSink>,
        visualiser: Option<Arc<VisualiserClient>>,
    ) -> Self {
        let (command_tx, command_rx) = bounded(MAILBOX_CAPACITY);
        let status = Arc::new(Mutex::new(RendererStatus::Running));

        let worker = Worker {
            rx: command_rx,
            index,
            smoother: PositionSmoother::new(initial_position, smoothing_coeff),
            lfo: LfoState::default(),
            panner,
            limiter: GainLimiter::new(limiter_ceiling),
            sink,
            visualiser,
        };
        let worker_status = status.clone();
        let handle = thread::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(move || worker.run()));
            let mut status = worker_status.lock().unwrap();
            *status = match result {
                Ok(()) => RendererStatus::Stopped,
                Err(_) => {
                    error!("render worker {} panicked, source muted", index);
                    RendererStatus::Failed
                }
            };
        });

        SourceRenderer {
            index,
            target: ArcSwap::from_pointee(initial_position),
            lfo: ArcSwap::from_pointee(lfo),
            command_tx,
            worker: Mutex::new(Some(handle)),
            status,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> RendererStatus {
        *self.status.lock().unwrap()
    }

    /// Replace the target position. Takes effect on the next tick.
    pub fn set_target(&self, position: Vec3) {
        self.target.store(Arc::new(position));
    }

    /// Replace one coordinate of the target, keeping the others.
    pub fn set_axis(&self, axis: Axis, value: f32) {
        self.target.rcu(|current| current.with_axis(axis, value));
    }

    pub fn target(&self) -> Vec3 {
        **self.target.load()
    }

    pub fn set_lfo(&self, params: LfoParams) {
        self.lfo.store(Arc::new(params));
    }

    /// Read-modify-write of the LFO parameters, for single-field edits.
    pub fn update_lfo(&self, f: impl Fn(&mut LfoParams)) {
        self.lfo.rcu(|current| {
            let mut params = **current;
            f(&mut params);
            params
        });
    }

    pub fn lfo(&self) -> LfoParams {
        **self.lfo.load()
    }

    /// Post one tick to the worker. Called by the animator at the tick rate;
    /// if the worker is behind, the tick is dropped and the next one carries
    /// the fresher state anyway.
    pub fn tick(&self, dt: f32) {
        if self.status() != RendererStatus::Running {
            return;
        }
        let command = RendererCommand::Tick {
            target: **self.target.load(),
            lfo: **self.lfo.load(),
            dt,
        };
        match self.command_tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("render worker {} mailbox full, dropping tick", self.index);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Stop the worker and wait for it to finish. Idempotent.
    pub fn stop(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = self.command_tx.send(RendererCommand::Stop);
            let _ = handle.join();
        }
    }
}

impl Drop for SourceRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    rx: Receiver<RendererCommand>,
    index: usize,
    smoother: PositionSmoother,
    lfo: LfoState,
    panner: Panner,
    limiter: GainLimiter,
    sink: Box<dyn CoefficientSink>,
    visualiser: Option<Arc<VisualiserClient>>,
}

impl Worker {
    fn run(mut self) {
        while let Ok(command) = self.rx.recv() {
            match coalesce_command(command, &self.rx) {
                RendererCommand::Stop => break,
                RendererCommand::Tick { target, lfo, dt } => self.render(target, lfo, dt),
            }
        }
    }

    fn render(&mut self, target: Vec3, params: LfoParams, dt: f32) {
        self.lfo.set_params(params);
        self.lfo.advance(dt);
        let smoothed = self.smoother.advance(target);
        let (jitter_x, jitter_y) = self.lfo.offset();
        let position = Vec3::new(smoothed.x + jitter_x, smoothed.y + jitter_y, smoothed.z);

        let mut channels = self.panner.compute(position);
        self.limiter.apply(&mut channels);
        self.sink.apply(&CoefficientFrame {
            source: self.index,
            channels,
        });

        if let Some(visualiser) = &self.visualiser {
            visualiser.send_source_position(self.index, position);
        }
    }
}

/// Collapse a mailbox backlog to its newest tick. A queued stop always wins.
fn coalesce_command(first: RendererCommand, rx: &Receiver<RendererCommand>) -> RendererCommand {
    if matches!(first, RendererCommand::Stop) {
        return RendererCommand::Stop;
    }
    let mut latest = first;
    while let Ok(next) = rx.try_recv() {
        if matches!(next, RendererCommand::Stop) {
            return RendererCommand::Stop;
        }
        latest = next;
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Speaker;
    use crate::panner::PanningAlgorithm;
    use crate::routing::CaptureSink;
    use std::time::{Duration, Instant};

    fn test_panner() -> Panner {
        let speakers: Arc<[Speaker]> = vec![
            Speaker {
                index: 0,
                position: Vec3::new(0.0, 1.0, 0.0),
            },
            Speaker {
                index: 1,
                position: Vec3::new(0.0, -1.0, 0.0),
            },
        ]
        .into();
        Panner::new(speakers, PanningAlgorithm::Beamformer, 0.5).unwrap()
    }

    fn test_renderer(index: usize, sink: Box<dyn CoefficientSink>) -> SourceRenderer {
        SourceRenderer::new(
            index,
            Vec3::ZERO,
            0.9,
            LfoParams::default(),
            test_panner(),
            0.25,
            sink,
            None,
        )
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    struct PanickingSink;

    impl CoefficientSink for PanickingSink {
        fn apply(&mut self, _frame: &CoefficientFrame) {
            panic!("sink failure");
        }
    }

    #[test]
    fn test_coalesce_keeps_latest_tick() {
        let (tx, rx) = bounded(MAILBOX_CAPACITY);
        let tick = |x: f32| RendererCommand::Tick {
            target: Vec3::new(x, 0.0, 0.0),
            lfo: LfoParams::default(),
            dt: 0.02,
        };
        tx.send(tick(2.0)).unwrap();
        tx.send(tick(3.0)).unwrap();

        let latest = coalesce_command(tick(1.0), &rx);
        match latest {
            RendererCommand::Tick { target, .. } => assert_eq!(target.x, 3.0),
            RendererCommand::Stop => panic!("expected a tick"),
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_coalesce_stop_wins() {
        let (tx, rx) = bounded(MAILBOX_CAPACITY);
        let tick = RendererCommand::Tick {
            target: Vec3::ZERO,
            lfo: LfoParams::default(),
            dt: 0.02,
        };
        tx.send(RendererCommand::Stop).unwrap();
        tx.send(tick).unwrap();
        assert!(matches!(
            coalesce_command(tick, &rx),
            RendererCommand::Stop
        ));

        let (_tx2, rx2) = bounded::<RendererCommand>(MAILBOX_CAPACITY);
        assert!(matches!(
            coalesce_command(RendererCommand::Stop, &rx2),
            RendererCommand::Stop
        ));
    }

    #[test]
    fn test_renderer_emits_limited_frames() {
        let capture = CaptureSink::new();
        let renderer = test_renderer(0, Box::new(capture.clone()));
        renderer.set_target(Vec3::new(0.0, 1.0, 0.0));

        renderer.tick(0.02);
        assert!(wait_for(|| !capture.is_empty()));

        let frames = capture.frames();
        assert_eq!(frames[0].source, 0);
        assert_eq!(frames[0].channels.len(), 2);
        for channel in &frames[0].channels {
            assert!(channel.gain >= 0.0 && channel.gain <= 0.25);
        }
        renderer.stop();
    }

    #[test]
    fn test_lfo_offset_added_after_smoothing() {
        let capture = CaptureSink::new();
        // Constant Y offset of one metre: amplitude 1, frequency 0 keeps the
        // quadrature cosine pinned at its peak.
        let renderer = SourceRenderer::new(
            0,
            Vec3::ZERO,
            0.9,
            LfoParams {
                y_amp: 1.0,
                ..LfoParams::default()
            },
            test_panner(),
            1.0,
            Box::new(capture.clone()),
            None,
        );

        renderer.tick(0.02);
        assert!(wait_for(|| !capture.is_empty()));
        renderer.stop();

        // The jittered position sits on the speaker at (0, 1, 0), which under
        // the beamformer takes all the energy.
        let frames = capture.frames();
        let channels = &frames[0].channels;
        assert!(channels[0].gain > 0.99);
        assert_eq!(channels[1].gain, 0.0);
    }

    #[test]
    fn test_set_axis_updates_single_coordinate() {
        let renderer = test_renderer(0, Box::new(CaptureSink::new()));
        renderer.set_target(Vec3::new(1.0, 2.0, 3.0));
        renderer.set_axis(Axis::Y, 9.0);
        assert_eq!(renderer.target(), Vec3::new(1.0, 9.0, 3.0));
        renderer.stop();
    }

    #[test]
    fn test_update_lfo_single_field() {
        let renderer = test_renderer(0, Box::new(CaptureSink::new()));
        renderer.set_lfo(LfoParams {
            x_amp: 0.2,
            x_freq: 0.5,
            y_amp: 0.1,
            y_freq: 0.25,
        });
        renderer.update_lfo(|params| params.x_freq = 2.0);

        let params = renderer.lfo();
        assert_eq!(params.x_freq, 2.0);
        assert_eq!(params.x_amp, 0.2);
        assert_eq!(params.y_freq, 0.25);
        renderer.stop();
    }

    #[test]
    fn test_panicking_sink_fails_only_its_own_source() {
        let failing = test_renderer(0, Box::new(PanickingSink));
        let capture = CaptureSink::new();
        let healthy = test_renderer(1, Box::new(capture.clone()));

        failing.tick(0.02);
        healthy.tick(0.02);

        assert!(wait_for(|| failing.status() == RendererStatus::Failed));
        assert!(wait_for(|| !capture.is_empty()));
        assert_eq!(healthy.status(), RendererStatus::Running);

        // Ticking a failed renderer is a no-op rather than an error.
        failing.tick(0.02);
        healthy.stop();
        failing.stop();
        assert_eq!(failing.status(), RendererStatus::Failed);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let renderer = test_renderer(0, Box::new(CaptureSink::new()));
        renderer.stop();
        assert_eq!(renderer.status(), RendererStatus::Stopped);
        renderer.stop();
        assert_eq!(renderer.status(), RendererStatus::Stopped);
    }

    #[test]
    fn test_tick_after_stop_is_ignored() {
        let capture = CaptureSink::new();
        let renderer = test_renderer(0, Box::new(capture.clone()));
        renderer.stop();

        let frames_before = capture.len();
        renderer.tick(0.02);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(capture.len(), frames_before);
    }
}
