use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::bridge::processing::{BridgeStatus, ProcessingBridge};
use crate::diagnostics::stats::{PipelineSnapshot, PipelineStats};
use crate::pipeline::error::{PipelineError, Result};
use crate::pipeline::stage::{FrameOutcome, FrameStage};
use crate::pipeline::toggle::{ProcessingToggle, ToggleHandle};
use crate::render::backend::FrameRenderer;
use crate::source::backend::FrameSource;
use crate::source::mailbox::{FrameMailbox, MailboxEvent};

/// Lifecycle of a [`PipelineController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Built, or a start attempt failed. `start` may be called.
    Idle,
    /// The worker is processing frames.
    Running,
    /// Torn down or the source failed. Terminal.
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// State shared between the controller and its worker thread.
struct Shared {
    state: Mutex<PipelineState>,
    changed: Condvar,
    stats: Mutex<PipelineStats>,
    stop: AtomicBool,
}

impl Shared {
    fn set_state(&self, next: PipelineState) -> PipelineState {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, next);
        drop(state);
        self.changed.notify_all();
        previous
    }
}

/// Owns the source, the per-frame stage and the worker thread.
///
/// Frames flow source → mailbox → worker. The worker runs one frame at a
/// time to completion (convert, optional filter, present, release) and reads
/// the processing toggle once per frame.
pub struct PipelineController {
    source: Box<dyn FrameSource>,
    stage: Option<FrameStage>,
    toggle: ProcessingToggle,
    mailbox: Arc<FrameMailbox>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl PipelineController {
    pub fn new(
        source: Box<dyn FrameSource>,
        bridge: ProcessingBridge,
        renderer: Box<dyn FrameRenderer>,
        toggle: ProcessingToggle,
    ) -> Self {
        Self {
            source,
            stage: Some(FrameStage::new(bridge, renderer)),
            toggle,
            mailbox: Arc::new(FrameMailbox::new()),
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState::Idle),
                changed: Condvar::new(),
                stats: Mutex::new(PipelineStats::new()),
                stop: AtomicBool::new(false),
            }),
            worker: None,
        }
    }

    /// Start the source and the worker.
    ///
    /// A source start failure is returned once and leaves the pipeline
    /// `Idle`, so the caller may retry.
    pub fn start(&mut self) -> Result<()> {
        let state = self.state();
        if state != PipelineState::Idle {
            return Err(PipelineError::InvalidState {
                state,
                operation: "start",
            });
        }

        if let Err(e) = self.source.start(Arc::clone(&self.mailbox)) {
            error!(source = self.source.name(), "frame source failed to start: {e}");
            return Err(PipelineError::SourceStart(e));
        }

        let Some(stage) = self.stage.take() else {
            self.source.stop();
            return Err(PipelineError::InvalidState {
                state,
                operation: "start",
            });
        };
        match stage.bridge().status() {
            BridgeStatus::Connected { filter, .. } => info!(
                source = self.source.name(),
                renderer = stage.renderer_name(),
                filter = %filter,
                "pipeline starting"
            ),
            BridgeStatus::Unavailable { .. } => info!(
                source = self.source.name(),
                renderer = stage.renderer_name(),
                "pipeline starting in pass-through mode"
            ),
        }

        self.shared.set_state(PipelineState::Running);
        let mailbox = Arc::clone(&self.mailbox);
        let toggle = self.toggle.clone();
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("pipeline-worker".to_string())
            .spawn(move || run_worker(stage, &mailbox, &toggle, &shared));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.source.stop();
                self.mailbox.close();
                self.shared.set_state(PipelineState::Stopped);
                Err(PipelineError::Spawn(e.to_string()))
            }
        }
    }

    /// Tear down: stop the source, let the worker finish its current frame,
    /// and release anything still pending. Idempotent.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.source.stop();
        self.mailbox.close();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("pipeline worker panicked");
            }
        }
        if self.shared.set_state(PipelineState::Stopped) != PipelineState::Stopped {
            info!("pipeline stopped");
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    /// Block until the pipeline reaches `Stopped` or `timeout` passes.
    /// Returns `true` if it stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while *state != PipelineState::Stopped {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return *state == PipelineState::Stopped;
            }
        }
        true
    }

    /// Write-only handle for flipping processing on and off.
    pub fn toggle_handle(&self) -> ToggleHandle {
        self.toggle.handle()
    }

    pub fn is_processing(&self) -> bool {
        self.toggle.is_enabled()
    }

    /// Frames waiting between the source and the worker; at most one.
    pub fn pending_frames(&self) -> usize {
        self.mailbox.pending_len()
    }

    pub fn stats(&self) -> PipelineSnapshot {
        let mut stats = self.shared.stats.lock();
        stats.set_source_drops(self.mailbox.dropped());
        stats.snapshot()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Moves the pipeline to `Stopped` when the worker exits, unwinding included.
struct StopOnExit<'a>(&'a Shared);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        if self.0.set_state(PipelineState::Stopped) != PipelineState::Stopped {
            info!("pipeline stopped");
        }
    }
}

fn run_worker(
    mut stage: FrameStage,
    mailbox: &FrameMailbox,
    toggle: &ProcessingToggle,
    shared: &Shared,
) {
    let _stop_on_exit = StopOnExit(shared);
    loop {
        match mailbox.recv() {
            MailboxEvent::Frame(frame) => {
                let started = Instant::now();
                let outcome = stage.run(frame, toggle);
                let elapsed = started.elapsed();

                let mut stats = shared.stats.lock();
                match outcome {
                    FrameOutcome::Presented { path, bytes } => {
                        stats.record_presented(path, bytes, elapsed)
                    }
                    FrameOutcome::Skipped => stats.record_skipped(),
                    FrameOutcome::RenderFailed { filter_failed } => {
                        stats.record_render_failure(filter_failed)
                    }
                }
                stats.set_source_drops(mailbox.dropped());
            }
            MailboxEvent::AcquireFailed(e) => {
                warn!("frame acquisition failed, skipping: {e}");
                shared.stats.lock().record_acquire_failure();
            }
            MailboxEvent::Closed(Some(e)) => {
                error!("frame source failed, stopping pipeline: {e}");
                break;
            }
            MailboxEvent::Closed(None) => {
                info!("frame source closed");
                break;
            }
        }
        if shared.stop.load(Ordering::Relaxed) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::builtin::{GrayscaleFilter, IdentityFilter};
    use crate::convert::packed::{FrameView, PackedFrame};
    use crate::pipeline::testing::{
        converted, PanickingFilter, PanickingRenderer, RecordingRenderer,
    };
    use crate::render::error::Result as RenderResult;
    use crate::source::backend::CaptureFormat;
    use crate::source::error::SourceError;
    use crate::source::scripted::ScriptedSource;
    use crate::source::synthetic::SyntheticSource;
    use crate::source::types::Dimensions;

    const DIMS: Dimensions = Dimensions::new(8, 6);
    const TIMEOUT: Duration = Duration::from_secs(5);
    /// Script step slow enough that the worker takes every event before the next.
    const STEP: Duration = Duration::from_millis(50);

    fn controller(
        source: ScriptedSource,
        bridge: ProcessingBridge,
        renderer: &RecordingRenderer,
        processing: bool,
    ) -> PipelineController {
        PipelineController::new(
            Box::new(source),
            bridge,
            Box::new(renderer.clone()),
            ProcessingToggle::new(processing),
        )
    }

    /// Flips the toggle from inside `present` after a given number of frames.
    struct FlippingRenderer {
        inner: RecordingRenderer,
        handle: ToggleHandle,
        flip_after: usize,
    }

    impl FrameRenderer for FlippingRenderer {
        fn name(&self) -> &str {
            "flipping"
        }

        fn present(&mut self, frame: FrameView<'_>) -> RenderResult<()> {
            self.inner.present(frame)?;
            if self.inner.count() == self.flip_after {
                self.handle.flip();
            }
            Ok(())
        }
    }

    fn is_gray(frame: &PackedFrame) -> bool {
        frame
            .data()
            .chunks_exact(4)
            .all(|px| px[0] == px[1] && px[1] == px[2])
    }

    #[test]
    fn frames_reach_renderer_and_are_released_once() {
        let source = ScriptedSource::new().with_frames(5, DIMS);
        let ledger = source.ledger();
        let renderer = RecordingRenderer::new();
        let mut pipeline = controller(
            source,
            ProcessingBridge::connect(Box::new(IdentityFilter)),
            &renderer,
            false,
        );

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));

        let stats = pipeline.stats();
        assert_eq!(ledger.issued().len(), 5);
        assert!(ledger.violations().is_empty(), "{:?}", ledger.violations());
        assert_eq!(stats.frames_presented + stats.source_drops, 5);
        assert_eq!(renderer.count() as u64, stats.frames_presented);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn slow_renderer_causes_drops_not_queueing() {
        let source = ScriptedSource::new()
            .with_frames(20, DIMS)
            .with_interval(Duration::from_millis(1));
        let ledger = source.ledger();
        let renderer = RecordingRenderer::new().with_delay(Duration::from_millis(30));
        let mut pipeline = controller(source, ProcessingBridge::unavailable("none"), &renderer, false);

        pipeline.start().unwrap();
        let deadline = Instant::now() + TIMEOUT;
        while pipeline.state() != PipelineState::Stopped && Instant::now() < deadline {
            assert!(pipeline.pending_frames() <= 1);
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(pipeline.wait_stopped(TIMEOUT));

        let stats = pipeline.stats();
        assert!(stats.source_drops > 0, "expected drops: {stats:?}");
        assert!(stats.frames_presented < 20);
        assert_eq!(stats.frames_presented + stats.source_drops, 20);
        assert!(ledger.violations().is_empty(), "{:?}", ledger.violations());
    }

    #[test]
    fn every_frame_is_released_once_across_failure_paths() {
        let source = ScriptedSource::new()
            .with_frames(3, DIMS)
            .with_acquire_error("timeout")
            .with_frames(3, Dimensions::new(4, 4))
            .with_interval(STEP);
        let ledger = source.ledger();
        let renderer = RecordingRenderer::new();
        let mut pipeline = controller(
            source,
            ProcessingBridge::connect(Box::new(PanickingFilter)),
            &renderer,
            true,
        );

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));

        let stats = pipeline.stats();
        assert!(ledger.violations().is_empty(), "{:?}", ledger.violations());
        assert_eq!(ledger.total_releases(), 6);
        assert_eq!(stats.filter_failures, 6);
        assert_eq!(stats.frames_presented, 6);
        assert_eq!(stats.acquire_failures, 1);
    }

    #[test]
    fn renderer_panic_does_not_kill_the_worker() {
        let source = ScriptedSource::new().with_frames(4, DIMS).with_interval(STEP);
        let ledger = source.ledger();
        let renderer = RecordingRenderer::new();
        let mut pipeline = PipelineController::new(
            Box::new(source),
            ProcessingBridge::unavailable("none"),
            Box::new(PanickingRenderer::new(2, &renderer)),
            ProcessingToggle::new(false),
        );

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));

        let stats = pipeline.stats();
        assert_eq!(stats.render_failures, 2);
        assert_eq!(stats.frames_presented, 2);
        assert_eq!(renderer.count(), 2);
        assert!(ledger.violations().is_empty(), "{:?}", ledger.violations());
        assert_eq!(ledger.total_releases(), 4);
    }

    #[test]
    fn render_failures_do_not_stop_the_loop() {
        let source = ScriptedSource::new().with_frames(4, DIMS);
        let ledger = source.ledger();
        let renderer = RecordingRenderer::new().failing();
        let mut pipeline = controller(source, ProcessingBridge::unavailable("none"), &renderer, false);

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));

        let stats = pipeline.stats();
        assert!(stats.render_failures >= 1);
        assert_eq!(stats.render_failures + stats.source_drops, 4);
        assert!(ledger.violations().is_empty());
    }

    #[test]
    fn unavailable_bridge_passes_frames_through_unmodified() {
        let source = ScriptedSource::new()
            .with_fill(120, 90, 200)
            .with_frames(3, DIMS);
        let renderer = RecordingRenderer::new();
        let mut pipeline = controller(
            source,
            ProcessingBridge::unavailable("library not found"),
            &renderer,
            true,
        );

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));

        let expected = converted(DIMS, [120, 90, 200]);
        let frames = renderer.frames();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|frame| *frame == expected));
        assert_eq!(pipeline.stats().frames_filtered, 0);
    }

    #[test]
    fn toggle_flip_takes_effect_at_next_frame() {
        let source = ScriptedSource::new()
            .with_fill(120, 90, 200)
            .with_frames(6, DIMS)
            .with_interval(Duration::from_millis(10));
        let toggle = ProcessingToggle::new(false);
        let recorder = RecordingRenderer::new();
        let renderer = FlippingRenderer {
            inner: recorder.clone(),
            handle: toggle.handle(),
            flip_after: 2,
        };
        let mut pipeline = PipelineController::new(
            Box::new(source),
            ProcessingBridge::connect(Box::new(GrayscaleFilter)),
            Box::new(renderer),
            toggle,
        );

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));

        let frames = recorder.frames();
        assert!(frames.len() >= 3, "only {} frames presented", frames.len());
        // the flip happened while frame 2 was being presented
        assert!(!is_gray(&frames[0]));
        assert!(!is_gray(&frames[1]));
        assert!(frames[2..].iter().all(is_gray));
        assert!(pipeline.is_processing());
    }

    #[test]
    fn start_failure_stays_idle_and_can_be_retried() {
        let source = ScriptedSource::new()
            .with_start_failure(SourceError::DeviceNotFound("cam0".into()))
            .with_frames(2, DIMS);
        let renderer = RecordingRenderer::new();
        let mut pipeline = controller(source, ProcessingBridge::unavailable("none"), &renderer, false);

        match pipeline.start() {
            Err(PipelineError::SourceStart(SourceError::DeviceNotFound(name))) => {
                assert_eq!(name, "cam0")
            }
            other => panic!("expected start failure, got {other:?}"),
        }
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(renderer.count(), 0);

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));
        assert!(renderer.count() >= 1);
    }

    #[test]
    fn fatal_source_failure_stops_pipeline() {
        let source = ScriptedSource::new()
            .with_frames(2, DIMS)
            .with_fatal("device unplugged")
            .with_frames(2, DIMS);
        let ledger = source.ledger();
        let renderer = RecordingRenderer::new();
        let mut pipeline = controller(source, ProcessingBridge::unavailable("none"), &renderer, false);

        pipeline.start().unwrap();
        assert!(pipeline.wait_stopped(TIMEOUT));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        // nothing after the failure is played
        assert_eq!(ledger.issued().len(), 2);
        assert!(ledger.violations().is_empty());
    }

    #[test]
    fn stop_is_idempotent_and_terminal() {
        let source = ScriptedSource::new().with_frames(3, DIMS).hold_open();
        let ledger = source.ledger();
        let renderer = RecordingRenderer::new();
        let mut pipeline = controller(source, ProcessingBridge::unavailable("none"), &renderer, false);

        pipeline.start().unwrap();
        pipeline.stop();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(ledger.violations().is_empty());

        assert!(matches!(
            pipeline.start(),
            Err(PipelineError::InvalidState {
                state: PipelineState::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn starting_twice_is_rejected() {
        let source = ScriptedSource::new().with_frames(1, DIMS).hold_open();
        let renderer = RecordingRenderer::new();
        let mut pipeline = controller(source, ProcessingBridge::unavailable("none"), &renderer, false);

        pipeline.start().unwrap();
        assert!(matches!(
            pipeline.start(),
            Err(PipelineError::InvalidState {
                state: PipelineState::Running,
                ..
            })
        ));
        pipeline.stop();
    }

    #[test]
    fn synthetic_source_runs_until_stopped() {
        let mut format = CaptureFormat::new(32, 24, 200.0);
        format.pool_size = 2;
        let renderer = RecordingRenderer::new();
        let mut pipeline = PipelineController::new(
            Box::new(SyntheticSource::new(format)),
            ProcessingBridge::connect(Box::new(GrayscaleFilter)),
            Box::new(renderer.clone()),
            ProcessingToggle::new(true),
        );

        pipeline.start().unwrap();
        let deadline = Instant::now() + TIMEOUT;
        while renderer.count() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        pipeline.stop();

        let stats = pipeline.stats();
        assert!(stats.frames_presented >= 3);
        assert_eq!(stats.frames_filtered, stats.frames_presented);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn controller_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<PipelineController>();
    }
}
