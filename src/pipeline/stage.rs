use std::panic::{self, AssertUnwindSafe};
use tracing::{error, trace, warn};

use crate::bridge::processing::{panic_message, BridgeOutcome, ProcessingBridge};
use crate::convert::packed::PackedFrame;
use crate::convert::yuv::ColorSpaceConverter;
use crate::diagnostics::stats::PresentPath;
use crate::pipeline::toggle::ProcessingToggle;
use crate::render::backend::FrameRenderer;
use crate::source::types::{Dimensions, RawFrame};

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { path: PresentPath, bytes: usize },
    /// The frame could not be converted and was not presented.
    Skipped,
    /// The renderer refused the frame.
    RenderFailed { filter_failed: bool },
}

/// The per-frame work: convert, optionally filter, present.
///
/// Owns the two retained RGBA buffers. The converter's output holds the
/// unfiltered frame; `working` is the copy handed to the filter, so a filter
/// failure can still fall back to clean pixels.
pub struct FrameStage {
    converter: ColorSpaceConverter,
    working: PackedFrame,
    bridge: ProcessingBridge,
    renderer: Box<dyn FrameRenderer>,
    working_allocations: u64,
}

impl FrameStage {
    pub fn new(bridge: ProcessingBridge, renderer: Box<dyn FrameRenderer>) -> Self {
        Self {
            converter: ColorSpaceConverter::new(),
            working: PackedFrame::new(Dimensions::new(0, 0)),
            bridge,
            renderer,
            working_allocations: 0,
        }
    }

    pub fn bridge(&self) -> &ProcessingBridge {
        &self.bridge
    }

    pub fn renderer_name(&self) -> &str {
        self.renderer.name()
    }

    /// Scratch allocations made so far, converter and working copy together.
    pub fn allocations(&self) -> u64 {
        self.converter.allocations() + self.working_allocations
    }

    /// Run one iteration. The frame is released before this returns, whatever
    /// the outcome.
    pub fn run(&mut self, frame: RawFrame, toggle: &ProcessingToggle) -> FrameOutcome {
        let outcome = self.process(&frame, toggle.is_enabled());
        frame.release();
        outcome
    }

    fn process(&mut self, frame: &RawFrame, processing: bool) -> FrameOutcome {
        let sequence = frame.sequence();
        let converted = match self.converter.convert(frame) {
            Ok(converted) => converted,
            Err(e) => {
                warn!(frame = sequence, "skipping frame: {e}");
                return FrameOutcome::Skipped;
            }
        };

        let (view, path) = if processing && self.bridge.is_available() {
            if self.working.copy_from(converted.view()) {
                self.working_allocations += 1;
            }
            match self.bridge.apply(&mut self.working) {
                BridgeOutcome::Filtered(view) => (view, PresentPath::Filtered),
                BridgeOutcome::PassThrough => (converted.view(), PresentPath::PassThrough),
                BridgeOutcome::Failed(e) => {
                    warn!(frame = sequence, "filter failed, passing frame through: {e}");
                    (converted.view(), PresentPath::FilterFallback)
                }
            }
        } else {
            (converted.view(), PresentPath::PassThrough)
        };

        let bytes = view.data().len();
        let renderer = &mut self.renderer;
        let presented = panic::catch_unwind(AssertUnwindSafe(|| renderer.present(view)));
        let render_failed = FrameOutcome::RenderFailed {
            filter_failed: path == PresentPath::FilterFallback,
        };
        match presented {
            Ok(Ok(())) => {
                trace!(frame = sequence, ?path, "frame presented");
                FrameOutcome::Presented { path, bytes }
            }
            Ok(Err(e)) => {
                warn!(frame = sequence, renderer = self.renderer.name(), "render failed: {e}");
                render_failed
            }
            Err(payload) => {
                error!(
                    frame = sequence,
                    renderer = self.renderer.name(),
                    "renderer panicked: {}",
                    panic_message(payload.as_ref())
                );
                render_failed
            }
        }
    }
}
