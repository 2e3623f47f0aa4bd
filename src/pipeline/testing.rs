//! Collaborators shared by the pipeline tests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::error::{FilterError, Result as FilterResult};
use crate::bridge::filter::{Filtered, FrameFilter};
use crate::convert::packed::{FrameView, PackedFrame};
use crate::convert::yuv::ColorSpaceConverter;
use crate::render::backend::FrameRenderer;
use crate::render::error::{RenderError, Result as RenderResult};
use crate::source::types::{Dimensions, FrameRecycler, Plane, RawFrame};

/// Renderer that keeps a copy of every frame it is shown.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    frames: Arc<Mutex<Vec<PackedFrame>>>,
    delay: Duration,
    failing: bool,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `present`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject every frame.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn frames(&self) -> Vec<PackedFrame> {
        self.frames.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl FrameRenderer for RecordingRenderer {
    fn name(&self) -> &str {
        "recording"
    }

    fn present(&mut self, frame: FrameView<'_>) -> RenderResult<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.failing {
            return Err(RenderError::InvalidFrame("recording renderer set to fail".into()));
        }
        self.frames.lock().push(frame.to_packed());
        Ok(())
    }
}

/// Renderer that panics on its first `panics` calls, then records into
/// `inner`.
pub struct PanickingRenderer {
    panics_left: usize,
    inner: RecordingRenderer,
}

impl PanickingRenderer {
    pub fn new(panics: usize, inner: &RecordingRenderer) -> Self {
        Self {
            panics_left: panics,
            inner: inner.clone(),
        }
    }
}

impl FrameRenderer for PanickingRenderer {
    fn name(&self) -> &str {
        "panicking"
    }

    fn present(&mut self, frame: FrameView<'_>) -> RenderResult<()> {
        if self.panics_left > 0 {
            self.panics_left -= 1;
            panic!("device lost");
        }
        self.inner.present(frame)
    }
}

/// Filter whose every call returns an error.
pub struct FailingFilter;

impl FrameFilter for FailingFilter {
    fn name(&self) -> &str {
        "failing"
    }

    fn info(&self) -> FilterResult<String> {
        Ok("always fails".to_string())
    }

    fn apply<'a>(&'a mut self, frame: &mut PackedFrame) -> FilterResult<Filtered<'a>> {
        // scribble first so callers can't rely on the working copy
        frame.data_mut().fill(0);
        Err(FilterError::Rejected { code: -1 })
    }
}

/// Filter that panics on every call.
pub struct PanickingFilter;

impl FrameFilter for PanickingFilter {
    fn name(&self) -> &str {
        "panicking"
    }

    fn info(&self) -> FilterResult<String> {
        Ok("always panics".to_string())
    }

    fn apply<'a>(&'a mut self, _frame: &mut PackedFrame) -> FilterResult<Filtered<'a>> {
        panic!("filter blew up")
    }
}

/// Build a solid-colour I420 frame.
pub fn solid_frame(
    dims: Dimensions,
    yuv: [u8; 3],
    sequence: u64,
    recycler: Arc<dyn FrameRecycler>,
) -> RawFrame {
    let chroma = dims.chroma();
    let planes = [
        Plane::packed(vec![yuv[0]; dims.pixel_count()], dims.width as usize),
        Plane::packed(vec![yuv[1]; chroma.pixel_count()], chroma.width as usize),
        Plane::packed(vec![yuv[2]; chroma.pixel_count()], chroma.width as usize),
    ];
    RawFrame::new(dims, planes, sequence, 0, recycler)
}

/// What a fresh converter makes of a solid frame.
pub fn converted(dims: Dimensions, yuv: [u8; 3]) -> PackedFrame {
    let chroma = dims.chroma();
    let frame = RawFrame::detached(
        dims,
        [
            Plane::packed(vec![yuv[0]; dims.pixel_count()], dims.width as usize),
            Plane::packed(vec![yuv[1]; chroma.pixel_count()], chroma.width as usize),
            Plane::packed(vec![yuv[2]; chroma.pixel_count()], chroma.width as usize),
        ],
        0,
    );
    let mut converter = ColorSpaceConverter::new();
    match converter.convert(&frame) {
        Ok(packed) => packed.clone(),
        Err(e) => panic!("reference conversion failed: {e}"),
    }
}
