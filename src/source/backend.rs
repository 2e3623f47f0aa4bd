use std::sync::Arc;

use crate::source::error::Result;
use crate::source::mailbox::FrameMailbox;
use crate::source::types::{ChromaLayout, Dimensions};

/// Requested capture format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureFormat {
    pub dims: Dimensions,
    pub fps: f32,
    /// Buffer sets the source may have in flight at once.
    pub pool_size: usize,
    pub layout: ChromaLayout,
    /// Extra bytes at the end of each plane row.
    pub row_padding: usize,
}

impl CaptureFormat {
    pub fn new(width: u32, height: u32, fps: f32) -> Self {
        Self {
            dims: Dimensions::new(width, height),
            fps,
            ..Self::default()
        }
    }

    /// Time between two frames, clamped to at least one millisecond.
    pub fn frame_interval(&self) -> std::time::Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            30.0
        };
        let micros = (1_000_000.0 / fps) as u64;
        std::time::Duration::from_micros(micros.max(1_000))
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            dims: Dimensions::new(640, 480),
            fps: 30.0,
            pool_size: 3,
            layout: ChromaLayout::Planar,
            row_padding: 0,
        }
    }
}

/// A producer of raw camera frames.
///
/// Implemented by the synthetic test-pattern source, the scripted test
/// source and the V4L2 capture source. Frames are delivered into a
/// [`FrameMailbox`] from the source's own thread; the mailbox keeps only the
/// latest frame, so the source never queues.
pub trait FrameSource: Send {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Begin delivering frames into `mailbox`.
    ///
    /// A failure to open or start the device is returned here, once, and no
    /// frames are delivered. Failures after a successful start are reported
    /// through the mailbox.
    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> Result<()>;

    /// Stop delivering frames and join any producer thread. Idempotent.
    fn stop(&mut self);
}
