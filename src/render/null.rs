use tracing::trace;

use crate::convert::packed::FrameView;
use crate::render::backend::FrameRenderer;
use crate::render::error::Result;

/// Discards frames. Used for headless runs and benchmarks.
#[derive(Debug, Default)]
pub struct NullRenderer {
    presented: u64,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl FrameRenderer for NullRenderer {
    fn name(&self) -> &str {
        "null"
    }

    fn present(&mut self, frame: FrameView<'_>) -> Result<()> {
        self.presented += 1;
        trace!(size = %frame.dims(), "discarding frame");
        Ok(())
    }
}
