use crate::bridge::error::Result;
use crate::convert::packed::{FrameView, PackedFrame};

/// What a filter did with the frame it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filtered<'a> {
    /// The input frame was modified in place (or left untouched).
    InPlace,
    /// The result lives in a buffer owned by the filter. It must be RGBA and
    /// no larger than the input on either axis.
    Replaced(FrameView<'a>),
}

/// A frame-in/frame-out image filter.
///
/// Filters run synchronously on the pipeline worker and are expected to
/// finish within one frame interval. The input frame stays owned by the
/// caller; a filter may only borrow it for the duration of `apply`.
pub trait FrameFilter: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Describe the filter. Used once at startup to verify wiring.
    fn info(&self) -> Result<String>;

    /// Process one frame.
    fn apply<'a>(&'a mut self, frame: &mut PackedFrame) -> Result<Filtered<'a>>;
}
