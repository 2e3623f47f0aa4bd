use crate::convert::packed::FrameView;
use crate::render::error::Result;

/// A presentation target for finished frames.
///
/// `present` is synchronous: by the time it returns, the renderer must have
/// copied whatever it needs out of `frame`, because the caller overwrites the
/// buffer on the next iteration. Renderers never queue frames; each call
/// replaces whatever was shown before.
pub trait FrameRenderer: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn present(&mut self, frame: FrameView<'_>) -> Result<()>;
}
