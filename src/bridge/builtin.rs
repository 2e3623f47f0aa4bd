use fast_image_resize as fr;
use fr::images::{Image, ImageRef};
use serde::{Deserialize, Serialize};

use crate::bridge::error::{FilterError, Result};
use crate::bridge::filter::{FrameFilter, Filtered};
use crate::convert::packed::{FrameView, PackedFrame};
use crate::source::types::Dimensions;

/// Filters that ship with the crate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinFilter {
    /// Leave frames untouched
    #[default]
    Identity,
    /// Convert to BT.601 luma
    Grayscale,
    /// Downscale to half resolution
    HalfScale,
}

impl BuiltinFilter {
    pub fn create(self) -> Box<dyn FrameFilter> {
        match self {
            Self::Identity => Box::new(IdentityFilter),
            Self::Grayscale => Box::new(GrayscaleFilter),
            Self::HalfScale => Box::new(HalfScaleFilter::new()),
        }
    }
}

/// Leaves every frame untouched.
pub struct IdentityFilter;

impl FrameFilter for IdentityFilter {
    fn name(&self) -> &str {
        "identity"
    }

    fn info(&self) -> Result<String> {
        Ok("identity filter (no-op)".to_string())
    }

    fn apply<'a>(&'a mut self, _frame: &mut PackedFrame) -> Result<Filtered<'a>> {
        Ok(Filtered::InPlace)
    }
}

/// Replaces colour with BT.601 luma, in place.
pub struct GrayscaleFilter;

impl FrameFilter for GrayscaleFilter {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn info(&self) -> Result<String> {
        Ok("grayscale filter (BT.601 luma)".to_string())
    }

    fn apply<'a>(&'a mut self, frame: &mut PackedFrame) -> Result<Filtered<'a>> {
        for px in frame.data_mut().chunks_exact_mut(4) {
            let luma = (77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32) >> 8;
            let luma = luma as u8;
            px[0] = luma;
            px[1] = luma;
            px[2] = luma;
        }
        Ok(Filtered::InPlace)
    }
}

/// Downscales to half resolution into its own retained buffer.
pub struct HalfScaleFilter {
    resizer: fr::Resizer,
    output: Image<'static>,
}

impl HalfScaleFilter {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
            output: Image::new(1, 1, fr::PixelType::U8x4),
        }
    }

    fn target(input: Dimensions) -> Dimensions {
        Dimensions::new((input.width / 2).max(1), (input.height / 2).max(1))
    }
}

impl Default for HalfScaleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameFilter for HalfScaleFilter {
    fn name(&self) -> &str {
        "half_scale"
    }

    fn info(&self) -> Result<String> {
        Ok("half-scale filter (fast_image_resize)".to_string())
    }

    fn apply<'a>(&'a mut self, frame: &mut PackedFrame) -> Result<Filtered<'a>> {
        let input = frame.dims();
        let target = Self::target(input);
        if self.output.width() != target.width || self.output.height() != target.height {
            self.output = Image::new(target.width, target.height, fr::PixelType::U8x4);
        }

        let src = ImageRef::new(input.width, input.height, frame.data(), fr::PixelType::U8x4)
            .map_err(|e| FilterError::InvalidOutput(format!("source image: {e}")))?;
        self.resizer
            .resize(&src, &mut self.output, None)
            .map_err(|e| FilterError::InvalidOutput(format!("resize failed: {e}")))?;

        let view = FrameView::new(target, self.output.buffer())
            .map_err(|e| FilterError::InvalidOutput(e.to_string()))?;
        Ok(Filtered::Replaced(view))
    }
}
