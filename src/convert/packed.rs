use crate::convert::error::{ConvertError, Result};
use crate::source::types::Dimensions;

/// Bytes per packed pixel (R, G, B, A).
pub const BYTES_PER_PIXEL: usize = 4;

/// An owned, tightly packed RGBA frame.
///
/// The buffer is always exactly `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    dims: Dimensions,
    data: Vec<u8>,
}

impl PackedFrame {
    /// A zeroed frame of the given size.
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0; dims.packed_len()],
        }
    }

    /// Wrap existing RGBA bytes.
    pub fn from_rgba(dims: Dimensions, data: Vec<u8>) -> Result<Self> {
        check_len(dims, data.len())?;
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn height(&self) -> u32 {
        self.dims.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Borrow the frame as a view.
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            dims: self.dims,
            data: &self.data,
        }
    }

    /// Resize to `dims` if needed. Returns `true` when the buffer was
    /// reallocated; contents are unspecified afterwards.
    pub fn ensure(&mut self, dims: Dimensions) -> bool {
        if self.dims == dims && self.data.len() == dims.packed_len() {
            return false;
        }
        self.dims = dims;
        self.data = vec![0; dims.packed_len()];
        true
    }

    /// Overwrite this frame with `src`, reallocating only on a size change.
    /// Returns `true` when the buffer was reallocated.
    pub fn copy_from(&mut self, src: FrameView<'_>) -> bool {
        let reallocated = self.ensure(src.dims);
        self.data.copy_from_slice(src.data);
        reallocated
    }
}

/// A borrowed RGBA frame: what filters hand back and renderers consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'a> {
    dims: Dimensions,
    data: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Borrow `data` as a `dims`-sized RGBA frame.
    pub fn new(dims: Dimensions, data: &'a [u8]) -> Result<Self> {
        check_len(dims, data.len())?;
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn height(&self) -> u32 {
        self.dims.height
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// RGBA of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.dims.width || y >= self.dims.height {
            return None;
        }
        let at = (y as usize * self.dims.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = &self.data[at..at + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn to_packed(&self) -> PackedFrame {
        PackedFrame {
            dims: self.dims,
            data: self.data.to_vec(),
        }
    }
}

fn check_len(dims: Dimensions, actual: usize) -> Result<()> {
    let expected = dims.packed_len();
    if actual != expected {
        return Err(ConvertError::BufferSize {
            dims,
            expected,
            actual,
        });
    }
    Ok(())
}
