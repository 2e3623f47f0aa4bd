use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of planes in a planar 4:2:0 frame (luma, chroma U, chroma V).
pub const PLANE_COUNT: usize = 3;

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Size of a half-resolution chroma plane, rounded up for odd sides.
    pub fn chroma(&self) -> Dimensions {
        Dimensions::new(self.width.div_ceil(2), self.height.div_ceil(2))
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte length of a tightly packed 4-channel buffer of this size.
    pub fn packed_len(&self) -> usize {
        self.pixel_count() * 4
    }

    /// Whether `self` fits inside `other` on both axes.
    pub fn fits_within(&self, other: Dimensions) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the two chroma planes of a captured frame are laid out in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChromaLayout {
    /// Separate U and V planes, one byte per sample (I420).
    #[default]
    Planar,
    /// U and V samples interleaved, each plane addressed with a pixel
    /// stride of 2 (the usual YUV_420_888 delivery from camera HALs).
    SemiPlanar,
}

impl ChromaLayout {
    /// Distance in bytes between two consecutive chroma samples of one plane.
    pub fn pixel_stride(&self) -> usize {
        match self {
            Self::Planar => 1,
            Self::SemiPlanar => 2,
        }
    }
}

/// One plane of pixel data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u8>,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    /// Wrap a byte buffer with its row and pixel strides.
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride: pixel_stride.max(1),
        }
    }

    /// A tightly packed plane: one byte per sample, no row padding.
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self::new(data, width, 1)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// Plane size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Minimum byte length needed to address `width` x `height` samples.
    pub fn required_len(&self, width: usize, height: usize) -> usize {
        if width == 0 || height == 0 {
            return 0;
        }
        (height - 1) * self.row_stride + (width - 1) * self.pixel_stride + 1
    }

    /// Give back the underlying buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Receives the plane buffers of a released frame.
///
/// Implemented by whatever owns the capture buffers (a pool, a driver
/// queue). Called exactly once per frame.
pub trait FrameRecycler: Send + Sync {
    fn reclaim(&self, sequence: u64, planes: [Plane; PLANE_COUNT]);
}

/// A single camera sample in planar 4:2:0 form.
///
/// The pipeline owns the frame for one iteration and must hand it back with
/// [`RawFrame::release`]. If a frame is dropped without an explicit release
/// (an unwinding panic, an early return) the buffers are still returned, so
/// the recycler observes exactly one reclaim per frame on every path.
pub struct RawFrame {
    dims: Dimensions,
    planes: [Plane; PLANE_COUNT],
    sequence: u64,
    timestamp_us: u64,
    recycler: Option<Arc<dyn FrameRecycler>>,
}

impl RawFrame {
    /// Create a frame whose buffers go back to `recycler` on release.
    pub fn new(
        dims: Dimensions,
        planes: [Plane; PLANE_COUNT],
        sequence: u64,
        timestamp_us: u64,
        recycler: Arc<dyn FrameRecycler>,
    ) -> Self {
        Self {
            dims,
            planes,
            sequence,
            timestamp_us,
            recycler: Some(recycler),
        }
    }

    /// Create a frame with no recycler; its buffers are freed on release.
    pub fn detached(dims: Dimensions, planes: [Plane; PLANE_COUNT], sequence: u64) -> Self {
        Self {
            dims,
            planes,
            sequence,
            timestamp_us: 0,
            recycler: None,
        }
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

    /// Planes in capture order: luma, chroma U, chroma V.
    pub fn planes(&self) -> &[Plane; PLANE_COUNT] {
        &self.planes
    }

    pub fn luma(&self) -> &Plane {
        &self.planes[0]
    }

    /// Monotonic sequence number assigned by the source.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Capture timestamp in microseconds since the source started.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// Total bytes across all planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(Plane::size).sum()
    }

    /// Return the frame's buffers to the source.
    pub fn release(mut self) {
        self.reclaim();
    }

    fn reclaim(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            let planes = std::mem::take(&mut self.planes);
            recycler.reclaim(self.sequence, planes);
        }
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.reclaim();
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("dims", &self.dims)
            .field("sequence", &self.sequence)
            .field("timestamp_us", &self.timestamp_us)
            .field("bytes", &self.byte_len())
            .finish()
    }
}
