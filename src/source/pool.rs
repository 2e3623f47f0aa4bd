use parking_lot::Mutex;
use std::sync::Arc;

use crate::source::types::{ChromaLayout, Dimensions, FrameRecycler, Plane, PLANE_COUNT};

/// Plane geometry a source wants for each buffer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneGeometry {
    pub dims: Dimensions,
    pub layout: ChromaLayout,
    /// Extra bytes appended to every row of every plane.
    pub row_padding: usize,
}

impl PlaneGeometry {
    pub fn new(dims: Dimensions, layout: ChromaLayout, row_padding: usize) -> Self {
        Self {
            dims,
            layout,
            row_padding,
        }
    }

    /// Row stride of the luma plane.
    pub fn luma_stride(&self) -> usize {
        self.dims.width as usize + self.row_padding
    }

    /// Row stride of both chroma planes.
    pub fn chroma_stride(&self) -> usize {
        let cw = self.dims.chroma().width as usize;
        cw * self.layout.pixel_stride() + self.row_padding
    }

    /// Byte length of each plane.
    pub fn plane_lens(&self) -> [usize; PLANE_COUNT] {
        let ch = self.dims.chroma().height as usize;
        let luma = self.luma_stride() * self.dims.height as usize;
        let chroma = self.chroma_stride() * ch;
        [luma, chroma, chroma]
    }

    /// Build empty planes with this geometry, reusing `buffers` where given.
    fn shape(&self, buffers: [Vec<u8>; PLANE_COUNT]) -> [Plane; PLANE_COUNT] {
        let lens = self.plane_lens();
        let px = self.layout.pixel_stride();
        let [mut y, mut u, mut v] = buffers;
        y.resize(lens[0], 0);
        u.resize(lens[1], 0);
        v.resize(lens[2], 0);
        [
            Plane::new(y, self.luma_stride(), 1),
            Plane::new(u, self.chroma_stride(), px),
            Plane::new(v, self.chroma_stride(), px),
        ]
    }
}

/// Allocation counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffer sets created from scratch.
    pub allocated: u64,
    /// Buffer sets handed out again after a release.
    pub reused: u64,
    /// Buffer sets currently held by frames.
    pub outstanding: usize,
    /// Acquire calls refused because every set was in flight.
    pub exhausted: u64,
}

#[derive(Default)]
struct PoolState {
    free: Vec<[Vec<u8>; PLANE_COUNT]>,
    stats: PoolStats,
}

/// Fixed-capacity pool of plane buffer sets.
///
/// A source acquires planes, fills them, and wraps them in a `RawFrame`
/// pointing back at the pool. Releasing the frame returns the buffers here,
/// so steady-state capture does not allocate.
pub struct PlanePool {
    capacity: usize,
    state: Mutex<PoolState>,
}

impl PlanePool {
    /// Create a pool that keeps at most `capacity` buffer sets in flight.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            state: Mutex::new(PoolState::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a buffer set shaped to `geometry`, or `None` when every set is
    /// held by an unreleased frame.
    pub fn acquire(&self, geometry: &PlaneGeometry) -> Option<[Plane; PLANE_COUNT]> {
        let mut state = self.state.lock();
        let buffers = if let Some(buffers) = state.free.pop() {
            state.stats.reused += 1;
            buffers
        } else if state.stats.outstanding < self.capacity {
            state.stats.allocated += 1;
            Default::default()
        } else {
            state.stats.exhausted += 1;
            return None;
        };
        state.stats.outstanding += 1;
        drop(state);
        Some(geometry.shape(buffers))
    }

    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }
}

impl FrameRecycler for PlanePool {
    fn reclaim(&self, _sequence: u64, planes: [Plane; PLANE_COUNT]) {
        let buffers = planes.map(Plane::into_data);
        let mut state = self.state.lock();
        state.stats.outstanding = state.stats.outstanding.saturating_sub(1);
        state.free.push(buffers);
    }
}
