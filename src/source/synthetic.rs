use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info};

use crate::source::backend::{CaptureFormat, FrameSource};
use crate::source::error::{Result, SourceError};
use crate::source::mailbox::FrameMailbox;
use crate::source::pool::{PlaneGeometry, PlanePool, PoolStats};
use crate::source::types::{FrameRecycler, Plane, RawFrame, PLANE_COUNT};

const SYNTHETIC_NAME: &str = "synthetic";

/// Full-range BT.601 YUV triplets for the eight classic colour bars:
/// white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [[u8; 3]; 8] = [
    [255, 128, 128],
    [226, 1, 149],
    [179, 171, 1],
    [150, 44, 21],
    [105, 212, 235],
    [76, 85, 255],
    [29, 255, 107],
    [0, 128, 128],
];

/// Horizontal scroll per frame, in pixels.
const SCROLL_STEP: u64 = 4;

/// A camera stand-in that renders scrolling colour bars.
///
/// Runs its own producer thread at the configured frame rate and fills
/// pooled plane buffers, so it exercises the same buffer lifecycle as a real
/// capture device. When every pooled buffer is still held by the pipeline
/// the tick is skipped instead of allocating.
pub struct SyntheticSource {
    format: CaptureFormat,
    pool: Arc<PlanePool>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(format: CaptureFormat) -> Self {
        Self {
            pool: PlanePool::new(format.pool_size),
            format,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Buffer pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn run(
        format: CaptureFormat,
        pool: Arc<PlanePool>,
        stop: Arc<AtomicBool>,
        mailbox: Arc<FrameMailbox>,
    ) {
        let geometry = PlaneGeometry::new(format.dims, format.layout, format.row_padding);
        let interval = format.frame_interval();
        let started = Instant::now();
        let recycler: Arc<dyn FrameRecycler> = pool.clone();
        let mut sequence = 0u64;

        while !stop.load(Ordering::Relaxed) {
            match pool.acquire(&geometry) {
                Some(mut planes) => {
                    fill_colour_bars(&mut planes, &geometry, sequence);
                    let timestamp_us = started.elapsed().as_micros() as u64;
                    let frame = RawFrame::new(
                        format.dims,
                        planes,
                        sequence,
                        timestamp_us,
                        Arc::clone(&recycler),
                    );
                    if !mailbox.publish(frame) {
                        break;
                    }
                    sequence += 1;
                }
                None => debug!("synthetic source: all buffers in flight, skipping tick"),
            }
            std::thread::sleep(interval);
        }
        info!("synthetic source exiting after {sequence} frames");
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        SYNTHETIC_NAME
    }

    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> Result<()> {
        if self.thread.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        if self.format.dims.is_empty() {
            return Err(SourceError::Format(format!(
                "invalid capture size {}",
                self.format.dims
            )));
        }
        self.stop.store(false, Ordering::Relaxed);

        let format = self.format;
        let pool = Arc::clone(&self.pool);
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name(format!("{SYNTHETIC_NAME}-source"))
            .spawn(move || Self::run(format, pool, stop, mailbox))
            .map_err(|e| SourceError::StartFailed(format!("failed to spawn producer: {e}")))?;
        self.thread = Some(handle);

        info!(
            "synthetic source started at {} @ {} fps",
            self.format.dims, self.format.fps
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Paint colour bars scrolled left by `frame * SCROLL_STEP` pixels.
pub fn fill_colour_bars(planes: &mut [Plane; PLANE_COUNT], geometry: &PlaneGeometry, frame: u64) {
    let width = geometry.dims.width as usize;
    let height = geometry.dims.height as usize;
    if width == 0 || height == 0 {
        return;
    }
    let shift = (frame * SCROLL_STEP % width as u64) as usize;
    let bar_at = |x: usize| BARS[((x + shift) % width) * BARS.len() / width];

    let [y_plane, u_plane, v_plane] = planes;

    let stride = y_plane.row_stride();
    let luma = y_plane.data_mut();
    for row in 0..height {
        let line = &mut luma[row * stride..row * stride + width];
        for (x, px) in line.iter_mut().enumerate() {
            *px = bar_at(x)[0];
        }
    }

    let chroma = geometry.dims.chroma();
    for (plane, channel) in [(u_plane, 1usize), (v_plane, 2usize)] {
        let stride = plane.row_stride();
        let step = plane.pixel_stride();
        let data = plane.data_mut();
        for row in 0..chroma.height as usize {
            for cx in 0..chroma.width as usize {
                data[row * stride + cx * step] = bar_at((cx * 2).min(width - 1))[channel];
            }
        }
    }
}
