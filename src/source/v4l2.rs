//! V4L2 capture source (Linux, `v4l2` feature).
//!
//! Negotiates planar `YU12` on the device, memory-maps a small ring of
//! driver buffers and copies each dequeued buffer into pooled planes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::source::backend::{CaptureFormat, FrameSource};
use crate::source::error::{Result, SourceError};
use crate::source::mailbox::FrameMailbox;
use crate::source::pool::{PlaneGeometry, PlanePool};
use crate::source::types::{ChromaLayout, Dimensions, FrameRecycler, Plane, RawFrame};

/// Driver-side buffers requested from the device.
const DRIVER_BUFFERS: u32 = 4;

/// Consecutive dequeue failures before the session is considered lost.
const MAX_CONSECUTIVE_ERRORS: u32 = 30;

/// Live capture from a `/dev/video*` node.
pub struct V4l2Source {
    device_path: String,
    format: CaptureFormat,
    pool: Arc<PlanePool>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl V4l2Source {
    pub fn new(device_path: impl Into<String>, format: CaptureFormat) -> Self {
        Self {
            device_path: device_path.into(),
            pool: PlanePool::new(format.pool_size),
            format,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.device_path
    }

    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> Result<()> {
        if self.thread.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        self.running.store(true, Ordering::Relaxed);

        // The device is opened on the capture thread (the mmap stream borrows
        // it); the outcome of negotiation comes back over this channel.
        let (ready_tx, ready_rx) = sync_channel::<Result<Negotiated>>(1);
        let path = self.device_path.clone();
        let format = self.format;
        let pool = Arc::clone(&self.pool);
        let running = Arc::clone(&self.running);

        let handle = std::thread::Builder::new()
            .name("v4l2-source".to_string())
            .spawn(move || {
                if let Err(e) = capture_loop(&path, format, pool, &running, &mailbox, ready_tx) {
                    error!(device_path = %path, error = %e, "V4L2 capture loop failed");
                    mailbox.fail(e);
                }
            })
            .map_err(|e| SourceError::StartFailed(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(negotiated)) => {
                info!(
                    device_path = %self.device_path,
                    size = %negotiated.dims,
                    "V4L2 capture started"
                );
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SourceError::StartFailed(
                    "capture thread exited during negotiation".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("V4L2 capture thread panicked");
            }
        }
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Negotiated {
    dims: Dimensions,
    luma_stride: usize,
}

fn negotiate(dev: &Device, format: &CaptureFormat) -> Result<Negotiated> {
    let yu12 = v4l::FourCC::new(b"YU12");
    let mut fmt = dev
        .format()
        .map_err(|e| SourceError::Format(format!("failed to query format: {e}")))?;
    fmt.width = format.dims.width;
    fmt.height = format.dims.height;
    fmt.fourcc = yu12;

    let applied = dev
        .set_format(&fmt)
        .map_err(|e| SourceError::Format(format!("failed to set format: {e}")))?;
    if applied.fourcc != yu12 {
        return Err(SourceError::Format(format!(
            "device offered {} instead of YU12",
            applied.fourcc
        )));
    }

    let dims = Dimensions::new(applied.width, applied.height);
    let luma_stride = (applied.stride as usize).max(dims.width as usize);
    Ok(Negotiated { dims, luma_stride })
}

fn capture_loop(
    device_path: &str,
    format: CaptureFormat,
    pool: Arc<PlanePool>,
    running: &AtomicBool,
    mailbox: &FrameMailbox,
    ready: std::sync::mpsc::SyncSender<Result<Negotiated>>,
) -> Result<()> {
    let setup = Device::with_path(device_path)
        .map_err(|e| SourceError::DeviceNotFound(format!("{device_path}: {e}")))
        .and_then(|dev| negotiate(&dev, &format).map(|n| (dev, n)));
    let (mut dev, negotiated) = match setup {
        Ok(ok) => ok,
        Err(e) => {
            let _ = ready.send(Err(e));
            return Ok(());
        }
    };

    let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, DRIVER_BUFFERS) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(SourceError::StartFailed(format!(
                "failed to create buffer stream: {e}"
            ))));
            return Ok(());
        }
    };

    let dims = negotiated.dims;
    let luma_stride = negotiated.luma_stride;
    let _ = ready.send(Ok(negotiated));

    let geometry = PlaneGeometry::new(dims, ChromaLayout::Planar, 0);
    let started = Instant::now();
    let mut sequence = 0u64;
    let mut consecutive_errors = 0u32;

    while running.load(Ordering::Relaxed) {
        let buf = match stream.next() {
            Ok((buf, _meta)) => {
                consecutive_errors = 0;
                buf
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return Err(SourceError::SessionLost(format!(
                        "{consecutive_errors} consecutive dequeue failures, last: {e}"
                    )));
                }
                warn!(error = %e, "failed to dequeue V4L2 buffer");
                mailbox.publish_error(SourceError::Acquisition(e.to_string()));
                std::thread::sleep(std::time::Duration::from_millis(10));
                continue;
            }
        };

        let timestamp_us = started.elapsed().as_micros() as u64;
        match capture_frame(&pool, &geometry, buf, luma_stride, sequence, timestamp_us) {
            Ok(Some(frame)) => {
                sequence += 1;
                if !mailbox.publish(frame) {
                    break;
                }
            }
            Ok(None) => debug!("V4L2 source: all buffers in flight, dropping capture"),
            Err(e) => {
                mailbox.publish_error(e);
            }
        }
    }

    info!(device_path, frames = sequence, "V4L2 capture loop ended");
    Ok(())
}

/// Copy one driver buffer into pooled planes and wrap them in a frame.
///
/// `Ok(None)` when every pool buffer is held by an unreleased frame. A buffer
/// that cannot be split hands its planes straight back to the pool.
fn capture_frame(
    pool: &Arc<PlanePool>,
    geometry: &PlaneGeometry,
    buf: &[u8],
    luma_stride: usize,
    sequence: u64,
    timestamp_us: u64,
) -> Result<Option<RawFrame>> {
    let Some(mut planes) = pool.acquire(geometry) else {
        return Ok(None);
    };
    if let Err(e) = split_yu12(buf, geometry.dims, luma_stride, &mut planes) {
        pool.reclaim(sequence, planes);
        return Err(e);
    }
    let recycler: Arc<dyn FrameRecycler> = pool.clone();
    Ok(Some(RawFrame::new(geometry.dims, planes, sequence, timestamp_us, recycler)))
}

/// Split one contiguous `YU12` buffer into tightly packed planes.
fn split_yu12(buf: &[u8], dims: Dimensions, luma_stride: usize, planes: &mut [Plane; 3]) -> Result<()> {
    let (w, h) = (dims.width as usize, dims.height as usize);
    let chroma = dims.chroma();
    let (cw, ch) = (chroma.width as usize, chroma.height as usize);
    let chroma_stride = luma_stride.div_ceil(2);

    let luma_len = luma_stride * h;
    let chroma_len = chroma_stride * ch;
    if buf.len() < luma_len + 2 * chroma_len {
        return Err(SourceError::Acquisition(format!(
            "short buffer: {} bytes for {dims}",
            buf.len()
        )));
    }

    let regions = [
        (&buf[..luma_len], luma_stride, w, h),
        (&buf[luma_len..luma_len + chroma_len], chroma_stride, cw, ch),
        (&buf[luma_len + chroma_len..luma_len + 2 * chroma_len], chroma_stride, cw, ch),
    ];
    for (plane, (src, src_stride, width, height)) in planes.iter_mut().zip(regions) {
        let dst_stride = plane.row_stride();
        let dst = plane.data_mut();
        for row in 0..height {
            dst[row * dst_stride..row * dst_stride + width]
                .copy_from_slice(&src[row * src_stride..row * src_stride + width]);
        }
    }
    Ok(())
}
