//! Deterministic frame source for tests and demos.
//!
//! Plays back a fixed script of frames, acquisition errors and fatal
//! failures, and records every release in a [`ReleaseLedger`] so callers can
//! check that each delivered frame was handed back exactly once.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

use crate::source::backend::FrameSource;
use crate::source::error::{Result, SourceError};
use crate::source::mailbox::FrameMailbox;
use crate::source::pool::PlaneGeometry;
use crate::source::types::{
    ChromaLayout, Dimensions, FrameRecycler, Plane, RawFrame, PLANE_COUNT,
};

/// Counts releases per frame sequence number.
#[derive(Default)]
pub struct ReleaseLedger {
    entries: Mutex<BTreeMap<u64, u32>>,
}

impl ReleaseLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn issue(&self, sequence: u64) {
        self.entries.lock().insert(sequence, 0);
    }

    /// Sequence numbers of every frame handed out so far.
    pub fn issued(&self) -> Vec<u64> {
        self.entries.lock().keys().copied().collect()
    }

    /// Release count for one frame.
    pub fn releases(&self, sequence: u64) -> u32 {
        self.entries.lock().get(&sequence).copied().unwrap_or(0)
    }

    /// Total releases observed.
    pub fn total_releases(&self) -> u64 {
        self.entries.lock().values().map(|&n| u64::from(n)).sum()
    }

    /// Frames released zero times or more than once.
    pub fn violations(&self) -> Vec<(u64, u32)> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, &n)| n != 1)
            .map(|(&seq, &n)| (seq, n))
            .collect()
    }
}

impl FrameRecycler for ReleaseLedger {
    fn reclaim(&self, sequence: u64, _planes: [Plane; PLANE_COUNT]) {
        *self.entries.lock().entry(sequence).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone)]
enum Step {
    Frame { dims: Dimensions, yuv: [u8; 3] },
    AcquireError(String),
    Fatal(String),
}

/// The playable part of a [`ScriptedSource`].
#[derive(Clone)]
struct Script {
    steps: Vec<Step>,
    interval: Duration,
    layout: ChromaLayout,
    row_padding: usize,
    fill: [u8; 3],
    hold_open: bool,
    ledger: Arc<ReleaseLedger>,
}

impl Script {
    fn build_frame(&self, sequence: u64, dims: Dimensions, yuv: [u8; 3]) -> RawFrame {
        let geometry = PlaneGeometry::new(dims, self.layout, self.row_padding);
        let lens = geometry.plane_lens();
        let step = self.layout.pixel_stride();
        let planes = [
            Plane::new(vec![yuv[0]; lens[0]], geometry.luma_stride(), 1),
            Plane::new(vec![yuv[1]; lens[1]], geometry.chroma_stride(), step),
            Plane::new(vec![yuv[2]; lens[2]], geometry.chroma_stride(), step),
        ];
        self.ledger.issue(sequence);
        let recycler: Arc<dyn FrameRecycler> = self.ledger.clone();
        RawFrame::new(dims, planes, sequence, sequence * 1_000, recycler)
    }

    fn play(&self, mailbox: &FrameMailbox, stop: &AtomicBool) {
        let mut sequence = 0u64;
        for step in &self.steps {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            match step {
                Step::Frame { dims, yuv } => {
                    let frame = self.build_frame(sequence, *dims, *yuv);
                    sequence += 1;
                    if !mailbox.publish(frame) {
                        return;
                    }
                }
                Step::AcquireError(message) => {
                    mailbox.publish_error(SourceError::Acquisition(message.clone()));
                }
                Step::Fatal(message) => {
                    mailbox.fail(SourceError::SessionLost(message.clone()));
                    return;
                }
            }
            std::thread::sleep(self.interval);
        }

        if self.hold_open {
            return;
        }
        // let the consumer take the last item before signalling the end
        while mailbox.pending_len() > 0 && !stop.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(1));
        }
        debug!("scripted source finished after {sequence} frames");
        mailbox.close();
    }
}

/// Scripted test source, configured with a builder.
///
/// ```ignore
/// let source = ScriptedSource::new()
///     .with_frames(3, Dimensions::new(4, 4))
///     .with_acquire_error("timeout")
///     .with_frames(2, Dimensions::new(8, 8));
/// ```
pub struct ScriptedSource {
    script: Script,
    start_error: Option<SourceError>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    /// Create an empty script: mid-grey fill, 5 ms between steps.
    pub fn new() -> Self {
        Self {
            script: Script {
                steps: Vec::new(),
                interval: Duration::from_millis(5),
                layout: ChromaLayout::Planar,
                row_padding: 0,
                fill: [128, 128, 128],
                hold_open: false,
                ledger: ReleaseLedger::new(),
            },
            start_error: None,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Append `count` frames of the current fill colour.
    pub fn with_frames(mut self, count: usize, dims: Dimensions) -> Self {
        let yuv = self.script.fill;
        self.script
            .steps
            .extend((0..count).map(|_| Step::Frame { dims, yuv }));
        self
    }

    /// Solid Y/U/V values used by frames appended after this call.
    pub fn with_fill(mut self, y: u8, u: u8, v: u8) -> Self {
        self.script.fill = [y, u, v];
        self
    }

    /// Append a per-frame acquisition failure.
    pub fn with_acquire_error(mut self, message: &str) -> Self {
        self.script
            .steps
            .push(Step::AcquireError(message.to_string()));
        self
    }

    /// Append a fatal session failure; nothing after it is played.
    pub fn with_fatal(mut self, message: &str) -> Self {
        self.script.steps.push(Step::Fatal(message.to_string()));
        self
    }

    /// Make `start` fail with `error`.
    pub fn with_start_failure(mut self, error: SourceError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Delay between steps.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.script.interval = interval;
        self
    }

    /// Chroma layout and row padding of generated planes.
    pub fn with_layout(mut self, layout: ChromaLayout, row_padding: usize) -> Self {
        self.script.layout = layout;
        self.script.row_padding = row_padding;
        self
    }

    /// Keep the mailbox open after the script ends instead of closing it.
    pub fn hold_open(mut self) -> Self {
        self.script.hold_open = true;
        self
    }

    /// Release ledger shared with every frame this source produces.
    pub fn ledger(&self) -> Arc<ReleaseLedger> {
        Arc::clone(&self.script.ledger)
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> Result<()> {
        if let Some(error) = self.start_error.take() {
            return Err(error);
        }
        if self.thread.is_some() {
            return Err(SourceError::AlreadyStarted);
        }

        let script = self.script.clone();
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name("scripted-source".to_string())
            .spawn(move || script.play(&mailbox, &stop))
            .map_err(|e| SourceError::StartFailed(format!("failed to spawn producer: {e}")))?;
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.stop();
    }
}
