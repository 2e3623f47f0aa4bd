use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::source::error::SourceError;
use crate::source::types::RawFrame;

/// What the pipeline worker gets back from [`FrameMailbox::recv`].
#[derive(Debug)]
pub enum MailboxEvent {
    /// The newest available frame.
    Frame(RawFrame),
    /// The source failed to acquire one frame but keeps running.
    AcquireFailed(SourceError),
    /// No more frames will arrive. Carries the fatal error, if any.
    Closed(Option<SourceError>),
}

enum Pending {
    Frame(RawFrame),
    Error(SourceError),
}

#[derive(Default)]
struct MailboxState {
    pending: Option<Pending>,
    closed: bool,
    fault: Option<SourceError>,
}

/// Single-slot hand-off between a frame source and the pipeline worker.
///
/// Holds at most one pending item. Publishing while an item is pending
/// replaces it, and a replaced frame is released on the spot, so a slow
/// consumer always sees the newest frame and never a backlog.
pub struct FrameMailbox {
    state: Mutex<MailboxState>,
    ready: Condvar,
    /// Monotonic counter incremented on each published frame.
    published: AtomicU64,
    dropped: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            ready: Condvar::new(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer a frame. Returns `false` if the mailbox is closed, in which case
    /// the frame has already been released.
    pub fn publish(&self, frame: RawFrame) -> bool {
        self.offer(Pending::Frame(frame))
    }

    /// Report a per-frame acquisition failure.
    pub fn publish_error(&self, error: SourceError) -> bool {
        self.offer(Pending::Error(error))
    }

    fn offer(&self, item: Pending) -> bool {
        let is_frame = matches!(item, Pending::Frame(_));
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            // dropping a frame here returns its buffers
            drop(item);
            return false;
        }
        let replaced = state.pending.replace(item);
        drop(state);
        self.ready.notify_one();

        if is_frame {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(Pending::Frame(old)) = replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(sequence = old.sequence(), "dropping stale frame");
            old.release();
        }
        true
    }

    /// Record a fatal source failure and close the mailbox.
    pub fn fail(&self, error: SourceError) {
        warn!("frame source failed: {error}");
        let mut state = self.state.lock();
        if state.fault.is_none() {
            state.fault = Some(error);
        }
        drop(state);
        self.close();
    }

    /// Close the mailbox, release any pending frame, and wake the consumer.
    /// Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let pending = state.pending.take();
        drop(state);
        self.ready.notify_all();
        if let Some(Pending::Frame(frame)) = pending {
            frame.release();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Block until an item is available or the mailbox closes.
    pub fn recv(&self) -> MailboxEvent {
        let mut state = self.state.lock();
        loop {
            if let Some(event) = Self::take_event(&mut state) {
                return event;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MailboxEvent> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(event) = Self::take_event(&mut state) {
                return Some(event);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return Self::take_event(&mut state);
            }
        }
    }

    fn take_event(state: &mut MailboxState) -> Option<MailboxEvent> {
        match state.pending.take() {
            Some(Pending::Frame(frame)) => Some(MailboxEvent::Frame(frame)),
            Some(Pending::Error(error)) => Some(MailboxEvent::AcquireFailed(error)),
            None if state.closed => Some(MailboxEvent::Closed(state.fault.clone())),
            None => None,
        }
    }

    /// Number of items waiting; never more than one.
    pub fn pending_len(&self) -> usize {
        usize::from(self.state.lock().pending.is_some())
    }

    /// Total frames accepted by [`publish`](Self::publish).
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames replaced before the consumer took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameMailbox {
    fn default() -> Self {
        Self::new()
    }
}
