use serde::Serialize;
use std::time::{Duration, Instant};

/// How a presented frame got to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentPath {
    /// Processing was off or the bridge is unavailable.
    PassThrough,
    /// The filter ran and its output was presented.
    Filtered,
    /// The filter failed on this frame; the unfiltered frame was presented.
    FilterFallback,
}

/// Collects statistics for a running pipeline.
pub struct PipelineStats {
    presented: u64,
    filtered: u64,
    pass_through: u64,
    filter_failures: u64,
    skipped: u64,
    acquire_failures: u64,
    render_failures: u64,
    source_drops: u64,
    total_bytes: u64,
    start_time: Instant,
    latency: Duration,
}

/// Snapshot of pipeline stats for logging and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub fps: f64,
    pub frames_presented: u64,
    pub frames_filtered: u64,
    pub frames_passed_through: u64,
    pub filter_failures: u64,
    pub frames_skipped: u64,
    pub acquire_failures: u64,
    pub render_failures: u64,
    pub source_drops: u64,
    pub drop_rate: f64,
    pub latency_ms: f64,
    pub bandwidth_bps: u64,
}

impl PipelineStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            presented: 0,
            filtered: 0,
            pass_through: 0,
            filter_failures: 0,
            skipped: 0,
            acquire_failures: 0,
            render_failures: 0,
            source_drops: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            latency: Duration::ZERO,
        }
    }

    /// Record a frame that reached the renderer.
    pub fn record_presented(&mut self, path: PresentPath, bytes: usize, latency: Duration) {
        self.presented += 1;
        self.total_bytes += bytes as u64;
        self.latency = latency;
        match path {
            PresentPath::PassThrough => self.pass_through += 1,
            PresentPath::Filtered => self.filtered += 1,
            PresentPath::FilterFallback => {
                self.pass_through += 1;
                self.filter_failures += 1;
            }
        }
    }

    /// Record a frame that could not be converted.
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Record a per-frame acquisition failure reported by the source.
    pub fn record_acquire_failure(&mut self) {
        self.acquire_failures += 1;
    }

    /// Record a frame the renderer refused. `filter_failed` marks frames
    /// whose filter call also failed.
    pub fn record_render_failure(&mut self, filter_failed: bool) {
        self.render_failures += 1;
        if filter_failed {
            self.filter_failures += 1;
        }
    }

    /// Update the running total of frames the source dropped.
    pub fn set_source_drops(&mut self, total: u64) {
        self.source_drops = total;
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Presented frames per second since start or the last reset.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.presented as f64 / elapsed
    }

    /// Share of produced frames that never reached the pipeline, as a
    /// percentage (0.0 - 100.0).
    pub fn drop_rate(&self) -> f64 {
        let total = self.presented + self.skipped + self.render_failures + self.source_drops;
        if total == 0 {
            return 0.0;
        }
        (self.source_drops as f64 / total as f64) * 100.0
    }

    /// Bandwidth of presented frames in bytes per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.total_bytes as f64 / elapsed) as u64
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            fps: self.fps(),
            frames_presented: self.presented,
            frames_filtered: self.filtered,
            frames_passed_through: self.pass_through,
            filter_failures: self.filter_failures,
            frames_skipped: self.skipped,
            acquire_failures: self.acquire_failures,
            render_failures: self.render_failures,
            source_drops: self.source_drops,
            drop_rate: self.drop_rate(),
            latency_ms: self.latency.as_secs_f64() * 1000.0,
            bandwidth_bps: self.bandwidth_bps(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
