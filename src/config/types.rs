use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::bridge::builtin::BuiltinFilter;
use crate::config::error::{ConfigError, Result};
use crate::source::backend::CaptureFormat;
use crate::source::types::ChromaLayout;

/// Where frames come from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Scrolling colour bars generated in-process
    #[default]
    Synthetic,
    /// A V4L2 capture device (Linux, `v4l2` feature)
    V4l2,
}

/// Where finished frames go.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// Discard frames
    #[default]
    Null,
    /// Upload frames to a GPU texture
    Gpu,
    /// Periodically write a JPEG snapshot
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub pool_size: usize,
    pub layout: ChromaLayout,
}

impl SourceSettings {
    pub fn capture_format(&self) -> CaptureFormat {
        CaptureFormat {
            pool_size: self.pool_size,
            layout: self.layout,
            ..CaptureFormat::new(self.width, self.height, self.fps)
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        let format = CaptureFormat::default();
        Self {
            kind: SourceKind::Synthetic,
            device: "/dev/video0".to_string(),
            width: format.dims.width,
            height: format.dims.height,
            fps: format.fps,
            pool_size: format.pool_size,
            layout: format.layout,
        }
    }
}

/// Which filter sits behind the processing bridge.
///
/// A native `library` wins over `builtin`. With neither, the bridge is
/// unavailable and frames always pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub builtin: Option<BuiltinFilter>,
    pub library: Option<PathBuf>,
    /// Processing state at startup.
    pub enabled: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            builtin: Some(BuiltinFilter::Identity),
            library: None,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub kind: RendererKind,
    pub snapshot_path: PathBuf,
    /// Write a snapshot once every this many frames.
    pub snapshot_every: u64,
    pub snapshot_quality: u8,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            kind: RendererKind::Null,
            snapshot_path: PathBuf::from("framepipe-snapshot.jpg"),
            snapshot_every: 30,
            snapshot_quality: crate::render::snapshot::DEFAULT_QUALITY,
        }
    }
}

/// Top-level configuration file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceSettings,
    pub filter: FilterSettings,
    pub renderer: RendererSettings,
    /// Seconds between statistics log lines; 0 disables them.
    pub stats_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            filter: FilterSettings::default(),
            renderer: RendererSettings::default(),
            stats_interval_secs: 5,
        }
    }
}

impl PipelineConfig {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let source = &self.source;
        if source.width == 0 || source.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture size {}x{} is empty",
                source.width, source.height
            )));
        }
        if !(source.fps.is_finite() && source.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "frame rate must be positive, got {}",
                source.fps
            )));
        }
        if source.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        if self.renderer.snapshot_every == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_every must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
