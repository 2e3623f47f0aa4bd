use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::convert::packed::FrameView;
use crate::render::backend::FrameRenderer;
use crate::render::error::{RenderError, Result};

/// Default JPEG quality for snapshots.
pub const DEFAULT_QUALITY: u8 = 85;

/// Writes every Nth presented frame to disk as a JPEG.
///
/// The file is replaced atomically (written to `<path>.tmp`, then renamed),
/// so a reader never sees a half-written image. The RGB staging buffer and
/// the encoded bytes are retained between snapshots.
pub struct SnapshotRenderer {
    path: PathBuf,
    every: u64,
    quality: u8,
    presented: u64,
    written: u64,
    rgb: Vec<u8>,
    jpeg: Vec<u8>,
}

impl SnapshotRenderer {
    /// Snapshot to `path` once every `every` frames (at least 1).
    pub fn new(path: impl Into<PathBuf>, every: u64, quality: u8) -> Self {
        Self {
            path: path.into(),
            every: every.max(1),
            quality: quality.clamp(1, 100),
            presented: 0,
            written: 0,
            rgb: Vec::new(),
            jpeg: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of snapshots written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn encode(&mut self, frame: FrameView<'_>) -> Result<()> {
        self.rgb.clear();
        self.rgb.reserve(frame.dims().pixel_count() * 3);
        for px in frame.data().chunks_exact(4) {
            self.rgb.extend_from_slice(&px[..3]);
        }

        let img: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width(), frame.height(), self.rgb.as_slice())
                .ok_or_else(|| RenderError::InvalidFrame("RGB buffer size mismatch".into()))?;

        self.jpeg.clear();
        let encoder = JpegEncoder::new_with_quality(&mut self.jpeg, self.quality);
        img.write_with_encoder(encoder)
            .map_err(|e| RenderError::Encode(e.to_string()))
    }

    fn write_atomic(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RenderError::Io(format!("{}: {e}", parent.display())))?;
            }
        }
        let tmp = self.path.with_extension("jpg.tmp");
        std::fs::write(&tmp, &self.jpeg)
            .map_err(|e| RenderError::Io(format!("{}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            RenderError::Io(format!("{}: {e}", self.path.display()))
        })
    }
}

impl FrameRenderer for SnapshotRenderer {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn present(&mut self, frame: FrameView<'_>) -> Result<()> {
        if frame.dims().is_empty() {
            return Err(RenderError::InvalidFrame(format!(
                "empty frame ({})",
                frame.dims()
            )));
        }
        self.presented += 1;
        if !(self.presented - 1).is_multiple_of(self.every) {
            return Ok(());
        }

        self.encode(frame)?;
        if let Err(e) = self.write_atomic() {
            warn!("snapshot write failed: {e}");
            return Err(e);
        }
        self.written += 1;
        debug!(
            path = %self.path.display(),
            bytes = self.jpeg.len(),
            "snapshot written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::packed::PackedFrame;
    use crate::source::types::Dimensions;

    /// Gradient test frame.
    fn make_frame(width: u32, height: u32) -> PackedFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128, 255]);
            }
        }
        PackedFrame::from_rgba(Dimensions::new(width, height), data).unwrap()
    }

    #[test]
    fn first_frame_is_written_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.jpg");
        let mut renderer = SnapshotRenderer::new(&path, 10, DEFAULT_QUALITY);
        renderer.present(make_frame(64, 48).view()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // JPEG files start with FF D8
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(renderer.written(), 1);
        assert!(!path.with_extension("jpg.tmp").exists());
    }

    #[test]
    fn only_every_nth_frame_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = SnapshotRenderer::new(dir.path().join("s.jpg"), 3, 70);
        let frame = make_frame(8, 8);
        for _ in 0..7 {
            renderer.present(frame.view()).unwrap();
        }
        // frames 1, 4 and 7
        assert_eq!(renderer.written(), 3);
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snap.jpg");
        let mut renderer = SnapshotRenderer::new(&path, 1, 70);
        renderer.present(make_frame(4, 4).view()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn lower_quality_produces_smaller_output() {
        let dir = tempfile::tempdir().unwrap();
        let frame = make_frame(320, 240);
        let mut high = SnapshotRenderer::new(dir.path().join("high.jpg"), 1, 95);
        let mut low = SnapshotRenderer::new(dir.path().join("low.jpg"), 1, 30);
        high.present(frame.view()).unwrap();
        low.present(frame.view()).unwrap();
        assert!(low.jpeg.len() < high.jpeg.len());
    }

    #[test]
    fn empty_frame_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = SnapshotRenderer::new(dir.path().join("s.jpg"), 1, 70);
        let empty = PackedFrame::new(Dimensions::new(0, 0));
        assert!(matches!(
            renderer.present(empty.view()),
            Err(RenderError::InvalidFrame(_))
        ));
    }
}
