pub mod bridge;
pub mod cli;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod pipeline;
pub mod render;
pub mod source;

use bridge::filter::FrameFilter;
use bridge::native::NativeFilter;
use bridge::processing::ProcessingBridge;
use config::types::{
    FilterSettings, PipelineConfig, RendererKind, RendererSettings, SourceKind, SourceSettings,
};
use pipeline::controller::PipelineController;
use pipeline::toggle::ProcessingToggle;
use render::backend::FrameRenderer;
use render::gpu::GpuRenderer;
use render::null::NullRenderer;
use render::snapshot::SnapshotRenderer;
use source::backend::FrameSource;
use source::error::SourceError;
use source::synthetic::SyntheticSource;

/// Create the frame source selected by `settings`.
pub fn create_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>, SourceError> {
    let format = settings.capture_format();
    match settings.kind {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(format))),
        #[cfg(all(target_os = "linux", feature = "v4l2"))]
        SourceKind::V4l2 => Ok(Box::new(source::v4l2::V4l2Source::new(
            settings.device.clone(),
            format,
        ))),
        #[cfg(not(all(target_os = "linux", feature = "v4l2")))]
        SourceKind::V4l2 => Err(SourceError::StartFailed(format!(
            "cannot open {}: built without the v4l2 feature",
            settings.device
        ))),
    }
}

/// Wire up the processing bridge.
///
/// Never fails: a filter that cannot be loaded or probed leaves the bridge
/// unavailable and the pipeline in pass-through.
pub fn create_bridge(settings: &FilterSettings) -> ProcessingBridge {
    if let Some(library) = &settings.library {
        let loaded = NativeFilter::load(library).map(|f| Box::new(f) as Box<dyn FrameFilter>);
        return ProcessingBridge::from_load(loaded);
    }
    match settings.builtin {
        Some(builtin) => ProcessingBridge::connect(builtin.create()),
        None => ProcessingBridge::unavailable("no filter configured"),
    }
}

/// Create the renderer selected by `settings`.
pub fn create_renderer(
    settings: &RendererSettings,
) -> render::error::Result<Box<dyn FrameRenderer>> {
    Ok(match settings.kind {
        RendererKind::Null => Box::new(NullRenderer::new()),
        RendererKind::Gpu => Box::new(GpuRenderer::new()?),
        RendererKind::Snapshot => Box::new(SnapshotRenderer::new(
            settings.snapshot_path.clone(),
            settings.snapshot_every,
            settings.snapshot_quality,
        )),
    })
}

/// Errors from assembling a pipeline out of a config.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] config::error::ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Render(#[from] render::error::RenderError),
}

/// Build an idle pipeline from `config`.
pub fn build_pipeline(config: &PipelineConfig) -> Result<PipelineController, BuildError> {
    config.validate()?;
    let source = create_source(&config.source)?;
    let renderer = create_renderer(&config.renderer)?;
    let bridge = create_bridge(&config.filter);
    Ok(PipelineController::new(
        source,
        bridge,
        renderer,
        ProcessingToggle::new(config.filter.enabled),
    ))
}
