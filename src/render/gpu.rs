use std::sync::Arc;
use tracing::{debug, error, info};

use crate::convert::packed::{FrameView, BYTES_PER_PIXEL};
use crate::render::backend::FrameRenderer;
use crate::render::error::{RenderError, Result};
use crate::source::types::Dimensions;

/// Uploads each frame into an RGBA8 texture on a headless wgpu device.
///
/// `Queue::write_texture` copies the frame into wgpu's staging memory before
/// returning, so the caller may reuse its buffer as soon as `present` is
/// done. The texture is recreated only when the frame size changes.
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    texture: Option<(Dimensions, wgpu::Texture)>,
    uploads: u64,
}

impl GpuRenderer {
    /// Pick an adapter and open a device. Blocks the calling thread.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::NoAdapter(e.to_string()))?;

        let adapter_name = adapter.get_info().name;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("framepipe renderer"),
            ..Default::default()
        }))
        .map_err(|e| RenderError::Device(e.to_string()))?;

        // errors outside a `present` scope are logged instead of panicking
        device.on_uncaptured_error(Arc::new(|e: wgpu::Error| {
            error!("uncaptured GPU error: {e}");
        }));

        info!(adapter = %adapter_name, "GPU renderer ready");
        Ok(Self {
            device,
            queue,
            adapter_name,
            texture: None,
            uploads: 0,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Size of the current target texture, if one exists.
    pub fn texture_size(&self) -> Option<Dimensions> {
        self.texture.as_ref().map(|(dims, _)| *dims)
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

impl FrameRenderer for GpuRenderer {
    fn name(&self) -> &str {
        "gpu"
    }

    fn present(&mut self, frame: FrameView<'_>) -> Result<()> {
        let dims = frame.dims();
        if dims.is_empty() {
            return Err(RenderError::InvalidFrame(format!("empty frame ({dims})")));
        }
        let limit = self.device.limits().max_texture_dimension_2d;
        if dims.width > limit || dims.height > limit {
            return Err(RenderError::InvalidFrame(format!(
                "{dims} exceeds the device texture limit of {limit}"
            )));
        }

        if self
            .texture
            .as_ref()
            .is_some_and(|(current, _)| *current != dims)
        {
            self.texture = None;
        }
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let device = &self.device;
        let texture = &self
            .texture
            .get_or_insert_with(|| (dims, create_texture(device, dims)))
            .1;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(dims.width * BYTES_PER_PIXEL as u32),
                rows_per_image: Some(dims.height),
            },
            extent(dims),
        );
        self.queue.submit(std::iter::empty());
        if let Some(e) = pollster::block_on(scope.pop()) {
            self.texture = None;
            return Err(RenderError::Device(e.to_string()));
        }
        self.uploads += 1;
        Ok(())
    }
}

fn create_texture(device: &wgpu::Device, dims: Dimensions) -> wgpu::Texture {
    debug!(size = %dims, "creating render texture");
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("framepipe frame"),
        size: extent(dims),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn extent(dims: Dimensions) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dims.width,
        height: dims.height,
        depth_or_array_layers: 1,
    }
}
