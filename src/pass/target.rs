//! Offscreen color targets and the per-frame context handed to stages.

use crate::error::PipelineError;
use crate::gpu::GpuContext;

/// A color attachment that stages render into and later passes sample.
pub struct RenderTarget {
    pub(crate) texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    label: &'static str,
}

impl RenderTarget {
    pub fn new(
        gpu: &GpuContext,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Allocation {
                label,
                width,
                height,
            });
        }
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            format,
            width,
            height,
            label,
        })
    }

    /// Reallocates at the new size. Contents do not survive; the new texture
    /// starts zeroed.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        if self.width == width && self.height == height {
            return Ok(());
        }
        *self = Self::new(gpu, self.label, width, height, self.format)?;
        Ok(())
    }
}

/// Everything a stage needs while recording one frame.
pub struct FrameContext<'a> {
    pub gpu: &'a GpuContext,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Seconds since the driver started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
}
