//! The stage contract.

use crate::error::PipelineError;
use crate::gpu::GpuContext;

use super::target::{FrameContext, RenderTarget};

/// One link in the render chain.
///
/// Stages record GPU work into the frame's encoder. A stage reads the chain's
/// current color target and writes the other half of the pair; stages that
/// leave the chain color untouched (saves, attribute passes) report it via
/// [`writes_color`](RenderStage::writes_color) so the pair does not flip
/// across them.
pub trait RenderStage {
    fn name(&self) -> &'static str;

    /// Whether executing this stage replaces the chain's color image.
    fn writes_color(&self) -> bool {
        true
    }

    /// Stages with asynchronously built resources report readiness here; the
    /// composer skips the whole frame until every stage is ready.
    fn is_ready(&self) -> bool {
        true
    }

    /// Called once per frame before execution, outside any encoder. Stages
    /// collect finished background work here.
    fn poll(&mut self, _gpu: &GpuContext) {}

    fn resize(
        &mut self,
        _gpu: &GpuContext,
        _width: u32,
        _height: u32,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Records this stage's work. `input` is the chain color produced so far;
    /// `output` is where a color-writing stage must render.
    fn execute(
        &mut self,
        ctx: &mut FrameContext,
        input: &RenderTarget,
        output: &wgpu::TextureView,
    ) -> Result<(), PipelineError>;
}
