//! Persistent feedback storage.
//!
//! A [`FeedbackSlot`] is a pair of textures that outlives the frame: stages
//! copy into the back texture while materials sample the front one, and the
//! composer swaps the pair once per frame. Sampling therefore always sees
//! the previous frame's copy, never the one being written — the loop has a
//! latency of exactly one frame, and frame zero reads the zero-initialized
//! texture (black).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::PipelineError;
use crate::gpu::GpuContext;

use super::COLOR_FORMAT;
use super::node::RenderStage;
use super::target::{FrameContext, RenderTarget};

struct SlotTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl SlotTexture {
    fn new(gpu: &GpuContext, label: &str, width: u32, height: u32) -> Self {
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
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// A double-buffered feedback texture shared between its writing save stage
/// and the materials that sample it.
pub struct FeedbackSlot {
    label: &'static str,
    inner: RefCell<[SlotTexture; 2]>,
    front: Cell<usize>,
    size: Cell<(u32, u32)>,
}

impl FeedbackSlot {
    pub fn new(
        gpu: &GpuContext,
        label: &'static str,
        width: u32,
        height: u32,
    ) -> Result<Rc<Self>, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Allocation {
                label,
                width,
                height,
            });
        }
        let inner = [
            SlotTexture::new(gpu, label, width, height),
            SlotTexture::new(gpu, label, width, height),
        ];
        Ok(Rc::new(Self {
            label,
            inner: RefCell::new(inner),
            front: Cell::new(0),
            size: Cell::new((width, height)),
        }))
    }

    /// The previous frame's copy, safe to sample this frame.
    pub fn front_view(&self) -> wgpu::TextureView {
        self.inner.borrow()[self.front.get()].view.clone()
    }

    fn back_texture(&self) -> wgpu::Texture {
        self.inner.borrow()[1 - self.front.get()].texture.clone()
    }

    /// Promotes this frame's copy to front. Call exactly once per frame,
    /// after the frame's commands are submitted.
    pub fn swap(&self) {
        self.front.set(1 - self.front.get());
    }

    /// Reallocates both textures. History is lost; the next frame samples
    /// black again, exactly like frame zero.
    pub fn resize(&self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        if self.size.get() == (width, height) {
            return Ok(());
        }
        if width == 0 || height == 0 {
            return Err(PipelineError::Allocation {
                label: self.label,
                width,
                height,
            });
        }
        *self.inner.borrow_mut() = [
            SlotTexture::new(gpu, self.label, width, height),
            SlotTexture::new(gpu, self.label, width, height),
        ];
        self.size.set((width, height));
        Ok(())
    }
}

/// Copies the chain color into a feedback slot's back texture. Leaves the
/// chain itself untouched.
pub struct SaveStage {
    name: &'static str,
    slot: Rc<FeedbackSlot>,
}

impl SaveStage {
    pub fn new(name: &'static str, slot: Rc<FeedbackSlot>) -> Self {
        Self { name, slot }
    }
}

impl RenderStage for SaveStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn writes_color(&self) -> bool {
        false
    }

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        self.slot.resize(gpu, width, height)
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext,
        input: &RenderTarget,
        _output: &wgpu::TextureView,
    ) -> Result<(), PipelineError> {
        debug_assert_eq!(self.slot.size.get(), (input.width, input.height));
        let back = self.slot.back_texture();
        ctx.encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &input.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &back,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: input.width,
                height: input.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // The slot's buffering rule, modeled without a GPU: writes land in the
    // back texture, reads come from the front one, and the swap happens at
    // the end of the frame.
    #[test]
    fn reads_trail_writes_by_exactly_one_frame() {
        let mut contents: [Option<u32>; 2] = [None, None];
        let mut front = 0usize;
        let mut sampled = Vec::new();
        for frame in 0..5u32 {
            sampled.push(contents[front]);
            contents[1 - front] = Some(frame);
            front = 1 - front;
        }
        assert_eq!(
            sampled,
            vec![None, Some(0), Some(1), Some(2), Some(3)],
            "frame n must sample frame n-1's copy, frame 0 the initial contents"
        );
    }

    #[test]
    fn a_deferred_frame_keeps_the_previous_copy_in_front() {
        let mut contents: [Option<u32>; 2] = [None, None];
        let mut front = 0usize;
        // Frame 0 renders: save plus swap.
        contents[1 - front] = Some(0);
        front = 1 - front;
        // Frame 1 defers: neither save nor swap runs.
        // Frame 2 still samples frame 0's copy.
        assert_eq!(contents[front], Some(0), "stale but consistent");
    }
}
