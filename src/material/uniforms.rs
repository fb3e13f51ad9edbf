//! Name-keyed uniform storage.
//!
//! A material owns one uniform buffer described by a [`BundleLayout`]: an
//! ordered list of named slots laid out with WGSL alignment rules. Updates
//! replace bytes in a CPU staging copy and write through to the GPU buffer,
//! so tuning a value never rebuilds a pipeline.

use std::ops::Range;

use crate::error::PipelineError;
use crate::gpu::GpuContext;

#[derive(Debug, Clone)]
struct Slot {
    name: &'static str,
    offset: usize,
    size: usize,
}

/// Byte layout of a uniform struct, computed from `(name, size)` pairs.
///
/// Alignment follows WGSL uniform rules for the sizes the crate uses:
/// scalars align to 4, `vec2` to 8, everything larger to 16.
#[derive(Debug, Clone)]
pub struct BundleLayout {
    slots: Vec<Slot>,
    size: usize,
}

fn align_for(size: usize) -> usize {
    match size {
        0..=4 => 4,
        5..=8 => 8,
        _ => 16,
    }
}

impl BundleLayout {
    pub fn new(fields: &[(&'static str, usize)]) -> Self {
        let mut slots = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for &(name, size) in fields {
            offset = offset.next_multiple_of(align_for(size));
            slots.push(Slot { name, offset, size });
            offset += size;
        }
        Self {
            slots,
            size: offset.next_multiple_of(16).max(16),
        }
    }

    /// Total buffer size in bytes, padded to a 16-byte boundary.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().find(|s| s.name == name).map(|s| s.offset)
    }

    /// Copies `bytes` into the slot named `name` and returns the byte range
    /// touched, for write-through.
    pub fn store(
        &self,
        staging: &mut [u8],
        name: &str,
        bytes: &[u8],
    ) -> Result<Range<usize>, PipelineError> {
        let slot = self
            .slots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| PipelineError::UnknownUniform {
                name: name.to_owned(),
            })?;
        if bytes.len() != slot.size {
            return Err(PipelineError::UniformSize {
                name: name.to_owned(),
                expected: slot.size,
                got: bytes.len(),
            });
        }
        let range = slot.offset..slot.offset + slot.size;
        staging[range.clone()].copy_from_slice(bytes);
        Ok(range)
    }
}

/// A uniform buffer plus its staging bytes and layout.
pub struct UniformBundle {
    layout: BundleLayout,
    staging: Vec<u8>,
    buffer: wgpu::Buffer,
}

impl UniformBundle {
    /// Creates a zero-initialized buffer sized for `layout`.
    pub fn new(gpu: &GpuContext, label: &str, layout: BundleLayout) -> Self {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: layout.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = vec![0u8; layout.size()];
        Self {
            layout,
            staging,
            buffer,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn set_f32(&mut self, gpu: &GpuContext, name: &str, value: f32) -> Result<(), PipelineError> {
        self.write(gpu, name, bytemuck::bytes_of(&value))
    }

    pub fn set_vec2(
        &mut self,
        gpu: &GpuContext,
        name: &str,
        value: [f32; 2],
    ) -> Result<(), PipelineError> {
        self.write(gpu, name, bytemuck::bytes_of(&value))
    }

    pub fn set_vec4(
        &mut self,
        gpu: &GpuContext,
        name: &str,
        value: [f32; 4],
    ) -> Result<(), PipelineError> {
        self.write(gpu, name, bytemuck::bytes_of(&value))
    }

    fn write(&mut self, gpu: &GpuContext, name: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        let range = self.layout.store(&mut self.staging, name, bytes)?;
        gpu.queue
            .write_buffer(&self.buffer, range.start as u64, &self.staging[range]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_respect_wgsl_alignment() {
        let layout = BundleLayout::new(&[("offset", 8), ("scale", 8), ("lo", 4), ("hi", 4)]);
        assert_eq!(layout.offset_of("offset"), Some(0));
        assert_eq!(layout.offset_of("scale"), Some(8));
        assert_eq!(layout.offset_of("lo"), Some(16));
        assert_eq!(layout.offset_of("hi"), Some(20));
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn vec3_sized_fields_align_to_sixteen() {
        let layout = BundleLayout::new(&[("a", 4), ("b", 12)]);
        assert_eq!(layout.offset_of("b"), Some(16));
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn size_is_padded_to_sixteen() {
        let layout = BundleLayout::new(&[("only", 4)]);
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn store_touches_exactly_the_slot() {
        let layout = BundleLayout::new(&[("a", 4), ("b", 8)]);
        let mut staging = vec![0u8; layout.size()];
        let range = layout
            .store(&mut staging, "b", &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        assert_eq!(range, 8..16);
        assert_eq!(&staging[..8], &[0; 8], "neighboring slot must stay intact");
        assert_eq!(&staging[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn unknown_name_is_reported() {
        let layout = BundleLayout::new(&[("a", 4)]);
        let mut staging = vec![0u8; layout.size()];
        let err = layout.store(&mut staging, "missing", &[0; 4]).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownUniform { name } if name == "missing"));
    }

    #[test]
    fn size_mismatch_is_reported() {
        let layout = BundleLayout::new(&[("a", 8)]);
        let mut staging = vec![0u8; layout.size()];
        let err = layout.store(&mut staging, "a", &[0; 4]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UniformSize {
                expected: 8,
                got: 4,
                ..
            }
        ));
    }
}
