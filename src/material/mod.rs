//! Materials: the lit surface template, shader-stage composition, and the
//! feedback-sampling flow material.
//!
//! Every surface pipeline in the crate shares the same group 0/1 contract:
//! group 0 is the per-frame camera/lighting buffer, group 1 the per-draw model
//! buffer. [`SurfaceLayouts`] owns those two bind group layouts so the lit
//! pipeline, the normal pipeline, and the flow pipeline stay compatible.

mod compose;
mod flow;
mod uniforms;

pub use compose::{ComposeError, InjectionPoint, ShaderStage, SURFACE_TEMPLATE, compose};
pub use flow::{
    FLOW_GRID, FlowMaterial, FlowParams, FlowPipeline, blend_weight, flow_contribution, sample_uv,
};
pub use uniforms::{BundleLayout, UniformBundle};

use crate::gpu::GpuContext;

/// Per-frame uniforms: camera matrices plus the light rig, written once per
/// scene pass.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub time: f32,
    pub light_dir: [f32; 3],
    pub light_intensity: f32,
    pub ambient: [f32; 3],
    pub _pad: f32,
}

/// Per-draw uniforms: transform, its normal matrix, and the material scalars.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of `model`; keeps normals honest under the
    /// non-uniform tile squash.
    pub normal_matrix: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// x = roughness, y = metalness, z/w unused.
    pub material: [f32; 4],
}

/// The shared group 0 (camera) and group 1 (model) bind group layouts.
pub struct SurfaceLayouts {
    pub camera: wgpu::BindGroupLayout,
    pub model: wgpu::BindGroupLayout,
}

impl SurfaceLayouts {
    pub fn new(gpu: &GpuContext) -> Self {
        let camera = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let model = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Model Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        Self { camera, model }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_uniforms_match_wgsl_struct_size() {
        // Three mat4x4f plus three vec3f/f32 rows, 16-byte aligned.
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 240);
    }

    #[test]
    fn model_uniforms_match_wgsl_struct_size() {
        assert_eq!(std::mem::size_of::<ModelUniforms>(), 160);
    }
}
