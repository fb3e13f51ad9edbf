//! The flow material: a lit surface that folds the previous frame back in.
//!
//! Each tile face samples two persistent feedback textures (one sharp, one
//! blurred) through an atlas mapping, blends them by distance from the cell
//! center, and adds the shaped result on top of the lit color. The shader is
//! the plain surface template extended with two [`ShaderStage`]s; the mapping
//! math also exists here as plain functions so the atlas behavior is testable
//! without a GPU.

use glam::{Vec2, Vec3};

use crate::error::PipelineError;
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;
use crate::texture::Texture;

use super::compose::{InjectionPoint, SURFACE_TEMPLATE, ShaderStage, compose};
use super::uniforms::{BundleLayout, UniformBundle};
use super::SurfaceLayouts;

/// Tiles per axis of the feedback atlas. Each tile reads its own cell.
pub const FLOW_GRID: usize = 3;

const FLOW_DECLARATIONS: &str = "\
struct FlowUniforms {
    offset: vec2f,
    scale: vec2f,
    blend_lo: f32,
    blend_hi: f32,
}

@group(2) @binding(0) var<uniform> flow: FlowUniforms;
@group(2) @binding(1) var t_flow_sharp: texture_2d<f32>;
@group(2) @binding(2) var t_flow_blur: texture_2d<f32>;
@group(2) @binding(3) var s_flow: sampler;";

const FLOW_VARYINGS: &str = "@location(3) flow_uv: vec2f,";

const FLOW_VERTEX_BODY: &str = "out.flow_uv = in.uv;";

const FLOW_FRAGMENT_BODY: &str = "\
let cell = fract(in.flow_uv * flow.scale) - flow.offset;
let sharp = textureSample(t_flow_sharp, s_flow, cell).rgb;
let soft = textureSample(t_flow_blur, s_flow, cell).rgb;
var falloff = abs(cell - vec2f(0.5));
falloff = falloff * falloff;
let edge = smoothstep(flow.blend_lo, flow.blend_hi, falloff.x + falloff.y);
color += smoothstep(vec3f(0.0), vec3f(1.0), mix(sharp, soft, edge));";

/// The two stages that turn the lit surface into the flow surface.
pub fn flow_stages() -> [ShaderStage; 2] {
    [
        ShaderStage {
            point: InjectionPoint::PostTransform,
            declarations: FLOW_DECLARATIONS,
            varyings: FLOW_VARYINGS,
            body: FLOW_VERTEX_BODY,
        },
        ShaderStage {
            point: InjectionPoint::PostDither,
            declarations: "",
            varyings: "",
            body: FLOW_FRAGMENT_BODY,
        },
    ]
}

/// Atlas mapping parameters for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowParams {
    /// Subtracted after wrapping; negative offsets select atlas cells.
    pub offset: [f32; 2],
    /// Applied to the surface uv before wrapping.
    pub scale: [f32; 2],
    pub blend_lo: f32,
    pub blend_hi: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        let g = FLOW_GRID as f32;
        Self {
            offset: [0.0, 0.0],
            scale: [1.0 / g, 1.0 / g],
            blend_lo: 0.1,
            blend_hi: 0.3,
        }
    }
}

impl FlowParams {
    /// Parameters that point tile `index` (row-major) at its atlas cell.
    pub fn tile(index: usize) -> Self {
        let g = FLOW_GRID as f32;
        Self {
            offset: [
                -((index % FLOW_GRID) as f32) / g,
                -((index / FLOW_GRID) as f32) / g,
            ],
            ..Self::default()
        }
    }

    pub fn with_blend(mut self, lo: f32, hi: f32) -> Self {
        self.blend_lo = lo;
        self.blend_hi = hi;
        self
    }
}

fn flow_layout() -> BundleLayout {
    BundleLayout::new(&[("offset", 8), ("scale", 8), ("blend_lo", 4), ("blend_hi", 4)])
}

/// The composed flow pipeline, shared by every tile face.
///
/// Group 0/1 reuse the [`SurfaceLayouts`] contract; group 2 is the flow
/// bindings (params, sharp feedback, blurred feedback, sampler).
pub struct FlowPipeline {
    pipeline: wgpu::RenderPipeline,
    feedback_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback: Texture,
}

impl FlowPipeline {
    pub fn new(
        gpu: &GpuContext,
        layouts: &SurfaceLayouts,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Result<Self, PipelineError> {
        let device = &gpu.device;

        let source = compose(SURFACE_TEMPLATE, &flow_stages())?;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Flow Surface Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let feedback_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Flow Feedback Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Flow Pipeline Layout"),
            bind_group_layouts: &[&layouts.camera, &layouts.model, &feedback_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Flow Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Flow Feedback Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // Until the first frame lands in the feedback textures, faces sample
        // black and contribute nothing.
        let fallback = Texture::solid(gpu, [0, 0, 0, 255], "Flow Fallback");

        Ok(Self {
            pipeline,
            feedback_layout,
            sampler,
            fallback,
        })
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }
}

/// Per-face flow state: the uniform bundle holding this face's atlas mapping.
pub struct FlowMaterial {
    bundle: UniformBundle,
    params: FlowParams,
}

impl FlowMaterial {
    pub fn new(
        gpu: &GpuContext,
        label: &str,
        params: FlowParams,
    ) -> Result<Self, PipelineError> {
        let mut bundle = UniformBundle::new(gpu, label, flow_layout());
        bundle.set_vec2(gpu, "offset", params.offset)?;
        bundle.set_vec2(gpu, "scale", params.scale)?;
        bundle.set_f32(gpu, "blend_lo", params.blend_lo)?;
        bundle.set_f32(gpu, "blend_hi", params.blend_hi)?;
        Ok(Self { bundle, params })
    }

    pub fn params(&self) -> FlowParams {
        self.params
    }

    /// Retargets this face at another atlas cell without touching the pipeline.
    pub fn set_offset(&mut self, gpu: &GpuContext, offset: [f32; 2]) -> Result<(), PipelineError> {
        self.params.offset = offset;
        self.bundle.set_vec2(gpu, "offset", offset)
    }

    pub fn set_blend(&mut self, gpu: &GpuContext, lo: f32, hi: f32) -> Result<(), PipelineError> {
        self.params.blend_lo = lo;
        self.params.blend_hi = hi;
        self.bundle.set_f32(gpu, "blend_lo", lo)?;
        self.bundle.set_f32(gpu, "blend_hi", hi)
    }

    /// Builds this face's group 2 bind group. Absent feedback views fall back
    /// to the pipeline's black texture.
    pub fn bind_group(
        &self,
        gpu: &GpuContext,
        pipe: &FlowPipeline,
        sharp: Option<&wgpu::TextureView>,
        blur: Option<&wgpu::TextureView>,
    ) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Flow Feedback Bind Group"),
            layout: &pipe.feedback_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.bundle.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        sharp.unwrap_or(&pipe.fallback.view),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(
                        blur.unwrap_or(&pipe.fallback.view),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&pipe.sampler),
                },
            ],
        })
    }
}

fn smoothstep(lo: f32, hi: f32, x: f32) -> f32 {
    let t = ((x - lo) / (hi - lo)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// The atlas mapping the fragment stage applies: wrap the scaled uv, then
/// shift by the cell offset.
pub fn sample_uv(surface_uv: Vec2, offset: Vec2, scale: Vec2) -> Vec2 {
    (surface_uv * scale).fract_gl() - offset
}

/// Sharp-to-blur blend weight at `cell`: zero at the cell center, rising with
/// the squared distance per axis.
pub fn blend_weight(cell: Vec2, lo: f32, hi: f32) -> f32 {
    let d = (cell - Vec2::splat(0.5)).abs();
    let d2 = d * d;
    smoothstep(lo, hi, d2.x + d2.y)
}

/// The additive term a face contributes, given the two feedback samples.
pub fn flow_contribution(sharp: Vec3, soft: Vec3, weight: f32) -> Vec3 {
    let blended = sharp.lerp(soft, weight);
    Vec3::new(
        smoothstep(0.0, 1.0, blended.x),
        smoothstep(0.0, 1.0, blended.y),
        smoothstep(0.0, 1.0, blended.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapping_returns_the_surface_uv() {
        let offset = Vec2::ZERO;
        let scale = Vec2::ONE;
        for uv in [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.25, 0.75),
            Vec2::new(0.999, 0.001),
        ] {
            let cell = sample_uv(uv, offset, scale);
            assert!((cell - uv).length() < 1e-6, "uv {uv} mapped to {cell}");
        }
    }

    #[test]
    fn constant_feedback_passes_through_the_blend() {
        // With both inputs equal the blend weight cannot matter.
        let c = Vec3::new(0.4, 0.2, 0.9);
        for w in [0.0, 0.3, 1.0] {
            let lerped = c.lerp(c, w);
            assert!((lerped - c).length() < 1e-6);
        }
    }

    #[test]
    fn black_feedback_contributes_nothing() {
        let out = flow_contribution(Vec3::ZERO, Vec3::ZERO, 0.7);
        assert_eq!(out, Vec3::ZERO);
    }

    #[test]
    fn every_tile_cell_stays_inside_the_atlas() {
        for index in 0..FLOW_GRID * FLOW_GRID {
            let p = FlowParams::tile(index);
            for &u in &[0.0_f32, 0.25, 0.5, 0.75, 1.0] {
                for &v in &[0.0_f32, 0.25, 0.5, 0.75, 1.0] {
                    let cell = sample_uv(
                        Vec2::new(u, v),
                        Vec2::from_array(p.offset),
                        Vec2::from_array(p.scale),
                    );
                    assert!(
                        (0.0..=1.0).contains(&cell.x) && (0.0..=1.0).contains(&cell.y),
                        "tile {index} uv ({u}, {v}) escaped the atlas: {cell}"
                    );
                }
            }
        }
    }

    #[test]
    fn tiles_read_distinct_atlas_cells() {
        let centers: Vec<Vec2> = (0..FLOW_GRID * FLOW_GRID)
            .map(|i| {
                let p = FlowParams::tile(i);
                sample_uv(
                    Vec2::splat(0.5),
                    Vec2::from_array(p.offset),
                    Vec2::from_array(p.scale),
                )
            })
            .collect();
        for (i, a) in centers.iter().enumerate() {
            for b in &centers[i + 1..] {
                assert!((*a - *b).length() > 0.1, "cells collide: {a} vs {b}");
            }
        }
    }

    #[test]
    fn blend_is_sharp_at_the_center_and_grows_outward() {
        let lo = 0.1;
        let hi = 0.3;
        assert_eq!(blend_weight(Vec2::splat(0.5), lo, hi), 0.0);
        let mut last = 0.0;
        for step in 0..=8 {
            let t = step as f32 / 8.0 * 0.5;
            let w = blend_weight(Vec2::new(0.5 + t, 0.5 + t), lo, hi);
            assert!(w >= last, "blend weight regressed at t = {t}");
            last = w;
        }
    }

    mod atlas_bounds {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn wrapped_cells_never_escape(
                u in 0.0_f32..=1.0,
                v in 0.0_f32..=1.0,
                index in 0_usize..9,
            ) {
                let p = FlowParams::tile(index);
                let cell = sample_uv(
                    Vec2::new(u, v),
                    Vec2::from_array(p.offset),
                    Vec2::from_array(p.scale),
                );
                prop_assert!(cell.x >= -1e-6 && cell.x <= 1.0 + 1e-6);
                prop_assert!(cell.y >= -1e-6 && cell.y <= 1.0 + 1e-6);
            }
        }
    }
}
