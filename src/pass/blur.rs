//! Separable gaussian blur for the soft feedback capture.
//!
//! Two fullscreen passes through a half-resolution intermediate: horizontal
//! into the small target, vertical back up to chain size. Half resolution
//! roughly doubles the effective kernel width for free, which is the look
//! the soft capture wants anyway.

use crate::error::PipelineError;
use crate::gpu::GpuContext;

use super::COLOR_FORMAT;
use super::node::RenderStage;
use super::target::{FrameContext, RenderTarget};

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniforms {
    /// One sample spacing in uv units along the blur axis.
    step: [f32; 2],
    _pad: [f32; 2],
}

pub struct BlurStage {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    h_uniforms: wgpu::Buffer,
    v_uniforms: wgpu::Buffer,
    half: RenderTarget,
}

impl BlurStage {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self, PipelineError> {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blur Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/blur.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blur Bind Group Layout"),
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
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blur Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blur Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blur Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let h_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blur H Uniforms"),
            size: std::mem::size_of::<BlurUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let v_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blur V Uniforms"),
            size: std::mem::size_of::<BlurUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let half = RenderTarget::new(
            gpu,
            "Blur Half Target",
            (width / 2).max(1),
            (height / 2).max(1),
            COLOR_FORMAT,
        )?;

        let stage = Self {
            pipeline,
            bind_group_layout,
            sampler,
            h_uniforms,
            v_uniforms,
            half,
        };
        stage.write_steps(gpu, width);
        Ok(stage)
    }

    /// The horizontal pass samples the full-size input, the vertical pass the
    /// half-size intermediate; each step is one texel of its source.
    fn write_steps(&self, gpu: &GpuContext, input_width: u32) {
        let h = BlurUniforms {
            step: [1.0 / input_width.max(1) as f32, 0.0],
            _pad: [0.0; 2],
        };
        let v = BlurUniforms {
            step: [0.0, 1.0 / self.half.height as f32],
            _pad: [0.0; 2],
        };
        gpu.queue
            .write_buffer(&self.h_uniforms, 0, bytemuck::cast_slice(&[h]));
        gpu.queue
            .write_buffer(&self.v_uniforms, 0, bytemuck::cast_slice(&[v]));
    }

    fn bind(
        &self,
        gpu: &GpuContext,
        uniforms: &wgpu::Buffer,
        input: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blur Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

impl RenderStage for BlurStage {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        self.half
            .resize(gpu, (width / 2).max(1), (height / 2).max(1))?;
        self.write_steps(gpu, width);
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext,
        input: &RenderTarget,
        output: &wgpu::TextureView,
    ) -> Result<(), PipelineError> {
        let horizontal = self.bind(ctx.gpu, &self.h_uniforms, &input.view);
        let vertical = self.bind(ctx.gpu, &self.v_uniforms, &self.half.view);

        {
            let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blur H Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.half.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &horizontal, &[]);
            pass.draw(0..3, 0..1);
        }

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blur V Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &vertical, &[]);
        pass.draw(0..3, 0..1);

        Ok(())
    }
}
