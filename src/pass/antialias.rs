//! Morphological antialiasing over the composed frame.
//!
//! Two sub-passes: luma edge detection predicated on the geometry buffer,
//! then a blend pass that walks edge runs and mixes crossing neighbors by
//! the coverage weights in a lookup table. The table bakes on a worker
//! thread at startup; the composer defers whole frames until it arrives.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use bytemuck::{Pod, Zeroable};

use crate::config::AaTuning;
use crate::error::PipelineError;
use crate::gpu::GpuContext;
use crate::texture::Texture;

use super::area::{AREA_SIZE, area_table};
use super::node::RenderStage;
use super::target::{FrameContext, RenderTarget};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct EdgeUniforms {
    threshold: f32,
    predication_threshold: f32,
    predication_scale: f32,
    _pad: f32,
}

pub struct AntialiasStage {
    edge_pipeline: wgpu::RenderPipeline,
    edge_layout: wgpu::BindGroupLayout,
    edge_uniforms: wgpu::Buffer,
    edge_target: RenderTarget,
    blend_pipeline: wgpu::RenderPipeline,
    blend_layout: wgpu::BindGroupLayout,
    geometry: Rc<RefCell<RenderTarget>>,
    table: Option<Receiver<Vec<u8>>>,
    area: Option<Texture>,
}

impl AntialiasStage {
    pub fn new(
        gpu: &GpuContext,
        tuning: &AaTuning,
        geometry: Rc<RefCell<RenderTarget>>,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        use wgpu::util::DeviceExt;

        let device = &gpu.device;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(area_table());
        });

        let edge_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Edge Uniforms"),
            contents: bytemuck::bytes_of(&EdgeUniforms {
                threshold: tuning.threshold,
                predication_threshold: tuning.predication_threshold,
                predication_scale: tuning.predication_scale,
                _pad: 0.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let edge_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Edge Bind Group Layout"),
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
                texture_entry(1),
                texture_entry(2),
            ],
        });

        let edge_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Edge Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/edge.wgsl").into()),
        });
        let edge_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Edge Pipeline Layout"),
                bind_group_layouts: &[&edge_layout],
                push_constant_ranges: &[],
            });
        let edge_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Edge Pipeline"),
            layout: Some(&edge_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &edge_shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &edge_shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let edge_target = RenderTarget::new(
            gpu,
            "Edge Target",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        )?;

        let blend_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("AA Blend Bind Group Layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let blend_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("AA Blend Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/aa_blend.wgsl").into()),
        });
        let blend_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("AA Blend Pipeline Layout"),
                bind_group_layouts: &[&blend_layout],
                push_constant_ranges: &[],
            });
        let blend_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("AA Blend Pipeline"),
            layout: Some(&blend_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blend_shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blend_shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            edge_pipeline,
            edge_layout,
            edge_uniforms,
            edge_target,
            blend_pipeline,
            blend_layout,
            geometry,
            table: Some(rx),
            area: None,
        })
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl RenderStage for AntialiasStage {
    fn name(&self) -> &'static str {
        "antialias"
    }

    fn writes_color(&self) -> bool {
        false
    }

    fn is_ready(&self) -> bool {
        self.area.is_some()
    }

    fn poll(&mut self, gpu: &GpuContext) {
        let Some(rx) = &self.table else {
            return;
        };
        if let Ok(data) = rx.try_recv() {
            self.area = Some(Texture::from_rgba_linear(
                gpu,
                &data,
                AREA_SIZE,
                AREA_SIZE,
                "AA Area Table",
            ));
            self.table = None;
            tracing::info!("antialias area table ready");
        }
    }

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        self.edge_target.resize(gpu, width, height)
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext,
        input: &RenderTarget,
        output: &wgpu::TextureView,
    ) -> Result<(), PipelineError> {
        let Some(area) = &self.area else {
            return Err(PipelineError::NotReady {
                resource: "antialias area table",
            });
        };

        let geometry = self.geometry.borrow();
        let edge_bind = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Edge Bind Group"),
            layout: &self.edge_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.edge_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&input.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&geometry.view),
                },
            ],
        });

        {
            let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Edge Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.edge_target.view,
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
            pass.set_pipeline(&self.edge_pipeline);
            pass.set_bind_group(0, &edge_bind, &[]);
            pass.draw(0..3, 0..1);
        }

        let blend_bind = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("AA Blend Bind Group"),
            layout: &self.blend_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.edge_target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&area.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&area.sampler),
                },
            ],
        });

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("AA Blend Pass"),
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
        pass.set_pipeline(&self.blend_pipeline);
        pass.set_bind_group(0, &blend_bind, &[]);
        pass.draw(0..3, 0..1);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_uniforms_fill_one_vec4() {
        assert_eq!(std::mem::size_of::<EdgeUniforms>(), 16);
    }

    #[test]
    fn the_baked_table_is_a_square_rgba_image() {
        let data = area_table();
        assert_eq!(data.len(), (AREA_SIZE * AREA_SIZE * 4) as usize);
    }
}
