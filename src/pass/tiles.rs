//! The deck stage: tile bodies in the bare lit material, tile faces in the
//! flow material, drawn over the scene background with depth.
//!
//! Every entity draws through its own uniform buffer. Buffer writes land
//! before the frame's commands execute, so a buffer shared across draws
//! would leave every tile wearing the last tile's transform.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::PipelineError;
use crate::gpu::GpuContext;
use crate::material::{
    CameraUniforms, FlowMaterial, FlowPipeline, ModelUniforms, SURFACE_TEMPLATE, SurfaceLayouts,
    compose,
};
use crate::mesh::Vertex3d;
use crate::scene::{FlowFace, TileBody, TilePose, TileScene};

use super::node::RenderStage;
use super::target::{FrameContext, RenderTarget};
use super::{COLOR_FORMAT, DEPTH_FORMAT};
use super::feedback::FeedbackSlot;

pub(super) struct DrawSlot {
    pub(super) buffer: wgpu::Buffer,
    pub(super) bind_group: wgpu::BindGroup,
}

impl DrawSlot {
    pub(super) fn new(gpu: &GpuContext, layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<ModelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }
}

pub struct TileStage {
    lit_pipeline: wgpu::RenderPipeline,
    flow: FlowPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    scene: Rc<RefCell<TileScene>>,
    sharp: Rc<FeedbackSlot>,
    soft: Rc<FeedbackSlot>,
    bodies: HashMap<hecs::Entity, DrawSlot>,
    faces: HashMap<hecs::Entity, (DrawSlot, FlowMaterial)>,
    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
}

impl TileStage {
    pub fn new(
        gpu: &GpuContext,
        layouts: &SurfaceLayouts,
        scene: Rc<RefCell<TileScene>>,
        sharp: Rc<FeedbackSlot>,
        soft: Rc<FeedbackSlot>,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        let device = &gpu.device;

        let lit_source = compose(SURFACE_TEMPLATE, &[])?;
        let lit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lit Surface Shader"),
            source: wgpu::ShaderSource::Wgsl(lit_source.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lit Pipeline Layout"),
            bind_group_layouts: &[&layouts.camera, &layouts.model],
            push_constant_ranges: &[],
        });

        let lit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Lit Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &lit_shader,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &lit_shader,
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
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let flow = FlowPipeline::new(gpu, layouts, COLOR_FORMAT, DEPTH_FORMAT)?;

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Deck Camera Uniforms"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Deck Camera Bind Group"),
            layout: &layouts.camera,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let mut bodies = HashMap::new();
        let mut faces = HashMap::new();
        {
            let scene_ref = scene.borrow();
            for (entity, _) in scene_ref.world.query::<&TileBody>().iter() {
                bodies.insert(entity, DrawSlot::new(gpu, &layouts.model, "Tile Body Uniforms"));
            }
            for (entity, face) in scene_ref.world.query::<&FlowFace>().iter() {
                let slot = DrawSlot::new(gpu, &layouts.model, "Tile Face Uniforms");
                let material = FlowMaterial::new(gpu, "Tile Face Flow Uniforms", face.params)?;
                faces.insert(entity, (slot, material));
            }
        }

        let depth_view = create_depth(gpu, width, height);

        Ok(Self {
            lit_pipeline,
            flow,
            camera_buffer,
            camera_bind_group,
            scene,
            sharp,
            soft,
            bodies,
            faces,
            depth_view,
            depth_size: (width, height),
        })
    }
}

fn create_depth(gpu: &GpuContext, width: u32, height: u32) -> wgpu::TextureView {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Deck Depth"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl RenderStage for TileStage {
    fn name(&self) -> &'static str {
        "tiles"
    }

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        if self.depth_size != (width, height) {
            self.depth_view = create_depth(gpu, width, height);
            self.depth_size = (width, height);
        }
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext,
        _input: &RenderTarget,
        output: &wgpu::TextureView,
    ) -> Result<(), PipelineError> {
        let scene = self.scene.borrow();
        let (width, height) = self.depth_size;

        let view = scene.camera.view_matrix();
        let proj = scene.camera.projection_matrix(width as f32, height as f32);
        let light_dir = glam::Vec3::from_array(scene.tuning.light_direction).normalize_or_zero();
        let camera_uniforms = CameraUniforms {
            view_proj: (proj * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            camera_pos: scene.camera.position.to_array(),
            time: ctx.time,
            light_dir: light_dir.to_array(),
            light_intensity: scene.tuning.light_intensity,
            ambient: [scene.tuning.ambient_intensity; 3],
            _pad: 0.0,
        };
        ctx.gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[camera_uniforms]),
        );

        for (entity, (body, pose)) in scene.world.query::<(&TileBody, &TilePose)>().iter() {
            let Some(slot) = self.bodies.get(&entity) else {
                continue;
            };
            let model = TileScene::body_matrix(pose.position);
            let uniforms = ModelUniforms {
                model: model.to_cols_array_2d(),
                normal_matrix: model.inverse().transpose().to_cols_array_2d(),
                color: body.color,
                material: [body.roughness, body.metalness, 0.0, 0.0],
            };
            ctx.gpu
                .queue
                .write_buffer(&slot.buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }

        for (entity, (_, pose)) in scene.world.query::<(&FlowFace, &TilePose)>().iter() {
            let Some((slot, _)) = self.faces.get(&entity) else {
                continue;
            };
            let model = TileScene::face_matrix(pose.position);
            let uniforms = ModelUniforms {
                model: model.to_cols_array_2d(),
                normal_matrix: model.inverse().transpose().to_cols_array_2d(),
                color: [1.0, 1.0, 1.0, 1.0],
                material: [0.2, 0.9, 0.0, 0.0],
            };
            ctx.gpu
                .queue
                .write_buffer(&slot.buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }

        let sharp_view = self.sharp.front_view();
        let soft_view = self.soft.front_view();

        let bg = scene.tuning.background;
        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Deck Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: bg[0] as f64,
                        g: bg[1] as f64,
                        b: bg[2] as f64,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.lit_pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        for (entity, body) in scene.world.query::<&TileBody>().iter() {
            let Some(slot) = self.bodies.get(&entity) else {
                continue;
            };
            let mesh = scene.mesh(body.mesh);
            pass.set_bind_group(1, &slot.bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        pass.set_pipeline(self.flow.pipeline());
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        for (entity, face) in scene.world.query::<&FlowFace>().iter() {
            let Some((slot, material)) = self.faces.get(&entity) else {
                continue;
            };
            let feedback =
                material.bind_group(ctx.gpu, &self.flow, Some(&sharp_view), Some(&soft_view));
            let mesh = scene.mesh(face.mesh);
            pass.set_bind_group(1, &slot.bind_group, &[]);
            pass.set_bind_group(2, &feedback, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        Ok(())
    }
}
