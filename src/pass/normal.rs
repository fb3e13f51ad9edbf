//! View-space normals and linearized depth for the whole deck, rendered into
//! a side target the edge detector reads for depth predication.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::PipelineError;
use crate::gpu::GpuContext;
use crate::material::{CameraUniforms, ModelUniforms, SurfaceLayouts};
use crate::mesh::Vertex3d;
use crate::scene::{FlowFace, TileBody, TilePose, TileScene};

use super::node::RenderStage;
use super::target::{FrameContext, RenderTarget};
use super::tiles::DrawSlot;
use super::{COLOR_FORMAT, DEPTH_FORMAT};

pub struct NormalStage {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    scene: Rc<RefCell<TileScene>>,
    // A tile entity carries both a body and a face; each needs its own slot.
    bodies: HashMap<hecs::Entity, DrawSlot>,
    faces: HashMap<hecs::Entity, DrawSlot>,
    target: Rc<RefCell<RenderTarget>>,
    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
}

impl NormalStage {
    pub fn new(
        gpu: &GpuContext,
        layouts: &SurfaceLayouts,
        scene: Rc<RefCell<TileScene>>,
        target: Rc<RefCell<RenderTarget>>,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Normal Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/normal.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Normal Pipeline Layout"),
            bind_group_layouts: &[&layouts.camera, &layouts.model],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Normal Pipeline"),
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

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Normal Camera Uniforms"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Normal Camera Bind Group"),
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
                bodies.insert(entity, DrawSlot::new(gpu, &layouts.model, "Normal Body Uniforms"));
            }
            for (entity, _) in scene_ref.world.query::<&FlowFace>().iter() {
                faces.insert(entity, DrawSlot::new(gpu, &layouts.model, "Normal Face Uniforms"));
            }
        }

        let depth_view = create_depth(gpu, width, height);

        Ok(Self {
            pipeline,
            camera_buffer,
            camera_bind_group,
            scene,
            bodies,
            faces,
            target,
            depth_view,
            depth_size: (width, height),
        })
    }
}

fn create_depth(gpu: &GpuContext, width: u32, height: u32) -> wgpu::TextureView {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Normal Depth"),
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

impl RenderStage for NormalStage {
    fn name(&self) -> &'static str {
        "normals"
    }

    fn writes_color(&self) -> bool {
        false
    }

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        self.target.borrow_mut().resize(gpu, width, height)?;
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
        _output: &wgpu::TextureView,
    ) -> Result<(), PipelineError> {
        let scene = self.scene.borrow();
        let (width, height) = self.depth_size;

        let view = scene.camera.view_matrix();
        let proj = scene.camera.projection_matrix(width as f32, height as f32);
        let camera_uniforms = CameraUniforms {
            view_proj: (proj * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            camera_pos: scene.camera.position.to_array(),
            time: ctx.time,
            light_dir: [0.0, 0.0, 1.0],
            light_intensity: 0.0,
            ambient: [0.0; 3],
            _pad: 0.0,
        };
        ctx.gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[camera_uniforms]),
        );

        for (entity, (_, pose)) in scene.world.query::<(&TileBody, &TilePose)>().iter() {
            let Some(slot) = self.bodies.get(&entity) else {
                continue;
            };
            write_model(ctx.gpu, slot, TileScene::body_matrix(pose.position));
        }
        for (entity, (_, pose)) in scene.world.query::<(&FlowFace, &TilePose)>().iter() {
            let Some(slot) = self.faces.get(&entity) else {
                continue;
            };
            write_model(ctx.gpu, slot, TileScene::face_matrix(pose.position));
        }

        let target = self.target.borrow();
        // Flat facing-the-camera normal and far depth where nothing draws, so
        // predication stays quiet over the background.
        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Normal Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.5,
                        g: 0.5,
                        b: 1.0,
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

        pass.set_pipeline(&self.pipeline);
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
        for (entity, face) in scene.world.query::<&FlowFace>().iter() {
            let Some(slot) = self.faces.get(&entity) else {
                continue;
            };
            let mesh = scene.mesh(face.mesh);
            pass.set_bind_group(1, &slot.bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        Ok(())
    }
}

fn write_model(gpu: &GpuContext, slot: &DrawSlot, model: glam::Mat4) {
    let uniforms = ModelUniforms {
        model: model.to_cols_array_2d(),
        normal_matrix: model.inverse().transpose().to_cols_array_2d(),
        color: [1.0, 1.0, 1.0, 1.0],
        material: [0.0; 4],
    };
    gpu.queue
        .write_buffer(&slot.buffer, 0, bytemuck::cast_slice(&[uniforms]));
}
