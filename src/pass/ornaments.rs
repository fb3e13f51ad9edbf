//! The ornament field: the imagery the feedback loop keeps folding in.
//!
//! A 20x20 grid of small unlit octahedra drifts on stacked waves in front of
//! its own perspective camera, far behind the deck. The stage renders them
//! over black into the chain; the save stages then capture this image (sharp
//! and blurred) for next frame's tile faces.

use std::f32::consts::PI;

use glam::{EulerRot, Mat4, Vec3};

use crate::camera::Camera;
use crate::error::PipelineError;
use crate::gpu::GpuContext;
use crate::material::{CameraUniforms, ModelUniforms, SurfaceLayouts};
use crate::mesh::Mesh;

use super::DEPTH_FORMAT;
use super::node::RenderStage;
use super::target::{FrameContext, RenderTarget};

pub const ORNAMENT_ROWS: usize = 20;
pub const ORNAMENT_COLS: usize = 20;

/// Fraction of ornaments blown up to triple size.
const LARGE_CHANCE: f32 = 0.03;

const OCTAHEDRON_RADIUS: f32 = 0.02;
const OCTAHEDRON_DETAIL: u32 = 2;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct OrnamentInstance {
    /// xyz group-local position, w uniform scale.
    pos_scale: [f32; 4],
}

const INSTANCE_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<OrnamentInstance>() as u64,
    step_mode: wgpu::VertexStepMode::Instance,
    attributes: &wgpu::vertex_attr_array![3 => Float32x4],
};

/// Fixed per-ornament data; only the drift position changes frame to frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OrnamentSeed {
    pub grid: (usize, usize),
    pub scale: f32,
}

fn seed_hash(x: usize, y: usize) -> f32 {
    let n = (x as f32 * 127.1 + y as f32 * 311.7).sin() * 43758.547;
    n.fract().abs()
}

/// The full grid, with a deterministic ~3% of ornaments at triple scale.
pub(crate) fn ornament_seeds() -> Vec<OrnamentSeed> {
    let mut seeds = Vec::with_capacity(ORNAMENT_ROWS * ORNAMENT_COLS);
    for y in 0..ORNAMENT_ROWS {
        for x in 0..ORNAMENT_COLS {
            let scale = if seed_hash(x, y) < LARGE_CHANCE { 3.0 } else { 1.0 };
            seeds.push(OrnamentSeed { grid: (x, y), scale });
        }
    }
    seeds
}

/// Group-local position of an ornament at `time`: a fixed xy spot on the
/// grid, depth riding two stacked wave pairs.
pub(crate) fn drift_position(seed: OrnamentSeed, time: f32) -> Vec3 {
    let (x, y) = seed.grid;
    let cx = x as f32 - ORNAMENT_COLS as f32 / 2.0;
    let cy = y as f32 - ORNAMENT_ROWS as f32 / 2.0;
    let nx = cx / ORNAMENT_COLS as f32;
    let ny = cy / ORNAMENT_ROWS as f32;
    let t = time / 4.0;
    let swell = (4.0 * PI * nx + t).cos() + (8.0 * PI * ny + t).sin();
    let ripple = (12.0 * PI * nx + t).cos() + (17.0 * PI * ny + t).sin();
    Vec3::new(cx / 3.0 - 5.0, cy / 3.0 + 7.0, -10.0 + swell + 0.2 * ripple)
}

fn group_matrix() -> Mat4 {
    Mat4::from_euler(EulerRot::XYZ, -PI / 6.0, 0.0, -PI / 6.0)
}

/// Renders the ornament field into the chain over a black clear.
pub struct OrnamentStage {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    group_buffer: wgpu::Buffer,
    group_bind_group: wgpu::BindGroup,
    mesh: Mesh,
    instance_buffer: wgpu::Buffer,
    instances: Vec<OrnamentInstance>,
    seeds: Vec<OrnamentSeed>,
    camera: Camera,
    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
}

impl OrnamentStage {
    pub fn new(
        gpu: &GpuContext,
        layouts: &SurfaceLayouts,
        color_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ornament Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/ornament.wgsl").into()),
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ornament Camera Uniforms"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ornament Camera Bind Group"),
            layout: &layouts.camera,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let group_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ornament Group Uniforms"),
            size: std::mem::size_of::<ModelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let group_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ornament Group Bind Group"),
            layout: &layouts.model,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: group_buffer.as_entire_binding(),
            }],
        });

        // The group transform never changes; upload it once.
        let group = group_matrix();
        let group_uniforms = ModelUniforms {
            model: group.to_cols_array_2d(),
            normal_matrix: group.inverse().transpose().to_cols_array_2d(),
            color: [1.0, 1.0, 1.0, 1.0],
            material: [0.0; 4],
        };
        gpu.queue
            .write_buffer(&group_buffer, 0, bytemuck::cast_slice(&[group_uniforms]));

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ornament Pipeline Layout"),
            bind_group_layouts: &[&layouts.camera, &layouts.model],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Ornament Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[crate::mesh::Vertex3d::LAYOUT, INSTANCE_LAYOUT],
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

        let seeds = ornament_seeds();
        let instances = vec![
            OrnamentInstance {
                pos_scale: [0.0; 4],
            };
            seeds.len()
        ];
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ornament Instances"),
            size: (instances.len() * std::mem::size_of::<OrnamentInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mesh = Mesh::octahedron(gpu, OCTAHEDRON_RADIUS, OCTAHEDRON_DETAIL);
        let camera = Camera::perspective(Vec3::ZERO, 50f32.to_radians());
        let depth_view = create_depth(gpu, width, height);

        Ok(Self {
            pipeline,
            camera_buffer,
            camera_bind_group,
            group_buffer,
            group_bind_group,
            mesh,
            instance_buffer,
            instances,
            seeds,
            camera,
            depth_view,
            depth_size: (width, height),
        })
    }
}

fn create_depth(gpu: &GpuContext, width: u32, height: u32) -> wgpu::TextureView {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Ornament Depth"),
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

impl RenderStage for OrnamentStage {
    fn name(&self) -> &'static str {
        "ornaments"
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
        for (instance, seed) in self.instances.iter_mut().zip(&self.seeds) {
            let p = drift_position(*seed, ctx.time);
            instance.pos_scale = [p.x, p.y, p.z, seed.scale];
        }
        ctx.gpu.queue.write_buffer(
            &self.instance_buffer,
            0,
            bytemuck::cast_slice(&self.instances),
        );

        let (width, height) = self.depth_size;
        let view = self.camera.view_matrix();
        let proj = self.camera.projection_matrix(width as f32, height as f32);
        let uniforms = CameraUniforms {
            view_proj: (proj * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            camera_pos: self.camera.position.to_array(),
            time: ctx.time,
            light_dir: [0.0, 0.0, 1.0],
            light_intensity: 0.0,
            ambient: [0.0; 3],
            _pad: 0.0,
        };
        ctx.gpu
            .queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Ornament Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
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
        pass.set_bind_group(1, &self.group_bind_group, &[]);
        pass.set_vertex_buffer(0, self.mesh.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        pass.set_index_buffer(self.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.mesh.index_count, 0, 0..self.instances.len() as u32);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_grid_is_fully_seeded() {
        let seeds = ornament_seeds();
        assert_eq!(seeds.len(), ORNAMENT_ROWS * ORNAMENT_COLS);
    }

    #[test]
    fn a_few_ornaments_are_large_most_are_not() {
        let seeds = ornament_seeds();
        let large = seeds.iter().filter(|s| s.scale > 1.0).count();
        assert!(large > 0, "no large ornaments at all");
        assert!(
            large < seeds.len() / 10,
            "{large} of {} large, expected a few percent",
            seeds.len()
        );
    }

    #[test]
    fn seeds_are_deterministic() {
        let a = ornament_seeds();
        let b = ornament_seeds();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.scale, y.scale);
            assert_eq!(x.grid, y.grid);
        }
    }

    #[test]
    fn drift_moves_depth_but_not_the_grid_spot() {
        let seed = OrnamentSeed {
            grid: (7, 3),
            scale: 1.0,
        };
        let early = drift_position(seed, 0.0);
        let late = drift_position(seed, 5.0);
        assert_eq!(early.x, late.x);
        assert_eq!(early.y, late.y);
        assert_ne!(early.z, late.z);
    }

    #[test]
    fn drift_depth_stays_near_the_back_plane() {
        for seed in ornament_seeds() {
            for step in 0..30 {
                let z = drift_position(seed, step as f32 * 0.7).z;
                assert!(
                    (-13.0..=-7.0).contains(&z),
                    "ornament {:?} wandered to z = {z}",
                    seed.grid
                );
            }
        }
    }
}
