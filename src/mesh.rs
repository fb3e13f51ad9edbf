//! Mesh primitives and spatial transforms.
//!
//! - [`Vertex3d`] — the vertex format shared by every pipeline (position,
//!   normal, uv)
//! - [`Mesh`] — GPU-resident geometry with vertex and index buffers
//! - [`Transform`] — position, rotation, and scale with an SRT matrix
//!
//! All primitives use counter-clockwise winding for front faces.

use crate::gpu::GpuContext;
use glam::{Mat4, Vec3};

/// A vertex for 3D mesh rendering.
///
/// `#[repr(C)]` plus the bytemuck derives make the struct castable straight
/// into a vertex buffer; the matching GPU layout is [`Vertex3d::LAYOUT`].
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    /// Surface normal; normalized for correct lighting.
    pub normal: [f32; 3],
    /// Texture coordinates, typically in [0, 1].
    pub uv: [f32; 2],
}

impl Vertex3d {
    /// Vertex buffer layout: position (loc 0), normal (loc 1), uv (loc 2),
    /// 32 bytes per vertex, stepped per-vertex.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// GPU-resident geometry. Immutable after creation.
#[derive(Debug)]
pub struct Mesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
}

impl Mesh {
    /// Uploads raw vertex and index data to GPU buffers.
    pub fn new(gpu: &GpuContext, vertices: &[Vertex3d], indices: &[u32]) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    /// Unit cube centered at the origin, four vertices per face so each face
    /// gets a flat normal and a full [0, 1] UV range. Squash it with a
    /// transform scale to get the thin tile body.
    pub fn cube(gpu: &GpuContext) -> Self {
        let (vertices, indices) = box_vertices();
        Self::new(gpu, &vertices, &indices)
    }

    /// Unit quad in the XY plane facing +Z, centered at the origin.
    ///
    /// This is the tile's front face carrying the flow material; its UVs span
    /// [0, 1] with (0, 0) at the bottom-left corner.
    pub fn quad(gpu: &GpuContext) -> Self {
        let (vertices, indices) = quad_vertices();
        Self::new(gpu, &vertices, &indices)
    }

    /// Octahedron subdivided toward a sphere, smooth normals.
    ///
    /// `detail` levels of midpoint subdivision (each level splits every
    /// triangle into four); vertices are re-projected onto the sphere of the
    /// given radius after each split.
    pub fn octahedron(gpu: &GpuContext, radius: f32, detail: u32) -> Self {
        let (vertices, indices) = octahedron_vertices(radius, detail);
        Self::new(gpu, &vertices, &indices)
    }
}

pub(crate) fn box_vertices() -> (Vec<Vertex3d>, Vec<u32>) {
    // One (normal, in-plane u axis) pair per face; v = n x u keeps the
    // quad corners counter-clockwise from outside.
    let faces = [
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
        (Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::Z),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u) in faces {
        let v = n.cross(u);
        let center = n * 0.5;
        let base = vertices.len() as u32;
        let corners = [
            (center - u * 0.5 - v * 0.5, [0.0, 0.0]),
            (center + u * 0.5 - v * 0.5, [1.0, 0.0]),
            (center + u * 0.5 + v * 0.5, [1.0, 1.0]),
            (center - u * 0.5 + v * 0.5, [0.0, 1.0]),
        ];
        for (p, uv) in corners {
            vertices.push(Vertex3d::new(p.to_array(), n.to_array(), uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (vertices, indices)
}

pub(crate) fn quad_vertices() -> (Vec<Vertex3d>, Vec<u32>) {
    // v runs downward to match texture space, so a sampled image shows
    // upright on the quad.
    let n = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex3d::new([-0.5, -0.5, 0.0], n, [0.0, 1.0]),
        Vertex3d::new([0.5, -0.5, 0.0], n, [1.0, 1.0]),
        Vertex3d::new([0.5, 0.5, 0.0], n, [1.0, 0.0]),
        Vertex3d::new([-0.5, 0.5, 0.0], n, [0.0, 0.0]),
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];
    (vertices, indices)
}

pub(crate) fn octahedron_vertices(radius: f32, detail: u32) -> (Vec<Vertex3d>, Vec<u32>) {
    // Eight faces, one per octant; swap two corners where the octant parity
    // would flip the winding inward.
    let mut triangles = Vec::new();
    for sx in [1.0f32, -1.0] {
        for sy in [1.0f32, -1.0] {
            for sz in [1.0f32, -1.0] {
                let (a, b, c) = (Vec3::X * sx, Vec3::Y * sy, Vec3::Z * sz);
                if sx * sy * sz > 0.0 {
                    subdivide(a, b, c, detail, &mut triangles);
                } else {
                    subdivide(a, c, b, detail, &mut triangles);
                }
            }
        }
    }

    let mut vertices = Vec::with_capacity(triangles.len() * 3);
    for tri in &triangles {
        for p in tri {
            let n = p.normalize();
            let uv = [
                0.5 + n.z.atan2(n.x) / std::f32::consts::TAU,
                0.5 - n.y.clamp(-1.0, 1.0).asin() / std::f32::consts::PI,
            ];
            vertices.push(Vertex3d::new((n * radius).to_array(), n.to_array(), uv));
        }
    }
    let indices = (0..vertices.len() as u32).collect();
    (vertices, indices)
}

fn subdivide(a: Vec3, b: Vec3, c: Vec3, depth: u32, out: &mut Vec<[Vec3; 3]>) {
    if depth == 0 {
        out.push([a, b, c]);
        return;
    }
    let ab = ((a + b) * 0.5).normalize();
    let bc = ((b + c) * 0.5).normalize();
    let ca = ((c + a) * 0.5).normalize();
    subdivide(a, ab, ca, depth - 1, out);
    subdivide(ab, b, bc, depth - 1, out);
    subdivide(ca, bc, c, depth - 1, out);
    subdivide(ab, bc, ca, depth - 1, out);
}

/// Position, rotation, and scale combined in SRT order by [`Transform::matrix`].
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: glam::Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: glam::Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: glam::Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winding_matches_normal(verts: &[Vertex3d], indices: &[u32]) -> bool {
        indices.chunks(3).all(|tri| {
            let a = Vec3::from_array(verts[tri[0] as usize].position);
            let b = Vec3::from_array(verts[tri[1] as usize].position);
            let c = Vec3::from_array(verts[tri[2] as usize].position);
            let face_normal = (b - a).cross(c - a);
            let stored = Vec3::from_array(verts[tri[0] as usize].normal);
            face_normal.dot(stored) > 0.0
        })
    }

    #[test]
    fn box_has_24_vertices_and_12_triangles() {
        let (verts, indices) = box_vertices();
        assert_eq!(verts.len(), 24);
        assert_eq!(indices.len(), 36);
    }

    #[test]
    fn box_faces_wind_counter_clockwise() {
        let (verts, indices) = box_vertices();
        assert!(winding_matches_normal(&verts, &indices));
    }

    #[test]
    fn box_normals_are_axis_aligned_units() {
        let (verts, _) = box_vertices();
        for v in &verts {
            let n = Vec3::from_array(v.normal);
            assert!((n.length() - 1.0).abs() < 1e-6);
            let nonzero = n.to_array().iter().filter(|c| c.abs() > 1e-6).count();
            assert_eq!(nonzero, 1, "box normal should be axis-aligned, got {n:?}");
        }
    }

    #[test]
    fn quad_faces_positive_z_with_full_uv_range() {
        let (verts, indices) = quad_vertices();
        assert_eq!(verts.len(), 4);
        assert!(winding_matches_normal(&verts, &indices));
        let us: Vec<f32> = verts.iter().map(|v| v.uv[0]).collect();
        let vs: Vec<f32> = verts.iter().map(|v| v.uv[1]).collect();
        assert!(us.contains(&0.0) && us.contains(&1.0));
        assert!(vs.contains(&0.0) && vs.contains(&1.0));
    }

    #[test]
    fn quad_uv_origin_sits_at_the_top_left() {
        let (verts, _) = quad_vertices();
        let top_left = verts
            .iter()
            .find(|v| v.position[0] < 0.0 && v.position[1] > 0.0)
            .unwrap();
        assert_eq!(top_left.uv, [0.0, 0.0], "texture space runs v-down");
    }

    #[test]
    fn octahedron_detail_multiplies_triangles_by_four() {
        let (v0, _) = octahedron_vertices(1.0, 0);
        let (v2, _) = octahedron_vertices(1.0, 2);
        assert_eq!(v0.len(), 8 * 3);
        assert_eq!(v2.len(), 8 * 16 * 3);
    }

    #[test]
    fn octahedron_vertices_sit_on_the_sphere() {
        let radius = 0.02;
        let (verts, _) = octahedron_vertices(radius, 2);
        for v in &verts {
            let len = Vec3::from_array(v.position).length();
            assert!(
                (len - radius).abs() < 1e-6,
                "vertex should lie at radius {radius}, got {len}"
            );
        }
    }

    #[test]
    fn octahedron_normals_point_outward() {
        let (verts, indices) = octahedron_vertices(1.0, 1);
        assert!(winding_matches_normal(&verts, &indices));
        for v in &verts {
            let p = Vec3::from_array(v.position);
            let n = Vec3::from_array(v.normal);
            assert!(p.dot(n) > 0.0, "normal should leave the surface");
        }
    }

    #[test]
    fn transform_matrix_applies_scale_then_rotate_then_translate() {
        let t = Transform::new()
            .position(Vec3::new(1.0, 2.0, 3.0))
            .rotation(glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
            .uniform_scale(2.0);
        // X axis scaled to 2, rotated onto +Y, then offset.
        let p = t.matrix().transform_point3(Vec3::X);
        let expected = Vec3::new(1.0, 4.0, 3.0);
        assert!(
            (p - expected).length() < 1e-5,
            "expected {expected:?}, got {p:?}"
        );
    }
}
