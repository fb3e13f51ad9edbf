//! Cameras for the main scene and the offscreen feedback scene.

use glam::{Mat4, Vec3};

/// Projection mode.
///
/// The tile deck is viewed through a zoomed orthographic camera; the ornament
/// field uses an ordinary perspective camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in radians.
    Perspective { fov_y: f32 },
    /// Physical pixels per world unit.
    Orthographic { zoom: f32 },
}

/// A look-at camera with wgpu-style (0..1 depth) projection matrices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Orthographic camera at `position`, facing straight down −Z.
    pub fn orthographic(position: Vec3, zoom: f32) -> Self {
        Self {
            position,
            target: position + Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Orthographic { zoom },
            near: 0.1,
            far: 100.0,
        }
    }

    /// Perspective camera at `position`, facing straight down −Z.
    pub fn perspective(position: Vec3, fov_y: f32) -> Self {
        Self {
            position,
            target: position + Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Perspective { fov_y },
            near: 0.1,
            far: 100.0,
        }
    }

    /// Aim the camera at a target point.
    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection matrix for a viewport of `width` x `height` physical pixels.
    pub fn projection_matrix(&self, width: f32, height: f32) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y } => {
                Mat4::perspective_rh(fov_y, width / height, self.near, self.far)
            }
            Projection::Orthographic { zoom } => {
                let half_w = width / (2.0 * zoom);
                let half_h = height / (2.0 * zoom);
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_matrix_moves_camera_position_to_origin() {
        let cam = Camera::orthographic(Vec3::new(-4.0, 4.0, 10.0), 60.0);
        let at_origin = cam.view_matrix().transform_point3(cam.position);
        assert!(
            at_origin.length() < 1e-5,
            "camera position should map to the view-space origin, got {at_origin:?}"
        );
    }

    #[test]
    fn orthographic_zoom_sets_pixels_per_unit() {
        let cam = Camera::orthographic(Vec3::ZERO, 100.0);
        let proj = cam.projection_matrix(800.0, 600.0);
        // 800 px wide at 100 px/unit shows 8 world units; x = 4 is the right edge.
        let right_edge = proj.project_point3(Vec3::new(4.0, 0.0, -1.0));
        assert!(
            (right_edge.x - 1.0).abs() < 1e-5,
            "half-width in world units should project to NDC x = 1, got {}",
            right_edge.x
        );
    }

    #[test]
    fn projection_depth_range_is_zero_to_one() {
        let cam = Camera::perspective(Vec3::ZERO, 50f32.to_radians());
        let proj = cam.projection_matrix(640.0, 480.0);
        let near = proj.project_point3(Vec3::new(0.0, 0.0, -cam.near));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, -cam.far));
        assert!(near.z.abs() < 1e-5, "near plane should hit depth 0, got {}", near.z);
        assert!((far.z - 1.0).abs() < 1e-4, "far plane should hit depth 1, got {}", far.z);
    }

    #[test]
    fn looking_at_overrides_default_forward() {
        let cam = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 1.0).looking_at(Vec3::X);
        let view = cam.view_matrix();
        let target_view = view.transform_point3(Vec3::X);
        assert!(target_view.x.abs() < 1e-5 && target_view.y.abs() < 1e-5);
        assert!(target_view.z < 0.0, "target should sit on the −Z view axis");
    }
}
