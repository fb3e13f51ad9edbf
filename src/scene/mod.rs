//! The deck scene: a 3x3 grid of tiles, each a squashed dark cube with a
//! flow-material face, plus the camera and light rig that frame it.
//!
//! The scene is plain data. Entities live in a [`hecs::World`]; the render
//! stages query it every frame and the app drives the poses from the flip
//! choreography. Nothing here records GPU commands.

use glam::{Mat4, Vec3};
use hecs::World;

use crate::camera::Camera;
use crate::config::{SceneTuning, Settings};
use crate::flip::FlipChoreography;
use crate::gpu::GpuContext;
use crate::material::{FLOW_GRID, FlowParams};
use crate::mesh::{Mesh, Transform};

/// Tiles in the deck.
pub const TILE_COUNT: usize = FLOW_GRID * FLOW_GRID;

/// How far the face quad floats in front of the body's front plane.
const FACE_LIFT: f32 = 0.021;

/// Body thickness as a scale on the unit cube's z extent.
const BODY_DEPTH: f32 = 0.04;

/// `#303030` converted to linear, the body's base color.
const BODY_COLOR: [f32; 4] = [0.0296, 0.0296, 0.0296, 1.0];

/// Index into [`TileScene`]'s mesh list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshId(pub usize);

/// The squashed cube forming a tile's body.
pub struct TileBody {
    pub mesh: MeshId,
    pub color: [f32; 4],
    pub roughness: f32,
    pub metalness: f32,
}

/// The front face quad carrying the flow material.
pub struct FlowFace {
    pub mesh: MeshId,
    pub params: FlowParams,
}

/// Which deck slot a tile occupies, and where it rests when fully spread.
pub struct TileSlot {
    pub index: usize,
    pub home: Vec3,
}

/// Current deck-local position, written by [`TileScene::apply_phases`].
pub struct TilePose {
    pub position: Vec3,
}

/// Deck-local rest position of tile `index`: columns left to right, rows top
/// to bottom, with a per-tile depth picked from a hash so the stack never
/// z-fights.
pub fn tile_home(index: usize) -> Vec3 {
    Vec3::new(
        (index % FLOW_GRID) as f32 - 1.0,
        1.0 - (index / FLOW_GRID) as f32,
        rest_depth(index),
    )
}

/// Deterministic per-tile depth in [-0.125, 0.125).
pub fn rest_depth(index: usize) -> f32 {
    let h = ((index as f32 + 1.0) * 12.9898).sin() * 43758.547;
    (h.fract().abs() * 8.0 - 4.0) / 32.0
}

/// Deck-local position for the given animation phases: `spread` scales the
/// tile out from the stack, `raise` lifts it to the shared plane.
pub fn tile_position(home: Vec3, spread: f32, raise: f32) -> Vec3 {
    Vec3::new(
        home.x * spread,
        home.y * spread,
        home.z * (1.0 - raise),
    )
}

/// Deck-to-world transform: doubled in size and tipped back around x.
pub fn deck_matrix() -> Mat4 {
    Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_6) * Mat4::from_scale(Vec3::splat(2.0))
}

pub struct TileScene {
    pub world: World,
    meshes: Vec<Mesh>,
    pub camera: Camera,
    pub tuning: SceneTuning,
}

impl TileScene {
    pub fn new(gpu: &GpuContext, settings: &Settings) -> Self {
        let meshes = vec![Mesh::cube(gpu), Mesh::quad(gpu)];
        let body_mesh = MeshId(0);
        let face_mesh = MeshId(1);

        let mut world = World::new();
        for index in 0..TILE_COUNT {
            let home = tile_home(index);
            world.spawn((
                TileBody {
                    mesh: body_mesh,
                    color: BODY_COLOR,
                    roughness: 0.5,
                    metalness: 0.0,
                },
                FlowFace {
                    mesh: face_mesh,
                    params: FlowParams::tile(index)
                        .with_blend(settings.flow.blend_lo, settings.flow.blend_hi),
                },
                TileSlot { index, home },
                TilePose {
                    position: tile_position(home, 0.0, 0.0),
                },
            ));
        }

        let camera = Camera::orthographic(Vec3::new(-4.0, 4.0, 10.0), settings.effective_zoom());

        Self {
            world,
            meshes,
            camera,
            tuning: settings.scene,
        }
    }

    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0]
    }

    /// Moves every tile to the pose the choreography currently asks for.
    pub fn apply_phases(&mut self, flip: &FlipChoreography) {
        for (_, (slot, pose)) in self.world.query_mut::<(&TileSlot, &mut TilePose)>() {
            pose.position = tile_position(slot.home, flip.spread(slot.index), flip.raise());
        }
    }

    /// World transform of a tile body at `position`.
    pub fn body_matrix(position: Vec3) -> Mat4 {
        let local = Transform::from_position(position).scale(Vec3::new(1.0, 1.0, BODY_DEPTH));
        deck_matrix() * local.matrix()
    }

    /// World transform of the face quad riding on that body.
    pub fn face_matrix(position: Vec3) -> Mat4 {
        let local = Transform::from_position(position + Vec3::new(0.0, 0.0, FACE_LIFT));
        deck_matrix() * local.matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn homes_span_the_full_grid() {
        let mut seen = std::collections::HashSet::new();
        for index in 0..TILE_COUNT {
            let home = tile_home(index);
            assert!((-1.0..=1.0).contains(&home.x));
            assert!((-1.0..=1.0).contains(&home.y));
            seen.insert((home.x as i32, home.y as i32));
        }
        assert_eq!(seen.len(), TILE_COUNT, "two tiles share a grid cell");
    }

    #[test]
    fn rest_depths_stay_inside_the_band() {
        for index in 0..100 {
            let z = rest_depth(index);
            assert!(
                (-0.125..0.125).contains(&z),
                "depth {z} out of band at index {index}"
            );
        }
    }

    #[test]
    fn rest_depths_vary_across_the_deck() {
        let depths: std::collections::BTreeSet<i64> = (0..TILE_COUNT)
            .map(|i| (rest_depth(i) * 1e6) as i64)
            .collect();
        assert!(depths.len() > 3, "hash degenerated: {depths:?}");
    }

    #[test]
    fn closed_deck_stacks_at_the_origin_plane() {
        for index in 0..TILE_COUNT {
            let p = tile_position(tile_home(index), 0.0, 1.0);
            assert!(approx(p, Vec3::ZERO), "tile {index} at {p}");
        }
    }

    #[test]
    fn open_deck_restores_every_home() {
        for index in 0..TILE_COUNT {
            let home = tile_home(index);
            assert!(approx(tile_position(home, 1.0, 0.0), home));
        }
    }

    #[test]
    fn raise_touches_only_the_depth_axis() {
        let home = tile_home(4);
        let rested = tile_position(home, 0.7, 0.0);
        let raised = tile_position(home, 0.7, 1.0);
        assert_eq!(rested.x, raised.x);
        assert_eq!(rested.y, raised.y);
        assert_eq!(raised.z, 0.0);
    }

    #[test]
    fn deck_transform_doubles_and_tips_back() {
        let m = deck_matrix();
        let x = m.transform_point3(Vec3::X);
        assert!(approx(x, Vec3::new(2.0, 0.0, 0.0)));
        let y = m.transform_point3(Vec3::Y);
        // Tipping -30 degrees around x leans the top row away from the camera.
        assert!(approx(y, Vec3::new(0.0, 1.732_050_8, -1.0)), "got {y}");
    }

    #[test]
    fn poses_follow_the_choreography() {
        let mut flip = FlipChoreography::new(TILE_COUNT);
        for _ in 0..200 {
            flip.advance(0.016);
        }
        // 3.2 seconds in the deck is holding: fully spread, fully raised.
        for index in 0..TILE_COUNT {
            let home = tile_home(index);
            let p = tile_position(home, flip.spread(index), flip.raise());
            assert!((p.x - home.x).abs() < 0.01, "tile {index} x: {p}");
            assert!((p.y - home.y).abs() < 0.01, "tile {index} y: {p}");
            assert!(p.z.abs() < 0.01, "tile {index} z: {p}");
        }
    }
}
