//! # Flowdeck
//!
//! A feedback-texture render pipeline: a 3x3 deck of tiles whose faces
//! replay the previous frame of an offscreen ornament field.
//!
//! Each frame a field of drifting octahedra renders offscreen and is saved
//! twice, once sharp and once gaussian-blurred. Every tile face then samples
//! its own ninth of those saved copies — the sharp one near the tile center,
//! crossfading to the blurred one toward the edges — so the deck shows the
//! field one frame behind itself, assembled like a shattered mirror. A flip
//! choreography spreads the tiles apart on spring curves and folds them back
//! on a timer, and a morphological antialias pass resolves the result to the
//! window surface.
//!
//! [`run`] opens a window and drives the whole loop from a [`Settings`]
//! value. The pieces underneath are public for embedding: [`TileScene`]
//! holds the deck, [`Composer`] owns the render chain, [`FlipChoreography`]
//! the motion, and [`compose`] splices extra shader stages into the lit
//! surface template for any material built on the shared camera/model bind
//! group contract.

mod app;
mod camera;
mod config;
mod error;
mod flip;
mod gpu;
mod material;
mod mesh;
mod pass;
mod scene;
mod texture;

pub use app::run;
pub use camera::{Camera, Projection};
pub use config::{AaTuning, FlowTuning, SceneTuning, Settings};
pub use error::PipelineError;
pub use flip::{FlipChoreography, FlipState, FlipTimings};
pub use gpu::GpuContext;
pub use material::{
    BundleLayout, CameraUniforms, ComposeError, FlowMaterial, FlowParams, FlowPipeline,
    InjectionPoint, ModelUniforms, SURFACE_TEMPLATE, ShaderStage, SurfaceLayouts, UniformBundle,
    compose,
};
pub use mesh::{Mesh, Transform, Vertex3d};
pub use pass::{
    COLOR_FORMAT, Composer, DEPTH_FORMAT, FeedbackSlot, FrameContext, FrameStatus, PASS_ORDER,
    RenderStage, RenderTarget,
};
pub use scene::{FlowFace, MeshId, TILE_COUNT, TileBody, TilePose, TileScene, TileSlot};
pub use texture::Texture;

// Math and ECS types that appear in public signatures.
pub use glam::{Mat4, Vec2, Vec3, Vec4};
pub use hecs::{Entity, World};
