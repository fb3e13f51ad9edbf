//! The render pipeline: a fixed chain of stages over double-buffered color
//! targets, with persistent feedback slots feeding the previous frame back
//! into the current one.
//!
//! [`Composer`] owns the chain. Stages implement [`RenderStage`] and read
//! from one half of a ping-pong pair while writing the other; save stages
//! copy the chain into a [`FeedbackSlot`] without flipping the pair. The
//! final stage resolves into the surface.

mod antialias;
mod area;
mod blur;
mod feedback;
mod graph;
mod node;
mod normal;
mod ornaments;
mod ping_pong;
mod target;
mod tiles;

pub use antialias::AntialiasStage;
pub use area::{AREA_SIZE, MAX_SEARCH, area_table};
pub use blur::BlurStage;
pub use feedback::{FeedbackSlot, SaveStage};
pub use graph::{Composer, FrameStatus, PASS_ORDER, chain_indices};
pub use node::RenderStage;
pub use normal::NormalStage;
pub use ornaments::OrnamentStage;
pub use ping_pong::PingPong;
pub use target::{FrameContext, RenderTarget};
pub use tiles::TileStage;

/// Format of every intermediate color target. Half-float keeps the feedback
/// loop from posterizing as frames re-enter the pipeline.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Depth attachment format for the scene stages.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
