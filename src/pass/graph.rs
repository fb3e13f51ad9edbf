//! The composer: owns the double-buffered chain targets and runs every stage
//! in a fixed order, ending on the surface.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Settings;
use crate::error::PipelineError;
use crate::gpu::GpuContext;
use crate::material::SurfaceLayouts;
use crate::scene::TileScene;

use super::COLOR_FORMAT;
use super::antialias::AntialiasStage;
use super::blur::BlurStage;
use super::feedback::{FeedbackSlot, SaveStage};
use super::node::RenderStage;
use super::normal::NormalStage;
use super::ornaments::OrnamentStage;
use super::ping_pong::PingPong;
use super::target::{FrameContext, RenderTarget};
use super::tiles::TileStage;

/// Stage order, one name per chain entry. The drifting ornament field renders
/// first and is saved twice — once sharp, once blurred — before the deck
/// draws over it and samples both copies from the previous frame.
pub const PASS_ORDER: [&str; 7] = [
    "ornaments",
    "save-sharp",
    "blur",
    "save-blur",
    "tiles",
    "normals",
    "antialias",
];

/// What [`Composer::render`] did with the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A stage was still loading its resources; nothing was drawn.
    Deferred,
    /// The frame ran the whole chain and reached the screen.
    Presented,
}

/// The (read, write) chain target index each stage sees, given which stages
/// write color. Mirrors what [`Composer::render`] does with its ping-pong.
pub fn chain_indices(writes: &[bool]) -> Vec<(usize, usize)> {
    let mut flip = PingPong::new();
    writes
        .iter()
        .map(|&writes_color| {
            let pair = (flip.read_index(), flip.write_index());
            if writes_color {
                flip.swap();
            }
            pair
        })
        .collect()
}

pub struct Composer {
    targets: [RenderTarget; 2],
    stages: Vec<Box<dyn RenderStage>>,
    sharp: Rc<FeedbackSlot>,
    soft: Rc<FeedbackSlot>,
}

impl Composer {
    pub fn new(
        gpu: &GpuContext,
        settings: &Settings,
        scene: Rc<RefCell<TileScene>>,
    ) -> Result<Self, PipelineError> {
        let (width, height) = (gpu.width(), gpu.height());
        let layouts = SurfaceLayouts::new(gpu);

        let targets = [
            RenderTarget::new(gpu, "Chain Target A", width, height, COLOR_FORMAT)?,
            RenderTarget::new(gpu, "Chain Target B", width, height, COLOR_FORMAT)?,
        ];
        let sharp = FeedbackSlot::new(gpu, "Sharp History", width, height)?;
        let soft = FeedbackSlot::new(gpu, "Soft History", width, height)?;
        let geometry = Rc::new(RefCell::new(RenderTarget::new(
            gpu,
            "Geometry Target",
            width,
            height,
            COLOR_FORMAT,
        )?));

        let stages: Vec<Box<dyn RenderStage>> = vec![
            Box::new(OrnamentStage::new(
                gpu,
                &layouts,
                COLOR_FORMAT,
                width,
                height,
            )?),
            Box::new(SaveStage::new("save-sharp", sharp.clone())),
            Box::new(BlurStage::new(gpu, width, height)?),
            Box::new(SaveStage::new("save-blur", soft.clone())),
            Box::new(TileStage::new(
                gpu,
                &layouts,
                scene.clone(),
                sharp.clone(),
                soft.clone(),
                width,
                height,
            )?),
            Box::new(NormalStage::new(
                gpu,
                &layouts,
                scene,
                geometry.clone(),
                width,
                height,
            )?),
            Box::new(AntialiasStage::new(
                gpu,
                &settings.antialias,
                geometry,
                gpu.config.format,
                width,
                height,
            )?),
        ];
        debug_assert!(
            stages
                .iter()
                .zip(PASS_ORDER)
                .all(|(stage, name)| stage.name() == name)
        );

        Ok(Self {
            targets,
            stages,
            sharp,
            soft,
        })
    }

    pub fn pass_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|stage| stage.name())
    }

    /// The slot holding the unblurred ornament capture, for binding into
    /// additional flow materials.
    pub fn feedback_sharp(&self) -> Rc<FeedbackSlot> {
        self.sharp.clone()
    }

    /// The slot holding the half-resolution blurred capture.
    pub fn feedback_blur(&self) -> Rc<FeedbackSlot> {
        self.soft.clone()
    }

    /// Runs one frame through the chain.
    ///
    /// Returns [`FrameStatus::Deferred`] without touching the GPU when any
    /// stage is still loading; the feedback slots keep their front copies, so
    /// the next presented frame picks up the loop where it left off.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        time: f32,
        dt: f32,
    ) -> Result<FrameStatus, PipelineError> {
        for stage in &mut self.stages {
            stage.poll(gpu);
        }
        if let Some(stage) = self.stages.iter().find(|stage| !stage.is_ready()) {
            tracing::debug!(stage = stage.name(), "deferring frame");
            return Ok(FrameStatus::Deferred);
        }

        let frame = gpu.surface.get_current_texture()?;
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Composer Encoder"),
            });

        let mut flip = PingPong::new();
        let last = self.stages.len() - 1;
        {
            let mut ctx = FrameContext {
                gpu,
                encoder: &mut encoder,
                time,
                dt,
            };
            for (i, stage) in self.stages.iter_mut().enumerate() {
                let input = &self.targets[flip.read_index()];
                let output = if i == last {
                    &surface_view
                } else {
                    &self.targets[flip.write_index()].view
                };
                stage.execute(&mut ctx, input, output)?;
                if stage.writes_color() {
                    flip.swap();
                }
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        // Promote this frame's saves; next frame samples them.
        self.sharp.swap();
        self.soft.swap();

        Ok(FrameStatus::Presented)
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
        for target in &mut self.targets {
            target.resize(gpu, width, height)?;
        }
        for stage in &mut self.stages {
            stage.resize(gpu, width, height)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // writes_color per stage, in PASS_ORDER.
    fn chain_writes() -> Vec<bool> {
        vec![true, false, true, false, true, false, false]
    }

    #[test]
    fn the_chain_has_a_fixed_order() {
        assert_eq!(
            PASS_ORDER,
            [
                "ornaments",
                "save-sharp",
                "blur",
                "save-blur",
                "tiles",
                "normals",
                "antialias"
            ]
        );
    }

    #[test]
    fn saves_and_readers_see_the_image_they_expect() {
        let idx = chain_indices(&chain_writes());
        // save-sharp copies the ornament image.
        assert_eq!(idx[1].0, idx[0].1);
        // blur reads the same image and renders into the other half.
        assert_eq!(idx[2].0, idx[0].1);
        // save-blur copies the blurred image.
        assert_eq!(idx[3].0, idx[2].1);
        // the edge detector reads the deck image, not the blur.
        assert_eq!(idx[6].0, idx[4].1);
    }

    #[test]
    fn writers_never_render_into_their_own_input() {
        let writes = chain_writes();
        let idx = chain_indices(&writes);
        for (i, &w) in writes.iter().enumerate() {
            if w {
                assert_ne!(idx[i].0, idx[i].1, "stage {i} reads the target it writes");
            }
        }
    }

    #[test]
    fn non_writing_stages_leave_the_chain_in_place() {
        let writes = chain_writes();
        let idx = chain_indices(&writes);
        for i in 0..writes.len() - 1 {
            if !writes[i] {
                assert_eq!(
                    idx[i + 1].0,
                    idx[i].0,
                    "stage {i} does not write color but moved the chain"
                );
            }
        }
    }
}
