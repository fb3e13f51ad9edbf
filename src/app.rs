//! Window bring-up and the frame loop.
//!
//! The application starts `Pending` with only its settings; the first
//! `resumed` callback creates the window, the GPU context, the scene, and
//! the composer, then the loop redraws continuously. Resizes are recorded
//! and applied at the top of the next redraw, so a drag that fires dozens
//! of resize events costs one reallocation.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::Settings;
use crate::error::PipelineError;
use crate::flip::FlipChoreography;
use crate::gpu::GpuContext;
use crate::pass::{Composer, FrameStatus};
use crate::scene::{TILE_COUNT, TileScene};

/// Opens the window and runs the frame loop until the window closes.
pub fn run(settings: Settings) {
    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = DeckApp::Pending { settings };
    event_loop.run_app(&mut app).unwrap();
}

enum DeckApp {
    Pending {
        settings: Settings,
    },
    Running {
        window: Arc<Window>,
        gpu: GpuContext,
        scene: Rc<RefCell<TileScene>>,
        flip: FlipChoreography,
        composer: Composer,
        started: Instant,
        last_frame: Instant,
        pending_resize: Option<(u32, u32)>,
    },
}

impl ApplicationHandler for DeckApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let DeckApp::Pending { settings } = self else {
            return;
        };

        let attrs = WindowAttributes::default()
            .with_title(&settings.title)
            .with_inner_size(winit::dpi::LogicalSize::new(settings.width, settings.height));
        let window = Arc::new(event_loop.create_window(attrs).unwrap());
        let gpu = GpuContext::new(window.clone());

        let scene = Rc::new(RefCell::new(TileScene::new(&gpu, settings)));
        let flip = FlipChoreography::new(TILE_COUNT);
        let composer = Composer::new(&gpu, settings, scene.clone())
            .expect("Failed to build the render chain");

        tracing::info!(tiles = TILE_COUNT, "deck ready");

        *self = DeckApp::Running {
            window,
            gpu,
            scene,
            flip,
            composer,
            started: Instant::now(),
            last_frame: Instant::now(),
            pending_resize: None,
        };
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let DeckApp::Running {
            window,
            gpu,
            scene,
            flip,
            composer,
            started,
            last_frame,
            pending_resize,
        } = self
        else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                *pending_resize = Some((size.width, size.height));
            }
            WindowEvent::RedrawRequested => {
                if let Some((width, height)) = pending_resize.take() {
                    // Zero means minimized; keep the old targets until the
                    // window comes back.
                    if width > 0 && height > 0 {
                        gpu.resize(width, height);
                        if let Err(err) = composer.resize(gpu, width, height) {
                            tracing::error!(%err, "resize failed");
                        }
                    }
                }

                let now = Instant::now();
                let time = started.elapsed().as_secs_f32();
                let dt = now.duration_since(*last_frame).as_secs_f32();
                *last_frame = now;

                flip.advance(dt);
                scene.borrow_mut().apply_phases(flip);

                match composer.render(gpu, time, dt) {
                    Ok(FrameStatus::Presented | FrameStatus::Deferred) => {}
                    Err(PipelineError::Surface(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    )) => {
                        tracing::warn!("surface lost, reconfiguring");
                        gpu.reconfigure();
                    }
                    Err(PipelineError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                        tracing::error!("surface out of memory");
                        event_loop.exit();
                    }
                    Err(err) => {
                        tracing::error!(%err, "render failed");
                    }
                }

                window.request_redraw();
            }
            _ => {}
        }
    }
}
