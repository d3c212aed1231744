//! Demo application: opens a window and draws a triangle.

use std::path::Path;

use anyhow::{Context, Result, bail};
use loom_core::init_logging;
use loom_platform::Window;
use loom_renderer::{RendererHandle, RendererRegistry};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;
const WINDOW_TITLE: &str = "loom";

const VERT_SHADER_PATH: &str = "shaders/triangle.vert.spv";
const FRAG_SHADER_PATH: &str = "shaders/triangle.frag.spv";

/// Reads a compiled SPIR-V shader from disk.
fn load_shader(path: &str) -> Result<Vec<u8>> {
    let bytes = std::fs::read(Path::new(path))
        .with_context(|| format!("failed to read shader {path}"))?;
    if bytes.is_empty() {
        bail!("shader {path} is empty");
    }
    Ok(bytes)
}

struct App {
    window: Option<Window>,
    registry: RendererRegistry,
    handle: RendererHandle,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            registry: RendererRegistry::new(),
            handle: RendererHandle::INVALID,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        // Shaders are validated before any GPU object exists
        let (vert, frag) = match (load_shader(VERT_SHADER_PATH), load_shader(FRAG_SHADER_PATH)) {
            (Ok(vert), Ok(frag)) => (vert, frag),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to load shaders: {:#}", e);
                event_loop.exit();
                return;
            }
        };

        self.handle = self.registry.create(&window, &vert, &frag);
        if !self.handle.is_valid() {
            event_loop.exit();
            return;
        }

        self.window = Some(window);
        info!("Application started");
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::Resized(size) => {
                if let Some(window) = &mut self.window {
                    window.resize(size.width, size.height);
                }
                self.registry.reload(self.handle);
            }
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.registry.destroy(self.handle);
                self.handle = RendererHandle::INVALID;
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.registry.draw_frame(self.handle);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    init_logging();

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app).context("event loop error")?;

    Ok(())
}
