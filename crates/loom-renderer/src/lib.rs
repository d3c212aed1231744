//! High-level rendering: per-window renderers, frame pacing, and the handle
//! registry the application talks to.

mod frame;
mod registry;
mod renderer;

pub use registry::{RendererHandle, RendererRegistry};
pub use renderer::Renderer;

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;
