//! Platform abstraction layer for the loom renderer.
//!
//! This crate wraps the windowing system behind a small interface the
//! renderer core depends on: surface creation, pixel-size queries and the
//! platform's required Vulkan instance extensions. The renderer never talks
//! to winit directly.

mod window;

pub use window::{Surface, Window, required_surface_extensions};

// Re-export winit types that callers wiring up the event loop need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
