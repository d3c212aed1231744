//! Vulkan abstraction layer for the loom renderer.
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance creation with optional validation layers
//! - Physical device selection and logical device creation
//! - Swapchain management and recreation
//! - Render pass, framebuffer and pipeline creation
//! - Shader module lifetime
//! - Command pool and synchronization primitives

mod error;

pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
