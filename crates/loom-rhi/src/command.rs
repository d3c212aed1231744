//! Command pool and command buffer allocation.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiError;

/// Command pool for the graphics queue family.
///
/// Created with RESET_COMMAND_BUFFER so individual buffers can be re-recorded
/// each frame.
pub struct CommandPool {
    device: Arc<Device>,
    handle: vk::CommandPool,
}

impl CommandPool {
    /// Creates a command pool on the graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        let graphics_family = device
            .queue_family_indices()
            .graphics_family
            .ok_or(RhiError::NoUsableDevice)?;

        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_family);

        let handle = unsafe {
            device
                .handle()
                .create_command_pool(&create_info, None)
                .map_err(RhiError::from)?
        };

        debug!("Command pool created on family {}", graphics_family);

        Ok(Self { device, handle })
    }

    /// Allocates `count` primary command buffers from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffers(
        &self,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, RhiError> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe {
            self.device
                .handle()
                .allocate_command_buffers(&alloc_info)
                .map_err(RhiError::from)?
        };

        Ok(buffers)
    }

    /// Returns the raw command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Frees all command buffers allocated from the pool
            self.device.handle().destroy_command_pool(self.handle, None);
        }
        debug!("Command pool destroyed");
    }
}
