//! Synchronization primitives.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiError;

/// Binary semaphore for GPU-GPU ordering.
pub struct Semaphore {
    device: Arc<Device>,
    handle: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let handle = unsafe {
            device
                .handle()
                .create_semaphore(&create_info, None)
                .map_err(RhiError::from)?
        };
        Ok(Self { device, handle })
    }

    /// Returns the raw semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.handle, None);
        }
    }
}

/// Fence for CPU-GPU synchronization.
pub struct Fence {
    device: Arc<Device>,
    handle: vk::Fence,
}

impl Fence {
    /// Creates a fence, signaled when `signaled` is true.
    ///
    /// Frame fences start signaled so the first wait on each frame slot
    /// returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> Result<Self, RhiError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let handle = unsafe {
            device
                .handle()
                .create_fence(&create_info, None)
                .map_err(RhiError::from)?
        };
        Ok(Self { device, handle })
    }

    /// Blocks until the fence is signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait(&self) -> Result<(), RhiError> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.handle], true, u64::MAX)
                .map_err(RhiError::from)
        }
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        unsafe {
            self.device
                .handle()
                .reset_fences(&[self.handle])
                .map_err(RhiError::from)
        }
    }

    /// Returns the raw fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.handle, None);
        }
    }
}

/// Per-frame synchronization objects.
pub struct FrameSync {
    /// Signaled when the acquired image is ready for rendering
    pub image_available: Semaphore,
    /// Signaled when rendering completes, waited on by present
    pub render_finished: Semaphore,
    /// Signaled when the frame's command buffer finishes on the GPU
    pub in_flight: Fence,
}

impl FrameSync {
    /// Creates the synchronization objects for one frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if any primitive fails to create.
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_sync_primitives_are_send_sync() {
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
