//! Logical device and queue management.

use std::sync::Arc;

use ash::vk;
use tracing::{info, warn};

use crate::error::RhiError;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Logical device wrapper owning the graphics and present queues.
///
/// Shared as `Arc<Device>` so that resources created from it (swapchains,
/// pipelines, sync primitives) can keep the device alive for their own
/// cleanup.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    indices: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl Device {
    /// Creates a logical device from a selected physical device.
    ///
    /// One queue is requested per distinct queue family; when graphics and
    /// present share a family only a single queue is created and both
    /// handles refer to it.
    ///
    /// # Errors
    ///
    /// Returns an error if logical device creation fails.
    pub fn new(
        instance: &ash::Instance,
        info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = info
            .indices
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .create_device(info.handle, &create_info, None)
                .map_err(RhiError::from)?
        };

        // is_complete() was checked during selection
        let graphics_family = info.indices.graphics_family.ok_or(RhiError::NoUsableDevice)?;
        let present_family = info.indices.present_family.ok_or(RhiError::NoUsableDevice)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        info!("Logical device created");

        Ok(Arc::new(Self {
            device,
            physical_device: info.handle,
            indices: info.indices,
            graphics_queue,
            present_queue,
        }))
    }

    /// Returns the raw logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device this logical device was created from.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the queue family indices used at creation.
    #[inline]
    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        self.indices
    }

    /// Returns the graphics queue.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the present queue.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Blocks until the device has finished all pending work.
    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            warn!("device_wait_idle failed: {:?}", e);
        }
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Submit`] if the submission is rejected.
    pub fn submit_graphics(
        &self,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submits, fence)
                .map_err(RhiError::Submit)
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.wait_idle();
        unsafe {
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}
