//! Swapchain creation, recreation, and presentation.
//!
//! Surface capability queries feed a set of pure chooser functions, so the
//! selection rules (format, present mode, extent, image count) are testable
//! without a live device.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiError;

/// Number of images requested from the swapchain before clamping.
pub const PREFERRED_IMAGE_COUNT: u32 = 3;

/// Surface capabilities, formats, and present modes for a device/surface pair.
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries the surface support of a physical device.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainCreation`] if any of the queries fail.
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(|e| RhiError::SwapchainCreation(format!("capability query: {e:?}")))?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| RhiError::SwapchainCreation(format!("format query: {e:?}")))?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(|e| RhiError::SwapchainCreation(format!("present mode query: {e:?}")))?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// The format requested when the surface offers it.
const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Chooses the surface format, preferring B8G8R8A8_SRGB with SRGB_NONLINEAR.
///
/// Falls back to the first reported format when the preferred pair is
/// unavailable. An empty list (already rejected at device selection) yields
/// the preferred format rather than panicking.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or(formats.first())
        .copied()
        .unwrap_or(PREFERRED_SURFACE_FORMAT)
}

/// Chooses the present mode, preferring MAILBOX and falling back to FIFO.
///
/// FIFO is the only mode Vulkan guarantees, so the fallback is always
/// available.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Chooses the swapchain extent.
///
/// When the surface reports a fixed extent the report wins; otherwise the
/// requested window size is clamped into the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Chooses the swapchain image count.
///
/// Requests [`PREFERRED_IMAGE_COUNT`] images, clamped into the supported
/// range. A `max_image_count` of zero means no upper bound.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = PREFERRED_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

/// Swapchain wrapper owning the image views and the swapchain handle.
///
/// The swapchain images themselves belong to the swapchain and are never
/// destroyed manually.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a swapchain sized for `requested_extent`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainCreation`] if surface queries, swapchain
    /// creation, or image view creation fail.
    pub fn new(
        instance: &ash::Instance,
        device: Arc<Device>,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        requested_extent: vk::Extent2D,
    ) -> Result<Self, RhiError> {
        let loader = ash::khr::swapchain::Device::new(instance, device.handle());

        let (handle, images, image_views, format, extent) = Self::create_swapchain(
            &device,
            &loader,
            surface_loader,
            surface,
            requested_extent,
            vk::SwapchainKHR::null(),
        )?;

        info!(
            "Swapchain created: {}x{}, {} images, format {:?}",
            extent.width,
            extent.height,
            images.len(),
            format
        );

        Ok(Self {
            device,
            loader,
            handle,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Recreates the swapchain for a new window size.
    ///
    /// The old swapchain is handed to the driver via `old_swapchain` so that
    /// in-flight presents can complete, then destroyed along with its image
    /// views. The caller must have destroyed any framebuffers referencing
    /// the old image views and waited for the device to go idle.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainCreation`] on failure; the old swapchain
    /// remains destroyed in that case and the wrapper must not be used again.
    pub fn recreate(
        &mut self,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        requested_extent: vk::Extent2D,
    ) -> Result<(), RhiError> {
        let old_handle = self.handle;
        let old_views = std::mem::take(&mut self.image_views);

        let result = Self::create_swapchain(
            &self.device,
            &self.loader,
            surface_loader,
            surface,
            requested_extent,
            old_handle,
        );

        // Old views and handle go away regardless of the outcome
        unsafe {
            for view in old_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(old_handle, None);
        }
        self.handle = vk::SwapchainKHR::null();

        let (handle, images, image_views, format, extent) = result?;

        self.handle = handle;
        self.images = images;
        self.image_views = image_views;
        self.format = format;
        self.extent = extent;

        debug!(
            "Swapchain recreated: {}x{}, {} images",
            extent.width,
            extent.height,
            self.images.len()
        );

        Ok(())
    }

    fn create_swapchain(
        device: &Arc<Device>,
        loader: &ash::khr::swapchain::Device,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        requested_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<
        (
            vk::SwapchainKHR,
            Vec<vk::Image>,
            Vec<vk::ImageView>,
            vk::Format,
            vk::Extent2D,
        ),
        RhiError,
    > {
        let support = SurfaceSupport::query(surface_loader, device.physical_device(), surface)?;

        if support.formats.is_empty() || support.present_modes.is_empty() {
            return Err(RhiError::SwapchainCreation(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, requested_extent);
        let image_count = choose_image_count(&support.capabilities);

        let indices = device.queue_family_indices();
        let family_indices = indices.unique_families();

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // Distinct graphics/present families need CONCURRENT sharing
        create_info = if family_indices.len() > 1 {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(|e| RhiError::SwapchainCreation(format!("create_swapchain: {e:?}")))?
        };

        let images = unsafe {
            loader.get_swapchain_images(handle).map_err(|e| {
                loader.destroy_swapchain(handle, None);
                RhiError::SwapchainCreation(format!("get_swapchain_images: {e:?}"))
            })?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(*image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            let view = unsafe {
                device.handle().create_image_view(&view_info, None).map_err(|e| {
                    for created in &image_views {
                        device.handle().destroy_image_view(*created, None);
                    }
                    loader.destroy_swapchain(handle, None);
                    RhiError::SwapchainCreation(format!("create_image_view: {e:?}"))
                })?
            };
            image_views.push(view);
        }

        Ok((handle, images, image_views, surface_format.format, extent))
    }

    /// Acquires the next swapchain image.
    ///
    /// Returns `Ok(None)` when the swapchain is out of date and must be
    /// recreated. A suboptimal result still yields the image; the caller
    /// recreates after presenting it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Vulkan`] for any other acquisition failure.
    pub fn acquire_next_image(
        &self,
        signal_semaphore: vk::Semaphore,
    ) -> Result<Option<u32>, RhiError> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.handle,
                u64::MAX,
                signal_semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(RhiError::Vulkan(e)),
        }
    }

    /// Presents an acquired image on the present queue.
    ///
    /// Returns `Ok(true)` when the swapchain is out of date or suboptimal
    /// and must be recreated.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Vulkan`] for any other presentation failure.
    pub fn present(
        &self,
        wait_semaphore: vk::Semaphore,
        image_index: u32,
    ) -> Result<bool, RhiError> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.handle];
        let indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe {
            self.loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(RhiError::Vulkan(e)),
        }
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the current swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the swapchain image views, one per image.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in &self.image_views {
                self.device.handle().destroy_image_view(*view, None);
            }
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
            }
        }
        debug!("Swapchain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_preferred_surface_format_chosen() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_first_format_fallback() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_sole_format_is_used() {
        let formats = vec![format(
            vk::Format::R5G6B5_UNORM_PACK16,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R5G6B5_UNORM_PACK16);
    }

    #[test]
    fn test_empty_format_list_yields_preferred_default() {
        let chosen = choose_surface_format(&[]);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_mailbox_preferred() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_fifo_fallback() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    fn capabilities(
        current: vk::Extent2D,
        min: vk::Extent2D,
        max: vk::Extent2D,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            min_image_extent: min,
            max_image_extent: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_extent_wins() {
        let caps = capabilities(
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            vk::Extent2D {
                width: 4096,
                height: 4096,
            },
        );
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
        );
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_requested_extent_clamped() {
        let caps = capabilities(
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            vk::Extent2D {
                width: 100,
                height: 100,
            },
            vk::Extent2D {
                width: 1024,
                height: 1024,
            },
        );
        // Exactly at the maximum: no clamping
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 1024,
                height: 1024,
            },
        );
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 1024);

        // Above the maximum: clamped down
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 2000,
                height: 50,
            },
        );
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 100);
    }

    fn count_caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_image_count_prefers_three() {
        assert_eq!(choose_image_count(&count_caps(2, 8)), 3);
    }

    #[test]
    fn test_image_count_clamped_to_max() {
        assert_eq!(choose_image_count(&count_caps(2, 2)), 2);
    }

    #[test]
    fn test_image_count_raised_to_min() {
        assert_eq!(choose_image_count(&count_caps(4, 8)), 4);
    }

    #[test]
    fn test_image_count_unbounded_max() {
        // max_image_count of zero means no limit
        assert_eq!(choose_image_count(&count_caps(2, 0)), 3);
    }
}
