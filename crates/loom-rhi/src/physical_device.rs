//! Physical device selection.
//!
//! Enumerates available GPUs and picks one that can render to the surface:
//! it must expose a graphics queue family, a present-capable queue family,
//! support the swapchain extension, and report at least one surface format
//! and present mode. Discrete GPUs win over everything else; otherwise the
//! first usable device is taken.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info};

use crate::error::RhiError;

/// Device extensions every selected GPU must support.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices discovered on a physical device.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics operations
    pub graphics_family: Option<u32>,
    /// Family supporting presentation to the surface
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Returns true when both required families have been found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the set of distinct family indices, deduplicated.
    ///
    /// On many GPUs graphics and present share a family; device creation
    /// must then request only a single queue.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family {
            if !families.contains(&present) {
                families.push(present);
            }
        }
        families
    }
}

/// A selected physical device together with its queue family indices.
pub struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub indices: QueueFamilyIndices,
    pub properties: vk::PhysicalDeviceProperties,
}

/// Scans queue families in index order and records the first family that
/// supports graphics and the first that can present.
///
/// The scan is a single pass; later families never replace an earlier match.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(index);
        }

        if indices.present_family.is_none() && supports_present(index) {
            indices.present_family = Some(index);
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Returns true when `available` covers every entry in
/// [`REQUIRED_DEVICE_EXTENSIONS`].
pub fn has_required_extensions(available: &[vk::ExtensionProperties]) -> bool {
    REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
        available.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == *required
        })
    })
}

/// Picks the preferred device from a list of usable candidates.
///
/// The first discrete GPU wins; when none is discrete, the first candidate
/// is kept.
pub fn pick_device(candidates: Vec<PhysicalDeviceInfo>) -> Option<PhysicalDeviceInfo> {
    let mut chosen: Option<PhysicalDeviceInfo> = None;

    for candidate in candidates {
        let is_discrete =
            candidate.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;

        if chosen.is_none() {
            let stop = is_discrete;
            chosen = Some(candidate);
            if stop {
                break;
            }
        } else if is_discrete {
            chosen = Some(candidate);
            break;
        }
    }

    chosen
}

/// Selects a physical device that can render to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::Enumeration`] if device enumeration fails and
/// [`RhiError::NoUsableDevice`] if no GPU satisfies the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe {
        instance
            .enumerate_physical_devices()
            .map_err(RhiError::Enumeration)?
    };

    if devices.is_empty() {
        return Err(RhiError::NoUsableDevice);
    }

    let mut candidates = Vec::new();

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        debug!("Evaluating GPU: {}", name.to_string_lossy());

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let indices = find_queue_families(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        });

        if !indices.is_complete() {
            continue;
        }

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(RhiError::Enumeration)?
        };
        if !has_required_extensions(&extensions) {
            continue;
        }

        // A device with no formats or present modes cannot drive a swapchain
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(RhiError::Enumeration)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(RhiError::Enumeration)?
        };
        if formats.is_empty() || present_modes.is_empty() {
            continue;
        }

        candidates.push(PhysicalDeviceInfo {
            handle: device,
            indices,
            properties,
        });
    }

    let chosen = pick_device(candidates).ok_or(RhiError::NoUsableDevice)?;

    let name = unsafe { CStr::from_ptr(chosen.properties.device_name.as_ptr()) };
    info!(
        "Selected GPU: {} (graphics family {}, present family {})",
        name.to_string_lossy(),
        chosen.indices.graphics_family.unwrap_or(0),
        chosen.indices.present_family.unwrap_or(0),
    );

    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_graphics_family_wins() {
        let families = vec![
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = find_queue_families(&families, |_| false);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, None);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_first_present_family_wins() {
        let families = vec![
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        // Every family can present; the scan must keep index 0
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(0));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_graphics_and_present_may_differ() {
        let families = vec![
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families, |index| index == 1);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_incomplete_when_no_present_support() {
        let families = vec![family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families_deduplicates_shared_index() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0]);

        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    fn candidate(device_type: vk::PhysicalDeviceType) -> PhysicalDeviceInfo {
        PhysicalDeviceInfo {
            handle: vk::PhysicalDevice::null(),
            indices: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(0),
            },
            properties: vk::PhysicalDeviceProperties {
                device_type,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_discrete_gpu_preferred() {
        let candidates = vec![
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        let chosen = pick_device(candidates).unwrap();
        assert_eq!(
            chosen.properties.device_type,
            vk::PhysicalDeviceType::DISCRETE_GPU
        );
    }

    #[test]
    fn test_first_usable_when_no_discrete() {
        let mut first = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU);
        first.indices.graphics_family = Some(3);
        let candidates = vec![
            first,
            candidate(vk::PhysicalDeviceType::VIRTUAL_GPU),
        ];
        let chosen = pick_device(candidates).unwrap();
        assert_eq!(chosen.indices.graphics_family, Some(3));
    }

    #[test]
    fn test_no_candidates_yields_none() {
        assert!(pick_device(Vec::new()).is_none());
    }

    #[test]
    fn test_required_extensions_present() {
        let mut ext = vk::ExtensionProperties::default();
        let name = ash::khr::swapchain::NAME.to_bytes_with_nul();
        for (i, byte) in name.iter().enumerate() {
            ext.extension_name[i] = *byte as std::ffi::c_char;
        }
        assert!(has_required_extensions(&[ext]));
    }

    #[test]
    fn test_required_extensions_missing() {
        let ext = vk::ExtensionProperties::default();
        assert!(!has_required_extensions(&[ext]));
        assert!(!has_required_extensions(&[]));
    }
}
