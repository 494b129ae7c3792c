//! Physical device (GPU) selection.
//!
//! Enumerates GPUs, discards those lacking a graphics queue, a queue able to
//! present to the surface, or the shader stages the samples rely on
//! (geometry and tessellation), and picks the highest rated of the rest.
//!
//! # Example
//!
//! ```no_run
//! use framekit_rhi::instance::Instance;
//! use framekit_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new("framekit", false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//! println!("Selected GPU: {}", info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices used by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics (and therefore compute and transfer).
    pub graphics_family: Option<u32>,
    /// Family able to present to the window surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True when both a graphics and a present family were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// Everything needed about the chosen GPU to create a logical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Total size of device-local heaps in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - score {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    let Some((info, score)) = selected else {
        warn!("No GPU offers graphics, present, geometry and tessellation support");
        return Err(RhiError::NoSuitableGpu);
    };

    info!(
        "Selected GPU: '{}' ({}), score {}",
        info.device_name(),
        info.device_type_name(),
        score
    );

    Ok(info)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let info = PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families: find_queue_families(instance, device, surface, surface_loader),
    };

    if !info.queue_families.is_complete() {
        debug!("GPU '{}' skipped: missing queue families", info.device_name());
        return None;
    }

    if let Some(missing) = missing_feature(&info.features) {
        debug!("GPU '{}' skipped: {} not supported", info.device_name(), missing);
        return None;
    }

    Some(info)
}

/// Returns the name of the first required feature the device lacks.
fn missing_feature(features: &vk::PhysicalDeviceFeatures) -> Option<&'static str> {
    if features.geometry_shader == vk::FALSE {
        Some("geometry shader")
    } else if features.tessellation_shader == vk::FALSE {
        Some("tessellation shader")
    } else if features.fill_mode_non_solid == vk::FALSE {
        Some("non-solid fill mode")
    } else if features.sampler_anisotropy == vk::FALSE {
        Some("sampler anisotropy")
    } else {
        None
    }
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let present_support = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        };
        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);

        // A family doing both avoids ownership transfers of swapchain images
        if graphics && present_support {
            indices.graphics_family = Some(i);
            indices.present_family = Some(i);
            break;
        }
        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if present_support && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

fn rate_device(info: &PhysicalDeviceInfo) -> u64 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    let vram_mb = (info.device_local_memory() / (1024 * 1024)).min(16_000);
    type_score + vram_mb + u64::from(info.properties.limits.max_image_dimension2_d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_complete() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        indices.graphics_family = Some(0);
        assert!(!indices.is_complete());
        indices.present_family = Some(1);
        assert!(indices.is_complete());
    }

    #[test]
    fn test_unique_families_deduplicates() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_missing_feature_reports_first_gap() {
        let mut features = vk::PhysicalDeviceFeatures::default();
        assert_eq!(missing_feature(&features), Some("geometry shader"));
        features.geometry_shader = vk::TRUE;
        assert_eq!(missing_feature(&features), Some("tessellation shader"));
        features.tessellation_shader = vk::TRUE;
        assert_eq!(missing_feature(&features), Some("non-solid fill mode"));
        features.fill_mode_non_solid = vk::TRUE;
        features.sampler_anisotropy = vk::TRUE;
        assert_eq!(missing_feature(&features), None);
    }
}
