//! Vulkan logical device, queues and memory allocation.
//!
//! The [`Device`] owns the `VkDevice`, its graphics and present queues and the
//! gpu-allocator instance every buffer and image is suballocated from. It is
//! shared as `Arc<Device>` by every wrapper that needs to destroy itself.
//!
//! Memory requests go through [`Device::allocate`], which first checks that
//! at least one memory type satisfies both the resource's
//! `memory_type_bits` and the property flags implied by the requested
//! [`MemoryLocation`]. A miss is a hard error: there is no fallback search.
//!
//! # Example
//!
//! ```no_run
//! use framekit_rhi::instance::Instance;
//! use framekit_rhi::physical_device::select_physical_device;
//! use framekit_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new("framekit", false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &info).expect("Failed to create logical device");
//! let graphics_queue = device.graphics_queue();
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Property flags a memory type must carry to serve `location`.
pub fn required_memory_flags(location: MemoryLocation) -> vk::MemoryPropertyFlags {
    match location {
        MemoryLocation::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryLocation::CpuToGpu | MemoryLocation::GpuToCpu => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
        MemoryLocation::Unknown => vk::MemoryPropertyFlags::empty(),
    }
}

/// Finds the first memory type allowed by `type_bits` whose properties
/// contain all of `flags`.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    properties
        .memory_types
        .iter()
        .take(properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(i, _)| i as u32)
}

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across the renderer through `Arc`. The allocator is behind a
/// `Mutex`; everything else is immutable after creation.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    /// Dropped by hand before `vkDestroyDevice`.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates the logical device and its allocator.
    ///
    /// Enables the swapchain extension plus the shader stage, wireframe fill
    /// and sampler anisotropy features the samples use.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue families are incomplete, device creation
    /// fails, or the allocator cannot be initialized.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!("Creating queues for families {:?}", unique_families);

        let features = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(true)
            .tessellation_shader(true)
            .fill_mode_non_solid(true)
            .sampler_anisotropy(true);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved: graphics family {}, present family {}",
            graphics_family, present_family
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("Logical device created on '{}'", info.device_name());

        Ok(Arc::new(Self {
            device,
            physical_device: info.device,
            memory_properties: info.memory_properties,
            limits: info.properties.limits,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families: families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Graphics queue family index; always present on a constructed device.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.queue_families.graphics_family.unwrap_or_default()
    }

    fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| RhiError::AllocatorPoisoned)
    }

    /// Suballocates memory for a resource.
    ///
    /// # Errors
    ///
    /// [`RhiError::NoCompatibleMemoryType`] when no memory type satisfies
    /// `requirements.memory_type_bits` and the flags for `location`, or the
    /// allocator's own error.
    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> RhiResult<Allocation> {
        let flags = required_memory_flags(location);
        if find_memory_type(&self.memory_properties, requirements.memory_type_bits, flags)
            .is_none()
        {
            return Err(RhiError::NoCompatibleMemoryType {
                type_bits: requirements.memory_type_bits,
                flags,
            });
        }

        let allocation = self.lock_allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    /// Returns an allocation to the allocator, logging failures.
    pub fn free(&self, allocation: Allocation) {
        match self.lock_allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free allocation: {:?}", e);
                }
            }
            Err(e) => error!("Failed to free allocation: {}", e),
        }
    }

    /// Blocks until every queue on the device is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Blocks until the graphics queue is idle.
    pub fn graphics_queue_wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.queue_wait_idle(self.graphics_queue)? };
        Ok(())
    }

    /// Submits work to the graphics queue.
    ///
    /// # Safety
    ///
    /// Command buffers must be fully recorded and the fence, when not null,
    /// must be unsignaled and not in use by another submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator releases its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send + Sync, handles are plain integers and the
// allocator is only reached through its Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        properties
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let properties =
            memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&properties, 0b111, host), Some(1));
        assert_eq!(find_memory_type(&properties, 0b100, host), Some(2));
        assert_eq!(
            find_memory_type(&properties, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn test_find_memory_type_reports_miss() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let host = required_memory_flags(MemoryLocation::CpuToGpu);
        assert_eq!(find_memory_type(&properties, 0b1, host), None);
        // Types beyond memory_type_count are ignored even if the bit is set
        assert_eq!(
            find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::empty()),
            None
        );
    }

    #[test]
    fn test_required_memory_flags() {
        assert_eq!(
            required_memory_flags(MemoryLocation::GpuOnly),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert!(
            required_memory_flags(MemoryLocation::CpuToGpu)
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        );
    }

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
