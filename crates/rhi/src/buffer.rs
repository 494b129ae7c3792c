//! GPU buffer management.
//!
//! - [`BufferUsage`] picks Vulkan usage flags and the memory location
//! - [`Buffer`] wraps `VkBuffer` with gpu-allocator managed memory
//!
//! Vertex and index buffers live in device-local memory and are filled through
//! a staging buffer; uniform and staging buffers are host visible and written
//! directly with [`Buffer::write_data`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framekit_rhi::device::Device;
//! use framekit_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), framekit_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let staging = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Staging,
//!     bytemuck::cast_slice(&vertices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled by a transfer
    Vertex,
    /// Device-local index data, filled by a transfer
    Index,
    /// Host-visible per-frame shader constants
    Uniform,
    /// Host-visible transfer source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }

    /// True when the host can write the buffer directly.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        self.memory_location() == MemoryLocation::CpuToGpu
    }
}

/// GPU buffer wrapper with managed memory.
///
/// Dropping the buffer destroys the `VkBuffer` and returns its allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes with bound memory.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero size, when no memory type fits, or when
    /// buffer creation or allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation =
            match device.allocate(usage.name(), requirements, usage.memory_location(), true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.handle().destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        if let Err(e) = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            device.free(allocation);
            unsafe { device.handle().destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer and fills it with `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// Goes through gpu-allocator's mapping of the allocation, which stays
    /// valid for the allocation's lifetime; no pointer escapes this call.
    ///
    /// # Errors
    ///
    /// Fails if the memory is not host visible or the write would run past
    /// the end of the buffer.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let start = checked_write_start(self.size, offset, data.len())?;

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} buffer is not host visible", self.usage.name()))
            })?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(start);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Writes a plain-old-data value at offset 0.
    pub fn write_pod<T: bytemuck::Pod>(&self, value: &T) -> RhiResult<()> {
        self.write_data(0, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

/// Byte offset of a `len`-byte write at `offset` into a `size`-byte buffer,
/// or an error when the write would leave the buffer.
fn checked_write_start(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> RhiResult<usize> {
    let fits = offset
        .checked_add(len as vk::DeviceSize)
        .is_some_and(|end| end <= size);
    if !fits {
        return Err(RhiError::InvalidHandle(format!(
            "Write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        )));
    }
    usize::try_from(offset)
        .map_err(|_| RhiError::InvalidHandle(format!("Write offset {} is not addressable", offset)))
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free(allocation);
        }
        debug!("Destroyed {} buffer: {} bytes", self.usage.name(), self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_buffers_are_device_local_transfer_targets() {
        for usage in [BufferUsage::Vertex, BufferUsage::Index] {
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
            assert!(usage.to_vk_usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
            assert!(!usage.is_host_visible());
        }
    }

    #[test]
    fn test_staging_and_uniform_are_host_visible() {
        assert!(BufferUsage::Staging.is_host_visible());
        assert!(BufferUsage::Uniform.is_host_visible());
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_writes_stay_inside_the_buffer() {
        assert_eq!(checked_write_start(256, 0, 256).ok(), Some(0));
        assert_eq!(checked_write_start(256, 192, 64).ok(), Some(192));
        assert!(checked_write_start(256, 200, 64).is_err());
        // An offset near u64::MAX must not wrap around to a small end.
        assert!(checked_write_start(256, u64::MAX - 8, 64).is_err());
    }

    #[test]
    fn test_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Buffer>();
    }
}
