//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders queue operations against each other (acquire,
//!   submit, present)
//! - [`Fence`] lets the host observe completion of a submission
//! - [`GpuFence`] is the host-side fence protocol the frame ring depends on,
//!   implemented by [`Fence`] and by test doubles
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framekit_rhi::device::Device;
//! use framekit_rhi::sync::{Fence, GpuFence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), framekit_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//!
//! // Signaled so the first wait returns immediately
//! let in_flight = Fence::new(device, true)?;
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Host-side view of a fence.
pub trait GpuFence {
    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    fn wait(&self, timeout: u64) -> RhiResult<()>;

    /// Returns the fence to the unsignaled state. The fence must not be
    /// pending on a queue.
    fn reset(&self) -> RhiResult<()>;

    /// Non-blocking status query.
    fn is_signaled(&self) -> RhiResult<bool>;

    /// Raw handle passed to queue submission.
    fn handle(&self) -> vk::Fence;
}

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence.
    ///
    /// `signaled` creates it already signaled, which is what frame slots need
    /// so that the first wait before recording returns at once.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }
}

impl GpuFence for Fence {
    fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    fn is_signaled(&self) -> RhiResult<bool> {
        let status = unsafe { self.device.handle().get_fence_status(self.fence)? };
        Ok(status)
    }

    #[inline]
    fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}
