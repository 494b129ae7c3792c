//! Swapchain management.
//!
//! [`Swapchain`] owns the `VkSwapchainKHR`, its images and one color view per
//! image. Framebuffers built over those views belong to the caller and must
//! be rebuilt after [`Swapchain::recreate`].
//!
//! Acquisition and presentation return raw `vk::Result`s so the frame loop
//! can tell `ERROR_OUT_OF_DATE_KHR` apart from fatal errors.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use framekit_rhi::device::Device;
//! use framekit_rhi::instance::Instance;
//! use framekit_rhi::swapchain::Swapchain;
//!
//! # fn example(
//! #     instance: &Instance,
//! #     device: Arc<Device>,
//! #     surface: vk::SurfaceKHR,
//! #     acquired: vk::Semaphore,
//! #     rendered: vk::Semaphore,
//! # ) -> Result<(), framekit_rhi::RhiError> {
//! let swapchain = Swapchain::new(instance, device.clone(), surface, 1280, 720)?;
//!
//! match swapchain.acquire_next_image(acquired) {
//!     Ok((image_index, _suboptimal)) => {
//!         // ... record and submit work signaling `rendered` ...
//!         let _ = swapchain.present(device.present_queue(), image_index, rendered);
//!     }
//!     Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => { /* skip this frame */ }
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Format, extent and image count picked for one swapchain build.
///
/// Presentation always uses FIFO: every driver supports it and it paces the
/// frame loop to the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SurfaceChoice {
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    image_count: u32,
    transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceChoice {
    fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let (capabilities, formats) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
            )
        };
        Self::pick(&capabilities, &formats, width, height)
    }

    /// Clear colors are written as-is, so the linear BGRA format wins when
    /// the surface offers it.
    fn pick(
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let format = formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| RhiError::SwapchainError("surface reports no formats".to_string()))?;

        // u32::MAX means the window size decides.
        let extent = if capabilities.current_extent.width == u32::MAX {
            let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
            vk::Extent2D {
                width: width.clamp(min.width, max.width),
                height: height.clamp(min.height, max.height),
            }
        } else {
            capabilities.current_extent
        };

        // A max of 0 means unbounded.
        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        Ok(Self {
            format,
            extent,
            image_count,
            transform: capabilities.current_transform,
        })
    }
}

/// Vulkan swapchain with one image view per image.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        Self::build(
            instance,
            device,
            surface,
            width,
            height,
            vk::SwapchainKHR::null(),
        )
    }

    fn build(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let choice = SurfaceChoice::query(
            &surface_loader,
            device.physical_device(),
            surface,
            width,
            height,
        )?;
        let SurfaceChoice {
            format: surface_format,
            extent,
            image_count,
            transform,
        } = choice;

        let families = device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::SwapchainError(
                "device has no graphics or present queue".to_string(),
            ));
        };
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, family_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        };
        this.create_image_views()?;

        info!(
            "Swapchain created: {}x{}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            this.images.len()
        );

        Ok(this)
    }

    /// Rebuilds the swapchain for a new window size.
    ///
    /// The caller must have drained every submission that references the old
    /// images. Returns the new image count so callers sized per image can
    /// check it did not change.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<u32> {
        info!("Recreating swapchain for {}x{}", width, height);

        let mut replacement = Self::build(
            instance,
            self.device.clone(),
            surface,
            width,
            height,
            self.swapchain,
        )?;

        // Swap so the old handle and views drop with `replacement`.
        std::mem::swap(self, &mut replacement);
        drop(replacement);

        Ok(self.image_count())
    }

    /// Acquires the next image, blocking without timeout.
    ///
    /// Returns `(image_index, suboptimal)`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues presentation of `image_index` once `wait_semaphore` signals.
    ///
    /// Returns `true` when the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn create_image_views(&mut self) -> RhiResult<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            // Views created so far are released by Drop on error.
            let view = unsafe { self.device.handle().create_image_view(&create_info, None)? };
            self.image_views.push(view);
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        for &view in &self.image_views {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
        self.image_views.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            debug!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn fixed_size(width: u32, height: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            current_extent: vk::Extent2D { width, height },
            ..Default::default()
        }
    }

    #[test]
    fn test_pick_prefers_linear_bgra() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        let choice = SurfaceChoice::pick(&fixed_size(800, 600), &formats, 800, 600).expect("choice");
        assert_eq!(choice.format.format, vk::Format::B8G8R8A8_UNORM);

        let formats = [surface_format(vk::Format::R8G8B8A8_SRGB)];
        let choice = SurfaceChoice::pick(&fixed_size(800, 600), &formats, 800, 600).expect("choice");
        assert_eq!(choice.format.format, vk::Format::R8G8B8A8_SRGB);

        assert!(matches!(
            SurfaceChoice::pick(&fixed_size(800, 600), &[], 800, 600),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_pick_extent() {
        let formats = [surface_format(vk::Format::B8G8R8A8_UNORM)];

        let choice = SurfaceChoice::pick(&fixed_size(1920, 1080), &formats, 800, 600).expect("choice");
        assert_eq!((choice.extent.width, choice.extent.height), (1920, 1080));

        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };
        let choice = SurfaceChoice::pick(&capabilities, &formats, 50, 3000).expect("choice");
        assert_eq!((choice.extent.width, choice.extent.height), (100, 2000));
    }

    #[test]
    fn test_pick_image_count() {
        let formats = [surface_format(vk::Format::B8G8R8A8_UNORM)];

        let capped = vk::SurfaceCapabilitiesKHR {
            max_image_count: 2,
            ..fixed_size(800, 600)
        };
        let choice = SurfaceChoice::pick(&capped, &formats, 800, 600).expect("choice");
        assert_eq!(choice.image_count, 2);

        let choice = SurfaceChoice::pick(&fixed_size(800, 600), &formats, 800, 600).expect("choice");
        assert_eq!(choice.image_count, 3);
    }
}
