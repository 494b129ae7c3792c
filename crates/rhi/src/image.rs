//! Memory-backed images and their views.
//!
//! An [`Image`] owns the `VkImage`, its allocation and every view created from
//! it. Besides the default view (2D, 2D array or cube depending on the
//! description) an image can carry one 2D view per layer, used to render into
//! individual cube faces, and a 2D array view over all layers, used for
//! layered rendering in a single pass.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framekit_rhi::device::Device;
//! use framekit_rhi::image::{Image, ImageDesc};
//! use framekit_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), framekit_rhi::RhiError> {
//! let desc = ImageDesc::cube(
//!     "cubemap",
//!     512,
//!     vk::Format::R8G8B8A8_UNORM,
//!     vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
//! );
//! let mut cube = Image::new(device, &desc)?;
//! cube.create_layer_views()?;
//! cube.create_array_view()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::barrier::SubresourceSpan;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth format used for every depth attachment.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Description of an image to create.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub array_layers: u32,
    /// Creates the image cube-compatible with a cube default view.
    pub cube: bool,
    pub location: MemoryLocation,
}

impl ImageDesc {
    /// Single-layer color image in device-local memory.
    pub fn color_2d(
        name: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name,
            extent,
            format,
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
            array_layers: 1,
            cube: false,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Six-layer cube-compatible color image with square faces.
    pub fn cube(
        name: &'static str,
        edge: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            array_layers: 6,
            cube: true,
            ..Self::color_2d(
                name,
                vk::Extent2D {
                    width: edge,
                    height: edge,
                },
                format,
                usage,
            )
        }
    }

    /// Depth attachment with `layers` array layers.
    pub fn depth(name: &'static str, extent: vk::Extent2D, layers: u32) -> Self {
        Self {
            name,
            extent,
            format: DEPTH_FORMAT,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            array_layers: layers,
            cube: false,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Span covering every layer of the image.
    pub fn full_span(&self) -> SubresourceSpan {
        SubresourceSpan {
            aspect: self.aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// View type for the default view.
    pub fn default_view_type(&self) -> vk::ImageViewType {
        if self.cube {
            vk::ImageViewType::CUBE
        } else if self.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        }
    }

    fn validate(&self) -> RhiResult<()> {
        if self.extent.width == 0 || self.extent.height == 0 || self.array_layers == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "image '{}' has an empty extent or no layers",
                self.name
            )));
        }
        if self.cube && (self.array_layers != 6 || self.extent.width != self.extent.height) {
            return Err(RhiError::InvalidHandle(format!(
                "cube image '{}' needs 6 square layers",
                self.name
            )));
        }
        Ok(())
    }
}

/// Image with bound memory and owned views.
///
/// Dropping destroys every view, then the image, then frees the allocation.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    allocation: Option<Allocation>,
    desc: ImageDesc,
    view: vk::ImageView,
    layer_views: Vec<vk::ImageView>,
    array_view: Option<vk::ImageView>,
}

impl Image {
    /// Creates the image, binds memory and creates the default view.
    ///
    /// # Errors
    ///
    /// Fails on an invalid description, when no memory type fits, or when a
    /// Vulkan call fails. Partially created objects are released.
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        desc.validate()?;

        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = match device.allocate(desc.name, requirements, desc.location, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());

        // From here on Drop cleans up whatever exists
        let mut this = Self {
            device,
            image,
            allocation: Some(allocation),
            desc: *desc,
            view: vk::ImageView::null(),
            layer_views: Vec::new(),
            array_view: None,
        };

        unsafe { this.device.handle().bind_image_memory(image, memory, offset)? };

        this.view = this.create_view(desc.default_view_type(), 0, desc.array_layers)?;

        debug!(
            "Created image '{}': {}x{}, {} layer(s), {:?}",
            desc.name, desc.extent.width, desc.extent.height, desc.array_layers, desc.format
        );

        Ok(this)
    }

    fn create_view(
        &self,
        view_type: vk::ImageViewType,
        base_layer: u32,
        layer_count: u32,
    ) -> RhiResult<vk::ImageView> {
        let range = SubresourceSpan {
            base_array_layer: base_layer,
            layer_count,
            ..self.desc.full_span()
        };
        let create_info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(view_type)
            .format(self.desc.format)
            .subresource_range(range.to_vk());

        let view = unsafe { self.device.handle().create_image_view(&create_info, None)? };
        Ok(view)
    }

    /// Creates one 2D view per array layer. Idempotent.
    pub fn create_layer_views(&mut self) -> RhiResult<()> {
        if !self.layer_views.is_empty() {
            return Ok(());
        }
        for layer in 0..self.desc.array_layers {
            let view = self.create_view(vk::ImageViewType::TYPE_2D, layer, 1)?;
            self.layer_views.push(view);
        }
        Ok(())
    }

    /// Creates a 2D array view over all layers. Idempotent.
    pub fn create_array_view(&mut self) -> RhiResult<()> {
        if self.array_view.is_none() {
            let view = self.create_view(
                vk::ImageViewType::TYPE_2D_ARRAY,
                0,
                self.desc.array_layers,
            )?;
            self.array_view = Some(view);
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Default view: cube, 2D array or 2D.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// 2D view of one layer, if layer views were created.
    pub fn layer_view(&self, layer: u32) -> Option<vk::ImageView> {
        self.layer_views.get(layer as usize).copied()
    }

    #[inline]
    pub fn array_view(&self) -> Option<vk::ImageView> {
        self.array_view
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn full_span(&self) -> SubresourceSpan {
        self.desc.full_span()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        let device = self.device.handle();
        unsafe {
            for view in self.layer_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if let Some(view) = self.array_view.take() {
                device.destroy_image_view(view, None);
            }
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free(allocation);
        }
        debug!("Destroyed image '{}'", self.desc.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_desc_defaults() {
        let desc = ImageDesc::cube(
            "cube",
            512,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert_eq!(desc.array_layers, 6);
        assert_eq!(desc.default_view_type(), vk::ImageViewType::CUBE);
        assert_eq!(desc.full_span().layer_count, 6);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_layered_depth_uses_array_view() {
        let extent = vk::Extent2D {
            width: 512,
            height: 512,
        };
        let desc = ImageDesc::depth("depth", extent, 6);
        assert_eq!(desc.default_view_type(), vk::ImageViewType::TYPE_2D_ARRAY);
        assert_eq!(desc.full_span().aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            ImageDesc::depth("depth", extent, 1).default_view_type(),
            vk::ImageViewType::TYPE_2D
        );
    }

    #[test]
    fn test_invalid_descriptions_rejected() {
        let mut desc = ImageDesc::cube(
            "cube",
            512,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        desc.extent.height = 256;
        assert!(desc.validate().is_err());

        let empty = ImageDesc::color_2d(
            "empty",
            vk::Extent2D::default(),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert!(empty.validate().is_err());
    }
}
