//! Image resource states and layout transitions.
//!
//! Every image the renderer hands between passes is tracked as a
//! [`ResourceState`]. A state fixes three things at once: the image layout, the
//! access mask the next user needs, and the pipeline stage where that access
//! happens. An [`ImageTransition`] between two states therefore has everything
//! a `VkImageMemoryBarrier` needs except the subresource span, which the caller
//! states explicitly through [`SubresourceSpan`].
//!
//! For a cube image the span must cover all six layers in a single barrier:
//!
//! ```
//! use framekit_rhi::barrier::{ImageTransition, ResourceState, SubresourceSpan};
//! use framekit_rhi::vk;
//!
//! let transition = ImageTransition::new(
//!     vk::Image::null(),
//!     SubresourceSpan::color_layers(6),
//!     ResourceState::ColorAttachment,
//!     ResourceState::ShaderRead,
//! );
//! assert_eq!(transition.to_vk_barrier().subresource_range.layer_count, 6);
//! ```

use ash::vk;

use crate::encoder::CommandEncoder;

/// Declared state of an image between passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Contents are discarded; only valid as a source state.
    Undefined,
    /// Written as a color attachment.
    ColorAttachment,
    /// Sampled from fragment shaders.
    ShaderRead,
    /// Read and written as a storage image by compute shaders (`GENERAL`).
    StorageImage,
    /// Written by a transfer.
    TransferDst,
}

impl ResourceState {
    pub fn layout(self) -> vk::ImageLayout {
        match self {
            ResourceState::Undefined => vk::ImageLayout::UNDEFINED,
            ResourceState::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ResourceState::ShaderRead => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ResourceState::StorageImage => vk::ImageLayout::GENERAL,
            ResourceState::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        }
    }

    pub fn access(self) -> vk::AccessFlags {
        match self {
            ResourceState::Undefined => vk::AccessFlags::empty(),
            ResourceState::ColorAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ResourceState::ShaderRead => vk::AccessFlags::SHADER_READ,
            ResourceState::StorageImage => {
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
            }
            ResourceState::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
        }
    }

    pub fn stage(self) -> vk::PipelineStageFlags {
        match self {
            ResourceState::Undefined => vk::PipelineStageFlags::TOP_OF_PIPE,
            ResourceState::ColorAttachment => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ResourceState::ShaderRead => vk::PipelineStageFlags::FRAGMENT_SHADER,
            ResourceState::StorageImage => vk::PipelineStageFlags::COMPUTE_SHADER,
            ResourceState::TransferDst => vk::PipelineStageFlags::TRANSFER,
        }
    }
}

/// Mip and layer range affected by a barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubresourceSpan {
    pub aspect: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl SubresourceSpan {
    /// Color aspect, first mip, layers `0..layer_count`.
    pub const fn color_layers(layer_count: u32) -> Self {
        Self {
            aspect: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        }
    }

    /// A single color layer.
    pub const fn color_layer(layer: u32) -> Self {
        Self {
            base_array_layer: layer,
            layer_count: 1,
            ..Self::color_layers(1)
        }
    }

    /// Depth aspect over `layer_count` layers.
    pub const fn depth_layers(layer_count: u32) -> Self {
        Self {
            aspect: vk::ImageAspectFlags::DEPTH,
            ..Self::color_layers(layer_count)
        }
    }

    pub fn to_vk(self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect)
            .base_mip_level(self.base_mip_level)
            .level_count(self.level_count)
            .base_array_layer(self.base_array_layer)
            .layer_count(self.layer_count)
    }

    /// True if every layer of `other` lies inside this span.
    pub fn covers(&self, other: &SubresourceSpan) -> bool {
        self.aspect.contains(other.aspect)
            && self.base_mip_level <= other.base_mip_level
            && self.base_mip_level + self.level_count >= other.base_mip_level + other.level_count
            && self.base_array_layer <= other.base_array_layer
            && self.base_array_layer + self.layer_count
                >= other.base_array_layer + other.layer_count
    }
}

/// A state change of one image span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: vk::Image,
    pub span: SubresourceSpan,
    pub from: ResourceState,
    pub to: ResourceState,
}

impl ImageTransition {
    pub fn new(
        image: vk::Image,
        span: SubresourceSpan,
        from: ResourceState,
        to: ResourceState,
    ) -> Self {
        Self {
            image,
            span,
            from,
            to,
        }
    }

    #[inline]
    pub fn src_stage(&self) -> vk::PipelineStageFlags {
        self.from.stage()
    }

    #[inline]
    pub fn dst_stage(&self) -> vk::PipelineStageFlags {
        self.to.stage()
    }

    /// Builds the barrier; queue family ownership is never transferred.
    pub fn to_vk_barrier(&self) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .src_access_mask(self.from.access())
            .dst_access_mask(self.to.access())
            .old_layout(self.from.layout())
            .new_layout(self.to.layout())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.span.to_vk())
    }

    /// Records this transition as its own pipeline barrier.
    pub fn record<E: CommandEncoder + ?Sized>(&self, encoder: &E) {
        encoder.pipeline_barrier(self.src_stage(), self.dst_stage(), &[self.to_vk_barrier()]);
    }
}

/// Records several transitions as one pipeline barrier.
///
/// Stage masks are the union over all transitions.
pub fn record_transitions<E: CommandEncoder + ?Sized>(encoder: &E, transitions: &[ImageTransition]) {
    if transitions.is_empty() {
        return;
    }
    let src_stage = transitions
        .iter()
        .fold(vk::PipelineStageFlags::empty(), |acc, t| acc | t.src_stage());
    let dst_stage = transitions
        .iter()
        .fold(vk::PipelineStageFlags::empty(), |acc, t| acc | t.dst_stage());
    let barriers: Vec<vk::ImageMemoryBarrier<'static>> =
        transitions.iter().map(ImageTransition::to_vk_barrier).collect();
    encoder.pipeline_barrier(src_stage, dst_stage, &barriers);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_to_shader_read_masks() {
        let transition = ImageTransition::new(
            vk::Image::null(),
            SubresourceSpan::color_layers(6),
            ResourceState::ColorAttachment,
            ResourceState::ShaderRead,
        );
        let barrier = transition.to_vk_barrier();

        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(
            transition.src_stage(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(transition.dst_stage(), vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(barrier.subresource_range.base_array_layer, 0);
        assert_eq!(barrier.subresource_range.layer_count, 6);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn test_storage_image_round_trip_masks() {
        let to_read = ImageTransition::new(
            vk::Image::null(),
            SubresourceSpan::color_layers(1),
            ResourceState::StorageImage,
            ResourceState::ShaderRead,
        );
        assert_eq!(to_read.to_vk_barrier().old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(to_read.src_stage(), vk::PipelineStageFlags::COMPUTE_SHADER);

        let back = ImageTransition::new(
            vk::Image::null(),
            SubresourceSpan::color_layers(1),
            ResourceState::ShaderRead,
            ResourceState::StorageImage,
        );
        assert_eq!(back.to_vk_barrier().new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(
            back.to_vk_barrier().dst_access_mask,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
    }

    #[test]
    fn test_undefined_source_has_no_access() {
        let transition = ImageTransition::new(
            vk::Image::null(),
            SubresourceSpan::color_layers(1),
            ResourceState::Undefined,
            ResourceState::TransferDst,
        );
        let barrier = transition.to_vk_barrier();
        assert!(barrier.src_access_mask.is_empty());
        assert_eq!(transition.src_stage(), vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(transition.dst_stage(), vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_span_coverage() {
        let all = SubresourceSpan::color_layers(6);
        assert!(all.covers(&SubresourceSpan::color_layer(5)));
        assert!(!SubresourceSpan::color_layer(0).covers(&all));
        assert!(!SubresourceSpan::color_layers(6).covers(&SubresourceSpan::depth_layers(1)));
    }
}
