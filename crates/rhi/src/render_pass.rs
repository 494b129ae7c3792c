//! Render passes and framebuffers.
//!
//! Every render pass in the renderer has the same shape: one color attachment
//! cleared on load and stored, an optional depth attachment cleared on load and
//! discarded, and a single graphics subpass. What varies is the color format
//! and the layout the color attachment is left in, `PRESENT_SRC_KHR` for the
//! swapchain and `COLOR_ATTACHMENT_OPTIMAL` for offscreen targets whose layout
//! is then managed by explicit barriers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Shape of a single-subpass render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
    pub color_final_layout: vk::ImageLayout,
}

impl RenderPassDesc {
    /// Attachment descriptions in attachment index order.
    pub fn attachments(&self) -> Vec<vk::AttachmentDescription> {
        let mut attachments = vec![
            vk::AttachmentDescription::default()
                .format(self.color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(self.color_final_layout),
        ];

        if let Some(depth_format) = self.depth_format {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(depth_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
        }

        attachments
    }

    /// Orders the load-op clears after the previous pass's attachment
    /// writes, including the depth writes of its late fragment tests.
    pub fn external_dependency(&self) -> vk::SubpassDependency {
        let attachment_writes =
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(attachment_writes)
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(attachment_writes)
    }
}

/// Vulkan render pass wrapper.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    pub fn new(device: Arc<Device>, desc: &RenderPassDesc) -> RhiResult<Self> {
        let attachments = desc.attachments();

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if desc.depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }
        let subpasses = [subpass];

        let dependencies = [desc.external_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
        debug!(
            "Created render pass: color {:?}, depth {:?}, final {:?}",
            desc.color_format, desc.depth_format, desc.color_final_layout
        );

        Ok(Self {
            device,
            render_pass,
            desc: *desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass");
    }
}

/// Vulkan framebuffer wrapper.
///
/// Does not own its attachments; they must outlive the framebuffer.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    layers: u32,
}

impl Framebuffer {
    /// Creates a framebuffer for `render_pass`.
    ///
    /// `layers` greater than one is used with layered attachments, where the
    /// geometry stage selects the layer per primitive.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        layers: u32,
    ) -> RhiResult<Self> {
        if layers == 0 || extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "framebuffer {}x{} with {} layer(s)",
                extent.width, extent.height, layers
            )));
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(layers);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
        debug!(
            "Created framebuffer {}x{} ({} layer(s))",
            extent.width, extent.height, layers
        );

        Ok(Self {
            device,
            framebuffer,
            extent,
            layers,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn layers(&self) -> u32 {
        self.layers
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        debug!("Destroyed framebuffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_pass_attachments() {
        let desc = RenderPassDesc {
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: Some(vk::Format::D32_SFLOAT),
            color_final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        let attachments = desc.attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            attachments[1].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_color_only_pass() {
        let desc = RenderPassDesc {
            color_format: vk::Format::R8G8B8A8_UNORM,
            depth_format: None,
            color_final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let attachments = desc.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].initial_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_clear_waits_for_previous_depth_writes() {
        let desc = RenderPassDesc {
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: Some(vk::Format::D32_SFLOAT),
            color_final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        let dependency = desc.external_dependency();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert!(
            dependency
                .src_stage_mask
                .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
        );
        assert!(
            dependency
                .src_access_mask
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );
        assert!(
            dependency
                .dst_stage_mask
                .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        );
        assert_eq!(dependency.src_access_mask, dependency.dst_access_mask);
    }
}
