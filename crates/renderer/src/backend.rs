//! Presentation backend.
//!
//! [`FrameBackend`] is everything the presentation sequencer needs from the
//! display side: acquire, submit, present, per-image framebuffers, and
//! rebuilding them on resize. [`SwapchainBackend`] implements it over a
//! Vulkan swapchain; tests implement it with recording mocks.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use framekit_platform::Surface;
use framekit_rhi::command::CommandBuffer;
use framekit_rhi::device::Device;
use framekit_rhi::encoder::CommandEncoder;
use framekit_rhi::image::{DEPTH_FORMAT, Image, ImageDesc};
use framekit_rhi::instance::Instance;
use framekit_rhi::render_pass::Framebuffer;
use framekit_rhi::swapchain::Swapchain;
use framekit_rhi::sync::{Fence, GpuFence, Semaphore};

use crate::error::{RendererError, RendererResult};

/// Result of asking for the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed; the frame must be skipped.
    OutOfDate,
}

/// Display-side operations of the frame loop.
pub trait FrameBackend {
    type Encoder: CommandEncoder;
    type Fence: GpuFence;

    /// Number of presentable images, fixed for the backend's lifetime.
    fn image_count(&self) -> u32;

    fn extent(&self) -> vk::Extent2D;

    /// Acquires the next image. Has no other side effect when out of date.
    fn acquire(&mut self) -> RendererResult<AcquireOutcome>;

    /// Submits `encoder` to run after the pending acquire, signaling the
    /// image's render-complete semaphore and `fence`.
    fn submit(
        &mut self,
        image_index: u32,
        encoder: &Self::Encoder,
        fence: &Self::Fence,
    ) -> RendererResult<()>;

    /// Gives up on the frame of the pending acquire.
    ///
    /// Queues an empty batch that waits on the acquire semaphore, so the
    /// semaphore is unsignaled again before it is reused, and signals `fence`
    /// when one is given. The acquired image is not presented.
    fn release_acquire(&mut self, fence: Option<&Self::Fence>) -> RendererResult<()>;

    /// Queues presentation. Returns `true` when the surface should be
    /// rebuilt (suboptimal or out of date).
    fn present(&mut self, image_index: u32) -> RendererResult<bool>;

    /// Framebuffer over image `image_index` and the shared depth attachment.
    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer;

    /// Current depth attachment image.
    fn depth_image(&self) -> vk::Image;

    /// Rebuilds swapchain, depth attachment and framebuffers for a new size,
    /// draining the device first. Returns the new image count.
    fn recreate(&mut self, width: u32, height: u32) -> RendererResult<u32>;
}

/// Depth attachment and per-image framebuffers sized to the swapchain.
pub struct SwapchainAttachments {
    framebuffers: Vec<Framebuffer>,
    depth: Image,
}

impl SwapchainAttachments {
    pub fn new(
        device: &Arc<Device>,
        swapchain: &Swapchain,
        render_pass: vk::RenderPass,
    ) -> RendererResult<Self> {
        let extent = swapchain.extent();
        let depth = Image::new(
            device.clone(),
            &ImageDesc::depth("swapchain depth", extent, 1),
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(device.clone(), render_pass, &[view, depth.view()], extent, 1)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Swapchain attachments: {} framebuffers at {}x{}, depth {:?}",
            framebuffers.len(),
            extent.width,
            extent.height,
            DEPTH_FORMAT
        );

        Ok(Self {
            framebuffers,
            depth,
        })
    }
}

/// [`FrameBackend`] over a window swapchain.
///
/// Fields drop in declaration order: attachments, swapchain, semaphores,
/// surface, then the instance reference.
pub struct SwapchainBackend {
    attachments: SwapchainAttachments,
    swapchain: Swapchain,
    acquire_semaphores: Vec<Semaphore>,
    render_complete: Vec<Semaphore>,
    next_acquire: usize,
    pending_acquire: Option<vk::Semaphore>,
    render_pass: vk::RenderPass,
    device: Arc<Device>,
    surface: Surface,
    instance: Arc<Instance>,
}

impl SwapchainBackend {
    /// Wraps `swapchain`, creating attachments for `render_pass` and one
    /// acquire and one render-complete semaphore per image.
    pub fn new(
        instance: Arc<Instance>,
        device: Arc<Device>,
        surface: Surface,
        swapchain: Swapchain,
        render_pass: vk::RenderPass,
    ) -> RendererResult<Self> {
        let attachments = SwapchainAttachments::new(&device, &swapchain, render_pass)?;
        let count = swapchain.image_count() as usize;
        let acquire_semaphores = (0..count)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let render_complete = (0..count)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Swapchain backend ready with {} images", count);

        Ok(Self {
            attachments,
            swapchain,
            acquire_semaphores,
            render_complete,
            next_acquire: 0,
            pending_acquire: None,
            render_pass,
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }
}

impl FrameBackend for SwapchainBackend {
    type Encoder = CommandBuffer;
    type Fence = Fence;

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn acquire(&mut self) -> RendererResult<AcquireOutcome> {
        let semaphore = self.acquire_semaphores[self.next_acquire].handle();
        match self.swapchain.acquire_next_image(semaphore) {
            Ok((image_index, suboptimal)) => {
                self.next_acquire = (self.next_acquire + 1) % self.acquire_semaphores.len();
                self.pending_acquire = Some(semaphore);
                Ok(AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn submit(
        &mut self,
        image_index: u32,
        encoder: &CommandBuffer,
        fence: &Fence,
    ) -> RendererResult<()> {
        let acquired = self
            .pending_acquire
            .ok_or(RendererError::NoPendingAcquire)?;

        let wait_semaphores = [acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [encoder.handle()];
        let signal_semaphores = [self.render_complete[image_index as usize].handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], fence.handle())?
        };
        // Kept until the queue accepts the batch, so a failed submit can
        // still release it.
        self.pending_acquire = None;
        Ok(())
    }

    fn release_acquire(&mut self, fence: Option<&Fence>) -> RendererResult<()> {
        let fence = fence.map_or(vk::Fence::null(), Fence::handle);
        let Some(acquired) = self.pending_acquire else {
            if fence != vk::Fence::null() {
                unsafe { self.device.submit_graphics(&[], fence)? };
            }
            return Ok(());
        };

        let wait_semaphores = [acquired];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);

        unsafe { self.device.submit_graphics(&[submit_info], fence)? };
        self.pending_acquire = None;
        warn!("Released acquired image without presenting it");
        Ok(())
    }

    fn present(&mut self, image_index: u32) -> RendererResult<bool> {
        let wait = self.render_complete[image_index as usize].handle();
        match self
            .swapchain
            .present(self.device.present_queue(), image_index, wait)
        {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!("Swapchain out of date on present");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.attachments
            .framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
            .unwrap_or_default()
    }

    fn depth_image(&self) -> vk::Image {
        self.attachments.depth.handle()
    }

    fn recreate(&mut self, width: u32, height: u32) -> RendererResult<u32> {
        // Presentation may still hold old images after every fence signaled.
        self.device.wait_idle()?;

        let count = self
            .swapchain
            .recreate(&self.instance, self.surface.handle(), width, height)?;

        // New attachments exist before the old ones are released.
        let attachments = SwapchainAttachments::new(&self.device, &self.swapchain, self.render_pass)?;
        let old = std::mem::replace(&mut self.attachments, attachments);
        drop(old);

        self.pending_acquire = None;
        Ok(count)
    }
}
