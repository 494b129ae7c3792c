//! Device resource factory.
//!
//! [`ResourceFactory`] is the one place that creates memory-backed GPU objects
//! during setup. Every object it returns is fully usable: memory is bound and
//! views exist. Every object is also an owning RAII value, so releasing it is
//! a matter of dropping it, in any order, on success and on error paths.
//!
//! Uploads into device-local memory go through a staging buffer and a one-shot
//! command buffer, then block on queue idle. That serializes setup-time
//! uploads, which is acceptable because none of them happen per frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framekit_rhi::device::Device;
//! use framekit_renderer::factory::ResourceFactory;
//!
//! # fn example(device: Arc<Device>) -> Result<(), framekit_renderer::RendererError> {
//! let factory = ResourceFactory::new(device, 256)?;
//!
//! let vertices: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let triangle = factory.create_simple_model(&vertices, &[0, 1, 2])?;
//! assert_eq!(triangle.index_count, 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use framekit_rhi::barrier::{ImageTransition, ResourceState, SubresourceSpan};
use framekit_rhi::buffer::{Buffer, BufferUsage};
use framekit_rhi::command::{CommandBuffer, CommandPool};
use framekit_rhi::descriptor::DescriptorPool;
use framekit_rhi::device::Device;
use framekit_rhi::encoder::CommandEncoder;
use framekit_rhi::image::{Image, ImageDesc};
use framekit_rhi::render_pass::{Framebuffer, RenderPass, RenderPassDesc};
use framekit_rhi::sampler::{Sampler, SamplerDesc};
use framekit_rhi::sync::Fence;

use crate::error::RendererResult;

/// Extra views to create alongside an image's default view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtraViews {
    /// One 2D view per array layer.
    pub per_layer: bool,
    /// One 2D-array view over all layers.
    pub array: bool,
}

/// Device-local vertex and index buffers of one mesh.
pub struct SimpleModel {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

/// Creates buffers, images, framebuffers, sync objects and descriptor sets.
pub struct ResourceFactory {
    device: Arc<Device>,
    command_pool: CommandPool,
    descriptor_pool: DescriptorPool,
}

impl ResourceFactory {
    /// Creates the factory with a graphics command pool and a descriptor pool
    /// of `descriptor_capacity` sets.
    pub fn new(device: Arc<Device>, descriptor_capacity: u32) -> RendererResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let descriptor_pool = DescriptorPool::with_capacity(device.clone(), descriptor_capacity)?;

        info!(
            "Resource factory ready (descriptor capacity {})",
            descriptor_capacity
        );

        Ok(Self {
            device,
            command_pool,
            descriptor_pool,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    // =========================================================================
    // Memory-backed Objects
    // =========================================================================

    pub fn create_buffer(&self, usage: BufferUsage, size: vk::DeviceSize) -> RendererResult<Buffer> {
        Ok(Buffer::new(self.device.clone(), usage, size)?)
    }

    /// Creates an image with its default view plus the requested extra views.
    pub fn create_texture(&self, desc: &ImageDesc, views: ExtraViews) -> RendererResult<Image> {
        let mut image = Image::new(self.device.clone(), desc)?;
        if views.per_layer {
            image.create_layer_views()?;
        }
        if views.array {
            image.create_array_view()?;
        }
        Ok(image)
    }

    /// Depth attachment with `layers` layers.
    pub fn create_depth(&self, extent: vk::Extent2D, layers: u32) -> RendererResult<Image> {
        let desc = ImageDesc::depth("depth", extent, layers);
        let views = ExtraViews {
            per_layer: false,
            array: false,
        };
        self.create_texture(&desc, views)
    }

    /// `count` host-visible uniform buffers of `size` bytes, one per frame slot.
    pub fn create_uniform_buffers(
        &self,
        size: vk::DeviceSize,
        count: usize,
    ) -> RendererResult<Vec<Buffer>> {
        (0..count)
            .map(|_| self.create_buffer(BufferUsage::Uniform, size))
            .collect()
    }

    /// Copies `data` to the start of a host-visible buffer.
    pub fn write_to_host_visible(&self, buffer: &Buffer, data: &[u8]) -> RendererResult<()> {
        buffer.write_data(0, data)?;
        Ok(())
    }

    /// Uploads vertex and index data into device-local buffers.
    pub fn create_simple_model<V: bytemuck::Pod>(
        &self,
        vertices: &[V],
        indices: &[u32],
    ) -> RendererResult<SimpleModel> {
        let vertex_buffer = self.upload_buffer(BufferUsage::Vertex, bytemuck::cast_slice(vertices))?;
        let index_buffer = self.upload_buffer(BufferUsage::Index, bytemuck::cast_slice(indices))?;

        debug!(
            "Uploaded model: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );

        Ok(SimpleModel {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    fn upload_buffer(&self, usage: BufferUsage, bytes: &[u8]) -> RendererResult<Buffer> {
        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, bytes)?;
        let destination = self.create_buffer(usage, bytes.len() as vk::DeviceSize)?;

        let cmd = self.begin_one_shot()?;
        cmd.copy_buffer(staging.handle(), destination.handle(), staging.size());
        self.finish_one_shot(cmd)?;

        // `staging` drops here, after the queue went idle
        Ok(destination)
    }

    /// Creates an image and fills every layer from tightly packed `texels`,
    /// leaving it in `final_state`.
    pub fn upload_texture(
        &self,
        desc: &ImageDesc,
        views: ExtraViews,
        texels: &[u8],
        final_state: ResourceState,
    ) -> RendererResult<Image> {
        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, texels)?;
        let image = self.create_texture(desc, views)?;
        let span = image.full_span();

        let cmd = self.begin_one_shot()?;
        ImageTransition::new(
            image.handle(),
            span,
            ResourceState::Undefined,
            ResourceState::TransferDst,
        )
        .record(&cmd);
        cmd.copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            desc.extent,
            desc.array_layers,
        );
        ImageTransition::new(image.handle(), span, ResourceState::TransferDst, final_state)
            .record(&cmd);
        self.finish_one_shot(cmd)?;

        debug!(
            "Uploaded texture '{}' ({} bytes, {} layer(s))",
            desc.name,
            texels.len(),
            desc.array_layers
        );

        Ok(image)
    }

    /// Records and waits for a single layout transition.
    pub fn transition_now(
        &self,
        image: vk::Image,
        span: SubresourceSpan,
        from: ResourceState,
        to: ResourceState,
    ) -> RendererResult<()> {
        let cmd = self.begin_one_shot()?;
        ImageTransition::new(image, span, from, to).record(&cmd);
        self.finish_one_shot(cmd)
    }

    // =========================================================================
    // Passes and Framebuffers
    // =========================================================================

    pub fn create_render_pass(
        &self,
        color_format: vk::Format,
        depth_format: Option<vk::Format>,
        color_final_layout: vk::ImageLayout,
    ) -> RendererResult<RenderPass> {
        let desc = RenderPassDesc {
            color_format,
            depth_format,
            color_final_layout,
        };
        Ok(RenderPass::new(self.device.clone(), &desc)?)
    }

    pub fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        layers: u32,
    ) -> RendererResult<Framebuffer> {
        Ok(Framebuffer::new(
            self.device.clone(),
            render_pass,
            attachments,
            extent,
            layers,
        )?)
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> RendererResult<Sampler> {
        Ok(Sampler::new(self.device.clone(), desc)?)
    }

    // =========================================================================
    // Commands and Synchronization
    // =========================================================================

    pub fn create_fence(&self, signaled: bool) -> RendererResult<Fence> {
        Ok(Fence::new(self.device.clone(), signaled)?)
    }

    pub fn create_command_buffer(&self) -> RendererResult<CommandBuffer> {
        Ok(CommandBuffer::new(self.device.clone(), &self.command_pool)?)
    }

    pub fn create_command_buffers(&self, count: u32) -> RendererResult<Vec<CommandBuffer>> {
        let handles = self.command_pool.allocate_command_buffers(count)?;
        Ok(handles
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(self.device.clone(), handle))
            .collect())
    }

    /// Allocates a command buffer and begins recording.
    pub fn begin_one_shot(&self) -> RendererResult<CommandBuffer> {
        let cmd = self.create_command_buffer()?;
        if let Err(e) = cmd.begin() {
            self.command_pool.free_command_buffers(&[cmd.handle()]);
            return Err(e.into());
        }
        Ok(cmd)
    }

    /// Ends `cmd`, submits it and blocks until the graphics queue is idle.
    pub fn finish_one_shot(&self, cmd: CommandBuffer) -> RendererResult<()> {
        let result = self.submit_and_wait(&cmd);
        self.command_pool.free_command_buffers(&[cmd.handle()]);
        result
    }

    fn submit_and_wait(&self, cmd: &CommandBuffer) -> RendererResult<()> {
        cmd.end()?;
        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .submit_graphics(&[submit_info], vk::Fence::null())?
        };
        self.device.graphics_queue_wait_idle()?;
        Ok(())
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    pub fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> RendererResult<vk::DescriptorSet> {
        let sets = self.descriptor_pool.allocate(&[layout])?;
        sets.into_iter().next().ok_or_else(|| {
            framekit_rhi::RhiError::InvalidHandle("driver returned no descriptor set".to_string())
                .into()
        })
    }

    /// One set per frame slot, all with `layout`.
    pub fn allocate_descriptor_sets(
        &self,
        layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> RendererResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count];
        Ok(self.descriptor_pool.allocate(&layouts)?)
    }
}
