//! Command recording seam.
//!
//! [`CommandEncoder`] is the subset of command-buffer recording the frame loop
//! and pass executor use. [`crate::command::CommandBuffer`] implements it on top
//! of `vkCmd*`; tests implement it with recorders that log every call so
//! ordering can be asserted without a GPU.

use ash::vk;

use crate::error::RhiResult;

/// Arguments to begin a render pass instance.
#[derive(Clone, Copy)]
pub struct RenderPassBegin<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_values: &'a [vk::ClearValue],
}

impl RenderPassBegin<'_> {
    /// Returns the render area extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }
}

/// Records commands into a primary command buffer.
///
/// Recording methods take `&self`, mirroring `vkCmd*` which only needs the
/// command buffer handle. Implementations are not expected to be shared
/// between threads while recording.
pub trait CommandEncoder {
    /// Resets the buffer to the initial state.
    fn reset(&self) -> RhiResult<()>;

    /// Starts recording for one-time submission.
    fn begin(&self) -> RhiResult<()>;

    /// Finishes recording.
    fn end(&self) -> RhiResult<()>;

    /// Raw handle used at submission time.
    fn handle(&self) -> vk::CommandBuffer;

    fn begin_render_pass(&self, begin: &RenderPassBegin<'_>);

    fn end_render_pass(&self);

    fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );

    fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[u64]);

    fn bind_index_buffer(&self, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType);

    fn set_viewport(&self, viewport: &vk::Viewport);

    fn set_scissor(&self, scissor: &vk::Rect2D);

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    /// Records image memory barriers between two stage masks.
    fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );
}
