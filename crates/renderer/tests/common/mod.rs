//! GPU-free doubles for the frame loop: an encoder, a fence and a
//! presentation backend that append every call to a shared event log.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;

use framekit_renderer::{RendererError, RendererResult};
use framekit_renderer::backend::{AcquireOutcome, FrameBackend};
use framekit_renderer::executor::PassExecutor;
use framekit_renderer::frame_ring::FrameRing;
use framekit_renderer::overlay::OverlayRecorder;
use framekit_renderer::pass::PassSequence;
use framekit_renderer::sequencer::{FrameContext, FrameRecorder};
use framekit_renderer::target::RenderTargets;
use framekit_rhi::{RhiError, RhiResult};
use framekit_rhi::encoder::{CommandEncoder, RenderPassBegin};
use framekit_rhi::sync::GpuFence;

/// One recorded call.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    // Encoder lifecycle, tagged with the encoder id.
    Reset(usize),
    Begin(usize),
    End(usize),

    // Recording.
    BeginRenderPass {
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_count: usize,
    },
    EndRenderPass,
    BindPipeline(vk::PipelineBindPoint, vk::Pipeline),
    BindDescriptorSets(vk::PipelineBindPoint, Vec<vk::DescriptorSet>),
    BindVertexBuffers,
    BindIndexBuffer,
    Viewport { y: f32, height: f32 },
    Scissor(vk::Extent2D),
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    Dispatch(u32, u32, u32),
    Barrier(Vec<BarrierRecord>),
    Overlay,

    // Fences, tagged with the fence id.
    FenceWait(usize),
    FenceReset(usize),

    // Backend.
    Acquire,
    Submit { image_index: u32, encoder: usize },
    Present(u32),
    Recreate(u32, u32),
    /// Empty batch consuming an abandoned acquire.
    ReleaseAcquire { signals_fence: bool },

    // Scene.
    UpdateUniforms(usize),
}

/// The parts of an image barrier the tests care about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierRecord {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

pub fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<Event> {
    log.borrow().clone()
}

/// Drops everything logged so far.
pub fn clear(log: &EventLog) {
    log.borrow_mut().clear();
}

pub struct RecordingEncoder {
    pub id: usize,
    log: EventLog,
}

impl RecordingEncoder {
    pub fn new(id: usize, log: &EventLog) -> Self {
        Self {
            id,
            log: log.clone(),
        }
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }
}

impl CommandEncoder for RecordingEncoder {
    fn reset(&self) -> RhiResult<()> {
        self.push(Event::Reset(self.id));
        Ok(())
    }

    fn begin(&self) -> RhiResult<()> {
        self.push(Event::Begin(self.id));
        Ok(())
    }

    fn end(&self) -> RhiResult<()> {
        self.push(Event::End(self.id));
        Ok(())
    }

    fn handle(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(self.id as u64 + 1)
    }

    fn begin_render_pass(&self, begin: &RenderPassBegin<'_>) {
        self.push(Event::BeginRenderPass {
            framebuffer: begin.framebuffer,
            extent: begin.extent(),
            clear_count: begin.clear_values.len(),
        });
    }

    fn end_render_pass(&self) {
        self.push(Event::EndRenderPass);
    }

    fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.push(Event::BindPipeline(bind_point, pipeline));
    }

    fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        _first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.push(Event::BindDescriptorSets(bind_point, sets.to_vec()));
    }

    fn bind_vertex_buffers(&self, _first_binding: u32, _buffers: &[vk::Buffer], _offsets: &[u64]) {
        self.push(Event::BindVertexBuffers);
    }

    fn bind_index_buffer(&self, _buffer: vk::Buffer, _offset: u64, _index_type: vk::IndexType) {
        self.push(Event::BindIndexBuffer);
    }

    fn set_viewport(&self, viewport: &vk::Viewport) {
        self.push(Event::Viewport {
            y: viewport.y,
            height: viewport.height,
        });
    }

    fn set_scissor(&self, scissor: &vk::Rect2D) {
        self.push(Event::Scissor(scissor.extent));
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.push(Event::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.push(Event::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        self.push(Event::Dispatch(x, y, z));
    }

    fn pipeline_barrier(
        &self,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let records = image_barriers
            .iter()
            .map(|barrier| BarrierRecord {
                image: barrier.image,
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
                base_array_layer: barrier.subresource_range.base_array_layer,
                layer_count: barrier.subresource_range.layer_count,
            })
            .collect();
        self.push(Event::Barrier(records));
    }
}

/// Fence that logs waits and resets. Created signaled, like the real
/// per-slot fences; only [`MockFence::signal`] signals it again.
pub struct MockFence {
    pub id: usize,
    log: EventLog,
    signaled: Cell<bool>,
}

impl MockFence {
    pub fn new(id: usize, log: &EventLog) -> Self {
        Self {
            id,
            log: log.clone(),
            signaled: Cell::new(true),
        }
    }

    /// Stands in for the device finishing the batch that carries the fence.
    pub fn signal(&self) {
        self.signaled.set(true);
    }
}

impl GpuFence for MockFence {
    /// Fails with a timeout instead of blocking when nothing will signal it.
    fn wait(&self, _timeout: u64) -> RhiResult<()> {
        self.log.borrow_mut().push(Event::FenceWait(self.id));
        if self.signaled.get() {
            Ok(())
        } else {
            Err(RhiError::VulkanError(vk::Result::TIMEOUT))
        }
    }

    fn reset(&self) -> RhiResult<()> {
        self.log.borrow_mut().push(Event::FenceReset(self.id));
        self.signaled.set(false);
        Ok(())
    }

    fn is_signaled(&self) -> RhiResult<bool> {
        Ok(self.signaled.get())
    }

    fn handle(&self) -> vk::Fence {
        vk::Fence::from_raw(self.id as u64 + 1)
    }
}

/// Submit closure for driving a ring directly: the batch completes at once.
pub fn completed_submit(_encoder: &RecordingEncoder, fence: &MockFence) -> RendererResult<()> {
    fence.signal();
    Ok(())
}

/// Ring of `slots` recording encoders and fences sharing `log`.
pub fn mock_ring(log: &EventLog, slots: usize) -> FrameRing<RecordingEncoder, MockFence> {
    FrameRing::new((0..slots).map(|id| (RecordingEncoder::new(id, log), MockFence::new(id, log))))
}

/// Scripted presentation backend.
///
/// Acquires follow `script` and fall back to cycling through the images once
/// it is empty. Each recreate swaps in a fresh depth handle.
pub struct MockBackend {
    log: EventLog,
    pub script: VecDeque<AcquireOutcome>,
    image_count: u32,
    /// Image count reported after the next recreate.
    pub image_count_after_recreate: Option<u32>,
    extent: vk::Extent2D,
    depth_generation: u64,
    next_image: u32,
    /// Fails the next submit with a lost device, leaving its fence reset.
    pub fail_next_submit: bool,
    /// Fails the next release of an abandoned acquire.
    pub fail_next_release: bool,
}

impl MockBackend {
    pub fn new(log: &EventLog, image_count: u32, width: u32, height: u32) -> Self {
        Self {
            log: log.clone(),
            script: VecDeque::new(),
            image_count,
            image_count_after_recreate: None,
            extent: vk::Extent2D { width, height },
            depth_generation: 0,
            next_image: 0,
            fail_next_submit: false,
            fail_next_release: false,
        }
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = AcquireOutcome>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }
}

pub fn acquired(image_index: u32) -> AcquireOutcome {
    AcquireOutcome::Acquired {
        image_index,
        suboptimal: false,
    }
}

impl FrameBackend for MockBackend {
    type Encoder = RecordingEncoder;
    type Fence = MockFence;

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn acquire(&mut self) -> RendererResult<AcquireOutcome> {
        self.push(Event::Acquire);
        if let Some(outcome) = self.script.pop_front() {
            return Ok(outcome);
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(acquired(image_index))
    }

    fn submit(
        &mut self,
        image_index: u32,
        encoder: &RecordingEncoder,
        fence: &MockFence,
    ) -> RendererResult<()> {
        if std::mem::take(&mut self.fail_next_submit) {
            return Err(vk::Result::ERROR_DEVICE_LOST.into());
        }
        self.push(Event::Submit {
            image_index,
            encoder: encoder.id,
        });
        fence.signal();
        Ok(())
    }

    fn release_acquire(&mut self, fence: Option<&MockFence>) -> RendererResult<()> {
        if std::mem::take(&mut self.fail_next_release) {
            return Err(vk::Result::ERROR_DEVICE_LOST.into());
        }
        self.push(Event::ReleaseAcquire {
            signals_fence: fence.is_some(),
        });
        if let Some(fence) = fence {
            fence.signal();
        }
        Ok(())
    }

    fn present(&mut self, image_index: u32) -> RendererResult<bool> {
        self.push(Event::Present(image_index));
        Ok(false)
    }

    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        vk::Framebuffer::from_raw(100 + image_index as u64)
    }

    fn depth_image(&self) -> vk::Image {
        vk::Image::from_raw(1000 + self.depth_generation)
    }

    fn recreate(&mut self, width: u32, height: u32) -> RendererResult<u32> {
        self.push(Event::Recreate(width, height));
        self.extent = vk::Extent2D { width, height };
        self.depth_generation += 1;
        if let Some(count) = self.image_count_after_recreate.take() {
            self.image_count = count;
        }
        Ok(self.image_count)
    }
}

/// Overlay that only logs that it ran.
pub struct LoggingOverlay {
    log: EventLog,
}

impl LoggingOverlay {
    pub fn new(log: &EventLog) -> Self {
        Self { log: log.clone() }
    }
}

impl OverlayRecorder for LoggingOverlay {
    fn record(&mut self, _encoder: &dyn CommandEncoder, _frame: &FrameContext) -> RendererResult<()> {
        self.log.borrow_mut().push(Event::Overlay);
        Ok(())
    }
}

/// Scene double: logs uniform updates and records one pass sequence.
pub struct SequenceRecorder {
    log: EventLog,
    pub sequence: PassSequence,
    pub targets: RenderTargets,
    overlay: LoggingOverlay,
    /// Fails the next recording after its passes were recorded.
    pub fail_next_record: bool,
}

impl SequenceRecorder {
    pub fn new(log: &EventLog, sequence: PassSequence, targets: RenderTargets) -> Self {
        Self {
            log: log.clone(),
            sequence,
            targets,
            overlay: LoggingOverlay::new(log),
            fail_next_record: false,
        }
    }

    pub fn empty(log: &EventLog) -> Self {
        Self::new(log, PassSequence::new("empty"), RenderTargets::new())
    }
}

impl FrameRecorder<RecordingEncoder> for SequenceRecorder {
    fn update_uniforms(&mut self, frame: &FrameContext) -> RendererResult<()> {
        self.log.borrow_mut().push(Event::UpdateUniforms(frame.slot));
        Ok(())
    }

    fn record(&mut self, encoder: &RecordingEncoder, frame: &FrameContext) -> RendererResult<()> {
        PassExecutor::record(
            encoder,
            frame,
            &self.sequence,
            &mut self.targets,
            &mut self.overlay,
        )?;
        if std::mem::take(&mut self.fail_next_record) {
            return Err(RendererError::MissingSequence("failing"));
        }
        Ok(())
    }

    fn end_frame(&mut self, _frame: &FrameContext, submitted: bool) {
        self.targets.finish_frame(submitted);
    }
}

/// Frame context for recording outside the sequencer.
pub fn frame_context(slot: usize, width: u32, height: u32) -> FrameContext {
    FrameContext {
        slot,
        image_index: slot as u32,
        extent: vk::Extent2D { width, height },
        framebuffer: vk::Framebuffer::from_raw(100 + slot as u64),
        frame_number: 0,
    }
}
