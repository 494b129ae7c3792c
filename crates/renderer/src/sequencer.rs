//! Presentation sequencer.
//!
//! [`PresentationSequencer::render_frame`] drives one frame:
//!
//! ```text
//! acquire image i ──out of date──> Skipped (nothing else touched)
//!      │
//! wait fence of slot i
//! update per-slot uniforms
//! reset + begin command buffer of slot i, record passes
//! end, reset fence, submit (wait acquire, signal render-complete, fence)
//! present (wait render-complete)
//! ```
//!
//! If anything between the fence wait and the submit fails, the frame is
//! abandoned: the acquire semaphore is consumed by an empty batch, a slot
//! whose fence was already reset gets it signaled by that batch, and the
//! recorder is told through [`FrameRecorder::end_frame`] that nothing it
//! recorded will run. The error is then returned to the caller.
//!
//! Slot `i` is the slot of swapchain image `i`, so the ring is exactly as
//! deep as the swapchain and frame `n + image_count` waits on frame `n`.
//!
//! # Example
//!
//! ```no_run
//! use framekit_renderer::backend::FrameBackend;
//! use framekit_renderer::sequencer::{FrameOutcome, FrameRecorder, PresentationSequencer};
//!
//! # fn example<B: FrameBackend, R: FrameRecorder<B::Encoder>>(
//! #     sequencer: &mut PresentationSequencer<B>,
//! #     scene: &mut R,
//! # ) -> Result<(), framekit_renderer::RendererError> {
//! match sequencer.render_frame(scene)? {
//!     FrameOutcome::Skipped => { /* try again next tick */ }
//!     FrameOutcome::Presented { suboptimal: true } => { /* resize soon */ }
//!     FrameOutcome::Presented { .. } => {}
//! }
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use framekit_rhi::encoder::CommandEncoder;

use crate::backend::{AcquireOutcome, FrameBackend};
use crate::error::{RendererError, RendererResult};
use crate::frame_ring::{FrameRing, FrameSlot, SlotState};

/// What one frame is being recorded for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame slot, equal to the image index.
    pub slot: usize,
    pub image_index: u32,
    /// Swapchain extent.
    pub extent: vk::Extent2D,
    /// Swapchain framebuffer of this image.
    pub framebuffer: vk::Framebuffer,
    /// Frames presented before this one.
    pub frame_number: u64,
}

/// Scene-side callbacks of a frame.
pub trait FrameRecorder<E: CommandEncoder> {
    /// Writes this slot's uniform buffers. The slot's fence has signaled, so
    /// the device no longer reads them.
    fn update_uniforms(&mut self, frame: &FrameContext) -> RendererResult<()>;

    /// Records the frame's passes into `encoder`, which is recording.
    fn record(&mut self, encoder: &E, frame: &FrameContext) -> RendererResult<()>;

    /// Called once per acquired frame after recording. `submitted` is false
    /// when the recorded commands never reached the queue, so any state the
    /// recording assumed must be rolled back.
    fn end_frame(&mut self, _frame: &FrameContext, _submitted: bool) {}
}

/// How a call to [`PresentationSequencer::render_frame`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing was recorded or submitted.
    Skipped,
    Presented { suboptimal: bool },
}

/// Drives acquire, record, submit and present.
pub struct PresentationSequencer<B: FrameBackend> {
    ring: FrameRing<B::Encoder, B::Fence>,
    backend: B,
    paused: bool,
    frame_number: u64,
}

impl<B: FrameBackend> PresentationSequencer<B> {
    /// Pairs a backend with a ring holding one slot per backend image.
    pub fn new(backend: B, ring: FrameRing<B::Encoder, B::Fence>) -> RendererResult<Self> {
        let images = backend.image_count();
        if ring.len() != images as usize {
            return Err(RendererError::ImageCountChanged {
                before: ring.len() as u32,
                after: images,
            });
        }

        info!("Presentation sequencer ready with {} frame slots", images);

        Ok(Self {
            ring,
            backend,
            paused: false,
            frame_number: 0,
        })
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn ring(&self) -> &FrameRing<B::Encoder, B::Fence> {
        &self.ring
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Renders and presents one frame.
    pub fn render_frame<R: FrameRecorder<B::Encoder>>(
        &mut self,
        recorder: &mut R,
    ) -> RendererResult<FrameOutcome> {
        if self.paused {
            return Ok(FrameOutcome::Skipped);
        }

        let (image_index, acquire_suboptimal) = match self.backend.acquire()? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date, skipping frame");
                return Ok(FrameOutcome::Skipped);
            }
        };
        let slot = image_index as usize;

        if let Err(e) = self.ring.wait_for_slot(slot) {
            self.abandon_frame(slot);
            return Err(e);
        }

        let frame = FrameContext {
            slot,
            image_index,
            extent: self.backend.extent(),
            framebuffer: self.backend.framebuffer(image_index),
            frame_number: self.frame_number,
        };
        if let Err(e) = self.record_and_submit(recorder, &frame) {
            self.abandon_frame(slot);
            recorder.end_frame(&frame, false);
            return Err(e);
        }
        recorder.end_frame(&frame, true);

        let present_suboptimal = self.backend.present(image_index)?;
        self.frame_number += 1;
        trace!("Presented frame {} on image {}", frame.frame_number, image_index);

        Ok(FrameOutcome::Presented {
            suboptimal: acquire_suboptimal || present_suboptimal,
        })
    }

    fn record_and_submit<R: FrameRecorder<B::Encoder>>(
        &mut self,
        recorder: &mut R,
        frame: &FrameContext,
    ) -> RendererResult<()> {
        recorder.update_uniforms(frame)?;

        let encoder = self.ring.begin_recording(frame.slot)?;
        recorder.record(encoder, frame)?;

        let backend = &mut self.backend;
        let image_index = frame.image_index;
        self.ring.submit_slot(frame.slot, |encoder, fence| {
            backend.submit(image_index, encoder, fence)
        })
    }

    /// Releases the pending acquire of a frame that will not be submitted.
    fn abandon_frame(&mut self, slot: usize) {
        let backend = &mut self.backend;
        let released = match self.ring.slot(slot).map(FrameSlot::state) {
            Ok(SlotState::Failed) => self
                .ring
                .recover_slot(slot, |fence| backend.release_acquire(Some(fence))),
            Ok(_) => backend.release_acquire(None),
            Err(e) => Err(e),
        };
        match released {
            Ok(()) => warn!("Abandoned frame on slot {}", slot),
            Err(e) => error!("Could not release abandoned frame on slot {}: {}", slot, e),
        }
    }

    /// Rebuilds size-dependent attachments.
    ///
    /// A zero-sized window pauses rendering until a non-zero size arrives.
    pub fn on_resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        if width == 0 || height == 0 {
            if !self.paused {
                info!("Window minimized, pausing rendering");
            }
            self.paused = true;
            return Ok(());
        }
        self.paused = false;

        self.ring.wait_all()?;
        let before = self.ring.len() as u32;
        let after = self.backend.recreate(width, height)?;
        if after != before {
            return Err(RendererError::ImageCountChanged { before, after });
        }

        let extent = self.backend.extent();
        info!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Waits for every in-flight frame.
    pub fn wait_idle(&mut self) -> RendererResult<()> {
        self.ring.wait_all()
    }
}
