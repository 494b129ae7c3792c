//! Per-frame ring of command buffers and fences.
//!
//! The ring holds one [`FrameSlot`] per swapchain image. Each slot cycles
//! through
//!
//! ```text
//! Idle --begin_recording--> Recording --submit_slot--> Submitted
//!  ^                              |                        |
//!  |                              | submit failed          |
//!  |                              v                        |
//!  |                           Failed --recover_slot-------+
//!  |                                                       |
//!  +-------------------- wait_for_slot --------------------+
//! ```
//!
//! The fence wait in [`FrameRing::wait_for_slot`] is the only thing keeping
//! the host from re-recording a command buffer the device is still executing,
//! so [`FrameRing::begin_recording`] refuses any slot that has not been
//! waited on since its last submission.
//!
//! The ring is generic over the encoder and fence so it can be driven without
//! a GPU.

use tracing::{debug, trace, warn};

use framekit_rhi::encoder::CommandEncoder;
use framekit_rhi::sync::GpuFence;

use crate::error::{RendererError, RendererResult};

/// Lifecycle state of a frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Fence observed signaled; the command buffer may be re-recorded.
    Idle,
    /// Command buffer is being recorded.
    Recording,
    /// Submitted; the device may still be executing it.
    Submitted,
    /// The fence was reset but no submission carrying it reached the queue,
    /// so it will never signal on its own.
    Failed,
}

/// One command buffer and its completion fence.
pub struct FrameSlot<E, F> {
    encoder: E,
    fence: F,
    state: SlotState,
}

impl<E, F> FrameSlot<E, F> {
    #[inline]
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    #[inline]
    pub fn fence(&self) -> &F {
        &self.fence
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// Fixed-size ring of frame slots.
pub struct FrameRing<E, F> {
    slots: Vec<FrameSlot<E, F>>,
}

impl<E: CommandEncoder, F: GpuFence> FrameRing<E, F> {
    /// Builds the ring from `(encoder, fence)` pairs. Fences must be created
    /// signaled so the first wait on each slot returns at once.
    pub fn new(parts: impl IntoIterator<Item = (E, F)>) -> Self {
        let slots = parts
            .into_iter()
            .map(|(encoder, fence)| FrameSlot {
                encoder,
                fence,
                state: SlotState::Idle,
            })
            .collect();
        Self { slots }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> RendererResult<&FrameSlot<E, F>> {
        let len = self.slots.len();
        self.slots
            .get(index)
            .ok_or(RendererError::SlotOutOfRange { slot: index, len })
    }

    fn slot_mut(&mut self, index: usize) -> RendererResult<&mut FrameSlot<E, F>> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(RendererError::SlotOutOfRange { slot: index, len })
    }

    /// Blocks until the slot's previous submission has completed.
    ///
    /// A slot left in `Recording` by a failed frame still holds a signaled
    /// fence, so the wait returns at once. A `Failed` slot is refused rather
    /// than waited on.
    pub fn wait_for_slot(&mut self, index: usize) -> RendererResult<()> {
        let slot = self.slot_mut(index)?;
        match slot.state {
            SlotState::Failed => return Err(RendererError::SlotFailed { slot: index }),
            SlotState::Recording => warn!("Frame slot {} abandoned mid-recording", index),
            SlotState::Idle | SlotState::Submitted => {}
        }

        slot.fence.wait(u64::MAX)?;
        slot.state = SlotState::Idle;
        trace!("Frame slot {} idle", index);
        Ok(())
    }

    /// Resets the slot's command buffer and begins recording into it.
    pub fn begin_recording(&mut self, index: usize) -> RendererResult<&E> {
        let slot = self.slot_mut(index)?;
        if slot.state != SlotState::Idle {
            return Err(RendererError::SlotProtocol {
                slot: index,
                actual: slot.state,
                expected: SlotState::Idle,
            });
        }

        slot.encoder.reset()?;
        slot.encoder.begin()?;
        slot.state = SlotState::Recording;
        Ok(&slot.encoder)
    }

    /// Ends recording, resets the fence and hands both to `submit`.
    ///
    /// The fence is reset only after recording is complete, so an error while
    /// recording never leaves a slot whose fence can no longer signal. If the
    /// reset or `submit` fails the slot becomes `Failed` until
    /// [`FrameRing::recover_slot`] gets its fence signaled again.
    pub fn submit_slot(
        &mut self,
        index: usize,
        submit: impl FnOnce(&E, &F) -> RendererResult<()>,
    ) -> RendererResult<()> {
        let slot = self.slot_mut(index)?;
        if slot.state != SlotState::Recording {
            return Err(RendererError::SlotProtocol {
                slot: index,
                actual: slot.state,
                expected: SlotState::Recording,
            });
        }

        slot.encoder.end()?;
        let submitted = slot
            .fence
            .reset()
            .map_err(RendererError::from)
            .and_then(|()| submit(&slot.encoder, &slot.fence));
        if let Err(e) = submitted {
            slot.state = SlotState::Failed;
            warn!("Frame slot {} failed to submit: {}", index, e);
            return Err(e);
        }

        slot.state = SlotState::Submitted;
        trace!("Frame slot {} submitted", index);
        Ok(())
    }

    /// Brings a `Failed` slot back by handing its fence to `signal`, which
    /// must queue work that signals it. The slot is then `Submitted` and the
    /// next wait returns once that work completes.
    pub fn recover_slot(
        &mut self,
        index: usize,
        signal: impl FnOnce(&F) -> RendererResult<()>,
    ) -> RendererResult<()> {
        let slot = self.slot_mut(index)?;
        if slot.state != SlotState::Failed {
            return Err(RendererError::SlotProtocol {
                slot: index,
                actual: slot.state,
                expected: SlotState::Failed,
            });
        }

        signal(&slot.fence)?;
        slot.state = SlotState::Submitted;
        debug!("Frame slot {} recovered", index);
        Ok(())
    }

    /// Waits for every submitted slot. `Failed` slots have nothing queued and
    /// are left as they are.
    pub fn wait_all(&mut self) -> RendererResult<()> {
        for index in 0..self.slots.len() {
            if self.slots[index].state == SlotState::Submitted {
                self.wait_for_slot(index)?;
            }
        }
        Ok(())
    }
}
