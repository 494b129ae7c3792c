//! Error types for frame orchestration.

use ash::vk;
use thiserror::Error;

use framekit_rhi::RhiError;

use crate::frame_ring::SlotState;

/// Errors raised while setting up or driving frames.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Core(#[from] framekit_core::Error),

    /// A registry lookup found nothing; always a setup bug.
    #[error("no {kind} registered under {key}")]
    RegistryMiss { kind: &'static str, key: String },

    /// A frame slot was driven out of order.
    #[error("frame slot {slot} is {actual:?}, expected {expected:?}")]
    SlotProtocol {
        slot: usize,
        actual: SlotState,
        expected: SlotState,
    },

    /// The slot's fence was reset by a submission that never reached the
    /// queue; waiting on it would block forever.
    #[error("frame slot {slot} lost its fence to a failed submission")]
    SlotFailed { slot: usize },

    #[error("frame slot {slot} out of range ({len} slots)")]
    SlotOutOfRange { slot: usize, len: usize },

    /// A per-slot binding has no entry for the slot being recorded.
    #[error("pass '{pass}' has no binding for frame slot {slot}")]
    MissingSlotBinding { pass: &'static str, slot: usize },

    #[error("render target {0} is not tracked")]
    UnknownTarget(usize),

    #[error("no pass sequence built for mode '{0}'")]
    MissingSequence(&'static str),

    /// Per-slot resources are sized once, so the image count is fixed.
    #[error("swapchain image count changed from {before} to {after}")]
    ImageCountChanged { before: u32, after: u32 },

    #[error("submission without a preceding acquire")]
    NoPendingAcquire,
}

impl From<vk::Result> for RendererError {
    fn from(result: vk::Result) -> Self {
        RendererError::Rhi(RhiError::from(result))
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
