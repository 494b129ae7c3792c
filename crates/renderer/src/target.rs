//! Declared resource state of images shared between passes.
//!
//! [`RenderTargets`] is the host-side record of which state each shared image
//! is in. The record must always agree with what the device believes; the
//! only way to change it is [`RenderTargets::transition`], which returns the
//! barrier that makes the device agree.
//!
//! Barriers only take effect once their command buffer is submitted. A frame
//! opens with [`RenderTargets::begin_frame`] and closes with
//! [`RenderTargets::finish_frame`]; an unsubmitted frame restores the states
//! it started from.

use ash::vk;

use framekit_rhi::barrier::{ImageTransition, ResourceState, SubresourceSpan};
use framekit_rhi::image::Image;

use crate::error::{RendererError, RendererResult};

/// Handle to an image tracked by [`RenderTargets`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetId(usize);

impl TargetId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One tracked image: handle, the span barriers must cover, current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedImage {
    pub image: vk::Image,
    pub span: SubresourceSpan,
    pub state: ResourceState,
}

impl TrackedImage {
    /// Moves to `to`, returning the barrier needed, or `None` when already
    /// there.
    pub fn transition_to(&mut self, to: ResourceState) -> Option<ImageTransition> {
        if self.state == to {
            return None;
        }
        let transition = ImageTransition::new(self.image, self.span, self.state, to);
        self.state = to;
        Some(transition)
    }
}

/// State table of every image shared between passes.
#[derive(Debug, Default)]
pub struct RenderTargets {
    entries: Vec<TrackedImage>,
    /// States at the start of the frame being recorded.
    snapshot: Option<Vec<TrackedImage>>,
}

impl RenderTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `image` over its full span, currently in `state`.
    pub fn track_image(&mut self, image: &Image, state: ResourceState) -> TargetId {
        self.track(image.handle(), image.full_span(), state)
    }

    /// Tracks a raw image handle over `span`.
    pub fn track(&mut self, image: vk::Image, span: SubresourceSpan, state: ResourceState) -> TargetId {
        self.entries.push(TrackedImage { image, span, state });
        TargetId(self.entries.len() - 1)
    }

    pub fn get(&self, id: TargetId) -> RendererResult<&TrackedImage> {
        self.entries
            .get(id.0)
            .ok_or(RendererError::UnknownTarget(id.0))
    }

    #[inline]
    pub fn state(&self, id: TargetId) -> RendererResult<ResourceState> {
        Ok(self.get(id)?.state)
    }

    /// Declares that `id` is about to be used in state `to`.
    pub fn transition(
        &mut self,
        id: TargetId,
        to: ResourceState,
    ) -> RendererResult<Option<ImageTransition>> {
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(RendererError::UnknownTarget(id.0))?;
        Ok(entry.transition_to(to))
    }

    /// Remembers the current states so an abandoned frame can restore them.
    /// Calling it again before the frame finishes keeps the first snapshot.
    pub fn begin_frame(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.entries.clone());
        }
    }

    /// Keeps the recorded transitions if the frame reached the queue, and
    /// restores the frame's starting states otherwise.
    pub fn finish_frame(&mut self, submitted: bool) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        if !submitted {
            // Entries tracked mid-frame keep their declared state.
            for (entry, saved) in self.entries.iter_mut().zip(snapshot) {
                entry.state = saved.state;
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_transition_updates_state_and_skips_noops() {
        let mut targets = RenderTargets::new();
        let cube = targets.track(
            vk::Image::from_raw(0x10),
            SubresourceSpan::color_layers(6),
            ResourceState::ColorAttachment,
        );

        let barrier = targets
            .transition(cube, ResourceState::ShaderRead)
            .expect("tracked")
            .expect("state changes");
        assert_eq!(barrier.from, ResourceState::ColorAttachment);
        assert_eq!(barrier.to, ResourceState::ShaderRead);
        assert_eq!(barrier.span.layer_count, 6);
        assert_eq!(targets.state(cube).ok(), Some(ResourceState::ShaderRead));

        assert!(
            targets
                .transition(cube, ResourceState::ShaderRead)
                .expect("tracked")
                .is_none()
        );
    }

    #[test]
    fn test_unsubmitted_frame_restores_states() {
        let mut targets = RenderTargets::new();
        let cube = targets.track(
            vk::Image::from_raw(0x10),
            SubresourceSpan::color_layers(6),
            ResourceState::ColorAttachment,
        );

        targets.begin_frame();
        targets
            .transition(cube, ResourceState::ShaderRead)
            .expect("tracked");
        targets.finish_frame(false);
        assert_eq!(targets.state(cube).ok(), Some(ResourceState::ColorAttachment));

        targets.begin_frame();
        targets
            .transition(cube, ResourceState::ShaderRead)
            .expect("tracked");
        targets.finish_frame(true);
        assert_eq!(targets.state(cube).ok(), Some(ResourceState::ShaderRead));

        // Finishing without an open frame changes nothing.
        targets.finish_frame(false);
        assert_eq!(targets.state(cube).ok(), Some(ResourceState::ShaderRead));
    }

    #[test]
    fn test_unknown_target() {
        let mut targets = RenderTargets::new();
        let id = targets.track(
            vk::Image::null(),
            SubresourceSpan::color_layers(1),
            ResourceState::Undefined,
        );
        let mut other = RenderTargets::new();
        assert!(matches!(
            other.transition(id, ResourceState::ShaderRead),
            Err(RendererError::UnknownTarget(0))
        ));
    }
}
