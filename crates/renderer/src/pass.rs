//! Pass descriptors.
//!
//! Passes are plain data built once during setup: which pipeline, which
//! descriptor sets, which target, what to draw or dispatch. A
//! [`PassSequence`] lists them in recording order, with explicit
//! [`PassStep::Transition`] steps wherever a later pass reads an image an
//! earlier one wrote. Nothing here infers dependencies.
//!
//! # Example
//!
//! ```
//! use ash::vk;
//! use framekit_renderer::pass::ComputePass;
//! use framekit_renderer::pass::Binding;
//!
//! let filter = ComputePass {
//!     label: "sepia",
//!     pipeline: vk::Pipeline::null(),
//!     layout: vk::PipelineLayout::null(),
//!     descriptor_set: Binding::Shared(vk::DescriptorSet::null()),
//!     extent: vk::Extent2D { width: 1280, height: 720 },
//!     workgroup_size: 16,
//! };
//! assert_eq!(filter.dispatch_groups(), (81, 46));
//! ```

use ash::vk;

use framekit_core::SceneMode;
use framekit_rhi::barrier::ResourceState;

use crate::error::{RendererError, RendererResult};
use crate::target::TargetId;

/// A value either shared by every frame slot or held once per slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding<T> {
    Shared(T),
    PerSlot(Vec<T>),
}

impl<T: Copy> Binding<T> {
    pub fn for_slot(&self, slot: usize) -> Option<T> {
        match self {
            Binding::Shared(value) => Some(*value),
            Binding::PerSlot(values) => values.get(slot).copied(),
        }
    }
}

/// Where a raster pass renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferTarget {
    /// The framebuffer of the acquired swapchain image, at swapchain extent.
    Swapchain,
    /// A fixed offscreen framebuffer.
    Offscreen {
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
}

/// Viewport orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewportMode {
    #[default]
    Standard,
    /// Negative height with the origin at the bottom edge, so +Y points up.
    FlippedY,
}

impl ViewportMode {
    pub fn viewport(self, extent: vk::Extent2D) -> vk::Viewport {
        let (y, height) = match self {
            ViewportMode::Standard => (0.0, extent.height as f32),
            ViewportMode::FlippedY => (extent.height as f32, -(extent.height as f32)),
        };
        vk::Viewport {
            x: 0.0,
            y,
            width: extent.width as f32,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Vertex input of a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawGeometry {
    /// Vertex buffer at binding 0 plus a `u32` index buffer.
    Indexed {
        vertex_buffer: vk::Buffer,
        index_buffer: vk::Buffer,
        index_count: u32,
    },
    /// No vertex buffers; positions come from the vertex index.
    Procedural { vertex_count: u32 },
}

/// One draw inside a raster pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: Binding<vk::DescriptorSet>,
    pub geometry: DrawGeometry,
    /// Greater than one for instanced draws such as layered cube capture,
    /// where each instance renders to one face.
    pub instance_count: u32,
}

/// A render pass instance with its draws.
#[derive(Clone)]
pub struct RasterPass {
    pub label: &'static str,
    pub render_pass: vk::RenderPass,
    pub target: FramebufferTarget,
    pub clear_values: Vec<vk::ClearValue>,
    pub viewport: ViewportMode,
    pub draws: Vec<DrawCall>,
    /// Lets the UI overlay record after the draws.
    pub overlay: bool,
}

/// Clear values for a color attachment followed by a depth attachment.
pub fn color_depth_clear(color: [f32; 4], depth: f32) -> Vec<vk::ClearValue> {
    vec![
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
        },
    ]
}

/// A compute dispatch over a 2D image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputePass {
    pub label: &'static str,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: Binding<vk::DescriptorSet>,
    pub extent: vk::Extent2D,
    pub workgroup_size: u32,
}

impl ComputePass {
    /// Workgroups per axis, `dimension / workgroup_size + 1`.
    ///
    /// This dispatches one extra group when the dimension divides evenly; the
    /// shader bounds-checks its invocation id.
    pub fn dispatch_groups(&self) -> (u32, u32) {
        (
            self.extent.width / self.workgroup_size + 1,
            self.extent.height / self.workgroup_size + 1,
        )
    }
}

/// One recorded step.
#[derive(Clone)]
pub enum PassStep {
    Raster(RasterPass),
    Compute(ComputePass),
    /// Moves every listed target into `state` with a single barrier.
    Transition {
        targets: Vec<TargetId>,
        state: ResourceState,
    },
}

/// An ordered list of steps recorded into one command buffer per frame.
#[derive(Clone, Default)]
pub struct PassSequence {
    pub label: &'static str,
    pub steps: Vec<PassStep>,
}

impl PassSequence {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            steps: Vec::new(),
        }
    }

    pub fn raster(mut self, pass: RasterPass) -> Self {
        self.steps.push(PassStep::Raster(pass));
        self
    }

    pub fn compute(mut self, pass: ComputePass) -> Self {
        self.steps.push(PassStep::Compute(pass));
        self
    }

    pub fn transition(mut self, targets: &[TargetId], state: ResourceState) -> Self {
        self.steps.push(PassStep::Transition {
            targets: targets.to_vec(),
            state,
        });
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Pre-built sequences, one per mode, with the active mode selected.
///
/// Switching modes never rebuilds anything; it only changes which sequence
/// the next frame records.
pub struct SequenceSet<M: SceneMode> {
    sequences: Vec<(M, PassSequence)>,
    active: M,
}

impl<M: SceneMode> SequenceSet<M> {
    pub fn new(active: M) -> Self {
        Self {
            sequences: Vec::with_capacity(M::ALL.len()),
            active,
        }
    }

    /// Stores the sequence for `mode`, replacing any previous one.
    pub fn insert(&mut self, mode: M, sequence: PassSequence) {
        match self.sequences.iter_mut().find(|(m, _)| *m == mode) {
            Some(entry) => entry.1 = sequence,
            None => self.sequences.push((mode, sequence)),
        }
    }

    #[inline]
    pub fn active_mode(&self) -> M {
        self.active
    }

    pub fn select(&mut self, mode: M) {
        self.active = mode;
    }

    /// Advances to the next mode and returns it.
    pub fn cycle(&mut self) -> M {
        self.active = self.active.next();
        self.active
    }

    pub fn get(&self, mode: M) -> RendererResult<&PassSequence> {
        self.sequences
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, sequence)| sequence)
            .ok_or(RendererError::MissingSequence(mode.label()))
    }

    /// The sequence of the active mode.
    pub fn active(&self) -> RendererResult<&PassSequence> {
        self.get(self.active)
    }

    /// True when every mode has a sequence.
    pub fn is_complete(&self) -> bool {
        M::ALL.iter().all(|mode| self.get(*mode).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framekit_core::CubemapMode;

    fn filter_pass(width: u32, height: u32) -> ComputePass {
        ComputePass {
            label: "filter",
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            descriptor_set: Binding::Shared(vk::DescriptorSet::null()),
            extent: vk::Extent2D { width, height },
            workgroup_size: 16,
        }
    }

    #[test]
    fn test_dispatch_over_dispatches_on_exact_multiples() {
        assert_eq!(filter_pass(1280, 720).dispatch_groups(), (81, 46));
        assert_eq!(filter_pass(16, 16).dispatch_groups(), (2, 2));
    }

    #[test]
    fn test_dispatch_covers_remainders() {
        assert_eq!(filter_pass(1281, 721).dispatch_groups(), (81, 46));
        assert_eq!(filter_pass(15, 1).dispatch_groups(), (1, 1));
    }

    #[test]
    fn test_flipped_viewport() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let flipped = ViewportMode::FlippedY.viewport(extent);
        assert_eq!(flipped.y, 600.0);
        assert_eq!(flipped.height, -600.0);
        assert_eq!(flipped.width, 800.0);

        let standard = ViewportMode::Standard.viewport(extent);
        assert_eq!((standard.y, standard.height), (0.0, 600.0));
    }

    #[test]
    fn test_binding_for_slot() {
        let shared = Binding::Shared(7u32);
        assert_eq!(shared.for_slot(5), Some(7));

        let per_slot = Binding::PerSlot(vec![1u32, 2]);
        assert_eq!(per_slot.for_slot(1), Some(2));
        assert_eq!(per_slot.for_slot(2), None);
    }

    #[test]
    fn test_sequence_set_selects_prebuilt_sequences() {
        let mut set = SequenceSet::new(CubemapMode::Static);
        set.insert(CubemapMode::Static, PassSequence::new("static"));
        set.insert(CubemapMode::MultiPass, PassSequence::new("multi"));
        assert!(!set.is_complete());
        set.insert(CubemapMode::SinglePass, PassSequence::new("single"));
        assert!(set.is_complete());

        assert_eq!(set.active().map(|s| s.label).ok(), Some("static"));
        assert_eq!(set.cycle(), CubemapMode::MultiPass);
        assert_eq!(set.active().map(|s| s.label).ok(), Some("multi"));

        set.insert(CubemapMode::MultiPass, PassSequence::new("multi, rebuilt"));
        assert_eq!(set.active().map(|s| s.label).ok(), Some("multi, rebuilt"));
    }

    #[test]
    fn test_missing_sequence() {
        let set: SequenceSet<CubemapMode> = SequenceSet::new(CubemapMode::SinglePass);
        assert!(matches!(
            set.active(),
            Err(RendererError::MissingSequence("single-pass"))
        ));
    }
}
