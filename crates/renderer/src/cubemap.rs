//! Render-to-cubemap capture.
//!
//! A capture renders the scene around a point into the six layers of a cube
//! image, which the main pass then samples. Two strategies are supported:
//!
//! - **multi-pass**: six render passes, one per face, each into a 2D view of
//!   one layer
//! - **single-pass**: one layered render pass over a 2D-array view of all six
//!   layers, where the geometry stage routes each instance to its face
//!
//! Either way the cube image is shared by every frame slot, so each frame
//! ends by returning it to `COLOR_ATTACHMENT_OPTIMAL`:
//!
//! ```text
//! [capture passes] -> barrier 6 layers to SHADER_READ -> main pass
//!                  -> barrier 6 layers to COLOR_ATTACHMENT
//! ```

use ash::vk;
use glam::{Mat4, Vec3};
use tracing::info;

use framekit_core::{CubemapMode, SceneMode};
use framekit_rhi::barrier::{ResourceState, SubresourceSpan};
use framekit_rhi::image::{DEPTH_FORMAT, Image, ImageDesc};
use framekit_rhi::render_pass::Framebuffer;

use crate::error::{RendererError, RendererResult};
use crate::factory::{ExtraViews, ResourceFactory};
use crate::pass::{
    DrawCall, FramebufferTarget, PassSequence, RasterPass, ViewportMode, color_depth_clear,
};
use crate::registry::{Registries, RenderPassKey};
use crate::target::{RenderTargets, TargetId};

pub const CUBE_FACES: usize = 6;

/// Color format of rendered cube faces.
pub const CUBE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Clear color of capture passes.
pub const CAPTURE_CLEAR_COLOR: [f32; 4] = [0.5, 0.75, 1.0, 0.0];

/// Look directions of faces +X, -X, +Y, -Y, +Z, -Z, in layer order.
pub const FACE_DIRECTIONS: [Vec3; CUBE_FACES] = [
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
];

/// Up vectors matching [`FACE_DIRECTIONS`].
pub const FACE_UPS: [Vec3; CUBE_FACES] = [
    Vec3::NEG_Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
    Vec3::NEG_Y,
    Vec3::NEG_Y,
];

/// Square projection used by every capture pass.
pub fn face_projection() -> Mat4 {
    Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 100.0)
}

/// View matrix looking from `origin` through face `face`.
pub fn face_view(origin: Vec3, face: usize) -> Mat4 {
    let face = face % CUBE_FACES;
    Mat4::look_at_rh(origin, origin + FACE_DIRECTIONS[face], FACE_UPS[face])
}

/// All six view matrices, in layer order.
pub fn face_view_matrices(origin: Vec3) -> [Mat4; CUBE_FACES] {
    std::array::from_fn(|face| face_view(origin, face))
}

/// Registers [`RenderPassKey::Cubemap`]: cube face color left in
/// `COLOR_ATTACHMENT_OPTIMAL`, plus depth.
pub fn register_render_pass(
    factory: &ResourceFactory,
    registries: &mut Registries,
) -> RendererResult<()> {
    let render_pass = factory.create_render_pass(
        CUBE_FORMAT,
        Some(DEPTH_FORMAT),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    )?;
    registries
        .render_passes
        .register(RenderPassKey::Cubemap, render_pass);
    Ok(())
}

/// Handles a capture sequence needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureLayout {
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub face_framebuffers: [vk::Framebuffer; CUBE_FACES],
    pub layered_framebuffer: vk::Framebuffer,
    pub target: TargetId,
}

/// Draws recorded by the capture passes.
#[derive(Clone, Debug, Default)]
pub struct CaptureDraws {
    /// Draws of each face pass, in layer order.
    pub faces: [Vec<DrawCall>; CUBE_FACES],
    /// Draws of the layered pass.
    pub layered: Vec<DrawCall>,
}

/// Builds the per-frame sequence for `mode`.
///
/// `main` is the main pass, sampling whichever cubemap the mode shows.
pub fn capture_sequence(
    mode: CubemapMode,
    layout: &CaptureLayout,
    draws: &CaptureDraws,
    main: RasterPass,
) -> PassSequence {
    let capture_pass = |label, framebuffer, draws: &Vec<DrawCall>| RasterPass {
        label,
        render_pass: layout.render_pass,
        target: FramebufferTarget::Offscreen {
            framebuffer,
            extent: layout.extent,
        },
        clear_values: color_depth_clear(CAPTURE_CLEAR_COLOR, 1.0),
        viewport: ViewportMode::Standard,
        draws: draws.clone(),
        overlay: false,
    };

    let mut sequence = PassSequence::new(mode.label());
    match mode {
        CubemapMode::Static => {}
        CubemapMode::MultiPass => {
            for (face, framebuffer) in layout.face_framebuffers.iter().enumerate() {
                sequence = sequence.raster(capture_pass(
                    "cube face",
                    *framebuffer,
                    &draws.faces[face],
                ));
            }
        }
        CubemapMode::SinglePass => {
            sequence = sequence.raster(capture_pass(
                "layered cube",
                layout.layered_framebuffer,
                &draws.layered,
            ));
        }
    }

    sequence
        .transition(&[layout.target], ResourceState::ShaderRead)
        .raster(main)
        .transition(&[layout.target], ResourceState::ColorAttachment)
}

/// The shared cube image and the attachments that render into it.
pub struct CubeCaptureTargets {
    face_framebuffers: Vec<Framebuffer>,
    layered_framebuffer: Framebuffer,
    face_depth: Image,
    layered_depth: Image,
    cube: Image,
    target: TargetId,
}

impl CubeCaptureTargets {
    /// Creates an `edge`-sized cube image with per-face and array views,
    /// moves it to `COLOR_ATTACHMENT_OPTIMAL` and tracks it in `targets`.
    ///
    /// [`RenderPassKey::Cubemap`] must be registered.
    pub fn new(
        factory: &ResourceFactory,
        registries: &Registries,
        targets: &mut RenderTargets,
        edge: u32,
    ) -> RendererResult<Self> {
        let render_pass = registries.render_pass(RenderPassKey::Cubemap)?;

        let cube = factory.create_texture(
            &ImageDesc::cube(
                "rendered cubemap",
                edge,
                CUBE_FORMAT,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ),
            ExtraViews {
                per_layer: true,
                array: true,
            },
        )?;
        let extent = cube.extent();

        let face_depth = factory.create_depth(extent, 1)?;
        let layered_depth = factory.create_depth(extent, CUBE_FACES as u32)?;

        let face_framebuffers = (0..CUBE_FACES as u32)
            .map(|layer| {
                let view = cube.layer_view(layer).ok_or_else(|| missing_view("face"))?;
                factory.create_framebuffer(render_pass, &[view, face_depth.view()], extent, 1)
            })
            .collect::<RendererResult<Vec<_>>>()?;

        let array_view = cube.array_view().ok_or_else(|| missing_view("array"))?;
        let layered_framebuffer = factory.create_framebuffer(
            render_pass,
            &[array_view, layered_depth.view()],
            extent,
            CUBE_FACES as u32,
        )?;

        let span = SubresourceSpan::color_layers(CUBE_FACES as u32);
        factory.transition_now(
            cube.handle(),
            span,
            ResourceState::Undefined,
            ResourceState::ColorAttachment,
        )?;
        let target = targets.track(cube.handle(), span, ResourceState::ColorAttachment);

        info!("Cube capture targets ready ({}x{} faces)", edge, edge);

        Ok(Self {
            face_framebuffers,
            layered_framebuffer,
            face_depth,
            layered_depth,
            cube,
            target,
        })
    }

    /// Cube view for sampling.
    #[inline]
    pub fn cube_view(&self) -> vk::ImageView {
        self.cube.view()
    }

    #[inline]
    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn layout(&self, render_pass: vk::RenderPass) -> CaptureLayout {
        CaptureLayout {
            render_pass,
            extent: self.cube.extent(),
            face_framebuffers: std::array::from_fn(|face| {
                self.face_framebuffers
                    .get(face)
                    .map(Framebuffer::handle)
                    .unwrap_or_default()
            }),
            layered_framebuffer: self.layered_framebuffer.handle(),
            target: self.target,
        }
    }

    /// Depth images, for tests and debugging names.
    pub fn depth_images(&self) -> (vk::Image, vk::Image) {
        (self.face_depth.handle(), self.layered_depth.handle())
    }
}

fn missing_view(kind: &str) -> RendererError {
    framekit_rhi::RhiError::InvalidHandle(format!("cube image has no {kind} view")).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_views_look_along_face_directions() {
        let origin = Vec3::ZERO;
        for (face, view) in face_view_matrices(origin).iter().enumerate() {
            // The view maps the look direction onto -Z in view space.
            let forward = view.transform_vector3(FACE_DIRECTIONS[face]);
            assert!((forward - Vec3::NEG_Z).length() < 1e-5, "face {face}");

            let up = view.transform_vector3(FACE_UPS[face]);
            assert!((up - Vec3::Y).length() < 1e-5, "face {face}");
        }
    }

    #[test]
    fn test_face_directions_are_distinct_unit_axes() {
        for (i, a) in FACE_DIRECTIONS.iter().enumerate() {
            assert!((a.length() - 1.0).abs() < 1e-6);
            assert!(a.dot(FACE_UPS[i]).abs() < 1e-6, "up orthogonal on face {i}");
            for b in &FACE_DIRECTIONS[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_face_projection_is_square() {
        let projection = face_projection();
        assert!((projection.x_axis.x - projection.y_axis.y).abs() < 1e-6);
    }
}
