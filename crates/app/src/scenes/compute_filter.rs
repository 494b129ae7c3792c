//! Compute filter sample.
//!
//! A compute shader filters a source image into a destination image every
//! frame; both are then shown side by side on screen-space quads.
//!
//! ```text
//! dispatch (GENERAL) -> both images to SHADER_READ -> main pass
//!                    -> both images back to GENERAL
//! ```

use ash::vk;
use glam::{Mat4, Vec2, Vec3, Vec4};
use tracing::{info, warn};

use framekit_core::{FilterKind, SceneMode, Timer};
use framekit_renderer::executor::PassExecutor;
use framekit_renderer::factory::{ExtraViews, SimpleModel};
use framekit_renderer::overlay::FrameStatsOverlay;
use framekit_renderer::pass::{
    Binding, ComputePass, DrawCall, FramebufferTarget, PassSequence, RasterPass, SequenceSet,
    ViewportMode, color_depth_clear,
};
use framekit_renderer::registry::{LayoutKey, RenderPassKey};
use framekit_renderer::sequencer::{FrameContext, FrameRecorder};
use framekit_renderer::target::{RenderTargets, TargetId};
use framekit_renderer::{RendererResult, Scene, SetupContext};
use framekit_rhi::barrier::ResourceState;
use framekit_rhi::command::CommandBuffer;
use framekit_rhi::descriptor::{DescriptorResource, write_descriptor_set};
use framekit_rhi::image::{Image, ImageDesc};
use framekit_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline};
use framekit_rhi::sampler::{Sampler, SamplerDesc};
use framekit_rhi::shader::ShaderStage;

use super::{MAIN_CLEAR_COLOR, SlotUniforms, indexed, upload_mesh};
use crate::mesh::{MeshData, Vertex};
use crate::uniforms::ObjectUbo;

/// Local size baked into the filter shaders.
pub const SHADER_WORKGROUP_SIZE: u32 = 16;

const IMAGE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const QUAD_SIZE: Vec2 = Vec2::new(480.0, 270.0);
const QUAD_GAP: f32 = 10.0;

/// Orthographic projection of a 1280x720 canvas centered on the origin.
pub fn canvas_projection() -> Mat4 {
    Mat4::orthographic_rh(-640.0, 640.0, -360.0, 360.0, -100.0, 100.0)
}

/// Centers of the source and filtered quads.
pub fn quad_centers() -> [Vec3; 2] {
    let x = QUAD_SIZE.x * 0.5 + QUAD_GAP;
    [Vec3::new(-x, 0.0, 0.0), Vec3::new(x, 0.0, 0.0)]
}

/// Image filtered by a compute shader, shown next to its source.
pub struct ComputeFilterScene {
    sequences: SequenceSet<FilterKind>,
    targets: RenderTargets,
    overlay: FrameStatsOverlay,
    timer: Timer,
    quads: [SlotUniforms<ObjectUbo>; 2],

    _pipelines: Vec<Pipeline>,
    _source: Image,
    _filtered: Image,
    _sampler: Sampler,
    _quad_mesh: SimpleModel,
}

impl ComputeFilterScene {
    pub fn new(ctx: &mut SetupContext<'_>) -> RendererResult<Self> {
        let config = &ctx.config.compute;
        let factory = ctx.factory;
        let extent = vk::Extent2D {
            width: config.image_width,
            height: config.image_height,
        };
        if config.workgroup_size != SHADER_WORKGROUP_SIZE {
            warn!(
                "compute.workgroup_size is {} but the filter shaders use {}; dispatch may not cover the image",
                config.workgroup_size, SHADER_WORKGROUP_SIZE
            );
        }

        let usage = vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::TRANSFER_DST;
        let source = factory.upload_texture(
            &ImageDesc::color_2d("filter source", extent, IMAGE_FORMAT, usage),
            ExtraViews::default(),
            &source_texels(extent.width, extent.height),
            ResourceState::StorageImage,
        )?;
        let filtered = factory.create_texture(
            &ImageDesc::color_2d("filter destination", extent, IMAGE_FORMAT, usage),
            ExtraViews::default(),
        )?;
        factory.transition_now(
            filtered.handle(),
            filtered.full_span(),
            ResourceState::Undefined,
            ResourceState::StorageImage,
        )?;

        let mut targets = RenderTargets::new();
        let image_targets = [
            targets.track_image(&source, ResourceState::StorageImage),
            targets.track_image(&filtered, ResourceState::StorageImage),
        ];

        let filter_set =
            factory.allocate_descriptor_set(ctx.registries.set_layout(LayoutKey::ComputeFilter)?)?;
        write_descriptor_set(
            factory.device(),
            filter_set,
            &[
                (0, DescriptorResource::StorageImage(source.view())),
                (1, DescriptorResource::StorageImage(filtered.view())),
            ],
        );

        let sampler = factory.create_sampler(&SamplerDesc::default())?;
        let sampler_handle = sampler.handle();
        let quad_set_layout = ctx.registries.set_layout(LayoutKey::U1T1)?;
        let quad_uniforms = |view: vk::ImageView| {
            SlotUniforms::<ObjectUbo>::new(factory, quad_set_layout, ctx.frame_slots, move |_: usize| {
                vec![(
                    1,
                    DescriptorResource::CombinedImageSampler {
                        view,
                        sampler: sampler_handle,
                    },
                )]
            })
        };
        let quads = [quad_uniforms(source.view())?, quad_uniforms(filtered.view())?];
        let quad_mesh = upload_mesh(factory, &MeshData::quad(QUAD_SIZE))?;

        let shaders = ctx.shaders;
        let quad_vert = shaders.load("textured_quad.vert", ShaderStage::Vertex)?;
        let quad_frag = shaders.load("textured_quad.frag", ShaderStage::Fragment)?;
        let main_pass = ctx.registries.render_pass(RenderPassKey::Default)?;
        let quad_layout = ctx.registries.pipeline_layouts.require(LayoutKey::U1T1)?;
        let quad_pipeline = GraphicsPipelineBuilder::new(main_pass)
            .stage(&quad_vert)
            .stage(&quad_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(vk::CullModeFlags::NONE)
            .depth_test(false)
            .build(ctx.device.clone(), quad_layout)?;

        let filter_layout = ctx.registries.pipeline_layouts.require(LayoutKey::ComputeFilter)?;
        let mut filter_pipelines = Vec::with_capacity(FilterKind::ALL.len());
        for &kind in FilterKind::ALL {
            let shader = shaders.load(filter_shader(kind), ShaderStage::Compute)?;
            let pipeline = Pipeline::compute(ctx.device.clone(), &shader, filter_layout)?;
            filter_pipelines.push((kind, pipeline));
        }

        let main = RasterPass {
            label: "main",
            render_pass: main_pass,
            target: FramebufferTarget::Swapchain,
            clear_values: color_depth_clear(MAIN_CLEAR_COLOR, 1.0),
            viewport: ViewportMode::FlippedY,
            draws: quads
                .iter()
                .map(|uniforms| DrawCall {
                    pipeline: quad_pipeline.handle(),
                    layout: quad_layout.handle(),
                    descriptor_set: uniforms.binding(),
                    geometry: indexed(&quad_mesh),
                    instance_count: 1,
                })
                .collect(),
            overlay: true,
        };

        let mut sequences = SequenceSet::new(config.filter);
        for (kind, pipeline) in &filter_pipelines {
            let dispatch = ComputePass {
                label: kind.label(),
                pipeline: pipeline.handle(),
                layout: filter_layout.handle(),
                descriptor_set: Binding::Shared(filter_set),
                extent,
                workgroup_size: config.workgroup_size,
            };
            sequences.insert(
                *kind,
                filter_sequence(*kind, dispatch, image_targets, main.clone()),
            );
        }

        debug_assert!(sequences.is_complete());

        info!(
            "Compute filter scene ready: {}x{} images, starting with '{}'",
            extent.width,
            extent.height,
            config.filter.label()
        );

        let mut pipelines: Vec<Pipeline> = filter_pipelines.into_iter().map(|(_, p)| p).collect();
        pipelines.push(quad_pipeline);

        Ok(Self {
            sequences,
            targets,
            overlay: FrameStatsOverlay::new(config.filter.label()),
            timer: Timer::new(),
            quads,
            _pipelines: pipelines,
            _source: source,
            _filtered: filtered,
            _sampler: sampler,
            _quad_mesh: quad_mesh,
        })
    }

    pub fn filter(&self) -> FilterKind {
        self.sequences.active_mode()
    }
}

/// Dispatch, expose both images to the main pass, then hand them back to
/// the compute stage for the next frame.
pub fn filter_sequence(
    kind: FilterKind,
    dispatch: ComputePass,
    images: [TargetId; 2],
    main: RasterPass,
) -> PassSequence {
    PassSequence::new(kind.label())
        .compute(dispatch)
        .transition(&images, ResourceState::ShaderRead)
        .raster(main)
        .transition(&images, ResourceState::StorageImage)
}

fn filter_shader(kind: FilterKind) -> &'static str {
    match kind {
        FilterKind::Sepia => "sepia.comp",
        FilterKind::Sobel => "sobel.comp",
    }
}

impl FrameRecorder<CommandBuffer> for ComputeFilterScene {
    fn update_uniforms(&mut self, frame: &FrameContext) -> RendererResult<()> {
        let params = Vec4::new(self.timer.elapsed_secs(), 0.0, 0.0, 0.0);
        for (uniforms, center) in self.quads.iter().zip(quad_centers()) {
            uniforms.write(
                frame.slot,
                &ObjectUbo::new(
                    canvas_projection(),
                    Mat4::from_translation(center),
                    Vec3::ZERO,
                    params,
                ),
            )?;
        }
        Ok(())
    }

    fn record(&mut self, encoder: &CommandBuffer, frame: &FrameContext) -> RendererResult<()> {
        PassExecutor::record(
            encoder,
            frame,
            self.sequences.active()?,
            &mut self.targets,
            &mut self.overlay,
        )
    }

    fn end_frame(&mut self, _frame: &FrameContext, submitted: bool) {
        self.targets.finish_frame(submitted);
    }
}

impl Scene for ComputeFilterScene {
    fn mode_label(&self) -> &'static str {
        self.filter().label()
    }

    fn cycle_mode(&mut self) -> &'static str {
        let label = self.sequences.cycle().label();
        self.overlay.set_mode(label);
        label
    }
}

/// RGBA8 test pattern: color bars over a vertical gradient, with a ring so
/// edge filters have curves to find.
pub fn source_texels(width: u32, height: u32) -> Vec<u8> {
    const BARS: [[u8; 3]; 7] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
    ];

    let center = Vec2::new(width as f32, height as f32) * 0.5;
    let ring_radius = height as f32 * 0.3;
    let ring_width = (height as f32 * 0.03).max(1.0);

    let mut texels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        let fade = 1.0 - 0.6 * y as f32 / height.max(1) as f32;
        for x in 0..width {
            let bar = BARS[(x as usize * BARS.len()) / width.max(1) as usize];
            let distance = (Vec2::new(x as f32, y as f32) - center).length();
            if (distance - ring_radius).abs() < ring_width {
                texels.extend_from_slice(&[16, 16, 16, 255]);
            } else {
                texels.extend(bar.map(|c| (c as f32 * fade) as u8));
                texels.push(255);
            }
        }
    }
    texels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_pattern_size_and_bars() {
        let texels = source_texels(70, 10);
        assert_eq!(texels.len(), 70 * 10 * 4);
        // Top-left is the first (white) bar, top-right the last (blue) one.
        assert_eq!(&texels[0..4], &[235, 235, 235, 255]);
        let last = (70 - 1) * 4;
        assert_eq!(&texels[last..last + 4], &[16, 16, 235, 255]);
    }

    #[test]
    fn test_quads_fit_the_canvas_side_by_side() {
        let projection = canvas_projection();
        let [left, right] = quad_centers();
        assert!(left.x < 0.0 && right.x > 0.0);
        for center in [left, right] {
            for corner in [QUAD_SIZE * 0.5, -QUAD_SIZE * 0.5] {
                let ndc = projection.project_point3(center + corner.extend(0.0));
                assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
            }
        }
        // The gap keeps the quads apart.
        assert!((right.x - left.x) > QUAD_SIZE.x);
    }

    #[test]
    fn test_every_filter_has_a_shader() {
        for &kind in FilterKind::ALL {
            assert!(filter_shader(kind).ends_with(".comp"));
        }
    }
}
