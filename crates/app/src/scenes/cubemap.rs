//! Cubemap capture sample.
//!
//! Six cubes orbit a mirrored sphere. The sphere samples either a static
//! cubemap or one rendered from its center each frame, captured with six
//! face passes or one layered pass.

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use tracing::info;

use framekit_core::{CubemapMode, SceneMode, Timer};
use framekit_renderer::cubemap::{
    self, CUBE_FACES, CaptureDraws, CubeCaptureTargets, FACE_DIRECTIONS, capture_sequence,
    face_projection, face_view_matrices,
};
use framekit_renderer::executor::PassExecutor;
use framekit_renderer::factory::{ExtraViews, SimpleModel};
use framekit_renderer::overlay::FrameStatsOverlay;
use framekit_renderer::pass::{
    Binding, DrawCall, FramebufferTarget, RasterPass, SequenceSet, ViewportMode, color_depth_clear,
};
use framekit_renderer::registry::{LayoutKey, RenderPassKey};
use framekit_renderer::sequencer::{FrameContext, FrameRecorder};
use framekit_renderer::target::RenderTargets;
use framekit_renderer::{RendererResult, Scene, SetupContext};
use framekit_rhi::barrier::ResourceState;
use framekit_rhi::command::CommandBuffer;
use framekit_rhi::descriptor::DescriptorResource;
use framekit_rhi::image::{Image, ImageDesc};
use framekit_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline};
use framekit_rhi::sampler::{Sampler, SamplerDesc};
use framekit_rhi::shader::ShaderStage;

use super::{MAIN_CLEAR_COLOR, SlotUniforms, aspect, indexed, no_bindings, upload_mesh};
use crate::camera::OrbitCamera;
use crate::mesh::{MeshData, Vertex};
use crate::uniforms::{LayeredCaptureUbo, ObjectUbo};

/// Distance of the orbiting cubes from the center on each axis.
pub const OBJECT_SPACING: f32 = 5.0;

/// Number of orbiting cubes, one per axis direction.
const ORBITING_OBJECTS: u32 = 6;

const STATIC_CUBE_EDGE: u32 = 64;
const STATIC_CUBE_CELLS: u32 = 8;

struct CubemapPipelines {
    orbit_main: Pipeline,
    orbit_face: Pipeline,
    orbit_layered: Pipeline,
    mirror: Pipeline,
}

impl CubemapPipelines {
    fn new(ctx: &SetupContext<'_>) -> RendererResult<Self> {
        let shaders = ctx.shaders;
        let object_vert = shaders.load("object.vert", ShaderStage::Vertex)?;
        let object_frag = shaders.load("object.frag", ShaderStage::Fragment)?;
        let layered_vert = shaders.load("object_layered.vert", ShaderStage::Vertex)?;
        let layered_geom = shaders.load("cube_layers.geom", ShaderStage::Geometry)?;
        let mirror_vert = shaders.load("mirror.vert", ShaderStage::Vertex)?;
        let mirror_frag = shaders.load("mirror.frag", ShaderStage::Fragment)?;

        let main_pass = ctx.registries.render_pass(RenderPassKey::Default)?;
        let cube_pass = ctx.registries.render_pass(RenderPassKey::Cubemap)?;
        let object_layout = ctx.registries.pipeline_layouts.require(LayoutKey::U1)?;
        let mirror_layout = ctx.registries.pipeline_layouts.require(LayoutKey::U1T1)?;
        let attributes = Vertex::attribute_descriptions();

        let orbit_main = GraphicsPipelineBuilder::new(main_pass)
            .stage(&object_vert)
            .stage(&object_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&attributes)
            .build(ctx.device.clone(), object_layout)?;

        // Capture passes keep the standard viewport, which mirrors winding.
        let orbit_face = GraphicsPipelineBuilder::new(cube_pass)
            .stage(&object_vert)
            .stage(&object_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&attributes)
            .cull_mode(vk::CullModeFlags::NONE)
            .build(ctx.device.clone(), object_layout)?;

        let orbit_layered = GraphicsPipelineBuilder::new(cube_pass)
            .stage(&layered_vert)
            .stage(&layered_geom)
            .stage(&object_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&attributes)
            .cull_mode(vk::CullModeFlags::NONE)
            .build(ctx.device.clone(), object_layout)?;

        let mirror = GraphicsPipelineBuilder::new(main_pass)
            .stage(&mirror_vert)
            .stage(&mirror_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&attributes)
            .build(ctx.device.clone(), mirror_layout)?;

        Ok(Self {
            orbit_main,
            orbit_face,
            orbit_layered,
            mirror,
        })
    }
}

/// Mirrored sphere reflecting six orbiting cubes.
pub struct CubemapScene {
    sequences: SequenceSet<CubemapMode>,
    targets: RenderTargets,
    overlay: FrameStatsOverlay,
    timer: Timer,
    camera: OrbitCamera,

    orbit_main: SlotUniforms<ObjectUbo>,
    orbit_faces: Vec<SlotUniforms<ObjectUbo>>,
    orbit_layered: SlotUniforms<LayeredCaptureUbo>,
    mirror: SlotUniforms<ObjectUbo>,

    _pipelines: CubemapPipelines,
    _capture: CubeCaptureTargets,
    _static_cube: Image,
    _sampler: Sampler,
    _cube_mesh: SimpleModel,
    _sphere_mesh: SimpleModel,
}

impl CubemapScene {
    pub fn new(ctx: &mut SetupContext<'_>) -> RendererResult<Self> {
        let config = &ctx.config.cubemap;
        let factory = ctx.factory;
        let slots = ctx.frame_slots;

        cubemap::register_render_pass(factory, ctx.registries)?;

        let mut targets = RenderTargets::new();
        let capture = CubeCaptureTargets::new(factory, ctx.registries, &mut targets, config.edge)?;

        let static_cube = factory.upload_texture(
            &ImageDesc::cube(
                "static cubemap",
                STATIC_CUBE_EDGE,
                cubemap::CUBE_FORMAT,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            ExtraViews::default(),
            &static_cube_texels(STATIC_CUBE_EDGE),
            ResourceState::ShaderRead,
        )?;
        let sampler = factory.create_sampler(&SamplerDesc::default())?;

        let cube_mesh = upload_mesh(factory, &MeshData::cube(0.75))?;
        let sphere_mesh = upload_mesh(factory, &MeshData::sphere(2.0, 48, 24))?;

        let object_set_layout = ctx.registries.set_layout(LayoutKey::U1)?;
        let mirror_set_layout = ctx.registries.set_layout(LayoutKey::U1T1)?;
        let sampler_handle = sampler.handle();
        let sampled = |view: vk::ImageView| {
            move |_: usize| {
                vec![(
                    1,
                    DescriptorResource::CombinedImageSampler {
                        view,
                        sampler: sampler_handle,
                    },
                )]
            }
        };

        let orbit_main = SlotUniforms::new(factory, object_set_layout, slots, no_bindings)?;
        let orbit_faces = (0..CUBE_FACES)
            .map(|_| SlotUniforms::new(factory, object_set_layout, slots, no_bindings))
            .collect::<RendererResult<Vec<_>>>()?;
        let orbit_layered = SlotUniforms::new(factory, object_set_layout, slots, no_bindings)?;
        let mirror = SlotUniforms::new(
            factory,
            mirror_set_layout,
            slots,
            sampled(capture.cube_view()),
        )?;
        let mirror_static_sets =
            mirror.extra_sets(factory, mirror_set_layout, sampled(static_cube.view()))?;

        let pipelines = CubemapPipelines::new(ctx)?;

        let object_layout = ctx.registries.pipeline_layout(LayoutKey::U1)?;
        let mirror_layout = ctx.registries.pipeline_layout(LayoutKey::U1T1)?;
        let orbit_draw = |pipeline: &Pipeline, uniforms: &SlotUniforms<ObjectUbo>| DrawCall {
            pipeline: pipeline.handle(),
            layout: object_layout,
            descriptor_set: uniforms.binding(),
            geometry: indexed(&cube_mesh),
            instance_count: ORBITING_OBJECTS,
        };

        let draws = CaptureDraws {
            faces: std::array::from_fn(|face| {
                vec![orbit_draw(&pipelines.orbit_face, &orbit_faces[face])]
            }),
            layered: vec![DrawCall {
                pipeline: pipelines.orbit_layered.handle(),
                layout: object_layout,
                descriptor_set: orbit_layered.binding(),
                geometry: indexed(&cube_mesh),
                instance_count: ORBITING_OBJECTS,
            }],
        };

        let main_pass = ctx.registries.render_pass(RenderPassKey::Default)?;
        let main = |mirror_sets: Binding<vk::DescriptorSet>| RasterPass {
            label: "main",
            render_pass: main_pass,
            target: FramebufferTarget::Swapchain,
            clear_values: color_depth_clear(MAIN_CLEAR_COLOR, 1.0),
            viewport: ViewportMode::FlippedY,
            draws: vec![
                orbit_draw(&pipelines.orbit_main, &orbit_main),
                DrawCall {
                    pipeline: pipelines.mirror.handle(),
                    layout: mirror_layout,
                    descriptor_set: mirror_sets,
                    geometry: indexed(&sphere_mesh),
                    instance_count: 1,
                },
            ],
            overlay: true,
        };

        let capture_layout = capture.layout(ctx.registries.render_pass(RenderPassKey::Cubemap)?);
        let mut sequences = SequenceSet::new(config.mode);
        for &mode in CubemapMode::ALL {
            let mirror_sets = match mode {
                CubemapMode::Static => Binding::PerSlot(mirror_static_sets.clone()),
                CubemapMode::MultiPass | CubemapMode::SinglePass => mirror.binding(),
            };
            sequences.insert(
                mode,
                capture_sequence(mode, &capture_layout, &draws, main(mirror_sets)),
            );
        }

        debug_assert!(sequences.is_complete());

        info!(
            "Cubemap scene ready: {}x{} capture, starting in '{}'",
            config.edge,
            config.edge,
            config.mode.label()
        );

        Ok(Self {
            sequences,
            targets,
            overlay: FrameStatsOverlay::new(config.mode.label()),
            timer: Timer::new(),
            camera: OrbitCamera::default(),
            orbit_main,
            orbit_faces,
            orbit_layered,
            mirror,
            _pipelines: pipelines,
            _capture: capture,
            _static_cube: static_cube,
            _sampler: sampler,
            _cube_mesh: cube_mesh,
            _sphere_mesh: sphere_mesh,
        })
    }

    pub fn mode(&self) -> CubemapMode {
        self.sequences.active_mode()
    }
}

impl FrameRecorder<CommandBuffer> for CubemapScene {
    fn update_uniforms(&mut self, frame: &FrameContext) -> RendererResult<()> {
        let time = self.timer.elapsed_secs();
        let view_projection = self.camera.view_projection(time, aspect(frame.extent));
        let eye = self.camera.position(time);
        let spin = Mat4::from_rotation_y(time);
        let params = Vec4::new(time, OBJECT_SPACING, 0.0, 0.0);

        self.orbit_main.write(
            frame.slot,
            &ObjectUbo::new(view_projection, spin, eye, params),
        )?;
        self.mirror.write(
            frame.slot,
            &ObjectUbo::new(view_projection, Mat4::IDENTITY, eye, params),
        )?;

        let projection = face_projection();
        let views = face_view_matrices(Vec3::ZERO);
        match self.mode() {
            CubemapMode::Static => {}
            CubemapMode::MultiPass => {
                for (uniforms, view) in self.orbit_faces.iter().zip(views) {
                    uniforms.write(
                        frame.slot,
                        &ObjectUbo::new(projection * view, spin, Vec3::ZERO, params),
                    )?;
                }
            }
            CubemapMode::SinglePass => {
                self.orbit_layered.write(
                    frame.slot,
                    &LayeredCaptureUbo {
                        face_view_projection: views.map(|view| projection * view),
                        model: spin,
                        params,
                    },
                )?;
            }
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

impl Scene for CubemapScene {
    fn mode_label(&self) -> &'static str {
        self.mode().label()
    }

    fn cycle_mode(&mut self) -> &'static str {
        let label = self.sequences.cycle().label();
        self.overlay.set_mode(label);
        label
    }

    fn orbit(&mut self, dx: f32, dy: f32) {
        self.camera.drag(dx, dy);
    }
}

/// RGBA8 texels of all six faces in layer order: each face is tinted by its
/// direction and checkered.
pub fn static_cube_texels(edge: u32) -> Vec<u8> {
    let cell = (edge / STATIC_CUBE_CELLS).max(1);
    let mut texels = Vec::with_capacity((edge * edge * 4) as usize * CUBE_FACES);
    for direction in FACE_DIRECTIONS {
        let tint = direction * 0.35 + Vec3::splat(0.6);
        for y in 0..edge {
            for x in 0..edge {
                let shade = if (x / cell + y / cell) % 2 == 0 { 1.0 } else { 0.7 };
                let color = tint * shade;
                texels.extend([color.x, color.y, color.z].map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8));
                texels.push(255);
            }
        }
    }
    texels
}
