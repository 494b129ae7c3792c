//! Geometry-shader sample.
//!
//! A spinning torus drawn either flat-shaded, with face normals computed in
//! a geometry shader, or smooth-shaded with its vertex normals drawn as
//! line segments emitted by a second geometry shader.

use ash::vk;
use glam::{Mat4, Vec3};
use tracing::info;

use framekit_core::{DrawMode, SceneMode, Timer};
use framekit_renderer::executor::PassExecutor;
use framekit_renderer::factory::SimpleModel;
use framekit_renderer::overlay::FrameStatsOverlay;
use framekit_renderer::pass::{
    DrawCall, FramebufferTarget, PassSequence, RasterPass, SequenceSet, ViewportMode,
    color_depth_clear,
};
use framekit_renderer::registry::{LayoutKey, RenderPassKey};
use framekit_renderer::sequencer::{FrameContext, FrameRecorder};
use framekit_renderer::target::RenderTargets;
use framekit_renderer::{RendererResult, Scene, SetupContext};
use framekit_rhi::buffer::Buffer;
use framekit_rhi::command::CommandBuffer;
use framekit_rhi::descriptor::DescriptorResource;
use framekit_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline};
use framekit_rhi::shader::ShaderStage;

use super::{MAIN_CLEAR_COLOR, SlotUniforms, aspect, indexed, upload_mesh};
use crate::camera::OrbitCamera;
use crate::mesh::{MeshData, Vertex};
use crate::uniforms::{CameraUbo, ModelUbo};

const LIGHT_DIRECTION: Vec3 = Vec3::new(0.0, 1.0, 1.0);
const NORMAL_LINE_LENGTH: f32 = 0.15;

struct GeometryPipelines {
    flat: Pipeline,
    smooth: Pipeline,
    normal_lines: Pipeline,
}

impl GeometryPipelines {
    fn new(ctx: &SetupContext<'_>) -> RendererResult<Self> {
        let shaders = ctx.shaders;
        let render_pass = ctx.registries.render_pass(RenderPassKey::Default)?;
        let layout = ctx.registries.pipeline_layouts.require(LayoutKey::U2)?;
        let attributes = Vertex::attribute_descriptions();

        let flat = {
            let vert = shaders.load("flat.vert", ShaderStage::Vertex)?;
            let geom = shaders.load("flat.geom", ShaderStage::Geometry)?;
            let frag = shaders.load("flat.frag", ShaderStage::Fragment)?;
            GraphicsPipelineBuilder::new(render_pass)
                .stage(&vert)
                .stage(&geom)
                .stage(&frag)
                .vertex_binding(Vertex::binding_description())
                .vertex_attributes(&attributes)
                .build(ctx.device.clone(), layout)?
        };

        let smooth = {
            let vert = shaders.load("smooth.vert", ShaderStage::Vertex)?;
            let frag = shaders.load("smooth.frag", ShaderStage::Fragment)?;
            GraphicsPipelineBuilder::new(render_pass)
                .stage(&vert)
                .stage(&frag)
                .vertex_binding(Vertex::binding_description())
                .vertex_attributes(&attributes)
                .build(ctx.device.clone(), layout)?
        };

        // Triangles in, one line strip per vertex out.
        let normal_lines = {
            let vert = shaders.load("normal_lines.vert", ShaderStage::Vertex)?;
            let geom = shaders.load("normal_lines.geom", ShaderStage::Geometry)?;
            let frag = shaders.load("normal_lines.frag", ShaderStage::Fragment)?;
            GraphicsPipelineBuilder::new(render_pass)
                .stage(&vert)
                .stage(&geom)
                .stage(&frag)
                .vertex_binding(Vertex::binding_description())
                .vertex_attributes(&attributes)
                .cull_mode(vk::CullModeFlags::NONE)
                .build(ctx.device.clone(), layout)?
        };

        Ok(Self {
            flat,
            smooth,
            normal_lines,
        })
    }
}

/// Torus drawn with geometry-shader based draw modes.
pub struct GeometryScene {
    sequences: SequenceSet<DrawMode>,
    targets: RenderTargets,
    overlay: FrameStatsOverlay,
    timer: Timer,
    camera: OrbitCamera,
    camera_uniforms: SlotUniforms<CameraUbo>,
    model_buffers: Vec<Buffer>,

    _pipelines: GeometryPipelines,
    _torus: SimpleModel,
}

impl GeometryScene {
    pub fn new(ctx: &mut SetupContext<'_>) -> RendererResult<Self> {
        let mode = ctx.config.geometry.mode;
        let factory = ctx.factory;

        let model_buffers = factory.create_uniform_buffers(
            std::mem::size_of::<ModelUbo>() as vk::DeviceSize,
            ctx.frame_slots,
        )?;
        let model_handles: Vec<vk::Buffer> = model_buffers.iter().map(Buffer::handle).collect();
        let camera_uniforms = SlotUniforms::<CameraUbo>::new(
            factory,
            ctx.registries.set_layout(LayoutKey::U2)?,
            ctx.frame_slots,
            |slot| {
                model_handles
                    .get(slot)
                    .map(|&buffer| vec![(1, DescriptorResource::UniformBuffer(buffer))])
                    .unwrap_or_default()
            },
        )?;

        let torus = upload_mesh(factory, &MeshData::torus(3.0, 1.0, 64, 24))?;
        let pipelines = GeometryPipelines::new(ctx)?;

        let layout = ctx.registries.pipeline_layout(LayoutKey::U2)?;
        let draw = |pipeline: &Pipeline| DrawCall {
            pipeline: pipeline.handle(),
            layout,
            descriptor_set: camera_uniforms.binding(),
            geometry: indexed(&torus),
            instance_count: 1,
        };
        let main_pass = ctx.registries.render_pass(RenderPassKey::Default)?;
        let main = |draws: Vec<DrawCall>| RasterPass {
            label: "main",
            render_pass: main_pass,
            target: FramebufferTarget::Swapchain,
            clear_values: color_depth_clear(MAIN_CLEAR_COLOR, 1.0),
            viewport: ViewportMode::FlippedY,
            draws,
            overlay: true,
        };

        let mut sequences = SequenceSet::new(mode);
        for &draw_mode in DrawMode::ALL {
            let draws = match draw_mode {
                DrawMode::Flat => vec![draw(&pipelines.flat)],
                DrawMode::NormalVector => {
                    vec![draw(&pipelines.smooth), draw(&pipelines.normal_lines)]
                }
            };
            sequences.insert(
                draw_mode,
                PassSequence::new(draw_mode.label()).raster(main(draws)),
            );
        }

        debug_assert!(sequences.is_complete());

        info!("Geometry scene ready, starting in '{}'", mode.label());

        Ok(Self {
            sequences,
            targets: RenderTargets::new(),
            overlay: FrameStatsOverlay::new(mode.label()),
            timer: Timer::new(),
            camera: OrbitCamera {
                distance: 12.0,
                height: 5.0,
                ..OrbitCamera::default()
            },
            camera_uniforms,
            model_buffers,
            _pipelines: pipelines,
            _torus: torus,
        })
    }

    pub fn mode(&self) -> DrawMode {
        self.sequences.active_mode()
    }
}

impl FrameRecorder<CommandBuffer> for GeometryScene {
    fn update_uniforms(&mut self, frame: &FrameContext) -> RendererResult<()> {
        let time = self.timer.elapsed_secs();
        self.camera_uniforms.write(
            frame.slot,
            &CameraUbo {
                view: self.camera.view(time),
                projection: self.camera.projection(aspect(frame.extent)),
            },
        )?;

        if let Some(buffer) = self.model_buffers.get(frame.slot) {
            let model = Mat4::from_rotation_x(time * 0.5) * Mat4::from_rotation_z(time * 0.2);
            buffer.write_pod(&ModelUbo::new(model, LIGHT_DIRECTION, NORMAL_LINE_LENGTH))?;
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

impl Scene for GeometryScene {
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
