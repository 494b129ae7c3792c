//! Tessellated ground sample.
//!
//! A coarse grid of four-point patches is subdivided on the GPU, more
//! finely near the camera, and displaced by a heightmap. The ground is lit
//! from a normal map baked alongside the heightmap. Wireframe mode draws
//! the generated triangles as lines so the subdivision is visible.

use std::f32::consts::TAU;

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use tracing::info;

use framekit_core::{SceneMode, TessellationMode, Timer};
use framekit_renderer::executor::PassExecutor;
use framekit_renderer::factory::{ExtraViews, SimpleModel};
use framekit_renderer::overlay::FrameStatsOverlay;
use framekit_renderer::pass::{
    DrawCall, FramebufferTarget, PassSequence, RasterPass, SequenceSet, ViewportMode,
    color_depth_clear,
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

use super::{MAIN_CLEAR_COLOR, SlotUniforms, aspect, indexed, upload_mesh};
use crate::camera::OrbitCamera;
use crate::mesh::{MeshData, Vertex};
use crate::uniforms::GroundUbo;

/// World-space edge of the ground square.
pub const GROUND_EDGE: f32 = 200.0;
/// Patches per ground edge.
pub const GROUND_DIVISIONS: u32 = 10;
/// Heightmap and normal map edge in texels.
pub const TERRAIN_TEXELS: u32 = 256;

const TERRAIN_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const LIGHT_DIRECTION: Vec3 = Vec3::new(0.5, 1.0, 0.3);
const CAMERA_START: Vec3 = Vec3::new(48.5, 25.0, 65.0);

/// Camera distance at which patches reach the maximum level.
const TESS_NEAR: f32 = 20.0;
/// Camera distance beyond which patches are not subdivided.
const TESS_FAR: f32 = 250.0;

/// Subdivision level for a patch edge `distance` away from the camera.
///
/// Falls off linearly from `max_level` at [`TESS_NEAR`] to 1 at
/// [`TESS_FAR`]. `ground.tesc` evaluates the same curve.
pub fn tess_level(distance: f32, max_level: f32) -> f32 {
    let t = ((distance - TESS_NEAR) / (TESS_FAR - TESS_NEAR)).clamp(0.0, 1.0);
    (max_level + (1.0 - max_level) * t).max(1.0)
}

/// Terrain height in `[0, 1]` at texture coordinate `(u, v)`.
fn height_at(u: f32, v: f32) -> f32 {
    let hills = (u * TAU * 2.0).sin() * (v * TAU * 1.5).cos();
    let ridges = ((u + v) * TAU * 4.0).sin();
    let bumps = (u * TAU * 9.0).cos() * (v * TAU * 7.0).sin();
    (0.5 + 0.3 * hills + 0.12 * ridges + 0.05 * bumps).clamp(0.0, 1.0)
}

fn height_grid(size: u32) -> Vec<f32> {
    let scale = 1.0 / size.max(1) as f32;
    (0..size)
        .flat_map(|y| (0..size).map(move |x| height_at((x as f32 + 0.5) * scale, (y as f32 + 0.5) * scale)))
        .collect()
}

/// RGBA8 heightmap with the height in every color channel.
pub fn heightmap_texels(size: u32) -> Vec<u8> {
    height_grid(size)
        .into_iter()
        .flat_map(|h| {
            let level = (h * 255.0).round() as u8;
            [level, level, level, 255]
        })
        .collect()
}

/// RGBA8 tangent-free normal map of the heightmap, for a ground `edge`
/// units wide displaced by up to `height_scale` units.
///
/// Normals are world-space and packed as `n * 0.5 + 0.5`.
pub fn normal_map_texels(size: u32, edge: f32, height_scale: f32) -> Vec<u8> {
    let heights = height_grid(size);
    let last = size.saturating_sub(1) as i64;
    let at = |x: i64, y: i64| heights[(y.clamp(0, last) * size as i64 + x.clamp(0, last)) as usize];
    let spacing = edge / size.max(1) as f32;

    let mut texels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size as i64 {
        for x in 0..size as i64 {
            let dx = (at(x + 1, y) - at(x - 1, y)) * height_scale / (2.0 * spacing);
            let dz = (at(x, y + 1) - at(x, y - 1)) * height_scale / (2.0 * spacing);
            let normal = Vec3::new(-dx, 1.0, -dz).normalize();
            let packed = (normal * 0.5 + Vec3::splat(0.5)) * 255.0;
            texels.extend_from_slice(&[
                packed.x.round() as u8,
                packed.y.round() as u8,
                packed.z.round() as u8,
                255,
            ]);
        }
    }
    texels
}

struct GroundPipelines {
    solid: Pipeline,
    wireframe: Pipeline,
}

impl GroundPipelines {
    fn new(ctx: &SetupContext<'_>) -> RendererResult<Self> {
        let shaders = ctx.shaders;
        let render_pass = ctx.registries.render_pass(RenderPassKey::Default)?;
        let layout = ctx.registries.pipeline_layouts.require(LayoutKey::U1T2)?;
        let attributes = Vertex::attribute_descriptions();

        let vert = shaders.load("ground.vert", ShaderStage::Vertex)?;
        let tesc = shaders.load("ground.tesc", ShaderStage::TessControl)?;
        let tese = shaders.load("ground.tese", ShaderStage::TessEvaluation)?;
        let frag = shaders.load("ground.frag", ShaderStage::Fragment)?;

        let build = |polygon_mode: vk::PolygonMode| {
            GraphicsPipelineBuilder::new(render_pass)
                .stage(&vert)
                .stage(&tesc)
                .stage(&tese)
                .stage(&frag)
                .vertex_binding(Vertex::binding_description())
                .vertex_attributes(&attributes)
                .patches(4)
                .cull_mode(vk::CullModeFlags::NONE)
                .polygon_mode(polygon_mode)
                .build(ctx.device.clone(), layout)
        };

        Ok(Self {
            solid: build(vk::PolygonMode::FILL)?,
            wireframe: build(vk::PolygonMode::LINE)?,
        })
    }
}

/// Heightmapped ground subdivided by tessellation shaders.
pub struct TessellatedGroundScene {
    sequences: SequenceSet<TessellationMode>,
    targets: RenderTargets,
    overlay: FrameStatsOverlay,
    timer: Timer,
    camera: OrbitCamera,
    uniforms: SlotUniforms<GroundUbo>,
    tessellation: Vec4,

    _pipelines: GroundPipelines,
    _ground: SimpleModel,
    _heightmap: Image,
    _normal_map: Image,
    _sampler: Sampler,
}

impl TessellatedGroundScene {
    pub fn new(ctx: &mut SetupContext<'_>) -> RendererResult<Self> {
        let config = &ctx.config.tessellation;
        let mode = config.mode;
        let factory = ctx.factory;

        let extent = vk::Extent2D {
            width: TERRAIN_TEXELS,
            height: TERRAIN_TEXELS,
        };
        let usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        let heightmap = factory.upload_texture(
            &ImageDesc::color_2d("heightmap", extent, TERRAIN_FORMAT, usage),
            ExtraViews::default(),
            &heightmap_texels(TERRAIN_TEXELS),
            ResourceState::ShaderRead,
        )?;
        let normal_map = factory.upload_texture(
            &ImageDesc::color_2d("normal map", extent, TERRAIN_FORMAT, usage),
            ExtraViews::default(),
            &normal_map_texels(TERRAIN_TEXELS, GROUND_EDGE, config.height_scale),
            ResourceState::ShaderRead,
        )?;
        let sampler = factory.create_sampler(&SamplerDesc::default())?;

        let (heightmap_view, normal_map_view, sampler_handle) =
            (heightmap.view(), normal_map.view(), sampler.handle());
        let uniforms = SlotUniforms::<GroundUbo>::new(
            factory,
            ctx.registries.set_layout(LayoutKey::U1T2)?,
            ctx.frame_slots,
            |_| {
                vec![
                    (
                        1,
                        DescriptorResource::CombinedImageSampler {
                            view: heightmap_view,
                            sampler: sampler_handle,
                        },
                    ),
                    (
                        2,
                        DescriptorResource::CombinedImageSampler {
                            view: normal_map_view,
                            sampler: sampler_handle,
                        },
                    ),
                ]
            },
        )?;

        let ground = upload_mesh(factory, &MeshData::ground_patches(GROUND_EDGE, GROUND_DIVISIONS))?;
        let pipelines = GroundPipelines::new(ctx)?;

        let layout = ctx.registries.pipeline_layout(LayoutKey::U1T2)?;
        let main_pass = ctx.registries.render_pass(RenderPassKey::Default)?;
        let mut sequences = SequenceSet::new(mode);
        for &fill in TessellationMode::ALL {
            let pipeline = match fill {
                TessellationMode::Solid => &pipelines.solid,
                TessellationMode::Wireframe => &pipelines.wireframe,
            };
            let draw = DrawCall {
                pipeline: pipeline.handle(),
                layout,
                descriptor_set: uniforms.binding(),
                geometry: indexed(&ground),
                instance_count: 1,
            };
            sequences.insert(
                fill,
                PassSequence::new(fill.label()).raster(RasterPass {
                    label: "main",
                    render_pass: main_pass,
                    target: FramebufferTarget::Swapchain,
                    clear_values: color_depth_clear(MAIN_CLEAR_COLOR, 1.0),
                    viewport: ViewportMode::FlippedY,
                    draws: vec![draw],
                    overlay: true,
                }),
            );
        }

        debug_assert!(sequences.is_complete());

        info!(
            "Tessellated ground ready, starting in '{}' (max level {}, height scale {})",
            mode.label(),
            config.max_level,
            config.height_scale
        );

        Ok(Self {
            sequences,
            targets: RenderTargets::new(),
            overlay: FrameStatsOverlay::new(mode.label()),
            timer: Timer::new(),
            camera: start_camera(),
            uniforms,
            tessellation: Vec4::new(config.max_level, config.height_scale, TESS_NEAR, TESS_FAR),
            _pipelines: pipelines,
            _ground: ground,
            _heightmap: heightmap,
            _normal_map: normal_map,
            _sampler: sampler,
        })
    }

    pub fn mode(&self) -> TessellationMode {
        self.sequences.active_mode()
    }
}

/// Still camera overlooking the ground from [`CAMERA_START`]; only dragging
/// moves it.
fn start_camera() -> OrbitCamera {
    OrbitCamera {
        distance: Vec3::new(CAMERA_START.x, 0.0, CAMERA_START.z).length(),
        height: CAMERA_START.y,
        angular_speed: 0.0,
        far: 1000.0,
        yaw_offset: CAMERA_START.x.atan2(CAMERA_START.z),
        ..OrbitCamera::default()
    }
}

impl FrameRecorder<CommandBuffer> for TessellatedGroundScene {
    fn update_uniforms(&mut self, frame: &FrameContext) -> RendererResult<()> {
        let time = self.timer.elapsed_secs();
        self.uniforms.write(
            frame.slot,
            &GroundUbo {
                world: Mat4::IDENTITY,
                view: self.camera.view(time),
                projection: self.camera.projection(aspect(frame.extent)),
                light: LIGHT_DIRECTION.normalize().extend(0.0),
                camera_position: self.camera.position(time).extend(1.0),
                tessellation: self.tessellation,
            },
        )
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

impl Scene for TessellatedGroundScene {
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
