//! Top-level renderer.
//!
//! [`Renderer`] owns the Vulkan context, the registries and resource factory,
//! one [`Scene`] and the presentation sequencer that drives it.
//!
//! # Resource Destruction Order
//!
//! Vulkan objects must be destroyed before the objects they were created
//! from. On drop the renderer:
//!
//! 1. Waits for the device to go idle
//! 2. Drops the scene (pipelines, buffers, images, descriptor sets)
//! 3. Drops the sequencer (frame slots, framebuffers, swapchain, surface)
//! 4. Drops the resource factory (command pool, descriptor pool)
//! 5. Drops the registries (render passes, layouts)
//! 6. Drops the shader library and the device
//! 7. Drops the instance
//!
//! ManuallyDrop is used to enforce this order.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use framekit_core::Config;
use framekit_platform::Window;
use framekit_rhi::command::CommandBuffer;
use framekit_rhi::device::Device;
use framekit_rhi::image::DEPTH_FORMAT;
use framekit_rhi::instance::Instance;
use framekit_rhi::physical_device::select_physical_device;
use framekit_rhi::shader::ShaderLibrary;
use framekit_rhi::swapchain::Swapchain;

use crate::backend::{FrameBackend, SwapchainBackend};
use crate::error::RendererResult;
use crate::factory::ResourceFactory;
use crate::frame_ring::FrameRing;
use crate::registry::{Registries, RenderPassKey};
use crate::sequencer::{FrameOutcome, FrameRecorder, PresentationSequencer};

/// A sample scene: builds its resources once, then records every frame.
pub trait Scene: FrameRecorder<CommandBuffer> {
    /// Label of the active mode.
    fn mode_label(&self) -> &'static str;

    /// Switches to the next mode and returns its label.
    fn cycle_mode(&mut self) -> &'static str;

    /// Steers the scene camera by a mouse drag of `(dx, dy)` pixels. Scenes
    /// without a camera ignore it.
    fn orbit(&mut self, _dx: f32, _dy: f32) {}
}

/// What a scene can use while building its resources.
pub struct SetupContext<'a> {
    pub device: &'a Arc<Device>,
    pub factory: &'a ResourceFactory,
    pub registries: &'a mut Registries,
    pub shaders: &'a ShaderLibrary,
    pub config: &'a Config,
    /// Format of swapchain images and the [`RenderPassKey::Default`] pass.
    pub swapchain_format: vk::Format,
    pub extent: vk::Extent2D,
    /// Number of frame slots; per-slot resources need this many copies.
    pub frame_slots: usize,
}

/// Vulkan context plus one scene.
pub struct Renderer<S: Scene> {
    scene: ManuallyDrop<S>,
    sequencer: ManuallyDrop<PresentationSequencer<SwapchainBackend>>,
    factory: ManuallyDrop<ResourceFactory>,
    registries: ManuallyDrop<Registries>,
    shaders: ManuallyDrop<ShaderLibrary>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Arc<Instance>>,
}

impl<S: Scene> Renderer<S> {
    /// Creates the Vulkan context for `window`, registers the shared render
    /// pass and descriptor layouts, then builds the scene with `build_scene`.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object creation fails or the scene
    /// fails to build.
    pub fn new<F>(window: &Window, config: &Config, build_scene: F) -> RendererResult<Self>
    where
        F: FnOnce(&mut SetupContext<'_>) -> RendererResult<S>,
    {
        let width = window.width();
        let height = window.height();
        info!("Initializing renderer ({}x{})", width, height);

        let instance = Arc::new(Instance::new(
            &config.window.title,
            config.renderer.validation,
        )?);
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let mut registries = Registries::new();
        let factory =
            ResourceFactory::new(device.clone(), config.renderer.descriptor_pool_capacity)?;
        let shaders = ShaderLibrary::new(device.clone(), config.renderer.shader_dir.clone());

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;
        let swapchain_format = swapchain.format();
        let extent = swapchain.extent();
        let image_count = swapchain.image_count();

        let default_pass = factory.create_render_pass(
            swapchain_format,
            Some(DEPTH_FORMAT),
            vk::ImageLayout::PRESENT_SRC_KHR,
        )?;
        registries
            .render_passes
            .register(RenderPassKey::Default, default_pass);
        registries.register_all_layouts(&device)?;
        let default_pass = registries.render_pass(RenderPassKey::Default)?;

        let scene = build_scene(&mut SetupContext {
            device: &device,
            factory: &factory,
            registries: &mut registries,
            shaders: &shaders,
            config,
            swapchain_format,
            extent,
            frame_slots: image_count as usize,
        })?;

        let backend =
            SwapchainBackend::new(instance.clone(), device.clone(), surface, swapchain, default_pass)?;
        let encoders = factory.create_command_buffers(image_count)?;
        let fences = (0..image_count)
            .map(|_| factory.create_fence(true))
            .collect::<RendererResult<Vec<_>>>()?;
        let sequencer =
            PresentationSequencer::new(backend, FrameRing::new(encoders.into_iter().zip(fences)))?;

        info!(
            "Renderer initialized: {} on {}, {} frame slots, mode '{}'",
            physical_device_info.device_name(),
            physical_device_info.device_type_name(),
            image_count,
            scene.mode_label()
        );

        Ok(Self {
            scene: ManuallyDrop::new(scene),
            sequencer: ManuallyDrop::new(sequencer),
            factory: ManuallyDrop::new(factory),
            registries: ManuallyDrop::new(registries),
            shaders: ManuallyDrop::new(shaders),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// Renders and presents one frame.
    pub fn render_frame(&mut self) -> RendererResult<FrameOutcome> {
        self.sequencer.render_frame(&mut *self.scene)
    }

    /// Rebuilds size-dependent attachments; a zero size pauses rendering.
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        self.sequencer.on_resize(width, height)
    }

    pub fn cycle_mode(&mut self) -> &'static str {
        let label = self.scene.cycle_mode();
        info!("Switched to mode '{}'", label);
        label
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.scene.orbit(dx, dy);
    }

    #[inline]
    pub fn scene(&self) -> &S {
        &self.scene
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.sequencer.is_paused()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.sequencer.backend().extent()
    }
}

impl<S: Scene> Drop for Renderer<S> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }

        // SAFETY: Each field is dropped exactly once, here, and never used
        // afterwards.
        unsafe {
            ManuallyDrop::drop(&mut self.scene);
            ManuallyDrop::drop(&mut self.sequencer);
            ManuallyDrop::drop(&mut self.factory);
            ManuallyDrop::drop(&mut self.registries);
            ManuallyDrop::drop(&mut self.shaders);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
