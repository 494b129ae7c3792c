//! framekit sample launcher.
//!
//! Runs one sample scene, picked by `sample.kind` in the configuration:
//! render-to-cubemap capture, a compute image filter, geometry-shader
//! draw modes, or a tessellated ground. `M` or `Space` cycles the scene's modes, `Escape` quits,
//! and dragging with the left mouse button steers the camera.
//!
//! ```text
//! framekit [--config <path>]
//! ```

mod camera;
mod mesh;
mod scenes;
mod uniforms;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use framekit_core::{Config, SampleKind};
use framekit_platform::{Action, InputState, MouseButton, Window};
use framekit_renderer::sequencer::FrameOutcome;
use framekit_renderer::{Renderer, RendererResult};

use scenes::{ComputeFilterScene, CubemapScene, GeometryScene, TessellatedGroundScene};

/// The renderer of whichever sample is running.
enum Sample {
    Cubemap(Renderer<CubemapScene>),
    ComputeFilter(Renderer<ComputeFilterScene>),
    Geometry(Renderer<GeometryScene>),
    Tessellation(Renderer<TessellatedGroundScene>),
}

macro_rules! each_sample {
    ($sample:expr, $renderer:ident => $body:expr) => {
        match $sample {
            Sample::Cubemap($renderer) => $body,
            Sample::ComputeFilter($renderer) => $body,
            Sample::Geometry($renderer) => $body,
            Sample::Tessellation($renderer) => $body,
        }
    };
}

impl Sample {
    fn new(window: &Window, config: &Config) -> RendererResult<Self> {
        Ok(match config.sample.kind {
            SampleKind::Cubemap => {
                Sample::Cubemap(Renderer::new(window, config, CubemapScene::new)?)
            }
            SampleKind::ComputeFilter => {
                Sample::ComputeFilter(Renderer::new(window, config, ComputeFilterScene::new)?)
            }
            SampleKind::Geometry => {
                Sample::Geometry(Renderer::new(window, config, GeometryScene::new)?)
            }
            SampleKind::Tessellation => Sample::Tessellation(Renderer::new(
                window,
                config,
                TessellatedGroundScene::new,
            )?),
        })
    }

    fn render_frame(&mut self) -> RendererResult<FrameOutcome> {
        each_sample!(self, renderer => renderer.render_frame())
    }

    fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        each_sample!(self, renderer => renderer.resize(width, height))
    }

    fn cycle_mode(&mut self) -> &'static str {
        each_sample!(self, renderer => renderer.cycle_mode())
    }

    fn orbit(&mut self, dx: f32, dy: f32) {
        each_sample!(self, renderer => renderer.orbit(dx, dy))
    }

    fn mode_label(&self) -> &'static str {
        use framekit_renderer::Scene;
        each_sample!(self, renderer => renderer.scene().mode_label())
    }
}

struct App {
    config: Config,
    /// Declared before `window`: the surface must go before the window.
    sample: Option<Sample>,
    window: Option<Window>,
    input: InputState,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            sample: None,
            window: None,
            input: InputState::new(),
        }
    }

    fn update_title(&self, mode: &str) {
        if let Some(ref window) = self.window {
            window.set_title(&format!("{} [{}]", self.config.window.title, mode));
        }
    }

    fn handle_actions(&mut self, event_loop: &ActiveEventLoop) {
        for action in self.input.take_actions() {
            match action {
                Action::CycleMode => {
                    if let Some(ref mut sample) = self.sample {
                        let label = sample.cycle_mode();
                        self.update_title(label);
                    }
                }
                Action::Exit => {
                    info!("Exit requested, shutting down");
                    event_loop.exit();
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::from_config(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Sample::new(&window, &self.config) {
            Ok(sample) => {
                info!("Initialization complete, entering main loop");
                let label = sample.mode_label();
                self.sample = Some(sample);
                self.window = Some(window);
                self.update_title(label);
            }
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let changed = self
                    .window
                    .as_mut()
                    .is_some_and(|window| window.resize(size.width, size.height));
                if changed
                    && let Some(ref mut sample) = self.sample
                    && let Err(e) = sample.resize(size.width, size.height)
                {
                    error!("Resize to {}x{} failed: {}", size.width, size.height, e);
                    event_loop.exit();
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::RedrawRequested => {
                if let Some(ref mut sample) = self.sample {
                    match sample.render_frame() {
                        Ok(FrameOutcome::Presented { suboptimal: true }) => {
                            debug!("Presented to a suboptimal swapchain");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Render error, shutting down: {}", e);
                            event_loop.exit();
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(button) {
                    if state.is_pressed() {
                        self.input.on_mouse_pressed(button);
                    } else {
                        self.input.on_mouse_released(button);
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
                self.handle_actions(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref mut sample) = self.sample
            && let Some((dx, dy)) = self.input.drag_delta(MouseButton::Left)
        {
            sample.orbit(dx, dy);
        }
        self.input.begin_frame();

        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

/// Returns the value of `--config`, if given.
fn parse_config_arg(args: impl IntoIterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut args = args.into_iter();
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                path = Some(PathBuf::from(value));
            }
            other => bail!("unknown argument '{other}' (usage: framekit [--config <path>])"),
        }
    }
    Ok(path)
}

fn main() -> Result<()> {
    let config_path = parse_config_arg(std::env::args().skip(1))?;
    let config =
        Config::discover(config_path.as_deref()).context("failed to load configuration")?;

    framekit_core::init_logging(&config.renderer.log_filter);
    info!(
        "Starting framekit: {:?} sample, validation {}",
        config.sample.kind,
        if config.renderer.validation { "on" } else { "off" }
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_config_arg() {
        assert_eq!(parse_config_arg(args(&[])).unwrap(), None);
        assert_eq!(
            parse_config_arg(args(&["--config", "demo.toml"])).unwrap(),
            Some(PathBuf::from("demo.toml"))
        );
    }

    #[test]
    fn test_parse_config_arg_rejects_bad_input() {
        assert!(parse_config_arg(args(&["--config"])).is_err());
        assert!(parse_config_arg(args(&["--fullscreen"])).is_err());
    }
}
