//! Frame orchestration on top of the RHI.
//!
//! This crate turns Vulkan objects into frames:
//! - Registries of render passes and layouts keyed by enums
//! - A resource factory for buffers, images, framebuffers and sync objects
//! - A ring of frame slots, one per swapchain image
//! - Pass sequences recorded by the pass executor, with tracked image states
//! - The presentation sequencer (acquire, record, submit, present, resize)
//! - Render-to-cubemap capture targets

pub mod backend;
pub mod cubemap;
mod error;
pub mod executor;
pub mod factory;
pub mod frame_ring;
pub mod overlay;
pub mod pass;
pub mod registry;
pub mod renderer;
pub mod sequencer;
pub mod target;

pub use error::{RendererError, RendererResult};
pub use renderer::{Renderer, Scene, SetupContext};
