//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides scope-bound wrappers over Vulkan objects using `ash`.
//! It handles:
//! - Instance, physical device and logical device creation
//! - Memory-backed buffers and images through gpu-allocator
//! - Render passes, framebuffers, samplers and pipelines
//! - Command recording behind the [`encoder::CommandEncoder`] trait
//! - Image layout transitions described as [`barrier::ImageTransition`] values
//! - Synchronization primitives and the swapchain

mod error;

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod encoder;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
