//! Platform layer for framekit.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Vulkan surface creation for a window
//! - Keyboard and mouse input, and key bindings

mod input;
mod window;

pub use input::{Action, InputState, KeyCode, MAX_DRAG_DELTA, MouseButton};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
