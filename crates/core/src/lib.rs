//! Core utilities shared across framekit.
//!
//! This crate provides foundational types used by every other crate:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Configuration loading
//! - The closed set of scene modes selectable at runtime

mod config;
mod error;
mod logging;
mod modes;
mod timer;

pub use config::{
    CONFIG_ENV_VAR, ComputeConfig, Config, CubemapConfig, GeometryConfig, MAX_TESSELLATION_LEVEL,
    RendererConfig, SampleConfig, SampleKind, TessellationConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_DIRECTIVES, init_logging};
pub use modes::{CubemapMode, DrawMode, FilterKind, SceneMode, TessellationMode};
pub use timer::Timer;
