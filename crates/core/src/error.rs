//! Error types shared by every framekit crate.

use thiserror::Error;

/// Errors raised outside the Vulkan object layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan failures reported by collaborators that only see strings
    /// (surface creation, extension enumeration).
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but holds an unusable value
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
