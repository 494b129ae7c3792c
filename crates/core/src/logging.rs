//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directives used when neither `RUST_LOG` nor the config file provide any.
pub const DEFAULT_LOG_DIRECTIVES: &str = "info,framekit=debug";

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` wins when set; otherwise `default_directives` is used
/// (typically `Config::renderer.log_filter`). Calling this twice is harmless:
/// the second global subscriber is rejected and the first one stays active.
///
/// # Example
/// ```
/// framekit_core::init_logging(framekit_core::DEFAULT_LOG_DIRECTIVES);
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}
