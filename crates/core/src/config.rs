//! Runtime configuration, loaded from `framekit.toml`.
//!
//! Every section and field has a default, so an empty or partial file is a
//! valid configuration. Unknown keys are rejected so typos surface at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_DIRECTIVES;
use crate::modes::{CubemapMode, DrawMode, FilterKind, TessellationMode};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FRAMEKIT_CONFIG";

/// File looked up in the working directory when nothing else is given.
const LOCAL_CONFIG_FILE: &str = "framekit.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub sample: SampleConfig,
    pub cubemap: CubemapConfig,
    pub compute: ComputeConfig,
    pub geometry: GeometryConfig,
    pub tessellation: TessellationConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "framekit".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Enable Khronos validation and the debug-utils messenger.
    pub validation: bool,
    /// Directory holding compiled `.spv` shader stages.
    pub shader_dir: PathBuf,
    /// Fallback tracing directives when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Maximum descriptor sets (and per-type descriptors) in the shared pool.
    pub descriptor_pool_capacity: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders/spirv"),
            log_filter: DEFAULT_LOG_DIRECTIVES.to_string(),
            descriptor_pool_capacity: 256,
        }
    }
}

/// Which sample scene the binary runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    #[default]
    Cubemap,
    ComputeFilter,
    Geometry,
    Tessellation,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SampleConfig {
    pub kind: SampleKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CubemapConfig {
    /// Edge length in texels of each cube face.
    pub edge: u32,
    pub mode: CubemapMode,
}

impl Default for CubemapConfig {
    fn default() -> Self {
        Self {
            edge: 512,
            mode: CubemapMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeConfig {
    pub image_width: u32,
    pub image_height: u32,
    /// Square workgroup edge; must match the compute shaders' local size.
    pub workgroup_size: u32,
    pub filter: FilterKind,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            image_width: 1280,
            image_height: 720,
            workgroup_size: 16,
            filter: FilterKind::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeometryConfig {
    pub mode: DrawMode,
}

/// Hardware limit every Vulkan device with tessellation support meets.
pub const MAX_TESSELLATION_LEVEL: f32 = 64.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TessellationConfig {
    pub mode: TessellationMode,
    /// Subdivision level of patch edges closest to the camera.
    pub max_level: f32,
    /// World-space height of a fully white heightmap texel.
    pub height_scale: f32,
}

impl Default for TessellationConfig {
    fn default() -> Self {
        Self {
            mode: TessellationMode::default(),
            max_level: 32.0,
            height_scale: 12.0,
        }
    }
}

impl Config {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Resolve and load the active configuration.
    ///
    /// Search order: `explicit` (from `--config`), `$FRAMEKIT_CONFIG`,
    /// `./framekit.toml`. Falls back to defaults when none exist; a file that
    /// exists but fails to parse is an error.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }

        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.cubemap.edge == 0 {
            return Err(Error::Config("cubemap.edge must be non-zero".to_string()));
        }
        if self.compute.workgroup_size == 0 {
            return Err(Error::Config(
                "compute.workgroup_size must be non-zero".to_string(),
            ));
        }
        if self.compute.image_width == 0 || self.compute.image_height == 0 {
            return Err(Error::Config(
                "compute image size must be non-zero".to_string(),
            ));
        }
        let level = self.tessellation.max_level;
        if !(1.0..=MAX_TESSELLATION_LEVEL).contains(&level) {
            return Err(Error::Config(format!(
                "tessellation.max_level must be within 1..={MAX_TESSELLATION_LEVEL}, got {level}"
            )));
        }
        if !self.tessellation.height_scale.is_finite() || self.tessellation.height_scale < 0.0 {
            return Err(Error::Config(
                "tessellation.height_scale must be a non-negative number".to_string(),
            ));
        }
        if self.renderer.descriptor_pool_capacity == 0 {
            return Err(Error::Config(
                "renderer.descriptor_pool_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cubemap.edge, 512);
        assert_eq!(config.compute.workgroup_size, 16);
        assert_eq!(config.sample.kind, SampleKind::Cubemap);
    }

    #[test]
    fn test_partial_document_overrides_only_given_fields() {
        let config = Config::from_toml_str(
            r#"
            [sample]
            kind = "compute_filter"

            [compute]
            filter = "sobel"

            [cubemap]
            mode = "single_pass"
            "#,
        )
        .unwrap();

        assert_eq!(config.sample.kind, SampleKind::ComputeFilter);
        assert_eq!(config.compute.filter, FilterKind::Sobel);
        assert_eq!(config.compute.image_width, 1280);
        assert_eq!(config.cubemap.mode, CubemapMode::SinglePass);
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_toml_str("[window]\nwidht = 10\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_zero_workgroup_is_rejected() {
        let err = Config::from_toml_str("[compute]\nworkgroup_size = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_tessellation_section() {
        let config = Config::from_toml_str(
            r#"
            [sample]
            kind = "tessellation"

            [tessellation]
            mode = "solid"
            max_level = 8.0
            "#,
        )
        .unwrap();
        assert_eq!(config.sample.kind, SampleKind::Tessellation);
        assert_eq!(config.tessellation.mode, TessellationMode::Solid);
        assert_eq!(config.tessellation.max_level, 8.0);
        assert_eq!(config.tessellation.height_scale, 12.0);

        for bad in ["max_level = 0.5", "max_level = 65.0", "height_scale = -1.0"] {
            let err = Config::from_toml_str(&format!("[tessellation]\n{bad}\n")).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad}");
        }
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let err = Config::discover(Some(Path::new("/nonexistent/framekit.toml"))).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
