//! Shader module loading.
//!
//! Shaders are looked up by logical name in a directory of compiled SPIR-V:
//! [`ShaderLibrary::load`] with `"cubemap_flat.vert"` reads
//! `<dir>/cubemap_flat.vert.spv`. Modules are meant to be short-lived: build
//! the pipelines, then drop the [`Shader`]s.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framekit_rhi::device::Device;
//! use framekit_rhi::shader::{ShaderLibrary, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), framekit_rhi::RhiError> {
//! let library = ShaderLibrary::new(device, "shaders/spirv");
//! let vertex = library.load("flat.vert", ShaderStage::Vertex)?;
//! let fragment = library.load("flat.frag", ShaderStage::Fragment)?;
//! let _stages = [vertex.stage_create_info(), fragment.stage_create_info()];
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point used by every shader in the library.
const ENTRY_POINT: &CStr = c"main";

/// Programmable pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEvaluation => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decodes a SPIR-V binary into words, checking size and magic number.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("invalid SPIR-V: {e}")))
}

/// A `VkShaderModule` tagged with its stage.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Creates a module from SPIR-V bytes.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!("Created {} shader module ({} words)", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    /// Reads a SPIR-V file and creates a module from it.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for pipeline creation; borrows the module.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// Loads shaders by logical name from a SPIR-V directory.
#[derive(Clone)]
pub struct ShaderLibrary {
    device: Arc<Device>,
    dir: PathBuf,
}

impl ShaderLibrary {
    pub fn new(device: Arc<Device>, dir: impl Into<PathBuf>) -> Self {
        Self {
            device,
            dir: dir.into(),
        }
    }

    /// Path a logical name resolves to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.spv"))
    }

    pub fn load(&self, name: &str, stage: ShaderStage) -> RhiResult<Shader> {
        let path = self.path_for(name);
        debug!("Loading {} shader '{}' from {}", stage, name, path.display());
        Shader::from_spirv_file(self.device.clone(), &path, stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(ShaderStage::Geometry.to_vk_stage(), vk::ShaderStageFlags::GEOMETRY);
        assert_eq!(
            ShaderStage::TessControl.to_vk_stage(),
            vk::ShaderStageFlags::TESSELLATION_CONTROL
        );
        assert_eq!(ShaderStage::Compute.to_vk_stage(), vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(ShaderStage::TessEvaluation.to_string(), "tessellation evaluation");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_decode_spirv_checks_magic_and_length() {
        let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let words = decode_spirv(&bytes).expect("valid header");
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words.len(), 5);

        assert!(decode_spirv(&bytes[..6]).is_err());
        assert!(decode_spirv(&[0u8; 8]).is_err());
    }
}
