//! Keyed registries for long-lived GPU objects.
//!
//! Render passes, descriptor-set layouts and pipeline layouts are created once
//! during setup and shared by every pass and pipeline that needs them. Each
//! kind lives in its own [`Registry`], keyed by a closed enum so a misspelled
//! key is a compile error rather than a runtime miss.
//!
//! Registering an existing key replaces (and drops) the previous entry. A
//! lookup miss is a setup bug and surfaces as [`RendererError::RegistryMiss`].
//!
//! # Example
//!
//! ```
//! use framekit_renderer::registry::{Registry, RenderPassKey};
//!
//! let mut passes: Registry<RenderPassKey, u64> = Registry::new("render pass");
//! passes.register(RenderPassKey::Default, 7);
//! assert_eq!(passes.require(RenderPassKey::Default).ok(), Some(&7));
//! assert!(passes.require(RenderPassKey::Cubemap).is_err());
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use framekit_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout};
use framekit_rhi::device::Device;
use framekit_rhi::pipeline::PipelineLayout;
use framekit_rhi::render_pass::RenderPass;

use crate::error::{RendererError, RendererResult};

/// Keys of the shared render passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderPassKey {
    /// Swapchain color plus depth, left in `PRESENT_SRC_KHR`.
    Default,
    /// Offscreen cube face color plus depth, left in `COLOR_ATTACHMENT_OPTIMAL`.
    Cubemap,
}

/// Keys of the shared layouts. A descriptor-set layout and the pipeline layout
/// built from it are registered under the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutKey {
    /// Uniform buffer at 0, combined image sampler at 1.
    U1T1,
    /// Uniform buffer at 0, combined image samplers at 1 and 2.
    U1T2,
    /// Uniform buffers at 0 and 1.
    U2,
    /// Uniform buffer at 0.
    U1,
    /// Storage images at 0 (source) and 1 (destination), compute only.
    ComputeFilter,
}

impl LayoutKey {
    pub const ALL: [LayoutKey; 5] = [
        LayoutKey::U1T1,
        LayoutKey::U1T2,
        LayoutKey::U2,
        LayoutKey::U1,
        LayoutKey::ComputeFilter,
    ];

    /// Descriptor-set layout bindings for this key.
    pub fn bindings(self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        let all = vk::ShaderStageFlags::ALL;
        match self {
            LayoutKey::U1T1 => vec![
                DescriptorBindingBuilder::uniform_buffer(0, all),
                DescriptorBindingBuilder::combined_image_sampler(1, all),
            ],
            LayoutKey::U1T2 => vec![
                DescriptorBindingBuilder::uniform_buffer(0, all),
                DescriptorBindingBuilder::combined_image_sampler(1, all),
                DescriptorBindingBuilder::combined_image_sampler(2, all),
            ],
            LayoutKey::U2 => vec![
                DescriptorBindingBuilder::uniform_buffer(0, all),
                DescriptorBindingBuilder::uniform_buffer(1, all),
            ],
            LayoutKey::U1 => vec![DescriptorBindingBuilder::uniform_buffer(0, all)],
            LayoutKey::ComputeFilter => vec![
                DescriptorBindingBuilder::storage_image(0, vk::ShaderStageFlags::COMPUTE),
                DescriptorBindingBuilder::storage_image(1, vk::ShaderStageFlags::COMPUTE),
            ],
        }
    }
}

/// Map from an enumerated key to an owned object.
pub struct Registry<K, T> {
    kind: &'static str,
    entries: HashMap<K, T>,
}

impl<K: Copy + Eq + Hash + Debug, T> Registry<K, T> {
    /// Creates an empty registry; `kind` names the stored objects in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Stores `value` under `key`, returning the entry it replaced.
    pub fn register(&mut self, key: K, value: T) -> Option<T> {
        let previous = self.entries.insert(key, value);
        debug!(
            "Registered {} {:?}{}",
            self.kind,
            key,
            if previous.is_some() { " (replaced)" } else { "" }
        );
        previous
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.entries.get(&key)
    }

    /// Like [`get`](Self::get), but a miss is an error.
    pub fn require(&self, key: K) -> RendererResult<&T> {
        self.entries
            .get(&key)
            .ok_or_else(|| RendererError::RegistryMiss {
                kind: self.kind,
                key: format!("{key:?}"),
            })
    }

    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The three registries shared across pass construction.
pub struct Registries {
    pub render_passes: Registry<RenderPassKey, RenderPass>,
    pub set_layouts: Registry<LayoutKey, DescriptorSetLayout>,
    pub pipeline_layouts: Registry<LayoutKey, PipelineLayout>,
}

impl Registries {
    pub fn new() -> Self {
        Self {
            render_passes: Registry::new("render pass"),
            set_layouts: Registry::new("descriptor set layout"),
            pipeline_layouts: Registry::new("pipeline layout"),
        }
    }

    /// Creates the descriptor-set layout for `key` and a pipeline layout with
    /// that single set, registering both under `key`.
    pub fn register_layout(&mut self, device: &Arc<Device>, key: LayoutKey) -> RendererResult<()> {
        let set_layout = DescriptorSetLayout::new(device.clone(), &key.bindings())?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;

        // Pipeline layout first so a replaced set layout outlives its user.
        self.pipeline_layouts.register(key, pipeline_layout);
        self.set_layouts.register(key, set_layout);
        Ok(())
    }

    /// Registers every [`LayoutKey`].
    pub fn register_all_layouts(&mut self, device: &Arc<Device>) -> RendererResult<()> {
        for key in LayoutKey::ALL {
            self.register_layout(device, key)?;
        }
        Ok(())
    }

    pub fn render_pass(&self, key: RenderPassKey) -> RendererResult<vk::RenderPass> {
        Ok(self.render_passes.require(key)?.handle())
    }

    pub fn set_layout(&self, key: LayoutKey) -> RendererResult<vk::DescriptorSetLayout> {
        Ok(self.set_layouts.require(key)?.handle())
    }

    pub fn pipeline_layout(&self, key: LayoutKey) -> RendererResult<vk::PipelineLayout> {
        Ok(self.pipeline_layouts.require(key)?.handle())
    }

    /// Drops pipeline layouts, then set layouts, then render passes.
    pub fn clear(&mut self) {
        self.pipeline_layouts.clear();
        self.set_layouts.clear();
        self.render_passes.clear();
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Registries {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_register_is_idempotent() {
        let mut registry: Registry<LayoutKey, u32> = Registry::new("layout");
        registry.register(LayoutKey::U2, 42);

        for _ in 0..5 {
            assert_eq!(registry.get(LayoutKey::U2), Some(&42));
            assert_eq!(registry.require(LayoutKey::U2).ok(), Some(&42));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_overwrites_last_write_wins() {
        let mut registry: Registry<RenderPassKey, &str> = Registry::new("render pass");
        assert_eq!(registry.register(RenderPassKey::Default, "before resize"), None);
        assert_eq!(
            registry.register(RenderPassKey::Default, "after resize"),
            Some("before resize")
        );
        assert_eq!(registry.get(RenderPassKey::Default), Some(&"after resize"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_miss_is_an_error_naming_kind_and_key() {
        let registry: Registry<LayoutKey, u32> = Registry::new("pipeline layout");
        assert!(registry.get(LayoutKey::U1).is_none());

        let err = registry.require(LayoutKey::ComputeFilter).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no pipeline layout registered under ComputeFilter"
        );
    }

    #[test]
    fn test_layout_bindings() {
        let u1t1 = LayoutKey::U1T1.bindings();
        assert_eq!(u1t1.len(), 2);
        assert_eq!(u1t1[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(
            u1t1[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );

        let filter = LayoutKey::ComputeFilter.bindings();
        assert!(filter.iter().all(|b| {
            b.descriptor_type == vk::DescriptorType::STORAGE_IMAGE
                && b.stage_flags == vk::ShaderStageFlags::COMPUTE
        }));
        assert_eq!(filter.iter().map(|b| b.binding).collect::<Vec<_>>(), [0, 1]);

        let u1t2 = LayoutKey::U1T2.bindings();
        assert_eq!(u1t2.iter().map(|b| b.binding).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(
            u1t2[2].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );

        assert_eq!(LayoutKey::U1.bindings().len(), 1);
        assert_eq!(LayoutKey::U2.bindings().len(), 2);
    }
}
