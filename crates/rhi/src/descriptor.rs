//! Descriptor set management for shader resource binding.
//!
//! - [`DescriptorSetLayout`] defines the bindings a shader expects
//! - [`DescriptorPool`] hands out descriptor sets
//! - [`write_descriptor_set`] points a set's bindings at buffers and images
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use framekit_rhi::device::Device;
//! use framekit_rhi::descriptor::{
//!     DescriptorBindingBuilder, DescriptorPool, DescriptorResource, DescriptorSetLayout,
//!     write_descriptor_set,
//! };
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> Result<(), framekit_rhi::RhiError> {
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::ALL)],
//! )?;
//! let pool = DescriptorPool::with_capacity(device.clone(), 16)?;
//! let set = pool.allocate(&[layout.handle()])?[0];
//! write_descriptor_set(&device, set, &[(0, DescriptorResource::UniformBuffer(ubo))]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// Sets are never freed individually; they go away with the pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool with explicit per-type sizes.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Creates a pool of `capacity` sets with room for `capacity` descriptors
    /// of every type the renderer binds.
    pub fn with_capacity(device: Arc<Device>, capacity: u32) -> RhiResult<Self> {
        let pool_sizes = pool_sizes_for(capacity);
        Self::new(device, capacity, &pool_sizes)
    }

    /// Allocates one set per entry in `layouts`.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

fn pool_sizes_for(capacity: u32) -> [vk::DescriptorPoolSize; 3] {
    [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::DescriptorType::STORAGE_IMAGE,
    ]
    .map(|ty| {
        vk::DescriptorPoolSize::default()
            .ty(ty)
            .descriptor_count(capacity)
    })
}

/// A resource bound to one descriptor binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorResource {
    /// Whole uniform buffer.
    UniformBuffer(vk::Buffer),
    /// Sampled image, expected in `SHADER_READ_ONLY_OPTIMAL` when read.
    CombinedImageSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
    /// Storage image, expected in `GENERAL` when accessed.
    StorageImage(vk::ImageView),
}

impl DescriptorResource {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorResource::UniformBuffer(_) => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorResource::CombinedImageSampler { .. } => {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            }
            DescriptorResource::StorageImage(_) => vk::DescriptorType::STORAGE_IMAGE,
        }
    }
}

/// Writes `(binding, resource)` pairs into `set`.
pub fn write_descriptor_set(
    device: &Device,
    set: vk::DescriptorSet,
    bindings: &[(u32, DescriptorResource)],
) {
    let buffer_infos: Vec<vk::DescriptorBufferInfo> = bindings
        .iter()
        .map(|(_, resource)| match *resource {
            DescriptorResource::UniformBuffer(buffer) => buffer_info(buffer, 0, vk::WHOLE_SIZE),
            _ => vk::DescriptorBufferInfo::default(),
        })
        .collect();

    let image_infos: Vec<vk::DescriptorImageInfo> = bindings
        .iter()
        .map(|(_, resource)| match *resource {
            DescriptorResource::CombinedImageSampler { view, sampler } => {
                image_info(sampler, view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            }
            DescriptorResource::StorageImage(view) => {
                image_info(vk::Sampler::null(), view, vk::ImageLayout::GENERAL)
            }
            DescriptorResource::UniformBuffer(_) => vk::DescriptorImageInfo::default(),
        })
        .collect();

    let writes: Vec<vk::WriteDescriptorSet> = bindings
        .iter()
        .enumerate()
        .map(|(i, (binding, resource))| {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(resource.descriptor_type());
            match resource {
                DescriptorResource::UniformBuffer(_) => {
                    write.buffer_info(std::slice::from_ref(&buffer_infos[i]))
                }
                _ => write.image_info(std::slice::from_ref(&image_infos[i])),
            }
        })
        .collect();

    update_descriptor_sets(device, &writes);
}

/// Applies raw descriptor writes.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

/// Creates a buffer info for descriptor set updates.
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Creates an image info for descriptor set updates.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Shorthands for descriptor set layout bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    #[inline]
    pub fn storage_image(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::STORAGE_IMAGE, stage_flags)
    }

    fn single(
        binding: u32,
        ty: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_binding_builder_uniform_buffer() {
        let binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::ALL);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::ALL);
    }

    #[test]
    fn test_descriptor_binding_builder_storage_image() {
        let binding = DescriptorBindingBuilder::storage_image(1, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn test_pool_sizes_cover_every_bound_type() {
        let sizes = pool_sizes_for(256);
        let types: Vec<_> = sizes.iter().map(|s| s.ty).collect();
        for resource in [
            DescriptorResource::UniformBuffer(vk::Buffer::null()),
            DescriptorResource::CombinedImageSampler {
                view: vk::ImageView::null(),
                sampler: vk::Sampler::null(),
            },
            DescriptorResource::StorageImage(vk::ImageView::null()),
        ] {
            assert!(types.contains(&resource.descriptor_type()));
        }
        assert!(sizes.iter().all(|s| s.descriptor_count == 256));
    }

    #[test]
    fn test_image_info_helper() {
        let info = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(info.sampler, vk::Sampler::null());
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
