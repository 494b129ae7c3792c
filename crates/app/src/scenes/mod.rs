//! Sample scenes.
//!
//! Each scene builds every pipeline and pass sequence of every mode at
//! setup, then records the active mode's sequence each frame.

pub mod compute_filter;
pub mod cubemap;
pub mod geometry;
pub mod ground;

use std::marker::PhantomData;

use ash::vk;
use bytemuck::Pod;

use framekit_renderer::RendererResult;
use framekit_renderer::factory::{ResourceFactory, SimpleModel};
use framekit_renderer::pass::{Binding, DrawGeometry};
use framekit_rhi::buffer::Buffer;
use framekit_rhi::descriptor::{DescriptorResource, write_descriptor_set};

use crate::mesh::MeshData;

pub use compute_filter::ComputeFilterScene;
pub use cubemap::CubemapScene;
pub use geometry::GeometryScene;
pub use ground::TessellatedGroundScene;

/// Clear color of every main pass.
pub const MAIN_CLEAR_COLOR: [f32; 4] = [0.85, 0.5, 0.5, 0.0];

/// One uniform buffer of `T` and one descriptor set per frame slot.
///
/// Slot `i` only ever writes buffer `i`, after the slot's fence has
/// signaled, so writes never race the device.
pub struct SlotUniforms<T: Pod> {
    buffers: Vec<Buffer>,
    sets: Vec<vk::DescriptorSet>,
    _marker: PhantomData<T>,
}

impl<T: Pod> SlotUniforms<T> {
    /// Binds each slot's buffer at binding 0 of a set with `layout`, plus
    /// whatever `extra` returns for that slot.
    pub fn new(
        factory: &ResourceFactory,
        layout: vk::DescriptorSetLayout,
        slots: usize,
        extra: impl Fn(usize) -> Vec<(u32, DescriptorResource)>,
    ) -> RendererResult<Self> {
        let buffers = factory.create_uniform_buffers(std::mem::size_of::<T>() as vk::DeviceSize, slots)?;
        let mut uniforms = Self {
            buffers,
            sets: Vec::new(),
            _marker: PhantomData,
        };
        uniforms.sets = uniforms.extra_sets(factory, layout, extra)?;
        Ok(uniforms)
    }

    /// Allocates another set per slot over the same buffers, with different
    /// extra bindings.
    pub fn extra_sets(
        &self,
        factory: &ResourceFactory,
        layout: vk::DescriptorSetLayout,
        extra: impl Fn(usize) -> Vec<(u32, DescriptorResource)>,
    ) -> RendererResult<Vec<vk::DescriptorSet>> {
        let sets = factory.allocate_descriptor_sets(layout, self.buffers.len())?;
        for (slot, (&set, buffer)) in sets.iter().zip(&self.buffers).enumerate() {
            let mut bindings = vec![(0, DescriptorResource::UniformBuffer(buffer.handle()))];
            bindings.extend(extra(slot));
            write_descriptor_set(factory.device(), set, &bindings);
        }
        Ok(sets)
    }

    /// Writes slot `slot`'s copy. Out-of-range slots are ignored.
    pub fn write(&self, slot: usize, value: &T) -> RendererResult<()> {
        if let Some(buffer) = self.buffers.get(slot) {
            buffer.write_pod(value)?;
        }
        Ok(())
    }

    pub fn binding(&self) -> Binding<vk::DescriptorSet> {
        Binding::PerSlot(self.sets.clone())
    }
}

/// Extra bindings for sets that only hold the slot's uniform buffer.
pub fn no_bindings(_slot: usize) -> Vec<(u32, DescriptorResource)> {
    Vec::new()
}

/// Uploads `mesh` into device-local buffers.
pub fn upload_mesh(factory: &ResourceFactory, mesh: &MeshData) -> RendererResult<SimpleModel> {
    factory.create_simple_model(&mesh.vertices, &mesh.indices)
}

pub fn indexed(model: &SimpleModel) -> DrawGeometry {
    DrawGeometry::Indexed {
        vertex_buffer: model.vertex_buffer.handle(),
        index_buffer: model.index_buffer.handle(),
        index_count: model.index_count,
    }
}

/// Aspect ratio of `extent`, 1 when degenerate.
pub fn aspect(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        return 1.0;
    }
    extent.width as f32 / extent.height as f32
}
