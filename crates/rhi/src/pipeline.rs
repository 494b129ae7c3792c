//! Graphics and compute pipeline management.
//!
//! - [`PipelineLayout`] wraps `VkPipelineLayout`
//! - [`Pipeline`] wraps a graphics or compute `VkPipeline`
//! - [`GraphicsPipelineBuilder`] builds graphics pipelines against a render
//!   pass, with optional tessellation and geometry stages
//!
//! Viewport and scissor are always dynamic state, so one pipeline serves
//! every target size and survives window resizes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framekit_rhi::device::Device;
//! use framekit_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use framekit_rhi::shader::{ShaderLibrary, ShaderStage};
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass, layout: &PipelineLayout)
//! # -> Result<(), framekit_rhi::RhiError> {
//! let shaders = ShaderLibrary::new(device.clone(), "shaders/spirv");
//! let vert = shaders.load("flat.vert", ShaderStage::Vertex)?;
//! let geom = shaders.load("flat.geom", ShaderStage::Geometry)?;
//! let frag = shaders.load("flat.frag", ShaderStage::Fragment)?;
//!
//! let pipeline = GraphicsPipelineBuilder::new(render_pass)
//!     .stage(&vert)
//!     .stage(&geom)
//!     .stage(&frag)
//!     .build(device, layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};

/// Pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Graphics or compute pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Creates a compute pipeline from a single compute stage.
    pub fn compute(device: Arc<Device>, shader: &Shader, layout: &PipelineLayout) -> RhiResult<Self> {
        if shader.stage() != ShaderStage::Compute {
            return Err(RhiError::PipelineError(format!(
                "compute pipeline given a {} shader",
                shader.stage()
            )));
        }

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader.stage_create_info())
            .layout(layout.handle());

        let pipeline = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        debug!("Compute pipeline created");

        Ok(Self {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!(
            "{} pipeline destroyed",
            if self.bind_point == vk::PipelineBindPoint::GRAPHICS {
                "Graphics"
            } else {
                "Compute"
            }
        );
    }
}

/// Primitive topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    LineList,
    /// Patches for the tessellation stages.
    PatchList,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
        }
    }
}

/// Checks that a set of stages forms a valid graphics pipeline.
///
/// Vertex and fragment are required, tessellation stages come as a pair and
/// require patch topology, and no stage may appear twice.
pub fn validate_graphics_stages(
    stages: &[ShaderStage],
    topology: PrimitiveTopology,
) -> RhiResult<()> {
    for (i, stage) in stages.iter().enumerate() {
        if *stage == ShaderStage::Compute {
            return Err(RhiError::PipelineError(
                "compute stage in a graphics pipeline".to_string(),
            ));
        }
        if stages[..i].contains(stage) {
            return Err(RhiError::PipelineError(format!("duplicate {stage} stage")));
        }
    }

    for required in [ShaderStage::Vertex, ShaderStage::Fragment] {
        if !stages.contains(&required) {
            return Err(RhiError::PipelineError(format!("{required} shader is required")));
        }
    }

    let control = stages.contains(&ShaderStage::TessControl);
    let evaluation = stages.contains(&ShaderStage::TessEvaluation);
    if control != evaluation {
        return Err(RhiError::PipelineError(
            "tessellation control and evaluation stages come together".to_string(),
        ));
    }
    if control != (topology == PrimitiveTopology::PatchList) {
        return Err(RhiError::PipelineError(
            "patch topology is used if and only if tessellation is enabled".to_string(),
        ));
    }

    Ok(())
}

/// Builder for graphics pipelines targeting subpass 0 of a render pass.
pub struct GraphicsPipelineBuilder<'a> {
    render_pass: vk::RenderPass,
    stages: Vec<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: PrimitiveTopology,
    patch_control_points: u32,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_test: bool,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(render_pass: vk::RenderPass) -> Self {
        Self {
            render_pass,
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            patch_control_points: 0,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
        }
    }

    /// Adds a shader stage; the stage type comes from the shader.
    pub fn stage(mut self, shader: &'a Shader) -> Self {
        self.stages.push(shader);
        self
    }

    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Switches to patch topology with `points` control points per patch.
    pub fn patches(mut self, points: u32) -> Self {
        self.topology = PrimitiveTopology::PatchList;
        self.patch_control_points = points;
        self
    }

    /// `LINE` needs the `fill_mode_non_solid` device feature.
    pub fn polygon_mode(mut self, polygon_mode: vk::PolygonMode) -> Self {
        self.polygon_mode = polygon_mode;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn depth_test(mut self, enable: bool) -> Self {
        self.depth_test = enable;
        self
    }

    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let kinds: Vec<ShaderStage> = self.stages.iter().map(|s| s.stage()).collect();
        validate_graphics_stages(&kinds, self.topology)?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> =
            self.stages.iter().map(|s| s.stage_create_info()).collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        let tessellation_state = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(self.patch_control_points);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_test)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .max_depth_bounds(1.0);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(0);
        if self.topology == PrimitiveTopology::PatchList {
            pipeline_info = pipeline_info.tessellation_state(&tessellation_state);
        }

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        debug!("Graphics pipeline created with stages {:?}", kinds);

        Ok(Pipeline {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShaderStage::*;

    #[test]
    fn test_minimal_stages_accepted() {
        assert!(validate_graphics_stages(&[Vertex, Fragment], PrimitiveTopology::TriangleList).is_ok());
        assert!(
            validate_graphics_stages(&[Vertex, Geometry, Fragment], PrimitiveTopology::TriangleList)
                .is_ok()
        );
    }

    #[test]
    fn test_missing_fragment_rejected() {
        assert!(validate_graphics_stages(&[Vertex], PrimitiveTopology::TriangleList).is_err());
    }

    #[test]
    fn test_tessellation_needs_both_stages_and_patches() {
        let tess = [Vertex, TessControl, TessEvaluation, Fragment];
        assert!(validate_graphics_stages(&tess, PrimitiveTopology::PatchList).is_ok());
        assert!(validate_graphics_stages(&tess, PrimitiveTopology::TriangleList).is_err());
        assert!(
            validate_graphics_stages(&[Vertex, TessControl, Fragment], PrimitiveTopology::PatchList)
                .is_err()
        );
        assert!(validate_graphics_stages(&[Vertex, Fragment], PrimitiveTopology::PatchList).is_err());
    }

    #[test]
    fn test_duplicate_and_compute_rejected() {
        assert!(
            validate_graphics_stages(&[Vertex, Vertex, Fragment], PrimitiveTopology::TriangleList)
                .is_err()
        );
        assert!(
            validate_graphics_stages(&[Vertex, Compute, Fragment], PrimitiveTopology::TriangleList)
                .is_err()
        );
    }

    #[test]
    fn test_topology_to_vk() {
        assert_eq!(
            PrimitiveTopology::PatchList.to_vk(),
            vk::PrimitiveTopology::PATCH_LIST
        );
        assert_eq!(
            PrimitiveTopology::default().to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
    }
}
