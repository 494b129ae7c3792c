//! Records pass sequences into a frame's command buffer.
//!
//! The executor walks a [`PassSequence`] in order and records exactly what it
//! says. Transition steps go through [`RenderTargets`], so the barrier's old
//! layout is always the tracked state and its span is always the tracked
//! span (all six layers for a cube image). Barrier masks come from
//! [`ResourceState`] and are not validated here.

use ash::vk;
use tracing::trace;

use framekit_rhi::barrier::{ResourceState, record_transitions};
use framekit_rhi::encoder::{CommandEncoder, RenderPassBegin};

use crate::error::{RendererError, RendererResult};
use crate::overlay::OverlayRecorder;
use crate::pass::{
    ComputePass, DrawCall, DrawGeometry, FramebufferTarget, PassSequence, PassStep, RasterPass,
};
use crate::sequencer::FrameContext;
use crate::target::{RenderTargets, TargetId};

/// Stateless pass recorder.
pub struct PassExecutor;

impl PassExecutor {
    /// Records every step of `sequence` for `frame`.
    ///
    /// The encoder must be recording and outside any render pass. Target
    /// transitions stay provisional until [`RenderTargets::finish_frame`].
    pub fn record<E: CommandEncoder>(
        encoder: &E,
        frame: &FrameContext,
        sequence: &PassSequence,
        targets: &mut RenderTargets,
        overlay: &mut dyn OverlayRecorder,
    ) -> RendererResult<()> {
        trace!(
            "Recording '{}' ({} steps) into slot {}",
            sequence.label,
            sequence.len(),
            frame.slot
        );

        targets.begin_frame();
        for step in &sequence.steps {
            match step {
                PassStep::Raster(pass) => Self::record_raster(encoder, frame, pass, overlay)?,
                PassStep::Compute(pass) => Self::record_compute(encoder, frame, pass)?,
                PassStep::Transition { targets: ids, state } => {
                    Self::record_transition(encoder, targets, ids, *state)?
                }
            }
        }
        Ok(())
    }

    fn record_raster<E: CommandEncoder>(
        encoder: &E,
        frame: &FrameContext,
        pass: &RasterPass,
        overlay: &mut dyn OverlayRecorder,
    ) -> RendererResult<()> {
        let (framebuffer, extent) = match pass.target {
            FramebufferTarget::Swapchain => (frame.framebuffer, frame.extent),
            FramebufferTarget::Offscreen {
                framebuffer,
                extent,
            } => (framebuffer, extent),
        };
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };

        encoder.begin_render_pass(&RenderPassBegin {
            render_pass: pass.render_pass,
            framebuffer,
            render_area,
            clear_values: &pass.clear_values,
        });
        encoder.set_viewport(&pass.viewport.viewport(extent));
        encoder.set_scissor(&render_area);

        for draw in &pass.draws {
            Self::record_draw(encoder, frame.slot, pass.label, draw)?;
        }

        if pass.overlay {
            overlay.record(encoder, frame)?;
        }

        encoder.end_render_pass();
        Ok(())
    }

    fn record_draw<E: CommandEncoder>(
        encoder: &E,
        slot: usize,
        label: &'static str,
        draw: &DrawCall,
    ) -> RendererResult<()> {
        let set = draw
            .descriptor_set
            .for_slot(slot)
            .ok_or(RendererError::MissingSlotBinding { pass: label, slot })?;

        encoder.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
        encoder.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, draw.layout, 0, &[set]);

        match draw.geometry {
            DrawGeometry::Indexed {
                vertex_buffer,
                index_buffer,
                index_count,
            } => {
                encoder.bind_vertex_buffers(0, &[vertex_buffer], &[0]);
                encoder.bind_index_buffer(index_buffer, 0, vk::IndexType::UINT32);
                encoder.draw_indexed(index_count, draw.instance_count, 0, 0, 0);
            }
            DrawGeometry::Procedural { vertex_count } => {
                encoder.draw(vertex_count, draw.instance_count, 0, 0);
            }
        }
        Ok(())
    }

    fn record_compute<E: CommandEncoder>(
        encoder: &E,
        frame: &FrameContext,
        pass: &ComputePass,
    ) -> RendererResult<()> {
        let set = pass
            .descriptor_set
            .for_slot(frame.slot)
            .ok_or(RendererError::MissingSlotBinding {
                pass: pass.label,
                slot: frame.slot,
            })?;
        let (groups_x, groups_y) = pass.dispatch_groups();

        encoder.bind_pipeline(vk::PipelineBindPoint::COMPUTE, pass.pipeline);
        encoder.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, pass.layout, 0, &[set]);
        encoder.dispatch(groups_x, groups_y, 1);
        Ok(())
    }

    fn record_transition<E: CommandEncoder>(
        encoder: &E,
        targets: &mut RenderTargets,
        ids: &[TargetId],
        state: ResourceState,
    ) -> RendererResult<()> {
        let mut transitions = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(transition) = targets.transition(id, state)? {
                transitions.push(transition);
            }
        }
        record_transitions(encoder, &transitions);
        Ok(())
    }
}
