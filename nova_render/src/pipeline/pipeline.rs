/// Pipeline - immutable result of a pipeline builder
///
/// Owns the native pipeline, its layout and every set layout synthesized
/// from reflection. Caller-supplied set layouts are kept alive through
/// their `Arc` but never destroyed here.

use std::sync::Arc;
use crate::engine_error;
use crate::descriptor::DescriptorSetLayout;
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, NativePipeline, NativePipelineLayout, NativeDescriptorSetLayout,
    NativeCommandBuffer, NativeDescriptorSet, LayoutBinding, PushConstantRange, PipelineBindPoint,
    ShaderStageFlags,
};
use crate::pipeline::ShaderGroupKind;
use crate::pipeline::pipeline_builder::ResolvedLayout;

pub struct Pipeline {
    device: Arc<dyn GraphicsDevice>,
    bind_point: PipelineBindPoint,
    native: NativePipeline,
    layout: NativePipelineLayout,
    set_layouts: Vec<NativeDescriptorSetLayout>,
    owned_set_layouts: Vec<NativeDescriptorSetLayout>,
    _user_set_layouts: Vec<Arc<DescriptorSetLayout>>,
    set_bindings: Vec<Vec<LayoutBinding>>,
    push_constant_ranges: Vec<PushConstantRange>,
    shader_groups: Vec<ShaderGroupKind>,
    debug_name: String,
}

impl Pipeline {
    pub(crate) fn new(
        device: &Arc<dyn GraphicsDevice>,
        bind_point: PipelineBindPoint,
        native: NativePipeline,
        resolved: ResolvedLayout,
        debug_name: &str,
    ) -> Self {
        Self {
            device: Arc::clone(device),
            bind_point,
            native,
            layout: resolved.layout,
            set_layouts: resolved.set_layouts,
            owned_set_layouts: resolved.owned_set_layouts,
            _user_set_layouts: resolved.user_set_layouts,
            set_bindings: resolved.set_bindings,
            push_constant_ranges: resolved.push_constant_ranges,
            shader_groups: Vec::new(),
            debug_name: debug_name.to_string(),
        }
    }

    pub(crate) fn with_shader_groups(mut self, groups: Vec<ShaderGroupKind>) -> Self {
        self.shader_groups = groups;
        self
    }

    pub fn native(&self) -> NativePipeline {
        self.native
    }

    pub fn layout(&self) -> NativePipelineLayout {
        self.layout
    }

    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    /// Set layouts in set-index order
    pub fn set_layouts(&self) -> &[NativeDescriptorSetLayout] {
        &self.set_layouts
    }

    pub fn set_layout(&self, set: u32) -> Option<NativeDescriptorSetLayout> {
        self.set_layouts.get(set as usize).copied()
    }

    /// Merged bindings of set `set`, empty for unused sets
    pub fn set_bindings(&self, set: u32) -> &[LayoutBinding] {
        self.set_bindings.get(set as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Region of each ray-tracing group in group order, empty for other pipelines
    pub fn shader_groups(&self) -> &[ShaderGroupKind] {
        &self.shader_groups
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Record a bind of this pipeline
    pub fn bind(&self, command_buffer: NativeCommandBuffer) {
        self.device.cmd_bind_pipeline(command_buffer, self.bind_point, self.native);
    }

    /// Bind consecutive sets starting at `first_set` against this pipeline's layout
    pub fn bind_descriptor_sets(&self, command_buffer: NativeCommandBuffer, first_set: u32, sets: &[NativeDescriptorSet]) {
        self.device.cmd_bind_descriptor_sets(command_buffer, self.bind_point, self.layout, first_set, sets);
    }

    /// Record a push-constant update of `data` at `offset`
    ///
    /// The stage mask is every declared range overlapping the update, which
    /// must lie inside the union of those ranges.
    pub fn push_constants(&self, command_buffer: NativeCommandBuffer, offset: u32, data: &[u8]) -> Result<()> {
        let end = offset as u64 + data.len() as u64;
        let mut overlapping: Vec<&PushConstantRange> = self
            .push_constant_ranges
            .iter()
            .filter(|r| (r.offset as u64) < end && (offset as u64) < r.offset as u64 + r.size as u64)
            .collect();
        overlapping.sort_by_key(|r| r.offset);

        let mut stages = ShaderStageFlags::empty();
        let mut covered_to = offset as u64;
        for range in overlapping {
            stages |= range.stages;
            if (range.offset as u64) <= covered_to {
                covered_to = covered_to.max(range.offset as u64 + range.size as u64);
            }
        }

        if data.is_empty() || stages.is_empty() || covered_to < end {
            engine_error!(
                "nova::Pipeline",
                "Push constants {}..{} not covered by the ranges of '{}'",
                offset, end, self.debug_name
            );
            return Err(Error::InvalidOperation(format!(
                "push constants {}..{} outside the ranges of pipeline '{}'",
                offset, end, self.debug_name
            )));
        }

        self.device.cmd_push_constants(command_buffer, self.layout, stages, offset, data);
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("native", &self.native)
            .field("bind_point", &self.bind_point)
            .field("set_layouts", &self.set_layouts)
            .field("debug_name", &self.debug_name)
            .finish()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.native);
        self.device.destroy_pipeline_layout(self.layout);
        for layout in self.owned_set_layouts.drain(..) {
            self.device.destroy_descriptor_set_layout(layout);
        }
    }
}
