/// Fluent builder for dynamic-rendering graphics pipelines
///
/// # Example
///
/// ```ignore
/// let pipeline = GraphicsPipelineBuilder::new()
///     .with_shader(vertex)
///     .with_shader(fragment)
///     .with_vertex_binding(0, 32, VertexInputRate::Vertex)
///     .with_vertex_attribute(0, 0, Format::R32G32B32_SFLOAT, 0)
///     .with_render_target(&scheduler.render_target_desc())
///     .build(&device, "forward")?;
/// ```

use std::sync::Arc;
use crate::engine_error;
use crate::descriptor::DescriptorSetLayout;
use crate::error::{Error, Result};
use crate::frame::RenderTargetDesc;
use crate::graphics_device::{Format, GraphicsDevice, PipelineBindPoint, PushConstantRange, ShaderStageFlags};
use crate::pipeline::{
    Pipeline, PipelineBuilderBase, GraphicsPipelineDesc, VertexBinding, VertexAttribute,
    VertexInputRate, PrimitiveTopology, RasterizationState, CullMode, DepthState, BlendState,
    ColorAttachmentState,
};
use crate::shader::ShaderModule;

#[derive(Clone)]
pub struct GraphicsPipelineBuilder {
    base: PipelineBuilderBase,
    vertex_bindings: Vec<VertexBinding>,
    vertex_attributes: Vec<VertexAttribute>,
    topology: PrimitiveTopology,
    rasterization: RasterizationState,
    depth: DepthState,
    color_attachments: Vec<ColorAttachmentState>,
    depth_format: Option<Format>,
    sample_count: u32,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self {
            base: PipelineBuilderBase::default(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState::default(),
            depth: DepthState::default(),
            color_attachments: Vec::new(),
            depth_format: None,
            sample_count: 1,
        }
    }
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shader(mut self, module: Arc<ShaderModule>) -> Self {
        self.base.add_shader(module);
        self
    }

    /// Use a caller layout for set `index`
    pub fn with_descriptor_set_layout(mut self, index: u32, layout: Arc<DescriptorSetLayout>) -> Self {
        self.base.set_layout(index, layout);
        self
    }

    /// Push-constant range not visible through reflection
    pub fn with_push_constant_range(mut self, offset: u32, size: u32, stages: ShaderStageFlags) -> Self {
        self.base.add_push_constant_range(PushConstantRange { offset, size, stages });
        self
    }

    pub fn with_vertex_binding(mut self, binding: u32, stride: u32, input_rate: VertexInputRate) -> Self {
        self.vertex_bindings.push(VertexBinding { binding, stride, input_rate });
        self
    }

    pub fn with_vertex_attribute(mut self, location: u32, binding: u32, format: Format, offset: u32) -> Self {
        self.vertex_attributes.push(VertexAttribute { location, binding, format, offset });
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_rasterization(mut self, state: RasterizationState) -> Self {
        self.rasterization = state;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.rasterization.cull_mode = cull_mode;
        self
    }

    pub fn with_depth_state(mut self, state: DepthState) -> Self {
        self.depth = state;
        self
    }

    /// Disable depth testing and writing
    pub fn without_depth(mut self) -> Self {
        self.depth.test_enable = false;
        self.depth.write_enable = false;
        self.depth_format = None;
        self
    }

    pub fn with_color_attachment(mut self, format: Format, blend: BlendState) -> Self {
        self.color_attachments.push(ColorAttachmentState { format, blend });
        self
    }

    pub fn with_depth_format(mut self, format: Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Take attachment formats from the frame targets
    ///
    /// Replaces the format of color attachment 0 (adding it when none was
    /// declared) and sets the depth format when depth testing is enabled.
    pub fn with_render_target(mut self, target: &RenderTargetDesc) -> Self {
        match self.color_attachments.first_mut() {
            Some(first) => first.format = target.color_format,
            None => self.color_attachments.push(ColorAttachmentState {
                format: target.color_format,
                blend: BlendState::opaque(),
            }),
        }
        if self.depth.test_enable || self.depth.write_enable {
            self.depth_format = target.depth_format;
        }
        self
    }

    pub fn with_sample_count(mut self, samples: u32) -> Self {
        self.sample_count = samples;
        self
    }

    fn validate(&self, debug_name: &str) -> Result<()> {
        let stages = self.base.stages();
        let fail = |message: String| {
            engine_error!("nova::Pipeline", "Graphics pipeline '{}': {}", debug_name, message);
            Err(Error::InvalidPipeline(message))
        };

        if !stages.is_empty() && !stages.intersects(ShaderStageFlags::VERTEX | ShaderStageFlags::MESH) {
            return fail("no vertex or mesh stage".to_string());
        }
        let non_graphics = ShaderStageFlags::ALL_GRAPHICS | ShaderStageFlags::TASK | ShaderStageFlags::MESH;
        if !non_graphics.contains(stages) {
            return fail(format!("non-graphics stages {:?}", stages.difference(non_graphics)));
        }
        let distinct = self.base.shaders.iter().map(|m| m.stage()).fold(ShaderStageFlags::empty(), |a, s| a | s);
        if distinct.bits().count_ones() as usize != self.base.shaders.len() {
            return fail("two modules share a stage".to_string());
        }
        if !self.sample_count.is_power_of_two() || self.sample_count > 64 {
            return fail(format!("invalid sample count {}", self.sample_count));
        }
        if let Some(format) = self.depth_format {
            if !format.is_depth() {
                return fail(format!("{:?} is not a depth format", format));
            }
        }
        for attribute in &self.vertex_attributes {
            if !self.vertex_bindings.iter().any(|b| b.binding == attribute.binding) {
                return fail(format!(
                    "attribute {} reads undeclared binding {}",
                    attribute.location, attribute.binding
                ));
            }
        }
        Ok(())
    }

    /// Resolve layouts and create the pipeline
    pub fn build(&self, device: &Arc<dyn GraphicsDevice>, debug_name: &str) -> Result<Pipeline> {
        self.validate(debug_name)?;
        let resolved = self.base.resolve(device, debug_name)?;

        let desc = GraphicsPipelineDesc {
            layout: resolved.layout,
            stages: self.base.stage_descs(),
            vertex_bindings: self.vertex_bindings.clone(),
            vertex_attributes: self.vertex_attributes.clone(),
            topology: self.topology,
            rasterization: self.rasterization,
            depth: self.depth,
            color_attachments: self.color_attachments.clone(),
            depth_format: self.depth_format,
            sample_count: self.sample_count,
            debug_name: debug_name.to_string(),
        };

        match device.create_graphics_pipeline(&desc) {
            Ok(native) => Ok(Pipeline::new(device, PipelineBindPoint::Graphics, native, resolved, debug_name)),
            Err(e) => {
                engine_error!("nova::Pipeline", "Failed to create graphics pipeline '{}': {}", debug_name, e);
                resolved.destroy(&**device);
                Err(e)
            }
        }
    }
}
