/// Builder for compute pipelines (a single COMPUTE module)

use std::sync::Arc;
use crate::engine_error;
use crate::descriptor::DescriptorSetLayout;
use crate::error::{Error, Result};
use crate::graphics_device::{GraphicsDevice, PipelineBindPoint, PushConstantRange, ShaderStageFlags};
use crate::pipeline::{Pipeline, PipelineBuilderBase, ComputePipelineDesc};
use crate::shader::ShaderModule;

#[derive(Clone, Default)]
pub struct ComputePipelineBuilder {
    base: PipelineBuilderBase,
}

impl ComputePipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shader(mut self, module: Arc<ShaderModule>) -> Self {
        self.base.add_shader(module);
        self
    }

    pub fn with_descriptor_set_layout(mut self, index: u32, layout: Arc<DescriptorSetLayout>) -> Self {
        self.base.set_layout(index, layout);
        self
    }

    pub fn with_push_constant_range(mut self, offset: u32, size: u32) -> Self {
        self.base.add_push_constant_range(PushConstantRange {
            offset,
            size,
            stages: ShaderStageFlags::COMPUTE,
        });
        self
    }

    pub fn build(&self, device: &Arc<dyn GraphicsDevice>, debug_name: &str) -> Result<Pipeline> {
        let single_compute = self.base.shaders.len() == 1 && self.base.stages() == ShaderStageFlags::COMPUTE;
        if !self.base.shaders.is_empty() && !single_compute {
            engine_error!(
                "nova::Pipeline",
                "Compute pipeline '{}' needs exactly one compute module, got {:?}",
                debug_name, self.base.stages()
            );
            return Err(Error::InvalidPipeline(format!(
                "compute pipeline '{}' needs exactly one compute module",
                debug_name
            )));
        }

        let resolved = self.base.resolve(device, debug_name)?;
        let mut stages = self.base.stage_descs();
        let desc = ComputePipelineDesc {
            layout: resolved.layout,
            stage: stages.remove(0),
            debug_name: debug_name.to_string(),
        };

        match device.create_compute_pipeline(&desc) {
            Ok(native) => Ok(Pipeline::new(device, PipelineBindPoint::Compute, native, resolved, debug_name)),
            Err(e) => {
                engine_error!("nova::Pipeline", "Failed to create compute pipeline '{}': {}", debug_name, e);
                resolved.destroy(&**device);
                Err(e)
            }
        }
    }
}
