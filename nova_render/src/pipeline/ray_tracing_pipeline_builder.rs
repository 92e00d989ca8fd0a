/// Builder for ray-tracing pipelines
///
/// Each `with_*` call adds the module to the stage list (once) and appends
/// one shader group referencing it. Groups keep their insertion order, which
/// is the order of the shader binding table.

use std::sync::Arc;
use crate::engine_error;
use crate::descriptor::DescriptorSetLayout;
use crate::error::{Error, Result};
use crate::graphics_device::{GraphicsDevice, PipelineBindPoint, PushConstantRange, ShaderStageFlags};
use crate::pipeline::{Pipeline, PipelineBuilderBase, RayTracingPipelineDesc, ShaderGroup, ShaderGroupKind};
use crate::shader::ShaderModule;

/// A group before stage indices are known
#[derive(Clone)]
enum PendingGroup {
    General(Arc<ShaderModule>),
    TrianglesHit {
        closest_hit: Option<Arc<ShaderModule>>,
        any_hit: Option<Arc<ShaderModule>>,
    },
    ProceduralHit {
        intersection: Arc<ShaderModule>,
        closest_hit: Option<Arc<ShaderModule>>,
        any_hit: Option<Arc<ShaderModule>>,
    },
}

#[derive(Clone)]
pub struct RayTracingPipelineBuilder {
    base: PipelineBuilderBase,
    groups: Vec<PendingGroup>,
    max_recursion_depth: u32,
}

impl Default for RayTracingPipelineBuilder {
    fn default() -> Self {
        Self {
            base: PipelineBuilderBase::default(),
            groups: Vec::new(),
            max_recursion_depth: 1,
        }
    }
}

impl RayTracingPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ray_gen(self, module: Arc<ShaderModule>) -> Self {
        self.with_general(module)
    }

    pub fn with_miss(self, module: Arc<ShaderModule>) -> Self {
        self.with_general(module)
    }

    pub fn with_callable(self, module: Arc<ShaderModule>) -> Self {
        self.with_general(module)
    }

    fn with_general(mut self, module: Arc<ShaderModule>) -> Self {
        self.base.add_shader(Arc::clone(&module));
        self.groups.push(PendingGroup::General(module));
        self
    }

    pub fn with_triangles_hit(
        mut self,
        closest_hit: Option<Arc<ShaderModule>>,
        any_hit: Option<Arc<ShaderModule>>,
    ) -> Self {
        for module in closest_hit.iter().chain(any_hit.iter()) {
            self.base.add_shader(Arc::clone(module));
        }
        self.groups.push(PendingGroup::TrianglesHit { closest_hit, any_hit });
        self
    }

    pub fn with_procedural_hit(
        mut self,
        intersection: Arc<ShaderModule>,
        closest_hit: Option<Arc<ShaderModule>>,
        any_hit: Option<Arc<ShaderModule>>,
    ) -> Self {
        self.base.add_shader(Arc::clone(&intersection));
        for module in closest_hit.iter().chain(any_hit.iter()) {
            self.base.add_shader(Arc::clone(module));
        }
        self.groups.push(PendingGroup::ProceduralHit { intersection, closest_hit, any_hit });
        self
    }

    pub fn with_descriptor_set_layout(mut self, index: u32, layout: Arc<DescriptorSetLayout>) -> Self {
        self.base.set_layout(index, layout);
        self
    }

    pub fn with_push_constant_range(mut self, offset: u32, size: u32, stages: ShaderStageFlags) -> Self {
        self.base.add_push_constant_range(PushConstantRange { offset, size, stages });
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Map every pending group to stage indices, checking each module's stage
    fn resolve_groups(&self, debug_name: &str) -> Result<Vec<ShaderGroup>> {
        let index = |module: &Arc<ShaderModule>, allowed: ShaderStageFlags| -> Result<u32> {
            if !allowed.contains(module.stage()) {
                engine_error!(
                    "nova::Pipeline",
                    "Ray-tracing pipeline '{}': shader '{}' ({:?}) used as {:?}",
                    debug_name, module.debug_name(), module.stage(), allowed
                );
                return Err(Error::InvalidPipeline(format!(
                    "shader '{}' has the wrong stage for its group",
                    module.debug_name()
                )));
            }
            self.base
                .stage_index(module)
                .ok_or_else(|| Error::InvalidPipeline(format!("shader '{}' not in stage list", module.debug_name())))
        };
        let optional = |module: &Option<Arc<ShaderModule>>, allowed: ShaderStageFlags| module.as_ref().map(|m| index(m, allowed)).transpose();

        let general = ShaderStageFlags::RAYGEN | ShaderStageFlags::MISS | ShaderStageFlags::CALLABLE;
        self.groups
            .iter()
            .map(|group| {
                Ok(match group {
                    PendingGroup::General(module) => ShaderGroup::General { stage: index(module, general)? },
                    PendingGroup::TrianglesHit { closest_hit, any_hit } => ShaderGroup::TrianglesHit {
                        closest_hit: optional(closest_hit, ShaderStageFlags::CLOSEST_HIT)?,
                        any_hit: optional(any_hit, ShaderStageFlags::ANY_HIT)?,
                    },
                    PendingGroup::ProceduralHit { intersection, closest_hit, any_hit } => ShaderGroup::ProceduralHit {
                        intersection: index(intersection, ShaderStageFlags::INTERSECTION)?,
                        closest_hit: optional(closest_hit, ShaderStageFlags::CLOSEST_HIT)?,
                        any_hit: optional(any_hit, ShaderStageFlags::ANY_HIT)?,
                    },
                })
            })
            .collect()
    }

    /// Binding-table region of every group, valid once stages are checked
    fn group_kinds(&self) -> Vec<ShaderGroupKind> {
        self.groups
            .iter()
            .map(|group| match group {
                PendingGroup::General(module) if module.stage() == ShaderStageFlags::RAYGEN => ShaderGroupKind::RayGen,
                PendingGroup::General(module) if module.stage() == ShaderStageFlags::MISS => ShaderGroupKind::Miss,
                PendingGroup::General(_) => ShaderGroupKind::Callable,
                PendingGroup::TrianglesHit { .. } | PendingGroup::ProceduralHit { .. } => ShaderGroupKind::Hit,
            })
            .collect()
    }

    pub fn build(&self, device: &Arc<dyn GraphicsDevice>, debug_name: &str) -> Result<Pipeline> {
        if !self.base.shaders.is_empty() && !self.base.stages().contains(ShaderStageFlags::RAYGEN) {
            engine_error!("nova::Pipeline", "Ray-tracing pipeline '{}' has no ray generation shader", debug_name);
            return Err(Error::InvalidPipeline(format!("ray-tracing pipeline '{}' has no ray generation shader", debug_name)));
        }
        if self.max_recursion_depth == 0 {
            engine_error!("nova::Pipeline", "Ray-tracing pipeline '{}' has a recursion depth of 0", debug_name);
            return Err(Error::InvalidPipeline("max recursion depth must be at least 1".to_string()));
        }
        let groups = self.resolve_groups(debug_name)?;

        let resolved = self.base.resolve(device, debug_name)?;
        let desc = RayTracingPipelineDesc {
            layout: resolved.layout,
            stages: self.base.stage_descs(),
            groups,
            max_recursion_depth: self.max_recursion_depth,
            debug_name: debug_name.to_string(),
        };

        match device.create_ray_tracing_pipeline(&desc) {
            Ok(native) => Ok(Pipeline::new(device, PipelineBindPoint::RayTracing, native, resolved, debug_name)
                .with_shader_groups(self.group_kinds())),
            Err(e) => {
                engine_error!("nova::Pipeline", "Failed to create ray-tracing pipeline '{}': {}", debug_name, e);
                resolved.destroy(&**device);
                Err(e)
            }
        }
    }
}
