/// Shared state of the graphics, compute and ray-tracing pipeline builders
///
/// The base collects shader modules, caller-supplied set layouts and extra
/// push-constant ranges. At build time it merges every module's reflection,
/// picks a layout per set index (the caller's if one was bound, otherwise
/// one synthesized from the merged bindings) and creates the pipeline layout.

use std::sync::Arc;
use crate::{engine_error, engine_warn};
use crate::descriptor::DescriptorSetLayout;
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, NativeDescriptorSetLayout, NativePipelineLayout, LayoutBinding,
    PushConstantRange, ShaderStageFlags, DescriptorSetLayoutCreateFlags,
};
use crate::pipeline::ShaderStageDesc;
use crate::shader::{ShaderModule, ShaderReflection, combine_push_constant_ranges};

/// Highest number of descriptor sets a pipeline layout may reference
pub const MAX_DESCRIPTOR_SETS: u32 = 32;

const SOURCE: &str = "nova::Pipeline";

#[derive(Clone, Default)]
pub struct PipelineBuilderBase {
    pub(crate) shaders: Vec<Arc<ShaderModule>>,
    user_layouts: Vec<(u32, Arc<DescriptorSetLayout>)>,
    push_constants: Vec<PushConstantRange>,
}

/// Layout objects produced by `PipelineBuilderBase::resolve`
pub(crate) struct ResolvedLayout {
    pub layout: NativePipelineLayout,
    pub set_layouts: Vec<NativeDescriptorSetLayout>,
    pub owned_set_layouts: Vec<NativeDescriptorSetLayout>,
    pub user_set_layouts: Vec<Arc<DescriptorSetLayout>>,
    pub set_bindings: Vec<Vec<LayoutBinding>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl ResolvedLayout {
    /// Tear down after a failed pipeline creation
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        device.destroy_pipeline_layout(self.layout);
        for layout in self.owned_set_layouts {
            device.destroy_descriptor_set_layout(layout);
        }
    }
}

impl PipelineBuilderBase {
    pub fn add_shader(&mut self, module: Arc<ShaderModule>) {
        if !self.shaders.iter().any(|m| Arc::ptr_eq(m, &module)) {
            self.shaders.push(module);
        }
    }

    /// Use `layout` for set `index` instead of synthesizing one
    pub fn set_layout(&mut self, index: u32, layout: Arc<DescriptorSetLayout>) {
        self.user_layouts.retain(|(i, _)| *i != index);
        self.user_layouts.push((index, layout));
    }

    pub fn add_push_constant_range(&mut self, range: PushConstantRange) {
        combine_push_constant_ranges(&mut self.push_constants, &[range]);
    }

    /// Index of a module in the stage list
    pub(crate) fn stage_index(&self, module: &Arc<ShaderModule>) -> Option<u32> {
        self.shaders.iter().position(|m| Arc::ptr_eq(m, module)).map(|i| i as u32)
    }

    pub(crate) fn stage_descs(&self) -> Vec<ShaderStageDesc> {
        self.shaders
            .iter()
            .map(|m| ShaderStageDesc {
                module: m.native(),
                stage: m.stage(),
                entry_point: m.entry_point().to_string(),
            })
            .collect()
    }

    /// Union of every module's reflection plus the extra push ranges
    pub fn merged_reflection(&self) -> Result<ShaderReflection> {
        let mut merged = ShaderReflection::default();
        for module in &self.shaders {
            merged.merge(module.reflection()).map_err(|e| {
                engine_error!(SOURCE, "Shader '{}' conflicts with earlier stages", module.debug_name());
                e
            })?;
        }
        combine_push_constant_ranges(&mut merged.push_constants, &self.push_constants);
        Ok(merged)
    }

    /// Merge reflection, pick or synthesize set layouts and create the pipeline layout
    pub(crate) fn resolve(&self, device: &Arc<dyn GraphicsDevice>, debug_name: &str) -> Result<ResolvedLayout> {
        if self.shaders.is_empty() {
            engine_error!(SOURCE, "Pipeline '{}' has no shader modules", debug_name);
            return Err(Error::InvalidPipeline(format!("pipeline '{}' has no shader modules", debug_name)));
        }

        if let Some((index, _)) = self.user_layouts.iter().find(|(i, _)| *i >= MAX_DESCRIPTOR_SETS) {
            engine_error!(SOURCE, "Pipeline '{}' binds a layout at set {} (max {})", debug_name, index, MAX_DESCRIPTOR_SETS - 1);
            return Err(Error::InvalidPipeline(format!("set index {} out of range", index)));
        }

        let merged = self.merged_reflection()?;
        if merged.set_count() > MAX_DESCRIPTOR_SETS {
            engine_error!(SOURCE, "Pipeline '{}' uses {} descriptor sets", debug_name, merged.set_count());
            return Err(Error::InvalidPipeline(format!("too many descriptor sets: {}", merged.set_count())));
        }

        let user_max = self.user_layouts.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
        let set_count = merged.set_count().max(user_max);

        let mut resolved = ResolvedLayout {
            layout: NativePipelineLayout::NULL,
            set_layouts: Vec::with_capacity(set_count as usize),
            owned_set_layouts: Vec::new(),
            user_set_layouts: Vec::new(),
            set_bindings: Vec::with_capacity(set_count as usize),
            push_constant_ranges: merged.push_constants.clone(),
        };

        for set in 0..set_count {
            let reflected = merged.bindings(set);
            let user = self.user_layouts.iter().find(|(i, _)| *i == set).map(|(_, l)| l);

            let step = match user {
                Some(layout) => Self::check_user_layout(set, layout, reflected, debug_name).map(|()| {
                    resolved.set_layouts.push(layout.native());
                    resolved.set_bindings.push(layout.bindings().to_vec());
                    resolved.user_set_layouts.push(Arc::clone(layout));
                }),
                None => device
                    .create_descriptor_set_layout(
                        reflected,
                        DescriptorSetLayoutCreateFlags::empty(),
                        &format!("{} set {}", debug_name, set),
                    )
                    .map(|native| {
                        resolved.set_layouts.push(native);
                        resolved.owned_set_layouts.push(native);
                        resolved.set_bindings.push(reflected.to_vec());
                    }),
            };

            if let Err(e) = step {
                for layout in resolved.owned_set_layouts {
                    device.destroy_descriptor_set_layout(layout);
                }
                return Err(e);
            }
        }

        match device.create_pipeline_layout(&resolved.set_layouts, &resolved.push_constant_ranges) {
            Ok(layout) => {
                resolved.layout = layout;
                Ok(resolved)
            }
            Err(e) => {
                engine_error!(SOURCE, "Failed to create layout of pipeline '{}': {}", debug_name, e);
                for layout in resolved.owned_set_layouts {
                    device.destroy_descriptor_set_layout(layout);
                }
                Err(e)
            }
        }
    }

    /// A caller layout must declare every reflected binding with the same type
    fn check_user_layout(
        set: u32,
        layout: &DescriptorSetLayout,
        reflected: &[LayoutBinding],
        debug_name: &str,
    ) -> Result<()> {
        for binding in reflected {
            match layout.bindings().iter().find(|b| b.binding == binding.binding) {
                Some(declared) if !declared.descriptor_type.matches_reflected(binding.descriptor_type) => {
                    engine_error!(
                        SOURCE,
                        "Pipeline '{}' set {} binding {}: layout '{}' declares {:?}, shaders use {:?}",
                        debug_name, set, binding.binding, layout.debug_name(),
                        declared.descriptor_type, binding.descriptor_type
                    );
                    return Err(Error::InvalidPipeline(format!(
                        "set {} binding {} type mismatch with layout '{}'",
                        set, binding.binding, layout.debug_name()
                    )));
                }
                Some(declared) if !declared.stages.contains(binding.stages) => {
                    engine_warn!(
                        SOURCE,
                        "Pipeline '{}' set {} binding {} is not visible to all stages using it",
                        debug_name, set, binding.binding
                    );
                }
                Some(_) => {}
                None => {
                    engine_warn!(
                        SOURCE,
                        "Pipeline '{}' set {} binding {} is missing from layout '{}'",
                        debug_name, set, binding.binding, layout.debug_name()
                    );
                }
            }
        }
        Ok(())
    }

    /// Union of the stages of every module
    pub fn stages(&self) -> ShaderStageFlags {
        self.shaders.iter().fold(ShaderStageFlags::empty(), |acc, m| acc | m.stage())
    }
}
