/// Declarative descriptor set layout construction
///
/// # Example
///
/// ```ignore
/// let layout = DescriptorSetLayoutBuilder::new()
///     .with_uniform_buffers(0, 1, ShaderStageFlags::VERTEX)
///     .with_image_samplers(1, 1, ShaderStageFlags::FRAGMENT)
///     .build(&device, "material")?;
/// ```

use std::sync::Arc;
use crate::engine_error;
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, NativeDescriptorSetLayout, LayoutBinding, DescriptorType,
    ShaderStageFlags, DescriptorBindingFlags, DescriptorSetLayoutCreateFlags,
};

const SOURCE: &str = "nova::Descriptor";

/// Accumulates bindings and creation flags for one set layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<LayoutBinding>,
    creation_flags: DescriptorSetLayoutCreateFlags,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding of `count` descriptors at `slot`
    pub fn with_descriptor(
        mut self,
        descriptor_type: DescriptorType,
        slot: u32,
        count: u32,
        stages: ShaderStageFlags,
        flags: DescriptorBindingFlags,
    ) -> Self {
        self.bindings.push(LayoutBinding { binding: slot, descriptor_type, count, stages, flags });
        self
    }

    /// Add pre-built bindings, e.g. a reflected set
    pub fn with_descriptors(mut self, bindings: &[LayoutBinding]) -> Self {
        self.bindings.extend_from_slice(bindings);
        self
    }

    pub fn with_samplers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::Sampler, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_image_samplers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::CombinedImageSampler, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_sampled_images(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::SampledImage, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_storage_images(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::StorageImage, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_uniform_texel_buffers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::UniformTexelBuffer, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_storage_texel_buffers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::StorageTexelBuffer, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_uniform_buffers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::UniformBuffer, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_storage_buffers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::StorageBuffer, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_dynamic_uniform_buffers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::UniformBufferDynamic, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_dynamic_storage_buffers(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::StorageBufferDynamic, slot, count, stages, DescriptorBindingFlags::empty())
    }

    pub fn with_acceleration_structures(self, slot: u32, count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(DescriptorType::AccelerationStructure, slot, count, stages, DescriptorBindingFlags::empty())
    }

    /// Bindless array of up to `max_count` sampled images at the highest slot
    pub fn with_bindless_images(self, slot: u32, max_count: u32, stages: ShaderStageFlags) -> Self {
        self.with_descriptor(
            DescriptorType::SampledImage,
            slot,
            max_count,
            stages,
            DescriptorBindingFlags::PARTIALLY_BOUND
                | DescriptorBindingFlags::UPDATE_AFTER_BIND
                | DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
        )
        .with_creation_flags(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
    }

    pub fn with_creation_flags(mut self, flags: DescriptorSetLayoutCreateFlags) -> Self {
        self.creation_flags |= flags;
        self
    }

    /// Bindings added so far, in insertion order
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn creation_flags(&self) -> DescriptorSetLayoutCreateFlags {
        self.creation_flags
    }

    /// Check slot uniqueness, counts and binding-flag placement
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| {
            engine_error!(SOURCE, "Invalid descriptor set layout: {}", message);
            Err(Error::InvalidPipeline(message))
        };

        let highest = self.bindings.iter().map(|b| b.binding).max();
        for (i, binding) in self.bindings.iter().enumerate() {
            if binding.count == 0 {
                return fail(format!("binding {} has zero descriptors", binding.binding));
            }
            if self.bindings[..i].iter().any(|b| b.binding == binding.binding) {
                return fail(format!("binding {} declared twice", binding.binding));
            }
            if binding.flags.contains(DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
                && Some(binding.binding) != highest
            {
                return fail(format!(
                    "variable-count binding {} is not the highest slot",
                    binding.binding
                ));
            }
            if binding.flags.contains(DescriptorBindingFlags::UPDATE_AFTER_BIND)
                && !self.creation_flags.contains(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            {
                return fail(format!(
                    "binding {} is update-after-bind but the layout lacks UPDATE_AFTER_BIND_POOL",
                    binding.binding
                ));
            }
        }
        Ok(())
    }

    /// Create the layout
    pub fn build(&self, device: &Arc<dyn GraphicsDevice>, debug_name: &str) -> Result<DescriptorSetLayout> {
        self.validate()?;

        let mut bindings = self.bindings.clone();
        bindings.sort_by_key(|b| b.binding);
        let native = device.create_descriptor_set_layout(&bindings, self.creation_flags, debug_name)?;

        Ok(DescriptorSetLayout {
            device: Arc::clone(device),
            native,
            bindings,
            creation_flags: self.creation_flags,
            debug_name: debug_name.to_string(),
        })
    }
}

/// Owned descriptor set layout, destroyed on drop
pub struct DescriptorSetLayout {
    device: Arc<dyn GraphicsDevice>,
    native: NativeDescriptorSetLayout,
    bindings: Vec<LayoutBinding>,
    creation_flags: DescriptorSetLayoutCreateFlags,
    debug_name: String,
}

impl DescriptorSetLayout {
    pub fn native(&self) -> NativeDescriptorSetLayout {
        self.native
    }

    /// Bindings sorted by slot
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn creation_flags(&self) -> DescriptorSetLayoutCreateFlags {
        self.creation_flags
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

impl std::fmt::Debug for DescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("native", &self.native)
            .field("bindings", &self.bindings)
            .field("debug_name", &self.debug_name)
            .finish()
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.native);
    }
}
