/// Reflection data recovered from a shader binary, and the rules for merging
/// it across the stages of one pipeline.
///
/// A binding shared by several stages must agree on type and count; its
/// visibility is the union of the stages that declare it. Merging is
/// idempotent: merging a reflection into itself changes nothing.

use crate::engine_error;
use crate::error::{Error, Result};
use crate::graphics_device::{LayoutBinding, PushConstantRange};
use crate::pipeline::MAX_DESCRIPTOR_SETS;

/// Descriptor bindings and push-constant ranges declared by a shader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    /// Bindings per descriptor set, indexed by set number, sorted by slot
    pub set_layouts: Vec<Vec<LayoutBinding>>,
    pub push_constants: Vec<PushConstantRange>,
}

impl ShaderReflection {
    /// Record one binding at `set`, growing the set list as needed
    ///
    /// The set index comes straight from the shader binary, so anything at
    /// or above `MAX_DESCRIPTOR_SETS` is rejected before it sizes a vector.
    pub fn add_binding(&mut self, set: u32, binding: LayoutBinding) -> Result<()> {
        if set >= MAX_DESCRIPTOR_SETS {
            engine_error!(
                "nova::Pipeline",
                "Binding {} declared at set {} (max {})",
                binding.binding, set, MAX_DESCRIPTOR_SETS - 1
            );
            return Err(Error::InvalidPipeline(format!(
                "descriptor set {} exceeds the limit of {} sets",
                set, MAX_DESCRIPTOR_SETS
            )));
        }
        let mut incoming = vec![Vec::new(); set as usize + 1];
        incoming[set as usize].push(binding);
        combine_layout_bindings(&mut self.set_layouts, &incoming)
    }

    /// Merge another stage's reflection into this one
    pub fn merge(&mut self, other: &ShaderReflection) -> Result<()> {
        combine_layout_bindings(&mut self.set_layouts, &other.set_layouts)?;
        combine_push_constant_ranges(&mut self.push_constants, &other.push_constants);
        Ok(())
    }

    /// Bindings at `set`, empty when the set is not used
    pub fn bindings(&self, set: u32) -> &[LayoutBinding] {
        self.set_layouts
            .get(set as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of set indices spanned (highest used set + 1)
    pub fn set_count(&self) -> u32 {
        self.set_layouts.len() as u32
    }
}

/// Union `source` into `target` by (set, slot)
///
/// A slot present in both must have the same descriptor type and count,
/// otherwise `Error::InvalidPipeline` is returned and `target` is left
/// untouched. Stage masks and binding flags are OR-ed.
pub fn combine_layout_bindings(
    target: &mut Vec<Vec<LayoutBinding>>,
    source: &[Vec<LayoutBinding>],
) -> Result<()> {
    // Check everything first so a failed merge leaves no partial state
    for (set, bindings) in source.iter().enumerate() {
        let Some(existing) = target.get(set) else { continue };
        for incoming in bindings {
            let Some(current) = existing.iter().find(|b| b.binding == incoming.binding) else {
                continue;
            };
            if current.descriptor_type != incoming.descriptor_type || current.count != incoming.count {
                let message = format!(
                    "set {} binding {} declared as {:?}[{}] and {:?}[{}]",
                    set, incoming.binding,
                    current.descriptor_type, current.count,
                    incoming.descriptor_type, incoming.count,
                );
                engine_error!("nova::Pipeline", "Layout merge conflict: {}", message);
                return Err(Error::InvalidPipeline(message));
            }
        }
    }

    if target.len() < source.len() {
        target.resize(source.len(), Vec::new());
    }

    for (set, bindings) in source.iter().enumerate() {
        let merged = &mut target[set];
        for incoming in bindings {
            match merged.iter_mut().find(|b| b.binding == incoming.binding) {
                Some(current) => {
                    current.stages |= incoming.stages;
                    current.flags |= incoming.flags;
                }
                None => merged.push(*incoming),
            }
        }
        merged.sort_by_key(|b| b.binding);
    }

    Ok(())
}

/// Union `source` into `target` by (offset, size), OR-ing stage masks
pub fn combine_push_constant_ranges(target: &mut Vec<PushConstantRange>, source: &[PushConstantRange]) {
    for incoming in source {
        match target
            .iter_mut()
            .find(|r| r.offset == incoming.offset && r.size == incoming.size)
        {
            Some(current) => current.stages |= incoming.stages,
            None => target.push(*incoming),
        }
    }
    target.sort_by_key(|r| (r.offset, r.size));
}

#[cfg(test)]
#[path = "reflection_tests.rs"]
mod tests;
