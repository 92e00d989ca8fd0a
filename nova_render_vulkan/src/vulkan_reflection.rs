/// SPIR-V reflection through spirq
///
/// Every entry point of the module contributes its descriptors and push
/// constants; all of them are tagged with the stage the module was loaded for.

use nova_render::engine_err;
use nova_render::nova::device::{
    DescriptorBindingFlags, DescriptorType, LayoutBinding, PushConstantRange, ShaderStageFlags,
};
use nova_render::nova::pipeline::ShaderReflection;
use nova_render::nova::Result;
use nova_render::{engine_debug, engine_warn};

const SOURCE: &str = "nova::vulkan::reflection";

/// Descriptor count given to runtime-sized arrays (`texture2D textures[]`)
pub(crate) const RUNTIME_ARRAY_CAPACITY: u32 = 1024;

/// Reflect a SPIR-V module
pub(crate) fn reflect_spirv(code: &[u32], stage: ShaderStageFlags) -> Result<ShaderReflection> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!(SOURCE, "SPIR-V reflection failed: {:?}", e))?;

    let mut reflection = ShaderReflection::default();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, nbind, .. } => {
                    let Some(descriptor_type) = descriptor_type_from_spirq(desc_ty) else {
                        engine_warn!(
                            SOURCE,
                            "Skipping '{}' (set {} binding {}): unsupported descriptor {:?}",
                            name.as_deref().unwrap_or("?"), desc_bind.set(), desc_bind.bind(), desc_ty
                        );
                        continue;
                    };
                    let (count, flags) = binding_count(*nbind);
                    reflection.add_binding(
                        desc_bind.set(),
                        LayoutBinding {
                            binding: desc_bind.bind(),
                            descriptor_type,
                            count,
                            stages: stage,
                            flags,
                        },
                    )?;
                }
                spirq::var::Variable::PushConstant { ty, .. } => {
                    if let Some(range) = push_constant_range(ty, stage) {
                        nova_render::nova::pipeline::combine_push_constant_ranges(
                            &mut reflection.push_constants,
                            &[range],
                        );
                    }
                }
                _ => {}
            }
        }
    }

    engine_debug!(
        SOURCE,
        "Reflected {:?}: {} set(s), {} push-constant range(s)",
        stage, reflection.set_count(), reflection.push_constants.len()
    );
    Ok(reflection)
}

/// Core descriptor type for a spirq one, `None` for input attachments
pub(crate) fn descriptor_type_from_spirq(ty: &spirq::ty::DescriptorType) -> Option<DescriptorType> {
    use spirq::ty::DescriptorType as Spirq;
    let ty = match ty {
        Spirq::Sampler(..) => DescriptorType::Sampler,
        Spirq::CombinedImageSampler(..) => DescriptorType::CombinedImageSampler,
        Spirq::SampledImage(..) => DescriptorType::SampledImage,
        Spirq::StorageImage(..) => DescriptorType::StorageImage,
        Spirq::UniformTexelBuffer(..) => DescriptorType::UniformTexelBuffer,
        Spirq::StorageTexelBuffer(..) => DescriptorType::StorageTexelBuffer,
        Spirq::UniformBuffer(..) => DescriptorType::UniformBuffer,
        Spirq::StorageBuffer(..) => DescriptorType::StorageBuffer,
        Spirq::AccelStruct(..) => DescriptorType::AccelerationStructure,
        Spirq::InputAttachment(..) => return None,
    };
    Some(ty)
}

/// Array size and flags for a reflected binding count (0 = runtime array)
pub(crate) fn binding_count(nbind: u32) -> (u32, DescriptorBindingFlags) {
    if nbind == 0 {
        (RUNTIME_ARRAY_CAPACITY, DescriptorBindingFlags::PARTIALLY_BOUND)
    } else {
        (nbind, DescriptorBindingFlags::empty())
    }
}

/// Byte range covered by a push-constant block
///
/// Starts at the lowest member offset so blocks split across stages with
/// `layout(offset = N)` do not overlap.
fn push_constant_range(ty: &spirq::ty::Type, stage: ShaderStageFlags) -> Option<PushConstantRange> {
    let end = ty.nbyte()? as u32;
    let offset = match ty {
        spirq::ty::Type::Struct(st) => st
            .members
            .iter()
            .filter_map(|m| m.offset)
            .min()
            .unwrap_or(0) as u32,
        _ => 0,
    };
    (end > offset).then(|| PushConstantRange { offset, size: end - offset, stages: stage })
}

#[cfg(test)]
#[path = "vulkan_reflection_tests.rs"]
mod tests;
