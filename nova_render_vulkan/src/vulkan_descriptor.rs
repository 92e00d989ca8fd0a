/// Descriptor pools, set layouts and descriptor writes

use ash::vk;
use nova_render::config::DescriptorPoolSizes;
use nova_render::nova::device::{
    DescriptorResource, DescriptorSetLayoutCreateFlags, DescriptorType, DescriptorWrite, LayoutBinding,
    NativeDescriptorPool, NativeDescriptorSet, NativeDescriptorSetLayout,
};
use nova_render::nova::{Error, Result};
use nova_render::{engine_debug, engine_warn};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{
    binding_flags_to_vk, descriptor_type_to_vk, image_layout_to_vk, layout_create_flags_to_vk,
    stage_flags_to_vk, vk_error, vk_handle,
};

const SOURCE: &str = "nova::vulkan::descriptor";

/// Per-type pool capacities
///
/// Every buffer type gets `buffers`, every image type gets `images`,
/// standalone samplers get `samplers`. Zero capacities are left out.
pub(crate) fn pool_sizes(sizes: &DescriptorPoolSizes, ray_tracing: bool) -> Vec<vk::DescriptorPoolSize> {
    let mut pool_sizes = Vec::new();
    let mut push = |ty: vk::DescriptorType, descriptor_count: u32| {
        if descriptor_count > 0 {
            pool_sizes.push(vk::DescriptorPoolSize { ty, descriptor_count });
        }
    };
    for ty in [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    ] {
        push(ty, sizes.buffers);
    }
    for ty in [
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::DescriptorType::SAMPLED_IMAGE,
        vk::DescriptorType::STORAGE_IMAGE,
    ] {
        push(ty, sizes.images);
    }
    push(vk::DescriptorType::SAMPLER, sizes.samplers);
    if ray_tracing {
        push(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, sizes.buffers);
    }
    pool_sizes
}

pub(crate) fn create_pool(ctx: &VulkanContext, sizes: &DescriptorPoolSizes) -> Result<NativeDescriptorPool> {
    if sizes.max_sets == 0 {
        return Err(Error::InvalidResource("descriptor pool with max_sets = 0".to_string()));
    }
    let pool_sizes = pool_sizes(sizes, ctx.capabilities.ray_tracing);
    let mut flags = vk::DescriptorPoolCreateFlags::empty();
    if ctx.capabilities.update_after_bind {
        flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
    }
    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(flags)
        .pool_sizes(&pool_sizes)
        .max_sets(sizes.max_sets);

    let pool = unsafe { ctx.device.create_descriptor_pool(&info, None) }
        .map_err(|e| vk_error("create descriptor pool", e))?;
    engine_debug!(SOURCE, "Descriptor pool created ({} sets, {:?})", sizes.max_sets, sizes);
    Ok(NativeDescriptorPool(vk::Handle::as_raw(pool)))
}

pub(crate) fn allocate_set(
    ctx: &VulkanContext,
    pool: NativeDescriptorPool,
    layout: NativeDescriptorSetLayout,
) -> Result<NativeDescriptorSet> {
    let layouts = [vk_handle::<vk::DescriptorSetLayout>(layout.0)];
    let info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(vk_handle(pool.0))
        .set_layouts(&layouts);

    match unsafe { ctx.device.allocate_descriptor_sets(&info) } {
        Ok(sets) => sets
            .first()
            .map(|&set| NativeDescriptorSet(vk::Handle::as_raw(set)))
            .ok_or_else(|| Error::BackendError("descriptor set allocation returned nothing".to_string())),
        Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
            engine_warn!(SOURCE, "Descriptor pool {:#x} exhausted", pool.0);
            Err(Error::OutOfMemory)
        }
        Err(e) => Err(vk_error("allocate descriptor set", e)),
    }
}

pub(crate) fn create_set_layout(
    ctx: &VulkanContext,
    bindings: &[LayoutBinding],
    flags: DescriptorSetLayoutCreateFlags,
    debug_name: &str,
) -> Result<NativeDescriptorSetLayout> {
    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
        .iter()
        .map(|b| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(b.binding)
                .descriptor_type(descriptor_type_to_vk(b.descriptor_type))
                .descriptor_count(b.count)
                .stage_flags(stage_flags_to_vk(b.stages))
        })
        .collect();
    let binding_flags: Vec<vk::DescriptorBindingFlags> =
        bindings.iter().map(|b| binding_flags_to_vk(b.flags)).collect();

    let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
    let mut info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(layout_create_flags_to_vk(flags))
        .bindings(&vk_bindings);
    if binding_flags.iter().any(|f| !f.is_empty()) {
        info = info.push_next(&mut flags_info);
    }

    let layout = unsafe { ctx.device.create_descriptor_set_layout(&info, None) }
        .map_err(|e| vk_error("create descriptor set layout", e))?;
    ctx.set_name(layout, debug_name);
    Ok(NativeDescriptorSetLayout(vk::Handle::as_raw(layout)))
}

/// Descriptor info backing one write
enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

fn write_info(write: &DescriptorWrite) -> Option<WriteInfo> {
    match (write.descriptor_type, write.resource) {
        (ty, DescriptorResource::Buffer { buffer, offset, range }) if ty.is_buffer() => {
            Some(WriteInfo::Buffer(
                vk::DescriptorBufferInfo::default()
                    .buffer(vk_handle(buffer.0))
                    .offset(offset)
                    .range(range),
            ))
        }
        (ty, DescriptorResource::Image { view, sampler, layout })
            if ty.is_image() || ty == DescriptorType::Sampler =>
        {
            Some(WriteInfo::Image(
                vk::DescriptorImageInfo::default()
                    .image_view(vk_handle(view.0))
                    .sampler(sampler.map_or(vk::Sampler::null(), |s| vk_handle(s.0)))
                    .image_layout(image_layout_to_vk(layout)),
            ))
        }
        _ => None,
    }
}

pub(crate) fn write_descriptors(ctx: &VulkanContext, set: NativeDescriptorSet, writes: &[DescriptorWrite]) {
    // Infos must outlive the WriteDescriptorSet array that points into them
    let infos: Vec<(&DescriptorWrite, WriteInfo)> = writes
        .iter()
        .filter_map(|write| match write_info(write) {
            Some(info) => Some((write, info)),
            None => {
                engine_warn!(
                    SOURCE,
                    "Skipping write to binding {}[{}]: {:?} cannot hold {:?}",
                    write.binding, write.array_index, write.descriptor_type, write.resource
                );
                None
            }
        })
        .collect();

    let dst_set: vk::DescriptorSet = vk_handle(set.0);
    let vk_writes: Vec<vk::WriteDescriptorSet> = infos
        .iter()
        .map(|(write, info)| {
            let vk_write = vk::WriteDescriptorSet::default()
                .dst_set(dst_set)
                .dst_binding(write.binding)
                .dst_array_element(write.array_index)
                .descriptor_type(descriptor_type_to_vk(write.descriptor_type));
            match info {
                WriteInfo::Buffer(buffer) => vk_write.buffer_info(std::slice::from_ref(buffer)),
                WriteInfo::Image(image) => vk_write.image_info(std::slice::from_ref(image)),
            }
        })
        .collect();

    if !vk_writes.is_empty() {
        unsafe { ctx.device.update_descriptor_sets(&vk_writes, &[]) };
    }
}

#[cfg(test)]
#[path = "vulkan_descriptor_tests.rs"]
mod tests;
