/// Shader modules, pipeline layouts and pipelines
///
/// Graphics pipelines target dynamic rendering (no render pass object) and
/// always leave viewport and scissor dynamic.

use ash::vk;
use nova_render::nova::device::{
    Format, NativePipeline, NativePipelineLayout, NativeShaderModule, PushConstantRange, NativeDescriptorSetLayout,
};
use nova_render::nova::pipeline::{
    BlendState, ComputePipelineDesc, GraphicsPipelineDesc, PrimitiveTopology, RayTracingPipelineDesc, ShaderGroup,
    ShaderStageDesc,
};
use nova_render::nova::{Error, Result};
use nova_render::{engine_bail, engine_debug, engine_error};
use std::ffi::CString;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{
    blend_factor_to_vk, blend_op_to_vk, color_write_mask_to_vk, compare_op_to_vk, cull_mode_to_vk, format_to_vk,
    front_face_to_vk, input_rate_to_vk, polygon_mode_to_vk, sample_count_to_vk, stage_flags_to_vk, topology_to_vk,
    vk_error, vk_handle,
};

const SOURCE: &str = "nova::vulkan::pipeline";

/// Control points per patch when the topology is `PatchList`
const PATCH_CONTROL_POINTS: u32 = 3;

// ===== SHADER MODULES / LAYOUTS =====

pub(crate) fn create_shader_module(ctx: &VulkanContext, code: &[u32], debug_name: &str) -> Result<NativeShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe { ctx.device.create_shader_module(&info, None) }.map_err(|e| {
        engine_error!(SOURCE, "Failed to create shader module '{}': {:?}", debug_name, e);
        Error::InvalidPipeline(format!("shader module '{}': {:?}", debug_name, e))
    })?;
    ctx.set_name(module, debug_name);
    Ok(NativeShaderModule(vk::Handle::as_raw(module)))
}

pub(crate) fn create_pipeline_layout(
    ctx: &VulkanContext,
    set_layouts: &[NativeDescriptorSetLayout],
    push_constants: &[PushConstantRange],
) -> Result<NativePipelineLayout> {
    let vk_set_layouts: Vec<vk::DescriptorSetLayout> = set_layouts.iter().map(|l| vk_handle(l.0)).collect();
    let vk_ranges: Vec<vk::PushConstantRange> = push_constants
        .iter()
        .map(|r| {
            vk::PushConstantRange::default()
                .stage_flags(stage_flags_to_vk(r.stages))
                .offset(r.offset)
                .size(r.size)
        })
        .collect();
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&vk_set_layouts)
        .push_constant_ranges(&vk_ranges);

    let layout = unsafe { ctx.device.create_pipeline_layout(&info, None) }
        .map_err(|e| vk_error("create pipeline layout", e))?;
    Ok(NativePipelineLayout(vk::Handle::as_raw(layout)))
}

/// Entry point names kept alive for the create call
fn entry_points(stages: &[ShaderStageDesc]) -> Result<Vec<CString>> {
    stages
        .iter()
        .map(|stage| {
            CString::new(stage.entry_point.as_str()).map_err(|_| {
                Error::InvalidPipeline(format!("entry point {:?} contains a NUL byte", stage.entry_point))
            })
        })
        .collect()
}

fn stage_infos<'a>(stages: &[ShaderStageDesc], names: &'a [CString]) -> Vec<vk::PipelineShaderStageCreateInfo<'a>> {
    stages
        .iter()
        .zip(names)
        .map(|(stage, name)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage_flags_to_vk(stage.stage))
                .module(vk_handle(stage.module.0))
                .name(name)
        })
        .collect()
}

// ===== GRAPHICS =====

pub(crate) fn blend_attachment(blend: &BlendState) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(blend.enable)
        .src_color_blend_factor(blend_factor_to_vk(blend.src_color))
        .dst_color_blend_factor(blend_factor_to_vk(blend.dst_color))
        .color_blend_op(blend_op_to_vk(blend.color_op))
        .src_alpha_blend_factor(blend_factor_to_vk(blend.src_alpha))
        .dst_alpha_blend_factor(blend_factor_to_vk(blend.dst_alpha))
        .alpha_blend_op(blend_op_to_vk(blend.alpha_op))
        .color_write_mask(color_write_mask_to_vk(blend.write_mask))
}

/// Depth and stencil attachment formats for dynamic rendering
pub(crate) fn depth_stencil_formats(depth_format: Option<Format>) -> (vk::Format, vk::Format) {
    match depth_format {
        Some(format) if format.has_stencil() => (format_to_vk(format), format_to_vk(format)),
        Some(format) => (format_to_vk(format), vk::Format::UNDEFINED),
        None => (vk::Format::UNDEFINED, vk::Format::UNDEFINED),
    }
}

pub(crate) fn create_graphics_pipeline(ctx: &VulkanContext, desc: &GraphicsPipelineDesc) -> Result<NativePipeline> {
    let names = entry_points(&desc.stages)?;
    let stages = stage_infos(&desc.stages, &names);

    let bindings: Vec<vk::VertexInputBindingDescription> = desc
        .vertex_bindings
        .iter()
        .map(|b| vk::VertexInputBindingDescription {
            binding: b.binding,
            stride: b.stride,
            input_rate: input_rate_to_vk(b.input_rate),
        })
        .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_attributes
        .iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location,
            binding: a.binding,
            format: format_to_vk(a.format),
            offset: a.offset,
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology_to_vk(desc.topology))
        .primitive_restart_enable(false);
    let tessellation = vk::PipelineTessellationStateCreateInfo::default().patch_control_points(PATCH_CONTROL_POINTS);

    // Counts only, values are dynamic
    let viewport = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let raster = &desc.rasterization;
    let (bias_constant, bias_slope, bias_clamp) = raster.depth_bias.unwrap_or((0.0, 0.0, 0.0));
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(polygon_mode_to_vk(raster.polygon_mode))
        .cull_mode(cull_mode_to_vk(raster.cull_mode))
        .front_face(front_face_to_vk(raster.front_face))
        .line_width(raster.line_width)
        .depth_bias_enable(raster.depth_bias.is_some())
        .depth_bias_constant_factor(bias_constant)
        .depth_bias_slope_factor(bias_slope)
        .depth_bias_clamp(bias_clamp);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(sample_count_to_vk(desc.sample_count));

    let has_depth = desc.depth_format.is_some();
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(has_depth && desc.depth.test_enable)
        .depth_write_enable(has_depth && desc.depth.write_enable)
        .depth_compare_op(compare_op_to_vk(desc.depth.compare_op));

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> =
        desc.color_attachments.iter().map(|a| blend_attachment(&a.blend)).collect();
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats: Vec<vk::Format> = desc.color_attachments.iter().map(|a| format_to_vk(a.format)).collect();
    let (depth_format, stencil_format) = depth_stencil_formats(desc.depth_format);
    let mut rendering = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(depth_format)
        .stencil_attachment_format(stencil_format);

    let mut info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(vk_handle(desc.layout.0))
        .push_next(&mut rendering);
    if desc.topology == PrimitiveTopology::PatchList {
        info = info.tessellation_state(&tessellation);
    }

    let pipelines = unsafe {
        ctx.device
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
    }
    .map_err(|(_, e)| pipeline_error(&desc.debug_name, e))?;
    finish(ctx, pipelines, &desc.debug_name)
}

// ===== COMPUTE =====

pub(crate) fn create_compute_pipeline(ctx: &VulkanContext, desc: &ComputePipelineDesc) -> Result<NativePipeline> {
    let names = entry_points(std::slice::from_ref(&desc.stage))?;
    let stages = stage_infos(std::slice::from_ref(&desc.stage), &names);
    let Some(&stage) = stages.first() else {
        return Err(Error::InvalidPipeline("compute pipeline without a stage".to_string()));
    };
    let info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(vk_handle(desc.layout.0));

    let pipelines = unsafe {
        ctx.device
            .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
    }
    .map_err(|(_, e)| pipeline_error(&desc.debug_name, e))?;
    finish(ctx, pipelines, &desc.debug_name)
}

// ===== RAY TRACING =====

pub(crate) fn shader_group_to_vk(group: ShaderGroup) -> vk::RayTracingShaderGroupCreateInfoKHR<'static> {
    let index = |stage: Option<u32>| stage.unwrap_or(vk::SHADER_UNUSED_KHR);
    let (ty, general, closest_hit, any_hit, intersection) = match group {
        ShaderGroup::General { stage } => (
            vk::RayTracingShaderGroupTypeKHR::GENERAL,
            stage,
            vk::SHADER_UNUSED_KHR,
            vk::SHADER_UNUSED_KHR,
            vk::SHADER_UNUSED_KHR,
        ),
        ShaderGroup::TrianglesHit { closest_hit, any_hit } => (
            vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP,
            vk::SHADER_UNUSED_KHR,
            index(closest_hit),
            index(any_hit),
            vk::SHADER_UNUSED_KHR,
        ),
        ShaderGroup::ProceduralHit { intersection, closest_hit, any_hit } => (
            vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP,
            vk::SHADER_UNUSED_KHR,
            index(closest_hit),
            index(any_hit),
            intersection,
        ),
    };
    vk::RayTracingShaderGroupCreateInfoKHR::default()
        .ty(ty)
        .general_shader(general)
        .closest_hit_shader(closest_hit)
        .any_hit_shader(any_hit)
        .intersection_shader(intersection)
}

pub(crate) fn create_ray_tracing_pipeline(ctx: &VulkanContext, desc: &RayTracingPipelineDesc) -> Result<NativePipeline> {
    let Some(ray_tracing) = &ctx.ray_tracing else {
        engine_bail!(SOURCE, "'{}': ray tracing is not supported by '{}'", desc.debug_name, ctx.capabilities.device_name);
    };
    let max_depth = ctx.capabilities.max_ray_recursion_depth;
    if desc.max_recursion_depth > max_depth {
        engine_error!(
            SOURCE,
            "'{}': recursion depth {} exceeds device limit {}",
            desc.debug_name, desc.max_recursion_depth, max_depth
        );
        return Err(Error::InvalidPipeline(format!(
            "recursion depth {} exceeds device limit {}",
            desc.max_recursion_depth, max_depth
        )));
    }

    let names = entry_points(&desc.stages)?;
    let stages = stage_infos(&desc.stages, &names);
    let groups: Vec<vk::RayTracingShaderGroupCreateInfoKHR> =
        desc.groups.iter().map(|&group| shader_group_to_vk(group)).collect();

    let info = vk::RayTracingPipelineCreateInfoKHR::default()
        .stages(&stages)
        .groups(&groups)
        .max_pipeline_ray_recursion_depth(desc.max_recursion_depth)
        .layout(vk_handle(desc.layout.0));

    let pipelines = unsafe {
        ray_tracing.create_ray_tracing_pipelines(
            vk::DeferredOperationKHR::null(),
            vk::PipelineCache::null(),
            std::slice::from_ref(&info),
            None,
        )
    }
    .map_err(|(_, e)| pipeline_error(&desc.debug_name, e))?;
    finish(ctx, pipelines, &desc.debug_name)
}

// ===== HELPERS =====

fn pipeline_error(name: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            vk_error("create pipeline", result)
        }
        _ => {
            engine_error!(SOURCE, "Failed to create pipeline '{}': {:?}", name, result);
            Error::InvalidPipeline(format!("'{}': {:?}", name, result))
        }
    }
}

fn finish(ctx: &VulkanContext, pipelines: Vec<vk::Pipeline>, name: &str) -> Result<NativePipeline> {
    let pipeline = pipelines
        .first()
        .copied()
        .ok_or_else(|| Error::BackendError(format!("'{}': driver returned no pipeline", name)))?;
    ctx.set_name(pipeline, name);
    engine_debug!(SOURCE, "Pipeline '{}' created", name);
    Ok(NativePipeline(vk::Handle::as_raw(pipeline)))
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
