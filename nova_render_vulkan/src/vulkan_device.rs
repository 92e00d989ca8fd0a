/// VulkanDevice - `GraphicsDevice` implementation on Vulkan 1.3
///
/// Uses timeline semaphores for frame completion, synchronization2 for
/// barriers and submission, and dynamic rendering instead of render pass
/// objects. Field order is teardown order: the swapchain and command pool
/// go first, then every allocation, then the device itself.

use ash::vk;
use nova_render::config::{Config, DescriptorPoolSizes};
use nova_render::nova::device::{
    AcquireOutcome, BufferAllocation, BufferCopy, BufferDesc, BufferImageCopy, DescriptorSetLayoutCreateFlags,
    DescriptorWrite, Filter, FrameSubmit, GraphicsDevice, ImageAllocation, ImageDesc, ImageTransition, IndexType,
    LayoutBinding, MappedPtr, NativeBuffer, NativeCommandBuffer, NativeDescriptorPool, NativeDescriptorSet,
    NativeDescriptorSetLayout, NativeFence, NativeImage, NativePipeline, NativePipelineLayout, NativeSampler,
    NativeSemaphore, NativeShaderModule, PipelineBindPoint, PresentMode, PresentOutcome, PushConstantRange,
    RayTracingProperties, Rect2D, RenderingInfo, SamplerDesc, ShaderBindingRegions, ShaderStageFlags, SwapchainInfo,
    Viewport, WaitStatus,
};
use nova_render::nova::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, RayTracingPipelineDesc, ShaderReflection};
use nova_render::nova::{Error, Result};
use nova_render::{engine_error, engine_info, engine_trace, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_descriptor;
use crate::vulkan_format::{
    address_mode_to_vk, aspect_mask, bind_point_to_vk, filter_to_vk, image_layout_to_vk, index_type_to_vk,
    layout_scope, stage_flags_to_vk, strided_region_to_vk, timeout_ns, vk_error, vk_handle,
};
use crate::vulkan_memory::VulkanMemory;
use crate::vulkan_pipeline;
use crate::vulkan_reflection;
use crate::vulkan_swapchain::Swapchain;

const SOURCE: &str = "nova::vulkan";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Vulkan backend device
pub struct VulkanDevice {
    swapchain: Mutex<Option<Swapchain>>,
    command_pool: Mutex<vk::CommandPool>,
    memory: VulkanMemory,
    ctx: VulkanContext,
}

impl VulkanDevice {
    /// Create a device presenting to `window`
    ///
    /// # Arguments
    ///
    /// * `window` - Window providing display and window handles
    /// * `config` - Application name, GPU preference and validation settings
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        let ctx = VulkanContext::new(window, config)?;
        let memory = VulkanMemory::new(&ctx)?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.graphics_family);
        let command_pool = unsafe { ctx.device.create_command_pool(&pool_info, None) }.map_err(|e| {
            engine_error!(SOURCE, "Failed to create command pool: {:?}", e);
            Error::InitializationFailed(format!("Failed to create command pool: {:?}", e))
        })?;

        engine_info!(SOURCE, "Vulkan device initialized on '{}'", ctx.capabilities.device_name);
        Ok(Self {
            swapchain: Mutex::new(None),
            command_pool: Mutex::new(command_pool),
            memory,
            ctx,
        })
    }

    /// Name of the selected GPU
    pub fn device_name(&self) -> &str {
        &self.ctx.capabilities.device_name
    }

    /// Whether ray-tracing pipelines can be created
    pub fn supports_ray_tracing(&self) -> bool {
        self.ctx.capabilities.ray_tracing
    }

    fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    fn wait(result: ash::prelude::VkResult<()>, what: &str) -> Result<WaitStatus> {
        match result {
            Ok(()) => Ok(WaitStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(WaitStatus::TimedOut),
            Err(e) => Err(vk_error(what, e)),
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            *self.swapchain.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            let pool = *self.command_pool.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.ctx.device.destroy_command_pool(pool, None);
        }
    }
}

impl GraphicsDevice for VulkanDevice {
    // ===== MEMORY =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferAllocation> {
        self.memory.create_buffer(&self.ctx, desc)
    }

    fn destroy_buffer(&self, buffer: NativeBuffer) {
        self.memory.destroy_buffer(buffer);
    }

    fn map_buffer(&self, buffer: NativeBuffer) -> Result<MappedPtr> {
        self.memory.mapped_ptr(buffer)
    }

    fn unmap_buffer(&self, buffer: NativeBuffer) {
        // Host-visible allocations stay mapped until freed
        engine_trace!(SOURCE, "unmap_buffer {:#x}: persistent mapping kept", buffer.0);
    }

    fn buffer_device_address(&self, buffer: NativeBuffer) -> Result<u64> {
        self.memory.device_address(&self.ctx, buffer)
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageAllocation> {
        self.memory.create_image(&self.ctx, desc)
    }

    fn destroy_image(&self, image: NativeImage) {
        self.memory.destroy_image(image);
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<NativeSampler> {
        let filter = filter_to_vk(desc.filter);
        let address_mode = address_mode_to_vk(desc.address_mode);
        let caps = &self.ctx.capabilities;
        let anisotropy = desc
            .max_anisotropy
            .filter(|_| caps.sampler_anisotropy)
            .map(|requested| requested.min(caps.max_sampler_anisotropy).max(1.0));
        if desc.max_anisotropy.is_some() && anisotropy.is_none() {
            engine_warn!(SOURCE, "Sampler anisotropy not supported, creating an isotropic sampler");
        }
        let mipmap_mode = match desc.filter {
            Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
            Filter::Linear => vk::SamplerMipmapMode::LINEAR,
        };

        let info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let sampler = unsafe { self.device().create_sampler(&info, None) }
            .map_err(|e| vk_error("create sampler", e))?;
        Ok(NativeSampler(vk::Handle::as_raw(sampler)))
    }

    fn destroy_sampler(&self, sampler: NativeSampler) {
        unsafe { self.device().destroy_sampler(vk_handle(sampler.0), None) };
    }

    // ===== SYNCHRONIZATION =====

    fn create_timeline_semaphore(&self, initial_value: u64) -> Result<NativeSemaphore> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore = unsafe { self.device().create_semaphore(&info, None) }
            .map_err(|e| vk_error("create timeline semaphore", e))?;
        self.ctx.set_name(semaphore, "frame timeline");
        Ok(NativeSemaphore(vk::Handle::as_raw(semaphore)))
    }

    fn wait_timeline(&self, semaphore: NativeSemaphore, value: u64, timeout: Duration) -> Result<WaitStatus> {
        let semaphores = [vk_handle::<vk::Semaphore>(semaphore.0)];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        Self::wait(
            unsafe { self.device().wait_semaphores(&info, timeout_ns(timeout)) },
            "wait timeline semaphore",
        )
    }

    fn timeline_value(&self, semaphore: NativeSemaphore) -> Result<u64> {
        unsafe { self.device().get_semaphore_counter_value(vk_handle(semaphore.0)) }
            .map_err(|e| vk_error("read timeline value", e))
    }

    fn create_semaphore(&self) -> Result<NativeSemaphore> {
        let semaphore = unsafe { self.device().create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| vk_error("create semaphore", e))?;
        Ok(NativeSemaphore(vk::Handle::as_raw(semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: NativeSemaphore) {
        unsafe { self.device().destroy_semaphore(vk_handle(semaphore.0), None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<NativeFence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe { self.device().create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| vk_error("create fence", e))?;
        Ok(NativeFence(vk::Handle::as_raw(fence)))
    }

    fn destroy_fence(&self, fence: NativeFence) {
        unsafe { self.device().destroy_fence(vk_handle(fence.0), None) };
    }

    fn wait_fence(&self, fence: NativeFence, timeout: Duration) -> Result<WaitStatus> {
        let fences = [vk_handle::<vk::Fence>(fence.0)];
        Self::wait(
            unsafe { self.device().wait_for_fences(&fences, true, timeout_ns(timeout)) },
            "wait fence",
        )
    }

    fn reset_fence(&self, fence: NativeFence) -> Result<()> {
        let fences = [vk_handle::<vk::Fence>(fence.0)];
        unsafe { self.device().reset_fences(&fences) }.map_err(|e| vk_error("reset fence", e))
    }

    fn wait_idle(&self) -> Result<()> {
        let _queue = lock(&self.ctx.queue_lock);
        unsafe { self.device().device_wait_idle() }.map_err(|e| vk_error("wait device idle", e))
    }

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, width: u32, height: u32, present_mode: PresentMode) -> Result<SwapchainInfo> {
        let mut slot = lock(&self.swapchain);
        let chain = Swapchain::create(&self.ctx, width, height, present_mode, slot.take())?;
        let info = chain.info();
        *slot = Some(chain);
        Ok(info)
    }

    fn acquire_next_image(
        &self,
        semaphore: NativeSemaphore,
        fence: NativeFence,
        timeout: Duration,
    ) -> Result<AcquireOutcome> {
        match lock(&self.swapchain).as_ref() {
            Some(chain) => chain.acquire(semaphore, fence, timeout),
            None => Err(Error::InvalidOperation("acquire before the swapchain was created".to_string())),
        }
    }

    fn present(&self, image_index: u32, wait_semaphore: NativeSemaphore) -> Result<PresentOutcome> {
        match lock(&self.swapchain).as_ref() {
            Some(chain) => chain.present(&self.ctx, image_index, wait_semaphore),
            None => Err(Error::InvalidOperation("present before the swapchain was created".to_string())),
        }
    }

    // ===== COMMAND RECORDING =====

    fn allocate_command_buffer(&self) -> Result<NativeCommandBuffer> {
        let pool = lock(&self.command_pool);
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device().allocate_command_buffers(&info) }
            .map_err(|e| vk_error("allocate command buffer", e))?;
        buffers
            .first()
            .map(|&cb| NativeCommandBuffer(vk::Handle::as_raw(cb)))
            .ok_or_else(|| Error::BackendError("command buffer allocation returned nothing".to_string()))
    }

    fn free_command_buffer(&self, command_buffer: NativeCommandBuffer) {
        let pool = lock(&self.command_pool);
        let buffers = [vk_handle::<vk::CommandBuffer>(command_buffer.0)];
        unsafe { self.device().free_command_buffers(*pool, &buffers) };
    }

    fn begin_command_buffer(&self, command_buffer: NativeCommandBuffer) -> Result<()> {
        let cb: vk::CommandBuffer = vk_handle(command_buffer.0);
        unsafe {
            self.device()
                .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_error("reset command buffer", e))?;
            let info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device()
                .begin_command_buffer(cb, &info)
                .map_err(|e| vk_error("begin command buffer", e))
        }
    }

    fn end_command_buffer(&self, command_buffer: NativeCommandBuffer) -> Result<()> {
        unsafe { self.device().end_command_buffer(vk_handle(command_buffer.0)) }
            .map_err(|e| vk_error("end command buffer", e))
    }

    fn cmd_set_viewport(&self, command_buffer: NativeCommandBuffer, viewport: &Viewport) {
        let viewports = [vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        }];
        unsafe { self.device().cmd_set_viewport(vk_handle(command_buffer.0), 0, &viewports) };
    }

    fn cmd_set_scissor(&self, command_buffer: NativeCommandBuffer, scissor: &Rect2D) {
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D { width: scissor.width, height: scissor.height },
        }];
        unsafe { self.device().cmd_set_scissor(vk_handle(command_buffer.0), 0, &scissors) };
    }

    fn cmd_transition_image(&self, command_buffer: NativeCommandBuffer, transition: &ImageTransition) {
        let aspect = if transition.depth {
            self.memory
                .image_format(transition.image)
                .map_or(vk::ImageAspectFlags::DEPTH, aspect_mask)
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let (src_stage, src_access) = layout_scope(transition.old_layout);
        let (dst_stage, dst_access) = layout_scope(transition.new_layout);

        let barriers = [vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(image_layout_to_vk(transition.old_layout))
            .new_layout(image_layout_to_vk(transition.new_layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(vk_handle(transition.image.0))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            })];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device().cmd_pipeline_barrier2(vk_handle(command_buffer.0), &dependency) };
    }

    fn cmd_begin_rendering(&self, command_buffer: NativeCommandBuffer, info: &RenderingInfo) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = info
            .color_view
            .iter()
            .map(|view| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(vk_handle(view.0))
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue { float32: info.clear_color },
                    })
            })
            .collect();
        let depth_attachment = info.depth_view.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(vk_handle(view.0))
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: info.clear_depth, stencil: 0 },
                })
        });
        // Pipelines built for a stencil format expect the same view bound as stencil
        let has_stencil = info
            .depth_view
            .and_then(|view| self.memory.view_format(view))
            .is_some_and(|format| format.has_stencil());

        let mut rendering = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width: info.width, height: info.height },
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering = rendering.depth_attachment(depth);
            if has_stencil {
                rendering = rendering.stencil_attachment(depth);
            }
        }
        unsafe { self.device().cmd_begin_rendering(vk_handle(command_buffer.0), &rendering) };
    }

    fn cmd_end_rendering(&self, command_buffer: NativeCommandBuffer) {
        unsafe { self.device().cmd_end_rendering(vk_handle(command_buffer.0)) };
    }

    fn cmd_bind_pipeline(&self, command_buffer: NativeCommandBuffer, bind_point: PipelineBindPoint, pipeline: NativePipeline) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(vk_handle(command_buffer.0), bind_point_to_vk(bind_point), vk_handle(pipeline.0))
        };
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: NativeCommandBuffer,
        bind_point: PipelineBindPoint,
        layout: NativePipelineLayout,
        first_set: u32,
        sets: &[NativeDescriptorSet],
    ) {
        let vk_sets: Vec<vk::DescriptorSet> = sets.iter().map(|s| vk_handle(s.0)).collect();
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                vk_handle(command_buffer.0),
                bind_point_to_vk(bind_point),
                vk_handle(layout.0),
                first_set,
                &vk_sets,
                &[],
            )
        };
    }

    fn cmd_copy_buffer(&self, command_buffer: NativeCommandBuffer, src: NativeBuffer, dst: NativeBuffer, regions: &[BufferCopy]) {
        let vk_regions: Vec<vk::BufferCopy> = regions
            .iter()
            .map(|r| vk::BufferCopy { src_offset: r.src_offset, dst_offset: r.dst_offset, size: r.size })
            .collect();
        unsafe {
            self.device()
                .cmd_copy_buffer(vk_handle(command_buffer.0), vk_handle(src.0), vk_handle(dst.0), &vk_regions)
        };
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeImage,
        regions: &[BufferImageCopy],
    ) {
        // A copy writes one aspect; depth formats take the depth plane
        let aspect = match self.memory.image_format(dst) {
            Some(format) if format.is_depth() => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        };
        let vk_regions: Vec<vk::BufferImageCopy> = regions
            .iter()
            .map(|r| vk::BufferImageCopy {
                buffer_offset: r.buffer_offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: r.mip_level,
                    base_array_layer: r.array_layer,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: r.x, y: r.y, z: 0 },
                image_extent: vk::Extent3D { width: r.width, height: r.height, depth: 1 },
            })
            .collect();
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                vk_handle(command_buffer.0),
                vk_handle(src.0),
                vk_handle(dst.0),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk_regions,
            )
        };
    }

    fn cmd_push_constants(
        &self,
        command_buffer: NativeCommandBuffer,
        layout: NativePipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device().cmd_push_constants(
                vk_handle(command_buffer.0),
                vk_handle(layout.0),
                stage_flags_to_vk(stages),
                offset,
                data,
            )
        };
    }

    fn cmd_bind_vertex_buffers(&self, command_buffer: NativeCommandBuffer, first_binding: u32, buffers: &[(NativeBuffer, u64)]) {
        let (vk_buffers, offsets): (Vec<vk::Buffer>, Vec<u64>) =
            buffers.iter().map(|(buffer, offset)| (vk_handle::<vk::Buffer>(buffer.0), *offset)).unzip();
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(vk_handle(command_buffer.0), first_binding, &vk_buffers, &offsets)
        };
    }

    fn cmd_bind_index_buffer(&self, command_buffer: NativeCommandBuffer, buffer: NativeBuffer, offset: u64, index_type: IndexType) {
        unsafe {
            self.device().cmd_bind_index_buffer(
                vk_handle(command_buffer.0),
                vk_handle(buffer.0),
                offset,
                index_type_to_vk(index_type),
            )
        };
    }

    fn cmd_draw(
        &self,
        command_buffer: NativeCommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device().cmd_draw(vk_handle(command_buffer.0), vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device().cmd_draw_indexed(
                vk_handle(command_buffer.0),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn cmd_dispatch(&self, command_buffer: NativeCommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.device().cmd_dispatch(vk_handle(command_buffer.0), x, y, z) };
    }

    fn cmd_trace_rays(
        &self,
        command_buffer: NativeCommandBuffer,
        regions: &ShaderBindingRegions,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        let Some(ray_tracing) = self.ctx.ray_tracing.as_ref() else {
            engine_error!(SOURCE, "cmd_trace_rays recorded on a device without ray tracing");
            return;
        };
        unsafe {
            ray_tracing.cmd_trace_rays(
                vk_handle(command_buffer.0),
                &strided_region_to_vk(&regions.ray_gen),
                &strided_region_to_vk(&regions.miss),
                &strided_region_to_vk(&regions.hit),
                &strided_region_to_vk(&regions.callable),
                width,
                height,
                depth,
            )
        };
    }

    fn submit_frame(&self, submit: &FrameSubmit) -> Result<()> {
        let waits: Vec<vk::SemaphoreSubmitInfo> = submit
            .wait_semaphore
            .iter()
            .map(|s| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(vk_handle(s.0))
                    .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            })
            .collect();
        let mut signals: Vec<vk::SemaphoreSubmitInfo> = submit
            .signal_semaphore
            .iter()
            .map(|s| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(vk_handle(s.0))
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            })
            .collect();
        signals.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(vk_handle(submit.timeline.0))
                .value(submit.timeline_value)
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS),
        );
        let command_buffers =
            [vk::CommandBufferSubmitInfo::default().command_buffer(vk_handle(submit.command_buffer.0))];

        let info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signals);

        let _queue = lock(&self.ctx.queue_lock);
        unsafe {
            self.device()
                .queue_submit2(self.ctx.graphics_queue, std::slice::from_ref(&info), vk::Fence::null())
        }
        .map_err(|e| vk_error("submit frame", e))
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, sizes: &DescriptorPoolSizes) -> Result<NativeDescriptorPool> {
        vulkan_descriptor::create_pool(&self.ctx, sizes)
    }

    fn destroy_descriptor_pool(&self, pool: NativeDescriptorPool) {
        unsafe { self.device().destroy_descriptor_pool(vk_handle(pool.0), None) };
    }

    fn reset_descriptor_pool(&self, pool: NativeDescriptorPool) -> Result<()> {
        unsafe {
            self.device()
                .reset_descriptor_pool(vk_handle(pool.0), vk::DescriptorPoolResetFlags::empty())
        }
        .map_err(|e| vk_error("reset descriptor pool", e))
    }

    fn allocate_descriptor_set(
        &self,
        pool: NativeDescriptorPool,
        layout: NativeDescriptorSetLayout,
    ) -> Result<NativeDescriptorSet> {
        vulkan_descriptor::allocate_set(&self.ctx, pool, layout)
    }

    fn write_descriptors(&self, set: NativeDescriptorSet, writes: &[DescriptorWrite]) {
        vulkan_descriptor::write_descriptors(&self.ctx, set, writes);
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
        flags: DescriptorSetLayoutCreateFlags,
        debug_name: &str,
    ) -> Result<NativeDescriptorSetLayout> {
        vulkan_descriptor::create_set_layout(&self.ctx, bindings, flags, debug_name)
    }

    fn destroy_descriptor_set_layout(&self, layout: NativeDescriptorSetLayout) {
        unsafe { self.device().destroy_descriptor_set_layout(vk_handle(layout.0), None) };
    }

    // ===== SHADERS & PIPELINES =====

    fn create_shader_module(&self, code: &[u32], debug_name: &str) -> Result<NativeShaderModule> {
        vulkan_pipeline::create_shader_module(&self.ctx, code, debug_name)
    }

    fn destroy_shader_module(&self, module: NativeShaderModule) {
        unsafe { self.device().destroy_shader_module(vk_handle(module.0), None) };
    }

    fn reflect_shader(&self, code: &[u32], stage: ShaderStageFlags) -> Result<ShaderReflection> {
        vulkan_reflection::reflect_spirv(code, stage)
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[NativeDescriptorSetLayout],
        push_constants: &[PushConstantRange],
    ) -> Result<NativePipelineLayout> {
        vulkan_pipeline::create_pipeline_layout(&self.ctx, set_layouts, push_constants)
    }

    fn destroy_pipeline_layout(&self, layout: NativePipelineLayout) {
        unsafe { self.device().destroy_pipeline_layout(vk_handle(layout.0), None) };
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<NativePipeline> {
        vulkan_pipeline::create_graphics_pipeline(&self.ctx, desc)
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<NativePipeline> {
        vulkan_pipeline::create_compute_pipeline(&self.ctx, desc)
    }

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<NativePipeline> {
        vulkan_pipeline::create_ray_tracing_pipeline(&self.ctx, desc)
    }

    fn destroy_pipeline(&self, pipeline: NativePipeline) {
        unsafe { self.device().destroy_pipeline(vk_handle(pipeline.0), None) };
    }

    fn ray_tracing_properties(&self) -> Option<RayTracingProperties> {
        let caps = &self.ctx.capabilities;
        caps.ray_tracing.then(|| RayTracingProperties {
            shader_group_handle_size: caps.shader_group_handle_size,
            shader_group_handle_alignment: caps.shader_group_handle_alignment,
            shader_group_base_alignment: caps.shader_group_base_alignment,
            max_recursion_depth: caps.max_ray_recursion_depth,
        })
    }

    fn ray_tracing_group_handles(&self, pipeline: NativePipeline, group_count: u32) -> Result<Vec<u8>> {
        let Some(ray_tracing) = self.ctx.ray_tracing.as_ref() else {
            engine_error!(SOURCE, "Shader group handles requested on a device without ray tracing");
            return Err(Error::InvalidOperation("ray tracing is not supported by this device".to_string()));
        };
        let data_size = group_count as usize * self.ctx.capabilities.shader_group_handle_size as usize;
        unsafe { ray_tracing.get_ray_tracing_shader_group_handles(vk_handle(pipeline.0), 0, group_count, data_size) }
            .map_err(|e| vk_error("get shader group handles", e))
    }
}
