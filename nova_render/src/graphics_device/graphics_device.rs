/// GraphicsDevice trait - the seam between the core and a GPU backend
///
/// The frame scheduler, memory manager and pipeline builders only ever talk
/// to the GPU through this trait. Methods take `&self`; a backend keeps any
/// mutable bookkeeping (allocator, swapchain) behind its own locks.

use std::time::Duration;
use crate::error::Result;
use crate::graphics_device::{
    NativeBuffer, NativeImage, NativeSampler, NativeSemaphore,
    NativeFence, NativeCommandBuffer, NativeDescriptorPool, NativeDescriptorSet,
    NativeDescriptorSetLayout, NativePipelineLayout, NativePipeline, NativeShaderModule,
    MappedPtr,
    BufferDesc, BufferAllocation, ImageDesc, ImageAllocation, SamplerDesc,
    ShaderStageFlags, LayoutBinding, PushConstantRange, DescriptorSetLayoutCreateFlags,
    DescriptorWrite, PipelineBindPoint,
    PresentMode, SwapchainInfo, AcquireOutcome, PresentOutcome, WaitStatus,
    FrameSubmit, ImageTransition, RenderingInfo, Viewport, Rect2D,
    BufferCopy, BufferImageCopy, IndexType, RayTracingProperties, ShaderBindingRegions,
};
use crate::config::DescriptorPoolSizes;
use crate::shader::ShaderReflection;
use crate::pipeline::{GraphicsPipelineDesc, ComputePipelineDesc, RayTracingPipelineDesc};

/// GPU backend interface
pub trait GraphicsDevice: Send + Sync {
    // ===== MEMORY =====

    /// Create a buffer and bind memory matching `desc.memory`
    ///
    /// Returns `Error::OutOfMemory` when no heap can satisfy the request.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferAllocation>;

    /// Destroy a buffer and free its memory
    fn destroy_buffer(&self, buffer: NativeBuffer);

    /// Map a host-visible buffer
    fn map_buffer(&self, buffer: NativeBuffer) -> Result<MappedPtr>;

    /// Unmap a buffer mapped with `map_buffer`
    fn unmap_buffer(&self, buffer: NativeBuffer);

    /// GPU virtual address of a buffer created with `SHADER_DEVICE_ADDRESS`
    fn buffer_device_address(&self, buffer: NativeBuffer) -> Result<u64>;

    /// Create an image with a default view
    fn create_image(&self, desc: &ImageDesc) -> Result<ImageAllocation>;

    /// Destroy an image, its default view and its memory
    fn destroy_image(&self, image: NativeImage);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<NativeSampler>;
    fn destroy_sampler(&self, sampler: NativeSampler);

    // ===== SYNCHRONIZATION =====

    /// Create a timeline semaphore starting at `initial_value`
    fn create_timeline_semaphore(&self, initial_value: u64) -> Result<NativeSemaphore>;

    /// Block until the timeline reaches `value` or `timeout` elapses
    fn wait_timeline(&self, semaphore: NativeSemaphore, value: u64, timeout: Duration) -> Result<WaitStatus>;

    /// Current counter value of a timeline semaphore
    fn timeline_value(&self, semaphore: NativeSemaphore) -> Result<u64>;

    /// Create a binary semaphore
    fn create_semaphore(&self) -> Result<NativeSemaphore>;
    fn destroy_semaphore(&self, semaphore: NativeSemaphore);

    fn create_fence(&self, signaled: bool) -> Result<NativeFence>;
    fn destroy_fence(&self, fence: NativeFence);
    fn wait_fence(&self, fence: NativeFence, timeout: Duration) -> Result<WaitStatus>;
    fn reset_fence(&self, fence: NativeFence) -> Result<()>;

    /// Block until every queue is idle
    fn wait_idle(&self) -> Result<()>;

    // ===== SWAPCHAIN =====

    /// Create the swapchain, or recreate it (retiring the previous one)
    fn create_swapchain(&self, width: u32, height: u32, present_mode: PresentMode) -> Result<SwapchainInfo>;

    /// Acquire the next presentable image, signalling `semaphore` and `fence`
    fn acquire_next_image(
        &self,
        semaphore: NativeSemaphore,
        fence: NativeFence,
        timeout: Duration,
    ) -> Result<AcquireOutcome>;

    /// Queue `image_index` for presentation after `wait_semaphore`
    fn present(&self, image_index: u32, wait_semaphore: NativeSemaphore) -> Result<PresentOutcome>;

    // ===== COMMAND RECORDING =====

    fn allocate_command_buffer(&self) -> Result<NativeCommandBuffer>;
    fn free_command_buffer(&self, command_buffer: NativeCommandBuffer);

    /// Reset and begin a one-time-submit recording
    fn begin_command_buffer(&self, command_buffer: NativeCommandBuffer) -> Result<()>;
    fn end_command_buffer(&self, command_buffer: NativeCommandBuffer) -> Result<()>;

    fn cmd_set_viewport(&self, command_buffer: NativeCommandBuffer, viewport: &Viewport);
    fn cmd_set_scissor(&self, command_buffer: NativeCommandBuffer, scissor: &Rect2D);
    fn cmd_transition_image(&self, command_buffer: NativeCommandBuffer, transition: &ImageTransition);
    fn cmd_begin_rendering(&self, command_buffer: NativeCommandBuffer, info: &RenderingInfo);
    fn cmd_end_rendering(&self, command_buffer: NativeCommandBuffer);

    fn cmd_bind_pipeline(
        &self,
        command_buffer: NativeCommandBuffer,
        bind_point: PipelineBindPoint,
        pipeline: NativePipeline,
    );

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: NativeCommandBuffer,
        bind_point: PipelineBindPoint,
        layout: NativePipelineLayout,
        first_set: u32,
        sets: &[NativeDescriptorSet],
    );

    /// Copy between buffers; `dst` needs `TRANSFER_DST` usage
    fn cmd_copy_buffer(
        &self,
        command_buffer: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeBuffer,
        regions: &[BufferCopy],
    );

    /// Copy packed texels from a buffer into an image in `TransferDst` layout
    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeImage,
        regions: &[BufferImageCopy],
    );

    /// Write `data` into the push-constant block at `offset`
    fn cmd_push_constants(
        &self,
        command_buffer: NativeCommandBuffer,
        layout: NativePipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );

    /// Bind `(buffer, offset)` pairs to consecutive vertex input bindings
    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: NativeCommandBuffer,
        first_binding: u32,
        buffers: &[(NativeBuffer, u64)],
    );

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
        index_type: IndexType,
    );

    fn cmd_draw(
        &self,
        command_buffer: NativeCommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    fn cmd_dispatch(&self, command_buffer: NativeCommandBuffer, x: u32, y: u32, z: u32);

    /// Launch `width` x `height` x `depth` rays through the bound ray-tracing pipeline
    fn cmd_trace_rays(
        &self,
        command_buffer: NativeCommandBuffer,
        regions: &ShaderBindingRegions,
        width: u32,
        height: u32,
        depth: u32,
    );

    /// Submit a frame: wait the acquire semaphore, signal present + timeline
    fn submit_frame(&self, submit: &FrameSubmit) -> Result<()>;

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, sizes: &DescriptorPoolSizes) -> Result<NativeDescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: NativeDescriptorPool);

    /// Return every set allocated from `pool` to it
    fn reset_descriptor_pool(&self, pool: NativeDescriptorPool) -> Result<()>;

    fn allocate_descriptor_set(
        &self,
        pool: NativeDescriptorPool,
        layout: NativeDescriptorSetLayout,
    ) -> Result<NativeDescriptorSet>;

    fn write_descriptors(&self, set: NativeDescriptorSet, writes: &[DescriptorWrite]);

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
        flags: DescriptorSetLayoutCreateFlags,
        debug_name: &str,
    ) -> Result<NativeDescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: NativeDescriptorSetLayout);

    // ===== SHADERS & PIPELINES =====

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32], debug_name: &str) -> Result<NativeShaderModule>;
    fn destroy_shader_module(&self, module: NativeShaderModule);

    /// Recover bindings and push-constant ranges from a shader binary
    fn reflect_shader(&self, code: &[u32], stage: ShaderStageFlags) -> Result<ShaderReflection>;

    fn create_pipeline_layout(
        &self,
        set_layouts: &[NativeDescriptorSetLayout],
        push_constants: &[PushConstantRange],
    ) -> Result<NativePipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: NativePipelineLayout);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<NativePipeline>;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<NativePipeline>;
    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<NativePipeline>;
    fn destroy_pipeline(&self, pipeline: NativePipeline);

    /// Handle layout limits, `None` when ray tracing is unavailable
    fn ray_tracing_properties(&self) -> Option<RayTracingProperties>;

    /// Opaque handles of the first `group_count` groups of a ray-tracing
    /// pipeline, `shader_group_handle_size` bytes each, in group order
    fn ray_tracing_group_handles(&self, pipeline: NativePipeline, group_count: u32) -> Result<Vec<u8>>;
}
