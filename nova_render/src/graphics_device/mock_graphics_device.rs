/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Hands out monotonically increasing handles, records every call by name
/// and keeps enough state (live objects, buffer bytes, timeline values,
/// swapchain images) for the scheduler, memory manager and builders to be
/// tested end to end. GPU work completes at submit time unless the device
/// is stalled.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use rustc_hash::FxHashMap;

use crate::config::DescriptorPoolSizes;
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice,
    NativeBuffer, NativeImage, NativeImageView, NativeSampler, NativeSemaphore,
    NativeFence, NativeCommandBuffer, NativeDescriptorPool, NativeDescriptorSet,
    NativeDescriptorSetLayout, NativePipelineLayout, NativePipeline, NativeShaderModule,
    MappedPtr,
    BufferDesc, BufferAllocation, ImageDesc, ImageAllocation, SamplerDesc, MemoryProperties,
    ShaderStageFlags, LayoutBinding, PushConstantRange, DescriptorSetLayoutCreateFlags,
    DescriptorWrite, PipelineBindPoint, Format,
    PresentMode, SwapchainImage, SwapchainInfo, AcquireOutcome, PresentOutcome, WaitStatus,
    FrameSubmit, ImageTransition, RenderingInfo, Viewport, Rect2D,
    BufferCopy, BufferImageCopy, IndexType, RayTracingProperties, ShaderBindingRegions,
};
use crate::pipeline::{GraphicsPipelineDesc, ComputePipelineDesc, RayTracingPipelineDesc};
use crate::shader::ShaderReflection;

// ============================================================================
// Recorded state
// ============================================================================

struct MockBuffer {
    data: Box<[u8]>,
    memory: MemoryProperties,
}

/// A recorded `cmd_bind_descriptor_sets` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBind {
    pub bind_point: PipelineBindPoint,
    pub layout: NativePipelineLayout,
    pub first_set: u32,
    pub sets: Vec<NativeDescriptorSet>,
}

/// A recorded `cmd_push_constants` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPushConstants {
    pub layout: NativePipelineLayout,
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    calls: Vec<String>,

    /// Every live object: handle -> kind
    live: FxHashMap<u64, &'static str>,
    buffers: FxHashMap<u64, MockBuffer>,
    destroyed_buffers: Vec<NativeBuffer>,
    destroyed_images: Vec<NativeImage>,

    memory_budget: Option<u64>,
    bytes_in_use: u64,

    timelines: FxHashMap<u64, u64>,
    gpu_stalled: bool,
    pending_signals: Vec<(NativeSemaphore, u64)>,
    submits: Vec<FrameSubmit>,

    swapchain_image_count: u32,
    swapchain_images: Vec<SwapchainImage>,
    swapchain_extent: (u32, u32),
    next_image_index: u32,
    acquire_outcomes: VecDeque<AcquireOutcome>,
    present_outcomes: VecDeque<PresentOutcome>,

    reflections: Vec<(Vec<u32>, ShaderReflection)>,
    set_layouts: FxHashMap<u64, Vec<LayoutBinding>>,
    pipeline_layouts: FxHashMap<u64, (Vec<NativeDescriptorSetLayout>, Vec<PushConstantRange>)>,
    graphics_pipelines: Vec<GraphicsPipelineDesc>,
    compute_pipelines: Vec<ComputePipelineDesc>,
    ray_tracing_pipelines: Vec<RayTracingPipelineDesc>,
    descriptor_writes: Vec<(NativeDescriptorSet, DescriptorWrite)>,
    allocated_set_layouts: Vec<NativeDescriptorSetLayout>,
    descriptor_binds: Vec<RecordedBind>,
    transitions: Vec<ImageTransition>,
    viewports: Vec<Viewport>,
    image_copies: Vec<(NativeBuffer, NativeImage, BufferImageCopy)>,
    push_constants: Vec<RecordedPushConstants>,
    trace_rays: Vec<(ShaderBindingRegions, [u32; 3])>,

    ray_tracing: Option<RayTracingProperties>,
    /// Ray-tracing pipeline handle -> group count
    ray_tracing_groups: FxHashMap<u64, u32>,
}

impl MockState {
    fn create(&mut self, kind: &'static str) -> u64 {
        self.next_handle += 1;
        let handle = self.next_handle;
        self.live.insert(handle, kind);
        handle
    }

    fn destroy(&mut self, handle: u64, kind: &'static str) {
        match self.live.remove(&handle) {
            Some(found) => assert_eq!(found, kind, "handle {} destroyed as the wrong kind", handle),
            None => panic!("{} {} destroyed twice or never created", kind, handle),
        }
    }

    fn record(&mut self, call: impl Into<String>) {
        self.calls.push(call.into());
    }
}

// ============================================================================
// Mock device
// ============================================================================

pub struct MockGraphicsDevice {
    state: Mutex<MockState>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                swapchain_image_count: 3,
                ..MockState::default()
            }),
        }
    }

    // ===== CONFIGURATION =====

    /// Fail allocations once `bytes` would be exceeded
    pub fn set_memory_budget(&self, bytes: Option<u64>) {
        self.state.lock().unwrap().memory_budget = bytes;
    }

    /// Stop completing submitted work until `complete_gpu_work`
    pub fn set_gpu_stalled(&self, stalled: bool) {
        self.state.lock().unwrap().gpu_stalled = stalled;
    }

    /// Signal every pending timeline value
    pub fn complete_gpu_work(&self) {
        let mut state = self.state.lock().unwrap();
        let pending = std::mem::take(&mut state.pending_signals);
        for (semaphore, value) in pending {
            let current = state.timelines.entry(semaphore.0).or_insert(0);
            *current = (*current).max(value);
        }
    }

    pub fn set_swapchain_image_count(&self, count: u32) {
        self.state.lock().unwrap().swapchain_image_count = count;
    }

    pub fn queue_acquire_outcome(&self, outcome: AcquireOutcome) {
        self.state.lock().unwrap().acquire_outcomes.push_back(outcome);
    }

    pub fn queue_present_outcome(&self, outcome: PresentOutcome) {
        self.state.lock().unwrap().present_outcomes.push_back(outcome);
    }

    /// Report ray-tracing support with the given handle layout
    pub fn set_ray_tracing_properties(&self, properties: Option<RayTracingProperties>) {
        self.state.lock().unwrap().ray_tracing = properties;
    }

    /// Reflection returned for a shader binary equal to `code`
    pub fn register_reflection(&self, code: &[u32], reflection: ShaderReflection) {
        self.state.lock().unwrap().reflections.push((code.to_vec(), reflection));
    }

    // ===== INSPECTION =====

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Whether the object behind a raw handle is still alive
    pub fn is_live(&self, handle: u64) -> bool {
        self.state.lock().unwrap().live.contains_key(&handle)
    }

    /// Number of live objects of a kind ("buffer", "image", "pipeline", ...)
    pub fn live_count(&self, kind: &str) -> usize {
        self.state.lock().unwrap().live.values().filter(|k| **k == kind).count()
    }

    pub fn destroyed_buffers(&self) -> Vec<NativeBuffer> {
        self.state.lock().unwrap().destroyed_buffers.clone()
    }

    pub fn destroyed_images(&self) -> Vec<NativeImage> {
        self.state.lock().unwrap().destroyed_images.clone()
    }

    /// Current contents of a live buffer
    pub fn buffer_bytes(&self, buffer: NativeBuffer) -> Option<Vec<u8>> {
        self.state.lock().unwrap().buffers.get(&buffer.0).map(|b| b.data.to_vec())
    }

    pub fn submits(&self) -> Vec<FrameSubmit> {
        self.state.lock().unwrap().submits.clone()
    }

    pub fn swapchain_extent(&self) -> (u32, u32) {
        self.state.lock().unwrap().swapchain_extent
    }

    pub fn set_layout_bindings(&self, layout: NativeDescriptorSetLayout) -> Option<Vec<LayoutBinding>> {
        self.state.lock().unwrap().set_layouts.get(&layout.0).cloned()
    }

    pub fn pipeline_layout(
        &self,
        layout: NativePipelineLayout,
    ) -> Option<(Vec<NativeDescriptorSetLayout>, Vec<PushConstantRange>)> {
        self.state.lock().unwrap().pipeline_layouts.get(&layout.0).cloned()
    }

    pub fn graphics_pipelines(&self) -> Vec<GraphicsPipelineDesc> {
        self.state.lock().unwrap().graphics_pipelines.clone()
    }

    pub fn compute_pipelines(&self) -> Vec<ComputePipelineDesc> {
        self.state.lock().unwrap().compute_pipelines.clone()
    }

    pub fn ray_tracing_pipelines(&self) -> Vec<RayTracingPipelineDesc> {
        self.state.lock().unwrap().ray_tracing_pipelines.clone()
    }

    pub fn descriptor_writes(&self) -> Vec<(NativeDescriptorSet, DescriptorWrite)> {
        self.state.lock().unwrap().descriptor_writes.clone()
    }

    /// Layout of every set allocated so far, in allocation order
    pub fn allocated_set_layouts(&self) -> Vec<NativeDescriptorSetLayout> {
        self.state.lock().unwrap().allocated_set_layouts.clone()
    }

    pub fn descriptor_binds(&self) -> Vec<RecordedBind> {
        self.state.lock().unwrap().descriptor_binds.clone()
    }

    pub fn transitions(&self) -> Vec<ImageTransition> {
        self.state.lock().unwrap().transitions.clone()
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.state.lock().unwrap().viewports.clone()
    }

    pub fn image_copies(&self) -> Vec<(NativeBuffer, NativeImage, BufferImageCopy)> {
        self.state.lock().unwrap().image_copies.clone()
    }

    pub fn push_constants(&self) -> Vec<RecordedPushConstants> {
        self.state.lock().unwrap().push_constants.clone()
    }

    /// Regions and launch size of every recorded trace
    pub fn trace_rays(&self) -> Vec<(ShaderBindingRegions, [u32; 3])> {
        self.state.lock().unwrap().trace_rays.clone()
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    // ===== MEMORY =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferAllocation> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_buffer:{}", desc.debug_name));

        if let Some(budget) = state.memory_budget {
            if state.bytes_in_use + desc.size > budget {
                return Err(Error::OutOfMemory);
            }
        }

        let handle = state.create("buffer");
        state.bytes_in_use += desc.size;
        let mut data = vec![0u8; desc.size as usize].into_boxed_slice();
        let mapped = if desc.memory.contains(MemoryProperties::HOST_COHERENT) {
            MappedPtr::new(data.as_mut_ptr())
        } else {
            None
        };
        state.buffers.insert(handle, MockBuffer { data, memory: desc.memory });

        Ok(BufferAllocation { buffer: NativeBuffer(handle), mapped })
    }

    fn destroy_buffer(&self, buffer: NativeBuffer) {
        let mut state = self.state.lock().unwrap();
        state.record("destroy_buffer");
        state.destroy(buffer.0, "buffer");
        if let Some(removed) = state.buffers.remove(&buffer.0) {
            state.bytes_in_use -= removed.data.len() as u64;
        }
        state.destroyed_buffers.push(buffer);
    }

    fn map_buffer(&self, buffer: NativeBuffer) -> Result<MappedPtr> {
        let mut state = self.state.lock().unwrap();
        state.record("map_buffer");
        let record = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| Error::InvalidResource("unknown buffer".to_string()))?;
        if !record.memory.contains(MemoryProperties::HOST_VISIBLE) {
            return Err(Error::InvalidResource("buffer is not host-visible".to_string()));
        }
        MappedPtr::new(record.data.as_mut_ptr())
            .ok_or_else(|| Error::InvalidResource("zero-sized buffer".to_string()))
    }

    fn unmap_buffer(&self, _buffer: NativeBuffer) {
        self.state.lock().unwrap().record("unmap_buffer");
    }

    fn buffer_device_address(&self, buffer: NativeBuffer) -> Result<u64> {
        Ok(0x1_0000_0000 + buffer.0 * 0x1000)
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageAllocation> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_image:{}x{}", desc.width, desc.height));

        let bytes = desc.width as u64 * desc.height as u64 * 4;
        if let Some(budget) = state.memory_budget {
            if state.bytes_in_use + bytes > budget {
                return Err(Error::OutOfMemory);
            }
        }

        let image = state.create("image");
        let view = state.create("image_view");
        Ok(ImageAllocation { image: NativeImage(image), view: NativeImageView(view) })
    }

    fn destroy_image(&self, image: NativeImage) {
        let mut state = self.state.lock().unwrap();
        state.record("destroy_image");
        state.destroy(image.0, "image");
        // The default view is always created right after its image
        state.destroy(image.0 + 1, "image_view");
        state.destroyed_images.push(image);
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<NativeSampler> {
        let mut state = self.state.lock().unwrap();
        state.record("create_sampler");
        Ok(NativeSampler(state.create("sampler")))
    }

    fn destroy_sampler(&self, sampler: NativeSampler) {
        self.state.lock().unwrap().destroy(sampler.0, "sampler");
    }

    // ===== SYNCHRONIZATION =====

    fn create_timeline_semaphore(&self, initial_value: u64) -> Result<NativeSemaphore> {
        let mut state = self.state.lock().unwrap();
        let handle = state.create("semaphore");
        state.timelines.insert(handle, initial_value);
        Ok(NativeSemaphore(handle))
    }

    fn wait_timeline(&self, semaphore: NativeSemaphore, value: u64, _timeout: Duration) -> Result<WaitStatus> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("wait_timeline:{}", value));
        let current = state.timelines.get(&semaphore.0).copied().unwrap_or(0);
        Ok(if current >= value { WaitStatus::Signaled } else { WaitStatus::TimedOut })
    }

    fn timeline_value(&self, semaphore: NativeSemaphore) -> Result<u64> {
        let state = self.state.lock().unwrap();
        state
            .timelines
            .get(&semaphore.0)
            .copied()
            .ok_or_else(|| Error::InvalidResource("not a timeline semaphore".to_string()))
    }

    fn create_semaphore(&self) -> Result<NativeSemaphore> {
        Ok(NativeSemaphore(self.state.lock().unwrap().create("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: NativeSemaphore) {
        let mut state = self.state.lock().unwrap();
        state.destroy(semaphore.0, "semaphore");
        state.timelines.remove(&semaphore.0);
    }

    fn create_fence(&self, _signaled: bool) -> Result<NativeFence> {
        Ok(NativeFence(self.state.lock().unwrap().create("fence")))
    }

    fn destroy_fence(&self, fence: NativeFence) {
        self.state.lock().unwrap().destroy(fence.0, "fence");
    }

    fn wait_fence(&self, _fence: NativeFence, _timeout: Duration) -> Result<WaitStatus> {
        self.state.lock().unwrap().record("wait_fence");
        Ok(WaitStatus::Signaled)
    }

    fn reset_fence(&self, _fence: NativeFence) -> Result<()> {
        self.state.lock().unwrap().record("reset_fence");
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.state.lock().unwrap().record("wait_idle");
        Ok(())
    }

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, width: u32, height: u32, _present_mode: PresentMode) -> Result<SwapchainInfo> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_swapchain:{}x{}", width, height));

        let old = std::mem::take(&mut state.swapchain_images);
        for image in old {
            state.destroy(image.view.0, "swapchain_view");
            state.destroy(image.image.0, "swapchain_image");
        }

        let count = state.swapchain_image_count;
        let images: Vec<SwapchainImage> = (0..count)
            .map(|_| SwapchainImage {
                image: NativeImage(state.create("swapchain_image")),
                view: NativeImageView(state.create("swapchain_view")),
            })
            .collect();
        state.swapchain_images = images.clone();
        state.swapchain_extent = (width, height);
        state.next_image_index = 0;

        Ok(SwapchainInfo { format: Format::B8G8R8A8_SRGB, width, height, images })
    }

    fn acquire_next_image(
        &self,
        _semaphore: NativeSemaphore,
        _fence: NativeFence,
        _timeout: Duration,
    ) -> Result<AcquireOutcome> {
        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = state.acquire_outcomes.pop_front() {
            state.record(format!("acquire:{:?}", outcome));
            return Ok(outcome);
        }
        let index = state.next_image_index;
        state.next_image_index = (index + 1) % state.swapchain_images.len().max(1) as u32;
        state.record(format!("acquire:{}", index));
        Ok(AcquireOutcome::Acquired { index, suboptimal: false })
    }

    fn present(&self, image_index: u32, _wait_semaphore: NativeSemaphore) -> Result<PresentOutcome> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("present:{}", image_index));
        Ok(state.present_outcomes.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    // ===== COMMAND RECORDING =====

    fn allocate_command_buffer(&self) -> Result<NativeCommandBuffer> {
        Ok(NativeCommandBuffer(self.state.lock().unwrap().create("command_buffer")))
    }

    fn free_command_buffer(&self, command_buffer: NativeCommandBuffer) {
        self.state.lock().unwrap().destroy(command_buffer.0, "command_buffer");
    }

    fn begin_command_buffer(&self, _command_buffer: NativeCommandBuffer) -> Result<()> {
        self.state.lock().unwrap().record("begin_command_buffer");
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: NativeCommandBuffer) -> Result<()> {
        self.state.lock().unwrap().record("end_command_buffer");
        Ok(())
    }

    fn cmd_set_viewport(&self, _command_buffer: NativeCommandBuffer, viewport: &Viewport) {
        let mut state = self.state.lock().unwrap();
        state.record("cmd_set_viewport");
        state.viewports.push(*viewport);
    }

    fn cmd_set_scissor(&self, _command_buffer: NativeCommandBuffer, _scissor: &Rect2D) {
        self.state.lock().unwrap().record("cmd_set_scissor");
    }

    fn cmd_transition_image(&self, _command_buffer: NativeCommandBuffer, transition: &ImageTransition) {
        let mut state = self.state.lock().unwrap();
        state.record(format!("cmd_transition_image:{:?}", transition.new_layout));
        state.transitions.push(*transition);
    }

    fn cmd_begin_rendering(&self, _command_buffer: NativeCommandBuffer, _info: &RenderingInfo) {
        self.state.lock().unwrap().record("cmd_begin_rendering");
    }

    fn cmd_end_rendering(&self, _command_buffer: NativeCommandBuffer) {
        self.state.lock().unwrap().record("cmd_end_rendering");
    }

    fn cmd_bind_pipeline(
        &self,
        _command_buffer: NativeCommandBuffer,
        bind_point: PipelineBindPoint,
        _pipeline: NativePipeline,
    ) {
        self.state.lock().unwrap().record(format!("cmd_bind_pipeline:{:?}", bind_point));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _command_buffer: NativeCommandBuffer,
        bind_point: PipelineBindPoint,
        layout: NativePipelineLayout,
        first_set: u32,
        sets: &[NativeDescriptorSet],
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(format!("cmd_bind_descriptor_sets:{}+{}", first_set, sets.len()));
        state.descriptor_binds.push(RecordedBind {
            bind_point,
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    /// Copies land at record time so uploads can be checked on the destination
    fn cmd_copy_buffer(
        &self,
        _command_buffer: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeBuffer,
        regions: &[BufferCopy],
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(format!("cmd_copy_buffer:{}", regions.len()));
        for region in regions {
            let (from, to) = (region.src_offset as usize, region.dst_offset as usize);
            let len = region.size as usize;
            let bytes = state.buffers[&src.0].data[from..from + len].to_vec();
            let target = state.buffers.get_mut(&dst.0).unwrap();
            target.data[to..to + len].copy_from_slice(&bytes);
        }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _command_buffer: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeImage,
        regions: &[BufferImageCopy],
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(format!("cmd_copy_buffer_to_image:{}", regions.len()));
        state.image_copies.extend(regions.iter().map(|r| (src, dst, *r)));
    }

    fn cmd_push_constants(
        &self,
        _command_buffer: NativeCommandBuffer,
        layout: NativePipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(format!("cmd_push_constants:{}+{}", offset, data.len()));
        state.push_constants.push(RecordedPushConstants { layout, stages, offset, data: data.to_vec() });
    }

    fn cmd_bind_vertex_buffers(
        &self,
        _command_buffer: NativeCommandBuffer,
        first_binding: u32,
        buffers: &[(NativeBuffer, u64)],
    ) {
        self.state
            .lock()
            .unwrap()
            .record(format!("cmd_bind_vertex_buffers:{}+{}", first_binding, buffers.len()));
    }

    fn cmd_bind_index_buffer(
        &self,
        _command_buffer: NativeCommandBuffer,
        _buffer: NativeBuffer,
        _offset: u64,
        index_type: IndexType,
    ) {
        self.state.lock().unwrap().record(format!("cmd_bind_index_buffer:{:?}", index_type));
    }

    fn cmd_draw(
        &self,
        _command_buffer: NativeCommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.state.lock().unwrap().record(format!("cmd_draw:{}x{}", vertex_count, instance_count));
    }

    fn cmd_draw_indexed(
        &self,
        _command_buffer: NativeCommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.state.lock().unwrap().record(format!("cmd_draw_indexed:{}x{}", index_count, instance_count));
    }

    fn cmd_dispatch(&self, _command_buffer: NativeCommandBuffer, x: u32, y: u32, z: u32) {
        self.state.lock().unwrap().record(format!("cmd_dispatch:{}x{}x{}", x, y, z));
    }

    fn cmd_trace_rays(
        &self,
        _command_buffer: NativeCommandBuffer,
        regions: &ShaderBindingRegions,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(format!("cmd_trace_rays:{}x{}x{}", width, height, depth));
        state.trace_rays.push((*regions, [width, height, depth]));
    }

    fn submit_frame(&self, submit: &FrameSubmit) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("submit:{}", submit.timeline_value));
        state.submits.push(*submit);
        if state.gpu_stalled {
            state.pending_signals.push((submit.timeline, submit.timeline_value));
        } else {
            let current = state.timelines.entry(submit.timeline.0).or_insert(0);
            *current = (*current).max(submit.timeline_value);
        }
        Ok(())
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, _sizes: &DescriptorPoolSizes) -> Result<NativeDescriptorPool> {
        Ok(NativeDescriptorPool(self.state.lock().unwrap().create("descriptor_pool")))
    }

    fn destroy_descriptor_pool(&self, pool: NativeDescriptorPool) {
        self.state.lock().unwrap().destroy(pool.0, "descriptor_pool");
    }

    fn reset_descriptor_pool(&self, _pool: NativeDescriptorPool) -> Result<()> {
        self.state.lock().unwrap().record("reset_descriptor_pool");
        Ok(())
    }

    fn allocate_descriptor_set(
        &self,
        _pool: NativeDescriptorPool,
        layout: NativeDescriptorSetLayout,
    ) -> Result<NativeDescriptorSet> {
        let mut state = self.state.lock().unwrap();
        state.record("allocate_descriptor_set");
        state.allocated_set_layouts.push(layout);
        // Sets are reclaimed by pool reset, not tracked individually
        state.next_handle += 1;
        Ok(NativeDescriptorSet(state.next_handle))
    }

    fn write_descriptors(&self, set: NativeDescriptorSet, writes: &[DescriptorWrite]) {
        let mut state = self.state.lock().unwrap();
        state.record(format!("write_descriptors:{}", writes.len()));
        state.descriptor_writes.extend(writes.iter().map(|w| (set, *w)));
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
        _flags: DescriptorSetLayoutCreateFlags,
        debug_name: &str,
    ) -> Result<NativeDescriptorSetLayout> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_descriptor_set_layout:{}", debug_name));
        let handle = state.create("descriptor_set_layout");
        state.set_layouts.insert(handle, bindings.to_vec());
        Ok(NativeDescriptorSetLayout(handle))
    }

    fn destroy_descriptor_set_layout(&self, layout: NativeDescriptorSetLayout) {
        self.state.lock().unwrap().destroy(layout.0, "descriptor_set_layout");
    }

    // ===== SHADERS & PIPELINES =====

    fn create_shader_module(&self, _code: &[u32], debug_name: &str) -> Result<NativeShaderModule> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_shader_module:{}", debug_name));
        Ok(NativeShaderModule(state.create("shader_module")))
    }

    fn destroy_shader_module(&self, module: NativeShaderModule) {
        self.state.lock().unwrap().destroy(module.0, "shader_module");
    }

    fn reflect_shader(&self, code: &[u32], _stage: ShaderStageFlags) -> Result<ShaderReflection> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reflections
            .iter()
            .find(|(registered, _)| registered.as_slice() == code)
            .map(|(_, reflection)| reflection.clone())
            .unwrap_or_default())
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[NativeDescriptorSetLayout],
        push_constants: &[PushConstantRange],
    ) -> Result<NativePipelineLayout> {
        let mut state = self.state.lock().unwrap();
        state.record("create_pipeline_layout");
        let handle = state.create("pipeline_layout");
        state.pipeline_layouts.insert(handle, (set_layouts.to_vec(), push_constants.to_vec()));
        Ok(NativePipelineLayout(handle))
    }

    fn destroy_pipeline_layout(&self, layout: NativePipelineLayout) {
        self.state.lock().unwrap().destroy(layout.0, "pipeline_layout");
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<NativePipeline> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_graphics_pipeline:{}", desc.debug_name));
        state.graphics_pipelines.push(desc.clone());
        Ok(NativePipeline(state.create("pipeline")))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<NativePipeline> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_compute_pipeline:{}", desc.debug_name));
        state.compute_pipelines.push(desc.clone());
        Ok(NativePipeline(state.create("pipeline")))
    }

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<NativePipeline> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_ray_tracing_pipeline:{}", desc.debug_name));
        state.ray_tracing_pipelines.push(desc.clone());
        let handle = state.create("pipeline");
        state.ray_tracing_groups.insert(handle, desc.groups.len() as u32);
        Ok(NativePipeline(handle))
    }

    fn destroy_pipeline(&self, pipeline: NativePipeline) {
        let mut state = self.state.lock().unwrap();
        state.destroy(pipeline.0, "pipeline");
        state.ray_tracing_groups.remove(&pipeline.0);
    }

    fn ray_tracing_properties(&self) -> Option<RayTracingProperties> {
        self.state.lock().unwrap().ray_tracing
    }

    /// Group `i`'s handle is `handle_size` bytes of value `i + 1`
    fn ray_tracing_group_handles(&self, pipeline: NativePipeline, group_count: u32) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("ray_tracing_group_handles:{}", group_count));
        let properties = state
            .ray_tracing
            .ok_or_else(|| Error::InvalidOperation("ray tracing not supported".to_string()))?;
        let available = state
            .ray_tracing_groups
            .get(&pipeline.0)
            .copied()
            .ok_or_else(|| Error::InvalidResource("not a ray-tracing pipeline".to_string()))?;
        if group_count > available {
            return Err(Error::InvalidResource(format!("pipeline has {} groups", available)));
        }
        let size = properties.shader_group_handle_size as usize;
        Ok((0..group_count as usize).flat_map(|i| std::iter::repeat((i + 1) as u8).take(size)).collect())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
