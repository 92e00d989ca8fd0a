/// FrameScheduler - frame lifecycle over N rotating frame-in-flight slots
///
/// One `begin_frame` / `end_frame` / `swap_buffers` cycle per frame:
///
/// 1. `begin_frame` moves to the next slot, waits on the timeline semaphore
///    until the GPU finished the frame that last used it, services deferred
///    destruction, acquires a swapchain image and opens the command buffer.
/// 2. `end_frame` closes the command buffer and submits it, signalling the
///    timeline value `frame_id + 1`.
/// 3. `swap_buffers` presents, rebuilding the swapchain when the surface
///    reports it as out of date or suboptimal.
///
/// The CPU can therefore run at most `frames_in_flight` frames ahead of the
/// GPU, and a resource retired during frame `k` is destroyed at the start of
/// frame `k + frames_in_flight`.

use std::sync::Arc;
use crate::{engine_error, engine_info, engine_warn, engine_debug};
use crate::config::Config;
use crate::descriptor::DescriptorSetLayout;
use crate::error::{Error, Result};
use crate::graphics_device::{
    AcquireOutcome, Format, FrameSubmit, GraphicsDevice, ImageDesc, ImageLayout, ImageTransition,
    NativeDescriptorSet, NativeDescriptorSetLayout, NativeImage, NativeImageView, NativeSemaphore,
    PresentOutcome, Rect2D, RenderingInfo, Viewport, WaitStatus,
};
use crate::memory::{DiscardMode, Image, MemoryManager};
use crate::pipeline::Pipeline;
use crate::frame::{ChainState, FrameContext, RenderTargetDesc, SchedulerState};

const SOURCE: &str = "nova::FrameScheduler";

pub struct FrameScheduler {
    device: Arc<dyn GraphicsDevice>,
    config: Config,
    memory: MemoryManager,

    timeline: NativeSemaphore,
    frames: Vec<FrameContext>,
    chain: Vec<ChainState>,

    color_format: Format,
    width: u32,
    height: u32,
    depth_target: Option<Image>,

    state: SchedulerState,
    current_slot: usize,
    frame_counter: u64,
    acquire_cursor: usize,
    minimized: bool,
    needs_rebuild: bool,
}

impl FrameScheduler {
    /// Create the per-slot command buffers, descriptor pools and the timeline
    ///
    /// The swapchain is not created until `initialize`.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: Config) -> Result<Self> {
        config.validate()?;

        let timeline = device.create_timeline_semaphore(0)?;
        let mut frames = Vec::with_capacity(config.frames_in_flight as usize);
        for slot in 0..config.frames_in_flight {
            let command_buffer = match device.allocate_command_buffer() {
                Ok(cb) => cb,
                Err(e) => {
                    engine_error!(SOURCE, "Failed to allocate command buffer for slot {}: {}", slot, e);
                    Self::release_slots(&*device, &frames, timeline);
                    return Err(e);
                }
            };
            let pool = match device.create_descriptor_pool(&config.descriptor_pool) {
                Ok(pool) => pool,
                Err(e) => {
                    engine_error!(SOURCE, "Failed to create descriptor pool for slot {}: {}", slot, e);
                    device.free_command_buffer(command_buffer);
                    Self::release_slots(&*device, &frames, timeline);
                    return Err(e);
                }
            };
            frames.push(FrameContext::new(command_buffer, pool));
        }

        let memory = MemoryManager::new(Arc::clone(&device), config.frames_in_flight);
        let current_slot = frames.len() - 1;

        engine_debug!(SOURCE, "Created frame scheduler with {} frames in flight", config.frames_in_flight);

        Ok(Self {
            device,
            config,
            memory,
            timeline,
            frames,
            chain: Vec::new(),
            color_format: Format::UNDEFINED,
            width: 0,
            height: 0,
            depth_target: None,
            state: SchedulerState::Uninitialized,
            current_slot,
            frame_counter: 0,
            acquire_cursor: 0,
            minimized: false,
            needs_rebuild: false,
        })
    }

    fn release_slots(device: &dyn GraphicsDevice, frames: &[FrameContext], timeline: NativeSemaphore) {
        for frame in frames {
            device.free_command_buffer(frame.command_buffer);
            device.destroy_descriptor_pool(frame.descriptor_pool);
        }
        device.destroy_semaphore(timeline);
    }

    /// Create the swapchain and depth target for a `width` x `height` surface
    ///
    /// A zero-area surface leaves the scheduler minimized until the first
    /// non-empty `on_window_resize`.
    pub fn initialize(&mut self, width: u32, height: u32) -> Result<()> {
        self.expect_state(&[SchedulerState::Uninitialized], "initialize")?;

        if width == 0 || height == 0 {
            self.minimized = true;
            self.needs_rebuild = true;
        } else {
            self.rebuild_targets(width, height)?;
        }

        self.state = SchedulerState::Ready;
        engine_info!(SOURCE, "Frame scheduler ready ({}x{})", width, height);
        Ok(())
    }

    // ===== FRAME LIFECYCLE =====

    /// Start recording the next frame
    pub fn begin_frame(&mut self) -> Result<&FrameContext> {
        self.expect_state(&[SchedulerState::Ready, SchedulerState::Presented], "begin_frame")?;

        let slot = (self.current_slot + 1) % self.frames.len();
        self.wait_for_timeline(self.frames[slot].wait_id)?;

        if self.needs_rebuild && !self.minimized {
            self.rebuild_targets(self.width, self.height)?;
        }

        let image_index = if self.minimized { None } else { Some(self.acquire()?) };

        // Commit only once an image is in hand; a failed acquire is retried
        // on the same slot without ticking deferred destruction
        self.current_slot = slot;
        self.memory.update();

        let (width, height) = (self.width, self.height);
        let viewport = self.viewport();
        let scissor = Rect2D { x: 0, y: 0, width, height };
        let (depth_image, depth_view) = match (&self.depth_target, image_index) {
            (Some(depth), Some(_)) => (depth.native(), depth.view()),
            _ => (NativeImage::NULL, NativeImageView::NULL),
        };
        let (color_image, color_view) = match image_index {
            Some(index) => {
                let chain = &self.chain[index as usize];
                (chain.image, chain.view)
            }
            None => (NativeImage::NULL, NativeImageView::NULL),
        };

        let frame = &mut self.frames[slot];
        frame.frame_id = self.frame_counter;
        frame.cycle_id = slot as u32;
        frame.image_index = image_index;
        frame.viewport = viewport;
        frame.scissor = scissor;
        frame.color_image = color_image;
        frame.color_view = color_view;
        frame.color_format = self.color_format;
        frame.depth_image = depth_image;
        frame.depth_view = depth_view;
        frame.depth_format = self.config.depth_stencil_format;

        self.device.reset_descriptor_pool(frame.descriptor_pool)?;
        self.device.begin_command_buffer(frame.command_buffer)?;

        let cmd = frame.command_buffer;
        self.device.cmd_set_viewport(cmd, &viewport);
        self.device.cmd_set_scissor(cmd, &scissor);

        if image_index.is_some() {
            if self.config.auto_transition_frame_buffer {
                self.device.cmd_transition_image(cmd, &ImageTransition {
                    image: color_image,
                    old_layout: ImageLayout::Undefined,
                    new_layout: ImageLayout::ColorAttachment,
                    depth: false,
                });
                self.device.cmd_transition_image(cmd, &ImageTransition {
                    image: depth_image,
                    old_layout: ImageLayout::Undefined,
                    new_layout: ImageLayout::DepthStencilAttachment,
                    depth: true,
                });
            }
            if self.config.auto_begin_dynamic_rendering {
                self.device.cmd_begin_rendering(cmd, &RenderingInfo {
                    color_view: Some(color_view),
                    depth_view: Some(depth_view),
                    width,
                    height,
                    clear_color: self.config.clear_color.to_array(),
                    clear_depth: self.config.clear_depth,
                });
            }
        }

        self.state = SchedulerState::Recording;
        Ok(&self.frames[slot])
    }

    /// Close the command buffer and submit it
    pub fn end_frame(&mut self) -> Result<()> {
        self.expect_state(&[SchedulerState::Recording], "end_frame")?;

        let frame = &self.frames[self.current_slot];
        let cmd = frame.command_buffer;
        let image_index = frame.image_index;
        let color_image = frame.color_image;

        if image_index.is_some() {
            if self.config.auto_begin_dynamic_rendering {
                self.device.cmd_end_rendering(cmd);
            }
            if self.config.auto_transition_frame_buffer {
                self.device.cmd_transition_image(cmd, &ImageTransition {
                    image: color_image,
                    old_layout: ImageLayout::ColorAttachment,
                    new_layout: ImageLayout::PresentSrc,
                    depth: false,
                });
            }
        }
        self.device.end_command_buffer(cmd)?;

        let timeline_value = self.frames[self.current_slot].frame_id + 1;
        let (wait_semaphore, signal_semaphore) = match image_index {
            Some(index) => (
                Some(self.chain[self.acquire_cursor].acquire_semaphore),
                Some(self.chain[index as usize].present_semaphore),
            ),
            None => (None, None),
        };

        self.device
            .submit_frame(&FrameSubmit {
                command_buffer: cmd,
                wait_semaphore,
                signal_semaphore,
                timeline: self.timeline,
                timeline_value,
            })
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to submit frame {}: {}", timeline_value - 1, e);
                e
            })?;

        self.frames[self.current_slot].wait_id = timeline_value;
        if image_index.is_some() {
            self.chain[self.acquire_cursor].acquire_wait_id = timeline_value;
        }
        self.frame_counter += 1;
        self.state = SchedulerState::Submitted;

        if image_index.is_none() {
            self.wait_for_timeline(timeline_value)?;
        }
        Ok(())
    }

    /// Present the submitted frame
    pub fn swap_buffers(&mut self) -> Result<()> {
        self.expect_state(&[SchedulerState::Submitted], "swap_buffers")?;

        if let Some(index) = self.frames[self.current_slot].image_index {
            let present_semaphore = self.chain[index as usize].present_semaphore;
            match self.device.present(index, present_semaphore)? {
                PresentOutcome::Presented => {}
                outcome => {
                    engine_info!(SOURCE, "Present returned {:?}, rebuilding swapchain", outcome);
                    self.needs_rebuild = true;
                }
            }
            self.acquire_cursor = (self.acquire_cursor + 1) % self.chain.len();
        }

        if self.needs_rebuild && !self.minimized {
            self.state = SchedulerState::Resizing;
            let rebuilt = self.rebuild_targets(self.width, self.height);
            self.state = SchedulerState::Ready;
            return rebuilt;
        }
        self.state = SchedulerState::Presented;
        Ok(())
    }

    /// React to a surface size change
    ///
    /// Zero-area marks the surface minimized. The same size while not
    /// minimized is a no-op. Anything else waits for the GPU to go idle and
    /// rebuilds the swapchain and depth target.
    pub fn on_window_resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.expect_state(&[SchedulerState::Ready, SchedulerState::Presented], "on_window_resize")?;

        if width == 0 || height == 0 {
            if !self.minimized {
                engine_debug!(SOURCE, "Surface minimized");
            }
            self.minimized = true;
            return Ok(());
        }

        if !self.minimized && !self.needs_rebuild && (width, height) == (self.width, self.height) {
            return Ok(());
        }

        self.state = SchedulerState::Resizing;
        self.minimized = false;
        let rebuilt = self.rebuild_targets(width, height);
        self.state = SchedulerState::Ready;
        rebuilt
    }

    // ===== ACCESSORS =====

    /// Context of the frame being recorded or just submitted
    pub fn frame_context(&self) -> Option<&FrameContext> {
        match self.state {
            SchedulerState::Recording | SchedulerState::Submitted => Some(&self.frames[self.current_slot]),
            _ => None,
        }
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Number of frames submitted so far
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.chain.len()
    }

    pub fn timeline(&self) -> NativeSemaphore {
        self.timeline
    }

    /// Formats and extent of the frame targets
    pub fn render_target_desc(&self) -> RenderTargetDesc {
        RenderTargetDesc {
            color_format: self.color_format,
            depth_format: Some(self.config.depth_stencil_format),
            width: self.width,
            height: self.height,
        }
    }

    /// Allocate a set from the current frame's transient pool
    ///
    /// The set is valid until the same slot begins its next frame.
    pub fn allocate_descriptor_set(&self, layout: &DescriptorSetLayout) -> Result<NativeDescriptorSet> {
        self.expect_state(&[SchedulerState::Recording], "allocate_descriptor_set")?;
        self.allocate_transient(layout.native(), layout.debug_name())
    }

    /// Allocate a transient set matching `pipeline`'s layout at `set`
    ///
    /// Works for set layouts synthesized from reflection as well as for
    /// caller-supplied ones.
    pub fn allocate_descriptor_set_for(&self, pipeline: &Pipeline, set: u32) -> Result<NativeDescriptorSet> {
        self.expect_state(&[SchedulerState::Recording], "allocate_descriptor_set_for")?;
        let Some(layout) = pipeline.set_layout(set) else {
            engine_error!(
                SOURCE,
                "Pipeline '{}' has no descriptor set {} ({} sets)",
                pipeline.debug_name(), set, pipeline.set_layouts().len()
            );
            return Err(Error::InvalidOperation(format!(
                "pipeline '{}' has no descriptor set {}",
                pipeline.debug_name(), set
            )));
        };
        self.allocate_transient(layout, pipeline.debug_name())
    }

    fn allocate_transient(&self, layout: NativeDescriptorSetLayout, debug_name: &str) -> Result<NativeDescriptorSet> {
        let pool = self.frames[self.current_slot].descriptor_pool;
        self.device.allocate_descriptor_set(pool, layout).map_err(|e| {
            engine_error!(SOURCE, "Failed to allocate descriptor set '{}': {}", debug_name, e);
            e
        })
    }

    // ===== INTERNALS =====

    fn expect_state(&self, allowed: &[SchedulerState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        engine_error!(SOURCE, "{} called in state {:?}", operation, self.state);
        Err(Error::InvalidOperation(format!("{} called in state {:?}", operation, self.state)))
    }

    /// Block until the timeline reaches `value`, a timeout is fatal
    fn wait_for_timeline(&self, value: u64) -> Result<()> {
        if value == 0 {
            return Ok(());
        }
        match self.device.wait_timeline(self.timeline, value, self.config.frame_timeout)? {
            WaitStatus::Signaled => Ok(()),
            WaitStatus::TimedOut => {
                engine_error!(
                    SOURCE,
                    "GPU did not reach timeline value {} within {:?}",
                    value, self.config.frame_timeout
                );
                Err(Error::DeviceLost(format!("timeline wait for value {} timed out", value)))
            }
        }
    }

    /// Acquire the next swapchain image, rebuilding once if the chain is out of date
    fn acquire(&mut self) -> Result<u32> {
        for attempt in 0..2 {
            let chain = self.chain[self.acquire_cursor];
            // The semaphore may still be waited on by an unfinished submit
            // when more frames are in flight than the surface has images
            self.wait_for_timeline(chain.acquire_wait_id)?;
            self.device.reset_fence(chain.acquire_fence)?;
            match self.device.acquire_next_image(chain.acquire_semaphore, chain.acquire_fence, self.config.frame_timeout)? {
                AcquireOutcome::Acquired { index, suboptimal } => {
                    if self.device.wait_fence(chain.acquire_fence, self.config.frame_timeout)? == WaitStatus::TimedOut {
                        engine_error!(SOURCE, "Acquire fence not signalled within {:?}", self.config.frame_timeout);
                        return Err(Error::DeviceLost("acquire fence wait timed out".to_string()));
                    }
                    if suboptimal {
                        self.needs_rebuild = true;
                    }
                    return Ok(index);
                }
                AcquireOutcome::OutOfDate if attempt == 0 => {
                    engine_info!(SOURCE, "Swapchain out of date on acquire, rebuilding");
                    self.rebuild_targets(self.width, self.height)?;
                }
                AcquireOutcome::OutOfDate => {}
            }
        }
        engine_error!(SOURCE, "Swapchain still out of date after rebuild");
        Err(Error::BackendError("swapchain out of date after rebuild".to_string()))
    }

    fn viewport(&self) -> Viewport {
        let (width, height) = (self.width as f32, self.height as f32);
        if self.config.use_opengl_coordinates {
            Viewport { x: 0.0, y: 0.0, width, height, min_depth: 0.0, max_depth: 1.0 }
        } else {
            // Negative height flips Y so +Y points up in clip space
            Viewport { x: 0.0, y: height, width, height: -height, min_depth: 0.0, max_depth: 1.0 }
        }
    }

    /// Recreate swapchain, chain states and depth target after the GPU is idle
    fn rebuild_targets(&mut self, width: u32, height: u32) -> Result<()> {
        self.needs_rebuild = true;
        self.device.wait_idle()?;
        self.destroy_chain();
        if let Some(depth) = self.depth_target.take() {
            self.memory.discard_image(depth, DiscardMode::Immediate)?;
        }

        let info = self.device.create_swapchain(width, height, self.config.present_mode).map_err(|e| {
            engine_error!(SOURCE, "Failed to create swapchain ({}x{}): {}", width, height, e);
            e
        })?;
        self.color_format = info.format;
        self.width = info.width;
        self.height = info.height;

        let mut depth_desc = ImageDesc::depth_target(info.width, info.height, self.config.depth_stencil_format);
        depth_desc.debug_name = "frame depth target".to_string();
        self.depth_target = Some(self.memory.create_image(&depth_desc)?);

        for image in &info.images {
            let state = self.create_chain_state(image.image, image.view)?;
            self.chain.push(state);
        }
        if self.chain.is_empty() {
            engine_error!(SOURCE, "Swapchain has no images");
            return Err(Error::InitializationFailed("swapchain has no images".to_string()));
        }

        self.acquire_cursor = 0;
        self.needs_rebuild = false;
        engine_info!(
            SOURCE,
            "Swapchain rebuilt: {}x{}, {} images, {:?}",
            self.width, self.height, self.chain.len(), self.color_format
        );
        Ok(())
    }

    fn create_chain_state(&self, image: NativeImage, view: NativeImageView) -> Result<ChainState> {
        let acquire_semaphore = self.device.create_semaphore()?;
        let acquire_fence = match self.device.create_fence(false) {
            Ok(fence) => fence,
            Err(e) => {
                self.device.destroy_semaphore(acquire_semaphore);
                return Err(e);
            }
        };
        let present_semaphore = match self.device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                self.device.destroy_fence(acquire_fence);
                self.device.destroy_semaphore(acquire_semaphore);
                return Err(e);
            }
        };
        Ok(ChainState { image, view, acquire_semaphore, acquire_fence, present_semaphore, acquire_wait_id: 0 })
    }

    fn destroy_chain(&mut self) {
        for state in self.chain.drain(..) {
            self.device.destroy_semaphore(state.acquire_semaphore);
            self.device.destroy_fence(state.acquire_fence);
            self.device.destroy_semaphore(state.present_semaphore);
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            engine_warn!(SOURCE, "wait_idle failed during shutdown: {}", e);
        }
        self.destroy_chain();
        if let Some(depth) = self.depth_target.take() {
            if let Err(e) = self.memory.discard_image(depth, DiscardMode::Immediate) {
                engine_warn!(SOURCE, "Failed to release depth target: {}", e);
            }
        }
        for frame in &self.frames {
            self.device.free_command_buffer(frame.command_buffer);
            self.device.destroy_descriptor_pool(frame.descriptor_pool);
        }
        self.device.destroy_semaphore(self.timeline);
    }
}
