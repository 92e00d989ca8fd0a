/// Per-frame and per-swapchain-image state owned by the frame scheduler

use crate::graphics_device::{
    Format, NativeCommandBuffer, NativeDescriptorPool, NativeFence, NativeImage, NativeImageView,
    NativeSemaphore, Rect2D, Viewport,
};

/// Lifecycle of the frame scheduler
///
/// ```text
/// Uninitialized -> Ready -> Recording -> Submitted -> Presented -> Recording ...
///                    ^                                   |
///                    +--------- Resizing <---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Uninitialized,
    Ready,
    Recording,
    Submitted,
    Presented,
    Resizing,
}

/// Attachment formats and extent of the frame targets
///
/// Graphics pipelines rendering straight into the frame use it to declare
/// their dynamic-rendering attachment formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub color_format: Format,
    pub depth_format: Option<Format>,
    pub width: u32,
    pub height: u32,
}

/// Recording context of one frame-in-flight slot
///
/// Handed out by `FrameScheduler::begin_frame`. The color and depth targets
/// are null while the surface is minimized.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub command_buffer: NativeCommandBuffer,
    /// Transient descriptor pool, reset at the start of the slot's frame
    pub descriptor_pool: NativeDescriptorPool,

    pub color_image: NativeImage,
    pub color_view: NativeImageView,
    pub color_format: Format,
    pub depth_image: NativeImage,
    pub depth_view: NativeImageView,
    pub depth_format: Format,

    pub viewport: Viewport,
    pub scissor: Rect2D,

    /// Global frame number
    pub frame_id: u64,
    /// Slot index, `frame_id % frames_in_flight`
    pub cycle_id: u32,
    /// Timeline value that must be reached before this slot is reused
    pub wait_id: u64,
    /// Acquired swapchain image, `None` while minimized
    pub image_index: Option<u32>,
}

impl FrameContext {
    pub(crate) fn new(command_buffer: NativeCommandBuffer, descriptor_pool: NativeDescriptorPool) -> Self {
        Self {
            command_buffer,
            descriptor_pool,
            color_image: NativeImage::NULL,
            color_view: NativeImageView::NULL,
            color_format: Format::UNDEFINED,
            depth_image: NativeImage::NULL,
            depth_view: NativeImageView::NULL,
            depth_format: Format::UNDEFINED,
            viewport: Viewport::default(),
            scissor: Rect2D::default(),
            frame_id: 0,
            cycle_id: 0,
            wait_id: 0,
            image_index: None,
        }
    }

    /// Whether the frame renders into an acquired swapchain image
    pub fn has_target(&self) -> bool {
        self.image_index.is_some()
    }
}

/// Synchronization objects of one swapchain image
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainState {
    pub image: NativeImage,
    pub view: NativeImageView,
    pub acquire_semaphore: NativeSemaphore,
    pub acquire_fence: NativeFence,
    pub present_semaphore: NativeSemaphore,
    /// Timeline value of the last submit that waited on `acquire_semaphore`
    pub acquire_wait_id: u64,
}
