/// Renderer trait - backend-neutral frame loop interface
///
/// The backend is picked once from `Config::backend` by `create_renderer`.

use std::sync::Arc;
use crate::engine_error;
use crate::config::{BackendKind, Config};
use crate::error::{Error, Result};
use crate::graphics_device::GraphicsDevice;
use crate::memory::MemoryManager;
use crate::frame::{FrameContext, FrameScheduler, RenderTargetDesc};

/// Frame loop driven once per displayed frame
pub trait Renderer {
    /// Initialize the presentation targets
    ///
    /// # Arguments
    ///
    /// * `width` - Surface width in pixels
    /// * `height` - Surface height in pixels
    fn initialize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Wait for the next frame slot and return its recording context
    fn begin_frame(&mut self) -> Result<&FrameContext>;

    /// Submit the commands recorded since `begin_frame`
    fn end_frame(&mut self) -> Result<()>;

    /// Present the submitted frame
    fn swap_buffers(&mut self) -> Result<()>;

    /// Handle a surface size change
    ///
    /// # Arguments
    ///
    /// * `width` - New width in pixels (0 when minimized)
    /// * `height` - New height in pixels (0 when minimized)
    fn on_window_resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Context of the frame currently being recorded, if any
    fn frame_context(&self) -> Option<&FrameContext>;

    /// Memory manager owning every buffer and image of this renderer
    fn memory(&self) -> &MemoryManager;

    /// Attachment formats for pipelines rendering into the frame
    fn render_target_desc(&self) -> RenderTargetDesc;
}

impl Renderer for FrameScheduler {
    fn initialize(&mut self, width: u32, height: u32) -> Result<()> {
        FrameScheduler::initialize(self, width, height)
    }

    fn begin_frame(&mut self) -> Result<&FrameContext> {
        FrameScheduler::begin_frame(self)
    }

    fn end_frame(&mut self) -> Result<()> {
        FrameScheduler::end_frame(self)
    }

    fn swap_buffers(&mut self) -> Result<()> {
        FrameScheduler::swap_buffers(self)
    }

    fn on_window_resize(&mut self, width: u32, height: u32) -> Result<()> {
        FrameScheduler::on_window_resize(self, width, height)
    }

    fn frame_context(&self) -> Option<&FrameContext> {
        FrameScheduler::frame_context(self)
    }

    fn memory(&self) -> &MemoryManager {
        FrameScheduler::memory(self)
    }

    fn render_target_desc(&self) -> RenderTargetDesc {
        FrameScheduler::render_target_desc(self)
    }
}

/// Create the renderer selected by `config.backend`
///
/// Only `BackendKind::ModernGpu` is available; it drives `device` through
/// a `FrameScheduler`.
pub fn create_renderer(device: Arc<dyn GraphicsDevice>, config: Config) -> Result<Box<dyn Renderer>> {
    match config.backend {
        BackendKind::ModernGpu => Ok(Box::new(FrameScheduler::new(device, config)?)),
        BackendKind::Raster => {
            engine_error!("nova::FrameScheduler", "The raster backend is not available in this build");
            Err(Error::InitializationFailed("raster backend is not available".to_string()))
        }
    }
}
