/// Configuration of the render core
///
/// One `Config` is handed to `FrameScheduler::new` and, for the Vulkan
/// backend, to `VulkanDevice::new`. Every field has a usable default.

use std::time::Duration;
use glam::Vec4;
use crate::error::{Error, Result};
use crate::graphics_device::{Format, PresentMode};

/// Upper bound on frames in flight
pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;

/// Rendering backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Fixed-function, non-bindless path (provided outside this workspace)
    Raster,
    /// Bindless path with dynamic rendering and timeline semaphores
    ModernGpu,
}

/// Physical device preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuPreference {
    Discrete,
    Integrated,
    /// First device that supports the required features
    Any,
}

/// Minimum severity of validation-layer messages forwarded to the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DebugSeverity {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Validation message counters reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    /// Total number of messages received
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Capacity of each per-frame descriptor pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSizes {
    /// Uniform and storage buffer descriptors
    pub buffers: u32,
    /// Sampled, storage and combined image descriptors
    pub images: u32,
    pub samplers: u32,
    pub max_sets: u32,
}

impl Default for DescriptorPoolSizes {
    fn default() -> Self {
        Self {
            buffers: 128,
            images: 128,
            samplers: 32,
            max_sets: 64,
        }
    }
}

/// Render core configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    /// Application name reported to the driver
    pub app_name: String,
    /// Number of frame contexts rotated by the scheduler (1..=4)
    pub frames_in_flight: u32,
    /// Format of the scheduler-owned depth target
    pub depth_stencil_format: Format,
    pub present_mode: PresentMode,
    pub gpu_preference: GpuPreference,
    pub descriptor_pool: DescriptorPoolSizes,
    /// Keep the Y-up clip space (no viewport flip)
    pub use_opengl_coordinates: bool,
    /// Transition the color and depth targets at frame start and end
    pub auto_transition_frame_buffer: bool,
    /// Open a dynamic-rendering scope over the frame targets in `begin_frame`
    pub auto_begin_dynamic_rendering: bool,
    /// Clear values of the automatic rendering scope
    pub clear_color: Vec4,
    pub clear_depth: f32,
    /// Bound on the per-frame timeline wait before reporting `DeviceLost`
    pub frame_timeout: Duration,
    /// Enable validation layers
    pub enable_validation: bool,
    pub debug_severity: DebugSeverity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::ModernGpu,
            app_name: "Nova Application".to_string(),
            frames_in_flight: 2,
            depth_stencil_format: Format::D32_SFLOAT_S8_UINT,
            present_mode: PresentMode::Fifo,
            gpu_preference: GpuPreference::Discrete,
            descriptor_pool: DescriptorPoolSizes::default(),
            use_opengl_coordinates: false,
            auto_transition_frame_buffer: true,
            auto_begin_dynamic_rendering: true,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear_depth: 1.0,
            frame_timeout: Duration::from_secs(5),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::Warning,
        }
    }
}

impl Config {
    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::InitializationFailed(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }

        if !self.depth_stencil_format.is_depth() {
            return Err(Error::InitializationFailed(format!(
                "depth_stencil_format {:?} has no depth aspect",
                self.depth_stencil_format
            )));
        }

        let pool = &self.descriptor_pool;
        if pool.max_sets == 0 || pool.buffers == 0 || pool.images == 0 || pool.samplers == 0 {
            return Err(Error::InitializationFailed(format!(
                "descriptor pool sizes must be non-zero: {:?}",
                pool
            )));
        }

        if !(0.0..=1.0).contains(&self.clear_depth) {
            return Err(Error::InitializationFailed(format!(
                "clear_depth must be in 0.0..=1.0, got {}",
                self.clear_depth
            )));
        }

        if self.frame_timeout.is_zero() {
            return Err(Error::InitializationFailed("frame_timeout must be non-zero".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
