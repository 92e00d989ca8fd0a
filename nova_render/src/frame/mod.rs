/// Frame module - frame-in-flight scheduling and presentation

pub mod frame_context;
pub mod frame_scheduler;
pub mod renderer;

pub use frame_context::{FrameContext, RenderTargetDesc, SchedulerState};
pub(crate) use frame_context::ChainState;
pub use frame_scheduler::FrameScheduler;
pub use renderer::{Renderer, create_renderer};

#[cfg(test)]
#[path = "frame_scheduler_tests.rs"]
mod tests;
