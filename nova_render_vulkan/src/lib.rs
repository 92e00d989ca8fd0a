/*!
# Nova Render - Vulkan Backend

Vulkan 1.3 implementation of the `GraphicsDevice` trait from `nova_render`.

Built on ash for the Vulkan bindings, gpu-allocator for memory and spirq
for shader reflection. Requires timeline semaphores, synchronization2 and
dynamic rendering; ray-tracing pipelines are enabled when the device
exposes them.

```no_run
use std::sync::Arc;
use nova_render::nova::{Config, GraphicsDevice, FrameScheduler};
use nova_render_vulkan::VulkanDevice;
# fn run(window: &winit::window::Window) -> nova_render::nova::Result<()> {
let config = Config::default();
let device: Arc<dyn GraphicsDevice> = Arc::new(VulkanDevice::new(window, &config)?);
let mut scheduler = FrameScheduler::new(device, config)?;
scheduler.initialize(1280, 720)?;
# Ok(())
# }
```
*/

mod vulkan_format;
mod vulkan_debug;
mod vulkan_context;
mod vulkan_memory;
mod vulkan_swapchain;
mod vulkan_reflection;
mod vulkan_descriptor;
mod vulkan_pipeline;
mod vulkan_device;

pub use vulkan_device::VulkanDevice;

// Validation message counters
pub use vulkan_debug::{validation_stats, reset_validation_stats, print_validation_stats_report};
