/*!
# Nova Render

Frame lifecycle and GPU resource management core.

The crate is backend-agnostic: everything GPU-facing goes through the
`GraphicsDevice` trait, implemented by `nova_render_vulkan`.

## Architecture

- **FrameScheduler**: rotates N frame contexts, acquires, submits and presents
- **MemoryManager**: buffers and images with frame-deferred destruction
- **Pipeline builders**: graphics / compute / ray-tracing pipelines with
  descriptor layouts merged from shader reflection
- **Descriptor helpers**: set layout builder, set writer, multi-set binder

## Frame loop

```ignore
let mut scheduler = FrameScheduler::new(device, Config::default())?;
scheduler.initialize(width, height)?;
loop {
    let frame = scheduler.begin_frame()?;
    // record into frame.command_buffer
    scheduler.end_frame()?;
    scheduler.swap_buffers()?;
}
```
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod utils;
pub mod graphics_device;
pub mod memory;
pub mod shader;
pub mod pipeline;
pub mod descriptor;
pub mod frame;

// Main nova namespace module
pub mod nova {
    // Error types
    pub use crate::error::{Error, Result};

    // Global logger facade
    pub use crate::engine::Engine;

    pub use crate::config::Config;
    pub use crate::frame::{FrameScheduler, FrameContext, Renderer, create_renderer};
    pub use crate::graphics_device::GraphicsDevice;
    pub use crate::memory::{MemoryManager, Buffer, Image, DiscardMode};

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device sub-module with handles and descriptions
    pub mod device {
        pub use crate::graphics_device::*;
    }

    pub mod pipeline {
        pub use crate::pipeline::*;
        pub use crate::shader::*;
    }

    pub mod descriptor {
        pub use crate::descriptor::*;
    }
}

// Re-export math library at crate root
pub use glam;
