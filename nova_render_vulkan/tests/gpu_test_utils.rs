#![allow(dead_code)]
//! GPU test utilities - one VulkanDevice shared by every GPU test
//!
//! winit refuses a second EventLoop in the same process and some platforms
//! refuse a second surface on the same window, so the device is created once
//! and handed out as an `Arc`.

use std::sync::{Arc, OnceLock};

use nova_render::nova::Config;
use nova_render_vulkan::VulkanDevice;
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(target_os = "linux")]
use winit::platform::x11::EventLoopBuilderExtX11;

static GPU_DEVICE: OnceLock<Arc<VulkanDevice>> = OnceLock::new();

/// Keeps the surface's window alive; the EventLoop is leaked
static GPU_WINDOW: OnceLock<Window> = OnceLock::new();

/// Shared device, created on first use
pub fn test_device() -> Arc<VulkanDevice> {
    GPU_DEVICE
        .get_or_init(|| {
            let (window, event_loop) = create_test_window();
            let device = VulkanDevice::new(&window, &Config::default())
                .expect("Failed to create VulkanDevice for tests");

            // EventLoop is not Sync and cannot live in a static
            std::mem::forget(event_loop);
            GPU_WINDOW.set(window).ok();

            Arc::new(device)
        })
        .clone()
}

/// Hidden 800x600 window on an EventLoop that may live off the main thread
#[allow(deprecated)]
pub fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = {
        #[cfg(any(target_os = "windows", target_os = "linux"))]
        {
            EventLoopBuilder::new().with_any_thread(true).build().unwrap()
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            EventLoopBuilder::new().build().unwrap()
        }
    };

    let window_attrs = Window::default_attributes()
        .with_title("Nova GPU Test")
        .with_inner_size(winit::dpi::LogicalSize::new(800, 600))
        .with_visible(false);

    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}
