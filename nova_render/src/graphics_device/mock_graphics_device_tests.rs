//! Unit tests for MockGraphicsDevice
//!
//! The other test suites lean on the mock's bookkeeping, so its own
//! behavior (handle tracking, memory budget, timeline completion,
//! swapchain rotation) is pinned down here.

use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{
    GraphicsDevice, BufferDesc, BufferUsage, MemoryProperties, ImageDesc, Format,
    AcquireOutcome, PresentOutcome, PresentMode, WaitStatus, FrameSubmit,
    NativeCommandBuffer,
};
use crate::error::Error;
use std::time::Duration;

fn host_buffer(size: u64) -> BufferDesc {
    BufferDesc {
        size,
        usage: BufferUsage::TRANSFER_SRC,
        memory: MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
        debug_name: "host".to_string(),
    }
}

// ============================================================================
// MEMORY
// ============================================================================

#[test]
fn test_mock_buffer_lifecycle() {
    let mock = MockGraphicsDevice::new();
    let allocation = mock.create_buffer(&host_buffer(16)).unwrap();

    assert!(mock.is_live(allocation.buffer.0));
    assert!(allocation.mapped.is_some());
    assert_eq!(mock.buffer_bytes(allocation.buffer), Some(vec![0u8; 16]));

    mock.destroy_buffer(allocation.buffer);
    assert!(!mock.is_live(allocation.buffer.0));
    assert_eq!(mock.destroyed_buffers(), vec![allocation.buffer]);
}

#[test]
fn test_mock_memory_budget() {
    let mock = MockGraphicsDevice::new();
    mock.set_memory_budget(Some(100));

    let a = mock.create_buffer(&host_buffer(60)).unwrap();
    assert_eq!(mock.create_buffer(&host_buffer(60)).err(), Some(Error::OutOfMemory));

    // Freed bytes return to the budget
    mock.destroy_buffer(a.buffer);
    assert!(mock.create_buffer(&host_buffer(60)).is_ok());
}

#[test]
fn test_mock_device_local_buffer_is_not_mappable() {
    let mock = MockGraphicsDevice::new();
    let desc = BufferDesc {
        memory: MemoryProperties::DEVICE_LOCAL,
        ..host_buffer(8)
    };
    let allocation = mock.create_buffer(&desc).unwrap();

    assert!(allocation.mapped.is_none());
    assert!(matches!(mock.map_buffer(allocation.buffer), Err(Error::InvalidResource(_))));
}

#[test]
fn test_mock_image_destroys_default_view() {
    let mock = MockGraphicsDevice::new();
    let allocation = mock
        .create_image(&ImageDesc::depth_target(4, 4, Format::D32_SFLOAT))
        .unwrap();

    assert_eq!(mock.live_count("image_view"), 1);
    mock.destroy_image(allocation.image);
    assert_eq!(mock.live_count("image"), 0);
    assert_eq!(mock.live_count("image_view"), 0);
}

// ============================================================================
// SYNCHRONIZATION
// ============================================================================

#[test]
fn test_mock_timeline_signals_on_submit() {
    let mock = MockGraphicsDevice::new();
    let timeline = mock.create_timeline_semaphore(0).unwrap();

    mock.submit_frame(&FrameSubmit {
        command_buffer: NativeCommandBuffer(1),
        wait_semaphore: None,
        signal_semaphore: None,
        timeline,
        timeline_value: 3,
    })
    .unwrap();

    assert_eq!(mock.timeline_value(timeline), Ok(3));
    assert_eq!(mock.wait_timeline(timeline, 3, Duration::from_secs(1)), Ok(WaitStatus::Signaled));
}

#[test]
fn test_mock_stalled_gpu_times_out_until_completed() {
    let mock = MockGraphicsDevice::new();
    let timeline = mock.create_timeline_semaphore(0).unwrap();
    mock.set_gpu_stalled(true);

    mock.submit_frame(&FrameSubmit {
        command_buffer: NativeCommandBuffer(1),
        wait_semaphore: None,
        signal_semaphore: None,
        timeline,
        timeline_value: 1,
    })
    .unwrap();

    assert_eq!(mock.wait_timeline(timeline, 1, Duration::ZERO), Ok(WaitStatus::TimedOut));
    mock.complete_gpu_work();
    assert_eq!(mock.wait_timeline(timeline, 1, Duration::ZERO), Ok(WaitStatus::Signaled));
}

// ============================================================================
// SWAPCHAIN
// ============================================================================

#[test]
fn test_mock_acquire_rotates_and_honors_queue() {
    let mock = MockGraphicsDevice::new();
    let info = mock.create_swapchain(640, 480, PresentMode::Fifo).unwrap();
    assert_eq!(info.images.len(), 3);

    let semaphore = mock.create_semaphore().unwrap();
    let fence = mock.create_fence(false).unwrap();
    let timeout = Duration::from_secs(1);

    let indices: Vec<AcquireOutcome> = (0..4)
        .map(|_| mock.acquire_next_image(semaphore, fence, timeout).unwrap())
        .collect();
    assert_eq!(indices[0], AcquireOutcome::Acquired { index: 0, suboptimal: false });
    assert_eq!(indices[3], AcquireOutcome::Acquired { index: 0, suboptimal: false });

    mock.queue_acquire_outcome(AcquireOutcome::OutOfDate);
    assert_eq!(mock.acquire_next_image(semaphore, fence, timeout), Ok(AcquireOutcome::OutOfDate));

    mock.queue_present_outcome(PresentOutcome::Suboptimal);
    assert_eq!(mock.present(0, semaphore), Ok(PresentOutcome::Suboptimal));
    assert_eq!(mock.present(1, semaphore), Ok(PresentOutcome::Presented));
}

#[test]
fn test_mock_swapchain_recreate_replaces_images() {
    let mock = MockGraphicsDevice::new();
    mock.create_swapchain(640, 480, PresentMode::Fifo).unwrap();
    mock.create_swapchain(800, 600, PresentMode::Fifo).unwrap();

    assert_eq!(mock.live_count("swapchain_image"), 3);
    assert_eq!(mock.swapchain_extent(), (800, 600));
    assert_eq!(mock.count_calls("create_swapchain"), 2);
}
