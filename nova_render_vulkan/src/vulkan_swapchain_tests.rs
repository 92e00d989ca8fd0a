//! Unit tests for swapchain parameter selection (no GPU)

use super::*;

fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR { format, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR }
}

fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min_count,
        max_image_count: max_count,
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: 1, height: 1 },
        max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
        ..Default::default()
    }
}

// ============================================================================
// Surface format
// ============================================================================

#[test]
fn test_surface_format_prefers_bgra_srgb() {
    let available = [
        surface_format(vk::Format::R8G8B8A8_UNORM),
        surface_format(vk::Format::R8G8B8A8_SRGB),
        surface_format(vk::Format::B8G8R8A8_SRGB),
    ];
    let (chosen, format) = choose_surface_format(&available).unwrap();
    assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    assert_eq!(format, Format::B8G8R8A8_SRGB);
}

#[test]
fn test_surface_format_falls_back_to_rgba_srgb() {
    let available = [surface_format(vk::Format::R8G8B8A8_UNORM), surface_format(vk::Format::R8G8B8A8_SRGB)];
    let (_, format) = choose_surface_format(&available).unwrap();
    assert_eq!(format, Format::R8G8B8A8_SRGB);
}

#[test]
fn test_surface_format_ignores_srgb_with_other_color_space() {
    let available = [
        vk::SurfaceFormatKHR { format: vk::Format::B8G8R8A8_SRGB, color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT },
        surface_format(vk::Format::B8G8R8A8_UNORM),
    ];
    let (chosen, format) = choose_surface_format(&available).unwrap();
    assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    assert_eq!(format, Format::B8G8R8A8_SRGB);
}

#[test]
fn test_surface_format_skips_unknown_formats() {
    let available = [surface_format(vk::Format::A2B10G10R10_UNORM_PACK32), surface_format(vk::Format::B8G8R8A8_UNORM)];
    let (_, format) = choose_surface_format(&available).unwrap();
    assert_eq!(format, Format::B8G8R8A8_UNORM);
}

#[test]
fn test_surface_format_none_when_nothing_usable() {
    assert!(choose_surface_format(&[]).is_none());
    assert!(choose_surface_format(&[surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)]).is_none());
}

// ============================================================================
// Present mode / extent / image count
// ============================================================================

#[test]
fn test_present_mode_uses_requested_when_available() {
    let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
    assert_eq!(choose_present_mode(vk::PresentModeKHR::MAILBOX, &available), vk::PresentModeKHR::MAILBOX);
}

#[test]
fn test_present_mode_falls_back_to_fifo() {
    let available = [vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(vk::PresentModeKHR::IMMEDIATE, &available), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_extent_uses_current_surface_extent() {
    let caps = capabilities((800, 600), 2, 3);
    assert_eq!(choose_extent(&caps, 1920, 1080), vk::Extent2D { width: 800, height: 600 });
}

#[test]
fn test_extent_clamps_requested_size_when_surface_is_open() {
    let caps = capabilities((u32::MAX, u32::MAX), 2, 3);
    assert_eq!(choose_extent(&caps, 1280, 720), vk::Extent2D { width: 1280, height: 720 });
    assert_eq!(choose_extent(&caps, 10_000, 0), vk::Extent2D { width: 4096, height: 1 });
}

#[test]
fn test_image_count_one_above_minimum() {
    assert_eq!(choose_image_count(&capabilities((1, 1), 2, 8)), 3);
}

#[test]
fn test_image_count_clamped_to_maximum() {
    assert_eq!(choose_image_count(&capabilities((1, 1), 3, 3)), 3);
}

#[test]
fn test_image_count_unbounded_maximum() {
    assert_eq!(choose_image_count(&capabilities((1, 1), 4, 0)), 5);
}
