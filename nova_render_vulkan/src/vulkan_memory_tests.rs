//! Unit tests for default view aspects (no GPU)

use super::*;

#[test]
fn test_color_view_aspect() {
    assert_eq!(view_aspect(Format::R8G8B8A8_UNORM, ImageUsage::SAMPLED), vk::ImageAspectFlags::COLOR);
}

#[test]
fn test_depth_stencil_attachment_keeps_both_aspects() {
    assert_eq!(
        view_aspect(Format::D32_SFLOAT_S8_UINT, ImageUsage::DEPTH_STENCIL_ATTACHMENT),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
}

#[test]
fn test_sampled_depth_stencil_view_is_depth_only() {
    assert_eq!(
        view_aspect(Format::D24_UNORM_S8_UINT, ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::SAMPLED),
        vk::ImageAspectFlags::DEPTH
    );
}

#[test]
fn test_depth_only_format() {
    assert_eq!(
        view_aspect(Format::D32_SFLOAT, ImageUsage::DEPTH_STENCIL_ATTACHMENT),
        vk::ImageAspectFlags::DEPTH
    );
}
