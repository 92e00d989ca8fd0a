/// Swapchain - presentable images for the window surface
///
/// Recreation retires the previous chain through `old_swapchain`; the caller
/// waits for the device to go idle first. Acquire and present semaphores are
/// owned by the caller, only the image views live here.

use ash::vk;
use nova_render::nova::device::{
    AcquireOutcome, Format, NativeFence, NativeImage, NativeImageView, NativeSemaphore, PresentMode,
    PresentOutcome, SwapchainImage, SwapchainInfo,
};
use nova_render::nova::{Error, Result};
use nova_render::{engine_debug, engine_error, engine_info, engine_warn};
use std::time::Duration;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{format_from_vk, present_mode_to_vk, timeout_ns, vk_error, vk_handle};

const SOURCE: &str = "nova::vulkan::swapchain";

pub(crate) struct Swapchain {
    device: ash::Device,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain, retiring `previous` when given
    pub fn create(
        ctx: &VulkanContext,
        width: u32,
        height: u32,
        present_mode: PresentMode,
        previous: Option<Swapchain>,
    ) -> Result<Self> {
        unsafe {
            let capabilities = ctx
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
                .map_err(|e| vk_error("query surface capabilities", e))?;
            let formats = ctx
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, ctx.surface)
                .map_err(|e| vk_error("query surface formats", e))?;
            let modes = ctx
                .surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, ctx.surface)
                .map_err(|e| vk_error("query present modes", e))?;

            let (surface_format, format) = choose_surface_format(&formats).ok_or_else(|| {
                engine_error!(SOURCE, "Surface exposes no supported color format: {:?}", formats);
                Error::InitializationFailed("no supported surface format".to_string())
            })?;
            let mode = choose_present_mode(present_mode_to_vk(present_mode), &modes);
            if mode != present_mode_to_vk(present_mode) {
                engine_warn!(SOURCE, "Present mode {:?} unsupported, falling back to FIFO", present_mode);
            }
            let extent = choose_extent(&capabilities, width, height);
            if extent.width == 0 || extent.height == 0 {
                return Err(Error::InvalidOperation("surface has zero extent".to_string()));
            }

            let queue_families = [ctx.graphics_family, ctx.present_family];
            let old_swapchain = previous.as_ref().map_or(vk::SwapchainKHR::null(), |chain| chain.swapchain);
            let mut create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(ctx.surface)
                .min_image_count(choose_image_count(&capabilities))
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(mode)
                .clipped(true)
                .old_swapchain(old_swapchain);
            create_info = if ctx.graphics_family != ctx.present_family {
                create_info
                    .image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&queue_families)
            } else {
                create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            };

            let swapchain = ctx
                .swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| vk_error("create swapchain", e))?;
            // Retired chain is released once the new one exists
            drop(previous);

            let mut chain = Self {
                device: ctx.device.clone(),
                loader: ctx.swapchain_loader.clone(),
                swapchain,
                images: Vec::new(),
                views: Vec::new(),
                format,
                extent,
            };

            chain.images = ctx
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| vk_error("get swapchain images", e))?;

            for &image in &chain.images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = ctx
                    .device
                    .create_image_view(&view_info, None)
                    .map_err(|e| vk_error("create swapchain image view", e))?;
                chain.views.push(view);
            }

            engine_info!(
                SOURCE,
                "Swapchain created: {}x{}, {} images, {:?}, {:?}",
                extent.width, extent.height, chain.images.len(), format, mode
            );
            Ok(chain)
        }
    }

    pub fn info(&self) -> SwapchainInfo {
        SwapchainInfo {
            format: self.format,
            width: self.extent.width,
            height: self.extent.height,
            images: self
                .images
                .iter()
                .zip(&self.views)
                .map(|(&image, &view)| SwapchainImage {
                    image: NativeImage(vk::Handle::as_raw(image)),
                    view: NativeImageView(vk::Handle::as_raw(view)),
                })
                .collect(),
        }
    }

    pub fn acquire(&self, semaphore: NativeSemaphore, fence: NativeFence, timeout: Duration) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                timeout_ns(timeout),
                vk_handle(semaphore.0),
                vk_handle(fence.0),
            )
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!(SOURCE, "Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                engine_error!(SOURCE, "No swapchain image became available within {:?}", timeout);
                Err(Error::DeviceLost("swapchain acquire timed out".to_string()))
            }
            Err(e) => Err(vk_error("acquire swapchain image", e)),
        }
    }

    pub fn present(&self, ctx: &VulkanContext, image_index: u32, wait_semaphore: NativeSemaphore) -> Result<PresentOutcome> {
        if image_index as usize >= self.images.len() {
            return Err(Error::InvalidResource(format!(
                "swapchain image index {} out of range (count: {})",
                image_index,
                self.images.len()
            )));
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [vk_handle::<vk::Semaphore>(wait_semaphore.0)];
        let mut present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        if !wait_semaphore.is_null() {
            present_info = present_info.wait_semaphores(&wait_semaphores);
        }

        let _queue = ctx.queue_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match unsafe { self.loader.queue_present(ctx.present_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!(SOURCE, "Swapchain out of date during present");
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(vk_error("present swapchain image", e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Preferred sRGB surface format, else the first one the core can describe
pub(crate) fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, Format)> {
    let preferred = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];
    preferred
        .iter()
        .find_map(|&wanted| {
            available.iter().find(|f| {
                f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| available.iter().find(|f| format_from_vk(f.format).is_some()))
        .and_then(|&f| format_from_vk(f.format).map(|format| (f, format)))
}

/// Requested mode when supported, FIFO otherwise (always available)
pub(crate) fn choose_present_mode(requested: vk::PresentModeKHR, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the requested size clamped when the surface leaves it open
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// One image above the minimum, bounded by the maximum (0 means unbounded)
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
