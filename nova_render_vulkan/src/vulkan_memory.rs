/// Vulkan memory - buffers and images bound to gpu-allocator sub-allocations
///
/// Host-visible allocations stay persistently mapped for their whole
/// lifetime; `map` only hands back the pointer.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocationError;
use nova_render::nova::device::{
    BufferAllocation, BufferDesc, Format, ImageAllocation, ImageDesc, ImageUsage, MappedPtr, NativeBuffer,
    NativeImage, NativeImageView,
};
use nova_render::nova::{Error, Result};
use nova_render::{engine_bail, engine_error, engine_trace, engine_warn};
use rustc_hash::FxHashMap;
use std::sync::{Mutex, MutexGuard};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{
    aspect_mask, buffer_usage_to_vk, format_to_vk, image_usage_to_vk, memory_location, vk_error, vk_handle,
};

const SOURCE: &str = "nova::vulkan::memory";

struct BufferEntry {
    buffer: vk::Buffer,
    allocation: Allocation,
}

struct ImageEntry {
    image: vk::Image,
    view: vk::ImageView,
    format: Format,
    allocation: Allocation,
}

struct MemoryState {
    allocator: Allocator,
    buffers: FxHashMap<NativeBuffer, BufferEntry>,
    images: FxHashMap<NativeImage, ImageEntry>,
}

pub(crate) struct VulkanMemory {
    device: ash::Device,
    state: Mutex<MemoryState>,
}

fn allocation_error(what: &str, size: u64, e: AllocationError) -> Error {
    match e {
        AllocationError::OutOfMemory => {
            engine_error!(SOURCE, "Out of GPU memory for {} ({:.2} MB)", what, size as f64 / (1024.0 * 1024.0));
            Error::OutOfMemory
        }
        other => {
            engine_error!(SOURCE, "Allocation for {} failed: {}", what, other);
            Error::BackendError(format!("allocation for {} failed: {}", what, other))
        }
    }
}

impl VulkanMemory {
    pub fn new(ctx: &VulkanContext) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ctx.instance.clone(),
            device: ctx.device.clone(),
            physical_device: ctx.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: ctx.capabilities.buffer_device_address,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| {
            engine_error!(SOURCE, "Failed to create GPU allocator: {}", e);
            Error::InitializationFailed(format!("Failed to create allocator: {}", e))
        })?;

        Ok(Self {
            device: ctx.device.clone(),
            state: Mutex::new(MemoryState {
                allocator,
                buffers: FxHashMap::default(),
                images: FxHashMap::default(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== BUFFERS =====

    pub fn create_buffer(&self, ctx: &VulkanContext, desc: &BufferDesc) -> Result<BufferAllocation> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("buffer '{}' has zero size", desc.debug_name)));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| vk_error("create buffer", e))?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let mut state = self.lock();
            let allocation = match state.allocator.allocate(&AllocationCreateDesc {
                name: &desc.debug_name,
                requirements,
                location: memory_location(desc.memory),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(allocation_error(&desc.debug_name, requirements.size, e));
                }
            };

            if let Err(e) = self
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            {
                state.allocator.free(allocation).ok();
                self.device.destroy_buffer(buffer, None);
                return Err(vk_error("bind buffer memory", e));
            }

            let mapped = allocation
                .mapped_ptr()
                .and_then(|ptr| MappedPtr::new(ptr.as_ptr() as *mut u8));
            let native = NativeBuffer(vk::Handle::as_raw(buffer));
            state.buffers.insert(native, BufferEntry { buffer, allocation });
            drop(state);

            ctx.set_name(buffer, &desc.debug_name);
            engine_trace!(SOURCE, "Buffer '{}' created ({} bytes, mapped: {})", desc.debug_name, desc.size, mapped.is_some());
            Ok(BufferAllocation { buffer: native, mapped })
        }
    }

    pub fn destroy_buffer(&self, buffer: NativeBuffer) {
        let mut state = self.lock();
        let Some(entry) = state.buffers.remove(&buffer) else {
            engine_warn!(SOURCE, "destroy_buffer: unknown buffer {:#x}", buffer.0);
            return;
        };
        unsafe {
            self.device.destroy_buffer(entry.buffer, None);
        }
        if let Err(e) = state.allocator.free(entry.allocation) {
            engine_warn!(SOURCE, "Failed to free buffer memory: {}", e);
        }
    }

    /// Persistent host pointer of a buffer
    pub fn mapped_ptr(&self, buffer: NativeBuffer) -> Result<MappedPtr> {
        let state = self.lock();
        let Some(entry) = state.buffers.get(&buffer) else {
            return Err(Error::InvalidResource(format!("unknown buffer {:#x}", buffer.0)));
        };
        entry
            .allocation
            .mapped_ptr()
            .and_then(|ptr| MappedPtr::new(ptr.as_ptr() as *mut u8))
            .ok_or_else(|| Error::InvalidResource("buffer memory is not host visible".to_string()))
    }

    pub fn device_address(&self, ctx: &VulkanContext, buffer: NativeBuffer) -> Result<u64> {
        if !ctx.capabilities.buffer_device_address {
            engine_bail!(SOURCE, "Buffer device address is not supported by '{}'", ctx.capabilities.device_name);
        }
        if !self.lock().buffers.contains_key(&buffer) {
            return Err(Error::InvalidResource(format!("unknown buffer {:#x}", buffer.0)));
        }
        let info = vk::BufferDeviceAddressInfo::default().buffer(vk_handle(buffer.0));
        Ok(unsafe { self.device.get_buffer_device_address(&info) })
    }

    // ===== IMAGES =====

    pub fn create_image(&self, ctx: &VulkanContext, desc: &ImageDesc) -> Result<ImageAllocation> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 || desc.array_layers == 0 {
            return Err(Error::InvalidResource(format!(
                "image '{}' has a zero dimension ({}x{}, {} mips, {} layers)",
                desc.debug_name, desc.width, desc.height, desc.mip_levels, desc.array_layers
            )));
        }
        if desc.format == Format::UNDEFINED {
            return Err(Error::InvalidResource(format!("image '{}' has an undefined format", desc.debug_name)));
        }

        let format = format_to_vk(desc.format);
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe {
            let image = self
                .device
                .create_image(&image_info, None)
                .map_err(|e| vk_error("create image", e))?;
            let requirements = self.device.get_image_memory_requirements(image);

            let mut state = self.lock();
            let allocation = match state.allocator.allocate(&AllocationCreateDesc {
                name: &desc.debug_name,
                requirements,
                location: memory_location(desc.memory),
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(allocation_error(&desc.debug_name, requirements.size, e));
                }
            };

            if let Err(e) = self
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
            {
                state.allocator.free(allocation).ok();
                self.device.destroy_image(image, None);
                return Err(vk_error("bind image memory", e));
            }

            let view_type = if desc.array_layers > 1 {
                vk::ImageViewType::TYPE_2D_ARRAY
            } else {
                vk::ImageViewType::TYPE_2D
            };
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(view_type)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: view_aspect(desc.format, desc.usage),
                    base_mip_level: 0,
                    level_count: desc.mip_levels,
                    base_array_layer: 0,
                    layer_count: desc.array_layers,
                });
            let view = match self.device.create_image_view(&view_info, None) {
                Ok(view) => view,
                Err(e) => {
                    state.allocator.free(allocation).ok();
                    self.device.destroy_image(image, None);
                    return Err(vk_error("create image view", e));
                }
            };

            let native = NativeImage(vk::Handle::as_raw(image));
            state.images.insert(native, ImageEntry { image, view, format: desc.format, allocation });
            drop(state);

            ctx.set_name(image, &desc.debug_name);
            engine_trace!(SOURCE, "Image '{}' created ({}x{} {:?})", desc.debug_name, desc.width, desc.height, desc.format);
            Ok(ImageAllocation {
                image: native,
                view: NativeImageView(vk::Handle::as_raw(view)),
            })
        }
    }

    pub fn destroy_image(&self, image: NativeImage) {
        let mut state = self.lock();
        let Some(entry) = state.images.remove(&image) else {
            engine_warn!(SOURCE, "destroy_image: unknown image {:#x}", image.0);
            return;
        };
        unsafe {
            self.device.destroy_image_view(entry.view, None);
            self.device.destroy_image(entry.image, None);
        }
        if let Err(e) = state.allocator.free(entry.allocation) {
            engine_warn!(SOURCE, "Failed to free image memory: {}", e);
        }
    }

    /// Format of an image created here, `None` for swapchain images
    pub fn image_format(&self, image: NativeImage) -> Option<Format> {
        self.lock().images.get(&image).map(|entry| entry.format)
    }

    /// Format behind a default view created here
    pub fn view_format(&self, view: NativeImageView) -> Option<Format> {
        let view: vk::ImageView = vk_handle(view.0);
        self.lock().images.values().find(|entry| entry.view == view).map(|entry| entry.format)
    }
}

/// Aspect of a default view
///
/// Sampled depth images get a depth-only view since a sampled view must name
/// a single aspect. Attachment-only targets keep the stencil aspect too.
fn view_aspect(format: Format, usage: ImageUsage) -> vk::ImageAspectFlags {
    if format.is_depth() && usage.contains(ImageUsage::SAMPLED) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect_mask(format)
    }
}

impl Drop for VulkanMemory {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !state.buffers.is_empty() || !state.images.is_empty() {
            engine_warn!(
                SOURCE,
                "Releasing {} leaked buffer(s) and {} leaked image(s)",
                state.buffers.len(),
                state.images.len()
            );
        }
        unsafe {
            for (_, entry) in state.buffers.drain() {
                self.device.destroy_buffer(entry.buffer, None);
                state.allocator.free(entry.allocation).ok();
            }
            for (_, entry) in state.images.drain() {
                self.device.destroy_image_view(entry.view, None);
                self.device.destroy_image(entry.image, None);
                state.allocator.free(entry.allocation).ok();
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_memory_tests.rs"]
mod tests;
