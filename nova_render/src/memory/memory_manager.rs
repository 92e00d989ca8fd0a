/// MemoryManager - owns every GPU buffer and image allocation
///
/// Resources are handed out as move-only `Buffer` / `Image` handles holding a
/// weak reference back to the manager. Retiring a resource either destroys
/// it at once or parks it in a deferred queue for `frames_in_flight` calls to
/// `update()`. The frame scheduler calls `update()` right after its timeline
/// wait, so by the time a counter reaches zero the last frame that could
/// have referenced the resource has completed on the GPU.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::{engine_debug, engine_error, engine_trace, engine_warn};
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, NativeBuffer, NativeImage, MappedPtr,
    BufferDesc, BufferUsage, MemoryProperties, ImageDesc,
};
use crate::memory::{Buffer, Image};
use crate::utils::AssetIdAllocator;

const SOURCE: &str = "nova::MemoryManager";

/// How a retired resource is destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiscardMode {
    /// Destroy now; the caller guarantees the GPU no longer uses it
    Immediate,
    /// Destroy once every frame in flight has completed
    #[default]
    Deferred,
}

/// Allocation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub live_buffers: usize,
    pub live_images: usize,
    /// Retired resources still waiting in the deferred queue
    pub pending_destructions: usize,
    /// Bytes held by buffers, live or pending
    pub bytes_allocated: u64,
}

// ============================================================================
// Internal state
// ============================================================================

struct BufferRecord {
    native: NativeBuffer,
    size: u64,
    memory: MemoryProperties,
    /// Persistent mapping of host-coherent memory
    persistent: Option<MappedPtr>,
    /// Mapping obtained through `map` on non-coherent memory
    mapped: Option<MappedPtr>,
    retired: bool,
    debug_name: String,
}

struct ImageRecord {
    retired: bool,
    debug_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retired {
    Buffer(u32),
    Image(NativeImage),
}

struct PendingDestruction {
    resource: Retired,
    frames_remaining: u32,
}

struct MemoryState {
    frames_in_flight: u32,
    asset_ids: AssetIdAllocator,
    /// Indexed by asset ID
    buffers: Vec<Option<BufferRecord>>,
    images: FxHashMap<NativeImage, ImageRecord>,
    deferred: VecDeque<PendingDestruction>,
}

pub(crate) struct MemoryShared {
    device: Arc<dyn GraphicsDevice>,
    state: Mutex<MemoryState>,
}

impl MemoryShared {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain bookkeeping data behind
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Retire a buffer; used by `discard_buffer` and `Buffer::drop`
    pub(crate) fn retire_buffer(&self, asset_id: u32, native: NativeBuffer, mode: DiscardMode) {
        let mut state = self.lock();
        let Some(record) = state.buffers.get_mut(asset_id as usize).and_then(Option::as_mut) else {
            engine_error!(SOURCE, "Retiring unknown buffer (asset {})", asset_id);
            return;
        };
        if record.native != native || record.retired {
            engine_error!(SOURCE, "Buffer '{}' retired twice", record.debug_name);
            debug_assert!(false, "buffer retired twice");
            return;
        }

        match mode {
            DiscardMode::Immediate => {
                engine_trace!(SOURCE, "Destroying buffer '{}' now", record.debug_name);
                Self::destroy_buffer_record(&*self.device, &mut state, asset_id);
            }
            DiscardMode::Deferred => {
                record.retired = true;
                let frames_remaining = state.frames_in_flight;
                state.deferred.push_back(PendingDestruction {
                    resource: Retired::Buffer(asset_id),
                    frames_remaining,
                });
            }
        }
    }

    /// Retire an image; used by `discard_image` and `Image::drop`
    pub(crate) fn retire_image(&self, native: NativeImage, mode: DiscardMode) {
        let mut state = self.lock();
        let Some(record) = state.images.get_mut(&native) else {
            engine_error!(SOURCE, "Retiring unknown image {:?}", native);
            return;
        };
        if record.retired {
            engine_error!(SOURCE, "Image '{}' retired twice", record.debug_name);
            debug_assert!(false, "image retired twice");
            return;
        }

        match mode {
            DiscardMode::Immediate => {
                state.images.remove(&native);
                self.device.destroy_image(native);
            }
            DiscardMode::Deferred => {
                record.retired = true;
                let frames_remaining = state.frames_in_flight;
                state.deferred.push_back(PendingDestruction {
                    resource: Retired::Image(native),
                    frames_remaining,
                });
            }
        }
    }

    fn destroy_buffer_record(device: &dyn GraphicsDevice, state: &mut MemoryState, asset_id: u32) {
        if let Some(record) = state.buffers.get_mut(asset_id as usize).and_then(Option::take) {
            if record.mapped.is_some() {
                device.unmap_buffer(record.native);
            }
            device.destroy_buffer(record.native);
            state.asset_ids.free(asset_id);
        }
    }
}

impl Drop for MemoryShared {
    fn drop(&mut self) {
        let device = Arc::clone(&self.device);
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());

        let pending = state.deferred.len();
        for entry in std::mem::take(&mut state.deferred) {
            match entry.resource {
                Retired::Buffer(asset_id) => Self::destroy_buffer_record(&*device, state, asset_id),
                Retired::Image(native) => {
                    state.images.remove(&native);
                    device.destroy_image(native);
                }
            }
        }

        let mut leaked = 0;
        for asset_id in 0..state.buffers.len() as u32 {
            if state.buffers[asset_id as usize].is_some() {
                leaked += 1;
                Self::destroy_buffer_record(&*device, state, asset_id);
            }
        }
        for (native, _) in state.images.drain() {
            leaked += 1;
            device.destroy_image(native);
        }

        if leaked > 0 {
            engine_warn!(SOURCE, "Shutdown destroyed {} resources still held by handles", leaked);
        }
        engine_debug!(SOURCE, "Shutdown complete ({} deferred destructions flushed)", pending);
    }
}

// ============================================================================
// MemoryManager
// ============================================================================

/// Allocator and lifetime tracker for GPU buffers and images
pub struct MemoryManager {
    shared: Arc<MemoryShared>,
}

impl MemoryManager {
    /// Create a manager whose deferred discards wait `frames_in_flight` updates
    pub fn new(device: Arc<dyn GraphicsDevice>, frames_in_flight: u32) -> Self {
        Self {
            shared: Arc::new(MemoryShared {
                device,
                state: Mutex::new(MemoryState {
                    frames_in_flight: frames_in_flight.max(1),
                    asset_ids: AssetIdAllocator::new(),
                    buffers: Vec::new(),
                    images: FxHashMap::default(),
                    deferred: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.shared.lock().frames_in_flight
    }

    // ===== BUFFERS =====

    /// Allocate a buffer
    ///
    /// Host-coherent buffers come back persistently mapped. A device address
    /// is resolved when `SHADER_DEVICE_ADDRESS` is part of the usage.
    /// Allocation failure returns `Error::OutOfMemory` and allocates nothing.
    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer> {
        if desc.size == 0 {
            engine_error!(SOURCE, "Buffer '{}' has zero size", desc.debug_name);
            return Err(Error::InvalidResource(format!("buffer '{}' has zero size", desc.debug_name)));
        }

        let device = &self.shared.device;
        let allocation = device.create_buffer(desc).map_err(|e| {
            engine_error!(SOURCE, "Failed to allocate buffer '{}' ({} bytes): {}", desc.debug_name, desc.size, e);
            e
        })?;

        let device_address = if desc.usage.contains(BufferUsage::SHADER_DEVICE_ADDRESS) {
            match device.buffer_device_address(allocation.buffer) {
                Ok(address) => Some(address),
                Err(e) => {
                    device.destroy_buffer(allocation.buffer);
                    engine_error!(SOURCE, "No device address for buffer '{}': {}", desc.debug_name, e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let persistent = if desc.memory.contains(MemoryProperties::HOST_COHERENT) {
            allocation.mapped
        } else {
            None
        };

        let mut state = self.shared.lock();
        let asset_id = state.asset_ids.alloc();
        if state.buffers.len() <= asset_id as usize {
            state.buffers.resize_with(asset_id as usize + 1, || None);
        }
        state.buffers[asset_id as usize] = Some(BufferRecord {
            native: allocation.buffer,
            size: desc.size,
            memory: desc.memory,
            persistent,
            mapped: None,
            retired: false,
            debug_name: desc.debug_name.clone(),
        });

        engine_trace!(SOURCE, "Created buffer '{}' ({} bytes, asset {})", desc.debug_name, desc.size, asset_id);

        Ok(Buffer {
            native: allocation.buffer,
            size: desc.size,
            usage: desc.usage,
            memory: desc.memory,
            device_address,
            asset_id,
            owner: Arc::downgrade(&self.shared),
        })
    }

    /// Host-visible, coherent `TRANSFER_SRC` buffer for uploads
    pub fn create_staging_buffer(&self, size: u64, debug_name: &str) -> Result<Buffer> {
        self.create_buffer(&BufferDesc {
            size,
            usage: BufferUsage::TRANSFER_SRC,
            memory: MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
            debug_name: debug_name.to_string(),
        })
    }

    /// Host pointer to the buffer's memory
    ///
    /// Returns the persistent mapping for coherent memory, otherwise maps it
    /// until `unmap`. Device-local memory cannot be mapped.
    pub fn map(&self, buffer: &Buffer) -> Result<MappedPtr> {
        self.check_owner(buffer)?;
        let mut state = self.shared.lock();
        let record = Self::live_record(&mut state, buffer)?;

        if let Some(ptr) = record.persistent.or(record.mapped) {
            return Ok(ptr);
        }
        if !record.memory.contains(MemoryProperties::HOST_VISIBLE) {
            engine_error!(SOURCE, "Buffer '{}' is not host-visible", record.debug_name);
            return Err(Error::InvalidResource(format!("buffer '{}' is not host-visible", record.debug_name)));
        }

        let ptr = self.shared.device.map_buffer(record.native)?;
        record.mapped = Some(ptr);
        Ok(ptr)
    }

    /// Release a mapping obtained with `map`; no-op for persistent mappings
    pub fn unmap(&self, buffer: &Buffer) -> Result<()> {
        self.check_owner(buffer)?;
        let mut state = self.shared.lock();
        let record = Self::live_record(&mut state, buffer)?;

        if record.mapped.take().is_some() {
            self.shared.device.unmap_buffer(record.native);
        }
        Ok(())
    }

    /// Write `data` at `offset`, mapping temporarily when needed
    pub fn copy_data(&self, buffer: &Buffer, data: &[u8], offset: u64) -> Result<()> {
        self.check_range(buffer, offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }

        self.with_mapping(buffer, |ptr| {
            // SAFETY: range checked against the buffer size above; the mapping
            // covers the whole buffer and outlives this call.
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
            }
        })
    }

    /// Write a slice of plain-old-data values at `offset`
    pub fn copy_pod<T: bytemuck::Pod>(&self, buffer: &Buffer, values: &[T], offset: u64) -> Result<()> {
        self.copy_data(buffer, bytemuck::cast_slice(values), offset)
    }

    /// Read `len` bytes at `offset` from a host-visible buffer
    pub fn read_data(&self, buffer: &Buffer, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.check_range(buffer, offset, len)?;
        let mut out = vec![0u8; len as usize];
        if len == 0 {
            return Ok(out);
        }

        self.with_mapping(buffer, |ptr| {
            // SAFETY: see copy_data
            unsafe {
                std::ptr::copy_nonoverlapping(ptr.add(offset as usize), out.as_mut_ptr(), len as usize);
            }
        })?;
        Ok(out)
    }

    /// Retire a buffer
    pub fn discard_buffer(&self, mut buffer: Buffer, mode: DiscardMode) -> Result<()> {
        self.check_owner(&buffer)?;
        // Detach so the handle's Drop does not retire it a second time
        buffer.owner = std::sync::Weak::new();
        self.shared.retire_buffer(buffer.asset_id, buffer.native, mode);
        Ok(())
    }

    // ===== IMAGES =====

    /// Allocate an image and its default view
    pub fn create_image(&self, desc: &ImageDesc) -> Result<Image> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 || desc.array_layers == 0 {
            engine_error!(SOURCE, "Image '{}' has an empty extent: {:?}", desc.debug_name, desc);
            return Err(Error::InvalidResource(format!("image '{}' has an empty extent", desc.debug_name)));
        }

        let allocation = self.shared.device.create_image(desc).map_err(|e| {
            engine_error!(
                SOURCE,
                "Failed to allocate image '{}' ({}x{} {:?}): {}",
                desc.debug_name, desc.width, desc.height, desc.format, e
            );
            e
        })?;

        self.shared.lock().images.insert(
            allocation.image,
            ImageRecord { retired: false, debug_name: desc.debug_name.clone() },
        );

        engine_trace!(SOURCE, "Created image '{}' ({}x{})", desc.debug_name, desc.width, desc.height);

        Ok(Image {
            native: allocation.image,
            view: allocation.view,
            format: desc.format,
            width: desc.width,
            height: desc.height,
            owner: Arc::downgrade(&self.shared),
        })
    }

    /// Retire an image
    pub fn discard_image(&self, mut image: Image, mode: DiscardMode) -> Result<()> {
        if !std::ptr::eq(image.owner.as_ptr(), Arc::as_ptr(&self.shared)) {
            engine_error!(SOURCE, "Image {:?} belongs to another manager", image.native);
            return Err(Error::InvalidResource("image belongs to another manager".to_string()));
        }
        image.owner = std::sync::Weak::new();
        self.shared.retire_image(image.native, mode);
        Ok(())
    }

    // ===== FRAME TICK =====

    /// Advance the deferred queue by one frame
    ///
    /// Every pending entry loses one frame; entries reaching zero are
    /// destroyed in the order they were retired. Returns how many resources
    /// were destroyed.
    pub fn update(&self) -> usize {
        let mut state = self.shared.lock();
        for entry in state.deferred.iter_mut() {
            entry.frames_remaining = entry.frames_remaining.saturating_sub(1);
        }

        let mut destroyed = 0;
        let mut kept = VecDeque::with_capacity(state.deferred.len());
        for entry in std::mem::take(&mut state.deferred) {
            if entry.frames_remaining > 0 {
                kept.push_back(entry);
                continue;
            }
            match entry.resource {
                Retired::Buffer(asset_id) => {
                    MemoryShared::destroy_buffer_record(&*self.shared.device, &mut state, asset_id);
                }
                Retired::Image(native) => {
                    state.images.remove(&native);
                    self.shared.device.destroy_image(native);
                }
            }
            destroyed += 1;
        }
        state.deferred = kept;

        if destroyed > 0 {
            engine_trace!(SOURCE, "Destroyed {} deferred resources", destroyed);
        }
        destroyed
    }

    pub fn stats(&self) -> MemoryStats {
        let state = self.shared.lock();
        let buffers = state.buffers.iter().flatten();
        MemoryStats {
            live_buffers: buffers.clone().filter(|b| !b.retired).count(),
            live_images: state.images.values().filter(|i| !i.retired).count(),
            pending_destructions: state.deferred.len(),
            bytes_allocated: buffers.map(|b| b.size).sum(),
        }
    }

    // ===== HELPERS =====

    fn check_owner(&self, buffer: &Buffer) -> Result<()> {
        if std::ptr::eq(buffer.owner.as_ptr(), Arc::as_ptr(&self.shared)) {
            Ok(())
        } else {
            engine_error!(SOURCE, "Buffer {:?} belongs to another manager", buffer.native);
            Err(Error::InvalidResource("buffer belongs to another manager".to_string()))
        }
    }

    fn check_range(&self, buffer: &Buffer, offset: u64, len: u64) -> Result<()> {
        self.check_owner(buffer)?;
        match offset.checked_add(len) {
            Some(end) if end <= buffer.size => Ok(()),
            _ => {
                engine_error!(
                    SOURCE,
                    "Access of {} bytes at offset {} exceeds buffer size {}",
                    len, offset, buffer.size
                );
                Err(Error::InvalidResource(format!(
                    "range {}..{} outside buffer of {} bytes",
                    offset, offset.saturating_add(len), buffer.size
                )))
            }
        }
    }

    fn live_record<'a>(state: &'a mut MemoryState, buffer: &Buffer) -> Result<&'a mut BufferRecord> {
        state
            .buffers
            .get_mut(buffer.asset_id as usize)
            .and_then(Option::as_mut)
            .filter(|r| r.native == buffer.native && !r.retired)
            .ok_or_else(|| Error::InvalidResource(format!("buffer {:?} is not live", buffer.native)))
    }

    /// Run `f` on the buffer's host pointer, mapping around the call if needed
    fn with_mapping(&self, buffer: &Buffer, f: impl FnOnce(*mut u8)) -> Result<()> {
        let already_mapped = {
            let mut state = self.shared.lock();
            let record = Self::live_record(&mut state, buffer)?;
            record.persistent.or(record.mapped)
        };

        match already_mapped {
            Some(ptr) => {
                f(ptr.as_ptr());
                Ok(())
            }
            None => {
                let ptr = self.map(buffer)?;
                f(ptr.as_ptr());
                self.unmap(buffer)
            }
        }
    }
}

#[cfg(test)]
#[path = "memory_manager_tests.rs"]
mod tests;
