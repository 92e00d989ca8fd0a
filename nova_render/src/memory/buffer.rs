/// Buffer - move-only handle to a GPU buffer owned by a `MemoryManager`
///
/// Dropping a `Buffer` retires it with `DiscardMode::Deferred`: the native
/// buffer stays valid until every frame that could still reference it has
/// completed. Use `MemoryManager::discard_buffer` to choose the mode.

use std::sync::Weak;
use crate::graphics_device::{NativeBuffer, BufferUsage, MemoryProperties};
use crate::memory::memory_manager::{MemoryShared, DiscardMode};

pub struct Buffer {
    pub(crate) native: NativeBuffer,
    pub(crate) size: u64,
    pub(crate) usage: BufferUsage,
    pub(crate) memory: MemoryProperties,
    pub(crate) device_address: Option<u64>,
    pub(crate) asset_id: u32,
    pub(crate) owner: Weak<MemoryShared>,
}

impl Buffer {
    pub fn native(&self) -> NativeBuffer {
        self.native
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn memory(&self) -> MemoryProperties {
        self.memory
    }

    /// GPU virtual address, present when created with `SHADER_DEVICE_ADDRESS`
    pub fn device_address(&self) -> Option<u64> {
        self.device_address
    }

    /// Stable small integer identifying the buffer while it is alive
    pub fn asset_id(&self) -> u32 {
        self.asset_id
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("native", &self.native)
            .field("size", &self.size)
            .field("asset_id", &self.asset_id)
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Owner gone: the manager already destroyed everything at shutdown
        if let Some(owner) = self.owner.upgrade() {
            owner.retire_buffer(self.asset_id, self.native, DiscardMode::Deferred);
        }
    }
}
