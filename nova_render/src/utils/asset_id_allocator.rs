/// Hands out stable small-integer asset IDs for live buffers.
///
/// IDs are dense: a freed ID is recycled before any fresh one, lowest
/// first, so bindless tables indexed by asset ID stay compact.
///
/// # Example
///
/// ```ignore
/// let mut ids = AssetIdAllocator::new();
/// let a = ids.alloc();  // 0
/// let b = ids.alloc();  // 1
/// ids.free(a);          // 0 is now available
/// let c = ids.alloc();  // 0 (recycled)
/// ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;

pub struct AssetIdAllocator {
    recycled: BinaryHeap<Reverse<u32>>,
    live: Vec<bool>,
    len: u32,
}

impl AssetIdAllocator {
    pub fn new() -> Self {
        Self {
            recycled: BinaryHeap::new(),
            live: Vec::new(),
            len: 0,
        }
    }

    /// Allocate the lowest available ID
    pub fn alloc(&mut self) -> u32 {
        let id = match self.recycled.pop() {
            Some(Reverse(id)) => id,
            None => {
                self.live.push(false);
                (self.live.len() - 1) as u32
            }
        };
        self.live[id as usize] = true;
        self.len += 1;
        id
    }

    /// Return an ID for reuse; `false` if it was not allocated
    pub fn free(&mut self, id: u32) -> bool {
        match self.live.get_mut(id as usize) {
            Some(live) if *live => {
                *live = false;
                self.len -= 1;
                self.recycled.push(Reverse(id));
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is currently allocated
    pub fn is_live(&self, id: u32) -> bool {
        self.live.get(id as usize).copied().unwrap_or(false)
    }

    /// Highest ID ever allocated + 1 (minimum size of an ID-indexed table)
    pub fn high_water_mark(&self) -> u32 {
        self.live.len() as u32
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for AssetIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "asset_id_allocator_tests.rs"]
mod tests;
