/// Coalesced descriptor set binding
///
/// Sets are collected by slot and bound on `commit` with as few bind calls
/// as possible: each run of adjacent slots becomes one call. No command
/// buffer or layout is stored, so one binder can be committed against
/// several pipelines.

use crate::engine_error;
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, NativeCommandBuffer, NativeDescriptorSet, NativePipelineLayout, PipelineBindPoint,
};

/// Number of consecutive slots a binder covers
pub const MAX_SET_ARRAY: usize = 16;

/// One contiguous run of sets starting at `first_slot`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRange {
    pub first_slot: u32,
    pub sets: Vec<NativeDescriptorSet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSetMultiBinder {
    base_slot: u32,
    sets: [Option<NativeDescriptorSet>; MAX_SET_ARRAY],
}

impl DescriptorSetMultiBinder {
    /// Binder covering slots `base_slot .. base_slot + MAX_SET_ARRAY`
    pub fn new(base_slot: u32) -> Self {
        Self { base_slot, sets: [None; MAX_SET_ARRAY] }
    }

    /// Place `set` at `slot`, replacing any set already there
    pub fn bind(&mut self, set: NativeDescriptorSet, slot: u32) -> Result<&mut Self> {
        let index = slot
            .checked_sub(self.base_slot)
            .map(|i| i as usize)
            .filter(|i| *i < MAX_SET_ARRAY);

        match index {
            Some(index) if !set.is_null() => {
                self.sets[index] = Some(set);
                Ok(self)
            }
            Some(_) => {
                engine_error!("nova::Descriptor", "Null descriptor set bound at slot {}", slot);
                Err(Error::InvalidOperation(format!("null descriptor set at slot {}", slot)))
            }
            None => {
                engine_error!(
                    "nova::Descriptor",
                    "Slot {} outside binder range {}..{}",
                    slot, self.base_slot, self.base_slot.saturating_add(MAX_SET_ARRAY as u32)
                );
                Err(Error::InvalidOperation(format!("slot {} outside binder range", slot)))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(Option::is_none)
    }

    pub fn clear(&mut self) {
        self.sets = [None; MAX_SET_ARRAY];
    }

    /// Contiguous runs of bound sets, in slot order
    pub fn ranges(&self) -> Vec<BindRange> {
        let mut ranges: Vec<BindRange> = Vec::new();
        let mut current: Option<BindRange> = None;

        for (i, set) in self.sets.iter().enumerate() {
            match (set, current.as_mut()) {
                (Some(set), Some(run)) => run.sets.push(*set),
                (Some(set), None) => {
                    current = Some(BindRange { first_slot: self.base_slot.saturating_add(i as u32), sets: vec![*set] });
                }
                (None, _) => ranges.extend(current.take()),
            }
        }
        ranges.extend(current);
        ranges
    }

    /// Record one bind call per contiguous run; returns the number of calls
    pub fn commit(
        &self,
        device: &dyn GraphicsDevice,
        command_buffer: NativeCommandBuffer,
        bind_point: PipelineBindPoint,
        layout: NativePipelineLayout,
    ) -> usize {
        let ranges = self.ranges();
        for range in &ranges {
            device.cmd_bind_descriptor_sets(command_buffer, bind_point, layout, range.first_slot, &range.sets);
        }
        ranges.len()
    }
}

impl Default for DescriptorSetMultiBinder {
    fn default() -> Self {
        Self::new(0)
    }
}
