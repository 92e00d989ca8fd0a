/// Batched descriptor writes into one descriptor set
///
/// Writes are collected and flushed with a single `write_descriptors` call
/// on `commit`. Writing the same (slot, array index) twice keeps the last
/// write.

use crate::engine_error;
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, NativeDescriptorSet, NativeBuffer, NativeImageView, NativeSampler,
    DescriptorType, DescriptorResource, DescriptorWrite, ImageLayout,
};
use crate::memory::Buffer;

/// Range value covering a buffer from `offset` to its end
pub const WHOLE_SIZE: u64 = u64::MAX;

pub struct DescriptorSetWriter<'a> {
    device: &'a dyn GraphicsDevice,
    set: NativeDescriptorSet,
    writes: Vec<DescriptorWrite>,
}

impl<'a> DescriptorSetWriter<'a> {
    pub fn new(device: &'a dyn GraphicsDevice, set: NativeDescriptorSet) -> Self {
        Self { device, set, writes: Vec::new() }
    }

    fn push(&mut self, write: DescriptorWrite) -> &mut Self {
        match self
            .writes
            .iter_mut()
            .find(|w| w.binding == write.binding && w.array_index == write.array_index)
        {
            Some(existing) => *existing = write,
            None => self.writes.push(write),
        }
        self
    }

    /// Write a raw buffer range of a buffer descriptor type
    pub fn write_buffer(
        &mut self,
        slot: u32,
        array_index: u32,
        descriptor_type: DescriptorType,
        buffer: NativeBuffer,
        offset: u64,
        range: u64,
    ) -> Result<&mut Self> {
        if !descriptor_type.is_buffer() {
            engine_error!("nova::Descriptor", "{:?} is not a buffer descriptor (slot {})", descriptor_type, slot);
            return Err(Error::InvalidOperation(format!("{:?} is not a buffer descriptor", descriptor_type)));
        }
        Ok(self.push(DescriptorWrite {
            binding: slot,
            array_index,
            descriptor_type,
            resource: DescriptorResource::Buffer { buffer, offset, range },
        }))
    }

    pub fn write_uniform_buffer(&mut self, slot: u32, array_index: u32, buffer: &Buffer) -> &mut Self {
        self.push(DescriptorWrite {
            binding: slot,
            array_index,
            descriptor_type: DescriptorType::UniformBuffer,
            resource: DescriptorResource::Buffer { buffer: buffer.native(), offset: 0, range: WHOLE_SIZE },
        })
    }

    pub fn write_storage_buffer(&mut self, slot: u32, array_index: u32, buffer: &Buffer) -> &mut Self {
        self.push(DescriptorWrite {
            binding: slot,
            array_index,
            descriptor_type: DescriptorType::StorageBuffer,
            resource: DescriptorResource::Buffer { buffer: buffer.native(), offset: 0, range: WHOLE_SIZE },
        })
    }

    pub fn write_image_sampler(
        &mut self,
        slot: u32,
        array_index: u32,
        view: NativeImageView,
        sampler: NativeSampler,
        layout: ImageLayout,
    ) -> &mut Self {
        self.push(DescriptorWrite {
            binding: slot,
            array_index,
            descriptor_type: DescriptorType::CombinedImageSampler,
            resource: DescriptorResource::Image { view, sampler: Some(sampler), layout },
        })
    }

    pub fn write_sampled_image(
        &mut self,
        slot: u32,
        array_index: u32,
        view: NativeImageView,
        layout: ImageLayout,
    ) -> &mut Self {
        self.push(DescriptorWrite {
            binding: slot,
            array_index,
            descriptor_type: DescriptorType::SampledImage,
            resource: DescriptorResource::Image { view, sampler: None, layout },
        })
    }

    /// Storage images are always accessed in the General layout
    pub fn write_storage_image(&mut self, slot: u32, array_index: u32, view: NativeImageView) -> &mut Self {
        self.push(DescriptorWrite {
            binding: slot,
            array_index,
            descriptor_type: DescriptorType::StorageImage,
            resource: DescriptorResource::Image { view, sampler: None, layout: ImageLayout::General },
        })
    }

    /// Pending writes, one per (slot, array index)
    pub fn writes(&self) -> &[DescriptorWrite] {
        &self.writes
    }

    /// Flush every pending write; returns how many were issued
    pub fn commit(&mut self) -> usize {
        let count = self.writes.len();
        if count > 0 {
            self.device.write_descriptors(self.set, &self.writes);
            self.writes.clear();
        }
        count
    }
}
