//! Unit tests for the descriptor helpers
//!
//! Layout builder validation, writer batching and multi-binder coalescing.

use crate::descriptor::*;
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::graphics_device::{
    GraphicsDevice, DescriptorType, DescriptorResource, ShaderStageFlags, DescriptorBindingFlags,
    DescriptorSetLayoutCreateFlags, NativeDescriptorSet, NativeImageView, NativeSampler,
    NativeBuffer, NativeCommandBuffer, NativePipelineLayout, PipelineBindPoint, ImageLayout,
};
use crate::error::Error;
use std::sync::Arc;

fn setup() -> (Arc<MockGraphicsDevice>, Arc<dyn GraphicsDevice>) {
    let mock = Arc::new(MockGraphicsDevice::new());
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    (mock, device)
}

// ============================================================================
// LAYOUT BUILDER
// ============================================================================

#[test]
fn test_layout_builder_sorts_and_creates() {
    let (mock, device) = setup();
    let layout = DescriptorSetLayoutBuilder::new()
        .with_image_samplers(2, 1, ShaderStageFlags::FRAGMENT)
        .with_uniform_buffers(0, 1, ShaderStageFlags::VERTEX)
        .with_storage_buffers(1, 1, ShaderStageFlags::COMPUTE)
        .build(&device, "material")
        .unwrap();

    let slots: Vec<u32> = layout.bindings().iter().map(|b| b.binding).collect();
    assert_eq!(slots, vec![0, 1, 2]);
    assert_eq!(mock.set_layout_bindings(layout.native()).unwrap(), layout.bindings());
    assert_eq!(layout.debug_name(), "material");

    let native = layout.native();
    drop(layout);
    assert!(!mock.is_live(native.0));
}

#[test]
fn test_layout_builder_typed_helpers() {
    let builder = DescriptorSetLayoutBuilder::new()
        .with_samplers(0, 1, ShaderStageFlags::FRAGMENT)
        .with_sampled_images(1, 8, ShaderStageFlags::FRAGMENT)
        .with_storage_images(2, 1, ShaderStageFlags::COMPUTE)
        .with_uniform_texel_buffers(3, 1, ShaderStageFlags::VERTEX)
        .with_storage_texel_buffers(4, 1, ShaderStageFlags::VERTEX)
        .with_dynamic_uniform_buffers(5, 1, ShaderStageFlags::VERTEX)
        .with_dynamic_storage_buffers(6, 1, ShaderStageFlags::VERTEX)
        .with_acceleration_structures(7, 1, ShaderStageFlags::RAYGEN);

    let types: Vec<DescriptorType> = builder.bindings().iter().map(|b| b.descriptor_type).collect();
    assert_eq!(
        types,
        vec![
            DescriptorType::Sampler,
            DescriptorType::SampledImage,
            DescriptorType::StorageImage,
            DescriptorType::UniformTexelBuffer,
            DescriptorType::StorageTexelBuffer,
            DescriptorType::UniformBufferDynamic,
            DescriptorType::StorageBufferDynamic,
            DescriptorType::AccelerationStructure,
        ]
    );
    assert_eq!(builder.bindings()[1].count, 8);
    assert!(builder.validate().is_ok());
}

#[test]
fn test_layout_builder_rejects_duplicate_slot() {
    let builder = DescriptorSetLayoutBuilder::new()
        .with_uniform_buffers(0, 1, ShaderStageFlags::VERTEX)
        .with_storage_buffers(0, 1, ShaderStageFlags::VERTEX);

    assert!(matches!(builder.validate(), Err(Error::InvalidPipeline(_))));
}

#[test]
fn test_layout_builder_variable_count_must_be_highest() {
    let (mock, device) = setup();
    let bad = DescriptorSetLayoutBuilder::new()
        .with_bindless_images(0, 1024, ShaderStageFlags::FRAGMENT)
        .with_uniform_buffers(1, 1, ShaderStageFlags::VERTEX);

    assert!(matches!(bad.build(&device, "bad"), Err(Error::InvalidPipeline(_))));
    assert_eq!(mock.live_count("descriptor_set_layout"), 0);

    let good = DescriptorSetLayoutBuilder::new()
        .with_uniform_buffers(0, 1, ShaderStageFlags::VERTEX)
        .with_bindless_images(1, 1024, ShaderStageFlags::FRAGMENT);
    assert!(good.validate().is_ok());
    assert!(good.creation_flags().contains(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL));
}

#[test]
fn test_layout_builder_update_after_bind_needs_pool_flag() {
    let builder = DescriptorSetLayoutBuilder::new().with_descriptor(
        DescriptorType::SampledImage,
        0,
        16,
        ShaderStageFlags::FRAGMENT,
        DescriptorBindingFlags::UPDATE_AFTER_BIND,
    );
    assert!(builder.validate().is_err());

    let fixed = builder.with_creation_flags(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL);
    assert!(fixed.validate().is_ok());
}

#[test]
fn test_layout_builder_rejects_zero_count() {
    let builder = DescriptorSetLayoutBuilder::new().with_sampled_images(0, 0, ShaderStageFlags::FRAGMENT);
    assert!(builder.validate().is_err());
}

// ============================================================================
// SET WRITER
// ============================================================================

#[test]
fn test_writer_batches_into_one_call() {
    let (mock, device) = setup();
    let set = NativeDescriptorSet(77);

    let mut writer = DescriptorSetWriter::new(&*device, set);
    writer
        .write_sampled_image(1, 0, NativeImageView(10), ImageLayout::ShaderReadOnly)
        .write_image_sampler(2, 3, NativeImageView(11), NativeSampler(12), ImageLayout::ShaderReadOnly)
        .write_storage_image(3, 0, NativeImageView(13));
    writer
        .write_buffer(0, 0, DescriptorType::UniformBuffer, NativeBuffer(5), 0, WHOLE_SIZE)
        .unwrap();

    assert_eq!(writer.commit(), 4);
    assert_eq!(mock.count_calls("write_descriptors"), 1);

    let writes = mock.descriptor_writes();
    assert!(writes.iter().all(|(s, _)| *s == set));
    let storage = writes.iter().find(|(_, w)| w.binding == 3).unwrap().1;
    assert_eq!(
        storage.resource,
        DescriptorResource::Image { view: NativeImageView(13), sampler: None, layout: ImageLayout::General }
    );

    // Nothing pending: no second call
    assert_eq!(writer.commit(), 0);
    assert_eq!(mock.count_calls("write_descriptors"), 1);
}

#[test]
fn test_writer_overwrite_keeps_last() {
    let (_mock, device) = setup();
    let mut writer = DescriptorSetWriter::new(&*device, NativeDescriptorSet(1));
    writer
        .write_sampled_image(0, 0, NativeImageView(1), ImageLayout::ShaderReadOnly)
        .write_sampled_image(0, 0, NativeImageView(2), ImageLayout::ShaderReadOnly)
        .write_sampled_image(0, 1, NativeImageView(3), ImageLayout::ShaderReadOnly);

    assert_eq!(writer.writes().len(), 2);
    assert!(matches!(
        writer.writes()[0].resource,
        DescriptorResource::Image { view: NativeImageView(2), .. }
    ));
}

#[test]
fn test_writer_rejects_image_type_for_buffer() {
    let (_mock, device) = setup();
    let mut writer = DescriptorSetWriter::new(&*device, NativeDescriptorSet(1));
    let result = writer.write_buffer(0, 0, DescriptorType::SampledImage, NativeBuffer(1), 0, 16);

    assert!(matches!(result, Err(Error::InvalidOperation(_))));
    assert!(writer.writes().is_empty());
}

// ============================================================================
// MULTI-BINDER
// ============================================================================

#[test]
fn test_multi_binder_contiguous_is_one_call() {
    let mut binder = DescriptorSetMultiBinder::new(0);
    binder.bind(NativeDescriptorSet(1), 0).unwrap();
    binder.bind(NativeDescriptorSet(2), 1).unwrap();
    binder.bind(NativeDescriptorSet(3), 2).unwrap();

    assert_eq!(
        binder.ranges(),
        vec![BindRange {
            first_slot: 0,
            sets: vec![NativeDescriptorSet(1), NativeDescriptorSet(2), NativeDescriptorSet(3)],
        }]
    );
}

#[test]
fn test_multi_binder_splits_on_holes() {
    let mut binder = DescriptorSetMultiBinder::new(2);
    binder.bind(NativeDescriptorSet(10), 2).unwrap();
    binder.bind(NativeDescriptorSet(11), 3).unwrap();
    binder.bind(NativeDescriptorSet(12), 5).unwrap();
    binder.bind(NativeDescriptorSet(13), 17).unwrap();

    let ranges = binder.ranges();
    assert_eq!(ranges.len(), 3);
    assert_eq!(ranges[0].first_slot, 2);
    assert_eq!(ranges[0].sets.len(), 2);
    assert_eq!(ranges[1].first_slot, 5);
    assert_eq!(ranges[2].first_slot, 17);
    assert_eq!(ranges[2].sets, vec![NativeDescriptorSet(13)]);
}

#[test]
fn test_multi_binder_commit_issues_one_call_per_run() {
    let (mock, device) = setup();
    let mut binder = DescriptorSetMultiBinder::default();
    binder.bind(NativeDescriptorSet(1), 0).unwrap();
    binder.bind(NativeDescriptorSet(2), 2).unwrap();
    binder.bind(NativeDescriptorSet(3), 3).unwrap();

    let calls = binder.commit(&*device, NativeCommandBuffer(9), PipelineBindPoint::Compute, NativePipelineLayout(4));

    assert_eq!(calls, 2);
    let binds = mock.descriptor_binds();
    assert_eq!(binds[0].first_set, 0);
    assert_eq!(binds[1].first_set, 2);
    assert_eq!(binds[1].sets, vec![NativeDescriptorSet(2), NativeDescriptorSet(3)]);
    assert_eq!(binds[1].bind_point, PipelineBindPoint::Compute);
}

#[test]
fn test_multi_binder_rejects_out_of_range_and_null() {
    let mut binder = DescriptorSetMultiBinder::new(4);
    assert!(matches!(binder.bind(NativeDescriptorSet(1), 3), Err(Error::InvalidOperation(_))));
    assert!(binder.bind(NativeDescriptorSet(1), 4 + MAX_SET_ARRAY as u32).is_err());
    assert!(binder.bind(NativeDescriptorSet::NULL, 4).is_err());
    assert!(binder.is_empty());
}

#[test]
fn test_multi_binder_rebind_and_clear() {
    let mut binder = DescriptorSetMultiBinder::new(0);
    binder.bind(NativeDescriptorSet(1), 0).unwrap();
    binder.bind(NativeDescriptorSet(2), 0).unwrap();
    assert_eq!(binder.ranges()[0].sets, vec![NativeDescriptorSet(2)]);

    binder.clear();
    assert!(binder.ranges().is_empty());
}

#[test]
fn test_multi_binder_base_near_slot_limit() {
    let mut binder = DescriptorSetMultiBinder::new(u32::MAX - 1);

    assert!(matches!(binder.bind(NativeDescriptorSet(1), 0), Err(Error::InvalidOperation(_))));
    binder.bind(NativeDescriptorSet(2), u32::MAX - 1).unwrap();
    binder.bind(NativeDescriptorSet(3), u32::MAX).unwrap();

    let ranges = binder.ranges();
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].first_slot, u32::MAX - 1);
    assert_eq!(ranges[0].sets, vec![NativeDescriptorSet(2), NativeDescriptorSet(3)]);
}
