//! Unit tests for vulkan_reflection.rs

use super::*;
use spirq::ty::DescriptorType as Spirq;

#[test]
fn test_descriptor_types_map_to_core() {
    assert_eq!(descriptor_type_from_spirq(&Spirq::UniformBuffer()), Some(DescriptorType::UniformBuffer));
    assert_eq!(
        descriptor_type_from_spirq(&Spirq::CombinedImageSampler()),
        Some(DescriptorType::CombinedImageSampler)
    );
    assert_eq!(descriptor_type_from_spirq(&Spirq::SampledImage()), Some(DescriptorType::SampledImage));
    assert_eq!(descriptor_type_from_spirq(&Spirq::Sampler()), Some(DescriptorType::Sampler));
    assert_eq!(
        descriptor_type_from_spirq(&Spirq::UniformTexelBuffer()),
        Some(DescriptorType::UniformTexelBuffer)
    );
    assert_eq!(
        descriptor_type_from_spirq(&Spirq::AccelStruct()),
        Some(DescriptorType::AccelerationStructure)
    );
}

#[test]
fn test_fixed_array_keeps_its_size() {
    assert_eq!(binding_count(1), (1, DescriptorBindingFlags::empty()));
    assert_eq!(binding_count(16), (16, DescriptorBindingFlags::empty()));
}

#[test]
fn test_runtime_array_is_partially_bound() {
    let (count, flags) = binding_count(0);
    assert_eq!(count, RUNTIME_ARRAY_CAPACITY);
    assert!(flags.contains(DescriptorBindingFlags::PARTIALLY_BOUND));
}

#[test]
fn test_invalid_spirv_is_rejected() {
    let garbage = [0xDEAD_BEEFu32, 1, 2, 3, 4, 5];
    assert!(reflect_spirv(&garbage, ShaderStageFlags::VERTEX).is_err());
}

#[test]
fn test_empty_spirv_is_rejected() {
    assert!(reflect_spirv(&[], ShaderStageFlags::FRAGMENT).is_err());
}
