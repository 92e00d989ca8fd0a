//! Unit tests for shader_binding_table.rs
//!
//! Region layout against the device's handle limits, record placement by
//! group kind and the recorded trace.

use std::sync::Arc;
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::graphics_device::{
    GraphicsDevice, NativeCommandBuffer, RayTracingProperties, ShaderStageFlags, StridedRegion,
};
use crate::memory::MemoryManager;
use crate::pipeline::{ComputePipelineBuilder, Pipeline, RayTracingPipelineBuilder, ShaderBindingTable, ShaderGroupKind};
use crate::shader::{ShaderModule, ShaderReflection, SPIRV_MAGIC};

// ============================================================================
// Helpers
// ============================================================================

const PROPERTIES: RayTracingProperties = RayTracingProperties {
    shader_group_handle_size: 32,
    shader_group_handle_alignment: 32,
    shader_group_base_alignment: 64,
    max_recursion_depth: 4,
};

fn setup(properties: Option<RayTracingProperties>) -> (Arc<MockGraphicsDevice>, Arc<dyn GraphicsDevice>, MemoryManager) {
    let mock = Arc::new(MockGraphicsDevice::new());
    mock.set_ray_tracing_properties(properties);
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    let memory = MemoryManager::new(Arc::clone(&device), 2);
    (mock, device, memory)
}

fn shader(device: &Arc<dyn GraphicsDevice>, id: u32, stage: ShaderStageFlags) -> Arc<ShaderModule> {
    ShaderModule::new(device, &[SPIRV_MAGIC, id], stage, "main", &format!("rt{}", id)).unwrap()
}

/// Groups in order: ray-gen, miss, hit, miss, callable
fn mixed_pipeline(device: &Arc<dyn GraphicsDevice>) -> Pipeline {
    RayTracingPipelineBuilder::new()
        .with_ray_gen(shader(device, 1, ShaderStageFlags::RAYGEN))
        .with_miss(shader(device, 2, ShaderStageFlags::MISS))
        .with_triangles_hit(Some(shader(device, 3, ShaderStageFlags::CLOSEST_HIT)), None)
        .with_miss(shader(device, 4, ShaderStageFlags::MISS))
        .with_callable(shader(device, 5, ShaderStageFlags::CALLABLE))
        .build(device, "mixed")
        .unwrap()
}

// ============================================================================
// Layout
// ============================================================================

#[test]
fn test_pipeline_reports_group_kinds() {
    let (_mock, device, _memory) = setup(Some(PROPERTIES));

    let pipeline = mixed_pipeline(&device);

    assert_eq!(pipeline.shader_groups(), &[
        ShaderGroupKind::RayGen,
        ShaderGroupKind::Miss,
        ShaderGroupKind::Hit,
        ShaderGroupKind::Miss,
        ShaderGroupKind::Callable,
    ]);
}

#[test]
fn test_regions_follow_handle_limits() {
    let (mock, device, memory) = setup(Some(PROPERTIES));
    let pipeline = mixed_pipeline(&device);

    let table = ShaderBindingTable::build(&device, &memory, &pipeline, "mixed").unwrap();

    assert_eq!(mock.count_calls("ray_tracing_group_handles:5"), 1);
    assert_eq!(table.group_counts(), [1, 2, 1, 1]);

    let base = table.regions().ray_gen.device_address;
    assert_eq!(base % 64, 0);
    let regions = table.regions();
    assert_eq!(regions.ray_gen, StridedRegion { device_address: base, stride: 64, size: 64 });
    assert_eq!(regions.miss, StridedRegion { device_address: base + 64, stride: 32, size: 64 });
    assert_eq!(regions.hit, StridedRegion { device_address: base + 128, stride: 32, size: 64 });
    assert_eq!(regions.callable, StridedRegion { device_address: base + 192, stride: 32, size: 64 });
    assert!(table.ray_gen_region(1).is_none());
}

#[test]
fn test_records_grouped_by_kind() {
    let (_mock, device, memory) = setup(Some(PROPERTIES));
    let pipeline = mixed_pipeline(&device);

    let table = ShaderBindingTable::build(&device, &memory, &pipeline, "mixed").unwrap();
    let start = table.regions().ray_gen.device_address - table.buffer().device_address().unwrap();
    let record = |offset: u64| memory.read_data(table.buffer(), start + offset, 32).unwrap();

    // Group i's mock handle is filled with i + 1
    assert_eq!(record(0), vec![1; 32]);
    assert_eq!(record(32), vec![0; 32]);
    assert_eq!(record(64), vec![2; 32]);
    assert_eq!(record(96), vec![4; 32]);
    assert_eq!(record(128), vec![3; 32]);
    assert_eq!(record(192), vec![5; 32]);
}

#[test]
fn test_unused_regions_are_empty() {
    let (_mock, device, memory) = setup(Some(PROPERTIES));
    let pipeline = RayTracingPipelineBuilder::new()
        .with_ray_gen(shader(&device, 10, ShaderStageFlags::RAYGEN))
        .with_ray_gen(shader(&device, 11, ShaderStageFlags::RAYGEN))
        .build(&device, "rgen only")
        .unwrap();

    let table = ShaderBindingTable::build(&device, &memory, &pipeline, "rgen only").unwrap();

    let regions = table.regions();
    assert_eq!(regions.miss, StridedRegion::default());
    assert_eq!(regions.hit, StridedRegion::default());
    assert_eq!(regions.callable, StridedRegion::default());

    let second = table.ray_gen_region(1).unwrap();
    assert_eq!(second.device_address, regions.ray_gen.device_address + 64);
    assert_eq!(second.size, second.stride);
}

#[test]
fn test_table_start_meets_large_base_alignment() {
    let properties = RayTracingProperties { shader_group_base_alignment: 8192, ..PROPERTIES };
    let (_mock, device, memory) = setup(Some(properties));
    let pipeline = mixed_pipeline(&device);

    let table = ShaderBindingTable::build(&device, &memory, &pipeline, "aligned").unwrap();

    let regions = table.regions();
    for region in [regions.ray_gen, regions.miss, regions.hit, regions.callable] {
        assert_eq!(region.device_address % 8192, 0);
    }
    assert_eq!(table.buffer().size(), 4 * 8192 + 8192);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_build_without_ray_tracing_support() {
    let (_mock, device, memory) = setup(None);
    let pipeline = mixed_pipeline(&device);

    let result = ShaderBindingTable::build(&device, &memory, &pipeline, "none");

    assert!(matches!(result, Err(Error::InvalidOperation(_))));
    assert_eq!(memory.stats().live_buffers, 0);
}

#[test]
fn test_build_rejects_compute_pipeline() {
    let (_mock, device, memory) = setup(Some(PROPERTIES));
    let pipeline = ComputePipelineBuilder::new()
        .with_shader(shader(&device, 20, ShaderStageFlags::COMPUTE))
        .build(&device, "cs")
        .unwrap();

    let result = ShaderBindingTable::build(&device, &memory, &pipeline, "cs");

    assert!(matches!(result, Err(Error::InvalidPipeline(_))));
}

// ============================================================================
// Tracing
// ============================================================================

#[test]
fn test_trace_rays_records_regions() {
    let (mock, device, memory) = setup(Some(PROPERTIES));
    let pipeline = mixed_pipeline(&device);
    let table = ShaderBindingTable::build(&device, &memory, &pipeline, "mixed").unwrap();
    let cmd = NativeCommandBuffer(9);

    pipeline.bind(cmd);
    table.trace_rays(&*device, cmd, 1920, 1080, 1);

    assert_eq!(mock.count_calls("cmd_trace_rays:1920x1080x1"), 1);
    assert_eq!(mock.trace_rays(), vec![(table.regions(), [1920, 1080, 1])]);
}
