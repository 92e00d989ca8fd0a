/// Shader binding table for a ray-tracing pipeline
///
/// Group handles are queried from the device and packed into one
/// host-visible buffer as four regions (ray-gen, miss, hit, callable). Each
/// record sits at the handle alignment and each region starts at the group
/// base alignment. Ray-gen records use the base alignment as their stride,
/// since a trace reads exactly one of them.

use std::sync::Arc;
use crate::{engine_debug, engine_error};
use crate::error::{Error, Result};
use crate::graphics_device::{
    BufferDesc, BufferUsage, GraphicsDevice, MemoryProperties, NativeCommandBuffer, PipelineBindPoint,
    RayTracingProperties, ShaderBindingRegions, StridedRegion,
};
use crate::memory::{Buffer, MemoryManager};
use crate::pipeline::{Pipeline, ShaderGroupKind};

const SOURCE: &str = "nova::ShaderBindingTable";

const REGION_ORDER: [ShaderGroupKind; 4] = [
    ShaderGroupKind::RayGen,
    ShaderGroupKind::Miss,
    ShaderGroupKind::Hit,
    ShaderGroupKind::Callable,
];

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Placement of one region relative to the table start
#[derive(Debug, Clone, Copy, Default)]
struct RegionLayout {
    offset: u64,
    stride: u64,
    size: u64,
    count: u32,
}

pub struct ShaderBindingTable {
    buffer: Buffer,
    /// Device address of the first byte of the ray-gen region
    base_address: u64,
    layouts: [RegionLayout; 4],
    debug_name: String,
}

impl ShaderBindingTable {
    /// Query the handles of every group of `pipeline` and upload them
    pub fn build(
        device: &Arc<dyn GraphicsDevice>,
        memory: &MemoryManager,
        pipeline: &Pipeline,
        debug_name: &str,
    ) -> Result<Self> {
        let Some(properties) = device.ray_tracing_properties() else {
            engine_error!(SOURCE, "Binding table '{}': device has no ray-tracing support", debug_name);
            return Err(Error::InvalidOperation("ray tracing is not supported by this device".to_string()));
        };
        if pipeline.bind_point() != PipelineBindPoint::RayTracing {
            engine_error!(SOURCE, "Binding table '{}': pipeline '{}' is not a ray-tracing pipeline", debug_name, pipeline.debug_name());
            return Err(Error::InvalidPipeline(format!("pipeline '{}' is not a ray-tracing pipeline", pipeline.debug_name())));
        }

        let groups = pipeline.shader_groups();
        let layouts = Self::layout(&properties, groups);
        if layouts[0].count == 0 {
            engine_error!(SOURCE, "Binding table '{}': pipeline '{}' has no ray-gen group", debug_name, pipeline.debug_name());
            return Err(Error::InvalidPipeline(format!("pipeline '{}' has no ray-gen group", pipeline.debug_name())));
        }

        let handle_size = properties.shader_group_handle_size as usize;
        let handles = device.ray_tracing_group_handles(pipeline.native(), groups.len() as u32)?;
        if handles.len() < groups.len() * handle_size {
            engine_error!(SOURCE, "Binding table '{}': device returned {} handle bytes for {} groups", debug_name, handles.len(), groups.len());
            return Err(Error::BackendError("short shader group handle data".to_string()));
        }

        // Extra room so the table start can be moved up to the base alignment
        let base_alignment = properties.shader_group_base_alignment.max(1) as u64;
        let table_size = layouts.iter().map(|l| l.size).sum::<u64>();
        let buffer = memory.create_buffer(&BufferDesc {
            size: table_size + base_alignment,
            usage: BufferUsage::SHADER_BINDING_TABLE | BufferUsage::SHADER_DEVICE_ADDRESS | BufferUsage::TRANSFER_SRC,
            memory: MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
            debug_name: format!("{} SBT", debug_name),
        })?;
        let Some(address) = buffer.device_address() else {
            return Err(Error::BackendError(format!("binding table '{}' has no device address", debug_name)));
        };
        let padding = align_up(address, base_alignment) - address;

        let mut next_in_region = [0u32; 4];
        for (group, kind) in groups.iter().enumerate() {
            let region = REGION_ORDER.iter().position(|k| k == kind).unwrap_or(0);
            let layout = layouts[region];
            let record = padding + layout.offset + next_in_region[region] as u64 * layout.stride;
            next_in_region[region] += 1;
            memory.copy_data(&buffer, &handles[group * handle_size..(group + 1) * handle_size], record)?;
        }

        engine_debug!(
            SOURCE,
            "Built binding table '{}': {} ray-gen, {} miss, {} hit, {} callable ({} bytes)",
            debug_name, layouts[0].count, layouts[1].count, layouts[2].count, layouts[3].count, table_size
        );

        Ok(Self {
            buffer,
            base_address: address + padding,
            layouts,
            debug_name: debug_name.to_string(),
        })
    }

    /// Region sizes and strides for `groups`, in `REGION_ORDER`
    fn layout(properties: &RayTracingProperties, groups: &[ShaderGroupKind]) -> [RegionLayout; 4] {
        let base_alignment = properties.shader_group_base_alignment as u64;
        let record_stride = align_up(
            properties.shader_group_handle_size as u64,
            properties.shader_group_handle_alignment as u64,
        );

        let mut layouts = [RegionLayout::default(); 4];
        let mut offset = 0;
        for (region, kind) in REGION_ORDER.iter().enumerate() {
            let count = groups.iter().filter(|k| *k == kind).count() as u32;
            let stride = if *kind == ShaderGroupKind::RayGen {
                align_up(record_stride, base_alignment)
            } else {
                record_stride
            };
            let size = align_up(count as u64 * stride, base_alignment);
            layouts[region] = RegionLayout { offset, stride, size, count };
            offset += size;
        }
        layouts
    }

    fn region(&self, index: usize) -> StridedRegion {
        let layout = self.layouts[index];
        if layout.count == 0 {
            return StridedRegion::default();
        }
        StridedRegion {
            device_address: self.base_address + layout.offset,
            stride: layout.stride,
            size: layout.size,
        }
    }

    /// Regions tracing from the first ray-gen group
    pub fn regions(&self) -> ShaderBindingRegions {
        ShaderBindingRegions {
            ray_gen: self.ray_gen_region(0).unwrap_or_default(),
            miss: self.region(1),
            hit: self.region(2),
            callable: self.region(3),
        }
    }

    /// Region of the `index`-th ray-gen group; its size equals its stride
    pub fn ray_gen_region(&self, index: u32) -> Option<StridedRegion> {
        let layout = self.layouts[0];
        (index < layout.count).then(|| StridedRegion {
            device_address: self.base_address + layout.offset + index as u64 * layout.stride,
            stride: layout.stride,
            size: layout.stride,
        })
    }

    /// Number of groups placed in the ray-gen, miss, hit and callable regions
    pub fn group_counts(&self) -> [u32; 4] {
        self.layouts.map(|l| l.count)
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Record a trace through the first ray-gen group
    ///
    /// `pipeline` must already be bound on `command_buffer`.
    pub fn trace_rays(
        &self,
        device: &dyn GraphicsDevice,
        command_buffer: NativeCommandBuffer,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        device.cmd_trace_rays(command_buffer, &self.regions(), width, height, depth);
    }
}

impl std::fmt::Debug for ShaderBindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderBindingTable")
            .field("buffer", &self.buffer)
            .field("group_counts", &self.group_counts())
            .field("debug_name", &self.debug_name)
            .finish()
    }
}

#[cfg(test)]
#[path = "shader_binding_table_tests.rs"]
mod tests;
