/// Pipeline module - fixed-function state, builders and the immutable pipeline object

pub mod pipeline_state;
pub mod pipeline;
pub mod pipeline_builder;
pub mod graphics_pipeline_builder;
pub mod compute_pipeline_builder;
pub mod ray_tracing_pipeline_builder;
pub mod shader_binding_table;

pub use pipeline_state::*;
pub use pipeline::Pipeline;
pub use pipeline_builder::{PipelineBuilderBase, MAX_DESCRIPTOR_SETS};
pub use graphics_pipeline_builder::GraphicsPipelineBuilder;
pub use compute_pipeline_builder::ComputePipelineBuilder;
pub use ray_tracing_pipeline_builder::RayTracingPipelineBuilder;
pub use shader_binding_table::ShaderBindingTable;

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
