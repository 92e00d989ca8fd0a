/// Shader modules and reflection data merging
pub mod reflection;
pub mod shader_module;

pub use reflection::*;
pub use shader_module::{ShaderModule, SPIRV_MAGIC};
