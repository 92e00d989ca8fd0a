/// ShaderModule - a compiled shader stage with its reflection data
///
/// Immutable once created and shared between pipelines through `Arc`.
/// The native module is destroyed when the last reference drops.

use std::sync::Arc;
use crate::engine_error;
use crate::error::{Error, Result};
use crate::graphics_device::{GraphicsDevice, NativeShaderModule, ShaderStageFlags};
use crate::shader::ShaderReflection;

/// First word of every SPIR-V binary
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

pub struct ShaderModule {
    device: Arc<dyn GraphicsDevice>,
    native: NativeShaderModule,
    stage: ShaderStageFlags,
    entry_point: String,
    reflection: ShaderReflection,
    debug_name: String,
}

impl ShaderModule {
    /// Create a module from SPIR-V and reflect its bindings
    ///
    /// `stage` must name exactly one shader stage.
    pub fn new(
        device: &Arc<dyn GraphicsDevice>,
        code: &[u32],
        stage: ShaderStageFlags,
        entry_point: &str,
        debug_name: &str,
    ) -> Result<Arc<Self>> {
        if stage.bits().count_ones() != 1 {
            engine_error!("nova::Pipeline", "Shader '{}' must have a single stage, got {:?}", debug_name, stage);
            return Err(Error::InvalidPipeline(format!("shader '{}' has stage mask {:?}", debug_name, stage)));
        }

        if code.first() != Some(&SPIRV_MAGIC) {
            engine_error!("nova::Pipeline", "Shader '{}' is not a SPIR-V binary", debug_name);
            return Err(Error::InvalidPipeline(format!("shader '{}' is not SPIR-V", debug_name)));
        }

        let reflection = device.reflect_shader(code, stage)?;
        let native = device.create_shader_module(code, debug_name)?;

        Ok(Arc::new(Self {
            device: Arc::clone(device),
            native,
            stage,
            entry_point: entry_point.to_string(),
            reflection,
            debug_name: debug_name.to_string(),
        }))
    }

    pub fn native(&self) -> NativeShaderModule {
        self.native
    }

    pub fn stage(&self) -> ShaderStageFlags {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Per-set bindings and push-constant ranges of this stage
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("native", &self.native)
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .field("debug_name", &self.debug_name)
            .finish()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.native);
    }
}

#[cfg(test)]
#[path = "shader_module_tests.rs"]
mod tests;
