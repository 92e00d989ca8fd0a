/// Fixed-function state and resolved pipeline descriptions
///
/// Builders accumulate these values; the backend receives them fully
/// resolved (layout created, shader stages listed) through the
/// `*PipelineDesc` structs at the bottom of this file.

use bitflags::bitflags;
use crate::graphics_device::{
    Format, ShaderStageFlags, NativePipelineLayout, NativeShaderModule,
};

// ============================================================================
// Vertex input
// ============================================================================

/// Per-vertex or per-instance stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

/// A vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// A vertex attribute read from a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

/// Primitive assembly topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
    PatchList,
}

// ============================================================================
// Rasterization
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Rasterizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub line_width: f32,
    /// (constant factor, slope factor, clamp)
    pub depth_bias: Option<(f32, f32, f32)>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,
            depth_bias: None,
        }
    }
}

// ============================================================================
// Depth / blend
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Depth test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: true,
            write_enable: true,
            compare_op: CompareOp::LessOrEqual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Color channels written by an attachment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u32 {
        const R = 0x1;
        const G = 0x2;
        const B = 0x4;
        const A = 0x8;
        const RGBA = 0xF;
    }
}

/// Blend configuration of one color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorWriteMask,
}

impl BlendState {
    /// Blending off, all channels written
    pub const fn opaque() -> Self {
        Self {
            enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorWriteMask::RGBA,
        }
    }

    /// Standard `src * a + dst * (1 - a)` blending
    pub const fn alpha_blend() -> Self {
        Self {
            enable: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            alpha_op: BlendOp::Add,
            write_mask: ColorWriteMask::RGBA,
        }
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::opaque()
    }
}

/// A color attachment of a dynamic-rendering pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachmentState {
    pub format: Format,
    pub blend: BlendState,
}

// ============================================================================
// Resolved descriptions handed to the backend
// ============================================================================

/// One shader stage of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageDesc {
    pub module: NativeShaderModule,
    pub stage: ShaderStageFlags,
    pub entry_point: String,
}

/// Everything needed to create a graphics pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub layout: NativePipelineLayout,
    pub stages: Vec<ShaderStageDesc>,
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth: DepthState,
    pub color_attachments: Vec<ColorAttachmentState>,
    pub depth_format: Option<Format>,
    pub sample_count: u32,
    pub debug_name: String,
}

/// Everything needed to create a compute pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    pub layout: NativePipelineLayout,
    pub stage: ShaderStageDesc,
    pub debug_name: String,
}

/// A ray-tracing shader group, indices refer to `RayTracingPipelineDesc::stages`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderGroup {
    /// Ray generation, miss or callable shader
    General { stage: u32 },
    /// Triangle hit group
    TrianglesHit { closest_hit: Option<u32>, any_hit: Option<u32> },
    /// Procedural (AABB) hit group
    ProceduralHit { intersection: u32, closest_hit: Option<u32>, any_hit: Option<u32> },
}

/// Shader-binding-table region a ray-tracing group is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderGroupKind {
    RayGen,
    Miss,
    Hit,
    Callable,
}

/// Everything needed to create a ray-tracing pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RayTracingPipelineDesc {
    pub layout: NativePipelineLayout,
    pub stages: Vec<ShaderStageDesc>,
    pub groups: Vec<ShaderGroup>,
    pub max_recursion_depth: u32,
    pub debug_name: String,
}
