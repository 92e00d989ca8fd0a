/// Backend-neutral enums, flags and descriptors shared by the core and backends
///
/// Flag values mirror the Vulkan bit layout so a backend converts with a
/// plain `from_raw(bits)`.

use bitflags::bitflags;
use crate::graphics_device::{
    NativeBuffer, NativeImage, NativeImageView, NativeSampler, NativeCommandBuffer,
    NativeSemaphore, MappedPtr,
};

// ============================================================================
// Formats
// ============================================================================

/// Image and vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    UNDEFINED,

    // Color
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,

    // Vertex / data
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_UINT,

    // Depth / stencil
    D16_UNORM,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,
}

impl Format {
    /// Whether the format has a depth aspect
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Format::D16_UNORM | Format::D32_SFLOAT | Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT
        )
    }

    /// Whether the format has a stencil aspect
    pub fn has_stencil(&self) -> bool {
        matches!(self, Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT)
    }
}

// ============================================================================
// Flags
// ============================================================================

bitflags! {
    /// Shader stages a binding or push-constant range is visible from
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x0000_0001;
        const TESSELLATION_CONTROL = 0x0000_0002;
        const TESSELLATION_EVALUATION = 0x0000_0004;
        const GEOMETRY = 0x0000_0008;
        const FRAGMENT = 0x0000_0010;
        const COMPUTE = 0x0000_0020;
        const TASK = 0x0000_0040;
        const MESH = 0x0000_0080;
        const RAYGEN = 0x0000_0100;
        const ANY_HIT = 0x0000_0200;
        const CLOSEST_HIT = 0x0000_0400;
        const MISS = 0x0000_0800;
        const INTERSECTION = 0x0000_1000;
        const CALLABLE = 0x0000_2000;
        const ALL_GRAPHICS = 0x0000_001F;
        const ALL = 0x7FFF_FFFF;
    }
}

bitflags! {
    /// How a buffer will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0x0000_0001;
        const TRANSFER_DST = 0x0000_0002;
        const UNIFORM_TEXEL = 0x0000_0004;
        const STORAGE_TEXEL = 0x0000_0008;
        const UNIFORM = 0x0000_0010;
        const STORAGE = 0x0000_0020;
        const INDEX = 0x0000_0040;
        const VERTEX = 0x0000_0080;
        const INDIRECT = 0x0000_0100;
        const SHADER_BINDING_TABLE = 0x0000_0400;
        const SHADER_DEVICE_ADDRESS = 0x0002_0000;
        const ACCELERATION_STRUCTURE_BUILD_INPUT = 0x0008_0000;
        const ACCELERATION_STRUCTURE_STORAGE = 0x0010_0000;
    }
}

bitflags! {
    /// Requested memory properties
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryProperties: u32 {
        const DEVICE_LOCAL = 0x1;
        const HOST_VISIBLE = 0x2;
        const HOST_COHERENT = 0x4;
        const HOST_CACHED = 0x8;
    }
}

bitflags! {
    /// How an image will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 0x01;
        const TRANSFER_DST = 0x02;
        const SAMPLED = 0x04;
        const STORAGE = 0x08;
        const COLOR_ATTACHMENT = 0x10;
        const DEPTH_STENCIL_ATTACHMENT = 0x20;
    }
}

bitflags! {
    /// Per-binding flags (descriptor indexing)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorBindingFlags: u32 {
        const UPDATE_AFTER_BIND = 0x1;
        const UPDATE_UNUSED_WHILE_PENDING = 0x2;
        const PARTIALLY_BOUND = 0x4;
        const VARIABLE_DESCRIPTOR_COUNT = 0x8;
    }
}

bitflags! {
    /// Descriptor set layout creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorSetLayoutCreateFlags: u32 {
        const PUSH_DESCRIPTOR = 0x1;
        const UPDATE_AFTER_BIND_POOL = 0x2;
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Kind of resource bound at a descriptor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    UniformBufferDynamic,
    StorageBufferDynamic,
    AccelerationStructure,
}

impl DescriptorType {
    /// Whether the descriptor references a buffer range
    pub fn is_buffer(&self) -> bool {
        matches!(
            self,
            DescriptorType::UniformBuffer
                | DescriptorType::StorageBuffer
                | DescriptorType::UniformBufferDynamic
                | DescriptorType::StorageBufferDynamic
        )
    }

    /// Whether the descriptor references an image view
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            DescriptorType::CombinedImageSampler
                | DescriptorType::SampledImage
                | DescriptorType::StorageImage
        )
    }

    /// Whether a layout slot of this type can back a binding reflected as `reflected`.
    ///
    /// Shader code cannot tell dynamic-offset buffers apart, so reflection
    /// reports them as plain uniform/storage buffers.
    pub fn matches_reflected(&self, reflected: DescriptorType) -> bool {
        match (*self, reflected) {
            (DescriptorType::UniformBufferDynamic, DescriptorType::UniformBuffer)
            | (DescriptorType::StorageBufferDynamic, DescriptorType::StorageBuffer) => true,
            (declared, reflected) => declared == reflected,
        }
    }
}

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutBinding {
    /// Slot number (`layout(binding = N)`)
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Array size (1 for non-arrays)
    pub count: u32,
    /// Stages that can see the binding
    pub stages: ShaderStageFlags,
    pub flags: DescriptorBindingFlags,
}

/// A push-constant block range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
    pub stages: ShaderStageFlags,
}

/// Resource written into a descriptor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    Buffer {
        buffer: NativeBuffer,
        offset: u64,
        range: u64,
    },
    Image {
        view: NativeImageView,
        sampler: Option<NativeSampler>,
        layout: ImageLayout,
    },
}

/// One descriptor update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub array_index: u32,
    pub descriptor_type: DescriptorType,
    pub resource: DescriptorResource,
}

/// Where a descriptor set or pipeline is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
    RayTracing,
}

// ============================================================================
// Memory
// ============================================================================

/// Parameters of a buffer allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryProperties,
    pub debug_name: String,
}

/// Result of a backend buffer allocation
#[derive(Debug, Clone, Copy)]
pub struct BufferAllocation {
    pub buffer: NativeBuffer,
    /// Persistent mapping, present for host-coherent memory
    pub mapped: Option<MappedPtr>,
}

/// Parameters of an image allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub usage: ImageUsage,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub memory: MemoryProperties,
    pub debug_name: String,
}

impl ImageDesc {
    /// Single-mip, single-layer device-local depth target
    pub fn depth_target(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            mip_levels: 1,
            array_layers: 1,
            memory: MemoryProperties::DEVICE_LOCAL,
            debug_name: "depth target".to_string(),
        }
    }
}

/// Result of a backend image allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageAllocation {
    pub image: NativeImage,
    /// Default view over every mip and layer
    pub view: NativeImageView,
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_mode: AddressMode,
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
            max_anisotropy: None,
        }
    }
}

// ============================================================================
// Frame / presentation
// ============================================================================

/// Surface presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

/// Image layout for transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

/// A layout transition recorded into a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: NativeImage,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    /// Transition the depth (and stencil) aspect instead of color
    pub depth: bool,
}

/// One presentable image returned by swapchain creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub image: NativeImage,
    pub view: NativeImageView,
}

/// Swapchain created or recreated by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub format: Format,
    /// Actual extent after clamping to surface capabilities
    pub width: u32,
    pub height: u32,
    pub images: Vec<SwapchainImage>,
}

/// Outcome of acquiring a presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image index acquired; `suboptimal` asks for a rebuild after present
    Acquired { index: u32, suboptimal: bool },
    /// The surface changed and the swapchain must be rebuilt
    OutOfDate,
}

/// Outcome of a present request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Outcome of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

/// One frame's queue submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSubmit {
    pub command_buffer: NativeCommandBuffer,
    /// Acquire semaphore, waited at color-attachment output
    pub wait_semaphore: Option<NativeSemaphore>,
    /// Present-ready semaphore
    pub signal_semaphore: Option<NativeSemaphore>,
    pub timeline: NativeSemaphore,
    pub timeline_value: u64,
}

/// Attachments for a dynamic-rendering scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingInfo {
    pub color_view: Option<NativeImageView>,
    pub depth_view: Option<NativeImageView>,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

/// Viewport rectangle (negative height flips Y)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Transfer / draw commands
// ============================================================================

/// One region of a buffer-to-buffer copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// One region of a buffer-to-image copy
///
/// The buffer holds tightly packed texels for a `width` x `height` area of
/// one mip level and array layer. The image must be in `TransferDst` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub array_layer: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size_bytes(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

// ============================================================================
// Ray tracing
// ============================================================================

/// Shader-group handle layout limits of a ray-tracing capable device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RayTracingProperties {
    /// Bytes of one opaque group handle
    pub shader_group_handle_size: u32,
    /// Alignment of each handle inside a region
    pub shader_group_handle_alignment: u32,
    /// Alignment of each region's start address
    pub shader_group_base_alignment: u32,
    pub max_recursion_depth: u32,
}

/// A strided range of shader-binding-table records in GPU memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StridedRegion {
    pub device_address: u64,
    pub stride: u64,
    pub size: u64,
}

/// The four regions a trace-rays command reads; an unused region is all zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderBindingRegions {
    pub ray_gen: StridedRegion,
    pub miss: StridedRegion,
    pub hit: StridedRegion,
    pub callable: StridedRegion,
}
