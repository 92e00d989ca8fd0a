/// Native handles - opaque 64-bit identifiers handed out by a backend
///
/// The core never dereferences these; a backend packs its own object
/// handles into them (Vulkan handles are already 64-bit) and unpacks them
/// when called back.

use std::ptr::NonNull;

macro_rules! native_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            pub struct $name(pub u64);

            impl $name {
                /// The null handle
                pub const NULL: Self = Self(0);

                /// Whether this is the null handle
                pub fn is_null(&self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

native_handle! {
    /// GPU buffer object
    NativeBuffer,
    /// GPU image object
    NativeImage,
    /// View over a GPU image
    NativeImageView,
    /// Texture sampler
    NativeSampler,
    /// Binary or timeline semaphore
    NativeSemaphore,
    /// CPU-waitable fence
    NativeFence,
    /// Primary command buffer
    NativeCommandBuffer,
    /// Descriptor pool
    NativeDescriptorPool,
    /// Descriptor set
    NativeDescriptorSet,
    /// Descriptor set layout
    NativeDescriptorSetLayout,
    /// Pipeline layout
    NativePipelineLayout,
    /// Graphics, compute or ray-tracing pipeline
    NativePipeline,
    /// Compiled shader module
    NativeShaderModule,
}

/// Host pointer to mapped GPU memory
///
/// Valid while the owning allocation is alive and mapped. Writes through it
/// are only visible to the GPU without a flush when the memory is
/// host-coherent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPtr(NonNull<u8>);

// The pointer targets driver-owned memory that outlives any thread borrow;
// synchronization with GPU access is the caller's responsibility.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

impl MappedPtr {
    /// Wrap a raw mapping, `None` for null
    pub fn new(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw pointer to the first mapped byte
    pub fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr()
    }
}
