/// Graphics device module - backend seam, native handles and shared GPU types

// Module declarations
pub mod handles;
pub mod types;
pub mod graphics_device;

// Re-export everything
pub use handles::*;
pub use types::*;
pub use graphics_device::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
