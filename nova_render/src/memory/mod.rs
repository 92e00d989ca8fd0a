/// GPU memory management - buffers, images and deferred destruction
pub mod memory_manager;
pub mod buffer;
pub mod image;

pub use memory_manager::{MemoryManager, MemoryStats, DiscardMode};
pub use buffer::Buffer;
pub use image::Image;
