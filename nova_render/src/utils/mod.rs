/// Small shared utilities
pub mod asset_id_allocator;

pub use asset_id_allocator::AssetIdAllocator;
