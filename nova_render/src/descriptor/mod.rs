/// Descriptor helpers - layout construction, set writes and coalesced binds
pub mod descriptor_set_layout;
pub mod descriptor_set_writer;
pub mod descriptor_set_binder;

pub use descriptor_set_layout::{DescriptorSetLayoutBuilder, DescriptorSetLayout};
pub use descriptor_set_writer::{DescriptorSetWriter, WHOLE_SIZE};
pub use descriptor_set_binder::{DescriptorSetMultiBinder, BindRange, MAX_SET_ARRAY};

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
