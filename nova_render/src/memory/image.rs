/// Image - move-only handle to a GPU image and its default view
///
/// Same lifetime contract as `Buffer`: dropping retires the image with a
/// deferred discard through its owning `MemoryManager`.

use std::sync::Weak;
use crate::graphics_device::{NativeImage, NativeImageView, Format};
use crate::memory::memory_manager::{MemoryShared, DiscardMode};

pub struct Image {
    pub(crate) native: NativeImage,
    pub(crate) view: NativeImageView,
    pub(crate) format: Format,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) owner: Weak<MemoryShared>,
}

impl Image {
    pub fn native(&self) -> NativeImage {
        self.native
    }

    /// Default view over every mip and layer
    pub fn view(&self) -> NativeImageView {
        self.view
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("native", &self.native)
            .field("format", &self.format)
            .field("extent", &(self.width, self.height))
            .finish()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.retire_image(self.native, DiscardMode::Deferred);
        }
    }
}
