//! Access to module images on disk.
//!
//! Published modules are read back through memory mappings. Mappings are shared through an
//! [`ImageCache`] so every consumer of a module path sees the same image, and so the
//! publisher can drop all of them before it replaces the file.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotpatch::file::{Backend, ImageCache};
//!
//! let cache = ImageCache::new();
//! let image = cache.map("Library/ScriptHotReload/Assembly-CSharp_patch_1.dll")?;
//! println!("{} bytes", image.len());
//! cache.unload("Library/ScriptHotReload/Assembly-CSharp_patch_1.dll");
//! # Ok::<(), dotpatch::Error>(())
//! ```

mod cache;
mod physical;

pub use cache::ImageCache;
pub use physical::Physical;

use crate::Result;

/// Read access to the bytes of a module image
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire image.
    fn data(&self) -> &[u8];

    /// Returns the size of the image in bytes.
    fn len(&self) -> usize;

    /// Returns true for an empty image.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
