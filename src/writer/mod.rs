//! Serializing patch modules and publishing them to disk.
//!
//! [`ModuleWriter`] turns a [`crate::metadata::module::Module`] into a module image and a
//! matching debug symbol file. The symbol file records the SHA-1 digest of the image, which
//! is what [`verify_published`] checks. [`Publisher`] installs both files at their
//! destination as a pair.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotpatch::{
//!     file::ImageCache,
//!     metadata::module::Module,
//!     patch::PatchConfig,
//!     writer::{verify_published, ModuleWriter, PublishStatus, Publisher},
//! };
//!
//! # fn patched() -> Module { unimplemented!() }
//! let module = patched();
//! let written = ModuleWriter::new(&module).write()?;
//!
//! let config = PatchConfig::default();
//! let cache = ImageCache::new();
//! let paths = Publisher::new(&config).publish(
//!     "Library/ScriptHotReload/Assembly-CSharp_patch_1.dll".as_ref(),
//!     &written,
//!     &cache,
//! )?;
//! assert_eq!(
//!     verify_published(&paths.module, &paths.symbols)?,
//!     PublishStatus::Consistent
//! );
//! # Ok::<(), dotpatch::Error>(())
//! ```

mod heaps;
mod image;
mod publish;
mod symbols;

pub use heaps::{BlobHeapBuilder, HeapBuilder, StringHeapBuilder, UserStringHeapBuilder};
pub use image::{
    image_digest, validate_stack_depths, ImageDigest, ImageHeader, ModuleWriter, WrittenModule,
    IMAGE_HEADER_SIZE, IMAGE_MAGIC, IMAGE_VERSION,
};
pub use publish::{
    symbols_path, verify_published, PublishFs, PublishStatus, PublishedPaths, Publisher, StdFs,
};
pub use symbols::{write_symbols, MethodSymbols, SymbolFile, SYMBOLS_MAGIC, SYMBOLS_VERSION};
