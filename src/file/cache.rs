//! Process-wide cache of mapped module images.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;

use crate::{file::Physical, Result};

/// Shared, thread-safe cache of memory-mapped module images keyed by path.
///
/// A mapping holds the file open. Before a module is republished its path has to be
/// [`ImageCache::unload`]ed; handles already given out stay valid until dropped.
#[derive(Debug, Default)]
pub struct ImageCache {
    images: DashMap<PathBuf, Arc<Physical>>,
}

impl ImageCache {
    /// Creates an empty cache
    #[must_use]
    pub fn new() -> Self {
        ImageCache {
            images: DashMap::new(),
        }
    }

    /// Returns the mapping of `path`, mapping the file on first use.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or mapped.
    pub fn map(&self, path: impl AsRef<Path>) -> Result<Arc<Physical>> {
        let path = path.as_ref();
        if let Some(image) = self.images.get(path) {
            return Ok(Arc::clone(image.value()));
        }

        let image = Arc::new(Physical::new(path)?);
        Ok(Arc::clone(
            self.images
                .entry(path.to_path_buf())
                .or_insert(image)
                .value(),
        ))
    }

    /// Drops the cached mapping of `path`; returns true if one existed
    pub fn unload(&self, path: impl AsRef<Path>) -> bool {
        let removed = self.images.remove(path.as_ref()).is_some();
        if removed {
            log::debug!("Unloaded image {}", path.as_ref().display());
        }
        removed
    }

    /// True if `path` is currently mapped
    #[must_use]
    pub fn is_mapped(&self, path: impl AsRef<Path>) -> bool {
        self.images.contains_key(path.as_ref())
    }

    /// Number of mapped images
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// True if nothing is mapped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
