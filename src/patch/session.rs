//! Running pipelines for several modules.
//!
//! A module must never be patched by two pipelines at once: both would publish to the same
//! destination. [`PatchLocks`] hands out one guard per module name, and [`PatchSession`]
//! takes that guard around every run. Distinct modules are patched in parallel on the rayon
//! thread pool; they share only the lock table, the [`ImageCache`] and the
//! [`PatchContext`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::{mapref::entry::Entry, DashMap};
use rayon::prelude::*;

use crate::{
    file::ImageCache,
    patch::{
        collaborators::Collaborators, context::PatchContext, pipeline::PatchPipeline,
        report::PatchReport,
    },
    writer::PublishedPaths,
    Error, Result,
};

/// Names of the modules currently being patched
#[derive(Debug, Default)]
pub struct PatchLocks {
    active: DashMap<String, ()>,
}

/// Holds the lock of one module until dropped
#[derive(Debug)]
pub struct PatchGuard<'a> {
    locks: &'a PatchLocks,
    module: String,
}

impl PatchLocks {
    /// An empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `module`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleBusy`] if the module is already locked.
    pub fn acquire(&self, module: &str) -> Result<PatchGuard<'_>> {
        match self.active.entry(module.to_string()) {
            Entry::Occupied(_) => Err(Error::ModuleBusy(module.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(PatchGuard {
                    locks: self,
                    module: module.to_string(),
                })
            }
        }
    }

    /// True if `module` is locked
    #[must_use]
    pub fn is_locked(&self, module: &str) -> bool {
        self.active.contains_key(module)
    }
}

impl PatchGuard<'_> {
    /// The locked module
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }
}

impl Drop for PatchGuard<'_> {
    fn drop(&mut self) {
        self.locks.active.remove(&self.module);
    }
}

/// Result of patching one module through a session
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// What the run changed
    pub report: PatchReport,
    /// Where the module was published, if the session has an output directory
    pub published: Option<PublishedPaths>,
}

/// Patches modules with shared collaborators and context
#[derive(Debug)]
pub struct PatchSession {
    context: Arc<PatchContext>,
    collaborators: Collaborators,
    locks: PatchLocks,
    cache: ImageCache,
    output_dir: Option<PathBuf>,
}

impl PatchSession {
    /// A session that rewrites modules in memory only
    #[must_use]
    pub fn new(context: Arc<PatchContext>, collaborators: Collaborators) -> Self {
        PatchSession {
            context,
            collaborators,
            locks: PatchLocks::new(),
            cache: ImageCache::new(),
            output_dir: None,
        }
    }

    /// Publishes every patched module into `dir` as `<module>_patch.<ext>`
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// The lock table of the session
    #[must_use]
    pub fn locks(&self) -> &PatchLocks {
        &self.locks
    }

    /// The image cache the session publishes through
    #[must_use]
    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    fn destination(&self, dir: &Path, module: &str) -> PathBuf {
        dir.join(format!(
            "{module}_patch.{}",
            self.context.config.module_extension
        ))
    }

    /// Patches `module`, publishing it if an output directory is set.
    ///
    /// Returns `Ok(None)` if the diff found the module incompatible.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleBusy`] if the module is being patched already, and any
    /// error of the pipeline or the publisher.
    pub fn patch(&self, module: &str) -> Result<Option<PatchOutcome>> {
        let _guard = self.locks.acquire(module)?;

        let mut pipeline = PatchPipeline::new(
            module,
            Arc::clone(&self.context),
            self.collaborators.clone(),
        );
        if !pipeline.run()? {
            return Ok(None);
        }

        let published = match &self.output_dir {
            Some(dir) => Some(pipeline.publish(&self.destination(dir, module), &self.cache)?),
            None => None,
        };

        Ok(Some(PatchOutcome {
            report: pipeline.report().clone(),
            published,
        }))
    }

    /// Patches every module in `modules` in parallel.
    ///
    /// Results are returned in input order. A failing module does not stop the others.
    pub fn patch_all(&self, modules: &[&str]) -> Vec<(String, Result<Option<PatchOutcome>>)> {
        modules
            .par_iter()
            .map(|module| (module.to_string(), self.patch(module)))
            .collect()
    }
}
