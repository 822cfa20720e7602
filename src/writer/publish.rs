//! Publishing a module image and its symbols as a pair.
//!
//! The host may load the module file at any moment, and a module whose symbol file does not
//! match it breaks debugging. Publishing therefore keeps the window in which the two files
//! disagree as short as possible:
//!
//! 1. both files are written under one joint pending name,
//!    `<stem>.pending-<pid>-<n>.<ext>`, next to the destination
//! 2. the previous pair, if any, is copied to `<stem>.backup-<pid>-<n>.<ext>`
//! 3. the destination is unloaded from the [`ImageCache`]
//! 4. both pending files are renamed over the destination back-to-back
//! 5. the backups are removed
//!
//! A failure is rolled back by moving the backups over whatever was installed. If that
//! succeeds the previous pair is intact and [`Error::Publish`] is reported. Otherwise a new
//! module may sit next to old symbols; [`Error::PublishInconsistent`] names both files and
//! [`verify_published`] reports the mismatch. Temporary names carry a process-wide counter
//! and are never reused.

use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    file::{Backend, ImageCache, Physical},
    patch::PatchConfig,
    writer::{
        image::{image_digest, WrittenModule},
        symbols::SymbolFile,
    },
    Error, Result,
};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File operations used by the publisher
pub trait PublishFs: Send + Sync {
    /// Creates or truncates `path` and writes `data` durably
    ///
    /// # Errors
    /// Any I/O failure.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Copies `from` to `to`, replacing `to`
    ///
    /// # Errors
    /// Any I/O failure.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Renames `from` to `to`, replacing `to`
    ///
    /// # Errors
    /// Any I/O failure.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes the file at `path`
    ///
    /// # Errors
    /// Any I/O failure.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// True if a file exists at `path`
    fn exists(&self, path: &Path) -> bool;
}

/// [`PublishFs`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl PublishFs for StdFs {
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        use std::io::Write;

        let mut file = std::fs::File::create(path)?;
        file.write_all(data)?;
        file.sync_all()
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::copy(from, to).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Final locations of a published pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPaths {
    /// The module image
    pub module: PathBuf,
    /// The symbol file
    pub symbols: PathBuf,
}

/// State of a published pair on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Both files exist and the symbols belong to the image
    Consistent,
    /// Both files exist but the symbols belong to another image
    DigestMismatch,
    /// The module file is absent
    MissingModule,
    /// The symbol file is absent
    MissingSymbols,
}

/// The symbol file path belonging to `module`
#[must_use]
pub fn symbols_path(module: &Path, config: &PatchConfig) -> PathBuf {
    module.with_extension(&config.symbol_extension)
}

fn is_not_found(error: &Error) -> bool {
    matches!(error, Error::FileError(io) if io.kind() == io::ErrorKind::NotFound)
}

/// Checks whether the symbol file at `symbols` belongs to the image at `module`.
///
/// # Errors
/// Returns I/O errors other than a missing file, and parse errors of the symbol file.
pub fn verify_published(module: &Path, symbols: &Path) -> Result<PublishStatus> {
    let image = match Physical::new(module) {
        Ok(image) => image,
        Err(error) if is_not_found(&error) => return Ok(PublishStatus::MissingModule),
        Err(error) => return Err(error),
    };
    let symbol_bytes = match std::fs::read(symbols) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(PublishStatus::MissingSymbols)
        }
        Err(error) => return Err(Error::FileError(error)),
    };

    let symbol_file = SymbolFile::parse(&symbol_bytes)?;
    if symbol_file.digest == image_digest(image.data()) {
        Ok(PublishStatus::Consistent)
    } else {
        Ok(PublishStatus::DigestMismatch)
    }
}

/// Sibling of `path` named `<stem>.<kind>-<tag>.<ext>`
fn sibling(path: &Path, kind: &str, tag: &str) -> PathBuf {
    let lossy = |part: Option<&std::ffi::OsStr>| {
        part.map(|part| part.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    let stem = lossy(path.file_stem());
    let extension = lossy(path.extension());
    path.with_file_name(format!("{stem}.{kind}-{tag}.{extension}"))
}

/// Publishes written modules to disk
pub struct Publisher<'a> {
    fs: &'a dyn PublishFs,
    module_extension: String,
    symbol_extension: String,
}

/// What has happened on disk so far, for rollback
#[derive(Default)]
struct Progress {
    pending: Vec<PathBuf>,
    /// (backup, original)
    backups: Vec<(PathBuf, PathBuf)>,
    installed: Vec<PathBuf>,
}

impl Publisher<'static> {
    /// A publisher on the real filesystem
    #[must_use]
    pub fn new(config: &PatchConfig) -> Self {
        static STD_FS: StdFs = StdFs;
        Publisher::with_fs(config, &STD_FS)
    }
}

impl<'a> Publisher<'a> {
    /// A publisher using `fs` for every file operation
    #[must_use]
    pub fn with_fs(config: &PatchConfig, fs: &'a dyn PublishFs) -> Self {
        Publisher {
            fs,
            module_extension: config.module_extension.clone(),
            symbol_extension: config.symbol_extension.clone(),
        }
    }

    /// Installs `written` at `destination` and its symbol file next to it.
    ///
    /// # Errors
    /// Returns [`crate::Error::Publish`] if publishing failed and the previous pair is in
    /// place, and [`crate::Error::PublishInconsistent`] if the destination was left with a
    /// module and symbol file that do not belong together.
    pub fn publish(
        &self,
        destination: &Path,
        written: &WrittenModule,
        cache: &ImageCache,
    ) -> Result<PublishedPaths> {
        let module = destination.with_extension(&self.module_extension);
        let symbols = destination.with_extension(&self.symbol_extension);
        let tag = format!(
            "{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let mut progress = Progress::default();

        // 1. pending pair
        for (path, data) in [(&module, &written.image), (&symbols, &written.symbols)] {
            let pending = sibling(path, "pending", &tag);
            if let Err(error) = self.fs.write(&pending, data) {
                progress.pending.push(pending.clone());
                return Err(self.abort(&module, &progress, format!(
                    "writing {} failed: {error}",
                    pending.display()
                )));
            }
            progress.pending.push(pending);
        }

        // 2. back up the previous pair
        for path in [&module, &symbols] {
            if !self.fs.exists(path) {
                continue;
            }
            let backup = sibling(path, "backup", &tag);
            if let Err(error) = self.fs.copy(path, &backup) {
                progress.backups.push((backup, path.clone()));
                return Err(self.abort(&module, &progress, format!(
                    "backing up {} failed: {error}",
                    path.display()
                )));
            }
            progress.backups.push((backup, path.clone()));
        }

        // 3. drop mappings of the old image
        cache.unload(&module);

        // 4. install both files back-to-back
        let installs = progress.pending.clone();
        for (pending, target) in installs.iter().zip([&module, &symbols]) {
            if let Err(error) = self.fs.rename(pending, target) {
                return Err(self.abort(&module, &progress, format!(
                    "installing {} failed: {error}",
                    target.display()
                )));
            }
            progress.installed.push(target.to_path_buf());
        }

        // 5. drop the backups
        for (backup, _) in &progress.backups {
            if let Err(error) = self.fs.remove(backup) {
                log::warn!("Could not remove backup {}: {error}", backup.display());
            }
        }

        log::info!("Published {} and {}", module.display(), symbols.display());
        Ok(PublishedPaths { module, symbols })
    }

    /// Rolls back `progress` and builds the error to report
    fn abort(&self, module: &Path, progress: &Progress, message: String) -> Error {
        let mut consistent = true;
        let mut leftovers = Vec::new();

        for target in progress.installed.iter().rev() {
            let backup = progress
                .backups
                .iter()
                .find(|(_, original)| original == target)
                .map(|(backup, _)| backup);
            let restored = match backup {
                Some(backup) => self.fs.rename(backup, target),
                None => self.fs.remove(target),
            };
            if restored.is_err() {
                consistent = false;
                leftovers.extend(backup.cloned());
            }
        }
        for (backup, original) in &progress.backups {
            if progress.installed.contains(original) || !self.fs.exists(backup) {
                continue;
            }
            if self.fs.remove(backup).is_err() {
                leftovers.push(backup.clone());
            }
        }
        for pending in &progress.pending {
            if self.fs.exists(pending) && self.fs.remove(pending).is_err() {
                leftovers.push(pending.clone());
            }
        }

        if consistent {
            log::warn!("Publishing {} failed: {message}", module.display());
            Error::Publish {
                destination: module.to_path_buf(),
                message,
                leftovers,
            }
        } else {
            let symbols = module.with_extension(&self.symbol_extension);
            log::error!(
                "Publishing left {} and {} inconsistent: {message}",
                module.display(),
                symbols.display()
            );
            Error::PublishInconsistent {
                module: module.to_path_buf(),
                symbols,
                message,
                leftovers,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn written(tag: u8) -> WrittenModule {
        let image = vec![b'D', b'P', b'M', b'D', tag];
        let digest = image_digest(&image);
        // symbol file with no documents and no methods
        let mut symbols = b"DPSY\x01\x00\x00\x00".to_vec();
        symbols.extend_from_slice(&digest);
        symbols.extend_from_slice(&[0u8; 16]);
        symbols.extend_from_slice(&0u32.to_le_bytes());
        symbols.extend_from_slice(&0u32.to_le_bytes());
        WrittenModule {
            image,
            symbols,
            digest,
        }
    }

    /// Fails the `fail_at`th rename (1-based), and every later one if `sticky`
    struct FailingFs {
        renames: Mutex<usize>,
        fail_at: usize,
        sticky: bool,
    }

    impl FailingFs {
        fn new(fail_at: usize, sticky: bool) -> Self {
            FailingFs {
                renames: Mutex::new(0),
                fail_at,
                sticky,
            }
        }
    }

    impl PublishFs for FailingFs {
        fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            StdFs.write(path, data)
        }

        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            StdFs.copy(from, to)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            let mut renames = self.renames.lock().unwrap();
            *renames += 1;
            if *renames == self.fail_at || (self.sticky && *renames > self.fail_at) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected"));
            }
            StdFs.rename(from, to)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            StdFs.remove(path)
        }

        fn exists(&self, path: &Path) -> bool {
            StdFs.exists(path)
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_publish_fresh_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("Assembly-CSharp_patch.dll");
        let config = PatchConfig::default();
        let cache = ImageCache::new();
        let publisher = Publisher::new(&config);

        let paths = publisher.publish(&destination, &written(1), &cache).unwrap();
        assert_eq!(paths.symbols, dir.path().join("Assembly-CSharp_patch.pdb"));
        assert_eq!(
            verify_published(&paths.module, &paths.symbols).unwrap(),
            PublishStatus::Consistent
        );

        cache.map(&paths.module).unwrap();
        publisher.publish(&destination, &written(2), &cache).unwrap();
        assert!(!cache.is_mapped(&paths.module));
        assert_eq!(std::fs::read(&paths.module).unwrap(), written(2).image);
        assert_eq!(
            dir_entries(dir.path()),
            vec!["Assembly-CSharp_patch.dll", "Assembly-CSharp_patch.pdb"]
        );
    }

    #[test]
    fn test_failure_before_install_restores_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("Game.dll");
        let config = PatchConfig::default();
        let cache = ImageCache::new();
        Publisher::new(&config)
            .publish(&destination, &written(1), &cache)
            .unwrap();

        // the first install fails, the rollback succeeds
        let fs = FailingFs::new(1, false);
        let result = Publisher::with_fs(&config, &fs).publish(&destination, &written(2), &cache);
        assert!(matches!(result, Err(Error::Publish { ref leftovers, .. }) if leftovers.is_empty()));

        assert_eq!(std::fs::read(&destination).unwrap(), written(1).image);
        assert_eq!(
            verify_published(&destination, &dir.path().join("Game.pdb")).unwrap(),
            PublishStatus::Consistent
        );
        assert_eq!(dir_entries(dir.path()), vec!["Game.dll", "Game.pdb"]);
    }

    #[test]
    fn test_failure_between_installs_is_observable() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("Game.dll");
        let symbols = dir.path().join("Game.pdb");
        let config = PatchConfig::default();
        let cache = ImageCache::new();
        Publisher::new(&config)
            .publish(&destination, &written(1), &cache)
            .unwrap();

        // the module install succeeds, every rename after it fails
        let fs = FailingFs::new(2, true);
        let result = Publisher::with_fs(&config, &fs).publish(&destination, &written(2), &cache);
        match result {
            Err(Error::PublishInconsistent {
                module,
                symbols: reported,
                leftovers,
                ..
            }) => {
                assert_eq!(module, destination);
                assert_eq!(reported, symbols);
                assert_eq!(leftovers.len(), 1);
            }
            other => panic!("expected inconsistent publish, got {other:?}"),
        }

        // new module next to the old symbols
        assert_eq!(std::fs::read(&destination).unwrap(), written(2).image);
        assert_eq!(
            verify_published(&destination, &symbols).unwrap(),
            PublishStatus::DigestMismatch
        );
    }

    #[test]
    fn test_verify_reports_mismatch_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("Game.dll");
        let symbols = dir.path().join("Game.pdb");
        assert_eq!(
            verify_published(&module, &symbols).unwrap(),
            PublishStatus::MissingModule
        );

        std::fs::write(&module, written(1).image).unwrap();
        assert_eq!(
            verify_published(&module, &symbols).unwrap(),
            PublishStatus::MissingSymbols
        );

        std::fs::write(&symbols, written(2).symbols).unwrap();
        assert_eq!(
            verify_published(&module, &symbols).unwrap(),
            PublishStatus::DigestMismatch
        );
    }

    #[test]
    fn test_pending_names_never_repeat() {
        let path = Path::new("/tmp/out/Game.dll");
        let first = sibling(path, "pending", "1-0");
        let second = sibling(path, "pending", "1-1");
        assert_eq!(first, Path::new("/tmp/out/Game.pending-1-0.dll"));
        assert_ne!(first, second);
    }
}
