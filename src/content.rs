//! Version payload storage.
//!
//! Each version's bytes live in their own file at `files/<name>/v<version>/<name>` under the
//! vault root. The path is derived from the file name and version number only, and version
//! numbers are never reused while an entry exists, so a recorded payload is never written
//! twice.

use crate::error::{IoResultExt, Result, VaultError};
use crate::util::{copy_file_with_metadata, fsync_all_walk, fsync_dir};
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

pub struct ContentStore {
    root: PathBuf,
    sync: bool,
}

impl ContentStore {
    pub const FILES_DIR: &'static str = "files";

    pub fn new(root: &Path, sync: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            sync,
        }
    }

    /// Returns the path to the directory holding every file's versions
    pub fn files_path(&self) -> PathBuf {
        self.root.join(Self::FILES_DIR)
    }

    /// Returns the path to the directory holding every version of `file_name`
    fn file_path(&self, file_name: &str) -> PathBuf {
        self.files_path().join(file_name)
    }

    /// Locator of a version, relative to the vault root
    pub fn locator(file_name: &str, version: u32) -> String {
        format!("{}/{file_name}/v{version}/{file_name}", Self::FILES_DIR)
    }

    /// Resolves a locator to an absolute path, rejecting anything that would point outside
    /// the vault root.
    pub fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let rel = Path::new(locator);
        let contained = !locator.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(VaultError::NotFound(format!(
                "Stored content path '{locator}' is outside the vault"
            )));
        }
        Ok(self.root.join(rel))
    }

    pub fn exists(&self, locator: &str) -> bool {
        self.resolve(locator).is_ok_and(|p| p.is_file())
    }

    /// Copies `source` into the slot for `(file_name, version)` and returns its locator.
    ///
    /// The payload is staged in a temporary file next to its final location and renamed into
    /// place once complete, so a failed copy never leaves a partial payload behind.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn write(&self, file_name: &str, version: u32, source: &Path) -> Result<String> {
        validate_name(file_name)?;

        let locator = Self::locator(file_name, version);
        let dest = self.resolve(&locator)?;
        let version_dir = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.file_path(file_name));

        let created_dir = !version_dir.exists();
        std::fs::create_dir_all(&version_dir)
            .io_context(|| format!("Failed to create {}", version_dir.display()))?;

        if dest.exists() {
            // Callers only write version numbers the catalog doesn't record, so anything here
            // was left by an add that never got its catalog saved
            tracing::warn!("Replacing unreferenced payload at {}", dest.display());
        }

        match self.stage_and_commit(source, &version_dir, &dest) {
            Ok(size) => {
                tracing::debug!("Stored {} bytes at {}", size, dest.display());
                Ok(locator)
            }
            Err(e) => {
                if created_dir {
                    std::fs::remove_dir_all(&version_dir).ok();
                    std::fs::remove_dir(self.file_path(file_name)).ok();
                }
                Err(e)
            }
        }
    }

    fn stage_and_commit(&self, source: &Path, version_dir: &Path, dest: &Path) -> Result<u64> {
        let staging = tempfile::Builder::new()
            .prefix(".staging_")
            .tempfile_in(version_dir)
            .io_context(|| format!("Failed to create staging file in {}", version_dir.display()))?;

        let size = copy_file_with_metadata(source, staging.path()).io_context(|| {
            format!(
                "Failed to copy {} into the vault",
                source.display()
            )
        })?;

        if self.sync {
            staging
                .as_file()
                .sync_all()
                .io_context(|| "Failed to sync staged payload")?;
        }

        staging
            .persist(dest)
            .map_err(|e| VaultError::io(format!("Failed to store {}", dest.display()), e.error))?;

        if self.sync {
            fsync_all_walk(version_dir)
                .io_context(|| format!("Failed to fsync {}", version_dir.display()))?;
            // A new v<n> or <name> directory is only durable once its parent is synced,
            // up to files/
            for dir in version_dir.ancestors().skip(1).take(2) {
                fsync_dir(dir).io_context(|| format!("Failed to fsync {}", dir.display()))?;
            }
        }
        Ok(size)
    }

    /// Opens a stored payload for reading
    pub fn read(&self, locator: &str) -> Result<File> {
        let path = self.resolve(locator)?;
        File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(format!("Stored content '{locator}' is missing"))
            } else {
                VaultError::io(format!("Failed to open {}", path.display()), e)
            }
        })
    }

    /// Copies a stored payload to `dest`, preserving its metadata where possible.
    ///
    /// `dest` may not be the payload itself (through a symlink, hard link or a path into the
    /// vault); copying a file onto itself would truncate it.
    pub fn export(&self, locator: &str, dest: &Path) -> Result<u64> {
        let path = self.resolve(locator)?;
        let stored = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            _ => {
                return Err(VaultError::NotFound(format!(
                    "Stored content '{locator}' is missing"
                )));
            }
        };
        if let Ok(existing) = std::fs::metadata(dest) {
            if existing.dev() == stored.dev() && existing.ino() == stored.ino() {
                return Err(VaultError::io(
                    format!("Refusing to export {locator} onto itself"),
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("{} is the stored payload", dest.display()),
                    ),
                ));
            }
        }
        copy_file_with_metadata(&path, dest)
            .io_context(|| format!("Failed to export {} to {}", locator, dest.display()))
    }

    /// Removes every stored version of `file_name`. A file with nothing stored is not an error.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn delete(&self, file_name: &str) -> Result<()> {
        self.detach(file_name)?.purge()
    }

    /// Moves every stored version of `file_name` out of the way in a single rename.
    ///
    /// The versions go into a fresh `.deleted_*` directory under `files/` and keep their own
    /// name there, so the move works for any name that could be stored. The returned
    /// [`Detached`] can either be purged once the deletion is committed, or restored if it has
    /// to be undone.
    pub fn detach(&self, file_name: &str) -> Result<Detached> {
        validate_name(file_name)?;
        let dir = self.file_path(file_name);
        match std::fs::symlink_metadata(&dir) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Nothing stored at {}", dir.display());
                return Ok(Detached {
                    original: dir,
                    trash: None,
                    sync: self.sync,
                });
            }
            Err(e) => {
                return Err(VaultError::io(format!("Failed to stat {}", dir.display()), e));
            }
        }

        let trash_dir = tempfile::Builder::new()
            .prefix(".deleted_")
            .tempdir_in(self.files_path())
            .io_context(|| format!("Failed to create trash in {}", self.files_path().display()))?;
        let moved = trash_dir.path().join(file_name);

        std::fs::rename(&dir, &moved)
            .io_context(|| format!("Failed to detach {}", dir.display()))?;
        tracing::debug!("Detached {} to {}", dir.display(), moved.display());
        Ok(Detached {
            original: dir,
            trash: Some(Trash {
                dir: trash_dir,
                moved,
            }),
            sync: self.sync,
        })
    }

    /// Removes a single version slot. Only used to roll back an add whose catalog update
    /// could not be saved.
    pub fn discard(&self, file_name: &str, version: u32) -> Result<()> {
        validate_name(file_name)?;
        let dir = self.file_path(file_name).join(format!("v{version}"));
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(VaultError::io(
                    format!("Failed to remove {}", dir.display()),
                    e,
                ));
            }
        }
        // Drop the file's directory too if this was its only version
        std::fs::remove_dir(self.file_path(file_name)).ok();
        Ok(())
    }
}

/// Stored versions of a file that have been moved aside by [`ContentStore::detach`]
#[must_use]
pub struct Detached {
    original: PathBuf,
    trash: Option<Trash>,
    sync: bool,
}

struct Trash {
    dir: tempfile::TempDir,
    /// Where the file's directory now lives, inside `dir`
    moved: PathBuf,
}

impl Detached {
    /// Deletes the detached versions for good
    pub fn purge(self) -> Result<()> {
        let Some(trash) = self.trash else {
            return Ok(());
        };
        let trash_path = trash.dir.path().to_path_buf();
        trash
            .dir
            .close()
            .io_context(|| format!("Failed to remove {}", trash_path.display()))?;

        if self.sync {
            if let Some(parent) = trash_path.parent() {
                if let Err(e) = fsync_dir(parent) {
                    tracing::warn!("Failed to fsync {}: {}", parent.display(), e);
                }
            }
        }
        tracing::debug!("Purged {}", self.original.display());
        Ok(())
    }

    /// Moves the detached versions back where they were
    pub fn restore(self) -> Result<()> {
        let Some(trash) = self.trash else {
            return Ok(());
        };
        if let Err(e) = std::fs::rename(&trash.moved, &self.original) {
            // Dropping the trash would delete the versions; leave them on disk instead
            let kept = trash.dir.keep();
            return Err(VaultError::io(
                format!(
                    "Failed to restore {} (versions left in {})",
                    self.original.display(),
                    kept.display()
                ),
                e,
            ));
        }
        let trash_path = trash.dir.path().to_path_buf();
        if let Err(e) = trash.dir.close() {
            tracing::warn!("Failed to remove {}: {}", trash_path.display(), e);
        }
        tracing::debug!("Restored {}", self.original.display());
        Ok(())
    }
}

/// Checks that `name` can be used as a single path component under `files/`
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(VaultError::InvalidName(name.to_owned()))
    }
}
