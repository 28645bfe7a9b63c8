//! Catalog persistence.
//!
//! The whole catalog lives in one JSON document at the vault root. Saves go through a
//! temporary file in the same directory that is fsynced and then renamed over the document,
//! so a crash mid-save leaves the previous document in place.

use crate::catalog::Catalog;
use crate::error::{IoResultExt, Result, VaultError};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct MetadataStore {
    root: PathBuf,
    sync: bool,
    #[cfg(test)]
    fail_saves: bool,
}

impl MetadataStore {
    pub const METADATA_FILE: &'static str = "metadata.json";

    pub fn new(root: &Path, sync: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            sync,
            #[cfg(test)]
            fail_saves: false,
        }
    }

    /// Makes every later [`MetadataStore::save`] fail before touching the disk
    #[cfg(test)]
    pub(crate) fn fail_saves(&mut self) {
        self.fail_saves = true;
    }

    /// Returns the path to the catalog document
    pub fn path(&self) -> PathBuf {
        self.root.join(Self::METADATA_FILE)
    }

    /// Load the catalog, or an empty one if nothing has been saved yet
    pub fn load(&self) -> Result<Catalog> {
        let path = self.path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No catalog at {}, starting empty", path.display());
                return Ok(Catalog::new());
            }
            Err(e) => {
                return Err(VaultError::io(
                    format!("Failed to read catalog {}", path.display()),
                    e,
                ));
            }
        };

        let catalog: Catalog =
            serde_json::from_str(&content).map_err(|e| VaultError::CorruptMetadata {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        catalog
            .validate()
            .map_err(|reason| VaultError::CorruptMetadata {
                path: path.clone(),
                reason,
            })?;

        tracing::debug!(
            "Loaded catalog with {} entries from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Persist the whole catalog, replacing the previous document
    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        debug_assert!(catalog.validate().is_ok(), "refusing to persist invalid catalog");

        let path = self.path();
        #[cfg(test)]
        if self.fail_saves {
            return Err(VaultError::io(
                format!("Failed to replace {}", path.display()),
                std::io::Error::other("save disabled"),
            ));
        }

        let mut content = serde_json::to_vec_pretty(catalog)
            .map_err(|e| VaultError::io("Failed to serialize catalog", e.into()))?;
        content.push(b'\n');

        let mut tmp = tempfile::Builder::new()
            .prefix(".metadata_")
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .io_context(|| format!("Failed to create temporary catalog in {}", self.root.display()))?;

        tmp.write_all(&content)
            .io_context(|| "Failed to write temporary catalog")?;

        if self.sync {
            tmp.as_file()
                .sync_all()
                .io_context(|| "Failed to sync temporary catalog")?;
        }

        tmp.persist(&path)
            .map_err(|e| VaultError::io(format!("Failed to replace {}", path.display()), e.error))?;

        if self.sync {
            // The rename is only durable once the directory entry is
            if let Err(e) = crate::util::fsync_dir(&self.root) {
                tracing::warn!(
                    "Failed to fsync vault root {}: {}",
                    self.root.display(),
                    e
                );
            }
        }

        tracing::debug!(
            "Saved catalog with {} entries to {}",
            catalog.len(),
            path.display()
        );
        Ok(())
    }
}
