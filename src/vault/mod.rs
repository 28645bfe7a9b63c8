//! The vault: versioned storage of named files.
//!
//! [`Vault`] owns the in-memory catalog and is the only thing that changes it or the stored
//! payloads. Every mutating operation follows the same order:
//!
//! 1. take the vault lock and reload the catalog, so changes by other processes are seen,
//! 2. write or move payloads,
//! 3. update the catalog and save it,
//! 4. report success.
//!
//! If saving the catalog fails, the in-memory catalog and the payloads are put back the way
//! they were, so a failed operation never leaves a catalog that references missing content.

use crate::catalog::{Catalog, VersionRecord};
use crate::config::Config;
use crate::content::{ContentStore, validate_name};
use crate::error::{IoResultExt, Result, VaultError};
use crate::hash;
use crate::lock::VaultLock;
use crate::metadata::MetadataStore;
use std::fmt;
use std::path::{Path, PathBuf};

/// Returned by [`Vault::current_version_index`] for unknown file names
pub const NO_VERSION: i64 = -1;

/// A file name and how many versions it has
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub name: String,
    pub version_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub name: String,
    pub version: u32,
}

impl fmt::Display for Added {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File '{}' added as version {}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolledBack {
    pub name: String,
    pub version: u32,
}

impl fmt::Display for RolledBack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rolled back to version {}", self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    pub name: String,
    pub version: u32,
    /// Where the content was written
    pub path: PathBuf,
    pub size: u64,
}

impl fmt::Display for Exported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File exported to {}", self.path.display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub name: String,
    pub versions_removed: usize,
}

impl fmt::Display for Deleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File '{}' deleted", self.name)
    }
}

/// Integrity check result for one stored version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub version: u32,
    /// Whether the payload is still on disk
    pub present: bool,
    pub size_matches: bool,
    pub hash_matches: bool,
}

impl VerifyReport {
    pub const fn is_ok(&self) -> bool {
        self.present && self.size_matches && self.hash_matches
    }
}

pub struct Vault {
    root: PathBuf,
    config: Config,
    catalog: Catalog,
    content: ContentStore,
    metadata: MetadataStore,
}

impl Vault {
    /// Opens the vault at `config.vault_dir`, creating its directories if needed.
    ///
    /// Fails with [`VaultError::CorruptMetadata`] if an existing catalog cannot be read; the
    /// document is left as it is.
    #[tracing::instrument(skip_all, fields(root = %config.vault_dir.display()))]
    pub fn open(config: Config) -> Result<Self> {
        let root = config.vault_dir.clone();
        let content = ContentStore::new(&root, config.sync);
        std::fs::create_dir_all(content.files_path())
            .io_context(|| format!("Failed to create vault at {}", root.display()))?;

        let metadata = MetadataStore::new(&root, config.sync);
        let catalog = metadata.load()?;

        tracing::debug!("Opened vault with {} files", catalog.len());
        Ok(Self {
            root,
            config,
            catalog,
            content,
            metadata,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Takes the vault lock and reloads the catalog under it
    fn begin(&mut self) -> Result<VaultLock> {
        let lock = VaultLock::acquire(&self.root, self.config.lock)?;
        self.catalog = self.metadata.load()?;
        Ok(lock)
    }

    /// Saves the catalog, putting `previous` back in memory if the save fails
    fn commit(&mut self, previous: Catalog) -> Result<()> {
        if let Err(e) = self.metadata.save(&self.catalog) {
            tracing::error!("Failed to save catalog, reverting: {}", e);
            self.catalog = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Stores the file at `source_path` as the newest version of its name and makes it
    /// current.
    ///
    /// The name is the final component of `source_path`. The first add for a name creates
    /// its entry at version 1.
    #[tracing::instrument(skip(self))]
    pub fn add_file(&mut self, source_path: &Path) -> Result<Added> {
        let is_file = std::fs::metadata(source_path).is_ok_and(|m| m.is_file());
        if !is_file {
            return Err(VaultError::NotFound(format!(
                "File '{}' does not exist",
                source_path.display()
            )));
        }

        let name = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VaultError::InvalidName(source_path.display().to_string()))?
            .to_owned();
        validate_name(&name)?;

        let _lock = self.begin()?;

        let version = self.catalog.get(&name).map_or(1, |e| e.next_version());
        let locator = self.content.write(&name, version, source_path)?;

        // Fingerprint the stored copy rather than the source, so the record always
        // describes the bytes that were actually kept
        let record = match self.describe(version, &locator) {
            Ok(record) => record,
            Err(e) => {
                self.discard_quietly(&name, version);
                return Err(e);
            }
        };

        let previous = self.catalog.clone();
        self.catalog.entry_or_insert(&name).push_version(record);
        if let Err(e) = self.commit(previous) {
            self.discard_quietly(&name, version);
            return Err(e);
        }

        tracing::info!("Added {} as version {}", name, version);
        Ok(Added { name, version })
    }

    fn describe(&self, version: u32, locator: &str) -> Result<VersionRecord> {
        let file = self.content.read(locator)?;
        let size = file
            .metadata()
            .io_context(|| format!("Failed to stat {locator}"))?
            .len();
        let hash = hash::fingerprint(file, self.config.chunk_size)
            .io_context(|| format!("Failed to hash {locator}"))?;

        Ok(VersionRecord {
            version,
            timestamp: chrono::Utc::now(),
            size,
            hash,
            path: locator.to_owned(),
        })
    }

    fn discard_quietly(&self, name: &str, version: u32) {
        if let Err(e) = self.content.discard(name, version) {
            tracing::warn!("Failed to clean up {} version {}: {}", name, version, e);
        }
    }

    /// Every file in the vault with its version count, in the order they were first added
    pub fn list_files(&self) -> Vec<FileSummary> {
        self.catalog
            .iter()
            .map(|e| FileSummary {
                name: e.name.clone(),
                version_count: e.versions.len(),
            })
            .collect()
    }

    /// Version history of `file_name`, oldest first. Empty for unknown names.
    pub fn list_versions(&self, file_name: &str) -> Vec<VersionRecord> {
        self.catalog
            .get(file_name)
            .map(|e| e.versions.clone())
            .unwrap_or_default()
    }

    /// Index of the current version of `file_name`, or [`NO_VERSION`] for unknown names
    pub fn current_version_index(&self, file_name: &str) -> i64 {
        self.catalog
            .get(file_name)
            .and_then(|e| i64::try_from(e.current_version).ok())
            .unwrap_or(NO_VERSION)
    }

    pub fn current_version(&self, file_name: &str) -> Option<&VersionRecord> {
        self.catalog.get(file_name).and_then(|e| e.current())
    }

    /// Makes the version at `version_index` (zero-based) current. History is untouched, so
    /// rolling forward again is just another rollback.
    #[tracing::instrument(skip(self))]
    pub fn rollback(&mut self, file_name: &str, version_index: i64) -> Result<RolledBack> {
        let _lock = self.begin()?;

        let entry = self
            .catalog
            .get(file_name)
            .ok_or_else(|| file_not_found(file_name))?;
        let count = entry.versions.len();
        let index = usize::try_from(version_index)
            .ok()
            .filter(|&i| i < count)
            .ok_or(VaultError::InvalidIndex {
                index: version_index,
                count,
            })?;
        let version = entry.versions[index].version;

        let previous = self.catalog.clone();
        if let Some(entry) = self.catalog.get_mut(file_name) {
            entry.current_version = index;
        }
        self.commit(previous)?;

        tracing::info!("Rolled {} back to version {}", file_name, version);
        Ok(RolledBack {
            name: file_name.to_owned(),
            version,
        })
    }

    /// Copies the current version of `file_name` to `destination`.
    ///
    /// If `destination` is an existing directory the file is written inside it under its
    /// vault name.
    #[tracing::instrument(skip(self))]
    pub fn export_current(&self, file_name: &str, destination: &Path) -> Result<Exported> {
        let record = self
            .current_version(file_name)
            .ok_or_else(|| file_not_found(file_name))?;

        let dest = if destination.is_dir() {
            destination.join(file_name)
        } else {
            destination.to_path_buf()
        };

        let size = self.content.export(&record.path, &dest)?;
        tracing::info!(
            "Exported {} version {} to {}",
            file_name,
            record.version,
            dest.display()
        );
        Ok(Exported {
            name: file_name.to_owned(),
            version: record.version,
            path: dest,
            size,
        })
    }

    /// Removes `file_name` and every stored version of it. There is no undo.
    #[tracing::instrument(skip(self))]
    pub fn delete_file(&mut self, file_name: &str) -> Result<Deleted> {
        let _lock = self.begin()?;

        if self.catalog.get(file_name).is_none() {
            return Err(file_not_found(file_name));
        }

        let detached = self.content.detach(file_name)?;

        let previous = self.catalog.clone();
        let removed = self.catalog.remove(file_name);
        if let Err(e) = self.commit(previous) {
            if let Err(restore_err) = detached.restore() {
                tracing::error!(
                    "Failed to restore content of {} after failed delete: {}",
                    file_name,
                    restore_err
                );
            }
            return Err(e);
        }

        // The catalog no longer references the content, so a failure here only leaks disk
        // space
        if let Err(e) = detached.purge() {
            tracing::warn!("Failed to remove stored content of {}: {}", file_name, e);
        }

        let versions_removed = removed.map_or(0, |e| e.versions.len());
        tracing::info!("Deleted {} ({} versions)", file_name, versions_removed);
        Ok(Deleted {
            name: file_name.to_owned(),
            versions_removed,
        })
    }

    /// Re-reads every stored version of `file_name` and checks it against its record
    #[tracing::instrument(skip(self))]
    pub fn verify(&self, file_name: &str) -> Result<Vec<VerifyReport>> {
        let entry = self
            .catalog
            .get(file_name)
            .ok_or_else(|| file_not_found(file_name))?;

        let mut reports = Vec::with_capacity(entry.versions.len());
        for record in &entry.versions {
            let report = match self.content.read(&record.path) {
                Ok(file) => {
                    let size = file
                        .metadata()
                        .io_context(|| format!("Failed to stat {}", record.path))?
                        .len();
                    let hash = hash::fingerprint(file, self.config.chunk_size)
                        .io_context(|| format!("Failed to hash {}", record.path))?;
                    VerifyReport {
                        version: record.version,
                        present: true,
                        size_matches: size == record.size,
                        hash_matches: hash == record.hash,
                    }
                }
                Err(e) if e.kind() == crate::error::ErrorKind::NotFound => VerifyReport {
                    version: record.version,
                    present: false,
                    size_matches: false,
                    hash_matches: false,
                },
                Err(e) => return Err(e),
            };

            if !report.is_ok() {
                tracing::warn!(
                    "Version {} of {} failed verification: {:?}",
                    record.version,
                    file_name,
                    report
                );
            }
            reports.push(report);
        }
        Ok(reports)
    }
}

fn file_not_found(file_name: &str) -> VaultError {
    VaultError::NotFound(format!("File '{file_name}' not found"))
}
