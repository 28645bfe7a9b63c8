//! Vault configuration.
//!
//! Every field has a default, so a config file only needs to name what it changes:
//!
//! ```toml
//! vault_dir = "/srv/vault"
//! chunk_size = 65536
//! sync = true
//! lock = "fail-fast"
//! ```
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How mutating operations wait for the vault lock
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LockMode {
    /// Block until the lock is free
    #[default]
    Wait,
    /// Fail with [`crate::VaultError::Locked`] if another process holds the lock
    FailFast,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Root directory of the vault
    pub vault_dir: PathBuf,
    /// Read size used when fingerprinting content
    pub chunk_size: usize,
    /// Whether payloads and the catalog are fsynced before an operation reports success
    pub sync: bool,
    pub lock: LockMode,
}

impl Config {
    pub const DEFAULT_VAULT_DIR: &'static str = "data_vault";

    /// Default configuration rooted at `vault_dir`
    pub fn with_vault_dir<P: Into<PathBuf>>(vault_dir: P) -> Self {
        Self {
            vault_dir: vault_dir.into(),
            ..Self::default()
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_dir: PathBuf::from(Self::DEFAULT_VAULT_DIR),
            chunk_size: crate::hash::DEFAULT_CHUNK_SIZE,
            sync: true,
            lock: LockMode::Wait,
        }
    }
}
