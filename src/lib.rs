//! A local versioned file store.
//!
//! Every file added to a vault keeps all of its versions. One of them is current; it can be
//! moved back and forth with [`Vault::rollback`] without losing history, exported, or the whole
//! file and its history deleted.
//!
//! ```no_run
//! use data_vault::{Config, Vault};
//! use std::path::Path;
//!
//! let mut vault = Vault::open(Config::with_vault_dir("data_vault"))?;
//! let added = vault.add_file(Path::new("/tmp/report.txt"))?;
//! println!("{added}");
//! vault.rollback("report.txt", 0)?;
//! vault.export_current("report.txt", Path::new("/tmp/report-v1.txt"))?;
//! # Ok::<(), data_vault::VaultError>(())
//! ```
pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod hash;
pub mod lock;
pub mod metadata;
pub mod util;
pub mod vault;

pub use catalog::{Catalog, VaultEntry, VersionRecord};
pub use config::{Config, LockMode};
pub use error::{ErrorKind, Result, VaultError};
pub use vault::{Added, Deleted, Exported, FileSummary, RolledBack, Vault, VerifyReport};
