//! Error types for vault operations

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`VaultError`], for callers that only need to branch on
/// what went wrong rather than render the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidIndex,
    InvalidName,
    Io,
    CorruptMetadata,
    Locked,
}

#[derive(Error, Debug)]
pub enum VaultError {
    /// A source path, a file name in the catalog, or a stored version's content is missing
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid version index {index} (file has {count} versions)")]
    InvalidIndex { index: i64, count: usize },

    #[error("Invalid file name '{0}'")]
    InvalidName(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt metadata in {}: {reason}", .path.display())]
    CorruptMetadata { path: PathBuf, reason: String },

    #[error("Vault at {} is locked by another process", .0.display())]
    Locked(PathBuf),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidIndex { .. } => ErrorKind::InvalidIndex,
            Self::InvalidName(_) => ErrorKind::InvalidName,
            Self::Io { .. } => ErrorKind::Io,
            Self::CorruptMetadata { .. } => ErrorKind::CorruptMetadata,
            Self::Locked(_) => ErrorKind::Locked,
        }
    }

    pub(crate) fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Extension for attaching a context message to `std::io::Result`s
pub(crate) trait IoResultExt<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| VaultError::io(f(), e))
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
