//! Error types for the file-info cache
//!
//! Structural failures (store, schema, registry, locators) surface as
//! [`CacheError`] and abort the operation. Failures confined to a single file
//! during a reconciliation pass are not errors at this level; they are
//! collected in the pass summary (see [`crate::reconcile::FileFailure`]).

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used across the crate
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised by the cache itself
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be created, opened or recreated.
    #[error("cache store unavailable at {path}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// SQLite refused to enable foreign key enforcement.
    #[error("could not enable foreign key support for the cache store")]
    IntegrityUnsupported,

    /// An existing store was created with a different layout.
    #[error("table '{table}' does not match the declared schema (expected [{expected}], found [{found}])")]
    SchemaMismatch {
        table: String,
        expected: String,
        found: String,
    },

    /// The declared field schema is not usable.
    #[error("invalid field schema: {0}")]
    InvalidSchema(String),

    /// A file-type tag is empty or otherwise malformed.
    #[error("invalid file-type tag: '{0}'")]
    InvalidTag(String),

    /// The same file-type tag was registered twice.
    #[error("file-type tag '{0}' is already registered")]
    DuplicateTag(String),

    /// A glob pattern given to a built-in locator failed to compile.
    #[error("invalid glob pattern: {0}")]
    GlobPattern(String),

    /// A locator failed; the pass is aborted before anything is written.
    #[error("locator for file type '{tag}' failed: {source:#}")]
    Locate {
        tag: String,
        #[source]
        source: anyhow::Error,
    },

    /// Any other SQLite failure.
    #[error("cache store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Filesystem failure outside per-file processing.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file unreadable or malformed.
    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Get the filesystem path associated with this error (if any).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::StoreUnavailable { path, .. }
            | Self::Io { path, .. }
            | Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether the error came from a corrupt or non-database store file.
    pub(crate) fn is_corruption(err: &rusqlite::Error) -> bool {
        matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::NotADatabase) | Some(rusqlite::ErrorCode::DatabaseCorrupt)
        )
    }
}
