//! storage::traits
//!
//! Storage backend trait definition.
//!
//! # Design
//!
//! A `Storage` is bound to one repository root. It knows how to find the
//! repository's configuration record, test whether a dataset path exists,
//! and move JSON documents in and out. Dataset paths are the relative
//! strings produced by mappers; backends resolve them against their root.
//!
//! Backends never interpret dataset types or identifiers. That is the
//! mapper's job.
//!
//! # Example
//!
//! ```ignore
//! use strata::storage::{Storage, StorageError};
//!
//! fn copy(src: &dyn Storage, dst: &dyn Storage, path: &str) -> Result<(), StorageError> {
//!     let doc = src.read(path)?;
//!     dst.write(path, &doc)
//! }
//! ```

use std::fmt::Debug;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::paths::PathError;
use crate::core::repo_cfg::{CfgError, RepositoryCfg, StoredCfg};
use crate::core::types::RepoUri;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No storage backend handles this URI scheme.
    #[error("unsupported storage scheme '{scheme}' for root '{root}'")]
    UnsupportedScheme { scheme: String, root: String },

    /// The dataset does not exist.
    #[error("dataset not found: {0}")]
    NotFound(PathBuf),

    /// Filesystem failure.
    #[error("i/o error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Document is not valid JSON.
    #[error("invalid document at '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    /// Mapper produced an unusable path.
    #[error("bad dataset path: {0}")]
    Path(#[from] PathError),

    /// Configuration record failure.
    #[error("repository cfg error: {0}")]
    Cfg(#[from] CfgError),
}

/// Trait for storage backends.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait Storage: Send + Sync + Debug {
    /// Backend identifier (e.g. "posix").
    fn name(&self) -> &'static str;

    /// The repository root this backend is bound to.
    fn root(&self) -> &RepoUri;

    /// Load the repository's configuration record, if any.
    fn get_cfg(&self) -> Result<Option<StoredCfg>, StorageError>;

    /// Persist the repository's configuration record.
    fn put_cfg(&self, cfg: &RepositoryCfg) -> Result<(), StorageError>;

    /// True if a dataset is physically present at `path`.
    fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Read the document at `path`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if nothing is stored there.
    fn read(&self, path: &str) -> Result<serde_json::Value, StorageError>;

    /// Write a document to `path`, replacing any existing one.
    fn write(&self, path: &str, value: &serde_json::Value) -> Result<(), StorageError>;

    /// Move an existing document at `path` aside. Returns the backup name,
    /// or `None` if there was nothing to back up.
    fn backup(&self, path: &str) -> Result<Option<String>, StorageError>;

    /// Raw registry rows stored with the repository, if any.
    fn read_registry(&self) -> Result<Option<serde_json::Value>, StorageError>;
}
