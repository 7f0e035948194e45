//! storage
//!
//! Storage backend abstraction for repository roots.
//!
//! # Architecture
//!
//! Every repository's bytes move through the [`Storage`] trait. The backend
//! is chosen from the root's URI scheme:
//!
//! - plain paths and `file://` URIs: [`PosixStorage`]
//! - anything else: [`StorageError::UnsupportedScheme`]
//!
//! # Example
//!
//! ```no_run
//! use strata::core::types::RepoUri;
//! use strata::storage::open_storage;
//!
//! let storage = open_storage(&RepoUri::new("/data/repo").unwrap()).unwrap();
//! if let Some(stored) = storage.get_cfg().unwrap() {
//!     println!("mapper: {:?}", stored.cfg.mapper);
//! }
//! ```

mod posix;
mod traits;

use std::sync::Arc;

pub use posix::PosixStorage;
pub use traits::{Storage, StorageError};

use crate::core::repo_cfg::StoredCfg;
use crate::core::types::RepoUri;

/// Open the storage backend for a repository root.
///
/// # Errors
///
/// [`StorageError::UnsupportedScheme`] for roots no backend handles.
pub fn open_storage(root: &RepoUri) -> Result<Arc<dyn Storage>, StorageError> {
    match root.local_path() {
        Some(path) => Ok(Arc::new(PosixStorage::new(root.clone(), path))),
        None => Err(StorageError::UnsupportedScheme {
            scheme: root.scheme().unwrap_or_default().to_string(),
            root: root.to_string(),
        }),
    }
}

/// Look up the configuration record stored at a root.
pub fn read_cfg(root: &RepoUri) -> Result<Option<StoredCfg>, StorageError> {
    open_storage(root)?.get_cfg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_file_roots_are_posix() {
        for root in ["/tmp/x", "rel/dir", "file:///tmp/x"] {
            let storage = open_storage(&RepoUri::new(root).unwrap()).unwrap();
            assert_eq!(storage.name(), "posix");
        }
    }

    #[test]
    fn other_schemes_rejected() {
        let err = open_storage(&RepoUri::new("s3://bucket/r").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedScheme { ref scheme, .. } if scheme == "s3"
        ));
    }
}
