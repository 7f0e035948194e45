//! core::paths
//!
//! Centralized path routing for file-based repositories.
//!
//! # Architecture
//!
//! Every location inside a local repository root is computed here. Storage
//! backends and mappers never join paths onto a root themselves; dataset
//! paths coming from mappers are validated so that they cannot escape the
//! root.
//!
//! # Storage Layout
//!
//! A repository root contains:
//! - `repositoryCfg.json` - Repository configuration record
//! - `registry.json` - Optional metadata registry rows
//! - `_mapper` / `_parent` - Legacy (v1) repository markers
//! - dataset files at mapper-chosen relative paths
//!
//! # Example
//!
//! ```
//! use strata::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/data/r1"));
//!
//! assert_eq!(paths.cfg_path(), PathBuf::from("/data/r1/repositoryCfg.json"));
//! assert_eq!(
//!     paths.dataset_path("raw/v1.json").unwrap(),
//!     PathBuf::from("/data/r1/raw/v1.json")
//! );
//! assert!(paths.dataset_path("../escape.json").is_err());
//! ```

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// File name of the repository configuration record.
pub const CFG_FILE_NAME: &str = "repositoryCfg.json";

/// File name of the registry rows.
pub const REGISTRY_FILE_NAME: &str = "registry.json";

/// Legacy marker naming the repository's mapper.
pub const LEGACY_MAPPER_FILE: &str = "_mapper";

/// Legacy marker pointing at the repository's parent.
pub const LEGACY_PARENT_FILE: &str = "_parent";

/// Errors from path routing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("dataset path must be relative: {0}")]
    Absolute(String),

    #[error("dataset path escapes the repository root: {0}")]
    Escapes(String),

    #[error("dataset path is empty")]
    Empty,
}

/// Path routing for one local repository root.
///
/// # Invariants
///
/// - Every returned path lives under `root`
/// - No code outside this module joins file names onto a repository root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    root: PathBuf,
}

impl RepoPaths {
    /// Create path routing for a repository root.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the configuration record.
    pub fn cfg_path(&self) -> PathBuf {
        self.root.join(CFG_FILE_NAME)
    }

    /// Path of the registry rows.
    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE_NAME)
    }

    /// Path of the legacy `_mapper` marker.
    pub fn legacy_mapper_path(&self) -> PathBuf {
        self.root.join(LEGACY_MAPPER_FILE)
    }

    /// Path of the legacy `_parent` marker (symlink or text file).
    pub fn legacy_parent_path(&self) -> PathBuf {
        self.root.join(LEGACY_PARENT_FILE)
    }

    /// Resolve a mapper-provided relative dataset path.
    ///
    /// # Errors
    ///
    /// Rejects empty paths, absolute paths and paths containing `..`.
    pub fn dataset_path(&self, relative: &str) -> Result<PathBuf, PathError> {
        if relative.is_empty() {
            return Err(PathError::Empty);
        }
        let rel = Path::new(relative);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(PathError::Escapes(relative.to_string())),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Absolute(relative.to_string()))
                }
            }
        }
        Ok(self.root.join(rel))
    }

    /// The `n`th backup name for an existing dataset file: `<path>~<n>`.
    pub fn backup_path(path: &Path, n: u32) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(format!("~{}", n));
        PathBuf::from(name)
    }

    /// Temporary sibling used for atomic writes.
    pub fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> RepoPaths {
        RepoPaths::new(PathBuf::from("/data/r1"))
    }

    #[test]
    fn cfg_path() {
        assert_eq!(
            paths().cfg_path(),
            PathBuf::from("/data/r1/repositoryCfg.json")
        );
    }

    #[test]
    fn registry_path() {
        assert_eq!(
            paths().registry_path(),
            PathBuf::from("/data/r1/registry.json")
        );
    }

    #[test]
    fn legacy_markers() {
        assert_eq!(paths().legacy_mapper_path(), PathBuf::from("/data/r1/_mapper"));
        assert_eq!(paths().legacy_parent_path(), PathBuf::from("/data/r1/_parent"));
    }

    #[test]
    fn dataset_path_nested() {
        assert_eq!(
            paths().dataset_path("./calexp/v1/c2.json").unwrap(),
            PathBuf::from("/data/r1/./calexp/v1/c2.json")
        );
    }

    #[test]
    fn dataset_path_rejects_absolute() {
        assert_eq!(
            paths().dataset_path("/etc/passwd"),
            Err(PathError::Absolute("/etc/passwd".into()))
        );
    }

    #[test]
    fn dataset_path_rejects_parent_dir() {
        assert!(matches!(
            paths().dataset_path("a/../../b"),
            Err(PathError::Escapes(_))
        ));
    }

    #[test]
    fn dataset_path_rejects_empty() {
        assert_eq!(paths().dataset_path(""), Err(PathError::Empty));
    }

    #[test]
    fn backup_and_temp_names() {
        let p = Path::new("/data/r1/x.json");
        assert_eq!(RepoPaths::backup_path(p, 2), PathBuf::from("/data/r1/x.json~2"));
        assert_eq!(RepoPaths::temp_path(p), PathBuf::from("/data/r1/x.json.tmp"));
    }
}
