//! core::repo_cfg::store
//!
//! On-disk storage of configuration records for local repositories.
//!
//! # Architecture
//!
//! The record lives in `repositoryCfg.json` at the repository root. All
//! paths come from [`RepoPaths`]. Writes are atomic: the record is written
//! to a temp sibling, synced, then renamed over the destination.
//!
//! # Legacy Repositories
//!
//! Roots created before configuration records existed carry a `_mapper`
//! file naming their mapper and optionally a `_parent` symlink (or a text
//! file holding a path) pointing at their parent. [`CfgStore::read`]
//! synthesizes a record for such roots and flags it as legacy.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::schema::{parse_cfg, CfgError, MapperArgs, ParentRef, RepositoryCfg};
use crate::core::paths::RepoPaths;
use crate::core::types::{MapperName, RepoUri};

/// A configuration record read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCfg {
    /// The parsed or synthesized record.
    pub cfg: RepositoryCfg,
    /// True if the record was synthesized from legacy markers.
    pub legacy: bool,
}

/// Reads and writes configuration records under one local root.
#[derive(Debug, Clone)]
pub struct CfgStore {
    paths: RepoPaths,
}

impl CfgStore {
    /// Create a store for a local repository root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: RepoPaths::new(root.into()),
        }
    }

    /// The path routing used by this store.
    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// Read the record for this root.
    ///
    /// `uri` is the root as the caller named it; it becomes the record's
    /// root for legacy repositories.
    ///
    /// Returns `Ok(None)` if the root holds neither a record nor legacy
    /// markers.
    ///
    /// # Errors
    ///
    /// - [`CfgError::ReadError`] if an existing file cannot be read
    /// - [`CfgError::ParseError`] and friends if the record is invalid
    pub fn read(&self, uri: &RepoUri) -> Result<Option<StoredCfg>, CfgError> {
        let path = self.paths.cfg_path();
        if path.is_file() {
            let json = fs::read_to_string(&path).map_err(|e| CfgError::ReadError {
                path: path.clone(),
                source: e,
            })?;
            let cfg = parse_cfg(&json)?;
            return Ok(Some(StoredCfg { cfg, legacy: false }));
        }

        Ok(self.read_legacy(uri)?.map(|cfg| StoredCfg { cfg, legacy: true }))
    }

    /// Write the record atomically, creating the root if needed.
    ///
    /// Returns the path written.
    pub fn write(&self, cfg: &RepositoryCfg) -> Result<PathBuf, CfgError> {
        cfg.validate()?;
        let path = self.paths.cfg_path();
        let contents = cfg.to_json()?;
        write_atomic(&path, contents.as_bytes()).map_err(|e| CfgError::WriteError {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// True if this root carries legacy markers.
    pub fn is_legacy(&self) -> bool {
        self.paths.legacy_mapper_path().is_file()
    }

    fn read_legacy(&self, uri: &RepoUri) -> Result<Option<RepositoryCfg>, CfgError> {
        let mapper_path = self.paths.legacy_mapper_path();
        if !mapper_path.is_file() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&mapper_path).map_err(|e| CfgError::ReadError {
            path: mapper_path.clone(),
            source: e,
        })?;
        let mapper = MapperName::new(raw.trim())?;

        let mut cfg = RepositoryCfg::new(uri.clone(), Some(mapper), MapperArgs::new());
        if let Some(parent) = self.legacy_parent()? {
            cfg.parents.push(ParentRef::Root(parent));
        }
        Ok(Some(cfg))
    }

    /// Resolve the `_parent` marker, if present.
    fn legacy_parent(&self) -> Result<Option<RepoUri>, CfgError> {
        let link = self.paths.legacy_parent_path();
        let meta = match fs::symlink_metadata(&link) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CfgError::ReadError {
                    path: link,
                    source: e,
                })
            }
        };

        let target = if meta.file_type().is_symlink() {
            fs::read_link(&link).map_err(|e| CfgError::ReadError {
                path: link.clone(),
                source: e,
            })?
        } else {
            let raw = fs::read_to_string(&link).map_err(|e| CfgError::ReadError {
                path: link.clone(),
                source: e,
            })?;
            PathBuf::from(raw.trim())
        };

        let resolved = if target.is_relative() {
            self.paths.root().join(target)
        } else {
            target
        };
        Ok(Some(RepoUri::new(resolved.to_string_lossy().into_owned())?))
    }
}

/// Write bytes to `path` atomically (temp file, sync, rename), creating
/// parent directories as needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = RepoPaths::temp_path(path);
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
}
