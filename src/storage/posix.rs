//! storage::posix
//!
//! Local filesystem storage backend.
//!
//! # Layout
//!
//! Datasets are JSON documents stored at mapper-chosen relative paths under
//! the repository root. Writes are atomic (temp file, sync, rename) and
//! backups rename the existing document to `<path>~N` for the first free N.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::traits::{Storage, StorageError};
use crate::core::paths::RepoPaths;
use crate::core::repo_cfg::store::write_atomic;
use crate::core::repo_cfg::{CfgStore, RepositoryCfg, StoredCfg};
use crate::core::types::RepoUri;

/// Storage backed by a local directory.
#[derive(Debug, Clone)]
pub struct PosixStorage {
    uri: RepoUri,
    store: CfgStore,
}

impl PosixStorage {
    /// Bind to a local root.
    pub fn new(uri: RepoUri, root: PathBuf) -> Self {
        Self {
            uri,
            store: CfgStore::new(root),
        }
    }

    fn paths(&self) -> &RepoPaths {
        self.store.paths()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.paths().dataset_path(path)?)
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Storage for PosixStorage {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn root(&self) -> &RepoUri {
        &self.uri
    }

    fn get_cfg(&self) -> Result<Option<StoredCfg>, StorageError> {
        Ok(self.store.read(&self.uri)?)
    }

    fn put_cfg(&self, cfg: &RepositoryCfg) -> Result<(), StorageError> {
        let path = self.store.write(cfg)?;
        debug!(path = %path.display(), "wrote repository cfg");
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.is_file())
    }

    fn read(&self, path: &str) -> Result<serde_json::Value, StorageError> {
        let full = self.resolve(path)?;
        let contents = match fs::read_to_string(&full) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(full))
            }
            Err(e) => return Err(Self::io(&full)(e)),
        };
        serde_json::from_str(&contents).map_err(|e| StorageError::Decode {
            path: full,
            message: e.to_string(),
        })
    }

    fn write(&self, path: &str, value: &serde_json::Value) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        let contents = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Decode {
            path: full.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&full, &contents).map_err(Self::io(&full))?;
        debug!(path = %full.display(), "wrote dataset");
        Ok(())
    }

    fn backup(&self, path: &str) -> Result<Option<String>, StorageError> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Ok(None);
        }

        let mut n = 1;
        let target = loop {
            let candidate = RepoPaths::backup_path(&full, n);
            if !candidate.exists() {
                break candidate;
            }
            n += 1;
        };
        fs::rename(&full, &target).map_err(Self::io(&full))?;
        debug!(from = %full.display(), to = %target.display(), "backed up dataset");
        Ok(Some(format!("{}~{}", path, n)))
    }

    fn read_registry(&self) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.paths().registry_path();
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(Self::io(&path))?;
        let value = serde_json::from_str(&contents).map_err(|e| StorageError::Decode {
            path,
            message: e.to_string(),
        })?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn storage(temp: &TempDir) -> PosixStorage {
        let uri = RepoUri::new(temp.path().to_string_lossy().into_owned()).unwrap();
        PosixStorage::new(uri, temp.path().to_path_buf())
    }

    #[test]
    fn write_read_exists() {
        let temp = TempDir::new().unwrap();
        let s = storage(&temp);
        assert!(!s.exists("a/b.json").unwrap());
        s.write("a/b.json", &json!({"v": 1})).unwrap();
        assert!(s.exists("a/b.json").unwrap());
        assert_eq!(s.read("a/b.json").unwrap(), json!({"v": 1}));
    }

    #[test]
    fn read_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            storage(&temp).read("nope.json"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn escaping_paths_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            storage(&temp).write("../x.json", &json!(1)),
            Err(StorageError::Path(_))
        ));
    }

    #[test]
    fn backup_picks_first_free_slot() {
        let temp = TempDir::new().unwrap();
        let s = storage(&temp);
        assert_eq!(s.backup("x.json").unwrap(), None);

        s.write("x.json", &json!(1)).unwrap();
        assert_eq!(s.backup("x.json").unwrap(), Some("x.json~1".to_string()));
        s.write("x.json", &json!(2)).unwrap();
        assert_eq!(s.backup("x.json").unwrap(), Some("x.json~2".to_string()));

        assert!(!s.exists("x.json").unwrap());
        assert!(temp.path().join("x.json~1").is_file());
        assert!(temp.path().join("x.json~2").is_file());
    }

    #[test]
    fn cfg_roundtrip() {
        let temp = TempDir::new().unwrap();
        let s = storage(&temp);
        assert!(s.get_cfg().unwrap().is_none());

        let cfg = RepositoryCfg::new(s.root().clone(), None, Default::default());
        s.put_cfg(&cfg).unwrap();
        assert_eq!(s.get_cfg().unwrap().unwrap().cfg, cfg);
    }

    #[test]
    fn registry_optional() {
        let temp = TempDir::new().unwrap();
        let s = storage(&temp);
        assert!(s.read_registry().unwrap().is_none());
        fs::write(temp.path().join("registry.json"), r#"{"raw": []}"#).unwrap();
        assert_eq!(s.read_registry().unwrap(), Some(json!({"raw": []})));
    }
}
