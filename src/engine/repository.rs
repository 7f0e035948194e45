//! engine::repository
//!
//! Live repository handles: one mapper plus one storage backend.
//!
//! Every location a repository's mapper produces is stamped with the
//! repository's [`RepoBinding`], so the coordinator can route the I/O for a
//! location back to the repository that mapped it.

use std::sync::Arc;

use serde_json::Value;

use crate::core::graph::NodeId;
use crate::core::types::{DataId, RepoUri};
use crate::mapper::{ButlerLocation, Location, Mapper, MapperError, RepoBinding};
use crate::storage::{Storage, StorageError};

/// A bound repository.
#[derive(Debug, Clone)]
pub struct Repository {
    node: NodeId,
    mapper: Arc<dyn Mapper>,
    storage: Arc<dyn Storage>,
}

impl Repository {
    pub fn new(node: NodeId, mapper: Arc<dyn Mapper>, storage: Arc<dyn Storage>) -> Self {
        Self {
            node,
            mapper,
            storage,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn root(&self) -> &RepoUri {
        self.storage.root()
    }

    fn binding(&self) -> RepoBinding {
        RepoBinding {
            node: self.node,
            mapper: self.mapper.name().clone(),
            storage_name: self.storage.name(),
            storage_root: self.storage.root().clone(),
        }
    }

    /// Map through this repository's mapper and bind the result here.
    pub fn map(
        &self,
        dataset_type: &str,
        data_id: &DataId,
        write: bool,
    ) -> Result<Option<Location>, MapperError> {
        let mut location = self.mapper.map(dataset_type, data_id, write)?;
        if let Some(loc) = location.as_mut() {
            loc.set_binding(self.binding());
        }
        Ok(location)
    }

    /// True if every path of the location is present.
    pub fn exists(&self, location: &ButlerLocation) -> Result<bool, StorageError> {
        if location.paths.is_empty() {
            return Ok(false);
        }
        for path in &location.paths {
            if !self.storage.exists(path)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read every path of the location.
    pub fn read(&self, location: &ButlerLocation) -> Result<Vec<Value>, StorageError> {
        location
            .paths
            .iter()
            .map(|path| self.storage.read(path))
            .collect()
    }

    /// Write `value` to every path of the location.
    pub fn write(&self, location: &ButlerLocation, value: &Value) -> Result<(), StorageError> {
        for path in &location.paths {
            self.storage.write(path, value)?;
        }
        Ok(())
    }

    /// Move existing documents at the location aside. Returns the backup
    /// names created.
    pub fn backup(&self, location: &ButlerLocation) -> Result<Vec<String>, StorageError> {
        let mut made = Vec::new();
        for path in &location.paths {
            if let Some(name) = self.storage.backup(path)? {
                made.push(name);
            }
        }
        Ok(made)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{CfgOrigin, RepoGraph};
    use crate::core::repo_cfg::RepositoryCfg;
    use crate::mapper::mock::MockMapper;
    use crate::storage::open_storage;
    use serde_json::json;
    use tempfile::TempDir;

    fn repo(temp: &TempDir) -> Repository {
        let root = RepoUri::new(temp.path().to_string_lossy().into_owned()).unwrap();
        let node = RepoGraph::<()>::new().add_node(
            RepositoryCfg::new(root.clone(), None, Default::default()),
            CfgOrigin::New,
            None,
            false,
        );
        let mapper = MockMapper::new("mock").with_dataset("raw", &["visit"]);
        Repository::new(node, Arc::new(mapper), open_storage(&root).unwrap())
    }

    fn single(loc: Option<Location>) -> ButlerLocation {
        match loc {
            Some(Location::Single(loc)) => loc,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn map_binds_location() {
        let temp = TempDir::new().unwrap();
        let r = repo(&temp);
        let loc = single(r.map("raw", &DataId::new().with("visit", 1), false).unwrap());
        let binding = loc.binding.unwrap();
        assert_eq!(binding.node, r.node());
        assert_eq!(binding.storage_name, "posix");
        assert_eq!(binding.mapper.as_str(), "mock");
    }

    #[test]
    fn write_exists_read_backup() {
        let temp = TempDir::new().unwrap();
        let r = repo(&temp);
        let loc = single(r.map("raw", &DataId::new().with("visit", 1), true).unwrap());
        assert!(!r.exists(&loc).unwrap());
        assert!(r.backup(&loc).unwrap().is_empty());

        r.write(&loc, &json!({"a": 1})).unwrap();
        assert!(r.exists(&loc).unwrap());
        assert_eq!(r.read(&loc).unwrap(), vec![json!({"a": 1})]);

        assert_eq!(r.backup(&loc).unwrap(), vec!["raw/visit-1.json~1".to_string()]);
        assert!(!r.exists(&loc).unwrap());
    }

    #[test]
    fn pathless_location_never_exists() {
        let temp = TempDir::new().unwrap();
        let loc = ButlerLocation::new("raw", vec![], DataId::new());
        assert!(!repo(&temp).exists(&loc).unwrap());
    }
}
