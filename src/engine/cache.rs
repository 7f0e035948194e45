//! engine::cache
//!
//! Non-owning cache of objects read from storage.
//!
//! # Design
//!
//! Entries are keyed by a SHA-256 over everything that determines what a
//! read returns: storage backend, mapper, repository, root, paths, the
//! identifier the mapper actually used, and the dataset type. Values are
//! held through [`Weak`] references, so the cache never keeps an object
//! alive; once every caller drops its [`Arc`] the entry is dead and is
//! pruned on the next insert.
//!
//! Locations whose identifier was not pinned down by the mapper have no
//! key and are never cached.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::mapper::ButlerLocation;

/// Structural hash identifying one read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for a location.
    ///
    /// Returns `None` for unbound locations and for locations without a
    /// pinned identifier.
    pub fn for_location(location: &ButlerLocation) -> Option<Self> {
        let binding = location.binding.as_ref()?;
        let used = location.used_data_id.as_ref()?;

        let node = binding.node.to_string();
        let mut hasher = Sha256::new();
        for part in [
            binding.storage_name,
            binding.mapper.as_str(),
            node.as_str(),
            binding.storage_root.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        for path in &location.paths {
            hasher.update(path.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"\0");
        hasher.update(used.canonical().as_bytes());
        hasher.update(b"\0");
        hasher.update(location.dataset_type.as_bytes());

        Some(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Weak-reference object cache.
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: HashMap<CacheKey, Weak<Value>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live object for `key`, if any caller still holds it.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Value>> {
        self.entries.get(key).and_then(Weak::upgrade)
    }

    /// Remember `value` under `key` without taking ownership.
    pub fn insert(&mut self, key: CacheKey, value: &Arc<Value>) {
        self.prune();
        self.entries.insert(key, Arc::downgrade(value));
    }

    /// Forget `key`.
    pub fn remove(&mut self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Drop entries whose objects are gone.
    pub fn prune(&mut self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of entries, dead ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{CfgOrigin, RepoGraph};
    use crate::core::repo_cfg::RepositoryCfg;
    use crate::core::types::{DataId, MapperName, RepoUri};
    use crate::mapper::RepoBinding;
    use serde_json::json;

    fn bound(paths: &[&str], id: DataId) -> ButlerLocation {
        let root = RepoUri::new("/r").unwrap();
        let node = RepoGraph::<()>::new().add_node(
            RepositoryCfg::new(root.clone(), None, Default::default()),
            CfgOrigin::Existing,
            None,
            false,
        );
        let mut loc = ButlerLocation::new("raw", paths.iter().map(|p| p.to_string()).collect(), id);
        loc.binding = Some(RepoBinding {
            node,
            mapper: MapperName::new("m").unwrap(),
            storage_name: "posix",
            storage_root: root,
        });
        loc
    }

    mod keys {
        use super::*;

        #[test]
        fn deterministic_and_sensitive() {
            let a = CacheKey::for_location(&bound(&["a.json"], DataId::new().with("v", 1))).unwrap();
            let b = CacheKey::for_location(&bound(&["a.json"], DataId::new().with("v", 1))).unwrap();
            let c = CacheKey::for_location(&bound(&["a.json"], DataId::new().with("v", 2))).unwrap();
            let d = CacheKey::for_location(&bound(&["b.json"], DataId::new().with("v", 1))).unwrap();
            assert_eq!(a, b);
            assert_ne!(a, c);
            assert_ne!(a, d);
            assert_eq!(a.as_str().len(), 64);
        }

        #[test]
        fn unpinned_or_unbound_has_no_key() {
            assert!(CacheKey::for_location(&bound(&["a.json"], DataId::new()).unpinned()).is_none());
            let unbound = ButlerLocation::new("raw", vec!["a.json".into()], DataId::new());
            assert!(CacheKey::for_location(&unbound).is_none());
        }
    }

    mod weak {
        use super::*;

        #[test]
        fn live_values_are_returned() {
            let mut cache = ObjectCache::new();
            let key = CacheKey::for_location(&bound(&["a.json"], DataId::new())).unwrap();
            let value = Arc::new(json!({"x": 1}));
            cache.insert(key.clone(), &value);
            assert!(Arc::ptr_eq(&cache.get(&key).unwrap(), &value));
        }

        #[test]
        fn dropped_values_vanish() {
            let mut cache = ObjectCache::new();
            let key = CacheKey::for_location(&bound(&["a.json"], DataId::new())).unwrap();
            {
                let value = Arc::new(json!(1));
                cache.insert(key.clone(), &value);
            }
            assert!(cache.get(&key).is_none());
            cache.prune();
            assert!(cache.is_empty());
        }

        #[test]
        fn remove_forgets() {
            let mut cache = ObjectCache::new();
            let key = CacheKey::for_location(&bound(&["a.json"], DataId::new())).unwrap();
            let value = Arc::new(json!(1));
            cache.insert(key.clone(), &value);
            cache.remove(&key);
            assert!(cache.get(&key).is_none());
            assert_eq!(cache.len(), 0);
        }
    }
}
