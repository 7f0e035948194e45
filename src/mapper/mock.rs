//! mapper::mock
//!
//! Mock mapper implementation for deterministic testing.
//!
//! # Design
//!
//! The mock mapper is scripted entirely in memory: each dataset type maps
//! to `<type>/<k-v_k-v>.json`, composites list their components, and
//! metadata rows are plain identifiers. Every call is recorded so tests can
//! assert on how the coordinator drove the mapper, and any operation can be
//! made to fail.
//!
//! # Example
//!
//! ```
//! use strata::core::types::DataId;
//! use strata::mapper::mock::MockMapper;
//! use strata::mapper::{Location, Mapper};
//!
//! let mapper = MockMapper::new("mock").with_dataset("raw", &["visit"]);
//! match mapper.map("raw", &DataId::new().with("visit", 3), false).unwrap() {
//!     Some(Location::Single(loc)) => assert_eq!(loc.paths, vec!["raw/visit-3.json"]),
//!     other => panic!("unexpected {:?}", other),
//! }
//! assert_eq!(mapper.operations().len(), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::factory::MapperCtor;
use super::location::{ButlerLocation, ComponentInfo, CompositeLocation, Location};
use super::traits::{KeyMap, Mapper, MapperError};
use crate::core::types::{DataId, DataValue, KeyType, MapperName};

/// Mock mapper for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockMapper {
    name: MapperName,
    inner: Arc<Mutex<MockMapperInner>>,
}

#[derive(Debug, Default)]
struct MockDataset {
    keys: KeyMap,
    pinned: bool,
    standardize: bool,
    bypass: Option<Value>,
}

#[derive(Debug, Default)]
struct MockMapperInner {
    datasets: BTreeMap<String, MockDataset>,
    composites: BTreeMap<String, BTreeMap<String, ComponentInfo>>,
    metadata: BTreeMap<String, Vec<DataId>>,
    levels: BTreeMap<String, Vec<String>>,
    sub_levels: BTreeMap<String, String>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Which operation should fail, with the message to report.
#[derive(Debug, Clone)]
pub enum FailOn {
    Map(String),
    GetKeys(String),
    QueryMetadata(String),
    Bypass(String),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOperation {
    Map {
        dataset_type: String,
        data_id: DataId,
        write: bool,
    },
    GetKeys {
        dataset_type: Option<String>,
        level: Option<String>,
    },
    QueryMetadata {
        dataset_type: String,
        fields: Vec<String>,
    },
    Standardize {
        dataset_type: String,
    },
    Bypass {
        dataset_type: String,
    },
}

impl MockMapper {
    /// Create a mock with no dataset types.
    ///
    /// # Panics
    ///
    /// If `name` is not a valid mapper name.
    pub fn new(name: &str) -> Self {
        Self {
            name: MapperName::new(name).unwrap_or_else(|e| panic!("mock mapper name: {}", e)),
            inner: Arc::new(Mutex::new(MockMapperInner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockMapperInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a dataset type keyed on integer `keys`.
    pub fn with_dataset(self, dataset_type: &str, keys: &[&str]) -> Self {
        let keys = keys.iter().map(|k| (k.to_string(), KeyType::Int)).collect();
        self.lock().datasets.insert(
            dataset_type.to_string(),
            MockDataset {
                keys,
                pinned: true,
                ..Default::default()
            },
        );
        self
    }

    /// Declare the type of one key of a dataset type.
    pub fn with_key_type(self, dataset_type: &str, key: &str, key_type: KeyType) -> Self {
        if let Some(ds) = self.lock().datasets.get_mut(dataset_type) {
            ds.keys.insert(key.to_string(), key_type);
        }
        self
    }

    /// Locations of this type report no pinned identifier.
    pub fn with_unpinned(self, dataset_type: &str) -> Self {
        if let Some(ds) = self.lock().datasets.get_mut(dataset_type) {
            ds.pinned = false;
        }
        self
    }

    /// Standardization injects `"standardized": true` into objects.
    pub fn with_standardize(self, dataset_type: &str) -> Self {
        if let Some(ds) = self.lock().datasets.get_mut(dataset_type) {
            ds.standardize = true;
        }
        self
    }

    /// Bypass reads of this type with a fixed value.
    pub fn with_bypass(self, dataset_type: &str, value: Value) -> Self {
        if let Some(ds) = self.lock().datasets.get_mut(dataset_type) {
            ds.bypass = Some(value);
        }
        self
    }

    /// Add a composite dataset type.
    pub fn with_composite(self, dataset_type: &str, components: Vec<(&str, ComponentInfo)>) -> Self {
        let components = components
            .into_iter()
            .map(|(name, info)| (name.to_string(), info))
            .collect();
        self.lock()
            .composites
            .insert(dataset_type.to_string(), components);
        self
    }

    /// Registered identifiers returned by metadata queries.
    pub fn with_metadata(self, dataset_type: &str, rows: Vec<DataId>) -> Self {
        self.lock().metadata.insert(dataset_type.to_string(), rows);
        self
    }

    /// Keys finer than `level`.
    pub fn with_level(self, level: &str, finer: &[&str]) -> Self {
        self.lock().levels.insert(
            level.to_string(),
            finer.iter().map(|k| k.to_string()).collect(),
        );
        self
    }

    pub fn with_sub_level(self, level: &str, sub_level: &str) -> Self {
        self.lock()
            .sub_levels
            .insert(level.to_string(), sub_level.to_string());
        self
    }

    /// Configure an operation to fail.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Get recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Number of `map` calls recorded.
    pub fn map_calls(&self) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| matches!(op, MockOperation::Map { .. }))
            .count()
    }

    /// A catalog constructor handing out clones of this mock.
    pub fn ctor(&self) -> MapperCtor {
        let mock = self.clone();
        Arc::new(move |_ctx| Ok(Arc::new(mock.clone()) as Arc<dyn Mapper>))
    }

    /// The path this mock maps a dataset to.
    pub fn path_for(dataset_type: &str, data_id: &DataId) -> String {
        let stem = data_id
            .iter()
            .map(|(k, v)| format!("{}-{}", k, v))
            .collect::<Vec<_>>()
            .join("_");
        if stem.is_empty() {
            format!("{}/default.json", dataset_type)
        } else {
            format!("{}/{}.json", dataset_type, stem)
        }
    }

    fn record(&self, op: MockOperation) {
        self.lock().operations.push(op);
    }

    fn check_fail(&self, expected: &str) -> Option<MapperError> {
        let inner = self.lock();
        match (&inner.fail_on, expected) {
            (Some(FailOn::Map(msg)), "map")
            | (Some(FailOn::GetKeys(msg)), "get_keys")
            | (Some(FailOn::QueryMetadata(msg)), "query_metadata") => {
                Some(MapperError::Registry(msg.clone()))
            }
            (Some(FailOn::Bypass(msg)), "bypass") => Some(MapperError::Bypass {
                dataset_type: String::new(),
                message: msg.clone(),
            }),
            _ => None,
        }
    }
}

impl Mapper for MockMapper {
    fn name(&self) -> &MapperName {
        &self.name
    }

    fn map(
        &self,
        dataset_type: &str,
        data_id: &DataId,
        write: bool,
    ) -> Result<Option<Location>, MapperError> {
        self.record(MockOperation::Map {
            dataset_type: dataset_type.to_string(),
            data_id: data_id.clone(),
            write,
        });
        if let Some(e) = self.check_fail("map") {
            return Err(e);
        }

        let inner = self.lock();
        if let Some(components) = inner.composites.get(dataset_type) {
            return Ok(Some(
                CompositeLocation::new(dataset_type, data_id.clone(), components.clone()).into(),
            ));
        }
        let ds = inner
            .datasets
            .get(dataset_type)
            .ok_or_else(|| MapperError::NoMapping(dataset_type.to_string()))?;

        let loc = ButlerLocation::new(
            dataset_type,
            vec![Self::path_for(dataset_type, data_id)],
            data_id.clone(),
        );
        let loc = if ds.pinned { loc } else { loc.unpinned() };
        Ok(Some(loc.into()))
    }

    fn get_keys(
        &self,
        dataset_type: Option<&str>,
        level: Option<&str>,
    ) -> Result<Option<KeyMap>, MapperError> {
        self.record(MockOperation::GetKeys {
            dataset_type: dataset_type.map(str::to_string),
            level: level.map(str::to_string),
        });
        if let Some(e) = self.check_fail("get_keys") {
            return Err(e);
        }

        let inner = self.lock();
        let mut keys = match dataset_type {
            None => inner
                .datasets
                .values()
                .flat_map(|ds| ds.keys.clone())
                .collect(),
            Some(t) => match inner.datasets.get(t) {
                Some(ds) => ds.keys.clone(),
                None => return Ok(None),
            },
        };
        if let Some(finer) = level.and_then(|l| inner.levels.get(l)) {
            for key in finer {
                keys.remove(key);
            }
        }
        Ok(Some(keys))
    }

    fn query_metadata(
        &self,
        dataset_type: &str,
        fields: &[String],
        data_id: &DataId,
    ) -> Result<Vec<Vec<DataValue>>, MapperError> {
        self.record(MockOperation::QueryMetadata {
            dataset_type: dataset_type.to_string(),
            fields: fields.to_vec(),
        });
        if let Some(e) = self.check_fail("query_metadata") {
            return Err(e);
        }

        let inner = self.lock();
        let mut out: Vec<Vec<DataValue>> = Vec::new();
        for row in inner.metadata.get(dataset_type).into_iter().flatten() {
            let matches = data_id
                .iter()
                .all(|(k, v)| row.get(k).map_or(true, |have| have == v));
            if !matches {
                continue;
            }
            let tuple: Option<Vec<DataValue>> = fields.iter().map(|f| row.get(f).cloned()).collect();
            if let Some(tuple) = tuple {
                if !out.contains(&tuple) {
                    out.push(tuple);
                }
            }
        }
        Ok(out)
    }

    fn can_standardize(&self, dataset_type: &str) -> bool {
        self.lock()
            .datasets
            .get(dataset_type)
            .map_or(false, |ds| ds.standardize)
    }

    fn standardize(
        &self,
        dataset_type: &str,
        value: Value,
        _data_id: &DataId,
    ) -> Result<Value, MapperError> {
        self.record(MockOperation::Standardize {
            dataset_type: dataset_type.to_string(),
        });
        match value {
            Value::Object(mut obj) => {
                obj.insert("standardized".into(), Value::Bool(true));
                Ok(Value::Object(obj))
            }
            other => Ok(other),
        }
    }

    fn has_bypass(&self, dataset_type: &str) -> bool {
        self.lock()
            .datasets
            .get(dataset_type)
            .map_or(false, |ds| ds.bypass.is_some())
    }

    fn bypass(
        &self,
        dataset_type: &str,
        _location: &ButlerLocation,
        _data_id: &DataId,
    ) -> Result<Value, MapperError> {
        self.record(MockOperation::Bypass {
            dataset_type: dataset_type.to_string(),
        });
        if let Some(e) = self.check_fail("bypass") {
            return Err(e);
        }
        self.lock()
            .datasets
            .get(dataset_type)
            .and_then(|ds| ds.bypass.clone())
            .ok_or_else(|| MapperError::Bypass {
                dataset_type: dataset_type.to_string(),
                message: "no bypass defined".into(),
            })
    }

    fn default_sub_level(&self, level: &str) -> Option<String> {
        self.lock().sub_levels.get(level).cloned()
    }
}
