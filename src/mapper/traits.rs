//! mapper::traits
//!
//! The mapper contract.
//!
//! # Design
//!
//! A mapper translates `(dataset type, identifier)` into a [`Location`]
//! and answers key and metadata queries for one repository. Mappers are
//! pure with respect to dataset bytes: they may consult a registry but
//! never read or write datasets. All I/O goes through the owning
//! repository's storage.
//!
//! Only `name`, `map` and `get_keys` are required. Everything else has a
//! default that reports "not supported".

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::location::{ButlerLocation, Location};
use super::registry::Registry;
use crate::core::types::{DataId, DataValue, KeyType, MapperName};
use crate::storage::StorageError;

/// Errors from mapper operations.
#[derive(Debug, Error)]
pub enum MapperError {
    /// The mapper does not handle this dataset type. Lookups move on to the
    /// next repository.
    #[error("no mapping for dataset type '{0}'")]
    NoMapping(String),

    /// The identifier lacks dimensions the mapper needs to write.
    #[error("identifier for '{dataset_type}' is missing {}", .missing.join(", "))]
    IncompleteId {
        dataset_type: String,
        missing: Vec<String>,
    },

    /// No mapper is registered under this name.
    #[error("unknown mapper '{0}'")]
    UnknownMapper(String),

    /// The mapper's construction arguments are unusable.
    #[error("invalid mapper arguments: {0}")]
    InvalidArgs(String),

    /// Bypass accessor failed.
    #[error("bypass for '{dataset_type}' failed: {message}")]
    Bypass {
        dataset_type: String,
        message: String,
    },

    /// Standardization or composite assembly failed.
    #[error("cannot transform '{dataset_type}': {message}")]
    Transform {
        dataset_type: String,
        message: String,
    },

    /// Registry is malformed or cannot answer.
    #[error("registry error: {0}")]
    Registry(String),

    /// The mapper's storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MapperError {
    /// True for errors that mean "try the next repository".
    pub fn is_no_mapping(&self) -> bool {
        matches!(self, MapperError::NoMapping(_))
    }
}

/// Key name to declared type, as returned by [`Mapper::get_keys`].
pub type KeyMap = BTreeMap<String, KeyType>;

/// Trait for dataset mappers.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait Mapper: Send + Sync + Debug {
    /// The mapper's registered name.
    fn name(&self) -> &MapperName;

    /// Map a dataset type and identifier to a location.
    ///
    /// Returns `Ok(None)` if the type is known but the identifier cannot be
    /// resolved to a location here.
    ///
    /// # Errors
    ///
    /// [`MapperError::NoMapping`] if the type is not known to this mapper.
    fn map(
        &self,
        dataset_type: &str,
        data_id: &DataId,
        write: bool,
    ) -> Result<Option<Location>, MapperError>;

    /// Keys valid for a dataset type, optionally restricted to a level.
    ///
    /// With no dataset type, returns the union over every type. `Ok(None)`
    /// means this mapper has no answer.
    fn get_keys(
        &self,
        dataset_type: Option<&str>,
        level: Option<&str>,
    ) -> Result<Option<KeyMap>, MapperError>;

    /// Distinct value tuples for `fields` among registered datasets of a type
    /// matching `data_id`.
    fn query_metadata(
        &self,
        dataset_type: &str,
        fields: &[String],
        data_id: &DataId,
    ) -> Result<Vec<Vec<DataValue>>, MapperError> {
        let _ = (dataset_type, fields, data_id);
        Ok(Vec::new())
    }

    /// True if [`Mapper::standardize`] transforms this dataset type.
    fn can_standardize(&self, dataset_type: &str) -> bool {
        let _ = dataset_type;
        false
    }

    /// Normalize an object just read from storage.
    fn standardize(
        &self,
        dataset_type: &str,
        value: Value,
        data_id: &DataId,
    ) -> Result<Value, MapperError> {
        let _ = (dataset_type, data_id);
        Ok(value)
    }

    /// True if the mapper supplies values for this dataset type directly.
    fn has_bypass(&self, dataset_type: &str) -> bool {
        let _ = dataset_type;
        false
    }

    /// Produce a value without reading the dataset.
    fn bypass(
        &self,
        dataset_type: &str,
        location: &ButlerLocation,
        data_id: &DataId,
    ) -> Result<Value, MapperError> {
        let _ = (location, data_id);
        Err(MapperError::Bypass {
            dataset_type: dataset_type.to_string(),
            message: "no bypass defined".into(),
        })
    }

    /// Default sub-level of `level`, used by data references.
    fn default_sub_level(&self, level: &str) -> Option<String> {
        let _ = level;
        None
    }

    /// The registry this mapper answers queries from.
    fn registry(&self) -> Option<Arc<dyn Registry>> {
        None
    }
}
