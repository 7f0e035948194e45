//! mapper::location
//!
//! Dataset locations produced by mappers.
//!
//! # Types
//!
//! - [`ButlerLocation`] - A physical dataset: storage paths plus the
//!   identifier the mapper actually used
//! - [`CompositeLocation`] - A dataset assembled from named components
//! - [`Location`] - Either of the above
//!
//! Locations are transient: created per call, never persisted. A mapper
//! produces them unbound; the repository that owns the mapper stamps a
//! [`RepoBinding`] onto them so the coordinator knows where to do the I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::traits::MapperError;
use crate::core::graph::NodeId;
use crate::core::types::{DataId, MapperName, RepoUri};

/// Which repository a location belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoBinding {
    pub node: NodeId,
    pub mapper: MapperName,
    pub storage_name: &'static str,
    pub storage_root: RepoUri,
}

/// A physical dataset location.
#[derive(Debug, Clone, PartialEq)]
pub struct ButlerLocation {
    /// Dataset type that was mapped.
    pub dataset_type: String,
    /// Relative storage paths. Usually one.
    pub paths: Vec<String>,
    /// The identifier after the mapper filled in any missing dimensions.
    pub data_id: DataId,
    /// The identifier the mapping was keyed on, or `None` if the mapper
    /// could not pin it down. Only pinned locations are cached.
    pub used_data_id: Option<DataId>,
    /// Set by the owning repository.
    pub binding: Option<RepoBinding>,
    /// Value supplied by the mapper's bypass accessor, if any.
    pub bypass: Option<Value>,
}

impl ButlerLocation {
    pub fn new(dataset_type: impl Into<String>, paths: Vec<String>, data_id: DataId) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            paths,
            used_data_id: Some(data_id.clone()),
            data_id,
            binding: None,
            bypass: None,
        }
    }

    /// Mark the identifier as not pinned down.
    pub fn unpinned(mut self) -> Self {
        self.used_data_id = None;
        self
    }
}

impl fmt::Display for ButlerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> [{}]", self.dataset_type, self.data_id, self.paths.join(", "))?;
        if let Some(binding) = &self.binding {
            write!(f, " in {}", binding.storage_root)?;
        }
        Ok(())
    }
}

/// How one component of a composite is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Dataset type of the component.
    pub dataset_type: String,
    /// The component is a collection, gathered through a subset query.
    pub subset: bool,
    /// The component is read when assembling but never written.
    pub input_only: bool,
}

impl ComponentInfo {
    pub fn new(dataset_type: impl Into<String>) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            subset: false,
            input_only: false,
        }
    }
}

/// Builds a composite object from its component objects.
pub type Assembler =
    Arc<dyn Fn(&DataId, &BTreeMap<String, Value>) -> Result<Value, MapperError> + Send + Sync>;

/// Splits a composite object into component objects.
pub type Disassembler = Arc<
    dyn Fn(&Value, &DataId, &BTreeMap<String, ComponentInfo>) -> Result<BTreeMap<String, Value>, MapperError>
        + Send
        + Sync,
>;

/// A composite dataset location.
#[derive(Clone)]
pub struct CompositeLocation {
    pub dataset_type: String,
    pub data_id: DataId,
    pub components: BTreeMap<String, ComponentInfo>,
    pub assembler: Option<Assembler>,
    pub disassembler: Option<Disassembler>,
    pub binding: Option<RepoBinding>,
}

impl CompositeLocation {
    pub fn new(
        dataset_type: impl Into<String>,
        data_id: DataId,
        components: BTreeMap<String, ComponentInfo>,
    ) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            data_id,
            components,
            assembler: None,
            disassembler: None,
            binding: None,
        }
    }

    pub fn with_assembler(mut self, assembler: Assembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn with_disassembler(mut self, disassembler: Disassembler) -> Self {
        self.disassembler = Some(disassembler);
        self
    }
}

impl fmt::Debug for CompositeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeLocation")
            .field("dataset_type", &self.dataset_type)
            .field("data_id", &self.data_id)
            .field("components", &self.components)
            .field("assembler", &self.assembler.is_some())
            .field("disassembler", &self.disassembler.is_some())
            .field("binding", &self.binding)
            .finish()
    }
}

/// Result of mapping one dataset type in one repository.
#[derive(Debug, Clone)]
pub enum Location {
    Single(ButlerLocation),
    Composite(CompositeLocation),
}

impl Location {
    pub fn dataset_type(&self) -> &str {
        match self {
            Location::Single(loc) => &loc.dataset_type,
            Location::Composite(loc) => &loc.dataset_type,
        }
    }

    pub fn data_id(&self) -> &DataId {
        match self {
            Location::Single(loc) => &loc.data_id,
            Location::Composite(loc) => &loc.data_id,
        }
    }

    pub fn binding(&self) -> Option<&RepoBinding> {
        match self {
            Location::Single(loc) => loc.binding.as_ref(),
            Location::Composite(loc) => loc.binding.as_ref(),
        }
    }

    pub fn set_binding(&mut self, binding: RepoBinding) {
        match self {
            Location::Single(loc) => loc.binding = Some(binding),
            Location::Composite(loc) => loc.binding = Some(binding),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Location::Composite(_))
    }
}

impl From<ButlerLocation> for Location {
    fn from(loc: ButlerLocation) -> Self {
        Location::Single(loc)
    }
}

impl From<CompositeLocation> for Location {
    fn from(loc: CompositeLocation) -> Self {
        Location::Composite(loc)
    }
}
