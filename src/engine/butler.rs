//! engine::butler
//!
//! The coordinator.
//!
//! # Architecture
//!
//! A [`Butler`] owns the bound repository graph, the alias table and the
//! object cache. Every dataset operation runs the same pipeline:
//!
//! ```text
//! alias resolution -> location resolution -> I/O through the owning repository
//! ```
//!
//! Reads go through the weak object cache and the mapper's standardization
//! hook. Composites are assembled from their components and never cached
//! themselves. Writes go to every output that maps the dataset, in output
//! order, with no rollback across outputs.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use strata::core::declaration::{ButlerArgs, RepositoryArgs};
//! use strata::core::types::{DataId, MapperName, RepoUri};
//! use strata::engine::Butler;
//!
//! let output = RepositoryArgs::from_uri(RepoUri::new("/data/out").unwrap())
//!     .with_mapper(MapperName::new("template").unwrap());
//! let butler = Butler::new(ButlerArgs::with_repos(vec![], vec![output])).unwrap();
//!
//! let id = DataId::new().with("visit", 1);
//! butler.put(&json!({"flux": 3.5}), "calexp", &id, false).unwrap();
//! let value = butler.get("calexp", &id).unwrap();
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::alias::AliasTable;
use super::build::{build_graph, BuildOptions};
use super::cache::{CacheKey, ObjectCache};
use super::composite::{generic_assembler, generic_disassembler};
use super::error::ButlerError;
use super::locate::Resolver;
use super::proxy::ReadProxy;
use super::repository::Repository;
use super::subset::{ButlerSubset, DataRef};
use crate::core::declaration::ButlerArgs;
use crate::core::graph::{NodeId, RepoGraph};
use crate::core::types::{DataId, DataValue, MapperName, Tag};
use crate::mapper::{
    Assembler, ButlerLocation, CompositeLocation, Disassembler, KeyMap, Location, MapperCatalog,
    MapperError, RepoBinding,
};

/// How a repository takes part in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoRole {
    /// Declared input, or ancestor of a readable repository.
    Input,
    Output,
    /// Readable output.
    Both,
}

/// Inspection record for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSummary {
    pub root: String,
    pub mapper: Option<String>,
    pub origin: String,
    pub role: RepoRole,
    pub legacy: bool,
    pub tags: Vec<String>,
    pub parents: Vec<String>,
}

/// Builder for [`Butler`].
#[derive(Debug)]
pub struct ButlerBuilder {
    args: ButlerArgs,
    catalog: MapperCatalog,
    fallback_mapper: Option<MapperName>,
    aliases: Vec<(String, String)>,
}

impl ButlerBuilder {
    /// Mapper constructors available to repositories. Defaults to the
    /// built-in catalog.
    pub fn catalog(mut self, catalog: MapperCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Mapper for new outputs when the inputs share none.
    pub fn fallback_mapper(mut self, mapper: Option<MapperName>) -> Self {
        self.fallback_mapper = mapper;
        self
    }

    /// Register an alias once the coordinator is built.
    pub fn alias(mut self, token: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.push((token.into(), target.into()));
        self
    }

    /// Construct the repository graph and the coordinator.
    ///
    /// # Errors
    ///
    /// Any construction-time [`ButlerError`]; nothing is retried.
    pub fn build(self) -> Result<Butler, ButlerError> {
        let built = build_graph(
            self.args,
            BuildOptions {
                catalog: &self.catalog,
                fallback_mapper: self.fallback_mapper.as_ref(),
            },
        )?;

        let mut aliases = AliasTable::new();
        for (token, target) in &self.aliases {
            aliases.define(token, target)?;
        }

        Ok(Butler {
            graph: built.graph,
            aliases,
            cache: RefCell::new(ObjectCache::new()),
            default_mapper: built.default_mapper,
        })
    }
}

/// The dataset access coordinator.
#[derive(Debug)]
pub struct Butler {
    graph: RepoGraph<Repository>,
    aliases: AliasTable,
    cache: RefCell<ObjectCache>,
    default_mapper: Option<MapperName>,
}

impl Butler {
    pub fn builder(args: ButlerArgs) -> ButlerBuilder {
        ButlerBuilder {
            args,
            catalog: MapperCatalog::with_builtin(),
            fallback_mapper: None,
            aliases: Vec::new(),
        }
    }

    /// Build with the built-in mapper catalog.
    pub fn new(args: ButlerArgs) -> Result<Self, ButlerError> {
        Self::builder(args).build()
    }

    pub fn graph(&self) -> &RepoGraph<Repository> {
        &self.graph
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// The mapper shared by every input, if any.
    pub fn default_mapper(&self) -> Option<&MapperName> {
        self.default_mapper.as_ref()
    }

    /// Register an alias for later dataset-type resolution.
    pub fn define_alias(&mut self, alias: &str, target: &str) -> Result<(), ButlerError> {
        self.aliases.define(alias, target)?;
        debug!(alias, target, "defined alias");
        Ok(())
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.graph)
    }

    fn repository(&self, binding: Option<&RepoBinding>) -> Result<&Repository, ButlerError> {
        let node = binding
            .map(|b| b.node)
            .ok_or_else(|| ButlerError::Invariant("location has no repository".into()))?;
        self.graph
            .handle(node)
            .ok_or_else(|| ButlerError::Invariant(format!("node {} is not bound", node)))
    }

    fn locate_or_fail(&self, dataset_type: &str, data_id: &DataId) -> Result<Location, ButlerError> {
        self.resolver()
            .locate_read(dataset_type, data_id)?
            .ok_or_else(|| ButlerError::no_results(dataset_type, data_id))
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Read a dataset now.
    ///
    /// # Errors
    ///
    /// [`ButlerError::NoResults`] if no input repository holds it.
    pub fn get(&self, dataset_type: &str, data_id: &DataId) -> Result<Arc<Value>, ButlerError> {
        let resolved = self.aliases.resolve(dataset_type)?;
        let location = self.locate_or_fail(&resolved, data_id)?;
        debug!(dataset_type = %resolved, %data_id, location = %location.dataset_type(), "get");
        self.read_location(location, data_id)
    }

    /// Locate a dataset now and read it on first access.
    ///
    /// Composites are assembled immediately; the proxy is then already
    /// evaluated.
    pub fn get_deferred(
        &self,
        dataset_type: &str,
        data_id: &DataId,
    ) -> Result<ReadProxy<'_>, ButlerError> {
        let resolved = self.aliases.resolve(dataset_type)?;
        match self.locate_or_fail(&resolved, data_id)? {
            Location::Composite(composite) => {
                Ok(ReadProxy::ready(self.assemble(&composite)?))
            }
            Location::Single(single) => {
                let data_id = data_id.clone();
                debug!(dataset_type = %resolved, %data_id, "deferred get");
                Ok(ReadProxy::new(move || self.read_single(single, &data_id)))
            }
        }
    }

    fn read_location(&self, location: Location, data_id: &DataId) -> Result<Arc<Value>, ButlerError> {
        match location {
            Location::Composite(composite) => self.assemble(&composite),
            Location::Single(single) => self.read_single(single, data_id),
        }
    }

    fn assemble(&self, composite: &CompositeLocation) -> Result<Arc<Value>, ButlerError> {
        let mut parts = BTreeMap::new();
        for (name, info) in &composite.components {
            let value = if info.subset {
                let members = self
                    .subset(&info.dataset_type, None, &composite.data_id)?
                    .iter()
                    .map(|member| member.get(None).map(|v| (*v).clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(members)
            } else {
                (*self.get(&info.dataset_type, &composite.data_id)?).clone()
            };
            parts.insert(name.clone(), value);
        }

        let assembler: Assembler = composite
            .assembler
            .clone()
            .unwrap_or_else(|| Arc::new(generic_assembler));
        let value = assembler(&composite.data_id, &parts)?;
        debug!(dataset_type = %composite.dataset_type, components = parts.len(), "assembled composite");
        Ok(Arc::new(value))
    }

    fn read_single(&self, location: ButlerLocation, data_id: &DataId) -> Result<Arc<Value>, ButlerError> {
        let repo = self.repository(location.binding.as_ref())?;
        let raw = match &location.bypass {
            Some(value) => Arc::new(value.clone()),
            None => self.read_cached(repo, &location)?,
        };

        let mapper = repo.mapper();
        if !mapper.can_standardize(&location.dataset_type) {
            return Ok(raw);
        }
        let value = mapper.standardize(&location.dataset_type, (*raw).clone(), data_id)?;
        Ok(Arc::new(value))
    }

    fn read_cached(&self, repo: &Repository, location: &ButlerLocation) -> Result<Arc<Value>, ButlerError> {
        let key = CacheKey::for_location(location);
        if let Some(key) = &key {
            if let Some(hit) = self.cache.borrow().get(key) {
                debug!(location = %location, "object cache hit");
                return Ok(hit);
            }
        }

        let mut values = repo.read(location)?;
        let value = match values.len() {
            1 => values.pop().unwrap_or(Value::Null),
            _ => Value::Array(values),
        };
        let value = Arc::new(value);
        debug!(location = %location, cached = key.is_some(), "read from storage");
        if let Some(key) = key {
            self.cache.borrow_mut().insert(key, &value);
        }
        Ok(value)
    }

    /// True if some input repository can serve the dataset.
    ///
    /// Composites exist when every component that is not a subset exists.
    pub fn dataset_exists(&self, dataset_type: &str, data_id: &DataId) -> Result<bool, ButlerError> {
        let resolved = self.aliases.resolve(dataset_type)?;
        match self.resolver().locate_read(&resolved, data_id)? {
            None => Ok(false),
            Some(Location::Single(_)) => Ok(true),
            Some(Location::Composite(composite)) => {
                for info in composite.components.values().filter(|i| !i.subset) {
                    if !self.dataset_exists(&info.dataset_type, &composite.data_id)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Write `value` to every output that maps the dataset.
    ///
    /// With `do_backup`, documents already at a target are moved aside
    /// first. A failure part way leaves earlier outputs written.
    pub fn put(
        &self,
        value: &Value,
        dataset_type: &str,
        data_id: &DataId,
        do_backup: bool,
    ) -> Result<(), ButlerError> {
        let resolved = self.aliases.resolve(dataset_type)?;
        let locations = self.resolver().locate_write(&resolved, data_id)?;
        if locations.is_empty() {
            warn!(dataset_type = %resolved, %data_id, "no output repository maps this dataset; nothing written");
            return Ok(());
        }

        let mut composites_done = HashSet::new();
        for location in locations {
            match location {
                Location::Composite(composite) => {
                    if composites_done.insert(composite.dataset_type.clone()) {
                        self.put_composite(value, &composite, do_backup)?;
                    }
                }
                Location::Single(single) => self.write_single(value, &single, do_backup)?,
            }
        }
        Ok(())
    }

    fn put_composite(
        &self,
        value: &Value,
        composite: &CompositeLocation,
        do_backup: bool,
    ) -> Result<(), ButlerError> {
        let disassembler: Disassembler = composite
            .disassembler
            .clone()
            .unwrap_or_else(|| Arc::new(generic_disassembler));
        let parts = disassembler(value, &composite.data_id, &composite.components)?;

        for (name, part) in &parts {
            let info = composite.components.get(name).ok_or_else(|| {
                MapperError::Transform {
                    dataset_type: composite.dataset_type.clone(),
                    message: format!("disassembler produced unknown component '{}'", name),
                }
            })?;
            if info.input_only {
                continue;
            }
            self.put(part, &info.dataset_type, &composite.data_id, do_backup)?;
        }
        Ok(())
    }

    fn write_single(&self, value: &Value, location: &ButlerLocation, do_backup: bool) -> Result<(), ButlerError> {
        let repo = self.repository(location.binding.as_ref())?;
        if do_backup {
            let made = repo.backup(location)?;
            if !made.is_empty() {
                debug!(backups = ?made, "backed up existing documents");
            }
        }
        repo.write(location, value)?;
        if let Some(key) = CacheKey::for_location(location) {
            self.cache.borrow_mut().remove(&key);
        }
        debug!(location = %location, root = %repo.root(), "put");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Nodes in input order that a lookup with `tags` may consult.
    fn searchable<'t>(&'t self, tags: &'t BTreeSet<Tag>) -> Result<impl Iterator<Item = &'t Repository> + 't, ButlerError> {
        let order = self.graph.input_order()?;
        Ok(order.iter().filter_map(move |&id| {
            let node = self.graph.node(id)?;
            if !tags.is_empty() && tags.is_disjoint(node.tags()) {
                return None;
            }
            node.handle()
        }))
    }

    /// Keys valid for a dataset type, optionally at a level.
    ///
    /// The first repository with an answer wins; an empty map is an answer.
    pub fn get_keys(
        &self,
        dataset_type: Option<&str>,
        level: Option<&str>,
        tags: &BTreeSet<Tag>,
    ) -> Result<Option<KeyMap>, ButlerError> {
        let resolved = dataset_type.map(|t| self.aliases.resolve(t)).transpose()?;
        for repo in self.searchable(tags)? {
            match repo.mapper().get_keys(resolved.as_deref(), level) {
                Ok(Some(keys)) => return Ok(Some(keys)),
                Ok(None) | Err(MapperError::NoMapping(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }

    /// Distinct value tuples for `fields` among datasets matching `data_id`.
    ///
    /// The first repository returning any rows wins.
    pub fn query_metadata(
        &self,
        dataset_type: &str,
        fields: &[String],
        data_id: &DataId,
    ) -> Result<Vec<Vec<DataValue>>, ButlerError> {
        let resolved = self.aliases.resolve(dataset_type)?;
        for repo in self.searchable(data_id.tags())? {
            match repo.mapper().query_metadata(&resolved, fields, data_id) {
                Ok(rows) if !rows.is_empty() => return Ok(rows),
                Ok(_) | Err(MapperError::NoMapping(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Vec::new())
    }

    /// Single-field [`Butler::query_metadata`], flattened.
    pub fn query_metadata_values(
        &self,
        dataset_type: &str,
        field: &str,
        data_id: &DataId,
    ) -> Result<Vec<DataValue>, ButlerError> {
        let rows = self.query_metadata(dataset_type, &[field.to_string()], data_id)?;
        Ok(rows.into_iter().flatten().collect())
    }

    /// Default sub-level of `level` from the first mapper that has one.
    pub fn default_sub_level(&self, level: &str) -> Result<Option<String>, ButlerError> {
        let none = BTreeSet::new();
        let found = self
            .searchable(&none)?
            .find_map(|repo| repo.mapper().default_sub_level(level));
        Ok(found)
    }

    /// Every identifier at `level` matching `data_id`.
    pub fn subset(
        &self,
        dataset_type: &str,
        level: Option<&str>,
        data_id: &DataId,
    ) -> Result<ButlerSubset<'_>, ButlerError> {
        ButlerSubset::new(self, dataset_type, level, data_id)
    }

    /// The single identifier at `level` matching `data_id`.
    ///
    /// # Errors
    ///
    /// [`ButlerError::NoResults`] unless exactly one identifier matches.
    pub fn data_ref(
        &self,
        dataset_type: &str,
        level: Option<&str>,
        data_id: &DataId,
    ) -> Result<DataRef<'_>, ButlerError> {
        let subset = self.subset(dataset_type, level, data_id)?;
        if subset.len() != 1 {
            debug!(dataset_type, %data_id, matches = subset.len(), "data_ref needs exactly one match");
            return Err(ButlerError::no_results(dataset_type, data_id));
        }
        subset
            .into_iter()
            .next()
            .ok_or_else(|| ButlerError::no_results(dataset_type, data_id))
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    /// Summaries of every repository, input order first, then outputs not
    /// already listed.
    pub fn describe(&self) -> Result<Vec<RepoSummary>, ButlerError> {
        let inputs = self.graph.input_order()?;
        let outputs = self.graph.output_order()?;
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut out = Vec::new();

        for &id in inputs.iter().chain(outputs) {
            if !seen.insert(id) {
                continue;
            }
            let node = self
                .graph
                .node(id)
                .ok_or_else(|| ButlerError::Invariant(format!("unknown node {}", id)))?;
            let role = match (inputs.contains(&id), outputs.contains(&id)) {
                (true, true) => RepoRole::Both,
                (false, true) => RepoRole::Output,
                _ => RepoRole::Input,
            };
            let mapper = node
                .handle()
                .map(|repo| repo.mapper().name().to_string())
                .or_else(|| node.cfg.mapper.as_ref().map(ToString::to_string));
            out.push(RepoSummary {
                root: node.cfg.root.to_string(),
                mapper,
                origin: node.origin.to_string(),
                role,
                legacy: node.legacy,
                tags: node.tags().iter().map(ToString::to_string).collect(),
                parents: node.cfg.parents.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(out)
    }
}
