//! mapper::factory
//!
//! Mapper construction by name.
//!
//! # Design
//!
//! Repository configuration records name their mapper; the coordinator
//! never imports concrete mapper types. Instead it asks a [`MapperCatalog`]
//! to build one from a [`MapperContext`]: the mapper's name and arguments,
//! the repository's storage, and the registry inherited from the nearest
//! ancestor using the same mapper.
//!
//! # Example
//!
//! ```
//! use strata::mapper::MapperCatalog;
//!
//! let catalog = MapperCatalog::with_builtin();
//! assert!(catalog.contains("template"));
//! assert!(!catalog.contains("hsc"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::registry::Registry;
use super::template::TemplateMapper;
use super::traits::{Mapper, MapperError};
use crate::core::repo_cfg::MapperArgs;
use crate::core::types::MapperName;
use crate::storage::Storage;

/// Name of the built-in template mapper.
pub const TEMPLATE_MAPPER: &str = "template";

/// Everything a mapper constructor gets to see.
pub struct MapperContext<'a> {
    pub name: &'a MapperName,
    pub args: &'a MapperArgs,
    pub storage: Arc<dyn Storage>,
    pub parent_registry: Option<Arc<dyn Registry>>,
}

/// Builds one kind of mapper.
pub type MapperCtor =
    Arc<dyn Fn(&MapperContext<'_>) -> Result<Arc<dyn Mapper>, MapperError> + Send + Sync>;

/// Registry of mapper constructors keyed by mapper name.
#[derive(Clone, Default)]
pub struct MapperCatalog {
    ctors: BTreeMap<String, MapperCtor>,
}

impl MapperCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in mappers.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(TEMPLATE_MAPPER, Arc::new(build_template));
        catalog
    }

    /// Add or replace a constructor.
    pub fn register(&mut self, name: impl Into<String>, ctor: MapperCtor) -> &mut Self {
        self.ctors.insert(name.into(), ctor);
        self
    }

    /// Builder-style [`MapperCatalog::register`].
    pub fn with(mut self, name: impl Into<String>, ctor: MapperCtor) -> Self {
        self.register(name, ctor);
        self
    }

    /// True if a constructor is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }

    /// Construct the mapper named in `ctx`.
    ///
    /// # Errors
    ///
    /// [`MapperError::UnknownMapper`] if nothing is registered under that
    /// name, otherwise whatever the constructor reports.
    pub fn create(&self, ctx: &MapperContext<'_>) -> Result<Arc<dyn Mapper>, MapperError> {
        let ctor = self
            .ctors
            .get(ctx.name.as_str())
            .ok_or_else(|| MapperError::UnknownMapper(ctx.name.to_string()))?;
        ctor(ctx)
    }
}

impl fmt::Debug for MapperCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperCatalog")
            .field("names", &self.names())
            .finish()
    }
}

fn build_template(ctx: &MapperContext<'_>) -> Result<Arc<dyn Mapper>, MapperError> {
    let registry_doc = ctx.storage.read_registry()?;
    let mapper = TemplateMapper::with_registry_doc(
        ctx.name.clone(),
        ctx.args,
        registry_doc.as_ref(),
        ctx.parent_registry.clone(),
    )?;
    Ok(Arc::new(mapper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoUri;
    use crate::mapper::mock::MockMapper;
    use crate::storage::open_storage;
    use tempfile::TempDir;

    fn storage(temp: &TempDir) -> Arc<dyn Storage> {
        open_storage(&RepoUri::new(temp.path().to_string_lossy().into_owned()).unwrap()).unwrap()
    }

    #[test]
    fn builtin_template() {
        let temp = TempDir::new().unwrap();
        let name = MapperName::new(TEMPLATE_MAPPER).unwrap();
        let args = MapperArgs::new();
        let mapper = MapperCatalog::with_builtin()
            .create(&MapperContext {
                name: &name,
                args: &args,
                storage: storage(&temp),
                parent_registry: None,
            })
            .unwrap();
        assert_eq!(mapper.name(), &name);
        assert!(mapper.registry().is_none());
    }

    #[test]
    fn template_loads_local_registry() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("registry.json"), r#"{"raw": [{"visit": 1}]}"#).unwrap();
        let name = MapperName::new(TEMPLATE_MAPPER).unwrap();
        let args = MapperArgs::new();
        let mapper = MapperCatalog::with_builtin()
            .create(&MapperContext {
                name: &name,
                args: &args,
                storage: storage(&temp),
                parent_registry: None,
            })
            .unwrap();
        assert_eq!(mapper.registry().unwrap().tables(), vec!["raw".to_string()]);
    }

    #[test]
    fn unknown_name() {
        let temp = TempDir::new().unwrap();
        let name = MapperName::new("hsc").unwrap();
        let args = MapperArgs::new();
        let err = MapperCatalog::with_builtin()
            .create(&MapperContext {
                name: &name,
                args: &args,
                storage: storage(&temp),
                parent_registry: None,
            })
            .unwrap_err();
        assert!(matches!(err, MapperError::UnknownMapper(ref n) if n == "hsc"));
    }

    #[test]
    fn registered_mock_is_shared() {
        let temp = TempDir::new().unwrap();
        let mock = MockMapper::new("mock");
        let catalog = MapperCatalog::new().with("mock", mock.ctor());
        assert_eq!(catalog.names(), vec!["mock"]);

        let name = MapperName::new("mock").unwrap();
        let args = MapperArgs::new();
        let built = catalog
            .create(&MapperContext {
                name: &name,
                args: &args,
                storage: storage(&temp),
                parent_registry: None,
            })
            .unwrap();
        built.get_keys(None, None).unwrap();
        assert_eq!(mock.operations().len(), 1);
    }
}
