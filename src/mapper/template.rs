//! mapper::template
//!
//! The built-in mapper: path templates driven by mapper arguments.
//!
//! # Arguments
//!
//! ```json
//! {
//!   "datasets": {
//!     "raw":    { "template": "raw/v{visit:04}/c{ccd}.json", "table": "raw",
//!                 "keys": {"visit": "int", "ccd": "int", "filter": "str"} },
//!     "calexp": { "template": "calexp/v{visit}/c{ccd}.json", "standardize": true },
//!     "camera": { "template": "camera.json", "bypass": "path" }
//!   },
//!   "composites": {
//!     "exposure": { "components": { "image": {"dataset_type": "calexp"},
//!                                   "raw":   {"dataset_type": "raw", "input_only": true} } }
//!   },
//!   "levels": { "visit": ["ccd"] },
//!   "sub_levels": { "visit": "sensor" }
//! }
//! ```
//!
//! # Mapping
//!
//! Placeholders are `{key}` or `{key:0N}` (zero-padded integer). Keys
//! missing from the identifier are completed from the registry table when
//! exactly one registered row matches. Otherwise a read maps to nothing and
//! a write fails with [`MapperError::IncompleteId`].
//!
//! `levels` lists, per level, the keys finer than that level; they are left
//! out when keys are requested at that level.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::location::{ButlerLocation, ComponentInfo, CompositeLocation, Location};
use super::registry::{JsonRegistry, Registry};
use super::traits::{KeyMap, Mapper, MapperError};
use crate::core::repo_cfg::MapperArgs;
use crate::core::types::{DataId, DataValue, KeyType, MapperName};

/// How a bypass dataset is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassKind {
    /// The dataset's full storage path, as a string.
    Path,
    /// The mapped identifier, as an object.
    DataId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetSpec {
    template: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    keys: BTreeMap<String, KeyType>,
    #[serde(default)]
    standardize: bool,
    #[serde(default)]
    bypass: Option<BypassKind>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentSpec {
    dataset_type: String,
    #[serde(default)]
    subset: bool,
    #[serde(default)]
    input_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompositeSpec {
    components: BTreeMap<String, ComponentSpec>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    keys: BTreeMap<String, KeyType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TemplateArgs {
    datasets: BTreeMap<String, DatasetSpec>,
    composites: BTreeMap<String, CompositeSpec>,
    levels: BTreeMap<String, Vec<String>>,
    sub_levels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { key: String, width: Option<usize> },
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse `{key}` / `{key:0N}` placeholders.
    pub fn parse(raw: &str) -> Result<Self, MapperError> {
        let bad = |msg: &str| MapperError::InvalidArgs(format!("template '{}': {}", raw, msg));

        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| bad("unclosed '{'"))?;
            let inner = &rest[open + 1..close];
            let (key, width) = match inner.split_once(':') {
                Some((key, spec)) => {
                    let digits = spec.strip_prefix('0').ok_or_else(|| bad("format must be 0N"))?;
                    let width = digits.parse::<usize>().map_err(|_| bad("format must be 0N"))?;
                    (key, Some(width))
                }
                None => (inner, None),
            };
            if key.is_empty() || key.contains('{') {
                return Err(bad("empty placeholder"));
            }
            segments.push(Segment::Field {
                key: key.to_string(),
                width,
            });
            rest = &rest[close + 1..];
        }
        if rest.contains('}') {
            return Err(bad("unmatched '}'"));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Placeholder keys in order of first appearance.
    pub fn fields(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for seg in &self.segments {
            if let Segment::Field { key, .. } = seg {
                if !out.contains(key) {
                    out.push(key.clone());
                }
            }
        }
        out
    }

    /// Render with values from `data_id`. Returns the missing keys on failure.
    pub fn render(&self, data_id: &DataId) -> Result<String, Vec<String>> {
        let missing: Vec<String> = self
            .fields()
            .into_iter()
            .filter(|k| !data_id.contains_key(k))
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field { key, width } => match (data_id.get(key), width) {
                    (Some(DataValue::Int(i)), Some(w)) => out.push_str(&format!("{:0w$}", i, w = *w)),
                    (Some(v), _) => out.push_str(&v.to_string()),
                    (None, _) => {}
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => write!(f, "{}", s)?,
                Segment::Field { key, width: None } => write!(f, "{{{}}}", key)?,
                Segment::Field {
                    key,
                    width: Some(w),
                } => write!(f, "{{{}:0{}}}", key, w)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct DatasetMapping {
    template: PathTemplate,
    table: String,
    keys: KeyMap,
    standardize: bool,
    bypass: Option<BypassKind>,
}

/// Mapper configured entirely by its mapper arguments.
#[derive(Debug, Clone)]
pub struct TemplateMapper {
    name: MapperName,
    datasets: BTreeMap<String, DatasetMapping>,
    composites: BTreeMap<String, CompositeSpec>,
    levels: BTreeMap<String, Vec<String>>,
    sub_levels: BTreeMap<String, String>,
    registry: Option<Arc<dyn Registry>>,
}

impl TemplateMapper {
    /// Build from mapper arguments.
    ///
    /// # Errors
    ///
    /// [`MapperError::InvalidArgs`] for unknown fields, bad templates, or
    /// composites naming themselves as a component.
    pub fn from_args(
        name: MapperName,
        args: &MapperArgs,
        registry: Option<Arc<dyn Registry>>,
    ) -> Result<Self, MapperError> {
        let doc = Value::Object(args.clone().into_iter().collect());
        let parsed: TemplateArgs =
            serde_json::from_value(doc).map_err(|e| MapperError::InvalidArgs(e.to_string()))?;

        let mut datasets = BTreeMap::new();
        for (dataset_type, entry) in parsed.datasets {
            let template = PathTemplate::parse(&entry.template)?;
            let mut keys = entry.keys;
            for field in template.fields() {
                keys.entry(field).or_insert(KeyType::Int);
            }
            datasets.insert(
                dataset_type.clone(),
                DatasetMapping {
                    template,
                    table: entry.table.unwrap_or(dataset_type),
                    keys,
                    standardize: entry.standardize,
                    bypass: entry.bypass,
                },
            );
        }

        for (name, composite) in &parsed.composites {
            if datasets.contains_key(name) {
                return Err(MapperError::InvalidArgs(format!(
                    "'{}' is both a dataset and a composite",
                    name
                )));
            }
            if composite.components.values().any(|c| &c.dataset_type == name) {
                return Err(MapperError::InvalidArgs(format!(
                    "composite '{}' lists itself as a component",
                    name
                )));
            }
        }

        Ok(Self {
            name,
            datasets,
            composites: parsed.composites,
            levels: parsed.levels,
            sub_levels: parsed.sub_levels,
            registry,
        })
    }

    /// Build from arguments, loading a registry from `registry_doc` when
    /// given and falling back to `inherited` otherwise.
    pub fn with_registry_doc(
        name: MapperName,
        args: &MapperArgs,
        registry_doc: Option<&Value>,
        inherited: Option<Arc<dyn Registry>>,
    ) -> Result<Self, MapperError> {
        let registry = match registry_doc {
            Some(doc) => Some(Arc::new(JsonRegistry::from_value(doc)?) as Arc<dyn Registry>),
            None => inherited,
        };
        Self::from_args(name, args, registry)
    }

    /// Dataset types this mapper knows, composites included.
    pub fn dataset_types(&self) -> Vec<String> {
        self.datasets
            .keys()
            .chain(self.composites.keys())
            .cloned()
            .collect()
    }

    fn complete_id(
        &self,
        mapping: &DatasetMapping,
        data_id: &DataId,
        missing: &[String],
    ) -> Result<Option<DataId>, MapperError> {
        let Some(registry) = &self.registry else {
            return Ok(None);
        };
        let rows = registry.lookup(&mapping.table, missing, data_id)?;
        if rows.len() != 1 {
            debug!(
                table = %mapping.table,
                matches = rows.len(),
                "registry cannot complete identifier"
            );
            return Ok(None);
        }

        let mut filled = data_id.clone();
        for (key, value) in missing.iter().zip(rows.into_iter().flatten()) {
            filled.insert(key.clone(), value);
        }
        Ok(Some(filled))
    }

    fn keys_at_level(&self, mut keys: KeyMap, level: Option<&str>) -> KeyMap {
        if let Some(finer) = level.and_then(|l| self.levels.get(l)) {
            for key in finer {
                keys.remove(key);
            }
        }
        keys
    }

    fn composite_keys(&self, composite: &CompositeSpec) -> KeyMap {
        let mut keys = composite.keys.clone();
        for component in composite.components.values() {
            if let Some(mapping) = self.datasets.get(&component.dataset_type) {
                for (k, t) in &mapping.keys {
                    keys.entry(k.clone()).or_insert(*t);
                }
            }
        }
        keys
    }
}

impl Mapper for TemplateMapper {
    fn name(&self) -> &MapperName {
        &self.name
    }

    fn map(
        &self,
        dataset_type: &str,
        data_id: &DataId,
        write: bool,
    ) -> Result<Option<Location>, MapperError> {
        if let Some(composite) = self.composites.get(dataset_type) {
            let components = composite
                .components
                .iter()
                .map(|(name, c)| {
                    let info = ComponentInfo {
                        dataset_type: c.dataset_type.clone(),
                        subset: c.subset,
                        input_only: c.input_only,
                    };
                    (name.clone(), info)
                })
                .collect();
            return Ok(Some(
                CompositeLocation::new(dataset_type, data_id.clone(), components).into(),
            ));
        }

        let mapping = self
            .datasets
            .get(dataset_type)
            .ok_or_else(|| MapperError::NoMapping(dataset_type.to_string()))?;

        let filled = match mapping.template.render(data_id) {
            Ok(path) => return Ok(Some(ButlerLocation::new(dataset_type, vec![path], data_id.clone()).into())),
            Err(missing) => match self.complete_id(mapping, data_id, &missing)? {
                Some(filled) => filled,
                None if write => {
                    return Err(MapperError::IncompleteId {
                        dataset_type: dataset_type.to_string(),
                        missing,
                    })
                }
                None => return Ok(None),
            },
        };

        match mapping.template.render(&filled) {
            Ok(path) => Ok(Some(ButlerLocation::new(dataset_type, vec![path], filled).into())),
            Err(missing) => Err(MapperError::IncompleteId {
                dataset_type: dataset_type.to_string(),
                missing,
            }),
        }
    }

    fn get_keys(
        &self,
        dataset_type: Option<&str>,
        level: Option<&str>,
    ) -> Result<Option<KeyMap>, MapperError> {
        let keys = match dataset_type {
            None => {
                let mut all = KeyMap::new();
                for mapping in self.datasets.values() {
                    for (k, t) in &mapping.keys {
                        all.entry(k.clone()).or_insert(*t);
                    }
                }
                for composite in self.composites.values() {
                    for (k, t) in self.composite_keys(composite) {
                        all.entry(k).or_insert(t);
                    }
                }
                all
            }
            Some(t) => match (self.datasets.get(t), self.composites.get(t)) {
                (Some(mapping), _) => mapping.keys.clone(),
                (None, Some(composite)) => self.composite_keys(composite),
                (None, None) => return Ok(None),
            },
        };
        Ok(Some(self.keys_at_level(keys, level)))
    }

    fn query_metadata(
        &self,
        dataset_type: &str,
        fields: &[String],
        data_id: &DataId,
    ) -> Result<Vec<Vec<DataValue>>, MapperError> {
        let table = match (self.datasets.get(dataset_type), self.composites.get(dataset_type)) {
            (Some(mapping), _) => mapping.table.clone(),
            (None, Some(composite)) => composite
                .table
                .clone()
                .unwrap_or_else(|| dataset_type.to_string()),
            (None, None) => return Err(MapperError::NoMapping(dataset_type.to_string())),
        };
        match &self.registry {
            Some(registry) => registry.lookup(&table, fields, data_id),
            None => Ok(Vec::new()),
        }
    }

    fn can_standardize(&self, dataset_type: &str) -> bool {
        self.datasets
            .get(dataset_type)
            .map_or(false, |m| m.standardize)
    }

    fn standardize(
        &self,
        _dataset_type: &str,
        value: Value,
        data_id: &DataId,
    ) -> Result<Value, MapperError> {
        match value {
            Value::Object(mut obj) => {
                obj.insert("data_id".into(), data_id.to_json());
                Ok(Value::Object(obj))
            }
            other => Ok(other),
        }
    }

    fn has_bypass(&self, dataset_type: &str) -> bool {
        self.datasets
            .get(dataset_type)
            .map_or(false, |m| m.bypass.is_some())
    }

    fn bypass(
        &self,
        dataset_type: &str,
        location: &ButlerLocation,
        data_id: &DataId,
    ) -> Result<Value, MapperError> {
        let fail = |message: &str| MapperError::Bypass {
            dataset_type: dataset_type.to_string(),
            message: message.to_string(),
        };
        match self.datasets.get(dataset_type).and_then(|m| m.bypass) {
            Some(BypassKind::DataId) => Ok(data_id.to_json()),
            Some(BypassKind::Path) => {
                let binding = location
                    .binding
                    .as_ref()
                    .ok_or_else(|| fail("location is not bound to a repository"))?;
                let path = location.paths.first().ok_or_else(|| fail("no path"))?;
                Ok(Value::String(format!("{}/{}", binding.storage_root, path)))
            }
            None => Err(fail("no bypass defined")),
        }
    }

    fn default_sub_level(&self, level: &str) -> Option<String> {
        self.sub_levels.get(level).cloned()
    }

    fn registry(&self) -> Option<Arc<dyn Registry>> {
        self.registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(doc: Value) -> MapperArgs {
        doc.as_object().unwrap().clone().into_iter().collect()
    }

    fn mapper_with(doc: Value, registry: Option<Value>) -> TemplateMapper {
        TemplateMapper::with_registry_doc(
            MapperName::new("template").unwrap(),
            &args(doc),
            registry.as_ref(),
            None,
        )
        .unwrap()
    }

    fn camera() -> TemplateMapper {
        mapper_with(
            json!({
                "datasets": {
                    "raw": {"template": "raw/v{visit:04}/c{ccd}.json",
                            "keys": {"filter": "str"}},
                    "calexp": {"template": "calexp/{visit}.json", "standardize": true},
                    "camera": {"template": "camera.json", "bypass": "path"},
                    "dims": {"template": "dims/{visit}.json", "bypass": "data_id"}
                },
                "composites": {
                    "exposure": {"components": {
                        "image": {"dataset_type": "calexp"},
                        "raw": {"dataset_type": "raw", "input_only": true}
                    }}
                },
                "levels": {"visit": ["ccd"]},
                "sub_levels": {"visit": "sensor"}
            }),
            Some(json!({"raw": [
                {"visit": 1, "ccd": 0, "filter": "r"},
                {"visit": 2, "ccd": 0, "filter": "g"},
                {"visit": 2, "ccd": 1, "filter": "g"}
            ]})),
        )
    }

    fn single(loc: Option<Location>) -> ButlerLocation {
        match loc {
            Some(Location::Single(loc)) => loc,
            other => panic!("expected single location, got {:?}", other),
        }
    }

    mod templates {
        use super::*;

        #[test]
        fn parse_and_render() {
            let t = PathTemplate::parse("raw/v{visit:04}/c{ccd}.json").unwrap();
            assert_eq!(t.fields(), vec!["visit".to_string(), "ccd".to_string()]);
            let id = DataId::new().with("visit", 12).with("ccd", 3);
            assert_eq!(t.render(&id).unwrap(), "raw/v0012/c3.json");
            assert_eq!(t.to_string(), "raw/v{visit:04}/c{ccd}.json");
        }

        #[test]
        fn render_reports_missing() {
            let t = PathTemplate::parse("{a}/{b}.json").unwrap();
            assert_eq!(
                t.render(&DataId::new().with("a", 1)).unwrap_err(),
                vec!["b".to_string()]
            );
        }

        #[test]
        fn malformed_rejected() {
            for bad in ["{a", "a}", "{}", "{a:4}", "{a:0x}"] {
                assert!(PathTemplate::parse(bad).is_err(), "{}", bad);
            }
        }
    }

    mod mapping {
        use super::*;

        #[test]
        fn complete_id_maps_directly() {
            let loc = single(
                camera()
                    .map("raw", &DataId::new().with("visit", 1).with("ccd", 0), false)
                    .unwrap(),
            );
            assert_eq!(loc.paths, vec!["raw/v0001/c0.json".to_string()]);
            assert!(loc.used_data_id.is_some());
        }

        #[test]
        fn registry_completes_unique_match() {
            let loc = single(camera().map("raw", &DataId::new().with("visit", 1), false).unwrap());
            assert_eq!(loc.data_id.get("ccd"), Some(&DataValue::Int(0)));
            assert_eq!(loc.paths, vec!["raw/v0001/c0.json".to_string()]);
        }

        #[test]
        fn ambiguous_read_maps_nothing() {
            let mapped = camera().map("raw", &DataId::new().with("visit", 2), false).unwrap();
            assert!(mapped.is_none());
        }

        #[test]
        fn ambiguous_write_is_incomplete() {
            let err = camera()
                .map("raw", &DataId::new().with("visit", 2), true)
                .unwrap_err();
            assert!(matches!(
                err,
                MapperError::IncompleteId { ref missing, .. } if missing == &vec!["ccd".to_string()]
            ));
        }

        #[test]
        fn unknown_type_is_no_mapping() {
            let err = camera().map("flat", &DataId::new(), false).unwrap_err();
            assert!(err.is_no_mapping());
        }

        #[test]
        fn composite_lists_components() {
            match camera().map("exposure", &DataId::new().with("visit", 1), false).unwrap() {
                Some(Location::Composite(c)) => {
                    assert_eq!(c.components.len(), 2);
                    assert!(c.components["raw"].input_only);
                    assert_eq!(c.components["image"].dataset_type, "calexp");
                }
                other => panic!("expected composite, got {:?}", other),
            }
        }

        #[test]
        fn self_referencing_composite_rejected() {
            let err = TemplateMapper::from_args(
                MapperName::new("t").unwrap(),
                &args(json!({"composites": {"x": {"components": {"a": {"dataset_type": "x"}}}}})),
                None,
            )
            .unwrap_err();
            assert!(matches!(err, MapperError::InvalidArgs(_)));
        }

        #[test]
        fn unknown_args_rejected() {
            let err = TemplateMapper::from_args(
                MapperName::new("t").unwrap(),
                &args(json!({"dataset": {}})),
                None,
            )
            .unwrap_err();
            assert!(matches!(err, MapperError::InvalidArgs(_)));
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn keys_include_template_fields() {
            let keys = camera().get_keys(Some("raw"), None).unwrap().unwrap();
            assert_eq!(
                keys.keys().cloned().collect::<Vec<_>>(),
                vec!["ccd".to_string(), "filter".to_string(), "visit".to_string()]
            );
            assert_eq!(keys["filter"], KeyType::Str);
        }

        #[test]
        fn level_drops_finer_keys() {
            let keys = camera().get_keys(Some("raw"), Some("visit")).unwrap().unwrap();
            assert!(!keys.contains_key("ccd"));
            assert!(keys.contains_key("visit"));
        }

        #[test]
        fn unknown_type_has_no_keys() {
            assert!(camera().get_keys(Some("flat"), None).unwrap().is_none());
        }

        #[test]
        fn composite_keys_union_components() {
            let keys = camera().get_keys(Some("exposure"), None).unwrap().unwrap();
            assert!(keys.contains_key("ccd") && keys.contains_key("visit"));
        }

        #[test]
        fn sub_levels() {
            assert_eq!(camera().default_sub_level("visit"), Some("sensor".to_string()));
            assert_eq!(camera().default_sub_level("sensor"), None);
        }
    }

    mod hooks {
        use super::*;
        use crate::core::graph::{CfgOrigin, RepoGraph};
        use crate::core::repo_cfg::RepositoryCfg;
        use crate::core::types::RepoUri;
        use crate::mapper::location::RepoBinding;

        #[test]
        fn standardize_injects_data_id() {
            let m = camera();
            assert!(m.can_standardize("calexp"));
            assert!(!m.can_standardize("raw"));
            let out = m
                .standardize("calexp", json!({"pixels": [1]}), &DataId::new().with("visit", 3))
                .unwrap();
            assert_eq!(out["data_id"], json!({"visit": 3}));
            assert_eq!(m.standardize("calexp", json!(5), &DataId::new()).unwrap(), json!(5));
        }

        #[test]
        fn path_bypass_needs_binding() {
            let m = camera();
            assert!(m.has_bypass("camera"));
            let mut loc = single(m.map("camera", &DataId::new(), false).unwrap());
            assert!(m.bypass("camera", &loc, &DataId::new()).is_err());

            let root = RepoUri::new("/data/r").unwrap();
            let node = RepoGraph::<()>::new().add_node(
                RepositoryCfg::new(root.clone(), None, Default::default()),
                CfgOrigin::Existing,
                None,
                false,
            );
            loc.binding = Some(RepoBinding {
                node,
                mapper: m.name().clone(),
                storage_name: "posix",
                storage_root: root,
            });
            assert_eq!(
                m.bypass("camera", &loc, &DataId::new()).unwrap(),
                json!("/data/r/camera.json")
            );
        }

        #[test]
        fn data_id_bypass() {
            let m = camera();
            let id = DataId::new().with("visit", 9);
            let loc = single(m.map("dims", &id, false).unwrap());
            assert_eq!(m.bypass("dims", &loc, &id).unwrap(), json!({"visit": 9}));
        }

        #[test]
        fn query_uses_table_and_registry() {
            let rows = camera()
                .query_metadata("raw", &["ccd".to_string()], &DataId::new().with("visit", 2))
                .unwrap();
            assert_eq!(rows, vec![vec![DataValue::Int(0)], vec![DataValue::Int(1)]]);
            assert!(camera()
                .query_metadata("calexp", &["visit".to_string()], &DataId::new())
                .unwrap()
                .is_empty());
        }

        #[test]
        fn inherited_registry_used_when_none_local() {
            let parent = camera().registry();
            let child = TemplateMapper::with_registry_doc(
                MapperName::new("template").unwrap(),
                &args(json!({"datasets": {"raw": {"template": "r/{visit}/{ccd}.json"}}})),
                None,
                parent,
            )
            .unwrap();
            let loc = single(child.map("raw", &DataId::new().with("visit", 1), false).unwrap());
            assert_eq!(loc.paths, vec!["r/1/0.json".to_string()]);
        }
    }
}
