//! engine::subset
//!
//! Iteration over matching identifiers.
//!
//! A [`ButlerSubset`] is the set of complete identifiers at some level that
//! extend a partial one. It is computed once, at creation: the keys valid
//! for the dataset type at that level are looked up, and the registry is
//! asked for every distinct combination of them consistent with the
//! partial identifier. Each member is a [`DataRef`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use super::butler::Butler;
use super::error::ButlerError;
use crate::core::types::DataId;

/// Identifiers matching a partial identifier at a level.
#[derive(Debug)]
pub struct ButlerSubset<'b> {
    butler: &'b Butler,
    dataset_type: String,
    level: Option<String>,
    data_id: DataId,
    members: Vec<DataId>,
}

impl<'b> ButlerSubset<'b> {
    pub(crate) fn new(
        butler: &'b Butler,
        dataset_type: &str,
        level: Option<&str>,
        data_id: &DataId,
    ) -> Result<Self, ButlerError> {
        let members = match butler.get_keys(Some(dataset_type), level, data_id.tags())? {
            None => Vec::new(),
            Some(keys) if keys.is_empty() => vec![data_id.clone()],
            Some(keys) => {
                let fields: Vec<String> = keys.into_keys().collect();
                butler
                    .query_metadata(dataset_type, &fields, data_id)?
                    .into_iter()
                    .map(|row| {
                        let mut member = data_id.clone();
                        for (field, value) in fields.iter().zip(row) {
                            member.insert(field.clone(), value);
                        }
                        member
                    })
                    .collect()
            }
        };

        Ok(Self {
            butler,
            dataset_type: dataset_type.to_string(),
            level: level.map(str::to_string),
            data_id: data_id.clone(),
            members,
        })
    }

    pub fn dataset_type(&self) -> &str {
        &self.dataset_type
    }

    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    /// The partial identifier the subset was built from.
    pub fn data_id(&self) -> &DataId {
        &self.data_id
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member identifiers, in registry order.
    pub fn ids(&self) -> &[DataId] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = DataRef<'b>> + '_ {
        self.members.iter().map(|id| self.make_ref(id.clone()))
    }

    fn make_ref(&self, data_id: DataId) -> DataRef<'b> {
        DataRef {
            butler: self.butler,
            dataset_type: self.dataset_type.clone(),
            level: self.level.clone(),
            data_id,
        }
    }
}

impl<'b> IntoIterator for ButlerSubset<'b> {
    type Item = DataRef<'b>;
    type IntoIter = std::vec::IntoIter<DataRef<'b>>;

    fn into_iter(self) -> Self::IntoIter {
        let refs: Vec<DataRef<'b>> = self
            .members
            .iter()
            .map(|id| self.make_ref(id.clone()))
            .collect();
        refs.into_iter()
    }
}

/// A handle on one complete identifier.
///
/// Operations default to the dataset type the reference was made for.
#[derive(Debug, Clone)]
pub struct DataRef<'b> {
    butler: &'b Butler,
    dataset_type: String,
    level: Option<String>,
    data_id: DataId,
}

impl<'b> DataRef<'b> {
    pub fn dataset_type(&self) -> &str {
        &self.dataset_type
    }

    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    pub fn data_id(&self) -> &DataId {
        &self.data_id
    }

    fn type_or_default<'a>(&'a self, dataset_type: Option<&'a str>) -> &'a str {
        dataset_type.unwrap_or(&self.dataset_type)
    }

    pub fn get(&self, dataset_type: Option<&str>) -> Result<Arc<Value>, ButlerError> {
        self.butler
            .get(self.type_or_default(dataset_type), &self.data_id)
    }

    pub fn put(
        &self,
        value: &Value,
        dataset_type: Option<&str>,
        do_backup: bool,
    ) -> Result<(), ButlerError> {
        self.butler
            .put(value, self.type_or_default(dataset_type), &self.data_id, do_backup)
    }

    pub fn exists(&self, dataset_type: Option<&str>) -> Result<bool, ButlerError> {
        self.butler
            .dataset_exists(self.type_or_default(dataset_type), &self.data_id)
    }

    /// Keys of the dataset type finer than this reference's level.
    pub fn sub_levels(&self) -> Result<BTreeSet<String>, ButlerError> {
        let tags = self.data_id.tags();
        let all = self
            .butler
            .get_keys(Some(&self.dataset_type), None, tags)?
            .unwrap_or_default();
        let here = self
            .butler
            .get_keys(Some(&self.dataset_type), self.level.as_deref(), tags)?
            .unwrap_or_default();
        Ok(all
            .into_keys()
            .filter(|key| !here.contains_key(key))
            .collect())
    }

    /// References one level down.
    ///
    /// Without an explicit `level`, the mapper's default sub-level of this
    /// reference's level is used; a reference with neither yields nothing.
    pub fn sub_items(&self, level: Option<&str>) -> Result<Vec<DataRef<'b>>, ButlerError> {
        let level = match level {
            Some(level) => Some(level.to_string()),
            None => match &self.level {
                Some(current) => self.butler.default_sub_level(current)?,
                None => None,
            },
        };
        let Some(level) = level else {
            return Ok(Vec::new());
        };
        Ok(self
            .butler
            .subset(&self.dataset_type, Some(&level), &self.data_id)?
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::declaration::{ButlerArgs, Mode, RepositoryArgs};
    use crate::core::types::{DataValue, MapperName, RepoUri};
    use crate::mapper::mock::MockMapper;
    use crate::mapper::MapperCatalog;
    use serde_json::json;
    use tempfile::TempDir;

    fn camera() -> MockMapper {
        MockMapper::new("mock")
            .with_dataset("raw", &["visit", "ccd", "amp"])
            .with_dataset("flat", &[])
            .with_level("visit", &["ccd", "amp"])
            .with_level("sensor", &["amp"])
            .with_sub_level("visit", "sensor")
            .with_metadata(
                "raw",
                vec![
                    DataId::new().with("visit", 1).with("ccd", 1).with("amp", 1),
                    DataId::new().with("visit", 1).with("ccd", 1).with("amp", 2),
                    DataId::new().with("visit", 1).with("ccd", 2).with("amp", 1),
                    DataId::new().with("visit", 2).with("ccd", 1).with("amp", 1),
                ],
            )
    }

    fn butler(temp: &TempDir) -> Butler {
        let output = RepositoryArgs::from_uri(
            RepoUri::new(temp.path().join("repo").to_string_lossy().into_owned()).unwrap(),
        )
        .with_mode(Mode::ReadWrite)
        .with_mapper(MapperName::new("mock").unwrap());
        Butler::builder(ButlerArgs::with_repos(vec![], vec![output]))
            .catalog(MapperCatalog::new().with("mock", camera().ctor()))
            .build()
            .unwrap()
    }

    #[test]
    fn members_fill_level_keys() {
        let temp = TempDir::new().unwrap();
        let butler = butler(&temp);
        let subset = butler.subset("raw", Some("visit"), &DataId::new()).unwrap();
        assert_eq!(
            subset.ids(),
            &[DataId::new().with("visit", 1), DataId::new().with("visit", 2)]
        );
        assert_eq!(subset.dataset_type(), "raw");
    }

    #[test]
    fn partial_id_restricts_members() {
        let temp = TempDir::new().unwrap();
        let butler = butler(&temp);
        let subset = butler
            .subset("raw", Some("sensor"), &DataId::new().with("visit", 1))
            .unwrap();
        let ccds: Vec<Option<&DataValue>> = subset.ids().iter().map(|id| id.get("ccd")).collect();
        assert_eq!(ccds, vec![Some(&DataValue::Int(1)), Some(&DataValue::Int(2))]);
    }

    #[test]
    fn keyless_type_yields_the_id_itself() {
        let temp = TempDir::new().unwrap();
        let butler = butler(&temp);
        let id = DataId::new().with("visit", 4);
        let subset = butler.subset("flat", None, &id).unwrap();
        assert_eq!(subset.ids(), &[id]);
    }

    #[test]
    fn unknown_type_is_empty() {
        let temp = TempDir::new().unwrap();
        let butler = butler(&temp);
        assert!(butler.subset("nope", None, &DataId::new()).unwrap().is_empty());
    }

    #[test]
    fn refs_read_and_write() {
        let temp = TempDir::new().unwrap();
        let butler = butler(&temp);
        let id = DataId::new().with("visit", 2).with("ccd", 1).with("amp", 1);
        let r = butler.data_ref("raw", None, &id).unwrap();
        assert!(!r.exists(None).unwrap());
        r.put(&json!({"adu": 9}), None, false).unwrap();
        assert!(r.exists(None).unwrap());
        assert_eq!(*r.get(None).unwrap(), json!({"adu": 9}));
    }

    #[test]
    fn sub_levels_and_items() {
        let temp = TempDir::new().unwrap();
        let butler = butler(&temp);
        let visit = butler
            .data_ref("raw", Some("visit"), &DataId::new().with("visit", 1))
            .unwrap();
        assert_eq!(
            visit.sub_levels().unwrap(),
            BTreeSet::from(["amp".to_string(), "ccd".to_string()])
        );

        let sensors = visit.sub_items(None).unwrap();
        assert_eq!(sensors.len(), 2);
        assert!(sensors.iter().all(|s| s.level() == Some("sensor")));

        let amps = visit.sub_items(Some("amp_level_unknown")).unwrap();
        assert_eq!(amps.len(), 3);
    }
}
