//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`RepoUri`] - Validated repository root (plain path or `scheme://` URI)
//! - [`MapperName`] - Validated mapper identity
//! - [`Tag`] - Visibility tag restricting tagged lookups
//! - [`DataValue`] - One dimension value (integer, float or string)
//! - [`DataId`] - Partial or complete dataset identifier plus visibility tags
//! - [`KeyType`] - Declared type of a dimension key
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use strata::core::types::{DataId, MapperName, RepoUri};
//!
//! let root = RepoUri::new("file:///data/repo/").unwrap();
//! assert_eq!(root.as_str(), "file:///data/repo");
//!
//! let mapper = MapperName::new("template").unwrap();
//! assert_eq!(mapper.as_str(), "template");
//!
//! let id = DataId::new().with("visit", 42).with("filter", "r");
//! assert_eq!(id.len(), 2);
//!
//! assert!(RepoUri::new("").is_err());
//! assert!(MapperName::new("has space").is_err());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository uri: {0}")]
    InvalidRepoUri(String),

    #[error("invalid mapper name: {0}")]
    InvalidMapperName(String),

    #[error("invalid tag: {0}")]
    InvalidTag(String),

    #[error("invalid dimension: {0}")]
    InvalidDimension(String),
}

/// A validated repository root.
///
/// A root is either a local filesystem path (absolute or relative) or a URI
/// of the form `scheme://rest`. Trailing slashes are stripped so that
/// `/data/repo` and `/data/repo/` name the same repository; lineage
/// comparisons rely on that.
///
/// # Example
///
/// ```
/// use strata::core::types::RepoUri;
///
/// let uri = RepoUri::new("/data/repo/").unwrap();
/// assert_eq!(uri.as_str(), "/data/repo");
/// assert_eq!(uri.scheme(), None);
///
/// let remote = RepoUri::new("file:///data/repo").unwrap();
/// assert_eq!(remote.scheme(), Some("file"));
/// assert_eq!(remote.local_path().unwrap().to_str(), Some("/data/repo"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoUri(String);

impl RepoUri {
    /// Create a new validated repository root.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRepoUri` if the root is empty or contains
    /// control characters.
    pub fn new(uri: impl Into<String>) -> Result<Self, TypeError> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(TypeError::InvalidRepoUri("root cannot be empty".into()));
        }
        if uri.chars().any(|c| c.is_ascii_control()) {
            return Err(TypeError::InvalidRepoUri(
                "root cannot contain control characters".into(),
            ));
        }

        let mut normalized = uri;
        while normalized.len() > 1 && normalized.ends_with('/') && !normalized.ends_with("://") {
            normalized.pop();
        }
        Ok(Self(normalized))
    }

    /// The URI scheme, if the root is written as `scheme://...`.
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once("://")?;
        if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            Some(scheme)
        } else {
            None
        }
    }

    /// Local filesystem path for plain paths and `file://` URIs.
    ///
    /// Returns `None` for any other scheme.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.scheme() {
            None => Some(PathBuf::from(&self.0)),
            Some("file") => self.0.split_once("://").map(|(_, p)| PathBuf::from(p)),
            Some(_) => None,
        }
    }

    /// Get the root as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoUri {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RepoUri {
    type Error = TypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoUri> for String {
    fn from(uri: RepoUri) -> Self {
        uri.0
    }
}

impl AsRef<str> for RepoUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated mapper identity.
///
/// Mapper names are looked up in a [`crate::mapper::MapperCatalog`]. They may
/// contain ASCII alphanumerics and `_ - . :` (so `obs::HscMapper` is fine).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MapperName(String);

impl MapperName {
    /// Create a new validated mapper name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidMapperName` if the name is empty or contains
    /// characters outside `[A-Za-z0-9_.:-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidMapperName(
                "mapper name cannot be empty".into(),
            ));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
        {
            return Err(TypeError::InvalidMapperName(format!(
                "mapper name cannot contain '{c}'"
            )));
        }
        Ok(Self(name))
    }

    /// Get the mapper name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MapperName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<MapperName> for String {
    fn from(name: MapperName) -> Self {
        name.0
    }
}

impl std::fmt::Display for MapperName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A visibility tag.
///
/// Tags are attached to repository declarations and to identifiers. A tagged
/// identifier can only be satisfied by repositories carrying at least one of
/// its tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Create a new validated tag.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTag` if the tag is empty or contains
    /// whitespace or control characters.
    pub fn new(tag: impl Into<String>) -> Result<Self, TypeError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(TypeError::InvalidTag("tag cannot be empty".into()));
        }
        if tag.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidTag(
                "tag cannot contain whitespace or control characters".into(),
            ));
        }
        Ok(Self(tag))
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Tag {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One dimension value inside a [`DataId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl DataValue {
    /// Parse a command-line value: integers first, then floats, else string.
    ///
    /// # Example
    ///
    /// ```
    /// use strata::core::types::DataValue;
    ///
    /// assert_eq!(DataValue::parse("12"), DataValue::Int(12));
    /// assert_eq!(DataValue::parse("0.5"), DataValue::Float(0.5));
    /// assert_eq!(DataValue::parse("r"), DataValue::Str("r".into()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            DataValue::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            DataValue::Float(f)
        } else {
            DataValue::Str(raw.to_string())
        }
    }

    /// The declared type this value satisfies.
    pub fn key_type(&self) -> KeyType {
        match self {
            DataValue::Int(_) => KeyType::Int,
            DataValue::Float(_) => KeyType::Float,
            DataValue::Str(_) => KeyType::Str,
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataValue::Int(i) => serde_json::Value::from(*i),
            DataValue::Float(f) => serde_json::Value::from(*f),
            DataValue::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }

    /// Convert from a JSON scalar. Returns `None` for arrays, objects, bools and null.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(DataValue::Int)
                .or_else(|| n.as_f64().map(DataValue::Float)),
            serde_json::Value::String(s) => Some(DataValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int(i64::from(v))
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Str(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Str(v)
    }
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::Int(i) => write!(f, "{}", i),
            DataValue::Float(x) => write!(f, "{}", x),
            DataValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Declared type of a dimension key, as reported by `get_keys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Int,
    Float,
    Str,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Int => write!(f, "int"),
            KeyType::Float => write!(f, "float"),
            KeyType::Str => write!(f, "str"),
        }
    }
}

/// A partial or complete dataset identifier.
///
/// Maps dimension names (e.g. `visit`, `ccd`) to values and optionally
/// carries visibility tags. Dimensions are kept sorted so that the
/// canonical form is deterministic.
///
/// # Example
///
/// ```
/// use strata::core::types::{DataId, DataValue, Tag};
///
/// let mut id = DataId::new().with("ccd", 3);
/// id.update(&DataId::new().with("visit", 1).with("ccd", 4));
/// assert_eq!(id.get("ccd"), Some(&DataValue::Int(4)));
/// assert_eq!(id.canonical(), "ccd=4,visit=1");
///
/// let tagged = id.tagged(Tag::new("calib").unwrap());
/// assert!(tagged.has_tags());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataId {
    #[serde(default)]
    values: BTreeMap<String, DataValue>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    tags: BTreeSet<Tag>,
}

impl DataId {
    /// Create an empty identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of one dimension.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder-style addition of a visibility tag.
    pub fn tagged(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Parse `key=value` pairs, as given on the command line.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidDimension` for pairs without `=` or with an
    /// empty key.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self, TypeError> {
        let mut id = DataId::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                TypeError::InvalidDimension(format!("expected key=value, got '{}'", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(TypeError::InvalidDimension(format!(
                    "empty key in '{}'",
                    pair
                )));
            }
            id.insert(key, DataValue::parse(value.trim()));
        }
        Ok(id)
    }

    /// Insert or replace one dimension.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Merge another identifier into this one. Dimensions from `other` win;
    /// tags are unioned.
    pub fn update(&mut self, other: &DataId) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
        self.tags.extend(other.tags.iter().cloned());
    }

    /// Get one dimension value.
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.values.get(key)
    }

    /// Check whether a dimension is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate dimensions in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataValue)> {
        self.values.iter()
    }

    /// Dimension names in key order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no dimensions are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Visibility tags on this identifier.
    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// True if the identifier restricts lookups by tag.
    pub fn has_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    /// True if this identifier may be served by a repository carrying
    /// `repo_tags`: untagged identifiers match everything.
    pub fn visible_in(&self, repo_tags: &BTreeSet<Tag>) -> bool {
        self.tags.is_empty() || !self.tags.is_disjoint(repo_tags)
    }

    /// Deterministic `k=v,k=v` rendering used for hashing. String values are
    /// quoted so that `"1"` and `1` never collide.
    pub fn canonical(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| match v {
                DataValue::Str(s) => format!("{}={:?}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The dimensions as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl std::fmt::Display for DataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")?;
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(Tag::as_str).collect();
            write!(f, " #{}", tags.join(","))?;
        }
        Ok(())
    }
}
