//! core::repo_cfg::schema
//!
//! Repository configuration record schema (v1).
//!
//! # Schema Design
//!
//! A configuration record is:
//! - Self-describing with `kind` and `schema_version`
//! - Strictly parsed (unknown fields rejected)
//! - Immutable once established: reopening a writable repository must
//!   present the same mapper and mapper arguments
//!
//! # Parents
//!
//! Parents are an ordered list. Each entry is either the root of another
//! repository or an embedded (nested) record for a repository whose
//! configuration was overridden for the session that created this one.
//! Two parent references are the same parent exactly when they compare
//! equal.
//!
//! # Example
//!
//! ```
//! use strata::core::repo_cfg::schema::{parse_cfg, ParentRef, RepositoryCfg, CFG_KIND};
//! use strata::core::types::{MapperName, RepoUri};
//!
//! let mut cfg = RepositoryCfg::new(
//!     RepoUri::new("/data/out").unwrap(),
//!     Some(MapperName::new("template").unwrap()),
//!     Default::default(),
//! );
//! cfg.parents.push(ParentRef::Root(RepoUri::new("/data/in").unwrap()));
//! assert_eq!(cfg.kind, CFG_KIND);
//!
//! let json = cfg.to_json().unwrap();
//! let parsed = parse_cfg(&json).unwrap();
//! assert_eq!(parsed, cfg);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{MapperName, RepoUri, TypeError};

/// The kind identifier for repository configuration records.
pub const CFG_KIND: &str = "strata.repository-cfg";

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Mapper construction arguments. Ordered so that equality and serialization
/// are deterministic.
pub type MapperArgs = BTreeMap<String, serde_json::Value>;

/// Errors from configuration record operations.
#[derive(Debug, Error)]
pub enum CfgError {
    #[error("failed to parse repository cfg: {0}")]
    ParseError(String),

    #[error("invalid kind '{found}', expected '{}'", CFG_KIND)]
    InvalidKind { found: String },

    #[error("unsupported schema version {0}, supported: {SCHEMA_VERSION}")]
    UnsupportedVersion(u32),

    #[error("invalid repository cfg: {0}")]
    InvalidValue(String),

    #[error("failed to read repository cfg '{path}': {source}")]
    ReadError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write repository cfg '{path}': {source}")]
    WriteError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("type validation failed: {0}")]
    TypeError(#[from] TypeError),
}

/// Envelope for version dispatch before full parsing.
#[derive(Debug, Deserialize)]
struct CfgEnvelope {
    kind: String,
    schema_version: u32,
}

/// Parse a configuration record with version dispatch.
///
/// # Errors
///
/// Returns an error if:
/// - The JSON is malformed
/// - The `kind` field doesn't match [`CFG_KIND`]
/// - The `schema_version` is not supported
/// - Any field value is invalid
pub fn parse_cfg(json: &str) -> Result<RepositoryCfg, CfgError> {
    let envelope: CfgEnvelope =
        serde_json::from_str(json).map_err(|e| CfgError::ParseError(e.to_string()))?;

    if envelope.kind != CFG_KIND {
        return Err(CfgError::InvalidKind {
            found: envelope.kind,
        });
    }

    match envelope.schema_version {
        1 => {
            let cfg: RepositoryCfg =
                serde_json::from_str(json).map_err(|e| CfgError::ParseError(e.to_string()))?;
            cfg.validate()?;
            Ok(cfg)
        }
        v => Err(CfgError::UnsupportedVersion(v)),
    }
}

/// A repository configuration record (v1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryCfg {
    /// Always [`CFG_KIND`].
    pub kind: String,

    /// Always [`SCHEMA_VERSION`] when written by this crate.
    pub schema_version: u32,

    /// Storage root of the repository.
    pub root: RepoUri,

    /// Mapper identity; may be unset until a default mapper is adopted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<MapperName>,

    /// Mapper construction arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mapper_args: MapperArgs,

    /// Ordered parent references.
    #[serde(default)]
    pub parents: Vec<ParentRef>,
}

impl RepositoryCfg {
    /// Create a record with no parents.
    pub fn new(root: RepoUri, mapper: Option<MapperName>, mapper_args: MapperArgs) -> Self {
        Self {
            kind: CFG_KIND.to_string(),
            schema_version: SCHEMA_VERSION,
            root,
            mapper,
            mapper_args,
            parents: Vec::new(),
        }
    }

    /// Validate the record.
    ///
    /// # Errors
    ///
    /// Returns `CfgError::InvalidValue` if the kind or version is wrong, or if
    /// the record names its own root as a parent.
    pub fn validate(&self) -> Result<(), CfgError> {
        if self.kind != CFG_KIND {
            return Err(CfgError::InvalidKind {
                found: self.kind.clone(),
            });
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(CfgError::UnsupportedVersion(self.schema_version));
        }
        for parent in &self.parents {
            if parent.root() == &self.root {
                return Err(CfgError::InvalidValue(format!(
                    "repository '{}' lists itself as a parent",
                    self.root
                )));
            }
            if let ParentRef::Nested(nested) = parent {
                nested.validate()?;
            }
        }
        Ok(())
    }

    /// Check whether explicitly requested mapper settings agree with this
    /// record. Unrequested settings (`None`) always agree.
    pub fn matches_args(
        &self,
        mapper: Option<&MapperName>,
        mapper_args: Option<&MapperArgs>,
    ) -> bool {
        let mapper_ok = mapper.map_or(true, |m| self.mapper.as_ref() == Some(m));
        let args_ok = mapper_args.map_or(true, |a| &self.mapper_args == a);
        mapper_ok && args_ok
    }

    /// A copy of this record with the requested mapper settings applied.
    ///
    /// Used for session-only overrides of read-only repositories.
    pub fn with_override(
        &self,
        mapper: Option<&MapperName>,
        mapper_args: Option<&MapperArgs>,
    ) -> Self {
        let mut cfg = self.clone();
        if let Some(m) = mapper {
            cfg.mapper = Some(m.clone());
        }
        if let Some(a) = mapper_args {
            cfg.mapper_args = a.clone();
        }
        cfg
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, CfgError> {
        serde_json::to_string_pretty(self).map_err(|e| CfgError::ParseError(e.to_string()))
    }
}

/// One entry of a parent list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    /// Another repository, loaded from its root.
    Root(RepoUri),
    /// An embedded record for a repository opened with a session override.
    Nested(Box<RepositoryCfg>),
}

impl ParentRef {
    /// The storage root this reference points at.
    pub fn root(&self) -> &RepoUri {
        match self {
            ParentRef::Root(uri) => uri,
            ParentRef::Nested(cfg) => &cfg.root,
        }
    }

    /// A string key that is equal for two references exactly when the
    /// references are equal. Used to share nodes between children.
    pub fn identity_key(&self) -> String {
        match self {
            ParentRef::Root(uri) => format!("root:{}", uri),
            ParentRef::Nested(cfg) => format!(
                "cfg:{}",
                serde_json::to_string(cfg).unwrap_or_else(|_| cfg.root.to_string())
            ),
        }
    }
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParentRef::Root(uri) => write!(f, "{}", uri),
            ParentRef::Nested(cfg) => write!(f, "{} (nested)", cfg.root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> RepoUri {
        RepoUri::new(s).unwrap()
    }

    fn mapper(s: &str) -> MapperName {
        MapperName::new(s).unwrap()
    }

    mod parse_cfg_fn {
        use super::*;

        #[test]
        fn valid_record() {
            let json = r#"{
                "kind": "strata.repository-cfg",
                "schema_version": 1,
                "root": "/data/r1",
                "mapper": "template",
                "parents": ["/data/r0"]
            }"#;
            let cfg = parse_cfg(json).unwrap();
            assert_eq!(cfg.root, uri("/data/r1"));
            assert_eq!(cfg.parents, vec![ParentRef::Root(uri("/data/r0"))]);
            assert!(cfg.mapper_args.is_empty());
        }

        #[test]
        fn invalid_kind() {
            let json = r#"{"kind": "other", "schema_version": 1, "root": "/r"}"#;
            assert!(matches!(parse_cfg(json), Err(CfgError::InvalidKind { .. })));
        }

        #[test]
        fn unsupported_version() {
            let json = r#"{"kind": "strata.repository-cfg", "schema_version": 9, "root": "/r"}"#;
            assert!(matches!(
                parse_cfg(json),
                Err(CfgError::UnsupportedVersion(9))
            ));
        }

        #[test]
        fn unknown_fields_rejected() {
            let json = r#"{
                "kind": "strata.repository-cfg",
                "schema_version": 1,
                "root": "/r",
                "surprise": true
            }"#;
            assert!(parse_cfg(json).is_err());
        }

        #[test]
        fn self_parent_rejected() {
            let json = r#"{
                "kind": "strata.repository-cfg",
                "schema_version": 1,
                "root": "/r",
                "parents": ["/r/"]
            }"#;
            assert!(matches!(parse_cfg(json), Err(CfgError::InvalidValue(_))));
        }

        #[test]
        fn nested_parent_roundtrip() {
            let inner = RepositoryCfg::new(uri("/in"), Some(mapper("other")), MapperArgs::new());
            let mut outer = RepositoryCfg::new(uri("/out"), Some(mapper("template")), MapperArgs::new());
            outer.parents.push(ParentRef::Nested(Box::new(inner.clone())));
            outer.parents.push(ParentRef::Root(uri("/base")));

            let parsed = parse_cfg(&outer.to_json().unwrap()).unwrap();
            assert_eq!(parsed.parents[0], ParentRef::Nested(Box::new(inner)));
            assert_eq!(parsed.parents[1], ParentRef::Root(uri("/base")));
        }
    }

    mod matching {
        use super::*;

        #[test]
        fn unrequested_settings_match() {
            let cfg = RepositoryCfg::new(uri("/r"), Some(mapper("a")), MapperArgs::new());
            assert!(cfg.matches_args(None, None));
        }

        #[test]
        fn mapper_mismatch() {
            let cfg = RepositoryCfg::new(uri("/r"), Some(mapper("a")), MapperArgs::new());
            assert!(!cfg.matches_args(Some(&mapper("b")), None));
        }

        #[test]
        fn args_mismatch() {
            let cfg = RepositoryCfg::new(uri("/r"), Some(mapper("a")), MapperArgs::new());
            let mut args = MapperArgs::new();
            args.insert("calib".into(), serde_json::json!("/calib"));
            assert!(!cfg.matches_args(None, Some(&args)));
            assert!(cfg.with_override(None, Some(&args)).matches_args(None, Some(&args)));
        }
    }

    #[test]
    fn identity_keys_distinguish_kinds() {
        let root = ParentRef::Root(uri("/r"));
        let nested = ParentRef::Nested(Box::new(RepositoryCfg::new(
            uri("/r"),
            None,
            MapperArgs::new(),
        )));
        assert_ne!(root.identity_key(), nested.identity_key());
        assert_eq!(root.identity_key(), ParentRef::Root(uri("/r/")).identity_key());
    }
}
