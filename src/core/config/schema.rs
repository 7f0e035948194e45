//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$STRATA_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/strata/config.toml`
//! 3. `~/.strata/config.toml` (canonical write location)
//!
//! # Session Config
//!
//! Located at `strata.toml` in the working directory, or wherever
//! `--session` points. Declares the repositories a session reads and
//! writes, plus dataset type aliases.
//!
//! # Validation
//!
//! Config values are validated after parsing to ensure they conform to
//! expected formats (e.g., aliases must be well-formed tokens).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::declaration::{ButlerArgs, RepositoryArgs};
use crate::core::naming::{normalize_alias, validate_alias_target};
use crate::core::repo_cfg::MapperArgs;
use crate::core::types::{MapperName, RepoUri};

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// default_mapper = "template"
/// debug = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Mapper adopted by new outputs when the inputs do not agree on one.
    pub default_mapper: Option<MapperName>,

    /// Log at debug level by default.
    pub debug: Option<bool>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// Field types already carry their own validation; kept for symmetry
    /// with [`SessionConfig::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Session configuration.
///
/// # Example
///
/// ```toml
/// [[inputs]]
/// root = "/data/raw"
/// tags = ["raw"]
///
/// [[outputs]]
/// root = "/data/processed"
/// mode = "rw"
/// mapper = "template"
///
/// [outputs.mapper_args.datasets.calexp]
/// template = "calexp/v{visit}.json"
///
/// [aliases]
/// "@cal" = "calexp"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Legacy convention: single repository root.
    pub root: Option<RepoUri>,

    /// Legacy convention: mapper.
    pub mapper: Option<MapperName>,

    /// Legacy convention: mapper arguments.
    pub mapper_args: Option<MapperArgs>,

    /// Input declarations.
    pub inputs: Vec<RepositoryArgs>,

    /// Output declarations.
    pub outputs: Vec<RepositoryArgs>,

    /// Alias token to dataset type substring.
    pub aliases: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if aliases are malformed or the
    /// legacy and list conventions are mixed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let legacy = self.root.is_some() || self.mapper.is_some() || self.mapper_args.is_some();
        if legacy && !(self.inputs.is_empty() && self.outputs.is_empty()) {
            return Err(ConfigError::InvalidValue(
                "root/mapper/mapper_args may not be combined with inputs/outputs".to_string(),
            ));
        }

        for (token, target) in &self.aliases {
            normalize_alias(token)
                .map_err(|e| ConfigError::InvalidValue(format!("alias '{}': {}", token, e)))?;
            validate_alias_target(target)
                .map_err(|e| ConfigError::InvalidValue(format!("alias '{}': {}", token, e)))?;
        }

        Ok(())
    }

    /// True if the session declares any repository.
    pub fn declares_repositories(&self) -> bool {
        self.root.is_some() || !self.inputs.is_empty() || !self.outputs.is_empty()
    }

    /// Construction arguments for a coordinator.
    pub fn butler_args(&self) -> ButlerArgs {
        if self.inputs.is_empty() && self.outputs.is_empty() {
            ButlerArgs {
                root: self.root.clone(),
                mapper: self.mapper.clone(),
                mapper_args: self.mapper_args.clone().unwrap_or_default(),
                inputs: None,
                outputs: None,
            }
        } else {
            ButlerArgs::with_repos(self.inputs.clone(), self.outputs.clone())
        }
    }
}
