//! engine::alias
//!
//! Dataset type aliases.
//!
//! # Invariants
//!
//! - Tokens are stored in `@token` form
//! - No token is a prefix of another
//! - Targets never contain `@`, so one substitution pass resolves everything
//!   resolvable
//!
//! # Example
//!
//! ```
//! use strata::engine::AliasTable;
//!
//! let mut aliases = AliasTable::new();
//! aliases.define("raw", "exposure.raw").unwrap();
//! assert_eq!(aliases.resolve("@raw").unwrap(), "exposure.raw");
//! assert_eq!(aliases.resolve("calexp").unwrap(), "calexp");
//! assert!(aliases.define("@rawish", "x").is_err());
//! assert!(aliases.resolve("@flat").is_err());
//! ```

use std::collections::BTreeMap;

use crate::core::naming::{normalize_alias, validate_alias_target, ALIAS_MARKER};

use super::error::ButlerError;

/// Alias token to dataset-type substring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alias.
    ///
    /// # Errors
    ///
    /// [`ButlerError::Alias`] if the token is malformed, the target contains
    /// `@`, or the token overlaps an existing one.
    pub fn define(&mut self, alias: &str, target: &str) -> Result<(), ButlerError> {
        let token = normalize_alias(alias)?;
        validate_alias_target(target)?;

        if let Some(existing) = self
            .entries
            .keys()
            .find(|k| k.starts_with(&token) || token.starts_with(k.as_str()))
        {
            return Err(ButlerError::Alias(format!(
                "alias '{}' overlaps with existing alias '{}'",
                token, existing
            )));
        }

        self.entries.insert(token, target.to_string());
        Ok(())
    }

    /// Substitute every registered token in `dataset_type`.
    ///
    /// # Errors
    ///
    /// [`ButlerError::Alias`] if an `@` remains afterwards.
    pub fn resolve(&self, dataset_type: &str) -> Result<String, ButlerError> {
        let mut resolved = dataset_type.to_string();
        for (token, target) in &self.entries {
            if !resolved.contains(ALIAS_MARKER) {
                break;
            }
            resolved = resolved.replace(token.as_str(), target);
        }

        if resolved.contains(ALIAS_MARKER) {
            return Err(ButlerError::Alias(format!(
                "unresolvable alias specifier in dataset type '{}'",
                resolved
            )));
        }
        Ok(resolved)
    }

    /// Registered aliases in token order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
