//! core::naming
//!
//! Dataset type and alias token naming rules.
//!
//! # Features
//!
//! - Normalize alias tokens to their canonical `@token` form
//! - Validate alias targets
//! - Split dotted (composite component) dataset types

use thiserror::Error;

/// Marker character that introduces an alias token.
pub const ALIAS_MARKER: char = '@';

/// Separator between a composite dataset type and its component names.
pub const COMPONENT_SEPARATOR: char = '.';

/// Errors from naming validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("badly formatted alias string: {0}")]
    BadAlias(String),

    #[error("badly formatted type string: {0}")]
    BadTarget(String),
}

/// Normalize an alias token.
///
/// The token may be given with or without its leading `@`; an `@` anywhere
/// else is rejected.
///
/// # Example
///
/// ```
/// use strata::core::naming::normalize_alias;
///
/// assert_eq!(normalize_alias("raw").unwrap(), "@raw");
/// assert_eq!(normalize_alias("@raw").unwrap(), "@raw");
/// assert!(normalize_alias("ra@w").is_err());
/// assert!(normalize_alias("@").is_err());
/// ```
pub fn normalize_alias(alias: &str) -> Result<String, NamingError> {
    let body = alias.strip_prefix(ALIAS_MARKER).unwrap_or(alias);
    if body.is_empty() {
        return Err(NamingError::BadAlias(alias.to_string()));
    }
    if body.contains(ALIAS_MARKER) || body.chars().any(char::is_whitespace) {
        return Err(NamingError::BadAlias(alias.to_string()));
    }
    Ok(format!("{}{}", ALIAS_MARKER, body))
}

/// Validate an alias target. Targets are substituted verbatim and may not
/// themselves contain alias tokens.
pub fn validate_alias_target(target: &str) -> Result<(), NamingError> {
    if target.is_empty() || target.contains(ALIAS_MARKER) {
        return Err(NamingError::BadTarget(target.to_string()));
    }
    Ok(())
}

/// Split a dataset type at its first component separator.
///
/// A trailing separator with nothing after it names no component.
///
/// # Example
///
/// ```
/// use strata::core::naming::split_head;
///
/// assert_eq!(split_head("calexp"), ("calexp", None));
/// assert_eq!(split_head("calexp.wcs.a"), ("calexp", Some("wcs.a")));
/// ```
pub fn split_head(dataset_type: &str) -> (&str, Option<&str>) {
    match dataset_type.split_once(COMPONENT_SEPARATOR) {
        Some((head, rest)) if !rest.is_empty() => (head, Some(rest)),
        Some((head, _)) => (head, None),
        None => (dataset_type, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_marker() {
        assert_eq!(normalize_alias("calexp").unwrap(), "@calexp");
    }

    #[test]
    fn normalize_rejects_inner_marker() {
        assert_eq!(
            normalize_alias("@a@b"),
            Err(NamingError::BadAlias("@a@b".into()))
        );
    }

    #[test]
    fn normalize_rejects_whitespace() {
        assert!(normalize_alias("a b").is_err());
    }

    #[test]
    fn target_rules() {
        assert!(validate_alias_target("exposure.raw").is_ok());
        assert!(validate_alias_target("@other").is_err());
        assert!(validate_alias_target("").is_err());
    }

    #[test]
    fn split_plain_type() {
        assert_eq!(split_head("raw"), ("raw", None));
        assert_eq!(split_head("raw."), ("raw", None));
    }
}
