//! engine::error
//!
//! The coordinator's error taxonomy.

use thiserror::Error;

use crate::core::declaration::DeclarationError;
use crate::core::graph::GraphError;
use crate::core::naming::NamingError;
use crate::core::repo_cfg::CfgError;
use crate::core::types::DataId;
use crate::core::verify::VerifyError;
use crate::mapper::MapperError;
use crate::storage::StorageError;

/// Errors from coordinator construction and dataset access.
#[derive(Debug, Error)]
pub enum ButlerError {
    /// Declared arguments disagree with a persisted configuration, or the
    /// declaration conventions are mixed.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// Declared lineage disagrees with persisted lineage, or an ancestor
    /// cannot be located.
    #[error("lineage violation: {0}")]
    Lineage(String),

    /// No repository holds the dataset.
    #[error("no dataset found for '{dataset_type}' with {data_id}")]
    NoResults {
        dataset_type: String,
        data_id: DataId,
    },

    /// Malformed, colliding or unresolved alias.
    #[error("alias error: {0}")]
    Alias(String),

    /// A dotted dataset type resolved to something that is not a composite.
    #[error("structural mismatch: {0}")]
    Structural(String),

    /// A deferred read already failed.
    #[error("deferred read failed: {0}")]
    DeferredRead(String),

    /// An internal ordering or bookkeeping bug.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("mapper error: {0}")]
    Mapper(#[from] MapperError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("repository cfg error: {0}")]
    Cfg(#[from] CfgError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("graph verification failed: {0}")]
    Verify(#[from] VerifyError),
}

impl ButlerError {
    /// True if the error only means "the dataset is absent".
    pub fn is_no_results(&self) -> bool {
        matches!(self, ButlerError::NoResults { .. })
    }

    pub(crate) fn no_results(dataset_type: &str, data_id: &DataId) -> Self {
        ButlerError::NoResults {
            dataset_type: dataset_type.to_string(),
            data_id: data_id.clone(),
        }
    }
}

impl From<DeclarationError> for ButlerError {
    fn from(err: DeclarationError) -> Self {
        ButlerError::ConfigConflict(err.to_string())
    }
}

impl From<NamingError> for ButlerError {
    fn from(err: NamingError) -> Self {
        ButlerError::Alias(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_results_is_distinguishable() {
        let err = ButlerError::no_results("raw", &DataId::new().with("visit", 1));
        assert!(err.is_no_results());
        assert_eq!(err.to_string(), "no dataset found for 'raw' with {visit: 1}");
        assert!(!ButlerError::Structural("x".into()).is_no_results());
    }

    #[test]
    fn declaration_errors_are_conflicts() {
        let err: ButlerError = DeclarationError::MixedConventions.into();
        assert!(matches!(err, ButlerError::ConfigConflict(_)));
    }
}
