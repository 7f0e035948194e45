//! core::verify
//!
//! Repository graph verification.
//!
//! # Checks
//!
//! - Graph is acyclic
//! - Every parent link names a node of the graph
//! - Traversal orders are built and list each node at most once
//! - Every node reachable from either order is bound to a live handle
//!
//! # Invariants
//!
//! - Never mutates the graph
//! - Must be deterministic

use std::collections::HashSet;

use thiserror::Error;

use super::graph::{NodeId, RepoGraph};

/// Errors from verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("cycle detected in repository graph at {0}")]
    CycleDetected(String),

    #[error("repository {child} links to unknown parent {parent}")]
    DanglingParent { child: String, parent: NodeId },

    #[error("traversal orders are not built")]
    OrdersMissing,

    #[error("repository {0} appears more than once in the input order")]
    DuplicateInOrder(String),

    #[error("repository {0} has no live handle")]
    Unbound(String),
}

/// Result of verification.
#[derive(Debug)]
pub struct VerifyResult {
    /// Whether verification passed
    pub ok: bool,
    /// Errors found during verification
    pub errors: Vec<VerifyError>,
}

impl VerifyResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            errors: vec![],
        }
    }

    pub fn failure(errors: Vec<VerifyError>) -> Self {
        Self { ok: false, errors }
    }

    /// Convert into a `Result`, keeping the first error.
    pub fn into_result(self) -> Result<(), VerifyError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Verify a fully constructed graph.
pub fn verify_graph<H>(graph: &RepoGraph<H>) -> VerifyResult {
    let mut errors = Vec::new();
    let name = |id: NodeId| {
        graph
            .node(id)
            .map(|n| n.cfg.root.to_string())
            .unwrap_or_else(|| id.to_string())
    };

    if let Some(id) = graph.find_cycle() {
        errors.push(VerifyError::CycleDetected(name(id)));
    }

    for node in graph.nodes() {
        for &parent in node.parents() {
            if graph.node(parent).is_none() {
                errors.push(VerifyError::DanglingParent {
                    child: node.cfg.root.to_string(),
                    parent,
                });
            }
        }
    }

    match (graph.input_order(), graph.output_order()) {
        (Ok(inputs), Ok(outputs)) => {
            let mut seen = HashSet::new();
            for &id in inputs {
                if !seen.insert(id) {
                    errors.push(VerifyError::DuplicateInOrder(name(id)));
                }
            }
            for &id in inputs.iter().chain(outputs) {
                if graph.node(id).map_or(true, |n| !n.is_bound()) {
                    errors.push(VerifyError::Unbound(name(id)));
                }
            }
        }
        _ => errors.push(VerifyError::OrdersMissing),
    }

    if errors.is_empty() {
        VerifyResult::success()
    } else {
        VerifyResult::failure(errors)
    }
}
