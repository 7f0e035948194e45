//! core
//!
//! Core domain types, schemas, and graph structure for Strata.
//!
//! # Modules
//!
//! - [`types`] - Strong types: RepoUri, MapperName, Tag, DataId, etc.
//! - [`naming`] - Alias token and dataset type naming rules
//! - [`declaration`] - Repository declarations and calling conventions
//! - [`repo_cfg`] - Repository configuration records and their store
//! - [`graph`] - Repository graph arena and traversal orders
//! - [`verify`] - Verification of graph invariants
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing inside local repositories
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - All verification is deterministic

pub mod config;
pub mod declaration;
pub mod graph;
pub mod naming;
pub mod paths;
pub mod repo_cfg;
pub mod types;
pub mod verify;
