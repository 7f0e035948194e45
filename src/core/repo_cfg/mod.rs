//! core::repo_cfg
//!
//! Repository configuration records and their on-disk store.
//!
//! # Modules
//!
//! - [`schema`] - Record schema (v1), parent references, version dispatch
//! - [`store`] - Atomic JSON storage at a local root, legacy marker reading
//!
//! # Schema Design
//!
//! - Self-describing: includes `kind` and `schema_version`
//! - Strict parsing: unknown fields are rejected
//! - Equality is structural, so two records (or parent references) are the
//!   same exactly when they compare equal

pub mod schema;
pub mod store;

pub use schema::{parse_cfg, CfgError, MapperArgs, ParentRef, RepositoryCfg, CFG_KIND, SCHEMA_VERSION};
pub use store::{CfgStore, StoredCfg};
