//! Strata - lineage-aware access to file-based dataset repositories
//!
//! Strata coordinates reads and writes of datasets across a graph of
//! repositories. Each repository records its parents and the mapper that
//! turns `(dataset type, data identifier)` into storage locations. Reads
//! search inputs in lineage order; writes fan out to every output.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - The Butler: graph construction, location, caching, aliases
//! - [`core`] - Domain types, repository declarations, the repository graph,
//!   on-disk repository configuration, and layered settings
//! - [`mapper`] - Location types, the mapper trait, and mapper implementations
//! - [`storage`] - Storage backends for repository roots
//! - [`ui`] - Output formatting
//!
//! # Correctness Invariants
//!
//! 1. A repository's persisted configuration never changes after creation
//! 2. Reopening a repository must match the parents it was created with
//! 3. Input search order lists each repository once, children before parents
//! 4. A failed graph construction never leaves a partial configuration behind
//!    for the repository whose mapper could not be built

pub mod cli;
pub mod core;
pub mod engine;
pub mod mapper;
pub mod storage;
pub mod ui;
