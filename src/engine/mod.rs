//! engine
//!
//! The dataset access coordinator.
//!
//! # Architecture
//!
//! The engine turns repository declarations into a bound repository graph
//! and serves dataset reads and writes against it:
//!
//! 1. **Build**: resolve configurations, verify lineage, link ancestors,
//!    bind a mapper and storage backend to every node ([`build`])
//! 2. **Resolve**: expand aliases, then find locations in input order
//!    (reads) or output order (writes) ([`locate`])
//! 3. **Access**: read through the object cache, standardize, assemble
//!    composites; or disassemble and write to every output ([`Butler`])
//!
//! # Invariants
//!
//! - A [`Butler`] either finishes construction fully bound or is not created
//! - Every node is bound after all of its ancestors
//! - A read miss is [`ButlerError::NoResults`], never a generic failure
//! - The object cache never owns the objects it indexes
//!
//! # Example
//!
//! ```no_run
//! use strata::core::declaration::{ButlerArgs, RepositoryArgs};
//! use strata::core::types::{DataId, RepoUri};
//! use strata::engine::Butler;
//!
//! let input = RepositoryArgs::from_uri(RepoUri::new("/data/main").unwrap());
//! let butler = Butler::new(ButlerArgs::with_repos(vec![input], vec![])).unwrap();
//!
//! match butler.get("calexp", &DataId::new().with("visit", 903334)) {
//!     Ok(value) => println!("{}", value),
//!     Err(e) if e.is_no_results() => println!("not there"),
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! ```

mod alias;
pub mod build;
mod butler;
mod cache;
mod composite;
mod error;
pub mod locate;
mod proxy;
mod repository;
mod subset;

pub use alias::AliasTable;
pub use build::{build_graph, BuildOptions, BuiltGraph};
pub use butler::{Butler, ButlerBuilder, RepoRole, RepoSummary};
pub use cache::{CacheKey, ObjectCache};
pub use composite::{generic_assembler, generic_disassembler};
pub use error::ButlerError;
pub use locate::Resolver;
pub use proxy::ReadProxy;
pub use repository::Repository;
pub use subset::{ButlerSubset, DataRef};
