//! mapper
//!
//! Dataset mappers: translation from `(dataset type, identifier)` to storage
//! locations, plus key and metadata queries.
//!
//! # Architecture
//!
//! The coordinator holds mappers only through the [`Mapper`] trait and
//! builds them through a [`MapperCatalog`]. Concrete mappers:
//!
//! - [`TemplateMapper`] - built-in, configured by mapper arguments
//! - [`mock::MockMapper`] - scripted, for tests
//!
//! Mappers answer metadata queries from a [`Registry`]. Repositories sharing
//! a mapper with an ancestor inherit that ancestor's registry.

mod factory;
pub mod location;
pub mod mock;
mod registry;
mod template;
mod traits;

pub use factory::{MapperCatalog, MapperContext, MapperCtor, TEMPLATE_MAPPER};
pub use location::{
    Assembler, ButlerLocation, ComponentInfo, CompositeLocation, Disassembler, Location,
    RepoBinding,
};
pub use registry::{JsonRegistry, Registry};
pub use template::{BypassKind, PathTemplate, TemplateMapper};
pub use traits::{KeyMap, Mapper, MapperError};
