//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Parses command-specific arguments (identifiers, tags, JSON input)
//! 2. Opens a [`crate::engine::Butler`] from the context
//! 3. Formats and displays output
//!
//! Handlers return the process exit code; errors bubble up as
//! `anyhow::Error` and are reported by `main`.

mod completion;
mod exists;
mod get;
mod keys;
mod put;
mod query;
mod repos;
mod subset;

// Re-export command functions for testing and direct invocation
pub use completion::completion;
pub use exists::exists;
pub use get::get;
pub use keys::keys;
pub use put::put;
pub use query::query;
pub use repos::repos;
pub use subset::subset;

use std::process::ExitCode;

use anyhow::Result;

use super::args::Command;
use super::Context;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<ExitCode> {
    match command {
        Command::Get {
            dataset_type,
            data_id,
            tags,
        } => get::get(ctx, &dataset_type, &data_id, &tags),
        Command::Put {
            dataset_type,
            data_id,
            file,
            json,
            backup,
        } => put::put(
            ctx,
            &dataset_type,
            &data_id,
            file.as_deref(),
            json.as_deref(),
            backup,
        ),
        Command::Exists {
            dataset_type,
            data_id,
            tags,
        } => exists::exists(ctx, &dataset_type, &data_id, &tags),
        Command::Keys {
            dataset_type,
            level,
            tags,
        } => keys::keys(ctx, dataset_type.as_deref(), level.as_deref(), &tags),
        Command::Query {
            dataset_type,
            fields,
            data_id,
        } => query::query(ctx, &dataset_type, &fields, &data_id),
        Command::Subset {
            dataset_type,
            level,
            data_id,
        } => subset::subset(ctx, &dataset_type, level.as_deref(), &data_id),
        Command::Repos { json } => repos::repos(ctx, json),
        Command::Completion { shell } => {
            completion::completion(shell)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
