//! cli::commands::keys
//!
//! List the keys of a dataset type, one `name: type` per line.

use std::collections::BTreeSet;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::types::Tag;
use crate::ui::output;

pub fn keys(
    ctx: &Context,
    dataset_type: Option<&str>,
    level: Option<&str>,
    tags: &[String],
) -> Result<ExitCode> {
    let tags = tags
        .iter()
        .map(|t| Tag::new(t.as_str()).with_context(|| format!("invalid tag '{}'", t)))
        .collect::<Result<BTreeSet<_>>>()?;

    let butler = ctx.butler()?;
    match butler.get_keys(dataset_type, level, &tags)? {
        Some(keys) => {
            let lines: Vec<String> = keys
                .iter()
                .map(|(name, key_type)| format!("{}: {}", name, key_type))
                .collect();
            if !lines.is_empty() {
                output::print(output::format_list(&lines, ""), ctx.verbosity);
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            output::warn(
                format!("no repository knows '{}'", dataset_type.unwrap_or("*")),
                ctx.verbosity,
            );
            Ok(ExitCode::from(1))
        }
    }
}
