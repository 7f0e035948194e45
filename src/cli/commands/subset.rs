//! cli::commands::subset
//!
//! List the complete identifiers extending a partial one.

use std::process::ExitCode;

use anyhow::Result;

use crate::cli::{parse_data_id, Context};
use crate::ui::output;

pub fn subset(ctx: &Context, dataset_type: &str, level: Option<&str>, pairs: &[String]) -> Result<ExitCode> {
    let data_id = parse_data_id(pairs, &[])?;
    let butler = ctx.butler()?;
    let subset = butler.subset(dataset_type, level, &data_id)?;
    for id in subset.ids() {
        println!("{}", id);
    }
    output::debug(format!("{} identifier(s)", subset.len()), ctx.verbosity);
    Ok(ExitCode::SUCCESS)
}
