//! cli::commands::exists
//!
//! Report through the exit status whether a dataset is present.

use std::process::ExitCode;

use anyhow::Result;

use crate::cli::{parse_data_id, Context};
use crate::ui::output;

pub fn exists(ctx: &Context, dataset_type: &str, pairs: &[String], tags: &[String]) -> Result<ExitCode> {
    let data_id = parse_data_id(pairs, tags)?;
    let present = ctx.butler()?.dataset_exists(dataset_type, &data_id)?;
    output::print(if present { "present" } else { "absent" }, ctx.verbosity);
    Ok(if present {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
