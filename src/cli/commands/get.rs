//! cli::commands::get
//!
//! Read a dataset and print it as pretty JSON.
//!
//! # Example
//!
//! ```bash
//! strata get calexp visit=903334 ccd=16
//! strata get raw visit=1 --tag calib
//! ```

use std::process::ExitCode;

use anyhow::{Context as _, Result};

use crate::cli::{parse_data_id, Context};
use crate::ui::output;

pub fn get(ctx: &Context, dataset_type: &str, pairs: &[String], tags: &[String]) -> Result<ExitCode> {
    let data_id = parse_data_id(pairs, tags)?;
    let butler = ctx.butler()?;
    let value = butler
        .get(dataset_type, &data_id)
        .with_context(|| format!("cannot read '{}'", dataset_type))?;
    output::print_json(&value)?;
    Ok(ExitCode::SUCCESS)
}
