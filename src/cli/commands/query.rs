//! cli::commands::query
//!
//! Print registered value tuples, tab-separated, one row per line.

use std::process::ExitCode;

use anyhow::Result;

use crate::cli::{parse_data_id, Context};
use crate::core::types::DataValue;
use crate::ui::output;

fn format_row(row: &[DataValue]) -> String {
    row.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

pub fn query(ctx: &Context, dataset_type: &str, fields: &[String], pairs: &[String]) -> Result<ExitCode> {
    let data_id = parse_data_id(pairs, &[])?;
    let rows = ctx.butler()?.query_metadata(dataset_type, fields, &data_id)?;
    output::debug(format!("{} row(s)", rows.len()), ctx.verbosity);
    for row in &rows {
        println!("{}", format_row(row));
    }
    Ok(ExitCode::SUCCESS)
}
