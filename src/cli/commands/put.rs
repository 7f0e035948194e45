//! cli::commands::put
//!
//! Write a JSON object to every output repository that maps the dataset.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context as _, Result};
use serde_json::Value;

use crate::cli::{parse_data_id, Context};
use crate::ui::output;

/// The object to write, from `--file` or `--json`.
fn load_value(file: Option<&Path>, json: Option<&str>) -> Result<Value> {
    match (file, json) {
        (Some(path), None) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read '{}'", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("'{}' is not valid JSON", path.display()))
        }
        (None, Some(text)) => serde_json::from_str(text).context("--json is not valid JSON"),
        _ => bail!("exactly one of --file and --json is required"),
    }
}

pub fn put(
    ctx: &Context,
    dataset_type: &str,
    pairs: &[String],
    file: Option<&Path>,
    json: Option<&str>,
    backup: bool,
) -> Result<ExitCode> {
    let value = load_value(file, json)?;
    let data_id = parse_data_id(pairs, &[])?;
    let butler = ctx.butler()?;
    butler
        .put(&value, dataset_type, &data_id, backup)
        .with_context(|| format!("cannot write '{}'", dataset_type))?;
    output::success(format!("wrote {} {}", dataset_type, data_id), ctx.verbosity);
    Ok(ExitCode::SUCCESS)
}
