//! cli::commands::repos
//!
//! Show the resolved repository graph: input order first, then outputs.
//!
//! # Example
//!
//! ```text
//! /data/rerun  [both, existing, mapper=template]
//!     parent: /data/main
//! /data/main   [input, existing, mapper=template] tags: calib
//! ```

use std::process::ExitCode;

use anyhow::Result;

use crate::cli::Context;
use crate::engine::{RepoRole, RepoSummary};
use crate::ui::output;

fn role_name(role: RepoRole) -> &'static str {
    match role {
        RepoRole::Input => "input",
        RepoRole::Output => "output",
        RepoRole::Both => "both",
    }
}

fn format_summary(summary: &RepoSummary) -> String {
    let mut line = format!(
        "{}  [{}, {}, mapper={}]",
        summary.root,
        role_name(summary.role),
        summary.origin,
        summary.mapper.as_deref().unwrap_or("-"),
    );
    if summary.legacy {
        line.push_str(" legacy");
    }
    if !summary.tags.is_empty() {
        line.push_str(&format!(" tags: {}", summary.tags.join(", ")));
    }
    for parent in &summary.parents {
        line.push_str(&format!("\n    parent: {}", parent));
    }
    line
}

pub fn repos(ctx: &Context, json: bool) -> Result<ExitCode> {
    let summaries = ctx.butler()?.describe()?;
    if json {
        output::print_json(&serde_json::to_value(&summaries)?)?;
    } else {
        for summary in &summaries {
            println!("{}", format_summary(summary));
        }
    }
    Ok(ExitCode::SUCCESS)
}
