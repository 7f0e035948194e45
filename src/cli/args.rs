//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory
//! - `--session <file>`: Session file instead of `./strata.toml`
//! - `--input <uri>` / `--output <uri>`: Declare repositories, replacing
//!   the session's declarations
//! - `--mapper <name>`: Mapper for outputs declared on the command line
//! - `--alias <token=type>`: Extra dataset type aliases
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strata - lineage-aware access to file-based data repositories
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
EXIT STATUS:
    0   success (for `exists`: the dataset is present)
    1   `exists`: the dataset is absent; `keys`: no repository knows the type
    2   any error")]
pub struct Cli {
    /// Run as if strata was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Session file to load instead of ./strata.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub session: Option<PathBuf>,

    /// Input repository (repeatable, read in order)
    #[arg(long = "input", global = true, value_name = "URI")]
    pub inputs: Vec<String>,

    /// Output repository (repeatable, written in order)
    #[arg(long = "output", global = true, value_name = "URI")]
    pub outputs: Vec<String>,

    /// Mapper for outputs given with --output, and for new outputs whose
    /// inputs share none
    #[arg(long, global = true, value_name = "NAME")]
    pub mapper: Option<String>,

    /// Dataset type alias (repeatable)
    #[arg(long = "alias", global = true, value_name = "TOKEN=TYPE")]
    pub aliases: Vec<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true, conflicts_with = "debug")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a dataset and print it as JSON
    #[command(after_help = "\
EXAMPLES:
    strata get calexp visit=903334 ccd=16
    strata --input /data/main get raw visit=1 --tag calib
    strata --alias exp=calexp get @exp visit=1")]
    Get {
        /// Dataset type (aliases allowed)
        dataset_type: String,

        /// Identifier dimensions
        #[arg(value_name = "KEY=VALUE")]
        data_id: Vec<String>,

        /// Only consult repositories carrying this tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// Write a dataset to every output repository
    #[command(after_help = "\
EXAMPLES:
    strata --output ./rerun put calexp visit=1 --json '{\"flux\": 2.5}'
    strata put calexp visit=1 --file calexp.json --backup")]
    Put {
        /// Dataset type (aliases allowed)
        dataset_type: String,

        /// Identifier dimensions
        #[arg(value_name = "KEY=VALUE")]
        data_id: Vec<String>,

        /// Read the object from a JSON file
        #[arg(long, value_name = "FILE", conflicts_with = "json", required_unless_present = "json")]
        file: Option<PathBuf>,

        /// The object as inline JSON
        #[arg(long, value_name = "TEXT")]
        json: Option<String>,

        /// Move an existing document aside before writing
        #[arg(long)]
        backup: bool,
    },

    /// Exit 0 if a dataset is present, 1 if not
    Exists {
        /// Dataset type (aliases allowed)
        dataset_type: String,

        /// Identifier dimensions
        #[arg(value_name = "KEY=VALUE")]
        data_id: Vec<String>,

        /// Only consult repositories carrying this tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// List the keys of a dataset type
    Keys {
        /// Dataset type; all types if omitted
        dataset_type: Option<String>,

        /// Only keys at this level
        #[arg(long)]
        level: Option<String>,

        /// Only consult repositories carrying this tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// Query registered values of some fields
    #[command(after_help = "\
EXAMPLES:
    strata query raw --field visit
    strata query raw --field visit --field ccd filter=r")]
    Query {
        /// Dataset type (aliases allowed)
        dataset_type: String,

        /// Field to report (repeatable, in column order)
        #[arg(long = "field", value_name = "FIELD", required = true)]
        fields: Vec<String>,

        /// Restrict to identifiers matching these dimensions
        #[arg(value_name = "KEY=VALUE")]
        data_id: Vec<String>,
    },

    /// List the complete identifiers extending a partial one
    Subset {
        /// Dataset type (aliases allowed)
        dataset_type: String,

        /// Level to enumerate
        #[arg(long)]
        level: Option<String>,

        /// Partial identifier
        #[arg(value_name = "KEY=VALUE")]
        data_id: Vec<String>,
    },

    /// Show the resolved repository graph
    Repos {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    #[command(after_help = "\
EXAMPLES:
    strata completion bash > ~/.local/share/bash-completion/completions/strata
    strata completion zsh > ~/.zfunc/_strata")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "strata", "get", "raw", "visit=1", "--input", "/a", "--input", "/b", "--debug",
        ])
        .unwrap();
        assert_eq!(cli.inputs, vec!["/a", "/b"]);
        assert!(cli.debug);
        match cli.command {
            Command::Get { data_id, .. } => assert_eq!(data_id, vec!["visit=1"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn put_needs_a_source() {
        assert!(Cli::try_parse_from(["strata", "put", "raw", "visit=1"]).is_err());
        assert!(Cli::try_parse_from(["strata", "put", "raw", "--json", "1", "--file", "x"]).is_err());
        assert!(Cli::try_parse_from(["strata", "put", "raw", "--json", "1"]).is_ok());
    }

    #[test]
    fn query_needs_fields() {
        assert!(Cli::try_parse_from(["strata", "query", "raw"]).is_err());
    }

    #[test]
    fn quiet_conflicts_with_debug() {
        assert!(Cli::try_parse_from(["strata", "--quiet", "--debug", "repos"]).is_err());
    }
}
