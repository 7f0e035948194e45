//! cli
//!
//! Command-line interface layer for Strata.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the tracing subscriber
//! - Merge session configuration with command-line overrides
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, builds a
//! [`Context`] from the configuration files and flags, and dispatches to a
//! handler that constructs a [`Butler`] and prints the result. Dataset
//! access itself lives in [`crate::engine`].

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, SessionConfig};
use crate::core::declaration::{Mode, RepositoryArgs};
use crate::core::types::{DataId, MapperName, RepoUri, Tag};
use crate::engine::Butler;
use crate::ui::output::{self, Verbosity};

/// Everything a command handler needs.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory relative roots are resolved against.
    pub cwd: PathBuf,
    pub verbosity: Verbosity,
    /// Session declarations with command-line overrides applied.
    pub session: SessionConfig,
    /// Mapper for new outputs when the inputs share none.
    pub fallback_mapper: Option<MapperName>,
    /// Configuration files that were read, global first.
    pub config_sources: Vec<PathBuf>,
}

impl Context {
    /// Load configuration for `cli` and apply its overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let cwd = match &cli.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("cannot determine working directory")?,
        };

        let loaded = Config::load(&cwd, cli.session.as_deref())
            .context("failed to load configuration")?;
        let verbosity = Verbosity::from_flags(cli.quiet, cli.debug || loaded.config.debug());
        for warning in &loaded.warnings {
            output::warn(
                format!("{} ({})", warning.message, warning.path.display()),
                verbosity,
            );
        }

        let config = loaded.config;
        let config_sources: Vec<PathBuf> = config
            .global_config_loaded_from()
            .into_iter()
            .chain(config.session_config_loaded_from())
            .map(Path::to_path_buf)
            .collect();
        for source in &config_sources {
            output::debug(format!("config: {}", source.display()), verbosity);
        }
        let cli_mapper = cli
            .mapper
            .as_deref()
            .map(MapperName::new)
            .transpose()
            .context("invalid --mapper")?;
        let mut session = config.session();
        apply_overrides(&mut session, cli, cli_mapper.as_ref())?;
        anchor_roots(&mut session, &cwd)?;
        session
            .validate()
            .context("invalid session configuration")?;

        Ok(Self {
            cwd,
            verbosity,
            session,
            fallback_mapper: cli_mapper.or_else(|| config.default_mapper().cloned()),
            config_sources,
        })
    }

    /// Construct the coordinator for this session.
    pub fn butler(&self) -> Result<Butler> {
        let mut builder = Butler::builder(self.session.butler_args())
            .fallback_mapper(self.fallback_mapper.clone());
        for (token, target) in &self.session.aliases {
            builder = builder.alias(token.clone(), target.clone());
        }
        builder.build().context("failed to open repositories")
    }
}

fn apply_overrides(session: &mut SessionConfig, cli: &Cli, mapper: Option<&MapperName>) -> Result<()> {
    if !cli.inputs.is_empty() || !cli.outputs.is_empty() {
        session.root = None;
        session.mapper = None;
        session.mapper_args = None;
        session.inputs = cli
            .inputs
            .iter()
            .map(|raw| parse_root(raw).map(RepositoryArgs::from_uri))
            .collect::<Result<_>>()?;
        session.outputs = cli
            .outputs
            .iter()
            .map(|raw| {
                let mut args = RepositoryArgs::from_uri(parse_root(raw)?).with_mode(Mode::Write);
                args.mapper = mapper.cloned();
                Ok(args)
            })
            .collect::<Result<_>>()?;
    }

    for raw in &cli.aliases {
        let Some((token, target)) = raw.split_once('=') else {
            bail!("alias '{}' is not of the form TOKEN=TYPE", raw);
        };
        session.aliases.insert(token.to_string(), target.to_string());
    }
    Ok(())
}

fn parse_root(raw: &str) -> Result<RepoUri> {
    RepoUri::new(raw).with_context(|| format!("invalid repository root '{}'", raw))
}

/// Resolve relative plain-path roots against `cwd`.
fn anchor_roots(session: &mut SessionConfig, cwd: &Path) -> Result<()> {
    let anchor = |uri: &RepoUri| -> Result<RepoUri> {
        if uri.scheme().is_some() || Path::new(uri.as_str()).is_absolute() {
            return Ok(uri.clone());
        }
        parse_root(&cwd.join(uri.as_str()).to_string_lossy())
    };

    if let Some(root) = &session.root {
        session.root = Some(anchor(root)?);
    }
    for args in session.inputs.iter_mut().chain(session.outputs.iter_mut()) {
        args.root = anchor(&args.root)?;
    }
    Ok(())
}

/// Parse `KEY=VALUE` pairs and tags into an identifier.
pub(crate) fn parse_data_id(pairs: &[String], tags: &[String]) -> Result<DataId> {
    let mut data_id = DataId::parse_pairs(pairs).context("invalid identifier")?;
    for raw in tags {
        data_id = data_id.tagged(Tag::new(raw.as_str()).with_context(|| format!("invalid tag '{}'", raw))?);
    }
    Ok(data_id)
}

/// Install the tracing subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(verbosity: Verbosity) {
    let default = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Debug => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_args();
    init_tracing(Verbosity::from_flags(cli.quiet, cli.debug));

    if let args::Command::Completion { shell } = cli.command {
        commands::completion(shell)?;
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = Context::from_cli(&cli)?;
    commands::dispatch(cli.command, &ctx)
}
