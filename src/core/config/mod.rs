//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Strata has two configuration scopes:
//! - **Global**: User-level settings
//! - **Session**: Repositories and aliases for the current working directory
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Session config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$STRATA_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/strata/config.toml`
//! 3. `~/.strata/config.toml`
//!
//! # Session Config Locations
//!
//! Searched in order:
//! 1. An explicit path (must exist)
//! 2. `strata.toml` in the working directory (canonical)
//! 3. `.strata/session.toml` in the working directory (compatibility, warns)
//!
//! # Example
//!
//! ```no_run
//! use strata::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Path::new("."), None).unwrap();
//! let config = result.config;
//!
//! if let Some(mapper) = config.default_mapper() {
//!     println!("Default mapper: {}", mapper);
//! }
//! println!("Debug: {}", config.debug());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, SessionConfig};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::MapperName;

/// File name of the session config in a working directory.
pub const SESSION_FILE_NAME: &str = "strata.toml";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Merged configuration from all sources.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Session configuration (if found)
    pub session: Option<SessionConfig>,
    global_path: Option<PathBuf>,
    session_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// `cwd` is searched for a session file unless `session` names one
    /// explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed, or if an
    /// explicit session path does not exist. Missing default files are not an
    /// error (defaults are used).
    pub fn load(cwd: &Path, session: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let (global, global_path) = Self::load_global()?;
        let (session, session_path) = Self::load_session(cwd, session, &mut warnings)?;

        global.validate()?;
        if let Some(ref s) = session {
            s.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                session,
                global_path,
                session_path,
            },
            warnings,
        })
    }

    fn load_global() -> Result<(GlobalConfig, Option<PathBuf>), ConfigError> {
        // 1. Check $STRATA_CONFIG
        if let Ok(path) = std::env::var("STRATA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                let config = Self::read_toml(&path)?;
                return Ok((config, Some(path)));
            }
        }

        // 2. Check $XDG_CONFIG_HOME/strata/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("strata/config.toml");
            if path.exists() {
                let config = Self::read_toml(&path)?;
                return Ok((config, Some(path)));
            }
        }

        // 3. Check ~/.strata/config.toml
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".strata/config.toml");
            if path.exists() {
                let config = Self::read_toml(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((GlobalConfig::default(), None))
    }

    fn load_session(
        cwd: &Path,
        explicit: Option<&Path>,
        warnings: &mut Vec<ConfigWarning>,
    ) -> Result<(Option<SessionConfig>, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            let config = Self::read_toml(path)?;
            return Ok((Some(config), Some(path.to_path_buf())));
        }

        let canonical = cwd.join(SESSION_FILE_NAME);
        if canonical.exists() {
            let config = Self::read_toml(&canonical)?;
            return Ok((Some(config), Some(canonical)));
        }

        let compat = cwd.join(".strata/session.toml");
        if compat.exists() {
            warnings.push(ConfigWarning {
                message: format!(
                    "Using deprecated session location. Please move to '{}'",
                    canonical.display()
                ),
                path: compat.clone(),
            });
            let config = Self::read_toml(&compat)?;
            return Ok((Some(config), Some(compat)));
        }

        Ok((None, None))
    }

    fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Mapper adopted by new outputs when inputs give no default.
    pub fn default_mapper(&self) -> Option<&MapperName> {
        self.global.default_mapper.as_ref()
    }

    /// Whether debug logging is on by default.
    pub fn debug(&self) -> bool {
        self.global.debug.unwrap_or(false)
    }

    /// The session config, or an empty one.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Path of the global config file that was read, if any.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Path of the session config file that was read, if any.
    pub fn session_config_loaded_from(&self) -> Option<&Path> {
        self.session_path.as_deref()
    }
}
