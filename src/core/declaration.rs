//! core::declaration
//!
//! Repository declarations: what a caller asks a coordinator to read from
//! and write to.
//!
//! # Calling Conventions
//!
//! Two conventions exist and may not be mixed:
//! - **Legacy**: a single `root` plus optional `mapper` and mapper
//!   arguments, which becomes one read-write output
//! - **Lists**: explicit `inputs` and `outputs`
//!
//! [`ButlerArgs::normalize`] turns either form into validated
//! [`Declaration`]s with a definite [`Mode`].
//!
//! # Example
//!
//! ```
//! use strata::core::declaration::{ButlerArgs, Mode, RepositoryArgs};
//! use strata::core::types::RepoUri;
//!
//! let args = ButlerArgs {
//!     inputs: Some(vec![RepositoryArgs::from_uri(RepoUri::new("/in").unwrap())]),
//!     outputs: Some(vec![RepositoryArgs::from_uri(RepoUri::new("/out").unwrap())]),
//!     ..Default::default()
//! };
//! let (inputs, outputs) = args.normalize().unwrap();
//! assert_eq!(inputs[0].mode, Mode::Read);
//! assert_eq!(outputs[0].mode, Mode::Write);
//! ```

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::repo_cfg::MapperArgs;
use crate::core::types::{MapperName, RepoUri, Tag};

/// Errors from declaration normalization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("the legacy (root, mapper, mapper_args) convention may not be mixed with inputs/outputs")]
    MixedConventions,

    #[error("the mode of input '{0}' should be readable")]
    InputNotReadable(RepoUri),

    #[error("the mode of output '{0}' should be writable")]
    OutputNotWritable(RepoUri),

    #[error("invalid mode '{0}', expected one of r, w, rw")]
    InvalidMode(String),
}

/// Access mode of a declared repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    Read,
    Write,
    ReadWrite,
}

impl Mode {
    pub fn readable(self) -> bool {
        matches!(self, Mode::Read | Mode::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Mode::Write | Mode::ReadWrite)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Read => "r",
            Mode::Write => "w",
            Mode::ReadWrite => "rw",
        }
    }
}

impl FromStr for Mode {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(Mode::Read),
            "w" => Ok(Mode::Write),
            "rw" | "wr" => Ok(Mode::ReadWrite),
            other => Err(DeclarationError::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = DeclarationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repository declaration as the caller writes it. `mode` may be left
/// unset and is defaulted during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryArgs {
    pub root: RepoUri,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<MapperName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper_args: Option<MapperArgs>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<Tag>,
}

impl RepositoryArgs {
    /// A bare declaration: just a root.
    pub fn from_uri(root: RepoUri) -> Self {
        Self {
            root,
            mode: None,
            mapper: None,
            mapper_args: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_mapper(mut self, mapper: MapperName) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn with_mapper_args(mut self, args: MapperArgs) -> Self {
        self.mapper_args = Some(args);
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }
}

impl From<RepoUri> for RepositoryArgs {
    fn from(root: RepoUri) -> Self {
        Self::from_uri(root)
    }
}

/// A normalized declaration with a definite mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub root: RepoUri,
    pub mode: Mode,
    pub mapper: Option<MapperName>,
    pub mapper_args: Option<MapperArgs>,
    pub tags: BTreeSet<Tag>,
}

impl Declaration {
    fn from_args(args: RepositoryArgs, mode: Mode) -> Self {
        Self {
            root: args.root,
            mode,
            mapper: args.mapper,
            mapper_args: args.mapper_args,
            tags: args.tags,
        }
    }

    /// A read-only input synthesized for a parent the caller did not name.
    pub fn implied_input(root: RepoUri) -> Self {
        Self {
            root,
            mode: Mode::Read,
            mapper: None,
            mapper_args: None,
            tags: BTreeSet::new(),
        }
    }
}

/// Everything a coordinator is constructed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ButlerArgs {
    /// Legacy convention: repository root.
    pub root: Option<RepoUri>,
    /// Legacy convention: mapper.
    pub mapper: Option<MapperName>,
    /// Legacy convention: mapper arguments.
    pub mapper_args: MapperArgs,
    /// List convention: inputs.
    pub inputs: Option<Vec<RepositoryArgs>>,
    /// List convention: outputs.
    pub outputs: Option<Vec<RepositoryArgs>>,
}

impl ButlerArgs {
    /// Legacy single-root construction.
    pub fn legacy(root: RepoUri, mapper: Option<MapperName>, mapper_args: MapperArgs) -> Self {
        Self {
            root: Some(root),
            mapper,
            mapper_args,
            inputs: None,
            outputs: None,
        }
    }

    /// List-convention construction.
    pub fn with_repos(inputs: Vec<RepositoryArgs>, outputs: Vec<RepositoryArgs>) -> Self {
        Self {
            inputs: Some(inputs),
            outputs: Some(outputs),
            ..Default::default()
        }
    }

    /// Normalize into (inputs, outputs).
    ///
    /// - Legacy arguments become one read-write output at `root` (`.` if unset)
    /// - Inputs default to `r`; an input declared `rw` is coerced to `r`
    /// - Outputs default to `w`
    ///
    /// # Errors
    ///
    /// - [`DeclarationError::MixedConventions`] if both conventions are used
    /// - [`DeclarationError::InputNotReadable`] for a write-only input
    /// - [`DeclarationError::OutputNotWritable`] for an output without `w`
    pub fn normalize(self) -> Result<(Vec<Declaration>, Vec<Declaration>), DeclarationError> {
        let uses_lists = self.inputs.is_some() || self.outputs.is_some();
        let uses_legacy =
            self.root.is_some() || self.mapper.is_some() || !self.mapper_args.is_empty();

        let (inputs, outputs) = if !uses_lists {
            let root = match self.root {
                Some(root) => root,
                None => RepoUri::new(".").map_err(|_| DeclarationError::MixedConventions)?,
            };
            let mapper_args = if self.mapper_args.is_empty() {
                None
            } else {
                Some(self.mapper_args)
            };
            let output = RepositoryArgs {
                root,
                mode: Some(Mode::ReadWrite),
                mapper: self.mapper,
                mapper_args,
                tags: BTreeSet::new(),
            };
            (Vec::new(), vec![output])
        } else if uses_legacy {
            return Err(DeclarationError::MixedConventions);
        } else {
            (
                self.inputs.unwrap_or_default(),
                self.outputs.unwrap_or_default(),
            )
        };

        let inputs = inputs
            .into_iter()
            .map(|args| match args.mode {
                None | Some(Mode::Read) | Some(Mode::ReadWrite) => {
                    Ok(Declaration::from_args(args, Mode::Read))
                }
                Some(Mode::Write) => Err(DeclarationError::InputNotReadable(args.root)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = outputs
            .into_iter()
            .map(|args| match args.mode {
                None => Ok(Declaration::from_args(args, Mode::Write)),
                Some(mode) if mode.writable() => Ok(Declaration::from_args(args, mode)),
                Some(_) => Err(DeclarationError::OutputNotWritable(args.root)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((inputs, outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> RepoUri {
        RepoUri::new(s).unwrap()
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("r".parse::<Mode>().unwrap(), Mode::Read);
        assert_eq!("rw".parse::<Mode>().unwrap(), Mode::ReadWrite);
        assert!("x".parse::<Mode>().is_err());
        assert!(Mode::ReadWrite.readable() && Mode::ReadWrite.writable());
        assert!(!Mode::Write.readable());
    }

    #[test]
    fn legacy_becomes_rw_output() {
        let args = ButlerArgs::legacy(
            uri("/data/r"),
            Some(MapperName::new("template").unwrap()),
            MapperArgs::new(),
        );
        let (inputs, outputs) = args.normalize().unwrap();
        assert!(inputs.is_empty());
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].mode, Mode::ReadWrite);
        assert_eq!(outputs[0].root, uri("/data/r"));
        assert!(outputs[0].mapper_args.is_none());
    }

    #[test]
    fn legacy_defaults_to_cwd() {
        let (_, outputs) = ButlerArgs::default().normalize().unwrap();
        assert_eq!(outputs[0].root, uri("."));
    }

    #[test]
    fn mixing_conventions_rejected() {
        let mut args = ButlerArgs::with_repos(vec![], vec![RepositoryArgs::from_uri(uri("/o"))]);
        args.mapper = Some(MapperName::new("template").unwrap());
        assert_eq!(args.normalize(), Err(DeclarationError::MixedConventions));
    }

    #[test]
    fn input_rw_coerced_to_read() {
        let args = ButlerArgs::with_repos(
            vec![RepositoryArgs::from_uri(uri("/i")).with_mode(Mode::ReadWrite)],
            vec![],
        );
        let (inputs, _) = args.normalize().unwrap();
        assert_eq!(inputs[0].mode, Mode::Read);
    }

    #[test]
    fn write_only_input_rejected() {
        let args = ButlerArgs::with_repos(
            vec![RepositoryArgs::from_uri(uri("/i")).with_mode(Mode::Write)],
            vec![],
        );
        assert_eq!(
            args.normalize(),
            Err(DeclarationError::InputNotReadable(uri("/i")))
        );
    }

    #[test]
    fn read_only_output_rejected() {
        let args = ButlerArgs::with_repos(
            vec![],
            vec![RepositoryArgs::from_uri(uri("/o")).with_mode(Mode::Read)],
        );
        assert_eq!(
            args.normalize(),
            Err(DeclarationError::OutputNotWritable(uri("/o")))
        );
    }

    #[test]
    fn declarations_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            inputs: Vec<RepositoryArgs>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [[inputs]]
            root = "/data/in"
            mode = "r"
            tags = ["calib"]
            "#,
        )
        .unwrap();
        assert_eq!(doc.inputs[0].mode, Some(Mode::Read));
        assert!(doc.inputs[0].tags.contains(&Tag::new("calib").unwrap()));
    }
}
