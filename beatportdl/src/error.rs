//! Application-wide error types.

use std::fmt;
use std::path::{Path, PathBuf};

use catalog::CatalogError;
use process_utils::ToolError;
use thiserror::Error;
use transfer_engine::TransferError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Unrecognized stream quality `{0}`")]
    UnknownSignature(String),

    #[error("No tag mapping for `{format}` and no default mapping configured")]
    MappingNotFound { format: String },

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} `{}`: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Segment index for per-segment transfer failures.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            Self::Transfer(e) => e.segment_index(),
            _ => None,
        }
    }
}

/// Step of a track pipeline, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Resolve,
    Directory,
    Transfer,
    Remux,
    Tag,
    Place,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Directory => "directory",
            Self::Transfer => "transfer",
            Self::Remux => "remux",
            Self::Tag => "tag",
            Self::Place => "place",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal per-track failure together with the step it happened in.
#[derive(Error, Debug)]
#[error("{step} failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: Error,
}

impl PipelineError {
    pub fn new(step: Step, source: impl Into<Error>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

/// Attach a [`Step`] to a fallible result.
pub trait StepExt<T> {
    fn at_step(self, step: Step) -> std::result::Result<T, PipelineError>;
}

impl<T, E: Into<Error>> StepExt<T> for std::result::Result<T, E> {
    fn at_step(self, step: Step) -> std::result::Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(step, e))
    }
}
