//! The error taxonomy of record stores and active learning runs.
//!
//! Errors are raised as [Error] and propagated inside [anyhow::Error]. Use
//! [error_kind] to recover the category from a propagated error.

use crate::common::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad shape, object count, split, noise profile or run option.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Raw or stored data disagrees with the declared shape or feature schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("record store not found at '{}'", .0.display())]
    NotFound(PathBuf),
    #[error("index {index} is out of range for a dataset of {len} examples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("missing prediction for example {index}: {reason}")]
    MissingPrediction { index: usize, reason: &'static str },
    /// The training collaborator exhausted its retry budget.
    #[error("training unavailable after {attempts} attempts: {reason}")]
    TrainingUnavailable { attempts: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfiguration,
    SchemaMismatch,
    NotFound,
    IndexOutOfRange,
    MissingPrediction,
    TrainingUnavailable,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::MissingPrediction { .. } => ErrorKind::MissingPrediction,
            Self::TrainingUnavailable { .. } => ErrorKind::TrainingUnavailable,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> AnyError {
        Self::InvalidConfiguration(msg.into()).into()
    }

    pub(crate) fn schema(msg: impl Into<String>) -> AnyError {
        Self::SchemaMismatch(msg.into()).into()
    }
}

/// Find the first [Error] in the cause chain and return its category.
pub fn error_kind(err: &AnyError) -> ErrorKind {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::kind)
        .unwrap_or(ErrorKind::Other)
}
