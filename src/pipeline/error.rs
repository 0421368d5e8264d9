//! Per-file error types.
//!
//! These never abort a batch. The executor catches them at the per-file
//! boundary and stores them on the file's result record.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure that degraded a single file's row.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileError {
    /// The file could not be read, was corrupt, or has an unsupported format.
    #[error("failed to load '{file}': {cause}")]
    Load { file: String, cause: String },

    /// A declared operation failed. Columns of earlier steps stay valid.
    /// `step` is the zero-based position in the pipeline.
    #[error("step {step} ('{operation}') failed on '{file}': {cause}")]
    Step {
        file: String,
        step: usize,
        operation: String,
        cause: String,
    },

    /// The batch was cancelled before this file was dispatched.
    #[error("'{file}' was not processed: batch cancelled")]
    Skipped { file: String },
}

/// Category of a [`FileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Load,
    Step,
    Skipped,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Load => "LoadError",
            FailureKind::Step => "StepError",
            FailureKind::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FileError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FileError::Load { .. } => FailureKind::Load,
            FileError::Step { .. } => FailureKind::Step,
            FileError::Skipped { .. } => FailureKind::Skipped,
        }
    }

    pub fn file(&self) -> &str {
        match self {
            FileError::Load { file, .. }
            | FileError::Step { file, .. }
            | FileError::Skipped { file } => file,
        }
    }

    /// Name of the failing operation, for step errors.
    pub fn operation(&self) -> Option<&str> {
        match self {
            FileError::Step { operation, .. } => Some(operation),
            _ => None,
        }
    }

    pub fn cause(&self) -> &str {
        match self {
            FileError::Load { cause, .. } | FileError::Step { cause, .. } => cause,
            FileError::Skipped { .. } => "batch cancelled",
        }
    }

    /// Whether the file was actually attempted (loaded or tried to load).
    pub fn was_attempted(&self) -> bool {
        !matches!(self, FileError::Skipped { .. })
    }
}
