//! Error handling for batch runs
//!
//! This module defines the fatal error type and a Result alias. Per-file
//! failures (load and step errors) are not fatal and live in
//! [`crate::pipeline::error`], where they are recorded on result rows instead
//! of being propagated.

use crate::results::{BatchSummary, ResultTable};
use thiserror::Error;

/// Fatal error type for batch operations
#[derive(Error, Debug)]
pub enum BatchError {
    /// Bad pipeline declaration, column collision or missing join key.
    /// Raised before any file is dispatched.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A structural invariant of the result join was broken
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Every attempted file failed. The finished table is still attached.
    #[error("All {} attempted files failed", .summary.attempted)]
    AllFilesFailed {
        summary: BatchSummary,
        table: Box<ResultTable>,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// CSV parsing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BatchError>,
    },
}

impl BatchError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BatchError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        BatchError::Configuration(message.into())
    }

    /// Whether this is (or wraps) a configuration error
    pub fn is_configuration(&self) -> bool {
        match self {
            BatchError::Configuration(_) => true,
            BatchError::WithContext { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Whether this is (or wraps) an aggregation error
    pub fn is_aggregation(&self) -> bool {
        match self {
            BatchError::Aggregation(_) => true,
            BatchError::WithContext { source, .. } => source.is_aggregation(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Serialization(err.to_string())
    }
}

/// Result type alias for batch operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
