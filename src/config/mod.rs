//! Batch configuration
//!
//! [`BatchConfig`] holds everything about *how* a batch runs; *what* runs is
//! the pipeline. Configs can be kept in TOML or JSON files:
//!
//! ```toml
//! workers = 8
//! in_flight_per_worker = 2
//! join_column = "file"
//! max_reported_failures = 5
//!
//! [export]
//! path = "results.csv"
//! include_errors = true
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default name of the identity column
pub const DEFAULT_JOIN_COLUMN: &str = "file";

/// Default number of failures listed in a batch summary
pub const DEFAULT_MAX_REPORTED_FAILURES: usize = 5;

/// Worker count used when none is configured: the host's available
/// parallelism, or 1 if it cannot be determined.
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; `None` uses [`host_parallelism`]
    pub workers: Option<usize>,

    /// Queued files per worker (bounds outstanding loads)
    pub in_flight_per_worker: usize,

    /// Identity column name, also the key of additional parameters
    pub join_column: String,

    /// Failures listed in the summary
    pub max_reported_failures: usize,

    /// One-shot export after the table is finished
    pub export: Option<ExportSettings>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: None,
            in_flight_per_worker: crate::pipeline::executor::DEFAULT_IN_FLIGHT_PER_WORKER,
            join_column: DEFAULT_JOIN_COLUMN.to_string(),
            max_reported_failures: DEFAULT_MAX_REPORTED_FAILURES,
            export: None,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_export(mut self, export: ExportSettings) -> Self {
        self.export = Some(export);
        self
    }

    /// Effective worker count.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(host_parallelism).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(BatchError::config("workers must be at least 1"));
        }
        if self.in_flight_per_worker == 0 {
            return Err(BatchError::config("in_flight_per_worker must be at least 1"));
        }
        if self.join_column.trim().is_empty() {
            return Err(BatchError::config("join_column must not be empty"));
        }
        if let Some(export) = &self.export {
            if export.resolved_format().is_none() {
                return Err(BatchError::config(format!(
                    "Cannot infer export format from {:?}; set `format`",
                    export.path
                )));
            }
        }
        Ok(())
    }

    /// Load from a `.toml` file, or JSON for any other extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatchError::config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                BatchError::config(format!("Failed to parse config {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                BatchError::config(format!("Failed to parse config {:?}: {}", path, e))
            })?
        };
        config.validate()?;
        tracing::debug!("Loaded batch config from {:?}", path);
        Ok(config)
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load batch config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self).map_err(|e| {
                BatchError::Serialization(format!("Failed to serialize config: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content).map_err(|e| {
            BatchError::Io(e).with_context(format!("Failed to write config {:?}", path))
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}
