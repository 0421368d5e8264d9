//! Export settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Output format of the one-shot export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(ExportFormat::Csv)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(ExportFormat::Json)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Where and how to export the finished result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Destination file
    pub path: PathBuf,

    /// Explicit format; inferred from the extension when absent
    #[serde(default)]
    pub format: Option<ExportFormat>,

    /// Append a column describing each row's failure
    #[serde(default)]
    pub include_errors: bool,
}

impl ExportSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            include_errors: false,
        }
    }

    pub fn with_errors(mut self) -> Self {
        self.include_errors = true;
        self
    }

    /// The explicit format, or the one implied by the path.
    pub fn resolved_format(&self) -> Option<ExportFormat> {
        self.format.or_else(|| ExportFormat::from_path(&self.path))
    }
}
