//! The final result table and its summary.

use crate::pipeline::error::{FailureKind, FileError};
use crate::types::Cell;
use serde::Serialize;
use std::fmt;

/// Where a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrigin {
    /// A file of the collection (processed, failed or skipped).
    File,
    /// Present only in the additional parameters.
    MetadataOnly,
}

/// One output row. `cells` holds every column except the identity column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub file: String,
    pub origin: RowOrigin,
    pub cells: Vec<Cell>,
    pub error: Option<FileError>,
}

impl Row {
    pub fn is_failed(&self) -> bool {
        self.error.as_ref().is_some_and(FileError::was_attempted)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.error, Some(FileError::Skipped { .. }))
    }
}

/// One row per input file (in collection order) followed by metadata-only
/// rows. Column 0 is the identity column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    columns: Vec<String>,
    pipeline_columns: usize,
    rows: Vec<Row>,
}

impl ResultTable {
    /// `columns` includes the identity column first, then `pipeline_columns`
    /// pipeline columns, then additional parameter columns.
    pub(crate) fn new(columns: Vec<String>, pipeline_columns: usize, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|r| r.cells.len() + 1 == columns.len()));
        Self {
            columns,
            pipeline_columns,
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn identity_column(&self) -> &str {
        self.columns.first().map(String::as_str).unwrap_or_default()
    }

    /// Columns produced by the pipeline.
    pub fn pipeline_columns(&self) -> &[String] {
        &self.columns[1..1 + self.pipeline_columns]
    }

    /// Columns joined in from additional parameters.
    pub fn param_columns(&self) -> &[String] {
        &self.columns[1 + self.pipeline_columns..]
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, file: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.file == file)
    }

    /// Index of a non-identity column within [`Row::cells`].
    pub fn cell_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .skip(1)
            .position(|c| c == column)
    }

    /// Cell at (`file`, `column`). `None` if either is unknown.
    pub fn get(&self, file: &str, column: &str) -> Option<&Cell> {
        let idx = self.cell_index(column)?;
        self.row(file)?.cells.get(idx)
    }

    /// All cells of one column, in row order.
    pub fn column(&self, column: &str) -> Option<Vec<&Cell>> {
        let idx = self.cell_index(column)?;
        Some(self.rows.iter().map(|r| &r.cells[idx]).collect())
    }

    /// Counts over file rows plus the first `max_failures` failures.
    pub fn summary(&self, max_failures: usize) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for row in self.rows.iter().filter(|r| r.origin == RowOrigin::File) {
            match &row.error {
                None => {
                    summary.attempted += 1;
                    summary.succeeded += 1;
                }
                Some(FileError::Skipped { .. }) => summary.skipped += 1,
                Some(err) => {
                    summary.attempted += 1;
                    summary.failed += 1;
                    if summary.failures.len() < max_failures {
                        summary.failures.push(FailureRecord::from(err));
                    }
                }
            }
        }
        summary
    }
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub file: String,
    pub kind: FailureKind,
    pub operation: Option<String>,
    pub cause: String,
}

impl From<&FileError> for FailureRecord {
    fn from(err: &FileError) -> Self {
        Self {
            file: err.file().to_string(),
            kind: err.kind(),
            operation: err.operation().map(str::to_string),
            cause: err.cause().to_string(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "{} [{}] {}: {}", self.kind, op, self.file, self.cause),
            None => write!(f, "{} {}: {}", self.kind, self.file, self.cause),
        }
    }
}

/// Failure visibility for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// First failures in row order
    pub failures: Vec<FailureRecord>,
}

impl BatchSummary {
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} succeeded, {} failed, {} skipped",
            self.attempted, self.succeeded, self.failed, self.skipped
        )
    }
}
