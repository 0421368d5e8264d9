//! Externally supplied per-file metadata.
//!
//! The table is loaded eagerly. Only the presence of the join column is
//! validated at load time; duplicate keys are detected when results are
//! joined, since that is where row identity becomes ambiguous.

use crate::error::{BatchError, Result};
use crate::types::Cell;
use csv::{ReaderBuilder, Trim};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Metadata rows keyed by filename.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalParams {
    join_column: String,
    columns: Vec<String>,
    rows: Vec<(String, Vec<Cell>)>,
}

impl AdditionalParams {
    /// Build a table in memory. `columns` must not contain the join column
    /// and every row must have one cell per column.
    pub fn new(
        join_column: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<(String, Vec<Cell>)>,
    ) -> Result<Self> {
        let join_column = join_column.into();
        check_header(&join_column, &columns)?;
        if let Some((file, cells)) = rows.iter().find(|(_, cells)| cells.len() != columns.len()) {
            return Err(BatchError::config(format!(
                "Additional parameters row '{}' has {} values, expected {}",
                file,
                cells.len(),
                columns.len()
            )));
        }
        Ok(Self {
            join_column,
            columns,
            rows,
        })
    }

    /// Load from a CSV file with a header row.
    pub fn from_csv_path(path: impl AsRef<Path>, join_column: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            BatchError::Io(e)
                .with_context(format!("Failed to open additional parameters {:?}", path))
        })?;
        Self::from_csv_reader(file, join_column)
            .map_err(|e| e.with_context(format!("Failed to load additional parameters {:?}", path)))
    }

    /// Load from any CSV source with a header row.
    pub fn from_csv_reader<R: Read>(source: R, join_column: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(false)
            .from_reader(source);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let key_idx = headers.iter().position(|h| h == join_column).ok_or_else(|| {
            BatchError::config(format!(
                "Additional parameters do not contain the join column '{}' (found: {})",
                join_column,
                headers.join(", ")
            ))
        })?;
        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_idx)
            .map(|(_, h)| h.clone())
            .collect();
        check_header(join_column, &columns)?;

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let key = record.get(key_idx).unwrap_or_default().to_string();
            if key.is_empty() {
                tracing::warn!(
                    "Skipping additional parameters row {} with empty '{}'",
                    line + 2,
                    join_column
                );
                continue;
            }
            let cells = record
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_idx)
                .map(|(_, field)| Cell::parse(field))
                .collect();
            rows.push((key, cells));
        }

        tracing::debug!(
            "Loaded {} additional parameter rows with {} columns",
            rows.len(),
            columns.len()
        );

        Ok(Self {
            join_column: join_column.to_string(),
            columns,
            rows,
        })
    }

    pub fn join_column(&self) -> &str {
        &self.join_column
    }

    /// Metadata columns, excluding the join column, in source order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[(String, Vec<Cell>)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn check_header(join_column: &str, columns: &[String]) -> Result<()> {
    if join_column.is_empty() {
        return Err(BatchError::config("Join column name must not be empty"));
    }
    let mut seen = HashSet::new();
    for col in columns {
        if col == join_column || !seen.insert(col.as_str()) {
            return Err(BatchError::config(format!(
                "Additional parameters column '{}' appears more than once",
                col
            )));
        }
    }
    Ok(())
}
