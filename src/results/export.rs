//! One-shot export of a finished table.
//!
//! Exporters only read the table. A failed export is reported by the batch
//! as a warning and never touches the in-memory result.

use crate::config::{ExportFormat, ExportSettings};
use crate::error::{BatchError, Result};
use crate::pipeline::error::FileError;
use crate::results::table::{ResultTable, Row};
use crate::types::Cell;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

/// Name of the optional trailing column describing failures.
pub const ERROR_COLUMN: &str = "batch_error";

/// Writes a result table to a destination.
pub trait Exporter: Send {
    fn export(&self, table: &ResultTable, destination: &Path) -> anyhow::Result<()>;
}

/// Human-readable failure marker for an export cell.
pub fn describe_error(error: &FileError) -> String {
    match error.operation() {
        Some(op) => format!("{} [{}]: {}", error.kind(), op, error.cause()),
        None => format!("{}: {}", error.kind(), error.cause()),
    }
}

fn error_text(row: &Row) -> String {
    row.error.as_ref().map(describe_error).unwrap_or_default()
}

/// Comma-separated values with a header row. Missing cells are empty fields.
#[derive(Debug, Clone, Default)]
pub struct CsvExporter {
    pub include_errors: bool,
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write to any sink; used by [`Exporter::export`] and by tests.
    pub fn write<W: std::io::Write>(&self, table: &ResultTable, sink: W) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_writer(sink);

        let mut header: Vec<&str> = table.columns().iter().map(String::as_str).collect();
        if self.include_errors {
            header.push(ERROR_COLUMN);
        }
        writer.write_record(&header)?;

        for row in table.rows() {
            let mut record = Vec::with_capacity(header.len());
            record.push(row.file.clone());
            record.extend(row.cells.iter().map(Cell::to_string));
            if self.include_errors {
                record.push(error_text(row));
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Exporter for CsvExporter {
    fn export(&self, table: &ResultTable, destination: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(destination)
            .with_context(|| format!("cannot create {}", destination.display()))?;
        self.write(table, file)
            .with_context(|| format!("cannot write {}", destination.display()))
    }
}

/// `{"columns": [...], "rows": [[...], ...]}`; missing cells are `null`.
#[derive(Debug, Clone, Default)]
pub struct JsonExporter {
    pub include_errors: bool,
    pub pretty: bool,
}

#[derive(Serialize)]
struct JsonTable<'a> {
    columns: Vec<&'a str>,
    rows: Vec<Vec<serde_json::Value>>,
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_value(&self, table: &ResultTable) -> anyhow::Result<serde_json::Value> {
        let mut columns: Vec<&str> = table.columns().iter().map(String::as_str).collect();
        if self.include_errors {
            columns.push(ERROR_COLUMN);
        }
        let mut rows = Vec::with_capacity(table.len());
        for row in table.rows() {
            let mut values = Vec::with_capacity(columns.len());
            values.push(serde_json::Value::String(row.file.clone()));
            for cell in &row.cells {
                values.push(serde_json::to_value(cell)?);
            }
            if self.include_errors {
                values.push(match &row.error {
                    Some(err) => serde_json::Value::String(describe_error(err)),
                    None => serde_json::Value::Null,
                });
            }
            rows.push(values);
        }
        Ok(serde_json::to_value(JsonTable { columns, rows })?)
    }
}

impl Exporter for JsonExporter {
    fn export(&self, table: &ResultTable, destination: &Path) -> anyhow::Result<()> {
        let value = self.to_value(table)?;
        let content = if self.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        std::fs::write(destination, content)
            .with_context(|| format!("cannot write {}", destination.display()))
    }
}

/// Exporter matching the configured (or inferred) format.
pub fn exporter_for(settings: &ExportSettings) -> Result<Box<dyn Exporter>> {
    match settings.resolved_format() {
        Some(ExportFormat::Csv) => Ok(Box::new(CsvExporter {
            include_errors: settings.include_errors,
        })),
        Some(ExportFormat::Json) => Ok(Box::new(JsonExporter {
            include_errors: settings.include_errors,
            pretty: true,
        })),
        None => Err(BatchError::config(format!(
            "Cannot infer export format from {:?}",
            settings.path
        ))),
    }
}
