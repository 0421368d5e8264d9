//! Result aggregation and export.
//!
//! The [`Aggregator`] turns executor output into a [`ResultTable`]: one row
//! per file in enumeration order, outer-joined with any additional
//! parameters. Exporters write the finished table once.

pub mod aggregator;
pub mod export;
pub mod table;

pub use aggregator::Aggregator;
pub use export::{exporter_for, CsvExporter, Exporter, JsonExporter, ERROR_COLUMN};
pub use table::{BatchSummary, FailureRecord, ResultTable, Row, RowOrigin};
