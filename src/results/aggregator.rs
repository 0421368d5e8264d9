//! Joins per-file results with additional parameters.
//!
//! Results are buffered and re-indexed by enumeration position, so the
//! order in which workers returned them never affects the table. The join
//! is an outer join on the filename: a file without metadata and metadata
//! without a file both still produce a row, with the absent side missing.

use crate::error::{BatchError, Result};
use crate::params::AdditionalParams;
use crate::pipeline::executor::PerFileResult;
use crate::results::table::{ResultTable, Row, RowOrigin};
use crate::types::Cell;
use std::collections::HashMap;

/// Builds a [`ResultTable`] from executor output.
#[derive(Debug)]
pub struct Aggregator<'a> {
    identity_column: &'a str,
    pipeline_columns: &'a [String],
    params: Option<&'a AdditionalParams>,
}

impl<'a> Aggregator<'a> {
    pub fn new(identity_column: &'a str, pipeline_columns: &'a [String]) -> Self {
        Self {
            identity_column,
            pipeline_columns,
            params: None,
        }
    }

    pub fn with_params(mut self, params: Option<&'a AdditionalParams>) -> Self {
        self.params = params;
        self
    }

    /// Join `results` (any order) into the final table.
    ///
    /// Fails with an aggregation error if result indices are not exactly
    /// `0..n`, if a filename repeats in either source, or if the column
    /// groups overlap.
    pub fn aggregate(&self, results: Vec<PerFileResult>) -> Result<ResultTable> {
        let columns = self.columns()?;
        let ordered = reindex(results)?;
        let width = self.pipeline_columns.len();

        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(ordered.len());
        for result in &ordered {
            if result.values.len() != width {
                return Err(BatchError::Aggregation(format!(
                    "Result for '{}' has {} values, expected {}",
                    result.file,
                    result.values.len(),
                    width
                )));
            }
            if let Some(first) = seen.insert(&result.file, result.index) {
                return Err(BatchError::Aggregation(format!(
                    "Filename '{}' appears at positions {} and {}; rows would be ambiguous",
                    result.file, first, result.index
                )));
            }
        }

        let (param_width, lookup) = match self.params {
            Some(params) => (params.columns().len(), index_params(params)?),
            None => (0, HashMap::new()),
        };

        let mut joined = vec![false; lookup.len()];
        let mut rows = Vec::with_capacity(ordered.len());
        for result in ordered {
            let mut cells = result.values;
            match lookup.get(result.file.as_str()) {
                Some(&(pos, meta)) => {
                    joined[pos] = true;
                    cells.extend(meta.iter().cloned());
                }
                None => cells.extend(std::iter::repeat(Cell::Missing).take(param_width)),
            }
            rows.push(Row {
                file: result.file,
                origin: RowOrigin::File,
                cells,
                error: result.error,
            });
        }

        let mut metadata_only = 0;
        if let Some(params) = self.params {
            for (pos, (file, meta)) in params.rows().iter().enumerate() {
                if joined[pos] {
                    continue;
                }
                let mut cells = vec![Cell::Missing; width];
                cells.extend(meta.iter().cloned());
                rows.push(Row {
                    file: file.clone(),
                    origin: RowOrigin::MetadataOnly,
                    cells,
                    error: None,
                });
                metadata_only += 1;
            }
        }

        tracing::debug!(
            "Aggregated {} rows ({} metadata-only) x {} columns",
            rows.len(),
            metadata_only,
            columns.len()
        );
        Ok(ResultTable::new(columns, width, rows))
    }

    fn columns(&self) -> Result<Vec<String>> {
        let mut columns = Vec::with_capacity(1 + self.pipeline_columns.len());
        columns.push(self.identity_column.to_string());
        columns.extend(self.pipeline_columns.iter().cloned());
        if let Some(params) = self.params {
            columns.extend(params.columns().iter().cloned());
        }
        let mut unique = std::collections::HashSet::with_capacity(columns.len());
        if let Some(dup) = columns.iter().find(|c| !unique.insert(c.as_str())) {
            return Err(BatchError::Aggregation(format!(
                "Column '{}' appears more than once in the joined table",
                dup
            )));
        }
        Ok(columns)
    }
}

/// Place every result at its enumeration index.
fn reindex(results: Vec<PerFileResult>) -> Result<Vec<PerFileResult>> {
    let n = results.len();
    let mut slots: Vec<Option<PerFileResult>> = (0..n).map(|_| None).collect();
    for result in results {
        let index = result.index;
        match slots.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(result),
            Some(_) => {
                return Err(BatchError::Aggregation(format!(
                    "Two results claim position {}",
                    index
                )))
            }
            None => {
                return Err(BatchError::Aggregation(format!(
                    "Result position {} is outside 0..{}",
                    index, n
                )))
            }
        }
    }
    // n results, n distinct in-range positions: every slot is filled
    Ok(slots.into_iter().flatten().collect())
}

/// Filename -> (row position, cells). Duplicate keys are ambiguous.
fn index_params(params: &AdditionalParams) -> Result<HashMap<&str, (usize, &[Cell])>> {
    let mut lookup = HashMap::with_capacity(params.len());
    for (pos, (file, cells)) in params.rows().iter().enumerate() {
        if lookup.insert(file.as_str(), (pos, cells.as_slice())).is_some() {
            return Err(BatchError::Aggregation(format!(
                "Filename '{}' appears more than once in the additional parameters",
                file
            )));
        }
    }
    Ok(lookup)
}
