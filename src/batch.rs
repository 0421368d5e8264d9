//! Batch orchestration: pre-flight, execute, aggregate, export.
//!
//! [`Batch::run`] consumes the batch, so a given batch value runs exactly
//! once. The frozen [`Pipeline`] inside it can be cloned into further
//! batches.

use crate::config::BatchConfig;
use crate::error::{BatchError, Result};
use crate::loader::FileCollection;
use crate::params::AdditionalParams;
use crate::pipeline::bridge::{AbortHandle, ProgressEvent};
use crate::pipeline::builder::Pipeline;
use crate::pipeline::executor::Executor;
use crate::results::export::{exporter_for, Exporter};
use crate::results::{Aggregator, BatchSummary, ResultTable};
use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use std::path::PathBuf;

/// Everything a finished batch produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub table: ResultTable,
    pub summary: BatchSummary,
    /// Set when the optional export failed; the table is unaffected.
    pub export_warning: Option<String>,
    /// Destination written by a successful export.
    pub exported_to: Option<PathBuf>,
    pub cancelled: bool,
    pub workers: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl BatchReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// A frozen pipeline bound to a file collection, ready to run once.
pub struct Batch {
    pipeline: Pipeline,
    files: FileCollection,
    params: Option<AdditionalParams>,
    config: BatchConfig,
    progress: Option<Sender<ProgressEvent>>,
    abort: AbortHandle,
    exporter: Option<(Box<dyn Exporter>, PathBuf)>,
}

impl Batch {
    pub fn new(pipeline: Pipeline, files: FileCollection) -> Self {
        Self {
            pipeline,
            files,
            params: None,
            config: BatchConfig::default(),
            progress: None,
            abort: AbortHandle::new(),
            exporter: None,
        }
    }

    pub fn with_additional_params(mut self, params: AdditionalParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, tx: Sender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Use a custom exporter instead of the one implied by the config.
    pub fn with_exporter(
        mut self,
        exporter: Box<dyn Exporter>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        self.exporter = Some((exporter, destination.into()));
        self
    }

    /// Handle that stops dispatch when aborted. Clone it before `run`.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run the batch.
    ///
    /// Configuration problems are reported before any file is loaded.
    /// Per-file failures are recorded in the table. The call fails with
    /// [`BatchError::AllFilesFailed`] only when at least one file was
    /// attempted and none succeeded.
    pub fn run(self) -> Result<BatchReport> {
        let started_at = Local::now();
        self.preflight()?;

        let workers = self.config.resolved_workers();
        tracing::info!(
            "Starting batch: {} files, {} pipeline columns, {} workers",
            self.files.len(),
            self.pipeline.columns().len(),
            workers
        );

        let mut executor = Executor::new(self.pipeline.clone())
            .workers(workers)
            .in_flight_per_worker(self.config.in_flight_per_worker)
            .abort_handle(self.abort.clone());
        if let Some(tx) = self.progress.clone() {
            executor = executor.progress(tx);
        }
        let results = executor.run(&self.files);

        let table = Aggregator::new(&self.config.join_column, self.pipeline.columns())
            .with_params(self.params.as_ref())
            .aggregate(results)?;
        let summary = table.summary(self.config.max_reported_failures);

        tracing::info!("Batch finished: {}", summary);
        for failure in &summary.failures {
            tracing::warn!("  {}", failure);
        }

        if summary.all_failed() {
            return Err(BatchError::AllFilesFailed {
                summary,
                table: Box::new(table),
            });
        }

        let (exported_to, export_warning) = self.export(&table);

        Ok(BatchReport {
            table,
            summary,
            export_warning,
            exported_to,
            cancelled: self.abort.is_aborted(),
            workers,
            started_at,
            finished_at: Local::now(),
        })
    }

    fn preflight(&self) -> Result<()> {
        self.config.validate()?;
        let external: &[String] = match &self.params {
            Some(params) => {
                if params.join_column() != self.config.join_column {
                    return Err(BatchError::config(format!(
                        "Additional parameters are keyed by '{}' but the batch joins on '{}'",
                        params.join_column(),
                        self.config.join_column
                    )));
                }
                params.columns()
            }
            None => &[],
        };
        self.pipeline
            .check_external_columns(&self.config.join_column, external)
    }

    /// Best-effort export. Returns (destination, warning).
    fn export(&self, table: &ResultTable) -> (Option<PathBuf>, Option<String>) {
        let outcome = match (&self.exporter, &self.config.export) {
            (Some((exporter, dest)), _) => Some((exporter.export(table, dest), dest.clone())),
            (None, Some(settings)) => match exporter_for(settings) {
                Ok(exporter) => Some((
                    exporter.export(table, &settings.path),
                    settings.path.clone(),
                )),
                Err(e) => Some((Err(anyhow::anyhow!(e.to_string())), settings.path.clone())),
            },
            (None, None) => None,
        };
        match outcome {
            None => (None, None),
            Some((Ok(()), dest)) => {
                tracing::info!("Exported {} rows to {:?}", table.len(), dest);
                (Some(dest), None)
            }
            Some((Err(e), dest)) => {
                let warning = format!("Export to {:?} failed: {:#}", dest, e);
                tracing::warn!("{}", warning);
                (None, Some(warning))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MockLoader;
    use crate::pipeline::builder::PipelineBuilder;
    use crate::surface::HeightMap;
    use crate::types::{Arguments, Cell};
    use std::sync::Arc;

    fn sa_pipeline() -> Pipeline {
        let mut builder = PipelineBuilder::standard();
        builder.parameter("Sa", Arguments::new()).unwrap();
        builder.freeze().unwrap()
    }

    #[test]
    fn test_collision_with_params_fails_before_loading() {
        let mut mock = MockLoader::new();
        mock.expect_load().times(0);
        let files = FileCollection::new(["a.asc"], Arc::new(mock));
        let params = AdditionalParams::new("file", vec!["Sa".into()], vec![]).unwrap();
        let err = Batch::new(sa_pipeline(), files)
            .with_additional_params(params)
            .run()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_join_column_mismatch() {
        let files = FileCollection::new(Vec::<PathBuf>::new(), Arc::new(MockLoader::new()));
        let params = AdditionalParams::new("name", vec![], vec![]).unwrap();
        let err = Batch::new(sa_pipeline(), files)
            .with_additional_params(params)
            .run()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_all_failed_carries_table() {
        let mut mock = MockLoader::new();
        mock.expect_load()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("unreadable")));
        let files = FileCollection::new(["a.asc", "b.asc"], Arc::new(mock));
        let err = Batch::new(sa_pipeline(), files)
            .with_config(BatchConfig::default().with_workers(1))
            .run()
            .unwrap_err();
        match err {
            BatchError::AllFilesFailed { summary, table } => {
                assert_eq!(summary.attempted, 2);
                assert_eq!(summary.failed, 2);
                assert_eq!(table.len(), 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_collection_is_not_an_error() {
        let files = FileCollection::new(Vec::<PathBuf>::new(), Arc::new(MockLoader::new()));
        let report = Batch::new(sa_pipeline(), files).run().unwrap();
        assert!(report.table.is_empty());
        assert_eq!(report.table.columns(), &["file", "Sa"]);
        assert_eq!(report.summary.attempted, 0);
    }

    #[test]
    fn test_success_report() {
        let mut mock = MockLoader::new();
        mock.expect_load().returning(|_| {
            Ok(Box::new(
                HeightMap::new(vec![0.0, 2.0, 0.0, 2.0], 2, 2, 1.0, 1.0).unwrap(),
            ))
        });
        let files = FileCollection::new(["a.asc"], Arc::new(mock));
        let report = Batch::new(sa_pipeline(), files)
            .with_config(BatchConfig::default().with_workers(1))
            .run()
            .unwrap();
        assert_eq!(report.table.get("a.asc", "Sa"), Some(&Cell::Number(1.0)));
        assert!(!report.cancelled);
        assert!(report.export_warning.is_none());
        assert!(report.elapsed() >= chrono::Duration::zero());
    }
}
