//! Batch executor: the per-file unit of work and the worker pool.
//!
//! Every file is processed independently: load, then run each declared step
//! in order on a surface owned by exactly one worker. A failure stops that
//! file only and is recorded on its result.
//!
//! # Architecture
//!
//! ```text
//!             bounded job channel          unbounded result channel
//! [feeder] ──────────────────────► [worker 0..N] ──────────────────► [coordinator]
//!  FileRef (lazy, not loaded)       load + run steps                  slots[index] = result
//! ```
//!
//! The job channel holds at most `workers * in_flight_per_worker` file
//! references, so at most that many loads are outstanding. The coordinator
//! places each result by its enumeration index, never by arrival order.
//! With one worker everything runs inline on the calling thread.

use crate::config::host_parallelism;
use crate::loader::{FileCollection, FileRef};
use crate::pipeline::bridge::{emit, AbortHandle, ProgressEvent};
use crate::pipeline::builder::Pipeline;
use crate::pipeline::error::FileError;
use crate::pipeline::operation::OperationSpec;
use crate::surface::{Arity, CapabilityError, Outcome};
use crate::types::Cell;
use crossbeam_channel::{bounded, unbounded, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

/// Default number of queued files per worker.
pub const DEFAULT_IN_FLIGHT_PER_WORKER: usize = 2;

/// Outcome of one file: one cell per pipeline column plus an optional error.
#[derive(Debug, Clone, PartialEq)]
pub struct PerFileResult {
    pub index: usize,
    pub file: String,
    pub values: Vec<Cell>,
    pub error: Option<FileError>,
}

impl PerFileResult {
    fn new(index: usize, file: String, width: usize) -> Self {
        Self {
            index,
            file,
            values: vec![Cell::Missing; width],
            error: None,
        }
    }

    /// Result for a file that was never dispatched.
    pub fn skipped(index: usize, file: String, width: usize) -> Self {
        let mut result = Self::new(index, file, width);
        result.error = Some(FileError::Skipped {
            file: result.file.clone(),
        });
        result
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs a frozen pipeline over a file collection.
pub struct Executor {
    pipeline: Pipeline,
    workers: usize,
    in_flight_per_worker: usize,
    abort: AbortHandle,
    progress: Option<Sender<ProgressEvent>>,
}

impl Executor {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            workers: host_parallelism(),
            in_flight_per_worker: DEFAULT_IN_FLIGHT_PER_WORKER,
            abort: AbortHandle::new(),
            progress: None,
        }
    }

    /// Worker count. Zero is treated as one.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn in_flight_per_worker(mut self, n: usize) -> Self {
        self.in_flight_per_worker = n.max(1);
        self
    }

    pub fn abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn progress(mut self, tx: Sender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Process every file. The returned vector is in enumeration order and
    /// has exactly one entry per file; files not dispatched because of an
    /// abort are marked skipped.
    pub fn run(&self, files: &FileCollection) -> Vec<PerFileResult> {
        let start = Instant::now();
        let total = files.len();
        let workers = self.workers.min(total).max(1);
        let width = self.pipeline.plan().column_count();

        tracing::info!(
            "Dispatching {} files across {} workers ({} steps)",
            total,
            workers,
            self.pipeline.len()
        );
        emit(self.progress.as_ref(), ProgressEvent::Started { total, workers });

        let mut slots: Vec<Option<PerFileResult>> = (0..total).map(|_| None).collect();
        let mut completed = 0;
        if workers == 1 {
            self.run_inline(files, &mut slots, &mut completed);
        } else {
            self.run_pool(files, workers, &mut slots, &mut completed);
        }

        if self.abort.is_aborted() {
            tracing::warn!(
                "Batch cancelled: {} of {} files processed",
                completed,
                total
            );
            emit(
                self.progress.as_ref(),
                ProgressEvent::Cancelled { completed, total },
            );
        }

        let results: Vec<PerFileResult> = slots
            .into_iter()
            .zip(files.names())
            .enumerate()
            .map(|(index, (slot, name))| {
                slot.unwrap_or_else(|| PerFileResult::skipped(index, name, width))
            })
            .collect();

        let failed = results
            .iter()
            .filter(|r| r.error.as_ref().is_some_and(FileError::was_attempted))
            .count();
        tracing::info!(
            "Execution finished in {:?}: {} files, {} failed",
            start.elapsed(),
            total,
            failed
        );
        emit(
            self.progress.as_ref(),
            ProgressEvent::Finished { completed, total },
        );
        results
    }

    fn run_inline(
        &self,
        files: &FileCollection,
        slots: &mut [Option<PerFileResult>],
        completed: &mut usize,
    ) {
        for file in files.refs() {
            if self.abort.is_aborted() {
                break;
            }
            let result = process_file(&self.pipeline, file);
            self.collect(slots, result, completed);
        }
    }

    fn run_pool(
        &self,
        files: &FileCollection,
        workers: usize,
        slots: &mut [Option<PerFileResult>],
        completed: &mut usize,
    ) {
        let width = self.pipeline.plan().column_count();
        let (job_tx, job_rx) = bounded::<FileRef>(workers * self.in_flight_per_worker);
        let (result_tx, result_rx) = unbounded::<PerFileResult>();

        thread::scope(|scope| {
            for worker_id in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let pipeline = &self.pipeline;
                let abort = &self.abort;
                scope.spawn(move || {
                    tracing::trace!("Worker {} started", worker_id);
                    for file in job_rx.iter() {
                        // Queued but not yet started: honour the abort.
                        let result = if abort.is_aborted() {
                            PerFileResult::skipped(file.index(), file.name().to_string(), width)
                        } else {
                            process_file(pipeline, file)
                        };
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                    tracing::trace!("Worker {} exiting", worker_id);
                });
            }
            drop(job_rx);
            drop(result_tx);

            let abort = &self.abort;
            scope.spawn(move || {
                for file in files.refs() {
                    if abort.is_aborted() || job_tx.send(file).is_err() {
                        break;
                    }
                }
            });

            for result in result_rx.iter() {
                self.collect(slots, result, completed);
            }
        });
    }

    fn collect(
        &self,
        slots: &mut [Option<PerFileResult>],
        result: PerFileResult,
        completed: &mut usize,
    ) {
        // Files skipped after an abort were never processed.
        let skipped = matches!(result.error, Some(FileError::Skipped { .. }));
        if !skipped {
            *completed += 1;
            emit(
                self.progress.as_ref(),
                ProgressEvent::FileFinished {
                    index: result.index,
                    file: result.file.clone(),
                    failure: result.error.as_ref().map(FileError::kind),
                    completed: *completed,
                    total: slots.len(),
                },
            );
        }
        match slots.get_mut(result.index) {
            Some(slot) => *slot = Some(result),
            None => tracing::error!(
                "Discarding result for '{}' with out-of-range index {}",
                result.file,
                result.index
            ),
        }
    }
}

/// The per-file unit of work. Self-contained: shares nothing with other
/// files except the read-only pipeline.
pub fn process_file(pipeline: &Pipeline, file: FileRef) -> PerFileResult {
    let plan = pipeline.plan();
    let mut result = PerFileResult::new(file.index(), file.name().to_string(), plan.column_count());

    let loaded = panic::catch_unwind(AssertUnwindSafe(|| file.open()));
    let mut surface = match loaded {
        Ok(Ok(surface)) => surface,
        Ok(Err(err)) => {
            tracing::warn!("{}", err);
            result.error = Some(err);
            return result;
        }
        Err(payload) => {
            let err = FileError::Load {
                file: result.file.clone(),
                cause: format!("loader panicked: {}", panic_message(payload.as_ref())),
            };
            tracing::warn!("{}", err);
            result.error = Some(err);
            return result;
        }
    };

    for (step, spec) in pipeline.steps().iter().enumerate() {
        let invoked = panic::catch_unwind(AssertUnwindSafe(|| {
            surface.invoke(&spec.capability, &spec.arguments)
        }));
        let outcome = match invoked {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => return step_failed(result, step, spec, err.to_string()),
            Err(payload) => {
                let cause = format!("panicked: {}", panic_message(payload.as_ref()));
                return step_failed(result, step, spec, cause);
            }
        };

        match (&spec.arity, outcome) {
            (Arity::Mutating, Outcome::Mutated) => {}
            (Arity::Mutating, Outcome::Values(values)) => {
                let cause = format!("expected a transformed surface, got {} values", values.len());
                return step_failed(result, step, spec, cause);
            }
            (arity, Outcome::Values(values)) if values.len() == arity.value_count() => {
                // A computed cell is always finite.
                if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
                    let cause = CapabilityError::Numerical(format!("non-finite result {}", bad));
                    return step_failed(result, step, spec, cause.to_string());
                }
                for (slot, value) in plan.slots(step).zip(values) {
                    result.values[slot] = Cell::from(value);
                }
            }
            (arity, Outcome::Values(values)) => {
                let cause = format!(
                    "returned {} values, expected {}",
                    values.len(),
                    arity.value_count()
                );
                return step_failed(result, step, spec, cause);
            }
            (arity, Outcome::Mutated) => {
                let cause = format!("returned no values, expected {}", arity.value_count());
                return step_failed(result, step, spec, cause);
            }
        }
    }

    tracing::debug!("Processed '{}'", result.file);
    result
}

fn step_failed(
    mut result: PerFileResult,
    step: usize,
    spec: &OperationSpec,
    cause: String,
) -> PerFileResult {
    let err = FileError::Step {
        file: result.file.clone(),
        step,
        operation: spec.capability.clone(),
        cause,
    };
    tracing::warn!("{}", err);
    result.error = Some(err);
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
