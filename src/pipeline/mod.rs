//! Declare-then-run batch pipeline.
//!
//! A pipeline is an ordered list of operations declared once and then run
//! against many files. It moves through three states, each its own type:
//!
//! ```text
//! PipelineBuilder ──freeze()──► Pipeline ──Batch::run(self)──► BatchReport
//!   (building)                   (frozen)       (executed)
//! ```
//!
//! # Design
//!
//! - **Pure data**: `OperationSpec` is a serializable descriptor; declaring
//!   never touches file data.
//! - **Pre-flight**: column collisions are found at freeze time by
//!   `PipelineCompiler`, before any file is loaded.
//! - **Worker pool**: scoped threads fed through a bounded crossbeam
//!   channel; each worker owns the surface it is processing.
//! - **Fault isolation**: load errors, step errors and panics are recorded
//!   on the file's result and never abort the batch.

pub mod bridge;
pub mod builder;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod operation;

pub use bridge::{progress_channel, AbortHandle, ProgressEvent};
pub use builder::{Pipeline, PipelineBuilder};
pub use compiled_plan::{CompiledPlan, PlanStats};
pub use compiler::PipelineCompiler;
pub use error::{FailureKind, FileError};
pub use executor::{process_file, Executor, PerFileResult};
pub use operation::OperationSpec;
