//! # topo-batch: batch pipelines for surface topography
//!
//! Declare a sequence of surface operations and roughness parameters once,
//! then run it over many height-map files in parallel. Each file is
//! processed in isolation; a corrupt file or a failing step only degrades
//! that file's row. Results come back as one table in file order, outer-joined
//! with optional per-file metadata.
//!
//! ## Architecture
//!
//! - **Surface**: the capability contract (`Surface::invoke`) and the
//!   reference `HeightMap` implementation with memoized statistics
//! - **Loader**: lazy file references; nothing is read until a worker runs
//! - **Pipeline**: `PipelineBuilder` (building) freezes into `Pipeline`
//!   (immutable, shared by all workers)
//! - **Executor**: scoped worker threads fed over crossbeam channels
//! - **Results**: re-indexing aggregator, summary and CSV/JSON export
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use topo_batch::{AsciiGridLoader, Batch, BatchConfig, FileCollection, PipelineBuilder};
//!
//! fn main() -> topo_batch::Result<()> {
//!     topo_batch::logging::init(None);
//!
//!     let mut builder = PipelineBuilder::standard();
//!     builder.level()?.filter("lowpass", 0.8, None)?.roughness_parameters(None)?;
//!     let pipeline = builder.freeze()?;
//!
//!     let files = FileCollection::from_dir("scans", &["asc"], Arc::new(AsciiGridLoader::new()))?;
//!     let report = Batch::new(pipeline, files)
//!         .with_config(BatchConfig::load_or_default("batch.toml"))
//!         .run()?;
//!
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod params;
pub mod pipeline;
pub mod results;
pub mod surface;
pub mod types;

pub use batch::{Batch, BatchReport};
pub use config::{BatchConfig, ExportFormat, ExportSettings};
pub use error::{BatchError, Result, ResultExt};
pub use loader::{AsciiGridLoader, FileCollection, FileRef, FnLoader, Loader};
pub use params::AdditionalParams;
pub use pipeline::{
    AbortHandle, Executor, FailureKind, FileError, OperationSpec, PerFileResult, Pipeline,
    PipelineBuilder, ProgressEvent,
};
pub use results::{BatchSummary, ResultTable, Row, RowOrigin};
pub use surface::{
    Arity, CapabilityDescriptor, CapabilityError, CapabilitySet, HeightMap, Outcome, Surface,
};
pub use types::{Arguments, Cell, Value};
