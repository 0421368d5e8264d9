//! Surface capability contract.
//!
//! A [`Surface`] is one loaded height map. The batch engine never looks at
//! height data itself; it only invokes named capabilities on a surface and
//! threads the outcome through the pipeline:
//!
//! - a mutating capability updates the surface in place and yields
//!   [`Outcome::Mutated`],
//! - a measurement yields [`Outcome::Values`] with one value per declared
//!   result column.
//!
//! Which names exist and what they return is described by a
//! [`CapabilitySet`]; the pipeline builder checks declarations against it so
//! unknown names never reach a worker.

pub mod capability;
pub mod height_map;
pub mod memo;

pub use capability::{Arity, CapabilityDescriptor, CapabilitySet};
pub use height_map::HeightMap;
pub use memo::{Fingerprint, MemoCache};

use crate::types::Arguments;
use thiserror::Error;

/// Result of invoking one capability on a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The surface was updated in place.
    Mutated,
    /// One or more computed scalars, in the order of the capability's labels.
    Values(Vec<f64>),
}

/// Failure raised by a capability for one surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("capability '{0}' is not supported by this surface")]
    Unsupported(String),

    #[error("surface contains {0} non-measured points")]
    NonMeasuredPoints(usize),
}

/// One loaded height map and its analysis capabilities.
///
/// Implementations are owned by exactly one worker for the duration of one
/// file's pipeline, so `Send` is required but `Sync` is not.
pub trait Surface: Send {
    /// Invoke the capability `name` with the declared arguments.
    fn invoke(&mut self, name: &str, args: &Arguments) -> Result<Outcome, CapabilityError>;
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn invoke(&mut self, name: &str, args: &Arguments) -> Result<Outcome, CapabilityError> {
        (**self).invoke(name, args)
    }
}
