//! Thread boundary between a running batch and its caller.
//!
//! The caller keeps an [`AbortHandle`] to stop dispatch and may receive
//! [`ProgressEvent`]s over a crossbeam channel. Progress is observability
//! only; dropping the receiver never affects the batch.

use crate::pipeline::error::FailureKind;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Events sent from the executor to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Dispatch is about to begin.
    Started { total: usize, workers: usize },

    /// One file finished (successfully or not).
    FileFinished {
        index: usize,
        file: String,
        failure: Option<FailureKind>,
        completed: usize,
        total: usize,
    },

    /// An abort was observed; no further files are dispatched.
    Cancelled { completed: usize, total: usize },

    /// Every worker has returned.
    Finished { completed: usize, total: usize },
}

/// Create a progress channel pair. Unbounded: sending never blocks the
/// coordinator and no event is dropped while the receiver is alive.
pub fn progress_channel() -> (Sender<ProgressEvent>, Receiver<ProgressEvent>) {
    unbounded()
}

/// Drain all pending progress events.
pub fn drain(rx: &Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Shared cancellation flag.
///
/// Aborting stops new dispatch only. A file already being processed runs to
/// completion so no surface is left half-mutated.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("Batch abort requested");
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Send without blocking; events for a dropped receiver are discarded.
pub(crate) fn emit(tx: Option<&Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = tx {
        let _ = tx.try_send(event);
    }
}
