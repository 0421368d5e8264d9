//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; binaries and tests opt in to
//! output by calling one of these. Both are safe to call more than once:
//! later calls leave the first subscriber in place.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,topo_batch=debug";

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Log to stderr. Returns false if a global subscriber was already set.
pub fn init(default_filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_filter.unwrap_or(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Log to stderr and to a daily rolling file `<dir>/<prefix>.<date>`.
///
/// Keep the returned guard alive for as long as logging should continue;
/// dropping it flushes the file writer.
pub fn init_with_file(dir: impl AsRef<Path>, prefix: &str) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(dir.as_ref(), prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .is_ok();
    if !installed {
        tracing::debug!(
            "Subscriber already installed; file logging to {:?} inactive",
            dir.as_ref()
        );
    }
    guard
}
