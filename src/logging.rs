//! Logging setup for the binary
//!
//! Human-readable output goes to stderr, and a copy without ANSI codes goes to a
//! daily rolling file `flowtools.log` under the log directory. The filter
//! comes from `RUST_LOG` and defaults to `flowtools=info`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::{FlowError, FlowResult};

const DEFAULT_FILTER: &str = "flowtools=info";

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the lifetime of the process.
pub fn init_logging(log_dir: impl AsRef<Path>) -> FlowResult<WorkerGuard> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "flowtools.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| FlowError::other(format!("failed to initialize logging: {}", e)))?;

    Ok(guard)
}
