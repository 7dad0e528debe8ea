//! Worker logging: process-wide `tracing` setup plus one run log per job.
//!
//! Run logs are append-only files under the job's artifact directory. The
//! last few lines are kept in memory so a failed job can quote them.
//!
//! # Example
//!
//! ```no_run
//! use uuid::Uuid;
//! use voicestack_core::logging::{LogConfig, RunLog};
//! use voicestack_core::models::Stage;
//!
//! let log = RunLog::open(
//!     Uuid::new_v4(),
//!     "/data/artifacts/job/_pipeline.log",
//!     LogConfig::default(),
//!     None,
//! ).unwrap();
//!
//! log.stage_started(Stage::ExtractAudio);
//! log.command("ffprobe -print_format json ...");
//! log.warn("no language detected");
//! ```

mod run_log;
mod types;

pub use run_log::{append_audit, RunLog};
pub use types::{LogConfig, LogLevel, LogObserver, MessagePrefix};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the stderr subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Stderr plus a daily `voicestack-worker.*.log` under `logs_dir`.
///
/// Lines written after the returned guard is dropped are lost.
pub fn init_tracing_with_file(
    default_level: LogLevel,
    logs_dir: &Path,
) -> Result<WorkerGuard, InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("voicestack-worker")
        .filename_suffix("log")
        .build(logs_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter)
        .init();

    Ok(guard)
}

/// Warn-level subscriber routed through the test writer.
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
