//! Activity log with file-based structured logging
//!
//! Opt-in tracing subscriber for applications using AxterDB:
//! - JSON formatted activity log (`axterdb.log`) in a chosen directory
//! - Console output for development
//! - Size-based rotation (10MB per file) plus daily rotation
//!
//! Nothing here is installed implicitly; library code only emits `tracing`
//! events and leaves subscriber setup to the application.

use anyhow::Result;
use rolling_file::{RollingConditionBasic, RollingFileAppender};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub const ACTIVITY_LOG_FILE: &str = "axterdb.log";

const DEFAULT_FILTER: &str = "axterdb_rs=info,axterdb_core=info,axterdb_stub=info";

/// Install the activity log subscriber writing into `log_dir`.
///
/// Returns a guard that must be kept alive to ensure logs are flushed
pub fn init_activity_log(log_dir: impl AsRef<Path>) -> Result<WorkerGuard> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    // Rotates when file reaches 10MB or daily, whichever comes first
    let file_appender = RollingFileAppender::new(
        log_dir.join(ACTIVITY_LOG_FILE),
        RollingConditionBasic::new()
            .daily()
            .max_size(10 * 1024 * 1024),
        9,
    )?;

    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_target(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!("Activity log initialized in {:?}", log_dir);

    Ok(guard)
}
