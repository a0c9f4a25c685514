//! Logging for the webhook server and admin commands
//!
//! Every process writes to a daily-rolling file under
//! `$XDG_STATE_HOME/repodoc/` (`~/.local/state/repodoc/repodoc.log.<date>`).
//! `repodoc serve -v` also mirrors events to stderr so a foreground server
//! can be watched directly.
//!
//! Pipeline events carry `repo`, `path` and `commit` fields; filter on them
//! with `RUST_LOG`, e.g. `RUST_LOG=repodoc_core::pipeline=debug`.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// HTTP stack crates that are chatty at `debug`
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "tower", "mio"];

/// Filter directives for `level` when `RUST_LOG` is unset.
///
/// Dependencies are held at `warn` unless `level` is stricter than that.
pub fn default_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let dependency_level = match level.as_str() {
        "error" | "off" => level.as_str(),
        _ => "warn",
    };

    let mut directives = vec![level.clone()];
    directives.extend(
        QUIET_DEPENDENCIES
            .iter()
            .map(|krate| format!("{krate}={dependency_level}")),
    );
    directives.join(",")
}

/// Install the global subscriber.
///
/// The returned guard must be held for the life of the process; dropping it
/// flushes the file writer.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let (file_writer, guard) = rolling_writer(&log_dir, config.max_files)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .map_err(|e| Error::Config(format!("invalid logging.level {:?}: {e}", config.level)))?;

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = config
        .stderr
        .then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        stderr = config.stderr,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

fn rolling_writer(
    log_dir: &std::path::Path,
    max_files: usize,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("repodoc.log")
        .max_log_files(max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {e}")))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Route logs to the test harness. Safe to call from every test.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the non-blocking file writer alive
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Base path of the rolling log files
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}
