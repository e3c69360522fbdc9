//! Structured logging configuration
//!
//! Provides:
//! - JSON output for machine consumption
//! - Pretty formatting for development
//! - Daily-rolling file output
//! - Configurable via `Config` and `RUST_LOG`
//!
//! Console logs always go to stderr; stdout is reserved for reports.

use crate::config::Config;
use std::path::Path;
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use uuid::Uuid;

const LOG_FILE_NAME: &str = "agent-usage.log";

/// Initialize the logging system based on configuration.
///
/// When logs are written to a file the returned guard must be kept alive
/// until exit, otherwise buffered lines are lost.
pub fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let format = config.logging.format.as_str();
    let log_dir = config.paths.log_directory.as_path();

    match config.logging.output.as_str() {
        "file" => Some(init_file_logging(env_filter, format, log_dir)),
        "both" => Some(init_combined_logging(env_filter, format, log_dir)),
        _ => {
            init_console_logging(env_filter, format);
            None
        }
    }
}

fn init_console_logging(filter: EnvFilter, format: &str) {
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            let _ = subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init();
        }
        _ => {
            let _ = subscriber
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_ansi(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .pretty(),
                )
                .try_init();
        }
    }
}

fn init_file_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            let _ = subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_current_span(true)
                        .with_span_list(true),
                )
                .try_init();
        }
        _ => {
            let _ = subscriber
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init();
        }
    }

    guard
}

fn init_combined_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            let _ = subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init();
        }
        _ => {
            let _ = subscriber
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .try_init();
        }
    }

    guard
}

/// Span covering one CLI invocation, tagged with a fresh run id so the lines
/// of concurrent runs can be told apart in a shared log file.
pub fn run_span(command: &str) -> Span {
    tracing::info_span!("run", run_id = %Uuid::new_v4(), command = %command)
}
